//! Recognizer invocation profiles
//!
//! A [`TranscribeOptions`] value captures every tunable a recognizer
//! invocation needs. Three named profiles cover the decode strategies
//! the recovery ladder cycles through:
//!
//! - [`TranscribeOptions::primary`] - beam search, context carry-over
//! - [`TranscribeOptions::alternate`] - greedy decode, no context carry-over
//! - [`TranscribeOptions::conservative`] - greedy decode with light
//!   temperature and a stricter no-speech gate

use serde::{Deserialize, Serialize};

use crate::error::{RecognitionError, Result};

/// Options for a single recognizer invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeOptions {
    /// Profile name carried into logs and transcript records
    pub label: String,
    /// Language hint, None lets the recognizer auto-detect
    pub language: Option<String>,
    /// Beam width, 1 means greedy decoding
    pub beam_size: u32,
    /// Number of candidate sequences kept when sampling
    pub best_of: u32,
    /// Sampling temperature, 0.0 is deterministic
    pub temperature: f64,
    /// Whether earlier output conditions later decoding
    pub condition_on_previous_text: bool,
    /// Beam search patience factor
    pub patience: f64,
    /// Probability above which a window is treated as non-speech
    pub no_speech_threshold: f64,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self::primary()
    }
}

impl TranscribeOptions {
    /// Full-quality profile used for first-pass transcription
    pub fn primary() -> Self {
        Self {
            label: "default".to_string(),
            language: None,
            beam_size: 5,
            best_of: 5,
            temperature: 0.0,
            condition_on_previous_text: true,
            patience: 2.0,
            no_speech_threshold: 0.6,
        }
    }

    /// Greedy profile that breaks context-driven repetition loops
    ///
    /// Disabling `condition_on_previous_text` stops the decoder from
    /// feeding its own degenerate output back into the next window.
    pub fn alternate() -> Self {
        Self {
            label: "alternate".to_string(),
            beam_size: 1,
            best_of: 1,
            temperature: 0.0,
            condition_on_previous_text: false,
            ..Self::primary()
        }
    }

    /// Most defensive profile, used late in the recovery ladder
    pub fn conservative() -> Self {
        Self {
            label: "conservative".to_string(),
            beam_size: 1,
            best_of: 1,
            temperature: 0.1,
            condition_on_previous_text: false,
            patience: 1.0,
            no_speech_threshold: 0.6,
            ..Self::primary()
        }
    }

    /// Set the language hint
    pub fn with_language<S: Into<String>>(mut self, language: Option<S>) -> Self {
        self.language = language.map(Into::into);
        self
    }

    /// Set the beam width
    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.beam_size = beam_size;
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Validate option ranges
    ///
    /// # Returns
    /// * `Ok(())` if all fields are usable
    /// * `Err(RecognitionError::InvalidOptions)` describing the first bad field
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(RecognitionError::invalid_options(
                "label must not be empty",
            ));
        }
        if self.beam_size < 1 {
            return Err(RecognitionError::invalid_options(format!(
                "beam_size must be at least 1, got {}",
                self.beam_size
            )));
        }
        if self.best_of < 1 {
            return Err(RecognitionError::invalid_options(format!(
                "best_of must be at least 1, got {}",
                self.best_of
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RecognitionError::invalid_options(format!(
                "temperature must be in [0.0, 1.0], got {}",
                self.temperature
            )));
        }
        if self.patience <= 0.0 || !self.patience.is_finite() {
            return Err(RecognitionError::invalid_options(format!(
                "patience must be positive and finite, got {}",
                self.patience
            )));
        }
        if !(0.0..=1.0).contains(&self.no_speech_threshold) {
            return Err(RecognitionError::invalid_options(format!(
                "no_speech_threshold must be in [0.0, 1.0], got {}",
                self.no_speech_threshold
            )));
        }
        Ok(())
    }
}
