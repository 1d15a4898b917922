//! Transcript quality scoring used as the recovery acceptance gate.
//!
//! The score is a weighted blend dominated by the repetition penalty,
//! since repetition collapse is the failure mode this pipeline exists to
//! catch. Weights are configuration, not contracts.

use serde::{Deserialize, Serialize};

use crate::detector::RepetitionDetector;
use crate::error::{AnalysisError, Result};

/// Transcripts trimmed shorter than this are rejected outright.
const MIN_TEXT_CHARS: usize = 10;

/// Pluggable language-coherence heuristic.
///
/// No coherence model ships with this crate. The default stand-in,
/// [`NeutralCoherence`], contributes a constant so the blend stays honest
/// about what it actually measures.
pub trait CoherenceModel: Send + Sync {
    /// Coherence of `text` in `[0, 1]`.
    fn coherence(&self, text: &str) -> f64;
}

/// Documented no-op coherence model scoring every text 0.5.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralCoherence;

impl CoherenceModel for NeutralCoherence {
    fn coherence(&self, _text: &str) -> f64 {
        0.5
    }
}

/// Relative weight of each quality term
///
/// Must sum to 1.0; validated at scorer construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    /// Vocabulary diversity
    pub diversity: f64,
    /// Sentence structure
    pub structure: f64,
    /// Repetition penalty (dominant term)
    pub repetition: f64,
    /// Length appropriateness against audio duration
    pub length: f64,
    /// Language coherence hook
    pub coherence: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            diversity: 0.25,
            structure: 0.20,
            repetition: 0.30,
            length: 0.15,
            coherence: 0.10,
        }
    }
}

impl QualityWeights {
    /// Validate ranges and that the weights form a convex combination
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("diversity", self.diversity),
            ("structure", self.structure),
            ("repetition", self.repetition),
            ("length", self.length),
            ("coherence", self.coherence),
        ];
        for (name, weight) in named {
            if !(0.0..=1.0).contains(&weight) {
                return Err(AnalysisError::quality_config(format!(
                    "{name} weight must be in [0.0, 1.0], got {weight}"
                )));
            }
        }
        let sum: f64 = named.iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(AnalysisError::quality_config(format!(
                "weights must sum to 1.0, got {sum:.4}"
            )));
        }
        Ok(())
    }
}

/// Quality gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum acceptable score in `[0, 1]`
    pub min_score: f64,
    /// Term weights
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: 0.6,
            weights: QualityWeights::default(),
        }
    }
}

impl QualityConfig {
    /// Set the acceptance threshold
    pub fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = score;
        self
    }

    /// Set the term weights
    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Validate threshold and weights
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(AnalysisError::quality_config(format!(
                "min_score must be in [0.0, 1.0], got {}",
                self.min_score
            )));
        }
        self.weights.validate()
    }
}

/// Scores transcripts and gates recovery acceptance
pub struct QualityScorer {
    config: QualityConfig,
    detector: RepetitionDetector,
    coherence: Box<dyn CoherenceModel>,
}

impl QualityScorer {
    /// Create a scorer, validating the configuration
    pub fn new(config: QualityConfig, detector: RepetitionDetector) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            coherence: Box::new(NeutralCoherence),
        })
    }

    /// Replace the coherence hook
    pub fn with_coherence(mut self, model: Box<dyn CoherenceModel>) -> Self {
        self.coherence = model;
        self
    }

    /// The acceptance threshold in effect
    pub fn min_score(&self) -> f64 {
        self.config.min_score
    }

    /// Weighted quality score in `[0, 1]`
    ///
    /// `audio_duration` (seconds) feeds the length-appropriateness term;
    /// pass `None` when the duration is unknown and that term goes neutral.
    pub fn score(&self, text: &str, audio_duration: Option<f64>) -> f64 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0.0;
        }
        let analysis = self.detector.analyze(trimmed);
        let w = &self.config.weights;
        let total = w.diversity * self.diversity_score(trimmed)
            + w.structure * structure_score(trimmed)
            + w.repetition * (1.0 - analysis.repetition_ratio)
            + w.length * self.length_score(trimmed, audio_duration)
            + w.coherence * self.coherence.coherence(trimmed).clamp(0.0, 1.0);
        total.clamp(0.0, 1.0)
    }

    /// Whether `text` passes the gate
    ///
    /// Anything under 10 trimmed characters is rejected regardless of score.
    pub fn is_acceptable(&self, text: &str, audio_duration: Option<f64>) -> bool {
        if text.trim().chars().count() < MIN_TEXT_CHARS {
            return false;
        }
        self.score(text, audio_duration) >= self.config.min_score
    }

    fn diversity_score(&self, text: &str) -> f64 {
        // Too few words to judge: neutral rather than inflated-perfect.
        if self.detector.word_count(text) < 3 {
            return 0.8;
        }
        (self.detector.calculate_diversity(text) * 2.0).min(1.0)
    }

    /// Words-per-minute banding against the audio duration.
    fn length_score(&self, text: &str, audio_duration: Option<f64>) -> f64 {
        let duration = match audio_duration {
            Some(d) if d > 0.0 => d,
            _ => return 0.7,
        };
        let words = self.detector.word_count(text);
        if words == 0 {
            return 0.0;
        }
        let wpm = words as f64 / (duration / 60.0);
        if (120.0..=200.0).contains(&wpm) {
            1.0
        } else if (80.0..=300.0).contains(&wpm) {
            0.8
        } else if (50.0..=400.0).contains(&wpm) {
            0.6
        } else {
            0.3
        }
    }
}

/// Fraction of `.`-delimited clauses that start capitalized and carry at
/// least three words. Fewer than two clauses scores a neutral 0.5.
fn structure_score(text: &str) -> f64 {
    let clauses: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .collect();
    if clauses.len() < 2 {
        return 0.5;
    }
    let well_formed = clauses
        .iter()
        .filter(|clause| {
            let capitalized = clause
                .chars()
                .next()
                .map(char::is_uppercase)
                .unwrap_or(false);
            capitalized && clause.split_whitespace().count() >= 3
        })
        .count();
    well_formed as f64 / clauses.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorConfig;
    use approx::assert_relative_eq;

    fn scorer() -> QualityScorer {
        let detector = RepetitionDetector::new(DetectorConfig::default()).unwrap();
        QualityScorer::new(QualityConfig::default(), detector).unwrap()
    }

    #[test]
    fn short_text_rejected_outright() {
        let s = scorer();
        assert!(!s.is_acceptable("curto", Some(30.0)));
        assert!(!s.is_acceptable("  ok.  ", None));
    }

    #[test]
    fn well_formed_paragraph_is_acceptable() {
        let s = scorer();
        let text = "Hoje a equipe revisou o planejamento completo da sprint. \
                    Depois discutimos prioridades para cada número restante na fila de entregas.";
        // 20 distinct words over 8 seconds lands in the plausible wpm band.
        let score = s.score(text, Some(8.0));
        assert!(score > 0.9, "expected a high score, got {score}");
        assert!(s.is_acceptable(text, Some(8.0)));
    }

    #[test]
    fn looped_text_fails_the_gate() {
        let s = scorer();
        let text = "o que é ".repeat(10);
        let score = s.score(&text, Some(60.0));
        assert!(score < 0.6, "looped text should fail, scored {score}");
        assert!(!s.is_acceptable(&text, Some(60.0)));
    }

    #[test]
    fn empty_text_scores_zero() {
        assert_relative_eq!(scorer().score("   ", Some(10.0)), 0.0);
    }

    #[test]
    fn structure_counts_capitalized_clauses() {
        let text = "Primeira frase bem formada. segunda sem letra maiúscula. \
                    Terceira frase também adequada.";
        assert_relative_eq!(structure_score(text), 2.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn single_clause_gets_neutral_structure() {
        assert_relative_eq!(structure_score("sem pontuação nenhuma aqui"), 0.5);
    }

    #[test]
    fn length_bands_follow_words_per_minute() {
        let s = scorer();
        let ten_words = "uma duas três quatro cinco seis sete oito nove dez";
        // 10 words in 4s = 150 wpm; in 10s = 60 wpm; in 60s = 10 wpm.
        assert_relative_eq!(s.length_score(ten_words, Some(4.0)), 1.0);
        assert_relative_eq!(s.length_score(ten_words, Some(10.0)), 0.6);
        assert_relative_eq!(s.length_score(ten_words, Some(60.0)), 0.3);
        assert_relative_eq!(s.length_score(ten_words, None), 0.7);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let weights = QualityWeights {
            diversity: 0.5,
            structure: 0.5,
            repetition: 0.5,
            length: 0.0,
            coherence: 0.0,
        };
        assert!(weights.validate().is_err());
        assert!(QualityWeights::default().validate().is_ok());
    }

    #[test]
    fn scorer_rejects_invalid_config() {
        let detector = RepetitionDetector::new(DetectorConfig::default()).unwrap();
        let config = QualityConfig::default().with_min_score(1.4);
        assert!(QualityScorer::new(config, detector).is_err());
    }

    #[test]
    fn coherence_hook_shifts_the_score() {
        struct Confident;
        impl CoherenceModel for Confident {
            fn coherence(&self, _text: &str) -> f64 {
                1.0
            }
        }

        let text = "Hoje a equipe revisou o planejamento completo da sprint. \
                    Depois discutimos prioridades para cada número restante na fila de entregas.";
        let neutral = scorer().score(text, Some(8.0));
        let boosted = scorer()
            .with_coherence(Box::new(Confident))
            .score(text, Some(8.0));
        assert_relative_eq!(boosted - neutral, 0.05, epsilon = 1e-9);
    }
}
