//! Recovery ladder for degenerate segments
//!
//! When a segment's first-pass transcript trips the repetition detector,
//! scores below the quality floor, comes back empty, or blows the
//! processing-time budget, the orchestrator walks a fixed ladder of
//! strategies until one produces an acceptable transcript:
//!
//! 1. **Smaller chunks** - re-read the segment in short windows so a
//!    hallucination loop cannot feed on its own context
//! 2. **Alternate model** - the cached fallback recognizer with greedy
//!    decode settings
//! 3. **Conservative settings** - the primary recognizer with the most
//!    defensive decode profile
//! 4. **Emergency fallback** - salvage the best non-looping attempt, or
//!    emit a timestamped placeholder so the transcript never has a hole
//!
//! Recovery always returns text; the ladder cannot fail the batch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use statistical::{mean, median};
use tracing::{info, warn};

use durascribe_analysis::{DetectorConfig, QualityConfig, QualityScorer, RepetitionDetector};
use durascribe_audio::{AudioToolkit, ScratchFiles};
use durascribe_segmenter::AudioSegment;
use durascribe_stt::{ModelBank, Recognizer, TranscribeOptions};

use crate::driver::CancelToken;
use crate::error::{PipelineError, Result};

/// Why a segment entered recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    /// The repetition detector flagged a hallucination loop
    LoopDetected,
    /// The transcript scored below the quality floor
    LowQuality,
    /// The recognizer returned no usable text
    EmptyTranscript,
    /// Processing time exceeded the configured ratio of audio duration
    Overrun,
    /// The recognizer returned an error
    RecognitionError,
}

impl std::fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LoopDetected => "loop_detected",
            Self::LowQuality => "low_quality",
            Self::EmptyTranscript => "empty_transcript",
            Self::Overrun => "overrun",
            Self::RecognitionError => "recognition_error",
        };
        write!(f, "{}", name)
    }
}

/// One rung of the recovery ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    SmallerChunks,
    AlternateModel,
    ConservativeSettings,
    EmergencyFallback,
}

impl RecoveryStrategy {
    /// The ladder in escalation order
    pub fn ladder() -> [RecoveryStrategy; 4] {
        [
            Self::SmallerChunks,
            Self::AlternateModel,
            Self::ConservativeSettings,
            Self::EmergencyFallback,
        ]
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SmallerChunks => "smaller_chunks",
            Self::AlternateModel => "alternate_model",
            Self::ConservativeSettings => "conservative_settings",
            Self::EmergencyFallback => "emergency_fallback",
        };
        write!(f, "{}", name)
    }
}

/// Record of a single strategy attempt
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    /// Which rung produced this attempt
    pub strategy: RecoveryStrategy,
    /// Decode profile used
    pub options_label: String,
    /// Transcript, if the strategy ran to completion
    pub text: Option<String>,
    /// Quality score of the transcript
    pub score: Option<f64>,
    /// Whether the repetition detector flagged the transcript
    pub loop_detected: bool,
    /// Error message, if the strategy failed to run
    pub error: Option<String>,
    /// Wall-clock seconds the attempt took
    pub elapsed_s: f64,
}

impl RecoveryAttempt {
    fn failed(strategy: RecoveryStrategy, label: &str, error: String, started: Instant) -> Self {
        Self {
            strategy,
            options_label: label.to_string(),
            text: None,
            score: None,
            loop_detected: false,
            error: Some(error),
            elapsed_s: started.elapsed().as_secs_f64(),
        }
    }
}

/// Result of one recovery episode
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    /// Final transcript text, never empty
    pub text: String,
    /// Why the segment entered recovery
    pub reason: RecoveryReason,
    /// Strategy whose transcript passed acceptance, None when every
    /// rung failed and the emergency fallback supplied best-effort text
    pub winning_strategy: Option<RecoveryStrategy>,
    /// Every attempt in ladder order
    pub attempts: Vec<RecoveryAttempt>,
}

impl RecoveryOutcome {
    /// Whether recovery produced an accepted transcript
    pub fn recovered(&self) -> bool {
        self.winning_strategy.is_some()
    }
}

/// Per-strategy attempt and success counts
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StrategyTally {
    /// Times the strategy ran
    pub attempts: usize,
    /// Times its transcript resolved the episode
    pub successes: usize,
}

/// Aggregate recovery statistics for one orchestrator's lifetime
///
/// Updated after every episode; read only when the run report is
/// assembled. Never read back as control input.
#[derive(Debug, Clone, Default)]
struct RecoverySession {
    episodes: usize,
    triggers: HashMap<String, usize>,
    strategies: HashMap<String, StrategyTally>,
    episode_seconds: Vec<f64>,
}

/// Serializable snapshot of a [`RecoverySession`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoverySessionSnapshot {
    /// Total recovery episodes
    pub episodes: usize,
    /// Episodes keyed by the reason that triggered them
    pub triggers: HashMap<String, usize>,
    /// Attempt and success tallies keyed by strategy name
    pub strategies: HashMap<String, StrategyTally>,
    /// Mean episode wall-clock seconds
    pub mean_episode_s: f64,
    /// Median episode wall-clock seconds
    pub median_episode_s: f64,
}

/// Walks the recovery ladder for degenerate segments
pub struct RecoveryOrchestrator {
    toolkit: Arc<dyn AudioToolkit>,
    bank: Arc<ModelBank>,
    detector: RepetitionDetector,
    scorer: QualityScorer,
    chunk_s: f64,
    base_options: TranscribeOptions,
    session: Mutex<RecoverySession>,
}

impl RecoveryOrchestrator {
    /// Create an orchestrator
    ///
    /// # Arguments
    /// * `toolkit` - Audio extraction backend
    /// * `bank` - Primary recognizer plus lazy fallback
    /// * `detector_config` - Repetition detection thresholds
    /// * `quality_config` - Quality floor and factor weights
    /// * `chunk_s` - Window length for the smaller-chunks strategy
    /// * `language` - Language hint carried into every decode profile
    pub fn new(
        toolkit: Arc<dyn AudioToolkit>,
        bank: Arc<ModelBank>,
        detector_config: DetectorConfig,
        quality_config: QualityConfig,
        chunk_s: f64,
        language: Option<String>,
    ) -> Result<Self> {
        if chunk_s <= 0.0 || !chunk_s.is_finite() {
            return Err(PipelineError::config(format!(
                "recovery chunk length must be positive, got {}",
                chunk_s
            )));
        }
        let detector = RepetitionDetector::new(detector_config.clone())
            .map_err(|e| PipelineError::config(e.to_string()))?;
        let scoring_detector = RepetitionDetector::new(detector_config)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        let scorer = QualityScorer::new(quality_config, scoring_detector)
            .map_err(|e| PipelineError::config(e.to_string()))?;
        let base_options = TranscribeOptions::primary().with_language(language);

        Ok(Self {
            toolkit,
            bank,
            detector,
            scorer,
            chunk_s,
            base_options,
            session: Mutex::new(RecoverySession::default()),
        })
    }

    /// Aggregate statistics over every episode so far
    pub fn session_snapshot(&self) -> RecoverySessionSnapshot {
        let session = self.session.lock();
        let (mean_episode_s, median_episode_s) = if session.episode_seconds.is_empty() {
            (0.0, 0.0)
        } else {
            (
                mean(&session.episode_seconds),
                median(&session.episode_seconds),
            )
        };
        RecoverySessionSnapshot {
            episodes: session.episodes,
            triggers: session.triggers.clone(),
            strategies: session.strategies.clone(),
            mean_episode_s,
            median_episode_s,
        }
    }

    fn record_episode(&self, reason: RecoveryReason, outcome: &RecoveryOutcome, elapsed_s: f64) {
        let mut session = self.session.lock();
        session.episodes += 1;
        *session.triggers.entry(reason.to_string()).or_insert(0) += 1;
        for attempt in &outcome.attempts {
            let tally = session
                .strategies
                .entry(attempt.strategy.to_string())
                .or_default();
            tally.attempts += 1;
        }
        // The emergency rung resolves every episode no winner claimed.
        let resolver = outcome
            .winning_strategy
            .unwrap_or(RecoveryStrategy::EmergencyFallback);
        session
            .strategies
            .entry(resolver.to_string())
            .or_default()
            .successes += 1;
        session.episode_seconds.push(elapsed_s);
    }

    /// Quality floor transcripts must reach to be accepted
    pub fn min_score(&self) -> f64 {
        self.scorer.min_score()
    }

    /// Score a transcript and check it for repetition loops
    ///
    /// # Returns
    /// * `(score, is_loop)` for the given text against its audio duration
    pub fn assess(&self, text: &str, duration_s: f64) -> (f64, bool) {
        let analysis = self.detector.analyze(text);
        let score = self.scorer.score(text, Some(duration_s));
        (score, analysis.is_loop)
    }

    /// Whether a transcript clears the length floor and quality gate,
    /// ignoring loop detection
    pub fn quality_acceptable(&self, text: &str, duration_s: f64) -> bool {
        self.scorer.is_acceptable(text, Some(duration_s))
    }

    /// Whether a transcript passes the full acceptance gate
    pub fn acceptable(&self, text: &str, duration_s: f64) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let (_, is_loop) = self.assess(text, duration_s);
        !is_loop && self.scorer.is_acceptable(text, Some(duration_s))
    }

    /// Walk the ladder for one segment until a transcript is accepted
    ///
    /// Never fails: if every strategy degenerates, the emergency rung
    /// salvages the best non-looping attempt or emits a placeholder.
    pub fn recover(
        &self,
        segment: &AudioSegment,
        reason: RecoveryReason,
        cancel: &CancelToken,
    ) -> RecoveryOutcome {
        let episode_started = Instant::now();
        let outcome = self.run_ladder(segment, reason, cancel);
        self.record_episode(reason, &outcome, episode_started.elapsed().as_secs_f64());
        outcome
    }

    fn run_ladder(
        &self,
        segment: &AudioSegment,
        reason: RecoveryReason,
        cancel: &CancelToken,
    ) -> RecoveryOutcome {
        warn!(
            "Segment {} of {} entered recovery ({})",
            segment.sequence_index,
            segment.source_path.display(),
            reason
        );

        let mut attempts = Vec::new();
        for strategy in [
            RecoveryStrategy::SmallerChunks,
            RecoveryStrategy::AlternateModel,
            RecoveryStrategy::ConservativeSettings,
        ] {
            if cancel.is_cancelled() {
                warn!(
                    "Recovery for segment {} cancelled before {}",
                    segment.sequence_index, strategy
                );
                break;
            }

            let attempt = match strategy {
                RecoveryStrategy::SmallerChunks => self.attempt_smaller_chunks(segment),
                RecoveryStrategy::AlternateModel => self.attempt_alternate_model(segment),
                RecoveryStrategy::ConservativeSettings => self.attempt_conservative(segment),
                RecoveryStrategy::EmergencyFallback => unreachable!(),
            };

            let accepted = self.attempt_accepted(&attempt, segment.duration);
            attempts.push(attempt);

            if accepted {
                let winner = attempts
                    .last()
                    .and_then(|a| a.text.clone())
                    .unwrap_or_default();
                info!(
                    "Recovery strategy '{}' accepted for segment {} after {} attempt(s)",
                    strategy,
                    segment.sequence_index,
                    attempts.len()
                );
                return RecoveryOutcome {
                    text: winner,
                    reason,
                    winning_strategy: Some(strategy),
                    attempts,
                };
            }
        }

        self.emergency_fallback(segment, reason, attempts)
    }

    fn attempt_accepted(&self, attempt: &RecoveryAttempt, duration_s: f64) -> bool {
        match &attempt.text {
            Some(text) => {
                !attempt.loop_detected && self.scorer.is_acceptable(text, Some(duration_s))
            }
            None => false,
        }
    }

    /// Re-read the segment in windows of `chunk_s` seconds
    ///
    /// Short segments are re-read as a single chunk; the fresh decode
    /// context alone often breaks the loop.
    fn attempt_smaller_chunks(&self, segment: &AudioSegment) -> RecoveryAttempt {
        let started = Instant::now();
        let options = self.base_options.clone();
        let primary = self.bank.primary();
        let mut scratch = ScratchFiles::new(Arc::clone(&self.toolkit));
        let mut parts: Vec<String> = Vec::new();

        let mut offset = 0.0;
        while offset < segment.duration - 1e-9 {
            let len = self.chunk_s.min(segment.duration - offset);
            let result = self.transcribe_span(
                primary.as_ref(),
                &segment.source_path,
                segment.start_offset + offset,
                len,
                &options,
                &mut scratch,
            );
            match result {
                Ok(text) => parts.push(text),
                Err(e) => {
                    warn!(
                        "Smaller-chunks attempt failed at offset {:.1}s: {}",
                        segment.start_offset + offset,
                        e
                    );
                    return RecoveryAttempt::failed(
                        RecoveryStrategy::SmallerChunks,
                        &options.label,
                        e,
                        started,
                    );
                }
            }
            offset += len;
        }

        let text = join_parts(&parts);
        self.build_attempt(RecoveryStrategy::SmallerChunks, &options.label, text, segment, started)
    }

    /// Transcribe the whole segment with the cached fallback model
    fn attempt_alternate_model(&self, segment: &AudioSegment) -> RecoveryAttempt {
        let started = Instant::now();
        let options = TranscribeOptions::alternate().with_language(self.base_options.language.clone());

        let fallback = match self.bank.fallback() {
            Ok(recognizer) => recognizer,
            Err(e) => {
                warn!("Fallback model unavailable: {}", e);
                return RecoveryAttempt::failed(
                    RecoveryStrategy::AlternateModel,
                    &options.label,
                    e.to_string(),
                    started,
                );
            }
        };

        self.attempt_full_segment(RecoveryStrategy::AlternateModel, fallback.as_ref(), options, segment, started)
    }

    /// Transcribe the whole segment with the primary model's most
    /// defensive decode profile
    fn attempt_conservative(&self, segment: &AudioSegment) -> RecoveryAttempt {
        let started = Instant::now();
        let options =
            TranscribeOptions::conservative().with_language(self.base_options.language.clone());
        let primary = self.bank.primary();
        self.attempt_full_segment(
            RecoveryStrategy::ConservativeSettings,
            primary.as_ref(),
            options,
            segment,
            started,
        )
    }

    fn attempt_full_segment(
        &self,
        strategy: RecoveryStrategy,
        recognizer: &dyn Recognizer,
        options: TranscribeOptions,
        segment: &AudioSegment,
        started: Instant,
    ) -> RecoveryAttempt {
        let mut scratch = ScratchFiles::new(Arc::clone(&self.toolkit));
        let result = self.transcribe_span(
            recognizer,
            &segment.source_path,
            segment.start_offset,
            segment.duration,
            &options,
            &mut scratch,
        );
        match result {
            Ok(text) => self.build_attempt(strategy, &options.label, text, segment, started),
            Err(e) => {
                warn!("Recovery strategy '{}' failed: {}", strategy, e);
                RecoveryAttempt::failed(strategy, &options.label, e, started)
            }
        }
    }

    fn transcribe_span(
        &self,
        recognizer: &dyn Recognizer,
        source: &Path,
        start_s: f64,
        duration_s: f64,
        options: &TranscribeOptions,
        scratch: &mut ScratchFiles,
    ) -> std::result::Result<String, String> {
        let path = self
            .toolkit
            .extract_segment(source, start_s, duration_s)
            .map_err(|e| e.to_string())?;
        scratch.adopt(path.clone());
        recognizer
            .transcribe(&path, options)
            .map_err(|e| e.to_string())
    }

    fn build_attempt(
        &self,
        strategy: RecoveryStrategy,
        label: &str,
        text: String,
        segment: &AudioSegment,
        started: Instant,
    ) -> RecoveryAttempt {
        let (score, is_loop) = self.assess(&text, segment.duration);
        RecoveryAttempt {
            strategy,
            options_label: label.to_string(),
            text: Some(text),
            score: Some(score),
            loop_detected: is_loop,
            error: None,
            elapsed_s: started.elapsed().as_secs_f64(),
        }
    }

    /// Last rung: salvage the best non-looping attempt, or emit a
    /// placeholder so the final transcript has no silent hole
    fn emergency_fallback(
        &self,
        segment: &AudioSegment,
        reason: RecoveryReason,
        mut attempts: Vec<RecoveryAttempt>,
    ) -> RecoveryOutcome {
        let started = Instant::now();

        let salvage = attempts
            .iter()
            .filter(|a| !a.loop_detected)
            .filter_map(|a| match (&a.text, a.score) {
                (Some(text), Some(score)) if !text.trim().is_empty() => {
                    Some((text.clone(), score))
                }
                _ => None,
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        let text = match salvage {
            Some((text, score)) => {
                warn!(
                    "Emergency fallback salvaged best-effort text for segment {} (score {:.2})",
                    segment.sequence_index, score
                );
                text
            }
            None => {
                let label = segment
                    .source_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| segment.source_path.display().to_string());
                warn!(
                    "Emergency fallback emitting placeholder for segment {} of {}",
                    segment.sequence_index, label
                );
                format!(
                    "[transcription unavailable: {} {:.0}s-{:.0}s, {}]",
                    label,
                    segment.start_offset,
                    segment.end(),
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                )
            }
        };

        attempts.push(RecoveryAttempt {
            strategy: RecoveryStrategy::EmergencyFallback,
            options_label: "emergency".to_string(),
            text: Some(text.clone()),
            score: None,
            loop_detected: false,
            error: None,
            elapsed_s: started.elapsed().as_secs_f64(),
        });

        RecoveryOutcome {
            text,
            reason,
            winning_strategy: None,
            attempts,
        }
    }
}

fn join_parts(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
