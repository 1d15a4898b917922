//! Transcript analysis for Durascribe
//!
//! Pure-function detection of recognizer output pathologies plus the
//! quality gate used by the recovery pipeline.
//!
//! ## Features
//!
//! - Phrase-loop detection over 1-3-word consecutive runs
//! - N-gram repetition ratio and vocabulary diversity signals
//! - Weighted quality score with tunable weights and a pluggable
//!   coherence hook
//! - No I/O anywhere; safe to run on every segment
//!
//! ## Quick Start
//!
//! ```
//! use durascribe_analysis::{DetectorConfig, RepetitionDetector};
//!
//! let detector = RepetitionDetector::new(DetectorConfig::default())?;
//! let result = detector.analyze("o que é o que é o que é o que é");
//! assert!(result.is_loop);
//! println!("{} (confidence {:.2})", result.pattern_kind, result.confidence);
//! # Ok::<(), durascribe_analysis::AnalysisError>(())
//! ```

pub mod detector;
pub mod error;
pub mod quality;

pub use detector::{DetectorConfig, LoopDetectionResult, PatternKind, RepetitionDetector};
pub use error::{AnalysisError, Result};
pub use quality::{
    CoherenceModel, NeutralCoherence, QualityConfig, QualityScorer, QualityWeights,
};
