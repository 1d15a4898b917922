//! Durascribe pipeline library
//!
//! Re-exports the pipeline's modules for the `durascribe` binary and
//! for integration testing.

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod recovery;
pub mod report;

pub use config::{PipelineConfig, RecoverySettings};
pub use driver::{CancelToken, TranscriptionDriver};
pub use error::{PipelineError, Result};
pub use events::PipelineEvent;
pub use recovery::{
    RecoveryAttempt, RecoveryOrchestrator, RecoveryOutcome, RecoveryReason,
    RecoverySessionSnapshot, RecoveryStrategy, StrategyTally,
};
pub use report::{BatchStats, FileReport, RunReport, SegmentRecord};
