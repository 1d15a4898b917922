//! Error types for the transcription pipeline

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal pipeline errors
///
/// Per-segment recognition failures are handled by the recovery ladder
/// and never surface here; this type covers errors that stop the batch.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration is invalid
    #[error("Pipeline configuration error: {0}")]
    Config(String),

    /// A required component failed its startup probe
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// Audio tooling failed outside any recovery scope
    #[error("Audio processing error: {0}")]
    Audio(#[from] durascribe_audio::AudioToolError),

    /// Segment planning failed
    #[error("Segmentation error: {0}")]
    Segmentation(#[from] durascribe_segmenter::SegmenterError),

    /// Recognizer failed outside any recovery scope
    #[error("Recognition error: {0}")]
    Recognition(#[from] durascribe_stt::RecognitionError),

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// I/O error reading inputs or writing outputs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a preflight error
    pub fn preflight<S: Into<String>>(msg: S) -> Self {
        Self::Preflight(msg.into())
    }

    /// Create a worker error
    pub fn worker<S: Into<String>>(msg: S) -> Self {
        Self::Worker(msg.into())
    }
}
