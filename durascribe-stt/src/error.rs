//! Error types for recognizer integration

use thiserror::Error;

/// Result type for recognizer operations
pub type Result<T> = std::result::Result<T, RecognitionError>;

/// Errors that can occur while invoking a recognizer
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Recognizer binary or model is not available
    #[error("Recognizer unavailable: {0}")]
    Unavailable(String),

    /// Recognition ran but did not produce a usable transcript
    #[error("Recognition failed: {0}")]
    Failed(String),

    /// Invocation options are out of range
    #[error("Invalid recognizer options: {0}")]
    InvalidOptions(String),

    /// I/O error while talking to the recognizer
    #[error("Recognizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecognitionError {
    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create a failed error
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        Self::Failed(msg.into())
    }

    /// Create an invalid-options error
    pub fn invalid_options<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOptions(msg.into())
    }
}
