//! Error types for audio tooling.

use thiserror::Error;

/// Result type for audio-tooling operations
pub type Result<T> = std::result::Result<T, AudioToolError>;

/// Errors from external audio tool invocations
///
/// Callers higher up the pipeline absorb most of these: the segmenter maps
/// a failed detection tier to "zero candidates" and recovery turns failed
/// extractions into failed attempts.
#[derive(Error, Debug)]
pub enum AudioToolError {
    /// The external tool is not installed or not runnable
    #[error("Audio tool unavailable: {0}")]
    Unavailable(String),

    /// The tool ran but reported failure
    #[error("Audio tool invocation failed: {0}")]
    Invocation(String),

    /// Tool output could not be interpreted
    #[error("Audio tool output parse error: {0}")]
    Parse(String),

    /// The request itself is invalid (negative offsets, missing file)
    #[error("Unsupported audio input: {0}")]
    UnsupportedInput(String),

    /// Filesystem error while staging scratch files
    #[error("Audio scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioToolError {
    /// Create an unavailable-tool error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invocation error
    pub fn invocation<S: Into<String>>(msg: S) -> Self {
        Self::Invocation(msg.into())
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an unsupported-input error
    pub fn unsupported_input<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedInput(msg.into())
    }
}
