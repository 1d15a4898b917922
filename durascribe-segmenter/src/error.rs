//! Error types for segmentation planning.

use thiserror::Error;

/// Result type for segmenter operations
pub type Result<T> = std::result::Result<T, SegmenterError>;

/// Errors from segmenter configuration
///
/// Planning itself never fails: detection-tool errors degrade to hard
/// time-boundary cuts rather than surfacing here.
#[derive(Error, Debug)]
pub enum SegmenterError {
    /// Invalid segmenter configuration
    #[error("Segmenter configuration error: {0}")]
    Config(String),
}

impl SegmenterError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
