//! Error types for transcript analysis.

use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors from analysis configuration and setup
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Invalid detector configuration
    #[error("Detector configuration error: {0}")]
    DetectorConfig(String),

    /// Invalid quality-scoring configuration
    #[error("Quality configuration error: {0}")]
    QualityConfig(String),

    /// Word-extraction pattern failed to compile
    #[error("Pattern compilation error: {0}")]
    Pattern(String),
}

impl AnalysisError {
    /// Create a detector configuration error
    pub fn detector_config<S: Into<String>>(msg: S) -> Self {
        Self::DetectorConfig(msg.into())
    }

    /// Create a quality configuration error
    pub fn quality_config<S: Into<String>>(msg: S) -> Self {
        Self::QualityConfig(msg.into())
    }

    /// Create a pattern compilation error
    pub fn pattern<S: Into<String>>(msg: S) -> Self {
        Self::Pattern(msg.into())
    }
}
