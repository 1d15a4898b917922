//! Audio tooling for Durascribe
//!
//! Everything the reliability pipeline needs from the audio world, behind
//! one narrow trait: duration probing, silence detection, and bounded
//! segment extraction into scratch WAV files. The shipped implementation
//! shells out to ffmpeg/ffprobe; tests and embedders can substitute their
//! own [`AudioToolkit`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use durascribe_audio::{AudioToolkit, FfmpegToolkit};
//! use std::path::Path;
//!
//! let toolkit = FfmpegToolkit::new()?;
//! toolkit.verify()?;
//!
//! let spans = toolkit.detect_silences(Path::new("meeting.wav"), -35.0, 0.7)?;
//! println!("{} silence gaps found", spans.len());
//! # Ok::<(), durascribe_audio::AudioToolError>(())
//! ```

pub mod error;
pub mod ffmpeg;
pub mod scratch;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use error::{AudioToolError, Result};
pub use ffmpeg::FfmpegToolkit;
pub use scratch::ScratchFiles;

/// One detected silence gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceSpan {
    /// Seconds from the start of the file where the silence begins
    pub start: f64,
    /// Seconds where it ends; `None` when the file ends inside the gap
    pub end: Option<f64>,
}

impl SilenceSpan {
    /// Length of the gap, when the end was observed
    pub fn detected_duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }
}

/// External audio tooling used by the pipeline
///
/// Implementations must be cheap to share across worker tasks. Errors are
/// advisory to most callers: the segmenter treats a failed detection pass
/// as zero candidates, and recovery treats a failed extraction as a failed
/// attempt.
pub trait AudioToolkit: Send + Sync {
    /// Check that the underlying tools exist and are runnable
    fn verify(&self) -> Result<()>;

    /// Detect silence gaps at the given threshold (dB) and minimum gap
    /// length (seconds)
    fn detect_silences(
        &self,
        path: &Path,
        threshold_db: f64,
        min_silence_s: f64,
    ) -> Result<Vec<SilenceSpan>>;

    /// Duration of the audio in seconds
    fn duration(&self, path: &Path) -> Result<f64>;

    /// Extract `[start_s, start_s + duration_s)` into a 16 kHz mono WAV
    /// scratch file and return its path
    ///
    /// The caller owns the returned file and releases it through
    /// [`cleanup`](Self::cleanup), usually via a [`ScratchFiles`] guard.
    fn extract_segment(&self, path: &Path, start_s: f64, duration_s: f64) -> Result<PathBuf>;

    /// Release a scratch file; missing files are not an error
    fn cleanup(&self, path: &Path);
}
