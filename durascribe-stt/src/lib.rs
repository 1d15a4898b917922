//! # Durascribe STT
//!
//! Recognizer abstraction for the Durascribe transcription pipeline.
//!
//! ## Features
//!
//! - **Recognizer trait**: one seam for whisper.cpp wrappers, HTTP
//!   bridges and test stubs alike
//! - **Invocation profiles**: `default`, `alternate` and `conservative`
//!   decode settings used by the recovery ladder
//! - **Fallback caching**: the secondary model is built once, lazily,
//!   and shared across workers
//! - **Command glue**: template-driven invocation of external
//!   transcriber CLIs
//!
//! ## Quick Start
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//! use durascribe_stt::{ModelBank, Recognizer, Result, TranscribeOptions};
//!
//! struct Fixed;
//!
//! impl Recognizer for Fixed {
//!     fn label(&self) -> String {
//!         "fixed".to_string()
//!     }
//!
//!     fn transcribe(&self, _path: &Path, _options: &TranscribeOptions) -> Result<String> {
//!         Ok("hello world".to_string())
//!     }
//! }
//!
//! let bank = ModelBank::new(
//!     Arc::new(Fixed),
//!     Box::new(|| Ok(Arc::new(Fixed) as Arc<dyn Recognizer>)),
//! );
//! let text = bank
//!     .primary()
//!     .transcribe(Path::new("clip.wav"), &TranscribeOptions::primary())?;
//! assert_eq!(text, "hello world");
//! # Ok::<(), durascribe_stt::RecognitionError>(())
//! ```

use std::path::Path;

pub mod cache;
pub mod command;
pub mod error;
pub mod options;

pub use cache::{FallbackModelCache, ModelBank, RecognizerFactory};
pub use command::CommandRecognizer;
pub use error::{RecognitionError, Result};
pub use options::TranscribeOptions;

/// A speech-to-text engine
///
/// Implementations must be shareable across worker threads; transcribe
/// calls may run concurrently for different segments.
pub trait Recognizer: Send + Sync {
    /// Name used in logs and transcript records
    fn label(&self) -> String;

    /// Transcribe the audio file at `path`
    ///
    /// # Arguments
    /// * `path` - Audio file to transcribe
    /// * `options` - Decode settings for this invocation
    ///
    /// # Returns
    /// * `Ok(text)` - The transcript, possibly empty for silent audio
    /// * `Err(e)` - The engine was unavailable or recognition failed
    fn transcribe(&self, path: &Path, options: &TranscribeOptions) -> Result<String>;

    /// Cheap availability probe, used before a batch starts
    fn healthcheck(&self) -> Result<()> {
        Ok(())
    }
}
