//! Scoped ownership of scratch audio files.

use std::path::PathBuf;
use std::sync::Arc;

use crate::AudioToolkit;

/// Owns the scratch files of one segment or recovery episode and releases
/// them through the toolkit when dropped, whichever way the episode exits.
pub struct ScratchFiles {
    toolkit: Arc<dyn AudioToolkit>,
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    /// Create an empty guard bound to `toolkit`
    pub fn new(toolkit: Arc<dyn AudioToolkit>) -> Self {
        Self {
            toolkit,
            paths: Vec::new(),
        }
    }

    /// Take ownership of a scratch file
    pub fn adopt(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Paths currently owned by the guard
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of owned scratch files
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when no scratch files are owned
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Release everything now instead of at drop
    pub fn release(&mut self) {
        for path in std::mem::take(&mut self.paths) {
            self.toolkit.cleanup(&path);
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        self.release();
    }
}
