//! Fallback model caching
//!
//! Loading a second recognizer model is expensive, so the fallback is
//! built at most once per process and shared behind an [`Arc`]. The
//! factory runs under the cache lock, which gives single-initialization
//! even when several workers hit a degenerate segment at the same time.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::Recognizer;

/// Factory that builds the fallback recognizer on first use
pub type RecognizerFactory = Box<dyn Fn() -> Result<Arc<dyn Recognizer>> + Send + Sync>;

/// Process-wide cache for the lazily built fallback recognizer
pub struct FallbackModelCache {
    factory: RecognizerFactory,
    slot: Mutex<Option<Arc<dyn Recognizer>>>,
}

impl FallbackModelCache {
    /// Create a cache that will build its recognizer with `factory`
    pub fn new(factory: RecognizerFactory) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached recognizer, building it on first call
    ///
    /// Concurrent callers serialize on the slot lock, so the factory
    /// runs at most once. A failed build leaves the slot empty and the
    /// next caller retries.
    pub fn get_or_init(&self) -> Result<Arc<dyn Recognizer>> {
        let mut slot = self.slot.lock();
        if let Some(recognizer) = slot.as_ref() {
            return Ok(Arc::clone(recognizer));
        }
        match (self.factory)() {
            Ok(recognizer) => {
                info!("Fallback recognizer '{}' initialized", recognizer.label());
                *slot = Some(Arc::clone(&recognizer));
                Ok(recognizer)
            }
            Err(e) => {
                warn!("Fallback recognizer initialization failed: {}", e);
                Err(e)
            }
        }
    }

    /// Build the recognizer ahead of time
    ///
    /// Useful at startup when the caller knows recovery is likely and
    /// wants the model load off the critical path.
    pub fn prewarm(&self) -> Result<()> {
        self.get_or_init().map(|_| ())
    }

    /// Whether the recognizer has been built
    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Primary recognizer plus the lazily cached fallback
pub struct ModelBank {
    primary: Arc<dyn Recognizer>,
    fallback: FallbackModelCache,
}

impl ModelBank {
    /// Create a bank from a ready primary and a fallback factory
    pub fn new(primary: Arc<dyn Recognizer>, fallback_factory: RecognizerFactory) -> Self {
        Self {
            primary,
            fallback: FallbackModelCache::new(fallback_factory),
        }
    }

    /// The always-available primary recognizer
    pub fn primary(&self) -> Arc<dyn Recognizer> {
        Arc::clone(&self.primary)
    }

    /// The fallback recognizer, built on first request
    pub fn fallback(&self) -> Result<Arc<dyn Recognizer>> {
        self.fallback.get_or_init()
    }

    /// Force the fallback build now instead of on first use
    pub fn prewarm_fallback(&self) -> Result<()> {
        self.fallback.prewarm()
    }

    /// Whether the fallback has already been built
    pub fn fallback_ready(&self) -> bool {
        self.fallback.is_initialized()
    }

    /// Probe the primary recognizer
    pub fn healthcheck(&self) -> Result<()> {
        self.primary.healthcheck()
    }
}
