//! Configuration management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use durascribe_analysis::{DetectorConfig, QualityConfig};
use durascribe_segmenter::SegmenterConfig;

use crate::error::{PipelineError, Result};

/// Recovery ladder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Chunk length for the smaller-chunks strategy, in seconds
    pub chunk_s: f64,

    /// Build the fallback model at startup instead of on first use
    pub prewarm_fallback: bool,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            chunk_s: 15.0,
            prewarm_fallback: false,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Concurrent segment workers (default: physical core count)
    pub workers: usize,

    /// Language hint passed to the recognizer, None auto-detects
    pub language: Option<String>,

    /// A segment whose processing time exceeds
    /// `audio duration * max_processing_ratio` counts as an overrun
    pub max_processing_ratio: f64,

    /// Whether an overrun alone sends a segment into recovery
    pub overrun_triggers_recovery: bool,

    /// Where to write batch statistics JSON, None disables the export
    pub stats_export: Option<PathBuf>,

    /// Silence-aware segment planning
    pub segmenter: SegmenterConfig,

    /// Repetition detection thresholds
    pub detector: DetectorConfig,

    /// Transcript quality scoring
    pub quality: QualityConfig,

    /// Recovery ladder settings
    pub recovery: RecoverySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            workers: default_workers(),
            language: None,
            max_processing_ratio: 2.0,
            overrun_triggers_recovery: true,
            stats_export: None,
            segmenter: SegmenterConfig::default(),
            detector: DetectorConfig::default(),
            quality: QualityConfig::default(),
            recovery: RecoverySettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default path, or create it
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: PipelineConfig = toml::from_str(&contents).map_err(|e| {
            PipelineError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Save configuration to its path
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, contents)?;
        Ok(())
    }

    /// Validate the whole configuration tree
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(PipelineError::config(format!(
                "workers must be at least 1, got {}",
                self.workers
            )));
        }
        if self.max_processing_ratio <= 0.0 || !self.max_processing_ratio.is_finite() {
            return Err(PipelineError::config(format!(
                "max_processing_ratio must be positive and finite, got {}",
                self.max_processing_ratio
            )));
        }
        if self.recovery.chunk_s <= 0.0 || !self.recovery.chunk_s.is_finite() {
            return Err(PipelineError::config(format!(
                "recovery.chunk_s must be positive and finite, got {}",
                self.recovery.chunk_s
            )));
        }
        if self.recovery.chunk_s > self.segmenter.max_segment_s {
            return Err(PipelineError::config(format!(
                "recovery.chunk_s ({}) must not exceed segmenter.max_segment_s ({})",
                self.recovery.chunk_s, self.segmenter.max_segment_s
            )));
        }
        self.segmenter
            .validate()
            .map_err(|e| PipelineError::config(e.to_string()))?;
        self.detector
            .validate()
            .map_err(|e| PipelineError::config(e.to_string()))?;
        self.quality
            .validate()
            .map_err(|e| PipelineError::config(e.to_string()))?;
        Ok(())
    }

    /// Get default config path
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("durascribe")
            .join("config.toml")
    }
}

/// Default worker count from the machine's physical cores
fn default_workers() -> usize {
    System::new()
        .physical_core_count()
        .unwrap_or(2)
        .max(1)
}
