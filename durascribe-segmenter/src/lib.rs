//! Silence-aware segmentation for Durascribe
//!
//! Splits long audio into bounded-duration segments, cutting on detected
//! silence where possible and on hard time boundaries where not. The
//! duration bound is non-negotiable; silence alignment is best effort.
//!
//! ## Quick Start
//!
//! ```no_run
//! use durascribe_audio::FfmpegToolkit;
//! use durascribe_segmenter::{SegmenterConfig, SilenceAwareSegmenter};
//! use std::path::Path;
//!
//! let toolkit = FfmpegToolkit::new()?;
//! let segmenter = SilenceAwareSegmenter::new(SegmenterConfig::default())?;
//! let plan = segmenter.plan(&toolkit, Path::new("meeting.wav"), 3600.0);
//! println!("{} segments, {} forced cuts", plan.segments.len(), plan.stats.forced_cuts);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod planner;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use error::{Result, SegmenterError};
pub use planner::SilenceAwareSegmenter;

/// One silence-detection pass configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionTier {
    /// Noise floor in dB handed to the detector
    pub threshold_db: f64,
    /// Minimum gap length in seconds that counts as silence
    pub min_silence_s: f64,
}

impl DetectionTier {
    /// Create a tier
    pub fn new(threshold_db: f64, min_silence_s: f64) -> Self {
        Self {
            threshold_db,
            min_silence_s,
        }
    }
}

/// Segmentation settings
///
/// Tiers run strictest first; each scan window uses the first tier that
/// yields a candidate inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Upper bound on any emitted segment's duration, in seconds
    pub max_segment_s: f64,
    /// Ordered silence-detection tiers, progressively more permissive
    pub tiers: Vec<DetectionTier>,
    /// Trailing remainders shorter than this merge into the previous segment
    pub min_tail_s: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_s: 180.0,
            tiers: vec![
                DetectionTier::new(-40.0, 0.5),
                DetectionTier::new(-35.0, 0.7),
                DetectionTier::new(-30.0, 1.0),
            ],
            min_tail_s: 2.0,
        }
    }
}

impl SegmenterConfig {
    /// Set the segment duration bound
    pub fn with_max_segment_s(mut self, seconds: f64) -> Self {
        self.max_segment_s = seconds;
        self
    }

    /// Replace the detection tier ladder
    pub fn with_tiers(mut self, tiers: Vec<DetectionTier>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Set the trailing-remainder merge threshold
    pub fn with_min_tail_s(mut self, seconds: f64) -> Self {
        self.min_tail_s = seconds;
        self
    }

    /// Validate bounds and tier parameters
    pub fn validate(&self) -> Result<()> {
        if !self.max_segment_s.is_finite() || self.max_segment_s <= 0.0 {
            return Err(SegmenterError::config(format!(
                "max_segment_s must be positive, got {}",
                self.max_segment_s
            )));
        }
        if !self.min_tail_s.is_finite() || self.min_tail_s < 0.0 {
            return Err(SegmenterError::config(format!(
                "min_tail_s must be non-negative, got {}",
                self.min_tail_s
            )));
        }
        if self.min_tail_s >= self.max_segment_s {
            return Err(SegmenterError::config(
                "min_tail_s must be smaller than max_segment_s",
            ));
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if !tier.min_silence_s.is_finite() || tier.min_silence_s <= 0.0 {
                return Err(SegmenterError::config(format!(
                    "tier {i}: min_silence_s must be positive, got {}",
                    tier.min_silence_s
                )));
            }
            if !tier.threshold_db.is_finite() {
                return Err(SegmenterError::config(format!(
                    "tier {i}: threshold_db must be finite"
                )));
            }
        }
        Ok(())
    }
}

/// A bounded-duration slice of the source audio
///
/// Immutable once planned. `sequence_index` values are contiguous from 0
/// and define final transcript order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Source file the slice refers to
    pub source_path: PathBuf,
    /// Seconds from the start of the source
    pub start_offset: f64,
    /// Slice length in seconds
    pub duration: f64,
    /// Position in the final transcript
    pub sequence_index: usize,
}

impl AudioSegment {
    /// End offset of the slice in seconds
    pub fn end(&self) -> f64 {
        self.start_offset + self.duration
    }
}

/// Observability counters from one planning pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationStats {
    /// Segments emitted
    pub segment_count: usize,
    /// Sum of segment durations in seconds
    pub total_duration: f64,
    /// Mean segment duration in seconds
    pub average_duration: f64,
    /// Longest segment duration in seconds
    pub max_duration: f64,
    /// Cuts forced at the duration bound with no usable silence
    pub forced_cuts: usize,
    /// Raw segments re-split by the fallback splitter
    pub oversized_splits: usize,
    /// Short trailing remainders merged into their predecessor
    pub merged_tails: usize,
    /// Windows resolved per tier, aligned with the configured tier list
    pub tier_hits: Vec<usize>,
}

/// Ordered segments plus the statistics of the pass that produced them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentPlan {
    /// Segments in `sequence_index` order
    pub segments: Vec<AudioSegment>,
    /// Counters for logging and the run report
    pub stats: SegmentationStats,
}
