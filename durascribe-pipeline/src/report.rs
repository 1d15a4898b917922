//! Run reports and batch statistics

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use statistical::{mean, median};
use tracing::info;

use durascribe_segmenter::SegmentationStats;

use crate::error::Result;
use crate::recovery::{RecoveryReason, RecoverySessionSnapshot, RecoveryStrategy};

/// Outcome of one segment
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    /// Position in the final transcript
    pub segment_index: usize,
    /// Audio length in seconds
    pub duration_s: f64,
    /// Wall-clock seconds spent on the segment, recovery included
    pub elapsed_s: f64,
    /// Quality score of the final text
    pub quality: f64,
    /// Decode profile that produced the final text
    pub options_label: String,
    /// Why the segment entered recovery, None for a clean first pass
    pub reason: Option<RecoveryReason>,
    /// Strategy whose transcript was accepted
    pub winning_strategy: Option<RecoveryStrategy>,
    /// Number of recovery attempts, 0 for a clean first pass
    pub attempts: usize,
    /// Final transcript text, excluded from stats exports
    #[serde(skip)]
    pub text: String,
}

impl SegmentRecord {
    /// Whether the segment entered the recovery ladder
    pub fn entered_recovery(&self) -> bool {
        self.reason.is_some()
    }

    /// Whether recovery produced an accepted transcript
    pub fn recovered(&self) -> bool {
        self.reason.is_some() && self.winning_strategy.is_some()
    }

    /// Whether the segment ended on emergency best-effort text
    pub fn emergency(&self) -> bool {
        self.reason.is_some() && self.winning_strategy.is_none()
    }
}

/// Outcome of one input file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Input path
    pub path: PathBuf,
    /// Audio duration in seconds
    pub duration_s: f64,
    /// Wall-clock seconds spent on the file
    pub elapsed_s: f64,
    /// Segment planning counters
    pub segmentation: SegmentationStats,
    /// Per-segment outcomes in transcript order
    pub segments: Vec<SegmentRecord>,
    /// Joined transcript, excluded from stats exports
    #[serde(skip)]
    pub transcript: String,
}

/// Batch-level aggregates
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub files: usize,
    pub segments: usize,
    /// Segments that entered the recovery ladder
    pub recovery_episodes: usize,
    /// Episodes that ended with an accepted transcript
    pub recovered_segments: usize,
    /// Episodes that ended on emergency best-effort text
    pub emergency_segments: usize,
    pub mean_quality: f64,
    pub median_quality: f64,
    /// Mean of elapsed/duration across segments
    pub mean_processing_ratio: f64,
    /// Accepted episodes keyed by winning strategy name
    pub episodes_by_strategy: HashMap<String, usize>,
}

impl BatchStats {
    /// Aggregate statistics over all file reports
    pub fn from_files(files: &[FileReport]) -> Self {
        let mut stats = BatchStats {
            files: files.len(),
            ..Default::default()
        };

        let mut qualities: Vec<f64> = Vec::new();
        let mut ratios: Vec<f64> = Vec::new();

        for file in files {
            for record in &file.segments {
                stats.segments += 1;
                qualities.push(record.quality);
                if record.duration_s > 0.0 {
                    ratios.push(record.elapsed_s / record.duration_s);
                }
                if record.entered_recovery() {
                    stats.recovery_episodes += 1;
                    match record.winning_strategy {
                        Some(strategy) => {
                            stats.recovered_segments += 1;
                            *stats
                                .episodes_by_strategy
                                .entry(strategy.to_string())
                                .or_insert(0) += 1;
                        }
                        None => {
                            stats.emergency_segments += 1;
                            *stats
                                .episodes_by_strategy
                                .entry(RecoveryStrategy::EmergencyFallback.to_string())
                                .or_insert(0) += 1;
                        }
                    }
                }
            }
        }

        if !qualities.is_empty() {
            stats.mean_quality = mean(&qualities);
            stats.median_quality = median(&qualities);
        }
        if !ratios.is_empty() {
            stats.mean_processing_ratio = mean(&ratios);
        }

        stats
    }
}

/// Full outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the batch started, RFC 3339
    pub started_at: String,
    /// Total wall-clock seconds
    pub elapsed_s: f64,
    /// Whether the batch was cancelled before finishing
    pub cancelled: bool,
    /// Per-file outcomes
    pub files: Vec<FileReport>,
    /// Batch aggregates
    pub stats: BatchStats,
    /// Per-strategy recovery tallies for the whole run
    pub recovery: RecoverySessionSnapshot,
}

impl RunReport {
    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::PipelineError::worker(e.to_string()))?;
        std::fs::write(path, json)?;
        info!("Batch statistics written to {}", path.display());
        Ok(())
    }
}
