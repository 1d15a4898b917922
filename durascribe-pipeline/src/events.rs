//! Progress events emitted while a batch runs
//!
//! Events are published on an unbounded channel as JSON lines, one
//! object per line, so frontends and log shippers can follow a batch
//! without polling.

use serde::{Deserialize, Serialize};

/// Event types emitted by the pipeline
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Batch started
    #[serde(rename = "batch_start")]
    BatchStart { files: usize, timestamp: f64 },

    /// A file was segmented and queued
    #[serde(rename = "file_start")]
    FileStart {
        path: String,
        duration_s: f64,
        segments: usize,
    },

    /// A segment finished, possibly after recovery
    #[serde(rename = "segment_done")]
    SegmentDone {
        path: String,
        segment_index: usize,
        duration_s: f64,
        elapsed_s: f64,
        quality: f64,
        options_label: String,
        recovered: bool,
    },

    /// A degenerate segment entered the recovery ladder
    #[serde(rename = "recovery_start")]
    RecoveryStart {
        path: String,
        segment_index: usize,
        reason: String,
    },

    /// The recovery ladder finished for a segment
    #[serde(rename = "recovery_done")]
    RecoveryDone {
        path: String,
        segment_index: usize,
        winning_strategy: Option<String>,
        attempts: usize,
    },

    /// All segments of a file were joined
    #[serde(rename = "file_done")]
    FileDone {
        path: String,
        words: usize,
        elapsed_s: f64,
    },

    /// Batch finished
    #[serde(rename = "batch_done")]
    BatchDone {
        files: usize,
        recovery_episodes: usize,
        elapsed_s: f64,
    },
}

impl PipelineEvent {
    /// Convert event to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}
