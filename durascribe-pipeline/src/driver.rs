//! Batch driver
//!
//! Owns the full flow for a batch of input files: preflight checks,
//! silence-aware segment planning, concurrent per-segment transcription
//! with first-pass quality gating, recovery for degenerate segments,
//! and in-order reassembly of the final transcripts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use durascribe_audio::{AudioToolkit, ScratchFiles};
use durascribe_segmenter::{AudioSegment, SilenceAwareSegmenter};
use durascribe_stt::{ModelBank, Recognizer, TranscribeOptions};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::PipelineEvent;
use crate::recovery::{RecoveryOrchestrator, RecoveryReason};
use crate::report::{BatchStats, FileReport, RunReport, SegmentRecord};

/// Cooperative cancellation flag shared across workers
///
/// Checked between segments and between recovery strategies; a
/// cancelled batch still returns the records finished so far.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives a batch of files through segmentation, transcription and
/// recovery
pub struct TranscriptionDriver {
    config: PipelineConfig,
    toolkit: Arc<dyn AudioToolkit>,
    bank: Arc<ModelBank>,
    orchestrator: Arc<RecoveryOrchestrator>,
    segmenter: SilenceAwareSegmenter,
    options: TranscribeOptions,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    cancel: CancelToken,
}

impl TranscriptionDriver {
    /// Create a driver
    ///
    /// # Arguments
    /// * `config` - Validated pipeline configuration
    /// * `toolkit` - Audio probing and extraction backend
    /// * `bank` - Primary recognizer plus lazy fallback
    pub fn new(
        config: PipelineConfig,
        toolkit: Arc<dyn AudioToolkit>,
        bank: Arc<ModelBank>,
    ) -> Result<Self> {
        config.validate()?;

        let orchestrator = RecoveryOrchestrator::new(
            Arc::clone(&toolkit),
            Arc::clone(&bank),
            config.detector.clone(),
            config.quality.clone(),
            config.recovery.chunk_s,
            config.language.clone(),
        )?;
        let segmenter = SilenceAwareSegmenter::new(config.segmenter.clone())?;
        let options = TranscribeOptions::primary().with_language(config.language.clone());

        Ok(Self {
            config,
            toolkit,
            bank,
            orchestrator: Arc::new(orchestrator),
            segmenter,
            options,
            events: None,
            cancel: CancelToken::new(),
        })
    }

    /// Attach an event channel for progress reporting
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token callers can use to cancel the batch from another task
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Verify every component before touching any input
    pub fn preflight(&self) -> Result<()> {
        self.toolkit
            .verify()
            .map_err(|e| PipelineError::preflight(e.to_string()))?;
        self.bank
            .healthcheck()
            .map_err(|e| PipelineError::preflight(format!("primary recognizer: {}", e)))?;

        if self.config.recovery.prewarm_fallback {
            if let Err(e) = self.bank.prewarm_fallback() {
                warn!("Fallback prewarm failed, will retry on first use: {}", e);
            }
        }
        Ok(())
    }

    /// Transcribe a batch of files
    ///
    /// Segments of a file run concurrently on up to `workers` blocking
    /// tasks; results are joined in segment order, so output is
    /// deterministic regardless of completion order.
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<RunReport> {
        let run_started = Instant::now();
        let started_at = chrono::Utc::now();

        self.preflight()?;
        info!(
            "Starting batch: {} file(s), {} worker(s)",
            inputs.len(),
            self.config.workers
        );
        self.emit(PipelineEvent::BatchStart {
            files: inputs.len(),
            timestamp: started_at.timestamp() as f64,
        });

        let mut files = Vec::with_capacity(inputs.len());
        for input in inputs {
            if self.cancel.is_cancelled() {
                warn!("Batch cancelled, skipping remaining inputs");
                break;
            }
            let report = self.process_file(input).await?;
            files.push(report);
        }

        let stats = BatchStats::from_files(&files);
        let elapsed_s = run_started.elapsed().as_secs_f64();
        self.emit(PipelineEvent::BatchDone {
            files: files.len(),
            recovery_episodes: stats.recovery_episodes,
            elapsed_s,
        });
        info!(
            "Batch finished in {:.1}s: {} segment(s), {} recovery episode(s)",
            elapsed_s, stats.segments, stats.recovery_episodes
        );

        let report = RunReport {
            started_at: started_at.to_rfc3339(),
            elapsed_s,
            cancelled: self.cancel.is_cancelled(),
            files,
            stats,
            recovery: self.orchestrator.session_snapshot(),
        };

        if let Some(path) = &self.config.stats_export {
            if let Err(e) = report.write_json(path) {
                warn!("Failed to write batch statistics: {}", e);
            }
        }

        Ok(report)
    }

    async fn process_file(&self, input: &Path) -> Result<FileReport> {
        let file_started = Instant::now();
        let duration_s = self.toolkit.duration(input)?;
        let plan = self.segmenter.plan(self.toolkit.as_ref(), input, duration_s);
        let path_label = input.display().to_string();

        info!(
            "Processing {}: {:.1}s of audio in {} segment(s)",
            path_label,
            duration_s,
            plan.segments.len()
        );
        self.emit(PipelineEvent::FileStart {
            path: path_label.clone(),
            duration_s,
            segments: plan.segments.len(),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut handles = Vec::with_capacity(plan.segments.len());
        for segment in plan.segments {
            let job = SegmentJob {
                segment,
                path_label: path_label.clone(),
                options: self.options.clone(),
                primary: self.bank.primary(),
                toolkit: Arc::clone(&self.toolkit),
                orchestrator: Arc::clone(&self.orchestrator),
                max_processing_ratio: self.config.max_processing_ratio,
                overrun_triggers_recovery: self.config.overrun_triggers_recovery,
                events: self.events.clone(),
                cancel: self.cancel.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::worker(e.to_string()))?;
                tokio::task::spawn_blocking(move || job.run())
                    .await
                    .map_err(|e| PipelineError::worker(e.to_string()))
            }));
        }

        // Joining in spawn order keeps the transcript deterministic
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            let record = handle
                .await
                .map_err(|e| PipelineError::worker(e.to_string()))??;
            records.push(record);
        }

        let transcript = join_transcripts(&records);
        let elapsed_s = file_started.elapsed().as_secs_f64();
        self.emit(PipelineEvent::FileDone {
            path: path_label,
            words: transcript.split_whitespace().count(),
            elapsed_s,
        });

        Ok(FileReport {
            path: input.to_path_buf(),
            duration_s,
            elapsed_s,
            segmentation: plan.stats,
            segments: records,
            transcript,
        })
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Everything one blocking worker needs for one segment
struct SegmentJob {
    segment: AudioSegment,
    path_label: String,
    options: TranscribeOptions,
    primary: Arc<dyn Recognizer>,
    toolkit: Arc<dyn AudioToolkit>,
    orchestrator: Arc<RecoveryOrchestrator>,
    max_processing_ratio: f64,
    overrun_triggers_recovery: bool,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
    cancel: CancelToken,
}

impl SegmentJob {
    fn run(self) -> SegmentRecord {
        if self.cancel.is_cancelled() {
            return SegmentRecord {
                segment_index: self.segment.sequence_index,
                duration_s: self.segment.duration,
                elapsed_s: 0.0,
                quality: 0.0,
                options_label: "cancelled".to_string(),
                reason: None,
                winning_strategy: None,
                attempts: 0,
                text: String::new(),
            };
        }

        let started = Instant::now();
        let record = match self.first_pass() {
            Ok(text) => {
                let elapsed_s = started.elapsed().as_secs_f64();
                match self.classify(&text, elapsed_s) {
                    None => {
                        let (quality, _) =
                            self.orchestrator.assess(&text, self.segment.duration);
                        SegmentRecord {
                            segment_index: self.segment.sequence_index,
                            duration_s: self.segment.duration,
                            elapsed_s,
                            quality,
                            options_label: self.options.label.clone(),
                            reason: None,
                            winning_strategy: None,
                            attempts: 0,
                            text,
                        }
                    }
                    Some(reason) => self.recover(reason, started),
                }
            }
            Err(e) => {
                warn!(
                    "First pass failed for segment {} of {}: {}",
                    self.segment.sequence_index, self.path_label, e
                );
                self.recover(RecoveryReason::RecognitionError, started)
            }
        };

        self.emit(PipelineEvent::SegmentDone {
            path: self.path_label.clone(),
            segment_index: record.segment_index,
            duration_s: record.duration_s,
            elapsed_s: record.elapsed_s,
            quality: record.quality,
            options_label: record.options_label.clone(),
            recovered: record.recovered(),
        });
        record
    }

    fn first_pass(&self) -> std::result::Result<String, String> {
        let mut scratch = ScratchFiles::new(Arc::clone(&self.toolkit));
        let path = self
            .toolkit
            .extract_segment(
                &self.segment.source_path,
                self.segment.start_offset,
                self.segment.duration,
            )
            .map_err(|e| e.to_string())?;
        scratch.adopt(path.clone());
        self.primary
            .transcribe(&path, &self.options)
            .map_err(|e| e.to_string())
    }

    /// Decide whether the first pass is good enough to keep
    fn classify(&self, text: &str, elapsed_s: f64) -> Option<RecoveryReason> {
        if text.trim().is_empty() {
            return Some(RecoveryReason::EmptyTranscript);
        }
        let (_, is_loop) = self.orchestrator.assess(text, self.segment.duration);
        if is_loop {
            return Some(RecoveryReason::LoopDetected);
        }
        if !self
            .orchestrator
            .quality_acceptable(text, self.segment.duration)
        {
            return Some(RecoveryReason::LowQuality);
        }
        if self.overrun_triggers_recovery
            && self.segment.duration > 0.0
            && elapsed_s > self.segment.duration * self.max_processing_ratio
        {
            return Some(RecoveryReason::Overrun);
        }
        None
    }

    fn recover(&self, reason: RecoveryReason, started: Instant) -> SegmentRecord {
        self.emit(PipelineEvent::RecoveryStart {
            path: self.path_label.clone(),
            segment_index: self.segment.sequence_index,
            reason: reason.to_string(),
        });

        let outcome = self
            .orchestrator
            .recover(&self.segment, reason, &self.cancel);

        self.emit(PipelineEvent::RecoveryDone {
            path: self.path_label.clone(),
            segment_index: self.segment.sequence_index,
            winning_strategy: outcome.winning_strategy.map(|s| s.to_string()),
            attempts: outcome.attempts.len(),
        });

        let (quality, _) = self.orchestrator.assess(&outcome.text, self.segment.duration);
        let options_label = outcome
            .attempts
            .last()
            .map(|a| a.options_label.clone())
            .unwrap_or_else(|| "emergency".to_string());

        SegmentRecord {
            segment_index: self.segment.sequence_index,
            duration_s: self.segment.duration,
            elapsed_s: started.elapsed().as_secs_f64(),
            quality,
            options_label,
            reason: Some(reason),
            winning_strategy: outcome.winning_strategy,
            attempts: outcome.attempts.len(),
            text: outcome.text,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Join segment texts in order, separated by blank lines
///
/// Empty and whitespace-only segments are skipped so silent stretches
/// do not leave stray separators in the transcript.
fn join_transcripts(records: &[SegmentRecord]) -> String {
    records
        .iter()
        .map(|r| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
