//! Full-pipeline behavior without ffmpeg or real models
//!
//! Exercises the end-to-end recovery scenario, output ordering under
//! concurrent workers, cooperative cancellation, degraded segments and
//! the preflight gate.


use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use durascribe_audio::AudioToolkit;
use durascribe_pipeline::{
    CancelToken, PipelineConfig, PipelineEvent, RecoveryReason, RecoveryStrategy,
    TranscriptionDriver,
};
use durascribe_stt::{ModelBank, RecognitionError, Recognizer, TranscribeOptions};

use test_helpers::*;

fn config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        ..PipelineConfig::default()
    }
}

fn bank(primary: Arc<dyn Recognizer>) -> Arc<ModelBank> {
    bank_with_fallback(
        primary,
        recognizer(ScriptedRecognizer::new("fallback", |path, _| {
            Ok(clean_by_position(stub_start(path)))
        })),
    )
}

fn bank_with_fallback(primary: Arc<dyn Recognizer>, fallback: Arc<dyn Recognizer>) -> Arc<ModelBank> {
    Arc::new(ModelBank::new(
        primary,
        Box::new(move || Ok(Arc::clone(&fallback))),
    ))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A 400s recording segments into [0,170), [170,340), [340,400) on the
/// stubbed silences. The primary recognizer loops only on the last
/// segment, so exactly one recovery episode runs and the smaller-chunks
/// rung fixes it. The final transcript keeps every span in order.
#[tokio::test]
async fn pathological_segment_is_recovered_end_to_end() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![100.0, 170.0, 230.0, 340.0]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |path, _| {
        if stub_start(path) >= 339.0 && stub_duration(path) > 20.0 {
            Ok(loop_text())
        } else {
            Ok(clean_by_position(stub_start(path)))
        }
    }));
    let driver = TranscriptionDriver::new(
        config(2),
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank(primary),
    )
    .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let driver = driver.with_events(tx);

    let report = driver
        .run(&[PathBuf::from("/recordings/briefing.wav")])
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.stats.files, 1);
    assert_eq!(report.stats.segments, 3);
    assert_eq!(report.stats.recovery_episodes, 1, "exactly one episode");
    assert_eq!(report.stats.recovered_segments, 1);
    assert_eq!(report.stats.emergency_segments, 0);
    assert_eq!(
        report.stats.episodes_by_strategy.get("smaller_chunks"),
        Some(&1),
        "the winning strategy must be recorded"
    );
    assert_eq!(report.recovery.episodes, 1);
    assert_eq!(report.recovery.triggers.get("loop_detected"), Some(&1));
    assert_eq!(
        report.recovery.strategies.get("smaller_chunks").unwrap().successes,
        1
    );

    let file = &report.files[0];
    let bad = &file.segments[2];
    assert_eq!(bad.segment_index, 2);
    assert_eq!(bad.reason, Some(RecoveryReason::LoopDetected));
    assert_eq!(bad.winning_strategy, Some(RecoveryStrategy::SmallerChunks));
    assert_eq!(bad.attempts, 1, "first rung accepted, no escalation");
    assert!(file.segments[0].reason.is_none());
    assert!(file.segments[1].reason.is_none());

    // 340..400 re-read in 15s chunks: closing, closing, opening, opening
    let recovered = format!(
        "{} {} {} {}",
        clean_closing(),
        clean_closing(),
        clean_opening(),
        clean_opening()
    );
    let expected = format!(
        "{}\n\n{}\n\n{}",
        clean_opening(),
        clean_closing(),
        recovered
    );
    assert_eq!(file.transcript, expected, "spans must stay in segment order");

    // 3 first-pass extractions plus 4 recovery chunks, all released
    assert_eq!(toolkit.extracts(), 7);
    assert_eq!(toolkit.cleanups(), toolkit.extracts());

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(PipelineEvent::BatchStart { files: 1, .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::BatchDone { recovery_episodes: 1, .. })));
    let recovery_starts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RecoveryStart { segment_index, reason, .. } => {
                Some((*segment_index, reason.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(recovery_starts, vec![(2, "loop_detected".to_string())]);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::RecoveryDone { winning_strategy: Some(s), attempts: 1, .. }
            if s == "smaller_chunks"
    )));
}

fn piece_text(idx: usize) -> String {
    format!(
        "Piece number {idx} arrives now. The speaker keeps a steady pace. \
         Nothing unusual happens here."
    )
}

/// Eight 10s segments with deliberately shuffled per-segment latency
/// must still join byte-for-byte in segment order.
#[tokio::test]
async fn completion_order_does_not_affect_transcript_order() {
    let mut config = config(4);
    config.segmenter.max_segment_s = 10.0;
    config.recovery.chunk_s = 5.0;

    let toolkit = Arc::new(StubToolkit::new(80.0, vec![]));
    let delays_ms = [70u64, 10, 50, 30, 60, 0, 40, 20];
    let primary = recognizer(ScriptedRecognizer::new("primary", move |path, _| {
        let idx = (stub_start(path) / 10.0).round() as usize;
        std::thread::sleep(std::time::Duration::from_millis(delays_ms[idx % 8]));
        Ok(piece_text(idx))
    }));
    let driver = TranscriptionDriver::new(
        config,
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank(primary),
    )
    .unwrap();

    let report = driver
        .run(&[PathBuf::from("/recordings/ordered.wav")])
        .await
        .unwrap();

    let file = &report.files[0];
    assert_eq!(file.segments.len(), 8);
    let expected = (0..8).map(piece_text).collect::<Vec<_>>().join("\n\n");
    assert_eq!(file.transcript, expected);
    assert_eq!(report.stats.recovery_episodes, 0);
    for (i, record) in file.segments.iter().enumerate() {
        assert_eq!(record.segment_index, i);
    }
}

/// Cancelling mid-batch lets the in-flight segment finish and marks the
/// remaining ones instead of dropping them.
#[tokio::test]
async fn cancellation_mid_batch_marks_remaining_segments() {
    let mut config = config(1);
    config.segmenter.max_segment_s = 10.0;
    config.recovery.chunk_s = 5.0;

    let toolkit = Arc::new(StubToolkit::new(30.0, vec![]));
    let token_slot: Arc<Mutex<Option<CancelToken>>> = Arc::new(Mutex::new(None));
    let slot_in_script = Arc::clone(&token_slot);
    let primary = recognizer(ScriptedRecognizer::new("primary", move |path, _| {
        if let Some(token) = slot_in_script.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(clean_by_position(stub_start(path)))
    }));
    let driver = TranscriptionDriver::new(
        config,
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank(primary),
    )
    .unwrap();
    *token_slot.lock().unwrap() = Some(driver.cancel_token());

    let report = driver
        .run(&[PathBuf::from("/recordings/long.wav")])
        .await
        .unwrap();

    assert!(report.cancelled);
    let file = &report.files[0];
    assert_eq!(file.segments.len(), 3, "no segment is dropped");
    assert!(!file.segments[0].text.is_empty(), "in-flight segment finishes");
    for record in &file.segments[1..] {
        assert_eq!(record.options_label, "cancelled");
        assert!(record.text.is_empty());
    }
}

/// When every rung fails, the segment degrades to a placeholder and the
/// batch still completes.
#[tokio::test]
async fn exhausted_recovery_degrades_without_aborting() {
    let toolkit = Arc::new(StubToolkit::new(30.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, _| Ok(loop_text())));
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(|| Err(RecognitionError::unavailable("no fallback model"))),
    ));
    let driver = TranscriptionDriver::new(
        config(1),
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank,
    )
    .unwrap();

    let report = driver
        .run(&[PathBuf::from("/recordings/hopeless.wav")])
        .await
        .unwrap();

    assert_eq!(report.stats.segments, 1);
    assert_eq!(report.stats.recovery_episodes, 1);
    assert_eq!(report.stats.emergency_segments, 1);
    assert_eq!(
        report.stats.episodes_by_strategy.get("emergency_fallback"),
        Some(&1)
    );
    let record = &report.files[0].segments[0];
    assert!(record.emergency());
    assert!(record.text.starts_with("[transcription unavailable"));
    assert!(report.files[0].transcript.contains("hopeless.wav"));
    assert_eq!(toolkit.cleanups(), toolkit.extracts());
}

/// An unavailable recognizer aborts before any audio work starts.
#[tokio::test]
async fn failed_healthcheck_aborts_before_any_segment() {
    struct Unavailable;
    impl Recognizer for Unavailable {
        fn label(&self) -> String {
            "broken".to_string()
        }
        fn transcribe(
            &self,
            _path: &Path,
            _options: &TranscribeOptions,
        ) -> durascribe_stt::Result<String> {
            unreachable!("must never be reached past a failing healthcheck")
        }
        fn healthcheck(&self) -> durascribe_stt::Result<()> {
            Err(RecognitionError::unavailable("model file missing"))
        }
    }

    let toolkit = Arc::new(StubToolkit::new(60.0, vec![]));
    let driver = TranscriptionDriver::new(
        config(1),
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank(Arc::new(Unavailable)),
    )
    .unwrap();

    let err = driver
        .run(&[PathBuf::from("/recordings/any.wav")])
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("Preflight"),
        "expected a preflight failure, got: {err}"
    );
    assert_eq!(toolkit.extracts(), 0, "no segment work before preflight passes");
}

/// Prewarming builds the fallback model during preflight, off the
/// recovery critical path.
#[tokio::test]
async fn prewarm_builds_the_fallback_during_preflight() {
    let mut config = config(1);
    config.recovery.prewarm_fallback = true;

    let toolkit = Arc::new(StubToolkit::new(20.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |path, _| {
        Ok(clean_by_position(stub_start(path)))
    }));
    let bank = bank(primary);
    let driver = TranscriptionDriver::new(
        config,
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        Arc::clone(&bank),
    )
    .unwrap();

    assert!(!bank.fallback_ready());
    driver
        .run(&[PathBuf::from("/recordings/short.wav")])
        .await
        .unwrap();
    assert!(bank.fallback_ready(), "preflight should build the fallback");
}

/// The batch statistics export is valid JSON describing the run.
#[tokio::test]
async fn stats_export_writes_parseable_json() {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("reports").join("batch.json");

    let mut config = config(1);
    config.stats_export = Some(stats_path.clone());

    let toolkit = Arc::new(StubToolkit::new(200.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |path, _| {
        Ok(clean_by_position(stub_start(path)))
    }));
    let driver = TranscriptionDriver::new(
        config,
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank(primary),
    )
    .unwrap();

    driver
        .run(&[PathBuf::from("/recordings/exported.wav")])
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&stats_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["stats"]["segments"], 2, "200s splits into two segments");
    assert_eq!(json["stats"]["recovery_episodes"], 0);
    assert_eq!(json["recovery"]["episodes"], 0);
    assert_eq!(json["cancelled"], false);
}
