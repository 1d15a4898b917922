//! Recovery ladder behavior without ffmpeg or real models
//!
//! Exercises strategy escalation, acceptance gating, fallback-model
//! caching, scratch-file accounting and the emergency rung.


use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use durascribe_analysis::{DetectorConfig, QualityConfig};
use durascribe_audio::AudioToolkit;
use durascribe_pipeline::{CancelToken, RecoveryOrchestrator, RecoveryReason, RecoveryStrategy};
use durascribe_segmenter::AudioSegment;
use durascribe_stt::{ModelBank, RecognitionError, Recognizer};

use test_helpers::*;

fn segment(start: f64, duration: f64, index: usize) -> AudioSegment {
    AudioSegment {
        source_path: PathBuf::from("/recordings/interview.wav"),
        start_offset: start,
        duration,
        sequence_index: index,
    }
}

fn orchestrator(
    toolkit: Arc<StubToolkit>,
    primary: Arc<dyn Recognizer>,
    fallback: Arc<dyn Recognizer>,
) -> RecoveryOrchestrator {
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(move || Ok(Arc::clone(&fallback))),
    ));
    RecoveryOrchestrator::new(
        toolkit as Arc<dyn AudioToolkit>,
        bank,
        DetectorConfig::default(),
        QualityConfig::default(),
        15.0,
        None,
    )
    .unwrap()
}

#[test]
fn smaller_chunks_wins_when_fresh_context_fixes_the_loop() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    // The primary loops on long reads but handles short chunks cleanly
    let primary = recognizer(ScriptedRecognizer::new("primary", |path, _| {
        if stub_duration(path) > 20.0 {
            Ok(loop_text())
        } else {
            Ok(clean_by_position(stub_start(path)))
        }
    }));
    let fallback = recognizer(ScriptedRecognizer::new("fallback", |_, _| Ok(clean_middle())));
    let orch = orchestrator(Arc::clone(&toolkit), primary, fallback);

    let outcome = orch.recover(
        &segment(100.0, 40.0, 1),
        RecoveryReason::LoopDetected,
        &CancelToken::new(),
    );

    assert!(outcome.recovered(), "chunked re-read should be accepted");
    assert_eq!(outcome.winning_strategy, Some(RecoveryStrategy::SmallerChunks));
    assert_eq!(outcome.attempts.len(), 1, "no further rungs after acceptance");
    assert!(
        outcome.text.contains("middle section") && outcome.text.contains("closing summary"),
        "joined text should contain every chunk: {}",
        outcome.text
    );
    assert_eq!(toolkit.extracts(), 3, "one extraction per 15s chunk of 40s");
    assert_eq!(
        toolkit.cleanups(),
        toolkit.extracts(),
        "every scratch file must be cleaned up"
    );
}

#[test]
fn fallback_model_is_built_once_across_episodes() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, _| Ok(loop_text())));

    let builds = Arc::new(AtomicUsize::new(0));
    let builds_in_factory = Arc::clone(&builds);
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(move || {
            builds_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(recognizer(ScriptedRecognizer::new("fallback", |path, _| {
                Ok(clean_by_position(stub_start(path)))
            })))
        }),
    ));
    let orch = RecoveryOrchestrator::new(
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank,
        DetectorConfig::default(),
        QualityConfig::default(),
        15.0,
        None,
    )
    .unwrap();

    let first = orch.recover(
        &segment(0.0, 30.0, 0),
        RecoveryReason::LoopDetected,
        &CancelToken::new(),
    );
    let second = orch.recover(
        &segment(30.0, 30.0, 1),
        RecoveryReason::LowQuality,
        &CancelToken::new(),
    );

    assert_eq!(first.winning_strategy, Some(RecoveryStrategy::AlternateModel));
    assert_eq!(second.winning_strategy, Some(RecoveryStrategy::AlternateModel));
    assert_eq!(
        first.attempts.len(),
        2,
        "smaller chunks should fail before the alternate model wins"
    );
    assert_eq!(
        builds.load(Ordering::SeqCst),
        1,
        "fallback model must be cached across episodes"
    );

    let session = orch.session_snapshot();
    assert_eq!(session.episodes, 2);
    assert_eq!(session.triggers.get("loop_detected"), Some(&1));
    assert_eq!(session.triggers.get("low_quality"), Some(&1));
    let chunks = session.strategies.get("smaller_chunks").unwrap();
    assert_eq!(chunks.attempts, 2);
    assert_eq!(chunks.successes, 0);
    let alternate = session.strategies.get("alternate_model").unwrap();
    assert_eq!(alternate.attempts, 2);
    assert_eq!(alternate.successes, 2);
    assert!(session.mean_episode_s >= 0.0);
}

#[test]
fn emergency_salvages_the_best_non_looping_attempt() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    // Conservative settings produce a mumble that is too short to accept
    // but is still better than a hole in the transcript
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, options| {
        if options.label == "conservative" {
            Ok("ok then".to_string())
        } else {
            Ok(loop_text())
        }
    }));
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(|| {
            Err(RecognitionError::unavailable(
                "fallback model file missing",
            ))
        }),
    ));
    let orch = RecoveryOrchestrator::new(
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank,
        DetectorConfig::default(),
        QualityConfig::default(),
        15.0,
        None,
    )
    .unwrap();

    let outcome = orch.recover(
        &segment(100.0, 40.0, 2),
        RecoveryReason::LoopDetected,
        &CancelToken::new(),
    );

    assert!(!outcome.recovered(), "nothing passed the acceptance gate");
    assert_eq!(outcome.winning_strategy, None);
    assert_eq!(
        outcome.attempts.len(),
        4,
        "three strategy rungs plus the emergency record"
    );
    assert_eq!(
        outcome.text, "ok then",
        "emergency should salvage the best non-looping text"
    );
    assert_eq!(outcome.attempts[3].options_label, "emergency");
}

#[test]
fn placeholder_keeps_the_transcript_hole_free() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, _| Ok(loop_text())));
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(|| Err(RecognitionError::unavailable("no fallback configured"))),
    ));
    let orch = RecoveryOrchestrator::new(
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank,
        DetectorConfig::default(),
        QualityConfig::default(),
        15.0,
        None,
    )
    .unwrap();

    let outcome = orch.recover(
        &segment(100.0, 40.0, 3),
        RecoveryReason::LowQuality,
        &CancelToken::new(),
    );

    assert!(!outcome.recovered());
    assert!(
        outcome.text.starts_with("[transcription unavailable"),
        "placeholder expected, got: {}",
        outcome.text
    );
    assert!(
        outcome.text.contains("interview.wav"),
        "placeholder should name the source file"
    );
    assert!(
        outcome.text.contains("100s-140s"),
        "placeholder should carry the segment span: {}",
        outcome.text
    );
    assert_eq!(outcome.attempts.len(), 4);
}

#[test]
fn recognizer_errors_degrade_to_the_next_rung() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, _| {
        Err(RecognitionError::failed("decoder crashed"))
    }));
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(|| Err(RecognitionError::unavailable("no fallback"))),
    ));
    let orch = RecoveryOrchestrator::new(
        Arc::clone(&toolkit) as Arc<dyn AudioToolkit>,
        bank,
        DetectorConfig::default(),
        QualityConfig::default(),
        15.0,
        None,
    )
    .unwrap();

    let outcome = orch.recover(
        &segment(0.0, 40.0, 0),
        RecoveryReason::RecognitionError,
        &CancelToken::new(),
    );

    assert!(!outcome.recovered());
    assert!(outcome.attempts[0].error.is_some(), "chunk rung records its error");
    assert!(outcome.attempts[1].error.is_some(), "alternate rung records its error");
    assert!(outcome.attempts[2].error.is_some(), "conservative rung records its error");
    assert!(outcome.text.starts_with("[transcription unavailable"));
    assert_eq!(
        toolkit.cleanups(),
        toolkit.extracts(),
        "scratch files must be cleaned even when every attempt errors"
    );

    let session = orch.session_snapshot();
    assert_eq!(session.episodes, 1);
    assert_eq!(
        session.strategies.get("emergency_fallback").unwrap().successes,
        1,
        "the emergency rung resolves an exhausted episode"
    );
}

#[test]
fn cancellation_skips_straight_to_the_emergency_rung() {
    let toolkit = Arc::new(StubToolkit::new(400.0, vec![]));
    let primary = recognizer(ScriptedRecognizer::new("primary", |_, _| {
        Ok(clean_opening())
    }));
    let fallback = recognizer(ScriptedRecognizer::new("fallback", |_, _| Ok(clean_middle())));
    let orch = orchestrator(Arc::clone(&toolkit), primary, fallback);

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = orch.recover(&segment(0.0, 40.0, 0), RecoveryReason::Overrun, &cancel);

    assert!(!outcome.recovered());
    assert_eq!(
        outcome.attempts.len(),
        1,
        "only the emergency record when cancelled up front"
    );
    assert!(outcome.text.starts_with("[transcription unavailable"));
    assert_eq!(toolkit.extracts(), 0, "no audio work after cancellation");
}
