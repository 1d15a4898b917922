//! Durascribe - reliability-first batch transcription
//!
//! Segments long recordings on silence, transcribes segments
//! concurrently, catches hallucination loops and low-quality output,
//! and recovers degenerate segments through a fixed strategy ladder so
//! every run ends with a complete transcript.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use durascribe_audio::{AudioToolkit, FfmpegToolkit};
use durascribe_pipeline::{PipelineConfig, PipelineEvent, TranscriptionDriver};
use durascribe_stt::{CommandRecognizer, ModelBank, Recognizer};

#[derive(Parser)]
#[command(
    name = "durascribe",
    version,
    about = "Reliability-first batch transcription of long audio files"
)]
struct Cli {
    /// Audio files to transcribe
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for transcript .txt files (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (default: ~/.config/durascribe/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Concurrent segment workers (default: physical core count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Language hint for the recognizer, e.g. "pt" or "en"
    #[arg(short, long)]
    language: Option<String>,

    /// Primary recognizer command template, must reference {input}
    ///
    /// Example: "whisper-cli -m base.bin -f {input} --beam-size {beam_size}"
    #[arg(long)]
    recognizer_cmd: String,

    /// Fallback recognizer command template (defaults to the primary)
    #[arg(long)]
    fallback_cmd: Option<String>,

    /// Write batch statistics JSON to this path
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Maximum segment length in seconds
    #[arg(long)]
    max_segment: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    info!("🎙️ Durascribe v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from(path).context("Failed to load configuration")?,
        None => PipelineConfig::load().context("Failed to load configuration")?,
    };
    info!(
        "📋 Configuration loaded from {}",
        config.config_path.display()
    );

    // CLI overrides
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(language) = &cli.language {
        config.language = Some(language.clone());
    }
    if let Some(max_segment) = cli.max_segment {
        config.segmenter.max_segment_s = max_segment;
    }
    if let Some(path) = &cli.stats_json {
        config.stats_export = Some(path.clone());
    }

    // Audio tooling
    let toolkit: Arc<dyn AudioToolkit> =
        Arc::new(FfmpegToolkit::new().context("Failed to initialize audio tooling")?);

    // Recognizers
    let primary: Arc<dyn Recognizer> = Arc::new(
        CommandRecognizer::from_template("primary", &cli.recognizer_cmd)
            .context("Invalid --recognizer-cmd template")?,
    );
    let fallback_template = cli
        .fallback_cmd
        .clone()
        .unwrap_or_else(|| cli.recognizer_cmd.clone());
    let bank = Arc::new(ModelBank::new(
        primary,
        Box::new(move || {
            Ok(Arc::new(CommandRecognizer::from_template(
                "fallback",
                &fallback_template,
            )?) as Arc<dyn Recognizer>)
        }),
    ));

    // Progress events as JSON lines on the debug log
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(line) = event.to_json_line() {
                debug!("{}", line.trim_end());
            }
        }
    });

    let driver = Arc::new(
        TranscriptionDriver::new(config, toolkit, bank)
            .context("Failed to initialize pipeline")?
            .with_events(event_tx),
    );
    let cancel = driver.cancel_token();

    info!("🚀 Processing {} input file(s)", cli.inputs.len());

    let run_driver = Arc::clone(&driver);
    let inputs = cli.inputs.clone();
    let mut run_task = tokio::spawn(async move { run_driver.run(&inputs).await });

    let report = tokio::select! {
        result = &mut run_task => {
            result.context("Pipeline task panicked")??
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 Received shutdown signal, finishing in-flight segments...");
            cancel.cancel();
            run_task.await.context("Pipeline task panicked")??
        }
    };

    // Write transcripts
    for file in &report.files {
        match &cli.output {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                let stem = file
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "transcript".to_string());
                let out_path = dir.join(format!("{}.txt", stem));
                std::fs::write(&out_path, &file.transcript)
                    .with_context(|| format!("Failed to write {}", out_path.display()))?;
                info!("📝 {} → {}", file.path.display(), out_path.display());
            }
            None => {
                println!("===== {} =====", file.path.display());
                println!("{}", file.transcript);
                println!();
            }
        }
    }

    info!(
        "✓ {} file(s), {} segment(s), {} recovery episode(s) in {:.1}s",
        report.files.len(),
        report.stats.segments,
        report.stats.recovery_episodes,
        report.elapsed_s
    );
    if report.cancelled {
        warn!("⚠️ Batch was cancelled; transcripts may be partial");
    }

    Ok(())
}
