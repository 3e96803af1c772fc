use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use parallel_transcriber::{
    DistributionStrategy, ParallelTranscriber, ProgressObserver, ProgressSnapshot,
    TranscriberConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    RoundRobin,
    LeastLoaded,
    FirstAvailable,
    Racing,
}

impl From<Strategy> for DistributionStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::RoundRobin => DistributionStrategy::RoundRobin,
            Strategy::LeastLoaded => DistributionStrategy::LeastLoaded,
            Strategy::FirstAvailable => DistributionStrategy::FirstAvailable,
            Strategy::Racing => DistributionStrategy::Racing,
        }
    }
}

#[derive(Parser)]
#[command(name = "parallel-transcribe")]
#[command(about = "Transcribe a media file in parallel across OpenAI Whisper and faster-whisper")]
struct Cli {
    /// Audio or video file to transcribe.
    input: Option<PathBuf>,

    /// JSON config file. Environment variables override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Spoken language (ISO-639-1, region suffixes are stripped).
    #[arg(short, long, default_value = "en")]
    language: String,

    /// Chunk length in seconds.
    #[arg(long)]
    chunk_seconds: Option<f64>,

    /// Overlap between consecutive chunks in seconds.
    #[arg(long)]
    overlap_seconds: Option<f64>,

    /// Concurrent chunks per provider.
    #[arg(long)]
    max_parallel: Option<usize>,

    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Probe both backends, print the availability report and exit.
    #[arg(long)]
    check: bool,

    /// Write the transcript JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config =
        TranscriberConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(secs) = cli.chunk_seconds {
        config.distribution.chunk_duration_seconds = secs;
    }
    if let Some(secs) = cli.overlap_seconds {
        config.distribution.chunk_overlap_seconds = secs;
    }
    if let Some(n) = cli.max_parallel {
        config.distribution.max_parallel_per_provider = n;
    }
    if let Some(strategy) = cli.strategy {
        config.distribution.strategy = strategy.into();
    }

    let transcriber =
        ParallelTranscriber::from_config(&config).context("Failed to build transcriber")?;

    if cli.check {
        let report = transcriber.check_availability().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let input = cli
        .input
        .context("An input file is required unless --check is given")?;
    let mut source = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling job");
            ctrl_c.cancel();
        }
    });

    let observer: Arc<dyn ProgressObserver> = Arc::new(|snap: &ProgressSnapshot| {
        info!(
            "[{:>3}%] {}",
            snap.progress_percentage(),
            snap.status_message
        );
    });

    info!("Transcribing {}", input.display());
    let transcript = transcriber
        .transcribe(
            &mut source,
            &cli.language,
            &config.distribution,
            Some(observer),
            &cancel,
        )
        .await?;

    let json = serde_json::to_string_pretty(&transcript)?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Transcript written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
