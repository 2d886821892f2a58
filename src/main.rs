use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use signalwatch::{server, watch, Settings, SnapshotStream};
use signalwatch_core::{BroadcastHub, Orchestrator, RecordedCountDetector, ReplaySource, WireFormat};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "signalwatch")]
#[command(about = "Adaptive traffic-signal pipeline with a live snapshot feed")]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded vehicle counts through the pipeline and serve snapshots
    Run(RunArgs),
    /// Connect to a running pipeline and print its snapshots
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// File of per-frame vehicle counts (whitespace or comma separated)
    #[arg(long)]
    counts: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to serve snapshots on (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Time between cycles (e.g., "33ms", "1s")
    #[arg(long)]
    frame_interval: Option<String>,

    /// Snapshot encoding on the wire
    #[arg(long)]
    format: Option<WireFormat>,
}

impl RunArgs {
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(ref addr) = self.listen {
            overrides.push(("server.listen_addr", addr.clone()));
        }
        if let Some(ref interval) = self.frame_interval {
            overrides.push(("pipeline.frame_interval", interval.clone()));
        }
        if let Some(format) = self.format {
            overrides.push(("server.wire_format", format.name().to_string()));
        }
        overrides
    }
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Pipeline address to connect to (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8765")]
    connect: String,

    /// Snapshot encoding used by the server
    #[arg(long, default_value = "json")]
    format: WireFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Run(args) => rt.block_on(run(args)),
        Command::Watch(args) => rt.block_on(run_watch(args)),
    }
}

/// Log to stderr so `watch` output on stdout stays clean
fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {}", level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let settings = Settings::load(args.config.as_deref(), &args.overrides())?;

    let source = ReplaySource::load(&args.counts)
        .with_context(|| format!("failed to load counts from {}", args.counts.display()))?;
    info!(path = %args.counts.display(), frames = source.len(), "loaded recording");

    let hub = Arc::new(BroadcastHub::new(settings.server.wire_format));
    let (listener, local) = server::bind(&settings.server.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {}", settings.server.listen_addr))?;
    info!(addr = %local, format = %hub.format(), "serving snapshots");

    let mut orchestrator = Orchestrator::new(
        source,
        RecordedCountDetector,
        hub.clone(),
        settings.pipeline_config(),
    );
    orchestrator.start()?;

    let mut server = tokio::spawn(server::serve(
        listener,
        hub.clone(),
        settings.server.subscriber_buffer,
    ));

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("shutting down");
            signal.context("failed to listen for Ctrl-C")
        }
        served = &mut server => {
            match served {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("snapshot server failed")),
                Err(e) => Err(anyhow::Error::new(e).context("snapshot server panicked")),
            }
        }
    };

    server.abort();
    tokio::task::spawn_blocking(move || orchestrator.stop())
        .await
        .context("failed to stop pipeline")?;

    info!(
        published = hub.published(),
        dropped_subscribers = hub.dropped(),
        "pipeline shut down"
    );
    if let Err(ref e) = outcome {
        error!(error = %e, "exiting with error");
    }
    outcome
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    let mut stream = SnapshotStream::connect(&args.connect, args.format)
        .await
        .with_context(|| format!("failed to connect to {}", args.connect))?;
    info!(addr = %args.connect, "connected");

    while let Some(received) = stream.next().await {
        if received.missed > 0 {
            warn!(
                missed = received.missed,
                at = received.snapshot.sequence_number,
                "gap in snapshot feed"
            );
        }
        println!("{}", watch::format_snapshot(&received.snapshot));
    }

    info!(
        missed = stream.missed_total(),
        malformed = stream.malformed(),
        incompatible = stream.incompatible(),
        "feed closed"
    );
    Ok(())
}
