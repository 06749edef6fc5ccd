//! Gyromouse
//!
//! Main entry point: connects to the remote and drives the virtual pointer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use gyromouse::{GyromouseConfig, Pipeline, PipelineEvent, PipelineStats, ThreadScheduler};
use gyromouse_pointer::{LoggingSink, PointerSink, VirtualPointer};
use gyromouse_transport::{BoxedByteSource, ByteSource, MemoryTransport, TtyTransport};

#[derive(Parser)]
#[command(name = "gyromouse")]
#[command(about = "Use a gyroscope remote as a pointer")]
struct Cli {
    /// Config file path (default: ~/.config/gyromouse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the remote and drive the pointer
    Run {
        /// Device node (overrides device.path)
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// Log pointer output instead of creating a virtual device
        #[arg(long)]
        dry_run: bool,
    },
    /// Feed a raw capture through the pipeline
    Replay {
        file: PathBuf,

        /// Chunks delivered per second
        #[arg(long, default_value_t = 100)]
        rate_hz: u32,

        /// Bytes per chunk
        #[arg(long, default_value_t = 8)]
        chunk: usize,

        /// Log pointer output instead of creating a virtual device
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(GyromouseConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let config = GyromouseConfig::load(&config_path)?;
    config.validate()?;

    match cli.command {
        Command::Run { device, dry_run } => run(config, device, dry_run).await,
        Command::Replay {
            file,
            rate_hz,
            chunk,
            dry_run,
        } => replay(config, file, rate_hz, chunk, dry_run).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn create_sink(config: &GyromouseConfig, dry_run: bool) -> Result<Box<dyn PointerSink>> {
    if dry_run {
        info!("Dry run: pointer output is only logged");
        return Ok(Box::new(LoggingSink::new()));
    }

    let mut pointer =
        VirtualPointer::new(&config.pointer.device_name, config.pointer.screen_bounds())
            .context("creating virtual pointer (is /dev/uinput writable?)")?;
    info!("Created virtual pointer: {}", config.pointer.device_name);
    if let Some(path) = pointer.device_path() {
        info!("Device path: {}", path.display());
    }
    Ok(Box::new(pointer))
}

/// Drive the pointer from the RFCOMM link until Ctrl+C or a fatal error
async fn run(mut config: GyromouseConfig, device: Option<PathBuf>, dry_run: bool) -> Result<()> {
    if let Some(device) = device {
        config.device.path = device;
    }

    let sink = create_sink(&config, dry_run)?;
    let source: BoxedByteSource = Arc::new(TtyTransport::new(config.tty_config()));
    let pipeline = Pipeline::new(&config, source, sink, Arc::new(ThreadScheduler));
    let mut events = pipeline.subscribe();

    pipeline.start()?;
    info!("Waiting for the remote. Press Ctrl+C to exit.");

    let mut poll = tokio::time::interval(config.timing.watchdog_poll());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = poll.tick() => {
                pipeline.check_link(Instant::now());
                // A lagged receiver can miss the Fatal event itself
                if pipeline.is_failed() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(PipelineEvent::Fatal(reason)) => {
                    warn!("Stopping: {}", reason);
                    break;
                }
                Ok(event) => debug!("Pipeline event: {:?}", event),
                Err(RecvError::Lagged(n)) => debug!("Missed {} pipeline events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    finish(&pipeline)
}

/// Replay a raw capture at a fixed chunk rate
async fn replay(
    config: GyromouseConfig,
    file: PathBuf,
    rate_hz: u32,
    chunk: usize,
    dry_run: bool,
) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    info!("Replaying {} bytes from {}", data.len(), file.display());

    let sink = create_sink(&config, dry_run)?;
    let name = file.to_string_lossy();
    let transport = Arc::new(MemoryTransport::with_capacity(
        &name,
        config.protocol.buffer_capacity,
    ));
    let source: BoxedByteSource = transport.clone();
    let pipeline = Pipeline::new(&config, source, sink, Arc::new(ThreadScheduler));
    let mut events = pipeline.subscribe();

    pipeline.start()?;

    let period = Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)));
    let mut feed = tokio::time::interval(period);
    let mut poll = tokio::time::interval(config.timing.watchdog_poll());
    let mut chunks = data.chunks(chunk.max(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = feed.tick() => {
                let Some(bytes) = chunks.next() else {
                    info!("Capture exhausted");
                    break;
                };
                transport.feed(bytes);
            }
            _ = poll.tick() => {
                pipeline.check_link(Instant::now());
                // A lagged receiver can miss the Fatal event itself
                if pipeline.is_failed() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(PipelineEvent::Fatal(reason)) => {
                    warn!("Stopping: {}", reason);
                    break;
                }
                Ok(PipelineEvent::ReconnectRequested) => {
                    // The capture keeps playing; pick it up on a fresh link
                    transport.connect()?;
                }
                Ok(event) => debug!("Pipeline event: {:?}", event),
                Err(RecvError::Lagged(n)) => debug!("Missed {} pipeline events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    finish(&pipeline)
}

fn finish(pipeline: &Pipeline) -> Result<()> {
    pipeline.shutdown()?;
    log_stats(&pipeline.stats());

    match pipeline.take_fatal() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn log_stats(stats: &PipelineStats) {
    info!(
        "Decoded {} samples, {} alignments, {} misalignments, {} stale links",
        stats.samples_decoded, stats.alignments, stats.misalignments, stats.link_stale
    );
    if stats.sink_failures > 0 || stats.skipped_ticks > 0 || stats.backlog_bytes_dropped > 0 {
        info!(
            "{} sink failures, {} skipped ticks, {} backlog bytes dropped",
            stats.sink_failures, stats.skipped_ticks, stats.backlog_bytes_dropped
        );
    }
}
