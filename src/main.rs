//! sync-studio
//!
//! Pairs an audio track with a still image, previews both and runs a
//! synchronization job that renders them into a video.

mod config;
mod logging;
mod media;
mod preview;
mod processing;
mod state;
mod sync;
mod ui;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

use config::Config;
use media::{MediaError, MediaInput, MediaKind};
use state::JobStatus;
use sync::{create_engine_channels, EngineCommand, EngineStatus, SyncEngine};

/// Command line options
#[derive(Debug, Default)]
struct CliOptions {
    audio: Option<PathBuf>,
    image: Option<PathBuf>,
    config: Option<PathBuf>,
    fail_with: Option<String>,
    json: bool,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = CliOptions::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            let mut value = |name: &str| {
                iter.next()
                    .cloned()
                    .with_context(|| format!("{} requires a value", name))
            };

            match arg.as_str() {
                "--audio" | "-a" => options.audio = Some(PathBuf::from(value("--audio")?)),
                "--image" | "-i" => options.image = Some(PathBuf::from(value("--image")?)),
                "--config" | "-c" => options.config = Some(PathBuf::from(value("--config")?)),
                "--fail" => options.fail_with = Some(value("--fail")?),
                "--json" => options.json = true,
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(options)
    }
}

/// How a run ended
#[derive(Debug)]
enum Outcome {
    Succeeded,
    Failed(String),
    Rejected(String),
    Interrupted,
}

/// Main entry point
fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = CliOptions::parse(&args[1..])?;

    // Keep the guard alive so file logs are flushed on exit
    let _log_guard = logging::init_logging()?;
    info!("sync-studio starting...");
    if let Ok(dir) = logging::get_log_dir() {
        info!("Writing logs to {:?}", dir);
    }

    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Ok(path) = config.config_path() {
        info!("Configuration loaded from {:?}", path);
    }

    if let Some(message) = &options.fail_with {
        config.processing.fail_with = Some(message.clone());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(run(config, options))?;

    match outcome {
        Outcome::Succeeded => {
            info!("Shutdown complete");
            Ok(())
        }
        Outcome::Failed(message) => bail!("Synchronization failed: {}", message),
        Outcome::Rejected(message) => bail!("{}", message),
        Outcome::Interrupted => {
            warn!("Interrupted before synchronization finished");
            Ok(())
        }
    }
}

async fn run(config: Config, options: CliOptions) -> Result<Outcome> {
    let processor = processing::create_processor(&config.processing);
    let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels(&config.engine);

    // Subscribe before any command is sent so no update is missed
    let outcome_rx = status_tx.subscribe();

    let mut engine = SyncEngine::new(processor, cmd_rx, status_tx);
    let engine_handle = tokio::spawn(async move { engine.run().await });
    let view_handle = tokio::spawn(ui::watch_status(status_rx, options.json));

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let handle = tokio::runtime::Handle::current();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        handle.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });
    })?;

    select_file(&cmd_tx, MediaKind::Audio, options.audio.as_ref()).await?;
    select_file(&cmd_tx, MediaKind::Image, options.image.as_ref()).await?;
    cmd_tx.send(EngineCommand::StartSync).await?;

    let outcome = wait_for_outcome(outcome_rx).await;
    info!("Synchronization finished: {:?}", outcome);
    report_result(&cmd_tx).await;

    // The engine may already be gone after Ctrl+C
    let _ = cmd_tx.send(EngineCommand::Dispose).await;
    let _ = cmd_tx.send(EngineCommand::Shutdown).await;

    match engine_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Sync engine error: {}", e),
        Err(e) => error!("Sync engine task failed: {}", e),
    }
    let _ = view_handle.await;

    Ok(outcome)
}

/// Load a file for a slot and hand it to the engine. Unreadable or
/// mismatched files are reported and leave the slot empty.
async fn select_file(
    cmd_tx: &mpsc::Sender<EngineCommand>,
    kind: MediaKind,
    path: Option<&PathBuf>,
) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    match MediaInput::from_file(kind, path).await {
        Ok(input) => {
            let cmd = match kind {
                MediaKind::Audio => EngineCommand::SelectAudio(input),
                MediaKind::Image => EngineCommand::SelectImage(input),
            };
            cmd_tx.send(cmd).await?;
        }
        Err(MediaError::KindMismatch { path, expected }) => {
            error!("{:?} was rejected: choose an {} file for the {} slot", path, expected, kind);
        }
        Err(e) => error!("Could not use {} file: {}", kind, e),
    }

    Ok(())
}

/// Log the rendered video, if any, before the state is disposed
async fn report_result(cmd_tx: &mpsc::Sender<EngineCommand>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    if cmd_tx.send(EngineCommand::Snapshot(reply_tx)).await.is_err() {
        return;
    }

    let Ok(snapshot) = reply_rx.await else {
        return;
    };

    if let (Some(result), Some(size)) = (snapshot.job.result, snapshot.job.result_bytes) {
        info!("Rendered video available as {} ({} bytes)", result, size);
    }
}

async fn wait_for_outcome(mut status_rx: broadcast::Receiver<EngineStatus>) -> Outcome {
    loop {
        match status_rx.recv().await {
            Ok(EngineStatus::Updated(snapshot)) if snapshot.job.status.is_terminal() => {
                return match snapshot.job.status {
                    JobStatus::Succeeded => Outcome::Succeeded,
                    _ => Outcome::Failed(snapshot.job.error.unwrap_or_default()),
                };
            }
            Ok(EngineStatus::Rejected(reason)) => return Outcome::Rejected(reason),
            Ok(EngineStatus::Stopped) | Err(broadcast::error::RecvError::Closed) => {
                return Outcome::Interrupted;
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}

fn print_help() {
    println!("sync-studio - Render an audio track and a still image into a video");
    println!();
    println!("USAGE:");
    println!("    sync-studio --audio <FILE> --image <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -a, --audio <FILE>    Audio file to synchronize");
    println!("    -i, --image <FILE>    Image file to synchronize");
    println!("    -c, --config <FILE>   Use this config file instead of the default");
    println!("        --fail <MESSAGE>  Make the processor fail with MESSAGE");
    println!("        --json            Print state snapshots as JSON lines");
    println!("    -h, --help            Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG              Set log level (e.g., debug, info, warn)");
    println!("    SYNC_STUDIO_LOG_PATH  Override the log directory");
}
