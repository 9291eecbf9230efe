//! agentpulse - live observation of AI agent sessions
//!
//! Streams an agent runtime transcript (JSONL, one message per line) through
//! the producer/consumer pipeline and renders the resulting event frames as
//! they happen.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/agentpulse/agentpulse.log (~/.local/state/agentpulse/agentpulse.log)
//! - Config: $XDG_CONFIG_HOME/agentpulse/config.toml (~/.config/agentpulse/config.toml)

mod render;
mod transcript;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentpulse_core::protocol::encode_frame;
use agentpulse_core::Error as CoreError;
use agentpulse_core::{
    Config, ExecutionRegistry, RuntimeMessage, SessionOptions, SessionProducer, StreamConsumer,
};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;

use crate::transcript::TranscriptReader;

#[derive(Parser)]
#[command(name = "agentpulse")]
#[command(about = "Watch a live AI agent session")]
#[command(version)]
struct Args {
    /// Path to the agent runtime transcript (JSONL)
    transcript: PathBuf,

    /// Session id (defaults to the transcript file stem)
    #[arg(long)]
    session: Option<String>,

    /// Follow the transcript as it grows instead of replaying once
    #[arg(short, long)]
    follow: bool,

    /// Poll interval in milliseconds (only with --follow)
    #[arg(long, default_value = "500")]
    poll: u64,

    /// Emit raw frames as JSON lines instead of formatted output
    #[arg(long)]
    json: bool,

    /// Verbose output (-v also shows status and progress frames)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout is for the event stream)
    let _log_guard =
        agentpulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("agentpulse starting");

    let session_id = args.session.clone().unwrap_or_else(|| {
        args.transcript
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("session")
            .to_string()
    });

    if !args.json {
        println!("Transcript: {}", args.transcript.display());
        println!("Session:    {}", session_id);
    }

    // Set up signal handler for graceful shutdown in follow mode
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let registry = Arc::new(ExecutionRegistry::new());
    let opts = SessionOptions::from_config(session_id, &config.stream);
    let producer = SessionProducer::new(opts, registry);

    let (msg_tx, msg_rx) = mpsc::channel(256);
    let (frame_tx, mut frame_rx) = mpsc::channel(256);

    let reader = TranscriptReader::new(&args.transcript);
    tokio::spawn(pump_transcript(
        reader,
        msg_tx,
        args.follow,
        Duration::from_millis(args.poll),
        running,
    ));
    let producer_task = tokio::spawn(producer.run(msg_rx, frame_tx));

    // Fold frames into the consumer while rendering them, with a local timer
    // for slow-tool detection.
    let mut consumer = StreamConsumer::new(config.stream.slow_tool_threshold());
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(frame) => {
                    if args.json {
                        println!("{}", encode_frame(&frame).context("failed to encode frame")?);
                    } else {
                        let quiet = args.verbose == 0
                            && matches!(frame.event.kind(), "status" | "progress");
                        if !quiet {
                            if let Some(line) = render::format_frame(&frame) {
                                println!("{}", line);
                            }
                        }
                    }
                    consumer.handle_frame(frame);
                    if consumer.done {
                        break;
                    }
                }
                None => {
                    consumer.finish();
                    break;
                }
            },
            _ = ticker.tick() => {
                consumer.scan_slow(chrono::Utc::now());
            }
        }
    }

    let outcome = producer_task.await.context("producer task panicked")?;
    tracing::info!(?outcome, "agentpulse finished");

    if !args.json {
        render::print_summary(&consumer);
    }

    Ok(())
}

/// Pump transcript lines into the producer's message channel.
///
/// In replay mode the channel closes after one pass, which lets the producer
/// finish the session. In follow mode the file is polled until Ctrl+C.
async fn pump_transcript(
    mut reader: TranscriptReader,
    tx: mpsc::Sender<Result<RuntimeMessage, CoreError>>,
    follow: bool,
    poll: Duration,
    running: Arc<AtomicBool>,
) {
    loop {
        let lines = match reader.read_new_lines() {
            Ok(lines) => lines,
            Err(e) => {
                tracing::error!(error = %e, path = %reader.path().display(), "transcript read failed");
                let _ = tx.send(Err(CoreError::Runtime(e.to_string()))).await;
                return;
            }
        };

        for line in lines {
            // Malformed lines are skipped with a warning, not fatal
            if let Some(msg) = RuntimeMessage::from_json_line(&line) {
                if tx.send(Ok(msg)).await.is_err() {
                    return;
                }
            }
        }

        if !follow || !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(poll).await;
    }
}
