//! knitctl - command-line front end for the knitting-machine controller.
//!
//! Thin wrapper around the `knitpi_link` transport: parses arguments, runs
//! one command (or the status watch loop) and prints the controller's JSON
//! answers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knitpi_link::config::ClientConfig;
use knitpi_link::controller::Controller;
use knitpi_link::ipc::{EditMode, KnitClient, MockEvent, RepeatMode, TransportError};
use knitpi_link::models::Acknowledgement;

/// Carriage sweep range used by `move`.
const SWEEP_START: i64 = 50;
const SWEEP_END: i64 = 150;
const SWEEP_STEP_DELAY: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "knitctl")]
#[command(about = "Control a knitting-machine controller over its Unix socket")]
#[command(version)]
struct Cli {
    /// Controller socket path (overrides config file and KNITPI_SOCKET)
    #[arg(long, short)]
    socket: Option<PathBuf>,

    /// JSON config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the machine status once
    Status,

    /// Print status continuously, long-polling the controller
    Watch {
        /// Stop after this many status updates
        #[arg(long)]
        count: Option<usize>,
    },

    /// Print hardware information
    Hwinfo,

    /// Download the current pattern as PNG
    GetPattern {
        /// One pixel per stitch instead of the rendered preview
        #[arg(long)]
        raw: bool,

        /// Output file
        #[arg(long, short, default_value = "pattern.png")]
        file: PathBuf,
    },

    /// Upload a PNG pattern
    SetPattern {
        /// Input file
        #[arg(long, short, default_value = "pattern.png")]
        file: PathBuf,

        /// X offset in pixels
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        xoffset: i32,

        /// Y offset in pixels
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        yoffset: i32,

        /// Merge onto the current pattern instead of replacing it
        #[arg(long)]
        merge: bool,
    },

    /// Edit the loaded pattern (clr, trim, center)
    Edit { mode: EditMode },

    /// Jump to a pattern row
    SetRow {
        #[arg(allow_negative_numbers = true)]
        row: i32,
    },

    /// Shift the pattern along the needle bed
    SetOffset {
        #[arg(allow_negative_numbers = true)]
        offset: i32,
    },

    /// Enable or disable knitting
    KnitMode { state: Switch },

    /// Behavior after the last row (oneshot, repeat, manual)
    RepeatMode { mode: RepeatMode },

    /// Sweep the simulated carriage across the bed (mock hardware only)
    Move { direction: Direction },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    /// Left to right
    Lr,
    /// Right to left
    Rl,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "knitpi_link=info,knitctl=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Merge config file, environment and flags.
fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();

    if let Some(socket) = &cli.socket {
        config.socket_path = socket.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = Some(timeout_ms);
    }
    Ok(config)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an acknowledgement, flagging controller-side refusals.
fn print_ack(value: &Value) -> Result<()> {
    if let Ok(ack) = Acknowledgement::from_value(value.clone()) {
        if !ack.is_ok() {
            tracing::warn!("Controller refused command: {}", ack.message);
        }
    }
    print_json(value)
}

/// Attach the classified error kind to a transport failure.
fn report(err: TransportError) -> anyhow::Error {
    let kind = err.kind();
    anyhow::Error::new(err).context(format!("controller request failed ({})", kind))
}

async fn run_watch(controller: &Controller, count: Option<usize>) -> Result<()> {
    let mut watcher = controller.watcher();
    let mut printed = 0usize;

    loop {
        match watcher.next_status().await {
            Ok(status) => {
                print_json(&status)?;
                printed += 1;
                if count.is_some_and(|limit| printed >= limit) {
                    return Ok(());
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Status poll failed");
                if let Some(last) = watcher.last_error() {
                    println!("Last error: {}", last);
                }
            }
        }
    }
}

async fn run_sweep(client: &mut KnitClient, direction: Direction) -> Result<()> {
    let positions: Box<dyn Iterator<Item = i64>> = match direction {
        Direction::Lr => Box::new(SWEEP_START..=SWEEP_END),
        Direction::Rl => Box::new((SWEEP_START..=SWEEP_END).rev()),
    };

    for position in positions {
        let ack = client
            .mock_hardware(MockEvent::SetPosition, position)
            .await
            .map_err(report)?;
        print_ack(&ack)?;
        tokio::time::sleep(SWEEP_STEP_DELAY).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    tracing::debug!(socket = %config.socket_path.display(), "Using controller socket");

    let controller = Controller::new(config);
    let mut client = controller.client();

    match cli.command {
        Commands::Status => {
            let status = client.get_status(0).await.map_err(report)?;
            print_json(&status)?;
        }
        Commands::Watch { count } => run_watch(&controller, count).await?,
        Commands::Hwinfo => {
            let info = client.get_hardware_info().await.map_err(report)?;
            print_json(&info)?;
        }
        Commands::GetPattern { raw, file } => {
            let png = client.get_pattern(raw).await.map_err(report)?;
            std::fs::write(&file, &png)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Received {} bytes into {}.", png.len(), file.display());
        }
        Commands::SetPattern {
            file,
            xoffset,
            yoffset,
            merge,
        } => {
            let png = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let ack = client
                .set_pattern(xoffset, yoffset, merge, &png)
                .await
                .map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::Edit { mode } => {
            let ack = client.edit_pattern(mode).await.map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::SetRow { row } => {
            let ack = client.set_row(row).await.map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::SetOffset { offset } => {
            let ack = client.set_offset(offset).await.map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::KnitMode { state } => {
            let ack = client
                .set_knitting_mode(matches!(state, Switch::On))
                .await
                .map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::RepeatMode { mode } => {
            let ack = client.set_repeat_mode(mode).await.map_err(report)?;
            print_ack(&ack)?;
        }
        Commands::Move { direction } => run_sweep(&mut client, direction).await?,
    }

    Ok(())
}
