//! diagnos-eeg - EEG screening service
//!
//! Screens multichannel EEG recordings (EDF) with a pretrained linear model
//! and returns a JSON report, over HTTP or from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP API (default command)
//! diagnos-eeg serve --addr 0.0.0.0:8080
//!
//! # Screen one file and print the report
//! diagnos-eeg analyze recording.edf
//!
//! # Show the EDF header and how many epochs the model would see
//! diagnos-eeg inspect recording.edf
//! ```
//!
//! # Environment Variables
//!
//! - `DIAGNOS_CONFIG`: Path to the TOML config (default: `./diagnos.toml`)
//! - `DIAGNOS_SERVER_ADDR`: Bind address override
//! - `DIAGNOS_MODEL_PATH`: Classifier model file override
//! - `GEMINI_API_KEY`: Narrative service key (name configurable)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use diagnos_eeg::acquisition::{decode_edf, parse_header};
use diagnos_eeg::api::{create_app, ApiState};
use diagnos_eeg::config::{defaults, BlobBackend, ServiceConfig};
use diagnos_eeg::knowledge::ConditionCatalog;
use diagnos_eeg::ml_engine::Classifier;
use diagnos_eeg::pipeline::{Orchestrator, StagingArea};
use diagnos_eeg::processing::EpochWindow;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "diagnos-eeg")]
#[command(about = "EEG screening service")]
#[command(version)]
struct CliArgs {
    /// TOML config file (overrides the $DIAGNOS_CONFIG / ./diagnos.toml search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Classifier model file
    #[arg(long, env = "DIAGNOS_MODEL_PATH", global = true)]
    model: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override the server address (default: "0.0.0.0:8080")
        #[arg(short, long, env = "DIAGNOS_SERVER_ADDR")]
        addr: Option<String>,
    },

    /// Screen one EDF file and print the report as JSON
    Analyze {
        file: PathBuf,

        /// Skip artifact upload and narrative generation
        #[arg(long)]
        offline: bool,
    },

    /// Print the EDF header, recording summary and epoch count
    Inspect { file: PathBuf },
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Logs go to stderr so `analyze` / `inspect` output stays pipeable.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut c = ServiceConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            c.apply_env_overrides();
            c
        }
        None => ServiceConfig::load(),
    };
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Load the model and wire every stage. A missing or invalid model is fatal.
fn build_orchestrator(config: &ServiceConfig) -> Result<Orchestrator> {
    let classifier = Classifier::load(Path::new(&config.model.path))
        .with_context(|| format!("Cannot start without a classifier ({})", config.model.path))?;
    let conditions = ConditionCatalog::load(config.conditions.file.as_deref().map(Path::new))
        .context("Failed to load condition texts")?;
    Orchestrator::from_config(Arc::new(classifier), config, conditions).context("Failed to initialise pipeline")
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(config: ServiceConfig, addr: Option<String>) -> Result<()> {
    let server_addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let orchestrator = Arc::new(build_orchestrator(&config)?);

    let state = ApiState::from_config(orchestrator, &config);
    let app = create_app(state, config.server.max_upload_mb * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!(
        addr = %server_addr,
        max_concurrent = config.server.max_concurrent_requests,
        max_upload_mb = config.server.max_upload_mb,
        "HTTP server listening"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Graceful shutdown complete");
    Ok(())
}

async fn analyze(mut config: ServiceConfig, file: &Path, offline: bool) -> Result<()> {
    if offline {
        config.artifacts.backend = BlobBackend::None;
        config.narrative.enabled = false;
    }
    StagingArea::new(None, defaults::UPLOAD_EXTENSION).check_name(&file.to_string_lossy())?;

    let orchestrator = build_orchestrator(&config)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let report = orchestrator
        .screen_bytes(bytes)
        .await
        .with_context(|| format!("Screening failed for {}", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn inspect(config: &ServiceConfig, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let header = parse_header(&bytes).context("Invalid EDF header")?;
    let recording = decode_edf(&bytes).context("Failed to decode EDF data")?;

    // Epoch geometry comes from the model contract when the model is loadable
    let (window_secs, overlap_secs) = match Classifier::load(Path::new(&config.model.path)) {
        Ok(c) => (c.contract().window_secs, c.contract().overlap_secs),
        Err(e) => {
            warn!(error = %e, "Model unavailable, using default epoch geometry");
            (defaults::WINDOW_SECS, defaults::OVERLAP_SECS)
        }
    };
    let geometry = EpochWindow::from_secs(recording.sample_rate(), window_secs, overlap_secs)?;

    let out = serde_json::json!({
        "header": header,
        "recording": recording.summary(),
        "epochs": {
            "window_samples": geometry.window(),
            "overlap_samples": geometry.overlap(),
            "count": geometry.epoch_count(recording.len()),
        },
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may live in .env during development
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(&args)?;

    match args.command {
        None => serve(config, None).await,
        Some(Command::Serve { addr }) => serve(config, addr).await,
        Some(Command::Analyze { file, offline }) => analyze(config, &file, offline).await,
        Some(Command::Inspect { file }) => inspect(&config, &file),
    }
}
