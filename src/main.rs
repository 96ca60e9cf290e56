mod actuator;
mod cloud;
mod collectors;
mod config;
mod idle;
mod metadata;
mod sampler;

use actuator::{ActuatorError, Decision};
use chrono::Utc;
use clap::error::ErrorKind;
use clap::Parser;
use cloud::{CloudError, NotebookControl, SageMakerControl};
use collectors::sessions::SessionsError;
use config::{Config, DEFAULT_METADATA_PATH, DEFAULT_PORT};
use metadata::MetadataError;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: i32 = 1;
const EXIT_MISSING_CONFIG: i32 = 2;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "autostop")]
#[command(version)]
#[command(about = "Stops this notebook instance once it has been idle long enough")]
struct Cli {
    /// Auto stop time in seconds
    #[arg(short = 't', long = "time")]
    time: u64,
    /// Jupyter port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Stop the notebook once idle, ignore connected users
    #[arg(short = 'c', long)]
    ignore_connections: bool,
    /// Skip TLS certificate validation on the local Jupyter API
    #[arg(long)]
    insecure: bool,
    /// Path to the SageMaker resource metadata file
    #[arg(long, default_value = DEFAULT_METADATA_PATH)]
    metadata_file: PathBuf,
}

#[derive(Debug, Error)]
enum RunError {
    #[error("failed to build HTTP client: {0}")]
    Http(reqwest::Error),
    #[error(transparent)]
    Sessions(#[from] SessionsError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = parse_cli();
    let cfg = match Config::new(
        cli.time,
        cli.port,
        cli.ignore_connections,
        cli.insecure,
        cli.metadata_file,
    ) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(EXIT_USAGE);
        }
    };

    if let Err(err) = run(&cfg).await {
        error!(error = %err, "autostop check failed");
        std::process::exit(1);
    }
}

/// One linear decision cycle; every collaborator failure aborts it.
async fn run(cfg: &Config) -> Result<(), RunError> {
    let client = Client::builder()
        .user_agent(concat!("autostop/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(cfg.accept_invalid_certs)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(RunError::Http)?;

    let sessions = collectors::sessions::fetch_sessions(&client, cfg.port).await?;
    let instance = metadata::instance_name(&cfg.metadata_path)?;
    let cloud = SageMakerControl::connect().await;
    let last_modified = cloud.last_modified(&instance).await?;

    let now = Utc::now();
    let records =
        collectors::collect_activity(&sessions, last_modified, now, cfg.ignore_connections)?;
    let decision = actuator::run_check(
        &cloud,
        &instance,
        &records,
        cfg.idle_seconds,
        sampler::sample_load,
        now,
    )
    .await?;

    match decision {
        Decision::Active {
            source,
            last_activity,
        } => info!(
            instance = %instance,
            source = %source,
            last_activity = %last_activity,
            "instance was recently active, leaving it running"
        ),
        Decision::LoadTooHigh {
            command,
            cpu_percent,
        } => info!(
            instance = %instance,
            command = %command,
            cpu_percent,
            threshold = actuator::CPU_IDLE_THRESHOLD_PERCENT,
            "idle threshold passed but load is too high, leaving it running"
        ),
        Decision::Stopped {
            idle_secs,
            command,
            cpu_percent,
        } => info!(
            instance = %instance,
            idle_for = %humantime::format_duration(Duration::from_secs(idle_secs.max(0) as u64)),
            command = %command,
            cpu_percent,
            "instance is idle, stop requested"
        ),
    }

    Ok(())
}

/// CLI parsing with the exit-code taxonomy of the original tool: help
/// and version exit 0, a missing `--time` exits 2 with its own message,
/// anything else malformed exits 1 with usage.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = usage_exit_code(err.kind());
            if code == EXIT_MISSING_CONFIG {
                eprintln!("Missing '-t' or '--time'");
            } else {
                let _ = err.print();
            }
            std::process::exit(code);
        }
    }
}

fn usage_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::MissingRequiredArgument => EXIT_MISSING_CONFIG,
        _ => EXIT_USAGE,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
