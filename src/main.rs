#![forbid(unsafe_code)]

//! `credpipe` — credential handoff launcher binary.
//!
//! Spawns the configured child process, hands credentials to it over stdio,
//! then relays the caller's stdin/stdout to the child byte for byte until it
//! exits. The child's exit code becomes our exit code.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use credpipe::config::LaunchConfig;
use credpipe::supervisor::{self, relay};
use credpipe::wire::codec::WireFormat;
use credpipe::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "credpipe", about = "Launch a child process with credentials handed off over stdio", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the payload encoding from the config file.
    #[arg(long, value_enum)]
    encoding: Option<WireFormat>,
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("failed to init tracing: {err}");
        std::process::exit(1);
    }
    info!("credpipe bootstrap");

    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(%err, "launch failed");
            std::process::exit(1);
        }
    }
}

async fn run(args: Cli) -> Result<i32> {
    let Cli {
        config: config_path,
        encoding,
        ..
    } = args;

    // ── Load configuration ──────────────────────────────
    let mut config = LaunchConfig::load_from_path(&config_path)?;
    if let Some(encoding) = encoding {
        config.encoding = encoding;
    }
    info!(command = %config.command, encoding = ?config.encoding, "configuration loaded");

    // ── Resolve credentials before anything spawns ──────
    let creds = config.resolve_credentials().await?;
    info!(credentials = creds.len(), "credentials resolved");

    // ── Spawn, handshake, relay ─────────────────────────
    let channel = supervisor::launch(
        &config.spawn_config(),
        creds,
        config.encoding,
        config.timeouts.to_timeouts(),
    )
    .await?;

    relay::run_relay(channel, tokio::io::stdin(), tokio::io::stdout()).await
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries the relayed child stream; diagnostics go to stderr.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
