//! adbsh: device shell client CLI.
//!
//! Manages the device key pair used to authenticate shell sessions, checks
//! that a device port is reachable, and shows the effective client
//! configuration.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

/// adbsh: device shell client
#[derive(Parser)]
#[command(name = "adbsh", version, about = "Device shell client: key management and configuration")]
struct Cli {
    /// Key directory (overrides the config file)
    #[arg(short = 'd', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the device key pair, generating it if missing or invalid
    Keygen,

    /// Print the stored public key
    Pubkey,

    /// Print the SHA-256 fingerprint of the stored key
    Fingerprint,

    /// Check that the device port accepts TCP connections
    Ping {
        /// Device host (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Device port (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("adbsh: {e:#}");
        std::process::exit(1);
    }
}

const LOG_TARGETS: [&str; 3] = ["adbsh", "adbsh_client", "adbsh_core"];

/// `EnvFilter` directives covering every adbsh crate at one level.
fn log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };
    let mut cfg = config::Config::load(&config_path)?;

    let key_dir = cfg.key_dir(cli.dir.as_deref())?;

    match cli.command {
        Command::Keygen => commands::keygen::run(&key_dir).await,
        Command::Pubkey => commands::pubkey::run(&key_dir).await,
        Command::Fingerprint => commands::fingerprint::run(&key_dir).await,
        Command::Ping { host, port } => {
            commands::ping::run(&cfg.connect_options(host.as_deref(), port)).await
        }
        Command::Config => {
            cfg.default.key_dir = key_dir.to_string_lossy().into_owned();
            commands::config::run(&cfg).await
        }
    }
}
