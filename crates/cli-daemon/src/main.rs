//! CLI entry point for loopcast
//!
//! Parses command line arguments, sets up logging, and starts the daemon.

use clap::Parser;
use loopcast::{Config, Daemon, DaemonError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// loopcast - Relay a looped video with rotating audio to a live ingest
#[derive(Parser, Debug)]
#[command(name = "loopcast")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml). Defaults and environment
    /// variables are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Skip startup checks (ffmpeg, media files). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_daemon(args: &Args) -> Result<Daemon, DaemonError> {
    if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        let config = Config::load(args.config.as_ref())?;
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(args.config.as_ref())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("loopcast starting");
    if let Some(path) = &args.config {
        info!(config = %path.display(), "Using config file");
    }

    let mut daemon = match build_daemon(&args) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    info!(
        addr = %daemon.status_addr,
        servers = daemon.config.ingest.servers.len(),
        "Starting status server"
    );

    // The in-flight encoder is killed on drop once the supervisor future is cancelled
    tokio::select! {
        result = daemon.run_with_server() => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Daemon error");
                ExitCode::FAILURE
            }
        },
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
                return ExitCode::FAILURE;
            }
            info!("Shutdown signal received, stopping");
            ExitCode::SUCCESS
        }
    }
}
