//! Daemon startup and main loop for loopcast
//!
//! Provides the daemon entry point, startup sequence, and the supervisor loop.

use crate::config::{Config, ConfigError};
use crate::encode::{EncoderLauncher, FfmpegLauncher};
use crate::media::{MediaError, MediaLibrary};
use crate::selector::MediaSelector;
use crate::startup::{run_startup_checks, StartupError};
use crate::status::SharedStatus;
use crate::status_server::{parse_bind_address, run_status_server, ServerError};
use crate::supervisor::{Scheduler, StreamSupervisor, SupervisorError, TokioScheduler};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Media library could not be resolved
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Supervisor hit an unrecoverable condition
    #[error("Supervisor stopped: {0}")]
    Supervisor(#[from] SupervisorError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Resolved media assets
    pub library: Arc<MediaLibrary>,
    /// Address the status server listens on
    pub status_addr: SocketAddr,
    supervisor: StreamSupervisor,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file (if given) and apply environment overrides
    /// 2. Resolve the media library
    /// 3. Run startup checks (encoder present, media present)
    /// 4. Build the supervisor
    pub fn new<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        Self::with_config(config)
    }

    /// Initialize the daemon with an existing configuration
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        let library = Arc::new(MediaLibrary::from_config(&config.media)?);
        run_startup_checks(&config.encoder.binary, &library)?;
        Self::assemble(config, library)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Missing media or encoder still stop the supervisor on its first attempt.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let library = Arc::new(MediaLibrary::from_config(&config.media)?);
        Self::assemble(config, library)
    }

    fn assemble(config: Config, library: Arc<MediaLibrary>) -> Result<Self, DaemonError> {
        let launcher: Arc<dyn EncoderLauncher> =
            Arc::new(FfmpegLauncher::new(config.encoder.binary.clone()));
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler);
        let selector = MediaSelector::new(library.audio_names());
        let supervisor =
            StreamSupervisor::new(library.clone(), &config, launcher, scheduler, selector)?;
        let status_addr = parse_bind_address(&config.server.bind_address, config.server.port)?;

        Ok(Self {
            config,
            library,
            status_addr,
            supervisor,
        })
    }

    /// Get the shared status
    pub fn status(&self) -> SharedStatus {
        self.supervisor.status()
    }

    /// Start the status HTTP server
    ///
    /// Spawns the HTTP server as a background task.
    pub fn start_status_server(&self) -> tokio::task::JoinHandle<()> {
        let status = self.status();
        let addr = self.status_addr;
        tokio::spawn(async move {
            if let Err(e) = run_status_server(status, addr).await {
                error!(error = %e, "Status server error");
            }
        })
    }

    /// Run the supervisor loop
    ///
    /// Only returns on a fatal error.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        self.supervisor.run().await?;
        Ok(())
    }

    /// Run the daemon with the status server alongside the supervisor
    pub async fn run_with_server(&mut self) -> Result<(), DaemonError> {
        let server_handle = self.start_status_server();
        let result = self.run().await;
        server_handle.abort();
        result
    }
}
