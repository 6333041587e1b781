//! Encoder process launching for loopcast
//!
//! The supervisor never spawns processes directly; it goes through an
//! [`EncoderLauncher`] so the lifecycle can be driven by scripted processes.

use super::ffmpeg::{build_ffmpeg_command, StreamInvocation};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Error type for encoder probes
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The binary could not be found or executed at all
    #[error("Encoder binary '{binary}' not found: {source}")]
    Missing {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The binary ran but did not answer the version probe cleanly
    #[error("Encoder probe failed: {0}")]
    Failed(String),
}

impl ProbeError {
    /// Map a spawn error from the probe into missing vs. transient
    pub fn from_spawn(binary: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ProbeError::Missing {
                binary: binary.to_path_buf(),
                source,
            },
            _ => ProbeError::Failed(format!("{} -version: {}", binary.display(), source)),
        }
    }
}

/// Starts encoder processes and checks the encoder is usable
#[async_trait]
pub trait EncoderLauncher: Send + Sync {
    /// Confirm the encoder binary is present and answers a no-op invocation
    async fn probe(&self) -> Result<(), ProbeError>;

    /// Spawn the encoder with stdout and stderr piped
    ///
    /// The returned child must be killed when dropped.
    fn launch(&self, invocation: &StreamInvocation) -> io::Result<Child>;
}

/// Launches the real FFmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: PathBuf,
}

impl FfmpegLauncher {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl EncoderLauncher for FfmpegLauncher {
    async fn probe(&self) -> Result<(), ProbeError> {
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ProbeError::from_spawn(&self.binary, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Failed(format!(
                "{} -version exited with {}",
                self.binary.display(),
                status
            )))
        }
    }

    fn launch(&self, invocation: &StreamInvocation) -> io::Result<Child> {
        let mut cmd = Command::from(build_ffmpeg_command(invocation));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.spawn()
    }
}
