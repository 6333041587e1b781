//! Startup checks module for loopcast
//!
//! Provides preflight checks run once before the supervisor starts:
//! - Encoder binary present (a failing `-version` only warns)
//! - Media assets present on disk

use crate::encode::ProbeError;
use crate::media::{MediaError, MediaLibrary};
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("FFmpeg not available: {0}")]
    EncoderUnavailable(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Check that the encoder binary exists and report its version
///
/// Only a binary that cannot be found or executed is an error. A binary that
/// runs but fails `-version`, or prints an unrecognised banner, yields `None`;
/// the per-attempt probe retries it like any other transient failure.
pub fn check_encoder_available(binary: &Path) -> Result<Option<u32>, StartupError> {
    let output = match Command::new(binary).arg("-version").output() {
        Ok(output) => output,
        Err(e) => {
            return match ProbeError::from_spawn(binary, e) {
                missing @ ProbeError::Missing { .. } => Err(StartupError::EncoderUnavailable(
                    format!("{}; is FFmpeg installed and in PATH?", missing),
                )),
                ProbeError::Failed(msg) => {
                    warn!(error = %msg, "FFmpeg version check failed, continuing");
                    Ok(None)
                }
            };
        }
    };

    if !output.status.success() {
        warn!(
            binary = %binary.display(),
            status = %output.status,
            "FFmpeg -version exited unsuccessfully, continuing"
        );
        return Ok(None);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ffmpeg_version(&version_output))
}

/// Parse FFmpeg version string and extract major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.1 ..."
/// - N-prefixed: "ffmpeg version n6.1-... ..."
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    let major_str = version_str
        .split(|c: char| c == '.' || c == '-')
        .next()?;

    major_str.parse().ok()
}

/// Run all startup checks in order
///
/// 1. Encoder availability
/// 2. Media assets
pub fn run_startup_checks(binary: &Path, library: &MediaLibrary) -> Result<(), StartupError> {
    match check_encoder_available(binary)? {
        Some(major) => info!(binary = %binary.display(), major, "FFmpeg available"),
        None => info!(binary = %binary.display(), "FFmpeg available (version not recognised)"),
    }
    library.validate()?;
    info!(
        video = %library.video_name(),
        audio_tracks = library.audio_count(),
        media_dir = %library.layout().media_dir.display(),
        "Media assets present"
    );
    Ok(())
}
