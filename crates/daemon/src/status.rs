//! Status module for loopcast
//!
//! Read-only projection of the stream session plus static library facts,
//! published by the supervisor and served over HTTP.

use crate::media::MediaLibrary;
use crate::session::StreamSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Overall health flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No failures since the last success
    Healthy,
    /// At least one consecutive failure is pending
    Degraded,
}

/// Complete status document served at `/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub status: HealthStatus,
    pub state: String,
    pub connected: bool,
    pub current_audio: String,
    pub video: String,
    pub audio_tracks: Vec<String>,
    pub retry_count: u32,
    pub endpoint_index: usize,
    /// Current endpoint with the stream key masked
    pub endpoint: String,
    pub attempts: u64,
    pub successful_runs: u64,
    pub last_exit_code: Option<i32>,
    pub last_failure: Option<String>,
    pub is_container: bool,
    pub media_dir: String,
    pub timestamp_unix_ms: i64,
}

/// Shared status state; written only by the supervisor
pub type SharedStatus = Arc<RwLock<StatusReport>>;

impl StatusReport {
    /// Project the session and library into a status document
    pub fn project(session: &StreamSession, library: &MediaLibrary) -> Self {
        let status = if session.retry_count == 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            state: session.state.as_str().to_string(),
            connected: session.connected,
            current_audio: library.audio_name(session.current_audio_index),
            video: library.video_name(),
            audio_tracks: library.audio_names(),
            retry_count: session.retry_count,
            endpoint_index: session.current_endpoint_index(),
            endpoint: session.endpoints.current_redacted(),
            attempts: session.attempts,
            successful_runs: session.successful_runs,
            last_exit_code: session.last_exit_code,
            last_failure: session.last_failure.clone(),
            is_container: library.layout().is_container,
            media_dir: library.layout().media_dir.display().to_string(),
            timestamp_unix_ms: timestamp_ms(),
        }
    }
}

/// Creates a new SharedStatus seeded from the initial session
pub fn new_shared_status(session: &StreamSession, library: &MediaLibrary) -> SharedStatus {
    Arc::new(RwLock::new(StatusReport::project(session, library)))
}

/// Get current timestamp in milliseconds
fn timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
