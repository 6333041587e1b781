//! Stream session state owned by the supervisor loop

use crate::endpoint::EndpointPolicy;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the next attempt
    Idle,
    /// Preconditions checked, encoder being launched
    Starting,
    /// Encoder running; `connected` tells whether ingest confirmed the link
    Running { connected: bool },
    /// Encoder gone, next attempt not yet scheduled
    Terminated,
}

impl SessionState {
    /// Convert state to string for status output
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running { .. } => "running",
            SessionState::Terminated => "terminated",
        }
    }
}

/// Mutable relay state; only the supervisor writes to it
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Index into the audio pool of the track in use
    pub current_audio_index: usize,
    /// Ingest failover cursor
    pub endpoints: EndpointPolicy,
    /// Consecutive failures since the last success or backoff
    pub retry_count: u32,
    /// Ingest confirmed the connection during the current attempt
    pub connected: bool,
    pub state: SessionState,
    /// Encoder launches attempted since startup
    pub attempts: u64,
    /// Runs that connected and ended cleanly
    pub successful_runs: u64,
    pub last_exit_code: Option<i32>,
    pub last_failure: Option<String>,
}

impl StreamSession {
    pub fn new(initial_audio_index: usize, endpoints: EndpointPolicy) -> Self {
        Self {
            current_audio_index: initial_audio_index,
            endpoints,
            retry_count: 0,
            connected: false,
            state: SessionState::Idle,
            attempts: 0,
            successful_runs: 0,
            last_exit_code: None,
            last_failure: None,
        }
    }

    /// Enter `Starting` for a fresh attempt
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.connected = false;
        self.state = SessionState::Starting;
    }

    /// Record the ingest connection; a connected session counts as recovered
    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.retry_count = 0;
        self.state = SessionState::Running { connected: true };
    }

    pub fn current_endpoint_index(&self) -> usize {
        self.endpoints.current_index()
    }
}
