//! Ingest endpoint failover for loopcast
//!
//! Endpoints share one stream key and differ only by server. The list order is
//! the failover priority; `advance` walks it round-robin.

use crate::config::IngestConfig;
use std::sync::Arc;
use thiserror::Error;

/// Replacement text for the stream key in logs and status output
const REDACTED_KEY: &str = "****";

/// Error type for endpoint construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("No ingest servers configured")]
    NoServers,

    #[error("Stream key is empty")]
    EmptyKey,
}

/// Immutable, non-empty ordered list of ingest URIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointList {
    servers: Arc<[String]>,
    uris: Arc<[String]>,
}

impl EndpointList {
    /// Build one URI per server by appending the stream key
    pub fn new<S: AsRef<str>>(servers: &[S], stream_key: &str) -> Result<Self, EndpointError> {
        let key = stream_key.trim();
        if key.is_empty() {
            return Err(EndpointError::EmptyKey);
        }
        if servers.is_empty() {
            return Err(EndpointError::NoServers);
        }

        let servers: Vec<String> = servers
            .iter()
            .map(|server| server.as_ref().trim_end_matches('/').to_string())
            .collect();
        let uris: Vec<String> = servers
            .iter()
            .map(|server| format!("{}/{}", server, key))
            .collect();

        Ok(Self {
            servers: servers.into(),
            uris: uris.into(),
        })
    }

    pub fn from_config(cfg: &IngestConfig) -> Result<Self, EndpointError> {
        Self::new(&cfg.servers, &cfg.stream_key)
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn get(&self, index: usize) -> &str {
        &self.uris[index]
    }

    /// URI at `index` with the trailing stream key segment masked
    pub fn redacted(&self, index: usize) -> String {
        format!("{}/{}", self.servers[index], REDACTED_KEY)
    }
}

/// Round-robin cursor over an [`EndpointList`]
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    endpoints: EndpointList,
    index: usize,
}

impl EndpointPolicy {
    /// Start at the highest-priority endpoint
    pub fn new(endpoints: EndpointList) -> Self {
        Self {
            endpoints,
            index: 0,
        }
    }

    pub fn current(&self) -> &str {
        self.endpoints.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_redacted(&self) -> String {
        self.endpoints.redacted(self.index)
    }

    pub fn endpoints(&self) -> &EndpointList {
        &self.endpoints
    }

    /// Move to the next endpoint, wrapping at the end of the list
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.endpoints.len();
    }
}
