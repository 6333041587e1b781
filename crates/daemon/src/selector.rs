//! Audio track selection for loopcast
//!
//! Picks the next audio track uniformly at random, never repeating the
//! current one unless the pool has a single entry.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::info;

/// Random no-immediate-repeat selector over a pool of named tracks
pub struct MediaSelector {
    names: Vec<String>,
    rng: Box<dyn RngCore + Send>,
}

impl MediaSelector {
    /// Create a selector seeded from OS entropy
    pub fn new(names: Vec<String>) -> Self {
        Self::with_rng(names, Box::new(StdRng::from_entropy()))
    }

    /// Create a selector driven by the given RNG
    pub fn with_rng(names: Vec<String>, rng: Box<dyn RngCore + Send>) -> Self {
        assert!(!names.is_empty(), "audio pool must not be empty");
        Self { names, rng }
    }

    pub fn pool_size(&self) -> usize {
        self.names.len()
    }

    /// Uniformly random starting index
    pub fn initial(&mut self) -> usize {
        self.rng.gen_range(0..self.names.len())
    }

    /// Pick the next track index
    ///
    /// Rejection-samples until the draw differs from `current`. A pool of one
    /// always yields index 0.
    pub fn next(&mut self, current: usize) -> usize {
        let len = self.names.len();
        let index = if len == 1 {
            0
        } else {
            loop {
                let candidate = self.rng.gen_range(0..len);
                if candidate != current {
                    break candidate;
                }
            }
        };

        info!(track = %self.names[index], "Switching audio track");
        index
    }
}
