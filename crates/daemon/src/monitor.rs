//! Encoder output monitoring for loopcast
//!
//! Reads the encoder's stdout and stderr line by line, recognises connection
//! signals, and rate-limits what gets logged.

use crate::config::SignalConfig;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One line of encoder output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    pub text: String,
}

/// What a line means for the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSignal {
    Connected,
    /// Carries the matched pattern
    ConnectionFailure(String),
    Nothing,
}

/// Case-insensitive substring matcher for connection signals
#[derive(Debug, Clone)]
pub struct SignalMatcher {
    connected: Vec<String>,
    failure: Vec<String>,
}

impl SignalMatcher {
    pub fn new<S: AsRef<str>>(connected: &[S], failure: &[S]) -> Self {
        let lower = |patterns: &[S]| {
            patterns
                .iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect::<Vec<String>>()
        };
        Self {
            connected: lower(connected),
            failure: lower(failure),
        }
    }

    pub fn from_config(cfg: &SignalConfig) -> Self {
        Self::new(&cfg.connected, &cfg.connection_failure)
    }

    /// Classify a line
    ///
    /// Connection failures are only recognised on stderr; the connected
    /// signal is accepted from either pipe since encoders differ in where
    /// they report it. Failure wins when both match.
    pub fn classify(&self, line: &OutputLine) -> OutputSignal {
        let lower = line.text.to_lowercase();

        if line.source == OutputSource::Stderr {
            if let Some(pattern) = self.failure.iter().find(|p| lower.contains(p.as_str())) {
                return OutputSignal::ConnectionFailure(pattern.clone());
            }
        }

        if self.connected.iter().any(|p| lower.contains(p.as_str())) {
            return OutputSignal::Connected;
        }

        OutputSignal::Nothing
    }
}

/// Admits at most one log line per window
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last_admitted: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: None,
            suppressed: 0,
        }
    }

    /// Returns the number of lines dropped since the last admitted one when
    /// the line may be logged, `None` when it must be suppressed
    pub fn admit(&mut self, now: Instant) -> Option<u64> {
        let open = match self.last_admitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };

        if open {
            self.last_admitted = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Longest line forwarded to the supervisor; the rest of an overlong line is dropped
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Forward every line of `reader` into `tx` until EOF or the receiver goes away
///
/// Both `\n` and `\r` end a line, so progress updates are delivered as they
/// are written. Lines longer than [`MAX_LINE_BYTES`] are truncated.
pub fn spawn_line_reader<R>(
    reader: R,
    source: OutputSource,
    tx: mpsc::Sender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::with_capacity(256);
        loop {
            let available = match reader.fill_buf().await {
                Ok(available) => available,
                Err(_) => break,
            };
            if available.is_empty() {
                break;
            }

            let end = available.iter().position(|b| *b == b'\n' || *b == b'\r');
            let (len, terminated) = match end {
                Some(pos) => (pos, true),
                None => (available.len(), false),
            };
            let room = MAX_LINE_BYTES.saturating_sub(line.len());
            line.extend_from_slice(&available[..len.min(room)]);
            reader.consume(if terminated { len + 1 } else { len });

            if terminated && !forward_line(&tx, source, &mut line).await {
                return;
            }
        }
        forward_line(&tx, source, &mut line).await;
    })
}

/// Send the buffered line if it has content; returns false once the receiver is gone
async fn forward_line(
    tx: &mpsc::Sender<OutputLine>,
    source: OutputSource,
    line: &mut Vec<u8>,
) -> bool {
    let text = String::from_utf8_lossy(line).trim().to_string();
    line.clear();
    if text.is_empty() {
        return true;
    }
    tx.send(OutputLine { source, text }).await.is_ok()
}
