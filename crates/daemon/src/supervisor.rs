//! Stream supervisor for loopcast
//!
//! Owns the encoder lifecycle: each attempt checks preconditions, launches
//! the encoder against the current endpoint, watches its output until it
//! exits or reports a connection failure, and then decides how long to wait
//! before the next attempt.
//!
//! ```text
//! Idle -> Starting -> Running(unconfirmed) -> Running(connected) -> Terminated -> Idle
//! ```

use crate::config::{Config, EncoderConfig};
use crate::encode::{EncoderLauncher, ProbeError, StreamInvocation};
use crate::endpoint::{EndpointError, EndpointList, EndpointPolicy};
use crate::media::{MediaError, MediaLibrary};
use crate::monitor::{
    spawn_line_reader, LogThrottle, OutputLine, OutputSignal, OutputSource, SignalMatcher,
};
use crate::retry::{NextAttempt, RetryPolicy};
use crate::selector::MediaSelector;
use crate::session::{SessionState, StreamSession};
use crate::status::{new_shared_status, SharedStatus, StatusReport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Buffered encoder output lines between the pipe readers and the supervisor
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// How long to keep reading buffered output after the encoder has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Unrecoverable supervisor errors
///
/// Transient failures never surface here; they are folded into the retry policy.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Required media missing: {0}")]
    MissingAsset(#[from] MediaError),

    #[error("Encoder unavailable: {0}")]
    EncoderMissing(ProbeError),

    #[error("Invalid ingest endpoints: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Waits between attempts
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Scheduler backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Encoder exited on its own; `None` when killed by a signal
    Exited { code: Option<i32> },
    /// Encoder could not be started
    SpawnFailed(String),
    /// Encoder binary present but the version probe failed
    ProbeFailed(String),
    /// Supervisor killed the encoder after a connection-failure signal
    Killed { pattern: String },
    /// Waiting on the encoder failed
    WaitFailed(String),
}

/// Everything observed during one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub termination: Termination,
    pub connected: bool,
    /// First connection-failure pattern seen, if any
    pub failure_signal: Option<String>,
}

impl AttemptReport {
    fn failed(termination: Termination) -> Self {
        Self {
            termination,
            connected: false,
            failure_signal: None,
        }
    }

    /// Connected, exited with code 0, and no failure was reported
    pub fn is_success(&self) -> bool {
        self.connected
            && self.failure_signal.is_none()
            && self.termination == Termination::Exited { code: Some(0) }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited { code } => code,
            _ => None,
        }
    }

    /// Short description for logs and the status page
    pub fn describe(&self) -> String {
        let base = match &self.termination {
            Termination::Exited { code: Some(0) } if !self.connected => {
                "exited without connecting".to_string()
            }
            Termination::Exited { code: Some(code) } => format!("exited with code {}", code),
            Termination::Exited { code: None } => "terminated by signal".to_string(),
            Termination::SpawnFailed(e) => format!("spawn failed: {}", e),
            Termination::ProbeFailed(e) => format!("probe failed: {}", e),
            Termination::Killed { pattern } => format!("killed after '{}'", pattern),
            Termination::WaitFailed(e) => format!("wait failed: {}", e),
        };
        match (&self.termination, &self.failure_signal) {
            (Termination::Killed { .. }, _) | (_, None) => base,
            (_, Some(pattern)) => format!("{} after '{}'", base, pattern),
        }
    }
}

/// Supervises the encoder forever, one live process at a time
pub struct StreamSupervisor {
    library: Arc<MediaLibrary>,
    tuning: EncoderConfig,
    launcher: Arc<dyn EncoderLauncher>,
    scheduler: Arc<dyn Scheduler>,
    selector: MediaSelector,
    session: StreamSession,
    policy: RetryPolicy,
    matcher: SignalMatcher,
    log_throttle: Duration,
    status: SharedStatus,
}

impl StreamSupervisor {
    /// Create a supervisor
    ///
    /// The starting audio track is drawn from `selector` and the endpoint
    /// cursor starts at the first configured server.
    pub fn new(
        library: Arc<MediaLibrary>,
        config: &Config,
        launcher: Arc<dyn EncoderLauncher>,
        scheduler: Arc<dyn Scheduler>,
        mut selector: MediaSelector,
    ) -> Result<Self, SupervisorError> {
        let endpoints = EndpointList::from_config(&config.ingest)?;
        let policy = RetryPolicy::derive(config, endpoints.len());
        let session = StreamSession::new(selector.initial(), EndpointPolicy::new(endpoints));
        let status = new_shared_status(&session, &library);

        Ok(Self {
            library,
            tuning: config.encoder.clone(),
            launcher,
            scheduler,
            selector,
            session,
            policy,
            matcher: SignalMatcher::from_config(&config.signals),
            log_throttle: Duration::from_millis(config.signals.log_throttle_ms),
            status,
        })
    }

    /// Shared status handle for the HTTP surface
    pub fn status(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run attempts forever
    ///
    /// Returns only when a fatal error makes further attempts pointless.
    pub async fn run(&mut self) -> Result<(), SupervisorError> {
        loop {
            let next = self.run_once().await?;
            info!(
                kind = ?next.kind,
                delay_ms = next.delay.as_millis() as u64,
                retry_count = self.session.retry_count,
                "Next attempt scheduled"
            );
            self.scheduler.sleep(next.delay).await;
        }
    }

    /// Perform one attempt and return when the next one should start
    pub async fn run_once(&mut self) -> Result<NextAttempt, SupervisorError> {
        let report = self.attempt().await?;
        Ok(self.conclude(report).await)
    }

    async fn attempt(&mut self) -> Result<AttemptReport, SupervisorError> {
        if let Err(e) = self.library.validate() {
            error!(error = %e, "Media assets missing, giving up");
            return Err(SupervisorError::MissingAsset(e));
        }

        self.session.begin_attempt();
        self.publish().await;

        match self.launcher.probe().await {
            Ok(()) => {}
            Err(e @ ProbeError::Missing { .. }) => {
                error!(error = %e, "Encoder binary missing, giving up");
                return Err(SupervisorError::EncoderMissing(e));
            }
            Err(ProbeError::Failed(msg)) => {
                warn!(error = %msg, "Encoder probe failed");
                return Ok(AttemptReport::failed(Termination::ProbeFailed(msg)));
            }
        }

        let audio_index = self.session.current_audio_index;
        let invocation = StreamInvocation::new(
            self.library.video_path(),
            self.library.audio_path(audio_index),
            self.session.endpoints.current(),
            &self.tuning,
        );

        info!(
            attempt = self.session.attempts,
            video = %self.library.video_name(),
            audio = %self.library.audio_name(audio_index),
            endpoint = %self.session.endpoints.current_redacted(),
            "Starting stream"
        );

        let child = match self.launcher.launch(&invocation) {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "Failed to spawn encoder");
                return Ok(AttemptReport::failed(Termination::SpawnFailed(e.to_string())));
            }
        };

        self.session.state = SessionState::Running { connected: false };
        self.publish().await;

        Ok(self.monitor(child).await)
    }

    /// Watch the encoder until it exits or a connection failure forces a kill
    async fn monitor(&mut self, mut child: Child) -> AttemptReport {
        let (tx, mut rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, OutputSource::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, OutputSource::Stderr, tx.clone()));
        }
        drop(tx);

        let mut throttle = LogThrottle::new(self.log_throttle);
        let mut failure_signal = None;

        let termination = loop {
            tokio::select! {
                Some(line) = rx.recv() => {
                    if let Some(pattern) = self.observe(&line, &mut throttle).await {
                        warn!(pattern = %pattern, line = %line.text, "Connection failure detected, stopping encoder");
                        failure_signal = Some(pattern.clone());
                        if let Err(e) = child.start_kill() {
                            warn!(error = %e, "Failed to signal encoder");
                        }
                        // Reap before returning so at most one encoder is ever alive
                        if let Err(e) = child.wait().await {
                            warn!(error = %e, "Failed to reap encoder");
                        }
                        break Termination::Killed { pattern };
                    }
                }
                status = child.wait() => {
                    break match status {
                        Ok(status) => Termination::Exited { code: status.code() },
                        Err(e) => Termination::WaitFailed(e.to_string()),
                    };
                }
            }
        };

        // Late lines can still carry the connected or failure signal
        let drain = async {
            while let Some(line) = rx.recv().await {
                if let Some(pattern) = self.observe(&line, &mut throttle).await {
                    failure_signal.get_or_insert(pattern);
                }
            }
        };
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
            debug!("Encoder output still open after exit, abandoning readers");
        }
        for reader in readers {
            reader.abort();
        }

        if throttle.suppressed() > 0 {
            debug!(suppressed = throttle.suppressed(), "Encoder output lines suppressed");
        }

        AttemptReport {
            termination,
            connected: self.session.connected,
            failure_signal,
        }
    }

    /// Fold one output line into the session; returns the failure pattern if any
    async fn observe(&mut self, line: &OutputLine, throttle: &mut LogThrottle) -> Option<String> {
        match self.matcher.classify(line) {
            OutputSignal::Connected => {
                if !self.session.connected {
                    info!(
                        endpoint = %self.session.endpoints.current_redacted(),
                        "Connected to ingest endpoint"
                    );
                    self.session.mark_connected();
                    self.publish().await;
                }
                None
            }
            OutputSignal::ConnectionFailure(pattern) => Some(pattern),
            OutputSignal::Nothing => {
                if let Some(suppressed) = throttle.admit(Instant::now()) {
                    match line.source {
                        OutputSource::Stdout => debug!(suppressed, "stdout: {}", line.text),
                        OutputSource::Stderr => debug!(suppressed, "stderr: {}", line.text),
                    }
                }
                None
            }
        }
    }

    /// Apply the retry policy, rotate audio, and go idle
    async fn conclude(&mut self, report: AttemptReport) -> NextAttempt {
        self.session.state = SessionState::Terminated;
        self.session.last_exit_code = report.exit_code();

        let next = if report.is_success() {
            info!("Stream ended cleanly");
            self.session.successful_runs += 1;
            self.session.last_failure = None;
            self.policy.on_success(&mut self.session)
        } else {
            let reason = report.describe();
            let next = self.policy.on_failure(&mut self.session);
            warn!(
                reason = %reason,
                retry_count = self.session.retry_count,
                next_endpoint = %self.session.endpoints.current_redacted(),
                "Stream attempt failed"
            );
            self.session.last_failure = Some(reason);
            next
        };

        self.session.current_audio_index = self.selector.next(self.session.current_audio_index);
        self.session.connected = false;
        self.session.state = SessionState::Idle;
        self.publish().await;

        next
    }

    async fn publish(&self) {
        let report = StatusReport::project(&self.session, &self.library);
        *self.status.write().await = report;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::media::MediaLayout;
    use crate::retry::NextAttemptKind;
    use crate::status::HealthStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io;
    use std::process::Stdio;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::process::Command;
    use tokio::sync::Notify;

    const CONNECTED_LINE: &str = "echo \"Output #0, flv, to 'rtmp://example/live2/k':\" 1>&2";

    /// Launcher that runs a shell script instead of the encoder
    struct ScriptLauncher {
        script: String,
        probe: Option<fn() -> ProbeError>,
        spawn_fails: bool,
        launches: AtomicUsize,
        endpoints: Mutex<Vec<String>>,
        audio: Mutex<Vec<String>>,
    }

    impl ScriptLauncher {
        fn new(script: &str) -> Self {
            Self {
                script: script.to_string(),
                probe: None,
                spawn_fails: false,
                launches: AtomicUsize::new(0),
                endpoints: Mutex::new(Vec::new()),
                audio: Mutex::new(Vec::new()),
            }
        }

        fn launches(&self) -> usize {
            self.launches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EncoderLauncher for ScriptLauncher {
        async fn probe(&self) -> Result<(), ProbeError> {
            match self.probe {
                Some(make_error) => Err(make_error()),
                None => Ok(()),
            }
        }

        fn launch(&self, invocation: &StreamInvocation) -> io::Result<Child> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.endpoints.lock().unwrap().push(invocation.endpoint.clone());
            self.audio
                .lock()
                .unwrap()
                .push(invocation.audio_path.display().to_string());
            if self.spawn_fails {
                return Err(io::Error::new(io::ErrorKind::Other, "fork failed"));
            }
            Command::new("sh")
                .arg("-c")
                .arg(&self.script)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
    }

    /// Records requested delays; parks forever once `limit` delays are recorded
    struct RecordingScheduler {
        delays: Mutex<Vec<Duration>>,
        limit: usize,
        reached: Notify,
    }

    #[async_trait]
    impl Scheduler for RecordingScheduler {
        async fn sleep(&self, delay: Duration) {
            let count = {
                let mut delays = self.delays.lock().unwrap();
                delays.push(delay);
                delays.len()
            };
            if count >= self.limit {
                self.reached.notify_one();
                std::future::pending::<()>().await;
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        library: Arc<MediaLibrary>,
        config: Config,
    }

    fn fixture(audio_count: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let audio: Vec<String> = (1..=audio_count).map(|i| format!("{}.mp3", i)).collect();
        std::fs::write(dir.path().join("loop.mp4"), b"v").unwrap();
        for name in &audio {
            std::fs::write(dir.path().join(name), b"a").unwrap();
        }
        let layout = MediaLayout {
            media_dir: dir.path().to_path_buf(),
            is_container: false,
        };
        let library = Arc::new(MediaLibrary::resolve(layout, "loop.mp4", &audio).unwrap());

        let mut config = Config::default();
        config.ingest.stream_key = "test-key".to_string();
        config.ingest.servers = vec![
            "rtmp://one.example/live2".to_string(),
            "rtmp://two.example/live2".to_string(),
            "rtmp://three.example/live2".to_string(),
        ];
        config.retry.max_retries = Some(3);
        config.signals.log_throttle_ms = 0;

        Fixture {
            _dir: dir,
            library,
            config,
        }
    }

    fn supervisor(fx: &Fixture, launcher: Arc<ScriptLauncher>) -> StreamSupervisor {
        let selector = MediaSelector::with_rng(
            fx.library.audio_names(),
            Box::new(StdRng::seed_from_u64(11)),
        );
        StreamSupervisor::new(
            fx.library.clone(),
            &fx.config,
            launcher,
            Arc::new(TokioScheduler),
            selector,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_video_is_fatal_before_spawn() {
        let fx = fixture(3);
        std::fs::remove_file(fx.library.video_path()).unwrap();
        let launcher = Arc::new(ScriptLauncher::new("exit 0"));
        let mut sup = supervisor(&fx, launcher.clone());

        let result = sup.run_once().await;

        assert!(matches!(result, Err(SupervisorError::MissingAsset(_))));
        assert_eq!(launcher.launches(), 0);
        assert_eq!(sup.session().retry_count, 0);
        assert_eq!(sup.session().attempts, 0);
    }

    #[tokio::test]
    async fn test_missing_encoder_is_fatal() {
        let fx = fixture(3);
        let mut launcher = ScriptLauncher::new("exit 0");
        launcher.probe = Some(|| ProbeError::Missing {
            binary: "ffmpeg".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        });
        let launcher = Arc::new(launcher);
        let mut sup = supervisor(&fx, launcher.clone());

        let result = sup.run().await;

        assert!(matches!(result, Err(SupervisorError::EncoderMissing(_))));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_is_retried() {
        let fx = fixture(3);
        let mut launcher = ScriptLauncher::new("exit 0");
        launcher.probe = Some(|| ProbeError::Failed("exit status: 1".to_string()));
        let launcher = Arc::new(launcher);
        let mut sup = supervisor(&fx, launcher.clone());

        let next = sup.run_once().await.unwrap();

        assert_eq!(next.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 1);
        assert_eq!(sup.session().current_endpoint_index(), 1);
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_retried() {
        let fx = fixture(3);
        let mut launcher = ScriptLauncher::new("exit 0");
        launcher.spawn_fails = true;
        let mut sup = supervisor(&fx, Arc::new(launcher));

        let next = sup.run_once().await.unwrap();

        assert_eq!(next.kind, NextAttemptKind::Retry);
        assert_eq!(next.delay, Duration::from_millis(5_000));
        assert!(sup
            .session()
            .last_failure
            .as_deref()
            .unwrap()
            .contains("spawn failed"));
    }

    #[tokio::test]
    async fn test_repeated_nonzero_exit_reaches_backoff() {
        let fx = fixture(3);
        let launcher = Arc::new(ScriptLauncher::new("echo boom 1>&2; exit 1"));
        let mut sup = supervisor(&fx, launcher.clone());

        let first = sup.run_once().await.unwrap();
        assert_eq!(first.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 1);
        assert_eq!(sup.session().last_exit_code, Some(1));

        let second = sup.run_once().await.unwrap();
        assert_eq!(second.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 2);

        let third = sup.run_once().await.unwrap();
        assert_eq!(third.kind, NextAttemptKind::Backoff);
        assert_eq!(third.delay, Duration::from_millis(30_000));
        assert_eq!(sup.session().retry_count, 0);

        // Each failure moved to the next endpoint
        let endpoints = launcher.endpoints.lock().unwrap().clone();
        assert_eq!(
            endpoints,
            vec![
                "rtmp://one.example/live2/test-key".to_string(),
                "rtmp://two.example/live2/test-key".to_string(),
                "rtmp://three.example/live2/test-key".to_string(),
            ]
        );
        assert_eq!(sup.session().current_endpoint_index(), 0);
    }

    #[tokio::test]
    async fn test_connected_clean_exit_is_success() {
        let fx = fixture(4);
        let failing = Arc::new(ScriptLauncher::new("exit 1"));
        let mut sup = supervisor(&fx, failing);
        sup.run_once().await.unwrap();
        sup.run_once().await.unwrap();
        assert_eq!(sup.session().retry_count, 2);

        sup.launcher = Arc::new(ScriptLauncher::new(&format!("{}; exit 0", CONNECTED_LINE)));
        let audio_before = sup.session().current_audio_index;
        let endpoint_before = sup.session().current_endpoint_index();

        let next = sup.run_once().await.unwrap();

        assert_eq!(next.kind, NextAttemptKind::AfterSuccess);
        assert_eq!(next.delay, Duration::from_millis(1_000));
        assert_eq!(sup.session().retry_count, 0);
        assert_eq!(sup.session().successful_runs, 1);
        assert_eq!(sup.session().last_exit_code, Some(0));
        assert_ne!(sup.session().current_audio_index, audio_before);
        assert_eq!(sup.session().current_endpoint_index(), endpoint_before);
        assert_eq!(sup.session().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_clean_exit_without_connection_is_failure() {
        let fx = fixture(3);
        let mut sup = supervisor(&fx, Arc::new(ScriptLauncher::new("echo hello; exit 0")));

        let next = sup.run_once().await.unwrap();

        assert_eq!(next.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 1);
        assert_eq!(
            sup.session().last_failure.as_deref(),
            Some("exited without connecting")
        );
    }

    #[tokio::test]
    async fn test_connected_then_error_exit_counts_from_zero() {
        let fx = fixture(3);
        let mut sup = supervisor(&fx, Arc::new(ScriptLauncher::new("exit 1")));
        sup.run_once().await.unwrap();
        sup.run_once().await.unwrap();
        assert_eq!(sup.session().retry_count, 2);

        sup.launcher = Arc::new(ScriptLauncher::new(&format!("{}; exit 1", CONNECTED_LINE)));
        let next = sup.run_once().await.unwrap();

        // Connection reset the counter before this failure was counted
        assert_eq!(next.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_kills_running_encoder() {
        let fx = fixture(3);
        let script = "echo 'Connection to tcp://one.example:1935 failed: Connection refused' 1>&2; exec sleep 30";
        let mut sup = supervisor(&fx, Arc::new(ScriptLauncher::new(script)));

        let started = Instant::now();
        let next = tokio::time::timeout(Duration::from_secs(10), sup.run_once())
            .await
            .expect("encoder should be killed well before it exits on its own")
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(next.kind, NextAttemptKind::Retry);
        assert_eq!(sup.session().retry_count, 1);
        assert_eq!(sup.session().last_exit_code, None);
        assert!(sup
            .session()
            .last_failure
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_failure_signal_spoils_clean_exit() {
        let fx = fixture(3);
        let script = format!("{}; echo 'Connection timed out' 1>&2; exit 0", CONNECTED_LINE);
        let mut sup = supervisor(&fx, Arc::new(ScriptLauncher::new(&script)));

        let next = sup.run_once().await.unwrap();
        assert_eq!(next.kind, NextAttemptKind::Retry);
    }

    #[tokio::test]
    async fn test_audio_rotates_between_attempts() {
        let fx = fixture(5);
        let launcher = Arc::new(ScriptLauncher::new("exit 1"));
        let mut sup = supervisor(&fx, launcher.clone());

        for _ in 0..6 {
            sup.run_once().await.unwrap();
        }

        let audio = launcher.audio.lock().unwrap().clone();
        assert_eq!(audio.len(), 6);
        for pair in audio.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_status_reflects_session() {
        let fx = fixture(3);
        let mut sup = supervisor(&fx, Arc::new(ScriptLauncher::new("exit 2")));
        let status = sup.status();

        sup.run_once().await.unwrap();

        let report = status.read().await.clone();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.retry_count, 1);
        assert_eq!(report.state, "idle");
        assert_eq!(report.last_exit_code, Some(2));
        assert_eq!(report.attempts, 1);
        assert_eq!(report.endpoint, "rtmp://two.example/live2/****");
        assert_eq!(
            report.current_audio,
            fx.library.audio_name(sup.session().current_audio_index)
        );
    }

    #[tokio::test]
    async fn test_run_loop_uses_scheduled_delays() {
        let fx = fixture(3);
        let launcher = Arc::new(ScriptLauncher::new("exit 1"));
        let scheduler = Arc::new(RecordingScheduler {
            delays: Mutex::new(Vec::new()),
            limit: 4,
            reached: Notify::new(),
        });
        let selector = MediaSelector::with_rng(
            fx.library.audio_names(),
            Box::new(StdRng::seed_from_u64(3)),
        );
        let mut sup = StreamSupervisor::new(
            fx.library.clone(),
            &fx.config,
            launcher,
            scheduler.clone(),
            selector,
        )
        .unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(20), async {
            tokio::select! {
                result = sup.run() => panic!("run loop ended: {:?}", result.err()),
                _ = scheduler.reached.notified() => {}
            }
        })
        .await;
        assert!(finished.is_ok());

        let delays = scheduler.delays.lock().unwrap().clone();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5_000),
                Duration::from_millis(5_000),
                Duration::from_millis(30_000),
                Duration::from_millis(5_000),
            ]
        );
    }

    #[test]
    fn test_describe_terminations() {
        let report = AttemptReport {
            termination: Termination::Exited { code: Some(1) },
            connected: true,
            failure_signal: Some("connection reset by peer".to_string()),
        };
        assert_eq!(
            report.describe(),
            "exited with code 1 after 'connection reset by peer'"
        );
        assert!(!report.is_success());

        let killed = AttemptReport {
            termination: Termination::Killed {
                pattern: "connection refused".to_string(),
            },
            connected: false,
            failure_signal: Some("connection refused".to_string()),
        };
        assert_eq!(killed.describe(), "killed after 'connection refused'");

        let success = AttemptReport {
            termination: Termination::Exited { code: Some(0) },
            connected: true,
            failure_signal: None,
        };
        assert!(success.is_success());
    }
}
