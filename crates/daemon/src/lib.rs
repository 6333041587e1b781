//! loopcast
//!
//! Relays a looped video with rotating audio tracks to a live ingest endpoint
//! through FFmpeg, restarting and failing over whenever the encoder stops.

pub mod daemon;
pub mod encode;
pub mod endpoint;
pub mod media;
pub mod monitor;
pub mod retry;
pub mod selector;
pub mod session;
pub mod startup;
pub mod status;
pub mod status_server;
pub mod supervisor;

pub use daemon::{Daemon, DaemonError};
pub use encode::{build_ffmpeg_command, EncoderLauncher, FfmpegLauncher, ProbeError, StreamInvocation};
pub use endpoint::{EndpointError, EndpointList, EndpointPolicy};
pub use loopcast_config as config;
pub use loopcast_config::Config;
pub use media::{MediaError, MediaLayout, MediaLibrary};
pub use monitor::{LogThrottle, OutputLine, OutputSignal, OutputSource, SignalMatcher};
pub use retry::{NextAttempt, NextAttemptKind, RetryPolicy};
pub use selector::MediaSelector;
pub use session::{SessionState, StreamSession};
pub use startup::{check_encoder_available, parse_ffmpeg_version, run_startup_checks, StartupError};
pub use status::{new_shared_status, HealthStatus, SharedStatus, StatusReport};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use supervisor::{
    AttemptReport, Scheduler, StreamSupervisor, SupervisorError, Termination, TokioScheduler,
};
