//! Encoder invocation and process launching for loopcast

pub mod ffmpeg;
pub mod launcher;

pub use ffmpeg::{build_ffmpeg_command, StreamInvocation};
pub use launcher::{EncoderLauncher, FfmpegLauncher, ProbeError};
