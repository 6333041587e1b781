//! FFmpeg command construction for loopcast
//!
//! Builds the relay command: looped video plus looped audio, encoded for
//! live FLV delivery to one ingest endpoint.

use crate::config::EncoderConfig;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Fixed x264 tuning for low-latency live ingest
const X264_TUNE: &str = "zerolatency";
const X264_PROFILE: &str = "baseline";
const X264_LEVEL: &str = "3.0";
const PIXEL_FORMAT: &str = "yuv420p";
const AUDIO_CODEC: &str = "aac";
/// Keeps audio in sync when the looped tracks have gaps
const AUDIO_FILTER: &str = "aresample=async=1000";
const MAX_MUXING_QUEUE_SIZE: &str = "1024";
const OUTPUT_FORMAT: &str = "flv";

/// Everything needed for one encoder launch
#[derive(Debug, Clone)]
pub struct StreamInvocation {
    /// Encoder binary to execute
    pub binary: PathBuf,
    /// Looped video input
    pub video_path: PathBuf,
    /// Looped audio input for this attempt
    pub audio_path: PathBuf,
    /// Ingest URI the stream is sent to
    pub endpoint: String,
    /// Rate control and GOP settings
    pub tuning: EncoderConfig,
}

impl StreamInvocation {
    pub fn new(
        video_path: &Path,
        audio_path: &Path,
        endpoint: &str,
        tuning: &EncoderConfig,
    ) -> Self {
        Self {
            binary: tuning.binary.clone(),
            video_path: video_path.to_path_buf(),
            audio_path: audio_path.to_path_buf(),
            endpoint: endpoint.to_string(),
            tuning: tuning.clone(),
        }
    }
}

/// Build an FFmpeg command for the relay
///
/// Creates a Command configured with:
/// - Native-rate reading and infinite looping of both inputs
/// - x264 video with fixed bitrate, buffer, frame rate and keyframe interval
/// - AAC audio resampled for sync
/// - FLV output to the selected endpoint, which is always the last argument
///
/// # Arguments
/// * `invocation` - Inputs, endpoint and tuning for this attempt
///
/// # Returns
/// A configured Command ready for execution
pub fn build_ffmpeg_command(invocation: &StreamInvocation) -> Command {
    let tuning = &invocation.tuning;
    let mut cmd = Command::new(&invocation.binary);

    // Keep stderr line-oriented
    cmd.arg("-hide_banner").arg("-nostats");

    // Inputs, both looped forever
    cmd.arg("-re");
    cmd.arg("-stream_loop").arg("-1").arg("-i").arg(&invocation.video_path);
    cmd.arg("-stream_loop").arg("-1").arg("-i").arg(&invocation.audio_path);

    // Video encoding
    cmd.arg("-c:v").arg(&tuning.video_codec);
    cmd.arg("-preset").arg(&tuning.preset);
    cmd.arg("-tune").arg(X264_TUNE);
    cmd.arg("-profile:v").arg(X264_PROFILE);
    cmd.arg("-level").arg(X264_LEVEL);
    cmd.arg("-pix_fmt").arg(PIXEL_FORMAT);

    // Rate control and GOP
    cmd.arg("-b:v").arg(kbps(tuning.video_bitrate_kbps));
    cmd.arg("-maxrate").arg(kbps(tuning.max_bitrate_kbps));
    cmd.arg("-bufsize").arg(kbps(tuning.buffer_size_kbps));
    cmd.arg("-r").arg(tuning.frame_rate.to_string());
    cmd.arg("-g").arg(tuning.keyframe_interval.to_string());
    cmd.arg("-keyint_min").arg(tuning.keyframe_interval.to_string());

    // Audio encoding
    cmd.arg("-c:a").arg(AUDIO_CODEC);
    cmd.arg("-b:a").arg(kbps(tuning.audio_bitrate_kbps));
    cmd.arg("-ar").arg(tuning.audio_sample_rate.to_string());
    cmd.arg("-af").arg(AUDIO_FILTER);

    // Output
    cmd.arg("-shortest");
    cmd.arg("-max_muxing_queue_size").arg(MAX_MUXING_QUEUE_SIZE);
    cmd.arg("-f").arg(OUTPUT_FORMAT);
    cmd.arg("-map").arg("0:v:0");
    cmd.arg("-map").arg("1:a:0");
    cmd.arg(&invocation.endpoint);

    cmd
}

fn kbps(value: u32) -> String {
    format!("{}k", value)
}
