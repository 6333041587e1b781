//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Values parsed but are inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Status HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Media asset layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    /// File name of the looped video
    #[serde(default = "default_video_file")]
    pub video_file: String,
    /// File names of the rotated audio tracks
    #[serde(default = "default_audio_files")]
    pub audio_files: Vec<String>,
    /// Explicit media directory; skips container detection when set
    #[serde(default)]
    pub media_dir: Option<PathBuf>,
    /// Marker file whose presence means we run inside a container
    #[serde(default = "default_container_marker")]
    pub container_marker: PathBuf,
    /// Media directory used inside a container
    #[serde(default = "default_container_media_dir")]
    pub container_media_dir: PathBuf,
}

fn default_video_file() -> String {
    "video.mp4".to_string()
}

fn default_audio_files() -> Vec<String> {
    (1..=7).map(|n| format!("{}.mp3", n)).collect()
}

fn default_container_marker() -> PathBuf {
    PathBuf::from("/.dockerenv")
}

fn default_container_media_dir() -> PathBuf {
    PathBuf::from("/usr/src/app/media")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_file: default_video_file(),
            audio_files: default_audio_files(),
            media_dir: None,
            container_marker: default_container_marker(),
            container_media_dir: default_container_media_dir(),
        }
    }
}

/// Ingest endpoint configuration
///
/// Every server shares the same stream key; the list order is the failover order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    #[serde(default)]
    pub stream_key: String,
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
}

fn default_servers() -> Vec<String> {
    vec![
        "rtmp://x.rtmp.youtube.com/live2".to_string(),
        "rtmp://a.rtmp.youtube.com/live2".to_string(),
        "rtmp://b.rtmp.youtube.com/live2".to_string(),
    ]
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream_key: String::new(),
            servers: default_servers(),
        }
    }
}

/// Encoder binary and tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_video_bitrate_kbps")]
    pub video_bitrate_kbps: u32,
    #[serde(default = "default_video_bitrate_kbps")]
    pub max_bitrate_kbps: u32,
    #[serde(default = "default_buffer_size_kbps")]
    pub buffer_size_kbps: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
}

fn default_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_video_bitrate_kbps() -> u32 {
    2000
}

fn default_buffer_size_kbps() -> u32 {
    4000
}

fn default_frame_rate() -> u32 {
    30
}

fn default_keyframe_interval() -> u32 {
    60
}

fn default_audio_bitrate_kbps() -> u32 {
    128
}

fn default_audio_sample_rate() -> u32 {
    44100
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            video_codec: default_video_codec(),
            preset: default_preset(),
            video_bitrate_kbps: default_video_bitrate_kbps(),
            max_bitrate_kbps: default_video_bitrate_kbps(),
            buffer_size_kbps: default_buffer_size_kbps(),
            frame_rate: default_frame_rate(),
            keyframe_interval: default_keyframe_interval(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            audio_sample_rate: default_audio_sample_rate(),
        }
    }
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Consecutive failures before the long backoff (derived from endpoint count if None)
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_success_delay_ms")]
    pub success_delay_ms: u64,
    #[serde(default = "default_backoff_delay_ms")]
    pub backoff_delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_success_delay_ms() -> u64 {
    1_000
}

fn default_backoff_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            retry_delay_ms: default_retry_delay_ms(),
            success_delay_ms: default_success_delay_ms(),
            backoff_delay_ms: default_backoff_delay_ms(),
        }
    }
}

/// Patterns recognised in encoder output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalConfig {
    /// Substrings meaning the ingest connection is up
    #[serde(default = "default_connected_patterns")]
    pub connected: Vec<String>,
    /// Substrings meaning the ingest connection failed
    #[serde(default = "default_failure_patterns")]
    pub connection_failure: Vec<String>,
    /// Minimum spacing between logged encoder output lines
    #[serde(default = "default_log_throttle_ms")]
    pub log_throttle_ms: u64,
}

fn default_connected_patterns() -> Vec<String> {
    vec!["Output #0".to_string()]
}

fn default_failure_patterns() -> Vec<String> {
    [
        "Connection refused",
        "Connection timed out",
        "Cannot open connection",
        "Failed to connect",
        "Error opening output",
        "Connection reset by peer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_throttle_ms() -> u64 {
    5_000
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            connected: default_connected_patterns(),
            connection_failure: default_failure_patterns(),
            log_throttle_ms: default_log_throttle_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub signals: SignalConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - PORT -> server.port
    /// - BIND_ADDRESS -> server.bind_address
    /// - STREAM_KEY -> ingest.stream_key
    /// - MEDIA_DIR -> media.media_dir
    /// - FFMPEG_BIN -> encoder.binary
    /// - MAX_RETRIES -> retry.max_retries
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(val) = env::var("BIND_ADDRESS") {
            if !val.trim().is_empty() {
                self.server.bind_address = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("STREAM_KEY") {
            if !val.trim().is_empty() {
                self.ingest.stream_key = val.trim().to_string();
            }
        }

        if let Ok(val) = env::var("MEDIA_DIR") {
            if !val.trim().is_empty() {
                self.media.media_dir = Some(PathBuf::from(val.trim()));
            }
        }

        if let Ok(val) = env::var("FFMPEG_BIN") {
            if !val.trim().is_empty() {
                self.encoder.binary = PathBuf::from(val.trim());
            }
        }

        if let Ok(val) = env::var("MAX_RETRIES") {
            if let Ok(retries) = val.parse::<u32>() {
                self.retry.max_retries = Some(retries);
            }
        }
    }

    /// Check that the configuration is internally consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.stream_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.stream_key is empty (set it in the config file or STREAM_KEY)".to_string(),
            ));
        }
        if self.ingest.servers.is_empty() {
            return Err(ConfigError::Invalid("ingest.servers must not be empty".to_string()));
        }
        if self.media.audio_files.is_empty() {
            return Err(ConfigError::Invalid("media.audio_files must not be empty".to_string()));
        }
        self.signals.validate()?;
        if matches!(self.retry.max_retries, Some(0)) {
            return Err(ConfigError::Invalid("retry.max_retries must be at least 1".to_string()));
        }
        self.encoder.validate()
    }

    /// Load configuration from file (if any), apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

impl SignalConfig {
    /// Check that every pattern has content and at least one connected pattern exists
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connected.is_empty() {
            return Err(ConfigError::Invalid(
                "signals.connected needs at least one pattern".to_string(),
            ));
        }
        if self.connected.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "signals.connected contains a blank pattern".to_string(),
            ));
        }
        if self.connection_failure.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "signals.connection_failure contains a blank pattern".to_string(),
            ));
        }
        Ok(())
    }
}

impl EncoderConfig {
    /// Check that rate control and GOP settings agree with each other
    ///
    /// - `video_bitrate_kbps <= max_bitrate_kbps <= buffer_size_kbps`
    /// - `keyframe_interval` is a positive multiple of `frame_rate`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("encoder.frame_rate must be positive".to_string()));
        }
        if self.video_bitrate_kbps > self.max_bitrate_kbps {
            return Err(ConfigError::Invalid(format!(
                "encoder.video_bitrate_kbps ({}) exceeds max_bitrate_kbps ({})",
                self.video_bitrate_kbps, self.max_bitrate_kbps
            )));
        }
        if self.buffer_size_kbps < self.max_bitrate_kbps {
            return Err(ConfigError::Invalid(format!(
                "encoder.buffer_size_kbps ({}) is smaller than max_bitrate_kbps ({})",
                self.buffer_size_kbps, self.max_bitrate_kbps
            )));
        }
        if self.keyframe_interval == 0 || self.keyframe_interval % self.frame_rate != 0 {
            return Err(ConfigError::Invalid(format!(
                "encoder.keyframe_interval ({}) must be a positive multiple of frame_rate ({})",
                self.keyframe_interval, self.frame_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("PORT");
        env::remove_var("BIND_ADDRESS");
        env::remove_var("STREAM_KEY");
        env::remove_var("MEDIA_DIR");
        env::remove_var("FFMPEG_BIN");
        env::remove_var("MAX_RETRIES");
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.ingest.stream_key = "abcd-efgh".to_string();
        config
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            port in 1u16..u16::MAX,
            key in "[a-z0-9]{4}-[a-z0-9]{4}",
            server_count in 1usize..5,
            audio_count in 1usize..10,
            max_retries in proptest::option::of(1u32..50),
            retry_delay in 0u64..60_000,
            backoff_delay in 0u64..600_000,
        ) {
            let servers: Vec<String> = (0..server_count)
                .map(|i| format!("\"rtmp://host{}.example.com/live\"", i))
                .collect();
            let audio: Vec<String> = (0..audio_count)
                .map(|i| format!("\"track{}.mp3\"", i))
                .collect();

            let toml_str = format!(
                r#"
[server]
port = {}

[media]
audio_files = [{}]

[ingest]
stream_key = "{}"
servers = [{}]

[retry]
{}
retry_delay_ms = {}
backoff_delay_ms = {}
"#,
                port,
                audio.join(", "),
                key,
                servers.join(", "),
                max_retries.map(|r| format!("max_retries = {}", r)).unwrap_or_default(),
                retry_delay,
                backoff_delay,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.server.port, port);
            prop_assert_eq!(config.media.audio_files.len(), audio_count);
            prop_assert_eq!(&config.ingest.stream_key, &key);
            prop_assert_eq!(config.ingest.servers.len(), server_count);
            prop_assert_eq!(config.retry.max_retries, max_retries);
            prop_assert_eq!(config.retry.retry_delay_ms, retry_delay);
            prop_assert_eq!(config.retry.backoff_delay_ms, backoff_delay);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_env_overrides_port(initial in 1u16..u16::MAX, override_port in 1u16..u16::MAX) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::parse_toml(&format!("[server]\nport = {}\n", initial))
                .expect("Valid TOML");

            env::set_var("PORT", override_port.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.server.port, override_port);
        }

        #[test]
        fn prop_env_overrides_max_retries(override_retries in 1u32..100) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::default();
            env::set_var("MAX_RETRIES", override_retries.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.retry.max_retries, Some(override_retries));
        }

        #[test]
        fn prop_consistent_encoder_tuning_validates(
            frame_rate in 1u32..120,
            gop_multiple in 1u32..10,
            max_rate in 100u32..20_000,
            headroom in 0u32..20_000,
        ) {
            let encoder = EncoderConfig {
                frame_rate,
                keyframe_interval: frame_rate * gop_multiple,
                video_bitrate_kbps: max_rate,
                max_bitrate_kbps: max_rate,
                buffer_size_kbps: max_rate + headroom,
                ..EncoderConfig::default()
            };
            prop_assert!(encoder.validate().is_ok());
        }
    }

    #[test]
    fn test_env_overrides_strings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("STREAM_KEY", "  wk7s-yxz0  ");
        env::set_var("MEDIA_DIR", "/srv/media");
        env::set_var("FFMPEG_BIN", "/opt/ffmpeg/bin/ffmpeg");
        env::set_var("BIND_ADDRESS", "127.0.0.1");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.ingest.stream_key, "wk7s-yxz0");
        assert_eq!(config.media.media_dir, Some(PathBuf::from("/srv/media")));
        assert_eq!(config.encoder.binary, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.server.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("PORT", "not-a-port");
        env::set_var("MAX_RETRIES", "-3");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.retry.max_retries, None);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.media.audio_files.len(), 7);
        assert_eq!(config.media.audio_files[0], "1.mp3");
        assert_eq!(config.media.container_marker, PathBuf::from("/.dockerenv"));
        assert_eq!(config.ingest.servers.len(), 3);
        assert_eq!(config.encoder.binary, PathBuf::from("ffmpeg"));
        assert_eq!(config.encoder.keyframe_interval, 60);
        assert_eq!(config.retry.max_retries, None);
        assert_eq!(config.retry.retry_delay_ms, 5_000);
        assert_eq!(config.retry.success_delay_ms, 1_000);
        assert_eq!(config.retry.backoff_delay_ms, 30_000);
        assert_eq!(config.signals.connected, vec!["Output #0".to_string()]);
        assert!(config.encoder.validate().is_ok());
    }

    #[test]
    fn test_missing_stream_key_is_rejected() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stream_key"));
    }

    #[test]
    fn test_empty_lists_are_rejected() {
        let mut config = valid_config();
        config.ingest.servers.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.media.audio_files.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.signals.connected.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.retry.max_retries = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_signal_patterns_are_rejected() {
        let config = Config::parse_toml(
            r#"
[ingest]
stream_key = "abcd-efgh"

[signals]
connected = [""]
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = valid_config();
        config.signals.connected = vec!["   ".to_string(), "Output #0".to_string()];
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.signals.connection_failure.push(String::new());
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.signals.connected = vec!["Stream mapping".to_string()];
        config.signals.connection_failure = vec!["Broken pipe".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_encoder_tuning_is_rejected() {
        let mut encoder = EncoderConfig::default();
        encoder.buffer_size_kbps = 1000;
        assert!(encoder.validate().is_err());

        let mut encoder = EncoderConfig::default();
        encoder.keyframe_interval = 45;
        assert!(encoder.validate().is_err());

        let mut encoder = EncoderConfig::default();
        encoder.video_bitrate_kbps = 3000;
        assert!(encoder.validate().is_err());

        let mut encoder = EncoderConfig::default();
        encoder.frame_rate = 0;
        assert!(encoder.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        env::set_var("STREAM_KEY", "from-env");
        let config = Config::load(None::<&Path>);
        clear_env_vars();

        let config = config.expect("defaults plus STREAM_KEY should be valid");
        assert_eq!(config.ingest.stream_key, "from-env");
    }
}
