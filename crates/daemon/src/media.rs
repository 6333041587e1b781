//! Media library for loopcast
//!
//! Resolves the looped video and the audio pool once at startup and checks
//! that every file is present before the encoder is launched.

use crate::config::MediaConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for media operations
#[derive(Debug, Error)]
pub enum MediaError {
    /// One or more required files are absent
    #[error("Missing media asset(s): {}", format_paths(.0))]
    MissingAsset(Vec<PathBuf>),

    /// The configured audio pool has no entries
    #[error("Audio pool is empty")]
    EmptyAudioPool,
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the media directory came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLayout {
    /// Directory all asset names are resolved against
    pub media_dir: PathBuf,
    /// True when the container marker file was found
    pub is_container: bool,
}

impl MediaLayout {
    /// Pick the media directory
    ///
    /// An explicit `media_dir` wins. Otherwise the container media directory is
    /// used when the marker file exists, and the working directory when it does not.
    pub fn detect(cfg: &MediaConfig) -> Self {
        let is_container = cfg.container_marker.exists();

        let media_dir = match &cfg.media_dir {
            Some(dir) => dir.clone(),
            None if is_container => cfg.container_media_dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };

        Self {
            media_dir,
            is_container,
        }
    }
}

/// The fixed video asset and the ordered audio pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLibrary {
    layout: MediaLayout,
    video_path: PathBuf,
    audio_paths: Vec<PathBuf>,
}

impl MediaLibrary {
    /// Resolve the configured asset names against the detected layout
    pub fn from_config(cfg: &MediaConfig) -> Result<Self, MediaError> {
        Self::resolve(MediaLayout::detect(cfg), &cfg.video_file, &cfg.audio_files)
    }

    /// Resolve asset names against an explicit layout
    pub fn resolve<S: AsRef<str>>(
        layout: MediaLayout,
        video_file: &str,
        audio_files: &[S],
    ) -> Result<Self, MediaError> {
        if audio_files.is_empty() {
            return Err(MediaError::EmptyAudioPool);
        }

        let video_path = layout.media_dir.join(video_file);
        let audio_paths = audio_files
            .iter()
            .map(|name| layout.media_dir.join(name.as_ref()))
            .collect();

        Ok(Self {
            layout,
            video_path,
            audio_paths,
        })
    }

    /// Confirm the video and every audio track exist
    ///
    /// The error lists all missing files, not just the first one found.
    pub fn validate(&self) -> Result<(), MediaError> {
        let missing: Vec<PathBuf> = std::iter::once(&self.video_path)
            .chain(self.audio_paths.iter())
            .filter(|path| !path.is_file())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MediaError::MissingAsset(missing))
        }
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn audio_paths(&self) -> &[PathBuf] {
        &self.audio_paths
    }

    /// Number of audio tracks in the pool (never zero)
    pub fn audio_count(&self) -> usize {
        self.audio_paths.len()
    }

    /// Audio path at `index`; panics on an out-of-range index
    pub fn audio_path(&self, index: usize) -> &Path {
        &self.audio_paths[index]
    }

    pub fn video_name(&self) -> String {
        base_name(&self.video_path)
    }

    pub fn audio_name(&self, index: usize) -> String {
        base_name(self.audio_path(index))
    }

    pub fn audio_names(&self) -> Vec<String> {
        self.audio_paths.iter().map(|p| base_name(p)).collect()
    }
}

/// File name component of a path, lossily converted
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
