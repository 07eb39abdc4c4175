// Persisted user settings (flat JSON document)
//
// Missing keys take their defaults and unknown keys are ignored, so older
// or hand-edited files keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::downloader::models::{default_destination, JobOptions};
use crate::downloader::orchestrator::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

const APP_DIR: &str = "rev-downloader";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown setting `{0}`")]
    UnknownKey(String),

    #[error("Invalid value {value:?} for setting `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("No per-user config directory on this system")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub download_path: PathBuf,
    /// "audio" or "video"
    pub download_type: String,
    pub audio_format: String,
    pub audio_quality: String,
    pub video_resolution: String,
    /// Video container
    pub video_format: String,
    /// Parallel downloads, 1..=10
    pub concurrent: usize,
    /// Expand playlists into individual jobs
    pub playlist: bool,
    pub playlist_limit: usize,
    pub subtitle: bool,
    pub subtitle_embed: bool,
    pub subtitle_lang: String,
    pub sponsorblock: bool,
    pub thumbnail: bool,
    pub metadata: bool,
    /// Hard limit per engine call
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Free space needed at the destination, in MB (0 disables the check)
    pub min_free_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let options = JobOptions::default();
        Self {
            download_path: default_destination(),
            download_type: options.media_kind,
            audio_format: options.audio_format,
            audio_quality: options.audio_quality,
            video_resolution: options.video_resolution,
            video_format: options.video_container,
            concurrent: DEFAULT_CONCURRENCY,
            playlist: options.expand_playlists,
            playlist_limit: options.playlist_limit,
            subtitle: options.subtitles,
            subtitle_embed: options.embed_subtitles,
            subtitle_lang: options.subtitle_lang,
            sponsorblock: options.sponsorblock,
            thumbnail: options.embed_thumbnail,
            metadata: options.embed_metadata,
            timeout_secs: 300,
            max_retries: 0,
            min_free_mb: options.min_free_mb,
        }
    }
}

/// `<config>/rev-downloader/settings.json`
pub fn default_path() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
        .ok_or(SettingsError::NoConfigDir)
}

impl Settings {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Self = serde_json::from_str(&content).map_err(|source| {
            SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Write as pretty JSON, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Set one key from its string form. Values are range-checked here;
    /// option names are validated when jobs are built.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let as_bool = || parse_bool(value).ok_or_else(invalid);
        let as_string = || value.trim().to_string();

        match key {
            "download_path" => self.download_path = PathBuf::from(value.trim()),
            "download_type" => self.download_type = as_string(),
            "audio_format" => self.audio_format = as_string(),
            "audio_quality" => self.audio_quality = as_string(),
            "video_resolution" => self.video_resolution = as_string(),
            "video_format" => self.video_format = as_string(),
            "concurrent" => {
                let n: usize = value.trim().parse().map_err(|_| invalid())?;
                if !(1..=MAX_CONCURRENCY).contains(&n) {
                    return Err(invalid());
                }
                self.concurrent = n;
            }
            "playlist" => self.playlist = as_bool()?,
            "playlist_limit" => {
                self.playlist_limit = value.trim().parse().map_err(|_| invalid())?
            }
            "subtitle" => self.subtitle = as_bool()?,
            "subtitle_embed" => self.subtitle_embed = as_bool()?,
            "subtitle_lang" => self.subtitle_lang = as_string(),
            "sponsorblock" => self.sponsorblock = as_bool()?,
            "thumbnail" => self.thumbnail = as_bool()?,
            "metadata" => self.metadata = as_bool()?,
            "timeout_secs" => {
                let secs: u64 = value.trim().parse().map_err(|_| invalid())?;
                if secs == 0 {
                    return Err(invalid());
                }
                self.timeout_secs = secs;
            }
            "max_retries" => self.max_retries = value.trim().parse().map_err(|_| invalid())?,
            "min_free_mb" => self.min_free_mb = value.trim().parse().map_err(|_| invalid())?,
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Option set handed to the job builder
    pub fn to_job_options(&self) -> JobOptions {
        JobOptions {
            media_kind: self.download_type.clone(),
            audio_format: self.audio_format.clone(),
            audio_quality: self.audio_quality.clone(),
            video_resolution: self.video_resolution.clone(),
            video_container: self.video_format.clone(),
            destination: self.download_path.clone(),
            expand_playlists: self.playlist,
            playlist_limit: self.playlist_limit,
            embed_metadata: self.metadata,
            embed_thumbnail: self.thumbnail,
            subtitles: self.subtitle,
            subtitle_lang: self.subtitle_lang.clone(),
            embed_subtitles: self.subtitle_embed,
            sponsorblock: self.sponsorblock,
            min_free_mb: self.min_free_mb,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.concurrent, 3);
        assert_eq!(settings.playlist_limit, 50);
        assert_eq!(settings.timeout_secs, 300);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            r#"{"download_type": "video", "concurrent": 5, "settings_collapsed": true}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.download_type, "video");
        assert_eq!(settings.concurrent, 5);
        assert_eq!(settings.audio_format, "mp3");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.set("audio_format", "flac").unwrap();
        settings.set("sponsorblock", "yes").unwrap();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.audio_format, "flac");
        assert!(loaded.sponsorblock);
    }

    #[test]
    fn set_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.set("concurrent", "11"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            settings.set("thumbnail", "maybe"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            settings.set("theme", "dark"),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn maps_to_job_options() {
        let mut settings = Settings::default();
        settings.video_format = "mkv".to_string();
        settings.subtitle = true;

        let options = settings.to_job_options();
        assert_eq!(options.video_container, "mkv");
        assert!(options.subtitles);
        assert_eq!(options.destination, settings.download_path);
    }
}
