use crate::constants::{
    APP_NAME, DEFAULT_READY_TIMEOUT_SECS, DISCORD_API_BASE, SETTLE_INTERVAL_SECS, TARGET_SIZE_KB,
    UPLOAD_SIZE_LIMIT_BYTES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Missing setting: {0}")]
    Missing(&'static str),
    #[error("Setting must be greater than zero: {0}")]
    Zero(&'static str),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub video_directory: PathBuf,
    pub discord_token: Option<String>,
    pub channel_id: Option<u64>,
    pub discord_api_base: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ready_timeout_secs: u64,
    pub settle_interval_secs: u64,
    pub size_limit_bytes: u64,
    pub target_size_kb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_directory: dirs::video_dir()
                .map(|videos| videos.join("Captures"))
                .unwrap_or_else(|| PathBuf::from(".")),
            discord_token: None,
            channel_id: None,
            discord_api_base: DISCORD_API_BASE.to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            settle_interval_secs: SETTLE_INTERVAL_SECS,
            size_limit_bytes: UPLOAD_SIZE_LIMIT_BYTES,
            target_size_kb: TARGET_SIZE_KB,
        }
    }
}

// Keeps the bot token out of logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("video_directory", &self.video_directory)
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "<redacted>"),
            )
            .field("channel_id", &self.channel_id)
            .field("discord_api_base", &self.discord_api_base)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffprobe_path", &self.ffprobe_path)
            .field("ready_timeout_secs", &self.ready_timeout_secs)
            .field("settle_interval_secs", &self.settle_interval_secs)
            .field("size_limit_bytes", &self.size_limit_bytes)
            .field("target_size_kb", &self.target_size_kb)
            .finish()
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config_dir| config_dir.join(APP_NAME).join("config.json"))
    }

    /// Loads the config file. An explicitly named file must exist and parse;
    /// the default location falls back to defaults with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let Some(config_path) = Self::default_path() else {
                    tracing::warn!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                };

                if !config_path.exists() {
                    tracing::info!("Config file doesn't exist, using defaults");
                    return Ok(Self::default());
                }

                match Self::read(&config_path) {
                    Ok(config) => Ok(config),
                    Err(e) => {
                        tracing::warn!("{}, using defaults", e);
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!("Config loaded from: {:?}", path);
        Ok(config)
    }

    /// Applies `VIDRELAY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(token) = var("VIDRELAY_DISCORD_TOKEN") {
            self.discord_token = Some(token);
        }
        if let Some(value) = var("VIDRELAY_CHANNEL_ID") {
            let id = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "VIDRELAY_CHANNEL_ID",
                value: value.clone(),
            })?;
            self.channel_id = Some(id);
        }
        if let Some(dir) = var("VIDRELAY_VIDEO_DIRECTORY") {
            self.video_directory = PathBuf::from(dir);
        }
        if let Some(ffmpeg) = var("VIDRELAY_FFMPEG") {
            self.ffmpeg_path = ffmpeg;
        }
        if let Some(ffprobe) = var("VIDRELAY_FFPROBE") {
            self.ffprobe_path = ffprobe;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.discord_token {
            Some(token) if !token.trim().is_empty() => {}
            _ => return Err(ConfigError::Missing("discord_token")),
        }
        if self.channel_id.is_none() {
            return Err(ConfigError::Missing("channel_id"));
        }
        for (name, value) in [
            ("ready_timeout_secs", self.ready_timeout_secs),
            ("size_limit_bytes", self.size_limit_bytes),
            ("target_size_kb", self.target_size_kb),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_interval_secs)
    }
}
