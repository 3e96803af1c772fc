// src/config.rs
// Transcriber configuration: optional JSON file, then environment overrides

use crate::orchestrator::DistributionOptions;
use crate::stt::defaults::{
    FASTER_WHISPER_BASE_URL, FASTER_WHISPER_MODEL, OPENAI_API_URL, OPENAI_MODEL,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 12_000;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FASTER_WHISPER_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_API_URL.to_string(),
            model: OPENAI_MODEL.to_string(),
            timeout_secs: DEFAULT_OPENAI_TIMEOUT_SECS,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FasterWhisperConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for FasterWhisperConfig {
    fn default() -> Self {
        Self {
            base_url: FASTER_WHISPER_BASE_URL.to_string(),
            model: FASTER_WHISPER_MODEL.to_string(),
            timeout_secs: DEFAULT_FASTER_WHISPER_TIMEOUT_SECS,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Parent directory for job workspaces; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            temp_dir: None,
        }
    }
}

impl JobConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub openai: OpenAiConfig,
    pub faster_whisper: FasterWhisperConfig,
    pub media: MediaConfig,
    pub job: JobConfig,
    pub distribution: DistributionOptions,
}

impl TranscriberConfig {
    /// Load `path` (if any), then apply `.env` and process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_WHISPER_MODEL") {
            self.openai.model = model;
        }
        if let Some(url) = lookup("WHISPER_BASE_URL") {
            self.faster_whisper.base_url = url;
        }
        if let Some(model) = lookup("WHISPER_MODEL") {
            self.faster_whisper.model = model;
        }
        if let Some(bin) = lookup("FFMPEG_BIN") {
            self.media.ffmpeg_bin = bin;
        }
        if let Some(bin) = lookup("FFPROBE_BIN") {
            self.media.ffprobe_bin = bin;
        }
        if let Some(dir) = lookup("TRANSCRIBE_TEMP_DIR") {
            self.job.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("TRANSCRIBE_JOB_TIMEOUT_SECS") {
            self.job.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRANSCRIBE_JOB_TIMEOUT_SECS".to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        self.openai.api_key = self
            .openai
            .api_key
            .take()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.openai.base_url = normalize_url(&self.openai.base_url, OPENAI_API_URL);
        self.openai.model = non_blank(&self.openai.model, OPENAI_MODEL);
        if self.openai.timeout_secs == 0 {
            self.openai.timeout_secs = DEFAULT_OPENAI_TIMEOUT_SECS;
        }

        self.faster_whisper.base_url =
            normalize_url(&self.faster_whisper.base_url, FASTER_WHISPER_BASE_URL);
        self.faster_whisper.model = non_blank(&self.faster_whisper.model, FASTER_WHISPER_MODEL);
        if self.faster_whisper.timeout_secs == 0 {
            self.faster_whisper.timeout_secs = DEFAULT_FASTER_WHISPER_TIMEOUT_SECS;
        }

        self.media.ffmpeg_bin = non_blank(&self.media.ffmpeg_bin, "ffmpeg");
        self.media.ffprobe_bin = non_blank(&self.media.ffprobe_bin, "ffprobe");

        if self.job.timeout_secs == 0 {
            self.job.timeout_secs = DEFAULT_JOB_TIMEOUT_SECS;
        }
        if self.job.probe_timeout_secs == 0 {
            self.job.probe_timeout_secs = DEFAULT_PROBE_TIMEOUT_SECS;
        }
        self.job.temp_dir = self
            .job
            .temp_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
    }
}

fn non_blank(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_url(value: &str, fallback: &str) -> String {
    non_blank(value, fallback).trim_end_matches('/').to_string()
}
