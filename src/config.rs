//! Application configuration.
//!
//! Values are layered: built-in defaults, then `<app_dir>/config.toml`, then environment
//! variables. Only the API settings and the update repository can be set from the environment.

use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_API_BASE_URL: &str = "DAYFLOW_API_BASE_URL";
pub const ENV_API_KEY: &str = "DAYFLOW_API_KEY";
pub const ENV_API_MODEL: &str = "DAYFLOW_API_MODEL";
pub const ENV_UPDATE_REPO: &str = "DAYFLOW_UPDATE_REPO";

pub const DEFAULT_API_BASE_URL: &str = "https://apis.iflow.cn/v1";
pub const DEFAULT_API_MODEL: &str = "qwen3-vl-plus";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub recording: RecordingConfig,
    pub analysis: AnalysisConfig,
    pub update: UpdateConfig,
}

/// Connection to an OpenAI compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            api_key: String::new(),
            model: DEFAULT_API_MODEL.into(),
            timeout_secs: 120,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub frame_interval_ms: u64,
    pub chunk_duration_secs: u64,
    pub afk_threshold_secs: u32,
    pub max_frame_width: u32,
    pub max_frame_height: u32,
    pub jpeg_quality: u8,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000,
            chunk_duration_secs: 60,
            afk_threshold_secs: 120,
            max_frame_width: 1280,
            max_frame_height: 720,
            jpeg_quality: 70,
        }
    }
}

impl RecordingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs(self.chunk_duration_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames sampled from a chunk and sent to the model.
    pub max_frames: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Amount of previous cards described to the model for continuity.
    pub context_cards: usize,
    /// A chunk is abandoned after this many failed analyses.
    pub max_attempts: u32,
    pub retry_interval_secs: u64,
    pub http_retries: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_frames: 8,
            temperature: 0.3,
            max_tokens: 4096,
            context_cards: 3,
            max_attempts: 3,
            retry_interval_secs: 300,
            http_retries: 3,
        }
    }
}

impl AnalysisConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateConfig {
    /// GitHub repository in `owner/name` form. Defaults to the repository the crate was built
    /// from.
    pub repository: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repository: github_repository(env!("CARGO_PKG_REPOSITORY")),
        }
    }
}

/// Extracts `owner/name` from a GitHub URL.
pub fn github_repository(url: &str) -> Option<String> {
    let path = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .strip_prefix("https://github.com/")?;
    let mut parts = path.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
            Some(path.to_string())
        }
        _ => None,
    }
}

impl Config {
    /// Loads configuration for the given application directory.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                info!("Loading configuration from {path:?}");
                Self::from_toml(&content)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at {path:?}, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment lookups are injected so tests don't have to touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api.api_key = key;
        }
        if let Some(model) = lookup(ENV_API_MODEL).filter(|v| !v.is_empty()) {
            self.api.model = model;
        }
        if let Some(repo) = lookup(ENV_UPDATE_REPO).filter(|v| !v.is_empty()) {
            self.update.repository = Some(repo);
        }
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        let recording = &self.recording;
        if recording.frame_interval_ms == 0 {
            bail!("recording.frame_interval_ms must be positive");
        }
        if recording.chunk_duration_secs == 0 {
            bail!("recording.chunk_duration_secs must be positive");
        }
        if recording.max_frame_width == 0 || recording.max_frame_height == 0 {
            bail!("recording frame bounds must be positive");
        }
        if !(1..=100).contains(&recording.jpeg_quality) {
            bail!(
                "recording.jpeg_quality must be within 1..=100, got {}",
                recording.jpeg_quality
            );
        }
        if self.analysis.max_frames == 0 {
            bail!("analysis.max_frames must be positive");
        }
        if self.analysis.retry_interval_secs == 0 {
            bail!("analysis.retry_interval_secs must be positive");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be positive");
        }
        Ok(())
    }
}
