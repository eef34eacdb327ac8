use crate::error::{Result, WizardError};
use crate::session::InteractionMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Root URL of the testing backend
    pub base_url: String,

    /// Timeout for a single backend request (ms)
    pub request_timeout_ms: u64,

    /// Delay between run status polls (ms)
    pub poll_interval_ms: u64,

    /// Give up polling a run after this many fetches
    pub max_poll_attempts: u32,

    /// Mode a new session starts in
    pub initial_mode: InteractionMode,

    /// Where run records and reports are written
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout_ms: 30_000,
            poll_interval_ms: 1000,
            max_poll_attempts: 120,
            initial_mode: InteractionMode::StepBased,
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl Config {
    /// Read a YAML config file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, else defaults, then apply environment overrides
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `NEXUS_API_URL` and `NEXUS_POLL_INTERVAL_MS` override the file
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("NEXUS_API_URL").filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(ms) = lookup("NEXUS_POLL_INTERVAL_MS") {
            match ms.trim().parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => log::warn!("ignoring NEXUS_POLL_INTERVAL_MS={}", ms),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(WizardError::Config("baseUrl is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WizardError::Config(format!(
                "baseUrl must start with http:// or https://, got '{}'",
                url
            )));
        }
        if self.max_poll_attempts == 0 {
            return Err(WizardError::Config(
                "maxPollAttempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
