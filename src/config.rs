//! Connection parameters, read from `diary.toml` and the environment.

use crate::backend::FirebaseSettings;
use crate::diary_state::DEFAULT_COLLECTION;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Live queries never poll faster than this.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const CONFIG_FILE: &str = "diary.toml";
pub const CONFIG_ENV: &str = "DIARY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown backend '{0}' (expected 'firebase' or 'memory')")]
    UnknownBackend(String),

    #[error("Missing '{0}' (set it in diary.toml or the environment)")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Firebase,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "firebase" => Ok(BackendKind::Firebase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiaryConfig {
    pub backend: BackendKind,
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub collection: String,
    pub poll_interval_ms: u64,
    pub log_file: PathBuf,
    /// Overrides for pointing at local emulators.
    pub identity_url: Option<String>,
    pub token_url: Option<String>,
    pub firestore_url: Option<String>,
}

impl Default for DiaryConfig {
    fn default() -> Self {
        DiaryConfig {
            backend: BackendKind::Firebase,
            api_key: None,
            project_id: None,
            collection: DEFAULT_COLLECTION.to_string(),
            poll_interval_ms: 1000,
            log_file: PathBuf::from("diary.log"),
            identity_url: None,
            token_url: None,
            firestore_url: None,
        }
    }
}

impl DiaryConfig {
    /// Reads the config file (if present) and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            DiaryConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(backend) = lookup("DIARY_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(api_key) = lookup("DIARY_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(project_id) = lookup("DIARY_PROJECT_ID") {
            self.project_id = Some(project_id);
        }
        Ok(())
    }

    pub fn firebase_settings(&self) -> Result<FirebaseSettings, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::Missing("api_key"))?;
        let project_id = self
            .project_id
            .clone()
            .ok_or(ConfigError::Missing("project_id"))?;

        let mut settings = FirebaseSettings::new(api_key, project_id);
        settings.poll_interval =
            Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL);
        if let Some(url) = &self.identity_url {
            settings.identity_url = url.clone();
        }
        if let Some(url) = &self.token_url {
            settings.token_url = url.clone();
        }
        if let Some(url) = &self.firestore_url {
            settings.firestore_url = url.clone();
        }
        Ok(settings)
    }
}
