//! Runtime configuration.
//!
//! Layered: built-in defaults, then an optional JSON file named by
//! `DEMO_VAULT_CONFIG`, then `DEMO_VAULT_*` environment variables (a `.env`
//! file is honored).

use crate::services::archive::ExtractionLimits;
use crate::services::entry_point::DEFAULT_SEARCH_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "DEMO_VAULT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// Holds `webgl_extracted/`, `lms_extracted/` and `archives/`.
    pub media_root: PathBuf,
    pub database_url: String,
    /// Disables the permissive CORS header on served content.
    pub production: bool,
    /// Extract on upload; otherwise on the first request.
    pub eager_extraction: bool,
    pub extraction_timeout_secs: u64,
    pub lock_timeout_secs: u64,
    pub max_upload_bytes: u64,
    pub limits: ExtractionLimits,
    pub entry_search_depth: usize,
    /// Origins allowed to call the admin API. Empty means any.
    pub cors_origins: Vec<String>,
    /// Header carrying the user id set by the fronting auth layer.
    pub user_header: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            media_root: PathBuf::from("media"),
            database_url: "sqlite://demo_vault.db?mode=rwc".into(),
            production: false,
            eager_extraction: true,
            extraction_timeout_secs: 300,
            lock_timeout_secs: 30,
            max_upload_bytes: 1024 * 1024 * 1024,
            limits: ExtractionLimits::default(),
            entry_search_depth: DEFAULT_SEARCH_DEPTH,
            cors_origins: Vec::new(),
            user_header: "x-demo-user".into(),
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv(); // Try to load .env, ignore if missing
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `DEMO_VAULT_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEMO_VAULT_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("DEMO_VAULT_MEDIA_ROOT") {
            self.media_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("DEMO_VAULT_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("DEMO_VAULT_PRODUCTION") {
            self.production = parse_bool("DEMO_VAULT_PRODUCTION", &v)?;
        }
        if let Some(v) = lookup("DEMO_VAULT_EAGER_EXTRACTION") {
            self.eager_extraction = parse_bool("DEMO_VAULT_EAGER_EXTRACTION", &v)?;
        }
        if let Some(v) = lookup("DEMO_VAULT_EXTRACTION_TIMEOUT_SECS") {
            self.extraction_timeout_secs = parse_num("DEMO_VAULT_EXTRACTION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("DEMO_VAULT_LOCK_TIMEOUT_SECS") {
            self.lock_timeout_secs = parse_num("DEMO_VAULT_LOCK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("DEMO_VAULT_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_num("DEMO_VAULT_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("DEMO_VAULT_CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("DEMO_VAULT_USER_HEADER") {
            self.user_header = v.to_lowercase();
        }
        Ok(())
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
