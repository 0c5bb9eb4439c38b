// ABOUTME: Configuration loading for the parcel binary from PARCEL_* environment variables.
// ABOUTME: Token and label from the environment take precedence over values persisted in the store.

use std::path::PathBuf;
use std::time::Duration;

use parcel_store::{QueueStore, StoreError, settings};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

/// Runtime configuration for parcel.
#[derive(Debug, Clone)]
pub struct ParcelConfig {
    pub home: PathBuf,
    pub bot_token: Option<String>,
    pub device_label: Option<String>,
    pub api_base_url: String,
    pub retention: Duration,
    pub missing_file_grace: Duration,
    pub http_timeout: Duration,
    pub probe_addr: String,
    pub probe_interval: Duration,
}

impl ParcelConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Environment variables:
    /// - PARCEL_HOME: data directory (default: ~/.parcel)
    /// - PARCEL_BOT_TOKEN: bot API token (optional; falls back to `parcel configure`)
    /// - PARCEL_DEVICE_LABEL: label prefixed to operator notices (optional)
    /// - PARCEL_API_BASE_URL: bot API base URL (default: https://api.telegram.org)
    /// - PARCEL_RETENTION_DAYS: age after which artifact files are swept (default: 3)
    /// - PARCEL_MISSING_FILE_GRACE_SECS: wait before dropping a record whose file is missing (default: 0)
    /// - PARCEL_HTTP_TIMEOUT_SECS: per-request timeout (default: 60)
    /// - PARCEL_PROBE_ADDR: host:port probed for connectivity (default: api.telegram.org:443)
    /// - PARCEL_PROBE_INTERVAL_SECS: connectivity poll interval (default: 15)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("PARCEL_HOME")
            .ok()
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".parcel")
            });

        let api_base_url = env_nonempty("PARCEL_API_BASE_URL")
            .unwrap_or_else(|| parcel_delivery::bot_api::DEFAULT_BASE_URL.to_string());
        let probe_addr = env_nonempty("PARCEL_PROBE_ADDR")
            .unwrap_or_else(|| parcel_engine::connectivity::DEFAULT_PROBE_ADDR.to_string());

        let retention_days = env_u64("PARCEL_RETENTION_DAYS", 3)?;
        let grace_secs = env_u64("PARCEL_MISSING_FILE_GRACE_SECS", 0)?;
        let http_timeout_secs = env_u64(
            "PARCEL_HTTP_TIMEOUT_SECS",
            parcel_delivery::bot_api::DEFAULT_TIMEOUT.as_secs(),
        )?;
        let probe_interval_secs = env_u64(
            "PARCEL_PROBE_INTERVAL_SECS",
            parcel_engine::connectivity::DEFAULT_PROBE_INTERVAL.as_secs(),
        )?;

        if http_timeout_secs == 0 {
            return Err(ConfigError::MustBePositive("PARCEL_HTTP_TIMEOUT_SECS"));
        }
        if probe_interval_secs == 0 {
            return Err(ConfigError::MustBePositive("PARCEL_PROBE_INTERVAL_SECS"));
        }

        Ok(Self {
            home,
            bot_token: env_nonempty("PARCEL_BOT_TOKEN"),
            device_label: env_nonempty("PARCEL_DEVICE_LABEL"),
            api_base_url,
            retention: Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)),
            missing_file_grace: Duration::from_secs(grace_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            probe_addr,
            probe_interval: Duration::from_secs(probe_interval_secs),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.home.join("queue.db")
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    /// Bot token, preferring the environment over the persisted setting.
    pub fn resolve_token(&self, store: &QueueStore) -> Result<Option<String>, StoreError> {
        match &self.bot_token {
            Some(token) => Ok(Some(token.clone())),
            None => Ok(store
                .get_setting(settings::BOT_TOKEN)?
                .filter(|t| !t.trim().is_empty())),
        }
    }

    /// Device label, preferring the environment over the persisted setting.
    pub fn resolve_label(&self, store: &QueueStore) -> Result<String, StoreError> {
        match &self.device_label {
            Some(label) => Ok(label.clone()),
            None => Ok(store
                .get_setting(settings::DEVICE_LABEL)?
                .unwrap_or_default()),
        }
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env_nonempty(var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}
