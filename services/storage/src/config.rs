//! services/storage/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// The sweeper never runs more often than this, whatever is configured.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// What the expiry sweep assumes when a workspace's metadata is missing or corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetaFallback {
    /// Treat the workspace as never accessed, so it expires on the next sweep.
    #[default]
    Expire,
    /// Treat the workspace as created just now, so it gets a full TTL.
    Keep,
}

impl std::str::FromStr for MetaFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expire" => Ok(MetaFallback::Expire),
            "keep" => Ok(MetaFallback::Keep),
            other => Err(format!("'{}' is not one of: expire, keep", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub workspaces_root: PathBuf,
    pub legacy_workspaces_root: Option<PathBuf>,
    pub log_level: Level,
    /// Idle lifetime in hours; `<= 0` disables expiry.
    pub ttl_hours: f64,
    pub cleanup_interval: Duration,
    pub max_image_upload_bytes: u64,
    pub max_zip_upload_bytes: u64,
    pub meta_fallback: MetaFallback,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // --- Storage locations ---
        let workspaces_root = non_blank("MDPDF_WORKSPACES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./sessions"));
        let legacy_workspaces_root = non_blank("MDPDF_LEGACY_WORKSPACES_ROOT").map(PathBuf::from);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Lifecycle ---
        let ttl_hours: f64 = parse_or(&non_blank, "MDPDF_TTL_HOURS", 6.0)?;
        if !ttl_hours.is_finite() {
            return Err(ConfigError::InvalidValue(
                "MDPDF_TTL_HOURS".to_string(),
                "must be a finite number".to_string(),
            ));
        }
        let interval_secs: u64 = parse_or(&non_blank, "MDPDF_CLEANUP_INTERVAL_SECONDS", 600)?;
        let cleanup_interval = Duration::from_secs(interval_secs).max(MIN_CLEANUP_INTERVAL);

        // --- Upload ceilings ---
        let max_image_upload_bytes =
            parse_or(&non_blank, "MDPDF_MAX_IMAGE_UPLOAD_BYTES", 10 * 1024 * 1024)?;
        let max_zip_upload_bytes =
            parse_or(&non_blank, "MDPDF_MAX_ZIP_UPLOAD_BYTES", 50 * 1024 * 1024)?;

        let meta_fallback = match non_blank("MDPDF_META_FALLBACK") {
            Some(raw) => raw
                .parse::<MetaFallback>()
                .map_err(|e| ConfigError::InvalidValue("MDPDF_META_FALLBACK".to_string(), e))?,
            None => MetaFallback::default(),
        };

        Ok(Self {
            workspaces_root,
            legacy_workspaces_root,
            log_level,
            ttl_hours,
            cleanup_interval,
            max_image_upload_bytes,
            max_zip_upload_bytes,
            meta_fallback,
        })
    }

    /// The TTL as seconds, or `None` when expiry is disabled.
    pub fn ttl_seconds(&self) -> Option<f64> {
        (self.ttl_hours > 0.0).then(|| self.ttl_hours * 3600.0)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
