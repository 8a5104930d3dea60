//! Configuration management
//!
//! This module handles loading and parsing configuration for the lingocoach
//! session service. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session lifecycle policy values
    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/lingocoach.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session lifecycle policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How far in the past a booking's scheduled time may lie and still be accepted
    #[serde(default = "default_schedule_grace_seconds")]
    pub schedule_grace_seconds: u64,
    /// Minutes after the scheduled time before an unstarted session is swept to NO_SHOW
    #[serde(default = "default_no_show_after_minutes")]
    pub no_show_after_minutes: u64,
    /// Interval between no-show sweeps
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Whether the background no-show sweep runs at all
    #[serde(default = "default_sweep_enabled")]
    pub sweep_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            schedule_grace_seconds: default_schedule_grace_seconds(),
            no_show_after_minutes: default_no_show_after_minutes(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            sweep_enabled: default_sweep_enabled(),
        }
    }
}

/// Largest accepted booking grace (one week)
pub const MAX_SCHEDULE_GRACE_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Largest accepted no-show delay (one week)
pub const MAX_NO_SHOW_AFTER_MINUTES: u64 = 7 * 24 * 60;

/// Largest accepted sweep interval (one day)
pub const MAX_SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

impl SessionConfig {
    /// Grace tolerance for past scheduled times
    pub fn schedule_grace(&self) -> Duration {
        let seconds = self.schedule_grace_seconds.min(MAX_SCHEDULE_GRACE_SECONDS);
        Duration::try_seconds(seconds as i64).unwrap_or_else(Duration::zero)
    }

    /// Delay after which an unstarted session counts as a no-show
    pub fn no_show_after(&self) -> Duration {
        let minutes = self.no_show_after_minutes.min(MAX_NO_SHOW_AFTER_MINUTES);
        Duration::try_minutes(minutes as i64).unwrap_or_else(Duration::zero)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.sweep_interval_seconds
                .clamp(1, MAX_SWEEP_INTERVAL_SECONDS),
        )
    }

    /// Reject policy values outside their accepted ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "sessions.schedule_grace_seconds",
            self.schedule_grace_seconds,
            MAX_SCHEDULE_GRACE_SECONDS,
        )?;
        check_range(
            "sessions.no_show_after_minutes",
            self.no_show_after_minutes,
            MAX_NO_SHOW_AFTER_MINUTES,
        )?;
        check_range(
            "sessions.sweep_interval_seconds",
            self.sweep_interval_seconds,
            MAX_SWEEP_INTERVAL_SECONDS,
        )
    }
}

fn check_range(key: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange { key, value, max });
    }
    Ok(())
}

fn default_schedule_grace_seconds() -> u64 {
    300
}

fn default_no_show_after_minutes() -> u64 {
    15
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_sweep_enabled() -> bool {
    true
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Config value {key} = {value} is out of range (max {max})")]
    OutOfRange {
        key: &'static str,
        value: u64,
        max: u64,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    /// Policy values outside their accepted ranges are rejected.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.sessions.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - LINGOCOACH_SERVER_HOST
    /// - LINGOCOACH_SERVER_PORT
    /// - LINGOCOACH_SERVER_CORS_ORIGIN
    /// - LINGOCOACH_DATABASE_DRIVER
    /// - LINGOCOACH_DATABASE_URL
    /// - LINGOCOACH_SESSIONS_SCHEDULE_GRACE_SECONDS
    /// - LINGOCOACH_SESSIONS_NO_SHOW_AFTER_MINUTES
    /// - LINGOCOACH_SESSIONS_SWEEP_INTERVAL_SECONDS
    /// - LINGOCOACH_SESSIONS_SWEEP_ENABLED
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.sessions.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("LINGOCOACH_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("LINGOCOACH_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("LINGOCOACH_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("LINGOCOACH_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("LINGOCOACH_DATABASE_URL") {
            self.database.url = url;
        }

        if let Some(grace) = env_parse::<u64>("LINGOCOACH_SESSIONS_SCHEDULE_GRACE_SECONDS") {
            self.sessions.schedule_grace_seconds = grace;
        }
        if let Some(minutes) = env_parse::<u64>("LINGOCOACH_SESSIONS_NO_SHOW_AFTER_MINUTES") {
            self.sessions.no_show_after_minutes = minutes;
        }
        if let Some(interval) = env_parse::<u64>("LINGOCOACH_SESSIONS_SWEEP_INTERVAL_SECONDS") {
            self.sessions.sweep_interval_seconds = interval;
        }
        if let Some(enabled) = env_parse::<bool>("LINGOCOACH_SESSIONS_SWEEP_ENABLED") {
            self.sessions.sweep_enabled = enabled;
        }
    }
}

/// Read and parse an environment variable, ignoring unparsable values
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
