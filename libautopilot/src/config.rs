//! Configuration management for Autopilot

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AutopilotError, ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub autopilot: AutopilotConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Pipeline cadences and retry policy.
///
/// Durations are humantime strings ("1m", "24h") so the config file reads
/// the way operators write cron-ish intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotConfig {
    #[serde(default = "default_process_interval")]
    pub process_interval: String,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    #[serde(default = "default_retry_window")]
    pub retry_window: String,
    #[serde(default = "default_token_lookahead")]
    pub token_lookahead: String,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl: String,
}

fn default_process_interval() -> String {
    "1m".to_string()
}

fn default_retry_interval() -> String {
    "15m".to_string()
}

fn default_refresh_interval() -> String {
    "1h".to_string()
}

fn default_max_attempts() -> i64 {
    3
}

fn default_retry_window() -> String {
    "24h".to_string()
}

fn default_token_lookahead() -> String {
    "12h".to_string()
}

fn default_lease_ttl() -> String {
    "10m".to_string()
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            process_interval: default_process_interval(),
            retry_interval: default_retry_interval(),
            refresh_interval: default_refresh_interval(),
            max_attempts: default_max_attempts(),
            retry_window: default_retry_window(),
            token_lookahead: default_token_lookahead(),
            lease_ttl: default_lease_ttl(),
        }
    }
}

impl AutopilotConfig {
    pub fn process_interval_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.process_interval", &self.process_interval)
    }

    pub fn retry_interval_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.retry_interval", &self.retry_interval)
    }

    pub fn refresh_interval_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.refresh_interval", &self.refresh_interval)
    }

    pub fn retry_window_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.retry_window", &self.retry_window)
    }

    pub fn token_lookahead_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.token_lookahead", &self.token_lookahead)
    }

    pub fn lease_ttl_secs(&self) -> Result<i64> {
        parse_duration_secs("autopilot.lease_ttl", &self.lease_ttl)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default = "default_enabled_platforms")]
    pub enabled: Vec<String>,
}

fn default_enabled_platforms() -> Vec<String> {
    Platform::ALL.iter().map(|p| p.as_str().to_string()).collect()
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_platforms(),
        }
    }
}

impl PlatformsConfig {
    pub fn enabled_platforms(&self) -> Result<Vec<Platform>> {
        self.enabled
            .iter()
            .map(|name| {
                Platform::from_str(name)
                    .map_err(|e| AutopilotError::InvalidInput(format!("platforms.enabled: {}", e)))
            })
            .collect()
    }
}

fn parse_duration_secs(field: &str, value: &str) -> Result<i64> {
    let duration = humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })?;
    Ok(duration.as_secs() as i64)
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/autopilot/autopilot.db".to_string(),
            },
            autopilot: AutopilotConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AUTOPILOT_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("autopilot").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("autopilot"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_policy() {
        let config = Config::default_config();

        assert_eq!(config.autopilot.max_attempts, 3);
        assert_eq!(config.autopilot.process_interval_secs().unwrap(), 60);
        assert_eq!(config.autopilot.retry_interval_secs().unwrap(), 15 * 60);
        assert_eq!(config.autopilot.refresh_interval_secs().unwrap(), 3600);
        assert_eq!(config.autopilot.retry_window_secs().unwrap(), 24 * 3600);
        assert_eq!(config.autopilot.token_lookahead_secs().unwrap(), 12 * 3600);
        assert_eq!(config.autopilot.lease_ttl_secs().unwrap(), 600);
    }

    #[test]
    fn test_default_enables_all_platforms() {
        let config = Config::default_config();
        let platforms = config.platforms.enabled_platforms().unwrap();
        assert_eq!(platforms.len(), Platform::ALL.len());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
            [database]
            path = "/tmp/autopilot.db"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.path, "/tmp/autopilot.db");
        // Sections omitted entirely fall back to defaults
        assert_eq!(config.autopilot.max_attempts, 3);
        assert_eq!(config.platforms.enabled.len(), 6);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [database]
            path = "/tmp/autopilot.db"

            [autopilot]
            process_interval = "30s"
            retry_interval = "5m"
            refresh_interval = "2h"
            max_attempts = 5
            retry_window = "48h"
            token_lookahead = "6h"
            lease_ttl = "2m"

            [platforms]
            enabled = ["instagram", "linkedin"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.autopilot.process_interval_secs().unwrap(), 30);
        assert_eq!(config.autopilot.retry_interval_secs().unwrap(), 300);
        assert_eq!(config.autopilot.max_attempts, 5);
        assert_eq!(config.autopilot.retry_window_secs().unwrap(), 48 * 3600);
        assert_eq!(config.autopilot.lease_ttl_secs().unwrap(), 120);

        let platforms = config.platforms.enabled_platforms().unwrap();
        assert_eq!(platforms, vec![Platform::Instagram, Platform::LinkedIn]);
    }

    #[test]
    fn test_invalid_duration_is_config_error() {
        let config = AutopilotConfig {
            process_interval: "soonish".to_string(),
            ..Default::default()
        };

        let result = config.process_interval_secs();
        assert!(result.is_err());
        let message = format!("{}", result.unwrap_err());
        assert!(message.contains("autopilot.process_interval"));
        assert!(message.contains("soonish"));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let config = PlatformsConfig {
            enabled: vec!["instagram".to_string(), "friendster".to_string()],
        };

        assert!(config.enabled_platforms().is_err());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let result = Config::load_from_path(&PathBuf::from("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
