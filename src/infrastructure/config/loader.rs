//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::model::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid bus kind: {0}. Must be one of: memory, kafka")]
    InvalidBusKind(String),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid scheduler poll interval: {0}s. Must be between 1 and 5 seconds")]
    InvalidPollInterval(u64),

    #[error("Reminder retry ladder cannot be empty")]
    EmptyRetryLadder,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. taskfabric.yaml in the working directory
    /// 3. Environment variables (TASKFABRIC_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("taskfabric.yaml"))
            .merge(Env::prefixed("TASKFABRIC_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("TASKFABRIC_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_bus_kinds = ["memory", "kafka"];
        if !valid_bus_kinds.contains(&config.bus.kind.as_str()) {
            return Err(ConfigError::InvalidBusKind(config.bus.kind.clone()));
        }

        if config.publish.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.publish.max_attempts));
        }

        if config.scheduler.poll_interval_secs == 0 || config.scheduler.poll_interval_secs > 5 {
            return Err(ConfigError::InvalidPollInterval(config.scheduler.poll_interval_secs));
        }

        if config.reminders.retry_delays_secs.is_empty() {
            return Err(ConfigError::EmptyRetryLadder);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn rejects_bad_bus_kind() {
        let mut config = Config::default();
        config.bus.kind = "carrier-pigeon".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBusKind(_))
        ));
    }

    #[test]
    fn rejects_slow_scheduler_poll() {
        let mut config = Config::default();
        config.scheduler.poll_interval_secs = 30;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPollInterval(30))
        ));
    }

    #[test]
    fn rejects_empty_retry_ladder() {
        let mut config = Config::default();
        config.reminders.retry_delays_secs.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyRetryLadder)
        ));
    }
}
