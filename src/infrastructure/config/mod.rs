//! Hierarchical configuration loading: programmatic defaults, a project
//! config file, an optional local override file, then environment
//! variables, highest precedence last.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::PentecterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_parallel_recon: {0}, must be at least 1")]
    InvalidMaxParallelRecon(usize),

    #[error("invalid stall_threshold: {0}, must be at least 1")]
    InvalidStallThreshold(u32),

    #[error("invalid think_retry_attempts: {0}, must be at least 1")]
    InvalidThinkRetryAttempts(u32),

    #[error("invalid log level: {0}, must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Loads and validates `PentecterConfig` from the layered sources a
/// session pulls from.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): programmatic defaults,
    /// `.pentecter/config.yaml`, `.pentecter/local.yaml`, then
    /// `PENTECTER_*` environment variables.
    pub fn load() -> Result<PentecterConfig> {
        let config: PentecterConfig = Figment::new()
            .merge(Serialized::defaults(PentecterConfig::default()))
            .merge(Yaml::file(".pentecter/config.yaml"))
            .merge(Yaml::file(".pentecter/local.yaml"))
            .merge(Env::prefixed("PENTECTER_").split("__"))
            .extract()
            .context("failed to extract configuration")?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<PentecterConfig> {
        let config: PentecterConfig = Figment::new()
            .merge(Serialized::defaults(PentecterConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &PentecterConfig) -> Result<(), ConfigError> {
        if config.max_parallel_recon == 0 {
            return Err(ConfigError::InvalidMaxParallelRecon(config.max_parallel_recon));
        }
        if config.stall_threshold == 0 {
            return Err(ConfigError::InvalidStallThreshold(config.stall_threshold));
        }
        if config.think_retry_attempts == 0 {
            return Err(ConfigError::InvalidThinkRetryAttempts(config.think_retry_attempts));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.log.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log.level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PentecterConfig::default();
        ConfigLoader::validate(&config).expect("default config should validate");
    }

    #[test]
    fn zero_max_parallel_recon_rejected() {
        let mut config = PentecterConfig::default();
        config.max_parallel_recon = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxParallelRecon(0))
        ));
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = PentecterConfig::default();
        config.log.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn yaml_file_merges_over_defaults() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_parallel_recon: 5\nstall_threshold: 7").unwrap();
        file.flush().unwrap();
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_parallel_recon, 5);
        assert_eq!(config.stall_threshold, 7);
        assert_eq!(config.max_sub_agent_turns, 10); // default preserved
    }
}
