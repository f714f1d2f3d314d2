use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error("Invalid {name}: {value}. Must be at least 1")]
    InvalidInterval { name: &'static str, value: usize },

    #[error("Invalid diagnosis rounds: {0}. Must be at least 1")]
    InvalidRounds(u32),

    #[error("Invalid temperature: {0}. Must be between 0.0 and 2.0")]
    InvalidTemperature(f32),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Sandbox program cannot be empty")]
    EmptySandboxProgram,

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .rpg-forge/config.yaml (project config)
    /// 3. .rpg-forge/local.yaml (project local overrides, optional)
    /// 4. Environment variables (RPG_FORGE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".rpg-forge/config.yaml"))
            .merge(Yaml::file(".rpg-forge/local.yaml"))
            .merge(Env::prefixed("RPG_FORGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still
    /// apply on top.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("RPG_FORGE_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let generation = &config.generation;
        if generation.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(generation.max_retries));
        }
        if generation.progress_interval == 0 {
            return Err(ConfigError::InvalidInterval {
                name: "progress_interval",
                value: 0,
            });
        }
        if generation.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidInterval {
                name: "checkpoint_interval",
                value: 0,
            });
        }
        if generation.checkpoint_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "checkpoint_path cannot be empty".to_string(),
            ));
        }

        let diagnosis = &config.diagnosis;
        if diagnosis.rounds == 0 {
            return Err(ConfigError::InvalidRounds(diagnosis.rounds));
        }
        #[allow(clippy::cast_precision_loss)]
        let hottest =
            diagnosis.base_temperature + diagnosis.temperature_step * (diagnosis.rounds - 1) as f32;
        for temperature in [diagnosis.base_temperature, hottest] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidTemperature(temperature));
            }
        }

        if config.llm.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(config.llm.requests_per_second));
        }
        if config.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm.max_tokens must be at least 1".to_string(),
            ));
        }

        if config.sandbox.program.trim().is_empty() {
            return Err(ConfigError::EmptySandboxProgram);
        }
        if config.sandbox.implementation_file == config.sandbox.test_file {
            return Err(ConfigError::ValidationFailed(
                "sandbox implementation_file and test_file must differ".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
