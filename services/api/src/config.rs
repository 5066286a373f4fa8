//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use lingo_core::config::{OrchestratorConfig, DEFAULT_CORRECTION_REWARD, DEFAULT_LESSON_REWARD};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub detect_model: String,
    pub correction_model: String,
    pub tutor_model: String,
    pub detect_debounce: Duration,
    pub upstream_timeout: Duration,
    pub local_data_dir: PathBuf,
    pub cors_origin: String,
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

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY");

        // --- Load Adapter-specific Settings ---
        let detect_model = var_or("DETECT_MODEL", "gpt-4o-mini");
        let correction_model = var_or("CORRECTION_MODEL", "gpt-3.5-turbo");
        let tutor_model = var_or("TUTOR_MODEL", "gpt-3.5-turbo");

        // --- Load Orchestrator Timing ---
        let debounce_ms: u64 = parse_var("DETECT_DEBOUNCE_MS", &var_or("DETECT_DEBOUNCE_MS", "600"))?;
        let timeout_secs: u64 =
            parse_var("UPSTREAM_TIMEOUT_SECS", &var_or("UPSTREAM_TIMEOUT_SECS", "12"))?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let local_data_dir = PathBuf::from(var_or("LOCAL_DATA_DIR", "./data/local"));
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            detect_model,
            correction_model,
            tutor_model,
            detect_debounce: Duration::from_millis(debounce_ms),
            upstream_timeout: Duration::from_secs(timeout_secs),
            local_data_dir,
            cors_origin,
        })
    }

    /// Timing and reward settings handed to every correction session.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            debounce: self.detect_debounce,
            upstream_timeout: self.upstream_timeout,
            correction_reward: DEFAULT_CORRECTION_REWARD,
            lesson_reward: DEFAULT_LESSON_REWARD,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
