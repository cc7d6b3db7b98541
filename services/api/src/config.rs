//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Gemini's OpenAI-compatible endpoint, used when a Gemini key is configured.
pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where the case and normative-document collections live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageTarget {
    /// A SQLite database, e.g. `sqlite://lexchile.db`.
    Sqlite(String),
    /// Process memory; nothing survives a restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageTarget,
    pub log_level: Level,
    pub ai_api_key: String,
    /// `None` means the client library's default (OpenAI).
    pub ai_api_base: Option<String>,
    pub assistant_model: String,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        // --- Server and storage settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "127.0.0.1:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var_or("DATABASE_URL", "sqlite://lexchile.db");
        let storage = if database_url.eq_ignore_ascii_case("memory") {
            StorageTarget::Memory
        } else if database_url.starts_with("sqlite:") {
            StorageTarget::Sqlite(database_url)
        } else {
            return Err(ConfigError::InvalidValue(
                "DATABASE_URL".to_string(),
                format!("'{}' is neither a sqlite: URL nor 'memory'", database_url),
            ));
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- AI provider ---
        let (ai_api_key, default_base) = match (lookup("GEMINI_API_KEY"), lookup("OPENAI_API_KEY")) {
            (Some(key), _) => (key, Some(GEMINI_OPENAI_BASE.to_string())),
            (None, Some(key)) => (key, None),
            (None, None) => return Err(ConfigError::MissingVar("GEMINI_API_KEY".to_string())),
        };
        let ai_api_base = lookup("AI_API_BASE").or(default_base);
        let assistant_model = var_or("ASSISTANT_MODEL", "gemini-2.5-flash");

        // --- Browser client ---
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");
        let max_upload_str = var_or("MAX_UPLOAD_BYTES", "20971520");
        let max_upload_bytes = max_upload_str.parse::<usize>().map_err(|e| {
            ConfigError::InvalidValue("MAX_UPLOAD_BYTES".to_string(), e.to_string())
        })?;

        Ok(Self {
            bind_address,
            storage,
            log_level,
            ai_api_key,
            ai_api_base,
            assistant_model,
            cors_origin,
            max_upload_bytes,
        })
    }
}
