//! Cartsync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CARTSYNC_API_URL` - Base URL of the cart service (default: <http://localhost:8888>)
//! - `CARTSYNC_STORE_DIR` - Directory for the local store (default: .cartsync)
//! - `CARTSYNC_DIVERGENCE_LIMIT` - Failed syncs before a forced re-fetch, 0 disables (default: 3)
//! - `CARTSYNC_WARNING_CAPACITY` - Buffered sync warnings per subscriber (default: 64)
//! - `CARTSYNC_USER_ID` - Signed-in user ID (requires `CARTSYNC_ACCESS_TOKEN`)
//! - `CARTSYNC_ACCESS_TOKEN` - Bearer token for the cart service (requires `CARTSYNC_USER_ID`)
//! - `CARTSYNC_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use cartsync_core::UserId;

use crate::engine::{DEFAULT_DIVERGENCE_LIMIT, DEFAULT_WARNING_CAPACITY};
use crate::identity::Identity;

const DEFAULT_API_URL: &str = "http://localhost:8888";
const DEFAULT_STORE_DIR: &str = ".cartsync";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

/// Cartsync configuration.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// Base URL of the remote cart service
    pub api_url: Url,
    /// Directory holding the file-backed local store
    pub store_dir: PathBuf,
    /// Consecutive remote failures before a forced re-fetch
    pub divergence_limit: Option<u32>,
    /// Buffered warnings per subscriber
    pub warning_capacity: usize,
    /// Identity to start with, if any
    pub identity: Option<Identity>,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is invalid or only one half of the
    /// identity pair is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = get_env_or_default(&vars, "CARTSYNC_API_URL", DEFAULT_API_URL);
        let api_url = Url::parse(&api_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CARTSYNC_API_URL".to_string(), e.to_string())
        })?;

        let store_dir = PathBuf::from(get_env_or_default(
            &vars,
            "CARTSYNC_STORE_DIR",
            DEFAULT_STORE_DIR,
        ));

        let divergence_limit = match vars("CARTSYNC_DIVERGENCE_LIMIT") {
            Some(value) => parse_var::<u32>("CARTSYNC_DIVERGENCE_LIMIT", &value)?,
            None => DEFAULT_DIVERGENCE_LIMIT,
        };
        let divergence_limit = (divergence_limit > 0).then_some(divergence_limit);

        let warning_capacity = match vars("CARTSYNC_WARNING_CAPACITY") {
            Some(value) => parse_var::<usize>("CARTSYNC_WARNING_CAPACITY", &value)?,
            None => DEFAULT_WARNING_CAPACITY,
        };

        let log_format = match vars("CARTSYNC_LOG_FORMAT") {
            Some(value) => parse_var::<LogFormat>("CARTSYNC_LOG_FORMAT", &value)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            api_url,
            store_dir,
            divergence_limit,
            warning_capacity,
            identity: identity_from_vars(&vars)?,
            log_format,
            sentry_dsn: vars("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an environment variable with a default value.
fn get_env_or_default(vars: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    vars(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable, naming it in the error.
fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Both identity variables or neither.
fn identity_from_vars(
    vars: &impl Fn(&str) -> Option<String>,
) -> Result<Option<Identity>, ConfigError> {
    let user_id = vars("CARTSYNC_USER_ID").filter(|v| !v.is_empty());
    let token = vars("CARTSYNC_ACCESS_TOKEN").filter(|v| !v.is_empty());

    match (user_id, token) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::MissingEnvVar(
            "CARTSYNC_ACCESS_TOKEN".to_string(),
        )),
        (None, Some(_)) => Err(ConfigError::MissingEnvVar("CARTSYNC_USER_ID".to_string())),
        (Some(user_id), Some(token)) => {
            let user_id = UserId::new(parse_var::<i32>("CARTSYNC_USER_ID", &user_id)?);
            Ok(Some(Identity::new(user_id, token)))
        }
    }
}
