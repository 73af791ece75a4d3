//! Environment configuration

use crate::llm::DEFAULT_MODEL;
use crate::runtime::DEFAULT_CALL_TIMEOUT;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PANIA_CALL_TIMEOUT_SECS must be a whole number of seconds, got {value:?}: {source}")]
    InvalidTimeout {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("PANIA_CALL_TIMEOUT_SECS must be greater than zero")]
    ZeroTimeout,
    #[error("PANIA_CALL_TIMEOUT_SECS must be at most {max}, got {0}", max = MAX_CALL_TIMEOUT_SECS)]
    TimeoutTooLarge(u64),
    #[error("No LLM credentials configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.")]
    MissingCredentials,
}

/// Upper bound on a single collaborator call
pub const MAX_CALL_TIMEOUT_SECS: u64 = 3600;

/// Settings read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub anthropic_api_key: Option<String>,
    pub gateway: Option<String>,
    pub model: String,
    /// Signed-in user; journal saves need one
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub call_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = get("PANIA_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".pania").join("journal.db")
            },
            PathBuf::from,
        );

        let call_timeout = match get("PANIA_CALL_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = value
                    .parse()
                    .map_err(|source| ConfigError::InvalidTimeout { value, source })?;
                if secs == 0 {
                    return Err(ConfigError::ZeroTimeout);
                }
                if secs > MAX_CALL_TIMEOUT_SECS {
                    return Err(ConfigError::TimeoutTooLarge(secs));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            db_path,
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            gateway: get("LLM_GATEWAY"),
            model: get("PANIA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            user_id: get("PANIA_USER_ID"),
            user_name: get("PANIA_USER_NAME"),
            call_timeout,
        })
    }

    /// API key to send; a gateway authenticates on its own, so none is needed there
    pub fn llm_api_key(&self) -> Result<String, ConfigError> {
        match (&self.anthropic_api_key, &self.gateway) {
            (Some(key), _) => Ok(key.clone()),
            (None, Some(_)) => Ok("implicit".to_string()),
            (None, None) => Err(ConfigError::MissingCredentials),
        }
    }
}
