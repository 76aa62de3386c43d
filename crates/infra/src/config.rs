//! Environment-driven configuration.

use std::time::Duration;

use thiserror::Error;

use kade_inventory::AdjustmentPolicy;

use crate::engine::{DEFAULT_LOCK_TIMEOUT, EngineConfig};

pub const DEFAULT_REORDER_CONTACT: &str = "purchasing@localhost";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Settings for the store, engine and reorder flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraConfig {
    /// `Some(url)` selects the Postgres store.
    pub database_url: Option<String>,
    pub engine: EngineConfig,
    /// Default destination for reorder notifications.
    pub reorder_contact: String,
    pub bind_addr: String,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            engine: EngineConfig::default(),
            reorder_contact: DEFAULT_REORDER_CONTACT.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl InfraConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let use_persistent = get("USE_PERSISTENT_STORES")
            .map(|v| v.parse::<bool>().unwrap_or(false))
            .unwrap_or(false);
        let database_url = if use_persistent {
            Some(get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let adjustment_policy = match get("KADE_ADJUSTMENT_MODE") {
            Some(v) => v.parse::<AdjustmentPolicy>().map_err(|e| ConfigError::Invalid {
                key: "KADE_ADJUSTMENT_MODE",
                reason: e.to_string(),
            })?,
            None => AdjustmentPolicy::default(),
        };

        let lock_timeout = match get("KADE_LOCK_TIMEOUT_MS") {
            Some(v) => match v.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "KADE_LOCK_TIMEOUT_MS",
                        reason: format!("expected a positive number of milliseconds, got '{v}'"),
                    });
                }
            },
            None => DEFAULT_LOCK_TIMEOUT,
        };

        Ok(Self {
            database_url,
            engine: EngineConfig {
                adjustment_policy,
                lock_timeout,
            },
            reorder_contact: get("KADE_REORDER_CONTACT")
                .unwrap_or_else(|| DEFAULT_REORDER_CONTACT.to_string()),
            bind_addr: get("KADE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn use_persistent_stores(&self) -> bool {
        self.database_url.is_some()
    }
}
