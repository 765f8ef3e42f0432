use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const MIN_PAYOUT_INTERVAL_MINUTES: u32 = 5;
pub const MAX_PAYOUT_INTERVAL_MINUTES: u32 = 1440;

const ENV_PREFIX: &str = "PAYOUT";
const DEFAULT_CONFIG_FILE: &str = "payout.toml";

/// Process-wide settings, loaded once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Network identifier the ledger node must report (e.g. "mainnet")
    pub network: String,
    /// Ledger node JSON-RPC endpoints, tried in order
    pub node_endpoints: Vec<String>,
    #[serde(default = "default_payout_interval")]
    pub payout_interval_minutes: u32,
    /// Smallest balance (in base units) worth paying out
    #[serde(default = "default_min_payout")]
    pub min_payout: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_progress_interval")]
    pub progress_interval_minutes: u32,
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
}

fn default_payout_interval() -> u32 {
    30
}

fn default_min_payout() -> u64 {
    1
}

fn default_settle_delay() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_progress_interval() -> u32 {
    1
}

fn default_max_db_connections() -> u32 {
    5
}

impl Config {
    /// Load from the optional config file and `PAYOUT_*` environment variables.
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("PAYOUT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::build(Some(&path), None)
    }

    fn build(file: Option<&str>, env: Option<HashMap<String, String>>) -> AppResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("node_endpoints")
            .try_parsing(true)
            .source(env);

        let config: Config = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.network.trim().is_empty() {
            return Err(AppError::Config("network must not be empty".to_string()));
        }

        if self.node_endpoints.is_empty() {
            return Err(AppError::Config(
                "at least one ledger node endpoint is required".to_string(),
            ));
        }

        for endpoint in &self.node_endpoints {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "node endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        if !(MIN_PAYOUT_INTERVAL_MINUTES..=MAX_PAYOUT_INTERVAL_MINUTES)
            .contains(&self.payout_interval_minutes)
        {
            return Err(AppError::Config(format!(
                "payout_interval_minutes must be within {}..={}, got {}",
                MIN_PAYOUT_INTERVAL_MINUTES, MAX_PAYOUT_INTERVAL_MINUTES, self.payout_interval_minutes
            )));
        }

        if self.min_payout == 0 {
            return Err(AppError::Config("min_payout must be at least 1".to_string()));
        }

        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config(
                "connect_timeout_secs must be positive".to_string(),
            ));
        }

        if self.progress_interval_minutes == 0 {
            return Err(AppError::Config(
                "progress_interval_minutes must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Secrets read straight from the environment. Never logged.
#[derive(Clone)]
pub struct Secrets {
    pub treasury_private_key: String,
    pub database_url: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("treasury_private_key", &"<redacted>")
            .field("database_url", &"<redacted>")
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        Ok(Self {
            treasury_private_key: required("TREASURY_PRIVATE_KEY")?,
            database_url: required("DATABASE_URL")?,
        })
    }
}

/// Read the debug toggle without requiring the other secrets, so logging can
/// start before anything else is validated.
pub fn debug_from_env() -> bool {
    debug_from_lookup(|key| std::env::var(key).ok())
}

fn debug_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup("DEBUG")
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
