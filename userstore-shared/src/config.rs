/// ClickHouse connection configuration
///
/// Loaded from environment variables (with `.env` support for development) or
/// constructed manually.
///
/// # Environment Variables
///
/// - `CLICKHOUSE_URL`: HTTP interface URL, e.g. `http://localhost:8123` (required)
/// - `CLICKHOUSE_DATABASE`: Database holding the user tables (default: `default`)
/// - `CLICKHOUSE_USER`: User name (default: `default`)
/// - `CLICKHOUSE_PASSWORD`: Password (default: empty)
/// - `CLICKHOUSE_TIMEOUT_SECS`: Per-request timeout (default: 30)
///
/// # Example
///
/// ```no_run
/// use userstore_shared::config::ClickHouseConfig;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClickHouseConfig::from_env()?;
/// println!("ClickHouse database: {}", config.database);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::StoreError;

/// ClickHouse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    /// Base URL of the HTTP interface
    ///
    /// Format: http[s]://host:port
    pub url: String,

    /// Database the `user`, `user_alias` and `user_property_time` tables live in
    pub database: String,

    /// User name sent as `X-ClickHouse-User`
    pub user: String,

    /// Password sent as `X-ClickHouse-Key`
    #[serde(skip_serializing, default)]
    pub password: String,

    /// Timeout applied to every request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ClickHouseConfig {
    /// Creates a configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if `CLICKHOUSE_URL` is missing or
    /// `CLICKHOUSE_TIMEOUT_SECS` is not a positive integer.
    pub fn from_env() -> Result<Self, StoreError> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let url = env::var("CLICKHOUSE_URL").map_err(|_| {
            StoreError::Config("CLICKHOUSE_URL environment variable is required".to_string())
        })?;

        let defaults = Self::default();

        let database = env::var("CLICKHOUSE_DATABASE").unwrap_or(defaults.database);
        let user = env::var("CLICKHOUSE_USER").unwrap_or(defaults.user);
        let password = env::var("CLICKHOUSE_PASSWORD").unwrap_or(defaults.password);

        let request_timeout_secs = match env::var("CLICKHOUSE_TIMEOUT_SECS") {
            Ok(raw) => parse_timeout(&raw)?,
            Err(_) => defaults.request_timeout_secs,
        };

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            database,
            user,
            password,
            request_timeout_secs,
        })
    }

    /// Creates a configuration pointing at a local server
    ///
    /// Uses `http://localhost:8123` and the `default` database.
    pub fn default_for_test() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            ..Default::default()
        }
    }
}

fn parse_timeout(raw: &str) -> Result<u64, StoreError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(StoreError::Config(format!(
            "CLICKHOUSE_TIMEOUT_SECS must be a positive integer, got '{}'",
            raw
        ))),
        Ok(secs) => Ok(secs),
    }
}
