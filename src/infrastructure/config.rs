//! Configuration infrastructure
//!
//! Configuration is layered in four tiers:
//! 1. Compiled defaults (`AppConfig::default()`)
//! 2. Optional user config (`<config dir>/series-watch/config.{toml,json,yaml}`)
//! 3. Optional project config file (`config/series-watch.{toml,json,yaml}` or
//!    the path in `SERIES_WATCH_CONFIG`)
//! 4. Environment overrides, e.g. `SERIES_WATCH_WATCHLIST__BATCH_SIZE=3`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::infrastructure::parsing::config::MarketplaceSelectors;
use crate::infrastructure::retry_policy::RetryPolicy;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SERIES_WATCH_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SERIES_WATCH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub marketplace: MarketplaceConfig,
    pub watchlist: WatchlistConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Outbound HTTP behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Browser-like user agent sent with every request
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    pub retry: RetryPolicy,
}

/// Marketplace endpoints and HTML selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub selectors: MarketplaceSelectors,
}

impl MarketplaceConfig {
    /// Detail page for a product identifier
    pub fn product_url(&self, asin: &str) -> String {
        format!("{}/dp/{}", self.base_url.trim_end_matches('/'), asin)
    }
}

/// Watchlist scraping cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Number of volume pages fetched concurrently
    pub batch_size: usize,
    /// Pause between two batches of the same series
    pub batch_delay_seconds: u64,
    /// Pause between two series of the same run
    pub series_delay_seconds: u64,
}

impl WatchlistConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_seconds)
    }

    pub fn series_delay(&self) -> Duration {
        Duration::from_secs(self.series_delay_seconds)
    }
}

/// Scheduled task settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between update runs
    pub update_interval_seconds: u64,
    /// Cron expression (UTC, seconds first); replaces the interval when set
    pub update_cron: Option<String>,
    /// Fire the update once right after startup
    pub run_on_startup: bool,
    /// Re-fire runs interrupted by a process crash
    pub recover_interrupted_runs: bool,
}

impl SchedulerConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://data/series-watch.db`
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Directory for rolling log files, relative paths resolve from the working dir
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Module-specific levels (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::MARKETPLACE_BASE_URL.to_string(),
            selectors: MarketplaceSelectors::default(),
        }
    }
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            batch_delay_seconds: defaults::BATCH_DELAY_SECONDS,
            series_delay_seconds: defaults::SERIES_DELAY_SECONDS,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_interval_seconds: defaults::UPDATE_INTERVAL_SECONDS,
            update_cron: None,
            run_on_startup: false,
            recover_interrupted_runs: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            directory: PathBuf::from("logs"),
            file_prefix: "series-watch".to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "error".to_string());
                filters.insert("selectors".to_string(), "error".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Load defaults, the optional config file and environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(&Self::config_path())
    }

    /// Project config file location, without extension
    pub fn config_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/series-watch".to_string())
    }

    /// User-level configuration directory
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("series-watch"))
    }

    /// Load with `path` as the (optional) project file layer
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::from_sources(path, None)
    }

    /// Like [`Self::from_file`], reading overrides from `env` instead of the process environment
    pub fn from_sources(path: &str, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(user_dir) = Self::user_config_dir() {
            let user_file = user_dir.join("config");
            builder = builder.add_source(config::File::with_name(&user_file.to_string_lossy()).required(false));
        }

        let settings = builder
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchlist.batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "watchlist.batch_size must be greater than 0".to_string(),
            });
        }

        if self.http.retry.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "http.retry.max_attempts must be greater than 0".to_string(),
            });
        }

        if self.http.retry.max_delay_ms < self.http.retry.base_delay_ms {
            return Err(ConfigError::Validation {
                message: "http.retry.max_delay_ms cannot be lower than base_delay_ms".to_string(),
            });
        }

        if self.scheduler.update_interval_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "scheduler.update_interval_seconds must be greater than 0".to_string(),
            });
        }

        if let Some(expression) = &self.scheduler.update_cron {
            if let Err(e) = cron::Schedule::from_str(expression) {
                return Err(ConfigError::Validation {
                    message: format!("scheduler.update_cron '{expression}' is not a valid cron expression: {e}"),
                });
            }
        }

        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "http.timeout_seconds must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Default configuration values
pub mod defaults {
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const MARKETPLACE_BASE_URL: &str = "https://www.amazon.com";

    pub const BATCH_SIZE: usize = 5;
    pub const BATCH_DELAY_SECONDS: u64 = 5;
    pub const SERIES_DELAY_SECONDS: u64 = 10;

    /// Hourly
    pub const UPDATE_INTERVAL_SECONDS: u64 = 60 * 60;

    pub const DATABASE_URL: &str = "sqlite://data/series-watch.db";

    pub const LOG_LEVEL: &str = "info";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watchlist.batch_size, 5);
        assert_eq!(config.watchlist.batch_delay(), Duration::from_secs(5));
        assert_eq!(config.watchlist.series_delay(), Duration::from_secs(10));
        assert_eq!(config.scheduler.update_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.watchlist.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_retry_delay_bounds_rejected() {
        let mut config = AppConfig::default();
        config.http.retry.base_delay_ms = 5_000;
        config.http.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series-watch.toml");
        std::fs::write(
            &path,
            "[watchlist]\nbatch_size = 3\nbatch_delay_seconds = 1\nseries_delay_seconds = 2\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.watchlist.batch_size, 3);
        assert_eq!(config.watchlist.series_delay_seconds, 2);
        assert_eq!(config.http.retry.max_attempts, RetryPolicy::default().max_attempts);
    }

    #[test]
    fn test_env_layer_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series-watch.toml");
        std::fs::write(&path, "[watchlist]\nbatch_size = 4\n\n[scheduler]\nrun_on_startup = false\n").unwrap();

        let env = HashMap::from([
            ("SERIES_WATCH_WATCHLIST__BATCH_SIZE".to_string(), "3".to_string()),
            ("SERIES_WATCH_SCHEDULER__RUN_ON_STARTUP".to_string(), "true".to_string()),
            ("SERIES_WATCH_HTTP__RETRY__MAX_ATTEMPTS".to_string(), "7".to_string()),
            ("UNRELATED_WATCHLIST__BATCH_SIZE".to_string(), "9".to_string()),
        ]);

        let config = AppConfig::from_sources(path.to_str().unwrap(), Some(env)).unwrap();
        assert_eq!(config.watchlist.batch_size, 3);
        assert!(config.scheduler.run_on_startup);
        assert_eq!(config.http.retry.max_attempts, 7);
    }

    #[test]
    fn test_invalid_env_override_rejected() {
        let env = HashMap::from([("SERIES_WATCH_WATCHLIST__BATCH_SIZE".to_string(), "0".to_string())]);
        let result = AppConfig::from_sources("/nonexistent/series-watch", Some(env));
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_update_cron_validated() {
        let mut config = AppConfig::default();
        config.scheduler.update_cron = Some("0 0 * * * *".to_string());
        assert!(config.validate().is_ok());

        config.scheduler.update_cron = Some("hourly please".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_product_url_joins_base() {
        let marketplace = MarketplaceConfig {
            base_url: "https://www.amazon.co.uk/".to_string(),
            ..Default::default()
        };
        assert_eq!(marketplace.product_url("B0SERIES00"), "https://www.amazon.co.uk/dp/B0SERIES00");
    }
}
