//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,
    /// Supervisor loop configuration
    pub supervisor: SupervisorConfig,
    /// Store configuration
    pub store: StoreConfig,
    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Supervisor loop configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Reconciliation cadence in seconds
    pub cadence_secs: u64,
    /// Hours after which an unfilled Pending record is stale for listing
    pub pending_stale_hours: i64,
    /// Per-call broker timeout in seconds
    pub broker_timeout_secs: u64,
    /// Per-call store write timeout in seconds
    pub store_timeout_secs: u64,
}

impl SupervisorConfig {
    /// Cadence as a duration.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }

    /// Freshness window for Pending records.
    pub fn stale_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pending_stale_hours)
    }

    /// Per-call broker timeout.
    pub fn broker_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_timeout_secs)
    }

    /// Per-call store timeout.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite file path; in-memory store when absent
    pub path: Option<String>,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (stubs, zero cadence)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = ApiConfig {
            host: env::var("WARDEN_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::load_parsed("WARDEN_API_PORT", 8080)?,
        };
        let supervisor = SupervisorConfig {
            cadence_secs: Self::load_parsed("WARDEN_CADENCE_SECS", 10)?,
            pending_stale_hours: Self::load_parsed("WARDEN_PENDING_STALE_HOURS", 24)?,
            broker_timeout_secs: Self::load_parsed("WARDEN_BROKER_TIMEOUT_SECS", 10)?,
            store_timeout_secs: Self::load_parsed("WARDEN_STORE_TIMEOUT_SECS", 10)?,
        };
        let store = StoreConfig { path: env::var("WARDEN_STORE_PATH").ok() };

        Ok(Self { api, supervisor, store, environment })
    }

    /// Create test configuration: ephemeral port, zero cadence (every
    /// record is due on every pass), short timeouts.
    pub fn test() -> Self {
        Self {
            api: ApiConfig { host: "127.0.0.1".to_string(), port: 0 },
            supervisor: SupervisorConfig {
                cadence_secs: 0,
                pending_stale_hours: 24,
                broker_timeout_secs: 2,
                store_timeout_secs: 2,
            },
            store: StoreConfig { path: None },
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("WARDEN_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "invalid WARDEN_ENV: {other}. Expected: test, development, production"
            ))),
        }
    }

    fn load_parsed<T: std::str::FromStr>(key: &str, default: T) -> DaemonResult<T> {
        match env::var(key) {
            Ok(value) => value
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("invalid {key} value: {value}"))),
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig { host: "0.0.0.0".to_string(), port: 8080 },
            supervisor: SupervisorConfig {
                cadence_secs: 10,
                pending_stale_hours: 24,
                broker_timeout_secs: 10,
                store_timeout_secs: 10,
            },
            store: StoreConfig { path: None },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.supervisor.cadence_secs, 10);
        assert_eq!(config.supervisor.pending_stale_hours, 24);
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_test_config_is_deterministic() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.supervisor.cadence_secs, 0);
        assert_eq!(config.environment, Environment::Test);
    }

    #[test]
    fn test_durations() {
        let config = Config::default();

        assert_eq!(config.supervisor.cadence(), Duration::from_secs(10));
        assert_eq!(config.supervisor.stale_window(), chrono::Duration::hours(24));
        assert_eq!(config.supervisor.broker_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
