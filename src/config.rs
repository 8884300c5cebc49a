use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pool: PoolSettings,
    pub http: HttpSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Upper bound on connections per pooled source.
    pub max_size: usize,
    /// How long a caller may wait for a pooled connection, in seconds.
    pub acquire_timeout_secs: u64,
    /// Idle connections older than this are closed, in seconds. Honored
    /// by the MySQL pool; deadpool-postgres has no idle reaper, so
    /// PostgreSQL pools bound waiting and creation instead.
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Timeout for API and spreadsheet requests, in seconds.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("pool.max_size", 16)?
            .set_default("pool.acquire_timeout_secs", 10)?
            .set_default("pool.idle_timeout_secs", 300)?
            .set_default("http.request_timeout_secs", 30)?
            .set_default("logging.level", "info")?;

        // Load from environment variables
        if let Ok(max_size) = env::var("POOL_MAX_SIZE") {
            builder = builder
                .set_override("pool.max_size", max_size.parse::<u64>().unwrap_or(16))?;
        }

        if let Ok(timeout) = env::var("POOL_ACQUIRE_TIMEOUT_SECS") {
            builder = builder
                .set_override("pool.acquire_timeout_secs", timeout.parse::<u64>().unwrap_or(10))?;
        }

        if let Ok(timeout) = env::var("POOL_IDLE_TIMEOUT_SECS") {
            builder = builder
                .set_override("pool.idle_timeout_secs", timeout.parse::<u64>().unwrap_or(300))?;
        }

        if let Ok(timeout) = env::var("HTTP_REQUEST_TIMEOUT_SECS") {
            builder = builder
                .set_override("http.request_timeout_secs", timeout.parse::<u64>().unwrap_or(30))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        // Try to load from .env file
        let _ = dotenv::dotenv();

        builder.build()?.try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                max_size: 16,
                acquire_timeout_secs: 10,
                idle_timeout_secs: 300,
            },
            http: HttpSettings {
                request_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// Install a tracing subscriber honoring `RUST_LOG`.
///
/// The embedding process calls this once at startup; the core itself only
/// emits events through `tracing` macros.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.pool.max_size, 16);
        assert_eq!(config.pool.acquire_timeout_secs, 10);
        assert_eq!(config.pool.idle_timeout_secs, 300);
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    // Tests run in parallel and share the process environment, so this
    // never mutates env vars; it only checks that loading succeeds.
    #[test]
    fn test_from_env_builds() {
        let config = Config::from_env().unwrap();
        assert!(config.pool.max_size > 0);
        assert!(config.http.request_timeout_secs > 0);
    }
}
