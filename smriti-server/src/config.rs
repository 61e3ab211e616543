//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.
//! Pipeline settings (bucket, prefix, batch size, ...) are loaded separately by
//! `smriti_core::PipelineConfig::from_env`.

use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 200, photo batches are large)
    pub body_limit_mb: usize,
    /// Maximum file size per upload in MB (default: 25)
    pub max_file_size_mb: usize,
    /// Request timeout in seconds (default: 120, one batch can take a while)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Postgres URL of the event directory (`clients` table)
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 10)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 1)
    pub database_min_connections: u32,
    /// Guest passkey for a single-event deployment without a database
    pub user_passkey: Option<String>,
    /// Owner passkey for a single-event deployment without a database
    pub client_passkey: Option<String>,
    /// Seconds a search may sit untouched before it is dropped (default: 3600)
    pub session_ttl_secs: u64,
    /// Seconds between sweeps for expired searches (default: 60)
    pub session_sweep_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("allowed_origins", &self.allowed_origins)
            .field("body_limit_mb", &self.body_limit_mb)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .field("timeout_secs", &self.timeout_secs)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("user_passkey", &self.user_passkey.as_ref().map(|_| "[REDACTED]"))
            .field("client_passkey", &self.client_passkey.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 200,
            max_file_size_mb: 25,
            timeout_secs: 120,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 10,
            database_min_connections: 1,
            user_passkey: None,
            client_passkey: None,
            session_ttl_secs: 3600,
            session_sweep_secs: 60,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            port: env_parsed("PORT").unwrap_or(defaults.port),
            host,
            allowed_origins,
            body_limit_mb: env_parsed("BODY_LIMIT_MB").unwrap_or(defaults.body_limit_mb),
            max_file_size_mb: env_parsed("MAX_FILE_SIZE_MB").unwrap_or(defaults.max_file_size_mb),
            timeout_secs: env_parsed("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parsed("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parsed("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            database_url: env_non_empty("DATABASE_URL"),
            database_max_connections: env_parsed("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parsed("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            user_passkey: env_non_empty("USER_PASSKEY"),
            client_passkey: env_non_empty("CLIENT_PASSKEY"),
            session_ttl_secs: env_parsed("SESSION_TTL_SECS").unwrap_or(defaults.session_ttl_secs),
            session_sweep_secs: env_parsed("SESSION_SWEEP_SECS")
                .unwrap_or(defaults.session_sweep_secs),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Idle time after which a search is dropped
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Interval between expired-search sweeps, at least one second
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs.max(1))
    }

    /// Maximum accepted file size in bytes
    pub fn max_file_size(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(!config.rate_limit_enabled);
        assert!(config.database_url.is_none());
        assert_eq!(config.max_file_size(), 25 * 1024 * 1024);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_sweep_interval_is_never_zero() {
        let config = Config {
            session_sweep_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_debug_redacts_passkeys() {
        let config = Config {
            user_passkey: Some("smriti_user_1234abcd".into()),
            database_url: Some("postgres://u:secret@db/smriti".into()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("1234abcd"));
        assert!(!rendered.contains("secret"));
    }
}
