use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_TTL_SECS, SOURCE_URL, USER_AGENT};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after the first one; zero means a single request
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

/// What to answer when a refresh fails but an expired entry is still stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    /// Report the upstream as unavailable
    Strict,
    /// Answer from the expired entry and flag the response as stale
    ServeStale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: CacheBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_stale_policy")]
    pub stale_policy: StalePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_url() -> String {
    SOURCE_URL.to_string()
}

fn default_user_agent() -> String {
    USER_AGENT.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_backoff() -> u64 {
    250
}

fn default_backend() -> CacheBackend {
    CacheBackend::Memory
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/ip-rangesd/cache.db")
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_stale_policy() -> StalePolicy {
    StalePolicy::Strict
}

fn default_listen() -> String {
    "[::]:8080".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            retries: 0,
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            ttl_secs: default_ttl(),
            stale_policy: default_stale_policy(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.upstream.url, SOURCE_URL);
        assert_eq!(config.upstream.retries, 0);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl(), Duration::from_secs(4 * 3600));
        assert_eq!(config.cache.stale_policy, StalePolicy::Strict);
        assert_eq!(config.api.listen, "[::]:8080");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [upstream]
            url = "http://127.0.0.1:9000/ip-ranges.json"
            retries = 2

            [cache]
            backend = "sqlite"
            db_path = "/tmp/ranges.db"
            stale_policy = "serve-stale"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.url, "http://127.0.0.1:9000/ip-ranges.json");
        assert_eq!(config.upstream.retries, 2);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.cache.db_path, PathBuf::from("/tmp/ranges.db"));
        assert_eq!(config.cache.stale_policy, StalePolicy::ServeStale);
        assert_eq!(config.cache.ttl_secs, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::parse("[cache]\nbackend = \"redis\"").is_err());
    }
}
