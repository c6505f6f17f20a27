//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Remote store (optional, both of a pair must be set)
//! - `KV_REST_API_URL` + `KV_REST_API_TOKEN`
//! - `UPSTASH_REDIS_REST_URL` + `UPSTASH_REDIS_REST_TOKEN`
//!
//! When neither pair is complete the local file store is used.
//!
//! ## Optional
//! - `STORE_DATA_DIR` - Directory for the local file store (default: `data`)
//! - `STORE_KEY_PREFIX` - Prefix for remote keys (default: empty)
//! - `STORE_REMOTE_TIMEOUT_MS` - Per-call remote timeout (default: 5000)
//! - `STORE_DURABILITY` - `strict` or `best-effort` (default: `strict`)
//! - `RATE_LIMIT_MAX_REQUESTS` - Requests allowed per window (default: 10)
//! - `RATE_LIMIT_WINDOW_SECS` - Window length in seconds (default: 60)
//! - `RATE_LIMIT_MAX_KEYS` - Bound on tracked callers (default: 10000)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Credential pairs recognized for the remote store, in priority order.
const REMOTE_CREDENTIAL_PAIRS: &[(&str, &str)] = &[
    ("KV_REST_API_URL", "KV_REST_API_TOKEN"),
    ("UPSTASH_REDIS_REST_URL", "UPSTASH_REDIS_REST_TOKEN"),
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Remote key-value store credentials, if a complete pair was found
    pub remote: Option<RemoteStoreConfig>,
    /// Directory holding one JSON file per collection
    pub data_dir: PathBuf,
    /// Prefix prepended to every remote key
    pub key_prefix: String,
    /// Upper bound on a single remote call
    pub remote_timeout: Duration,
    /// What a failed local write means to callers
    pub durability: Durability,
    /// Fixed-window rate limiter settings
    pub rate_limit: RateLimitConfig,
}

/// Remote key-value store credentials.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct RemoteStoreConfig {
    /// REST endpoint of the store
    pub url: String,
    /// Bearer token
    pub token: SecretString,
}

impl std::fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Durability contract for local file writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// A write is acknowledged only once the file has been renamed into
    /// place; failures are returned to the caller.
    #[default]
    Strict,
    /// Failed writes are logged and reported as success. Data written in
    /// this mode may be lost; use only where the filesystem is known to be
    /// ephemeral or read-only.
    BestEffort,
}

impl FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            other => Err(format!("expected 'strict' or 'best-effort', got '{other}'")),
        }
    }
}

/// Fixed-window rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per key per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
    /// Maximum number of keys tracked at once
    pub max_keys: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            max_keys: 10_000,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an optional variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an optional variable is set to an invalid value.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let remote = REMOTE_CREDENTIAL_PAIRS.iter().find_map(|&(url_key, token_key)| {
            match (get(url_key), get(token_key)) {
                (Some(url), Some(token)) => Some(RemoteStoreConfig {
                    url,
                    token: SecretString::from(token),
                }),
                (Some(_), None) | (None, Some(_)) => {
                    tracing::warn!(
                        url_var = url_key,
                        token_var = token_key,
                        "Incomplete remote store credentials, ignoring pair"
                    );
                    None
                }
                (None, None) => None,
            }
        });

        let data_dir = PathBuf::from(get("STORE_DATA_DIR").unwrap_or_else(|| "data".to_owned()));
        let key_prefix = get("STORE_KEY_PREFIX").unwrap_or_default();
        let remote_timeout =
            Duration::from_millis(parse_or_default(&get, "STORE_REMOTE_TIMEOUT_MS", 5_000)?);
        let durability = parse_or_default(&get, "STORE_DURABILITY", Durability::Strict)?;

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: parse_or_default(&get, "RATE_LIMIT_MAX_REQUESTS", defaults.max_requests)?,
            window: Duration::from_secs(parse_or_default(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.window.as_secs(),
            )?),
            max_keys: parse_or_default(&get, "RATE_LIMIT_MAX_KEYS", defaults.max_keys)?,
        };

        if rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "RATE_LIMIT_WINDOW_SECS".to_owned(),
                "must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            remote,
            data_dir,
            key_prefix,
            remote_timeout,
            durability,
            rate_limit,
        })
    }

    /// Configuration for a local-only store rooted at `data_dir`.
    #[must_use]
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote: None,
            data_dir: data_dir.into(),
            key_prefix: String::new(),
            remote_timeout: Duration::from_secs(5),
            durability: Durability::Strict,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or_default<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = StoreConfig::from_vars(vars(&[])).unwrap();
        assert!(config.remote.is_none());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.remote_timeout, Duration::from_secs(5));
        assert_eq!(config.durability, Durability::Strict);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_kv_pair_selects_remote() {
        let config = StoreConfig::from_vars(vars(&[
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("KV_REST_API_TOKEN", "tok"),
        ]))
        .unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "https://kv.example.com");
        assert_eq!(remote.token.expose_secret(), "tok");
    }

    #[test]
    fn test_upstash_pair_is_second_choice() {
        let config = StoreConfig::from_vars(vars(&[
            ("KV_REST_API_URL", "https://kv.example.com"),
            ("UPSTASH_REDIS_REST_URL", "https://upstash.example.com"),
            ("UPSTASH_REDIS_REST_TOKEN", "tok"),
        ]))
        .unwrap();
        assert_eq!(config.remote.unwrap().url, "https://upstash.example.com");
    }

    #[test]
    fn test_incomplete_pair_is_ignored() {
        let config = StoreConfig::from_vars(vars(&[("KV_REST_API_TOKEN", "tok")])).unwrap();
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = StoreConfig::from_vars(vars(&[
            ("KV_REST_API_URL", ""),
            ("KV_REST_API_TOKEN", "tok"),
            ("STORE_DATA_DIR", "  "),
        ]))
        .unwrap();
        assert!(config.remote.is_none());
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_optional_overrides() {
        let config = StoreConfig::from_vars(vars(&[
            ("STORE_DATA_DIR", "/var/lib/shop"),
            ("STORE_REMOTE_TIMEOUT_MS", "2500"),
            ("STORE_DURABILITY", "best-effort"),
            ("RATE_LIMIT_MAX_REQUESTS", "3"),
            ("RATE_LIMIT_WINDOW_SECS", "900"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/shop"));
        assert_eq!(config.remote_timeout, Duration::from_millis(2500));
        assert_eq!(config.durability, Durability::BestEffort);
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = StoreConfig::from_vars(vars(&[("STORE_REMOTE_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "STORE_REMOTE_TIMEOUT_MS"));

        assert!(StoreConfig::from_vars(vars(&[("STORE_DURABILITY", "maybe")])).is_err());
        assert!(StoreConfig::from_vars(vars(&[("RATE_LIMIT_WINDOW_SECS", "0")])).is_err());
    }

    #[test]
    fn test_remote_config_debug_redacts_token() {
        let remote = RemoteStoreConfig {
            url: "https://kv.example.com".to_owned(),
            token: SecretString::from("super_secret_token"),
        };
        let debug_output = format!("{remote:?}");
        assert!(debug_output.contains("kv.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token"));
    }
}
