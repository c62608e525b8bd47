use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Secret cipher material
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Access key business rules
    #[serde(default)]
    pub access_keys: AccessKeyConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Redis validations
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err("redis.enabled=true requires redis.url".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
        }
        if self.redis.key_prefix.is_empty() || self.redis.key_prefix.contains(char::is_whitespace) {
            return Err("redis.key_prefix must be a non-empty string without whitespace".into());
        }
        if self.redis.invalidation_channel.is_empty() {
            return Err("redis.invalidation_channel must not be empty".into());
        }
        // Cache validations
        if self.cache.app_exists_ttl_secs == 0
            || self.cache.app_ttl_secs == 0
            || self.cache.access_keys_ttl_secs == 0
        {
            return Err("cache TTLs must be > 0".into());
        }
        let ttls = [
            self.cache.app_exists_ttl_secs,
            self.cache.app_ttl_secs,
            self.cache.access_keys_ttl_secs,
            self.cache.local_ttl_secs,
        ];
        if ttls.iter().any(|&ttl| ttl > CacheConfig::MAX_TTL_SECS) {
            return Err(format!(
                "cache TTLs must be <= {} seconds",
                CacheConfig::MAX_TTL_SECS
            ));
        }
        if self.cache.janitor_interval_secs == 0 {
            return Err("cache.janitor_interval_secs must be > 0".into());
        }
        // Crypto validation
        self.crypto.validate()?;
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Access key rules
        let rules = &self.access_keys;
        if rules.min_per_app == 0 || rules.min_per_app > rules.max_per_app {
            return Err("access_keys requires 0 < min_per_app <= max_per_app".into());
        }
        if rules.secret_length < 16 {
            return Err("access_keys.secret_length must be >= 16".into());
        }
        Ok(())
    }
}

/// Redis configuration for the distributed cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (local cache only)
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prefix of every cache key, shared by all processes of one deployment
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,

    /// Pub/Sub channel for L1 invalidation, published as `{key_prefix}:{channel}`
    #[serde(default = "default_redis_invalidation_channel")]
    pub invalidation_channel: String,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_key_prefix() -> String {
    "appauth".to_string()
}

fn default_redis_invalidation_channel() -> String {
    "cache:invalidate".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_redis_key_prefix(),
            invalidation_channel: default_redis_invalidation_channel(),
        }
    }
}

impl RedisConfig {
    /// Fully qualified invalidation channel.
    pub fn channel(&self) -> String {
        format!("{}:{}", self.key_prefix, self.invalidation_channel)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bypass every cache and always hit the store
    #[serde(default)]
    pub disabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub app_exists_ttl_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub app_ttl_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub access_keys_ttl_secs: u64,

    /// L1 lifetime of entries read from Redis, capped at each cache's TTL.
    /// 0 disables the local tier when Redis is enabled.
    #[serde(default = "default_local_ttl_secs")]
    pub local_ttl_secs: u64,

    /// Interval of the L1 expired-entry sweep
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,

    /// Encoded values larger than this many bytes are compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_local_ttl_secs() -> u64 {
    30
}

fn default_janitor_interval_secs() -> u64 {
    60
}

fn default_compression_threshold() -> usize {
    appauth_cache::DEFAULT_COMPRESSION_THRESHOLD
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            app_exists_ttl_secs: default_cache_ttl_secs(),
            app_ttl_secs: default_cache_ttl_secs(),
            access_keys_ttl_secs: default_cache_ttl_secs(),
            local_ttl_secs: default_local_ttl_secs(),
            janitor_interval_secs: default_janitor_interval_secs(),
            compression_threshold: default_compression_threshold(),
        }
    }
}

impl CacheConfig {
    /// Upper bound of every cache TTL (30 days).
    pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

    pub fn app_exists_ttl(&self) -> Duration {
        Duration::from_secs(self.app_exists_ttl_secs)
    }

    pub fn app_ttl(&self) -> Duration {
        Duration::from_secs(self.app_ttl_secs)
    }

    pub fn access_keys_ttl(&self) -> Duration {
        Duration::from_secs(self.access_keys_ttl_secs)
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

/// Key and nonce of the secret cipher.
///
/// Both must stay fixed for the lifetime of the stored secrets: verification
/// re-encrypts the candidate and compares ciphertexts.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct CryptoConfig {
    /// 32 ASCII letters or digits
    #[serde(default)]
    pub key: String,
    /// 12 bytes
    #[serde(default)]
    pub nonce: String,
}

impl CryptoConfig {
    pub const KEY_SIZE: usize = 32;
    pub const NONCE_SIZE: usize = 12;

    pub fn validate(&self) -> Result<(), String> {
        if self.key.len() != Self::KEY_SIZE || !self.key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "crypto.key must be {} ASCII letters or digits",
                Self::KEY_SIZE
            ));
        }
        if self.nonce.len() != Self::NONCE_SIZE {
            return Err(format!("crypto.nonce must be {} bytes", Self::NONCE_SIZE));
        }
        Ok(())
    }
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("key", &"<redacted>")
            .field("nonce", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Access key business rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKeyConfig {
    /// Maximum number of secrets per app
    #[serde(default = "default_max_per_app")]
    pub max_per_app: usize,

    /// Minimum number of secrets an app keeps
    #[serde(default = "default_min_per_app")]
    pub min_per_app: usize,

    /// Length of generated secrets
    #[serde(default = "default_secret_length")]
    pub secret_length: usize,
}

fn default_max_per_app() -> usize {
    2
}

fn default_min_per_app() -> usize {
    1
}

fn default_secret_length() -> usize {
    36
}

impl Default for AccessKeyConfig {
    fn default() -> Self {
        Self {
            max_per_app: default_max_per_app(),
            min_per_app: default_min_per_app(),
            secret_length: default_secret_length(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::Path;

    /// Read from the working directory when no path is given.
    pub const DEFAULT_PATH: &str = "appauth.toml";
    /// Overrides look like `APPAUTH__REDIS__ENABLED=true`.
    pub const ENV_PREFIX: &str = "APPAUTH";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        load_config_with_default_path(path)
    }

    /// Layer `path` (or [`DEFAULT_PATH`] if present) under environment
    /// overrides, then validate.
    ///
    /// An explicit `path` must exist; a missing [`DEFAULT_PATH`] leaves the
    /// defaults and environment.
    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let file = match &path {
            Some(p) => {
                let p = p.as_ref();
                if !p.is_file() {
                    return Err(format!("config file not found: {}", p.display()));
                }
                File::from(p)
            }
            None => File::from(Path::new(DEFAULT_PATH)).required(false),
        };

        let merged: AppConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| format!("config error: {e}"))?;

        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            crypto: CryptoConfig {
                key: "AES256Key32Characters12345678901".to_string(),
                nonce: "0123456789ab".to_string(),
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(!cfg.redis.enabled);
        assert_eq!(cfg.redis.channel(), "appauth:cache:invalidate");
        assert_eq!(cfg.cache.access_keys_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.cache.compression_threshold, 64);
        assert_eq!(cfg.access_keys.max_per_app, 2);
        assert_eq!(cfg.access_keys.secret_length, 36);
    }

    #[test]
    fn test_crypto_material_is_required() {
        assert!(AppConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());

        let mut cfg = valid();
        cfg.crypto.key = "too-short".to_string();
        assert!(cfg.validate().unwrap_err().contains("crypto.key"));

        let mut cfg = valid();
        cfg.crypto.nonce = "short".to_string();
        assert!(cfg.validate().unwrap_err().contains("crypto.nonce"));
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let mut cfg = valid();
        cfg.access_keys.min_per_app = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.logging.level = "loud".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.cache.app_ttl_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_ttls_are_bounded() {
        let mut cfg = valid();
        cfg.cache.app_exists_ttl_secs = u64::MAX;
        assert!(cfg.validate().unwrap_err().contains("cache TTLs must be <="));

        let mut cfg = valid();
        cfg.cache.local_ttl_secs = CacheConfig::MAX_TTL_SECS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.cache.access_keys_ttl_secs = CacheConfig::MAX_TTL_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_crypto_debug_is_redacted() {
        let rendered = format!("{:?}", valid().crypto);
        assert!(!rendered.contains("AES256Key"));
        assert!(rendered.contains("<redacted>"));
    }
}
