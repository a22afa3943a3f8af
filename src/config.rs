//! Configuration management for cachegate.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheGateway;
use crate::error::{RateLimitError, Result};
use crate::ratelimit::{
    FixedWindowLimiter, FixedWindowOptions, RateLimiter, SlidingWindowLimiter,
    SlidingWindowOptions, TokenBucketLimiter, TokenBucketOptions,
};

/// Prefix for environment overrides, e.g. `CACHEGATE__ALGORITHM__MAX=50`.
const ENV_PREFIX: &str = "CACHEGATE";

/// Configuration for one limiter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Name of the cache holding limiter state
    pub cache_name: String,

    /// TTL applied by the in-memory cache to entries created without one
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,

    /// Strategy and its parameters
    #[serde(default)]
    pub algorithm: AlgorithmConfig,
}

/// Which strategy to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    FixedWindow(FixedWindowOptions),
    SlidingWindow(SlidingWindowOptions),
    TokenBucket(TokenBucketOptions),
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::FixedWindow(FixedWindowOptions::default())
    }
}

impl LimiterConfig {
    /// A fixed window limiter with default settings over `cache_name`.
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            default_ttl_secs: None,
            algorithm: AlgorithmConfig::default(),
        }
    }

    /// Load configuration from a YAML file, with `CACHEGATE__*` environment
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a YAML file, overridden by environment
    /// variables named `<env_prefix>__<FIELD>[__<FIELD>]`.
    pub fn load_with_env_prefix<P: AsRef<Path>>(path: P, env_prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), env_prefix = %env_prefix, "Loading limiter configuration");

        ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Yaml))
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                RateLimitError::Config(format!("Failed to load {}: {}", path.display(), e))
            })
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RateLimitError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// Construct the configured limiter over `gateway`.
    pub fn build(&self, gateway: Arc<dyn CacheGateway>) -> Result<Arc<dyn RateLimiter>> {
        let cache_name = self.cache_name.clone();
        let limiter: Arc<dyn RateLimiter> = match &self.algorithm {
            AlgorithmConfig::FixedWindow(options) => Arc::new(FixedWindowLimiter::new(
                gateway,
                cache_name,
                options.clone(),
            )?),
            AlgorithmConfig::SlidingWindow(options) => Arc::new(SlidingWindowLimiter::new(
                gateway,
                cache_name,
                options.clone(),
            )?),
            AlgorithmConfig::TokenBucket(options) => Arc::new(TokenBucketLimiter::new(
                gateway,
                cache_name,
                options.clone(),
            )?),
        };

        info!(
            cache_name = %self.cache_name,
            algorithm = ?self.algorithm,
            "Rate limiter configured"
        );
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    #[test]
    fn test_defaults_to_fixed_window() {
        let config = LimiterConfig::from_yaml("cache_name: limits").unwrap();
        assert_eq!(config.cache_name, "limits");
        assert_eq!(config.default_ttl_secs, None);
        assert_eq!(
            config.algorithm,
            AlgorithmConfig::FixedWindow(FixedWindowOptions::default())
        );
        assert_eq!(config, LimiterConfig::new("limits"));
    }

    #[test]
    fn test_parse_sliding_window() {
        let yaml = r#"
cache_name: limits
algorithm:
  type: sliding_window
  key_prefix: api
  max: 50
  window_secs: 600
  interval_window_secs: 60
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.algorithm,
            AlgorithmConfig::SlidingWindow(SlidingWindowOptions {
                key_prefix: "api".to_string(),
                max: 50,
                window_secs: 600,
                interval_window_secs: Some(60),
            })
        );
    }

    #[test]
    fn test_parse_token_bucket_with_defaults() {
        let yaml = r#"
cache_name: limits
algorithm:
  type: token_bucket
  max_tokens: 20
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        let AlgorithmConfig::TokenBucket(options) = config.algorithm else {
            panic!("expected a token bucket");
        };
        assert_eq!(options.max_tokens, 20);
        assert_eq!(options.starting_tokens, None);
        assert_eq!(options.refill_rate, 10);
        assert_eq!(options.refill_interval_secs, 60);
        assert_eq!(options.key_prefix, "ratelimit");
    }

    #[test]
    fn test_missing_cache_name_rejected() {
        let result = LimiterConfig::from_yaml("algorithm:\n  type: fixed_window\n");
        assert!(matches!(result, Err(RateLimitError::Config(_))));
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let yaml = "cache_name: limits\nalgorithm:\n  type: leaky_bucket\n";
        assert!(LimiterConfig::from_yaml(yaml).is_err());
    }

    #[tokio::test]
    async fn test_build_each_algorithm() {
        for algorithm in [
            AlgorithmConfig::FixedWindow(FixedWindowOptions::default()),
            AlgorithmConfig::SlidingWindow(SlidingWindowOptions::default()),
            AlgorithmConfig::TokenBucket(TokenBucketOptions::default()),
        ] {
            let cache = Arc::new(InMemoryCache::new());
            cache.create_cache("limits");
            let config = LimiterConfig {
                algorithm,
                ..LimiterConfig::new("limits")
            };
            let limiter = config.build(cache).unwrap();

            let decision = limiter.limit("alice").await;
            assert!(decision.allow);
            assert_eq!(decision.remaining, 99);
        }
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let config = LimiterConfig {
            algorithm: AlgorithmConfig::TokenBucket(TokenBucketOptions {
                max_tokens: 0,
                ..Default::default()
            }),
            ..LimiterConfig::new("limits")
        };
        assert!(config.build(Arc::new(InMemoryCache::new())).is_err());
        assert!(LimiterConfig::new("")
            .build(Arc::new(InMemoryCache::new()))
            .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "cachegate-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "cache_name: from-file\ndefault_ttl_secs: 3600\nalgorithm:\n  type: fixed_window\n  max: 7\n",
        )
        .unwrap();

        let config = LimiterConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.cache_name, "from-file");
        assert_eq!(config.default_ttl_secs, Some(3600));
        let AlgorithmConfig::FixedWindow(options) = config.algorithm else {
            panic!("expected a fixed window");
        };
        assert_eq!(options.max, 7);
        assert_eq!(options.window_secs, 900);
    }

    #[test]
    fn test_load_applies_env_overrides() {
        let prefix = format!("CACHEGATE_OVERRIDE_{}", std::process::id());
        let path = std::env::temp_dir().join(format!(
            "cachegate-override-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "cache_name: from-file\nalgorithm:\n  type: fixed_window\n  max: 7\n",
        )
        .unwrap();
        std::env::set_var(format!("{prefix}__CACHE_NAME"), "from-env");
        std::env::set_var(format!("{prefix}__ALGORITHM__MAX"), "42");

        let result = LimiterConfig::load_with_env_prefix(&path, &prefix);
        std::env::remove_var(format!("{prefix}__CACHE_NAME"));
        std::env::remove_var(format!("{prefix}__ALGORITHM__MAX"));
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.cache_name, "from-env");
        let AlgorithmConfig::FixedWindow(options) = config.algorithm else {
            panic!("expected a fixed window");
        };
        assert_eq!(options.max, 42);
        assert_eq!(options.window_secs, 900);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            LimiterConfig::load("/nonexistent/cachegate.yaml"),
            Err(RateLimitError::Config(_))
        ));
    }
}
