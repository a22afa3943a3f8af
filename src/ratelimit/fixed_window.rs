//! Fixed window limiter.
//!
//! One counter per client per window, keyed `prefix:client:window`. The
//! counter is bumped with the cache's atomic increment and expires with the
//! window, so concurrent callers never lose updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cache::{CacheGateway, GetResponse, IncrementResponse};
use crate::error::{RateLimitError, Result};

use super::clock::{Clock, SystemClock};
use super::default_key_prefix;
use super::decision::{RateLimitDecision, RemainingQuery};
use super::key::CacheKey;
use super::limiter::RateLimiter;
use super::window::window_start;

/// Configuration for a [`FixedWindowLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWindowOptions {
    /// Prefix for every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Requests allowed per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Window length in seconds; also the counter TTL
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for FixedWindowOptions {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            max: default_max(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    900
}

pub struct FixedWindowLimiter {
    gateway: Arc<dyn CacheGateway>,
    cache_name: String,
    options: FixedWindowOptions,
    window: i64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("cache_name", &self.cache_name)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish()
    }
}

impl FixedWindowLimiter {
    /// Create a fixed window limiter storing counters in `cache_name`.
    pub fn new(
        gateway: Arc<dyn CacheGateway>,
        cache_name: impl Into<String>,
        options: FixedWindowOptions,
    ) -> Result<Self> {
        let cache_name = super::require_cache_name(cache_name.into())?;
        super::require_positive("max", options.max)?;
        let window = super::require_secs("window_secs", options.window_secs)?;

        Ok(Self {
            gateway,
            cache_name,
            options,
            window,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to pick the current window.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &FixedWindowOptions {
        &self.options
    }

    fn current_key(&self, client_id: &str) -> Result<CacheKey> {
        let window = window_start(self.clock.now(), self.window);
        CacheKey::for_window(&self.options.key_prefix, client_id, window)
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn limit(&self, client_id: &str) -> RateLimitDecision {
        let key = match self.current_key(client_id) {
            Ok(key) => key,
            Err(e) => return RateLimitDecision::failed(0, e),
        };
        let max = self.options.max;
        let ttl = Duration::from_secs(self.options.window_secs);

        let count = match self
            .gateway
            .increment(&self.cache_name, &key.to_string(), 1, Some(ttl))
            .await
        {
            IncrementResponse::Success(count) => count,
            IncrementResponse::Error(e) => {
                warn!(key = %key, error = %e, "Failed to increment fixed window counter");
                return RateLimitDecision::failed(0, RateLimitError::CacheWrite(e));
            }
        };

        trace!(key = %key, count = count, max = max, "Incremented fixed window counter");

        let used = u64::try_from(count).unwrap_or(0);
        if used > max {
            debug!(key = %key, count = count, max = max, "Fixed window limit exceeded");
            return RateLimitDecision::denied();
        }
        RateLimitDecision::allowed(max - used)
    }

    async fn remaining(&self, client_id: &str) -> RemainingQuery {
        let key = match self.current_key(client_id) {
            Ok(key) => key,
            Err(e) => return e.into(),
        };
        let max = self.options.max;

        match self.gateway.get(&self.cache_name, &key.to_string()).await {
            GetResponse::Hit(raw) => match raw.parse::<i64>() {
                Ok(count) => RemainingQuery::available(max.saturating_sub(count.max(0) as u64)),
                Err(_) => RateLimitError::MalformedState(format!(
                    "fixed window counter {key} holds {raw:?}"
                ))
                .into(),
            },
            GetResponse::Miss => RemainingQuery::available(max),
            GetResponse::Error(e) => {
                warn!(key = %key, error = %e, "Failed to read fixed window counter");
                RateLimitError::CacheRead(e).into()
            }
        }
    }
}
