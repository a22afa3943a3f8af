//! Sliding window limiter.
//!
//! Approximates a continuous look-back window by splitting time into fixed
//! sub-intervals. Each client owns one dictionary keyed `prefix:client` with
//! one field per sub-interval (the interval's epoch seconds); the current
//! count is the sum of every field inside the look-back horizon.
//!
//! Counting and recording are separate cache calls. Two concurrent callers may
//! both observe spare capacity and both be admitted, so the configured `max`
//! can be overshot under contention. Use [`FixedWindowLimiter`] when a hard
//! ceiling matters.
//!
//! [`FixedWindowLimiter`]: super::FixedWindowLimiter

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cache::{CacheGateway, DictionaryGetFieldsResponse, IncrementResponse};
use crate::error::{RateLimitError, Result};

use super::clock::{Clock, SystemClock};
use super::decision::{RateLimitDecision, RemainingQuery};
use super::default_key_prefix;
use super::key::CacheKey;
use super::limiter::RateLimiter;
use super::window::{window_sequence, window_start};

/// Configuration for a [`SlidingWindowLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowOptions {
    /// Prefix for every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Requests allowed within the look-back horizon
    #[serde(default = "default_max")]
    pub max: u64,

    /// Look-back horizon in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Sub-interval granularity in seconds (defaults to `window_secs`)
    #[serde(default)]
    pub interval_window_secs: Option<u64>,
}

impl Default for SlidingWindowOptions {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            max: default_max(),
            window_secs: default_window_secs(),
            interval_window_secs: None,
        }
    }
}

fn default_max() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    900
}

/// Requests counted inside the look-back horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCount {
    /// Sum over all sub-intervals; 0 when `error` is set
    pub count: u64,
    /// The sub-interval that new requests are recorded against
    pub last_interval: i64,
    pub error: Option<RateLimitError>,
}

pub struct SlidingWindowLimiter {
    gateway: Arc<dyn CacheGateway>,
    cache_name: String,
    options: SlidingWindowOptions,
    window: i64,
    interval: i64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("cache_name", &self.cache_name)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish()
    }
}

impl SlidingWindowLimiter {
    /// Create a sliding window limiter storing dictionaries in `cache_name`.
    pub fn new(
        gateway: Arc<dyn CacheGateway>,
        cache_name: impl Into<String>,
        options: SlidingWindowOptions,
    ) -> Result<Self> {
        let cache_name = super::require_cache_name(cache_name.into())?;
        super::require_positive("max", options.max)?;
        let window = super::require_secs("window_secs", options.window_secs)?;
        let interval = match options.interval_window_secs {
            Some(secs) => super::require_secs("interval_window_secs", secs)?,
            None => window,
        };

        Ok(Self {
            gateway,
            cache_name,
            options,
            window,
            interval,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to place requests in sub-intervals.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &SlidingWindowOptions {
        &self.options
    }

    /// Count the requests recorded for `client_id` inside the horizon.
    pub async fn calculate_count(&self, client_id: &str) -> WindowCount {
        let now = self.clock.now();
        match CacheKey::for_client(&self.options.key_prefix, client_id) {
            Ok(key) => self.count_at(&key.to_string(), now).await,
            Err(e) => WindowCount {
                count: 0,
                last_interval: window_start(now, self.interval),
                error: Some(e),
            },
        }
    }

    async fn count_at(&self, key: &str, now: i64) -> WindowCount {
        let last_interval = window_start(now, self.interval);
        match self.sum_intervals(key, now).await {
            Ok(count) => {
                trace!(
                    key = %key,
                    count = count,
                    last_interval = last_interval,
                    "Counted sliding window"
                );
                WindowCount {
                    count,
                    last_interval,
                    error: None,
                }
            }
            Err(e) => WindowCount {
                count: 0,
                last_interval,
                error: Some(e),
            },
        }
    }

    async fn sum_intervals(&self, key: &str, now: i64) -> Result<u64> {
        let fields: Vec<String> = window_sequence(Some(now - self.window), now, self.interval)?
            .iter()
            .map(i64::to_string)
            .collect();

        let stored = match self
            .gateway
            .dictionary_get_fields(&self.cache_name, key, &fields)
            .await
        {
            DictionaryGetFieldsResponse::Hit(stored) => stored,
            DictionaryGetFieldsResponse::Miss => return Ok(0),
            DictionaryGetFieldsResponse::Error(e) => {
                warn!(key = %key, error = %e, "Failed to read sliding window intervals");
                return Err(RateLimitError::CacheRead(e));
            }
        };

        let mut total: i64 = 0;
        for (field, raw) in &stored {
            let count: i64 = raw.parse().map_err(|_| {
                RateLimitError::MalformedState(format!(
                    "interval {field} of {key} holds {raw:?}"
                ))
            })?;
            total = total.saturating_add(count);
        }
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn limit(&self, client_id: &str) -> RateLimitDecision {
        let key = match CacheKey::for_client(&self.options.key_prefix, client_id) {
            Ok(key) => key.to_string(),
            Err(e) => return RateLimitDecision::failed(0, e),
        };
        let max = self.options.max;

        let WindowCount {
            count,
            last_interval,
            error,
        } = self.count_at(&key, self.clock.now()).await;
        if let Some(e) = error {
            return RateLimitDecision::failed(0, e);
        }
        if count >= max {
            debug!(key = %key, count = count, max = max, "Sliding window limit exceeded");
            return RateLimitDecision::denied();
        }

        match self
            .gateway
            .dictionary_increment(&self.cache_name, &key, &last_interval.to_string(), 1)
            .await
        {
            IncrementResponse::Success(_) => RateLimitDecision::allowed(max - count - 1),
            IncrementResponse::Error(e) => {
                warn!(
                    key = %key,
                    interval = last_interval,
                    error = %e,
                    "Failed to record request in sliding window"
                );
                RateLimitDecision::failed(max - count, RateLimitError::CacheWrite(e))
            }
        }
    }

    async fn remaining(&self, client_id: &str) -> RemainingQuery {
        let WindowCount { count, error, .. } = self.calculate_count(client_id).await;
        match error {
            Some(e) => e.into(),
            None => RemainingQuery::available(self.options.max.saturating_sub(count)),
        }
    }
}
