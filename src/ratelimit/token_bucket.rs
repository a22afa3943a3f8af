//! Token bucket limiter.
//!
//! Each client's bucket is one string value keyed `prefix:client`, encoded as
//! `"{last_updated_at}:{tokens}"`. Refill is computed lazily from the whole
//! refill intervals elapsed since `last_updated_at`, which only moves when a
//! token is consumed.
//!
//! The read and the write-back are separate cache calls, so concurrent
//! consumers can both spend the same token. The bucket may admit more than
//! `max_tokens` requests under contention.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::cache::{CacheGateway, GetResponse, SetResponse};
use crate::error::{RateLimitError, Result};

use super::clock::{Clock, SystemClock};
use super::decision::{RateLimitDecision, RemainingQuery};
use super::default_key_prefix;
use super::key::CacheKey;
use super::limiter::RateLimiter;

/// Configuration for a [`TokenBucketLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketOptions {
    /// Prefix for every cache key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bucket capacity
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// Tokens in a bucket that has never been used (defaults to `max_tokens`)
    #[serde(default)]
    pub starting_tokens: Option<u64>,

    /// Tokens added per elapsed refill interval
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u64,

    /// Refill interval in seconds
    #[serde(default = "default_refill_interval_secs")]
    pub refill_interval_secs: u64,
}

impl Default for TokenBucketOptions {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            max_tokens: default_max_tokens(),
            starting_tokens: None,
            refill_rate: default_refill_rate(),
            refill_interval_secs: default_refill_interval_secs(),
        }
    }
}

fn default_max_tokens() -> u64 {
    100
}

fn default_refill_rate() -> u64 {
    10
}

fn default_refill_interval_secs() -> u64 {
    60
}

/// Persisted bucket contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Epoch seconds of the last consumption
    pub last_updated_at: i64,
    pub tokens: u64,
}

impl fmt::Display for BucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.last_updated_at, self.tokens)
    }
}

impl FromStr for BucketState {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || RateLimitError::MalformedState(format!("invalid bucket state {s:?}"));

        let (last_updated_at, tokens) = s.split_once(':').ok_or_else(malformed)?;
        let state = Self {
            last_updated_at: last_updated_at.parse().map_err(|_| malformed())?,
            tokens: tokens.parse().map_err(|_| malformed())?,
        };
        // Only the encoder's own form is accepted: no signs or leading zeros
        if state.to_string() != s {
            return Err(malformed());
        }
        Ok(state)
    }
}

pub struct TokenBucketLimiter {
    gateway: Arc<dyn CacheGateway>,
    cache_name: String,
    options: TokenBucketOptions,
    starting_tokens: u64,
    refill_interval: i64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("cache_name", &self.cache_name)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .finish()
    }
}

impl TokenBucketLimiter {
    /// Create a token bucket limiter storing buckets in `cache_name`.
    pub fn new(
        gateway: Arc<dyn CacheGateway>,
        cache_name: impl Into<String>,
        options: TokenBucketOptions,
    ) -> Result<Self> {
        let cache_name = super::require_cache_name(cache_name.into())?;
        let max_tokens = super::require_positive("max_tokens", options.max_tokens)?;
        let refill_interval =
            super::require_secs("refill_interval_secs", options.refill_interval_secs)?;
        let starting_tokens = options.starting_tokens.unwrap_or(max_tokens);
        if starting_tokens > max_tokens {
            return Err(RateLimitError::Config(format!(
                "starting_tokens ({starting_tokens}) exceeds max_tokens ({max_tokens})"
            )));
        }

        Ok(Self {
            gateway,
            cache_name,
            options,
            starting_tokens,
            refill_interval,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used for refill arithmetic.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &TokenBucketOptions {
        &self.options
    }

    /// The bucket for `client_id` as of now, refilled but not written back.
    pub async fn calculate_tokens(&self, client_id: &str) -> Result<BucketState> {
        let key = CacheKey::for_client(&self.options.key_prefix, client_id)?;
        self.state_at(&key.to_string(), self.clock.now()).await
    }

    async fn state_at(&self, key: &str, now: i64) -> Result<BucketState> {
        let stored = match self.gateway.get(&self.cache_name, key).await {
            GetResponse::Hit(raw) => raw.parse::<BucketState>()?,
            GetResponse::Miss => {
                return Ok(BucketState {
                    last_updated_at: now,
                    tokens: self.starting_tokens,
                })
            }
            GetResponse::Error(e) => {
                warn!(key = %key, error = %e, "Failed to read token bucket");
                return Err(RateLimitError::CacheRead(e));
            }
        };

        let refilled = self.refill(stored, now);
        trace!(
            key = %key,
            stored = %stored,
            tokens = refilled.tokens,
            "Computed token bucket"
        );
        Ok(refilled)
    }

    fn refill(&self, state: BucketState, now: i64) -> BucketState {
        let max_tokens = self.options.max_tokens;
        let elapsed = now
            .saturating_sub(state.last_updated_at)
            .div_euclid(self.refill_interval);
        let tokens = if elapsed > 0 {
            (elapsed as u64)
                .saturating_mul(self.options.refill_rate)
                .saturating_add(state.tokens)
        } else {
            state.tokens
        };

        BucketState {
            last_updated_at: state.last_updated_at,
            tokens: tokens.min(max_tokens),
        }
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn limit(&self, client_id: &str) -> RateLimitDecision {
        let key = match CacheKey::for_client(&self.options.key_prefix, client_id) {
            Ok(key) => key.to_string(),
            Err(e) => return RateLimitDecision::failed(0, e),
        };
        let now = self.clock.now();

        let state = match self.state_at(&key, now).await {
            Ok(state) => state,
            Err(e) => return RateLimitDecision::failed(0, e),
        };
        if state.tokens == 0 {
            debug!(key = %key, "Token bucket empty");
            return RateLimitDecision::denied();
        }

        let next = BucketState {
            last_updated_at: now,
            tokens: state.tokens - 1,
        };
        match self
            .gateway
            .set(&self.cache_name, &key, &next.to_string())
            .await
        {
            SetResponse::Success => RateLimitDecision::allowed(next.tokens),
            SetResponse::Error(e) => {
                warn!(key = %key, error = %e, "Failed to write token bucket");
                RateLimitDecision::failed(next.tokens, RateLimitError::CacheWrite(e))
            }
        }
    }

    async fn remaining(&self, client_id: &str) -> RemainingQuery {
        match self.calculate_tokens(client_id).await {
            Ok(state) => RemainingQuery::available(state.tokens),
            Err(e) => e.into(),
        }
    }
}
