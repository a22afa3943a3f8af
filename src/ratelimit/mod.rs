//! Rate limiting strategies over a cache gateway.

mod clock;
mod decision;
mod fixed_window;
mod key;
mod limiter;
mod sliding_window;
mod token_bucket;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{RateLimitDecision, RemainingQuery};
pub use fixed_window::{FixedWindowLimiter, FixedWindowOptions};
pub use key::CacheKey;
pub use limiter::RateLimiter;
pub use sliding_window::{SlidingWindowLimiter, SlidingWindowOptions, WindowCount};
pub use token_bucket::{BucketState, TokenBucketLimiter, TokenBucketOptions};

use crate::error::{RateLimitError, Result};

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";

pub(crate) fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

pub(crate) fn require_cache_name(cache_name: String) -> Result<String> {
    if cache_name.trim().is_empty() {
        return Err(RateLimitError::Config("cache name is required".to_string()));
    }
    Ok(cache_name)
}

pub(crate) fn require_positive(field: &str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(RateLimitError::Config(format!("{field} must be positive")));
    }
    Ok(value)
}

/// Validate a duration in seconds and convert it for epoch arithmetic.
pub(crate) fn require_secs(field: &str, value: u64) -> Result<i64> {
    let value = require_positive(field, value)?;
    i64::try_from(value)
        .map_err(|_| RateLimitError::Config(format!("{field} is out of range: {value}")))
}
