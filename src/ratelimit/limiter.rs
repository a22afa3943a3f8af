//! Rate limiter trait shared by all strategies.

use async_trait::async_trait;

use super::decision::{RateLimitDecision, RemainingQuery};

/// A per-client admission strategy backed by a cache gateway.
///
/// Implementations keep no state between calls; everything lives in the
/// cache. Neither method fails: errors are reported inside the returned value.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Try to consume one unit of capacity for `client_id`.
    async fn limit(&self, client_id: &str) -> RateLimitDecision;

    /// Report the capacity left for `client_id` without consuming any.
    async fn remaining(&self, client_id: &str) -> RemainingQuery;
}
