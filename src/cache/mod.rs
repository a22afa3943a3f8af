//! Cache gateway abstraction.
//!
//! Every limiter stores its state through a [`CacheGateway`]: a named-cache
//! key-value store whose only primitives are get, set, atomic increment and
//! atomic dictionary-field increment. Responses are explicit tagged unions so
//! callers match on the outcome instead of unwrapping nested options.

mod memory;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryCache;

/// Errors reported by a cache gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The named cache does not exist
    #[error("cache not found: {0}")]
    CacheNotFound(String),

    /// The cache service could not be reached or refused the call
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time
    #[error("cache call timed out")]
    Timeout,

    /// The stored value has the wrong type for the requested operation
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Outcome of a scalar `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResponse {
    Hit(String),
    Miss,
    Error(CacheError),
}

/// Outcome of a scalar `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetResponse {
    Success,
    Error(CacheError),
}

/// Outcome of an atomic increment; carries the post-increment value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementResponse {
    Success(i64),
    Error(CacheError),
}

/// Outcome of fetching a subset of dictionary fields.
///
/// A `Hit` only contains the requested fields that are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictionaryGetFieldsResponse {
    Hit(HashMap<String, String>),
    Miss,
    Error(CacheError),
}

/// Atomic key-value store with TTL, shared by all limiters.
///
/// Implementations must make `increment` and `dictionary_increment` atomic
/// per key. No other cross-call guarantee is assumed.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Read a scalar value.
    async fn get(&self, cache_name: &str, key: &str) -> GetResponse;

    /// Write a scalar value, replacing whatever was stored.
    async fn set(&self, cache_name: &str, key: &str, value: &str) -> SetResponse;

    /// Atomically add `delta` to an integer value, creating it at zero.
    ///
    /// `ttl` is only applied when the key is created.
    async fn increment(
        &self,
        cache_name: &str,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> IncrementResponse;

    /// Atomically add `delta` to one field of a dictionary.
    async fn dictionary_increment(
        &self,
        cache_name: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> IncrementResponse;

    /// Fetch the named fields of a dictionary in one call.
    async fn dictionary_get_fields(
        &self,
        cache_name: &str,
        key: &str,
        fields: &[String],
    ) -> DictionaryGetFieldsResponse;
}
