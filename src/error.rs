//! Error types for cachegate.

use thiserror::Error;

use crate::cache::CacheError;

/// Main error type for rate limiting operations.
///
/// Limiters never return this from `limit`/`remaining`; it is carried in the
/// `error` field of the returned decision instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Reading limiter state from the cache failed
    #[error("Cache read error: {0}")]
    CacheRead(#[source] CacheError),

    /// Writing limiter state to the cache failed
    #[error("Cache write error: {0}")]
    CacheWrite(#[source] CacheError),

    /// A required argument was missing or out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored value could not be decoded
    #[error("Malformed state: {0}")]
    MalformedState(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for cachegate operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
