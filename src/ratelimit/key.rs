//! Cache key generation.

use std::fmt;

use crate::error::{RateLimitError, Result};

/// Identifies the cache entry holding a client's limiter state.
///
/// Format: `"{prefix}:{client}"`, or `"{prefix}:{client}:{window}"` for keys
/// that are scoped to a single window. The format is shared with other
/// implementations reading the same cache and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Key prefix configured on the limiter
    pub prefix: String,
    /// Client identifier, used verbatim
    pub client: String,
    /// Window start (epoch seconds) for window-scoped keys
    pub window: Option<i64>,
}

impl CacheKey {
    /// Key for state that lives as long as the client does.
    pub fn for_client(prefix: &str, client: &str) -> Result<Self> {
        if client.is_empty() {
            return Err(RateLimitError::InvalidInput(
                "client identifier must not be empty".to_string(),
            ));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            client: client.to_string(),
            window: None,
        })
    }

    /// Key for state scoped to one window.
    pub fn for_window(prefix: &str, client: &str, window: i64) -> Result<Self> {
        let mut key = Self::for_client(prefix, client)?;
        key.window = Some(window);
        Ok(key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window {
            Some(window) => write!(f, "{}:{}:{}", self.prefix, self.client, window),
            None => write!(f, "{}:{}", self.prefix, self.client),
        }
    }
}
