//! Values returned by limiters.

use crate::error::RateLimitError;

/// Outcome of trying to consume one unit of capacity.
///
/// `allow` and `remaining` are only trustworthy when `error` is `None`.
/// Whenever `error` is set, `allow` is `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allow: bool,
    pub remaining: u64,
    pub error: Option<RateLimitError>,
}

impl RateLimitDecision {
    pub fn allowed(remaining: u64) -> Self {
        Self {
            allow: true,
            remaining,
            error: None,
        }
    }

    pub fn denied() -> Self {
        Self {
            allow: false,
            remaining: 0,
            error: None,
        }
    }

    /// A denial caused by `error`, reporting `remaining` as it was last known.
    pub fn failed(remaining: u64, error: RateLimitError) -> Self {
        Self {
            allow: false,
            remaining,
            error: Some(error),
        }
    }
}

/// Outcome of inspecting remaining capacity without consuming any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemainingQuery {
    pub remaining: Option<u64>,
    pub error: Option<RateLimitError>,
}

impl RemainingQuery {
    pub fn available(remaining: u64) -> Self {
        Self {
            remaining: Some(remaining),
            error: None,
        }
    }

    pub fn failed(error: RateLimitError) -> Self {
        Self {
            remaining: None,
            error: Some(error),
        }
    }
}

impl From<RateLimitError> for RemainingQuery {
    fn from(error: RateLimitError) -> Self {
        Self::failed(error)
    }
}
