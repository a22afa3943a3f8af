//! Time window arithmetic.
//!
//! Windows are epoch-second values aligned to a multiple of the window size.
//! All functions are pure.

use crate::error::{RateLimitError, Result};

/// Floor `timestamp` to the start of its window.
///
/// Uses Euclidean division so timestamps before the epoch still floor
/// downwards. Limiters validate their sizes on construction; use
/// [`window_sequence`] for unchecked input.
///
/// # Panics
///
/// Panics if `size` is zero or negative.
pub fn window_start(timestamp: i64, size: i64) -> i64 {
    assert!(size > 0, "window size must be positive, got {size}");
    timestamp.div_euclid(size) * size
}

/// Every aligned window from `start`'s window to `end`'s window inclusive.
///
/// Returns an empty sequence when `end < start`.
pub fn window_sequence(start: Option<i64>, end: i64, size: i64) -> Result<Vec<i64>> {
    let start = start
        .ok_or_else(|| RateLimitError::InvalidInput("window sequence start is required".into()))?;
    if size <= 0 {
        return Err(RateLimitError::InvalidInput(format!(
            "window size must be positive, got {size}"
        )));
    }
    if end < start {
        return Ok(Vec::new());
    }

    let first = window_start(start, size);
    let last = window_start(end, size);
    Ok((0..)
        .map(|i| first + i * size)
        .take_while(|w| *w <= last)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_alignment() {
        assert_eq!(window_start(0, 60), 0);
        assert_eq!(window_start(59, 60), 0);
        assert_eq!(window_start(60, 60), 60);
        assert_eq!(window_start(1_704_067_259, 900), 1_704_066_300);
        assert_eq!(window_start(-1, 60), -60);
    }

    #[test]
    fn test_window_start_bounds_and_idempotence() {
        for size in [1, 7, 60, 900, 86_400] {
            for ts in [0, 1, 899, 900, 1_704_067_259, 1_704_067_200] {
                let w = window_start(ts, size);
                assert!(w <= ts && ts < w + size, "ts={ts} size={size}");
                assert_eq!(window_start(w, size), w);
            }
        }
    }

    #[test]
    #[should_panic(expected = "window size must be positive, got 0")]
    fn test_window_start_zero_size_panics() {
        window_start(1_704_067_200, 0);
    }

    #[test]
    #[should_panic(expected = "window size must be positive, got -60")]
    fn test_window_start_negative_size_panics() {
        window_start(1_704_067_200, -60);
    }

    #[test]
    fn test_window_sequence_inclusive() {
        let seq = window_sequence(Some(100), 400, 100).unwrap();
        assert_eq!(seq, vec![100, 200, 300, 400]);

        let seq = window_sequence(Some(130), 405, 100).unwrap();
        assert_eq!(seq, vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_window_sequence_length() {
        for (start, end, size) in [(0, 0, 10), (5, 95, 10), (1_000, 1_900, 60), (17, 17_000, 900)] {
            let seq = window_sequence(Some(start), end, size).unwrap();
            let expected = (window_start(end, size) - window_start(start, size)) / size + 1;
            assert_eq!(seq.len() as i64, expected);
            assert!(seq.windows(2).all(|p| p[1] - p[0] == size));
        }
    }

    #[test]
    fn test_window_sequence_same_window() {
        assert_eq!(window_sequence(Some(61), 119, 60).unwrap(), vec![60]);
    }

    #[test]
    fn test_window_sequence_reversed_is_empty() {
        assert!(window_sequence(Some(500), 100, 60).unwrap().is_empty());
    }

    #[test]
    fn test_window_sequence_requires_start() {
        assert!(matches!(
            window_sequence(None, 100, 60),
            Err(RateLimitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_sequence_rejects_non_positive_size() {
        assert!(window_sequence(Some(0), 100, 0).is_err());
        assert!(window_sequence(Some(0), 100, -5).is_err());
    }
}
