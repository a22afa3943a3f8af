//! Cachegate - per-client rate limiting over an atomic key-value cache
//!
//! This crate implements fixed window, sliding window and token bucket
//! admission control. All limiter state lives in an external cache reached
//! through the [`cache::CacheGateway`] trait; limiters themselves keep nothing
//! between calls, so any number of processes can share one cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod ratelimit;
