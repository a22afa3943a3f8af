//! Fault-injecting gateway for limiter tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    CacheError, CacheGateway, DictionaryGetFieldsResponse, GetResponse, InMemoryCache,
    IncrementResponse, SetResponse,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Operation {
    Get,
    Set,
    Increment,
    DictionaryIncrement,
    DictionaryGetFields,
}

/// Wraps an [`InMemoryCache`], counting calls and failing selected operations.
#[derive(Debug, Default)]
pub(crate) struct FaultyCache {
    pub(crate) inner: InMemoryCache,
    failing: Mutex<HashSet<Operation>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl FaultyCache {
    pub(crate) fn new(cache_name: &str) -> Self {
        Self::wrapping(InMemoryCache::new(), cache_name)
    }

    pub(crate) fn wrapping(inner: InMemoryCache, cache_name: &str) -> Self {
        inner.create_cache(cache_name);
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn fail(&self, op: Operation) {
        self.failing.lock().insert(op);
    }

    pub(crate) fn calls(&self, op: Operation) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn record(&self, op: Operation) -> Option<CacheError> {
        *self.calls.lock().entry(op).or_default() += 1;
        self.failing
            .lock()
            .contains(&op)
            .then(|| CacheError::Unavailable(format!("injected {op:?} failure")))
    }
}

#[async_trait]
impl CacheGateway for FaultyCache {
    async fn get(&self, cache_name: &str, key: &str) -> GetResponse {
        match self.record(Operation::Get) {
            Some(e) => GetResponse::Error(e),
            None => self.inner.get(cache_name, key).await,
        }
    }

    async fn set(&self, cache_name: &str, key: &str, value: &str) -> SetResponse {
        match self.record(Operation::Set) {
            Some(e) => SetResponse::Error(e),
            None => self.inner.set(cache_name, key, value).await,
        }
    }

    async fn increment(
        &self,
        cache_name: &str,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> IncrementResponse {
        match self.record(Operation::Increment) {
            Some(e) => IncrementResponse::Error(e),
            None => self.inner.increment(cache_name, key, delta, ttl).await,
        }
    }

    async fn dictionary_increment(
        &self,
        cache_name: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> IncrementResponse {
        match self.record(Operation::DictionaryIncrement) {
            Some(e) => IncrementResponse::Error(e),
            None => {
                self.inner
                    .dictionary_increment(cache_name, key, field, delta)
                    .await
            }
        }
    }

    async fn dictionary_get_fields(
        &self,
        cache_name: &str,
        key: &str,
        fields: &[String],
    ) -> DictionaryGetFieldsResponse {
        match self.record(Operation::DictionaryGetFields) {
            Some(e) => DictionaryGetFieldsResponse::Error(e),
            None => {
                self.inner
                    .dictionary_get_fields(cache_name, key, fields)
                    .await
            }
        }
    }
}
