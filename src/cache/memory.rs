//! In-process cache gateway.
//!
//! Backs limiters with a sharded map per named cache. Useful for single-node
//! deployments, local tooling and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{
    CacheError, CacheGateway, DictionaryGetFieldsResponse, GetResponse, IncrementResponse,
    SetResponse,
};

/// Value stored under a key.
#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Dictionary(HashMap<String, String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, now: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Store = Arc<DashMap<String, Entry>>;

/// Writes between sweeps of a cache for expired entries.
const SWEEP_INTERVAL: u64 = 64;

/// A [`CacheGateway`] held entirely in memory.
///
/// Caches must be created before use. Expired entries read as misses and are
/// evicted on the next access to their key. Every [`SWEEP_INTERVAL`] writes
/// the written cache is swept, so keys that are never touched again do not
/// accumulate.
///
/// Dictionaries have their default TTL refreshed on every field increment.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    caches: RwLock<HashMap<String, Store>>,
    default_ttl: Option<Duration>,
    writes: AtomicU64,
}

impl InMemoryCache {
    /// Create an empty gateway whose entries never expire unless given a TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty gateway that applies `ttl` to every created entry.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Create a named cache. Returns `false` if it already existed.
    pub fn create_cache(&self, name: &str) -> bool {
        let mut caches = self.caches.write();
        if caches.contains_key(name) {
            return false;
        }
        info!(cache = %name, "Creating cache");
        caches.insert(name.to_string(), Arc::new(DashMap::new()));
        true
    }

    /// Drop a named cache and everything in it.
    pub fn delete_cache(&self, name: &str) -> bool {
        self.caches.write().remove(name).is_some()
    }

    /// Number of live entries in a cache, or `None` if the cache is unknown.
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        let store = self.caches.read().get(name).cloned()?;
        let now = Instant::now();
        Some(store.iter().filter(|e| !e.is_expired(now)).count())
    }

    fn store(&self, name: &str) -> Result<Store, CacheError> {
        self.caches
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))
    }

    fn evict_expired(store: &DashMap<String, Entry>, key: &str, now: Instant) {
        if store.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            debug!(key = %key, "Evicted expired entry");
        }
    }

    /// Count a write and, every [`SWEEP_INTERVAL`] writes, drop all expired
    /// entries from `store`. Must not be called while holding an entry guard.
    fn record_write(&self, store: &DashMap<String, Entry>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL != 0 {
            return;
        }
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        debug!(
            evicted = before.saturating_sub(store.len()),
            "Swept expired entries"
        );
    }
}

fn add_to(raw: &str, delta: i64) -> Result<i64, CacheError> {
    let current: i64 = raw
        .parse()
        .map_err(|_| CacheError::InvalidValue(format!("value {raw:?} is not an integer")))?;
    current
        .checked_add(delta)
        .ok_or_else(|| CacheError::InvalidValue("increment overflows".to_string()))
}

#[async_trait]
impl CacheGateway for InMemoryCache {
    async fn get(&self, cache_name: &str, key: &str) -> GetResponse {
        let store = match self.store(cache_name) {
            Ok(store) => store,
            Err(e) => return GetResponse::Error(e),
        };
        Self::evict_expired(&store, key, Instant::now());

        match store.get(key).map(|entry| entry.value.clone()) {
            Some(Value::Scalar(value)) => GetResponse::Hit(value),
            Some(Value::Dictionary(_)) => GetResponse::Error(CacheError::InvalidValue(format!(
                "key {key:?} holds a dictionary"
            ))),
            None => GetResponse::Miss,
        }
    }

    async fn set(&self, cache_name: &str, key: &str, value: &str) -> SetResponse {
        let store = match self.store(cache_name) {
            Ok(store) => store,
            Err(e) => return SetResponse::Error(e),
        };
        let now = Instant::now();
        self.record_write(&store, now);
        let entry = Entry::new(Value::Scalar(value.to_string()), now, self.default_ttl);
        store.insert(key.to_string(), entry);
        SetResponse::Success
    }

    async fn increment(
        &self,
        cache_name: &str,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> IncrementResponse {
        let store = match self.store(cache_name) {
            Ok(store) => store,
            Err(e) => return IncrementResponse::Error(e),
        };
        let now = Instant::now();
        Self::evict_expired(&store, key, now);
        self.record_write(&store, now);

        let ttl = ttl.or(self.default_ttl);
        let mut entry = store
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Scalar("0".to_string()), now, ttl));

        let Value::Scalar(raw) = &mut entry.value else {
            return IncrementResponse::Error(CacheError::InvalidValue(format!(
                "key {key:?} holds a dictionary"
            )));
        };
        match add_to(raw, delta) {
            Ok(updated) => {
                *raw = updated.to_string();
                IncrementResponse::Success(updated)
            }
            Err(e) => IncrementResponse::Error(e),
        }
    }

    async fn dictionary_increment(
        &self,
        cache_name: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> IncrementResponse {
        let store = match self.store(cache_name) {
            Ok(store) => store,
            Err(e) => return IncrementResponse::Error(e),
        };
        let now = Instant::now();
        Self::evict_expired(&store, key, now);
        self.record_write(&store, now);

        let mut guard = store
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Dictionary(HashMap::new()), now, self.default_ttl));
        let entry = &mut *guard;

        let Value::Dictionary(fields) = &mut entry.value else {
            return IncrementResponse::Error(CacheError::InvalidValue(format!(
                "key {key:?} holds a scalar"
            )));
        };
        let raw = fields.get(field).map(String::as_str).unwrap_or("0");
        match add_to(raw, delta) {
            Ok(updated) => {
                fields.insert(field.to_string(), updated.to_string());
                // Any field write keeps the whole dictionary alive
                if let Some(ttl) = self.default_ttl {
                    entry.expires_at = Some(now + ttl);
                }
                IncrementResponse::Success(updated)
            }
            Err(e) => IncrementResponse::Error(e),
        }
    }

    async fn dictionary_get_fields(
        &self,
        cache_name: &str,
        key: &str,
        fields: &[String],
    ) -> DictionaryGetFieldsResponse {
        let store = match self.store(cache_name) {
            Ok(store) => store,
            Err(e) => return DictionaryGetFieldsResponse::Error(e),
        };
        Self::evict_expired(&store, key, Instant::now());

        let Some(entry) = store.get(key) else {
            return DictionaryGetFieldsResponse::Miss;
        };
        match &entry.value {
            Value::Dictionary(stored) => DictionaryGetFieldsResponse::Hit(
                fields
                    .iter()
                    .filter_map(|f| stored.get(f).map(|v| (f.clone(), v.clone())))
                    .collect(),
            ),
            Value::Scalar(_) => DictionaryGetFieldsResponse::Error(CacheError::InvalidValue(
                format!("key {key:?} holds a scalar"),
            )),
        }
    }
}
