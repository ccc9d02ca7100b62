//! Bounded cache for classification results
//!
//! Classification is pure computation, so the cache is only a latency
//! optimization: clearing it never changes an outcome. Misses are cached
//! too, so unclassifiable paths are not re-derived on every request.

use http::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::models::Classification;

/// Default bound on the number of cached (method, path) keys.
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// A remembered classification outcome; `None` is the no-match sentinel.
pub type CachedOutcome = Option<Classification>;

type CacheKey = (Method, String);

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CachedOutcome>,
    /// Insertion order, oldest first. Drives eviction.
    order: VecDeque<CacheKey>,
}

/// Process-wide classification cache, shared behind an `Arc` so tests can
/// construct and reset their own instance deterministically.
///
/// When the capacity is exceeded the oldest half of the entries is evicted.
#[derive(Debug)]
pub struct ClassificationCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ClassificationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, method: &Method, path: &str) -> Option<CachedOutcome> {
        let inner = self.lock();
        inner.entries.get(&(method.clone(), path.to_string())).cloned()
    }

    pub fn put(&self, method: Method, path: String, outcome: CachedOutcome) {
        let key = (method, path);
        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) {
            if inner.entries.len() >= self.capacity {
                evict_oldest_half(&mut inner);
            }
            inner.order.push_back(key.clone());
        }
        inner.entries.insert(key, outcome);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    // A poisoned lock only means a panic elsewhere mid-insert; stale
    // entries are acceptable for a best-effort cache.
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

fn evict_oldest_half(inner: &mut CacheInner) {
    let drop_count = (inner.order.len() / 2).max(1);
    for _ in 0..drop_count {
        if let Some(key) = inner.order.pop_front() {
            inner.entries.remove(&key);
        }
    }
}
