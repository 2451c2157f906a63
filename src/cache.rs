//! Plan cache.
//!
//! Memoizes [`compile`] keyed on (dialect identity, query structure). Two
//! trees built independently from the same calls hit the same entry; trees
//! that differ anywhere, or the same tree for another dialect, never do.
//!
//! The cache is only an optimization: disabling it, or clearing it, changes
//! nothing about the plans callers get.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::ast::Query;
use crate::compiler::{compile, Plan};
use crate::config::CacheConfig;
use crate::dialect::Dialect;
use crate::error::{CompileError, Result};

/// Cache key.
///
/// `Hash` only feeds the precomputed fingerprint to the map's hasher, so
/// lookups never rehash the tree. `Eq` still compares the dialect identity
/// and the whole tree: a fingerprint collision costs a miss, never a wrong
/// plan.
#[derive(Debug, Clone)]
struct PlanKey {
    fingerprint: u64,
    dialect: String,
    dialect_fingerprint: u64,
    query: Query,
}

impl PlanKey {
    fn new(dialect: &dyn Dialect, query: &Query) -> Self {
        let dialect_fingerprint = dialect.fingerprint();
        let mut hasher = Xxh3::new();
        dialect.name().hash(&mut hasher);
        dialect_fingerprint.hash(&mut hasher);
        query.hash(&mut hasher);
        Self {
            fingerprint: hasher.finish(),
            dialect: dialect.name().to_string(),
            dialect_fingerprint,
            query: query.clone(),
        }
    }
}

impl Hash for PlanKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl PartialEq for PlanKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.dialect_fingerprint == other.dialect_fingerprint
            && self.dialect == other.dialect
            && self.query == other.query
    }
}

impl Eq for PlanKey {}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Bounded LRU cache of compiled plans, safe to share across threads.
pub struct PlanCache {
    inner: Mutex<LruCache<PlanKey, Arc<Plan>>>,
    capacity: usize,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PlanCache {
    /// Create an enabled cache holding at most `capacity` plans.
    pub fn new(capacity: usize) -> Result<Self> {
        let bound = NonZeroUsize::new(capacity).ok_or_else(|| {
            CompileError::Structural("plan cache capacity must be at least 1".into())
        })?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(bound)),
            capacity,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let mut cache = Self::new(config.capacity)?;
        cache.enabled = config.enabled;
        Ok(cache)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached plan for `query` on `dialect`, compiling and caching
    /// it on a miss. Errors are returned as-is and never cached. A disabled
    /// cache compiles every time and leaves its counters alone.
    pub fn compile(&self, dialect: &dyn Dialect, query: &Query) -> Result<Arc<Plan>> {
        if !self.enabled {
            return compile(dialect, query).map(Arc::new);
        }

        let key = PlanKey::new(dialect, query);
        let cached = self.inner.lock().get(&key).cloned();
        if let Some(plan) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(dialect = dialect.name(), fingerprint = key.fingerprint, "plan cache hit");
            return Ok(plan);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(dialect = dialect.name(), fingerprint = key.fingerprint, "plan cache miss");

        // Compile without holding the lock; a concurrent miss on the same key
        // compiles the same plan and the later insert wins.
        let plan = match compile(dialect, query) {
            Ok(plan) => Arc::new(plan),
            Err(err) => {
                warn!(dialect = dialect.name(), error = %err, "query failed to compile");
                return Err(err);
            }
        };

        let evicted = {
            let mut inner = self.inner.lock();
            let replacing = inner.contains(&key);
            let displaced = inner.push(key, Arc::clone(&plan));
            !replacing && displaced.is_some()
        };
        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(dialect = dialect.name(), "plan cache evicted least recently used plan");
        }
        Ok(plan)
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.inner.lock().len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            capacity: self.capacity,
        }
    }

    /// Drop every cached plan. Counters keep running.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

pub fn compile_with_cache(
    cache: &PlanCache,
    dialect: &dyn Dialect,
    query: &Query,
) -> Result<Arc<Plan>> {
    cache.compile(dialect, query)
}

pub fn cache_stats(cache: &PlanCache) -> CacheStats {
    cache.stats()
}
