//! Bounded, cache-fronted prefix predictor. Pure reader: any failure below
//! this module — pool exhaustion, query error, I/O error — is swallowed and
//! reported as "no suggestions" so a slow or broken store never disrupts
//! the host's inline ghost text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::params;

use crate::store::Store;

/// Default number of suggestions returned.
pub const DEFAULT_LIMIT: usize = 5;
/// Default LRU cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;
/// Minimum number of non-whitespace characters before the Store is queried.
const MIN_PREFIX_LEN: usize = 2;

/// A caller-held flag the predictor polls between receipt and result
/// assembly. If set before the query completes, the empty suggestion set is
/// returned and the partial result discarded.
#[derive(Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Given a partial command line, returns up to `limit` distinct commands
/// that begin with it, most-recent first. Fronted by a process-local,
/// thread-safe LRU cache keyed on the input prefix.
pub struct Predictor<'s> {
    store: &'s Store,
    cache: Mutex<LruCache<String, Vec<String>>>,
    limit: usize,
}

impl<'s> Predictor<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_CAPACITY, DEFAULT_LIMIT)
    }

    pub fn with_capacity(store: &'s Store, cache_capacity: usize, limit: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Predictor {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
            limit,
        }
    }

    /// Never panics and never surfaces an error to the host: any failure is
    /// translated into an empty result.
    pub fn get_suggestions(&self, input: &str, cancel: &CancelToken) -> Vec<String> {
        if input.trim().chars().count() < MIN_PREFIX_LEN {
            return Vec::new();
        }
        if cancel.is_cancelled() {
            return Vec::new();
        }

        if let Some(hit) = self.cache.lock().unwrap().get(input).cloned() {
            return hit;
        }

        let result = self.query_store(input, cancel).unwrap_or_default();

        if cancel.is_cancelled() {
            return Vec::new();
        }

        self.cache.lock().unwrap().put(input.to_string(), result.clone());
        result
    }

    /// `None` on any failure below this point: pool exhaustion, a query
    /// error, or an I/O error all collapse to "no suggestions" for the host.
    fn query_store(&self, input: &str, cancel: &CancelToken) -> Option<Vec<String>> {
        let conn = self.store.read_handle().ok()?;
        if cancel.is_cancelled() {
            return Some(Vec::new());
        }

        let prefix_lower = input.to_lowercase();
        let upper_bound = format!("{prefix_lower}\u{FFFF}");

        let mut stmt = conn
            .prepare_cached(
                "SELECT cmd FROM history
                 WHERE cmd_norm BETWEEN ?1 AND ?2
                 GROUP BY cmd
                 ORDER BY MAX(event_time) DESC, MAX(id) DESC
                 LIMIT ?3",
            )
            .ok()?;
        let rows = stmt
            .query_map(params![prefix_lower, upper_bound, self.limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .ok()?;

        let mut out = Vec::with_capacity(self.limit);
        for row in rows {
            if cancel.is_cancelled() {
                return Some(Vec::new());
            }
            out.push(row.ok()?);
        }
        Some(out)
    }
}
