//! `GraphCache`: an in-process cache over repeated graph queries against
//! the same master commit (`spec.md` §9 "GraphCache instead of a
//! process-wide singleton").
//!
//! Ported from `original_source/db/cache.py::GraphCache`. That sample
//! caches the raw `entity_latest`/`relationship_latest` loads shared by
//! every query against one commit; this cache sits one layer up and keys
//! on the full query shape, caching the assembled `GraphPayload` itself —
//! `swiftgraph-storage`'s loader functions are crate-private, so the
//! natural cache seam from this crate is the query result, not the rows
//! beneath it. Same invalidation rules: commit-hash mismatch or TTL
//! expiry evicts, same as the original's `_is_cache_valid`. The
//! `get_global_cache`/`reset_global_cache` module-level singleton from
//! that sample is deliberately not reproduced — each `QueryService` owns
//! its own `GraphCache` instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use swiftgraph_storage::{Direction, GraphPayload, TargetTypeFilter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    entity_name: String,
    stop_name: Option<String>,
    direction: Direction,
    include_sibling_subgraphs: bool,
    max_hops: Option<u32>,
    target_type: TargetTypeFilter,
}

struct CacheEntry {
    commit_hash: String,
    loaded_at: Instant,
    payload: GraphPayload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
}

/// Caches `GraphPayload`s keyed by query shape, invalidated per-entry when
/// the supplied commit hash changes or the entry outlives `ttl_seconds`.
pub struct GraphCache {
    ttl: Option<Duration>,
    entries: DashMap<CacheKey, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GraphCache {
    pub fn new(ttl_seconds: Option<u64>) -> Self {
        Self {
            ttl: ttl_seconds.map(Duration::from_secs),
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached payload for this query shape if it is still
    /// valid for `commit_hash`; otherwise call `load`, cache its result,
    /// and return that.
    #[allow(clippy::too_many_arguments)]
    pub fn get_or_load<E>(
        &self,
        entity_name: &str,
        stop_name: Option<&str>,
        direction: Direction,
        include_sibling_subgraphs: bool,
        max_hops: Option<u32>,
        target_type: TargetTypeFilter,
        commit_hash: &str,
        load: impl FnOnce() -> Result<GraphPayload, E>,
    ) -> Result<GraphPayload, E> {
        let key = CacheKey {
            entity_name: entity_name.to_string(),
            stop_name: stop_name.map(str::to_string),
            direction,
            include_sibling_subgraphs,
            max_hops,
            target_type,
        };

        if let Some(entry) = self.entries.get(&key) {
            if self.is_valid(&entry, commit_hash) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.payload.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let payload = load()?;
        self.entries.insert(
            key,
            CacheEntry {
                commit_hash: commit_hash.to_string(),
                loaded_at: Instant::now(),
                payload: payload.clone(),
            },
        );
        Ok(payload)
    }

    fn is_valid(&self, entry: &CacheEntry, commit_hash: &str) -> bool {
        if entry.commit_hash != commit_hash {
            return false;
        }
        if let Some(ttl) = self.ttl {
            if entry.loaded_at.elapsed() > ttl {
                return false;
            }
        }
        true
    }

    /// Drop every cached entry. Called after indexing so the next query
    /// reloads fresh data even if the commit hash happened not to change
    /// in a way a caller tracks (`spec.md` §9).
    pub fn invalidate(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hit_count: hits,
            miss_count: misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            entry_count: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn payload(name: &str) -> GraphPayload {
        GraphPayload {
            entity_name: name.to_string(),
            entity_module: None,
            entity_kind: "class".to_string(),
            entity_stable_id: format!("stable-{name}"),
            stop_at: None,
            direction: Direction::Both,
            include_sibling_subgraphs: false,
            max_hops: None,
            target_type_filter: TargetTypeFilter::All,
            edges: Vec::new(),
            nodes: Vec::new(),
        }
    }

    #[test]
    fn second_call_with_same_key_and_commit_is_a_hit() {
        let cache = GraphCache::new(None);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(payload("A"))
        };
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", load).unwrap();
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", load).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats().hit_count, 1);
        assert_eq!(cache.stats().miss_count, 1);
    }

    #[test]
    fn commit_hash_change_invalidates_entry() {
        let cache = GraphCache::new(None);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(payload("A"))
        };
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", load).unwrap();
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c2", load).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn distinct_query_shapes_do_not_share_a_cache_slot() {
        let cache = GraphCache::new(None);
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", || Ok::<_, ()>(payload("A"))).unwrap();
        cache
            .get_or_load("A", None, Direction::Upstream, false, None, TargetTypeFilter::All, "c1", || Ok::<_, ()>(payload("A")))
            .unwrap();
        assert_eq!(cache.stats().entry_count, 2);
    }

    #[test]
    fn invalidate_clears_all_entries() {
        let cache = GraphCache::new(None);
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", || Ok::<_, ()>(payload("A"))).unwrap();
        cache.invalidate();
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn expired_ttl_forces_a_reload() {
        let cache = GraphCache::new(Some(0));
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(payload("A"))
        };
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", load).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.get_or_load("A", None, Direction::Both, false, None, TargetTypeFilter::All, "c1", load).unwrap();
        assert_eq!(calls.get(), 2);
    }
}
