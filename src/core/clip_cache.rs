//! Session clip cache keyed by track identifier.
//!
//! Structure: IndexMap<TrackId, CacheState> behind one mutex
//! - Entry created on first reference, kept until the cache is dropped
//! - No eviction: playlists are small, a replay never refetches
//! - Every transition happens under the lock, so `get` never sees a
//!   half-installed entry
//!
//! States: `Unloaded -> Loading -> Loaded(handle)`, `Loading -> Unloaded` on
//! failure. A `Loaded` handle is never replaced.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use log::{debug, trace, warn};

use super::clip::{ClipHandle, TrackId};
use super::error::PlayerError;

/// Cache entry state for one track
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheState {
    /// Known (or never seen) and not fetched
    #[default]
    Unloaded,
    /// Exactly one FetchAndPrepare in flight
    Loading,
    /// Prepared handle, owned by the cache for the session
    Loaded(ClipHandle),
}

impl CacheState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, CacheState::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, CacheState::Loading)
    }

    pub fn handle(&self) -> Option<&ClipHandle> {
        match self {
            CacheState::Loaded(h) => Some(h),
            _ => None,
        }
    }
}

/// Cache statistics for diagnostics
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Point-in-time view of the cache for status output
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheSnapshot {
    pub known: usize,
    pub loading: usize,
    pub loaded: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct ClipCache {
    entries: Mutex<IndexMap<TrackId, CacheState>>,
    stats: CacheStats,
}

impl ClipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `id`. Never blocks on a load; absent ids are `Unloaded`.
    ///
    /// Plain reads are not counted in the stats; only `begin_load` is.
    pub fn get(&self, id: &TrackId) -> CacheState {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// `Unloaded -> Loading`.
    ///
    /// Fails with `AlreadyLoading` when a load is in flight, and leaves a
    /// `Loaded` entry untouched (also reported as `AlreadyLoading`: there is
    /// nothing to fetch). Callers check `get` first.
    pub fn mark_loading(&self, id: &TrackId) -> Result<(), PlayerError> {
        match self.begin_load(id) {
            CacheState::Unloaded => Ok(()),
            _ => Err(PlayerError::AlreadyLoading(id.clone())),
        }
    }

    /// Atomically read the state and claim the load if `Unloaded`.
    ///
    /// Returns the state *before* the call: `Unloaded` means the caller now
    /// owns the (single) fetch for `id`. This prevents two callers from both
    /// seeing `Unloaded` and both fetching. Counts a hit when the handle
    /// is already loaded and a miss otherwise.
    pub fn begin_load(&self, id: &TrackId) -> CacheState {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(id.clone()).or_default();
        let prev = entry.clone();
        match prev {
            CacheState::Loaded(_) => self.stats.record_hit(),
            CacheState::Loading => self.stats.record_miss(),
            CacheState::Unloaded => {
                self.stats.record_miss();
                *entry = CacheState::Loading;
                trace!("ClipCache: {} -> Loading", id);
            }
        }
        prev
    }

    /// `Loading -> Loaded(handle)`. Returns the handle the entry now holds.
    ///
    /// A second install for an already loaded id is a no-op: the first
    /// handle wins and is returned.
    pub fn install(&self, id: &TrackId, handle: ClipHandle) -> ClipHandle {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(id.clone()).or_default();
        match entry {
            CacheState::Loaded(existing) => {
                debug!("ClipCache: duplicate install for {} ignored", id);
                existing.clone()
            }
            CacheState::Unloaded => {
                warn!("ClipCache: install for {} without a pending load", id);
                *entry = CacheState::Loaded(handle.clone());
                handle
            }
            CacheState::Loading => {
                debug!("ClipCache: {} -> Loaded ({:.2}s)", id, handle.duration());
                *entry = CacheState::Loaded(handle.clone());
                handle
            }
        }
    }

    /// `Loading -> Unloaded`, so a later request can retry.
    pub fn fail(&self, id: &TrackId) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        match entry {
            CacheState::Loading => {
                *entry = CacheState::Unloaded;
                debug!("ClipCache: {} -> Unloaded (load failed)", id);
            }
            CacheState::Loaded(_) => {
                debug!("ClipCache: fail for loaded {} ignored", id);
            }
            CacheState::Unloaded => {}
        }
    }

    /// Number of known entries (any state)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut snap = CacheSnapshot {
            known: entries.len(),
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            ..Default::default()
        };
        for state in entries.values() {
            match state {
                CacheState::Loading => snap.loading += 1,
                CacheState::Loaded(_) => snap.loaded += 1,
                CacheState::Unloaded => {}
            }
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handle(id: &str) -> ClipHandle {
        ClipHandle::new(TrackId::from(id), id, 10.0)
    }

    #[test]
    fn test_absent_is_unloaded() {
        let cache = ClipCache::new();
        assert_eq!(cache.get(&TrackId::from("u1")), CacheState::Unloaded);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_mark_loading_twice_fails() {
        let cache = ClipCache::new();
        let id = TrackId::from("u1");
        cache.mark_loading(&id).unwrap();
        assert_eq!(cache.mark_loading(&id), Err(PlayerError::AlreadyLoading(id.clone())));
        assert!(cache.get(&id).is_loading());
    }

    #[test]
    fn test_install_is_idempotent() {
        let cache = ClipCache::new();
        let id = TrackId::from("u1");
        let first = handle("u1");
        let second = handle("u1");

        cache.mark_loading(&id).unwrap();
        assert_eq!(cache.install(&id, first.clone()), first);
        // Same and different handle: first one stays
        assert_eq!(cache.install(&id, first.clone()), first);
        assert_eq!(cache.install(&id, second), first);
        assert_eq!(cache.get(&id), CacheState::Loaded(first));
    }

    #[test]
    fn test_stats_count_load_requests_only() {
        let cache = ClipCache::new();
        let id = TrackId::from("u1");
        cache.begin_load(&id);
        cache.begin_load(&id);
        cache.install(&id, handle("u1"));
        cache.begin_load(&id);
        for _ in 0..5 {
            let _ = cache.get(&id);
        }
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 2);
        assert_eq!(cache.snapshot().hits, 1);
    }

    #[test]
    fn test_fail_allows_retry() {
        let cache = ClipCache::new();
        let id = TrackId::from("u1");
        cache.mark_loading(&id).unwrap();
        cache.fail(&id);
        assert_eq!(cache.get(&id), CacheState::Unloaded);
        cache.mark_loading(&id).unwrap();
    }

    #[test]
    fn test_fail_never_drops_loaded() {
        let cache = ClipCache::new();
        let id = TrackId::from("u1");
        cache.mark_loading(&id).unwrap();
        cache.install(&id, handle("u1"));
        cache.fail(&id);
        assert!(cache.get(&id).is_loaded());
    }

    #[test]
    fn test_begin_load_single_winner() {
        let cache = Arc::new(ClipCache::new());
        let id = TrackId::from("u1");
        let winners: usize = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let id = id.clone();
                std::thread::spawn(move || matches!(cache.begin_load(&id), CacheState::Unloaded))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_snapshot_counts() {
        let cache = ClipCache::new();
        cache.mark_loading(&TrackId::from("a")).unwrap();
        cache.mark_loading(&TrackId::from("b")).unwrap();
        cache.install(&TrackId::from("b"), handle("b"));
        let _ = cache.get(&TrackId::from("c"));
        let snap = cache.snapshot();
        assert_eq!(snap.known, 2);
        assert_eq!(snap.loading, 1);
        assert_eq!(snap.loaded, 1);
    }
}
