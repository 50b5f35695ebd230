//! Single-flight clip loader.
//!
//! `request_load(id)` either serves the cached handle synchronously, joins
//! the fetch already in flight for `id`, or claims the load and schedules
//! exactly one `ClipSource::fetch_and_prepare` on the worker pool.
//!
//! On completion the cache transition (`install`/`fail`) and the hand-off of
//! the listener list happen under one lock, then every attached listener is
//! notified once. Listeners are plain channel senders; the coordinator
//! attaches its own completion channel and drains it on its thread.
//!
//! Superseded loads are never cancelled. Their result is installed and
//! delivered like any other; ignoring it for playback is the coordinator's
//! call. Every fetch carries a sequence number, returned by `request_load`
//! and echoed in its completion, so a listener can tell two fetches of the
//! same id apart.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};

use super::clip::{ClipHandle, ClipSource, TrackId};
use super::clip_cache::{CacheState, ClipCache};
use super::error::PlayerError;
use super::workers::WorkerPool;

/// Result of one fetch, delivered to every listener attached to it
#[derive(Debug, Clone)]
pub struct LoadCompletion {
    pub id: TrackId,
    /// Sequence number of the fetch that produced this result
    pub fetch: u64,
    pub result: Result<ClipHandle, PlayerError>,
}

/// Completion listener
pub type LoadListener = Sender<LoadCompletion>;

/// What `request_load` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingLoad {
    /// Served from cache; the listener will not be called
    Ready(ClipHandle),
    /// New fetch issued; the listener is attached to it
    Started(u64),
    /// Fetch already in flight; the listener was added to it
    Joined(u64),
}

impl PendingLoad {
    /// Fetch the listener waits on, `None` when served from cache
    pub fn fetch(&self) -> Option<u64> {
        match self {
            PendingLoad::Ready(_) => None,
            PendingLoad::Started(n) | PendingLoad::Joined(n) => Some(*n),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    fetch: u64,
    listeners: Vec<LoadListener>,
}

type ListenerMap = HashMap<TrackId, InFlight>;

pub struct LoadPipeline {
    cache: Arc<ClipCache>,
    source: Arc<dyn ClipSource>,
    pool: Arc<dyn WorkerPool>,
    in_flight: Arc<Mutex<ListenerMap>>,
    fetches: Arc<AtomicU64>,
}

impl std::fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("in_flight", &self.in_flight_count())
            .field("fetches", &self.fetches_issued())
            .finish()
    }
}

impl LoadPipeline {
    pub fn new(cache: Arc<ClipCache>, source: Arc<dyn ClipSource>, pool: Arc<dyn WorkerPool>) -> Self {
        Self {
            cache,
            source,
            pool,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cache(&self) -> &Arc<ClipCache> {
        &self.cache
    }

    /// Serve, join or start the load for `id`, attaching `listener`.
    ///
    /// Fails with `AlreadyLoading` when the cache entry was claimed outside
    /// the pipeline (`ClipCache::mark_loading`): no fetch exists to join.
    pub fn request_load(&self, id: &TrackId, listener: LoadListener) -> Result<PendingLoad, PlayerError> {
        let fetch = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match self.cache.begin_load(id) {
                CacheState::Loaded(handle) => return Ok(PendingLoad::Ready(handle)),
                CacheState::Loading => {
                    let Some(pending) = in_flight.get_mut(id) else {
                        warn!("LoadPipeline: {} is Loading with no fetch attached", id);
                        return Err(PlayerError::AlreadyLoading(id.clone()));
                    };
                    pending.listeners.push(listener);
                    debug!("LoadPipeline: joined fetch #{} for {}", pending.fetch, id);
                    return Ok(PendingLoad::Joined(pending.fetch));
                }
                CacheState::Unloaded => {
                    let fetch = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
                    in_flight.insert(
                        id.clone(),
                        InFlight {
                            fetch,
                            listeners: vec![listener],
                        },
                    );
                    fetch
                }
            }
        };

        // Lock released: a pool that runs jobs inline must not deadlock
        self.spawn_fetch(id.clone(), fetch);
        Ok(PendingLoad::Started(fetch))
    }

    /// Convenience: request with a private channel.
    pub fn request(&self, id: &TrackId) -> Result<LoadTicket, PlayerError> {
        let (tx, rx) = bounded(1);
        let ready = match self.request_load(id, tx)? {
            PendingLoad::Ready(handle) => Some(handle),
            PendingLoad::Started(_) | PendingLoad::Joined(_) => None,
        };
        Ok(LoadTicket {
            id: id.clone(),
            ready,
            rx,
        })
    }

    pub fn is_in_flight(&self, id: &TrackId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of FetchAndPrepare calls issued so far
    pub fn fetches_issued(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn spawn_fetch(&self, id: TrackId, fetch: u64) {
        let cache = Arc::clone(&self.cache);
        let source = Arc::clone(&self.source);
        let in_flight = Arc::clone(&self.in_flight);
        info!("Loading {} (fetch #{})", id, fetch);

        self.pool.execute(Box::new(move || {
            // A panicking source must still release the Loading claim
            let outcome = catch_unwind(AssertUnwindSafe(|| source.fetch_and_prepare(&id)))
                .unwrap_or_else(|_| Err(anyhow::anyhow!("clip source panicked")));

            let (listeners, result) = {
                let mut in_flight = in_flight.lock().unwrap_or_else(|e| e.into_inner());
                let result = match outcome {
                    Ok(handle) => Ok(cache.install(&id, handle)),
                    Err(e) => {
                        cache.fail(&id);
                        warn!("Load failed for {}: {:#}", id, e);
                        Err(PlayerError::LoadFailed {
                            id: id.clone(),
                            cause: format!("{:#}", e),
                        })
                    }
                };
                let listeners = in_flight.remove(&id).map(|p| p.listeners).unwrap_or_default();
                (listeners, result)
            };

            debug!("LoadPipeline: {} done, notifying {} listener(s)", id, listeners.len());
            for listener in listeners {
                // Dropped receivers are fine: the caller lost interest
                let _ = listener.send(LoadCompletion {
                    id: id.clone(),
                    fetch,
                    result: result.clone(),
                });
            }
        }));
    }
}

/// Handle returned by `LoadPipeline::request`
#[derive(Debug)]
pub struct LoadTicket {
    id: TrackId,
    ready: Option<ClipHandle>,
    rx: Receiver<LoadCompletion>,
}

impl LoadTicket {
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    /// True when served from cache without a fetch
    pub fn is_ready(&self) -> bool {
        self.ready.is_some()
    }

    /// Non-blocking poll. `None` while the fetch is still running.
    pub fn try_result(&self) -> Option<Result<ClipHandle, PlayerError>> {
        if let Some(handle) = &self.ready {
            return Some(Ok(handle.clone()));
        }
        self.rx.try_recv().ok().map(|c| c.result)
    }

    /// Block up to `timeout` for the result.
    pub fn wait(&self, timeout: Duration) -> Option<Result<ClipHandle, PlayerError>> {
        if let Some(handle) = &self.ready {
            return Some(Ok(handle.clone()));
        }
        self.rx.recv_timeout(timeout).ok().map(|c| c.result)
    }
}
