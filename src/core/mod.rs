//! Core engine modules - playlist, cache, loader, coordinator, workers
//!
//! These modules form the playback engine, independent of any UI.

pub mod clip;
pub mod clip_cache;
pub mod decoder;
pub mod error;
pub mod event_bus;
pub mod loader;
pub mod player;
pub mod player_events;
pub mod playlist;
pub mod workers;

#[doc(hidden)]
pub mod testing;

// Re-exports for convenience
pub use clip::{ClipHandle, ClipSource, TrackId};
pub use clip_cache::{CacheSnapshot, CacheState, CacheStats, ClipCache};
pub use decoder::{Decoder, RandomSource, SeededRandom, ThreadRandom};
pub use error::PlayerError;
pub use event_bus::{BoxedEvent, EventBus, downcast_event};
pub use loader::{LoadCompletion, LoadPipeline, LoadTicket, PendingLoad};
pub use player::{PlaybackCoordinator, PlaybackPolicy, PlaybackState};
pub use playlist::PlaylistIndex;
pub use workers::{WorkerPool, Workers};
