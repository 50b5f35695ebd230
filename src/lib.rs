//! CLIPLAY - clip playlist player library
//!
//! Re-exports all modules for use by the binary target.

// Core engine (playlist, cache, loader, coordinator, workers)
pub mod core;

// App modules
pub mod backend;
pub mod cli;
pub mod config;
pub mod paths;
pub mod shell;
pub mod timecode;

// Re-export commonly used types from core
pub use core::clip::{ClipHandle, ClipSource, TrackId};
pub use core::clip_cache::{CacheState, ClipCache};
pub use core::error::PlayerError;
pub use core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use core::loader::LoadPipeline;
pub use core::player::{PlaybackCoordinator, PlaybackPolicy, PlaybackState};
pub use core::playlist::PlaylistIndex;
pub use core::workers::Workers;
