//! Events emitted by the playback coordinator.
//!
//! Values only: formatting (time labels, icons) is up to the subscriber.

use super::clip::TrackId;
use super::error::PlayerError;
use super::player::{PlaybackPolicy, PlaybackState};

// === State ===

#[derive(Clone, Debug, PartialEq)]
pub struct StateChangedEvent {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// Cursor moved to a new target (load may still be pending)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackChangedEvent {
    pub id: TrackId,
    pub index: usize,
}

/// Spinner visibility: true while awaiting a load
#[derive(Clone, Debug, PartialEq)]
pub struct LoadingChangedEvent(pub bool);

#[derive(Clone, Debug, PartialEq)]
pub struct LoadFailedEvent(pub PlayerError);

/// Autoplay hit the last track without loop
#[derive(Clone, Debug, PartialEq)]
pub struct PlaylistEndEvent(pub TrackId);

// === Scrub / time ===

/// Both scrub sliders back to 0
#[derive(Clone, Debug, PartialEq)]
pub struct ScrubResetEvent;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayheadEvent {
    pub time: f64,
    pub duration: f64,
}

/// Total time of the clip that just started
#[derive(Clone, Debug, PartialEq)]
pub struct DurationEvent(pub f64);

// === Policy / audio ===

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyChangedEvent(pub PlaybackPolicy);
