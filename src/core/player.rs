//! Playback coordinator - the state machine sequencing a clip playlist.
//!
//! **Architecture**: the coordinator owns the playlist cursor, the load
//! pipeline (and through it the clip cache) and the decoder. It is a single
//! logical actor: UI commands and load completions are processed one at a
//! time on the thread that owns it. Load completions arrive on a channel and
//! are applied in `pump()` / `tick()`, never from the loader thread.
//!
//! # States
//!
//! ```text
//! Idle --PlayPause--> AwaitingLoad(t) --loaded(t)--> Playing(t) <--PlayPause--> Paused(t)
//!                          |  ^                          |
//!                   failed |  | Next/Previous/Select     | natural end
//!                          v  |                          v
//!                        Idle +---------------------- Completed(t)
//! ```
//!
//! # Stale loads
//!
//! Navigating while a load is pending does not cancel it. When the old load
//! completes its handle is already in the cache; the coordinator only acts
//! on a completion from the fetch its *current* `AwaitingLoad` waits on. The
//! id alone is not enough: leaving a track and coming back after its fetch
//! failed starts a second fetch of the same id.
//!
//! # Autoplay
//!
//! On natural end: shuffle picks a random other track; otherwise advance if
//! there is a next track or `loop` is set (wrapping); otherwise stop at
//! `Completed`. `loop` never affects manual Next, which always wraps.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use super::clip::{ClipHandle, TrackId};
use super::clip_cache::ClipCache;
use super::decoder::{Decoder, RandomSource};
use super::error::PlayerError;
use super::event_bus::EventBus;
use super::loader::{LoadCompletion, LoadPipeline, PendingLoad};
use super::player_events::*;
use super::playlist::PlaylistIndex;

/// Coordinator state. Every non-idle state names its target track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing playing; nothing chosen yet or the last load failed
    #[default]
    Idle,
    /// Load requested for the target; spinner visible
    AwaitingLoad(TrackId),
    Playing(TrackId),
    Paused(TrackId),
    /// Natural end reached and no automatic advance happened
    Completed(TrackId),
}

impl PlaybackState {
    /// Short tag for status output
    pub fn tag(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::AwaitingLoad(_) => "loading",
            PlaybackState::Playing(_) => "playing",
            PlaybackState::Paused(_) => "paused",
            PlaybackState::Completed(_) => "completed",
        }
    }

    pub fn track(&self) -> Option<&TrackId> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::AwaitingLoad(t)
            | PlaybackState::Playing(t)
            | PlaybackState::Paused(t)
            | PlaybackState::Completed(t) => Some(t),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.track() {
            Some(t) => write!(f, "{}({})", self.tag(), t),
            None => f.write_str(self.tag()),
        }
    }
}

/// Independently togglable flags, kept across track changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackPolicy {
    pub shuffle: bool,
    pub loop_enabled: bool,
    pub autoplay: bool,
    pub mute: bool,
    /// 0.0..=1.0
    pub volume: f32,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            shuffle: false,
            loop_enabled: false,
            autoplay: false,
            mute: false,
            volume: 1.0,
        }
    }
}

impl PlaybackPolicy {
    /// Clamp volume into range (NaN becomes 0)
    pub fn normalized(mut self) -> Self {
        self.volume = clamp_volume(self.volume);
        self
    }
}

fn clamp_volume(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// The playback/cache coordinator.
pub struct PlaybackCoordinator {
    playlist: PlaylistIndex,
    pipeline: LoadPipeline,
    decoder: Box<dyn Decoder>,
    rng: Box<dyn RandomSource>,
    policy: PlaybackPolicy,
    state: PlaybackState,
    /// Handle the decoder was started with (None while idle/loading)
    current: Option<ClipHandle>,
    /// Scrub slider value in seconds
    playhead: f64,
    /// Cursor before the pending navigation chain, restored if it fails
    restore_cursor: Option<Option<usize>>,
    /// Fetch number the `AwaitingLoad` state waits on
    awaiting_fetch: Option<u64>,
    last_error: Option<PlayerError>,
    events: EventBus,
    completion_tx: Sender<LoadCompletion>,
    completion_rx: Receiver<LoadCompletion>,
}

impl fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("state", &self.state)
            .field("cursor", &self.playlist.cursor_raw())
            .field("policy", &self.policy)
            .field("playhead", &self.playhead)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl PlaybackCoordinator {
    /// Create coordinator in `Idle` with the cursor at the sentinel.
    pub fn new(
        playlist: PlaylistIndex,
        pipeline: LoadPipeline,
        decoder: Box<dyn Decoder>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        info!("PlaybackCoordinator initialized: {} tracks", playlist.len());
        Self {
            playlist,
            pipeline,
            decoder,
            rng,
            policy: PlaybackPolicy::default(),
            state: PlaybackState::Idle,
            current: None,
            playhead: 0.0,
            restore_cursor: None,
            awaiting_fetch: None,
            last_error: None,
            events: EventBus::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Apply initial policy and push volume/mute to the decoder.
    pub fn with_policy(mut self, policy: PlaybackPolicy) -> Self {
        self.policy = policy.normalized();
        self.decoder.set_volume(self.policy.volume);
        self.decoder.set_mute(self.policy.mute);
        self
    }

    // === Observable outputs ===

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Track the coordinator is loading/playing/paused on
    pub fn current_track(&self) -> Option<&TrackId> {
        self.state.track()
    }

    /// Scrub/playhead position in seconds
    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// Duration of the active clip in seconds (0 when none)
    pub fn duration(&self) -> f64 {
        match &self.current {
            Some(handle) => {
                let d = self.decoder.duration();
                if d > 0.0 { d } else { handle.duration() }
            }
            None => 0.0,
        }
    }

    /// Loading indicator (spinner)
    pub fn is_loading(&self) -> bool {
        matches!(self.state, PlaybackState::AwaitingLoad(_))
    }

    /// Cursor in `[-1, len-1]`
    pub fn cursor(&self) -> isize {
        self.playlist.cursor_raw()
    }

    pub fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    pub fn last_error(&self) -> Option<&PlayerError> {
        self.last_error.as_ref()
    }

    pub fn playlist(&self) -> &PlaylistIndex {
        &self.playlist
    }

    pub fn cache(&self) -> &Arc<ClipCache> {
        self.pipeline.cache()
    }

    pub fn pipeline(&self) -> &LoadPipeline {
        &self.pipeline
    }

    /// Bus carrying `player_events` to the UI layer
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // === Transport commands ===

    /// Play/pause toggle.
    ///
    /// From `Idle` this resolves the first track (or retries the restored
    /// cursor after a failed load); from `Completed` it replays the clip.
    pub fn play_pause(&mut self) -> Result<(), PlayerError> {
        match self.state.clone() {
            PlaybackState::Idle => {
                let target = match self.playlist.cursor() {
                    Some(c) => c,
                    None => self.playlist.next_index(None)?,
                };
                self.navigate_to(target)
            }
            PlaybackState::AwaitingLoad(t) => {
                debug!("PlayPause ignored while loading {}", t);
                Ok(())
            }
            PlaybackState::Playing(t) => {
                self.decoder.pause();
                self.set_state(PlaybackState::Paused(t));
                Ok(())
            }
            PlaybackState::Paused(t) => {
                self.decoder.resume();
                self.set_state(PlaybackState::Playing(t));
                Ok(())
            }
            PlaybackState::Completed(t) => self.replay(t),
        }
    }

    /// Start the first track if nothing was chosen yet (load-on-start).
    pub fn start(&mut self) -> Result<(), PlayerError> {
        if self.state == PlaybackState::Idle && self.playlist.cursor().is_none() {
            self.play_pause()
        } else {
            Ok(())
        }
    }

    /// Next track (random other track under shuffle). Always wraps.
    pub fn next(&mut self) -> Result<(), PlayerError> {
        let target = if self.policy.shuffle {
            self.playlist.random_index(self.playlist.cursor(), self.rng.as_mut())?
        } else {
            self.playlist.next_index(self.playlist.cursor())?
        };
        self.navigate_to(target)
    }

    /// Previous track (random other track under shuffle). Always wraps.
    pub fn previous(&mut self) -> Result<(), PlayerError> {
        let target = if self.policy.shuffle {
            self.playlist.random_index(self.playlist.cursor(), self.rng.as_mut())?
        } else {
            self.playlist.previous_index(self.playlist.cursor())?
        };
        self.navigate_to(target)
    }

    /// Jump to a track by identifier.
    pub fn select_track(&mut self, id: &TrackId) -> Result<(), PlayerError> {
        let idx = self
            .playlist
            .position(id)
            .ok_or_else(|| PlayerError::UnknownTrack(id.clone()))?;
        self.navigate_to(idx)
    }

    /// Seek to `seconds` (clamped to the clip); starts playback if stopped.
    pub fn scrub_to(&mut self, seconds: f64) -> Result<(), PlayerError> {
        let (track, handle) = self.active_clip()?;
        let target = self.clamp_time(seconds);

        match &self.state {
            // Decoder was stopped at end of clip: reload before seeking
            PlaybackState::Completed(_) => {
                self.decoder.start(&handle);
                self.decoder.seek_to(target);
            }
            _ => {
                self.decoder.seek_to(target);
                if !self.decoder.is_playing() {
                    self.decoder.resume();
                }
            }
        }

        self.playhead = target;
        trace!("Scrub {} -> {:.2}s", track, target);
        self.emit_playhead();
        self.set_state(PlaybackState::Playing(track));
        Ok(())
    }

    /// Relative seek clamped to `[0, duration]`. Keeps play/pause state.
    pub fn skip(&mut self, seconds: f64) -> Result<(), PlayerError> {
        if seconds == 0.0 || !seconds.is_finite() {
            warn!("Skip by {} seconds ignored", seconds);
            return Ok(());
        }
        self.active_clip()?;
        let target = self.clamp_time(self.playhead + seconds);
        self.decoder.seek_to(target);
        self.playhead = target;
        self.emit_playhead();
        Ok(())
    }

    /// Back to 0 and play the current clip again.
    pub fn restart(&mut self) -> Result<(), PlayerError> {
        let (track, _) = self.active_clip()?;
        self.decoder.stop();
        self.replay(track)
    }

    // === Policy ===

    pub fn select_shuffle(&mut self, enabled: bool) {
        self.policy.shuffle = enabled;
        self.policy_changed();
    }

    pub fn select_loop(&mut self, enabled: bool) {
        self.policy.loop_enabled = enabled;
        self.policy_changed();
    }

    pub fn select_autoplay(&mut self, enabled: bool) {
        self.policy.autoplay = enabled;
        self.policy_changed();
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.select_shuffle(!self.policy.shuffle);
        self.policy.shuffle
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.select_loop(!self.policy.loop_enabled);
        self.policy.loop_enabled
    }

    /// Set volume (clamped to 0..=1) and pass it to the decoder.
    pub fn set_volume(&mut self, volume: f32) {
        self.policy.volume = clamp_volume(volume);
        self.decoder.set_volume(self.policy.volume);
        self.policy_changed();
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.policy.mute = !self.policy.mute;
        self.decoder.set_mute(self.policy.mute);
        self.policy_changed();
        self.policy.mute
    }

    // === Completions and periodic work ===

    /// Apply every load completion received so far. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion);
            n += 1;
        }
        n
    }

    /// Block up to `timeout` for one completion and apply it.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.handle_completion(completion);
                true
            }
            Err(_) => false,
        }
    }

    /// Periodic update: apply completions, refresh playhead, detect end.
    pub fn tick(&mut self) -> Result<(), PlayerError> {
        self.pump();

        if let PlaybackState::Playing(_) = self.state {
            self.playhead = self.decoder.current_time();
            self.emit_playhead();
            if self.decoder.reached_end() {
                return self.on_clip_finished();
            }
        }
        Ok(())
    }

    /// Natural end of the current clip (decoder callback).
    pub fn on_clip_finished(&mut self) -> Result<(), PlayerError> {
        let PlaybackState::Playing(track) = self.state.clone() else {
            debug!("End of clip ignored in state {}", self.state);
            return Ok(());
        };
        info!("Clip complete: {}", track);
        self.playhead = self.duration();
        self.set_state(PlaybackState::Completed(track.clone()));

        if !self.policy.autoplay {
            return Ok(());
        }

        let cursor = self.playlist.cursor();

        if self.policy.shuffle {
            let target = self.playlist.random_index(cursor, self.rng.as_mut())?;
            return self.navigate_to(target);
        }

        let has_next = cursor.map(|c| c + 1 < self.playlist.len()).unwrap_or(false);
        if has_next || self.policy.loop_enabled {
            let target = self.playlist.next_index(cursor)?;
            return self.navigate_to(target);
        }

        info!("Reached the end of the playlist");
        self.events.emit(PlaylistEndEvent(track));
        Ok(())
    }

    // === Internals ===

    /// Stop whatever plays, move the cursor, and load/start `idx`.
    fn navigate_to(&mut self, idx: usize) -> Result<(), PlayerError> {
        let id = self
            .playlist
            .get(idx)
            .cloned()
            .ok_or(PlayerError::EmptyPlaylist)?;

        if self.current.take().is_some() {
            self.decoder.stop();
        }
        self.playhead = 0.0;
        self.events.emit(ScrubResetEvent);

        // A chain of navigations while loading restores to where it began
        if !self.is_loading() {
            self.restore_cursor = Some(self.playlist.cursor());
        }
        self.playlist.set_cursor(Some(idx))?;
        info!("Track {} -> {}", idx, id);
        self.events.emit(TrackChangedEvent {
            id: id.clone(),
            index: idx,
        });

        let pending = match self.pipeline.request_load(&id, self.completion_tx.clone()) {
            Ok(pending) => pending,
            Err(err) => {
                self.fail_load(err.clone());
                return Err(err);
            }
        };
        match pending {
            PendingLoad::Ready(handle) => {
                debug!("Cache hit for {}", id);
                self.begin_playback(id, handle);
            }
            PendingLoad::Started(fetch) | PendingLoad::Joined(fetch) => {
                let was_loading = self.is_loading();
                self.awaiting_fetch = Some(fetch);
                self.set_state(PlaybackState::AwaitingLoad(id));
                if !was_loading {
                    self.events.emit(LoadingChangedEvent(true));
                }
            }
        }
        Ok(())
    }

    fn handle_completion(&mut self, completion: LoadCompletion) {
        let LoadCompletion { id, fetch, result } = completion;

        let is_current = matches!(&self.state, PlaybackState::AwaitingLoad(t) if *t == id)
            && self.awaiting_fetch == Some(fetch);
        if !is_current {
            match &result {
                Ok(_) => debug!("Stale load #{} for {} cached, not played (state {})", fetch, id, self.state),
                Err(e) => debug!("Stale load #{} for {} failed: {}", fetch, id, e),
            }
            return;
        }
        self.awaiting_fetch = None;

        match result {
            Ok(handle) => self.begin_playback(id, handle),
            Err(err) => self.fail_load(err),
        }
    }

    fn begin_playback(&mut self, id: TrackId, handle: ClipHandle) {
        let was_loading = self.is_loading();
        self.decoder.start(&handle);
        self.current = Some(handle);
        self.playhead = 0.0;
        self.restore_cursor = None;
        self.awaiting_fetch = None;
        self.last_error = None;

        self.set_state(PlaybackState::Playing(id));
        if was_loading {
            self.events.emit(LoadingChangedEvent(false));
        }
        self.events.emit(DurationEvent(self.duration()));
        self.emit_playhead();
    }

    fn fail_load(&mut self, err: PlayerError) {
        if err.is_recoverable() {
            warn!("{}", err);
        } else {
            error!("{}", err);
        }

        if let Some(cursor) = self.restore_cursor.take() {
            if let Err(e) = self.playlist.set_cursor(cursor) {
                error!("Failed to restore cursor: {}", e);
            }
        }
        let was_loading = self.is_loading();
        self.current = None;
        self.awaiting_fetch = None;
        self.playhead = 0.0;
        self.set_state(PlaybackState::Idle);
        if was_loading {
            self.events.emit(LoadingChangedEvent(false));
        }
        self.events.emit(LoadFailedEvent(err.clone()));
        self.last_error = Some(err);
    }

    /// Start `track`'s cached handle from 0.
    fn replay(&mut self, track: TrackId) -> Result<(), PlayerError> {
        let handle = match self.current.clone().or_else(|| self.cache().get(&track).handle().cloned()) {
            Some(h) => h,
            None => {
                let idx = self
                    .playlist
                    .position(&track)
                    .ok_or_else(|| PlayerError::UnknownTrack(track.clone()))?;
                return self.navigate_to(idx);
            }
        };
        self.decoder.start(&handle);
        self.current = Some(handle);
        self.playhead = 0.0;
        self.events.emit(ScrubResetEvent);
        self.set_state(PlaybackState::Playing(track));
        Ok(())
    }

    fn active_clip(&self) -> Result<(TrackId, ClipHandle), PlayerError> {
        match (&self.state, &self.current) {
            (
                PlaybackState::Playing(t) | PlaybackState::Paused(t) | PlaybackState::Completed(t),
                Some(h),
            ) => Ok((t.clone(), h.clone())),
            _ => Err(PlayerError::NoActiveClip),
        }
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let duration = self.duration();
        if duration > 0.0 { seconds.min(duration) } else { seconds }
    }

    fn set_state(&mut self, to: PlaybackState) {
        if self.state == to {
            return;
        }
        let from = std::mem::replace(&mut self.state, to.clone());
        debug!("State {} -> {}", from, to);
        self.events.emit(StateChangedEvent { from, to });
    }

    fn emit_playhead(&self) {
        self.events.emit(PlayheadEvent {
            time: self.playhead,
            duration: self.duration(),
        });
    }

    fn policy_changed(&self) {
        debug!("Policy: {:?}", self.policy);
        self.events.emit(PolicyChangedEvent(self.policy));
    }
}
