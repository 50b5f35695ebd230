//! Deterministic collaborators for tests and dry runs.
//!
//! - `DeferredPool`: jobs run only when asked, so "load in flight" is a
//!   state a test can hold
//! - `ScriptedSource`: counts FetchAndPrepare calls, fails on demand
//! - `RecordingDecoder` + `DecoderProbe`: records decoder commands and lets
//!   the test move the playhead / signal natural end
//! - `ScriptedRandom`: replays a fixed index sequence

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::clip::{ClipHandle, ClipSource, TrackId};
use super::decoder::{Decoder, RandomSource};
use super::workers::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool that queues jobs until `run_next`/`run_all`.
#[derive(Default)]
pub struct DeferredPool {
    jobs: Mutex<VecDeque<Job>>,
}

impl DeferredPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the oldest queued job. Returns false when the queue was empty.
    pub fn run_next(&self) -> bool {
        let job = self.jobs.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run queued jobs (including ones queued while running). Returns count.
    pub fn run_all(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }

    pub fn queued(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl WorkerPool for DeferredPool {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).push_back(job);
    }
}

/// Clip source with per-id failure switch and call log.
#[derive(Default)]
pub struct ScriptedSource {
    calls: Mutex<Vec<TrackId>>,
    failing: Mutex<HashSet<TrackId>>,
    durations: Mutex<HashMap<TrackId, f64>>,
    default_duration: f64,
}

impl ScriptedSource {
    /// Every clip `duration` seconds long unless overridden
    pub fn new(duration: f64) -> Self {
        Self {
            default_duration: duration,
            ..Default::default()
        }
    }

    pub fn fail(&self, id: impl Into<TrackId>) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert(id.into());
    }

    pub fn succeed(&self, id: impl Into<TrackId>) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).remove(&id.into());
    }

    pub fn set_duration(&self, id: impl Into<TrackId>, seconds: f64) {
        self.durations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.into(), seconds);
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.as_str() == id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ClipSource for ScriptedSource {
    fn fetch_and_prepare(&self, id: &TrackId) -> anyhow::Result<ClipHandle> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(id.clone());
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(id) {
            anyhow::bail!("404 not found");
        }
        let duration = self
            .durations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or(self.default_duration);
        Ok(ClipHandle::new(id.clone(), id.as_str(), duration))
    }
}

/// One recorded decoder command
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderCall {
    Start(ClipHandle),
    Resume,
    Pause,
    Stop,
    Seek(f64),
    Volume(f32),
    Mute(bool),
}

#[derive(Debug, Default)]
struct ProbeState {
    calls: Vec<DecoderCall>,
    loaded: bool,
    playing: bool,
    ended: bool,
    time: f64,
    duration: f64,
}

/// Test-side view of a `RecordingDecoder`.
#[derive(Debug, Clone, Default)]
pub struct DecoderProbe {
    inner: Arc<Mutex<ProbeState>>,
}

impl DecoderProbe {
    pub fn calls(&self) -> Vec<DecoderCall> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls.clear();
    }

    /// Handles passed to `start`, in order
    pub fn starts(&self) -> Vec<ClipHandle> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DecoderCall::Start(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &DecoderCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).playing
    }

    /// Move the playhead as if playback progressed
    pub fn advance_to(&self, seconds: f64) {
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        s.time = seconds.min(s.duration);
    }

    /// Natural end of clip
    pub fn finish(&self) {
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        s.time = s.duration;
        s.ended = true;
        s.playing = false;
    }
}

/// Decoder that records every command into its probe.
#[derive(Debug, Default)]
pub struct RecordingDecoder {
    probe: DecoderProbe,
}

impl RecordingDecoder {
    pub fn new() -> (Self, DecoderProbe) {
        let probe = DecoderProbe::default();
        (Self { probe: probe.clone() }, probe)
    }

    fn with<R>(&self, f: impl FnOnce(&mut ProbeState) -> R) -> R {
        f(&mut self.probe.inner.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Decoder for RecordingDecoder {
    fn start(&mut self, clip: &ClipHandle) {
        self.with(|s| {
            s.calls.push(DecoderCall::Start(clip.clone()));
            s.loaded = true;
            s.playing = true;
            s.ended = false;
            s.time = 0.0;
            s.duration = clip.duration();
        });
    }

    fn resume(&mut self) {
        self.with(|s| {
            s.calls.push(DecoderCall::Resume);
            s.playing = s.loaded;
        });
    }

    fn pause(&mut self) {
        self.with(|s| {
            s.calls.push(DecoderCall::Pause);
            s.playing = false;
        });
    }

    fn stop(&mut self) {
        self.with(|s| {
            s.calls.push(DecoderCall::Stop);
            s.loaded = false;
            s.playing = false;
            s.ended = false;
            s.time = 0.0;
            s.duration = 0.0;
        });
    }

    fn seek_to(&mut self, seconds: f64) {
        self.with(|s| {
            s.calls.push(DecoderCall::Seek(seconds));
            s.time = seconds;
            s.ended = false;
        });
    }

    fn current_time(&self) -> f64 {
        self.with(|s| s.time)
    }

    fn duration(&self) -> f64 {
        self.with(|s| s.duration)
    }

    fn is_playing(&self) -> bool {
        self.with(|s| s.playing)
    }

    fn reached_end(&self) -> bool {
        self.with(|s| s.ended)
    }

    fn set_volume(&mut self, volume: f32) {
        self.with(|s| s.calls.push(DecoderCall::Volume(volume)));
    }

    fn set_mute(&mut self, mute: bool) {
        self.with(|s| s.calls.push(DecoderCall::Mute(mute)));
    }
}

/// Replays a fixed sequence of raw samples (reduced modulo `n`).
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    samples: VecDeque<usize>,
}

impl ScriptedRandom {
    pub fn new(samples: impl IntoIterator<Item = usize>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn uniform_index(&mut self, n: usize) -> usize {
        self.samples.pop_front().unwrap_or(0) % n.max(1)
    }
}
