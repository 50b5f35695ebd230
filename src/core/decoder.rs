//! Seams to the media decoder and the random source.
//!
//! The coordinator only issues commands through these traits; rendering,
//! audio output and codec work live behind them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::clip::ClipHandle;

/// Media decoder driven by the coordinator.
///
/// All calls come from the coordinator thread. Implementations must not
/// block on I/O: the clip is already prepared when `start` is called.
pub trait Decoder: Send {
    /// Load `clip` and play it from position 0.
    fn start(&mut self, clip: &ClipHandle);

    /// Continue after `pause` without reloading.
    fn resume(&mut self);

    fn pause(&mut self);

    /// Stop and release the current clip.
    fn stop(&mut self);

    /// Move the playhead (seconds).
    fn seek_to(&mut self, seconds: f64);

    /// Playhead in seconds (0 when nothing is loaded)
    fn current_time(&self) -> f64;

    /// Length of the loaded clip in seconds (0 when nothing is loaded)
    fn duration(&self) -> f64;

    fn is_playing(&self) -> bool;

    /// True once playback ran past the end of the clip.
    fn reached_end(&self) -> bool {
        false
    }

    fn set_volume(&mut self, _volume: f32) {}

    fn set_mute(&mut self, _mute: bool) {}
}

/// Source of uniformly distributed indices.
pub trait RandomSource: Send {
    /// Uniform index in `0..n`. Callers guarantee `n > 0`.
    fn uniform_index(&mut self, n: usize) -> usize;
}

/// Thread-local RNG, the default for interactive sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform_index(&mut self, n: usize) -> usize {
        rand::rng().random_range(0..n)
    }
}

/// Seeded RNG for reproducible shuffle order (`--seed`).
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn uniform_index(&mut self, n: usize) -> usize {
        self.rng.random_range(0..n)
    }
}
