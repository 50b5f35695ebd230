//! Headless backends used by the `cliplay` binary.
//!
//! - `UrlSource`: FetchAndPrepare for `http(s)://` (HEAD probe via ureq),
//!   local files (`file://` or plain paths) and `sim://` clips
//! - `ClockDecoder`: a decoder without output whose playhead follows the
//!   wall clock
//!
//! `sim://name?secs=12&delay_ms=300&fail` makes a clip of 12 s that takes
//! 300 ms to prepare, or fails when `fail` is present.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{debug, trace};

use crate::core::clip::{ClipHandle, ClipSource, TrackId};
use crate::core::decoder::Decoder;

/// Resolves playlist entries into prepared clip handles.
pub struct UrlSource {
    agent: ureq::Agent,
    default_duration: f64,
}

impl UrlSource {
    pub fn new(timeout: Duration, default_duration: f64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            default_duration: default_duration.max(0.0),
        }
    }

    fn probe_http(&self, id: &TrackId) -> Result<ClipHandle> {
        match self.agent.head(id.as_str()).call() {
            Ok(response) => {
                let size = response
                    .header("Content-Length")
                    .and_then(|v| v.trim().parse::<u64>().ok());
                debug!("HEAD {} -> {} ({:?} bytes)", id, response.status(), size);
                Ok(match size {
                    Some(size) => ClipHandle::with_size(id.clone(), id.as_str(), self.default_duration, size),
                    None => ClipHandle::new(id.clone(), id.as_str(), self.default_duration),
                })
            }
            Err(ureq::Error::Status(status, _)) => bail!("HTTP status {}", status),
            Err(ureq::Error::Transport(err)) => bail!("transport error: {}", err),
        }
    }

    fn probe_file(&self, id: &TrackId, path: &Path) -> Result<ClipHandle> {
        let meta = std::fs::metadata(path).with_context(|| format!("cannot open {}", path.display()))?;
        if !meta.is_file() {
            bail!("not a file: {}", path.display());
        }
        Ok(ClipHandle::with_size(
            id.clone(),
            path.to_string_lossy(),
            self.default_duration,
            meta.len(),
        ))
    }

    fn simulate(&self, id: &TrackId, rest: &str) -> Result<ClipHandle> {
        let sim = SimClip::parse(rest, self.default_duration)?;
        if sim.delay > Duration::ZERO {
            std::thread::sleep(sim.delay);
        }
        if sim.fail {
            bail!("simulated failure for {}", sim.name);
        }
        Ok(ClipHandle::new(id.clone(), id.as_str(), sim.seconds))
    }
}

impl ClipSource for UrlSource {
    fn fetch_and_prepare(&self, id: &TrackId) -> Result<ClipHandle> {
        let location = id.as_str().trim();
        if let Some(rest) = location.strip_prefix("sim://") {
            self.simulate(id, rest)
        } else if location.starts_with("http://") || location.starts_with("https://") {
            self.probe_http(id)
        } else if let Some(path) = location.strip_prefix("file://") {
            self.probe_file(id, Path::new(path))
        } else {
            self.probe_file(id, Path::new(location))
        }
    }
}

/// Parsed `sim://` location
#[derive(Debug, Clone, PartialEq)]
struct SimClip {
    name: String,
    seconds: f64,
    delay: Duration,
    fail: bool,
}

impl SimClip {
    fn parse(rest: &str, default_seconds: f64) -> Result<Self> {
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        if name.is_empty() {
            bail!("sim clip has no name");
        }
        let mut clip = SimClip {
            name: name.to_string(),
            seconds: default_seconds,
            delay: Duration::ZERO,
            fail: false,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "secs" => {
                    clip.seconds = value
                        .parse::<f64>()
                        .ok()
                        .filter(|s| s.is_finite() && *s >= 0.0)
                        .with_context(|| format!("bad secs in sim://{}", rest))?
                }
                "delay_ms" => {
                    let ms = value
                        .parse::<u64>()
                        .with_context(|| format!("bad delay_ms in sim://{}", rest))?;
                    clip.delay = Duration::from_millis(ms);
                }
                "fail" => clip.fail = true,
                other => bail!("unknown sim option '{}'", other),
            }
        }
        Ok(clip)
    }
}

/// Decoder with no output; the playhead advances with wall-clock time.
#[derive(Debug, Default)]
pub struct ClockDecoder {
    clip: Option<ClipHandle>,
    /// Position at `anchor` (or the paused position)
    offset: f64,
    /// Set while playing
    anchor: Option<Instant>,
    volume: f32,
    mute: bool,
}

impl ClockDecoder {
    pub fn new() -> Self {
        Self {
            volume: 1.0,
            ..Default::default()
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    fn position_at(&self, now: Instant) -> f64 {
        let elapsed = self
            .anchor
            .map(|a| now.saturating_duration_since(a).as_secs_f64())
            .unwrap_or(0.0);
        (self.offset + elapsed).min(self.duration())
    }
}

impl Decoder for ClockDecoder {
    fn start(&mut self, clip: &ClipHandle) {
        debug!("ClockDecoder: start {} ({:.1}s)", clip.id(), clip.duration());
        self.clip = Some(clip.clone());
        self.offset = 0.0;
        self.anchor = Some(Instant::now());
    }

    fn resume(&mut self) {
        if self.clip.is_some() && self.anchor.is_none() {
            self.anchor = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.offset = self.position_at(Instant::now());
        self.anchor = None;
    }

    fn stop(&mut self) {
        self.clip = None;
        self.offset = 0.0;
        self.anchor = None;
    }

    fn seek_to(&mut self, seconds: f64) {
        trace!("ClockDecoder: seek {:.2}", seconds);
        self.offset = seconds.clamp(0.0, self.duration());
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }

    fn current_time(&self) -> f64 {
        self.position_at(Instant::now())
    }

    fn duration(&self) -> f64 {
        self.clip.as_ref().map(|c| c.duration()).unwrap_or(0.0)
    }

    fn is_playing(&self) -> bool {
        self.clip.is_some() && self.anchor.is_some() && !self.reached_end()
    }

    fn reached_end(&self) -> bool {
        self.clip.is_some() && self.current_time() >= self.duration()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> UrlSource {
        UrlSource::new(Duration::from_millis(200), 30.0)
    }

    #[test]
    fn test_sim_clip_parse() {
        let clip = SimClip::parse("intro?secs=12.5&delay_ms=3", 30.0).unwrap();
        assert_eq!(clip.name, "intro");
        assert_eq!(clip.seconds, 12.5);
        assert_eq!(clip.delay, Duration::from_millis(3));
        assert!(!clip.fail);

        assert_eq!(SimClip::parse("x", 30.0).unwrap().seconds, 30.0);
        assert!(SimClip::parse("x?fail", 30.0).unwrap().fail);
        assert!(SimClip::parse("x?secs=-1", 30.0).is_err());
        assert!(SimClip::parse("x?bogus=1", 30.0).is_err());
        assert!(SimClip::parse("", 30.0).is_err());
    }

    #[test]
    fn test_sim_source() {
        let src = source();
        let handle = src.fetch_and_prepare(&TrackId::from("sim://a?secs=4")).unwrap();
        assert_eq!(handle.duration(), 4.0);
        assert_eq!(handle.location(), "sim://a?secs=4");

        let err = src.fetch_and_prepare(&TrackId::from("sim://b?fail")).unwrap_err();
        assert!(err.to_string().contains("simulated failure"));
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let src = source();
        let handle = src
            .fetch_and_prepare(&TrackId::new(path.to_string_lossy()))
            .unwrap();
        assert_eq!(handle.size_bytes(), Some(64));
        assert_eq!(handle.duration(), 30.0);

        let url = format!("file://{}", path.display());
        assert!(src.fetch_and_prepare(&TrackId::new(url)).is_ok());
        assert!(src.fetch_and_prepare(&TrackId::new(dir.path().to_string_lossy())).is_err());
        assert!(src.fetch_and_prepare(&TrackId::from("/no/such/clip.mp4")).is_err());
    }

    #[test]
    fn test_clock_decoder_transport() {
        let mut decoder = ClockDecoder::new();
        assert_eq!(decoder.current_time(), 0.0);
        assert!(!decoder.reached_end());

        let clip = ClipHandle::new(TrackId::from("c"), "c", 10.0);
        decoder.start(&clip);
        assert!(decoder.is_playing());
        assert_eq!(decoder.duration(), 10.0);

        decoder.pause();
        decoder.seek_to(4.0);
        assert_eq!(decoder.current_time(), 4.0);
        assert!(!decoder.is_playing());

        decoder.seek_to(99.0);
        assert!(decoder.reached_end());

        decoder.stop();
        assert_eq!(decoder.duration(), 0.0);
        assert!(!decoder.reached_end());
    }

    #[test]
    fn test_clock_decoder_advances() {
        let mut decoder = ClockDecoder::new();
        decoder.start(&ClipHandle::new(TrackId::from("c"), "c", 0.02));
        std::thread::sleep(Duration::from_millis(40));
        assert!(decoder.reached_end());
        assert_eq!(decoder.current_time(), 0.02);
    }
}
