//! Persisted session settings (`cliplay.json`).
//!
//! Missing file gives defaults; a malformed file is logged and ignored so a
//! broken config never blocks playback.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::player::PlaybackPolicy;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Playback policy
    pub autoplay: bool,
    pub loop_enabled: bool,
    pub shuffle: bool,
    pub mute: bool,
    pub volume: f32, // 0.0..=1.0

    /// Start the first track right after startup
    pub load_on_start: bool,
    /// Step for the skip forward/back commands (seconds)
    pub skip_seconds: f64,

    // Headless backend
    pub default_clip_seconds: f64, // Duration assumed when the source reports none
    pub http_timeout_ms: u64,
    pub workers_override: u32, // 0 = auto
    pub tick_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autoplay: false,
            loop_enabled: false,
            shuffle: false,
            mute: false,
            volume: 1.0,
            load_on_start: false,
            skip_seconds: 5.0,
            default_clip_seconds: 30.0,
            http_timeout_ms: 10_000,
            workers_override: 0,
            tick_ms: 100,
        }
    }
}

impl Settings {
    /// Load from `path`. Missing or malformed files give defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Clamp values that would break playback
    pub fn normalized(mut self) -> Self {
        self.volume = if self.volume.is_nan() { 0.0 } else { self.volume.clamp(0.0, 1.0) };
        if !(self.skip_seconds.is_finite() && self.skip_seconds > 0.0) {
            self.skip_seconds = Self::default().skip_seconds;
        }
        if !(self.default_clip_seconds.is_finite() && self.default_clip_seconds >= 0.0) {
            self.default_clip_seconds = Self::default().default_clip_seconds;
        }
        self.tick_ms = self.tick_ms.max(1);
        self
    }

    pub fn policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            shuffle: self.shuffle,
            loop_enabled: self.loop_enabled,
            autoplay: self.autoplay,
            mute: self.mute,
            volume: self.volume,
        }
        .normalized()
    }

    /// Store the policy flags back (after a session changed them)
    pub fn apply_policy(&mut self, policy: PlaybackPolicy) {
        self.shuffle = policy.shuffle;
        self.loop_enabled = policy.loop_enabled;
        self.autoplay = policy.autoplay;
        self.mute = policy.mute;
        self.volume = policy.volume;
    }

    /// Worker thread count: override, else 75% of cores (at least 1)
    pub fn worker_count(&self) -> usize {
        match self.workers_override {
            0 => (num_cpus::get() * 3 / 4).max(1),
            n => n as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join("cliplay.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.skip_seconds, 5.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cliplay.json");
        let settings = Settings {
            autoplay: true,
            shuffle: true,
            volume: 0.25,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cliplay.json");

        std::fs::write(&path, r#"{ "loop_enabled": true, "volume": 4.0 }"#).unwrap();
        let settings = Settings::load_or_default(&path);
        assert!(settings.loop_enabled);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.tick_ms, 100);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
        assert_eq!(Settings::load_or_default(&path), Settings::default());
    }

    #[test]
    fn test_policy_round_trip() {
        let mut settings = Settings::default();
        let mut policy = settings.policy();
        policy.loop_enabled = true;
        policy.mute = true;
        settings.apply_policy(policy);
        assert!(settings.loop_enabled && settings.mute);
        assert_eq!(settings.policy(), policy);
    }

    #[test]
    fn test_worker_count() {
        let mut settings = Settings::default();
        assert!(settings.worker_count() >= 1);
        settings.workers_override = 3;
        assert_eq!(settings.worker_count(), 3);
    }
}
