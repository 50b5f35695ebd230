use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::config::Settings;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Sources: file, http(s) (ureq), sim\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless clip playlist player
#[derive(Parser, Debug, Default)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Clip locations in play order (http(s) URL, file path or sim://name[?secs])
    #[arg(value_name = "CLIP")]
    pub clips: Vec<String>,

    /// Load playlist from JSON file (array of locations or {"tracks": [...]})
    #[arg(short = 'p', long = "playlist", value_name = "PLAYLIST")]
    pub playlist: Option<PathBuf>,

    /// Advance to the next clip when one finishes
    #[arg(short = 'a', long = "autoplay", overrides_with = "no_autoplay")]
    pub autoplay: bool,

    /// Disable autoplay even if the settings enable it
    #[arg(long = "no-autoplay", overrides_with = "autoplay")]
    pub no_autoplay: bool,

    /// Wrap around at the end of the playlist (with autoplay)
    #[arg(short = 'o', long = "loop", overrides_with = "no_loop")]
    pub loop_playback: bool,

    /// Disable loop even if the settings enable it
    #[arg(long = "no-loop", overrides_with = "loop_playback")]
    pub no_loop: bool,

    /// Pick a random other clip on next/previous/autoplay
    #[arg(short = 's', long = "shuffle", overrides_with = "no_shuffle")]
    pub shuffle: bool,

    /// Disable shuffle even if the settings enable it
    #[arg(long = "no-shuffle", overrides_with = "shuffle")]
    pub no_shuffle: bool,

    /// Start muted
    #[arg(short = 'm', long = "mute", overrides_with = "no_mute")]
    pub mute: bool,

    /// Start unmuted even if the settings say muted
    #[arg(long = "no-mute", overrides_with = "mute")]
    pub no_mute: bool,

    /// Output volume 0.0..=1.0
    #[arg(long = "volume", value_name = "VOL")]
    pub volume: Option<f32>,

    /// Start the first clip immediately
    #[arg(long = "start", overrides_with = "no_start")]
    pub load_on_start: bool,

    /// Wait for a command before loading anything
    #[arg(long = "no-start", overrides_with = "load_on_start")]
    pub no_start: bool,

    /// Seed for shuffle (reproducible order)
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// Enable debug logging to file (default: cliplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Write the effective settings back to cliplay.json
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Worker threads for clip loading (0 = auto)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlaylistFile {
    List(Vec<String>),
    Object { tracks: Vec<String> },
}

impl Args {
    /// Playlist file entries first, then positional clips.
    pub fn track_ids(&self) -> Result<Vec<String>> {
        let mut ids = match &self.playlist {
            Some(path) => load_playlist_file(path)?,
            None => Vec::new(),
        };
        ids.extend(self.clips.iter().cloned());
        Ok(ids)
    }

    /// Apply flags on top of the stored settings. Absent flags keep the
    /// stored value; `--no-*` forms turn a stored `true` off.
    pub fn merge_into(&self, settings: &mut Settings) {
        merge_switch(&mut settings.autoplay, self.autoplay, self.no_autoplay);
        merge_switch(&mut settings.loop_enabled, self.loop_playback, self.no_loop);
        merge_switch(&mut settings.shuffle, self.shuffle, self.no_shuffle);
        merge_switch(&mut settings.mute, self.mute, self.no_mute);
        merge_switch(&mut settings.load_on_start, self.load_on_start, self.no_start);
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        if let Some(workers) = self.workers {
            settings.workers_override = workers;
        }
    }
}

fn merge_switch(value: &mut bool, on: bool, off: bool) {
    if on {
        *value = true;
    } else if off {
        *value = false;
    }
}

pub fn load_playlist_file(path: &Path) -> Result<Vec<String>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist: {}", path.display()))?;
    let parsed: PlaylistFile = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse playlist: {}", path.display()))?;
    Ok(match parsed {
        PlaylistFile::List(tracks) | PlaylistFile::Object { tracks } => tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["cliplay", "-a", "--loop", "-vv", "--seed", "7", "u1", "u2"]);
        assert!(args.autoplay && args.loop_playback && !args.shuffle);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.track_ids().unwrap(), vec!["u1", "u2"]);
        assert!(args.log_file.is_none());

        let args = Args::parse_from(["cliplay", "--log"]);
        assert_eq!(args.log_file, Some(None));
    }

    #[test]
    fn test_playlist_file_forms() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.json");
        std::fs::write(&list, r#"["a", "b"]"#).unwrap();
        let object = dir.path().join("object.json");
        std::fs::write(&object, r#"{ "tracks": ["c"] }"#).unwrap();

        assert_eq!(load_playlist_file(&list).unwrap(), vec!["a", "b"]);
        assert_eq!(load_playlist_file(&object).unwrap(), vec!["c"]);

        let args = Args {
            playlist: Some(list),
            clips: vec!["z".into()],
            ..Default::default()
        };
        assert_eq!(args.track_ids().unwrap(), vec!["a", "b", "z"]);
        assert!(load_playlist_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_merge_into_settings() {
        let mut settings = Settings {
            loop_enabled: true,
            ..Default::default()
        };
        let args = Args::parse_from(["cliplay", "--shuffle", "--volume", "0.5", "--workers", "2"]);
        args.merge_into(&mut settings);
        assert!(settings.loop_enabled && settings.shuffle);
        assert_eq!(settings.volume, 0.5);
        assert_eq!(settings.workers_override, 2);
    }

    #[test]
    fn test_negated_flags_clear_settings() {
        let mut settings = Settings {
            autoplay: true,
            loop_enabled: true,
            mute: true,
            load_on_start: true,
            ..Default::default()
        };
        let args = Args::parse_from(["cliplay", "--no-autoplay", "--no-loop", "--no-start"]);
        args.merge_into(&mut settings);
        assert!(!settings.autoplay && !settings.loop_enabled && !settings.load_on_start);
        // Untouched flags keep the stored value
        assert!(settings.mute);

        // Last of a pair wins
        let args = Args::parse_from(["cliplay", "--mute", "--no-mute", "--no-shuffle", "-s"]);
        assert!(!args.mute && args.no_mute);
        assert!(args.shuffle && !args.no_shuffle);
        args.merge_into(&mut settings);
        assert!(!settings.mute && settings.shuffle);
    }
}
