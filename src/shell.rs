//! Line-oriented command shell driving the coordinator.
//!
//! Stdin lines and a periodic tick are multiplexed with
//! `crossbeam_channel::select!` on the coordinator's thread, so commands,
//! ticks and load completions are all applied in one place.

use std::io::{BufRead, Write};
use std::str::FromStr;
use std::time::Duration;

use crossbeam_channel::{Receiver, select, tick, unbounded};
use log::{debug, info, warn};

use crate::config::Settings;
use crate::core::clip::TrackId;
use crate::core::event_bus::{BoxedEvent, downcast_event};
use crate::core::player::PlaybackCoordinator;
use crate::core::player_events::*;
use crate::timecode::{ScrubLabel, format_clock, format_progress};

/// Parsed shell command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayPause,
    Next,
    Previous,
    /// Playlist entry by 1-based number or by identifier
    Select(String),
    Shuffle(Option<bool>),
    Loop(Option<bool>),
    Autoplay(Option<bool>),
    /// Absolute seek in seconds
    Seek(f64),
    /// Relative seek; `None` uses the configured step
    Forward(Option<f64>),
    Back(Option<f64>),
    Restart,
    Volume(f32),
    Mute,
    Status,
    List,
    Stats,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  p | play | pause        toggle play/pause
  n | next                next clip
  b | prev                previous clip
  sel <N|id>              jump to clip (1-based number or id)
  shuffle|loop|auto [on|off]
  seek <secs>             scrub to position
  f | fwd [secs]          skip forward
  r | back [secs]         skip back
  restart                 play current clip from 0
  vol <0..1>              set volume
  mute                    toggle mute
  s | status              show state
  ls | list               show playlist
  stats                   cache statistics
  q | quit";

fn parse_switch(arg: Option<&str>) -> Result<Option<bool>, String> {
    match arg {
        None => Ok(None),
        Some("on" | "1" | "true") => Ok(Some(true)),
        Some("off" | "0" | "false") => Ok(Some(false)),
        Some(other) => Err(format!("expected on/off, got '{}'", other)),
    }
}

fn parse_secs(arg: Option<&str>) -> Result<Option<f64>, String> {
    arg.map(|a| a.parse::<f64>().map_err(|_| format!("not a number: '{}'", a)))
        .transpose()
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("empty command".into());
        };
        let arg = parts.next();

        let cmd = match head.to_ascii_lowercase().as_str() {
            "p" | "play" | "pause" => Command::PlayPause,
            "n" | "next" => Command::Next,
            "b" | "prev" | "previous" => Command::Previous,
            "sel" | "select" => Command::Select(arg.ok_or("select needs a clip")?.to_string()),
            "shuffle" => Command::Shuffle(parse_switch(arg)?),
            "loop" => Command::Loop(parse_switch(arg)?),
            "auto" | "autoplay" => Command::Autoplay(parse_switch(arg)?),
            "seek" => Command::Seek(parse_secs(arg)?.ok_or("seek needs seconds")?),
            "f" | "fwd" => Command::Forward(parse_secs(arg)?),
            "r" | "back" => Command::Back(parse_secs(arg)?),
            "restart" => Command::Restart,
            "vol" | "volume" => {
                let v = parse_secs(arg)?.ok_or("vol needs a value")?;
                Command::Volume(v as f32)
            }
            "mute" => Command::Mute,
            "s" | "status" => Command::Status,
            "ls" | "list" => Command::List,
            "stats" => Command::Stats,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(cmd)
    }
}

/// What the loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Coordinator plus presentation state for the terminal.
pub struct Shell<W: Write> {
    coord: PlaybackCoordinator,
    skip_seconds: f64,
    scrub_label: ScrubLabel,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(coord: PlaybackCoordinator, settings: &Settings, out: W) -> Self {
        Self {
            coord,
            skip_seconds: settings.skip_seconds,
            scrub_label: ScrubLabel::default(),
            out,
        }
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coord
    }

    pub fn into_parts(self) -> (PlaybackCoordinator, W) {
        (self.coord, self.out)
    }

    /// Parse and run one input line; errors are printed, not returned.
    pub fn handle_line(&mut self, line: &str) -> std::io::Result<Flow> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        match line.parse::<Command>() {
            Ok(cmd) => self.execute(cmd),
            Err(msg) => {
                writeln!(self.out, "error: {}", msg)?;
                Ok(Flow::Continue)
            }
        }
    }

    pub fn execute(&mut self, cmd: Command) -> std::io::Result<Flow> {
        debug!("Shell command: {:?}", cmd);
        let result = match cmd {
            Command::PlayPause => self.coord.play_pause(),
            Command::Next => self.coord.next(),
            Command::Previous => self.coord.previous(),
            Command::Select(target) => {
                let id = self.resolve_target(&target);
                self.coord.select_track(&id)
            }
            Command::Shuffle(v) => {
                let on = v.unwrap_or(!self.coord.policy().shuffle);
                self.coord.select_shuffle(on);
                Ok(())
            }
            Command::Loop(v) => {
                let on = v.unwrap_or(!self.coord.policy().loop_enabled);
                self.coord.select_loop(on);
                Ok(())
            }
            Command::Autoplay(v) => {
                let on = v.unwrap_or(!self.coord.policy().autoplay);
                self.coord.select_autoplay(on);
                Ok(())
            }
            Command::Seek(secs) => {
                let result = self.coord.scrub_to(secs);
                if result.is_ok() {
                    self.scrub_label.drag(self.coord.playhead());
                }
                result
            }
            Command::Forward(secs) => self.coord.skip(secs.unwrap_or(self.skip_seconds)),
            Command::Back(secs) => self.coord.skip(-secs.unwrap_or(self.skip_seconds)),
            Command::Restart => self.coord.restart(),
            Command::Volume(v) => {
                self.coord.set_volume(v);
                Ok(())
            }
            Command::Mute => {
                self.coord.toggle_mute();
                Ok(())
            }
            Command::Status => return self.print_status().map(|_| Flow::Continue),
            Command::List => return self.print_list().map(|_| Flow::Continue),
            Command::Stats => return self.print_stats().map(|_| Flow::Continue),
            Command::Help => {
                writeln!(self.out, "{}", HELP)?;
                return Ok(Flow::Continue);
            }
            Command::Quit => return Ok(Flow::Quit),
        };

        if let Err(e) = result {
            writeln!(self.out, "error: {}", e)?;
        }
        self.flush_events()?;
        Ok(Flow::Continue)
    }

    /// Periodic update: coordinator tick plus event output.
    pub fn on_tick(&mut self) -> std::io::Result<()> {
        if let Err(e) = self.coord.tick() {
            warn!("Tick failed: {}", e);
        }
        self.scrub_label.tick();
        self.flush_events()
    }

    /// Numbers map to playlist positions; anything else is an identifier.
    fn resolve_target(&self, target: &str) -> TrackId {
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.coord.playlist().get(idx).cloned())
            .unwrap_or_else(|| TrackId::from(target))
    }

    fn flush_events(&mut self) -> std::io::Result<()> {
        for event in self.coord.events().poll() {
            self.render_event(&event)?;
        }
        self.out.flush()
    }

    fn render_event(&mut self, event: &BoxedEvent) -> std::io::Result<()> {
        if let Some(e) = downcast_event::<TrackChangedEvent>(event) {
            writeln!(self.out, "[{}/{}] {}", e.index + 1, self.coord.playlist().len(), e.id)?;
        } else if let Some(e) = downcast_event::<StateChangedEvent>(event) {
            writeln!(self.out, "{}", e.to)?;
        } else if let Some(e) = downcast_event::<LoadFailedEvent>(event) {
            writeln!(self.out, "error: {}", e.0)?;
        } else if let Some(e) = downcast_event::<PlaylistEndEvent>(event) {
            writeln!(self.out, "end of playlist after {}", e.0)?;
        } else if let Some(e) = downcast_event::<DurationEvent>(event) {
            writeln!(self.out, "duration {}", format_clock(e.0))?;
        } else if let Some(e) = downcast_event::<PolicyChangedEvent>(event) {
            let p = e.0;
            writeln!(
                self.out,
                "shuffle {} | loop {} | autoplay {} | vol {:.2}{}",
                on_off(p.shuffle),
                on_off(p.loop_enabled),
                on_off(p.autoplay),
                p.volume,
                if p.mute { " (muted)" } else { "" }
            )?;
        } else if downcast_event::<ScrubResetEvent>(event).is_some() {
            self.scrub_label.clear();
        }
        Ok(())
    }

    fn print_status(&mut self) -> std::io::Result<()> {
        let position = self
            .scrub_label
            .tick()
            .unwrap_or_else(|| self.coord.playhead());
        writeln!(
            self.out,
            "{} {} cursor {}{}",
            self.coord.state(),
            format_progress(position, self.coord.duration()),
            self.coord.cursor(),
            if self.coord.is_loading() { " (loading)" } else { "" }
        )?;
        if let Some(err) = self.coord.last_error() {
            writeln!(self.out, "last error: {}", err)?;
        }
        Ok(())
    }

    fn print_list(&mut self) -> std::io::Result<()> {
        let cursor = self.coord.playlist().cursor();
        let lines: Vec<String> = self
            .coord
            .playlist()
            .tracks()
            .enumerate()
            .map(|(i, id)| {
                let marker = if Some(i) == cursor { '>' } else { ' ' };
                let cached = if self.coord.cache().get(id).is_loaded() { " *" } else { "" };
                format!("{} {:>3}. {}{}", marker, i + 1, id, cached)
            })
            .collect();
        for line in lines {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    fn print_stats(&mut self) -> std::io::Result<()> {
        let snap = self.coord.cache().snapshot();
        writeln!(
            self.out,
            "cache: {} known, {} loaded, {} loading | hits {} misses {} | fetches {}",
            snap.known,
            snap.loaded,
            snap.loading,
            snap.hits,
            snap.misses,
            self.coord.pipeline().fetches_issued()
        )
    }
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

/// Forward lines from `reader` on a background thread.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("cliplay-stdin".into())
        .spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| warn!("Failed to spawn input thread: {}", e))
        .ok();
    rx
}

/// Run until `quit` or end of input.
pub fn run<W: Write>(shell: &mut Shell<W>, lines: Receiver<String>, tick_every: Duration) -> std::io::Result<()> {
    let ticker = tick(tick_every);
    info!("Shell started (tick {}ms)", tick_every.as_millis());
    shell.flush_events()?;

    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    if shell.handle_line(&line)? == Flow::Quit {
                        break;
                    }
                }
                Err(_) => {
                    debug!("Input closed");
                    break;
                }
            },
            recv(ticker) -> _ => shell.on_tick()?,
        }
    }

    info!("Shell stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clip_cache::ClipCache;
    use crate::core::loader::LoadPipeline;
    use crate::core::player::PlaybackState;
    use crate::core::playlist::PlaylistIndex;
    use crate::core::testing::{RecordingDecoder, ScriptedRandom, ScriptedSource};
    use crate::core::workers::WorkerPool;
    use std::sync::Arc;

    /// Runs every job on the calling thread
    struct InlinePool;

    impl WorkerPool for InlinePool {
        fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
            job();
        }
    }

    fn shell(tracks: &[&str]) -> Shell<Vec<u8>> {
        let pipeline = LoadPipeline::new(
            Arc::new(ClipCache::new()),
            Arc::new(ScriptedSource::new(42.0)),
            Arc::new(InlinePool),
        );
        let (decoder, _probe) = RecordingDecoder::new();
        let coord = PlaybackCoordinator::new(
            PlaylistIndex::new(tracks.iter().copied()).unwrap(),
            pipeline,
            Box::new(decoder),
            Box::new(ScriptedRandom::default()),
        );
        Shell::new(coord, &Settings::default(), Vec::new())
    }

    fn output(shell: Shell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_parts().1).unwrap()
    }

    #[test]
    fn test_scripted_session() {
        let mut sh = shell(&["u1", "u2", "u3"]);
        let (tx, rx) = unbounded();
        for line in ["p", "sel 3", "f", "seek 12", "loop on", "bogus", "stats", "q", "n"] {
            tx.send(line.to_string()).unwrap();
        }
        run(&mut sh, rx, Duration::from_secs(60)).unwrap();

        // Loads complete on the tick, not inline with the command
        assert!(sh.coordinator().is_loading());
        sh.on_tick().unwrap();
        assert_eq!(sh.coordinator().state(), &PlaybackState::Playing(TrackId::from("u3")));

        let out = output(sh);
        assert!(out.contains("[1/3] u1"));
        assert!(out.contains("[3/3] u3"));
        assert!(out.contains("loop on"));
        assert!(out.contains("unknown command 'bogus'"));
        assert!(out.contains("cache:"));
        assert!(out.contains("playing(u3)"));
        // Stopped at quit: 'n' never ran
        assert_eq!(out.matches("[1/3] u1").count(), 1);
    }

    #[test]
    fn test_select_by_number_and_id() {
        let mut sh = shell(&["a", "b"]);
        sh.handle_line("sel 2").unwrap();
        sh.on_tick().unwrap();
        assert_eq!(sh.coordinator().current_track(), Some(&TrackId::from("b")));
        sh.handle_line("sel a").unwrap();
        sh.on_tick().unwrap();
        assert_eq!(sh.coordinator().current_track(), Some(&TrackId::from("a")));
        sh.handle_line("sel zzz").unwrap();
        assert!(output(sh).contains("track not in playlist: zzz"));
    }

    #[test]
    fn test_rejected_seek_leaves_label_hidden() {
        let mut sh = shell(&["a"]);
        sh.handle_line("seek 12").unwrap();
        assert!(!sh.scrub_label.is_visible());

        sh.handle_line("p").unwrap();
        sh.on_tick().unwrap();
        sh.handle_line("seek 99").unwrap();
        assert_eq!(sh.scrub_label.tick(), Some(42.0));
        assert!(output(sh).contains("error: no clip is active"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("p".parse::<Command>(), Ok(Command::PlayPause));
        assert_eq!("NEXT".parse::<Command>(), Ok(Command::Next));
        assert_eq!("shuffle on".parse::<Command>(), Ok(Command::Shuffle(Some(true))));
        assert_eq!("loop".parse::<Command>(), Ok(Command::Loop(None)));
        assert_eq!("seek 12.5".parse::<Command>(), Ok(Command::Seek(12.5)));
        assert_eq!("f".parse::<Command>(), Ok(Command::Forward(None)));
        assert_eq!("back 3".parse::<Command>(), Ok(Command::Back(Some(3.0))));
        assert_eq!("sel 2".parse::<Command>(), Ok(Command::Select("2".into())));
        assert!("seek".parse::<Command>().is_err());
        assert!("loop maybe".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert!("   ".parse::<Command>().is_err());
    }
}
