use cliplay::backend::{ClockDecoder, UrlSource};
use cliplay::cli::Args;
use cliplay::config::Settings;
use cliplay::core::decoder::{RandomSource, SeededRandom, ThreadRandom};
use cliplay::core::workers::Workers;
use cliplay::paths::{self, PathConfig};
use cliplay::shell::{self, Shell};
use cliplay::{ClipCache, LoadPipeline, PlaybackCoordinator, PlaylistIndex};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file(paths::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {:#}", e);
    }

    init_logging(&args, &path_config)?;
    info!("Cliplay starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = paths::config_file(paths::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());

    let mut settings = Settings::load_or_default(&settings_path);
    args.merge_into(&mut settings);
    let settings = settings.normalized();

    if args.save_settings {
        settings.save(&settings_path)?;
        println!("Settings saved to {}", settings_path.display());
    }

    let ids = args.track_ids()?;
    if ids.is_empty() && args.save_settings {
        return Ok(());
    }
    let playlist = PlaylistIndex::new(ids).context("Invalid playlist")?;
    if playlist.is_empty() {
        eprintln!("Playlist is empty: pass clip locations or --playlist FILE");
    }

    let workers = Arc::new(Workers::new(settings.worker_count()).context("Failed to start worker threads")?);
    info!("Loader threads: {}", workers.threads());

    let source = Arc::new(UrlSource::new(
        Duration::from_millis(settings.http_timeout_ms),
        settings.default_clip_seconds,
    ));
    let pipeline = LoadPipeline::new(Arc::new(ClipCache::new()), source, workers);

    let rng: Box<dyn RandomSource> = match args.seed {
        Some(seed) => Box::new(SeededRandom::new(seed)),
        None => Box::new(ThreadRandom),
    };

    let mut coord = PlaybackCoordinator::new(playlist, pipeline, Box::new(ClockDecoder::new()), rng)
        .with_policy(settings.policy());

    if settings.load_on_start {
        if let Err(e) = coord.start() {
            eprintln!("error: {}", e);
        }
    }

    let stdout = std::io::stdout();
    let mut shell = Shell::new(coord, &settings, stdout.lock());
    println!("{}", shell::HELP);

    let lines = shell::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    shell::run(&mut shell, lines, Duration::from_millis(settings.tick_ms))?;

    let (coord, _) = shell.into_parts();
    let stats = coord.cache().stats();
    info!(
        "Cache: {} hits, {} misses ({:.0}% hit rate)",
        stats.hits(),
        stats.misses(),
        stats.hit_rate() * 100.0
    );
    Ok(())
}
