use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config/data directory
pub const CONFIG_DIR_ENV: &str = "CLIPLAY_CONFIG_DIR";

/// Settings file name
pub const SETTINGS_FILE: &str = "cliplay.json";

/// Default log file name (used by `--log` without a path)
pub const LOG_FILE: &str = "cliplay.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (CLIPLAY_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. CLIPLAY_CONFIG_DIR environment variable
/// 3. Local folder IF cliplay files exist there (cliplay.json, cliplay.log)
/// 4. Platform-specific config directory from dirs-next
///
/// Platform paths:
/// - Linux: ~/.config/cliplay/{name}
/// - macOS: ~/Library/Application Support/cliplay/{name}
/// - Windows: %APPDATA%\cliplay\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs)
///
/// Same priority as `config_file`, ending at the platform data directory
/// (~/.local/share/cliplay on Linux).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_files(&current_dir) {
            return current_dir;
        }
    }

    match platform {
        Some(dir) => dir.join("cliplay"),
        None => PathBuf::from("."),
    }
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve(config, dirs_next::data_dir())
}
