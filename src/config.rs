//! Configuration file parser for `~/.config/tubefeed/config.toml`.
//!
//! Every key is optional. When no config file exists anywhere on the search
//! path, a default one is written to the user directory so the database
//! location and download options are easy to find and edit.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SYSTEM_CONFIG_DIR: &str = "/etc/tubefeed";
const DATABASE_FILE_NAME: &str = "tubefeed.db";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Built once at startup and handed to the database, the feed source and the
/// downloader. Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Relative paths resolve against the config directory.
    pub database_path: Option<PathBuf>,

    /// Number of channel feeds fetched at the same time during `update`.
    pub poll_concurrency: usize,

    /// Per-request timeout for feed and page fetches, in seconds.
    pub fetch_timeout_secs: u64,

    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            poll_concurrency: 2,
            fetch_timeout_secs: 30,
            download: DownloadConfig::default(),
        }
    }
}

/// Options for the external downloader program.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Executable invoked for each download (looked up on `PATH`).
    pub program: String,

    /// Passed as `-o <template>`.
    pub output_template: String,

    /// Extra arguments placed before the URL.
    pub extra_args: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            output_template: "%(title)s-%(id)s.%(ext)s".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Outcome of [`Config::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    /// Directory relative paths in the config resolve against.
    pub base_dir: PathBuf,
    /// Default file written because none was found.
    pub created: Option<PathBuf>,
    /// The per-user directory, when the search consulted it.
    pub user_dir: Option<PathBuf>,
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database_path",
                "poll_concurrency",
                "fetch_timeout_secs",
                "download",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Find the config file to use, writing a default one if none exists.
    ///
    /// `explicit` (from `--config`) bypasses the search and is never created,
    /// and `user_dir` is not consulted. Otherwise the user directory and then
    /// `system_dir` are checked; when both hold a file the system-wide one wins.
    pub fn resolve(
        explicit: Option<&Path>,
        user_dir: impl FnOnce() -> Result<PathBuf, ConfigError>,
        system_dir: &Path,
    ) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            let base_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            return Ok(LoadedConfig {
                config,
                base_dir,
                created: None,
                user_dir: None,
            });
        }

        let user_dir = user_dir()?;
        let found = [user_dir.as_path(), system_dir]
            .into_iter()
            .filter(|dir| dir.join(CONFIG_FILE_NAME).is_file())
            .last()
            .map(Path::to_path_buf);

        let (base_dir, created) = match found {
            Some(dir) => (dir, None),
            None => {
                let path = Self::bootstrap(&user_dir)?;
                (user_dir.clone(), Some(path))
            }
        };

        let config = Self::load(&base_dir.join(CONFIG_FILE_NAME))?;
        Ok(LoadedConfig {
            config,
            base_dir,
            created,
            user_dir: Some(user_dir),
        })
    }

    /// Write a default config file into `dir`, creating the directory.
    pub fn bootstrap(dir: &Path) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(dir)?;

        let defaults = Config {
            database_path: Some(dir.join(DATABASE_FILE_NAME)),
            ..Config::default()
        };
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, toml::to_string_pretty(&defaults)?)?;
        tracing::info!(path = %path.display(), "Wrote default configuration");
        Ok(path)
    }

    /// Database location, resolving relative paths against `base_dir`.
    pub fn database_path(&self, base_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base_dir.join(path),
            None => base_dir.join(DATABASE_FILE_NAME),
        }
    }

    /// Worker pool size for feed polling, never below one.
    pub fn poll_concurrency(&self) -> usize {
        self.poll_concurrency.max(1)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

/// `$HOME/.config/tubefeed`
pub fn user_config_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".config").join("tubefeed"))
}

// ============================================================================
// Tests
// ============================================================================
