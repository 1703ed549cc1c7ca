//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the required variables are missing, falls back to a config file
//! 3. Probes multiple paths for config files
//! 4. With no file either, uses the built-in defaults
//!
//! Every result is checked with [`Config::validate`].
//!
//! ## Environment Variables
//! Required for the environment path:
//! - `OUTPOST_DB_PATH`: Database file path
//! - `OUTPOST_BASE_URL`: Remote service base URL
//!
//! Optional (defaults apply when unset):
//! - `OUTPOST_STORAGE_BACKEND`: `sqlite` or `memory`
//! - `OUTPOST_DB_POOL_SIZE`: Connection pool size
//! - `OUTPOST_REQUEST_TIMEOUT_MS`: Per-request timeout
//! - `OUTPOST_AUTH_TOKEN`: Bearer token sent with every request
//! - `OUTPOST_SYNC_ENABLED`: Run the scheduler (true/false)
//! - `OUTPOST_MAX_RETRIES`: Attempts before dead-lettering
//! - `OUTPOST_DEAD_LETTER_CAPACITY`: Dead-letter set size
//! - `OUTPOST_SYNC_INTERVAL_SECS`: Periodic drain interval
//! - `OUTPOST_RECONNECT_DEBOUNCE_MS`: Reconnect debounce window
//! - `OUTPOST_JOIN_TIMEOUT_MS`: Task join timeout on stop
//! - `OUTPOST_BACKOFF_BASE_MS`, `OUTPOST_BACKOFF_MAX_MS`,
//!   `OUTPOST_BACKOFF_JITTER`: Retry delay parameters
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./outpost.toml` or `./outpost.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use outpost_domain::{
    BackoffConfig, Config, OutpostError, Result, StorageBackend, StorageConfig, SyncConfig,
    TransportConfig,
};

const CONFIG_FILE_NAMES: [&str; 4] = ["outpost.toml", "outpost.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `OutpostError::Config` if:
/// - An environment variable or file has an invalid value
/// - File format is invalid
/// - The resulting configuration fails validation
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            match probe_config_paths() {
                Some(path) => load_from_file(Some(path))?,
                None => {
                    tracing::info!("No configuration found; using defaults");
                    Config::default()
                }
            }
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `OUTPOST_DB_PATH` and `OUTPOST_BASE_URL` must be present; every other
/// field falls back to its default.
///
/// # Errors
/// Returns `OutpostError::Config` if required variables are missing
/// or any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("OUTPOST_DB_PATH")?;
    let base_url = env_var("OUTPOST_BASE_URL")?;

    let storage_defaults = StorageConfig::default();
    let transport_defaults = TransportConfig::default();
    let sync_defaults = SyncConfig::default();
    let backoff_defaults = BackoffConfig::default();

    Ok(Config {
        storage: StorageConfig {
            backend: env_parse::<StorageBackend>("OUTPOST_STORAGE_BACKEND")?
                .unwrap_or(storage_defaults.backend),
            path: db_path,
            pool_size: env_parse("OUTPOST_DB_POOL_SIZE")?.unwrap_or(storage_defaults.pool_size),
        },
        transport: TransportConfig {
            base_url,
            timeout_ms: env_parse("OUTPOST_REQUEST_TIMEOUT_MS")?
                .unwrap_or(transport_defaults.timeout_ms),
            auth_token: std::env::var("OUTPOST_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
        },
        sync: SyncConfig {
            enabled: env_bool("OUTPOST_SYNC_ENABLED", sync_defaults.enabled),
            max_retries: env_parse("OUTPOST_MAX_RETRIES")?.unwrap_or(sync_defaults.max_retries),
            dead_letter_capacity: env_parse("OUTPOST_DEAD_LETTER_CAPACITY")?
                .unwrap_or(sync_defaults.dead_letter_capacity),
            periodic_interval_secs: env_parse("OUTPOST_SYNC_INTERVAL_SECS")?
                .unwrap_or(sync_defaults.periodic_interval_secs),
            reconnect_debounce_ms: env_parse("OUTPOST_RECONNECT_DEBOUNCE_MS")?
                .unwrap_or(sync_defaults.reconnect_debounce_ms),
            join_timeout_ms: env_parse("OUTPOST_JOIN_TIMEOUT_MS")?
                .unwrap_or(sync_defaults.join_timeout_ms),
        },
        backoff: BackoffConfig {
            base_delay_ms: env_parse("OUTPOST_BACKOFF_BASE_MS")?
                .unwrap_or(backoff_defaults.base_delay_ms),
            max_delay_ms: env_parse("OUTPOST_BACKOFF_MAX_MS")?
                .unwrap_or(backoff_defaults.max_delay_ms),
            jitter_factor: env_parse("OUTPOST_BACKOFF_JITTER")?
                .unwrap_or(backoff_defaults.jitter_factor),
        },
    })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Supports TOML and JSON
/// (detected by file extension); missing fields take their defaults.
///
/// # Errors
/// Returns `OutpostError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(OutpostError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            OutpostError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| OutpostError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| OutpostError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| OutpostError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(OutpostError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard paths for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| OutpostError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable; `Ok(None)` when unset.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OutpostError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
