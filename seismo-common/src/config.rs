//! Configuration file loading and compiled defaults
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 are handled by each binary's argument parser. This module
//! owns tiers 3 and 4. A missing or unreadable config file is never fatal:
//! it is logged and the compiled defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SEISMO_CONFIG";

/// Directory name used under the platform config/data directories
const APP_DIR: &str = "seismo";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// On-disk TOML configuration
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub feed_url: Option<String>,
    pub min_magnitude: Option<f64>,
    pub poll_interval_seconds: Option<u64>,
    pub huggingface_api_token: Option<String>,
    pub huggingface_model: Option<String>,
    pub inference_url: Option<String>,
    pub cache_ttl_hours: Option<u64>,
    /// Browser origins allowed to call the API; `"*"` allows any
    pub cors_origins: Option<Vec<String>>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Compiled-in defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub feed_url: String,
    pub min_magnitude: f64,
    pub poll_interval_seconds: u64,
    pub huggingface_model: String,
    pub inference_url: String,
    pub cache_ttl_hours: u64,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            database_path: default_data_dir().join("seismo.db"),
            bind_address: "127.0.0.1:8000".to_string(),
            feed_url: "https://earthquake.usgs.gov/fdsnws/event/1/query".to_string(),
            min_magnitude: 4.5,
            poll_interval_seconds: 180,
            huggingface_model: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
            inference_url: "https://router.huggingface.co/v1/chat/completions".to_string(),
            cache_ttl_hours: 24,
            cors_origins: vec!["http://localhost:3000".to_string()],
            log_level: default_log_level(),
        }
    }
}

/// OS-dependent data directory (`~/.local/share/seismo` on Linux)
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./seismo_data"))
}

/// Locate the config file to read
///
/// Priority: explicit path → `SEISMO_CONFIG` → user config dir
/// (`~/.config/seismo/<file_name>`) → `/etc/seismo/<file_name>` on Linux.
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join(file_name)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Where the loaded settings came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// No config file resolved
    Defaults,
    /// Settings read from this file
    File(PathBuf),
    /// A file resolved but could not be used
    Unusable { path: PathBuf, reason: String },
}

/// Result of [`load_or_default`]
///
/// Loading happens before the logger exists, so the outcome is kept here and
/// reported with [`LoadedConfig::log_source`] once tracing is installed.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Log how the config was obtained
    pub fn log_source(&self) {
        match &self.source {
            ConfigSource::Defaults => info!("No config file found, using defaults"),
            ConfigSource::File(path) => info!("Loaded config file: {}", path.display()),
            ConfigSource::Unusable { reason, .. } => warn!("{} - using defaults", reason),
        }
    }
}

/// Load the config file if one resolves, falling back to an empty config
///
/// Missing or malformed files degrade to defaults, never an error.
pub fn load_or_default(cli_arg: Option<&Path>, file_name: &str) -> LoadedConfig {
    let Some(path) = resolve_config_path(cli_arg, file_name) else {
        return LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults,
        };
    };

    match load_toml_config(&path) {
        Ok(config) => LoadedConfig {
            config,
            source: ConfigSource::File(path),
        },
        Err(e) => LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Unusable {
                path,
                reason: e.to_string(),
            },
        },
    }
}
