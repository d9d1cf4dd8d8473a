//! Configuration resolution for seismo-ingest
//!
//! Command-line arguments and environment variables arrive together through
//! clap as [`ConfigOverrides`]; anything they leave unset falls back to the
//! TOML file and then to compiled defaults.

use axum::http::HeaderValue;
use seismo_common::config::{CompiledDefaults, TomlConfig};
use seismo_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Settings supplied on the command line or via environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub feed_url: Option<String>,
    pub min_magnitude: Option<f64>,
    pub poll_interval_seconds: Option<u64>,
    pub huggingface_api_token: Option<String>,
    pub huggingface_model: Option<String>,
    pub inference_url: Option<String>,
    pub cors_origins: Option<Vec<String>>,
}

/// Fully resolved service settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub feed_url: String,
    pub min_magnitude: f64,
    pub poll_interval: Duration,
    /// `None` runs inference in fallback-only mode
    pub huggingface_api_token: Option<String>,
    pub huggingface_model: String,
    pub inference_url: String,
    pub cache_ttl: chrono::Duration,
    /// Empty or `"*"` allows any origin
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve every setting by priority and validate the result
pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig, defaults: CompiledDefaults) -> Result<ServiceConfig> {
    let huggingface_api_token = match (overrides.huggingface_api_token, toml.huggingface_api_token) {
        (Some(token), _) if is_valid_key(&token) => {
            info!("Inference API token loaded from command line or environment");
            Some(token)
        }
        (_, Some(token)) if is_valid_key(&token) => {
            info!("Inference API token loaded from TOML config");
            Some(token)
        }
        _ => None,
    };

    let min_magnitude = overrides
        .min_magnitude
        .or(toml.min_magnitude)
        .unwrap_or(defaults.min_magnitude);
    if !(0.0..=10.0).contains(&min_magnitude) {
        return Err(Error::Config(format!(
            "min_magnitude must be between 0 and 10, got {}",
            min_magnitude
        )));
    }

    let poll_interval_seconds = overrides
        .poll_interval_seconds
        .or(toml.poll_interval_seconds)
        .unwrap_or(defaults.poll_interval_seconds);
    if poll_interval_seconds == 0 {
        return Err(Error::Config("poll_interval_seconds must be at least 1".to_string()));
    }

    let cache_ttl_hours = toml.cache_ttl_hours.unwrap_or(defaults.cache_ttl_hours);
    let cache_ttl_hours = i64::try_from(cache_ttl_hours)
        .map_err(|_| Error::Config(format!("cache_ttl_hours out of range: {}", cache_ttl_hours)))?;

    let cors_origins: Vec<String> = overrides
        .cors_origins
        .or(toml.cors_origins)
        .unwrap_or(defaults.cors_origins)
        .into_iter()
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect();
    if let Some(bad) = cors_origins
        .iter()
        .find(|origin| origin.as_str() != "*" && HeaderValue::from_str(origin).is_err())
    {
        return Err(Error::Config(format!("Invalid CORS origin: {:?}", bad)));
    }

    Ok(ServiceConfig {
        database_path: overrides
            .database_path
            .or(toml.database_path)
            .unwrap_or(defaults.database_path),
        bind_address: overrides
            .bind_address
            .or(toml.bind_address)
            .unwrap_or(defaults.bind_address),
        feed_url: overrides.feed_url.or(toml.feed_url).unwrap_or(defaults.feed_url),
        min_magnitude,
        poll_interval: Duration::from_secs(poll_interval_seconds),
        huggingface_api_token,
        huggingface_model: overrides
            .huggingface_model
            .or(toml.huggingface_model)
            .unwrap_or(defaults.huggingface_model),
        inference_url: overrides
            .inference_url
            .or(toml.inference_url)
            .unwrap_or(defaults.inference_url),
        cache_ttl: chrono::Duration::hours(cache_ttl_hours),
        cors_origins,
        log_level: toml.logging.level,
    })
}
