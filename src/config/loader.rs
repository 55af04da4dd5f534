//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value `{value}` for environment variable {key}")]
    Env { key: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file on top of the defaults. Not validated.
pub fn parse_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// A validated configuration and where it came from.
///
/// Loading runs before the subscriber exists, so the sources are reported
/// back to the caller instead of being logged here.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: GatewayConfig,
    pub config_file: Option<PathBuf>,
    /// `.env` file that was applied, if one was found.
    pub dotenv_file: Option<PathBuf>,
}

/// Build the effective configuration.
///
/// Defaults, then the optional TOML file, then `.env`, then environment
/// variables. The result is validated once at the end.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config_file(path)?,
        None => GatewayConfig::default(),
    };

    let dotenv_file = dotenvy::dotenv().ok();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(LoadedConfig {
        config,
        config_file: path.map(Path::to_path_buf),
        dotenv_file,
    })
}

/// Overlay environment-style settings onto `config`.
///
/// Empty values count as unset. Numeric values that fail to parse are an
/// error rather than a silent fallback.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT") {
        let port: u16 = parse_env("PORT", &port)?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(secret) = get("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(url) = get("USER_SERVICE_URL") {
        config.upstreams.user_service_url = url;
    }
    if let Some(url) = get("ORDER_SERVICE_URL") {
        config.upstreams.order_service_url = url;
    }
    if let Some(rps) = get("RATE_LIMIT_RPS") {
        config.rate_limit.requests_per_second = parse_env("RATE_LIMIT_RPS", &rps)?;
    }
    if let Some(burst) = get("RATE_LIMIT_BURST") {
        config.rate_limit.burst_size = parse_env("RATE_LIMIT_BURST", &burst)?;
    }
    if let Some(secs) = get("UPSTREAM_TIMEOUT_SECS") {
        config.timeouts.upstream_secs = parse_env("UPSTREAM_TIMEOUT_SECS", &secs)?;
    }
    if let Some(enabled) = get("METRICS_ENABLED") {
        config.observability.metrics_enabled = parse_env("METRICS_ENABLED", &enabled)?;
    }
    if let Some(format) = get("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => {
                return Err(ConfigError::Env {
                    key: "LOG_FORMAT",
                    value: format,
                })
            }
        };
    }

    Ok(())
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key,
        value: value.to_string(),
    })
}
