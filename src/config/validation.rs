//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Upstream URLs must parse and use plain http (backends sit on the internal network)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject an empty signing secret so authentication can never be disabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret must not be empty")]
    EmptySecret,

    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstreams.{name} `{url}` is not a valid URL: {reason}")]
    InvalidUpstreamUrl {
        name: &'static str,
        url: String,
        reason: String,
    },

    #[error("upstreams.{name} `{url}` must use http")]
    UnsupportedScheme { name: &'static str, url: String },

    #[error("timeouts.upstream_secs must be greater than zero")]
    ZeroTimeout,

    #[error("cors.{field} `{value}` is not a valid header value")]
    InvalidCorsValue { field: &'static str, value: String },

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::EmptySecret);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    for (name, url) in [
        ("user_service_url", &config.upstreams.user_service_url),
        ("order_service_url", &config.upstreams.order_service_url),
    ] {
        if let Err(err) = check_upstream_url(name, url) {
            errors.push(err);
        }
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    for origin in &config.cors.allowed_origins {
        if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::InvalidCorsValue {
                field: "allowed_origins",
                value: origin.clone(),
            });
        }
    }
    for (field, value) in [
        ("allowed_methods", &config.cors.allowed_methods),
        ("allowed_headers", &config.cors.allowed_headers),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidCorsValue {
                field,
                value: value.clone(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream_url(name: &'static str, raw: &str) -> Result<(), ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidUpstreamUrl {
        name,
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" if url.host_str().is_some() => Ok(()),
        "http" => Err(ValidationError::InvalidUpstreamUrl {
            name,
            url: raw.to_string(),
            reason: "missing host".to_string(),
        }),
        _ => Err(ValidationError::UnsupportedScheme {
            name,
            url: raw.to_string(),
        }),
    }
}
