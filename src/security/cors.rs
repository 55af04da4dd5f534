//! CORS response policy.
//!
//! Adds the `Access-Control-*` headers to every response and answers `OPTIONS`
//! preflights directly, so a preflight never consumes a rate-limit token,
//! never needs a credential and never reaches a backend.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, FutureExt};

use crate::config::{ConfigError, CorsConfig, ValidationError};
use crate::http::request::RequestContext;
use crate::pipeline::{Next, Stage};

#[derive(Debug, Clone)]
enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

/// Decides the CORS headers for each request.
#[derive(Debug, Clone)]
pub struct CorsStage {
    origins: AllowedOrigins,
    methods: HeaderValue,
    headers: HeaderValue,
    max_age: Option<HeaderValue>,
}

impl CorsStage {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ConfigError> {
        let invalid = |field: &'static str, value: &str| {
            ConfigError::Validation(vec![ValidationError::InvalidCorsValue {
                field,
                value: value.to_string(),
            }])
        };

        let origins = if config.allowed_origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(
                config
                    .allowed_origins
                    .iter()
                    .map(|o| HeaderValue::from_str(o).map_err(|_| invalid("allowed_origins", o)))
                    .collect::<Result<_, _>>()?,
            )
        };

        Ok(Self {
            origins,
            methods: HeaderValue::from_str(&config.allowed_methods)
                .map_err(|_| invalid("allowed_methods", &config.allowed_methods))?,
            headers: HeaderValue::from_str(&config.allowed_headers)
                .map_err(|_| invalid("allowed_headers", &config.allowed_headers))?,
            max_age: config.max_age_secs.map(HeaderValue::from),
        })
    }

    /// `Access-Control-Allow-Origin` for a request `Origin`, if any is allowed.
    fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        match &self.origins {
            AllowedOrigins::Any => Some(HeaderValue::from_static("*")),
            AllowedOrigins::List(list) => origin.filter(|o| list.contains(o)).cloned(),
        }
    }

    fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if let Some(value) = self.allow_origin(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if matches!(self.origins, AllowedOrigins::List(_)) {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
        if let Some(max_age) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
    }
}

impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let origin = request.headers().get(header::ORIGIN).cloned();

        if request.method() == Method::OPTIONS {
            let mut response = StatusCode::OK.into_response();
            self.apply(origin.as_ref(), response.headers_mut());
            return async move { response }.boxed();
        }

        async move {
            let mut response = next.run(ctx, request).await;
            self.apply(origin.as_ref(), response.headers_mut());
            response
        }
        .boxed()
    }
}
