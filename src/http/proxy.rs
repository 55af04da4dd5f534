//! Reverse proxy forwarder.
//!
//! # Responsibilities
//! - Resolve the target URL: backend scheme/authority + inbound path and query
//! - Buffer the inbound body, copy headers, add forwarding headers
//! - Call the backend under a deadline; map transport failures to 502
//! - Stream the backend response back untouched, under the same deadline
//!
//! # Design Decisions
//! - Path and query are copied byte-for-byte; only scheme and authority change
//! - The request body is fully buffered before the call (no streaming upload)
//! - The response body is streamed, never buffered
//! - One deadline per request covers response headers and every body frame;
//!   a stalled body is cut off with an error, which aborts the client response

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    http::{header, uri::PathAndQuery, Request, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, stream, FutureExt, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::{ConfigError, ValidationError};
use crate::http::request::RequestContext;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::pipeline::Endpoint;
use crate::security::headers::{upstream_headers, ForwardedFor};

/// Pooled HTTP/1.1 client used for every backend call.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// A backend the gateway forwards to.
#[derive(Debug, Clone)]
pub struct Upstream {
    name: &'static str,
    scheme: String,
    authority: String,
}

impl Upstream {
    /// Parse a configured base URL. Any path on the base URL is ignored.
    pub fn parse(name: &'static str, base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| {
            ConfigError::Validation(vec![ValidationError::InvalidUpstreamUrl {
                name,
                url: base_url.to_string(),
                reason,
            }])
        };

        let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(ConfigError::Validation(vec![ValidationError::UnsupportedScheme {
                name,
                url: base_url.to_string(),
            }]));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host".into()))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            name,
            scheme: url.scheme().to_string(),
            authority,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Target URI for an inbound request URI.
    pub fn resolve(&self, inbound: &Uri) -> Result<Uri, GatewayError> {
        let path_and_query = inbound
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(self.authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|_| GatewayError::Proxy("failed to parse target URL"))
    }
}

/// Forwards requests to backends with a bounded deadline.
#[derive(Clone)]
pub struct ReverseProxy {
    client: UpstreamClient,
    timeout: Duration,
    max_body_bytes: usize,
}

impl ReverseProxy {
    pub fn new(timeout: Duration, max_body_bytes: Option<usize>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Self {
            client,
            timeout,
            max_body_bytes: max_body_bytes.unwrap_or(usize::MAX),
        }
    }

    /// Forward `request` to `upstream` and return its response.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        request: Request<Body>,
        upstream: &Upstream,
    ) -> Result<Response, GatewayError> {
        let start = Instant::now();
        let target = upstream.resolve(request.uri())?;

        let (parts, body) = request.into_parts();
        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| GatewayError::InvalidRequest("failed to read request body"))?;

        let forwarded = ForwardedFor {
            client_ip: ctx.client_addr().ip(),
            host: parts
                .headers
                .get(header::HOST)
                .cloned()
                .or_else(|| parts.uri.authority().and_then(|a| a.as_str().parse().ok())),
            proto: match parts.uri.scheme_str() {
                Some("https") => "https",
                _ => "http",
            },
        };

        let mut outbound = Request::builder()
            .method(parts.method.clone())
            .uri(target.clone())
            .body(Body::from(body))
            .map_err(|_| GatewayError::Proxy("failed to create proxy request"))?;
        *outbound.headers_mut() = upstream_headers(&parts.headers, &forwarded, ctx);

        let request_id = ctx.request_id().map(|id| id.as_str()).unwrap_or("unknown");
        tracing::debug!(
            request_id = %request_id,
            method = %parts.method,
            upstream = upstream.name(),
            target = %target,
            "Proxying request"
        );

        let deadline = tokio::time::Instant::now() + self.timeout;
        let response = match tokio::time::timeout_at(deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, upstream = upstream.name(), error = %e, "Upstream error");
                metrics::record_upstream_error(upstream.name(), "transport");
                return Err(GatewayError::UpstreamUnavailable);
            }
            Err(_) => {
                tracing::error!(
                    request_id = %request_id,
                    upstream = upstream.name(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Upstream timed out"
                );
                metrics::record_upstream_error(upstream.name(), "timeout");
                return Err(GatewayError::UpstreamUnavailable);
            }
        };

        metrics::record_upstream_latency(upstream.name(), start);
        Ok(streamed(response, deadline, upstream.name()))
    }
}

/// Pass the backend body through, failing the stream once `deadline` passes.
fn streamed(
    response: hyper::Response<Incoming>,
    deadline: tokio::time::Instant,
    upstream: &'static str,
) -> Response {
    let (parts, body) = response.into_parts();
    let frames = Body::new(body).into_data_stream();

    let bounded = stream::unfold(Some(frames), move |state| async move {
        let mut frames = state?;
        match tokio::time::timeout_at(deadline, frames.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(frames))),
            Ok(Some(Err(e))) => Some((Err(io::Error::other(e)), None)),
            Ok(None) => None,
            Err(_) => {
                tracing::error!(upstream, "Upstream body timed out");
                metrics::record_upstream_error(upstream, "body_timeout");
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "upstream body deadline exceeded")),
                    None,
                ))
            }
        }
    });

    Response::from_parts(parts, Body::from_stream(bounded))
}

/// Endpoint binding a route to one backend.
pub struct ForwardEndpoint {
    proxy: Arc<ReverseProxy>,
    upstream: Upstream,
}

impl ForwardEndpoint {
    pub fn new(proxy: Arc<ReverseProxy>, upstream: Upstream) -> Self {
        Self { proxy, upstream }
    }
}

impl Endpoint for ForwardEndpoint {
    fn call<'a>(&'a self, ctx: RequestContext, request: Request<Body>) -> BoxFuture<'a, Response> {
        async move {
            match self.proxy.forward(&ctx, request, &self.upstream).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_preserves_path_and_query() {
        let upstream = Upstream::parse("order", "http://order:3002").unwrap();
        let inbound: Uri = "/api/v1/orders/abc?x=1".parse().unwrap();
        assert_eq!(
            upstream.resolve(&inbound).unwrap().to_string(),
            "http://order:3002/api/v1/orders/abc?x=1"
        );
    }

    #[test]
    fn test_resolve_keeps_encoded_bytes() {
        let upstream = Upstream::parse("user", "http://users.internal").unwrap();
        let inbound: Uri = "/api/v1/users/a%20b?q=%2F&q=2".parse().unwrap();
        assert_eq!(
            upstream.resolve(&inbound).unwrap().to_string(),
            "http://users.internal/api/v1/users/a%20b?q=%2F&q=2"
        );
    }

    #[test]
    fn test_base_path_is_replaced() {
        let upstream = Upstream::parse("user", "http://127.0.0.1:3001/ignored").unwrap();
        let inbound: Uri = "http://gateway:8080/health".parse().unwrap();
        assert_eq!(
            upstream.resolve(&inbound).unwrap().to_string(),
            "http://127.0.0.1:3001/health"
        );
    }

    #[test]
    fn test_parse_rejects_bad_base() {
        assert!(Upstream::parse("user", "not a url").is_err());
        assert!(Upstream::parse("user", "unix:/tmp/sock").is_err());
        assert!(Upstream::parse("user", "https://users.internal").is_err());
    }
}
