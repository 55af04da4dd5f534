//! Request context and correlation ids.
//!
//! # Responsibilities
//! - Carry per-request state (client address, correlation id, identity)
//!   through every pipeline stage
//! - Take the correlation id from `X-Request-ID` or generate a UUID v4
//! - Echo the correlation id on every response, errors included
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Identity can only be attached as a `VerifiedIdentity`, which only the
//!   claims verifier can produce

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    response::Response,
};
use futures_util::{future::BoxFuture, FutureExt};
use tracing::Instrument;
use uuid::Uuid;

use crate::pipeline::{Next, Stage};
use crate::security::auth::VerifiedIdentity;

/// Correlation id header, read from clients and sent to backends and clients.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Opaque correlation id for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh UUID v4 id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse the caller's id when it is present, non-empty and header-safe.
    pub fn from_header(value: Option<&HeaderValue>) -> Option<Self> {
        value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State threaded through every stage of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    client_addr: SocketAddr,
    received_at: Instant,
    request_id: Option<RequestId>,
    identity: Option<VerifiedIdentity>,
}

impl RequestContext {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            received_at: Instant::now(),
            request_id: None,
            identity: None,
        }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Correlation id, once the request-id stage has run.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn assign_request_id(&mut self, id: RequestId) {
        self.request_id = Some(id);
    }

    /// Verified caller identity on authenticated routes.
    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }

    pub fn attach_identity(&mut self, identity: VerifiedIdentity) {
        self.identity = Some(identity);
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }
}

/// Assigns the correlation id and opens the per-request span.
#[derive(Debug, Default)]
pub struct RequestIdStage;

impl Stage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        mut ctx: RequestContext,
        mut request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let id = RequestId::from_header(request.headers().get(&X_REQUEST_ID))
            .unwrap_or_else(RequestId::generate);

        let span = tracing::info_span!(
            "request",
            request_id = %id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        let header = id.header_value();
        if let Some(value) = &header {
            request.headers_mut().insert(X_REQUEST_ID, value.clone());
        }
        ctx.assign_request_id(id);

        async move {
            let mut response = next.run(ctx, request).await;
            if let Some(value) = header {
                response.headers_mut().insert(X_REQUEST_ID, value);
            }
            response
        }
        .instrument(span)
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Endpoint, Pipeline};
    use axum::{http::StatusCode, response::IntoResponse};
    use std::sync::{Arc, Mutex};

    /// Reports what the endpoint saw.
    #[derive(Default)]
    struct Capture {
        seen: Mutex<Option<(Option<String>, Option<String>)>>,
    }

    impl Endpoint for Capture {
        fn call<'a>(&'a self, ctx: RequestContext, request: Request<Body>) -> BoxFuture<'a, Response> {
            let header = request
                .headers()
                .get(&X_REQUEST_ID)
                .map(|v| v.to_str().unwrap().to_string());
            let from_ctx = ctx.request_id().map(|id| id.to_string());
            *self.seen.lock().unwrap() = Some((header, from_ctx));
            async { StatusCode::NO_CONTENT.into_response() }.boxed()
        }
    }

    async fn run(request: Request<Body>) -> (Response, Option<String>, Option<String>) {
        let pipeline = Pipeline::new().with(Arc::new(RequestIdStage));
        let endpoint = Capture::default();
        let response = pipeline
            .dispatch(RequestContext::for_test(), request, &endpoint)
            .await;
        let (header, ctx) = endpoint.seen.lock().unwrap().take().unwrap();
        (response, header, ctx)
    }

    #[tokio::test]
    async fn test_propagates_inbound_id() {
        let request = Request::builder()
            .header("X-Request-ID", "abc-123")
            .body(Body::empty())
            .unwrap();
        let (response, header, ctx) = run(request).await;

        assert_eq!(header.as_deref(), Some("abc-123"));
        assert_eq!(ctx.as_deref(), Some("abc-123"));
        assert_eq!(response.headers()[&X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_generates_missing_id() {
        let (response, header, ctx) = run(Request::new(Body::empty())).await;

        let generated = ctx.unwrap();
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_eq!(header.as_deref(), Some(generated.as_str()));
        assert_eq!(response.headers()[&X_REQUEST_ID], generated.as_str());
    }

    #[test]
    fn test_blank_header_is_ignored() {
        let blank = HeaderValue::from_static("   ");
        assert!(RequestId::from_header(Some(&blank)).is_none());
        assert!(RequestId::from_header(None).is_none());
    }
}
