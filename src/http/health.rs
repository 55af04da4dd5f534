//! Liveness endpoint.
//!
//! Reports that the gateway process is serving. Backends are not probed.

use axum::{body::Body, http::Request, response::{IntoResponse, Response}, Json};
use futures_util::{future::BoxFuture, FutureExt};
use serde::Serialize;

use crate::http::request::RequestContext;
use crate::pipeline::Endpoint;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
}

/// Answers `GET /health` with `{"status":"ok","service":"gateway"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthEndpoint;

impl Endpoint for HealthEndpoint {
    fn call<'a>(&'a self, _ctx: RequestContext, _request: Request<Body>) -> BoxFuture<'a, Response> {
        let body = HealthBody {
            status: "ok",
            service: "gateway",
        };
        async move { Json(body).into_response() }.boxed()
    }
}
