//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Received
//!     → RequestIdStage   (Enriched)
//!     → CorsStage        (CORS-decided, preflight answered here)
//!     → RateLimitStage   (RateChecked: admitted | 429)
//!     → AuthStage        (protected routes: Authenticated | 401)
//!     → RequireRoleStage (admin routes: 403 on missing role)
//!     → Endpoint         (Forwarded → Completed)
//! ```
//!
//! # Design Decisions
//! - Stage order is data: a `Pipeline` is an immutable list built once at startup
//! - A stage rejects by returning a response without calling `next`, so no
//!   later stage or endpoint can run after a rejection
//! - Per-request state travels in a typed `RequestContext`, not in extensions

pub mod compose;

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;

use crate::http::request::RequestContext;

/// One policy in the request pipeline.
pub trait Stage: Send + Sync {
    /// Short name used in logs and in the composed chain description.
    fn name(&self) -> &'static str;

    /// Handle the request, either answering it directly or handing it to `next`.
    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request<Body>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Terminal handler reached once every stage has admitted the request.
pub trait Endpoint: Send + Sync {
    fn call<'a>(&'a self, ctx: RequestContext, request: Request<Body>) -> BoxFuture<'a, Response>;
}

/// The remainder of a chain, handed to each stage.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Run the remaining stages, then the endpoint.
    pub fn run(self, ctx: RequestContext, request: Request<Body>) -> BoxFuture<'a, Response> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.process(
                ctx,
                request,
                Next {
                    stages: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(ctx, request),
        }
    }
}

/// An ordered, immutable chain of stages.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage, returning the extended chain.
    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `request` through every stage and finally `endpoint`.
    pub async fn dispatch(
        &self,
        ctx: RequestContext,
        request: Request<Body>,
        endpoint: &dyn Endpoint,
    ) -> Response {
        Next {
            stages: &self.stages,
            endpoint,
        }
        .run(ctx, request)
        .await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::GatewayError;
    use axum::{http::StatusCode, response::IntoResponse};
    use futures_util::FutureExt;
    use std::sync::Mutex;

    type Trail = Arc<Mutex<Vec<&'static str>>>;

    struct Recording {
        name: &'static str,
        trail: Trail,
    }

    impl Stage for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: RequestContext,
            request: Request<Body>,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            self.trail.lock().unwrap().push(self.name);
            next.run(ctx, request)
        }
    }

    struct Rejecting;

    impl Stage for Rejecting {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn process<'a>(
            &'a self,
            _ctx: RequestContext,
            _request: Request<Body>,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            async { GatewayError::Forbidden("nope".into()).into_response() }.boxed()
        }
    }

    struct Terminal {
        trail: Trail,
    }

    impl Endpoint for Terminal {
        fn call<'a>(&'a self, _ctx: RequestContext, _request: Request<Body>) -> BoxFuture<'a, Response> {
            self.trail.lock().unwrap().push("endpoint");
            async { StatusCode::OK.into_response() }.boxed()
        }
    }

    fn recording(name: &'static str, trail: &Trail) -> Arc<dyn Stage> {
        Arc::new(Recording {
            name,
            trail: trail.clone(),
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let trail = Trail::default();
        let pipeline = Pipeline::new()
            .with(recording("first", &trail))
            .with(recording("second", &trail));
        let endpoint = Terminal {
            trail: trail.clone(),
        };

        let response = pipeline
            .dispatch(RequestContext::for_test(), Request::new(Body::empty()), &endpoint)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*trail.lock().unwrap(), vec!["first", "second", "endpoint"]);
        assert_eq!(pipeline.stage_names(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let trail = Trail::default();
        let pipeline = Pipeline::new()
            .with(recording("first", &trail))
            .with(Arc::new(Rejecting))
            .with(recording("after", &trail));
        let endpoint = Terminal {
            trail: trail.clone(),
        };

        let response = pipeline
            .dispatch(RequestContext::for_test(), Request::new(Body::empty()), &endpoint)
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*trail.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_reaches_endpoint() {
        let trail = Trail::default();
        let endpoint = Terminal {
            trail: trail.clone(),
        };
        let response = Pipeline::new()
            .dispatch(RequestContext::for_test(), Request::new(Body::empty()), &endpoint)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*trail.lock().unwrap(), vec!["endpoint"]);
    }
}
