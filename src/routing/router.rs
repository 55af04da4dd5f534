//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the route table
//! - Look up the route for a request (method + path)
//! - Run the matched route's pipeline, or the global pipeline for a miss
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order (the table is a handful of entries)
//! - Explicit NotFound / MethodNotAllowed rather than silent default
//! - Misses still pass through the global stages, so they carry a request
//!   ID and CORS headers and spend a rate-limit token

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::{IntoResponse, Response},
};
use futures_util::{future::BoxFuture, FutureExt};

use crate::http::request::RequestContext;
use crate::http::response::GatewayError;
use crate::pipeline::{Endpoint, Pipeline};
use crate::routing::matcher::{Matcher, MethodMatcher, PathPatternMatcher};

/// Route label used when no path matched.
pub const NOT_FOUND_ROUTE: &str = "not_found";
/// Route label used when the path matched but the method did not.
pub const METHOD_NOT_ALLOWED_ROUTE: &str = "method_not_allowed";

/// One entry of the route table.
pub struct Route {
    name: &'static str,
    path: PathPatternMatcher,
    methods: MethodMatcher,
    pipeline: Arc<Pipeline>,
    endpoint: Arc<dyn Endpoint>,
}

impl Route {
    pub fn new(
        name: &'static str,
        pattern: &str,
        methods: impl IntoIterator<Item = Method>,
        pipeline: Arc<Pipeline>,
        endpoint: Arc<dyn Endpoint>,
    ) -> Self {
        Self {
            name,
            path: PathPatternMatcher::new(pattern),
            methods: MethodMatcher::new(methods),
            pipeline,
            endpoint,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pattern(&self) -> &str {
        self.path.pattern()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("path", &self.path.pattern())
            .field("methods", &self.methods)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Outcome of a route lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Matched(&'a Route),
    MethodNotAllowed,
    NotFound,
}

/// Endpoint answering requests that matched no route.
struct Miss(fn() -> GatewayError);

impl Endpoint for Miss {
    fn call<'a>(&'a self, _ctx: RequestContext, _request: Request<Body>) -> BoxFuture<'a, Response> {
        let response = (self.0)().into_response();
        async move { response }.boxed()
    }
}

/// Immutable table of routes plus the pipeline used for misses.
pub struct RouteTable {
    routes: Vec<Route>,
    fallback: Arc<Pipeline>,
    not_found: Miss,
    method_not_allowed: Miss,
}

impl RouteTable {
    /// Create an empty table; `fallback` runs for requests that match nothing.
    pub fn new(fallback: Arc<Pipeline>) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
            not_found: Miss(|| GatewayError::NotFound),
            method_not_allowed: Miss(|| GatewayError::MethodNotAllowed),
        }
    }

    /// Append a route. Earlier routes win on overlap.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the route for a request.
    pub fn resolve(&self, request: &Request<Body>) -> RouteMatch<'_> {
        let mut path_matched = false;
        for route in &self.routes {
            if !route.path.matches(request) {
                continue;
            }
            if route.methods.matches(request) {
                return RouteMatch::Matched(route);
            }
            path_matched = true;
        }

        if path_matched {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }

    /// Run the request through its route. Returns the route label and the response.
    pub async fn dispatch(&self, ctx: RequestContext, request: Request<Body>) -> (&'static str, Response) {
        // Bound first so no borrow of the (non-Sync) body lives across an await.
        let matched = self.resolve(&request);
        match matched {
            RouteMatch::Matched(route) => {
                let response = route
                    .pipeline
                    .dispatch(ctx, request, route.endpoint.as_ref())
                    .await;
                (route.name, response)
            }
            RouteMatch::MethodNotAllowed => {
                let response = self
                    .fallback
                    .dispatch(ctx, request, &self.method_not_allowed)
                    .await;
                (METHOD_NOT_ALLOWED_ROUTE, response)
            }
            RouteMatch::NotFound => {
                let response = self.fallback.dispatch(ctx, request, &self.not_found).await;
                (NOT_FOUND_ROUTE, response)
            }
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    struct Fixed(StatusCode);

    impl Endpoint for Fixed {
        fn call<'a>(&'a self, _ctx: RequestContext, _request: Request<Body>) -> BoxFuture<'a, Response> {
            let status = self.0;
            async move { status.into_response() }.boxed()
        }
    }

    fn table() -> RouteTable {
        let pipeline = Arc::new(Pipeline::new());
        RouteTable::new(pipeline.clone())
            .route(Route::new(
                "orders",
                "/api/v1/orders",
                [Method::GET, Method::POST],
                pipeline.clone(),
                Arc::new(Fixed(StatusCode::OK)),
            ))
            .route(Route::new(
                "order",
                "/api/v1/orders/{id}",
                [Method::GET, Method::DELETE],
                pipeline,
                Arc::new(Fixed(StatusCode::NO_CONTENT)),
            ))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_resolve_outcomes() {
        let table = table();

        match table.resolve(&request(Method::DELETE, "/api/v1/orders/42")) {
            RouteMatch::Matched(route) => assert_eq!(route.name(), "order"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            table.resolve(&request(Method::PUT, "/api/v1/orders")),
            RouteMatch::MethodNotAllowed
        ));
        assert!(matches!(
            table.resolve(&request(Method::GET, "/api/v2/orders")),
            RouteMatch::NotFound
        ));
    }

    #[tokio::test]
    async fn test_dispatch_labels_and_statuses() {
        let table = table();

        let (route, response) = table
            .dispatch(RequestContext::for_test(), request(Method::GET, "/api/v1/orders?page=2"))
            .await;
        assert_eq!(route, "orders");
        assert_eq!(response.status(), StatusCode::OK);

        let (route, response) = table
            .dispatch(RequestContext::for_test(), request(Method::PATCH, "/api/v1/orders/1"))
            .await;
        assert_eq!(route, METHOD_NOT_ALLOWED_ROUTE);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let (route, response) = table
            .dispatch(RequestContext::for_test(), request(Method::GET, "/nope"))
            .await;
        assert_eq!(route, NOT_FOUND_ROUTE);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
