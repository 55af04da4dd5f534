//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::IntoResponse,
    Router,
};
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;
use uuid::Uuid;

use edge_gateway::config::GatewayConfig;
use edge_gateway::security::auth::{mint_token, Claims};
use edge_gateway::{GatewayServer, Shutdown};

pub const TEST_SECRET: &str = "integration-test-secret";

/// What a mock backend received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A backend that records every request and answers with a fixed response.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> RecordedRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("backend received no request")
    }
}

/// Start a recording backend on an ephemeral port.
pub async fn start_recording_backend(status: u16, body: &'static str) -> MockBackend {
    start_backend(status, body, Duration::ZERO).await
}

/// Start a backend that waits `delay` before answering 200.
pub async fn start_slow_backend(delay: Duration) -> MockBackend {
    start_backend(200, r#"{"slow":true}"#, delay).await
}

async fn start_backend(status: u16, body: &'static str, delay: Duration) -> MockBackend {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let status = StatusCode::from_u16(status).unwrap();

    let app = Router::new().fallback(move |request: Request<Body>| {
        let recorded = recorded.clone();
        async move {
            let (parts, incoming) = request.into_parts();
            let bytes = to_bytes(incoming, usize::MAX).await.unwrap_or_default();
            recorded.lock().unwrap().push(RecordedRequest {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: bytes,
            });
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            (
                status,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::HeaderName::from_static("x-backend"), "mock"),
                ],
                body,
            )
                .into_response()
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, requests }
}

/// Start a backend that sends headers and a first chunk, then never finishes the body.
pub async fn start_stalling_backend() -> MockBackend {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    let app = Router::new().fallback(move |request: Request<Body>| {
        let recorded = recorded.clone();
        async move {
            let (parts, _) = request.into_parts();
            recorded.lock().unwrap().push(RecordedRequest {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: Bytes::new(),
            });
            let chunks = stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b"{\"partial\":")) })
                .chain(stream::pending());
            (StatusCode::OK, Body::from_stream(chunks)).into_response()
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, requests }
}

/// An address nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Gateway config pointing at the given backends, metrics off.
pub fn test_config(user_service_url: &str, order_service_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.jwt_secret = TEST_SECRET.into();
    config.upstreams.user_service_url = user_service_url.into();
    config.upstreams.order_service_url = order_service_url.into();
    config.observability.metrics_enabled = false;
    config
}

/// A running gateway; shuts down when dropped.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl GatewayHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> GatewayHandle {
    let server = GatewayServer::new(config).expect("valid config");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    GatewayHandle { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A valid bearer token for `user_id` with the given roles.
pub fn token(user_id: Uuid, roles: &[&str]) -> String {
    let claims = Claims::new(
        user_id,
        "alice@example.com",
        roles.iter().map(|r| r.to_string()).collect(),
        3600,
    );
    mint_token(TEST_SECRET, &claims).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
