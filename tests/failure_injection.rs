//! Failure injection: dead, slow and failing backends, bad credentials.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use edge_gateway::security::auth::{mint_token, Claims};

mod common;

use common::{
    bearer, client, start_gateway, start_recording_backend, start_slow_backend,
    start_stalling_backend, test_config, token, unreachable_url, TEST_SECRET,
};

#[tokio::test]
async fn test_unreachable_backend_is_service_unavailable() {
    let dead = unreachable_url().await;
    let gateway = start_gateway(test_config(&dead, &dead)).await;

    let res = client()
        .post(gateway.url("/api/v1/users/login"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let slow = start_slow_backend(Duration::from_secs(5)).await;
    let mut config = test_config(&slow.url(), &slow.url());
    config.timeouts.upstream_secs = 1;
    let gateway = start_gateway(config).await;

    let started = Instant::now();
    let res = client()
        .get(gateway.url("/api/v1/orders"))
        .header("Authorization", bearer(&token(Uuid::new_v4(), &[])))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(started.elapsed() < Duration::from_secs(4), "deadline not enforced");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(slow.hits(), 1);
}

#[tokio::test]
async fn test_stalled_response_body_is_cut_at_deadline() {
    let stalling = start_stalling_backend().await;
    let mut config = test_config(&stalling.url(), &stalling.url());
    config.timeouts.upstream_secs = 1;
    let gateway = start_gateway(config).await;

    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();

    let started = Instant::now();
    let res = client
        .post(gateway.url("/api/v1/users/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.bytes().await;
    assert!(body.is_err(), "stalled body should end in an error");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "body held for {:?}",
        started.elapsed()
    );
    assert_eq!(stalling.hits(), 1);
}

#[tokio::test]
async fn test_backend_errors_pass_through_without_retry() {
    let failing = start_recording_backend(500, r#"{"error":"boom"}"#).await;
    let gateway = start_gateway(test_config(&failing.url(), &failing.url())).await;

    let res = client()
        .post(gateway.url("/api/v1/users/login"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), r#"{"error":"boom"}"#);
    assert_eq!(failing.hits(), 1);
}

#[tokio::test]
async fn test_bad_tokens_are_rejected_alike() {
    let orders = start_recording_backend(200, "[]").await;
    let gateway = start_gateway(test_config(&orders.url(), &orders.url())).await;
    let user_id = Uuid::new_v4();

    let expired = mint_token(
        TEST_SECRET,
        &Claims::new(user_id, "alice@example.com", vec![], -60),
    )
    .unwrap();
    let wrong_secret = mint_token(
        "some-other-secret",
        &Claims::new(user_id, "alice@example.com", vec![], 3600),
    )
    .unwrap();

    let mut messages = Vec::new();
    for token in [expired, wrong_secret] {
        let res = client()
            .get(gateway.url("/api/v1/orders"))
            .header("Authorization", bearer(&token))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        messages.push(body["error"]["message"].clone());
    }

    assert_eq!(messages[0], messages[1]);
    assert_eq!(orders.hits(), 0);
}
