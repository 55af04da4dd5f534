//! Startup composition of stage chains and the route table.
//!
//! # Chains
//! - global:    request_id → cors → rate_limit
//! - public:    global
//! - protected: global → auth
//! - admin:     global → auth → require_role(admin)
//!
//! The rate limiter is left out of every chain when `rate_limit.enabled` is false.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::health::HealthEndpoint;
use crate::http::proxy::{ForwardEndpoint, ReverseProxy, Upstream};
use crate::http::request::RequestIdStage;
use crate::pipeline::{Endpoint, Pipeline};
use crate::routing::{Route, RouteTable};
use crate::security::auth::{AuthStage, ClaimsVerifier, RequireRoleStage};
use crate::security::cors::CorsStage;
use crate::security::rate_limit::{RateLimitStage, RateLimiter};

pub const ADMIN_ROLE: &str = "admin";

/// The three stage chains every route is bound to.
#[derive(Debug, Clone)]
pub struct Chains {
    pub public: Arc<Pipeline>,
    pub protected: Arc<Pipeline>,
    pub admin: Arc<Pipeline>,
}

impl Chains {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let mut global = Pipeline::new()
            .with(Arc::new(RequestIdStage))
            .with(Arc::new(CorsStage::from_config(&config.cors)?));

        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
            global = global.with(Arc::new(RateLimitStage::new(limiter, config.rate_limit.key)));
        } else {
            tracing::warn!("Rate limiting disabled");
        }

        let protected = global
            .clone()
            .with(Arc::new(AuthStage::new(ClaimsVerifier::new(&config.auth.jwt_secret))));
        let admin = protected
            .clone()
            .with(Arc::new(RequireRoleStage::new(ADMIN_ROLE)));

        Ok(Self {
            public: Arc::new(global),
            protected: Arc::new(protected),
            admin: Arc::new(admin),
        })
    }
}

/// Build the immutable route table for a validated configuration.
pub fn route_table(config: &GatewayConfig) -> Result<RouteTable, ConfigError> {
    let chains = Chains::from_config(config)?;

    let proxy = Arc::new(ReverseProxy::new(
        Duration::from_secs(config.timeouts.upstream_secs),
        config.forward.max_body_bytes,
    ));
    let users: Arc<dyn Endpoint> = Arc::new(ForwardEndpoint::new(
        proxy.clone(),
        Upstream::parse("user_service", &config.upstreams.user_service_url)?,
    ));
    let orders: Arc<dyn Endpoint> = Arc::new(ForwardEndpoint::new(
        proxy,
        Upstream::parse("order_service", &config.upstreams.order_service_url)?,
    ));

    let table = RouteTable::new(chains.public.clone())
        .route(Route::new(
            "health",
            "/health",
            [Method::GET],
            chains.public.clone(),
            Arc::new(HealthEndpoint),
        ))
        .route(Route::new(
            "users_register",
            "/api/v1/users/register",
            [Method::POST],
            chains.public.clone(),
            users.clone(),
        ))
        .route(Route::new(
            "users_login",
            "/api/v1/users/login",
            [Method::POST],
            chains.public.clone(),
            users.clone(),
        ))
        .route(Route::new(
            "users_profile",
            "/api/v1/users/profile",
            [Method::GET, Method::PUT],
            chains.protected.clone(),
            users.clone(),
        ))
        .route(Route::new(
            "users_list",
            "/api/v1/users",
            [Method::GET],
            chains.admin.clone(),
            users,
        ))
        .route(Route::new(
            "orders",
            "/api/v1/orders",
            [Method::GET, Method::POST],
            chains.protected.clone(),
            orders.clone(),
        ))
        .route(Route::new(
            "order",
            "/api/v1/orders/{id}",
            [Method::GET, Method::DELETE],
            chains.protected.clone(),
            orders.clone(),
        ))
        .route(Route::new(
            "order_status",
            "/api/v1/orders/{id}/status",
            [Method::PUT],
            chains.protected,
            orders,
        ));

    for route in table.routes() {
        tracing::debug!(
            route = route.name(),
            path = route.pattern(),
            stages = ?route.pipeline(),
            "Route compiled"
        );
    }

    Ok(table)
}
