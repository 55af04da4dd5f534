//! Edge gateway library.
//!
//! Single public entry point in front of the user and order services: admission
//! control, bearer-token verification and reverse proxying, composed as
//! per-route stage chains.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
