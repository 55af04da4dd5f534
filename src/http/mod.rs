//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info)
//!     → request.rs (request ID, per-request context)
//!     → [route table picks a stage chain]
//!     → proxy.rs (forward to backend) | health.rs
//!     → response.rs (error envelope)
//!     → Send to client
//! ```

pub mod health;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, RequestId, RequestIdStage, X_REQUEST_ID};
pub use response::GatewayError;
pub use server::GatewayServer;
