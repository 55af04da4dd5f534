//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (CORS headers, answer preflight)
//!     → rate_limit.rs (token bucket admission)
//!     → auth.rs (bearer token, optional role requirement)
//!     → headers.rs (strip spoofed identity, add X-Forwarded-* and X-User-*)
//!     → Pass to backend
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input: identity headers only come from a verified token

pub mod auth;
pub mod cors;
pub mod headers;
pub mod rate_limit;
