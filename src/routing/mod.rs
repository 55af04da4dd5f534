//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate path pattern and method)
//!     → Return: matched Route, MethodNotAllowed or NotFound
//!
//! Route Compilation (at startup, pipeline/compose.rs):
//!     GatewayConfig
//!     → Build stage chains (public, protected, admin)
//!     → Bind each path to a chain and an endpoint
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use router::{Route, RouteMatch, RouteTable};
