//! # Conduit
//!
//! Messaging, saga orchestration and request-context core for distributed
//! services, built around a NATS-backed broker with idempotent delivery,
//! a composable middleware chain, a saga-style orchestration engine with
//! automatic compensation, and an HTTP edge perimeter (rate limiting,
//! CORS/CSRF, sessions, PASETO auth).
//!
//! This crate is a thin re-export over [`conduit_core`]; see that crate's
//! documentation for the full API surface.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! conduit = "0.1"
//! ```
//!
//! ```rust,no_run
//! use conduit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let _checker = SimpleHealthCheck::new();
//! }
//! ```

pub use conduit_core::*;
