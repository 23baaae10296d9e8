//! # Conduit Core
//!
//! Messaging, saga orchestration and request-context core for distributed
//! services: a NATS-backed broker with idempotent delivery and a composable
//! middleware chain, a saga-style orchestration engine with automatic
//! compensation, a request-context model for scoped structured logging, and
//! an HTTP edge perimeter (rate limiting, CORS/CSRF, sessions, PASETO auth).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     println!("conduit");
//! }
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Stable, translatable error values (component tag, response-type, causes).
pub mod blame;

/// Cache abstraction.
pub mod cache;

/// NATS-backed broker client: idempotency tracking, middleware chain, publish/
/// request-reply/subscribe.
#[cfg(feature = "broker")]
pub mod broker;

/// Request-context model (app context, scoped structured logging, sanitization).
#[cfg(feature = "context")]
pub mod context;

/// HTTP edge perimeter: rate limiting, CORS/HSTS, CSRF, sessions, PASETO.
#[cfg(feature = "edge")]
pub mod edge;

/// Health check infrastructure.
#[cfg(feature = "health")]
pub mod health;

/// Saga-style orchestration engine with automatic compensation.
#[cfg(feature = "orchestration")]
pub mod orchestration;

/// Resilience patterns (retry, circuit breaker, rate limiting).
#[cfg(feature = "resilience")]
pub mod resilience;

/// Sum-type result value returned by every layer of the core.
pub mod result;

/// Security utilities (obfuscation, safe logging, CSRF tokens).
#[cfg(feature = "security")]
pub mod security;

/// Graceful shutdown utilities.
pub mod shutdown;

// ============================================================================
// Re-exported dependencies
// ============================================================================
// These re-exports allow consumers to use common dependencies without adding
// them explicitly to their Cargo.toml. This ensures version consistency and
// reduces boilerplate in downstream crates.

/// Re-export async_trait for async trait definitions
pub use async_trait;
/// Re-export backoff for retry/resilience patterns
#[cfg(feature = "resilience")]
pub use backoff;
/// Re-export chrono for date/time handling
#[cfg(feature = "utils")]
pub use chrono;
/// Re-export dashmap for concurrent hash maps
#[cfg(feature = "cache-memory")]
pub use dashmap;
/// Re-export governor for rate limiting
#[cfg(feature = "rate-limit")]
pub use governor;
/// Re-export hyper for HTTP primitives
#[cfg(feature = "health")]
pub use hyper;
/// Re-export moka for high-performance caching
#[cfg(feature = "cache-memory")]
pub use moka;
/// Re-export opentelemetry for full observability
#[cfg(feature = "otel-otlp")]
pub use opentelemetry;
/// Re-export opentelemetry_otlp for OTLP exporter
#[cfg(feature = "otel-otlp")]
pub use opentelemetry_otlp;
/// Re-export opentelemetry_sdk for SDK configuration
#[cfg(feature = "otel-otlp")]
pub use opentelemetry_sdk;
/// Re-export parking_lot for efficient synchronization primitives
#[cfg(feature = "utils")]
pub use parking_lot;
/// Re-export rand for random number generation
#[cfg(feature = "utils")]
pub use rand;
/// Re-export redis for Redis client
#[cfg(feature = "cache-redis")]
pub use redis;
/// Re-export serde for serialization
pub use serde;
/// Re-export serde_json for JSON handling
pub use serde_json;
/// Re-export tokio for async runtime
pub use tokio;
/// Re-export tracing for observability
pub use tracing;
/// Re-export tracing_opentelemetry for tracing integration
#[cfg(feature = "otel-otlp")]
pub use tracing_opentelemetry;
/// Re-export tracing_subscriber for log configuration
#[cfg(feature = "otel-otlp")]
pub use tracing_subscriber;
/// Re-export url for URL parsing
#[cfg(feature = "utils")]
pub use url;

/// Prelude module for convenient imports
///
/// Commonly used imports for conduit applications.
pub mod prelude {
    /// Re-export blame/error-taxonomy utilities
    pub use crate::blame::{Blame, BlameCode, Component, ErrorResponse, ResponseType};
    /// Re-export cache utilities
    pub use crate::cache::{Cache, CacheConfig, CacheKey, MemoryCache};
    /// Re-export result envelope
    pub use crate::result::ResultEnvelope;

    /// Re-export broker utilities
    #[cfg(feature = "broker")]
    pub use crate::broker::{BrokerManager, Message, Middleware, MiddlewareChain};
    /// Re-export request-context utilities
    #[cfg(feature = "context")]
    pub use crate::context::{AppContext, RequestContext};
    /// Re-export edge perimeter utilities
    #[cfg(feature = "edge")]
    pub use crate::edge::EdgePerimeter;
    /// Re-export health check utilities
    #[cfg(feature = "health")]
    pub use crate::health::{
        Dependency, DependencyStatus, HealthCheck, HealthReport, HealthServer, OverallStatus,
        SimpleHealthCheck,
    };
    /// Re-export orchestration engine utilities
    #[cfg(feature = "orchestration")]
    pub use crate::orchestration::{
        OrchestrationEngine, ServiceDefinition, ServiceResult, ServiceState, TokenIssuer,
    };
    /// Re-export shutdown utilities
    pub use crate::shutdown::{
        GracefulShutdown, GracefulShutdownExt, ShutdownAwareTaskSpawner, ShutdownSignal,
        ShutdownToken,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_conduit_core_exists() {
        assert!(true);
    }
}
