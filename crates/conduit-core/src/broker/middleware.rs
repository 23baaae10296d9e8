//! Composable wrappers around inbound/outbound message processors.
//!
//! `Apply(processor, mw1, mw2, …)` returns a new processor where `mw1` wraps
//! outermost — it executes first and can short-circuit the rest of the chain.

use crate::blame::{Blame, BlameCode, Component};
use crate::broker::message::{Message, HEADER_AUTHORIZATION};
use crate::result::ResultEnvelope;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// A boxed, `'static` future, matching the shape every processor returns.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A message in transit through the chain, keyed by opaque JSON payload.
pub type WireMessage = Message<serde_json::Value>;

/// The terminal or intermediate handler a middleware wraps.
pub type Processor = Arc<dyn Fn(WireMessage) -> BoxFuture<ResultEnvelope<WireMessage>> + Send + Sync>;

/// Transforms a processor into a processor.
pub trait Middleware: Send + Sync {
    /// Wrap `next`, returning a new processor that runs this middleware's
    /// logic around it.
    fn wrap(&self, next: Processor) -> Processor;
}

/// Validates a bearer token, used by [`ValidateAuthHeaders`]. Implemented by
/// the edge perimeter's PASETO verifier; kept as a trait here so the broker
/// does not depend on the edge module.
pub trait AuthValidator: Send + Sync {
    /// Validate `token`, returning a blame describing the failure if invalid.
    fn validate(&self, token: &str) -> Result<(), Blame>;
}

/// Composes a base processor with an ordered list of middlewares.
pub struct MiddlewareChain;

impl MiddlewareChain {
    /// `mws[0]` wraps outermost (runs first); folds from the innermost
    /// middleware outward so that property holds.
    pub fn apply(base: Processor, mws: &[Arc<dyn Middleware>]) -> Processor {
        mws.iter().rev().fold(base, |acc, mw| mw.wrap(acc))
    }
}

/// Sets (or overwrites) a fixed header on every outbound/inbound message.
pub struct AddHeader {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

impl AddHeader {
    /// Build a middleware that stamps `key: value` onto every message.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Middleware for AddHeader {
    fn wrap(&self, next: Processor) -> Processor {
        let key = self.key.clone();
        let value = self.value.clone();
        Arc::new(move |mut msg: WireMessage| {
            msg.headers.set(key.clone(), value.clone());
            let next = Arc::clone(&next);
            Box::pin(async move { next(msg).await })
        })
    }
}

/// Structured-logs entry and exit of the wrapped processor.
pub struct Log {
    /// Label attached to every log line (e.g. `"publish"`).
    pub label: String,
}

impl Log {
    /// Build a logging middleware with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Middleware for Log {
    fn wrap(&self, next: Processor) -> Processor {
        let label = self.label.clone();
        Arc::new(move |msg: WireMessage| {
            let next = Arc::clone(&next);
            let label = label.clone();
            Box::pin(async move {
                let started = Instant::now();
                let correlation_id = msg.correlation_id.clone();
                tracing::debug!(%correlation_id, stage = %label, "message entering middleware");
                let outcome = next(msg).await;
                tracing::debug!(
                    %correlation_id,
                    stage = %label,
                    success = outcome.is_success(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "message left middleware"
                );
                outcome
            })
        })
    }
}

/// Catches a panic inside the wrapped processor and converts it into an
/// `InternalServerError` blame instead of poisoning the caller's task.
pub struct Recover;

impl Middleware for Recover {
    fn wrap(&self, next: Processor) -> Processor {
        Arc::new(move |msg: WireMessage| {
            let next = Arc::clone(&next);
            Box::pin(async move {
                match tokio::spawn(async move { next(msg).await }).await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        tracing::error!(panic = %join_err, "recovered panic in message processor");
                        ResultEnvelope::failure(
                            Blame::new(BlameCode::InternalServerError)
                                .with_component(Component::Middlewares)
                                .add_cause(join_err.to_string()),
                        )
                    }
                }
            })
        })
    }
}

/// Rejects messages missing an `Authorization` header, and validates the
/// bearer token via the configured [`AuthValidator`]. Failures here are
/// ACK'd by the subscribe-side handler (see [`BlameCode::is_retryable`]) to
/// avoid redelivering a message that will fail identically every time.
pub struct ValidateAuthHeaders {
    validator: Arc<dyn AuthValidator>,
}

impl ValidateAuthHeaders {
    /// Build an auth-validating middleware backed by `validator`.
    pub fn new(validator: Arc<dyn AuthValidator>) -> Self {
        Self { validator }
    }
}

impl Middleware for ValidateAuthHeaders {
    fn wrap(&self, next: Processor) -> Processor {
        let validator = Arc::clone(&self.validator);
        Arc::new(move |msg: WireMessage| {
            let next = Arc::clone(&next);
            let validator = Arc::clone(&validator);
            Box::pin(async move {
                let token = match msg.headers.get(HEADER_AUTHORIZATION) {
                    Some(t) if !t.is_empty() => t.trim_start_matches("Bearer ").to_string(),
                    _ => {
                        return ResultEnvelope::failure(
                            Blame::new(BlameCode::MissingAuthCredential)
                                .with_component(Component::Middlewares),
                        );
                    }
                };

                if let Err(blame) = validator.validate(&token) {
                    return ResultEnvelope::failure(blame);
                }

                next(msg).await
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Processor {
        Arc::new(|msg: WireMessage| Box::pin(async move { ResultEnvelope::success(msg) }))
    }

    #[tokio::test]
    async fn add_header_applies_before_next() {
        let mws: Vec<Arc<dyn Middleware>> = vec![Arc::new(AddHeader::new("X-Foo", "bar"))];
        let chain = MiddlewareChain::apply(base(), &mws);
        let out = chain(Message::pending("c1", serde_json::json!({}))).await;
        let (value, _) = out.value();
        assert_eq!(value.unwrap().headers.get("X-Foo"), Some("bar"));
    }

    #[tokio::test]
    async fn outermost_middleware_runs_first() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::<&'static str>::new()));
        struct Tag(Arc<parking_lot::Mutex<Vec<&'static str>>>, &'static str);
        impl Middleware for Tag {
            fn wrap(&self, next: Processor) -> Processor {
                let order = Arc::clone(&self.0);
                let name = self.1;
                Arc::new(move |msg: WireMessage| {
                    order.lock().push(name);
                    let next = Arc::clone(&next);
                    Box::pin(async move { next(msg).await })
                })
            }
        }

        let mws: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tag(Arc::clone(&order), "mw1")),
            Arc::new(Tag(Arc::clone(&order), "mw2")),
        ];
        let chain = MiddlewareChain::apply(base(), &mws);
        let _ = chain(Message::pending("c1", serde_json::json!({}))).await;
        assert_eq!(*order.lock(), vec!["mw1", "mw2"]);
    }

    #[tokio::test]
    async fn validate_auth_headers_rejects_missing_authorization() {
        struct AlwaysOk;
        impl AuthValidator for AlwaysOk {
            fn validate(&self, _token: &str) -> Result<(), Blame> {
                Ok(())
            }
        }
        let mws: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(ValidateAuthHeaders::new(Arc::new(AlwaysOk)))];
        let chain = MiddlewareChain::apply(base(), &mws);
        let out = chain(Message::pending("c1", serde_json::json!({}))).await;
        assert!(out.is_failure());
        assert_eq!(
            out.blame().unwrap().code(),
            "E_MISSING_AUTH_CREDENTIAL"
        );
    }

    #[tokio::test]
    async fn recover_converts_panic_to_internal_server_error() {
        let panicking: Processor = Arc::new(|_msg: WireMessage| {
            Box::pin(async move { panic!("boom") })
        });
        let mws: Vec<Arc<dyn Middleware>> = vec![Arc::new(Recover)];
        let chain = MiddlewareChain::apply(panicking, &mws);
        let out = chain(Message::pending("c1", serde_json::json!({}))).await;
        assert!(out.is_failure());
        assert_eq!(out.blame().unwrap().code(), "E_INTERNAL_SERVER");
    }
}
