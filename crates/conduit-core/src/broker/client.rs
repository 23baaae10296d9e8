//! Sole owner of the broker connection: publish, request/reply, subscriptions,
//! subscription health supervision and graceful close.

use crate::blame::{Blame, BlameCode, Component};
use crate::broker::idempotency::IdempotencyTracker;
use crate::broker::message::{Message, Headers, HEADER_MESSAGE_ID};
use crate::broker::middleware::{Middleware, MiddlewareChain, Processor, WireMessage};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::result::ResultEnvelope;
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy},
    AckKind,
};
use dashmap::DashMap;
use futures::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const MONITOR_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Construction-time configuration for a [`BrokerManager`].
#[derive(Clone)]
pub struct BrokerConfig {
    /// NATS server addresses (comma-separated host:port pairs accepted by
    /// `async-nats`).
    pub servers: String,
    /// How long a processed message-id is remembered before it can be
    /// redelivered and reprocessed.
    pub idempotency_retention: Duration,
    /// Circuit breaker applied around `RequestReply`.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Whether the subscription supervisor should auto-resubscribe on a
    /// detected invalid subscription.
    pub auto_reconnect: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            servers: "nats://127.0.0.1:4222".to_string(),
            idempotency_retention: Duration::from_secs(10 * 60),
            circuit_breaker: CircuitBreakerConfig::new(5),
            auto_reconnect: true,
        }
    }
}

impl BrokerConfig {
    /// Start from defaults, overriding the server address list.
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            ..Default::default()
        }
    }

    /// Override the idempotency retention window.
    pub fn with_idempotency_retention(mut self, retention: Duration) -> Self {
        self.idempotency_retention = retention;
        self
    }

    /// Override the circuit breaker configuration.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }
}

/// Options accepted by `Subscribe`/`SubscribeQueue`.
///
/// When `stream_name` is `Some`, the subject is bound to a durable JetStream
/// pull consumer instead of a plain core-NATS subscription: handlers run in
/// manual-ack mode and a retryable failure NAKs the message for
/// broker-driven redelivery instead of the default auto-ack. `durable_name`
/// names that consumer; it falls back to `queue_group`, then the subject
/// itself, if unset.
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Queue group name; deliveries across a group are load-balanced.
    pub queue_group: Option<String>,
    /// Durable consumer name for streamed subjects.
    pub durable_name: Option<String>,
    /// Stream name; when set, the subject is bound to a durable JetStream
    /// consumer on this stream rather than a plain subscription.
    pub stream_name: Option<String>,
    /// Middleware chain applied to every inbound message.
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

struct SubscriptionState {
    options: SubscribeOptions,
    processor: Processor,
    valid: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Handle returned by `Subscribe`; dropping it does not cancel the
/// subscription — use [`BrokerManager::close`] or let the manager own it.
pub struct SubscriptionHandle {
    /// The subject this handle is registered on.
    pub subject: String,
}

/// Owns the broker connection; registers subscriptions, publishes, does
/// synchronous request/reply, supervises subscription health, and applies the
/// middleware chain and idempotency tracker to inbound traffic.
pub struct BrokerManager {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: BrokerConfig,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    circuit_breaker: Arc<CircuitBreaker>,
    subscriptions: Arc<DashMap<String, SubscriptionState>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    monitor: Option<JoinHandle<()>>,
}

impl BrokerManager {
    /// Connect to the broker. A connect failure here is fatal — propagated to
    /// the caller rather than retried, matching construction-time semantics.
    pub async fn connect(config: BrokerConfig) -> Result<Self, Blame> {
        let client = async_nats::connect(&config.servers).await.map_err(|e| {
            Blame::new(BlameCode::ConnectionFailed)
                .with_component(Component::Adapters)
                .add_cause(e.to_string())
        })?;
        let jetstream = jetstream::new(client.clone());

        let idempotency = IdempotencyTracker::new(config.idempotency_retention);
        let circuit_breaker =
            CircuitBreaker::new("broker-request-reply", config.circuit_breaker.clone());
        let subscriptions = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let idempotency = Arc::new(tokio::sync::Mutex::new(idempotency));

        let monitor = spawn_monitor(
            client.clone(),
            jetstream.clone(),
            Arc::clone(&subscriptions),
            Arc::clone(&closed),
            Arc::clone(&shutdown),
            Arc::clone(&idempotency),
        );

        Ok(Self {
            client,
            jetstream,
            config,
            idempotency,
            circuit_breaker: Arc::new(circuit_breaker),
            subscriptions,
            closed,
            shutdown,
            monitor: Some(monitor),
        })
    }

    /// The configuration this manager was constructed with.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Encode `payload` as JSON, assign a fresh `Message-ID`, run the
    /// middleware chain, publish.
    pub async fn publish<T: Serialize>(
        &self,
        subject: &str,
        payload: &T,
        mws: &[Arc<dyn Middleware>],
    ) -> Result<(), Blame> {
        let mut headers = Headers::new();
        headers.set(HEADER_MESSAGE_ID, uuid::Uuid::new_v4().to_string());

        let body = serde_json::to_value(payload).map_err(|e| {
            Blame::new(BlameCode::MarshalError)
                .with_component(Component::Library)
                .add_cause(e.to_string())
        })?;

        let mut msg = Message::pending("", body);
        msg.headers = headers;

        let client = self.client.clone();
        let subject_owned = subject.to_string();
        let terminal: Processor = Arc::new(move |msg: WireMessage| {
            let client = client.clone();
            let subject = subject_owned.clone();
            Box::pin(async move {
                let bytes = match serde_json::to_vec(&msg) {
                    Ok(b) => b,
                    Err(e) => {
                        return ResultEnvelope::failure(
                            Blame::new(BlameCode::MarshalError)
                                .with_component(Component::Library)
                                .add_cause(e.to_string()),
                        )
                    }
                };
                match client.publish(subject.clone(), bytes.into()).await {
                    Ok(()) => ResultEnvelope::success(msg),
                    Err(e) => ResultEnvelope::failure(
                        Blame::new(BlameCode::PublishMessageError)
                            .with_component(Component::Adapters)
                            .add_cause(format!("subject={subject}: {e}")),
                    ),
                }
            })
        });

        let chain = MiddlewareChain::apply(terminal, mws);
        let outcome = chain(msg).await;
        let (_, blame) = outcome.value();
        match blame {
            Some(b) => Err(b),
            None => Ok(()),
        }
    }

    /// Request/reply: creates a unique reply inbox, subscribes to it,
    /// publishes with the reply subject set, waits up to `timeout`. The whole
    /// call is executed inside the circuit breaker.
    pub async fn request_reply<T: Serialize, R: DeserializeOwned>(
        &self,
        subject: &str,
        _queue_group: Option<&str>,
        payload: &T,
        timeout: Duration,
        mws: &[Arc<dyn Middleware>],
    ) -> Result<Message<R>, Blame> {
        let body = serde_json::to_value(payload).map_err(|e| {
            Blame::new(BlameCode::MarshalError)
                .with_component(Component::Library)
                .add_cause(e.to_string())
        })?;

        let mut msg = Message::pending("", body);
        msg.headers.set(HEADER_MESSAGE_ID, uuid::Uuid::new_v4().to_string());

        let base: Processor = Arc::new(|msg: WireMessage| Box::pin(async move { ResultEnvelope::success(msg) }));
        let chain = MiddlewareChain::apply(base, mws);
        let msg = match chain(msg).await.value() {
            (Some(msg), _) => msg,
            (None, Some(blame)) => return Err(blame),
            (None, None) => unreachable!("middleware chain succeeded without a value"),
        };

        let client = self.client.clone();
        let subject = subject.to_string();

        let call_result = self
            .circuit_breaker
            .call(|| async move {
                let bytes = serde_json::to_vec(&msg).map_err(|e| {
                    Blame::new(BlameCode::MarshalError)
                        .with_component(Component::Library)
                        .add_cause(e.to_string())
                })?;

                let reply_subject = client.new_inbox();
                let mut reply_sub = client
                    .subscribe(reply_subject.clone())
                    .await
                    .map_err(|e| {
                        Blame::new(BlameCode::SubscribeToSubjectError)
                            .with_component(Component::Adapters)
                            .add_cause(e.to_string())
                    })?;

                client
                    .publish_with_reply(subject.clone(), reply_subject.clone(), bytes.into())
                    .await
                    .map_err(|e| {
                        Blame::new(BlameCode::PublishMessageError)
                            .with_component(Component::Adapters)
                            .add_cause(format!("subject={subject}: {e}"))
                    })?;

                let reply = tokio::time::timeout(timeout, reply_sub.next())
                    .await
                    .map_err(|_| {
                        Blame::new(BlameCode::InternalServerError)
                            .with_component(Component::Adapters)
                            .add_cause(format!("request-reply on {subject} timed out"))
                    })?
                    .ok_or_else(|| {
                        Blame::new(BlameCode::InternalServerError)
                            .with_component(Component::Adapters)
                            .add_cause(format!("reply subscription on {subject} closed early"))
                    })?;

                let _ = reply_sub.unsubscribe().await;

                serde_json::from_slice::<Message<R>>(&reply.payload).map_err(|e| {
                    Blame::new(BlameCode::UnMarshalError)
                        .with_component(Component::Library)
                        .add_cause(e.to_string())
                })
            })
            .await;

        match call_result {
            Ok(reply) => Ok(reply),
            Err(CircuitBreakerError::CircuitOpen(open)) => Err(Blame::new(BlameCode::CircuitOpen)
                .with_component(Component::Adapters)
                .add_cause(open.to_string())),
            Err(CircuitBreakerError::Inner(blame)) => Err(blame),
        }
    }

    /// Register a processor on `subject` (no queue group — every subscriber
    /// of the subject receives every message).
    pub async fn subscribe(
        &self,
        subject: &str,
        processor: Processor,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle, Blame> {
        self.subscribe_inner(subject, processor, opts).await
    }

    /// Register a processor on `subject` within queue group `queue`.
    pub async fn subscribe_queue(
        &self,
        subject: &str,
        queue: &str,
        processor: Processor,
        mut opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle, Blame> {
        opts.queue_group = Some(queue.to_string());
        self.subscribe_inner(subject, processor, opts).await
    }

    async fn subscribe_inner(
        &self,
        subject: &str,
        processor: Processor,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle, Blame> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Blame::new(BlameCode::SubscribeToSubjectError)
                .with_component(Component::Adapters)
                .add_cause("broker manager is closed"));
        }

        let chained = MiddlewareChain::apply(Arc::clone(&processor), &opts.middlewares);
        let subject_owned = subject.to_string();
        let valid = Arc::new(AtomicBool::new(true));

        let task = spawn_for_options(
            &self.client,
            &self.jetstream,
            subject_owned.clone(),
            &opts,
            chained.clone(),
            Arc::clone(&self.idempotency),
            Arc::clone(&valid),
        )
        .await?;

        self.subscriptions.insert(
            subject_owned.clone(),
            SubscriptionState {
                options: opts,
                processor: chained,
                valid,
                task,
            },
        );

        Ok(SubscriptionHandle {
            subject: subject_owned,
        })
    }

    /// Unsubscribe every registered subject, drain the connection, close the
    /// idempotency tracker, and refuse further subscribes. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_one();

        for entry in self.subscriptions.iter() {
            entry.value().task.abort();
        }
        self.subscriptions.clear();

        self.idempotency.lock().await.close();

        if let Err(e) = self.client.drain().await {
            tracing::warn!(error = %e, "broker drain failed during close");
        }
    }
}

impl Drop for BrokerManager {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

/// Dispatches a subscription to a plain core-NATS subscriber or a durable
/// JetStream pull consumer, depending on `opts.stream_name`.
async fn spawn_for_options(
    client: &async_nats::Client,
    jetstream: &jetstream::Context,
    subject: String,
    opts: &SubscribeOptions,
    chained: Processor,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    valid: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, Blame> {
    match &opts.stream_name {
        Some(stream_name) => {
            let durable_name = opts
                .durable_name
                .clone()
                .or_else(|| opts.queue_group.clone())
                .unwrap_or_else(|| subject.clone());
            spawn_streamed_subscriber(
                jetstream,
                subject,
                stream_name.clone(),
                durable_name,
                chained,
                idempotency,
                valid,
            )
            .await
        }
        None => {
            spawn_plain_subscriber(
                client,
                subject,
                opts.queue_group.clone(),
                chained,
                idempotency,
                valid,
            )
            .await
        }
    }
}

async fn spawn_plain_subscriber(
    client: &async_nats::Client,
    subject: String,
    queue_group: Option<String>,
    chained: Processor,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    valid: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, Blame> {
    let mut subscriber = match &queue_group {
        Some(q) => client.queue_subscribe(subject.clone(), q.clone()).await,
        None => client.subscribe(subject.clone()).await,
    }
    .map_err(|e| {
        Blame::new(BlameCode::SubscribeToSubjectError)
            .with_component(Component::Adapters)
            .add_cause(e.to_string())
    })?;

    let subject_for_log = subject.clone();

    Ok(tokio::spawn(async move {
        while let Some(nats_msg) = subscriber.next().await {
            let processor = Arc::clone(&chained);
            let idempotency = Arc::clone(&idempotency);
            let subject = subject_for_log.clone();
            let err_subject = subject.clone();
            // Each inbound message runs on its own task: no implicit
            // serialization beyond queue-group semantics, and a panic in
            // one message's handler cannot take down another's.
            tokio::spawn(async move {
                if let Err(panic) =
                    tokio::spawn(handle_inbound(nats_msg, processor, idempotency, subject)).await
                {
                    tracing::error!(%err_subject, ?panic, "panic in subscription handler, continuing");
                }
            });
        }
        valid.store(false, Ordering::Release);
    }))
}

/// Binds `subject` to a durable JetStream pull consumer on `stream_name`,
/// creating the stream/consumer if absent. Handlers run in manual-ack mode;
/// see [`handle_inbound_streamed`].
async fn spawn_streamed_subscriber(
    jetstream: &jetstream::Context,
    subject: String,
    stream_name: String,
    durable_name: String,
    chained: Processor,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    valid: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, Blame> {
    let stream = jetstream
        .get_or_create_stream(jetstream::stream::Config {
            name: stream_name.clone(),
            subjects: vec![subject.clone()],
            ..Default::default()
        })
        .await
        .map_err(|e| {
            Blame::new(BlameCode::SubscribeToSubjectError)
                .with_component(Component::Adapters)
                .add_cause(format!("stream={stream_name}: {e}"))
        })?;

    let consumer = stream
        .get_or_create_consumer(
            &durable_name,
            pull::Config {
                durable_name: Some(durable_name.clone()),
                ack_policy: AckPolicy::Explicit,
                filter_subject: subject.clone(),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| {
            Blame::new(BlameCode::SubscribeToSubjectError)
                .with_component(Component::Adapters)
                .add_cause(format!("consumer={durable_name}: {e}"))
        })?;

    let mut messages = consumer.messages().await.map_err(|e| {
        Blame::new(BlameCode::SubscribeToSubjectError)
            .with_component(Component::Adapters)
            .add_cause(e.to_string())
    })?;

    let subject_for_log = subject.clone();

    Ok(tokio::spawn(async move {
        while let Some(delivered) = messages.next().await {
            let jet_msg = match delivered {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(subject = %subject_for_log, error = %e, "jetstream pull error, continuing");
                    continue;
                }
            };
            let processor = Arc::clone(&chained);
            let idempotency = Arc::clone(&idempotency);
            let subject = subject_for_log.clone();
            let err_subject = subject.clone();
            tokio::spawn(async move {
                if let Err(panic) = tokio::spawn(handle_inbound_streamed(
                    jet_msg, processor, idempotency, subject,
                ))
                .await
                {
                    tracing::error!(%err_subject, ?panic, "panic in subscription handler, continuing");
                }
            });
        }
        valid.store(false, Ordering::Release);
    }))
}

/// Parses the payload, de-duplicates by `Message-ID`, and runs `processor`.
/// Returns `None` if the message was dropped before the processor ran
/// (unparseable body, missing id, or duplicate delivery); otherwise `Some`
/// with whether the outcome was a retryable failure. A message-id is marked
/// processed only on success or non-retryable failure — a retryable failure
/// leaves it unmarked so that a NAK-triggered redelivery is reprocessed
/// rather than rejected as a duplicate.
async fn run_processor(
    payload: &[u8],
    processor: &Processor,
    idempotency: &Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    subject: &str,
) -> Option<bool> {
    let wire: WireMessage = match serde_json::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%subject, error = %e, "dropping message with unparseable body");
            return None;
        }
    };

    let message_id = match wire.headers.get(HEADER_MESSAGE_ID) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            tracing::warn!(%subject, "dropping message missing Message-ID header");
            return None;
        }
    };

    {
        let tracker = idempotency.lock().await;
        if tracker.is_processed(&message_id) {
            tracing::debug!(%subject, %message_id, "duplicate delivery, ack-and-drop");
            return None;
        }
    }

    let outcome = processor(wire).await;
    let retryable = outcome
        .blame()
        .map(|blame| blame.code_kind().is_retryable())
        .unwrap_or(false);

    match outcome.blame() {
        Some(blame) if retryable => {
            tracing::warn!(%subject, %message_id, code = blame.code(), "retryable failure, nak");
        }
        Some(blame) => {
            tracing::warn!(%subject, %message_id, code = blame.code(), "non-retryable failure, ack");
            idempotency.lock().await.mark_processed(&message_id);
        }
        None => {
            tracing::debug!(%subject, %message_id, "message processed");
            idempotency.lock().await.mark_processed(&message_id);
        }
    }

    Some(retryable)
}

async fn handle_inbound(
    nats_msg: async_nats::Message,
    processor: Processor,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    subject: String,
) {
    run_processor(&nats_msg.payload, &processor, &idempotency, &subject).await;
}

/// Streamed-mode counterpart of [`handle_inbound`]: ACKs on success or
/// non-retryable failure, NAKs on retryable failure to trigger JetStream
/// redelivery, per the processed-set contract in [`run_processor`].
async fn handle_inbound_streamed(
    jet_msg: jetstream::Message,
    processor: Processor,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
    subject: String,
) {
    let outcome = run_processor(&jet_msg.payload, &processor, &idempotency, &subject).await;
    let ack = match outcome {
        Some(true) => jet_msg.ack_with(AckKind::Nak(None)).await,
        Some(false) | None => jet_msg.ack().await,
    };
    if let Err(e) = ack {
        tracing::warn!(%subject, error = %e, "failed to acknowledge jetstream message");
    }
}

fn spawn_monitor(
    client: async_nats::Client,
    jetstream: jetstream::Context,
    subscriptions: Arc<DashMap<String, SubscriptionState>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    idempotency: Arc<tokio::sync::Mutex<IdempotencyTracker>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
                _ = shutdown.notified() => break,
            }
            if closed.load(Ordering::Acquire) {
                break;
            }

            let invalid_subjects: Vec<String> = subscriptions
                .iter()
                .filter(|e| !e.value().valid.load(Ordering::Acquire))
                .map(|e| e.key().clone())
                .collect();

            for subject in invalid_subjects {
                let Some((_, state)) = subscriptions.remove(&subject) else {
                    continue;
                };
                tracing::warn!(%subject, "subscription invalid, re-subscribing");
                tokio::time::sleep(RECONNECT_BACKOFF).await;

                let valid = Arc::new(AtomicBool::new(true));
                let queue_group = state.options.queue_group.clone();
                let task = match spawn_for_options(
                    &client,
                    &jetstream,
                    subject.clone(),
                    &state.options,
                    Arc::clone(&state.processor),
                    Arc::clone(&idempotency),
                    Arc::clone(&valid),
                )
                .await
                {
                    Ok(task) => task,
                    Err(e) => {
                        tracing::error!(%subject, error = %e, "re-subscribe failed, will retry next tick");
                        continue;
                    }
                };

                if queue_group.is_none() {
                    let _ = client.flush().await;
                }

                subscriptions.insert(
                    subject,
                    SubscriptionState {
                        options: state.options,
                        processor: state.processor,
                        valid,
                        task,
                    },
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultEnvelope;

    fn wire_payload(message_id: &str) -> Vec<u8> {
        let mut msg = Message::pending("corr-1", serde_json::json!({"v": 1}));
        msg.headers.set(HEADER_MESSAGE_ID, message_id);
        serde_json::to_vec(&msg).unwrap()
    }

    fn processor_returning(outcome: ResultEnvelope<WireMessage>) -> Processor {
        Arc::new(move |_msg: WireMessage| {
            let outcome = outcome.clone();
            Box::pin(async move { outcome })
        })
    }

    #[tokio::test]
    async fn success_marks_processed() {
        let idempotency = Arc::new(tokio::sync::Mutex::new(IdempotencyTracker::new(
            Duration::from_secs(60),
        )));
        let processor = processor_returning(ResultEnvelope::success(Message::pending(
            "corr-1",
            serde_json::json!({}),
        )));

        let retryable = run_processor(&wire_payload("m1"), &processor, &idempotency, "subj")
            .await
            .expect("message was processed");
        assert!(!retryable);
        assert!(idempotency.lock().await.is_processed("m1"));
    }

    #[tokio::test]
    async fn non_retryable_failure_marks_processed() {
        let idempotency = Arc::new(tokio::sync::Mutex::new(IdempotencyTracker::new(
            Duration::from_secs(60),
        )));
        let processor = processor_returning(ResultEnvelope::failure(
            Blame::new(BlameCode::MalformedAuthToken).with_component(Component::Adapters),
        ));

        let retryable = run_processor(&wire_payload("m1"), &processor, &idempotency, "subj")
            .await
            .expect("message was processed");
        assert!(!retryable);
        assert!(idempotency.lock().await.is_processed("m1"));
    }

    #[tokio::test]
    async fn retryable_failure_does_not_mark_processed() {
        let idempotency = Arc::new(tokio::sync::Mutex::new(IdempotencyTracker::new(
            Duration::from_secs(60),
        )));
        let processor = processor_returning(ResultEnvelope::failure(
            Blame::new(BlameCode::InternalServerError).with_component(Component::Adapters),
        ));

        let retryable = run_processor(&wire_payload("m1"), &processor, &idempotency, "subj")
            .await
            .expect("message was processed");
        assert!(retryable);
        assert!(
            !idempotency.lock().await.is_processed("m1"),
            "a retryable failure must not be marked processed, or redelivery would be dropped as a duplicate"
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_is_dropped_before_processing() {
        let idempotency = Arc::new(tokio::sync::Mutex::new(IdempotencyTracker::new(
            Duration::from_secs(60),
        )));
        idempotency.lock().await.mark_processed("m1");

        let calls = Arc::new(AtomicBool::new(false));
        let calls_clone = Arc::clone(&calls);
        let processor: Processor = Arc::new(move |_msg: WireMessage| {
            calls_clone.store(true, Ordering::SeqCst);
            Box::pin(async move {
                ResultEnvelope::success(Message::pending("corr-1", serde_json::json!({})))
            })
        });

        let outcome = run_processor(&wire_payload("m1"), &processor, &idempotency, "subj").await;
        assert!(outcome.is_none());
        assert!(!calls.load(Ordering::SeqCst), "processor must not run on a duplicate");
    }

    #[tokio::test]
    async fn unparseable_body_is_dropped() {
        let idempotency = Arc::new(tokio::sync::Mutex::new(IdempotencyTracker::new(
            Duration::from_secs(60),
        )));
        let processor = processor_returning(ResultEnvelope::success(Message::pending(
            "corr-1",
            serde_json::json!({}),
        )));

        let outcome = run_processor(b"not json", &processor, &idempotency, "subj").await;
        assert!(outcome.is_none());
    }
}
