//! NATS-backed broker client: idempotent delivery, a composable middleware
//! chain, circuit-breaker-guarded request/reply, and subscription health
//! supervision.

mod client;
mod idempotency;
mod message;
mod middleware;

pub use client::{BrokerConfig, BrokerManager, SubscribeOptions, SubscriptionHandle};
pub use idempotency::IdempotencyTracker;
pub use message::{
    Headers, Message, MessageAction, MessageStatus, HEADER_AUTHORIZATION, HEADER_CORRELATION_ID,
    HEADER_FEATURE_FLAGS, HEADER_IP, HEADER_LOCATION_ID, HEADER_MESSAGE_ID, HEADER_ORG_ID,
    HEADER_SUBJECT, HEADER_USER_ID, HEADER_USER_ROLE,
};
pub use middleware::{
    AddHeader, AuthValidator, BoxFuture, Log, Middleware, MiddlewareChain, Processor, Recover,
    ValidateAuthHeaders, WireMessage,
};
