//! Wire envelope exchanged over the bus, and its string-keyed header bag.

use crate::blame::ErrorResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What an envelope asks the receiver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageAction {
    /// A plain request/reply exchange.
    Process,
    /// A forward step of a saga.
    Execute,
    /// A compensating step of a saga.
    Rollback,
}

/// Lifecycle state of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Not yet handled.
    Pending,
    /// Handled, outcome not yet classified.
    Completed,
    /// Handled successfully.
    Success,
    /// Handled unsuccessfully; `error` is populated.
    Failed,
}

impl MessageStatus {
    /// `true` for `Completed` and `Success` — anything but an explicit failure.
    pub fn is_success(&self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Success)
    }
}

/// String-keyed metadata carried alongside every envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Headers(HashMap<String, String>);

/// `Message-ID` header key.
pub const HEADER_MESSAGE_ID: &str = "Message-ID";
/// `X-Correlation-ID` header key.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-ID";
/// `Authorization` header key.
pub const HEADER_AUTHORIZATION: &str = "Authorization";
/// `X-IP` header key.
pub const HEADER_IP: &str = "X-IP";
/// `X-Subject` header key.
pub const HEADER_SUBJECT: &str = "X-Subject";
/// `X-Org-Id` header key.
pub const HEADER_ORG_ID: &str = "X-Org-Id";
/// `X-User-Id` header key.
pub const HEADER_USER_ID: &str = "X-User-Id";
/// `X-User-Role` header key.
pub const HEADER_USER_ROLE: &str = "X-User-Role";
/// `X-Feature-Flags` header key.
pub const HEADER_FEATURE_FLAGS: &str = "X-Feature-Flags";
/// `X-Location-Id` header key.
pub const HEADER_LOCATION_ID: &str = "X-Location-Id";

impl Headers {
    /// An empty header bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, overwriting any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Headers::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Read a header by exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// `true` iff the header is present and non-empty.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Remove a header.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Iterate over all header key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Envelope exchanged over the bus. `T` is the caller-defined payload type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T = serde_json::Value> {
    /// What the receiver is asked to do.
    pub action: MessageAction,
    /// Current lifecycle state.
    pub status: MessageStatus,
    /// Opaque identifier propagated unchanged across every hop.
    pub correlation_id: String,
    /// Name of the service currently handling this envelope; mutated per step.
    pub current_service: String,
    /// The payload, absent exactly when `error` is populated on failure.
    pub payload: Option<T>,
    /// Populated only when `status == Failed`.
    pub error: Option<ErrorResponse>,
    /// String-keyed metadata.
    #[serde(default)]
    pub headers: Headers,
}

impl<T> Message<T> {
    /// A pending envelope carrying a payload, no error.
    pub fn pending(correlation_id: impl Into<String>, payload: T) -> Self {
        Self {
            action: MessageAction::Process,
            status: MessageStatus::Pending,
            correlation_id: correlation_id.into(),
            current_service: String::new(),
            payload: Some(payload),
            error: None,
            headers: Headers::new(),
        }
    }

    /// `true` iff exactly one of `payload`/`error` is populated when failed,
    /// per the envelope invariant.
    pub fn is_well_formed(&self) -> bool {
        if self.status == MessageStatus::Failed {
            self.error.is_some()
        } else {
            true
        }
    }

    /// Map the payload to a new type, keeping every other field unchanged.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            action: self.action,
            status: self.status,
            correlation_id: self.correlation_id,
            current_service: self.current_service,
            payload: self.payload.map(f),
            error: self.error,
            headers: self.headers,
        }
    }
}
