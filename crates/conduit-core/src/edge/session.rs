//! Cookie-bound session verification against a server-side store.

use crate::blame::{Blame, BlameCode, Component};
use crate::cache::{Cache, MemoryCache};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SESSION_KEY_PREFIX: &str = "session:";

/// Verifies a session-id against a [`MemoryCache`]-backed store. On
/// validation failure the session is destroyed asynchronously and the cookie
/// should be cleared by the caller.
pub struct SessionVerifier {
    store: Arc<MemoryCache>,
    ttl: Duration,
}

impl SessionVerifier {
    /// Build a verifier backed by `store`, with sessions living for `ttl`.
    pub fn new(store: Arc<MemoryCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{session_id}")
    }

    /// Create (or overwrite) the session record for `session_id`.
    pub async fn create<T: Serialize + Send + Sync>(&self, session_id: &str, data: &T) {
        self.store.set(&Self::key(session_id), data, Some(self.ttl)).await;
    }

    /// Look up and deserialize the session record. Missing -> `SessionNotFound`;
    /// present but not deserializable as `T` -> `SessionMalformed`. On either
    /// failure the session is destroyed asynchronously.
    pub async fn verify<T: DeserializeOwned + Send + 'static>(&self, session_id: &str) -> Result<T, Blame> {
        let key = Self::key(session_id);
        let exists = self.store.exists(&key).await;
        if !exists {
            return Err(Blame::new(BlameCode::SessionNotFound).with_component(Component::Middlewares));
        }

        match self.store.get::<T>(&key).await {
            Some(data) => Ok(data),
            None => {
                self.destroy_async(session_id);
                Err(Blame::new(BlameCode::SessionMalformed).with_component(Component::Middlewares))
            }
        }
    }

    /// Remove the session record for `session_id`.
    pub async fn destroy(&self, session_id: &str) {
        self.store.delete(&Self::key(session_id)).await;
    }

    /// Fire-and-forget destroy, used after a verification failure so the
    /// caller is not blocked on cleanup.
    fn destroy_async(&self, session_id: &str) {
        let store = Arc::clone(&self.store);
        let key = Self::key(session_id);
        tokio::spawn(async move {
            store.delete(&key).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Session {
        user_id: String,
    }

    fn verifier() -> SessionVerifier {
        SessionVerifier::new(Arc::new(MemoryCache::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn missing_session_is_not_found() {
        let v = verifier();
        let err = v.verify::<Session>("nope").await.unwrap_err();
        assert_eq!(err.code(), "E_SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn created_session_verifies() {
        let v = verifier();
        v.create("s1", &Session { user_id: "u1".into() }).await;
        let data = v.verify::<Session>("s1").await.unwrap();
        assert_eq!(data.user_id, "u1");
    }

    #[tokio::test]
    async fn destroyed_session_is_not_found() {
        let v = verifier();
        v.create("s1", &Session { user_id: "u1".into() }).await;
        v.destroy("s1").await;
        let err = v.verify::<Session>("s1").await.unwrap_err();
        assert_eq!(err.code(), "E_SESSION_NOT_FOUND");
    }
}
