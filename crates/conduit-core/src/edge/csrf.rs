//! Per-session CSRF token minting and validation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::blame::{Blame, BlameCode, Component};

const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

struct StoredToken {
    value: String,
    minted_at: SystemTime,
}

/// Methods that never require a CSRF token.
fn is_safe_method(method: &str) -> bool {
    matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD" | "OPTIONS")
}

/// In-memory, per-session CSRF token store. A fresh token is `SHA-256(session
/// id | nanos | secret)`, base64-url encoded, valid for 24 hours.
pub struct CsrfTokenStore {
    tokens: DashMap<String, StoredToken>,
    secret: String,
}

impl CsrfTokenStore {
    /// Build a store keyed by session-id, signing new tokens with `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            tokens: DashMap::new(),
            secret: secret.into(),
        }
    }

    /// Mint (or replace) a token for `session_id`.
    pub fn mint(&self, session_id: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b"|");
        hasher.update(nanos.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.secret.as_bytes());
        let token = URL_SAFE_NO_PAD.encode(hasher.finalize());

        self.tokens.insert(
            session_id.to_string(),
            StoredToken {
                value: token.clone(),
                minted_at: SystemTime::now(),
            },
        );
        token
    }

    /// Validate a request: `path == "/"` always (re)mints and returns a fresh
    /// token; safe methods and excluded routes bypass validation; everything
    /// else requires a matching, unexpired `presented` token.
    pub fn validate(
        &self,
        session_id: &str,
        path: &str,
        method: &str,
        presented: Option<&str>,
        excluded_routes: &[String],
    ) -> Result<Option<String>, Blame> {
        if path == "/" {
            return Ok(Some(self.mint(session_id)));
        }
        if is_safe_method(method) || excluded_routes.iter().any(|r| r == path) {
            return Ok(None);
        }

        let presented = presented.ok_or_else(|| {
            Blame::new(BlameCode::CsrfTokenMissing)
                .with_component(Component::Middlewares)
                .with_message("missing CSRF token; visit / first")
        })?;

        let stored = self.tokens.get(session_id).ok_or_else(|| {
            Blame::new(BlameCode::CsrfTokenMismatch).with_component(Component::Middlewares)
        })?;

        let expired = stored
            .minted_at
            .elapsed()
            .map(|elapsed| elapsed > TOKEN_LIFETIME)
            .unwrap_or(true);

        if expired || stored.value != presented {
            return Err(Blame::new(BlameCode::CsrfTokenMismatch).with_component(Component::Middlewares));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_always_mints_fresh_token() {
        let store = CsrfTokenStore::new("secret");
        let token = store.validate("s1", "/", "GET", None, &[]).unwrap();
        assert!(token.is_some());
    }

    #[test]
    fn safe_methods_bypass_validation() {
        let store = CsrfTokenStore::new("secret");
        assert!(store.validate("s1", "/things", "GET", None, &[]).unwrap().is_none());
    }

    #[test]
    fn missing_token_on_protected_route_is_bad_request() {
        let store = CsrfTokenStore::new("secret");
        let err = store.validate("s1", "/things", "POST", None, &[]).unwrap_err();
        assert_eq!(err.code(), "E_CSRF_TOKEN_MISSING");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn mismatched_token_is_forbidden() {
        let store = CsrfTokenStore::new("secret");
        store.mint("s1");
        let err = store
            .validate("s1", "/things", "POST", Some("not-the-token"), &[])
            .unwrap_err();
        assert_eq!(err.code(), "E_CSRF_TOKEN_MISMATCH");
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn matching_token_passes() {
        let store = CsrfTokenStore::new("secret");
        let minted = store.mint("s1");
        let result = store.validate("s1", "/things", "POST", Some(&minted), &[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn excluded_routes_bypass_validation() {
        let store = CsrfTokenStore::new("secret");
        let excluded = vec!["/webhooks/stripe".to_string()];
        let result = store
            .validate("s1", "/webhooks/stripe", "POST", None, &excluded)
            .unwrap();
        assert!(result.is_none());
    }
}
