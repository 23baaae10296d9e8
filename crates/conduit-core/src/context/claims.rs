//! PASETO token claims carried on a request.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded PASETO claims attached to a request once the edge perimeter has
/// verified the bearer token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    /// `sub` — identity the token was issued for.
    pub subject: String,
    /// `aud` — intended audience (the User-Agent at issuance, per the
    /// perimeter's essential-tag validation).
    pub audience: String,
    /// `iss` — issuer.
    pub issuer: String,
    /// `nbf` — unix seconds before which the token is not valid.
    pub not_before: u64,
    /// `exp` — unix seconds after which the token is expired.
    pub expires_at: u64,
    /// Client IP the token was bound to at issuance.
    pub ip: String,
    /// Arbitrary additional claims.
    pub extras: HashMap<String, String>,
}

impl TokenClaims {
    /// Seconds remaining until expiry, clamped to zero once past `expires_at`.
    pub fn seconds_until_expiry(&self, now_unix: u64) -> u64 {
        self.expires_at.saturating_sub(now_unix)
    }

    /// `true` iff `expires_at - now < threshold` and therefore a refresh
    /// should be attempted when auto-refresh is enabled.
    pub fn needs_refresh(&self, now_unix: u64, threshold_secs: u64) -> bool {
        self.seconds_until_expiry(now_unix) < threshold_secs
    }

    /// Build a refreshed copy: same subject/audience/not-before/ip, a new
    /// expiry `ttl_secs` out from `now_unix`.
    pub fn refreshed(&self, now_unix: u64, ttl_secs: u64) -> Self {
        Self {
            subject: self.subject.clone(),
            audience: self.audience.clone(),
            issuer: self.issuer.clone(),
            not_before: self.not_before,
            expires_at: now_unix + ttl_secs,
            ip: self.ip.clone(),
            extras: self.extras.clone(),
        }
    }
}

/// Current unix time in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(expires_at: u64) -> TokenClaims {
        TokenClaims {
            subject: "user-1".into(),
            audience: "web".into(),
            issuer: "conduit".into(),
            not_before: 0,
            expires_at,
            ip: "127.0.0.1".into(),
            extras: HashMap::new(),
        }
    }

    #[test]
    fn needs_refresh_fires_only_under_threshold() {
        let c = claims(100);
        assert!(c.needs_refresh(70, 60));
        assert!(!c.needs_refresh(10, 60));
    }

    #[test]
    fn refreshed_preserves_subject_audience_not_before_ip() {
        let original = claims(100);
        let refreshed = original.refreshed(50, 300);
        assert_eq!(refreshed.subject, original.subject);
        assert_eq!(refreshed.audience, original.audience);
        assert_eq!(refreshed.not_before, original.not_before);
        assert_eq!(refreshed.ip, original.ip);
        assert_eq!(refreshed.expires_at, 350);
    }
}
