//! PASETO bearer-token minting and verification with auto-refresh.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use rusty_paseto::prelude::*;

use crate::blame::{Blame, BlameCode, Component};
use crate::context::{now_unix, TokenClaims};

/// A v4-local (symmetric) PASETO issuer/verifier. Mints tokens carrying
/// subject/audience/ip essential tags and verifies them on the way back in,
/// optionally refreshing a token that is close to expiry.
pub struct PasetoManager {
    key: PasetoSymmetricKey<V4, Local>,
    issuer: String,
    refresh_threshold: Duration,
    auto_refresh: bool,
}

impl PasetoManager {
    /// Build a manager signing with `secret` (32+ bytes recommended).
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            key: PasetoSymmetricKey::from(Key::from(secret)),
            issuer: issuer.into(),
            refresh_threshold: Duration::from_secs(5 * 60),
            auto_refresh: true,
        }
    }

    /// Set the auto-refresh threshold (default 5 minutes).
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Enable or disable auto-refresh (default enabled).
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Mint a token for `subject`/`audience`/`ip`, valid for `ttl`.
    pub fn issue_for(&self, subject: &str, audience: &str, ip: &str, ttl: Duration) -> Result<String, Blame> {
        let now = now_unix();
        self.encode(subject, audience, ip, now, now + ttl.as_secs())
    }

    fn encode(&self, subject: &str, audience: &str, ip: &str, not_before: u64, expires_at: u64) -> Result<String, Blame> {
        let nbf = to_rfc3339(not_before)?;
        let exp = to_rfc3339(expires_at)?;

        PasetoBuilder::<V4, Local>::default()
            .set_claim(SubjectClaim::from(subject))
            .set_claim(AudienceClaim::from(audience))
            .set_claim(IssuerClaim::from(self.issuer.as_str()))
            .set_claim(NotBeforeClaim::try_from(nbf.as_str()).map_err(encode_blame)?)
            .set_claim(ExpirationClaim::try_from(exp.as_str()).map_err(encode_blame)?)
            .set_claim(CustomClaim::try_from(("ip", ip)).map_err(encode_blame)?)
            .build(&self.key)
            .map_err(encode_blame)
    }

    /// Verify `token`, checking subject/audience/ip against the request's
    /// essential tags. Returns the decoded claims on success.
    ///
    /// Essential-tag matching is done on the decoded claims directly rather
    /// than via the parser's `check_claim` (whose claim bag ties the
    /// checked values' lifetime to the parser's own, which would otherwise
    /// force every caller-supplied tag to outlive the parser).
    pub fn verify(
        &self,
        token: &str,
        expected_subject: &str,
        expected_audience: &str,
        expected_ip: &str,
    ) -> Result<TokenClaims, Blame> {
        let json = PasetoParser::<V4, Local>::default()
            .parse(token, &self.key)
            .map_err(decode_blame)?;

        let claims = decode_claims(&json)?;

        if claims.subject != expected_subject || claims.audience != expected_audience || claims.ip != expected_ip {
            return Err(Blame::new(BlameCode::MalformedAuthToken)
                .with_component(Component::Middlewares)
                .with_message("token essential tags do not match the request"));
        }

        Ok(claims)
    }

    /// If auto-refresh is enabled and `claims` is inside the refresh
    /// threshold, mint a replacement token preserving subject/audience/
    /// not-before/ip. Returns `None` when no refresh is warranted.
    pub fn maybe_refresh(&self, claims: &TokenClaims) -> Result<Option<String>, Blame> {
        if !self.auto_refresh {
            return Ok(None);
        }
        let now = now_unix();
        if !claims.needs_refresh(now, self.refresh_threshold.as_secs()) {
            return Ok(None);
        }
        let refreshed = claims.refreshed(now, self.refresh_threshold.as_secs() * 2);
        self.encode(
            &refreshed.subject,
            &refreshed.audience,
            &refreshed.ip,
            refreshed.not_before,
            refreshed.expires_at,
        )
        .map(Some)
    }
}

fn to_rfc3339(unix_secs: u64) -> Result<String, Blame> {
    Utc.timestamp_opt(unix_secs as i64, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| {
            Blame::new(BlameCode::CreateTokenFailed)
                .with_component(Component::Engine)
                .with_message("unrepresentable timestamp")
        })
}

fn decode_claims(json: &serde_json::Value) -> Result<TokenClaims, Blame> {
    let field = |name: &str| -> Result<String, Blame> {
        json.get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Blame::new(BlameCode::MalformedAuthToken)
                    .with_component(Component::Middlewares)
                    .add_cause(format!("missing claim `{name}`"))
            })
    };
    let rfc3339_to_unix = |s: &str| -> Result<u64, Blame> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp().max(0) as u64)
            .map_err(|e| {
                Blame::new(BlameCode::MalformedAuthToken)
                    .with_component(Component::Middlewares)
                    .add_cause(e.to_string())
            })
    };

    Ok(TokenClaims {
        subject: field("sub")?,
        audience: field("aud")?,
        issuer: field("iss")?,
        not_before: rfc3339_to_unix(&field("nbf")?)?,
        expires_at: rfc3339_to_unix(&field("exp")?)?,
        ip: field("ip")?,
        extras: Default::default(),
    })
}

fn encode_blame(e: impl std::fmt::Display) -> Blame {
    Blame::new(BlameCode::CreateTokenFailed)
        .with_component(Component::Engine)
        .add_cause(e.to_string())
}

fn decode_blame(e: impl std::fmt::Display) -> Blame {
    Blame::new(BlameCode::MalformedAuthToken)
        .with_component(Component::Middlewares)
        .add_cause(e.to_string())
}

#[cfg(feature = "broker")]
impl crate::broker::AuthValidator for PasetoManager {
    fn validate(&self, token: &str) -> Result<(), Blame> {
        PasetoParser::<V4, Local>::default()
            .parse(token, &self.key)
            .map(|_| ())
            .map_err(decode_blame)
    }
}

#[cfg(feature = "orchestration")]
impl crate::orchestration::TokenIssuer for PasetoManager {
    fn issue(&self, role: &str, ttl: Duration) -> Result<String, Blame> {
        self.issue_for(role, &self.issuer, "0.0.0.0", ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PasetoManager {
        PasetoManager::new(b"01234567890123456789012345678901", "conduit")
    }

    #[test]
    fn issued_token_verifies_with_matching_tags() {
        let mgr = manager();
        let token = mgr
            .issue_for("user-1", "web", "127.0.0.1", Duration::from_secs(60))
            .unwrap();
        let claims = mgr.verify(&token, "user-1", "web", "127.0.0.1").unwrap();
        assert_eq!(claims.subject, "user-1");
        assert_eq!(claims.audience, "web");
        assert_eq!(claims.ip, "127.0.0.1");
    }

    #[test]
    fn verify_rejects_mismatched_subject() {
        let mgr = manager();
        let token = mgr
            .issue_for("user-1", "web", "127.0.0.1", Duration::from_secs(60))
            .unwrap();
        let err = mgr.verify(&token, "user-2", "web", "127.0.0.1").unwrap_err();
        assert_eq!(err.code(), "E_MALFORMED_AUTH_TOKEN");
    }

    #[test]
    fn near_expiry_token_is_refreshed_preserving_identity() {
        let mgr = manager().with_refresh_threshold(Duration::from_secs(3600));
        let token = mgr
            .issue_for("user-1", "web", "127.0.0.1", Duration::from_secs(60))
            .unwrap();
        let claims = mgr.verify(&token, "user-1", "web", "127.0.0.1").unwrap();
        let refreshed = mgr.maybe_refresh(&claims).unwrap();
        assert!(refreshed.is_some());
        let new_claims = mgr
            .verify(&refreshed.unwrap(), "user-1", "web", "127.0.0.1")
            .unwrap();
        assert_eq!(new_claims.subject, claims.subject);
        assert_eq!(new_claims.audience, claims.audience);
        assert_eq!(new_claims.ip, claims.ip);
        assert!(new_claims.expires_at > claims.expires_at);
    }

    #[test]
    fn far_from_expiry_token_is_not_refreshed() {
        let mgr = manager();
        let token = mgr
            .issue_for("user-1", "web", "127.0.0.1", Duration::from_secs(3600))
            .unwrap();
        let claims = mgr.verify(&token, "user-1", "web", "127.0.0.1").unwrap();
        assert!(mgr.maybe_refresh(&claims).unwrap().is_none());
    }
}
