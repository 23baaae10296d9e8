//! HTTP edge perimeter: per-client rate limiting, CORS/HSTS, CSRF, session
//! verification and PASETO bearer-token auth with auto-refresh.

mod cors;
mod csrf;
mod paseto;
mod rate_limit;
mod session;

pub use cors::{security_headers, CorsConfig, ALLOWED_HEADERS, ALLOWED_METHODS};
pub use csrf::CsrfTokenStore;
pub use paseto::PasetoManager;
pub use rate_limit::{strip_port, ClientRateLimiter};
pub use session::SessionVerifier;

use crate::blame::Blame;
use crate::resilience::RateLimitError;
use std::sync::Arc;
use std::time::Duration;

/// Bundles the perimeter's independent checks (rate limiting, CORS, CSRF,
/// session, PASETO) behind one handle. Each check can also be used
/// standalone; this is the convenience entry point for a typical HTTP
/// middleware stack.
pub struct EdgePerimeter {
    rate_limiter: Arc<ClientRateLimiter>,
    cors: CorsConfig,
    csrf: CsrfTokenStore,
    sessions: SessionVerifier,
    paseto: PasetoManager,
}

impl EdgePerimeter {
    /// Build a perimeter from its component configurations.
    pub fn new(
        rate_limiter: Arc<ClientRateLimiter>,
        cors: CorsConfig,
        csrf: CsrfTokenStore,
        sessions: SessionVerifier,
        paseto: PasetoManager,
    ) -> Self {
        Self {
            rate_limiter,
            cors,
            csrf,
            sessions,
            paseto,
        }
    }

    /// Enforce the per-client rate limit for `remote_addr` (`ip:port`).
    /// Retry-after is derived from the limiter's own backoff.
    pub fn check_rate_limit(&self, remote_addr: &str) -> Result<(), RateLimitError> {
        self.rate_limiter.check(strip_port(remote_addr))
    }

    /// The response headers (CORS + fixed security headers) for a response
    /// to `origin`.
    pub fn response_headers(&self, origin: Option<&str>) -> Vec<(&'static str, String)> {
        self.cors.response_headers(origin)
    }

    /// `true` iff this request is a CORS preflight that should be answered
    /// in-band rather than forwarded.
    pub fn is_preflight(method: &str, origin: Option<&str>, request_method: Option<&str>) -> bool {
        CorsConfig::is_preflight(method, origin, request_method)
    }

    /// Validate (or mint, on `/`) the CSRF token for this request.
    pub fn check_csrf(
        &self,
        session_id: &str,
        path: &str,
        method: &str,
        presented: Option<&str>,
        excluded_routes: &[String],
    ) -> Result<Option<String>, Blame> {
        self.csrf.validate(session_id, path, method, presented, excluded_routes)
    }

    /// Verify the session record for `session_id`, deserializing it as `T`.
    pub async fn verify_session<T>(&self, session_id: &str) -> Result<T, Blame>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        self.sessions.verify(session_id).await
    }

    /// Verify a bearer token, refreshing it if it is close to expiry.
    /// Returns the claims plus a replacement token header value when a
    /// refresh happened.
    pub fn verify_bearer(
        &self,
        token: &str,
        expected_subject: &str,
        expected_audience: &str,
        expected_ip: &str,
    ) -> Result<(crate::context::TokenClaims, Option<String>), Blame> {
        let claims = self
            .paseto
            .verify(token, expected_subject, expected_audience, expected_ip)?;
        let refreshed = self.paseto.maybe_refresh(&claims)?;
        Ok((claims, refreshed))
    }

    /// Mint a fresh bearer token (used for inter-service admin tokens and
    /// initial session login).
    pub fn issue_bearer(&self, subject: &str, audience: &str, ip: &str, ttl: Duration) -> Result<String, Blame> {
        self.paseto.issue_for(subject, audience, ip, ttl)
    }
}
