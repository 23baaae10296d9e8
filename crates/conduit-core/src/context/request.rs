//! Per-request context: identity, correlation, claims and scoped logging.

use super::app::AppContext;
use super::claims::TokenClaims;
use crate::blame::{Blame, BlameCode, Component};
use crate::security::obfuscate_header;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// `X-Correlation-ID` header key, read on construction or generated if absent.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-ID";
/// `X-User-Id` header key.
pub const HEADER_USER_ID: &str = "X-User-Id";
/// `X-Org-Id` header key.
pub const HEADER_ORG_ID: &str = "X-Org-Id";
/// `X-Subject` header key.
pub const HEADER_SUBJECT: &str = "X-Subject";

/// Per-request bag carrying request-id, correlation-id, tenant/user identity,
/// token claims, and a handle to the shared [`AppContext`]. Constructed once
/// per inbound request or bus message; never shared across requests.
pub struct RequestContext {
    app: Arc<AppContext>,
    request_id: Uuid,
    correlation_id: String,
    session_id: Option<String>,
    headers: HashMap<String, String>,
    claims: Option<TokenClaims>,
}

impl RequestContext {
    /// Build a context from a lower-cased header map. Generates a fresh
    /// request-id (UUID v4); reads `X-Correlation-ID` or generates one if
    /// absent.
    pub fn from_headers(headers: HashMap<String, String>, app: Arc<AppContext>) -> Self {
        let correlation_id = headers
            .get(HEADER_CORRELATION_ID)
            .cloned()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            app,
            request_id: Uuid::new_v4(),
            correlation_id,
            session_id: None,
            headers,
            claims: None,
        }
    }

    /// The generated request-id.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The correlation-id, read from the request or freshly generated.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The shared application handles.
    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    /// Attach a session-id (set once the edge perimeter validates the
    /// session cookie).
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The bound session-id, if a session was resolved.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Attach verified PASETO claims.
    pub fn with_claims(mut self, claims: TokenClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// The verified token claims, if the edge perimeter attached any.
    pub fn claims(&self) -> Option<&TokenClaims> {
        self.claims.as_ref()
    }

    /// Read a header by name (case-sensitive, as stored).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The authenticated user-id, parsed as a UUID. Missing header ->
    /// `UserIdHeaderMissing`; unparsable -> `MalformedParameterError`.
    pub fn user_id(&self) -> Result<Uuid, Blame> {
        let raw = self.header(HEADER_USER_ID).ok_or_else(|| {
            Blame::new(BlameCode::UserIdHeaderMissing).with_component(Component::Controller)
        })?;
        Uuid::parse_str(raw).map_err(|e| {
            Blame::new(BlameCode::MalformedParameterError)
                .with_component(Component::Controller)
                .add_cause(e.to_string())
        })
    }

    /// The tenant/org-id, parsed as a UUID. Missing header ->
    /// `BusinessIdHeaderMissing`; unparsable -> `MalformedParameterError`.
    pub fn org_id(&self) -> Result<Uuid, Blame> {
        let raw = self.header(HEADER_ORG_ID).ok_or_else(|| {
            Blame::new(BlameCode::BusinessIdHeaderMissing).with_component(Component::Controller)
        })?;
        Uuid::parse_str(raw).map_err(|e| {
            Blame::new(BlameCode::MalformedParameterError)
                .with_component(Component::Controller)
                .add_cause(e.to_string())
        })
    }

    /// The logical action this request represents. Missing header ->
    /// `XSubjectHeaderMissing`.
    pub fn subject(&self) -> Result<&str, Blame> {
        self.header(HEADER_SUBJECT).ok_or_else(|| {
            Blame::new(BlameCode::XSubjectHeaderMissing).with_component(Component::Controller)
        })
    }

    /// Mask a header value before logging it, if its name is one of the
    /// well-known sensitive headers.
    pub fn sanitize_header(&self, name: &str, value: &str) -> String {
        if matches!(name.to_ascii_lowercase().as_str(), "x-csrf-token" | "x-paseto-token") {
            "***".to_string()
        } else {
            obfuscate_header(name, value)
        }
    }

    /// `debug!` with request-id/correlation-id/session-id automatically
    /// attached.
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            session_id = self.session_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }

    /// `info!` with request-id/correlation-id/session-id automatically
    /// attached.
    pub fn log_info(&self, message: &str) {
        tracing::info!(
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            session_id = self.session_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }

    /// `warn!` with request-id/correlation-id/session-id automatically
    /// attached.
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            session_id = self.session_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }

    /// `error!` with request-id/correlation-id/session-id automatically
    /// attached.
    pub fn log_error(&self, message: &str) {
        tracing::error!(
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            session_id = self.session_id.as_deref().unwrap_or(""),
            "{message}"
        );
    }
}

/// Extract a required header from a generic header map, independent of
/// request-context construction — used on the bus-handler side where a
/// correlation-id missing entirely (rather than absent-and-generated) is
/// itself an error.
pub fn require_correlation_id(headers: &HashMap<String, String>) -> Result<String, Blame> {
    headers.get(HEADER_CORRELATION_ID).cloned().ok_or_else(|| {
        Blame::new(BlameCode::CorrelationIdHeaderMissing).with_component(Component::Middlewares)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn app() -> Arc<AppContext> {
        Arc::new(AppContext::new(Arc::new(MemoryCache::new())))
    }

    #[test]
    fn generates_correlation_id_when_absent() {
        let ctx = RequestContext::from_headers(HashMap::new(), app());
        assert!(!ctx.correlation_id().is_empty());
    }

    #[test]
    fn reads_correlation_id_when_present() {
        let mut headers = HashMap::new();
        headers.insert(HEADER_CORRELATION_ID.to_string(), "c1".to_string());
        let ctx = RequestContext::from_headers(headers, app());
        assert_eq!(ctx.correlation_id(), "c1");
    }

    #[test]
    fn user_id_missing_header_is_blamed() {
        let ctx = RequestContext::from_headers(HashMap::new(), app());
        let err = ctx.user_id().unwrap_err();
        assert_eq!(err.code(), "E_USER_ID_HEADER_MISSING");
    }

    #[test]
    fn user_id_malformed_header_is_blamed() {
        let mut headers = HashMap::new();
        headers.insert(HEADER_USER_ID.to_string(), "not-a-uuid".to_string());
        let ctx = RequestContext::from_headers(headers, app());
        let err = ctx.user_id().unwrap_err();
        assert_eq!(err.code(), "E_MALFORMED_PARAMETER");
    }

    #[test]
    fn user_id_parses_valid_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HashMap::new();
        headers.insert(HEADER_USER_ID.to_string(), id.to_string());
        let ctx = RequestContext::from_headers(headers, app());
        assert_eq!(ctx.user_id().unwrap(), id);
    }

    #[test]
    fn sanitize_header_masks_sensitive_names_only() {
        let ctx = RequestContext::from_headers(HashMap::new(), app());
        assert_ne!(ctx.sanitize_header("Authorization", "Bearer abc123"), "Bearer abc123");
        assert_eq!(ctx.sanitize_header("X-Subject", "do-thing"), "do-thing");
    }

    #[test]
    fn require_correlation_id_errors_when_absent() {
        let err = require_correlation_id(&HashMap::new()).unwrap_err();
        assert_eq!(err.code(), "E_CORRELATION_ID_HEADER_MISSING");
    }
}
