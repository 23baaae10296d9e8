//! Stable, translatable error values with component tag, response-type
//! classification, cause chain and HTTP-status mapping.
//!
//! Generalizes the classic "error enum with a `status_code()` method" idiom
//! into a composable sum type: a [`Blame`] is built with
//! `Blame::new(code).with_component(c).add_cause(e)` and carries everything
//! needed to answer a caller over HTTP, over the bus, or in a structured log.

use std::collections::HashMap;
use std::fmt;

/// Classification used to map a blame onto an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// 400.
    BadRequest,
    /// 401.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 409.
    AlreadyExists,
    /// 429.
    TooManyRequests,
    /// 500.
    InternalServerError,
}

impl ResponseType {
    /// The HTTP status this response-type maps onto.
    pub fn http_status(&self) -> u16 {
        match self {
            ResponseType::BadRequest => 400,
            ResponseType::Unauthorized => 401,
            ResponseType::Forbidden => 403,
            ResponseType::NotFound => 404,
            ResponseType::AlreadyExists => 409,
            ResponseType::TooManyRequests => 429,
            ResponseType::InternalServerError => 500,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseType::BadRequest => "BadRequest",
            ResponseType::Unauthorized => "Unauthorized",
            ResponseType::Forbidden => "Forbidden",
            ResponseType::NotFound => "NotFound",
            ResponseType::AlreadyExists => "AlreadyExists",
            ResponseType::TooManyRequests => "TooManyRequests",
            ResponseType::InternalServerError => "InternalServerError",
        };
        write!(f, "{s}")
    }
}

/// The architectural layer a blame originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// A business service.
    Service,
    /// A domain model.
    Model,
    /// An external adapter (db, storage, email, secrets...).
    Adapters,
    /// A middleware in the chain.
    Middlewares,
    /// An HTTP controller.
    Controller,
    /// Cross-cutting application wiring.
    Application,
    /// A shared library.
    Library,
    /// A utility function.
    Utils,
    /// The orchestration engine.
    Engine,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::Service => "service",
            Component::Model => "model",
            Component::Adapters => "adapters",
            Component::Middlewares => "middlewares",
            Component::Controller => "controller",
            Component::Application => "application",
            Component::Library => "library",
            Component::Utils => "utils",
            Component::Engine => "engine",
        };
        write!(f, "{s}")
    }
}

/// Stable error-code identifiers, one per blame kind enumerated in the error
/// handling design: transport, encoding, workflow, auth, validation and
/// runtime kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlameCode {
    /// Publishing a message to the broker failed.
    PublishMessageError,
    /// Subscribing to a subject failed.
    SubscribeToSubjectError,
    /// Unsubscribing from a subject failed.
    UnsubscribeFailedError,
    /// The broker connection is down.
    ConnectionFailed,
    /// Encoding a value for the wire failed.
    MarshalError,
    /// Decoding a value from the wire failed.
    UnMarshalError,
    /// A payload could not be converted to the expected type.
    TypeConversionError,
    /// No service definition registered under the requested name.
    ServiceDefinitionNotFound,
    /// The resolved service definition is not active.
    InactiveService,
    /// A workflow step was invoked with no payload.
    RequestPayloadNil,
    /// Minting the inter-service auth token failed.
    CreateTokenFailed,
    /// The request carries no `Authorization` credential.
    MissingAuthCredential,
    /// The bearer token is malformed or fails validation.
    MalformedAuthToken,
    /// An expected header set is entirely absent.
    HeadersNotFound,
    /// The session record failed to deserialize or validate.
    SessionMalformed,
    /// No session record exists for the presented session-id.
    SessionNotFound,
    /// A required parameter is missing.
    MissingParameterError,
    /// A parameter is present but malformed.
    MalformedParameterError,
    /// The `X-Org-Id` (business-id) header is missing.
    BusinessIdHeaderMissing,
    /// The `X-User-Id` header is missing.
    UserIdHeaderMissing,
    /// The `X-Correlation-ID` header is missing.
    CorrelationIdHeaderMissing,
    /// The `X-Subject` header is missing.
    XSubjectHeaderMissing,
    /// An unclassified internal failure.
    InternalServerError,
    /// The circuit breaker is open; the call was not attempted.
    CircuitOpen,
    /// Generic 400 classification not tied to a specific validation rule.
    BadRequest,
    /// Generic 403 classification.
    Forbidden,
    /// Generic 404 classification.
    NotFound,
    /// Generic 409 classification.
    AlreadyExists,
    /// Generic 401 classification.
    Unauthorized,
    /// The per-client request rate limit was exceeded.
    RateLimitExceeded,
    /// A CSRF token was required but absent.
    CsrfTokenMissing,
    /// The presented CSRF token does not match the stored one.
    CsrfTokenMismatch,
}

impl BlameCode {
    /// The stable wire identifier for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlameCode::PublishMessageError => "E_PUBLISH_MESSAGE",
            BlameCode::SubscribeToSubjectError => "E_SUBSCRIBE_SUBJECT",
            BlameCode::UnsubscribeFailedError => "E_UNSUBSCRIBE_FAILED",
            BlameCode::ConnectionFailed => "E_CONNECTION_FAILED",
            BlameCode::MarshalError => "E_MARSHAL",
            BlameCode::UnMarshalError => "E_UNMARSHAL",
            BlameCode::TypeConversionError => "E_TYPE_CONVERSION",
            BlameCode::ServiceDefinitionNotFound => "E_SERVICE_DEFINITION_NOT_FOUND",
            BlameCode::InactiveService => "E_INACTIVE_SERVICE",
            BlameCode::RequestPayloadNil => "E_REQUEST_PAYLOAD_NIL",
            BlameCode::CreateTokenFailed => "E_CREATE_TOKEN_FAILED",
            BlameCode::MissingAuthCredential => "E_MISSING_AUTH_CREDENTIAL",
            BlameCode::MalformedAuthToken => "E_MALFORMED_AUTH_TOKEN",
            BlameCode::HeadersNotFound => "E_HEADERS_NOT_FOUND",
            BlameCode::SessionMalformed => "E_SESSION_MALFORMED",
            BlameCode::SessionNotFound => "E_SESSION_NOT_FOUND",
            BlameCode::MissingParameterError => "E_MISSING_PARAMETER",
            BlameCode::MalformedParameterError => "E_MALFORMED_PARAMETER",
            BlameCode::BusinessIdHeaderMissing => "E_BUSINESS_ID_HEADER_MISSING",
            BlameCode::UserIdHeaderMissing => "E_USER_ID_HEADER_MISSING",
            BlameCode::CorrelationIdHeaderMissing => "E_CORRELATION_ID_HEADER_MISSING",
            BlameCode::XSubjectHeaderMissing => "E_X_SUBJECT_HEADER_MISSING",
            BlameCode::InternalServerError => "E_INTERNAL_SERVER",
            BlameCode::CircuitOpen => "E_CIRCUIT_OPEN",
            BlameCode::BadRequest => "E_BAD_REQUEST",
            BlameCode::Forbidden => "E_FORBIDDEN",
            BlameCode::NotFound => "E_NOT_FOUND",
            BlameCode::AlreadyExists => "E_ALREADY_EXISTS",
            BlameCode::Unauthorized => "E_UNAUTHORIZED",
            BlameCode::RateLimitExceeded => "E_RATE_LIMIT_EXCEEDED",
            BlameCode::CsrfTokenMissing => "E_CSRF_TOKEN_MISSING",
            BlameCode::CsrfTokenMismatch => "E_CSRF_TOKEN_MISMATCH",
        }
    }

    /// `true` iff a failure of this kind is worth retrying via broker
    /// redelivery (NAK). Auth/validation failures are never retryable (ACK to
    /// stop redelivery of a message that will fail identically every time).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BlameCode::MissingAuthCredential
                | BlameCode::MalformedAuthToken
                | BlameCode::HeadersNotFound
                | BlameCode::SessionMalformed
                | BlameCode::SessionNotFound
                | BlameCode::MissingParameterError
                | BlameCode::MalformedParameterError
                | BlameCode::BusinessIdHeaderMissing
                | BlameCode::UserIdHeaderMissing
                | BlameCode::CorrelationIdHeaderMissing
                | BlameCode::XSubjectHeaderMissing
                | BlameCode::UnMarshalError
                | BlameCode::TypeConversionError
                | BlameCode::Unauthorized
                | BlameCode::Forbidden
                | BlameCode::BadRequest
                | BlameCode::RateLimitExceeded
                | BlameCode::CsrfTokenMissing
                | BlameCode::CsrfTokenMismatch
        )
    }

    /// The response-type this code maps onto by default. Callers may still
    /// override via [`Blame::with_response_type`].
    pub fn default_response_type(&self) -> ResponseType {
        match self {
            BlameCode::MissingAuthCredential
            | BlameCode::MalformedAuthToken
            | BlameCode::SessionNotFound
            | BlameCode::Unauthorized => ResponseType::Unauthorized,
            BlameCode::SessionMalformed
            | BlameCode::CircuitOpen
            | BlameCode::Forbidden
            | BlameCode::CsrfTokenMismatch => ResponseType::Forbidden,
            BlameCode::RateLimitExceeded => ResponseType::TooManyRequests,
            BlameCode::ServiceDefinitionNotFound
            | BlameCode::HeadersNotFound
            | BlameCode::NotFound => ResponseType::NotFound,
            BlameCode::AlreadyExists => ResponseType::AlreadyExists,
            BlameCode::RequestPayloadNil
            | BlameCode::MissingParameterError
            | BlameCode::MalformedParameterError
            | BlameCode::BusinessIdHeaderMissing
            | BlameCode::UserIdHeaderMissing
            | BlameCode::CorrelationIdHeaderMissing
            | BlameCode::XSubjectHeaderMissing
            | BlameCode::UnMarshalError
            | BlameCode::TypeConversionError
            | BlameCode::BadRequest
            | BlameCode::CsrfTokenMissing => ResponseType::BadRequest,
            BlameCode::PublishMessageError
            | BlameCode::SubscribeToSubjectError
            | BlameCode::UnsubscribeFailedError
            | BlameCode::ConnectionFailed
            | BlameCode::MarshalError
            | BlameCode::InactiveService
            | BlameCode::CreateTokenFailed
            | BlameCode::InternalServerError => ResponseType::InternalServerError,
        }
    }
}

impl fmt::Display for BlameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured error value with a stable code, component tag, response-type,
/// ordered cause chain and locale translations.
#[derive(Debug, Clone)]
pub struct Blame {
    code: BlameCode,
    /// Overrides `code.as_str()` when this blame was reconstructed from an
    /// [`ErrorResponse`] carrying a code not owned by this process (e.g. a
    /// remote service's reply over the bus).
    wire_code: Option<String>,
    component: Option<Component>,
    response_type: ResponseType,
    message: String,
    causes: Vec<String>,
    translations: HashMap<String, String>,
}

impl Blame {
    /// Start building a blame from a stable code.
    pub fn new(code: BlameCode) -> Self {
        let response_type = code.default_response_type();
        Self {
            code,
            wire_code: None,
            component: None,
            response_type,
            message: code.as_str().to_string(),
            causes: Vec::new(),
            translations: HashMap::new(),
        }
    }

    /// Reconstruct a blame from an [`ErrorResponse`] received over the wire
    /// (e.g. a remote service's reply on a saga step). The resulting blame's
    /// `code()` reflects the remote's stable code rather than a local
    /// [`BlameCode`] variant; `code_kind()` still reports
    /// [`BlameCode::InternalServerError`] as a best-effort local
    /// classification.
    pub fn from_error_response(response: ErrorResponse) -> Self {
        Self {
            code: BlameCode::InternalServerError,
            wire_code: Some(response.code),
            component: response.component,
            response_type: response.response_type,
            message: response.message,
            causes: response.causes,
            translations: response.translations,
        }
    }

    /// Attach the originating component.
    pub fn with_component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    /// Override the response-type classification (and therefore HTTP status).
    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Override the human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Append a cause to the ordered cause chain.
    pub fn add_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Attach a translated message for a locale.
    pub fn with_translation(mut self, locale: impl Into<String>, message: impl Into<String>) -> Self {
        self.translations.insert(locale.into(), message.into());
        self
    }

    /// The stable wire code.
    pub fn code(&self) -> &str {
        self.wire_code.as_deref().unwrap_or_else(|| self.code.as_str())
    }

    /// The blame code enum value.
    pub fn code_kind(&self) -> BlameCode {
        self.code
    }

    /// The originating component, if set.
    pub fn component(&self) -> Option<Component> {
        self.component
    }

    /// The response-type classification.
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// The HTTP status this blame maps onto.
    pub fn http_status(&self) -> u16 {
        self.response_type.http_status()
    }

    /// The ordered cause chain.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Render an [`ErrorResponse`] suitable for wire transmission, optionally
    /// substituting the translated message for `locale` when present.
    pub fn fetch_error_response(&self, locale: Option<&str>) -> ErrorResponse {
        let message = locale
            .and_then(|l| self.translations.get(l))
            .cloned()
            .unwrap_or_else(|| self.message.clone());

        ErrorResponse {
            code: self.code().to_string(),
            response_type: self.response_type,
            component: self.component,
            message,
            causes: self.causes.clone(),
            translations: self.translations.clone(),
        }
    }

    /// Flatten this blame into a plain error carrying the primary cause.
    pub fn error_from_blame(&self) -> BlameError {
        BlameError {
            code: self.code().to_string(),
            message: self
                .causes
                .first()
                .cloned()
                .unwrap_or_else(|| self.message.clone()),
        }
    }

    /// The sentinel blame produced when a programmer mistakenly casts a
    /// success into a failure.
    pub fn sentinel_cast_error() -> Self {
        Blame::new(BlameCode::InternalServerError)
            .with_component(Component::Library)
            .with_message("attempted to cast a success result into a failure")
    }
}

impl fmt::Display for Blame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for Blame {}

/// Flat error value carrying only the stable code and primary cause.
#[derive(Debug, Clone)]
pub struct BlameError {
    code: String,
    message: String,
}

impl fmt::Display for BlameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for BlameError {}

/// Wire-transmittable error payload. Mirrors the message envelope's `error`
/// field.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Stable error-code identifier.
    pub code: String,
    /// Response-type classification.
    #[serde(with = "response_type_serde")]
    pub response_type: ResponseType,
    /// Originating component.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
    /// Human-readable message.
    pub message: String,
    /// Ordered list of causes.
    pub causes: Vec<String>,
    /// Locale -> translated message.
    pub translations: HashMap<String, String>,
}

// serde::Serialize/Deserialize for Component and ResponseType without pulling
// in serde derive machinery on simple C-like enums.
mod response_type_serde {
    use super::ResponseType;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(rt: &ResponseType, s: S) -> Result<S::Ok, S::Error> {
        rt.to_string().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ResponseType, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_str() {
            "BadRequest" => Ok(ResponseType::BadRequest),
            "Unauthorized" => Ok(ResponseType::Unauthorized),
            "Forbidden" => Ok(ResponseType::Forbidden),
            "NotFound" => Ok(ResponseType::NotFound),
            "AlreadyExists" => Ok(ResponseType::AlreadyExists),
            "TooManyRequests" => Ok(ResponseType::TooManyRequests),
            _ => Ok(ResponseType::InternalServerError),
        }
    }
}

impl serde::Serialize for Component {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Component {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "service" => Component::Service,
            "model" => Component::Model,
            "adapters" => Component::Adapters,
            "middlewares" => Component::Middlewares,
            "controller" => Component::Controller,
            "application" => Component::Application,
            "library" => Component::Library,
            "utils" => Component::Utils,
            _ => Component::Engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ResponseType::BadRequest.http_status(), 400);
        assert_eq!(ResponseType::Unauthorized.http_status(), 401);
        assert_eq!(ResponseType::Forbidden.http_status(), 403);
        assert_eq!(ResponseType::NotFound.http_status(), 404);
        assert_eq!(ResponseType::AlreadyExists.http_status(), 409);
        assert_eq!(ResponseType::InternalServerError.http_status(), 500);
    }

    #[test]
    fn blame_builder_composes() {
        let blame = Blame::new(BlameCode::ServiceDefinitionNotFound)
            .with_component(Component::Engine)
            .add_cause("no definition registered for svc")
            .with_translation("es", "definicion de servicio no encontrada");

        assert_eq!(blame.code(), "E_SERVICE_DEFINITION_NOT_FOUND");
        assert_eq!(blame.component(), Some(Component::Engine));
        assert_eq!(blame.http_status(), 404);
        assert_eq!(blame.causes().len(), 1);
    }

    #[test]
    fn fetch_error_response_uses_translation_when_present() {
        let blame = Blame::new(BlameCode::InactiveService)
            .with_message("service is inactive")
            .with_translation("fr", "le service est inactif");

        let default = blame.fetch_error_response(None);
        assert_eq!(default.message, "service is inactive");

        let french = blame.fetch_error_response(Some("fr"));
        assert_eq!(french.message, "le service est inactif");

        let missing_locale = blame.fetch_error_response(Some("de"));
        assert_eq!(missing_locale.message, "service is inactive");
    }

    #[test]
    fn error_from_blame_prefers_primary_cause() {
        let blame = Blame::new(BlameCode::CircuitOpen)
            .add_cause("breaker open for payments")
            .add_cause("retry after 30s");

        let err = blame.error_from_blame();
        assert_eq!(err.to_string(), "[E_CIRCUIT_OPEN] breaker open for payments");
    }

    #[test]
    fn default_response_types_match_code_family() {
        assert_eq!(
            Blame::new(BlameCode::MissingAuthCredential).http_status(),
            401
        );
        assert_eq!(Blame::new(BlameCode::CircuitOpen).http_status(), 403);
        assert_eq!(
            Blame::new(BlameCode::ServiceDefinitionNotFound).http_status(),
            404
        );
        assert_eq!(Blame::new(BlameCode::InternalServerError).http_status(), 500);
    }
}
