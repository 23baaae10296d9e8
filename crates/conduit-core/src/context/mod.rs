//! Request-context model: application-wide handles, per-request identity,
//! correlation, token claims, and scoped structured logging.

mod app;
mod claims;
mod request;

pub use app::AppContext;
pub use claims::{now_unix, TokenClaims};
pub use request::{
    require_correlation_id, RequestContext, HEADER_CORRELATION_ID, HEADER_ORG_ID,
    HEADER_SUBJECT, HEADER_USER_ID,
};
