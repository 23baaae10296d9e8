//! Sum-type result value returned by every layer of the core.
//!
//! [`ResultEnvelope`] has three variants — success, failure-with-blame, and
//! redirect — and is the uniform return type from bus handlers, orchestration
//! steps and HTTP handlers alike.

use crate::blame::Blame;

/// Sum type with three variants: success, failure, or redirect.
///
/// Mirrors the contract in the component design: `IsSuccess` holds iff the
/// variant is `Success`; `value()` yields `(value, None)` on success and
/// `(partial, Some(blame))` on failure; `redirect()` yields `Some(url)` only
/// when a non-blank redirect URL is attached.
#[derive(Debug, Clone)]
pub enum ResultEnvelope<T> {
    /// The operation succeeded.
    Success {
        /// The produced value.
        value: T,
        /// Optional redirect target attached to an otherwise successful
        /// response.
        redirect_url: Option<String>,
    },
    /// The operation failed.
    Failure {
        /// A partial value, when one is available despite the failure.
        value: Option<T>,
        /// The blame describing the failure.
        blame: Blame,
        /// Optional redirect target (e.g. to a login page).
        redirect_url: Option<String>,
    },
}

impl<T> ResultEnvelope<T> {
    /// Build a plain success.
    pub fn success(value: T) -> Self {
        ResultEnvelope::Success {
            value,
            redirect_url: None,
        }
    }

    /// Build a success carrying a redirect URL.
    pub fn success_with_redirect(value: T, redirect_url: impl Into<String>) -> Self {
        ResultEnvelope::Success {
            value,
            redirect_url: Some(redirect_url.into()),
        }
    }

    /// Build a plain failure.
    pub fn failure(blame: Blame) -> Self {
        ResultEnvelope::Failure {
            value: None,
            blame,
            redirect_url: None,
        }
    }

    /// Build a failure that still carries a partial value.
    pub fn failure_with_value(value: T, blame: Blame) -> Self {
        ResultEnvelope::Failure {
            value: Some(value),
            blame,
            redirect_url: None,
        }
    }

    /// Build a failure that redirects the caller (e.g. unauthenticated to login).
    pub fn failure_with_redirect(blame: Blame, redirect_url: impl Into<String>) -> Self {
        ResultEnvelope::Failure {
            value: None,
            blame,
            redirect_url: Some(redirect_url.into()),
        }
    }

    /// `true` iff this is the `Success` variant.
    pub fn is_success(&self) -> bool {
        matches!(self, ResultEnvelope::Success { .. })
    }

    /// `true` iff this is the `Failure` variant.
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns `(value, None)` on success, `(partial, Some(blame))` on failure.
    pub fn value(self) -> (Option<T>, Option<Blame>) {
        match self {
            ResultEnvelope::Success { value, .. } => (Some(value), None),
            ResultEnvelope::Failure { value, blame, .. } => (value, Some(blame)),
        }
    }

    /// Returns the redirect URL, if any non-blank one is attached.
    pub fn redirect(&self) -> Option<&str> {
        let url = match self {
            ResultEnvelope::Success { redirect_url, .. } => redirect_url.as_deref(),
            ResultEnvelope::Failure { redirect_url, .. } => redirect_url.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }

    /// Returns the blame, if this is a failure.
    pub fn blame(&self) -> Option<&Blame> {
        match self {
            ResultEnvelope::Success { .. } => None,
            ResultEnvelope::Failure { blame, .. } => Some(blame),
        }
    }

    /// Build an envelope from a plain `Result`, mapping `Ok` to success and
    /// `Err` to failure. Never manufactures a blame out of a success.
    pub fn from_result(result: Result<T, Blame>) -> Self {
        match result {
            Ok(value) => ResultEnvelope::success(value),
            Err(blame) => ResultEnvelope::failure(blame),
        }
    }

    /// Cast the success value to a different type while preserving a failure's
    /// blame. Calling this on a `Success` variant is a programmer error: it
    /// cannot manufacture a blame, so it returns a sentinel
    /// [`crate::blame::BlameCode::InternalServerError`] failure instead of
    /// silently fabricating a value.
    pub fn cast_failure<U>(self) -> ResultEnvelope<U> {
        match self {
            ResultEnvelope::Failure {
                blame,
                redirect_url,
                ..
            } => ResultEnvelope::Failure {
                value: None,
                blame,
                redirect_url,
            },
            ResultEnvelope::Success { .. } => ResultEnvelope::Failure {
                value: None,
                blame: Blame::sentinel_cast_error(),
                redirect_url: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::{BlameCode, Component};

    #[test]
    fn success_laws() {
        let r = ResultEnvelope::success(42);
        assert!(r.is_success());
        let (value, blame) = r.value();
        assert_eq!(value, Some(42));
        assert!(blame.is_none());
    }

    #[test]
    fn failure_laws() {
        let blame = Blame::new(BlameCode::NotFound).with_component(Component::Service);
        let r: ResultEnvelope<i32> = ResultEnvelope::failure(blame.clone());
        assert!(r.is_failure());
        let (value, returned_blame) = r.value();
        assert!(value.is_none());
        assert_eq!(returned_blame.unwrap().code(), blame.code());
    }

    #[test]
    fn from_result_roundtrip() {
        let ok: ResultEnvelope<i32> = ResultEnvelope::from_result(Ok(1));
        assert!(ok.is_success());

        let blame = Blame::new(BlameCode::InternalServerError);
        let err: ResultEnvelope<i32> = ResultEnvelope::from_result(Err(blame));
        assert!(err.is_failure());
    }

    #[test]
    fn redirect_only_when_non_blank() {
        let r = ResultEnvelope::success_with_redirect(1, "/login");
        assert_eq!(r.redirect(), Some("/login"));

        let r2 = ResultEnvelope::success_with_redirect(1, "");
        assert_eq!(r2.redirect(), None);
    }

    #[test]
    fn cast_failure_preserves_blame() {
        let blame = Blame::new(BlameCode::Forbidden);
        let r: ResultEnvelope<i32> = ResultEnvelope::failure(blame);
        let casted: ResultEnvelope<String> = r.cast_failure();
        assert!(casted.is_failure());
        assert_eq!(casted.blame().unwrap().code(), "E_FORBIDDEN");
    }

    #[test]
    fn cast_failure_on_success_yields_sentinel() {
        let r: ResultEnvelope<i32> = ResultEnvelope::success(1);
        let casted: ResultEnvelope<String> = r.cast_failure();
        assert!(casted.is_failure());
    }
}
