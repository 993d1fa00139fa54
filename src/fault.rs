//! Request-level failure taxonomy.
//!
//! Anything that aborts a request after routing is a [`Fault`]. Handlers and
//! context operations return `Result<_, Fault>` and propagate with `?`; a
//! panic raised anywhere below the handler is caught and reclassified with
//! [`Fault::from_panic`]. Either way the fault ends up at exactly one place,
//! the request's [`Recovery`](crate::recovery::Recovery), which turns it into
//! an error envelope.
//!
//! | Shape | Status | Envelope message |
//! |---|---|---|
//! | plain string | 500 | the string |
//! | [`HttpError`] | carried | carried |
//! | any other error | 500 | the error's `Display` |
//! | unrecognized panic payload | 500 | `"unrecognized fault"` |

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::codec::DecodeError;

/// A boxed, thread-safe error of any type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message placed in the envelope for panic payloads of unknown shape.
pub(crate) const UNRECOGNIZED_MESSAGE: &str = "unrecognized fault";

// ── HttpError ─────────────────────────────────────────────────────────────────

/// A failure that knows exactly which status and message the caller should see.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }

    /// Aborts the current request from any call depth.
    ///
    /// Unwinds with `self` as the panic payload. The request's recovery point
    /// catches it and answers with this status and message, so code that
    /// cannot return a `Result` can still short-circuit cleanly.
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }
}

impl From<DecodeError> for HttpError {
    fn from(err: DecodeError) -> Self {
        Self::bad_request(err.to_string())
    }
}

// ── Fault ─────────────────────────────────────────────────────────────────────

/// What kind of failure aborted a request.
#[derive(Debug, Error)]
pub enum FaultKind {
    /// A plain descriptive message. Reported as a 500.
    #[error("{0}")]
    Message(String),

    /// A structured error carrying its own status.
    #[error(transparent)]
    Http(HttpError),

    /// Any other error value. Reported as a 500.
    #[error(transparent)]
    Other(BoxError),

    /// A panic payload of no known shape. Reported as a generic 500.
    #[error("unrecognized fault: {0}")]
    Unrecognized(String),
}

/// Why a request was aborted, and where.
///
/// The backtrace is taken when the fault is built: at the `?` or
/// constructor call for returned faults, at the panic site for contained
/// panics. A handler returning `Result<(), E>` with a non-`Fault` `E` is
/// converted after it returns, so its backtrace starts at the handler
/// boundary instead.
#[derive(Debug)]
pub struct Fault {
    kind: FaultKind,
    backtrace: Backtrace,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Self { kind, backtrace: Backtrace::force_capture() }
    }

    pub(crate) fn with_backtrace(kind: FaultKind, backtrace: Backtrace) -> Self {
        Self { kind, backtrace }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Message(message.into()))
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::new(FaultKind::Other(err.into()))
    }

    pub fn kind(&self) -> &FaultKind {
        &self.kind
    }

    pub fn into_kind(self) -> FaultKind {
        self.kind
    }

    /// Where the fault was raised.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Classifies a caught panic payload.
    ///
    /// Precedence: string message, then `HttpError` by value or boxed, then a
    /// `Fault` raised as-is, then a boxed error value. Anything else becomes
    /// [`FaultKind::Unrecognized`].
    ///
    /// The backtrace is captured here; use this only when the panic site is
    /// no longer known.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::from_panic_at(payload, None)
    }

    /// Like [`from_panic`](Self::from_panic), with the backtrace recorded
    /// when the panic was raised.
    pub(crate) fn from_panic_at(payload: Box<dyn Any + Send>, site: Option<Backtrace>) -> Self {
        let payload = match payload.downcast::<Fault>() {
            Ok(fault) => return *fault,
            Err(payload) => payload,
        };
        let kind = classify(payload);
        match site {
            Some(backtrace) => Self::with_backtrace(kind, backtrace),
            None => Self::new(kind),
        }
    }

    /// Status reported to the caller.
    pub fn status(&self) -> StatusCode {
        match &self.kind {
            FaultKind::Http(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the error envelope.
    pub fn envelope_message(&self) -> String {
        match &self.kind {
            FaultKind::Message(text) => text.clone(),
            FaultKind::Http(err) => err.message().to_owned(),
            FaultKind::Other(err) => err.to_string(),
            FaultKind::Unrecognized(_) => UNRECOGNIZED_MESSAGE.to_owned(),
        }
    }

    /// True when the caller sent something invalid.
    pub fn is_client_fault(&self) -> bool {
        self.status().is_client_error()
    }
}

fn classify(payload: Box<dyn Any + Send>) -> FaultKind {
    let payload = match payload.downcast::<&'static str>() {
        Ok(text) => return FaultKind::Message((*text).to_owned()),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<String>() {
        Ok(text) => return FaultKind::Message(*text),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<HttpError>() {
        Ok(err) => return FaultKind::Http(*err),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<Box<HttpError>>() {
        Ok(err) => return FaultKind::Http(**err),
        Err(payload) => payload,
    };
    match payload.downcast::<BoxError>() {
        Ok(err) => FaultKind::Other(*err),
        Err(payload) => FaultKind::Unrecognized(format!("{:?}", (*payload).type_id())),
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<FaultKind> for Fault {
    fn from(kind: FaultKind) -> Self { Self::new(kind) }
}

impl From<HttpError> for Fault {
    fn from(err: HttpError) -> Self { Self::new(FaultKind::Http(err)) }
}

impl From<DecodeError> for Fault {
    fn from(err: DecodeError) -> Self { Self::new(FaultKind::Http(err.into())) }
}

impl From<BoxError> for Fault {
    fn from(err: BoxError) -> Self { Self::new(FaultKind::Other(err)) }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self { Self::new(FaultKind::Other(err.into())) }
}

impl From<&str> for Fault {
    fn from(text: &str) -> Self { Self::message(text) }
}

impl From<String> for Fault {
    fn from(text: String) -> Self { Self::message(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caught(f: impl FnOnce() + std::panic::UnwindSafe) -> Fault {
        let payload = std::panic::catch_unwind(f).expect_err("closure should panic");
        Fault::from_panic(payload)
    }

    #[test]
    fn static_str_panic_is_a_message() {
        let fault = caught(|| panic!("boom"));
        assert!(matches!(fault.kind(), FaultKind::Message(m) if m == "boom"));
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope_message(), "boom");
    }

    #[test]
    fn formatted_panic_is_a_message() {
        let id = 9;
        let fault = caught(move || panic!("user {id} vanished"));
        assert_eq!(fault.envelope_message(), "user 9 vanished");
    }

    #[test]
    fn raised_http_error_keeps_status_and_message() {
        let fault = caught(|| {
            HttpError::forbidden("forbidden").raise();
        });
        assert_eq!(fault.status(), StatusCode::FORBIDDEN);
        assert_eq!(fault.envelope_message(), "forbidden");
        assert!(fault.is_client_fault());
    }

    #[test]
    fn boxed_http_error_is_unwrapped() {
        let fault = caught(|| std::panic::panic_any(Box::new(HttpError::not_found("gone"))));
        assert_eq!(fault.status(), StatusCode::NOT_FOUND);
        assert_eq!(fault.envelope_message(), "gone");
    }

    #[test]
    fn boxed_error_is_a_server_fault() {
        let fault = caught(|| {
            let err: BoxError = std::io::Error::other("disk on fire").into();
            std::panic::panic_any(err)
        });
        assert!(matches!(fault.kind(), FaultKind::Other(_)));
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope_message(), "disk on fire");
    }

    #[test]
    fn unknown_payload_falls_back_to_generic_500() {
        let fault = caught(|| std::panic::panic_any(42_u64));
        assert!(matches!(fault.kind(), FaultKind::Unrecognized(_)));
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope_message(), UNRECOGNIZED_MESSAGE);
    }

    #[test]
    fn decode_errors_are_client_faults() {
        let fault: Fault = DecodeError::EmptyBody.into();
        assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
        assert!(fault.envelope_message().contains("empty"));
    }

    #[test]
    fn anyhow_errors_convert() {
        let fault: Fault = anyhow::anyhow!("upstream timed out").into();
        assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.envelope_message(), "upstream timed out");
    }

    #[test]
    fn raised_fault_is_passed_through() {
        let fault = caught(|| std::panic::panic_any(Fault::message("already classified")));
        assert_eq!(fault.envelope_message(), "already classified");
    }

    #[inline(never)]
    fn build_fault_in_named_frame() -> Fault {
        Fault::message("disk full")
    }

    #[test]
    fn returned_fault_remembers_where_it_was_built() {
        let fault = build_fault_in_named_frame();
        assert!(fault.backtrace().to_string().contains("build_fault_in_named_frame"));
    }
}
