//! Unified error type.
//!
//! Everything a middleware can fail with is an [`Error`]. The request
//! coordinator turns any error that escapes the pipeline into exactly one
//! response (or a documented no-write outcome) and reports it to the
//! application's error sink.
//!
//! Status-carrying errors are built with [`HttpError`]:
//!
//! ```rust
//! use shallot::{Error, HttpError};
//!
//! let err: Error = HttpError::new(400).with_message("name required").into();
//! assert_eq!(err.status(), 400);
//! assert!(err.expose());
//! ```

use std::any::Any;
use std::fmt;
use std::net::AddrParseError;

use http::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName, InvalidHeaderValue};
use http::StatusCode;

/// A boxed, thread-safe error used for bodies and foreign failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type of every fallible operation in shallot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error carrying an HTTP status, raised by application code.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A middleware invoked its continuation more than once.
    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    /// A middleware panicked. The payload text is preserved.
    #[error("middleware panicked: {0}")]
    Panic(String),

    /// The connection went away before the response was complete.
    #[error("request aborted before the response completed")]
    Aborted,

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),

    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("invalid uri: {0}")]
    InvalidUriParts(#[from] http::uri::InvalidUriParts),

    /// A value could not be encoded as a query string.
    #[error("query: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    /// A status code outside `100..=999`.
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] AddrParseError),

    /// Invalid process configuration.
    #[error("config: {0}")]
    Config(String),

    /// Any other failure, including non-error values normalized by [`Error::msg`].
    #[error("{0}")]
    Other(BoxError),
}

impl Error {
    /// Normalizes an arbitrary displayable value into a generic error.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Other(message.to_string().into())
    }

    /// Converts a caught panic payload into [`Error::Panic`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panic(text)
    }

    /// The status this error maps to when it reaches the client.
    ///
    /// A missing file or resource (`io::ErrorKind::NotFound`) maps to 404.
    /// The value may be an unrecognized code. The error handler normalizes
    /// those to 500.
    pub fn status(&self) -> u16 {
        match self {
            Self::Http(e) => e.status,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => 404,
            _ => 500,
        }
    }

    /// Whether the message is safe to show to the client.
    pub fn expose(&self) -> bool {
        matches!(self, Self::Http(e) if e.expose)
    }

    /// Extra headers the error asks to send with its response.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Http(e) => Some(&e.headers),
            _ => None,
        }
    }
}

/// Boxed errors keep their meaning: a boxed [`HttpError`] still carries its
/// status and a boxed `io::Error` still maps `NotFound` to 404.
impl From<BoxError> for Error {
    fn from(e: BoxError) -> Self {
        let e = match e.downcast::<HttpError>() {
            Ok(http) => return Self::Http(*http),
            Err(e) => e,
        };
        let e = match e.downcast::<Error>() {
            Ok(err) => return *err,
            Err(e) => e,
        };
        match e.downcast::<std::io::Error>() {
            Ok(io) => Self::Io(*io),
            Err(e) => Self::Other(e),
        }
    }
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error with an HTTP status, an exposure flag and optional headers.
///
/// `expose` defaults to `true` for client errors (`status < 500`) and `false`
/// otherwise. The message defaults to the status's reason phrase.
#[derive(Debug)]
pub struct HttpError {
    status: u16,
    message: String,
    expose: bool,
    headers: HeaderMap,
    source: Option<BoxError>,
}

impl HttpError {
    pub fn new(status: u16) -> Self {
        let message = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown error")
            .to_owned();
        Self {
            status,
            message,
            expose: status < 500,
            headers: HeaderMap::new(),
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Adds a header that the error response will carry.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> u16 { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn expose(&self) -> bool { self.expose }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_exposed_by_default() {
        let err = HttpError::new(422);
        assert!(err.expose());
        assert_eq!(err.message(), "Unprocessable Entity");

        let err = HttpError::new(503);
        assert!(!err.expose());
    }

    #[test]
    fn io_not_found_maps_to_404() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert_eq!(err.status(), 404);
        assert!(!err.expose());
    }

    #[test]
    fn boxed_errors_keep_their_status() {
        let boxed: BoxError = Box::new(HttpError::new(400).with_message("bad id"));
        let err = Error::from(boxed);
        assert_eq!(err.status(), 400);
        assert!(err.expose());
        assert_eq!(err.to_string(), "bad id");

        let boxed: BoxError = Box::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(Error::from(boxed).status(), 404);

        let boxed: BoxError = Box::new(Error::Aborted);
        assert!(matches!(Error::from(boxed), Error::Aborted));

        let boxed: BoxError = "plain".into();
        let err = Error::from(boxed);
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn unknown_status_keeps_raw_value() {
        let err: Error = HttpError::new(777).into();
        assert_eq!(err.status(), 777);
        assert_eq!(err.to_string(), "Unknown error");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = Error::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "middleware panicked: boom");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "middleware panicked: owned");
    }

    #[test]
    fn msg_normalizes_non_errors() {
        let err = Error::msg(42);
        assert_eq!(err.to_string(), "42");
        assert_eq!(err.status(), 500);
    }
}
