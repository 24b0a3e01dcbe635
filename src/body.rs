//! Body types.
//!
//! [`Body`] is the value a middleware assigns as the response body. The
//! finalizer decides how to put it on the wire based on its variant:
//!
//! | Variant | Wire behaviour |
//! |---|---|
//! | `Bytes` | written verbatim |
//! | `Text` | written verbatim (UTF-8) |
//! | `Stream` | piped frame by frame, never buffered |
//! | `Json` | serialized once, Content-Length set from the encoded bytes |

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::combinators::UnsyncBoxBody;
use serde::Serialize;

use crate::error::{BoxError, Result};

/// A readable stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// The inbound request body as handed over by the transport.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// The outbound body handed back to the transport.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// A response body value.
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Stream(BodyStream),
    Json(serde_json::Value),
}

impl Body {
    /// Wraps a chunk stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Converts any serializable value into a structured body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Byte length of the body, if it can be known without writing it.
    ///
    /// Streams have no determinable length. JSON is measured by encoding it.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Bytes(b) => Some(b.len()),
            Self::Text(s) => Some(s.len()),
            Self::Stream(_) => None,
            Self::Json(v) => serde_json::to_vec(v).ok().map(|v| v.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Body {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self { Self::Bytes(Bytes::from(b)) }
}

impl From<&'static [u8]> for Body {
    fn from(b: &'static [u8]) -> Self { Self::Bytes(Bytes::from_static(b)) }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self { Self::Json(v) }
}
