//! Raw transport handles.
//!
//! [`RawRequest`] and [`RawResponse`] are what the transport layer hands to
//! the core: an already-parsed request head plus body, and a mutable response
//! handle with a writable flag and an end-of-stream write. The core never
//! touches bytes on a socket. The hyper adapter in [`server`](crate::server)
//! converts to and from these types, and tests build them directly.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::HeaderMap;
use http::{Method, StatusCode, Uri, Version};
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tracing::warn;

use crate::body::{BodyStream, RequestBody, ResponseBody};
use crate::error::BoxError;

// ── RawRequest ────────────────────────────────────────────────────────────────

/// An inbound request as delivered by the transport.
pub struct RawRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Option<RequestBody>,
}

impl RawRequest {
    /// A bodiless HTTP/1.1 request with no headers.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: None,
            body: None,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub(crate) fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    /// The request target as sent: path plus query, or `/`.
    pub fn url(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Protocol major version: 0 for HTTP/0.9, 1 for HTTP/1.x, 2 and 3 above.
    pub fn http_version_major(&self) -> u8 {
        match self.version {
            Version::HTTP_09 => 0,
            Version::HTTP_2 => 2,
            Version::HTTP_3 => 3,
            _ => 1,
        }
    }

    /// Takes the body out of the request. Returns `None` the second time.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }
}

impl<B> From<http::Request<B>> for RawRequest
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    fn from(req: http::Request<B>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            remote_addr: None,
            body: Some(body.map_err(Into::into).boxed_unsync()),
        }
    }
}

// ── RawResponse ───────────────────────────────────────────────────────────────

/// What has been written to a [`RawResponse`].
pub enum Payload {
    /// Nothing written yet, or the response ended without a body.
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Payload {
    /// The written bytes, if the payload is fully buffered.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Full(b) => Some(b),
            _ => None,
        }
    }
}

/// The transport-side response handle.
///
/// Starts as `200` with no headers. `end` and `pipe` are the terminal writes.
/// After either, or after the transport calls [`close`](Self::close), the
/// response is no longer writable and further writes are ignored.
pub struct RawResponse {
    status: StatusCode,
    status_message: Option<String>,
    headers: HeaderMap,
    headers_sent: bool,
    finished: bool,
    closed: bool,
    payload: Payload,
    writes: usize,
}

impl RawResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            status_message: None,
            headers: HeaderMap::new(),
            headers_sent: false,
            finished: false,
            closed: false,
            payload: Payload::Empty,
            writes: 0,
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn status_message(&self) -> Option<&str> { self.status_message.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn headers_sent(&self) -> bool { self.headers_sent }
    pub fn is_finished(&self) -> bool { self.finished }
    pub fn is_closed(&self) -> bool { self.closed }
    pub fn payload(&self) -> &Payload { &self.payload }
    pub fn into_payload(self) -> Payload { self.payload }

    /// Number of terminal writes that reached the transport.
    pub fn write_count(&self) -> usize { self.writes }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_status_message(&mut self, message: Option<String>) {
        self.status_message = message;
    }

    /// `false` once the response ended or the connection went away.
    pub fn is_writable(&self) -> bool {
        !self.finished && !self.closed
    }

    /// Commits the status line and headers. Later header changes are not sent.
    pub fn flush_headers(&mut self) {
        self.headers_sent = true;
    }

    /// Marks the underlying connection as gone.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Ends the response, optionally with a final payload.
    pub fn end(&mut self, payload: Option<Bytes>) {
        self.finish(payload.map_or(Payload::Empty, Payload::Full));
    }

    /// Ends the response by streaming `stream` to the client.
    pub fn pipe(&mut self, stream: BodyStream) {
        self.finish(Payload::Stream(stream));
    }

    fn finish(&mut self, payload: Payload) {
        if !self.is_writable() {
            warn!(status = self.status.as_u16(), "write after end ignored");
            return;
        }
        self.payload = payload;
        self.headers_sent = true;
        self.finished = true;
        self.writes += 1;
    }

    /// Converts the written response into an `http::Response` for the wire.
    pub fn into_http(self) -> http::Response<ResponseBody> {
        let body: ResponseBody = match self.payload {
            Payload::Empty => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
            Payload::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
            Payload::Stream(stream) => {
                StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
            }
        };

        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for RawResponse {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_falls_back_to_root() {
        let req = RawRequest::new(Method::GET, Uri::from_static("http://example.com"));
        assert_eq!(req.url(), "/");

        let req = RawRequest::new(Method::GET, Uri::from_static("/a/b?x=1"));
        assert_eq!(req.url(), "/a/b?x=1");
    }

    #[test]
    fn version_major() {
        let req = RawRequest::new(Method::GET, Uri::from_static("/"));
        assert_eq!(req.http_version_major(), 1);
        let req = req.with_version(Version::HTTP_2);
        assert_eq!(req.http_version_major(), 2);
    }

    #[test]
    fn from_http_request_keeps_body() {
        let req = http::Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Full::new(Bytes::from_static(b"abc")))
            .unwrap();
        let mut raw = RawRequest::from(req);
        assert_eq!(raw.method(), &Method::POST);
        assert!(raw.take_body().is_some());
        assert!(raw.take_body().is_none());
    }

    #[test]
    fn end_is_terminal() {
        let mut res = RawResponse::new();
        assert!(res.is_writable());
        res.end(Some(Bytes::from_static(b"one")));
        assert!(!res.is_writable());
        assert!(res.headers_sent());

        res.end(Some(Bytes::from_static(b"two")));
        assert_eq!(res.write_count(), 1);
        assert_eq!(res.payload().bytes().unwrap(), &Bytes::from_static(b"one"));
    }

    #[test]
    fn closed_response_drops_writes() {
        let mut res = RawResponse::new();
        res.close();
        assert!(!res.is_writable());
        res.end(None);
        assert_eq!(res.write_count(), 0);
        assert!(!res.headers_sent());
    }

    #[tokio::test]
    async fn into_http_carries_status_headers_and_body() {
        let mut res = RawResponse::new();
        res.set_status(StatusCode::CREATED);
        res.headers_mut().insert("x-id", "7".parse().unwrap());
        res.end(Some(Bytes::from_static(b"done")));

        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()["x-id"], "7");
        let bytes = http.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from_static(b"done"));
    }
}
