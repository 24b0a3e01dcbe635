//! The per-request context.
//!
//! One [`Context`] exists per inbound request. It owns the [`Request`] and
//! [`Response`] facades (which own the raw transport handles), a free-form
//! [`State`] map for middleware to talk to each other, and a handle to the
//! shared [`Application`]. It is dropped as a unit once the response is
//! written.
//!
//! The most used facade members are forwarded so middleware can write
//! `ctx.set_body(..)` rather than `ctx.response_mut().set_body(..)`. The
//! forwarded set is fixed. Anything else is reached through
//! [`request`](Context::request) and [`response`](Context::response).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::application::Application;
use crate::body::Body;
use crate::error::{Error, HttpError, Result};
use crate::fresh;
use crate::request::Request;
use crate::response::{ContentType, Response};
use crate::sink::ErrorEvent;
use crate::status;
use crate::transport::{RawRequest, RawResponse};

// ── State ─────────────────────────────────────────────────────────────────────

/// String-keyed, type-erased values shared between middleware of one request.
#[derive(Default)]
pub struct State {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl State {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref()
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key)?.downcast_mut()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

// ── Context ───────────────────────────────────────────────────────────────────

pub struct Context {
    app: Arc<Application>,
    request: Request,
    response: Response,
    state: State,
    respond: bool,
}

impl Context {
    /// Wires a fresh context. No I/O, no parsing.
    pub(crate) fn new(req: RawRequest, res: RawResponse, app: Arc<Application>) -> Self {
        Self {
            request: Request::new(req, Arc::clone(&app)),
            response: Response::new(res),
            app,
            state: State::default(),
            respond: true,
        }
    }

    pub fn app(&self) -> &Application { &self.app }
    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }
    pub fn state(&self) -> &State { &self.state }
    pub fn state_mut(&mut self) -> &mut State { &mut self.state }

    /// The raw transport request.
    pub fn req(&self) -> &RawRequest { self.request.raw() }
    /// The raw transport response.
    pub fn res(&self) -> &RawResponse { self.response.raw() }
    pub fn res_mut(&mut self) -> &mut RawResponse { self.response.raw_mut() }

    pub(crate) fn into_raw_response(self) -> RawResponse {
        self.response.into_raw()
    }

    /// Whether the finalizer should write the response.
    pub fn respond(&self) -> bool { self.respond }

    /// Pass `false` when the middleware wrote to the raw response itself.
    pub fn set_respond(&mut self, respond: bool) {
        self.respond = respond;
    }

    /// Returns an [`HttpError`] as `Err`, for `return ctx.throw(403, "..")`.
    pub fn throw<T>(&self, status: u16, message: impl Into<String>) -> Result<T> {
        Err(HttpError::new(status).with_message(message).into())
    }

    /// `Err(HttpError)` unless `condition` holds.
    pub fn assert(&self, condition: bool, status: u16, message: impl Into<String>) -> Result<()> {
        if condition {
            Ok(())
        } else {
            self.throw(status, message)
        }
    }

    /// Context-level error handling.
    ///
    /// `None` is ignored. The error always reaches the application's error
    /// sink first. If headers are already out or the connection is gone,
    /// nothing else happens. Otherwise the staged response is discarded and
    /// replaced by a plain-text error response.
    pub fn on_error(&mut self, err: Option<Error>) {
        let Some(err) = err else { return };

        let header_sent = self.response.header_sent() || !self.response.writable();
        self.app.sink().emit(&ErrorEvent {
            error: &err,
            context: Some(&*self),
            header_sent,
        });
        if header_sent {
            return;
        }

        let res = self.response.raw_mut();
        res.headers_mut().clear();
        if let Some(headers) = err.headers() {
            for (name, value) in headers {
                res.headers_mut().append(name, value.clone());
            }
        }
        self.response.set_content_type(ContentType::Text);

        let code = match err.status() {
            code if status::is_known(code) => code,
            _ => 500,
        };
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if err.expose() {
            err.to_string()
        } else {
            status::reason(status).to_owned()
        };

        self.response.set_status_code(status);
        self.response.set_length(message.len() as u64);
        self.response.raw_mut().end(Some(Bytes::from(message)));
    }

    /// A JSON snapshot for debugging. Raw handles appear as placeholders.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "request": {
                "method": self.method().as_str(),
                "url": self.url(),
                "header": headers_json(self.request.headers()),
            },
            "response": {
                "status": self.status().as_u16(),
                "message": self.message(),
                "header": headers_json(self.response.headers()),
            },
            "app": self.app.to_json(),
            "originalUrl": self.original_url(),
            "req": "<original req>",
            "res": "<original res>",
            "socket": "<original socket>",
        })
    }

    // ── Request forwarding ────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { self.request.method() }
    pub fn set_method(&mut self, method: Method) { self.request.set_method(method) }
    pub fn url(&self) -> &str { self.request.url() }
    pub fn set_url(&mut self, url: &str) -> Result<()> { self.request.set_url(url) }
    pub fn original_url(&self) -> &str { self.request.original_url() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn querystring(&self) -> &str { self.request.querystring() }
    pub fn headers(&self) -> &HeaderMap { self.request.headers() }
    pub fn get(&self, name: &str) -> Option<&str> { self.request.get(name) }
    pub fn host(&self) -> Option<&str> { self.request.host() }
    pub fn hostname(&self) -> Option<&str> { self.request.hostname() }
    pub fn protocol(&self) -> &str { self.request.protocol() }
    pub fn secure(&self) -> bool { self.request.secure() }
    pub fn origin(&self) -> String { self.request.origin() }
    pub fn href(&self) -> String { self.request.href() }
    pub fn subdomains(&self) -> Vec<&str> { self.request.subdomains() }
    pub fn ip(&self) -> String { self.request.ip() }
    pub fn ips(&self) -> &[String] { self.request.ips() }
    pub fn idempotent(&self) -> bool { self.request.idempotent() }
    pub fn set_path(&mut self, path: &str) -> Result<()> { self.request.set_path(path) }
    pub fn set_querystring(&mut self, query: &str) -> Result<()> { self.request.set_querystring(query) }
    pub fn query<T: DeserializeOwned>(&self) -> Result<T> { self.request.query() }
    pub fn set_query<T: Serialize + ?Sized>(&mut self, query: &T) -> Result<()> { self.request.set_query(query) }
    pub fn is<'t>(&self, types: &[&'t str]) -> Option<&'t str> { self.request.is(types) }

    /// Whether the client's cached copy is current, so a `GET` or `HEAD`
    /// could be answered with 304. Only a 2xx or 304 response can be fresh.
    pub fn fresh(&self) -> bool {
        if !matches!(*self.method(), Method::GET | Method::HEAD) {
            return false;
        }
        let status = self.status();
        if !(status.is_success() || status == StatusCode::NOT_MODIFIED) {
            return false;
        }
        fresh::is_fresh(self.headers(), self.response.headers())
    }

    pub fn stale(&self) -> bool { !self.fresh() }

    pub fn accepts<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.request.accepts(offered)
    }

    pub fn accepts_encodings<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.request.accepts_encodings(offered)
    }

    pub fn accepts_charsets<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.request.accepts_charsets(offered)
    }

    pub fn accepts_languages<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.request.accepts_languages(offered)
    }

    // ── Response forwarding ───────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode { self.response.status() }
    pub fn set_status(&mut self, code: u16) -> Result<()> { self.response.set_status(code) }
    pub fn message(&self) -> &str { self.response.message() }
    pub fn set_message(&mut self, message: impl Into<String>) { self.response.set_message(message) }
    pub fn body(&self) -> Option<&Body> { self.response.body() }
    pub fn set_body(&mut self, body: impl Into<Body>) { self.response.set_body(body) }
    pub fn clear_body(&mut self) { self.response.clear_body() }
    pub fn length(&self) -> Option<u64> { self.response.length() }
    pub fn set_length(&mut self, length: u64) { self.response.set_length(length) }
    pub fn content_type(&self) -> Option<&str> { self.response.content_type() }
    pub fn set_type(&mut self, ty: impl AsRef<str>) -> Result<()> { self.response.set_type(ty) }
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> { self.response.set(name, value) }
    pub fn append(&mut self, name: &str, value: &str) -> Result<()> { self.response.append(name, value) }
    pub fn remove(&mut self, name: &str) { self.response.remove(name) }
    pub fn has(&self, name: &str) -> bool { self.response.has(name) }
    pub fn redirect(&mut self, url: &str) -> Result<()> { self.response.redirect(url) }
    pub fn attachment(&mut self, filename: Option<&str>) -> Result<()> { self.response.attachment(filename) }
    pub fn vary(&mut self, field: &str) -> Result<()> { self.response.vary(field) }
    pub fn last_modified(&self) -> Option<SystemTime> { self.response.last_modified() }
    pub fn set_last_modified(&mut self, time: SystemTime) -> Result<()> { self.response.set_last_modified(time) }
    pub fn etag(&self) -> Option<&str> { self.response.etag() }
    pub fn set_etag(&mut self, etag: &str) -> Result<()> { self.response.set_etag(etag) }
    pub fn header_sent(&self) -> bool { self.response.header_sent() }
    pub fn writable(&self) -> bool { self.response.writable() }
    pub fn flush_headers(&mut self) { self.response.flush_headers() }
}

fn headers_json(headers: &HeaderMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_owned(), json!(v.to_str().unwrap_or(""))))
        .collect();
    serde_json::Value::Object(map)
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("url", &self.url())
            .field("original_url", &self.original_url())
            .field("status", &self.status())
            .field("body", &self.body())
            .field("state_keys", &self.state.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::header::{HeaderName, HeaderValue};
    use http::Uri;

    use super::*;
    use crate::application::App;
    use crate::sink::ErrorEvent;

    type Seen = Arc<Mutex<Vec<(String, bool)>>>;

    fn context_with_sink() -> (Context, Seen) {
        let seen: Seen = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = App::new()
            .on_error(move |event: &ErrorEvent<'_>| {
                recorder.lock().unwrap().push((event.error.to_string(), event.header_sent));
            })
            .into_application();
        let req = RawRequest::new(Method::GET, Uri::from_static("/thing"));
        (app.create_context(req, RawResponse::new()), seen)
    }

    fn written(ctx: &Context) -> Vec<u8> {
        ctx.res().payload().bytes().map(|b| b.to_vec()).unwrap_or_default()
    }

    #[test]
    fn assembles_fresh_context() {
        let (ctx, _) = context_with_sink();
        assert_eq!(ctx.original_url(), "/thing");
        assert!(ctx.state().is_empty());
        assert!(ctx.respond());
        assert_eq!(ctx.method(), &Method::GET);
    }

    #[test]
    fn state_is_typed() {
        let (mut ctx, _) = context_with_sink();
        ctx.state_mut().insert("user", String::from("tobi"));
        ctx.state_mut().insert("visits", 3u32);
        assert_eq!(ctx.state().get::<String>("user").map(String::as_str), Some("tobi"));
        assert_eq!(ctx.state().get::<u64>("visits"), None);
        *ctx.state_mut().get_mut::<u32>("visits").unwrap() += 1;
        assert_eq!(ctx.state().get::<u32>("visits"), Some(&4));
        assert!(ctx.state_mut().remove("user"));
        assert!(!ctx.state().contains("user"));
    }

    #[test]
    fn throw_and_assert() {
        let (ctx, _) = context_with_sink();
        let err = ctx.throw::<()>(403, "nope").unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.to_string(), "nope");
        assert!(ctx.assert(true, 400, "unused").is_ok());
        assert_eq!(ctx.assert(false, 401, "login").unwrap_err().status(), 401);
    }

    #[test]
    fn on_error_ignores_none() {
        let (mut ctx, seen) = context_with_sink();
        ctx.on_error(None);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(ctx.res().write_count(), 0);
    }

    #[test]
    fn exposed_error_message_is_sent() {
        let (mut ctx, seen) = context_with_sink();
        ctx.on_error(Some(HttpError::new(400).with_message("bad input").into()));

        assert_eq!(ctx.res().status(), StatusCode::BAD_REQUEST);
        assert_eq!(written(&ctx), b"bad input");
        assert_eq!(ctx.response().get("content-length"), Some("9"));
        assert_eq!(ctx.response().get("content-type"), Some("text/plain; charset=utf-8"));
        assert_eq!(*seen.lock().unwrap(), [("bad input".to_owned(), false)]);
    }

    #[test]
    fn hidden_error_uses_reason_phrase() {
        let (mut ctx, _) = context_with_sink();
        ctx.on_error(Some(Error::msg("db password is hunter2")));
        assert_eq!(ctx.res().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(written(&ctx), b"Internal Server Error");
    }

    #[test]
    fn staged_headers_are_replaced_by_error_headers() {
        let (mut ctx, _) = context_with_sink();
        ctx.set("x-staged", "1").unwrap();
        ctx.set_body("partial");
        let err = HttpError::new(429).with_header(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_static("10"),
        );
        ctx.on_error(Some(err.into()));

        assert!(!ctx.has("x-staged"));
        assert_eq!(ctx.response().get("retry-after"), Some("10"));
        assert_eq!(ctx.res().status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(written(&ctx), b"Too Many Requests");
    }

    #[test]
    fn missing_resource_is_404() {
        let (mut ctx, _) = context_with_sink();
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        ctx.on_error(Some(io.into()));
        assert_eq!(ctx.res().status(), StatusCode::NOT_FOUND);
        assert_eq!(written(&ctx), b"Not Found");
    }

    #[test]
    fn unknown_status_becomes_500() {
        let (mut ctx, _) = context_with_sink();
        ctx.on_error(Some(HttpError::new(299).with_expose(true).with_message("odd").into()));
        assert_eq!(ctx.res().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(written(&ctx), b"odd");
    }

    #[test]
    fn headers_sent_means_sink_only() {
        let (mut ctx, seen) = context_with_sink();
        ctx.flush_headers();
        ctx.on_error(Some(Error::msg("late")));
        assert_eq!(ctx.res().write_count(), 0);
        assert_eq!(*seen.lock().unwrap(), [("late".to_owned(), true)]);
    }

    #[test]
    fn closed_connection_means_sink_only() {
        let (mut ctx, seen) = context_with_sink();
        ctx.res_mut().close();
        ctx.on_error(Some(Error::msg("gone")));
        assert_eq!(ctx.res().write_count(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn json_snapshot() {
        let (mut ctx, _) = context_with_sink();
        ctx.set_body("hi");
        let snapshot = ctx.to_json();
        assert_eq!(snapshot["request"]["method"], "GET");
        assert_eq!(snapshot["response"]["status"], 200);
        assert_eq!(snapshot["response"]["header"]["content-length"], "2");
        assert_eq!(snapshot["originalUrl"], "/thing");
        assert_eq!(snapshot["app"]["env"], "development");
    }

    fn conditional(method: Method) -> Context {
        let mut req = RawRequest::new(method, Uri::from_static("/doc"));
        req.headers_mut().insert("if-none-match", HeaderValue::from_static("\"v1\""));
        App::new().into_application().create_context(req, RawResponse::new())
    }

    #[test]
    fn matching_etag_is_fresh() {
        let mut ctx = conditional(Method::GET);
        ctx.set_body("doc");
        ctx.set_etag("v1").unwrap();
        assert!(ctx.fresh());
        assert!(!ctx.stale());

        ctx.set_etag("v2").unwrap();
        assert!(ctx.stale());
    }

    #[test]
    fn freshness_needs_a_safe_method_and_success() {
        let mut ctx = conditional(Method::POST);
        ctx.set_body("doc");
        ctx.set_etag("v1").unwrap();
        assert!(!ctx.fresh());

        let mut ctx = conditional(Method::GET);
        ctx.set_etag("v1").unwrap();
        ctx.set_status(404).unwrap();
        assert!(!ctx.fresh());
        ctx.set_status(304).unwrap();
        assert!(ctx.fresh());
    }

    #[test]
    fn forwards_the_extra_members() {
        let mut req = RawRequest::new(Method::POST, Uri::from_static("/upload?dry=1"));
        req.headers_mut().insert("content-type", HeaderValue::from_static("text/csv"));
        req.headers_mut().insert("content-length", HeaderValue::from_static("10"));
        let mut ctx = App::new().into_application().create_context(req, RawResponse::new());

        assert_eq!(ctx.is(&["json", "csv"]), Some("csv"));
        let query: HashMap<String, String> = ctx.query().unwrap();
        assert_eq!(query["dry"], "1");

        ctx.set_path("/v2/upload").unwrap();
        ctx.set_querystring("dry=0").unwrap();
        assert_eq!(ctx.url(), "/v2/upload?dry=0");
        assert_eq!(ctx.original_url(), "/upload?dry=1");

        ctx.vary("Accept").unwrap();
        ctx.attachment(Some("out.csv")).unwrap();
        assert!(ctx.has("vary"));
        assert_eq!(ctx.content_type(), Some("text/csv"));
        assert!(ctx.last_modified().is_none());
    }
}
