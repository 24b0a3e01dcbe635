//! The response facade.
//!
//! [`Response`] is what middleware mutates: status, headers and the body
//! value. Nothing is written here. The finalizer turns the final state into
//! one terminal write on the [`RawResponse`].
//!
//! Assigning a body follows a few rules so the common cases need no
//! ceremony:
//!
//! - the status becomes `200` unless a status was set explicitly
//! - a Content-Type is inferred when none is set (`<`-prefixed text is html)
//! - Content-Length is set for text and bytes and dropped for streams and JSON
//! - clearing the body makes the status `204` and strips entity headers

use std::ffi::OsStr;
use std::path::Path;
use std::time::SystemTime;

use http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED,
    LOCATION, SET_COOKIE, TRANSFER_ENCODING, VARY,
};
use http::StatusCode;

use crate::body::Body;
use crate::cookies::Cookie;
use crate::error::{Error, Result};
use crate::status;
use crate::transport::RawResponse;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values, usable wherever a type string is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json; charset=utf-8
    MsgPack,      // application/msgpack
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::MsgPack     => "application/msgpack",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    /// Resolves a short name such as `json`, `text` or `bin`.
    pub fn from_shorthand(name: &str) -> Option<Self> {
        let ty = match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv"                        => Self::Csv,
            "sse" | "event-stream"       => Self::EventStream,
            "form" | "urlencoded"        => Self::FormData,
            "html" | "htm"               => Self::Html,
            "json"                       => Self::Json,
            "msgpack"                    => Self::MsgPack,
            "bin" | "octet-stream"       => Self::OctetStream,
            "pdf"                        => Self::Pdf,
            "text" | "txt"               => Self::Text,
            "xml"                        => Self::Xml,
            _                            => return None,
        };
        Some(ty)
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str { self.as_str() }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A per-request view of the outbound response.
pub struct Response {
    raw: RawResponse,
    body: Option<Body>,
    explicit_status: bool,
}

impl Response {
    pub(crate) fn new(raw: RawResponse) -> Self {
        Self { raw, body: None, explicit_status: false }
    }

    pub fn raw(&self) -> &RawResponse { &self.raw }
    pub fn raw_mut(&mut self) -> &mut RawResponse { &mut self.raw }
    pub(crate) fn into_raw(self) -> RawResponse { self.raw }

    pub fn status(&self) -> StatusCode { self.raw.status() }

    /// Sets the status from a number. Codes outside `100..=999` are rejected.
    pub fn set_status(&mut self, code: u16) -> Result<()> {
        let status = StatusCode::from_u16(code).map_err(|_| Error::InvalidStatus(code))?;
        self.set_status_code(status);
        Ok(())
    }

    /// Sets the status. Ignored once headers are sent. An empty-class status
    /// drops any body.
    pub fn set_status_code(&mut self, status: StatusCode) {
        if self.header_sent() {
            return;
        }
        self.explicit_status = true;
        self.raw.set_status(status);
        self.raw.set_status_message(None);
        if status::is_empty(status) {
            self.body = None;
        }
    }

    /// Status message: the custom one if set, else the reason phrase.
    pub fn message(&self) -> &str {
        self.raw
            .status_message()
            .unwrap_or_else(|| status::reason(self.status()))
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.raw.set_status_message(Some(message.into()));
    }

    pub fn body(&self) -> Option<&Body> { self.body.as_ref() }
    pub fn body_mut(&mut self) -> Option<&mut Body> { self.body.as_mut() }

    /// Assigns the body value. See the module docs for the header rules.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        let body = body.into();
        if !self.explicit_status {
            self.set_status_code(StatusCode::OK);
        }
        let set_type = !self.has(CONTENT_TYPE.as_str());

        match &body {
            Body::Text(text) => {
                if set_type {
                    let ty = if text.trim_start().starts_with('<') { ContentType::Html } else { ContentType::Text };
                    self.set_content_type(ty);
                }
                self.set_length(text.len() as u64);
            }
            Body::Bytes(bytes) => {
                if set_type {
                    self.set_content_type(ContentType::OctetStream);
                }
                self.set_length(bytes.len() as u64);
            }
            Body::Stream(_) => {
                self.remove(CONTENT_LENGTH.as_str());
                if set_type {
                    self.set_content_type(ContentType::OctetStream);
                }
            }
            Body::Json(_) => {
                self.remove(CONTENT_LENGTH.as_str());
                self.set_content_type(ContentType::Json);
            }
        }
        self.body = Some(body);
    }

    /// Removes the body. A non-empty-class status becomes `204`.
    pub fn clear_body(&mut self) {
        self.body = None;
        if !status::is_empty(self.status()) {
            self.set_status_code(StatusCode::NO_CONTENT);
        }
        self.remove(CONTENT_TYPE.as_str());
        self.remove(CONTENT_LENGTH.as_str());
        self.remove(TRANSFER_ENCODING.as_str());
    }

    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Content-Length if set, else the length the body would have.
    pub fn length(&self) -> Option<u64> {
        if let Some(value) = self.get(CONTENT_LENGTH.as_str()) {
            return value.trim().parse().ok();
        }
        self.body.as_ref()?.len().map(|n| n as u64)
    }

    pub fn set_length(&mut self, length: u64) {
        if self.header_sent() {
            return;
        }
        self.raw.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(length));
    }

    /// Media type without parameters.
    pub fn content_type(&self) -> Option<&str> {
        let value = self.get(CONTENT_TYPE.as_str())?;
        Some(value.split(';').next().unwrap_or(value).trim())
    }

    /// Sets Content-Type from a full media type or a shorthand (`json`,
    /// `text`, ...). An unknown shorthand removes the header.
    pub fn set_type(&mut self, ty: impl AsRef<str>) -> Result<()> {
        let ty = ty.as_ref();
        if ty.contains('/') {
            return self.set(CONTENT_TYPE.as_str(), ty);
        }
        match ContentType::from_shorthand(ty) {
            Some(known) => self.set_content_type(known),
            None => self.remove(CONTENT_TYPE.as_str()),
        }
        Ok(())
    }

    pub(crate) fn set_content_type(&mut self, ty: ContentType) {
        if self.header_sent() {
            return;
        }
        self.raw.headers_mut().insert(CONTENT_TYPE, ty.header_value());
    }

    pub fn headers(&self) -> &HeaderMap { self.raw.headers() }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has(&self, name: &str) -> bool {
        self.headers().contains_key(name)
    }

    /// Replaces a header. Ignored once headers are sent.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if self.header_sent() {
            return Ok(());
        }
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.raw.headers_mut().insert(name, value);
        Ok(())
    }

    /// Adds a header value, keeping existing ones.
    pub fn append(&mut self, name: &str, value: &str) -> Result<()> {
        if self.header_sent() {
            return Ok(());
        }
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.raw.headers_mut().append(name, value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        if self.header_sent() {
            return;
        }
        self.raw.headers_mut().remove(name);
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        self.append(SET_COOKIE.as_str(), &cookie.to_string())
    }

    /// Redirects to `url`: sets Location, a 302 unless the status already
    /// redirects, and a short text body.
    pub fn redirect(&mut self, url: &str) -> Result<()> {
        self.set(LOCATION.as_str(), url)?;
        if !status::is_redirect(self.status()) {
            self.set_status_code(StatusCode::FOUND);
        }
        self.set_content_type(ContentType::Text);
        self.set_body(format!("Redirecting to {url}."));
        Ok(())
    }

    /// Marks the response as a download. With a file name, Content-Type is
    /// set from its extension (or removed when the extension is unknown)
    /// and the name goes into Content-Disposition.
    pub fn attachment(&mut self, filename: Option<&str>) -> Result<()> {
        if let Some(ext) = filename.and_then(|name| Path::new(name).extension()).and_then(OsStr::to_str) {
            self.set_type(ext)?;
        }
        self.set(CONTENT_DISPOSITION.as_str(), &content_disposition(filename))
    }

    /// Adds `field` to Vary unless it is already listed. `*` replaces
    /// everything and absorbs later additions.
    pub fn vary(&mut self, field: &str) -> Result<()> {
        let mut fields: Vec<String> = self
            .headers()
            .get_all(VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_owned)
            .collect();
        if fields.iter().any(|f| f == "*") {
            return Ok(());
        }
        for field in field.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if field == "*" {
                fields = vec!["*".to_owned()];
                break;
            }
            if !fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
                fields.push(field.to_owned());
            }
        }
        if fields.is_empty() {
            return Ok(());
        }
        self.set(VARY.as_str(), &fields.join(", "))
    }

    /// Last-Modified as a point in time. `None` when absent or unparseable.
    pub fn last_modified(&self) -> Option<SystemTime> {
        httpdate::parse_http_date(self.get(LAST_MODIFIED.as_str())?).ok()
    }

    pub fn set_last_modified(&mut self, time: SystemTime) -> Result<()> {
        self.set(LAST_MODIFIED.as_str(), &httpdate::fmt_http_date(time))
    }

    pub fn etag(&self) -> Option<&str> {
        self.get(ETAG.as_str())
    }

    /// Sets ETag, quoting bare values. `W/"..."` and `"..."` are kept as given.
    pub fn set_etag(&mut self, etag: &str) -> Result<()> {
        if etag.starts_with('"') || etag.starts_with("W/\"") {
            self.set(ETAG.as_str(), etag)
        } else {
            self.set(ETAG.as_str(), &format!("\"{etag}\""))
        }
    }

    pub fn header_sent(&self) -> bool { self.raw.headers_sent() }
    pub fn writable(&self) -> bool { self.raw.is_writable() }

    pub fn flush_headers(&mut self) {
        self.raw.flush_headers();
    }
}

/// `attachment`, plus the file name when there is one. Non-ASCII names get
/// an ASCII fallback and a UTF-8 `filename*` parameter.
fn content_disposition(filename: Option<&str>) -> String {
    let Some(path) = filename else {
        return "attachment".to_owned();
    };
    let name = Path::new(path).file_name().and_then(OsStr::to_str).unwrap_or(path);
    let quoted = |s: &str| format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""));
    if name.is_ascii() {
        return format!("attachment; filename={}", quoted(name));
    }
    let fallback: String = name.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect();
    format!(
        "attachment; filename={}; filename*=UTF-8''{}",
        quoted(&fallback),
        urlencoding::encode(name),
    )
}
