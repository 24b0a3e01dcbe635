//! The request facade.
//!
//! [`Request`] layers derived, lazily computed fields over a [`RawRequest`]:
//! host and protocol resolution under proxy trust, the client address chain,
//! cookies and content negotiation. Derived values that are costly to build
//! (address chain, cookie jar) are computed on first access and cached for
//! the rest of the request.

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::header::{
    HeaderMap, ACCEPT, ACCEPT_CHARSET, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, HOST,
    TRANSFER_ENCODING,
};
use http::uri::PathAndQuery;
use http::{Method, Uri};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::application::Application;
use crate::body::RequestBody;
use crate::cookies::CookieJar;
use crate::error::{HttpError, Result};
use crate::proxy::first_forwarded;
use crate::response::ContentType;
use crate::transport::RawRequest;

/// A per-request view of the inbound request.
pub struct Request {
    raw: RawRequest,
    app: Arc<Application>,
    original_url: String,
    ips: OnceLock<Vec<String>>,
    cookies: OnceLock<CookieJar>,
}

impl Request {
    pub(crate) fn new(raw: RawRequest, app: Arc<Application>) -> Self {
        let original_url = raw.url().to_owned();
        Self {
            raw,
            app,
            original_url,
            ips: OnceLock::new(),
            cookies: OnceLock::new(),
        }
    }

    pub fn raw(&self) -> &RawRequest { &self.raw }
    pub fn raw_mut(&mut self) -> &mut RawRequest { &mut self.raw }
    pub fn method(&self) -> &Method { self.raw.method() }
    pub fn headers(&self) -> &HeaderMap { self.raw.headers() }

    /// Overrides the method, e.g. for method-override middleware.
    pub fn set_method(&mut self, method: Method) {
        self.raw.set_method(method);
    }

    /// Current request target (path plus query). May be rewritten.
    pub fn url(&self) -> &str { self.raw.url() }

    /// Rewrites the request target. [`original_url`](Self::original_url) is unaffected.
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        self.raw.set_uri(url.parse::<Uri>()?);
        Ok(())
    }

    /// The request target as it arrived, captured when the context was built.
    pub fn original_url(&self) -> &str { &self.original_url }

    pub fn path(&self) -> &str { self.raw.uri().path() }

    /// Raw query string without the leading `?`.
    pub fn querystring(&self) -> &str { self.raw.uri().query().unwrap_or("") }

    /// Replaces the path, keeping the query string.
    pub fn set_path(&mut self, path: &str) -> Result<()> {
        let target = match self.raw.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };
        self.replace_target(target)
    }

    /// Replaces the query string, keeping the path. A leading `?` is ignored.
    pub fn set_querystring(&mut self, query: &str) -> Result<()> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let target = if query.is_empty() {
            self.path().to_owned()
        } else {
            format!("{}?{query}", self.path())
        };
        self.replace_target(target)
    }

    /// The query string decoded into `T`, e.g. a `HashMap<String, String>`
    /// or a `#[derive(Deserialize)]` struct. A mismatch is a 400.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T> {
        serde_urlencoded::from_str(self.querystring()).map_err(|e| {
            HttpError::new(400)
                .with_message(format!("invalid query string: {e}"))
                .with_source(e)
                .into()
        })
    }

    /// Replaces the query string with `query` encoded as form pairs.
    pub fn set_query<T: Serialize + ?Sized>(&mut self, query: &T) -> Result<()> {
        let encoded = serde_urlencoded::to_string(query)?;
        self.set_querystring(&encoded)
    }

    // Swaps the path-and-query, keeping scheme and authority of absolute targets.
    fn replace_target(&mut self, target: String) -> Result<()> {
        let mut parts = self.raw.uri().clone().into_parts();
        parts.path_and_query = Some(PathAndQuery::try_from(target)?);
        self.raw.set_uri(Uri::from_parts(parts)?);
        Ok(())
    }

    /// Header value as a string. Lookup is case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Host (with port) from `X-Forwarded-Host` when the proxy is trusted,
    /// else the HTTP/2 authority, else `Host`.
    pub fn host(&self) -> Option<&str> {
        if self.app.config().proxy {
            if let Some(host) = first_forwarded(self.headers(), "x-forwarded-host") {
                return Some(host);
            }
        }
        if self.raw.http_version_major() >= 2 {
            if let Some(authority) = self.raw.uri().authority() {
                return Some(authority.as_str());
            }
        }
        first_forwarded(self.headers(), HOST.as_str())
    }

    /// [`host`](Self::host) without the port. IPv6 literals keep their brackets.
    pub fn hostname(&self) -> Option<&str> {
        let host = self.host()?;
        if host.starts_with('[') {
            return host.find(']').map(|end| &host[..=end]);
        }
        Some(host.split(':').next().unwrap_or(host))
    }

    /// `https` or `http`. `X-Forwarded-Proto` is honoured only behind a trusted proxy.
    pub fn protocol(&self) -> &str {
        if let Some(scheme) = self.raw.uri().scheme_str() {
            return scheme;
        }
        if self.app.config().proxy {
            if let Some(proto) = first_forwarded(self.headers(), "x-forwarded-proto") {
                return proto;
            }
        }
        "http"
    }

    pub fn secure(&self) -> bool {
        self.protocol().eq_ignore_ascii_case("https")
    }

    /// `protocol://host`.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.protocol(), self.host().unwrap_or(""))
    }

    /// Full URL of the original request.
    pub fn href(&self) -> String {
        let url = &self.original_url;
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.clone();
        }
        format!("{}{}", self.origin(), url)
    }

    /// Subdomain labels, nearest the domain first, after dropping
    /// `subdomain_offset` trailing labels. Empty for IP hosts.
    pub fn subdomains(&self) -> Vec<&str> {
        let Some(hostname) = self.hostname() else { return Vec::new() };
        let bare = hostname.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return Vec::new();
        }
        let offset = self.app.config().subdomain_offset;
        hostname.split('.').rev().skip(offset).collect()
    }

    /// Client address chain from the trusted proxy header, computed once.
    pub fn ips(&self) -> &[String] {
        self.ips
            .get_or_init(|| self.app.ip_resolver().ips(self.headers(), self.app.config()))
    }

    /// Client address: the first proxied address, else the socket peer.
    pub fn ip(&self) -> String {
        if let Some(ip) = self.ips().first() {
            return ip.clone();
        }
        self.raw
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    /// Request cookies, parsed on first access.
    pub fn cookies(&self) -> &CookieJar {
        self.cookies.get_or_init(|| CookieJar::from_headers(self.headers()))
    }

    /// Best of `offered` media types for the `Accept` header.
    pub fn accepts<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.negotiate(ACCEPT.as_str(), offered)
    }

    pub fn accepts_encodings<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.negotiate(ACCEPT_ENCODING.as_str(), offered)
    }

    pub fn accepts_charsets<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.negotiate(ACCEPT_CHARSET.as_str(), offered)
    }

    pub fn accepts_languages<'o>(&self, offered: &[&'o str]) -> Option<&'o str> {
        self.negotiate(ACCEPT_LANGUAGE.as_str(), offered)
    }

    fn negotiate<'o>(&self, header: &str, offered: &[&'o str]) -> Option<&'o str> {
        self.app.negotiator().negotiate(self.get(header), offered)
    }

    /// Whether the method is idempotent per RFC 9110.
    pub fn idempotent(&self) -> bool {
        matches!(
            *self.method(),
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
        )
    }

    /// Whether the request carries a body: `Transfer-Encoding` is present or
    /// `Content-Length` is numeric (zero included).
    pub fn has_body(&self) -> bool {
        self.headers().contains_key(TRANSFER_ENCODING) || self.length().is_some()
    }

    /// The first of `types` matching the request's Content-Type.
    ///
    /// Types may be full (`application/json`), wildcards (`text/*`,
    /// `*/*`), suffixes (`+json`) or shorthands (`json`, `urlencoded`,
    /// `multipart`). `None` when there is no body, no Content-Type or no
    /// match.
    pub fn is<'t>(&self, types: &[&'t str]) -> Option<&'t str> {
        if !self.has_body() {
            return None;
        }
        let actual = self.content_type()?;
        types.iter().copied().find(|ty| mime_matches(ty, actual))
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH.as_str())?.trim().parse().ok()
    }

    /// Declared media type without parameters.
    pub fn content_type(&self) -> Option<&str> {
        let value = self.get(CONTENT_TYPE.as_str())?;
        Some(value.split(';').next().unwrap_or(value).trim())
    }

    /// Takes the streaming body. Returns `None` once taken.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.raw.take_body()
    }

    /// Buffers the whole body. Empty if the body was already taken.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        match self.raw.take_body() {
            Some(body) => Ok(body.collect().await?.to_bytes()),
            None => Ok(Bytes::new()),
        }
    }

    pub(crate) fn http_version_major(&self) -> u8 {
        self.raw.http_version_major()
    }
}

fn expand_type(ty: &str) -> Cow<'_, str> {
    if let Some(suffix) = ty.strip_prefix('+') {
        return Cow::Owned(format!("*/*+{suffix}"));
    }
    if ty.contains('/') {
        return Cow::Borrowed(ty);
    }
    if ty.eq_ignore_ascii_case("multipart") {
        return Cow::Borrowed("multipart/*");
    }
    match ContentType::from_shorthand(ty) {
        Some(known) => Cow::Borrowed(known.as_str().split(';').next().unwrap_or("")),
        None => Cow::Borrowed(ty),
    }
}

fn mime_matches(pattern: &str, actual: &str) -> bool {
    let pattern = expand_type(pattern);
    let (Some((p_type, p_sub)), Some((a_type, a_sub))) = (pattern.split_once('/'), actual.split_once('/')) else {
        return false;
    };
    if p_type != "*" && !p_type.eq_ignore_ascii_case(a_type) {
        return false;
    }
    if let Some(suffix) = p_sub.strip_prefix("*+") {
        return a_sub
            .rsplit_once('+')
            .is_some_and(|(_, a_suffix)| a_suffix.eq_ignore_ascii_case(suffix));
    }
    p_sub == "*" || p_sub.eq_ignore_ascii_case(a_sub)
}
