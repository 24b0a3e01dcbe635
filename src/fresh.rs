//! Conditional-GET freshness.
//!
//! A response is fresh when the client's cached copy is still current: every
//! validator the request sends (`If-None-Match`, `If-Modified-Since`) is
//! satisfied by the response's `ETag` and `Last-Modified`.

use http::header::{HeaderMap, HeaderName, CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};

pub(crate) fn is_fresh(req: &HeaderMap, res: &HeaderMap) -> bool {
    let modified_since = header(req, IF_MODIFIED_SINCE);
    let none_match = header(req, IF_NONE_MATCH);
    if modified_since.is_none() && none_match.is_none() {
        return false;
    }

    // End-to-end reload.
    let no_cache = header(req, CACHE_CONTROL)
        .is_some_and(|cc| cc.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-cache")));
    if no_cache {
        return false;
    }

    if let Some(none_match) = none_match.filter(|v| v.trim() != "*") {
        let Some(etag) = header(res, ETAG) else {
            return false;
        };
        let etag = strip_weak(etag);
        if !none_match.split(',').any(|tag| strip_weak(tag.trim()) == etag) {
            return false;
        }
    }

    if let Some(since) = modified_since {
        let since = httpdate::parse_http_date(since).ok();
        let last = header(res, LAST_MODIFIED).and_then(|v| httpdate::parse_http_date(v).ok());
        match (last, since) {
            (Some(last), Some(since)) if last <= since => {}
            _ => return false,
        }
    }

    true
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
