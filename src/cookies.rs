//! Cookies.
//!
//! [`CookieJar`] is the parsed `Cookie` request header, built lazily the first
//! time a middleware asks for it. [`Cookie`] builds a `Set-Cookie` value for
//! the response. Signing is not done here: the configured `keys` are
//! available to the application for that purpose.

use std::collections::HashMap;
use std::fmt;

use http::header::{HeaderMap, COOKIE};

/// Cookies sent by the client.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    /// Parses every `Cookie` header. The first occurrence of a name wins.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            for pair in value.split(';') {
                let Some((name, val)) = pair.split_once('=') else { continue };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let val = val.trim();
                let val = val
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(val);
                cookies.entry(name.to_owned()).or_insert_with(|| val.to_owned());
            }
        }
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.cookies.len() }
    pub fn is_empty(&self) -> bool { self.cookies.is_empty() }
}

/// SameSite attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// An outgoing cookie.
///
/// ```rust
/// use shallot::Cookie;
///
/// let c = Cookie::new("sid", "abc").path("/").http_only(true).max_age(3600);
/// assert_eq!(c.to_string(), "sid=abc; Max-Age=3600; Path=/; HttpOnly");
/// ```
#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<u64>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// A cookie that tells the client to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(age) = self.max_age {
            write!(f, "; Max-Age={age}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            let v = match same_site {
                SameSite::Strict => "Strict",
                SameSite::Lax => "Lax",
                SameSite::None => "None",
            };
            write!(f, "; SameSite={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_cookies() {
        let mut h = HeaderMap::new();
        h.append(COOKIE, "a=1; b=\"two\"; junk".parse().unwrap());
        h.append(COOKIE, "a=ignored; c=3".parse().unwrap());

        let jar = CookieJar::from_headers(&h);
        assert_eq!(jar.get("a"), Some("1"));
        assert_eq!(jar.get("b"), Some("two"));
        assert_eq!(jar.get("c"), Some("3"));
        assert_eq!(jar.get("junk"), None);
        assert_eq!(jar.len(), 3);
    }

    #[test]
    fn removal_cookie() {
        let c = Cookie::removal("sid").path("/");
        assert_eq!(c.to_string(), "sid=; Max-Age=0; Path=/");
    }

    #[test]
    fn full_attributes() {
        let c = Cookie::new("k", "v")
            .domain("example.com")
            .secure(true)
            .same_site(SameSite::Lax);
        assert_eq!(c.to_string(), "k=v; Domain=example.com; Secure; SameSite=Lax");
    }
}
