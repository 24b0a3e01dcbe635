//! Proxy trust and client-address resolution.
//!
//! When the application runs behind a trusted proxy (`Config::proxy`), the
//! client address chain comes from the configured proxy header
//! (`X-Forwarded-For` by default). Otherwise forwarded headers are ignored and
//! only the socket peer address is used.

use http::header::HeaderMap;

use crate::config::Config;

/// Resolves the upstream-to-downstream client address chain of a request.
pub trait IpResolver: Send + Sync + 'static {
    /// Addresses from the proxy header, client first. Empty when the proxy is
    /// not trusted or the header is absent.
    fn ips(&self, headers: &HeaderMap, config: &Config) -> Vec<String>;
}

/// The default [`IpResolver`]: reads `config.proxy_ip_header`, keeping at most
/// `config.max_ips_count` entries closest to this server (0 keeps all).
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardedFor;

impl IpResolver for ForwardedFor {
    fn ips(&self, headers: &HeaderMap, config: &Config) -> Vec<String> {
        if !config.proxy {
            return Vec::new();
        }
        let Some(value) = headers
            .get(config.proxy_ip_header.as_str())
            .and_then(|v| v.to_str().ok())
        else {
            return Vec::new();
        };

        let mut ips: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        if config.max_ips_count > 0 && ips.len() > config.max_ips_count {
            ips.drain(..ips.len() - config.max_ips_count);
        }
        ips
    }
}

/// First comma-separated value of a forwarded header, trimmed.
pub(crate) fn first_forwarded<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
