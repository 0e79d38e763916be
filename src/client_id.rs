//! Client identifier resolution for quota tracking.
//!
//! The identifier is a best-effort string derived from proxy headers and the
//! transport peer. It is not an authenticated identity.

use axum::http::HeaderMap;
use regex::Regex;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier used when a loopback peer is seen and the host's own address
/// cannot be discovered.
pub const LOCALHOST_IDENTIFIER: &str = "localhost-127.0.0.1";

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Legacy proxy headers, checked in order after the two above.
const PROXY_HEADERS: [&str; 15] = [
    "x-forwarded",
    "forwarded-for",
    "forwarded",
    "x-cluster-client-ip",
    "x-real-ip",
    "proxy-client-ip",
    "wl-proxy-client-ip",
    "http_x_forwarded_for",
    "http_x_forwarded",
    "http_x_cluster_client_ip",
    "http_client_ip",
    "http_forwarded_for",
    "http_forwarded",
    "http_via",
    "remote_addr",
];

static DOTTED_QUAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$")
        .unwrap_or_else(|e| unreachable!("invalid dotted-quad pattern: {e}"))
});

/// Transport-level hints about who sent a request.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub headers: HeaderMap,
    pub peer: Option<SocketAddr>,
}

impl ClientContext {
    pub fn new(headers: HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self { headers, peer }
    }
}

/// Identifier resolved once per request and shared through request
/// extensions, so logging and quota accounting see the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClientId(pub String);

/// Derives quota identifiers from request headers and peer addresses.
#[derive(Debug, Clone)]
pub struct ClientIdResolver {
    local_address: Option<IpAddr>,
}

impl ClientIdResolver {
    /// Build a resolver, discovering this host's outward-facing address once.
    pub fn new() -> Self {
        Self {
            local_address: discover_local_address(),
        }
    }

    /// Build a resolver with a fixed substitute for loopback peers.
    pub fn with_local_address(local_address: Option<IpAddr>) -> Self {
        Self { local_address }
    }

    pub fn resolve_context(&self, context: &ClientContext) -> String {
        self.resolve(&context.headers, context.peer)
    }

    /// Resolve an identifier. Never returns an empty string.
    ///
    /// Precedence: first `X-Forwarded-For` entry, `X-Real-IP`, the legacy
    /// proxy headers, the peer address, then a time-derived fallback.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if let Some(ip) = header_value(headers, FORWARDED_FOR)
            .and_then(|xff| xff.split(',').next().map(str::trim))
            .filter(|ip| is_valid_ip(ip))
        {
            tracing::debug!(client_id = %ip, "Using X-Forwarded-For address");
            return ip.to_string();
        }

        if let Some(ip) = header_value(headers, REAL_IP).filter(|ip| is_valid_ip(ip)) {
            tracing::debug!(client_id = %ip, "Using X-Real-IP address");
            return ip.to_string();
        }

        for name in PROXY_HEADERS {
            if let Some(ip) = header_value(headers, name).filter(|ip| is_valid_ip(ip)) {
                tracing::debug!(header = name, client_id = %ip, "Using proxy header address");
                return ip.to_string();
            }
        }

        if let Some(addr) = peer {
            let ip = addr.ip();
            if ip.is_loopback() {
                return match self.local_address {
                    Some(local) => {
                        tracing::debug!(client_id = %local, "Using local address for loopback peer");
                        local.to_string()
                    }
                    None => LOCALHOST_IDENTIFIER.to_string(),
                };
            }

            let ip = ip.to_string();
            if is_valid_ip(&ip) {
                tracing::debug!(client_id = %ip, "Using peer address");
                return ip;
            }
        }

        tracing::warn!("Could not determine client address, using fallback identifier");
        fallback_identifier()
    }
}

impl Default for ClientIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Loose address check used for header values.
///
/// A trailing `:port` is ignored unless the value is bracketed. Four
/// dot-separated parts must form a dotted quad with octets 0-255; anything
/// else passes when it is at least four characters and not `unknown`.
pub fn is_valid_ip(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.eq_ignore_ascii_case("unknown") {
        return false;
    }

    let host = match candidate.rfind(':') {
        Some(idx) if !candidate.starts_with('[') => &candidate[..idx],
        _ => candidate,
    };

    if host.split('.').count() == 4 {
        return DOTTED_QUAD
            .captures(host)
            .map(|caps| {
                (1..=4).all(|i| {
                    caps.get(i)
                        .and_then(|octet| octet.as_str().parse::<u16>().ok())
                        .is_some_and(|octet| octet <= 255)
                })
            })
            .unwrap_or(false);
    }

    !host.eq_ignore_ascii_case("unknown") && host.len() > 3
}

/// Time-derived fallback. Two unidentifiable clients in the same
/// millisecond bucket share an identifier, and one client gets a new
/// identifier on every request.
fn fallback_identifier() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("unknown-{}", millis % 1_000_000)
}

/// Best-effort lookup of this host's outward-facing address. Connecting a
/// UDP socket selects a route without sending anything.
fn discover_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        tracing::debug!("No outward-facing local address found");
        None
    } else {
        Some(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> ClientIdResolver {
        ClientIdResolver::with_local_address(None)
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let map = headers(&[
            ("x-forwarded-for", "192.168.1.1, 10.0.0.1"),
            ("x-real-ip", "203.0.113.9"),
        ]);
        assert_eq!(resolver().resolve(&map, peer("198.51.100.2:4000")), "192.168.1.1");
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_invalid() {
        let map = headers(&[
            ("x-forwarded-for", "unknown"),
            ("x-real-ip", "203.0.113.1"),
        ]);
        assert_eq!(resolver().resolve(&map, None), "203.0.113.1");
    }

    #[test]
    fn test_legacy_header_order() {
        let map = headers(&[
            ("proxy-client-ip", "198.51.100.20"),
            ("x-cluster-client-ip", "198.51.100.10"),
        ]);
        assert_eq!(resolver().resolve(&map, None), "198.51.100.10");
    }

    #[test]
    fn test_peer_address_fallback() {
        assert_eq!(
            resolver().resolve(&HeaderMap::new(), peer("198.51.100.7:51234")),
            "198.51.100.7"
        );
    }

    #[test]
    fn test_loopback_peer_uses_local_address() {
        let local: IpAddr = "192.168.0.42".parse().unwrap();
        let resolver = ClientIdResolver::with_local_address(Some(local));
        assert_eq!(resolver.resolve(&HeaderMap::new(), peer("127.0.0.1:9000")), "192.168.0.42");
        assert_eq!(resolver.resolve(&HeaderMap::new(), peer("[::1]:9000")), "192.168.0.42");
    }

    #[test]
    fn test_loopback_peer_without_local_address() {
        assert_eq!(
            resolver().resolve(&HeaderMap::new(), peer("127.0.0.1:9000")),
            LOCALHOST_IDENTIFIER
        );
    }

    #[test]
    fn test_absolute_fallback() {
        let id = resolver().resolve(&HeaderMap::new(), None);
        assert!(id.starts_with("unknown-"));
        assert!(id.len() > "unknown-".len());
    }

    #[test]
    fn test_is_valid_ip() {
        assert!(is_valid_ip("10.0.0.1"));
        assert!(is_valid_ip("10.0.0.1:8080"));
        assert!(is_valid_ip("2001:db8::1"));
        assert!(is_valid_ip("[2001:db8::1]"));
        assert!(!is_valid_ip("256.0.0.1"));
        assert!(!is_valid_ip("a.b.c.d"));
        assert!(!is_valid_ip("unknown"));
        assert!(!is_valid_ip("UNKNOWN"));
        assert!(!is_valid_ip("abc"));
        assert!(!is_valid_ip(""));
    }

    #[test]
    fn test_resolve_context_matches_resolve() {
        let map = headers(&[("x-real-ip", "203.0.113.5")]);
        let context = ClientContext::new(map.clone(), None);
        let resolver = resolver();
        assert_eq!(resolver.resolve_context(&context), resolver.resolve(&map, None));
    }
}
