use http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

pub const UNKNOWN_CLIENT: &str = "unknown";

pub const FORWARDED_IP_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "true-client-ip",
];

pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_headers: bool,
) -> String {
    if trust_forwarded_headers && let Some(ip) = forwarded_client_ip(headers) {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    FORWARDED_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        // x-forwarded-for is "client, proxy1, proxy2"; the client is leftmost.
        let first = value.split(',').next()?.trim();
        first.parse::<IpAddr>().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::{UNKNOWN_CLIENT, client_identity};
    use http::{HeaderMap, HeaderValue};
    use std::net::SocketAddr;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:54321".parse().expect("addr should parse"))
    }

    #[test]
    fn uses_peer_ip_without_port() {
        let identity = client_identity(&HeaderMap::new(), peer(), false);
        assert_eq!(identity, "192.0.2.10");
    }

    #[test]
    fn ignores_forwarded_headers_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(client_identity(&headers, peer(), false), "192.0.2.10");
        assert_eq!(client_identity(&headers, peer(), true), "203.0.113.7");
    }

    #[test]
    fn takes_leftmost_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1, 10.0.0.2"),
        );

        assert_eq!(client_identity(&headers, peer(), true), "203.0.113.7");
    }

    #[test]
    fn falls_back_when_forwarded_value_is_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));

        assert_eq!(client_identity(&headers, peer(), true), "2001:db8::1");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_identity(&headers, peer(), true), "192.0.2.10");
    }

    #[test]
    fn unknown_without_peer() {
        assert_eq!(client_identity(&HeaderMap::new(), None, true), UNKNOWN_CLIENT);
    }
}
