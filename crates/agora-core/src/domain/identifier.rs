//! Rate-limit subject resolution.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// The subject whose request rate is bounded: `user:<id>` or `ip:<address>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn user(principal_id: &str) -> Self {
        Self(format!("user:{principal_id}"))
    }

    pub fn ip(address: &str) -> Self {
        Self(format!("ip:{address}"))
    }

    /// Authenticated principals win over the network origin, so rotating
    /// addresses does not reset an authenticated caller's budget.
    pub fn resolve(client: &ClientInfo<'_>) -> Self {
        match client.principal {
            Some(id) if !id.is_empty() => Self::user(id),
            _ => Self::ip(&client.address()),
        }
    }

    /// Per-endpoint key: `identifier:endpointKey`.
    pub fn scoped(&self, endpoint_key: &str) -> String {
        format!("{}:{}", self.0, endpoint_key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Request facts the identifier is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientInfo<'a> {
    pub principal: Option<&'a str>,
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<&'a str>,
    /// Raw `X-Real-IP` header value.
    pub real_ip: Option<&'a str>,
    /// Transport peer address, possibly with a port suffix.
    pub peer_addr: Option<&'a str>,
}

impl ClientInfo<'_> {
    /// Client address: first forwarded-for entry, then real-ip, then the peer.
    pub fn address(&self) -> String {
        let forwarded = self
            .forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        if let Some(ip) = self.real_ip.map(str::trim).filter(|v| !v.is_empty()) {
            return ip.to_string();
        }

        self.peer_addr
            .map(strip_port)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Drop a `:port` suffix. Bare IPv6 addresses are returned unchanged.
pub fn strip_port(addr: &str) -> String {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }
    if addr.parse::<IpAddr>().is_ok() {
        return addr.to_string();
    }
    match addr.rsplit_once(':') {
        Some((host, _port)) => host.trim_matches(|c| c == '[' || c == ']').to_string(),
        None => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_principal_wins() {
        let client = ClientInfo {
            principal: Some("42"),
            forwarded_for: Some("203.0.113.9"),
            ..Default::default()
        };
        assert_eq!(Identifier::resolve(&client).as_str(), "user:42");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let client = ClientInfo {
            forwarded_for: Some(" 203.0.113.9 , 10.0.0.1"),
            real_ip: Some("198.51.100.7"),
            peer_addr: Some("10.0.0.2:4000"),
            ..Default::default()
        };
        assert_eq!(Identifier::resolve(&client).as_str(), "ip:203.0.113.9");
    }

    #[test]
    fn test_real_ip_then_peer() {
        let client = ClientInfo {
            real_ip: Some("198.51.100.7"),
            peer_addr: Some("10.0.0.2:4000"),
            ..Default::default()
        };
        assert_eq!(client.address(), "198.51.100.7");

        let client = ClientInfo {
            peer_addr: Some("10.0.0.2:4000"),
            ..Default::default()
        };
        assert_eq!(client.address(), "10.0.0.2");
    }

    #[test]
    fn test_empty_principal_is_anonymous() {
        let client = ClientInfo {
            principal: Some(""),
            peer_addr: Some("10.0.0.2"),
            ..Default::default()
        };
        assert_eq!(Identifier::resolve(&client).as_str(), "ip:10.0.0.2");
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("127.0.0.1:8080"), "127.0.0.1");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("proxy.internal:3128"), "proxy.internal");
        assert_eq!(strip_port("10.1.1.1"), "10.1.1.1");
    }

    #[test]
    fn test_unknown_address() {
        assert_eq!(ClientInfo::default().address(), "unknown");
    }

    #[test]
    fn test_scoped_key() {
        let id = Identifier::ip("10.0.0.1");
        assert_eq!(id.scoped("/api/v1/posts"), "ip:10.0.0.1:/api/v1/posts");
    }
}
