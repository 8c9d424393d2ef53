//! Proxy data models

use crate::error::ProbeFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A plain HTTP forward proxy, identified by `host:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    /// Create a proxy address from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` or `http://host:port` entry.
    ///
    /// Returns `None` for blank lines, comments and anything malformed
    /// (empty host, non-numeric port, port 0).
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            return None;
        }

        let entry = entry.strip_prefix("http://").unwrap_or(entry);
        let entry = entry.strip_suffix('/').unwrap_or(entry);

        let (host, port) = entry.rsplit_once(':')?;
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '/' || c == ':') {
            return None;
        }

        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }

        Some(Self::new(host, port))
    }

    /// Get the proxy URL used to route requests through this proxy
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of verifying a single candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Verified,
    Rejected(ProbeFailure),
    /// Not dispatched because the run was cancelled first.
    Skipped,
}

/// Detailed result of a proxy check
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub proxy: ProxyAddress,
    pub status: ProbeStatus,
    pub response_time_ms: Option<u64>,
}

impl ProbeResult {
    pub fn verified(proxy: ProxyAddress, response_time_ms: u64) -> Self {
        Self {
            proxy,
            status: ProbeStatus::Verified,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn rejected(proxy: ProxyAddress, failure: ProbeFailure) -> Self {
        Self {
            proxy,
            status: ProbeStatus::Rejected(failure),
            response_time_ms: None,
        }
    }

    pub fn skipped(proxy: ProxyAddress) -> Self {
        Self {
            proxy,
            status: ProbeStatus::Skipped,
            response_time_ms: None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.status, ProbeStatus::Verified)
    }
}

/// Proxies that passed both the connect and the forwarding check.
///
/// Only valid for the run that produced it; a persisted set is reloaded as
/// candidates, not as verified proxies.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSet {
    proxies: Vec<ProxyAddress>,
    verified_at: DateTime<Utc>,
}

impl VerifiedSet {
    pub fn new(proxies: Vec<ProxyAddress>) -> Self {
        Self {
            proxies,
            verified_at: Utc::now(),
        }
    }

    /// Accept candidates without probing them (`--skip-verify`).
    pub fn unchecked(proxies: Vec<ProxyAddress>) -> Self {
        Self::new(proxies)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn proxies(&self) -> &[ProxyAddress] {
        &self.proxies
    }

    pub fn verified_at(&self) -> DateTime<Utc> {
        self.verified_at
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_format() {
        let proxy = ProxyAddress::parse("192.168.1.1:8080").unwrap();
        assert_eq!(proxy.host, "192.168.1.1");
        assert_eq!(proxy.port, 8080);
    }

    #[test]
    fn test_parse_url_format() {
        let proxy = ProxyAddress::parse("http://10.0.0.1:3128/").unwrap();
        assert_eq!(proxy, ProxyAddress::new("10.0.0.1", 3128));
    }

    #[test]
    fn test_parse_hostname() {
        let proxy = ProxyAddress::parse("  proxy.example.com:80 ").unwrap();
        assert_eq!(proxy.host, "proxy.example.com");
        assert_eq!(proxy.port, 80);
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(ProxyAddress::parse("").is_none());
        assert!(ProxyAddress::parse("# comment:80").is_none());
        assert!(ProxyAddress::parse("invalid").is_none());
        assert!(ProxyAddress::parse("192.168.1.1").is_none());
        assert!(ProxyAddress::parse("192.168.1.1:abc").is_none());
        assert!(ProxyAddress::parse(":8080").is_none());
        assert!(ProxyAddress::parse("192.168.1.1:0").is_none());
        assert!(ProxyAddress::parse("192.168.1.1:65536").is_none());
        assert!(ProxyAddress::parse("192.168.1.1:8080:user:pass").is_none());
    }

    #[test]
    fn test_display_and_url() {
        let proxy = ProxyAddress::new("127.0.0.1", 8080);
        assert_eq!(proxy.to_string(), "127.0.0.1:8080");
        assert_eq!(proxy.url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_probe_result() {
        let proxy = ProxyAddress::new("127.0.0.1", 8080);

        let result = ProbeResult::verified(proxy.clone(), 100);
        assert!(result.is_verified());
        assert_eq!(result.response_time_ms, Some(100));

        let result = ProbeResult::rejected(
            proxy.clone(),
            ProbeFailure::Unreachable("Connection refused".to_string()),
        );
        assert!(!result.is_verified());

        let result = ProbeResult::skipped(proxy);
        assert_eq!(result.status, ProbeStatus::Skipped);
    }
}
