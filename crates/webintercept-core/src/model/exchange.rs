//! Captured HTTP exchanges
//!
//! An [`Exchange`] is the atomic unit of captured traffic: one request and,
//! when the upstream answered, its response. Exchanges are created by the
//! proxy the moment a request parses, mutated at most once by the rule engine
//! and at most once by an operator intercept decision, then frozen on forward
//! completion.

use super::headers::HeaderList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One captured request/response pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// Unique exchange id
    pub id: Uuid,
    /// Capture timestamp (first byte parsed)
    pub timestamp: DateTime<Utc>,

    /// HTTP method
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Target host (no port)
    pub host: String,
    /// Path including query string
    pub path: String,
    /// `http` or `https`
    pub scheme: String,

    /// Request headers as captured
    pub request_headers: HeaderList,
    /// Raw request body bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Vec<u8>>,
    /// Request content type, parameters stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,

    /// Upstream status; absent for dropped or CONNECT-only exchanges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    /// Response headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HeaderList>,
    /// Raw response body bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Vec<u8>>,
    /// Response content type, parameters stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    /// Wall-clock milliseconds between forward and response completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Held by the operator at least once
    #[serde(default)]
    pub intercepted: bool,
    /// Bytes differ from the wire capture (rule rewrite or operator edit)
    #[serde(default)]
    pub modified: bool,
    /// CONNECT tunnel marker
    #[serde(default)]
    pub is_tunnel: bool,
    /// Operator-assigned tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Failure annotation (timeout, upstream unreachable, framing error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Exchange {
    /// Create a new exchange for a just-parsed request
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: method.into(),
            url: url.into(),
            host: host.into(),
            path: path.into(),
            scheme: scheme.into(),
            request_headers: HeaderList::new(),
            request_body: None,
            request_content_type: None,
            response_status: None,
            response_headers: None,
            response_body: None,
            response_content_type: None,
            duration_ms: None,
            intercepted: false,
            modified: false,
            is_tunnel: false,
            tags: Vec::new(),
            error: None,
        }
    }

    /// Synthetic record for an opaque CONNECT tunnel
    pub fn connect_tunnel(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let mut exchange = Self::new(
            "CONNECT",
            format!("https://{host}:{port}"),
            host,
            "/",
            "https",
        );
        exchange.is_tunnel = true;
        exchange
    }

    /// True when a response was recorded
    pub fn has_response(&self) -> bool {
        self.response_status.is_some()
    }
}

/// Filter for exchange listings
#[derive(Debug, Clone, Default)]
pub struct ExchangeFilter {
    /// Exact method match
    pub method: Option<String>,
    /// Substring match on host
    pub host: Option<String>,
    /// Exact response status match
    pub status: Option<u16>,
    /// Substring match over URL
    pub search: Option<String>,
    /// Tunnel flag match
    pub is_tunnel: Option<bool>,
}

impl ExchangeFilter {
    /// True when the exchange passes every populated criterion
    pub fn matches(&self, exchange: &Exchange) -> bool {
        if let Some(ref method) = self.method {
            if !exchange.method.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(ref host) = self.host {
            if !exchange.host.contains(host.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if exchange.response_status != Some(status) {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            if !exchange.url.contains(search.as_str()) {
                return false;
            }
        }
        if let Some(is_tunnel) = self.is_tunnel {
            if exchange.is_tunnel != is_tunnel {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_applies_all_criteria() {
        let mut exchange = Exchange::new("GET", "http://example.test/a?q=1", "example.test", "/a?q=1", "http");
        exchange.response_status = Some(200);

        let mut filter = ExchangeFilter::default();
        assert!(filter.matches(&exchange));

        filter.method = Some("get".to_string());
        filter.status = Some(200);
        filter.search = Some("q=1".to_string());
        assert!(filter.matches(&exchange));

        filter.status = Some(404);
        assert!(!filter.matches(&exchange));
    }

    #[test]
    fn connect_tunnel_is_flagged() {
        let exchange = Exchange::connect_tunnel("secure.test", 443);
        assert!(exchange.is_tunnel);
        assert_eq!(exchange.scheme, "https");
        assert_eq!(exchange.url, "https://secure.test:443");
        assert!(!exchange.has_response());
    }
}
