//! Upstream forwarding
//!
//! The proxy reconstructs each captured request on a shared HTTP client and
//! relays the buffered answer. Redirects are never followed here — the
//! browser on the other side of the proxy owns that behaviour — and invalid
//! upstream certificates are accepted, as interception targets routinely
//! carry self-signed material.

use std::time::{Duration, Instant};
use webintercept_core::model::HeaderList;
use webintercept_core::{Error, Result};

/// Headers that belong to one hop and must not be relayed
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "proxy-authorization",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "host",
    "content-length",
];

/// A buffered upstream answer
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    pub duration_ms: u64,
}

/// Shared upstream HTTP client
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    /// Build a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Send a captured request upstream and buffer the response
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &HeaderList,
        body: Option<&[u8]>,
    ) -> Result<ForwardedResponse> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::protocol(format!("unsupported method: {method}")))?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter() {
            if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let started = Instant::now();
        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();

        let mut response_headers = HeaderList::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.append(name.as_str(), value);
            }
        }

        let body = response.bytes().await.map_err(map_send_error)?.to_vec();
        let duration_ms = started.elapsed().as_millis() as u64;

        Ok(ForwardedResponse {
            status,
            headers: response_headers,
            body,
            duration_ms,
        })
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err.to_string())
    } else {
        Error::upstream(err.to_string())
    }
}

/// Synthetic status code for a failed forward: 504 on timeout, 502 otherwise
pub fn error_status(err: &Error) -> u16 {
    match err {
        Error::Timeout { .. } => 504,
        _ => 502,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_filter_covers_framing_headers() {
        for name in ["Connection", "Transfer-Encoding", "Host", "Content-Length"] {
            assert!(HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()));
        }
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(error_status(&Error::timeout("deadline")), 504);
        assert_eq!(error_status(&Error::upstream("refused")), 502);
    }
}
