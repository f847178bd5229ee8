//! Workbench configuration
//!
//! All settings carry defaults so an empty config file (or none at all) yields
//! a working instance: proxy on 8080, operator API on 8000, CA material under
//! `./certs`.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a webintercept instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Intercepting proxy settings
    pub proxy: ProxyConfig,
    /// Operator REST/WebSocket API settings
    pub api: ApiConfig,
    /// HTTP/1.1 parser limits
    pub limits: HttpLimits,
}

/// Intercepting proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Bind address for the proxy listener
    pub host: String,
    /// Bind port for the proxy listener
    pub port: u16,
    /// Terminate TLS in CONNECT tunnels using forged leaf certificates.
    /// When false, CONNECT tunnels are piped opaquely.
    pub tls_mitm: bool,
    /// Directory holding `ca-cert.pem` / `ca-key.pem`
    pub cert_dir: PathBuf,
    /// Seconds an intercepted message waits for an operator decision before
    /// being forwarded unchanged
    pub intercept_timeout_secs: u64,
    /// Per-request upstream timeout in seconds
    pub upstream_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tls_mitm: true,
            cert_dir: PathBuf::from("./certs"),
            intercept_timeout_secs: 300,
            upstream_timeout_secs: 30,
        }
    }
}

/// Operator API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address for the operator API
    pub host: String,
    /// Bind port for the operator API
    pub port: u16,
    /// Origins allowed by the CORS layer
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// HTTP/1.1 message size limits enforced by the wire codec
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpLimits {
    /// Maximum request-line length in bytes
    pub max_request_line_bytes: usize,
    /// Maximum total header block size in bytes
    pub max_header_bytes: usize,
    /// Maximum body size in bytes
    pub max_body_bytes: usize,
}

impl Default for HttpLimits {
    fn default() -> Self {
        Self {
            max_request_line_bytes: 8 * 1024,
            max_header_bytes: 64 * 1024,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Load configuration from a YAML file if it exists, falling back to
    /// defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.proxy.port, 8080);
        assert_eq!(config.api.port, 8000);
        assert!(config.proxy.tls_mitm);
        assert_eq!(config.limits.max_request_line_bytes, 8192);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config: AppConfig =
            serde_yaml::from_str("proxy:\n  port: 9090\n").expect("valid yaml");
        assert_eq!(config.proxy.port, 9090);
        assert_eq!(config.proxy.host, "127.0.0.1");
        assert_eq!(config.api.port, 8000);
    }
}
