//! Error types shared across the webintercept workspace

/// Result type alias for webintercept operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy.
///
/// Kinds map onto operator-visible outcomes: `Protocol` and `Upstream` become
/// synthetic 400/502 responses on the proxy path, `NotFound` and `Conflict`
/// become 404/400 on the operator surface, `InvalidConfig` is rejected before
/// an engine ever transitions to `running`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Upstream unreachable: {message}")]
    Upstream { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid hostname: {host}")]
    InvalidHostname { host: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflicting state: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Certificate error: {0}")]
    Certificate(#[from] rcgen::Error),
}

impl Error {
    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an upstream-unreachable error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid-hostname error
    pub fn invalid_hostname<S: Into<String>>(host: S) -> Self {
        Self::InvalidHostname { host: host.into() }
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a conflicting-state error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_preserve_messages() {
        let err = Error::invalid_config("overlapping positions");
        assert!(err.to_string().contains("overlapping positions"));

        let err = Error::not_found("attack 42");
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
