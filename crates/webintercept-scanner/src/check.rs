//! Check contract
//!
//! Checks are independent and stateless across invocations: each owns its own
//! HTTP client and connection pool, issues its probes sequentially, and
//! reports findings as plain values the orchestrator turns into issues.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use webintercept_core::model::{
    Confidence, HeaderList, Issue, IssueLocation, IssueStatus, Severity,
};
use webintercept_core::Result;

/// Per-request timeout shared by all checks
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// The input a check probes: a URL plus whatever request context the scan
/// source captured
#[derive(Debug, Clone)]
pub struct Probe {
    pub url: String,
    pub method: String,
    pub headers: HeaderList,
    pub body: Option<String>,
}

impl Probe {
    /// A bare GET probe for a URL
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HeaderList::new(),
            body: None,
        }
    }
}

/// One finding produced by a check, not yet attached to a scan
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub issue_type: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub title: String,
    pub description: String,
    pub url: String,
    pub method: String,
    pub parameter: Option<String>,
    pub location: Option<IssueLocation>,
    pub evidence: Option<String>,
    pub payload: Option<String>,
    pub remediation: Option<String>,
    pub references: Vec<String>,
}

impl CheckFinding {
    /// Attach the finding to a scan as a persistable issue
    pub fn into_issue(self, scan_id: Uuid) -> Issue {
        Issue {
            id: Uuid::new_v4(),
            scan_id,
            issue_type: self.issue_type,
            severity: self.severity,
            confidence: self.confidence,
            url: self.url,
            method: self.method,
            parameter: self.parameter,
            location: self.location,
            evidence: self.evidence,
            payload: self.payload,
            title: self.title,
            description: Some(self.description),
            remediation: self.remediation,
            references: self.references,
            status: IssueStatus::New,
            notes: None,
            discovered_at: Utc::now(),
        }
    }
}

/// Metadata describing an available check
#[derive(Debug, Clone, Serialize)]
pub struct CheckInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub severity: Severity,
}

/// A vulnerability check
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable identifier (`sql_injection`, `xss`, …)
    fn info(&self) -> CheckInfo;

    /// Probe the target and report findings. Probe failures inside the check
    /// are swallowed per-request; an `Err` here means the check could not run
    /// at all.
    async fn run(&self, probe: &Probe) -> Result<Vec<CheckFinding>>;
}

/// Build the HTTP client a check owns
pub(crate) fn check_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(CHECK_TIMEOUT)
        .build()?)
}

/// Decoded query parameters in document order
pub(crate) fn query_params(url: &Url) -> Vec<(String, String)> {
    url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

/// The same URL with one query parameter's value replaced (re-encoded)
pub(crate) fn with_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == name {
                (k.into_owned(), value.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    let mut rebuilt = url.clone();
    rebuilt
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    rebuilt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_param_replaces_only_the_named_parameter() {
        let url = Url::parse("http://t.test/item?id=1&page=2").expect("url");
        let probed = with_param(&url, "id", "1' OR 1=1");
        let params = query_params(&probed);
        assert_eq!(params[0], ("id".to_string(), "1' OR 1=1".to_string()));
        assert_eq!(params[1], ("page".to_string(), "2".to_string()));
        // The payload is percent-encoded on the wire.
        assert!(probed.as_str().contains("id=1%27+OR+1%3D1"));
    }
}
