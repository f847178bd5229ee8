//! Scanner model: scans, configuration presets, and discovered issues

use super::EngineStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Expected impact of a finding, ordered critical > high > medium > low > info
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Stable string form used in summaries and filters
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

/// The probe's self-assessment of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Payload observably executed or reflected
    Certain,
    /// Strong signal such as a database error signature
    Firm,
    /// Weaker heuristic match
    Tentative,
}

/// Operator triage state of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    New,
    Confirmed,
    FalsePositive,
    Fixed,
}

/// Where in the message the finding was located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLocation {
    Query,
    Body,
    Header,
    Cookie,
}

/// What a scan derives its URL set from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source_type")]
pub enum ScanSource {
    /// Every site-map URL of a target
    Target { target_id: Uuid },
    /// The URL of one captured exchange
    Exchange { exchange_id: Uuid },
    /// An explicit URL list
    Urls { urls: Vec<String> },
}

/// Named preset of enabled checks with per-check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfigPreset {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled_checks: Vec<String>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanConfigPreset {
    /// Create a preset enabling the given checks
    pub fn new(name: impl Into<String>, enabled_checks: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            enabled_checks,
            settings: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One vulnerability scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub name: String,
    pub status: EngineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<Uuid>,

    #[serde(flatten)]
    pub source: ScanSource,
    pub enabled_checks: Vec<String>,

    /// `|urls| × |checks|`, fixed at start
    pub total_checks: u64,
    pub completed_checks: u64,
    pub issues_found: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Scan {
    /// Create a `configured` scan over the given source
    pub fn new(name: impl Into<String>, source: ScanSource, enabled_checks: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: EngineStatus::Configured,
            config_id: None,
            source,
            enabled_checks,
            total_checks: 0,
            completed_checks: 0,
            issues_found: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A discovered vulnerability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub scan_id: Uuid,

    /// Check id that raised the issue (`sql_injection`, `xss`, …)
    pub issue_type: String,
    pub severity: Severity,
    pub confidence: Confidence,

    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<IssueLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    pub status: IssueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_impact() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn scan_source_serialises_tagged() {
        let scan = Scan::new(
            "explicit",
            ScanSource::Urls {
                urls: vec!["http://a.test/".to_string()],
            },
            vec!["xss".to_string()],
        );
        let json = serde_json::to_value(&scan).expect("serialise");
        assert_eq!(json["source_type"], "urls");
        assert_eq!(json["urls"][0], "http://a.test/");
    }
}
