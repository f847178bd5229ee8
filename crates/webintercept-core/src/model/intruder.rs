//! Intruder attack model: templated requests with payload positions

use super::EngineStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload combination strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    /// One position substituted at a time, all others left at their original text
    Sniper,
    /// Every position receives the same payload from the first set
    BatteringRam,
    /// Sets iterated in parallel, truncated to the shortest
    Pitchfork,
    /// Cartesian product of all sets in position order
    ClusterBomb,
}

/// Which templated field a position indexes into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "name")]
pub enum PositionField {
    Url,
    Header(String),
    Body,
}

/// A byte range `[start, end)` inside one templated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(flatten)]
    pub field: PositionField,
    pub start: usize,
    pub end: usize,
}

impl Position {
    /// Position in the URL template
    pub fn url(start: usize, end: usize) -> Self {
        Self {
            field: PositionField::Url,
            start,
            end,
        }
    }

    /// Position in a header-value template
    pub fn header(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            field: PositionField::Header(name.into()),
            start,
            end,
        }
    }

    /// Position in the body template
    pub fn body(start: usize, end: usize) -> Self {
        Self {
            field: PositionField::Body,
            start,
            end,
        }
    }
}

/// A configured intruder attack. Immutable once running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attack {
    pub id: Uuid,
    pub name: String,
    /// Captured exchange this attack was derived from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_exchange_id: Option<Uuid>,

    pub mode: AttackMode,
    pub status: EngineStatus,

    pub method: String,
    pub url_template: String,
    /// Header name → value template
    #[serde(default)]
    pub header_templates: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,

    /// Substitution positions, one payload set index per entry
    pub positions: Vec<Position>,
    /// Ordered payload lists, one per position (or one shared)
    pub payload_sets: Vec<Vec<String>>,

    /// Worker pool size
    pub threads: usize,
    /// Sleep between requests per worker, in milliseconds
    pub delay_ms: u64,
    pub follow_redirects: bool,
    pub timeout_secs: u64,

    pub total_requests: u64,
    pub completed_requests: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Attack {
    /// Create a `configured` attack around a URL template
    pub fn new(name: impl Into<String>, mode: AttackMode, method: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_exchange_id: None,
            mode,
            status: EngineStatus::Configured,
            method: method.into(),
            url_template: url_template.into(),
            header_templates: Vec::new(),
            body_template: None,
            positions: Vec::new(),
            payload_sets: Vec::new(),
            threads: 1,
            delay_ms: 0,
            follow_redirects: true,
            timeout_secs: 30,
            total_requests: 0,
            completed_requests: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Outcome of one fired request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackResult {
    pub id: Uuid,
    pub attack_id: Uuid,
    /// Index of the combination in generation order
    pub combination_index: u64,
    /// Payloads substituted, one per position
    pub payloads: Vec<String>,

    pub request_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    /// Full response length in bytes, before truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Response body truncated to the configured cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<super::headers::HeaderList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AttackResult {
    /// Create a result shell for a combination about to be fired
    pub fn new(attack_id: Uuid, combination_index: u64, payloads: Vec<String>, request_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attack_id,
            combination_index,
            payloads,
            request_url: request_url.into(),
            request_body: None,
            response_status: None,
            response_length: None,
            response_time_ms: None,
            response_body: None,
            response_headers: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_field_serialises_with_tag() {
        let position = Position::header("X-Api-Key", 0, 5);
        let json = serde_json::to_value(&position).expect("serialise");
        assert_eq!(json["field"], "header");
        assert_eq!(json["name"], "X-Api-Key");
        assert_eq!(json["start"], 0);

        let url_pos = Position::url(3, 7);
        let json = serde_json::to_value(&url_pos).expect("serialise");
        assert_eq!(json["field"], "url");
        assert!(json.get("name").is_none());
    }
}
