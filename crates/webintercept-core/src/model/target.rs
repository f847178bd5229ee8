//! Targets and their site maps, accumulated from captured traffic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observed host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    /// Hostname, unique per repository
    pub host: String,
    pub in_scope: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub request_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Target {
    /// Create a target for a newly observed host
    pub fn new(host: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            in_scope: true,
            notes: None,
            request_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Node kind within a site map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Folder,
    File,
}

/// One observed path on a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteMapNode {
    pub id: Uuid,
    pub target_id: Uuid,
    /// Path with query string stripped
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    pub node_type: NodeType,

    /// Methods observed on this path
    pub methods: Vec<String>,
    /// Response status codes observed
    pub status_codes: Vec<u16>,
    /// Response content types observed
    pub content_types: Vec<String>,
    /// Query parameter names observed
    pub parameters: Vec<String>,

    pub request_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SiteMapNode {
    /// Create a node for a newly observed path
    pub fn new(target_id: Uuid, path: impl Into<String>, parent_path: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_id,
            path: path.into(),
            parent_path,
            node_type: NodeType::File,
            methods: Vec::new(),
            status_codes: Vec::new(),
            content_types: Vec::new(),
            parameters: Vec::new(),
            request_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Record an observation, deduplicating the enumerated columns
    pub fn observe(
        &mut self,
        method: &str,
        status: Option<u16>,
        content_type: Option<&str>,
        timestamp: DateTime<Utc>,
    ) {
        if !self.methods.iter().any(|m| m == method) {
            self.methods.push(method.to_string());
        }
        if let Some(status) = status {
            if !self.status_codes.contains(&status) {
                self.status_codes.push(status);
            }
        }
        if let Some(ct) = content_type {
            if !self.content_types.iter().any(|c| c == ct) {
                self.content_types.push(ct.to_string());
            }
        }
        self.request_count += 1;
        if timestamp < self.first_seen {
            self.first_seen = timestamp;
        }
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }
    }
}
