//! Spider crawl session and frontier models

use super::EngineStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured crawl over one or more seed URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSession {
    pub id: Uuid,
    pub name: String,
    pub status: EngineStatus,

    /// Start URLs; their hosts define the crawl scope
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u64,
    /// Worker pool size
    pub threads: usize,
    /// Sleep after each fetch per worker, in milliseconds
    pub delay_ms: u64,
    /// When non-empty, a URL must match at least one to be fetched
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// A URL matching any of these is skipped
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    pub respect_robots_txt: bool,
    pub follow_external_links: bool,

    pub pages_crawled: u64,
    pub pages_queued: u64,
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlSession {
    /// Create a `configured` session with default bounds
    pub fn new(name: impl Into<String>, seeds: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: EngineStatus::Configured,
            seeds,
            max_depth: 3,
            max_pages: 100,
            threads: 5,
            delay_ms: 100,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            respect_robots_txt: true,
            follow_external_links: false,
            pages_crawled: 0,
            pages_queued: 0,
            error_count: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Frontier state of a single URL within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlUrlStatus {
    Queued,
    Crawling,
    Crawled,
    Error,
    Skipped,
}

/// A discovered URL. `(session_id, url)` is unique: the frontier is
/// deduplicated globally per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlUrl {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Normalised URL, fragment stripped
    pub url: String,
    pub depth: u32,
    pub status: CrawlUrlStatus,
    /// Page on which this URL was discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub links_found: u32,
    pub forms_found: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub discovered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<DateTime<Utc>>,
}

impl CrawlUrl {
    /// Queue a URL at the given depth
    pub fn queued(session_id: Uuid, url: impl Into<String>, depth: u32, source_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            url: url.into(),
            depth,
            status: CrawlUrlStatus::Queued,
            source_url,
            response_status: None,
            content_type: None,
            content_length: None,
            response_time_ms: None,
            title: None,
            links_found: 0,
            forms_found: 0,
            error_message: None,
            discovered_at: Utc::now(),
            crawled_at: None,
        }
    }
}
