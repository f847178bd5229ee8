//! Data model shared by the proxy, engines, repository, and operator surface

mod collection;
mod exchange;
pub mod headers;
mod intruder;
mod rule;
mod scanner;
mod sequencer;
mod spider;
mod target;

pub use collection::{Collection, CollectionItem};
pub use exchange::{Exchange, ExchangeFilter};
pub use headers::HeaderList;
pub use intruder::{Attack, AttackMode, AttackResult, Position, PositionField};
pub use rule::{ActionType, MatchType, Rule, RuleScope};
pub use scanner::{
    Confidence, Issue, IssueLocation, IssueStatus, Scan, ScanConfigPreset, ScanSource, Severity,
};
pub use sequencer::{
    AnalysisStatus, CharFrequency, EntropyReport, ExtractionRecipe, PatternReport, TokenAnalysis,
    TokenStatistics,
};
pub use spider::{CrawlSession, CrawlUrl, CrawlUrlStatus};
pub use target::{NodeType, SiteMapNode, Target};

use serde::{Deserialize, Serialize};

/// Lifecycle shared by attacks, crawl sessions, and scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Configured,
    Running,
    Paused,
    Completed,
    Error,
}

impl EngineStatus {
    /// Stable string form used in events and filters
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Page request for repository listings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

impl Page {
    /// Create a page request
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}
