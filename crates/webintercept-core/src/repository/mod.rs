//! Persistence seam
//!
//! Every component stores and retrieves its entities through [`Repository`];
//! nothing in the workspace depends on a concrete storage technology. Any
//! store providing key lookup, secondary filters on the indexed columns, and
//! ordered iteration can sit behind this trait. The bundled implementation is
//! [`MemoryRepository`].

mod memory;

pub use memory::MemoryRepository;

use crate::model::{
    Attack, AttackResult, Collection, CollectionItem, CrawlSession, CrawlUrl, CrawlUrlStatus,
    Exchange, ExchangeFilter, Issue, IssueStatus, Page, Rule, Scan, ScanConfigPreset, Severity,
    SiteMapNode, Target, TokenAnalysis,
};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Filter for issue listings
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub severity: Option<Severity>,
    pub issue_type: Option<String>,
    pub status: Option<IssueStatus>,
}

impl IssueFilter {
    /// True when the issue passes every populated criterion
    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(severity) = self.severity {
            if issue.severity != severity {
                return false;
            }
        }
        if let Some(ref issue_type) = self.issue_type {
            if &issue.issue_type != issue_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if issue.status != status {
                return false;
            }
        }
        true
    }
}

/// Technology-agnostic persistence contract.
///
/// Each call is its own transaction; callers must not assume atomicity across
/// calls. Deleting a parent deletes its children (results, frontier URLs,
/// issues, site-map nodes, collection items).
#[async_trait]
pub trait Repository: Send + Sync {
    // ---- exchanges -------------------------------------------------------

    async fn put_exchange(&self, exchange: Exchange) -> Result<()>;
    async fn update_exchange(&self, exchange: Exchange) -> Result<()>;
    async fn get_exchange(&self, id: Uuid) -> Result<Exchange>;
    /// Newest first
    async fn list_exchanges(&self, filter: &ExchangeFilter, page: Page) -> Result<Vec<Exchange>>;
    async fn count_exchanges(&self, filter: &ExchangeFilter) -> Result<u64>;
    async fn delete_exchange(&self, id: Uuid) -> Result<()>;
    async fn clear_exchanges(&self) -> Result<()>;

    // ---- rules -----------------------------------------------------------

    async fn put_rule(&self, rule: Rule) -> Result<()>;
    async fn update_rule(&self, rule: Rule) -> Result<()>;
    async fn get_rule(&self, id: Uuid) -> Result<Rule>;
    /// Priority-descending
    async fn list_rules(&self) -> Result<Vec<Rule>>;
    async fn delete_rule(&self, id: Uuid) -> Result<()>;

    // ---- intruder --------------------------------------------------------

    async fn put_attack(&self, attack: Attack) -> Result<()>;
    async fn update_attack(&self, attack: Attack) -> Result<()>;
    async fn get_attack(&self, id: Uuid) -> Result<Attack>;
    /// Newest first
    async fn list_attacks(&self) -> Result<Vec<Attack>>;
    /// Deletes the attack's results too
    async fn delete_attack(&self, id: Uuid) -> Result<()>;

    async fn put_attack_result(&self, result: AttackResult) -> Result<()>;
    /// Ordered by completion time
    async fn list_attack_results(&self, attack_id: Uuid, page: Page) -> Result<Vec<AttackResult>>;
    async fn get_attack_result(&self, attack_id: Uuid, result_id: Uuid) -> Result<AttackResult>;
    async fn count_attack_results(&self, attack_id: Uuid) -> Result<u64>;
    async fn delete_attack_results(&self, attack_id: Uuid) -> Result<()>;

    // ---- spider ----------------------------------------------------------

    async fn put_crawl_session(&self, session: CrawlSession) -> Result<()>;
    async fn update_crawl_session(&self, session: CrawlSession) -> Result<()>;
    async fn get_crawl_session(&self, id: Uuid) -> Result<CrawlSession>;
    async fn list_crawl_sessions(&self) -> Result<Vec<CrawlSession>>;
    /// Deletes the session's frontier too
    async fn delete_crawl_session(&self, id: Uuid) -> Result<()>;

    /// Insert a frontier URL. Returns `false` (and stores nothing) when the
    /// session already holds this URL — the per-session dedup invariant.
    async fn put_crawl_url(&self, url: CrawlUrl) -> Result<bool>;
    async fn update_crawl_url(&self, url: CrawlUrl) -> Result<()>;
    /// Atomically pop the queued URL with the smallest depth (ties broken by
    /// discovery order) at or below `max_depth`, marking it `crawling`.
    async fn claim_next_queued_url(&self, session_id: Uuid, max_depth: u32) -> Result<Option<CrawlUrl>>;
    async fn list_crawl_urls(
        &self,
        session_id: Uuid,
        status: Option<CrawlUrlStatus>,
        page: Page,
    ) -> Result<Vec<CrawlUrl>>;
    async fn count_crawl_urls(&self, session_id: Uuid, status: Option<CrawlUrlStatus>) -> Result<u64>;

    // ---- scanner ---------------------------------------------------------

    async fn put_scan_preset(&self, preset: ScanConfigPreset) -> Result<()>;
    async fn update_scan_preset(&self, preset: ScanConfigPreset) -> Result<()>;
    async fn get_scan_preset(&self, id: Uuid) -> Result<ScanConfigPreset>;
    async fn list_scan_presets(&self) -> Result<Vec<ScanConfigPreset>>;
    async fn delete_scan_preset(&self, id: Uuid) -> Result<()>;

    async fn put_scan(&self, scan: Scan) -> Result<()>;
    async fn update_scan(&self, scan: Scan) -> Result<()>;
    async fn get_scan(&self, id: Uuid) -> Result<Scan>;
    async fn list_scans(&self) -> Result<Vec<Scan>>;
    /// Deletes the scan's issues too
    async fn delete_scan(&self, id: Uuid) -> Result<()>;

    async fn put_issue(&self, issue: Issue) -> Result<()>;
    async fn update_issue(&self, issue: Issue) -> Result<()>;
    async fn get_issue(&self, id: Uuid) -> Result<Issue>;
    async fn list_issues(&self, scan_id: Uuid, filter: &IssueFilter, page: Page) -> Result<Vec<Issue>>;
    /// Issue counts keyed by severity string
    async fn count_issues_by_severity(&self, scan_id: Uuid) -> Result<HashMap<String, u64>>;

    // ---- sequencer -------------------------------------------------------

    async fn put_analysis(&self, analysis: TokenAnalysis) -> Result<()>;
    async fn update_analysis(&self, analysis: TokenAnalysis) -> Result<()>;
    async fn get_analysis(&self, id: Uuid) -> Result<TokenAnalysis>;
    async fn list_analyses(&self) -> Result<Vec<TokenAnalysis>>;
    async fn delete_analysis(&self, id: Uuid) -> Result<()>;

    // ---- targets ---------------------------------------------------------

    async fn put_target(&self, target: Target) -> Result<()>;
    async fn update_target(&self, target: Target) -> Result<()>;
    async fn get_target(&self, id: Uuid) -> Result<Target>;
    async fn get_target_by_host(&self, host: &str) -> Result<Option<Target>>;
    /// Most recently seen first
    async fn list_targets(&self) -> Result<Vec<Target>>;
    /// Deletes the target's site-map nodes too
    async fn delete_target(&self, id: Uuid) -> Result<()>;

    async fn put_site_node(&self, node: SiteMapNode) -> Result<()>;
    async fn update_site_node(&self, node: SiteMapNode) -> Result<()>;
    async fn get_site_node_by_path(&self, target_id: Uuid, path: &str) -> Result<Option<SiteMapNode>>;
    /// Ordered by path
    async fn list_site_nodes(&self, target_id: Uuid) -> Result<Vec<SiteMapNode>>;

    // ---- collections -----------------------------------------------------

    async fn put_collection(&self, collection: Collection) -> Result<()>;
    async fn update_collection(&self, collection: Collection) -> Result<()>;
    async fn get_collection(&self, id: Uuid) -> Result<Collection>;
    async fn list_collections(&self) -> Result<Vec<Collection>>;
    /// Deletes the collection's items too
    async fn delete_collection(&self, id: Uuid) -> Result<()>;

    async fn put_collection_item(&self, item: CollectionItem) -> Result<()>;
    async fn list_collection_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>>;
    async fn delete_collection_item(&self, collection_id: Uuid, item_id: Uuid) -> Result<()>;
}
