//! In-memory repository
//!
//! Indexed maps behind `tokio::sync::RwLock`. Secondary filters are applied
//! in-scan, which is plenty for an operator-driven corpus; a disk-backed
//! store can replace this behind the same trait.

use super::{IssueFilter, Repository};
use crate::model::{
    Attack, AttackResult, Collection, CollectionItem, CrawlSession, CrawlUrl, CrawlUrlStatus,
    Exchange, ExchangeFilter, Issue, Page, Rule, Scan, ScanConfigPreset, SiteMapNode, Target,
    TokenAnalysis,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    exchanges: HashMap<Uuid, Exchange>,
    rules: HashMap<Uuid, Rule>,
    attacks: HashMap<Uuid, Attack>,
    attack_results: HashMap<Uuid, AttackResult>,
    crawl_sessions: HashMap<Uuid, CrawlSession>,
    crawl_urls: HashMap<Uuid, CrawlUrl>,
    /// Per-session frontier dedup index
    crawl_url_index: HashMap<Uuid, HashSet<String>>,
    scan_presets: HashMap<Uuid, ScanConfigPreset>,
    scans: HashMap<Uuid, Scan>,
    issues: HashMap<Uuid, Issue>,
    analyses: HashMap<Uuid, TokenAnalysis>,
    targets: HashMap<Uuid, Target>,
    site_nodes: HashMap<Uuid, SiteMapNode>,
    collections: HashMap<Uuid, Collection>,
    collection_items: HashMap<Uuid, CollectionItem>,
}

/// Default in-memory [`Repository`] implementation
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(mut items: Vec<T>, page: Page) -> Vec<T> {
    if page.offset >= items.len() {
        return Vec::new();
    }
    items.drain(..page.offset);
    items.truncate(page.limit);
    items
}

#[async_trait]
impl Repository for MemoryRepository {
    // ---- exchanges -------------------------------------------------------

    async fn put_exchange(&self, exchange: Exchange) -> Result<()> {
        self.tables.write().await.exchanges.insert(exchange.id, exchange);
        Ok(())
    }

    async fn update_exchange(&self, exchange: Exchange) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.exchanges.contains_key(&exchange.id) {
            return Err(Error::not_found(format!("exchange {}", exchange.id)));
        }
        tables.exchanges.insert(exchange.id, exchange);
        Ok(())
    }

    async fn get_exchange(&self, id: Uuid) -> Result<Exchange> {
        self.tables
            .read()
            .await
            .exchanges
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("exchange {id}")))
    }

    async fn list_exchanges(&self, filter: &ExchangeFilter, page: Page) -> Result<Vec<Exchange>> {
        let tables = self.tables.read().await;
        let mut matched: Vec<Exchange> =
            tables.exchanges.values().filter(|e| filter.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(matched, page))
    }

    async fn count_exchanges(&self, filter: &ExchangeFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.exchanges.values().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn delete_exchange(&self, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .exchanges
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("exchange {id}")))
    }

    async fn clear_exchanges(&self) -> Result<()> {
        self.tables.write().await.exchanges.clear();
        Ok(())
    }

    // ---- rules -----------------------------------------------------------

    async fn put_rule(&self, rule: Rule) -> Result<()> {
        self.tables.write().await.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn update_rule(&self, rule: Rule) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.rules.contains_key(&rule.id) {
            return Err(Error::not_found(format!("rule {}", rule.id)));
        }
        tables.rules.insert(rule.id, rule);
        Ok(())
    }

    async fn get_rule(&self, id: Uuid) -> Result<Rule> {
        self.tables
            .read()
            .await
            .rules
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("rule {id}")))
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let tables = self.tables.read().await;
        let mut rules: Vec<Rule> = tables.rules.values().cloned().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(rules)
    }

    async fn delete_rule(&self, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .rules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("rule {id}")))
    }

    // ---- intruder --------------------------------------------------------

    async fn put_attack(&self, attack: Attack) -> Result<()> {
        self.tables.write().await.attacks.insert(attack.id, attack);
        Ok(())
    }

    async fn update_attack(&self, attack: Attack) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.attacks.contains_key(&attack.id) {
            return Err(Error::not_found(format!("attack {}", attack.id)));
        }
        tables.attacks.insert(attack.id, attack);
        Ok(())
    }

    async fn get_attack(&self, id: Uuid) -> Result<Attack> {
        self.tables
            .read()
            .await
            .attacks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("attack {id}")))
    }

    async fn list_attacks(&self) -> Result<Vec<Attack>> {
        let tables = self.tables.read().await;
        let mut attacks: Vec<Attack> = tables.attacks.values().cloned().collect();
        attacks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(attacks)
    }

    async fn delete_attack(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .attacks
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("attack {id}")))?;
        tables.attack_results.retain(|_, r| r.attack_id != id);
        Ok(())
    }

    async fn put_attack_result(&self, result: AttackResult) -> Result<()> {
        self.tables.write().await.attack_results.insert(result.id, result);
        Ok(())
    }

    async fn list_attack_results(&self, attack_id: Uuid, page: Page) -> Result<Vec<AttackResult>> {
        let tables = self.tables.read().await;
        let mut results: Vec<AttackResult> = tables
            .attack_results
            .values()
            .filter(|r| r.attack_id == attack_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(paginate(results, page))
    }

    async fn get_attack_result(&self, attack_id: Uuid, result_id: Uuid) -> Result<AttackResult> {
        self.tables
            .read()
            .await
            .attack_results
            .get(&result_id)
            .filter(|r| r.attack_id == attack_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("result {result_id}")))
    }

    async fn count_attack_results(&self, attack_id: Uuid) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.attack_results.values().filter(|r| r.attack_id == attack_id).count() as u64)
    }

    async fn delete_attack_results(&self, attack_id: Uuid) -> Result<()> {
        self.tables.write().await.attack_results.retain(|_, r| r.attack_id != attack_id);
        Ok(())
    }

    // ---- spider ----------------------------------------------------------

    async fn put_crawl_session(&self, session: CrawlSession) -> Result<()> {
        self.tables.write().await.crawl_sessions.insert(session.id, session);
        Ok(())
    }

    async fn update_crawl_session(&self, session: CrawlSession) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.crawl_sessions.contains_key(&session.id) {
            return Err(Error::not_found(format!("crawl session {}", session.id)));
        }
        tables.crawl_sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_crawl_session(&self, id: Uuid) -> Result<CrawlSession> {
        self.tables
            .read()
            .await
            .crawl_sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("crawl session {id}")))
    }

    async fn list_crawl_sessions(&self) -> Result<Vec<CrawlSession>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<CrawlSession> = tables.crawl_sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn delete_crawl_session(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .crawl_sessions
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("crawl session {id}")))?;
        tables.crawl_urls.retain(|_, u| u.session_id != id);
        tables.crawl_url_index.remove(&id);
        Ok(())
    }

    async fn put_crawl_url(&self, url: CrawlUrl) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let seen = tables.crawl_url_index.entry(url.session_id).or_default();
        if !seen.insert(url.url.clone()) {
            return Ok(false);
        }
        tables.crawl_urls.insert(url.id, url);
        Ok(true)
    }

    async fn update_crawl_url(&self, url: CrawlUrl) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.crawl_urls.contains_key(&url.id) {
            return Err(Error::not_found(format!("crawl url {}", url.id)));
        }
        tables.crawl_urls.insert(url.id, url);
        Ok(())
    }

    async fn claim_next_queued_url(&self, session_id: Uuid, max_depth: u32) -> Result<Option<CrawlUrl>> {
        let mut tables = self.tables.write().await;
        let next_id = tables
            .crawl_urls
            .values()
            .filter(|u| {
                u.session_id == session_id
                    && u.status == CrawlUrlStatus::Queued
                    && u.depth <= max_depth
            })
            .min_by(|a, b| a.depth.cmp(&b.depth).then(a.discovered_at.cmp(&b.discovered_at)))
            .map(|u| u.id);
        Ok(next_id.and_then(|id| {
            tables.crawl_urls.get_mut(&id).map(|u| {
                u.status = CrawlUrlStatus::Crawling;
                u.clone()
            })
        }))
    }

    async fn list_crawl_urls(
        &self,
        session_id: Uuid,
        status: Option<CrawlUrlStatus>,
        page: Page,
    ) -> Result<Vec<CrawlUrl>> {
        let tables = self.tables.read().await;
        let mut urls: Vec<CrawlUrl> = tables
            .crawl_urls
            .values()
            .filter(|u| u.session_id == session_id && status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        urls.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at));
        Ok(paginate(urls, page))
    }

    async fn count_crawl_urls(&self, session_id: Uuid, status: Option<CrawlUrlStatus>) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .crawl_urls
            .values()
            .filter(|u| u.session_id == session_id && status.is_none_or(|s| u.status == s))
            .count() as u64)
    }

    // ---- scanner ---------------------------------------------------------

    async fn put_scan_preset(&self, preset: ScanConfigPreset) -> Result<()> {
        self.tables.write().await.scan_presets.insert(preset.id, preset);
        Ok(())
    }

    async fn update_scan_preset(&self, preset: ScanConfigPreset) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.scan_presets.contains_key(&preset.id) {
            return Err(Error::not_found(format!("scan config {}", preset.id)));
        }
        tables.scan_presets.insert(preset.id, preset);
        Ok(())
    }

    async fn get_scan_preset(&self, id: Uuid) -> Result<ScanConfigPreset> {
        self.tables
            .read()
            .await
            .scan_presets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("scan config {id}")))
    }

    async fn list_scan_presets(&self) -> Result<Vec<ScanConfigPreset>> {
        let tables = self.tables.read().await;
        let mut presets: Vec<ScanConfigPreset> = tables.scan_presets.values().cloned().collect();
        presets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(presets)
    }

    async fn delete_scan_preset(&self, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .scan_presets
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("scan config {id}")))
    }

    async fn put_scan(&self, scan: Scan) -> Result<()> {
        self.tables.write().await.scans.insert(scan.id, scan);
        Ok(())
    }

    async fn update_scan(&self, scan: Scan) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.scans.contains_key(&scan.id) {
            return Err(Error::not_found(format!("scan {}", scan.id)));
        }
        tables.scans.insert(scan.id, scan);
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> Result<Scan> {
        self.tables
            .read()
            .await
            .scans
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("scan {id}")))
    }

    async fn list_scans(&self) -> Result<Vec<Scan>> {
        let tables = self.tables.read().await;
        let mut scans: Vec<Scan> = tables.scans.values().cloned().collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(scans)
    }

    async fn delete_scan(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.scans.remove(&id).ok_or_else(|| Error::not_found(format!("scan {id}")))?;
        tables.issues.retain(|_, i| i.scan_id != id);
        Ok(())
    }

    async fn put_issue(&self, issue: Issue) -> Result<()> {
        self.tables.write().await.issues.insert(issue.id, issue);
        Ok(())
    }

    async fn update_issue(&self, issue: Issue) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.issues.contains_key(&issue.id) {
            return Err(Error::not_found(format!("issue {}", issue.id)));
        }
        tables.issues.insert(issue.id, issue);
        Ok(())
    }

    async fn get_issue(&self, id: Uuid) -> Result<Issue> {
        self.tables
            .read()
            .await
            .issues
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("issue {id}")))
    }

    async fn list_issues(&self, scan_id: Uuid, filter: &IssueFilter, page: Page) -> Result<Vec<Issue>> {
        let tables = self.tables.read().await;
        let mut issues: Vec<Issue> = tables
            .issues
            .values()
            .filter(|i| i.scan_id == scan_id && filter.matches(i))
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.discovered_at.cmp(&b.discovered_at)));
        Ok(paginate(issues, page))
    }

    async fn count_issues_by_severity(&self, scan_id: Uuid) -> Result<HashMap<String, u64>> {
        let tables = self.tables.read().await;
        let mut counts = HashMap::new();
        for issue in tables.issues.values().filter(|i| i.scan_id == scan_id) {
            *counts.entry(issue.severity.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    // ---- sequencer -------------------------------------------------------

    async fn put_analysis(&self, analysis: TokenAnalysis) -> Result<()> {
        self.tables.write().await.analyses.insert(analysis.id, analysis);
        Ok(())
    }

    async fn update_analysis(&self, analysis: TokenAnalysis) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.analyses.contains_key(&analysis.id) {
            return Err(Error::not_found(format!("analysis {}", analysis.id)));
        }
        tables.analyses.insert(analysis.id, analysis);
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<TokenAnalysis> {
        self.tables
            .read()
            .await
            .analyses
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("analysis {id}")))
    }

    async fn list_analyses(&self) -> Result<Vec<TokenAnalysis>> {
        let tables = self.tables.read().await;
        let mut analyses: Vec<TokenAnalysis> = tables.analyses.values().cloned().collect();
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(analyses)
    }

    async fn delete_analysis(&self, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .await
            .analyses
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("analysis {id}")))
    }

    // ---- targets ---------------------------------------------------------

    async fn put_target(&self, target: Target) -> Result<()> {
        self.tables.write().await.targets.insert(target.id, target);
        Ok(())
    }

    async fn update_target(&self, target: Target) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.targets.contains_key(&target.id) {
            return Err(Error::not_found(format!("target {}", target.id)));
        }
        tables.targets.insert(target.id, target);
        Ok(())
    }

    async fn get_target(&self, id: Uuid) -> Result<Target> {
        self.tables
            .read()
            .await
            .targets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("target {id}")))
    }

    async fn get_target_by_host(&self, host: &str) -> Result<Option<Target>> {
        let tables = self.tables.read().await;
        Ok(tables.targets.values().find(|t| t.host == host).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        let tables = self.tables.read().await;
        let mut targets: Vec<Target> = tables.targets.values().cloned().collect();
        targets.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(targets)
    }

    async fn delete_target(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.targets.remove(&id).ok_or_else(|| Error::not_found(format!("target {id}")))?;
        tables.site_nodes.retain(|_, n| n.target_id != id);
        Ok(())
    }

    async fn put_site_node(&self, node: SiteMapNode) -> Result<()> {
        self.tables.write().await.site_nodes.insert(node.id, node);
        Ok(())
    }

    async fn update_site_node(&self, node: SiteMapNode) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.site_nodes.contains_key(&node.id) {
            return Err(Error::not_found(format!("site node {}", node.id)));
        }
        tables.site_nodes.insert(node.id, node);
        Ok(())
    }

    async fn get_site_node_by_path(&self, target_id: Uuid, path: &str) -> Result<Option<SiteMapNode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .site_nodes
            .values()
            .find(|n| n.target_id == target_id && n.path == path)
            .cloned())
    }

    async fn list_site_nodes(&self, target_id: Uuid) -> Result<Vec<SiteMapNode>> {
        let tables = self.tables.read().await;
        let mut nodes: Vec<SiteMapNode> =
            tables.site_nodes.values().filter(|n| n.target_id == target_id).cloned().collect();
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(nodes)
    }

    // ---- collections -----------------------------------------------------

    async fn put_collection(&self, collection: Collection) -> Result<()> {
        self.tables.write().await.collections.insert(collection.id, collection);
        Ok(())
    }

    async fn update_collection(&self, collection: Collection) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.collections.contains_key(&collection.id) {
            return Err(Error::not_found(format!("collection {}", collection.id)));
        }
        tables.collections.insert(collection.id, collection);
        Ok(())
    }

    async fn get_collection(&self, id: Uuid) -> Result<Collection> {
        self.tables
            .read()
            .await
            .collections
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection {id}")))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let tables = self.tables.read().await;
        let mut collections: Vec<Collection> = tables.collections.values().cloned().collect();
        collections.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(collections)
    }

    async fn delete_collection(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .collections
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("collection {id}")))?;
        tables.collection_items.retain(|_, i| i.collection_id != id);
        Ok(())
    }

    async fn put_collection_item(&self, item: CollectionItem) -> Result<()> {
        self.tables.write().await.collection_items.insert(item.id, item);
        Ok(())
    }

    async fn list_collection_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<CollectionItem> = tables
            .collection_items
            .values()
            .filter(|i| i.collection_id == collection_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.order.cmp(&b.order).then(a.added_at.cmp(&b.added_at)));
        Ok(items)
    }

    async fn delete_collection_item(&self, collection_id: Uuid, item_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.collection_items.get(&item_id) {
            Some(item) if item.collection_id == collection_id => {
                tables.collection_items.remove(&item_id);
                Ok(())
            }
            _ => Err(Error::not_found(format!("collection item {item_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CrawlUrl;

    #[tokio::test]
    async fn exchange_round_trip_and_filter() {
        let repo = MemoryRepository::new();

        let mut a = Exchange::new("GET", "http://a.test/x", "a.test", "/x", "http");
        a.response_status = Some(200);
        let b = Exchange::new("POST", "http://b.test/y", "b.test", "/y", "http");
        repo.put_exchange(a.clone()).await.unwrap();
        repo.put_exchange(b.clone()).await.unwrap();

        let got = repo.get_exchange(a.id).await.unwrap();
        assert_eq!(got.url, "http://a.test/x");

        let filter = ExchangeFilter {
            method: Some("POST".to_string()),
            ..Default::default()
        };
        let posts = repo.list_exchanges(&filter, Page::default()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, b.id);

        assert!(repo.get_exchange(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn crawl_url_dedup_per_session() {
        let repo = MemoryRepository::new();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(repo
            .put_crawl_url(CrawlUrl::queued(session, "http://site.test/", 0, None))
            .await
            .unwrap());
        assert!(!repo
            .put_crawl_url(CrawlUrl::queued(session, "http://site.test/", 1, None))
            .await
            .unwrap());
        // Same URL in a different session is a different frontier entry.
        assert!(repo
            .put_crawl_url(CrawlUrl::queued(other, "http://site.test/", 0, None))
            .await
            .unwrap());

        assert_eq!(repo.count_crawl_urls(session, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_pops_smallest_depth_first() {
        let repo = MemoryRepository::new();
        let session = Uuid::new_v4();

        repo.put_crawl_url(CrawlUrl::queued(session, "http://site.test/deep", 2, None))
            .await
            .unwrap();
        repo.put_crawl_url(CrawlUrl::queued(session, "http://site.test/", 0, None))
            .await
            .unwrap();
        repo.put_crawl_url(CrawlUrl::queued(session, "http://site.test/a", 1, None))
            .await
            .unwrap();

        let first = repo.claim_next_queued_url(session, 3).await.unwrap().unwrap();
        assert_eq!(first.url, "http://site.test/");
        assert_eq!(first.status, CrawlUrlStatus::Crawling);

        let second = repo.claim_next_queued_url(session, 3).await.unwrap().unwrap();
        assert_eq!(second.depth, 1);

        // Depth bound excludes the remaining entry.
        assert!(repo.claim_next_queued_url(session, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_attack_cascades_results() {
        let repo = MemoryRepository::new();
        let attack = Attack::new("a", crate::model::AttackMode::Sniper, "GET", "http://t.test/");
        let attack_id = attack.id;
        repo.put_attack(attack).await.unwrap();
        repo.put_attack_result(AttackResult::new(attack_id, 0, vec!["x".into()], "http://t.test/"))
            .await
            .unwrap();
        assert_eq!(repo.count_attack_results(attack_id).await.unwrap(), 1);

        repo.delete_attack(attack_id).await.unwrap();
        assert_eq!(repo.count_attack_results(attack_id).await.unwrap(), 0);
    }
}
