//! Crawl executor
//!
//! BFS over a repository-backed frontier. Workers atomically claim the
//! shallowest queued URL, run the policy gates (robots, patterns, scope),
//! fetch, extract, and enqueue discoveries one level deeper. The frontier is
//! globally deduplicated per session by the repository.

use crate::extract::extract;
use crate::robots::RobotsCache;
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use webintercept_core::model::{CrawlSession, CrawlUrl, CrawlUrlStatus, EngineStatus};
use webintercept_core::{Error, EventBus, Repository, Result};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle workers poll the frontier at this interval while peers are busy
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Stopped,
}

struct ActiveCrawl {
    control: watch::Sender<RunState>,
    handle: tokio::task::JoinHandle<()>,
}

/// Drives spider crawl sessions
pub struct SpiderManager {
    repo: Arc<dyn Repository>,
    events: EventBus,
    active: Arc<Mutex<HashMap<Uuid, ActiveCrawl>>>,
}

impl SpiderManager {
    /// Create a manager with no running crawls
    pub fn new(repo: Arc<dyn Repository>, events: EventBus) -> Self {
        Self {
            repo,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True while the session's executor task is alive
    pub async fn is_active(&self, session_id: Uuid) -> bool {
        self.active
            .lock()
            .await
            .get(&session_id)
            .map(|c| !c.handle.is_finished())
            .unwrap_or(false)
    }

    /// Validate, seed the frontier, and launch the crawl
    pub async fn start(&self, session_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.get(&session_id).is_some_and(|c| !c.handle.is_finished()) {
            return Err(Error::conflict("crawl already running"));
        }

        let mut session = self.repo.get_crawl_session(session_id).await?;
        if session.status == EngineStatus::Running {
            return Err(Error::conflict("crawl already running"));
        }
        let ctx = CrawlCtx::build(self.repo.clone(), self.events.clone(), &session)?;

        // Seed the frontier; dedup makes re-seeding on restart harmless.
        for seed in &session.seeds {
            let mut url = Url::parse(seed)
                .map_err(|e| Error::invalid_config(format!("bad seed URL {seed:?}: {e}")))?;
            url.set_fragment(None);
            self.repo
                .put_crawl_url(CrawlUrl::queued(session_id, url.to_string(), 0, None))
                .await?;
        }

        session.status = EngineStatus::Running;
        session.started_at = Some(Utc::now());
        session.error_message = None;
        session.pages_queued = self
            .repo
            .count_crawl_urls(session_id, Some(CrawlUrlStatus::Queued))
            .await?;
        self.repo.update_crawl_session(session.clone()).await?;
        self.events.spider_progress(
            session_id,
            EngineStatus::Running,
            session.pages_crawled,
            session.pages_queued,
            session.error_count,
            None,
        );

        let (control, state_rx) = watch::channel(RunState::Running);
        let threads = session.threads.max(1);
        let handle = tokio::spawn(run_crawl(Arc::new(ctx), threads, state_rx));
        active.insert(session_id, ActiveCrawl { control, handle });
        Ok(())
    }

    /// Park the workers; queued URLs stay queued
    pub async fn pause(&self, session_id: Uuid) -> Result<()> {
        let active = self.active.lock().await;
        let entry = active
            .get(&session_id)
            .filter(|c| !c.handle.is_finished())
            .ok_or_else(|| Error::not_found("crawl is not running"))?;
        let _ = entry.control.send(RunState::Paused);
        drop(active);

        let mut session = self.repo.get_crawl_session(session_id).await?;
        session.status = EngineStatus::Paused;
        self.repo.update_crawl_session(session.clone()).await?;
        self.events.spider_progress(
            session_id,
            EngineStatus::Paused,
            session.pages_crawled,
            session.pages_queued,
            session.error_count,
            None,
        );
        Ok(())
    }

    /// Wake parked workers. Gates re-evaluate under current settings, so a
    /// URL queued before a settings change may still end up `skipped`.
    pub async fn resume(&self, session_id: Uuid) -> Result<()> {
        let active = self.active.lock().await;
        let entry = active
            .get(&session_id)
            .filter(|c| !c.handle.is_finished())
            .ok_or_else(|| Error::not_found("crawl is not running"))?;
        if *entry.control.borrow() != RunState::Paused {
            return Err(Error::conflict("crawl is not paused"));
        }

        // Status flips before the workers wake: a worker re-reads the session
        // on wake-up and must see `running`.
        let mut session = self.repo.get_crawl_session(session_id).await?;
        session.status = EngineStatus::Running;
        self.repo.update_crawl_session(session).await?;

        let _ = entry.control.send(RunState::Running);
        Ok(())
    }

    /// Stop the crawl and mark it completed
    pub async fn stop(&self, session_id: Uuid) -> Result<()> {
        let entry = self.active.lock().await.remove(&session_id);
        if let Some(entry) = entry {
            let _ = entry.control.send(RunState::Stopped);
            let _ = entry.handle.await;
        }

        if let Ok(mut session) = self.repo.get_crawl_session(session_id).await {
            if session.status != EngineStatus::Completed {
                session.status = EngineStatus::Completed;
                session.completed_at = Some(Utc::now());
                self.repo.update_crawl_session(session.clone()).await?;
                self.events.spider_progress(
                    session_id,
                    EngineStatus::Completed,
                    session.pages_crawled,
                    session.pages_queued,
                    session.error_count,
                    None,
                );
            }
        }
        Ok(())
    }
}

struct CrawlCtx {
    repo: Arc<dyn Repository>,
    events: EventBus,
    session_id: Uuid,
    seed_host: Option<String>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    respect_robots: bool,
    follow_external: bool,
    max_depth: u32,
    max_pages: u64,
    delay: Duration,
    client: reqwest::Client,
    robots: RobotsCache,
    /// Serialises session counter updates
    progress: Mutex<()>,
    /// Workers currently processing a claimed URL
    busy: AtomicUsize,
    finalized: AtomicBool,
}

impl CrawlCtx {
    fn build(repo: Arc<dyn Repository>, events: EventBus, session: &CrawlSession) -> Result<Self> {
        if session.seeds.is_empty() {
            return Err(Error::invalid_config("crawl session has no seed URLs"));
        }
        let seed_url = Url::parse(&session.seeds[0])
            .map_err(|e| Error::invalid_config(format!("bad seed URL: {e}")))?;
        if !matches!(seed_url.scheme(), "http" | "https") {
            return Err(Error::invalid_config(format!(
                "seed URL scheme must be http(s): {seed_url}"
            )));
        }

        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| Error::invalid_config(format!("bad pattern {p:?}: {e}")))
                })
                .collect()
        };

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self {
            repo,
            events,
            session_id: session.id,
            seed_host: seed_url.host_str().map(str::to_string),
            include: compile(&session.include_patterns)?,
            exclude: compile(&session.exclude_patterns)?,
            respect_robots: session.respect_robots_txt,
            follow_external: session.follow_external_links,
            max_depth: session.max_depth,
            max_pages: session.max_pages,
            delay: Duration::from_millis(session.delay_ms),
            client,
            robots: RobotsCache::new()?,
            progress: Mutex::new(()),
            busy: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
        })
    }
}

async fn run_crawl(ctx: Arc<CrawlCtx>, threads: usize, state_rx: watch::Receiver<RunState>) {
    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let ctx = ctx.clone();
        let mut state = state_rx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                // Pause gate.
                loop {
                    let current = *state.borrow();
                    match current {
                        RunState::Running => break,
                        RunState::Stopped => return,
                        RunState::Paused => {
                            if state.changed().await.is_err() {
                                return;
                            }
                        }
                    }
                }

                // Page budget.
                let session = match ctx.repo.get_crawl_session(ctx.session_id).await {
                    Ok(session) => session,
                    Err(err) => {
                        debug!(error = %err, "crawl session vanished");
                        return;
                    }
                };
                if session.status != EngineStatus::Running {
                    return;
                }
                if session.pages_crawled >= ctx.max_pages {
                    finalize(&ctx).await;
                    return;
                }

                // Busy is raised across claim + process so an idle peer never
                // declares the crawl finished while a discovery is pending.
                ctx.busy.fetch_add(1, Ordering::SeqCst);
                let claimed = match ctx
                    .repo
                    .claim_next_queued_url(ctx.session_id, ctx.max_depth)
                    .await
                {
                    Ok(claimed) => claimed,
                    Err(err) => {
                        ctx.busy.fetch_sub(1, Ordering::SeqCst);
                        warn!(error = %err, "frontier claim failed");
                        return;
                    }
                };

                let Some(crawl_url) = claimed else {
                    let peers_busy = ctx.busy.fetch_sub(1, Ordering::SeqCst) > 1;
                    if !peers_busy {
                        finalize(&ctx).await;
                        return;
                    }
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                };

                process_url(&ctx, crawl_url).await;
                ctx.busy.fetch_sub(1, Ordering::SeqCst);

                if !ctx.delay.is_zero() {
                    tokio::time::sleep(ctx.delay).await;
                }
            }
        }));
    }
    for worker in workers {
        let _ = worker.await;
    }
}

/// Mark the session completed exactly once
async fn finalize(ctx: &CrawlCtx) {
    if ctx.finalized.swap(true, Ordering::SeqCst) {
        return;
    }
    let Ok(mut session) = ctx.repo.get_crawl_session(ctx.session_id).await else {
        return;
    };
    if session.status != EngineStatus::Running {
        return;
    }
    session.status = EngineStatus::Completed;
    session.completed_at = Some(Utc::now());
    if ctx.repo.update_crawl_session(session.clone()).await.is_err() {
        return;
    }
    ctx.events.spider_progress(
        ctx.session_id,
        EngineStatus::Completed,
        session.pages_crawled,
        session.pages_queued,
        session.error_count,
        None,
    );
}

async fn process_url(ctx: &CrawlCtx, mut crawl_url: CrawlUrl) {
    let parsed = match Url::parse(&crawl_url.url) {
        Ok(parsed) => parsed,
        Err(err) => {
            crawl_url.status = CrawlUrlStatus::Error;
            crawl_url.error_message = Some(format!("unparseable URL: {err}"));
            store_url(ctx, crawl_url, true).await;
            return;
        }
    };

    // Policy gates, in order: robots, patterns, scope.
    if ctx.respect_robots && !ctx.robots.is_allowed(&parsed).await {
        crawl_url.status = CrawlUrlStatus::Skipped;
        crawl_url.error_message = Some("blocked by robots.txt".to_string());
        store_url(ctx, crawl_url, false).await;
        return;
    }
    if !matches_patterns(&ctx.include, &ctx.exclude, &crawl_url.url) {
        crawl_url.status = CrawlUrlStatus::Skipped;
        crawl_url.error_message = Some("filtered by patterns".to_string());
        store_url(ctx, crawl_url, false).await;
        return;
    }
    if !ctx.follow_external && parsed.host_str() != ctx.seed_host.as_deref() {
        crawl_url.status = CrawlUrlStatus::Skipped;
        crawl_url.error_message = Some("outside crawl scope".to_string());
        store_url(ctx, crawl_url, false).await;
        return;
    }

    let started = Instant::now();
    match ctx.client.get(parsed.as_str()).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.unwrap_or_default();

            crawl_url.response_status = Some(status);
            crawl_url.content_type = content_type.clone();
            crawl_url.content_length = Some(body.len());
            crawl_url.response_time_ms = Some(started.elapsed().as_millis() as u64);
            crawl_url.status = CrawlUrlStatus::Crawled;
            crawl_url.crawled_at = Some(Utc::now());

            if content_type.as_deref().unwrap_or("").contains("text/html") {
                let page = extract(&String::from_utf8_lossy(&body), &parsed);
                crawl_url.links_found = page.links.len() as u32;
                crawl_url.forms_found = page.form_count;
                crawl_url.title = page.title;

                // Depth bounds enqueue: links one past max_depth are never added.
                if crawl_url.depth < ctx.max_depth {
                    for link in page.links {
                        let queued = CrawlUrl::queued(
                            ctx.session_id,
                            link,
                            crawl_url.depth + 1,
                            Some(crawl_url.url.clone()),
                        );
                        if let Err(err) = ctx.repo.put_crawl_url(queued).await {
                            warn!(error = %err, "failed to enqueue discovered URL");
                        }
                    }
                }
            }

            store_url(ctx, crawl_url, true).await;
        }
        Err(err) => {
            crawl_url.status = CrawlUrlStatus::Error;
            crawl_url.error_message = Some(err.to_string());
            crawl_url.response_time_ms = Some(started.elapsed().as_millis() as u64);
            store_url(ctx, crawl_url, true).await;
        }
    }
}

/// Persist the URL row and refresh session counters + events
async fn store_url(ctx: &CrawlCtx, crawl_url: CrawlUrl, count_progress: bool) {
    if let Err(err) = ctx.repo.update_crawl_url(crawl_url.clone()).await {
        warn!(error = %err, "failed to persist crawl URL");
        return;
    }

    let _guard = ctx.progress.lock().await;
    let Ok(mut session) = ctx.repo.get_crawl_session(ctx.session_id).await else {
        return;
    };
    if count_progress && crawl_url.status == CrawlUrlStatus::Crawled {
        session.pages_crawled += 1;
    }
    if crawl_url.status == CrawlUrlStatus::Error {
        session.error_count += 1;
    }
    session.pages_queued = ctx
        .repo
        .count_crawl_urls(ctx.session_id, Some(CrawlUrlStatus::Queued))
        .await
        .unwrap_or(session.pages_queued);
    if let Err(err) = ctx.repo.update_crawl_session(session.clone()).await {
        warn!(error = %err, "failed to persist crawl progress");
        return;
    }
    drop(_guard);

    ctx.events.spider_progress(
        ctx.session_id,
        session.status,
        session.pages_crawled,
        session.pages_queued,
        session.error_count,
        Some(&crawl_url.url),
    );
    ctx.events.spider_url(ctx.session_id, &crawl_url);
}

fn matches_patterns(include: &[Regex], exclude: &[Regex], url: &str) -> bool {
    if !include.is_empty() && !include.iter().any(|p| p.is_match(url)) {
        return false;
    }
    !exclude.iter().any(|p| p.is_match(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_gate_combines_include_and_exclude() {
        let include = vec![Regex::new(r"/docs/").expect("regex")];
        let exclude = vec![Regex::new(r"\.pdf$").expect("regex")];

        assert!(matches_patterns(&include, &exclude, "http://s.test/docs/a"));
        assert!(!matches_patterns(&include, &exclude, "http://s.test/blog/a"));
        assert!(!matches_patterns(&include, &exclude, "http://s.test/docs/a.pdf"));
        assert!(matches_patterns(&[], &exclude, "http://s.test/anything"));
    }
}
