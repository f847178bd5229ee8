//! Scan orchestrator
//!
//! Derives the URL set from the scan source, then walks url × check pairs
//! sequentially, persisting issues and advancing `completed_checks` whether a
//! check succeeds or fails. Cancellation is status-driven: the loop re-reads
//! the scan between pairs and stops issuing probes once the status leaves
//! `running`; in-flight requests finish.

use crate::check::{Check, CheckInfo, Probe};
use crate::checks::all_checks;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use webintercept_core::model::{EngineStatus, Scan, ScanSource};
use webintercept_core::{Error, EventBus, Repository, Result};

/// Drives vulnerability scans
pub struct ScannerManager {
    repo: Arc<dyn Repository>,
    events: EventBus,
    checks: Vec<Arc<dyn Check>>,
    active: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
}

impl ScannerManager {
    /// Create a manager with the built-in check set
    pub fn new(repo: Arc<dyn Repository>, events: EventBus) -> Result<Self> {
        Ok(Self {
            repo,
            events,
            checks: all_checks()?,
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Metadata for every available check
    pub fn available_checks(&self) -> Vec<CheckInfo> {
        self.checks.iter().map(|c| c.info()).collect()
    }

    /// True while the scan's orchestrator task is alive
    pub async fn is_active(&self, scan_id: Uuid) -> bool {
        self.active
            .lock()
            .await
            .get(&scan_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Validate, resolve the URL set, and launch the scan
    pub async fn start(&self, scan_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.get(&scan_id).is_some_and(|h| !h.is_finished()) {
            return Err(Error::conflict("scan already running"));
        }

        let mut scan = self.repo.get_scan(scan_id).await?;
        if scan.status == EngineStatus::Running {
            return Err(Error::conflict("scan already running"));
        }

        let enabled: Vec<Arc<dyn Check>> = {
            let mut enabled = Vec::new();
            for id in &scan.enabled_checks {
                let check = self
                    .checks
                    .iter()
                    .find(|c| c.info().id == id)
                    .ok_or_else(|| Error::invalid_config(format!("unknown check id: {id}")))?;
                enabled.push(check.clone());
            }
            enabled
        };
        if enabled.is_empty() {
            return Err(Error::invalid_config("scan has no enabled checks"));
        }

        let probes = self.resolve_probes(&scan).await?;
        if probes.is_empty() {
            return Err(Error::invalid_config("scan source yields no URLs"));
        }

        scan.total_checks = (probes.len() * enabled.len()) as u64;
        scan.completed_checks = 0;
        scan.issues_found = 0;
        scan.status = EngineStatus::Running;
        scan.started_at = Some(Utc::now());
        scan.completed_at = None;
        scan.error_message = None;
        self.repo.update_scan(scan.clone()).await?;
        self.events.scan_progress(
            scan_id,
            EngineStatus::Running,
            scan.total_checks,
            0,
            0,
            None,
            None,
        );

        let repo = self.repo.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(run_scan(repo, events, scan_id, probes, enabled));
        active.insert(scan_id, handle);
        Ok(())
    }

    /// Mark the scan paused; the orchestrator stops at the next check boundary
    pub async fn pause(&self, scan_id: Uuid) -> Result<()> {
        let mut scan = self.repo.get_scan(scan_id).await?;
        if scan.status != EngineStatus::Running {
            return Err(Error::conflict("scan is not running"));
        }
        scan.status = EngineStatus::Paused;
        self.repo.update_scan(scan.clone()).await?;
        self.events.scan_progress(
            scan_id,
            EngineStatus::Paused,
            scan.total_checks,
            scan.completed_checks,
            scan.issues_found,
            None,
            None,
        );
        Ok(())
    }

    /// Stop the scan and mark it completed
    pub async fn stop(&self, scan_id: Uuid) -> Result<()> {
        let mut scan = self.repo.get_scan(scan_id).await?;
        scan.status = EngineStatus::Completed;
        scan.completed_at = Some(Utc::now());
        self.repo.update_scan(scan.clone()).await?;
        self.events.scan_progress(
            scan_id,
            EngineStatus::Completed,
            scan.total_checks,
            scan.completed_checks,
            scan.issues_found,
            None,
            None,
        );
        self.active.lock().await.remove(&scan_id);
        Ok(())
    }

    /// Derive the probe set from the scan source
    async fn resolve_probes(&self, scan: &Scan) -> Result<Vec<Probe>> {
        match &scan.source {
            ScanSource::Urls { urls } => Ok(urls.iter().map(Probe::get).collect()),
            ScanSource::Exchange { exchange_id } => {
                let exchange = self.repo.get_exchange(*exchange_id).await?;
                Ok(vec![Probe {
                    url: exchange.url.clone(),
                    method: exchange.method.clone(),
                    headers: exchange.request_headers.clone(),
                    body: exchange
                        .request_body
                        .as_ref()
                        .map(|b| String::from_utf8_lossy(b).into_owned()),
                }])
            }
            ScanSource::Target { target_id } => {
                let target = self.repo.get_target(*target_id).await?;
                let nodes = self.repo.list_site_nodes(*target_id).await?;
                Ok(nodes
                    .iter()
                    .map(|node| Probe::get(format!("https://{}{}", target.host, node.path)))
                    .collect())
            }
        }
    }
}

async fn run_scan(
    repo: Arc<dyn Repository>,
    events: EventBus,
    scan_id: Uuid,
    probes: Vec<Probe>,
    checks: Vec<Arc<dyn Check>>,
) {
    for probe in &probes {
        for check in &checks {
            // Cancellation boundary: stop issuing probes once the status
            // leaves `running` (stopped scans are already `completed`,
            // paused scans keep their new state).
            let scan = match repo.get_scan(scan_id).await {
                Ok(scan) => scan,
                Err(err) => {
                    debug!(error = %err, "scan vanished mid-run");
                    return;
                }
            };
            if scan.status != EngineStatus::Running {
                return;
            }

            let info = check.info();
            events.scan_progress(
                scan_id,
                scan.status,
                scan.total_checks,
                scan.completed_checks,
                scan.issues_found,
                Some(info.name),
                Some(&probe.url),
            );

            let mut new_issues = 0u64;
            match check.run(probe).await {
                Ok(findings) => {
                    for finding in findings {
                        let issue = finding.into_issue(scan_id);
                        if let Err(err) = repo.put_issue(issue).await {
                            warn!(error = %err, "failed to persist issue");
                            continue;
                        }
                        new_issues += 1;
                    }
                }
                Err(err) => {
                    debug!(check = info.id, url = %probe.url, error = %err, "check failed");
                }
            }

            // Re-read before writing counters: a pause or stop may have
            // landed while the check ran, and its status must survive.
            let mut scan = match repo.get_scan(scan_id).await {
                Ok(scan) => scan,
                Err(_) => return,
            };
            scan.issues_found += new_issues;
            scan.completed_checks += 1;
            if let Err(err) = repo.update_scan(scan).await {
                warn!(error = %err, "failed to persist scan progress");
                return;
            }
        }
    }

    // Natural completion.
    let Ok(mut scan) = repo.get_scan(scan_id).await else {
        return;
    };
    if scan.status == EngineStatus::Running {
        scan.status = EngineStatus::Completed;
        scan.completed_at = Some(Utc::now());
        if repo.update_scan(scan.clone()).await.is_err() {
            return;
        }
        events.scan_progress(
            scan_id,
            EngineStatus::Completed,
            scan.total_checks,
            scan.completed_checks,
            scan.issues_found,
            None,
            None,
        );
    }
}
