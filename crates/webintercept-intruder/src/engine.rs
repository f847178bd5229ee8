//! Attack executor
//!
//! Combinations are produced into a bounded channel (capping memory no matter
//! how large the payload sets are) and consumed by a pool of worker tasks.
//! Workers park on pause, finish their in-flight request on stop, and record
//! every outcome — a failed probe is a result row, never a fatal.

use crate::combinator::{apply_combination, total_requests, validate, Combinations};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;
use webintercept_core::model::{Attack, AttackResult, EngineStatus, HeaderList};
use webintercept_core::{Error, EventBus, Repository, Result};

/// Stored response bodies are truncated to this size; the full length is
/// recorded separately.
const RESULT_BODY_CAP: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Stopped,
}

struct ActiveAttack {
    control: watch::Sender<RunState>,
    handle: tokio::task::JoinHandle<()>,
}

type ActiveMap = Arc<Mutex<HashMap<Uuid, ActiveAttack>>>;

/// Drives intruder attacks against their targets
pub struct IntruderManager {
    repo: Arc<dyn Repository>,
    events: EventBus,
    active: ActiveMap,
}

impl IntruderManager {
    /// Create a manager with no running attacks
    pub fn new(repo: Arc<dyn Repository>, events: EventBus) -> Self {
        Self {
            repo,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True while the attack's executor task is alive
    pub async fn is_active(&self, attack_id: Uuid) -> bool {
        self.active
            .lock()
            .await
            .get(&attack_id)
            .map(|a| !a.handle.is_finished())
            .unwrap_or(false)
    }

    /// Validate and launch an attack. Restarting a completed or failed attack
    /// resets its progress and deletes previous results.
    pub async fn start(&self, attack_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.get(&attack_id).is_some_and(|a| !a.handle.is_finished()) {
            return Err(Error::conflict("attack already running"));
        }

        let mut attack = self.repo.get_attack(attack_id).await?;
        if attack.status == EngineStatus::Running {
            return Err(Error::conflict("attack already running"));
        }
        validate(&attack)?;

        if matches!(attack.status, EngineStatus::Completed | EngineStatus::Error) {
            attack.completed_requests = 0;
            self.repo.delete_attack_results(attack_id).await?;
        }

        let payload_counts: Vec<usize> = attack.payload_sets.iter().map(Vec::len).collect();
        attack.total_requests =
            total_requests(attack.mode, attack.positions.len(), &payload_counts);
        attack.status = EngineStatus::Running;
        attack.started_at = Some(Utc::now());
        attack.completed_at = None;
        attack.error_message = None;
        self.repo.update_attack(attack.clone()).await?;
        self.events.intruder_progress(
            attack_id,
            EngineStatus::Running,
            attack.total_requests,
            attack.completed_requests,
        );

        let (control, state_rx) = watch::channel(RunState::Running);
        let handle = tokio::spawn(run_attack(
            self.repo.clone(),
            self.events.clone(),
            attack,
            state_rx,
        ));
        active.insert(attack_id, ActiveAttack { control, handle });
        Ok(())
    }

    /// Park the workers after their in-flight requests complete
    pub async fn pause(&self, attack_id: Uuid) -> Result<()> {
        let active = self.active.lock().await;
        let entry = active
            .get(&attack_id)
            .filter(|a| !a.handle.is_finished())
            .ok_or_else(|| Error::not_found("attack is not running"))?;
        let _ = entry.control.send(RunState::Paused);
        drop(active);

        let mut attack = self.repo.get_attack(attack_id).await?;
        attack.status = EngineStatus::Paused;
        self.repo.update_attack(attack.clone()).await?;
        self.events.intruder_progress(
            attack_id,
            EngineStatus::Paused,
            attack.total_requests,
            attack.completed_requests,
        );
        Ok(())
    }

    /// Wake parked workers
    pub async fn resume(&self, attack_id: Uuid) -> Result<()> {
        let active = self.active.lock().await;
        let entry = active
            .get(&attack_id)
            .filter(|a| !a.handle.is_finished())
            .ok_or_else(|| Error::not_found("attack is not running"))?;
        if *entry.control.borrow() != RunState::Paused {
            return Err(Error::conflict("attack is not paused"));
        }
        let _ = entry.control.send(RunState::Running);
        drop(active);

        let mut attack = self.repo.get_attack(attack_id).await?;
        attack.status = EngineStatus::Running;
        self.repo.update_attack(attack.clone()).await?;
        self.events.intruder_progress(
            attack_id,
            EngineStatus::Running,
            attack.total_requests,
            attack.completed_requests,
        );
        Ok(())
    }

    /// Cancel the attack; in-flight requests finish, the attack returns to
    /// `configured`.
    pub async fn stop(&self, attack_id: Uuid) -> Result<()> {
        let entry = self.active.lock().await.remove(&attack_id);
        if let Some(entry) = entry {
            let _ = entry.control.send(RunState::Stopped);
            let _ = entry.handle.await;
        }

        if let Ok(mut attack) = self.repo.get_attack(attack_id).await {
            if attack.status != EngineStatus::Completed {
                attack.status = EngineStatus::Configured;
                self.repo.update_attack(attack.clone()).await?;
                self.events.intruder_progress(
                    attack_id,
                    EngineStatus::Configured,
                    attack.total_requests,
                    attack.completed_requests,
                );
            }
        }
        Ok(())
    }
}

struct WorkerCtx {
    repo: Arc<dyn Repository>,
    events: EventBus,
    attack: Attack,
    client: reqwest::Client,
    /// Serialises read-modify-write progress updates on the stored attack
    progress: Mutex<()>,
}

async fn run_attack(
    repo: Arc<dyn Repository>,
    events: EventBus,
    attack: Attack,
    state_rx: watch::Receiver<RunState>,
) {
    let attack_id = attack.id;
    if let Err(err) = drive(repo.clone(), events.clone(), attack, state_rx).await {
        warn!(%attack_id, error = %err, "attack failed");
        if let Ok(mut attack) = repo.get_attack(attack_id).await {
            attack.status = EngineStatus::Error;
            attack.error_message = Some(err.to_string());
            let _ = repo.update_attack(attack.clone()).await;
            events.intruder_progress(
                attack_id,
                EngineStatus::Error,
                attack.total_requests,
                attack.completed_requests,
            );
        }
    }
}

async fn drive(
    repo: Arc<dyn Repository>,
    events: EventBus,
    attack: Attack,
    state_rx: watch::Receiver<RunState>,
) -> Result<()> {
    let attack_id = attack.id;
    let threads = attack.threads.max(1);
    let delay = Duration::from_millis(attack.delay_ms);

    let redirect = if attack.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(attack.timeout_secs))
        .redirect(redirect)
        .build()?;

    // Bounded queue: the producer parks when workers fall behind.
    let (tx, rx) = mpsc::channel::<(u64, Vec<String>)>(threads * 2);
    let rx = Arc::new(Mutex::new(rx));

    let producer_attack = attack.clone();
    let producer_state = state_rx.clone();
    let producer = tokio::spawn(async move {
        let combinations = Combinations::new(&producer_attack);
        for (index, payloads) in combinations.enumerate() {
            if *producer_state.borrow() == RunState::Stopped {
                return;
            }
            // A full channel parks the producer; pause backs up here
            // naturally, stop surfaces as a closed channel.
            if tx.send((index as u64, payloads)).await.is_err() {
                return;
            }
        }
    });

    let ctx = Arc::new(WorkerCtx {
        repo,
        events,
        attack,
        client,
        progress: Mutex::new(()),
    });

    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let ctx = ctx.clone();
        let rx = rx.clone();
        let mut state = state_rx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                // Pause gate: park until running again, bail on stop.
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

                let item = { rx.lock().await.recv().await };
                let Some((index, payloads)) = item else {
                    return;
                };

                // Re-gate after dequeue: a pause that landed while waiting
                // parks this combination instead of firing it.
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

                fire_one(&ctx, index, payloads).await;

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }
    producer.abort();

    if *state_rx.borrow() == RunState::Stopped {
        // The stop caller owns the terminal status.
        return Ok(());
    }

    let mut finished = ctx.repo.get_attack(attack_id).await?;
    if finished.status == EngineStatus::Running {
        finished.status = EngineStatus::Completed;
        finished.completed_at = Some(Utc::now());
        ctx.repo.update_attack(finished.clone()).await?;
        ctx.events.intruder_progress(
            attack_id,
            EngineStatus::Completed,
            finished.total_requests,
            finished.completed_requests,
        );
    }
    Ok(())
}

async fn fire_one(ctx: &WorkerCtx, index: u64, payloads: Vec<String>) {
    let applied = apply_combination(&ctx.attack, &payloads);
    let mut result = AttackResult::new(ctx.attack.id, index, payloads, applied.url.clone());
    result.request_body = applied.body.as_ref().map(|b| b.as_bytes().to_vec());

    let started = Instant::now();
    match send_applied(ctx, &applied).await {
        Ok((status, headers, body)) => {
            result.response_status = Some(status);
            result.response_length = Some(body.len());
            result.response_headers = Some(headers);
            let mut stored = body;
            stored.truncate(RESULT_BODY_CAP);
            result.response_body = Some(stored);
        }
        Err(err) => {
            result.error = Some(err.to_string());
        }
    }
    result.response_time_ms = Some(started.elapsed().as_millis() as u64);

    if let Err(err) = ctx.repo.put_attack_result(result.clone()).await {
        warn!(error = %err, "failed to persist attack result");
    }

    // Progress is a read-modify-write on the stored attack; the mutex keeps
    // concurrent workers from losing increments.
    let _guard = ctx.progress.lock().await;
    let (total, completed) = match ctx.repo.get_attack(ctx.attack.id).await {
        Ok(mut attack) => {
            attack.completed_requests += 1;
            let snapshot = (attack.total_requests, attack.completed_requests);
            if let Err(err) = ctx.repo.update_attack(attack).await {
                warn!(error = %err, "failed to persist attack progress");
            }
            snapshot
        }
        Err(err) => {
            debug!(error = %err, "attack row vanished during run");
            return;
        }
    };
    drop(_guard);

    ctx.events.intruder_result(
        ctx.attack.id,
        json!({
            "id": result.id,
            "payloads": result.payloads,
            "request_url": result.request_url,
            "response_status": result.response_status,
            "response_length": result.response_length,
            "response_time_ms": result.response_time_ms,
            "error": result.error,
        }),
    );
    ctx.events.intruder_progress(ctx.attack.id, EngineStatus::Running, total, completed);
}

async fn send_applied(
    ctx: &WorkerCtx,
    applied: &crate::combinator::AppliedRequest,
) -> Result<(u16, HeaderList, Vec<u8>)> {
    let method = reqwest::Method::from_bytes(ctx.attack.method.as_bytes())
        .map_err(|_| Error::invalid_config(format!("unsupported method: {}", ctx.attack.method)))?;

    let mut request = ctx.client.request(method, &applied.url);
    for (name, value) in &applied.headers {
        request = request.header(name, value);
    }
    if let Some(body) = &applied.body {
        request = request.body(body.clone());
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let mut headers = HeaderList::new();
    for (name, value) in response.headers() {
        if let Ok(value) = value.to_str() {
            headers.append(name.as_str(), value);
        }
    }
    let body = response.bytes().await?.to_vec();
    Ok((status, headers, body))
}
