//! Intercept registry
//!
//! Each held message owns a single-fire oneshot channel: the registry keeps
//! the sender under the intercept id, the proxy task awaits the receiver.
//! Decisions are idempotent — the first delivery consumes the sender, later
//! deliveries for the same id find nothing and change nothing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;
use webintercept_core::model::HeaderList;

/// Operator decision for a held message
#[derive(Debug, Clone)]
pub enum InterceptDecision {
    /// Forward unchanged
    Forward,
    /// Forward with the supplied parts replacing current values
    ForwardModified {
        headers: Option<HeaderList>,
        body: Option<Vec<u8>>,
        status: Option<u16>,
    },
    /// Never forward; the proxy answers 502 for requests and closes the
    /// write side for responses
    Drop,
}

/// Map from intercept id to the waiting proxy task's wake-up channel
#[derive(Default)]
pub struct InterceptRegistry {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<InterceptDecision>>>,
}

impl InterceptRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a held message and return the receiver the proxy task awaits
    pub fn register(&self, intercept_id: Uuid) -> oneshot::Receiver<InterceptDecision> {
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(intercept_id, sender);
        receiver
    }

    /// Deliver a decision. Returns `true` when a task was woken; `false` when
    /// the id is unknown or was already decided (a no-op by design).
    pub fn decide(&self, intercept_id: Uuid, decision: InterceptDecision) -> bool {
        let sender = self.pending.lock().remove(&intercept_id);
        match sender {
            Some(sender) => sender.send(decision).is_ok(),
            None => {
                debug!(%intercept_id, "decision for unknown or already-decided intercept");
                false
            }
        }
    }

    /// Forget a held message without waking it (timeout path)
    pub fn forget(&self, intercept_id: Uuid) {
        self.pending.lock().remove(&intercept_id);
    }

    /// Ids currently awaiting a decision
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.pending.lock().keys().copied().collect()
    }

    /// Drop every held message; their tasks observe a closed channel
    pub fn purge(&self) {
        self.pending.lock().clear();
    }
}

/// Await an operator decision with a timeout; expiry forwards unchanged
pub async fn await_decision(
    registry: &InterceptRegistry,
    intercept_id: Uuid,
    receiver: oneshot::Receiver<InterceptDecision>,
    timeout: Duration,
) -> InterceptDecision {
    match tokio::time::timeout(timeout, receiver).await {
        Ok(Ok(decision)) => decision,
        // Timeout or purge: treat as forward, and make sure the stale sender
        // cannot fire later.
        _ => {
            registry.forget(intercept_id);
            InterceptDecision::Forward
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decision_wakes_waiting_task() {
        let registry = InterceptRegistry::new();
        let id = Uuid::new_v4();
        let receiver = registry.register(id);

        assert!(registry.decide(id, InterceptDecision::Forward));
        let decision =
            await_decision(&registry, id, receiver, Duration::from_secs(1)).await;
        assert!(matches!(decision, InterceptDecision::Forward));
    }

    #[tokio::test]
    async fn duplicate_decisions_are_noops() {
        let registry = InterceptRegistry::new();
        let id = Uuid::new_v4();
        let _receiver = registry.register(id);

        assert!(registry.decide(id, InterceptDecision::Drop));
        // Second delivery: same terminal state, no effect.
        assert!(!registry.decide(id, InterceptDecision::Forward));
        assert!(!registry.decide(id, InterceptDecision::Drop));
    }

    #[tokio::test]
    async fn timeout_falls_back_to_forward() {
        let registry = InterceptRegistry::new();
        let id = Uuid::new_v4();
        let receiver = registry.register(id);

        let decision =
            await_decision(&registry, id, receiver, Duration::from_millis(10)).await;
        assert!(matches!(decision, InterceptDecision::Forward));
        // The entry is gone; a late decision is a no-op.
        assert!(!registry.decide(id, InterceptDecision::Drop));
    }

    #[tokio::test]
    async fn purge_clears_pending() {
        let registry = InterceptRegistry::new();
        let id = Uuid::new_v4();
        let receiver = registry.register(id);
        assert_eq!(registry.pending_ids().len(), 1);

        registry.purge();
        assert!(registry.pending_ids().is_empty());
        let decision =
            await_decision(&registry, id, receiver, Duration::from_secs(1)).await;
        assert!(matches!(decision, InterceptDecision::Forward));
    }
}
