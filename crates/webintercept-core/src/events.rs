//! Workbench event bus
//!
//! All engines publish progress onto one multi-producer broadcast channel;
//! the operator transport subscribes and relays envelopes to WebSocket
//! clients. The channel is lossy by design: a subscriber that falls behind
//! drops the oldest events, never the captured data they describe.

use crate::model::{CrawlUrl, EngineStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default bounded capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// JSON envelope delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event discriminator (`new_request`, `intercept`, `intruder_progress`, …)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload
    pub data: serde_json::Value,
}

impl Event {
    /// Build an envelope
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// Multi-producer, lossy event fan-out
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe; the receiver observes events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an envelope. Succeeds even with no subscribers.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// A new exchange was captured
    pub fn new_request(&self, data: serde_json::Value) {
        self.publish(Event::new("new_request", data));
    }

    /// A message is held awaiting an operator decision
    pub fn intercept(&self, data: serde_json::Value) {
        self.publish(Event::new("intercept", data));
    }

    /// Proxy lifecycle changed
    pub fn proxy_status(&self, data: serde_json::Value) {
        self.publish(Event::new("proxy_status", data));
    }

    /// Attack progress counters changed
    pub fn intruder_progress(&self, attack_id: Uuid, status: EngineStatus, total: u64, completed: u64) {
        self.publish(Event::new(
            "intruder_progress",
            json!({
                "attack_id": attack_id,
                "status": status.as_str(),
                "total": total,
                "completed": completed,
            }),
        ));
    }

    /// One attack request completed
    pub fn intruder_result(&self, attack_id: Uuid, result: serde_json::Value) {
        self.publish(Event::new(
            "intruder_result",
            json!({ "attack_id": attack_id, "result": result }),
        ));
    }

    /// Crawl progress counters changed
    pub fn spider_progress(
        &self,
        session_id: Uuid,
        status: EngineStatus,
        pages_crawled: u64,
        pages_queued: u64,
        error_count: u64,
        current_url: Option<&str>,
    ) {
        self.publish(Event::new(
            "spider_progress",
            json!({
                "session_id": session_id,
                "status": status.as_str(),
                "pages_crawled": pages_crawled,
                "pages_queued": pages_queued,
                "error_count": error_count,
                "current_url": current_url,
            }),
        ));
    }

    /// A frontier URL finished fetching
    pub fn spider_url(&self, session_id: Uuid, url: &CrawlUrl) {
        self.publish(Event::new(
            "spider_url",
            json!({
                "session_id": session_id,
                "url": {
                    "id": url.id,
                    "url": url.url,
                    "depth": url.depth,
                    "status": url.status,
                    "response_status": url.response_status,
                    "content_type": url.content_type,
                    "title": url.title,
                    "links_found": url.links_found,
                },
            }),
        ));
    }

    /// Scan progress counters changed
    #[allow(clippy::too_many_arguments)]
    pub fn scan_progress(
        &self,
        scan_id: Uuid,
        status: EngineStatus,
        total_checks: u64,
        completed_checks: u64,
        issues_found: u64,
        current_check: Option<&str>,
        current_url: Option<&str>,
    ) {
        self.publish(Event::new(
            "scan_progress",
            json!({
                "scan_id": scan_id,
                "status": status.as_str(),
                "total_checks": total_checks,
                "completed_checks": completed_checks,
                "issues_found": issues_found,
                "current_check": current_check,
                "current_url": current_url,
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.intruder_progress(Uuid::new_v4(), EngineStatus::Running, 6, 0);

        let event = rx.recv().await.expect("event");
        assert_eq!(event.event_type, "intruder_progress");
        assert_eq!(event.data["status"], "running");
        assert_eq!(event.data["total"], 6);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.proxy_status(json!({"state": "stopped"}));
    }

    #[tokio::test]
    async fn request_event_precedes_response_side_events() {
        // Ordering within one publisher is the channel's FIFO ordering.
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.new_request(json!({"id": 1}));
        bus.intercept(json!({"id": 1}));

        assert_eq!(rx.recv().await.expect("first").event_type, "new_request");
        assert_eq!(rx.recv().await.expect("second").event_type, "intercept");
    }
}
