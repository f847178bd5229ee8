//! robots.txt policy gate
//!
//! One fetch and parse per origin, cached for the session. A missing,
//! failing, or unparseable robots.txt allows everything — the crawler should
//! degrade to permissive, not to silent.

use std::collections::HashMap;
use std::time::Duration;
use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use webintercept_core::Result;

/// Per-origin robots.txt cache
pub struct RobotsCache {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Option<Robot>>>,
}

impl RobotsCache {
    /// Create an empty cache with its own fetch client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// True when `User-agent: *` rules permit fetching this URL
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let origin = match (url.scheme(), url.host_str()) {
            (scheme, Some(host)) => match url.port() {
                Some(port) => format!("{scheme}://{host}:{port}"),
                None => format!("{scheme}://{host}"),
            },
            _ => return true,
        };

        let mut cache = self.cache.lock().await;
        if !cache.contains_key(&origin) {
            let robot = self.fetch_robots(&origin).await;
            cache.insert(origin.clone(), robot);
        }

        match cache.get(&origin).and_then(Option::as_ref) {
            Some(robot) => robot.allowed(url.as_str()),
            None => true,
        }
    }

    async fn fetch_robots(&self, origin: &str) -> Option<Robot> {
        let robots_url = format!("{origin}/robots.txt");
        let response = self.client.get(&robots_url).send().await.ok()?;
        if response.status() != reqwest::StatusCode::OK {
            return None;
        }
        let body = response.bytes().await.ok()?;
        match Robot::new("*", &body) {
            Ok(robot) => Some(robot),
            Err(err) => {
                debug!(origin, error = %err, "unparseable robots.txt, allowing all");
                None
            }
        }
    }
}
