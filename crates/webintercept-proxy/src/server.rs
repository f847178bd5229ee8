//! Proxy lifecycle
//!
//! One listener task accepts connections and spawns one task per client; the
//! only state shared between connections is the certificate cache, the
//! intercept registry, the event bus, and the repository, each synchronised
//! on its own.

use crate::forward::{ForwardedResponse, UpstreamClient};
use crate::intercept::InterceptRegistry;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;
use webintercept_core::model::HeaderList;
use webintercept_core::tls::CertificateAuthority;
use webintercept_core::{Error, EventBus, HttpLimits, ProxyConfig, Repository, Result};

/// Grace period for in-flight connections on stop
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Snapshot of the proxy's externally visible state
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub state: String,
    pub host: String,
    pub port: u16,
    pub intercept_enabled: bool,
    pub requests_total: u64,
    pub requests_intercepted: u64,
}

/// State shared by the listener and every connection task
pub(crate) struct ProxyShared {
    pub config: ProxyConfig,
    pub limits: HttpLimits,
    pub repo: Arc<dyn Repository>,
    pub events: EventBus,
    pub authority: Option<Arc<CertificateAuthority>>,
    pub intercepts: Arc<InterceptRegistry>,
    pub client: UpstreamClient,
    pub intercept_enabled: AtomicBool,
    pub requests_total: AtomicU64,
    pub requests_intercepted: AtomicU64,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
    port: u16,
}

/// The intercepting proxy server
pub struct ProxyManager {
    shared: Arc<ProxyShared>,
    state: Mutex<Option<Running>>,
}

impl ProxyManager {
    /// Build a stopped proxy
    pub fn new(
        config: ProxyConfig,
        limits: HttpLimits,
        repo: Arc<dyn Repository>,
        events: EventBus,
        authority: Option<Arc<CertificateAuthority>>,
    ) -> Result<Self> {
        let client = UpstreamClient::new(Duration::from_secs(config.upstream_timeout_secs))?;
        Ok(Self {
            shared: Arc::new(ProxyShared {
                config,
                limits,
                repo,
                events,
                authority,
                intercepts: Arc::new(InterceptRegistry::new()),
                client,
                intercept_enabled: AtomicBool::new(false),
                requests_total: AtomicU64::new(0),
                requests_intercepted: AtomicU64::new(0),
            }),
            state: Mutex::new(None),
        })
    }

    /// Start listening. Idempotent; returns the bound port.
    pub async fn start(&self) -> Result<u16> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.as_ref() {
            return Ok(running.port);
        }

        let bind_addr = format!("{}:{}", self.shared.config.host, self.shared.config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let shared = shared.clone();
                            connections.spawn(async move {
                                crate::conn::handle_connection(shared, stream, peer).await;
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    },
                }
            }
            let drain = async {
                while connections.join_next().await.is_some() {}
            };
            if tokio::time::timeout(STOP_GRACE, drain).await.is_err() {
                connections.abort_all();
            }
        });

        info!(port, "proxy listening");
        *state = Some(Running {
            shutdown,
            handle,
            port,
        });
        drop(state);

        self.shared.events.proxy_status(self.status_json("running", port));
        Ok(port)
    }

    /// Stop listening, draining in-flight connections within the grace period
    pub async fn stop(&self) {
        let running = self.state.lock().await.take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            let _ = running.handle.await;
            self.shared.intercepts.purge();
            info!("proxy stopped");
            self.shared
                .events
                .proxy_status(self.status_json("stopped", running.port));
        }
    }

    /// Current status snapshot
    pub async fn status(&self) -> ProxyStatus {
        let state = self.state.lock().await;
        let (state_str, port) = match state.as_ref() {
            Some(running) => ("running", running.port),
            None => ("stopped", self.shared.config.port),
        };
        ProxyStatus {
            state: state_str.to_string(),
            host: self.shared.config.host.clone(),
            port,
            intercept_enabled: self.shared.intercept_enabled.load(Ordering::Relaxed),
            requests_total: self.shared.requests_total.load(Ordering::Relaxed),
            requests_intercepted: self.shared.requests_intercepted.load(Ordering::Relaxed),
        }
    }

    fn status_json(&self, state: &str, port: u16) -> serde_json::Value {
        json!({
            "state": state,
            "host": self.shared.config.host,
            "port": port,
            "intercept_enabled": self.shared.intercept_enabled.load(Ordering::Relaxed),
        })
    }

    /// Flip intercept mode; returns the new setting
    pub fn toggle_intercept(&self) -> bool {
        let enabled = !self.shared.intercept_enabled.load(Ordering::Relaxed);
        self.shared.intercept_enabled.store(enabled, Ordering::Relaxed);
        enabled
    }

    /// The intercept registry, for decision delivery
    pub fn intercepts(&self) -> Arc<InterceptRegistry> {
        self.shared.intercepts.clone()
    }

    /// CA certificate PEM, when certificate forging is enabled
    pub fn ca_cert_pem(&self) -> Option<String> {
        self.shared.authority.as_ref().map(|ca| ca.ca_cert_pem().to_string())
    }

    /// Re-send a captured exchange with optional overrides, outside the
    /// proxy's record/intercept path
    pub async fn replay(
        &self,
        exchange_id: Uuid,
        method: Option<String>,
        url: Option<String>,
        headers: Option<HeaderList>,
        body: Option<Vec<u8>>,
    ) -> Result<ForwardedResponse> {
        let original = self.shared.repo.get_exchange(exchange_id).await?;
        let method = method.unwrap_or_else(|| original.method.clone());
        let url = url.unwrap_or_else(|| original.url.clone());
        let headers = headers.unwrap_or_else(|| original.request_headers.clone());
        let body = body.or_else(|| original.request_body.clone());

        self.shared.client.send(&method, &url, &headers, body.as_deref()).await
    }
}

/// Map a framing error to the status the client receives
pub(crate) fn protocol_error_status(err: &Error) -> u16 {
    match err {
        Error::Protocol { message } if message.contains("body exceeds") => 413,
        _ => 400,
    }
}
