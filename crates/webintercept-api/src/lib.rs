//! # webintercept api
//!
//! The operator surface: REST routers over every engine plus a WebSocket
//! stream relaying the workbench event bus. Transport only — all behaviour
//! lives in the engine crates, and every handler goes through the shared
//! repository and manager handles.

mod error;
mod routes;
mod ws;

pub use error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use webintercept_core::{EventBus, Repository};
use webintercept_intruder::IntruderManager;
use webintercept_proxy::ProxyManager;
use webintercept_scanner::ScannerManager;
use webintercept_sequencer::SequencerManager;
use webintercept_spider::SpiderManager;

/// Shared handles every handler receives
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub events: EventBus,
    pub proxy: Arc<ProxyManager>,
    pub intruder: Arc<IntruderManager>,
    pub spider: Arc<SpiderManager>,
    pub scanner: Arc<ScannerManager>,
    pub sequencer: Arc<SequencerManager>,
}

/// Build the operator router. Cross-origin access is limited to the
/// configured origins; an unparseable entry is dropped with a warning rather
/// than silently widening the allowlist.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .nest("/proxy", routes::proxy::router())
        .nest("/requests", routes::requests::router())
        .nest("/rules", routes::rules::router())
        .nest("/intruder", routes::intruder::router())
        .nest("/spider", routes::spider::router())
        .nest("/scanner", routes::scanner::router())
        .nest("/sequencer", routes::sequencer::router())
        .nest("/targets", routes::targets::router())
        .nest("/collections", routes::collections::router())
        .route("/ws", get(ws::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
