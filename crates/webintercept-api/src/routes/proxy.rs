//! Proxy lifecycle, intercept decisions, replay, and CA export

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::HeaderList;
use webintercept_core::Error;
use webintercept_proxy::InterceptDecision;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .route("/intercept/toggle", post(toggle_intercept))
        .route("/intercept/action", post(intercept_action))
        .route("/replay", post(replay))
        .route("/certificate", get(certificate))
}

async fn start(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let port = state.proxy.start().await?;
    Ok(Json(json!({ "status": "started", "port": port })))
}

async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.proxy.stop().await;
    Json(json!({ "status": "stopped" }))
}

async fn status(State(state): State<AppState>) -> Json<webintercept_proxy::ProxyStatus> {
    Json(state.proxy.status().await)
}

async fn toggle_intercept(State(state): State<AppState>) -> Json<Value> {
    let enabled = state.proxy.toggle_intercept();
    Json(json!({ "intercept_enabled": enabled }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum InterceptActionKind {
    Forward,
    ForwardModified,
    Drop,
}

#[derive(Debug, Deserialize)]
struct InterceptActionBody {
    intercept_id: Uuid,
    action: InterceptActionKind,
    #[serde(default)]
    modified_headers: Option<HeaderList>,
    #[serde(default)]
    modified_body_b64: Option<String>,
    #[serde(default)]
    modified_status: Option<u16>,
}

async fn intercept_action(
    State(state): State<AppState>,
    Json(body): Json<InterceptActionBody>,
) -> ApiResult<Json<Value>> {
    let decision = match body.action {
        InterceptActionKind::Forward => InterceptDecision::Forward,
        InterceptActionKind::Drop => InterceptDecision::Drop,
        InterceptActionKind::ForwardModified => {
            let decoded_body = match body.modified_body_b64 {
                Some(ref encoded) => Some(
                    BASE64
                        .decode(encoded)
                        .map_err(|e| Error::invalid_config(format!("bad body_b64: {e}")))?,
                ),
                None => None,
            };
            InterceptDecision::ForwardModified {
                headers: body.modified_headers,
                body: decoded_body,
                status: body.modified_status,
            }
        }
    };

    let delivered = state.proxy.intercepts().decide(body.intercept_id, decision);
    if !delivered {
        return Err(ApiError(Error::not_found(format!(
            "intercepted message {}",
            body.intercept_id
        ))));
    }
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct ReplayBody {
    exchange_id: Uuid,
    #[serde(default)]
    modified_method: Option<String>,
    #[serde(default)]
    modified_url: Option<String>,
    #[serde(default)]
    modified_headers: Option<HeaderList>,
    #[serde(default)]
    modified_body_b64: Option<String>,
}

async fn replay(
    State(state): State<AppState>,
    Json(body): Json<ReplayBody>,
) -> ApiResult<Json<Value>> {
    let replay_body = match body.modified_body_b64 {
        Some(ref encoded) => Some(
            BASE64
                .decode(encoded)
                .map_err(|e| Error::invalid_config(format!("bad body_b64: {e}")))?,
        ),
        None => None,
    };

    let response = state
        .proxy
        .replay(
            body.exchange_id,
            body.modified_method,
            body.modified_url,
            body.modified_headers,
            replay_body,
        )
        .await?;

    Ok(Json(json!({
        "status_code": response.status,
        "headers": response.headers,
        "body_b64": BASE64.encode(&response.body),
        "duration_ms": response.duration_ms,
    })))
}

async fn certificate(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let pem = state.proxy.ca_cert_pem().ok_or_else(|| {
        ApiError(Error::not_found("certificate forging is disabled"))
    })?;
    Ok(Json(json!({
        "certificate": pem,
        "instructions": "Install this certificate in your browser or system trust store to intercept HTTPS traffic.",
    })))
}
