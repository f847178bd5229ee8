//! Captured exchange listings

use crate::error::ApiResult;
use crate::routes::{clamp_page, default_limit};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{Exchange, ExchangeFilter};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).delete(clear))
        .route("/{id}", get(detail).delete(remove))
        .route("/{id}/tags", post(tag))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    is_tunnel: Option<bool>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn summary(exchange: &Exchange) -> Value {
    json!({
        "id": exchange.id,
        "timestamp": exchange.timestamp,
        "method": exchange.method,
        "url": exchange.url,
        "host": exchange.host,
        "path": exchange.path,
        "scheme": exchange.scheme,
        "response_status": exchange.response_status,
        "response_content_type": exchange.response_content_type,
        "duration_ms": exchange.duration_ms,
        "intercepted": exchange.intercepted,
        "modified": exchange.modified,
        "is_tunnel": exchange.is_tunnel,
        "tags": exchange.tags,
        "error": exchange.error,
    })
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let filter = ExchangeFilter {
        method: query.method,
        host: query.host,
        status: query.status,
        search: query.search,
        is_tunnel: query.is_tunnel,
    };
    let total = state.repo.count_exchanges(&filter).await?;
    let items = state
        .repo
        .list_exchanges(&filter, clamp_page(query.limit, query.offset))
        .await?;
    Ok(Json(json!({
        "total": total,
        "items": items.iter().map(summary).collect::<Vec<_>>(),
    })))
}

async fn detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let exchange = state.repo.get_exchange(id).await?;
    let mut body = summary(&exchange);
    let extra = json!({
        "request_headers": exchange.request_headers,
        "request_body_b64": exchange.request_body.as_deref().map(|b| BASE64.encode(b)),
        "request_content_type": exchange.request_content_type,
        "response_headers": exchange.response_headers,
        "response_body_b64": exchange.response_body.as_deref().map(|b| BASE64.encode(b)),
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        obj.extend(extra.clone());
    }
    Ok(Json(body))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.repo.delete_exchange(id).await?;
    Ok(Json(json!({ "message": "Request deleted" })))
}

async fn clear(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.repo.clear_exchanges().await?;
    Ok(Json(json!({ "message": "All requests cleared" })))
}

#[derive(Debug, Deserialize)]
struct TagBody {
    tags: Vec<String>,
}

async fn tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TagBody>,
) -> ApiResult<Json<Value>> {
    let mut exchange = state.repo.get_exchange(id).await?;
    exchange.tags = body.tags;
    state.repo.update_exchange(exchange.clone()).await?;
    Ok(Json(summary(&exchange)))
}
