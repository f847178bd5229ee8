//! Intruder attack configuration, lifecycle, results, and payload tooling

use crate::error::{ApiError, ApiResult};
use crate::routes::Pagination;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{Attack, AttackMode, EngineStatus, Position};
use webintercept_core::Error;
use webintercept_intruder::{
    builtin_list, builtin_lists, generate_dates, generate_numbers, total_requests,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/attacks", get(list).post(create))
        .route("/attacks/{id}", get(detail).patch(update).delete(remove))
        .route("/attacks/{id}/start", post(start))
        .route("/attacks/{id}/pause", post(pause))
        .route("/attacks/{id}/resume", post(resume))
        .route("/attacks/{id}/stop", post(stop))
        .route("/attacks/{id}/results", get(results))
        .route("/attacks/{id}/results/{result_id}", get(result_detail))
        .route("/payloads/builtin", get(builtin))
        .route("/payloads/builtin/{key}", get(builtin_detail))
        .route("/payloads/generate", post(generate))
}

#[derive(Debug, Deserialize)]
struct AttackCreate {
    name: String,
    mode: AttackMode,
    method: String,
    url_template: String,
    #[serde(default)]
    header_templates: Vec<(String, String)>,
    #[serde(default)]
    body_template: Option<String>,
    positions: Vec<Position>,
    payload_sets: Vec<Vec<String>>,
    #[serde(default)]
    base_exchange_id: Option<Uuid>,
    #[serde(default = "default_threads")]
    threads: usize,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default = "default_true")]
    follow_redirects: bool,
    #[serde(default = "default_timeout")]
    timeout_secs: u64,
}

fn default_threads() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct AttackUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mode: Option<AttackMode>,
    #[serde(default)]
    positions: Option<Vec<Position>>,
    #[serde(default)]
    payload_sets: Option<Vec<Vec<String>>>,
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    delay_ms: Option<u64>,
    #[serde(default)]
    follow_redirects: Option<bool>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Attack>>> {
    Ok(Json(state.repo.list_attacks().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<AttackCreate>,
) -> ApiResult<Json<Attack>> {
    let mut attack = Attack::new(body.name, body.mode, body.method, body.url_template);
    attack.header_templates = body.header_templates;
    attack.body_template = body.body_template;
    attack.positions = body.positions;
    attack.payload_sets = body.payload_sets;
    attack.base_exchange_id = body.base_exchange_id;
    attack.threads = body.threads;
    attack.delay_ms = body.delay_ms;
    attack.follow_redirects = body.follow_redirects;
    attack.timeout_secs = body.timeout_secs;

    let counts: Vec<usize> = attack.payload_sets.iter().map(Vec::len).collect();
    attack.total_requests = total_requests(attack.mode, attack.positions.len(), &counts);

    state.repo.put_attack(attack.clone()).await?;
    Ok(Json(attack))
}

async fn detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Attack>> {
    Ok(Json(state.repo.get_attack(id).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AttackUpdate>,
) -> ApiResult<Json<Attack>> {
    let mut attack = state.repo.get_attack(id).await?;
    if attack.status == EngineStatus::Running {
        return Err(ApiError(Error::conflict("cannot modify a running attack")));
    }

    if let Some(name) = body.name {
        attack.name = name;
    }
    if let Some(mode) = body.mode {
        attack.mode = mode;
    }
    if let Some(positions) = body.positions {
        attack.positions = positions;
    }
    if let Some(payload_sets) = body.payload_sets {
        attack.payload_sets = payload_sets;
    }
    if let Some(threads) = body.threads {
        attack.threads = threads;
    }
    if let Some(delay_ms) = body.delay_ms {
        attack.delay_ms = delay_ms;
    }
    if let Some(follow_redirects) = body.follow_redirects {
        attack.follow_redirects = follow_redirects;
    }
    if let Some(timeout_secs) = body.timeout_secs {
        attack.timeout_secs = timeout_secs;
    }

    let counts: Vec<usize> = attack.payload_sets.iter().map(Vec::len).collect();
    attack.total_requests = total_requests(attack.mode, attack.positions.len(), &counts);

    state.repo.update_attack(attack.clone()).await?;
    Ok(Json(attack))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.intruder.stop(id).await.ok();
    state.repo.delete_attack(id).await?;
    Ok(Json(json!({ "message": "Attack deleted" })))
}

async fn start(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.intruder.start(id).await?;
    Ok(Json(json!({ "message": "Attack started" })))
}

async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.intruder.pause(id).await?;
    Ok(Json(json!({ "message": "Attack paused" })))
}

async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.intruder.resume(id).await?;
    Ok(Json(json!({ "message": "Attack resumed" })))
}

async fn stop(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.intruder.stop(id).await?;
    Ok(Json(json!({ "message": "Attack stopped" })))
}

async fn results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let total = state.repo.count_attack_results(id).await?;
    let results = state.repo.list_attack_results(id, page.into()).await?;
    let items: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "attack_id": r.attack_id,
                "combination_index": r.combination_index,
                "payloads": r.payloads,
                "request_url": r.request_url,
                "response_status": r.response_status,
                "response_length": r.response_length,
                "response_time_ms": r.response_time_ms,
                "error": r.error,
                "timestamp": r.timestamp,
            })
        })
        .collect();
    Ok(Json(json!({ "total": total, "items": items })))
}

async fn result_detail(
    State(state): State<AppState>,
    Path((id, result_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let r = state.repo.get_attack_result(id, result_id).await?;
    Ok(Json(json!({
        "id": r.id,
        "attack_id": r.attack_id,
        "combination_index": r.combination_index,
        "payloads": r.payloads,
        "request_url": r.request_url,
        "request_body_b64": r.request_body.as_deref().map(|b| BASE64.encode(b)),
        "response_status": r.response_status,
        "response_length": r.response_length,
        "response_time_ms": r.response_time_ms,
        "response_headers": r.response_headers,
        "response_body_b64": r.response_body.as_deref().map(|b| BASE64.encode(b)),
        "error": r.error,
        "timestamp": r.timestamp,
    })))
}

async fn builtin() -> Json<Value> {
    let lists: Vec<Value> = builtin_lists()
        .iter()
        .map(|list| {
            json!({
                "key": list.key,
                "name": list.name,
                "description": list.description,
                "count": list.payloads.len(),
            })
        })
        .collect();
    Json(json!(lists))
}

async fn builtin_detail(Path(key): Path<String>) -> ApiResult<Json<Value>> {
    let list = builtin_list(&key)
        .ok_or_else(|| ApiError(Error::not_found(format!("payload list {key}"))))?;
    Ok(Json(json!({
        "key": list.key,
        "name": list.name,
        "description": list.description,
        "payloads": list.payloads,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "generator_type", content = "params")]
enum GenerateBody {
    Numbers {
        #[serde(default = "one")]
        start: i64,
        #[serde(default = "hundred")]
        end: i64,
        #[serde(default = "one")]
        step: i64,
    },
    Dates {
        start: String,
        end: String,
        #[serde(default = "iso_date")]
        format: String,
    },
    Custom {
        values: Vec<String>,
    },
}

fn one() -> i64 {
    1
}

fn hundred() -> i64 {
    100
}

fn iso_date() -> String {
    "%Y-%m-%d".to_string()
}

async fn generate(Json(body): Json<GenerateBody>) -> ApiResult<Json<Value>> {
    let payloads = match body {
        GenerateBody::Numbers { start, end, step } => generate_numbers(start, end, step)?,
        GenerateBody::Dates { start, end, format } => generate_dates(&start, &end, &format)?,
        GenerateBody::Custom { values } => values,
    };
    Ok(Json(json!({ "payloads": payloads })))
}
