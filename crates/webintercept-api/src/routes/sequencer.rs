//! Token analysis lifecycle and the stateless analyse endpoint

use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{ExtractionRecipe, TokenAnalysis};
use webintercept_sequencer::analyze_tokens;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/analyses", get(list).post(create))
        .route("/analyses/{id}", get(detail).delete(remove))
        .route("/analyses/{id}/samples", post(add_samples))
        .route("/analyses/{id}/analyze", post(analyze))
        .route("/analyses/{id}/reset", post(reset))
        .route("/analyze-tokens", post(analyze_manual))
}

#[derive(Debug, Deserialize)]
struct AnalysisCreate {
    name: String,
    #[serde(flatten)]
    recipe: ExtractionRecipe,
    #[serde(default)]
    source_exchange_id: Option<Uuid>,
    #[serde(default = "default_sample_count")]
    sample_count: u32,
}

fn default_sample_count() -> u32 {
    100
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<TokenAnalysis>>> {
    Ok(Json(state.repo.list_analyses().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<AnalysisCreate>,
) -> ApiResult<Json<TokenAnalysis>> {
    let mut analysis = TokenAnalysis::new(body.name, body.recipe);
    analysis.source_exchange_id = body.source_exchange_id;
    analysis.sample_count = body.sample_count;
    state.repo.put_analysis(analysis.clone()).await?;
    Ok(Json(analysis))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TokenAnalysis>> {
    Ok(Json(state.repo.get_analysis(id).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.repo.delete_analysis(id).await?;
    Ok(Json(json!({ "message": "Analysis deleted" })))
}

#[derive(Debug, Deserialize)]
struct SamplesBody {
    samples: Vec<String>,
}

async fn add_samples(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SamplesBody>,
) -> ApiResult<Json<TokenAnalysis>> {
    Ok(Json(state.sequencer.add_samples(id, body.samples).await?))
}

async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TokenAnalysis>> {
    Ok(Json(state.sequencer.analyze(id).await?))
}

async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TokenAnalysis>> {
    Ok(Json(state.sequencer.reset(id).await?))
}

#[derive(Debug, Deserialize)]
struct ManualBody {
    tokens: Vec<String>,
}

async fn analyze_manual(Json(body): Json<ManualBody>) -> Json<Value> {
    Json(json!(analyze_tokens(&body.tokens)))
}
