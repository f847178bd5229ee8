//! Scanner checks, configuration presets, scans, and issues

use crate::error::{ApiError, ApiResult};
use crate::routes::{clamp_page, default_limit};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;
use webintercept_core::model::{
    EngineStatus, Issue, IssueStatus, Scan, ScanConfigPreset, ScanSource, Severity,
};
use webintercept_core::repository::IssueFilter;
use webintercept_core::Error;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/checks", get(checks))
        .route("/configs", get(list_configs).post(create_config))
        .route("/configs/{id}", get(get_config).patch(update_config).delete(delete_config))
        .route("/scans", get(list_scans).post(create_scan))
        .route("/scans/{id}", get(get_scan).delete(delete_scan))
        .route("/scans/{id}/start", post(start_scan))
        .route("/scans/{id}/pause", post(pause_scan))
        .route("/scans/{id}/stop", post(stop_scan))
        .route("/scans/{id}/issues", get(list_issues))
        .route("/scans/{id}/issues/{issue_id}", get(get_issue).patch(update_issue))
        .route("/scans/{id}/summary", get(summary))
}

async fn checks(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.scanner.available_checks()))
}

#[derive(Debug, Deserialize)]
struct ConfigCreate {
    name: String,
    #[serde(default)]
    description: Option<String>,
    enabled_checks: Vec<String>,
    #[serde(default)]
    settings: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled_checks: Option<Vec<String>>,
    #[serde(default)]
    settings: Option<HashMap<String, Value>>,
}

async fn list_configs(State(state): State<AppState>) -> ApiResult<Json<Vec<ScanConfigPreset>>> {
    Ok(Json(state.repo.list_scan_presets().await?))
}

async fn create_config(
    State(state): State<AppState>,
    Json(body): Json<ConfigCreate>,
) -> ApiResult<Json<ScanConfigPreset>> {
    let mut preset = ScanConfigPreset::new(body.name, body.enabled_checks);
    preset.description = body.description;
    preset.settings = body.settings;
    state.repo.put_scan_preset(preset.clone()).await?;
    Ok(Json(preset))
}

async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScanConfigPreset>> {
    Ok(Json(state.repo.get_scan_preset(id).await?))
}

async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfigUpdate>,
) -> ApiResult<Json<ScanConfigPreset>> {
    let mut preset = state.repo.get_scan_preset(id).await?;
    if let Some(name) = body.name {
        preset.name = name;
    }
    if body.description.is_some() {
        preset.description = body.description;
    }
    if let Some(enabled_checks) = body.enabled_checks {
        preset.enabled_checks = enabled_checks;
    }
    if let Some(settings) = body.settings {
        preset.settings = settings;
    }
    preset.updated_at = Utc::now();
    state.repo.update_scan_preset(preset.clone()).await?;
    Ok(Json(preset))
}

async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.repo.delete_scan_preset(id).await?;
    Ok(Json(json!({ "message": "Configuration deleted" })))
}

#[derive(Debug, Deserialize)]
struct ScanCreate {
    name: String,
    #[serde(flatten)]
    source: ScanSource,
    #[serde(default)]
    enabled_checks: Vec<String>,
    #[serde(default)]
    config_id: Option<Uuid>,
}

async fn list_scans(State(state): State<AppState>) -> ApiResult<Json<Vec<Scan>>> {
    Ok(Json(state.repo.list_scans().await?))
}

async fn create_scan(
    State(state): State<AppState>,
    Json(body): Json<ScanCreate>,
) -> ApiResult<Json<Scan>> {
    // A preset supplies the check set when the scan names none itself.
    let enabled_checks = if body.enabled_checks.is_empty() {
        match body.config_id {
            Some(config_id) => state.repo.get_scan_preset(config_id).await?.enabled_checks,
            None => {
                return Err(ApiError(Error::invalid_config(
                    "scan needs enabled_checks or a config_id",
                )))
            }
        }
    } else {
        body.enabled_checks
    };

    let mut scan = Scan::new(body.name, body.source, enabled_checks);
    scan.config_id = body.config_id;
    state.repo.put_scan(scan.clone()).await?;
    Ok(Json(scan))
}

async fn get_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Scan>> {
    Ok(Json(state.repo.get_scan(id).await?))
}

async fn delete_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let scan = state.repo.get_scan(id).await?;
    if scan.status == EngineStatus::Running {
        state.scanner.stop(id).await.ok();
    }
    state.repo.delete_scan(id).await?;
    Ok(Json(json!({ "message": "Scan deleted" })))
}

async fn start_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.scanner.start(id).await?;
    Ok(Json(json!({ "message": "Scan started" })))
}

async fn pause_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.scanner.pause(id).await?;
    Ok(Json(json!({ "message": "Scan paused" })))
}

async fn stop_scan(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.scanner.stop(id).await?;
    Ok(Json(json!({ "message": "Scan stopped" })))
}

#[derive(Debug, Deserialize)]
struct IssueQuery {
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    issue_type: Option<String>,
    #[serde(default)]
    status: Option<IssueStatus>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

async fn list_issues(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<IssueQuery>,
) -> ApiResult<Json<Vec<Issue>>> {
    let filter = IssueFilter {
        severity: query.severity,
        issue_type: query.issue_type,
        status: query.status,
    };
    Ok(Json(
        state
            .repo
            .list_issues(id, &filter, clamp_page(query.limit, query.offset))
            .await?,
    ))
}

async fn get_issue(
    State(state): State<AppState>,
    Path((_, issue_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Issue>> {
    Ok(Json(state.repo.get_issue(issue_id).await?))
}

#[derive(Debug, Deserialize)]
struct IssueUpdate {
    #[serde(default)]
    status: Option<IssueStatus>,
    #[serde(default)]
    notes: Option<String>,
}

async fn update_issue(
    State(state): State<AppState>,
    Path((_, issue_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<IssueUpdate>,
) -> ApiResult<Json<Issue>> {
    let mut issue = state.repo.get_issue(issue_id).await?;
    if let Some(status) = body.status {
        issue.status = status;
    }
    if body.notes.is_some() {
        issue.notes = body.notes;
    }
    state.repo.update_issue(issue.clone()).await?;
    Ok(Json(issue))
}

async fn summary(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let scan = state.repo.get_scan(id).await?;
    let by_severity = state.repo.count_issues_by_severity(id).await?;
    Ok(Json(json!({
        "scan_id": scan.id,
        "status": scan.status,
        "total_checks": scan.total_checks,
        "completed_checks": scan.completed_checks,
        "issues_found": scan.issues_found,
        "by_severity": by_severity,
    })))
}
