//! Rewrite rule CRUD

use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{ActionType, MatchType, Rule, RuleScope};
use webintercept_core::{Error, Result};

/// Regex rules must carry a compilable pattern before they are stored;
/// the proxy path should never be the first place a bad pattern surfaces.
fn validate_pattern(rule: &Rule) -> Result<()> {
    if rule.match_regex {
        regex::Regex::new(&rule.match_pattern)
            .map_err(|e| Error::invalid_config(format!("bad match pattern: {e}")))?;
    }
    Ok(())
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(detail).patch(update).delete(remove))
        .route("/{id}/toggle", post(toggle))
}

#[derive(Debug, Deserialize)]
struct RuleCreate {
    name: String,
    match_type: MatchType,
    match_pattern: String,
    #[serde(default)]
    match_regex: bool,
    action_type: ActionType,
    #[serde(default)]
    action_target: Option<String>,
    #[serde(default)]
    action_value: Option<String>,
    apply_to: RuleScope,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RuleUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    match_type: Option<MatchType>,
    #[serde(default)]
    match_pattern: Option<String>,
    #[serde(default)]
    match_regex: Option<bool>,
    #[serde(default)]
    action_type: Option<ActionType>,
    #[serde(default)]
    action_target: Option<String>,
    #[serde(default)]
    action_value: Option<String>,
    #[serde(default)]
    apply_to: Option<RuleScope>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    enabled: Option<bool>,
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Rule>>> {
    Ok(Json(state.repo.list_rules().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<RuleCreate>,
) -> ApiResult<Json<Rule>> {
    let mut rule = Rule::new(
        body.name,
        body.match_type,
        body.match_pattern,
        body.action_type,
        body.apply_to,
    );
    rule.match_regex = body.match_regex;
    rule.action_target = body.action_target;
    rule.action_value = body.action_value;
    rule.priority = body.priority;
    rule.enabled = body.enabled;
    validate_pattern(&rule)?;
    state.repo.put_rule(rule.clone()).await?;
    Ok(Json(rule))
}

async fn detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Rule>> {
    Ok(Json(state.repo.get_rule(id).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RuleUpdate>,
) -> ApiResult<Json<Rule>> {
    let mut rule = state.repo.get_rule(id).await?;
    if let Some(name) = body.name {
        rule.name = name;
    }
    if let Some(match_type) = body.match_type {
        rule.match_type = match_type;
    }
    if let Some(match_pattern) = body.match_pattern {
        rule.match_pattern = match_pattern;
    }
    if let Some(match_regex) = body.match_regex {
        rule.match_regex = match_regex;
    }
    if let Some(action_type) = body.action_type {
        rule.action_type = action_type;
    }
    if body.action_target.is_some() {
        rule.action_target = body.action_target;
    }
    if body.action_value.is_some() {
        rule.action_value = body.action_value;
    }
    if let Some(apply_to) = body.apply_to {
        rule.apply_to = apply_to;
    }
    if let Some(priority) = body.priority {
        rule.priority = priority;
    }
    if let Some(enabled) = body.enabled {
        rule.enabled = enabled;
    }
    rule.updated_at = Utc::now();
    validate_pattern(&rule)?;
    state.repo.update_rule(rule.clone()).await?;
    Ok(Json(rule))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.repo.delete_rule(id).await?;
    Ok(Json(json!({ "message": "Rule deleted" })))
}

async fn toggle(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Rule>> {
    let mut rule = state.repo.get_rule(id).await?;
    rule.enabled = !rule.enabled;
    rule.updated_at = Utc::now();
    state.repo.update_rule(rule.clone()).await?;
    Ok(Json(rule))
}
