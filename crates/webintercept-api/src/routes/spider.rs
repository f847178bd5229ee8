//! Spider session configuration, lifecycle, and frontier listings

use crate::error::{ApiError, ApiResult};
use crate::routes::{clamp_page, default_limit};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{CrawlSession, CrawlUrl, CrawlUrlStatus, EngineStatus};
use webintercept_core::Error;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list).post(create))
        .route("/sessions/{id}", get(detail).patch(update).delete(remove))
        .route("/sessions/{id}/start", post(start))
        .route("/sessions/{id}/pause", post(pause))
        .route("/sessions/{id}/resume", post(resume))
        .route("/sessions/{id}/stop", post(stop))
        .route("/sessions/{id}/urls", get(urls))
}

#[derive(Debug, Deserialize)]
struct SessionCreate {
    name: String,
    seeds: Vec<String>,
    #[serde(default = "default_depth")]
    max_depth: u32,
    #[serde(default = "default_pages")]
    max_pages: u64,
    #[serde(default = "default_threads")]
    threads: usize,
    #[serde(default = "default_delay")]
    delay_ms: u64,
    #[serde(default)]
    include_patterns: Vec<String>,
    #[serde(default)]
    exclude_patterns: Vec<String>,
    #[serde(default = "default_true")]
    respect_robots_txt: bool,
    #[serde(default)]
    follow_external_links: bool,
}

fn default_depth() -> u32 {
    3
}

fn default_pages() -> u64 {
    100
}

fn default_threads() -> usize {
    5
}

fn default_delay() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SessionUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    seeds: Option<Vec<String>>,
    #[serde(default)]
    max_depth: Option<u32>,
    #[serde(default)]
    max_pages: Option<u64>,
    #[serde(default)]
    threads: Option<usize>,
    #[serde(default)]
    delay_ms: Option<u64>,
    #[serde(default)]
    include_patterns: Option<Vec<String>>,
    #[serde(default)]
    exclude_patterns: Option<Vec<String>>,
    #[serde(default)]
    respect_robots_txt: Option<bool>,
    #[serde(default)]
    follow_external_links: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UrlsQuery {
    #[serde(default)]
    status: Option<CrawlUrlStatus>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<CrawlSession>>> {
    Ok(Json(state.repo.list_crawl_sessions().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<SessionCreate>,
) -> ApiResult<Json<CrawlSession>> {
    let mut session = CrawlSession::new(body.name, body.seeds);
    session.max_depth = body.max_depth;
    session.max_pages = body.max_pages;
    session.threads = body.threads;
    session.delay_ms = body.delay_ms;
    session.include_patterns = body.include_patterns;
    session.exclude_patterns = body.exclude_patterns;
    session.respect_robots_txt = body.respect_robots_txt;
    session.follow_external_links = body.follow_external_links;
    state.repo.put_crawl_session(session.clone()).await?;
    Ok(Json(session))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CrawlSession>> {
    Ok(Json(state.repo.get_crawl_session(id).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SessionUpdate>,
) -> ApiResult<Json<CrawlSession>> {
    let mut session = state.repo.get_crawl_session(id).await?;
    if session.status == EngineStatus::Running {
        return Err(ApiError(Error::conflict("cannot modify a running crawl")));
    }

    if let Some(name) = body.name {
        session.name = name;
    }
    if let Some(seeds) = body.seeds {
        session.seeds = seeds;
    }
    if let Some(max_depth) = body.max_depth {
        session.max_depth = max_depth;
    }
    if let Some(max_pages) = body.max_pages {
        session.max_pages = max_pages;
    }
    if let Some(threads) = body.threads {
        session.threads = threads;
    }
    if let Some(delay_ms) = body.delay_ms {
        session.delay_ms = delay_ms;
    }
    if let Some(include_patterns) = body.include_patterns {
        session.include_patterns = include_patterns;
    }
    if let Some(exclude_patterns) = body.exclude_patterns {
        session.exclude_patterns = exclude_patterns;
    }
    if let Some(respect) = body.respect_robots_txt {
        session.respect_robots_txt = respect;
    }
    if let Some(external) = body.follow_external_links {
        session.follow_external_links = external;
    }
    state.repo.update_crawl_session(session.clone()).await?;
    Ok(Json(session))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.spider.stop(id).await.ok();
    state.repo.delete_crawl_session(id).await?;
    Ok(Json(json!({ "message": "Session deleted" })))
}

async fn start(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.spider.start(id).await?;
    Ok(Json(json!({ "message": "Crawl started" })))
}

async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.spider.pause(id).await?;
    Ok(Json(json!({ "message": "Crawl paused" })))
}

async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.spider.resume(id).await?;
    Ok(Json(json!({ "message": "Crawl resumed" })))
}

async fn stop(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.spider.stop(id).await?;
    Ok(Json(json!({ "message": "Crawl stopped" })))
}

async fn urls(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UrlsQuery>,
) -> ApiResult<Json<Value>> {
    let total = state.repo.count_crawl_urls(id, query.status).await?;
    let items: Vec<CrawlUrl> = state
        .repo
        .list_crawl_urls(id, query.status, clamp_page(query.limit, query.offset))
        .await?;
    Ok(Json(json!({ "total": total, "items": items })))
}
