//! Operator collections of captured exchanges

use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use webintercept_core::model::{Collection, CollectionItem};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(detail).patch(update).delete(remove))
        .route("/{id}/items", get(list_items).post(add_item))
        .route("/{id}/items/{item_id}", axum::routing::delete(remove_item))
}

#[derive(Debug, Deserialize)]
struct CollectionCreate {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Collection>>> {
    Ok(Json(state.repo.list_collections().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(body): Json<CollectionCreate>,
) -> ApiResult<Json<Collection>> {
    let mut collection = Collection::new(body.name);
    collection.description = body.description;
    collection.color = body.color;
    state.repo.put_collection(collection.clone()).await?;
    Ok(Json(collection))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Collection>> {
    Ok(Json(state.repo.get_collection(id).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CollectionUpdate>,
) -> ApiResult<Json<Collection>> {
    let mut collection = state.repo.get_collection(id).await?;
    if let Some(name) = body.name {
        collection.name = name;
    }
    if body.description.is_some() {
        collection.description = body.description;
    }
    if body.color.is_some() {
        collection.color = body.color;
    }
    collection.updated_at = Utc::now();
    state.repo.update_collection(collection.clone()).await?;
    Ok(Json(collection))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.repo.delete_collection(id).await?;
    Ok(Json(json!({ "message": "Collection deleted" })))
}

#[derive(Debug, Deserialize)]
struct ItemCreate {
    exchange_id: Uuid,
    #[serde(default)]
    notes: Option<String>,
}

async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CollectionItem>>> {
    state.repo.get_collection(id).await?;
    Ok(Json(state.repo.list_collection_items(id).await?))
}

async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ItemCreate>,
) -> ApiResult<Json<CollectionItem>> {
    state.repo.get_collection(id).await?;
    // The exchange must exist; membership of a deleted capture is useless.
    state.repo.get_exchange(body.exchange_id).await?;

    let order = state.repo.list_collection_items(id).await?.len() as u32;
    let mut item = CollectionItem::new(id, body.exchange_id, order);
    item.notes = body.notes;
    state.repo.put_collection_item(item.clone()).await?;
    Ok(Json(item))
}

async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    state.repo.delete_collection_item(id, item_id).await?;
    Ok(Json(json!({ "message": "Item removed" })))
}
