//! Targets and site maps
//!
//! Targets accumulate from captured traffic; `rebuild` replays the whole
//! exchange history into per-host site maps. The tree view folds flat paths
//! into a folder hierarchy.

use crate::error::ApiResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;
use webintercept_core::model::{ExchangeFilter, Page, SiteMapNode, Target};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/rebuild", post(rebuild))
        .route("/{id}", get(detail).patch(update).delete(remove))
        .route("/{id}/sitemap", get(sitemap_tree))
        .route("/{id}/sitemap/flat", get(sitemap_flat))
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Target>>> {
    Ok(Json(state.repo.list_targets().await?))
}

async fn detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Target>> {
    Ok(Json(state.repo.get_target(id).await?))
}

#[derive(Debug, Deserialize)]
struct TargetUpdate {
    #[serde(default)]
    in_scope: Option<bool>,
    #[serde(default)]
    notes: Option<String>,
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TargetUpdate>,
) -> ApiResult<Json<Target>> {
    let mut target = state.repo.get_target(id).await?;
    if let Some(in_scope) = body.in_scope {
        target.in_scope = in_scope;
    }
    if body.notes.is_some() {
        target.notes = body.notes;
    }
    state.repo.update_target(target.clone()).await?;
    Ok(Json(target))
}

async fn remove(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.repo.delete_target(id).await?;
    Ok(Json(json!({ "message": "Target deleted" })))
}

async fn sitemap_flat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SiteMapNode>>> {
    state.repo.get_target(id).await?;
    Ok(Json(state.repo.list_site_nodes(id).await?))
}

/// One node of the hierarchical site-map view
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SiteMapTreeNode {
    pub name: String,
    pub path: String,
    pub node_type: &'static str,
    pub methods: Vec<String>,
    pub status_codes: Vec<u16>,
    pub request_count: u64,
    pub children: Vec<SiteMapTreeNode>,
}

async fn sitemap_tree(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SiteMapTreeNode>>> {
    state.repo.get_target(id).await?;
    let nodes = state.repo.list_site_nodes(id).await?;
    Ok(Json(build_tree(&nodes)))
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('?')
        .next()
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fold flat nodes into a folder hierarchy. Intermediate segments become
/// folders; the observed path itself carries the methods and counters.
pub(crate) fn build_tree(nodes: &[SiteMapNode]) -> Vec<SiteMapTreeNode> {
    #[derive(Default)]
    struct Builder {
        methods: Vec<String>,
        status_codes: Vec<u16>,
        request_count: u64,
        is_leaf: bool,
        children: BTreeMap<String, Builder>,
    }

    fn insert(builder: &mut Builder, segments: &[String], node: &SiteMapNode) {
        let Some((head, rest)) = segments.split_first() else {
            builder.is_leaf = true;
            builder.request_count += node.request_count;
            for method in &node.methods {
                if !builder.methods.contains(method) {
                    builder.methods.push(method.clone());
                }
            }
            for status in &node.status_codes {
                if !builder.status_codes.contains(status) {
                    builder.status_codes.push(*status);
                }
            }
            return;
        };
        insert(builder.children.entry(head.clone()).or_default(), rest, node);
    }

    fn finish(name: String, path: String, builder: Builder) -> SiteMapTreeNode {
        let children = builder
            .children
            .into_iter()
            .map(|(child_name, child)| {
                let child_path = format!("{path}/{child_name}");
                finish(child_name, child_path, child)
            })
            .collect();
        SiteMapTreeNode {
            name,
            path: if path.is_empty() { "/".to_string() } else { path },
            node_type: if builder.is_leaf { "file" } else { "folder" },
            methods: builder.methods,
            status_codes: builder.status_codes,
            request_count: builder.request_count,
            children,
        }
    }

    let mut root = Builder::default();
    for node in nodes {
        let segments = path_segments(&node.path);
        if segments.is_empty() {
            // The bare "/" path contributes to a synthetic root leaf.
            insert(&mut root, &[], node);
            continue;
        }
        insert(&mut root, &segments, node);
    }

    let mut tree: Vec<SiteMapTreeNode> = root
        .children
        .into_iter()
        .map(|(name, builder)| finish(name.clone(), format!("/{name}"), builder))
        .collect();
    if root.is_leaf {
        tree.insert(
            0,
            SiteMapTreeNode {
                name: "/".to_string(),
                path: "/".to_string(),
                node_type: "file",
                methods: root.methods,
                status_codes: root.status_codes,
                request_count: root.request_count,
                children: Vec::new(),
            },
        );
    }
    tree
}

/// Rebuild every target's site map from the captured exchange history
async fn rebuild(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut offset = 0usize;
    let mut targets = 0usize;
    let mut nodes = 0usize;

    loop {
        let batch = state
            .repo
            .list_exchanges(&ExchangeFilter::default(), Page::new(500, offset))
            .await?;
        if batch.is_empty() {
            break;
        }
        offset += batch.len();

        for exchange in &batch {
            if exchange.host.is_empty() {
                continue;
            }

            let mut target = match state.repo.get_target_by_host(&exchange.host).await? {
                Some(target) => target,
                None => {
                    let target = Target::new(&exchange.host);
                    state.repo.put_target(target.clone()).await?;
                    targets += 1;
                    target
                }
            };
            target.request_count += 1;
            if exchange.timestamp < target.first_seen {
                target.first_seen = exchange.timestamp;
            }
            if exchange.timestamp > target.last_seen {
                target.last_seen = exchange.timestamp;
            }
            state.repo.update_target(target.clone()).await?;

            let path = exchange.path.split('?').next().unwrap_or("/").to_string();
            let mut node = match state.repo.get_site_node_by_path(target.id, &path).await? {
                Some(node) => node,
                None => {
                    let segments = path_segments(&path);
                    let parent_path = if segments.len() > 1 {
                        Some(format!("/{}", segments[..segments.len() - 1].join("/")))
                    } else {
                        None
                    };
                    let node = SiteMapNode::new(target.id, &path, parent_path);
                    state.repo.put_site_node(node.clone()).await?;
                    nodes += 1;
                    node
                }
            };
            node.observe(
                &exchange.method,
                exchange.response_status,
                exchange.response_content_type.as_deref(),
                exchange.timestamp,
            );
            for param in query_param_names(&exchange.url) {
                if !node.parameters.contains(&param) {
                    node.parameters.push(param);
                }
            }
            state.repo.update_site_node(node).await?;
        }
    }

    Ok(Json(json!({
        "message": "Site map rebuilt",
        "targets": targets,
        "nodes": nodes,
    })))
}

fn query_param_names(url: &str) -> Vec<String> {
    Url::parse(url)
        .map(|u| u.query_pairs().map(|(k, _)| k.into_owned()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, method: &str, count: u64) -> SiteMapNode {
        let mut node = SiteMapNode::new(Uuid::new_v4(), path, None);
        node.methods.push(method.to_string());
        node.request_count = count;
        node
    }

    #[test]
    fn tree_folds_paths_into_folders() {
        let nodes = vec![
            node("/api/users", "GET", 3),
            node("/api/users/42", "GET", 1),
            node("/api/orders", "POST", 2),
            node("/", "GET", 5),
        ];
        let tree = build_tree(&nodes);

        let root = tree.iter().find(|n| n.name == "/").expect("root leaf");
        assert_eq!(root.request_count, 5);
        assert_eq!(root.node_type, "file");

        let api = tree.iter().find(|n| n.name == "api").expect("api folder");
        assert_eq!(api.node_type, "folder");
        assert_eq!(api.path, "/api");
        assert_eq!(api.children.len(), 2);

        let users = api.children.iter().find(|n| n.name == "users").expect("users");
        assert_eq!(users.node_type, "file");
        assert_eq!(users.request_count, 3);
        // `/api/users/42` nests under the `users` leaf.
        assert_eq!(users.children.len(), 1);
        assert_eq!(users.children[0].path, "/api/users/42");
    }

    #[test]
    fn segments_drop_query_strings() {
        assert_eq!(path_segments("/a/b?x=1"), vec!["a", "b"]);
        assert!(path_segments("/").is_empty());
    }
}
