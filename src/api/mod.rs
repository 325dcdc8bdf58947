//! The REST API surface (C5): stateless axum handlers that sequence the
//! blueprint store, package catalog, and compose queue under their own
//! locks and translate results into the `/api/v0` envelope.

mod blueprints;
mod catalog;
mod compose;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::catalog::PackageCatalog;
use crate::config::Config;
use crate::errors::ComposerError;
use crate::queue::ComposeQueue;
use crate::store::BlueprintStore;

/// Shared handles every handler closes over. Each field is itself
/// lock-serialized internally; `AppState` carries no lock of its own.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BlueprintStore>,
    pub catalog: Arc<PackageCatalog>,
    pub queue: Arc<ComposeQueue>,
    pub config: Arc<Config>,
}

/// `?offset=&limit=` shared by every list endpoint; defaults match the base
/// spec (`offset=0`, `limit=20`).
#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// `?branch=` shared by every blueprint endpoint; defaults to `master`.
#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "master".to_string()
}

/// Split a comma-separated path segment (`bash,httpd`) into trimmed names.
pub(crate) fn split_names(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Whether the request declared `Content-Type: text/x-toml`, selecting the
/// TOML body variant over the JSON default.
pub(crate) fn wants_toml(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/x-toml"))
        .unwrap_or(false)
}

impl IntoResponse for ComposerError {
    fn into_response(self) -> Response {
        let body = json!({ "status": false, "error": { "msg": self.to_string() } });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// `GET /status`.
pub async fn status() -> impl IntoResponse {
    Json(json!({
        "api": "1",
        "build": env!("CARGO_PKG_VERSION"),
        "db_version": "0",
        "schema_version": "0",
        "db_supported": true,
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v0/status", get(status))
        .route("/api/v0/blueprints/list", get(blueprints::list))
        .route("/api/v0/blueprints/info/{names}", get(blueprints::info))
        .route("/api/v0/blueprints/changes/{names}", get(blueprints::changes))
        .route("/api/v0/blueprints/new", post(blueprints::new))
        .route("/api/v0/blueprints/delete/{name}", delete(blueprints::delete))
        .route("/api/v0/blueprints/workspace", post(blueprints::workspace_write))
        .route("/api/v0/blueprints/workspace/{name}", delete(blueprints::workspace_delete))
        .route("/api/v0/blueprints/undo/{name}/{commit}", post(blueprints::undo))
        .route("/api/v0/blueprints/tag/{name}", post(blueprints::tag))
        .route("/api/v0/blueprints/diff/{name}/{from}/{to}", get(blueprints::diff))
        .route("/api/v0/blueprints/freeze/{names}", get(blueprints::freeze))
        .route("/api/v0/blueprints/depsolve/{names}", get(blueprints::depsolve))
        .route("/api/v0/projects/list", get(catalog::projects_list))
        .route("/api/v0/projects/info/{names}", get(catalog::projects_info))
        .route("/api/v0/projects/depsolve/{names}", get(catalog::projects_depsolve))
        .route("/api/v0/modules/list", get(catalog::modules_list))
        .route("/api/v0/modules/list/{globs}", get(catalog::modules_list_filtered))
        .route("/api/v0/modules/info/{names}", get(catalog::modules_info))
        .route("/api/v0/compose", post(compose::submit))
        .route("/api/v0/compose/types", get(compose::types))
        .route("/api/v0/compose/queue", get(compose::queue_status))
        .route("/api/v0/compose/finished", get(compose::finished))
        .route("/api/v0/compose/failed", get(compose::failed))
        .route("/api/v0/compose/status/{uuids}", get(compose::status_many))
        .route("/api/v0/compose/info/{uuid}", get(compose::info))
        .route("/api/v0/compose/metadata/{uuid}", get(compose::metadata))
        .route("/api/v0/compose/results/{uuid}", get(compose::results))
        .route("/api/v0/compose/logs/{uuid}", get(compose::logs))
        .route("/api/v0/compose/image/{uuid}", get(compose::image))
        .route("/api/v0/compose/log/{uuid}", get(compose::log_tail))
        .route("/api/v0/compose/cancel/{uuid}", delete(compose::cancel))
        .route("/api/v0/compose/delete/{uuids}", delete(compose::delete_many))
        .with_state(state)
}
