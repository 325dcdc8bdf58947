//! Compose endpoints: submit, status/info queries, artifact tar/image/log
//! streaming, cancel, delete.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::errors::{ComposerError, Result};
use crate::queue::{ComposeRequest, Status};

use super::{split_names, AppState, Paging};

fn default_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub blueprint_name: String,
    pub compose_type: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize)]
pub struct TestQuery {
    #[serde(default)]
    pub test: u8,
}

/// `POST /compose?test=<0|1|2>`: resolve the named blueprint (workspace
/// draft if present, else branch tip), depsolve it, and enqueue a build.
pub async fn submit(
    State(state): State<AppState>,
    Query(test): Query<TestQuery>,
    Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse> {
    let blueprint = match state.store.read_workspace(&body.branch, &body.blueprint_name)? {
        Some(draft) => draft,
        None => state.store.read_commit(&body.branch, &body.blueprint_name, None)?,
    };
    let source_commit = state.store.head_commit(&body.branch, &body.blueprint_name).ok();

    let mut names: Vec<String> = blueprint.modules.iter().map(|d| d.name.clone()).collect();
    names.extend(blueprint.packages.iter().map(|d| d.name.clone()));
    let nevras = state.catalog.depsolve(&names)?;

    let request = ComposeRequest {
        blueprint_name: body.blueprint_name,
        branch: body.branch,
        compose_type: body.compose_type,
        test_mode: test.test,
    };
    let uuid = state.queue.submit(request, &blueprint, source_commit, &nevras)?;

    Ok(Json(json!({ "status": true, "build_id": uuid })))
}

pub async fn types(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(json!({ "types": state.queue.compose_types() })))
}

pub async fn queue_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let (new, run) = state.queue.queue_status();
    Ok(Json(json!({ "new": new, "run": run })))
}

fn paged_status(state: &AppState, status: Status, paging: &Paging) -> serde_json::Value {
    let builds = state.queue.build_status(status);
    let total = builds.len();
    let page: Vec<_> = builds.into_iter().skip(paging.offset).take(paging.limit).collect();
    json!({ "builds": page, "offset": paging.offset, "limit": paging.limit, "total": total })
}

pub async fn finished(State(state): State<AppState>, Query(paging): Query<Paging>) -> Result<impl IntoResponse> {
    Ok(Json(paged_status(&state, Status::Finished, &paging)))
}

pub async fn failed(State(state): State<AppState>, Query(paging): Query<Paging>) -> Result<impl IntoResponse> {
    Ok(Json(paged_status(&state, Status::Failed, &paging)))
}

pub async fn status_many(State(state): State<AppState>, Path(uuids): Path<String>) -> Result<impl IntoResponse> {
    let mut statuses = Vec::new();
    let mut errors = Vec::new();
    for raw in split_names(&uuids) {
        match parse_uuid(&raw).and_then(|u| state.queue.uuid_status(u)) {
            Ok(meta) => statuses.push(json!({ "uuid": raw, "status": meta.status })),
            Err(e) => errors.push(json!({ "uuid": raw, "msg": e.to_string() })),
        }
    }
    Ok(Json(json!({ "uuids": statuses, "errors": errors })))
}

pub async fn info(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<impl IntoResponse> {
    let uuid = parse_uuid(&uuid)?;
    let (meta, deps, status) = state.queue.uuid_info(uuid)?;
    let (new, run) = state.queue.queue_status();
    Ok(Json(json!({
        "id": uuid,
        "config": meta,
        "deps": deps,
        "status": status,
        "queue_status": { "new": new, "run": run },
    })))
}

fn tar_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/x-tar".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from(bytes),
    )
        .into_response()
}

pub async fn metadata(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<Response> {
    let uuid = parse_uuid(&uuid)?;
    let bytes = state.queue.uuid_tar(uuid, true, false, false)?;
    Ok(tar_response(bytes, &format!("{uuid}-metadata.tar")))
}

pub async fn results(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<Response> {
    let uuid = parse_uuid(&uuid)?;
    let bytes = state.queue.uuid_tar(uuid, true, true, true)?;
    Ok(tar_response(bytes, &format!("{uuid}.tar")))
}

pub async fn logs(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<Response> {
    let uuid = parse_uuid(&uuid)?;
    let bytes = state.queue.uuid_tar(uuid, false, false, true)?;
    Ok(tar_response(bytes, &format!("{uuid}-logs.tar")))
}

pub async fn image(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<Response> {
    let uuid = parse_uuid(&uuid)?;
    let (filename, path) = state.queue.uuid_image(uuid)?;
    let bytes = tokio::fs::read(&path).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from(bytes),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LogSizeQuery {
    #[serde(default = "default_log_size_kb")]
    pub size: u64,
}

fn default_log_size_kb() -> u64 {
    1024
}

pub async fn log_tail(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<LogSizeQuery>,
) -> Result<Response> {
    let uuid = parse_uuid(&uuid)?;
    let bytes = state.queue.uuid_log(uuid, query.size)?;
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], Body::from(bytes)).into_response())
}

pub async fn cancel(State(state): State<AppState>, Path(uuid): Path<String>) -> Result<impl IntoResponse> {
    let uuid = parse_uuid(&uuid)?;
    state.queue.uuid_cancel(uuid)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn delete_many(State(state): State<AppState>, Path(uuids): Path<String>) -> Result<impl IntoResponse> {
    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for raw in split_names(&uuids) {
        match parse_uuid(&raw).and_then(|u| state.queue.uuid_delete(u)) {
            Ok(()) => deleted.push(json!({ "uuid": raw, "status": true })),
            Err(e) => errors.push(json!({ "uuid": raw, "msg": e.to_string() })),
        }
    }
    Ok(Json(json!({ "uuids": deleted, "errors": errors })))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ComposerError::NotFound(format!("'{raw}' is not a valid build id")))
}
