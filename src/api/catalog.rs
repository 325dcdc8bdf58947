//! Catalog endpoints: projects list/info/depsolve, modules list/info.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::Result;

use super::{split_names, AppState, Paging};

pub async fn projects_list(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Result<impl IntoResponse> {
    let projects = state.catalog.projects_list()?;
    let total = projects.len();
    let page: Vec<_> = projects.into_iter().skip(paging.offset).take(paging.limit).collect();
    Ok(Json(json!({
        "projects": page,
        "offset": paging.offset,
        "limit": paging.limit,
        "total": total,
    })))
}

pub async fn projects_info(State(state): State<AppState>, Path(names): Path<String>) -> Result<impl IntoResponse> {
    let names = split_names(&names);
    let projects = state.catalog.projects_info(&names)?;
    Ok(Json(json!({ "projects": projects })))
}

pub async fn projects_depsolve(State(state): State<AppState>, Path(names): Path<String>) -> Result<impl IntoResponse> {
    let names = split_names(&names);
    let deps = state.catalog.depsolve(&names)?;
    Ok(Json(json!({ "projects": deps })))
}

pub async fn modules_list(State(state): State<AppState>, Query(paging): Query<Paging>) -> Result<impl IntoResponse> {
    list_modules(state, paging, &[]).await
}

pub async fn modules_list_filtered(
    State(state): State<AppState>,
    Path(globs): Path<String>,
    Query(paging): Query<Paging>,
) -> Result<impl IntoResponse> {
    let globs = split_names(&globs);
    list_modules(state, paging, &globs).await
}

async fn list_modules(state: AppState, paging: Paging, globs: &[String]) -> Result<impl IntoResponse> {
    let modules = state.catalog.modules_list(globs)?;
    let total = modules.len();
    let page: Vec<_> = modules.into_iter().skip(paging.offset).take(paging.limit).collect();
    Ok(Json(json!({
        "modules": page,
        "offset": paging.offset,
        "limit": paging.limit,
        "total": total,
    })))
}

pub async fn modules_info(State(state): State<AppState>, Path(names): Path<String>) -> Result<impl IntoResponse> {
    let names = split_names(&names);
    let modules = state.catalog.modules_info(&names)?;
    Ok(Json(json!({ "modules": modules })))
}
