//! Blueprint endpoints: list, info, changes, new, delete, workspace, undo,
//! tag, diff, freeze, depsolve.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::blueprint::{diff as diff_blueprint, Blueprint, Dependency};
use crate::errors::{ComposerError, Result};

use super::{split_names, wants_toml, AppState, BranchQuery, Paging};

pub async fn list(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let names = state.store.list(&branch.branch)?;
    let total = names.len();
    let page: Vec<String> = names.into_iter().skip(paging.offset).take(paging.limit).collect();
    Ok(Json(json!({
        "blueprints": page,
        "offset": paging.offset,
        "limit": paging.limit,
        "total": total,
    })))
}

pub async fn info(
    State(state): State<AppState>,
    Path(names): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let mut recipes = Vec::new();
    let mut changes = Vec::new();
    let mut errors = Vec::new();

    for name in split_names(&names) {
        let (committed, workspace) = state.store.read_both(&branch.branch, &name);
        let draft = workspace.ok().flatten();
        match (draft, committed) {
            (Some(draft), Ok(committed)) => {
                changes.push(json!({ "name": name, "changed": draft != committed }));
                recipes.push(draft);
            }
            (Some(draft), Err(_)) => {
                changes.push(json!({ "name": name, "changed": true }));
                recipes.push(draft);
            }
            (None, Ok(committed)) => {
                changes.push(json!({ "name": name, "changed": false }));
                recipes.push(committed);
            }
            (None, Err(e)) => errors.push(json!({ "name": name, "msg": e.to_string() })),
        }
    }

    Ok(Json(json!({ "blueprints": recipes, "changes": changes, "errors": errors })))
}

pub async fn changes(
    State(state): State<AppState>,
    Path(names): Path<String>,
    Query(paging): Query<Paging>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let mut blueprints = Vec::new();
    let mut errors = Vec::new();

    for name in split_names(&names) {
        match state.store.list_commits(&branch.branch, &name, paging.offset, paging.limit) {
            Ok(commits) => blueprints.push(json!({ "name": name, "changes": commits, "total": commits.len() })),
            Err(e) => errors.push(json!({ "name": name, "msg": e.to_string() })),
        }
    }

    Ok(Json(json!({ "blueprints": blueprints, "errors": errors })))
}

fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Blueprint> {
    if wants_toml(headers) {
        Blueprint::parse_toml(body)
    } else {
        Blueprint::parse_json(body)
    }
}

pub async fn new(
    State(state): State<AppState>,
    Query(branch): Query<BranchQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse> {
    let blueprint = parse_body(&headers, &body)?;
    let name = blueprint.name.clone();
    state.store.commit(&branch.branch, &name, blueprint)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    state.store.delete(&branch.branch, &name)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn workspace_write(
    State(state): State<AppState>,
    Query(branch): Query<BranchQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse> {
    let blueprint = parse_body(&headers, &body)?;
    state.store.workspace_write(&branch.branch, &blueprint.name, &blueprint)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn workspace_delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    state.store.workspace_delete(&branch.branch, &name)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn undo(
    State(state): State<AppState>,
    Path((name, commit)): Path<(String, String)>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    state.store.revert(&branch.branch, &name, &commit)?;
    Ok(Json(json!({ "status": true })))
}

pub async fn tag(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    state.store.tag(&branch.branch, &name)?;
    Ok(Json(json!({ "status": true })))
}

/// Resolve a `from`/`to` diff path segment: `"WORKSPACE"` reads the
/// workspace draft, `"NEWEST"` reads the branch tip, anything else is
/// treated as a commit hash.
fn resolve_revision(state: &AppState, branch: &str, name: &str, rev: &str) -> Result<Blueprint> {
    match rev {
        "WORKSPACE" => state
            .store
            .read_workspace(branch, name)?
            .ok_or_else(|| ComposerError::NotFound(format!("no workspace draft for '{name}'"))),
        "NEWEST" => state.store.read_commit(branch, name, None),
        commit => state.store.read_commit(branch, name, Some(commit)),
    }
}

pub async fn diff(
    State(state): State<AppState>,
    Path((name, from, to)): Path<(String, String, String)>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let old = resolve_revision(&state, &branch.branch, &name, &from)?;
    let new = resolve_revision(&state, &branch.branch, &name, &to)?;
    Ok(Json(json!({ "diff": diff_blueprint(&old, &new) })))
}

pub async fn freeze(
    State(state): State<AppState>,
    Path(names): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let mut blueprints = Vec::new();
    let mut errors = Vec::new();

    for name in split_names(&names) {
        match freeze_one(&state, &branch.branch, &name) {
            Ok(frozen) => blueprints.push(json!({ "blueprint": frozen })),
            Err(e) => errors.push(json!({ "name": name, "msg": e.to_string() })),
        }
    }

    Ok(Json(json!({ "blueprints": blueprints, "errors": errors })))
}

fn freeze_one(state: &AppState, branch: &str, name: &str) -> Result<Blueprint> {
    let mut blueprint = match state.store.read_workspace(branch, name)? {
        Some(draft) => draft,
        None => state.store.read_commit(branch, name, None)?,
    };

    let module_names: Vec<String> = blueprint.modules.iter().map(|d| d.name.clone()).collect();
    let package_names: Vec<String> = blueprint.packages.iter().map(|d| d.name.clone()).collect();

    let frozen_modules = state.catalog.depsolve(&module_names)?;
    let frozen_packages = state.catalog.depsolve(&package_names)?;

    blueprint.modules = frozen_modules
        .into_iter()
        .filter(|n| module_names.contains(&n.name))
        .map(|n| Dependency { name: n.name.clone(), version: n.render() })
        .collect();
    blueprint.packages = frozen_packages
        .into_iter()
        .filter(|n| package_names.contains(&n.name))
        .map(|n| Dependency { name: n.name.clone(), version: n.render() })
        .collect();

    Ok(blueprint)
}

pub async fn depsolve(
    State(state): State<AppState>,
    Path(names): Path<String>,
    Query(branch): Query<BranchQuery>,
) -> Result<impl IntoResponse> {
    let mut blueprints = Vec::new();
    let mut errors = Vec::new();

    for name in split_names(&names) {
        match freeze_one(&state, &branch.branch, &name) {
            Ok(frozen) => {
                let mut wanted: Vec<String> = frozen.modules.iter().map(|d| d.name.clone()).collect();
                wanted.extend(frozen.packages.iter().map(|d| d.name.clone()));
                match state.catalog.depsolve(&wanted) {
                    Ok(deps) => blueprints.push(json!({ "blueprint": frozen, "dependencies": deps })),
                    Err(e) => errors.push(json!({ "name": name, "msg": e.to_string() })),
                }
            }
            Err(e) => errors.push(json!({ "name": name, "msg": e.to_string() })),
        }
    }

    Ok(Json(json!({ "blueprints": blueprints, "errors": errors })))
}
