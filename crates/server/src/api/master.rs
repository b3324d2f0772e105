//! Reference-data collections addressed by path segment, e.g. `/api/farmers`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Map, Value};

use feedstock_core::domain::master::{MasterKind, MasterRecord};
use feedstock_core::errors::DomainError;
use feedstock_db::repositories::MasterRepository;

use super::auth::Caller;
use super::error::ApiError;
use super::{ApiJson, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{kind}", get(list).post(create))
        .route("/{kind}/{id}", get(show).patch(update))
        .route("/{kind}/{id}/deactivate", patch(deactivate))
}

fn not_found(kind: MasterKind) -> DomainError {
    DomainError::not_found(format!("{} record not found", kind.as_str()))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Path(kind): Path<String>,
) -> Result<Json<Vec<MasterRecord>>, ApiError> {
    let kind = kind.parse::<MasterKind>()?;
    Ok(Json(state.masters.list(&caller.0, kind).await?))
}

async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Path(kind): Path<String>,
    ApiJson(payload): ApiJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<MasterRecord>), ApiError> {
    let kind = kind.parse::<MasterKind>()?;
    let ctx = caller.require(kind.writer_roles())?;
    let record = state.masters.create(ctx, kind, payload, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<MasterRecord>, ApiError> {
    let kind = kind.parse::<MasterKind>()?;
    let record =
        state.masters.find_by_id(&caller.0, kind, &id).await?.ok_or_else(|| not_found(kind))?;
    Ok(Json(record))
}

async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path((kind, id)): Path<(String, String)>,
    ApiJson(patch): ApiJson<Map<String, Value>>,
) -> Result<Json<MasterRecord>, ApiError> {
    let kind = kind.parse::<MasterKind>()?;
    let ctx = caller.require(kind.writer_roles())?;
    Ok(Json(state.masters.patch(ctx, kind, &id, patch, Utc::now()).await?))
}

async fn deactivate(
    State(state): State<AppState>,
    caller: Caller,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<MasterRecord>, ApiError> {
    let kind = kind.parse::<MasterKind>()?;
    let ctx = caller.require(kind.writer_roles())?;
    let mut patch = Map::new();
    patch.insert("isActive".to_string(), Value::Bool(false));
    Ok(Json(state.masters.patch(ctx, kind, &id, patch, Utc::now()).await?))
}
