use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use feedstock_core::domain::intake::{IntakeEntryInput, IntakeQuery, PlantIntakeEntry};
use feedstock_core::errors::DomainError;
use feedstock_db::repositories::intake::DUPLICATE_INTAKE_CODE;
use feedstock_db::repositories::IntakeRepository;

use super::auth::{Caller, OPERATORS};
use super::error::ApiError;
use super::{ApiJson, ApiQuery, AppState};

const NOT_FOUND: &str = "Plant intake entry not found";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/plant-intake-entries", get(list).post(create))
        .route("/plant-intake-entries/{id}", get(show))
        .route("/plant-intake-entries/{id}/deactivate", patch(deactivate))
}

async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<IntakeEntryInput>,
) -> Result<(StatusCode, Json<PlantIntakeEntry>), ApiError> {
    let ctx = caller.require(OPERATORS)?;
    let entry = input.into_entry(ctx, Utc::now())?;
    state.intake.insert(&entry).await.map_err(|error| error.conflict_as(DUPLICATE_INTAKE_CODE))?;

    info!(
        event_name = "intake.entry.recorded",
        tenant_id = %ctx.tenant(),
        intake_code = %entry.intake_code,
        source_type = %entry.source_type,
        "plant intake recorded"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<IntakeQuery>,
) -> Result<Json<Vec<PlantIntakeEntry>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.intake.list(&caller.0, &filter).await?))
}

async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PlantIntakeEntry>, ApiError> {
    let entry =
        state.intake.find_by_id(&caller.0, &id).await?.ok_or_else(|| DomainError::not_found(NOT_FOUND))?;
    Ok(Json(entry))
}

async fn deactivate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PlantIntakeEntry>, ApiError> {
    let ctx = caller.require(OPERATORS)?;
    if !state.intake.set_active(ctx, &id, false, Utc::now()).await? {
        return Err(DomainError::not_found(NOT_FOUND).into());
    }
    let entry =
        state.intake.find_by_id(ctx, &id).await?.ok_or_else(|| DomainError::not_found(NOT_FOUND))?;
    Ok(Json(entry))
}
