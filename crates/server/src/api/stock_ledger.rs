use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use feedstock_core::domain::stock::{LedgerEntry, LedgerQuery, MovementInput};
use feedstock_core::stock::LedgerVerification;
use feedstock_db::repositories::StockLedgerRepository;

use super::auth::{Caller, OPERATORS};
use super::error::ApiError;
use super::{ApiJson, ApiQuery, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/center-stock-ledger", get(list))
        .route("/center-stock-ledger/out", post(post_out))
        .route("/center-stock-ledger/adjust", post(post_adjust))
        .route("/center-stock-ledger/verify/{lot_id}", get(verify))
}

async fn post_out(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<MovementInput>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let ctx = caller.require(OPERATORS)?;
    let entry = state.poster.post_out(ctx, input.into_request()?).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn post_adjust(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<MovementInput>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let ctx = caller.require(OPERATORS)?;
    let entry = state.poster.post_adjust(ctx, input.into_request()?).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<LedgerQuery>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.stock.list_entries(&caller.0, &filter).await?))
}

async fn verify(
    State(state): State<AppState>,
    caller: Caller,
    Path(lot_id): Path<String>,
) -> Result<Json<LedgerVerification>, ApiError> {
    Ok(Json(state.poster.verify(&caller.0, &lot_id).await?))
}
