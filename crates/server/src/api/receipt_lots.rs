use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;

use feedstock_core::domain::stock::{CenterReceiptLot, ReceiptLotInput, ReceiptLotQuery};
use feedstock_core::errors::DomainError;
use feedstock_core::stock::poster::LOT_NOT_FOUND;
use feedstock_db::repositories::StockLedgerRepository;

use super::auth::{Caller, WRITERS};
use super::error::ApiError;
use super::{ApiJson, ApiQuery, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/center-receipt-lots", get(list).post(create))
        .route("/center-receipt-lots/{id}", get(show))
        .route("/center-receipt-lots/{id}/deactivate", patch(deactivate))
}

/// Opens a lot; its IN ledger row is written in the same transaction.
async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<ReceiptLotInput>,
) -> Result<(StatusCode, Json<CenterReceiptLot>), ApiError> {
    let ctx = caller.require(WRITERS)?;
    let lot = input.into_lot(ctx, Utc::now())?;
    let (lot, _opening) = state.poster.post_in(ctx, lot).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ReceiptLotQuery>,
) -> Result<Json<Vec<CenterReceiptLot>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.stock.list_lots(&caller.0, &filter).await?))
}

async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CenterReceiptLot>, ApiError> {
    let lot = state
        .stock
        .find_lot_by_id(&caller.0, &id)
        .await?
        .ok_or_else(|| DomainError::not_found(LOT_NOT_FOUND))?;
    Ok(Json(lot))
}

async fn deactivate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CenterReceiptLot>, ApiError> {
    let ctx = caller.require(WRITERS)?;
    if !state.stock.set_lot_active(ctx, &id, false, Utc::now()).await? {
        return Err(DomainError::not_found(LOT_NOT_FOUND).into());
    }
    let lot =
        state.stock.find_lot_by_id(ctx, &id).await?.ok_or_else(|| DomainError::not_found(LOT_NOT_FOUND))?;
    Ok(Json(lot))
}
