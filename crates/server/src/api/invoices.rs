use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use feedstock_core::domain::invoice::{Invoice, InvoiceCycle, InvoiceQuery};
use feedstock_core::errors::DomainError;
use feedstock_core::invoicing::{GenerateWeeklyInput, WeeklyInvoiceRun};
use feedstock_db::repositories::InvoiceRepository;

use super::auth::{Caller, OPERATORS};
use super::error::ApiError;
use super::{ApiJson, ApiQuery, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list))
        .route("/invoices/generate-weekly", post(generate_weekly))
        .route("/invoice-cycles/{id}", get(show_cycle))
}

async fn generate_weekly(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<GenerateWeeklyInput>,
) -> Result<(StatusCode, Json<WeeklyInvoiceRun>), ApiError> {
    let ctx = caller.require(OPERATORS)?;
    let run = state.generator.generate_weekly(ctx, input.into_request()?).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<InvoiceQuery>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.invoices.list(&caller.0, &filter).await?))
}

async fn show_cycle(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<InvoiceCycle>, ApiError> {
    let cycle = state
        .invoices
        .find_cycle(&caller.0, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Invoice cycle not found"))?;
    Ok(Json(cycle))
}
