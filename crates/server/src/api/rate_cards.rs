use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;

use feedstock_core::domain::rate_card::{RateCard, RateCardInput, RateCardQuery};
use feedstock_core::errors::DomainError;
use feedstock_core::pricing::{RateResolver, ResolveRateQuery};
use feedstock_db::repositories::rate_card::DUPLICATE_RATE_CARD;
use feedstock_db::repositories::RateCardRepository;

use super::auth::{Caller, WRITERS};
use super::error::ApiError;
use super::{ApiJson, ApiQuery, AppState};

const NOT_FOUND: &str = "Rate card not found";
const NO_RATE: &str = "No active rate card found for this party, feedstock type and date";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rate-cards", get(list).post(create))
        .route("/rate-cards/resolve", get(resolve))
        .route("/rate-cards/{id}", get(show).patch(update))
        .route("/rate-cards/{id}/deactivate", patch(deactivate))
}

async fn create(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(input): ApiJson<RateCardInput>,
) -> Result<(StatusCode, Json<RateCard>), ApiError> {
    let ctx = caller.require(WRITERS)?;
    let card = state.rate_cards.create(ctx, input.into_new()?, Utc::now()).await?;

    info!(
        event_name = "pricing.rate_card.created",
        tenant_id = %ctx.tenant(),
        rate_card_id = %card.id,
        party_type = %card.party_type,
        "rate card created"
    );
    Ok((StatusCode::CREATED, Json(card)))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<RateCardQuery>,
) -> Result<Json<Vec<RateCard>>, ApiError> {
    let filter = query.into_filter()?;
    Ok(Json(state.rate_cards.list(&caller.0, &filter).await?))
}

async fn resolve(
    State(state): State<AppState>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ResolveRateQuery>,
) -> Result<Json<RateCard>, ApiError> {
    let request = query.into_request(Utc::now())?;
    let card = state
        .rate_cards
        .resolve(&caller.0, &request.party, &request.feedstock_type_id, request.as_of)
        .await?
        .ok_or_else(|| DomainError::not_found(NO_RATE))?;
    Ok(Json(card))
}

async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RateCard>, ApiError> {
    let card = state
        .rate_cards
        .find_by_id(&caller.0, &id)
        .await?
        .ok_or_else(|| DomainError::not_found(NOT_FOUND))?;
    Ok(Json(card))
}

async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<RateCardInput>,
) -> Result<Json<RateCard>, ApiError> {
    let ctx = caller.require(WRITERS)?;
    let mut card =
        state.rate_cards.find_by_id(ctx, &id).await?.ok_or_else(|| DomainError::not_found(NOT_FOUND))?;

    input.apply_to(&mut card)?;
    card.updated_at = Utc::now();
    state.rate_cards.update(&card).await.map_err(|error| error.conflict_as(DUPLICATE_RATE_CARD))?;
    Ok(Json(card))
}

async fn deactivate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RateCard>, ApiError> {
    let ctx = caller.require(WRITERS)?;
    let mut card =
        state.rate_cards.find_by_id(ctx, &id).await?.ok_or_else(|| DomainError::not_found(NOT_FOUND))?;

    card.is_active = false;
    card.updated_at = Utc::now();
    state.rate_cards.update(&card).await?;
    Ok(Json(card))
}
