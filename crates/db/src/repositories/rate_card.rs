use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use feedstock_core::domain::party::{PartyKey, PartyRef};
use feedstock_core::domain::rate_card::{NewRateCard, QualityRule, RateCard, RateCardFilter};
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::domain::values::new_id;
use feedstock_core::errors::ApplicationError;
use feedstock_core::pricing::{select_effective, RateResolver};

use super::columns::{decimal_text, parse_decimal, parse_enum, parse_timestamp, timestamp_text};
use super::{RateCardRepository, RepositoryError};
use crate::DbPool;

pub const DUPLICATE_RATE_CARD: &str =
    "A rate card already exists for this party, feedstock type and effectiveFrom";

const SELECT_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        party_type,
        party_id,
        feedstock_type_id,
        effective_from,
        rate_per_ton,
        quality_adjustments_json,
        is_active,
        created_at,
        updated_at
     FROM rate_card";

/// Stored form of a quality rule. Decimals stay textual inside the JSON column.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRule {
    metric: String,
    operator: String,
    value: String,
    adjustment_per_ton: String,
}

pub struct SqlRateCardRepository {
    pool: DbPool,
}

impl SqlRateCardRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Builds and stores a card for the caller's tenant.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        new_card: NewRateCard,
        now: DateTime<Utc>,
    ) -> Result<RateCard, ApplicationError> {
        let card = RateCard {
            id: new_id(),
            tenant_id: ctx.tenant().to_string(),
            party_type: new_card.party.party_type,
            party_id: new_card.party.party_ref,
            feedstock_type_id: new_card.feedstock_type_id,
            effective_from: new_card.effective_from,
            rate_per_ton: new_card.rate_per_ton,
            quality_adjustments: new_card.quality_adjustments,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.insert(&card).await.map_err(|error| error.conflict_as(DUPLICATE_RATE_CARD))?;
        Ok(card)
    }
}

#[async_trait]
impl RateCardRepository for SqlRateCardRepository {
    async fn insert(&self, card: &RateCard) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rate_card (
                id,
                tenant_id,
                party_type,
                party_id,
                feedstock_type_id,
                effective_from,
                rate_per_ton,
                quality_adjustments_json,
                is_active,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&card.id)
        .bind(&card.tenant_id)
        .bind(card.party_type.as_str())
        .bind(card.party_id.as_str())
        .bind(&card.feedstock_type_id)
        .bind(timestamp_text(card.effective_from))
        .bind(decimal_text(card.rate_per_ton))
        .bind(encode_rules(&card.quality_adjustments)?)
        .bind(card.is_active)
        .bind(timestamp_text(card.created_at))
        .bind(timestamp_text(card.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<RateCard>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ? AND id = ?"))
            .bind(ctx.tenant())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(rate_card_from_row).transpose()
    }

    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &RateCardFilter,
    ) -> Result<Vec<RateCard>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        query.push(" WHERE tenant_id = ").push_bind(ctx.tenant().to_string());
        if let Some(party_type) = filter.party_type {
            query.push(" AND party_type = ").push_bind(party_type.as_str());
        }
        if let Some(party_id) = &filter.party_id {
            query.push(" AND party_id = ").push_bind(party_id.as_str().to_string());
        }
        if let Some(feedstock_type_id) = &filter.feedstock_type_id {
            query.push(" AND feedstock_type_id = ").push_bind(feedstock_type_id.clone());
        }
        if let Some(is_active) = filter.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }
        query.push(" ORDER BY effective_from DESC, created_at DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(rate_card_from_row).collect()
    }

    async fn update(&self, card: &RateCard) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE rate_card SET
                party_type = ?,
                party_id = ?,
                feedstock_type_id = ?,
                effective_from = ?,
                rate_per_ton = ?,
                quality_adjustments_json = ?,
                is_active = ?,
                updated_at = ?
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(card.party_type.as_str())
        .bind(card.party_id.as_str())
        .bind(&card.feedstock_type_id)
        .bind(timestamp_text(card.effective_from))
        .bind(decimal_text(card.rate_per_ton))
        .bind(encode_rules(&card.quality_adjustments)?)
        .bind(card.is_active)
        .bind(timestamp_text(card.updated_at))
        .bind(&card.tenant_id)
        .bind(&card.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RateResolver for SqlRateCardRepository {
    async fn resolve(
        &self,
        ctx: &TenantContext,
        party: &PartyKey,
        feedstock_type_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<RateCard>, ApplicationError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE tenant_id = ?
               AND party_type = ?
               AND party_id = ?
               AND feedstock_type_id = ?
               AND is_active = 1
               AND effective_from <= ?
             ORDER BY effective_from DESC, created_at DESC, rowid DESC"
        ))
        .bind(ctx.tenant())
        .bind(party.party_type.as_str())
        .bind(party.party_ref.as_str())
        .bind(feedstock_type_id)
        .bind(timestamp_text(as_of))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let candidates = rows
            .into_iter()
            .map(rate_card_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(select_effective(&candidates, party, feedstock_type_id, as_of).cloned())
    }
}

fn encode_rules(rules: &[QualityRule]) -> Result<String, RepositoryError> {
    let stored: Vec<StoredRule> = rules
        .iter()
        .map(|rule| StoredRule {
            metric: rule.metric.clone(),
            operator: rule.operator.clone(),
            value: decimal_text(rule.value),
            adjustment_per_ton: decimal_text(rule.adjustment_per_ton),
        })
        .collect();
    serde_json::to_string(&stored)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode quality rules: {error}")))
}

fn decode_rules(raw: &str) -> Result<Vec<QualityRule>, RepositoryError> {
    let stored: Vec<StoredRule> = serde_json::from_str(raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid quality_adjustments_json: {error}"))
    })?;
    stored
        .into_iter()
        .map(|rule| {
            Ok(QualityRule {
                metric: rule.metric,
                operator: rule.operator,
                value: parse_decimal("quality_adjustments_json.value", rule.value)?,
                adjustment_per_ton: parse_decimal(
                    "quality_adjustments_json.adjustmentPerTon",
                    rule.adjustment_per_ton,
                )?,
            })
        })
        .collect()
}

fn rate_card_from_row(row: SqliteRow) -> Result<RateCard, RepositoryError> {
    let party_id: String = row.try_get("party_id")?;
    let quality_adjustments_json: String = row.try_get("quality_adjustments_json")?;

    Ok(RateCard {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        party_type: parse_enum("party_type", row.try_get("party_type")?)?,
        party_id: PartyRef::parse("party_id", &party_id)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        feedstock_type_id: row.try_get("feedstock_type_id")?,
        effective_from: parse_timestamp("effective_from", row.try_get("effective_from")?)?,
        rate_per_ton: parse_decimal("rate_per_ton", row.try_get("rate_per_ton")?)?,
        quality_adjustments: decode_rules(&quality_adjustments_json)?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
