use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use feedstock_core::domain::intake::{IntakeFilter, PlantIntakeEntry};
use feedstock_core::domain::party::{PartyRef, SourceType};
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::errors::ApplicationError;
use feedstock_core::invoicing::{BillingWindow, IntakeSource};

use super::columns::{
    decimal_text, optional_decimal_text, parse_decimal, parse_enum, parse_optional_decimal,
    parse_timestamp, timestamp_text,
};
use super::{IntakeRepository, RepositoryError};
use crate::DbPool;

pub const DUPLICATE_INTAKE_CODE: &str = "An intake entry with this intakeCode already exists";

const SELECT_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        intake_code,
        dispatch_trip_id,
        feedstock_type_id,
        source_type,
        source_ref_id,
        gross_weight_ton,
        tare_weight_ton,
        net_weight_ton,
        moisture_percent,
        contamination_percent,
        quality_grade,
        accepted_qty_ton,
        rejected_qty_ton,
        rejection_reason,
        intake_date,
        notes,
        is_active,
        created_at,
        updated_at
     FROM plant_intake_entry";

pub struct SqlIntakeRepository {
    pool: DbPool,
}

impl SqlIntakeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntakeRepository for SqlIntakeRepository {
    async fn insert(&self, entry: &PlantIntakeEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO plant_intake_entry (
                id,
                tenant_id,
                intake_code,
                dispatch_trip_id,
                feedstock_type_id,
                source_type,
                source_ref_id,
                gross_weight_ton,
                tare_weight_ton,
                net_weight_ton,
                moisture_percent,
                contamination_percent,
                quality_grade,
                accepted_qty_ton,
                rejected_qty_ton,
                rejection_reason,
                intake_date,
                notes,
                is_active,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.tenant_id)
        .bind(&entry.intake_code)
        .bind(entry.dispatch_trip_id.as_deref())
        .bind(&entry.feedstock_type_id)
        .bind(entry.source_type.as_str())
        .bind(entry.source_ref_id.as_ref().map(PartyRef::as_str))
        .bind(decimal_text(entry.gross_weight_ton))
        .bind(decimal_text(entry.tare_weight_ton))
        .bind(decimal_text(entry.net_weight_ton))
        .bind(optional_decimal_text(entry.moisture_percent))
        .bind(optional_decimal_text(entry.contamination_percent))
        .bind(entry.quality_grade.as_deref())
        .bind(decimal_text(entry.accepted_qty_ton))
        .bind(decimal_text(entry.rejected_qty_ton))
        .bind(entry.rejection_reason.as_deref())
        .bind(timestamp_text(entry.intake_date))
        .bind(entry.notes.as_deref())
        .bind(entry.is_active)
        .bind(timestamp_text(entry.created_at))
        .bind(timestamp_text(entry.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<PlantIntakeEntry>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ? AND id = ?"))
            .bind(ctx.tenant())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(intake_from_row).transpose()
    }

    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &IntakeFilter,
    ) -> Result<Vec<PlantIntakeEntry>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        query.push(" WHERE tenant_id = ").push_bind(ctx.tenant().to_string());
        if let Some(source_type) = filter.source_type {
            query.push(" AND source_type = ").push_bind(source_type.as_str());
        }
        if let Some(feedstock_type_id) = &filter.feedstock_type_id {
            query.push(" AND feedstock_type_id = ").push_bind(feedstock_type_id.clone());
        }
        if let Some(dispatch_trip_id) = &filter.dispatch_trip_id {
            query.push(" AND dispatch_trip_id = ").push_bind(dispatch_trip_id.clone());
        }
        query.push(" ORDER BY intake_date DESC, created_at DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(intake_from_row).collect()
    }

    async fn set_active(
        &self,
        ctx: &TenantContext,
        id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE plant_intake_entry SET is_active = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(is_active)
        .bind(timestamp_text(now))
        .bind(ctx.tenant())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IntakeSource for SqlIntakeRepository {
    async fn billable_intake(
        &self,
        ctx: &TenantContext,
        source_type: SourceType,
        window: BillingWindow,
    ) -> Result<Vec<PlantIntakeEntry>, ApplicationError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE tenant_id = ?
               AND source_type = ?
               AND intake_date >= ?
               AND intake_date <= ?
               AND is_active = 1
               AND source_ref_id IS NOT NULL
               AND TRIM(source_ref_id) <> ''
               AND CAST(accepted_qty_ton AS REAL) > 0
             ORDER BY intake_date ASC, created_at ASC, rowid ASC"
        ))
        .bind(ctx.tenant())
        .bind(source_type.as_str())
        .bind(timestamp_text(window.start))
        .bind(timestamp_text(window.end))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(intake_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

fn intake_from_row(row: SqliteRow) -> Result<PlantIntakeEntry, RepositoryError> {
    let source_ref_id = row
        .try_get::<Option<String>, _>("source_ref_id")?
        .map(|raw| {
            PartyRef::parse("source_ref_id", &raw)
                .map_err(|error| RepositoryError::Decode(error.to_string()))
        })
        .transpose()?;

    Ok(PlantIntakeEntry {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        intake_code: row.try_get("intake_code")?,
        dispatch_trip_id: row.try_get("dispatch_trip_id")?,
        feedstock_type_id: row.try_get("feedstock_type_id")?,
        source_type: parse_enum("source_type", row.try_get("source_type")?)?,
        source_ref_id,
        gross_weight_ton: parse_decimal("gross_weight_ton", row.try_get("gross_weight_ton")?)?,
        tare_weight_ton: parse_decimal("tare_weight_ton", row.try_get("tare_weight_ton")?)?,
        net_weight_ton: parse_decimal("net_weight_ton", row.try_get("net_weight_ton")?)?,
        moisture_percent: parse_optional_decimal(
            "moisture_percent",
            row.try_get("moisture_percent")?,
        )?,
        contamination_percent: parse_optional_decimal(
            "contamination_percent",
            row.try_get("contamination_percent")?,
        )?,
        quality_grade: row.try_get("quality_grade")?,
        accepted_qty_ton: parse_decimal("accepted_qty_ton", row.try_get("accepted_qty_ton")?)?,
        rejected_qty_ton: parse_decimal("rejected_qty_ton", row.try_get("rejected_qty_ton")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        intake_date: parse_timestamp("intake_date", row.try_get("intake_date")?)?,
        notes: row.try_get("notes")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use feedstock_core::domain::intake::{IntakeEntryInput, IntakeFilter, PlantIntakeEntry};
    use feedstock_core::domain::party::SourceType;
    use feedstock_core::domain::tenant::{Role, TenantContext};
    use feedstock_core::invoicing::{BillingWindow, IntakeSource};

    use super::SqlIntakeRepository;
    use crate::repositories::IntakeRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn ctx() -> TenantContext {
        TenantContext::new("tenant-a", "user-1", Role::Operations)
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn entry(source_ref: Option<&str>, accepted: i64, intake_date: &str) -> PlantIntakeEntry {
        let mut entry = IntakeEntryInput {
            feedstock_type_id: Some("8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f".to_string()),
            source_type: Some("farmer".to_string()),
            source_ref_id: source_ref.map(str::to_string),
            gross_weight_ton: Some(Decimal::new(10, 0)),
            tare_weight_ton: Some(Decimal::ZERO),
            moisture_percent: Some(Decimal::new(185, 1)),
            accepted_qty_ton: Some(Decimal::new(accepted, 0)),
            intake_date: Some(intake_date.to_string()),
            ..IntakeEntryInput::default()
        }
        .into_entry(&ctx(), Utc::now())
        .expect("valid entry");
        entry.created_at = parse_ts("2026-02-24T08:00:00Z");
        entry.updated_at = entry.created_at;
        entry
    }

    #[tokio::test]
    async fn entries_round_trip() {
        let repo = SqlIntakeRepository::new(setup_pool().await);
        let stored = entry(Some("farmer-1"), 8, "2026-02-24");
        repo.insert(&stored).await.expect("insert");

        let found = repo.find_by_id(&ctx(), &stored.id).await.expect("find");
        assert_eq!(found, Some(stored));
    }

    #[tokio::test]
    async fn billable_intake_applies_window_and_eligibility() {
        let repo = SqlIntakeRepository::new(setup_pool().await);
        let inside_late = entry(Some("farmer-1"), 5, "2026-02-27");
        let inside_early = entry(Some("farmer-2"), 3, "2026-02-23");
        let on_end = entry(Some("farmer-1"), 2, "2026-03-01");
        let outside = entry(Some("farmer-1"), 4, "2026-03-02");
        let no_ref = entry(None, 4, "2026-02-25");
        let nothing_accepted = entry(Some("farmer-1"), 0, "2026-02-25");
        let deactivated = entry(Some("farmer-1"), 6, "2026-02-26");
        for row in [&inside_late, &inside_early, &on_end, &outside, &no_ref, &nothing_accepted, &deactivated] {
            repo.insert(row).await.expect("insert");
        }
        assert!(repo.set_active(&ctx(), &deactivated.id, false, Utc::now()).await.expect("deactivate"));

        let window = BillingWindow {
            start: parse_ts("2026-02-23T00:00:00Z"),
            end: parse_ts("2026-03-01T00:00:00Z"),
        };
        let rows = repo.billable_intake(&ctx(), SourceType::Farmer, window).await.expect("billable");

        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec![inside_early.id.as_str(), inside_late.id.as_str(), on_end.id.as_str()]);

        let centers = repo
            .billable_intake(&ctx(), SourceType::CollectionCenter, window)
            .await
            .expect("billable");
        assert!(centers.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_source_type() {
        let repo = SqlIntakeRepository::new(setup_pool().await);
        repo.insert(&entry(Some("farmer-1"), 5, "2026-02-24")).await.expect("insert");

        let farmers = repo
            .list(&ctx(), &IntakeFilter { source_type: Some(SourceType::Farmer), ..IntakeFilter::default() })
            .await
            .expect("list");
        let suppliers = repo
            .list(&ctx(), &IntakeFilter { source_type: Some(SourceType::Supplier), ..IntakeFilter::default() })
            .await
            .expect("list");

        assert_eq!(farmers.len(), 1);
        assert!(suppliers.is_empty());
    }
}
