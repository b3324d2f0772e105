use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use feedstock_core::domain::invoice::{
    AppliedQualityRule, CycleStatus, Invoice, InvoiceCycle, InvoiceFilter, InvoiceLine,
};
use feedstock_core::domain::party::{PartyRef, PartyType};
use feedstock_core::domain::rate_card::RuleOperator;
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::errors::ApplicationError;
use feedstock_core::invoicing::InvoiceStore;

use super::columns::{decimal_text, parse_decimal, parse_enum, parse_timestamp, timestamp_text};
use super::{InvoiceRepository, RepositoryError};
use crate::DbPool;

const CYCLE_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        cycle_code,
        week_start_date,
        week_end_date,
        status,
        created_at,
        updated_at
     FROM invoice_cycle";

const INVOICE_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        invoice_no,
        cycle_id,
        party_type,
        party_ref_id,
        week_start_date,
        week_end_date,
        total_qty_ton,
        total_amount,
        status,
        notes,
        created_at
     FROM invoice";

/// Stored form of an applied quality rule; decimals stay textual.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAppliedRule {
    metric: String,
    operator: String,
    threshold_value: String,
    intake_metric_value: String,
    adjustment_per_ton: String,
}

pub struct SqlInvoiceRepository {
    pool: DbPool,
}

impl SqlInvoiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, invoice_id: &str) -> Result<Vec<InvoiceLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                intake_entry_id,
                feedstock_type_id,
                qty_ton,
                base_rate_per_ton,
                quality_adjustment_per_ton,
                rate_per_ton,
                amount,
                applied_quality_rules_json
             FROM invoice_line
             WHERE invoice_id = ?
             ORDER BY line_no ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    async fn find_cycle_by_window(
        &self,
        ctx: &TenantContext,
        candidate: &InvoiceCycle,
    ) -> Result<Option<InvoiceCycle>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{CYCLE_COLUMNS} WHERE tenant_id = ? AND week_start_date = ? AND week_end_date = ?"
        ))
        .bind(ctx.tenant())
        .bind(timestamp_text(candidate.week_start_date))
        .bind(timestamp_text(candidate.week_end_date))
        .fetch_optional(&self.pool)
        .await?;

        row.map(cycle_from_row).transpose()
    }
}

#[async_trait]
impl InvoiceStore for SqlInvoiceRepository {
    async fn find_or_create_cycle(
        &self,
        ctx: &TenantContext,
        candidate: InvoiceCycle,
    ) -> Result<InvoiceCycle, ApplicationError> {
        sqlx::query(
            "INSERT INTO invoice_cycle (
                id,
                tenant_id,
                cycle_code,
                week_start_date,
                week_end_date,
                status,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant_id, week_start_date, week_end_date) DO NOTHING",
        )
        .bind(&candidate.id)
        .bind(ctx.tenant())
        .bind(&candidate.cycle_code)
        .bind(timestamp_text(candidate.week_start_date))
        .bind(timestamp_text(candidate.week_end_date))
        .bind(candidate.status.as_str())
        .bind(timestamp_text(candidate.created_at))
        .bind(timestamp_text(candidate.updated_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        self.find_cycle_by_window(ctx, &candidate).await?.ok_or_else(|| {
            ApplicationError::Persistence(format!(
                "invoice cycle for window starting {} vanished after insert",
                timestamp_text(candidate.week_start_date)
            ))
        })
    }

    async fn count_invoices(
        &self,
        ctx: &TenantContext,
        cycle_id: &str,
        party_type: PartyType,
    ) -> Result<u64, ApplicationError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM invoice
             WHERE tenant_id = ? AND cycle_id = ? AND party_type = ?",
        )
        .bind(ctx.tenant())
        .bind(cycle_id)
        .bind(party_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?
        .try_get("count")
        .map_err(RepositoryError::from)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn replace_invoices(
        &self,
        ctx: &TenantContext,
        cycle: &InvoiceCycle,
        party_type: PartyType,
        invoices: &[Invoice],
    ) -> Result<InvoiceCycle, ApplicationError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            "DELETE FROM invoice_line WHERE invoice_id IN (
                SELECT id FROM invoice WHERE tenant_id = ? AND cycle_id = ? AND party_type = ?
             )",
        )
        .bind(ctx.tenant())
        .bind(&cycle.id)
        .bind(party_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        sqlx::query("DELETE FROM invoice WHERE tenant_id = ? AND cycle_id = ? AND party_type = ?")
            .bind(ctx.tenant())
            .bind(&cycle.id)
            .bind(party_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        for invoice in invoices {
            sqlx::query(
                "INSERT INTO invoice (
                    id,
                    tenant_id,
                    invoice_no,
                    cycle_id,
                    party_type,
                    party_ref_id,
                    week_start_date,
                    week_end_date,
                    total_qty_ton,
                    total_amount,
                    status,
                    notes,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&invoice.id)
            .bind(ctx.tenant())
            .bind(&invoice.invoice_no)
            .bind(&cycle.id)
            .bind(invoice.party_type.as_str())
            .bind(invoice.party_ref_id.as_str())
            .bind(timestamp_text(invoice.week_start_date))
            .bind(timestamp_text(invoice.week_end_date))
            .bind(decimal_text(invoice.total_qty_ton))
            .bind(decimal_text(invoice.total_amount))
            .bind(invoice.status.as_str())
            .bind(invoice.notes.as_deref())
            .bind(timestamp_text(invoice.created_at))
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

            for (index, line) in invoice.lines.iter().enumerate() {
                let line_no = i64::try_from(index + 1).unwrap_or(i64::MAX);
                sqlx::query(
                    "INSERT INTO invoice_line (
                        invoice_id,
                        line_no,
                        intake_entry_id,
                        feedstock_type_id,
                        qty_ton,
                        base_rate_per_ton,
                        quality_adjustment_per_ton,
                        rate_per_ton,
                        amount,
                        applied_quality_rules_json
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&invoice.id)
                .bind(line_no)
                .bind(&line.intake_entry_id)
                .bind(&line.feedstock_type_id)
                .bind(decimal_text(line.qty_ton))
                .bind(decimal_text(line.base_rate_per_ton))
                .bind(decimal_text(line.quality_adjustment_per_ton))
                .bind(decimal_text(line.rate_per_ton))
                .bind(decimal_text(line.amount))
                .bind(encode_applied(&line.applied_quality_rules)?)
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
            }
        }

        let mut cycle = cycle.clone();
        if !invoices.is_empty() {
            cycle.status = CycleStatus::Generated;
            cycle.updated_at = invoices[0].created_at;
            sqlx::query(
                "UPDATE invoice_cycle SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
            )
            .bind(cycle.status.as_str())
            .bind(timestamp_text(cycle.updated_at))
            .bind(ctx.tenant())
            .bind(&cycle.id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(cycle)
    }
}

#[async_trait]
impl InvoiceRepository for SqlInvoiceRepository {
    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(INVOICE_COLUMNS);
        query.push(" WHERE tenant_id = ").push_bind(ctx.tenant().to_string());
        if let Some(cycle_id) = &filter.cycle_id {
            query.push(" AND cycle_id = ").push_bind(cycle_id.clone());
        }
        if let Some(party_type) = filter.party_type {
            query.push(" AND party_type = ").push_bind(party_type.as_str());
        }
        if let Some(party_ref_id) = &filter.party_ref_id {
            query.push(" AND party_ref_id = ").push_bind(party_ref_id.as_str().to_string());
        }
        query.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut invoices = Vec::with_capacity(rows.len());
        for row in rows {
            let mut invoice = invoice_from_row(row)?;
            invoice.lines = self.load_lines(&invoice.id).await?;
            invoices.push(invoice);
        }
        Ok(invoices)
    }

    async fn find_cycle(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<InvoiceCycle>, RepositoryError> {
        let row = sqlx::query(&format!("{CYCLE_COLUMNS} WHERE tenant_id = ? AND id = ?"))
            .bind(ctx.tenant())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(cycle_from_row).transpose()
    }
}

fn encode_applied(rules: &[AppliedQualityRule]) -> Result<String, RepositoryError> {
    let stored: Vec<StoredAppliedRule> = rules
        .iter()
        .map(|rule| StoredAppliedRule {
            metric: rule.metric.clone(),
            operator: rule.operator.as_str().to_string(),
            threshold_value: decimal_text(rule.threshold_value),
            intake_metric_value: decimal_text(rule.intake_metric_value),
            adjustment_per_ton: decimal_text(rule.adjustment_per_ton),
        })
        .collect();
    serde_json::to_string(&stored)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode applied rules: {error}")))
}

fn decode_applied(raw: &str) -> Result<Vec<AppliedQualityRule>, RepositoryError> {
    let stored: Vec<StoredAppliedRule> = serde_json::from_str(raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid applied_quality_rules_json: {error}"))
    })?;
    stored
        .into_iter()
        .map(|rule| {
            let operator = RuleOperator::parse(&rule.operator).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown applied rule operator `{}`", rule.operator))
            })?;
            Ok(AppliedQualityRule {
                metric: rule.metric,
                operator,
                threshold_value: parse_decimal("thresholdValue", rule.threshold_value)?,
                intake_metric_value: parse_decimal("intakeMetricValue", rule.intake_metric_value)?,
                adjustment_per_ton: parse_decimal("adjustmentPerTon", rule.adjustment_per_ton)?,
            })
        })
        .collect()
}

fn cycle_from_row(row: SqliteRow) -> Result<InvoiceCycle, RepositoryError> {
    Ok(InvoiceCycle {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        cycle_code: row.try_get("cycle_code")?,
        week_start_date: parse_timestamp("week_start_date", row.try_get("week_start_date")?)?,
        week_end_date: parse_timestamp("week_end_date", row.try_get("week_end_date")?)?,
        status: parse_enum("status", row.try_get("status")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn invoice_from_row(row: SqliteRow) -> Result<Invoice, RepositoryError> {
    let party_ref_id: String = row.try_get("party_ref_id")?;

    Ok(Invoice {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        invoice_no: row.try_get("invoice_no")?,
        cycle_id: row.try_get("cycle_id")?,
        party_type: parse_enum("party_type", row.try_get("party_type")?)?,
        party_ref_id: PartyRef::parse("party_ref_id", &party_ref_id)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        week_start_date: parse_timestamp("week_start_date", row.try_get("week_start_date")?)?,
        week_end_date: parse_timestamp("week_end_date", row.try_get("week_end_date")?)?,
        total_qty_ton: parse_decimal("total_qty_ton", row.try_get("total_qty_ton")?)?,
        total_amount: parse_decimal("total_amount", row.try_get("total_amount")?)?,
        lines: Vec::new(),
        status: parse_enum("status", row.try_get("status")?)?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn line_from_row(row: SqliteRow) -> Result<InvoiceLine, RepositoryError> {
    let applied: String = row.try_get("applied_quality_rules_json")?;

    Ok(InvoiceLine {
        intake_entry_id: row.try_get("intake_entry_id")?,
        feedstock_type_id: row.try_get("feedstock_type_id")?,
        qty_ton: parse_decimal("qty_ton", row.try_get("qty_ton")?)?,
        base_rate_per_ton: parse_decimal("base_rate_per_ton", row.try_get("base_rate_per_ton")?)?,
        quality_adjustment_per_ton: parse_decimal(
            "quality_adjustment_per_ton",
            row.try_get("quality_adjustment_per_ton")?,
        )?,
        rate_per_ton: parse_decimal("rate_per_ton", row.try_get("rate_per_ton")?)?,
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        applied_quality_rules: decode_applied(&applied)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use feedstock_core::domain::invoice::{
        AppliedQualityRule, CycleStatus, Invoice, InvoiceFilter, InvoiceLine, InvoiceStatus,
    };
    use feedstock_core::domain::party::{PartyRef, PartyType};
    use feedstock_core::domain::rate_card::RuleOperator;
    use feedstock_core::domain::tenant::{Role, TenantContext};
    use feedstock_core::invoicing::{open_cycle, BillingWindow, InvoiceStore};

    use super::SqlInvoiceRepository;
    use crate::repositories::InvoiceRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(tenant, "user-1", Role::Procurement)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, 0, 0, 0).single().expect("date")
    }

    fn window() -> BillingWindow {
        BillingWindow { start: at(23), end: at(28) }
    }

    fn invoice(cycle_id: &str, party: &str, amount: i64) -> Invoice {
        Invoice {
            id: format!("inv-{party}-{amount}"),
            tenant_id: "tenant-a".to_string(),
            invoice_no: format!("INV-20260223-{party}-{amount}"),
            cycle_id: cycle_id.to_string(),
            party_type: PartyType::Farmer,
            party_ref_id: PartyRef::parse("partyRefId", party).expect("party"),
            week_start_date: at(23),
            week_end_date: at(28),
            total_qty_ton: Decimal::new(8500, 3),
            total_amount: Decimal::new(amount, 0),
            lines: vec![InvoiceLine {
                intake_entry_id: "intake-1".to_string(),
                feedstock_type_id: "feedstock-1".to_string(),
                qty_ton: Decimal::new(8500, 3),
                base_rate_per_ton: Decimal::new(1500, 0),
                quality_adjustment_per_ton: Decimal::new(50, 0),
                rate_per_ton: Decimal::new(1550, 0),
                amount: Decimal::new(amount, 0),
                applied_quality_rules: vec![AppliedQualityRule {
                    metric: "moisturePercent".to_string(),
                    operator: RuleOperator::Lte,
                    threshold_value: Decimal::new(15, 0),
                    intake_metric_value: Decimal::new(12, 0),
                    adjustment_per_ton: Decimal::new(100, 0),
                }],
            }],
            status: InvoiceStatus::Generated,
            notes: None,
            created_at: at(28),
        }
    }

    #[tokio::test]
    async fn one_cycle_per_window_per_tenant() {
        let repo = SqlInvoiceRepository::new(setup_pool().await);
        let first = repo
            .find_or_create_cycle(&ctx("tenant-a"), open_cycle(&ctx("tenant-a"), window(), at(28)))
            .await
            .expect("create");
        let again = repo
            .find_or_create_cycle(&ctx("tenant-a"), open_cycle(&ctx("tenant-a"), window(), at(28)))
            .await
            .expect("reuse");
        let other = repo
            .find_or_create_cycle(&ctx("tenant-b"), open_cycle(&ctx("tenant-b"), window(), at(28)))
            .await
            .expect("other tenant");

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.status, CycleStatus::Open);
    }

    #[tokio::test]
    async fn replace_swaps_the_party_type_set_and_keeps_lines() {
        let repo = SqlInvoiceRepository::new(setup_pool().await);
        let tenant = ctx("tenant-a");
        let cycle = repo
            .find_or_create_cycle(&tenant, open_cycle(&tenant, window(), at(28)))
            .await
            .expect("cycle");

        let cycle = repo
            .replace_invoices(&tenant, &cycle, PartyType::Farmer, &[invoice(&cycle.id, "farmer-1", 13175)])
            .await
            .expect("first run");
        assert_eq!(cycle.status, CycleStatus::Generated);
        assert_eq!(repo.count_invoices(&tenant, &cycle.id, PartyType::Farmer).await.expect("count"), 1);

        repo.replace_invoices(
            &tenant,
            &cycle,
            PartyType::Farmer,
            &[invoice(&cycle.id, "farmer-2", 100), invoice(&cycle.id, "farmer-3", 200)],
        )
        .await
        .expect("regen");

        let listed = repo
            .list(&tenant, &InvoiceFilter { cycle_id: Some(cycle.id.clone()), ..InvoiceFilter::default() })
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|invoice| invoice.party_ref_id.as_str() != "farmer-1"));
        assert_eq!(listed[0].lines.len(), 1);
        assert_eq!(listed[0].lines[0].applied_quality_rules[0].operator, RuleOperator::Lte);

        let stored = repo.find_cycle(&tenant, &cycle.id).await.expect("find").expect("cycle");
        assert_eq!(stored.status, CycleStatus::Generated);
        assert_eq!(
            repo.count_invoices(&tenant, &cycle.id, PartyType::Supplier).await.expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn invoices_are_invisible_to_other_tenants() {
        let repo = SqlInvoiceRepository::new(setup_pool().await);
        let tenant = ctx("tenant-a");
        let cycle = repo
            .find_or_create_cycle(&tenant, open_cycle(&tenant, window(), at(28)))
            .await
            .expect("cycle");
        repo.replace_invoices(&tenant, &cycle, PartyType::Farmer, &[invoice(&cycle.id, "farmer-1", 10)])
            .await
            .expect("replace");

        let foreign = repo.list(&ctx("tenant-b"), &InvoiceFilter::default()).await.expect("list");
        assert!(foreign.is_empty());
        assert!(repo.find_cycle(&ctx("tenant-b"), &cycle.id).await.expect("find").is_none());
    }
}
