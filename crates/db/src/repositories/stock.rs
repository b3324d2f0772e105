use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use feedstock_core::domain::stock::{CenterReceiptLot, LedgerEntry, LedgerFilter, ReceiptLotFilter};
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::errors::ApplicationError;
use feedstock_core::stock::{MovementCommit, StockStore};

use super::columns::{
    decimal_text, optional_decimal_text, parse_decimal, parse_enum, parse_optional_decimal,
    parse_timestamp, timestamp_text,
};
use super::{RepositoryError, StockLedgerRepository};
use crate::DbPool;

pub const DUPLICATE_LOT_CODE: &str = "A receipt lot with this receiptLotCode already exists";

const LOT_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        receipt_lot_code,
        collection_center_id,
        source_type,
        source_ref_id,
        feedstock_type_id,
        receipt_date,
        gross_qty_ton,
        available_qty_ton,
        quality_grade,
        moisture_percent,
        notes,
        is_active,
        created_at,
        updated_at
     FROM center_receipt_lot";

const LEDGER_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        collection_center_id,
        center_receipt_lot_id,
        movement_type,
        qty_ton,
        balance_after_ton,
        ref_type,
        ref_id,
        remarks,
        created_at
     FROM center_stock_ledger";

/// Receipt lots and their append-only ledger. Balance changes and ledger
/// appends always share one transaction.
pub struct SqlStockRepository {
    pool: DbPool,
}

impl SqlStockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &LedgerEntry) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO center_stock_ledger (
            id,
            tenant_id,
            collection_center_id,
            center_receipt_lot_id,
            movement_type,
            qty_ton,
            balance_after_ton,
            ref_type,
            ref_id,
            remarks,
            created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.collection_center_id)
    .bind(&entry.center_receipt_lot_id)
    .bind(entry.movement_type.as_str())
    .bind(decimal_text(entry.qty_ton))
    .bind(decimal_text(entry.balance_after_ton))
    .bind(entry.ref_type.as_deref())
    .bind(entry.ref_id.as_deref())
    .bind(entry.remarks.as_deref())
    .bind(timestamp_text(entry.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl StockStore for SqlStockRepository {
    async fn create_lot(
        &self,
        _ctx: &TenantContext,
        lot: &CenterReceiptLot,
        opening: &LedgerEntry,
    ) -> Result<(), ApplicationError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            "INSERT INTO center_receipt_lot (
                id,
                tenant_id,
                receipt_lot_code,
                collection_center_id,
                source_type,
                source_ref_id,
                feedstock_type_id,
                receipt_date,
                gross_qty_ton,
                available_qty_ton,
                quality_grade,
                moisture_percent,
                notes,
                is_active,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lot.id)
        .bind(&lot.tenant_id)
        .bind(&lot.receipt_lot_code)
        .bind(&lot.collection_center_id)
        .bind(lot.source_type.as_str())
        .bind(lot.source_ref_id.as_deref())
        .bind(&lot.feedstock_type_id)
        .bind(timestamp_text(lot.receipt_date))
        .bind(decimal_text(lot.gross_qty_ton))
        .bind(decimal_text(lot.available_qty_ton))
        .bind(lot.quality_grade.as_deref())
        .bind(optional_decimal_text(lot.moisture_percent))
        .bind(lot.notes.as_deref())
        .bind(lot.is_active)
        .bind(timestamp_text(lot.created_at))
        .bind(timestamp_text(lot.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|error| RepositoryError::from(error).conflict_as(DUPLICATE_LOT_CODE))?;

        insert_entry(&mut *tx, opening).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find_lot(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
    ) -> Result<Option<CenterReceiptLot>, ApplicationError> {
        Ok(self.find_lot_by_id(ctx, lot_id).await?)
    }

    async fn commit_movement(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
        expected_available: Decimal,
        entry: &LedgerEntry,
    ) -> Result<MovementCommit, ApplicationError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let swapped = sqlx::query(
            "UPDATE center_receipt_lot
             SET available_qty_ton = ?, updated_at = ?
             WHERE tenant_id = ? AND id = ? AND available_qty_ton = ?",
        )
        .bind(decimal_text(entry.balance_after_ton))
        .bind(timestamp_text(entry.created_at))
        .bind(ctx.tenant())
        .bind(lot_id)
        .bind(decimal_text(expected_available))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if swapped.rows_affected() == 0 {
            tx.rollback().await.map_err(RepositoryError::from)?;
            return Ok(MovementCommit::Stale);
        }

        insert_entry(&mut *tx, entry).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(MovementCommit::Committed(entry.clone()))
    }

    async fn lot_history(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
    ) -> Result<Vec<LedgerEntry>, ApplicationError> {
        let rows = sqlx::query(&format!(
            "{LEDGER_COLUMNS} WHERE tenant_id = ? AND center_receipt_lot_id = ? ORDER BY seq ASC"
        ))
        .bind(ctx.tenant())
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.into_iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl StockLedgerRepository for SqlStockRepository {
    async fn find_lot_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<CenterReceiptLot>, RepositoryError> {
        let row = sqlx::query(&format!("{LOT_COLUMNS} WHERE tenant_id = ? AND id = ?"))
            .bind(ctx.tenant())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(lot_from_row).transpose()
    }

    async fn list_lots(
        &self,
        ctx: &TenantContext,
        filter: &ReceiptLotFilter,
    ) -> Result<Vec<CenterReceiptLot>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(LOT_COLUMNS);
        query.push(" WHERE tenant_id = ").push_bind(ctx.tenant().to_string());
        if let Some(collection_center_id) = &filter.collection_center_id {
            query.push(" AND collection_center_id = ").push_bind(collection_center_id.clone());
        }
        if let Some(feedstock_type_id) = &filter.feedstock_type_id {
            query.push(" AND feedstock_type_id = ").push_bind(feedstock_type_id.clone());
        }
        query.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(lot_from_row).collect()
    }

    async fn set_lot_active(
        &self,
        ctx: &TenantContext,
        id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE center_receipt_lot SET is_active = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(is_active)
        .bind(timestamp_text(now))
        .bind(ctx.tenant())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_entries(
        &self,
        ctx: &TenantContext,
        filter: &LedgerFilter,
    ) -> Result<Vec<LedgerEntry>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(LEDGER_COLUMNS);
        query.push(" WHERE tenant_id = ").push_bind(ctx.tenant().to_string());
        if let Some(collection_center_id) = &filter.collection_center_id {
            query.push(" AND collection_center_id = ").push_bind(collection_center_id.clone());
        }
        if let Some(lot_id) = &filter.center_receipt_lot_id {
            query.push(" AND center_receipt_lot_id = ").push_bind(lot_id.clone());
        }
        if let Some(movement_type) = filter.movement_type {
            query.push(" AND movement_type = ").push_bind(movement_type.as_str());
        }
        query.push(" ORDER BY created_at DESC, seq DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(entry_from_row).collect()
    }
}

fn lot_from_row(row: SqliteRow) -> Result<CenterReceiptLot, RepositoryError> {
    Ok(CenterReceiptLot {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        receipt_lot_code: row.try_get("receipt_lot_code")?,
        collection_center_id: row.try_get("collection_center_id")?,
        source_type: parse_enum("source_type", row.try_get("source_type")?)?,
        source_ref_id: row.try_get("source_ref_id")?,
        feedstock_type_id: row.try_get("feedstock_type_id")?,
        receipt_date: parse_timestamp("receipt_date", row.try_get("receipt_date")?)?,
        gross_qty_ton: parse_decimal("gross_qty_ton", row.try_get("gross_qty_ton")?)?,
        available_qty_ton: parse_decimal("available_qty_ton", row.try_get("available_qty_ton")?)?,
        quality_grade: row.try_get("quality_grade")?,
        moisture_percent: parse_optional_decimal(
            "moisture_percent",
            row.try_get("moisture_percent")?,
        )?,
        notes: row.try_get("notes")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn entry_from_row(row: SqliteRow) -> Result<LedgerEntry, RepositoryError> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        collection_center_id: row.try_get("collection_center_id")?,
        center_receipt_lot_id: row.try_get("center_receipt_lot_id")?,
        movement_type: parse_enum("movement_type", row.try_get("movement_type")?)?,
        qty_ton: parse_decimal("qty_ton", row.try_get("qty_ton")?)?,
        balance_after_ton: parse_decimal("balance_after_ton", row.try_get("balance_after_ton")?)?,
        ref_type: row.try_get("ref_type")?,
        ref_id: row.try_get("ref_id")?,
        remarks: row.try_get("remarks")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
