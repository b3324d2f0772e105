use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Row};

use feedstock_core::domain::master::{MasterKind, MasterRecord};
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::errors::{ApplicationError, DomainError};

use super::columns::{parse_enum, parse_timestamp, timestamp_text};
use super::{MasterRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT
        id,
        tenant_id,
        kind,
        code,
        payload_json,
        is_active,
        created_at,
        updated_at
     FROM master_record";

pub struct SqlMasterRepository {
    pool: DbPool,
}

fn duplicate_code(record: &MasterRecord) -> String {
    format!(
        "{} `{}` already exists",
        record.kind.code_field(),
        record.code.as_deref().unwrap_or_default()
    )
}

impl SqlMasterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
        payload: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<MasterRecord, ApplicationError> {
        let record = MasterRecord::create(kind, ctx.tenant(), payload, now)?;
        self.insert(&record).await.map_err(|error| error.conflict_as(&duplicate_code(&record)))?;
        Ok(record)
    }

    pub async fn patch(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
        id: &str,
        patch: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<MasterRecord, ApplicationError> {
        let mut record = self
            .find_by_id(ctx, kind, id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("{} record not found", kind.as_str())))?;
        record.apply_patch(patch, now)?;
        self.update(&record).await.map_err(|error| error.conflict_as(&duplicate_code(&record)))?;
        Ok(record)
    }
}

fn encode_payload(payload: &Map<String, Value>) -> Result<String, RepositoryError> {
    serde_json::to_string(payload)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode payload: {error}")))
}

#[async_trait]
impl MasterRepository for SqlMasterRepository {
    async fn insert(&self, record: &MasterRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO master_record (
                id,
                tenant_id,
                kind,
                code,
                payload_json,
                is_active,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.tenant_id)
        .bind(record.kind.as_str())
        .bind(record.code.as_deref())
        .bind(encode_payload(&record.payload)?)
        .bind(record.is_active)
        .bind(timestamp_text(record.created_at))
        .bind(timestamp_text(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
        id: &str,
    ) -> Result<Option<MasterRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ? AND kind = ? AND id = ?"))
            .bind(ctx.tenant())
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(record_from_row).transpose()
    }

    async fn list(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
    ) -> Result<Vec<MasterRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE tenant_id = ? AND kind = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(ctx.tenant())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }

    async fn update(&self, record: &MasterRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE master_record
             SET code = ?, payload_json = ?, is_active = ?, updated_at = ?
             WHERE tenant_id = ? AND kind = ? AND id = ?",
        )
        .bind(record.code.as_deref())
        .bind(encode_payload(&record.payload)?)
        .bind(record.is_active)
        .bind(timestamp_text(record.updated_at))
        .bind(&record.tenant_id)
        .bind(record.kind.as_str())
        .bind(&record.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn record_from_row(row: SqliteRow) -> Result<MasterRecord, RepositoryError> {
    let payload_json: String = row.try_get("payload_json")?;
    let payload: Map<String, Value> = serde_json::from_str(&payload_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid payload_json: {error}")))?;

    Ok(MasterRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        kind: parse_enum("kind", row.try_get("kind")?)?,
        code: row.try_get("code")?,
        payload,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
