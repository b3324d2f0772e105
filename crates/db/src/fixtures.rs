use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Rows the demo fixture promises, checked by [`DemoSeedDataset::verify`].
const SEED_RECORDS: &[SeedRecordContract] = &[
    SeedRecordContract {
        table: "master_record",
        id: "8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f",
        description: "Feedstock type PADDY-STRAW",
    },
    SeedRecordContract {
        table: "master_record",
        id: "1f0a6b2e-3c4d-4e5f-8a9b-0c1d2e3f4a5b",
        description: "Farmer F-001 with a rate card",
    },
    SeedRecordContract {
        table: "master_record",
        id: "2f0a6b2e-3c4d-4e5f-8a9b-0c1d2e3f4a5b",
        description: "Farmer F-002 without a rate card",
    },
    SeedRecordContract {
        table: "master_record",
        id: "5b1d0c1e-9f3a-4d8e-8a52-3c1f2d4e6a70",
        description: "Collection center CC-KARNAL",
    },
    SeedRecordContract {
        table: "rate_card",
        id: "7a3c9e10-4b2d-4f6a-9c8e-1d2f3a4b5c61",
        description: "F-001 paddy straw at 1600/ton with moisture and contamination rules",
    },
    SeedRecordContract {
        table: "plant_intake_entry",
        id: "9b4e2f70-1a3c-4d5e-8f60-7a8b9c0d1e21",
        description: "8.5 t accepted from F-001 at 22% moisture",
    },
    SeedRecordContract {
        table: "plant_intake_entry",
        id: "9b4e2f70-1a3c-4d5e-8f60-7a8b9c0d1e22",
        description: "4.2 t accepted from F-002 (no rate in force)",
    },
    SeedRecordContract {
        table: "center_receipt_lot",
        id: "c15a7d20-6e4f-4a1b-9d3c-2e1f0a9b8c71",
        description: "25 t receipt lot at CC-KARNAL",
    },
    SeedRecordContract {
        table: "center_stock_ledger",
        id: "d27b8e31-7f5a-4b2c-8e4d-3f2a1b0c9d81",
        description: "Opening IN posting for the receipt lot",
    },
];

/// Deterministic demo tenant used by `feedstock seed` and end-to-end tests.
///
/// Loading is idempotent. There is no `clean`: ledger rows are append-only,
/// so a seeded database is discarded rather than scrubbed.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const TENANT_ID: &'static str = "demo-tenant";

    /// SQL fixture content for the demo tenant.
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let records_seeded = SEED_RECORDS
            .iter()
            .map(|record| SeedRecordInfo {
                table: record.table,
                id: record.id,
                description: record.description,
            })
            .collect();

        Ok(SeedResult { tenant_id: Self::TENANT_ID, records_seeded })
    }

    /// Checks every promised row exists for the demo tenant.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_RECORDS.len() + 1);

        for record in SEED_RECORDS {
            let present: i64 = sqlx::query_scalar(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE tenant_id = ?1 AND id = ?2)",
                record.table
            ))
            .bind(Self::TENANT_ID)
            .bind(record.id)
            .fetch_one(pool)
            .await?;
            checks.push((record.id, present == 1));
        }

        let opening_balance: Option<String> = sqlx::query_scalar(
            "SELECT available_qty_ton FROM center_receipt_lot WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(Self::TENANT_ID)
        .bind("c15a7d20-6e4f-4a1b-9d3c-2e1f0a9b8c71")
        .fetch_optional(pool)
        .await?;
        checks.push(("receipt-lot-balance", opening_balance.is_some()));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRecordContract {
    table: &'static str,
    id: &'static str,
    description: &'static str,
}

#[derive(Debug)]
pub struct SeedResult {
    pub tenant_id: &'static str,
    pub records_seeded: Vec<SeedRecordInfo>,
}

#[derive(Debug)]
pub struct SeedRecordInfo {
    pub table: &'static str,
    pub id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
