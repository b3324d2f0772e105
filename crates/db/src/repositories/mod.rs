use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use feedstock_core::domain::intake::{IntakeFilter, PlantIntakeEntry};
use feedstock_core::domain::invoice::{Invoice, InvoiceCycle, InvoiceFilter};
use feedstock_core::domain::master::{MasterKind, MasterRecord};
use feedstock_core::domain::rate_card::{RateCard, RateCardFilter};
use feedstock_core::domain::stock::{CenterReceiptLot, LedgerEntry, LedgerFilter, ReceiptLotFilter};
use feedstock_core::domain::tenant::TenantContext;
use feedstock_core::errors::{ApplicationError, DomainError};

mod columns;
pub mod intake;
pub mod invoice;
pub mod master;
pub mod rate_card;
pub mod stock;

pub use intake::SqlIntakeRepository;
pub use invoice::SqlInvoiceRepository;
pub use master::SqlMasterRepository;
pub use rate_card::SqlRateCardRepository;
pub use stock::SqlStockRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &error {
            if database_error.is_unique_violation() {
                return Self::UniqueViolation(database_error.message().to_string());
            }
        }
        Self::Database(error)
    }
}

impl RepositoryError {
    /// Reports a unique violation as a conflict with a caller-facing message.
    pub fn conflict_as(self, message: &str) -> ApplicationError {
        match self {
            Self::UniqueViolation(_) => DomainError::conflict(message).into(),
            other => other.into(),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::UniqueViolation(_) => {
                DomainError::conflict("A record with the same unique key already exists").into()
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait RateCardRepository: Send + Sync {
    async fn insert(&self, card: &RateCard) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<RateCard>, RepositoryError>;
    /// Newest `effectiveFrom` first, then newest creation.
    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &RateCardFilter,
    ) -> Result<Vec<RateCard>, RepositoryError>;
    async fn update(&self, card: &RateCard) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait IntakeRepository: Send + Sync {
    async fn insert(&self, entry: &PlantIntakeEntry) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<PlantIntakeEntry>, RepositoryError>;
    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &IntakeFilter,
    ) -> Result<Vec<PlantIntakeEntry>, RepositoryError>;
    async fn set_active(
        &self,
        ctx: &TenantContext,
        id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait StockLedgerRepository: Send + Sync {
    async fn find_lot_by_id(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<CenterReceiptLot>, RepositoryError>;
    async fn list_lots(
        &self,
        ctx: &TenantContext,
        filter: &ReceiptLotFilter,
    ) -> Result<Vec<CenterReceiptLot>, RepositoryError>;
    async fn set_lot_active(
        &self,
        ctx: &TenantContext,
        id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Newest first.
    async fn list_entries(
        &self,
        ctx: &TenantContext,
        filter: &LedgerFilter,
    ) -> Result<Vec<LedgerEntry>, RepositoryError>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Newest first, lines in posting order.
    async fn list(
        &self,
        ctx: &TenantContext,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, RepositoryError>;
    async fn find_cycle(
        &self,
        ctx: &TenantContext,
        id: &str,
    ) -> Result<Option<InvoiceCycle>, RepositoryError>;
}

#[async_trait]
pub trait MasterRepository: Send + Sync {
    async fn insert(&self, record: &MasterRecord) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
        id: &str,
    ) -> Result<Option<MasterRecord>, RepositoryError>;
    /// Newest first.
    async fn list(
        &self,
        ctx: &TenantContext,
        kind: MasterKind,
    ) -> Result<Vec<MasterRecord>, RepositoryError>;
    async fn update(&self, record: &MasterRecord) -> Result<(), RepositoryError>;
}
