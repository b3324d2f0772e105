//! Center stock ledger: postings against receipt lots and ledger replay.

pub mod poster;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::stock::{CenterReceiptLot, LedgerEntry};
use crate::domain::tenant::TenantContext;
use crate::errors::ApplicationError;

pub use poster::StockLedgerPoster;

/// Result of a compare-and-swap posting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MovementCommit {
    Committed(LedgerEntry),
    /// The stored balance no longer matched the value the posting was based on.
    Stale,
}

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Inserts the lot and its opening IN row in one transaction.
    async fn create_lot(
        &self,
        ctx: &TenantContext,
        lot: &CenterReceiptLot,
        opening: &LedgerEntry,
    ) -> Result<(), ApplicationError>;

    async fn find_lot(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
    ) -> Result<Option<CenterReceiptLot>, ApplicationError>;

    /// Sets the lot balance to `entry.balance_after_ton` only if it still
    /// equals `expected_available`, then appends `entry`; both or neither.
    async fn commit_movement(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
        expected_available: Decimal,
        entry: &LedgerEntry,
    ) -> Result<MovementCommit, ApplicationError>;

    /// Ledger rows of one lot in posting order.
    async fn lot_history(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
    ) -> Result<Vec<LedgerEntry>, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub center_receipt_lot_id: String,
    pub valid: bool,
    pub verified_entries: usize,
    pub replayed_balance_ton: Decimal,
    pub available_qty_ton: Decimal,
    pub failure_reason: Option<String>,
}

/// Replays `entries` from zero and checks every recorded running balance,
/// that the balance never dips below zero, and that it ends at the lot's
/// available quantity.
pub fn replay_lot(lot: &CenterReceiptLot, entries: &[LedgerEntry]) -> LedgerVerification {
    let report = |valid: bool, verified: usize, balance: Decimal, reason: Option<String>| {
        LedgerVerification {
            center_receipt_lot_id: lot.id.clone(),
            valid,
            verified_entries: verified,
            replayed_balance_ton: balance,
            available_qty_ton: lot.available_qty_ton,
            failure_reason: reason,
        }
    };

    if entries.is_empty() {
        return report(false, 0, Decimal::ZERO, Some("no ledger entries found for lot".to_string()));
    }

    let mut balance = Decimal::ZERO;
    for (index, entry) in entries.iter().enumerate() {
        if entry.center_receipt_lot_id != lot.id {
            return report(
                false,
                index,
                balance,
                Some(format!("entry {} belongs to another lot", entry.id)),
            );
        }
        balance += entry.qty_ton;
        if balance < Decimal::ZERO {
            return report(
                false,
                index,
                balance,
                Some(format!("balance went negative at entry {}", entry.id)),
            );
        }
        if entry.balance_after_ton != balance {
            return report(
                false,
                index,
                balance,
                Some(format!(
                    "running balance mismatch at entry {}: expected {}, recorded {}",
                    entry.id, balance, entry.balance_after_ton
                )),
            );
        }
    }

    if balance != lot.available_qty_ton {
        return report(
            false,
            entries.len(),
            balance,
            Some(format!(
                "replayed balance {} does not match available quantity {}",
                balance, lot.available_qty_ton
            )),
        );
    }

    report(true, entries.len(), balance, None)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::replay_lot;
    use crate::domain::party::SourceType;
    use crate::domain::stock::{CenterReceiptLot, LedgerEntry, MovementType};

    fn lot(available: i64) -> CenterReceiptLot {
        let now = Utc::now();
        CenterReceiptLot {
            id: "lot-1".to_string(),
            tenant_id: "tenant-a".to_string(),
            receipt_lot_code: "CRL-20260220-100000".to_string(),
            collection_center_id: "center-1".to_string(),
            source_type: SourceType::Farmer,
            source_ref_id: None,
            feedstock_type_id: "feedstock-1".to_string(),
            receipt_date: now,
            gross_qty_ton: Decimal::new(25, 0),
            available_qty_ton: Decimal::new(available, 0),
            quality_grade: None,
            moisture_percent: None,
            notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(id: &str, movement_type: MovementType, qty: i64, balance: i64) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            tenant_id: "tenant-a".to_string(),
            collection_center_id: "center-1".to_string(),
            center_receipt_lot_id: "lot-1".to_string(),
            movement_type,
            qty_ton: Decimal::new(qty, 0),
            balance_after_ton: Decimal::new(balance, 0),
            ref_type: None,
            ref_id: None,
            remarks: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn consistent_history_verifies() {
        let history = vec![
            entry("e1", MovementType::In, 25, 25),
            entry("e2", MovementType::Out, -8, 17),
            entry("e3", MovementType::Adjust, 2, 19),
        ];
        let report = replay_lot(&lot(19), &history);

        assert!(report.valid, "{:?}", report.failure_reason);
        assert_eq!(report.verified_entries, 3);
        assert_eq!(report.replayed_balance_ton, Decimal::new(19, 0));
    }

    #[test]
    fn tampered_running_balance_is_reported() {
        let history =
            vec![entry("e1", MovementType::In, 25, 25), entry("e2", MovementType::Out, -8, 18)];
        let report = replay_lot(&lot(18), &history);

        assert!(!report.valid);
        assert_eq!(report.verified_entries, 1);
        assert!(report.failure_reason.unwrap_or_default().contains("e2"));
    }

    #[test]
    fn drift_between_lot_and_ledger_is_reported() {
        let history =
            vec![entry("e1", MovementType::In, 25, 25), entry("e2", MovementType::Out, -8, 17)];
        let report = replay_lot(&lot(20), &history);

        assert!(!report.valid);
        assert_eq!(report.verified_entries, 2);
    }

    #[test]
    fn empty_history_is_invalid() {
        assert!(!replay_lot(&lot(25), &[]).valid);
    }
}
