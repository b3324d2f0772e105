use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::stock::{
    CenterReceiptLot, LedgerEntry, MovementRequest, MovementType, MANUAL_ADJUSTMENT_REF_TYPE,
    MANUAL_OUT_REF_TYPE, RECEIPT_REF_TYPE,
};
use crate::domain::tenant::TenantContext;
use crate::domain::values::new_id;
use crate::errors::{ApplicationError, DomainError};
use crate::stock::{replay_lot, LedgerVerification, MovementCommit, StockStore};
use crate::sync::KeyedLocks;

pub const LOT_NOT_FOUND: &str = "Center receipt lot not found";
pub const INSUFFICIENT_QUANTITY: &str = "Insufficient available quantity in lot";
pub const STALE_BALANCE: &str = "lot balance changed concurrently";

/// Posts IN, OUT and ADJUST movements. Every posting moves the lot balance
/// and appends exactly one ledger row whose `balance_after_ton` is the new
/// balance.
pub struct StockLedgerPoster {
    store: Arc<dyn StockStore>,
    locks: KeyedLocks,
}

impl StockLedgerPoster {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store, locks: KeyedLocks::new() }
    }

    /// Persists a new lot together with its opening IN row.
    pub async fn post_in(
        &self,
        ctx: &TenantContext,
        lot: CenterReceiptLot,
    ) -> Result<(CenterReceiptLot, LedgerEntry), ApplicationError> {
        let opening = LedgerEntry {
            id: new_id(),
            tenant_id: ctx.tenant().to_string(),
            collection_center_id: lot.collection_center_id.clone(),
            center_receipt_lot_id: lot.id.clone(),
            movement_type: MovementType::In,
            qty_ton: lot.gross_qty_ton,
            balance_after_ton: lot.available_qty_ton,
            ref_type: Some(RECEIPT_REF_TYPE.to_string()),
            ref_id: Some(lot.id.clone()),
            remarks: Some(format!("Receipt {}", lot.receipt_lot_code)),
            created_at: lot.created_at,
        };
        self.store.create_lot(ctx, &lot, &opening).await?;

        info!(
            event_name = "stock.ledger.in_posted",
            tenant_id = %ctx.tenant(),
            lot_id = %lot.id,
            qty_ton = %opening.qty_ton,
            "receipt lot opened"
        );
        Ok((lot, opening))
    }

    pub async fn post_out(
        &self,
        ctx: &TenantContext,
        request: MovementRequest,
    ) -> Result<LedgerEntry, ApplicationError> {
        if request.qty_ton <= Decimal::ZERO {
            return Err(DomainError::validation("qtyTon must be greater than 0 for OUT movement").into());
        }
        let qty = request.qty_ton;
        self.post(ctx, MovementType::Out, request, move |lot| {
            if lot.available_qty_ton < qty {
                return Err(DomainError::InsufficientQuantity(INSUFFICIENT_QUANTITY.to_string()));
            }
            Ok((-qty, lot.available_qty_ton - qty))
        })
        .await
    }

    pub async fn post_adjust(
        &self,
        ctx: &TenantContext,
        request: MovementRequest,
    ) -> Result<LedgerEntry, ApplicationError> {
        if request.qty_ton.is_zero() {
            return Err(DomainError::validation("qtyTon must not be 0 for ADJUST movement").into());
        }
        let delta = request.qty_ton;
        self.post(ctx, MovementType::Adjust, request, move |lot| {
            let next = lot.available_qty_ton + delta;
            if next < Decimal::ZERO {
                return Err(DomainError::InsufficientQuantity(INSUFFICIENT_QUANTITY.to_string()));
            }
            if next > lot.gross_qty_ton {
                return Err(DomainError::validation(
                    "Adjusted balance cannot exceed grossQtyTon of the lot",
                ));
            }
            Ok((delta, next))
        })
        .await
    }

    pub async fn verify(
        &self,
        ctx: &TenantContext,
        lot_id: &str,
    ) -> Result<LedgerVerification, ApplicationError> {
        let lot = self
            .store
            .find_lot(ctx, lot_id)
            .await?
            .ok_or_else(|| DomainError::not_found(LOT_NOT_FOUND))?;
        let history = self.store.lot_history(ctx, lot_id).await?;
        let report = replay_lot(&lot, &history);
        if !report.valid {
            warn!(
                event_name = "stock.ledger.verification_failed",
                tenant_id = %ctx.tenant(),
                lot_id = %lot.id,
                reason = report.failure_reason.as_deref().unwrap_or_default(),
                "ledger replay does not match lot balance"
            );
        }
        Ok(report)
    }

    /// Shared OUT/ADJUST flow. `plan` returns the signed ledger quantity and
    /// the new lot balance, or the reason the movement is refused.
    async fn post<F>(
        &self,
        ctx: &TenantContext,
        movement_type: MovementType,
        request: MovementRequest,
        plan: F,
    ) -> Result<LedgerEntry, ApplicationError>
    where
        F: FnOnce(&CenterReceiptLot) -> Result<(Decimal, Decimal), DomainError> + Send,
    {
        let _guard = self.locks.acquire(format!("{}|{}", ctx.tenant(), request.lot_id)).await;

        let lot = self
            .store
            .find_lot(ctx, &request.lot_id)
            .await?
            .ok_or_else(|| DomainError::not_found(LOT_NOT_FOUND))?;
        let (signed_qty, balance_after) = plan(&lot)?;

        let default_ref = match movement_type {
            MovementType::Adjust => MANUAL_ADJUSTMENT_REF_TYPE,
            _ => MANUAL_OUT_REF_TYPE,
        };
        let entry = LedgerEntry {
            id: new_id(),
            tenant_id: ctx.tenant().to_string(),
            collection_center_id: lot.collection_center_id.clone(),
            center_receipt_lot_id: lot.id.clone(),
            movement_type,
            qty_ton: signed_qty,
            balance_after_ton: balance_after,
            ref_type: Some(request.ref_type.unwrap_or_else(|| default_ref.to_string())),
            ref_id: request.ref_id,
            remarks: request.remarks,
            created_at: Utc::now(),
        };

        match self.store.commit_movement(ctx, &lot.id, lot.available_qty_ton, &entry).await? {
            MovementCommit::Committed(entry) => {
                let event_name = match movement_type {
                    MovementType::Adjust => "stock.ledger.adjust_posted",
                    _ => "stock.ledger.out_posted",
                };
                info!(
                    event_name,
                    tenant_id = %ctx.tenant(),
                    lot_id = %lot.id,
                    qty_ton = %entry.qty_ton,
                    balance_after_ton = %entry.balance_after_ton,
                    "stock movement posted"
                );
                Ok(entry)
            }
            MovementCommit::Stale => {
                warn!(
                    event_name = "stock.ledger.stale_balance",
                    tenant_id = %ctx.tenant(),
                    lot_id = %lot.id,
                    "lot balance moved between read and write"
                );
                Err(DomainError::conflict(STALE_BALANCE).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{StockLedgerPoster, INSUFFICIENT_QUANTITY, LOT_NOT_FOUND, STALE_BALANCE};
    use crate::domain::stock::{
        CenterReceiptLot, LedgerEntry, MovementRequest, MovementType, ReceiptLotInput,
        MANUAL_ADJUSTMENT_REF_TYPE, MANUAL_OUT_REF_TYPE, RECEIPT_REF_TYPE,
    };
    use crate::domain::tenant::{Role, TenantContext};
    use crate::errors::{ApplicationError, DomainError};
    use crate::stock::{MovementCommit, StockStore};

    #[derive(Default)]
    struct MemoryStock {
        lots: Mutex<HashMap<String, CenterReceiptLot>>,
        ledger: Mutex<Vec<LedgerEntry>>,
        force_stale: bool,
    }

    #[async_trait]
    impl StockStore for MemoryStock {
        async fn create_lot(
            &self,
            _ctx: &TenantContext,
            lot: &CenterReceiptLot,
            opening: &LedgerEntry,
        ) -> Result<(), ApplicationError> {
            self.lots.lock().expect("lots").insert(lot.id.clone(), lot.clone());
            self.ledger.lock().expect("ledger").push(opening.clone());
            Ok(())
        }

        async fn find_lot(
            &self,
            ctx: &TenantContext,
            lot_id: &str,
        ) -> Result<Option<CenterReceiptLot>, ApplicationError> {
            Ok(self
                .lots
                .lock()
                .expect("lots")
                .get(lot_id)
                .filter(|lot| lot.tenant_id == ctx.tenant())
                .cloned())
        }

        async fn commit_movement(
            &self,
            _ctx: &TenantContext,
            lot_id: &str,
            expected_available: Decimal,
            entry: &LedgerEntry,
        ) -> Result<MovementCommit, ApplicationError> {
            let mut lots = self.lots.lock().expect("lots");
            let lot = lots
                .get_mut(lot_id)
                .ok_or_else(|| ApplicationError::Persistence("lot vanished".to_string()))?;
            if self.force_stale || lot.available_qty_ton != expected_available {
                return Ok(MovementCommit::Stale);
            }
            lot.available_qty_ton = entry.balance_after_ton;
            self.ledger.lock().expect("ledger").push(entry.clone());
            Ok(MovementCommit::Committed(entry.clone()))
        }

        async fn lot_history(
            &self,
            _ctx: &TenantContext,
            lot_id: &str,
        ) -> Result<Vec<LedgerEntry>, ApplicationError> {
            Ok(self
                .ledger
                .lock()
                .expect("ledger")
                .iter()
                .filter(|entry| entry.center_receipt_lot_id == lot_id)
                .cloned()
                .collect())
        }
    }

    fn ctx() -> TenantContext {
        TenantContext::new("tenant-a", "user-1", Role::Procurement)
    }

    fn receipt(gross: i64) -> CenterReceiptLot {
        ReceiptLotInput {
            collection_center_id: Some("5b1d0c1e-9f3a-4d8e-8a52-3c1f2d4e6a70".to_string()),
            source_type: Some("farmer".to_string()),
            feedstock_type_id: Some("8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f".to_string()),
            receipt_date: Some("2026-02-20".to_string()),
            gross_qty_ton: Some(Decimal::new(gross, 0)),
            ..ReceiptLotInput::default()
        }
        .into_lot(&ctx(), Utc::now())
        .expect("lot")
    }

    fn movement(lot_id: &str, qty: i64) -> MovementRequest {
        MovementRequest {
            lot_id: lot_id.to_string(),
            qty_ton: Decimal::new(qty, 0),
            ref_type: None,
            ref_id: None,
            remarks: None,
        }
    }

    async fn opened(store: Arc<MemoryStock>, gross: i64) -> (StockLedgerPoster, CenterReceiptLot) {
        let poster = StockLedgerPoster::new(store);
        let (lot, opening) = poster.post_in(&ctx(), receipt(gross)).await.expect("post in");
        assert_eq!(opening.movement_type, MovementType::In);
        assert_eq!(opening.ref_type.as_deref(), Some(RECEIPT_REF_TYPE));
        assert_eq!(opening.ref_id.as_deref(), Some(lot.id.as_str()));
        (poster, lot)
    }

    #[tokio::test]
    async fn out_reduces_balance_and_overdraw_is_refused() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store.clone(), 25).await;

        let out = poster.post_out(&ctx(), movement(&lot.id, 8)).await.expect("out 8");
        assert_eq!(out.qty_ton, Decimal::new(-8, 0));
        assert_eq!(out.balance_after_ton, Decimal::new(17, 0));
        assert_eq!(out.ref_type.as_deref(), Some(MANUAL_OUT_REF_TYPE));

        let error = poster.post_out(&ctx(), movement(&lot.id, 20)).await.expect_err("out 20");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::InsufficientQuantity(INSUFFICIENT_QUANTITY.to_string()))
        );

        let stored = store.lots.lock().expect("lots").get(&lot.id).cloned().expect("lot");
        assert_eq!(stored.available_qty_ton, Decimal::new(17, 0));
        assert_eq!(store.ledger.lock().expect("ledger").len(), 2);
    }

    #[tokio::test]
    async fn non_positive_out_is_a_validation_error() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store, 25).await;

        let error = poster.post_out(&ctx(), movement(&lot.id, 0)).await.expect_err("zero");
        assert_eq!(
            error.to_string(),
            "qtyTon must be greater than 0 for OUT movement"
        );
    }

    #[tokio::test]
    async fn unknown_lot_and_foreign_tenant_are_not_found() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store, 25).await;

        let missing = poster.post_out(&ctx(), movement("no-such-lot", 1)).await.expect_err("missing");
        assert_eq!(missing, ApplicationError::Domain(DomainError::not_found(LOT_NOT_FOUND)));

        let other = TenantContext::new("tenant-b", "user-9", Role::Admin);
        let foreign = poster.post_out(&other, movement(&lot.id, 1)).await.expect_err("foreign");
        assert_eq!(foreign, ApplicationError::Domain(DomainError::not_found(LOT_NOT_FOUND)));
    }

    #[tokio::test]
    async fn adjust_stays_within_zero_and_gross() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store, 25).await;
        poster.post_out(&ctx(), movement(&lot.id, 10)).await.expect("out");

        let up = poster.post_adjust(&ctx(), movement(&lot.id, 4)).await.expect("adjust up");
        assert_eq!(up.balance_after_ton, Decimal::new(19, 0));
        assert_eq!(up.ref_type.as_deref(), Some(MANUAL_ADJUSTMENT_REF_TYPE));

        let over = poster.post_adjust(&ctx(), movement(&lot.id, 7)).await.expect_err("above gross");
        assert!(matches!(over, ApplicationError::Domain(DomainError::Validation(_))));

        let under = poster.post_adjust(&ctx(), movement(&lot.id, -20)).await.expect_err("below zero");
        assert!(matches!(under, ApplicationError::Domain(DomainError::InsufficientQuantity(_))));

        let zero = poster.post_adjust(&ctx(), movement(&lot.id, 0)).await.expect_err("zero");
        assert!(matches!(zero, ApplicationError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn lost_compare_and_swap_is_a_conflict() {
        let store = Arc::new(MemoryStock { force_stale: true, ..MemoryStock::default() });
        let (poster, lot) = opened(store.clone(), 25).await;

        let error = poster.post_out(&ctx(), movement(&lot.id, 1)).await.expect_err("stale");
        assert_eq!(error, ApplicationError::Domain(DomainError::conflict(STALE_BALANCE)));
        assert_eq!(store.ledger.lock().expect("ledger").len(), 1);
    }

    #[tokio::test]
    async fn concurrent_outs_never_overdraw() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store.clone(), 10).await;
        let poster = Arc::new(poster);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let poster = Arc::clone(&poster);
            let lot_id = lot.id.clone();
            handles.push(tokio::spawn(async move {
                poster.post_out(&ctx(), movement(&lot_id, 3)).await.is_ok()
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.expect("task") {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        let stored = store.lots.lock().expect("lots").get(&lot.id).cloned().expect("lot");
        assert_eq!(stored.available_qty_ton, Decimal::ONE);
    }

    #[tokio::test]
    async fn history_replays_after_in_out_and_adjust() {
        let store = Arc::new(MemoryStock::default());
        let (poster, lot) = opened(store, 25).await;
        poster.post_out(&ctx(), movement(&lot.id, 8)).await.expect("out");
        poster.post_adjust(&ctx(), movement(&lot.id, -2)).await.expect("adjust");

        let report = poster.verify(&ctx(), &lot.id).await.expect("verify");

        assert!(report.valid, "{:?}", report.failure_reason);
        assert_eq!(report.verified_entries, 3);
        assert_eq!(report.available_qty_ton, Decimal::new(15, 0));
    }
}
