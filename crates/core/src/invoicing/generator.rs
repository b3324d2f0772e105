use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::domain::party::PartyKey;
use crate::domain::tenant::TenantContext;
use crate::errors::{ApplicationError, DomainError};
use crate::invoicing::{
    assemble_invoices, open_cycle, price_row, skipped_no_rate, IntakeSource, InvoiceStore,
    RowOutcome, WeeklyInvoiceRequest, WeeklyInvoiceRun,
};
use crate::pricing::RateResolver;
use crate::sync::KeyedLocks;

pub const ALREADY_GENERATED: &str =
    "Invoices already generated for this cycle and partyType. Use forceRegen=true to regenerate.";

/// Builds the weekly invoice set for one party type.
///
/// Runs for the same `(tenant, window, partyType)` are serialized, and the
/// replacement set is persisted in one store call so a rerun either fully
/// replaces the previous invoices or leaves them untouched.
pub struct InvoiceGenerator {
    rates: Arc<dyn RateResolver>,
    intake: Arc<dyn IntakeSource>,
    store: Arc<dyn InvoiceStore>,
    locks: KeyedLocks,
}

impl InvoiceGenerator {
    pub fn new(
        rates: Arc<dyn RateResolver>,
        intake: Arc<dyn IntakeSource>,
        store: Arc<dyn InvoiceStore>,
    ) -> Self {
        Self { rates, intake, store, locks: KeyedLocks::new() }
    }

    pub async fn generate_weekly(
        &self,
        ctx: &TenantContext,
        request: WeeklyInvoiceRequest,
    ) -> Result<WeeklyInvoiceRun, ApplicationError> {
        let lock_key = format!(
            "{}|{}|{}|{}",
            ctx.tenant(),
            request.window.start.timestamp_millis(),
            request.window.end.timestamp_millis(),
            request.party_type.as_str()
        );
        let _guard = self.locks.acquire(lock_key).await;

        let now = Utc::now();
        let cycle =
            self.store.find_or_create_cycle(ctx, open_cycle(ctx, request.window, now)).await?;

        let existing = self.store.count_invoices(ctx, &cycle.id, request.party_type).await?;
        if existing > 0 && !request.force_regen {
            return Err(DomainError::conflict(ALREADY_GENERATED).into());
        }

        let rows = self.intake.billable_intake(ctx, request.source_type, request.window).await?;
        let mut outcomes = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(party_ref) = row.source_ref_id.clone() else {
                continue;
            };
            let party = PartyKey::new(request.party_type, party_ref.clone());
            let outcome = match self
                .rates
                .resolve(ctx, &party, &row.feedstock_type_id, row.intake_date)
                .await?
            {
                Some(card) => RowOutcome::Priced { party_ref, line: price_row(row, &card) },
                None => {
                    debug!(
                        event_name = "billing.invoice.row_skipped",
                        tenant_id = %ctx.tenant(),
                        intake_entry_id = %row.id,
                        party_ref_id = %party_ref.as_str(),
                        "no rate card in force for intake row"
                    );
                    skipped_no_rate(row, party_ref)
                }
            };
            outcomes.push(outcome);
        }

        let (invoices, skipped) = assemble_invoices(ctx, &cycle, &request, outcomes, now);
        let cycle =
            self.store.replace_invoices(ctx, &cycle, request.party_type, &invoices).await?;

        info!(
            event_name = "billing.invoice.generated",
            tenant_id = %ctx.tenant(),
            cycle_code = %cycle.cycle_code,
            party_type = request.party_type.as_str(),
            replaced = existing,
            generated_count = invoices.len(),
            skipped_no_rate = skipped.len(),
            "weekly invoices generated"
        );

        Ok(WeeklyInvoiceRun {
            cycle,
            generated_count: invoices.len(),
            skipped_no_rate: skipped.len(),
            invoices,
            skipped,
        })
    }
}
