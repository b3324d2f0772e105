//! Weekly invoice generation from plant intake.
//!
//! Pricing a row and folding priced rows into per-party invoices are pure
//! functions here; [`generator::InvoiceGenerator`] wires them to the stores.

pub mod generator;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codes::{reference_code, CodePrefix};
use crate::domain::intake::PlantIntakeEntry;
use crate::domain::invoice::{
    CycleStatus, Invoice, InvoiceCycle, InvoiceLine, InvoiceStatus,
};
use crate::domain::party::{PartyRef, PartyType, SourceType};
use crate::domain::rate_card::RateCard;
use crate::domain::tenant::TenantContext;
use crate::domain::values::{
    new_id, parse_date, parse_end_date, round_amount, round_qty, round_rate, trimmed,
};
use crate::errors::{ApplicationError, DomainError};
use crate::pricing::evaluate_quality_adjustments;

pub use generator::InvoiceGenerator;

/// Inclusive billing window, compared as timestamps. A date-only end bound is
/// read as the last millisecond of that day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BillingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateWeeklyInput {
    pub week_start_date: Option<String>,
    pub week_end_date: Option<String>,
    pub party_type: Option<String>,
    pub force_regen: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeeklyInvoiceRequest {
    pub window: BillingWindow,
    pub party_type: PartyType,
    pub source_type: SourceType,
    pub force_regen: bool,
    pub notes: Option<String>,
}

impl GenerateWeeklyInput {
    pub fn into_request(self) -> Result<WeeklyInvoiceRequest, DomainError> {
        let (Some(start), Some(end)) = (
            self.week_start_date.filter(|value| !value.trim().is_empty()),
            self.week_end_date.filter(|value| !value.trim().is_empty()),
        ) else {
            return Err(DomainError::validation("weekStartDate and weekEndDate are required"));
        };

        let invalid = |_| DomainError::validation("weekStartDate and weekEndDate must be valid dates");
        let start = parse_date("weekStartDate", &start).map_err(invalid)?;
        let end = parse_end_date("weekEndDate", &end).map_err(invalid)?;
        if end < start {
            return Err(DomainError::validation(
                "weekEndDate must be greater than or equal to weekStartDate",
            ));
        }

        let party_type = match self.party_type.as_deref().map(str::trim) {
            None | Some("") => PartyType::Farmer,
            Some(raw) => raw.parse::<PartyType>().map_err(|_| invoiceable_party_error())?,
        };
        let source_type = party_type.invoice_source().ok_or_else(invoiceable_party_error)?;

        Ok(WeeklyInvoiceRequest {
            window: BillingWindow { start, end },
            party_type,
            source_type,
            force_regen: self.force_regen.unwrap_or(false),
            notes: trimmed(self.notes),
        })
    }
}

fn invoiceable_party_error() -> DomainError {
    DomainError::validation("partyType must be one of farmer, supplier, collection-center")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoRate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub intake_entry_id: String,
    pub intake_code: String,
    pub party_ref_id: PartyRef,
    pub feedstock_type_id: String,
    pub intake_date: DateTime<Utc>,
    pub reason: SkipReason,
}

/// What happened to one billable intake row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowOutcome {
    Priced { party_ref: PartyRef, line: InvoiceLine },
    SkippedNoRate(SkippedRow),
}

/// Prices one intake row with the card that was in force on its intake date.
pub fn price_row(row: &PlantIntakeEntry, card: &RateCard) -> InvoiceLine {
    let evaluation = evaluate_quality_adjustments(&card.quality_adjustments, &row.quality_metrics());
    let adjusted = round_rate(card.rate_per_ton + evaluation.total_adjustment_per_ton);
    let rate_per_ton = adjusted.max(Decimal::ZERO);
    let qty_ton = row.accepted_qty_ton;

    InvoiceLine {
        intake_entry_id: row.id.clone(),
        feedstock_type_id: row.feedstock_type_id.clone(),
        qty_ton,
        base_rate_per_ton: card.rate_per_ton,
        quality_adjustment_per_ton: evaluation.total_adjustment_per_ton,
        rate_per_ton,
        amount: round_amount(qty_ton * rate_per_ton),
        applied_quality_rules: evaluation.applied_rules,
    }
}

pub fn skipped_no_rate(row: &PlantIntakeEntry, party_ref: PartyRef) -> RowOutcome {
    RowOutcome::SkippedNoRate(SkippedRow {
        intake_entry_id: row.id.clone(),
        intake_code: row.intake_code.clone(),
        party_ref_id: party_ref,
        feedstock_type_id: row.feedstock_type_id.clone(),
        intake_date: row.intake_date,
        reason: SkipReason::NoRate,
    })
}

pub fn open_cycle(ctx: &TenantContext, window: BillingWindow, now: DateTime<Utc>) -> InvoiceCycle {
    let id = new_id();
    InvoiceCycle {
        cycle_code: reference_code(CodePrefix::InvoiceCycle, window.start, &id),
        id,
        tenant_id: ctx.tenant().to_string(),
        week_start_date: window.start,
        week_end_date: window.end,
        status: CycleStatus::Open,
        created_at: now,
        updated_at: now,
    }
}

/// Folds priced rows into one invoice per party, in order of first appearance.
/// Returns the invoices and the rows that could not be priced.
pub fn assemble_invoices(
    ctx: &TenantContext,
    cycle: &InvoiceCycle,
    request: &WeeklyInvoiceRequest,
    outcomes: Vec<RowOutcome>,
    now: DateTime<Utc>,
) -> (Vec<Invoice>, Vec<SkippedRow>) {
    let mut invoices: Vec<Invoice> = Vec::new();
    let mut index_by_party: HashMap<PartyRef, usize> = HashMap::new();
    let mut skipped = Vec::new();

    for outcome in outcomes {
        let (party_ref, line) = match outcome {
            RowOutcome::Priced { party_ref, line } => (party_ref, line),
            RowOutcome::SkippedNoRate(row) => {
                skipped.push(row);
                continue;
            }
        };

        let position = match index_by_party.get(&party_ref) {
            Some(position) => *position,
            None => {
                let id = new_id();
                invoices.push(Invoice {
                    invoice_no: reference_code(CodePrefix::Invoice, request.window.start, &id),
                    id,
                    tenant_id: ctx.tenant().to_string(),
                    cycle_id: cycle.id.clone(),
                    party_type: request.party_type,
                    party_ref_id: party_ref.clone(),
                    week_start_date: request.window.start,
                    week_end_date: request.window.end,
                    total_qty_ton: Decimal::ZERO,
                    total_amount: Decimal::ZERO,
                    lines: Vec::new(),
                    status: InvoiceStatus::Generated,
                    notes: request.notes.clone(),
                    created_at: now,
                });
                index_by_party.insert(party_ref, invoices.len() - 1);
                invoices.len() - 1
            }
        };

        let invoice = &mut invoices[position];
        invoice.total_qty_ton = round_qty(invoice.total_qty_ton + line.qty_ton);
        invoice.total_amount = round_amount(invoice.total_amount + line.amount);
        invoice.lines.push(line);
    }

    (invoices, skipped)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyInvoiceRun {
    pub cycle: InvoiceCycle,
    pub generated_count: usize,
    pub skipped_no_rate: usize,
    pub invoices: Vec<Invoice>,
    pub skipped: Vec<SkippedRow>,
}

/// Intake rows eligible for billing: matching source type, inside the window,
/// positive accepted quantity, a source reference, active; oldest first.
#[async_trait]
pub trait IntakeSource: Send + Sync {
    async fn billable_intake(
        &self,
        ctx: &TenantContext,
        source_type: SourceType,
        window: BillingWindow,
    ) -> Result<Vec<PlantIntakeEntry>, ApplicationError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Returns the cycle for the exact window, inserting `candidate` if none exists.
    async fn find_or_create_cycle(
        &self,
        ctx: &TenantContext,
        candidate: InvoiceCycle,
    ) -> Result<InvoiceCycle, ApplicationError>;

    async fn count_invoices(
        &self,
        ctx: &TenantContext,
        cycle_id: &str,
        party_type: PartyType,
    ) -> Result<u64, ApplicationError>;

    /// Atomically deletes the cycle's invoices for `party_type`, inserts
    /// `invoices`, and marks the cycle generated when `invoices` is non-empty.
    async fn replace_invoices(
        &self,
        ctx: &TenantContext,
        cycle: &InvoiceCycle,
        party_type: PartyType,
        invoices: &[Invoice],
    ) -> Result<InvoiceCycle, ApplicationError>;
}
