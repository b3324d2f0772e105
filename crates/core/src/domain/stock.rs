use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codes::{reference_code, CodePrefix};
use crate::domain::intake::percent;
use crate::domain::party::SourceType;
use crate::domain::tenant::TenantContext;
use crate::domain::values::{new_id, parse_date, parse_id, parse_optional_id, trimmed};
use crate::errors::DomainError;

pub const RECEIPT_REF_TYPE: &str = "center-receipt";
pub const MANUAL_OUT_REF_TYPE: &str = "manual-out";
pub const MANUAL_ADJUSTMENT_REF_TYPE: &str = "manual-adjustment";

/// Inbound lot at a collection center. `available_qty_ton` only moves
/// through ledger postings and stays within `0..=gross_qty_ton`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterReceiptLot {
    pub id: String,
    pub tenant_id: String,
    pub receipt_lot_code: String,
    pub collection_center_id: String,
    pub source_type: SourceType,
    pub source_ref_id: Option<String>,
    pub feedstock_type_id: String,
    pub receipt_date: DateTime<Utc>,
    pub gross_qty_ton: Decimal,
    pub available_qty_ton: Decimal,
    pub quality_grade: Option<String>,
    pub moisture_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adjust,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Adjust => "ADJUST",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "ADJUST" => Ok(Self::Adjust),
            _ => Err(DomainError::validation("movementType must be one of IN, OUT, ADJUST")),
        }
    }
}

/// One immutable stock movement. `qty_ton` is signed: positive for IN.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub tenant_id: String,
    pub collection_center_id: String,
    pub center_receipt_lot_id: String,
    pub movement_type: MovementType,
    pub qty_ton: Decimal,
    pub balance_after_ton: Decimal,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLotInput {
    pub receipt_lot_code: Option<String>,
    pub collection_center_id: Option<String>,
    pub source_type: Option<String>,
    pub source_ref_id: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub receipt_date: Option<String>,
    pub gross_qty_ton: Option<Decimal>,
    pub quality_grade: Option<String>,
    pub moisture_percent: Option<Decimal>,
    pub notes: Option<String>,
}

fn required<T>(field: &str, value: Option<T>) -> Result<T, DomainError> {
    value.ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

fn required_text(field: &str, value: Option<String>) -> Result<String, DomainError> {
    required(field, value.filter(|value| !value.trim().is_empty()))
}

impl ReceiptLotInput {
    pub fn into_lot(
        self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
    ) -> Result<CenterReceiptLot, DomainError> {
        let collection_center_id = required_text("collectionCenterId", self.collection_center_id)?;
        let source_type = required_text("sourceType", self.source_type)?;
        let feedstock_type_id = required_text("feedstockTypeId", self.feedstock_type_id)?;
        let receipt_date = required_text("receiptDate", self.receipt_date)?;
        let gross = required("grossQtyTon", self.gross_qty_ton)?;

        let source_type = source_type.parse::<SourceType>()?;
        if source_type == SourceType::CollectionCenter {
            return Err(DomainError::validation(
                "sourceType must be one of farmer, own-farm, supplier",
            ));
        }
        if gross < Decimal::ZERO {
            return Err(DomainError::validation("grossQtyTon must be greater than or equal to 0"));
        }
        let receipt_date = parse_date("receiptDate", &receipt_date)?;

        let id = new_id();
        Ok(CenterReceiptLot {
            receipt_lot_code: trimmed(self.receipt_lot_code)
                .unwrap_or_else(|| reference_code(CodePrefix::ReceiptLot, receipt_date, &id)),
            id,
            tenant_id: ctx.tenant().to_string(),
            collection_center_id: parse_id("collectionCenterId", &collection_center_id)?,
            source_type,
            source_ref_id: trimmed(self.source_ref_id),
            feedstock_type_id: parse_id("feedstockTypeId", &feedstock_type_id)?,
            receipt_date,
            gross_qty_ton: gross,
            available_qty_ton: gross,
            quality_grade: trimmed(self.quality_grade),
            moisture_percent: percent("moisturePercent", self.moisture_percent)?,
            notes: trimmed(self.notes),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Body of an OUT or ADJUST posting.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementInput {
    pub center_receipt_lot_id: Option<String>,
    pub qty_ton: Option<Decimal>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovementRequest {
    pub lot_id: String,
    pub qty_ton: Decimal,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub remarks: Option<String>,
}

impl MovementInput {
    pub fn into_request(self) -> Result<MovementRequest, DomainError> {
        let (Some(lot_id), Some(qty_ton)) = (
            self.center_receipt_lot_id.filter(|value| !value.trim().is_empty()),
            self.qty_ton,
        ) else {
            return Err(DomainError::validation("centerReceiptLotId and qtyTon are required"));
        };

        Ok(MovementRequest {
            lot_id: parse_id("centerReceiptLotId", &lot_id)?,
            qty_ton,
            ref_type: trimmed(self.ref_type),
            ref_id: trimmed(self.ref_id),
            remarks: trimmed(self.remarks),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub collection_center_id: Option<String>,
    pub center_receipt_lot_id: Option<String>,
    pub movement_type: Option<MovementType>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    pub collection_center_id: Option<String>,
    pub center_receipt_lot_id: Option<String>,
    pub movement_type: Option<String>,
}

impl LedgerQuery {
    pub fn into_filter(self) -> Result<LedgerFilter, DomainError> {
        Ok(LedgerFilter {
            collection_center_id: parse_optional_id(
                "collectionCenterId",
                self.collection_center_id.as_deref(),
            )?,
            center_receipt_lot_id: parse_optional_id(
                "centerReceiptLotId",
                self.center_receipt_lot_id.as_deref(),
            )?,
            movement_type: self
                .movement_type
                .filter(|value| !value.is_empty())
                .map(|value| value.parse())
                .transpose()?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiptLotFilter {
    pub collection_center_id: Option<String>,
    pub feedstock_type_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLotQuery {
    pub collection_center_id: Option<String>,
    pub feedstock_type_id: Option<String>,
}

impl ReceiptLotQuery {
    pub fn into_filter(self) -> Result<ReceiptLotFilter, DomainError> {
        Ok(ReceiptLotFilter {
            collection_center_id: parse_optional_id(
                "collectionCenterId",
                self.collection_center_id.as_deref(),
            )?,
            feedstock_type_id: parse_optional_id(
                "feedstockTypeId",
                self.feedstock_type_id.as_deref(),
            )?,
        })
    }
}
