use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::party::{PartyRef, PartyType};
use crate::domain::rate_card::RuleOperator;
use crate::domain::values::parse_optional_id;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Open,
    Generated,
    Closed,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Generated => "generated",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for CycleStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "generated" => Ok(Self::Generated),
            "closed" => Ok(Self::Closed),
            other => Err(DomainError::validation(format!("unknown cycle status `{other}`"))),
        }
    }
}

/// Billing window. One per exact `(tenant, weekStartDate, weekEndDate)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCycle {
    pub id: String,
    pub tenant_id: String,
    pub cycle_code: String,
    pub week_start_date: DateTime<Utc>,
    pub week_end_date: DateTime<Utc>,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Generated,
    Finalized,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Finalized => "finalized",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "generated" => Ok(Self::Generated),
            "finalized" => Ok(Self::Finalized),
            other => Err(DomainError::validation(format!("unknown invoice status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedQualityRule {
    pub metric: String,
    pub operator: RuleOperator,
    pub threshold_value: Decimal,
    pub intake_metric_value: Decimal,
    pub adjustment_per_ton: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub intake_entry_id: String,
    pub feedstock_type_id: String,
    pub qty_ton: Decimal,
    pub base_rate_per_ton: Decimal,
    pub quality_adjustment_per_ton: Decimal,
    pub rate_per_ton: Decimal,
    pub amount: Decimal,
    pub applied_quality_rules: Vec<AppliedQualityRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub tenant_id: String,
    pub invoice_no: String,
    pub cycle_id: String,
    pub party_type: PartyType,
    pub party_ref_id: PartyRef,
    pub week_start_date: DateTime<Utc>,
    pub week_end_date: DateTime<Utc>,
    pub total_qty_ton: Decimal,
    pub total_amount: Decimal,
    pub lines: Vec<InvoiceLine>,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub cycle_id: Option<String>,
    pub party_type: Option<PartyType>,
    pub party_ref_id: Option<PartyRef>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceQuery {
    pub cycle_id: Option<String>,
    pub party_type: Option<String>,
    pub party_ref_id: Option<String>,
}

impl InvoiceQuery {
    pub fn into_filter(self) -> Result<InvoiceFilter, DomainError> {
        Ok(InvoiceFilter {
            cycle_id: parse_optional_id("cycleId", self.cycle_id.as_deref())?,
            party_type: self
                .party_type
                .filter(|value| !value.is_empty())
                .map(|value| value.parse())
                .transpose()?,
            party_ref_id: self
                .party_ref_id
                .filter(|value| !value.trim().is_empty())
                .map(|value| PartyRef::parse("partyRefId", &value))
                .transpose()?,
        })
    }
}
