use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codes::{reference_code, CodePrefix};
use crate::domain::party::{PartyRef, SourceType};
use crate::domain::tenant::TenantContext;
use crate::domain::values::{new_id, parse_date, parse_id, parse_optional_id, trimmed};
use crate::errors::DomainError;

/// Weighbridge and quality outcome for one load at the plant gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantIntakeEntry {
    pub id: String,
    pub tenant_id: String,
    pub intake_code: String,
    pub dispatch_trip_id: Option<String>,
    pub feedstock_type_id: String,
    pub source_type: SourceType,
    pub source_ref_id: Option<PartyRef>,
    pub gross_weight_ton: Decimal,
    pub tare_weight_ton: Decimal,
    pub net_weight_ton: Decimal,
    pub moisture_percent: Option<Decimal>,
    pub contamination_percent: Option<Decimal>,
    pub quality_grade: Option<String>,
    pub accepted_qty_ton: Decimal,
    pub rejected_qty_ton: Decimal,
    pub rejection_reason: Option<String>,
    pub intake_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlantIntakeEntry {
    /// Numeric fields addressable by quality rules, keyed by their wire names.
    /// Optional measurements that were not taken are left out.
    pub fn quality_metrics(&self) -> BTreeMap<String, Decimal> {
        let mut metrics = BTreeMap::new();
        metrics.insert("grossWeightTon".to_string(), self.gross_weight_ton);
        metrics.insert("tareWeightTon".to_string(), self.tare_weight_ton);
        metrics.insert("netWeightTon".to_string(), self.net_weight_ton);
        metrics.insert("acceptedQtyTon".to_string(), self.accepted_qty_ton);
        metrics.insert("rejectedQtyTon".to_string(), self.rejected_qty_ton);
        if let Some(moisture) = self.moisture_percent {
            metrics.insert("moisturePercent".to_string(), moisture);
        }
        if let Some(contamination) = self.contamination_percent {
            metrics.insert("contaminationPercent".to_string(), contamination);
        }
        metrics
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeEntryInput {
    pub intake_code: Option<String>,
    pub dispatch_trip_id: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub source_type: Option<String>,
    pub source_ref_id: Option<String>,
    pub gross_weight_ton: Option<Decimal>,
    pub tare_weight_ton: Option<Decimal>,
    pub net_weight_ton: Option<Decimal>,
    pub moisture_percent: Option<Decimal>,
    pub contamination_percent: Option<Decimal>,
    pub quality_grade: Option<String>,
    pub accepted_qty_ton: Option<Decimal>,
    pub rejected_qty_ton: Option<Decimal>,
    pub rejection_reason: Option<String>,
    pub intake_date: Option<String>,
    pub notes: Option<String>,
}

fn non_negative(field: &str, value: Decimal) -> Result<Decimal, DomainError> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} must be greater than or equal to 0")));
    }
    Ok(value)
}

pub(crate) fn percent(field: &str, value: Option<Decimal>) -> Result<Option<Decimal>, DomainError> {
    match value {
        Some(value) if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED => {
            Err(DomainError::validation(format!("{field} must be between 0 and 100")))
        }
        other => Ok(other),
    }
}

impl IntakeEntryInput {
    pub fn into_entry(
        self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
    ) -> Result<PlantIntakeEntry, DomainError> {
        let (Some(feedstock_type_id), Some(source_type), Some(gross), Some(tare), Some(intake_date)) = (
            self.feedstock_type_id.filter(|value| !value.trim().is_empty()),
            self.source_type.filter(|value| !value.trim().is_empty()),
            self.gross_weight_ton,
            self.tare_weight_ton,
            self.intake_date.filter(|value| !value.trim().is_empty()),
        ) else {
            return Err(DomainError::validation(
                "feedstockTypeId, sourceType, grossWeightTon, tareWeightTon and intakeDate are required",
            ));
        };

        let feedstock_type_id = parse_id("feedstockTypeId", &feedstock_type_id)?;
        let dispatch_trip_id = parse_optional_id("dispatchTripId", self.dispatch_trip_id.as_deref())?;
        let source_type = source_type.parse::<SourceType>()?;
        let gross = non_negative("grossWeightTon", gross)?;
        let tare = non_negative("tareWeightTon", tare)?;
        if gross < tare {
            return Err(DomainError::validation("grossWeightTon cannot be less than tareWeightTon"));
        }

        let net = match self.net_weight_ton {
            Some(net) => non_negative("netWeightTon", net)?,
            None => (gross - tare).max(Decimal::ZERO),
        };
        let (accepted, rejected) = match (self.accepted_qty_ton, self.rejected_qty_ton) {
            (None, None) => (net, Decimal::ZERO),
            (Some(accepted), None) => (accepted, (net - accepted).max(Decimal::ZERO)),
            (None, Some(rejected)) => ((net - rejected).max(Decimal::ZERO), rejected),
            (Some(accepted), Some(rejected)) => (accepted, rejected),
        };
        let accepted = non_negative("acceptedQtyTon", accepted)?;
        let rejected = non_negative("rejectedQtyTon", rejected)?;

        let intake_date = parse_date("intakeDate", &intake_date)?;
        let source_ref_id = trimmed(self.source_ref_id)
            .map(|value| PartyRef::parse("sourceRefId", &value))
            .transpose()?;

        let id = new_id();
        Ok(PlantIntakeEntry {
            intake_code: trimmed(self.intake_code)
                .unwrap_or_else(|| reference_code(CodePrefix::Intake, intake_date, &id)),
            id,
            tenant_id: ctx.tenant().to_string(),
            dispatch_trip_id,
            feedstock_type_id,
            source_type,
            source_ref_id,
            gross_weight_ton: gross,
            tare_weight_ton: tare,
            net_weight_ton: net,
            moisture_percent: percent("moisturePercent", self.moisture_percent)?,
            contamination_percent: percent("contaminationPercent", self.contamination_percent)?,
            quality_grade: trimmed(self.quality_grade),
            accepted_qty_ton: accepted,
            rejected_qty_ton: rejected,
            rejection_reason: trimmed(self.rejection_reason),
            intake_date,
            notes: trimmed(self.notes),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntakeFilter {
    pub source_type: Option<SourceType>,
    pub feedstock_type_id: Option<String>,
    pub dispatch_trip_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeQuery {
    pub source_type: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub dispatch_trip_id: Option<String>,
}

impl IntakeQuery {
    pub fn into_filter(self) -> Result<IntakeFilter, DomainError> {
        Ok(IntakeFilter {
            source_type: self
                .source_type
                .filter(|value| !value.is_empty())
                .map(|value| value.parse())
                .transpose()?,
            feedstock_type_id: parse_optional_id(
                "feedstockTypeId",
                self.feedstock_type_id.as_deref(),
            )?,
            dispatch_trip_id: parse_optional_id("dispatchTripId", self.dispatch_trip_id.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::IntakeEntryInput;
    use crate::domain::party::SourceType;
    use crate::domain::tenant::{Role, TenantContext};

    fn ctx() -> TenantContext {
        TenantContext::new("tenant-a", "user-1", Role::Operations)
    }

    fn weighed(gross: i64, tare: i64) -> IntakeEntryInput {
        IntakeEntryInput {
            feedstock_type_id: Some("8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f".to_string()),
            source_type: Some("farmer".to_string()),
            source_ref_id: Some(" farmer-1 ".to_string()),
            gross_weight_ton: Some(Decimal::new(gross, 1)),
            tare_weight_ton: Some(Decimal::new(tare, 1)),
            intake_date: Some("2026-02-24".to_string()),
            ..IntakeEntryInput::default()
        }
    }

    #[test]
    fn net_and_accepted_default_from_weights() {
        let entry = weighed(120, 35).into_entry(&ctx(), Utc::now()).expect("valid");

        assert_eq!(entry.net_weight_ton, Decimal::new(85, 1));
        assert_eq!(entry.accepted_qty_ton, Decimal::new(85, 1));
        assert_eq!(entry.rejected_qty_ton, Decimal::ZERO);
        assert_eq!(entry.source_type, SourceType::Farmer);
        assert_eq!(entry.source_ref_id.as_ref().map(|r| r.as_str()), Some("farmer-1"));
        assert!(entry.intake_code.starts_with("PIE-20260224-"));
    }

    #[test]
    fn one_sided_acceptance_fills_the_other_side() {
        let input = IntakeEntryInput { rejected_qty_ton: Some(Decimal::new(5, 1)), ..weighed(120, 35) };
        let entry = input.into_entry(&ctx(), Utc::now()).expect("valid");

        assert_eq!(entry.accepted_qty_ton, Decimal::new(80, 1));
        assert_eq!(entry.rejected_qty_ton, Decimal::new(5, 1));
    }

    #[test]
    fn gross_below_tare_is_rejected() {
        let error = weighed(30, 35).into_entry(&ctx(), Utc::now()).expect_err("invalid weights");
        assert_eq!(error.to_string(), "grossWeightTon cannot be less than tareWeightTon");
    }

    #[test]
    fn quality_metrics_omit_unmeasured_fields() {
        let input = IntakeEntryInput { moisture_percent: Some(Decimal::new(22, 0)), ..weighed(120, 35) };
        let entry = input.into_entry(&ctx(), Utc::now()).expect("valid");
        let metrics = entry.quality_metrics();

        assert_eq!(metrics.get("moisturePercent"), Some(&Decimal::new(22, 0)));
        assert!(!metrics.contains_key("contaminationPercent"));
        assert_eq!(metrics.get("acceptedQtyTon"), Some(&Decimal::new(85, 1)));
    }

    #[test]
    fn moisture_outside_percent_range_is_rejected() {
        let input =
            IntakeEntryInput { moisture_percent: Some(Decimal::new(101, 0)), ..weighed(120, 35) };
        assert!(input.into_entry(&ctx(), Utc::now()).is_err());
    }
}
