use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::party::{PartyKey, PartyRef, PartyType};
use crate::domain::values::{parse_date, parse_id};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl RuleOperator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "eq" => Some(Self::Eq),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Eq => "eq",
        }
    }

    /// `observed <op> threshold`
    pub fn holds(self, observed: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Lt => observed < threshold,
            Self::Lte => observed <= threshold,
            Self::Gt => observed > threshold,
            Self::Gte => observed >= threshold,
            Self::Eq => observed == threshold,
        }
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conditional per-ton adjustment attached to a rate card.
///
/// The operator is kept as stored text: rows written before an operator was
/// retired still load, and the evaluator skips what it does not understand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRule {
    pub metric: String,
    pub operator: String,
    pub value: Decimal,
    pub adjustment_per_ton: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCard {
    pub id: String,
    pub tenant_id: String,
    pub party_type: PartyType,
    pub party_id: PartyRef,
    pub feedstock_type_id: String,
    pub effective_from: DateTime<Utc>,
    pub rate_per_ton: Decimal,
    pub quality_adjustments: Vec<QualityRule>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateCard {
    pub fn party_key(&self) -> PartyKey {
        PartyKey::new(self.party_type, self.party_id.clone())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRuleInput {
    pub metric: Option<String>,
    pub operator: Option<String>,
    pub value: Option<Decimal>,
    pub adjustment_per_ton: Option<Decimal>,
}

impl QualityRuleInput {
    fn validate(self, index: usize) -> Result<QualityRule, DomainError> {
        let metric = self.metric.map(|value| value.trim().to_string()).unwrap_or_default();
        if metric.is_empty() {
            return Err(DomainError::validation(format!(
                "qualityAdjustments[{index}].metric is required"
            )));
        }
        let operator = self.operator.unwrap_or_default();
        let operator = RuleOperator::parse(&operator).ok_or_else(|| {
            DomainError::validation(format!(
                "qualityAdjustments[{index}].operator must be one of lt, lte, gt, gte, eq"
            ))
        })?;
        let value = self.value.ok_or_else(|| {
            DomainError::validation(format!("qualityAdjustments[{index}].value is required"))
        })?;
        let adjustment_per_ton = self.adjustment_per_ton.ok_or_else(|| {
            DomainError::validation(format!(
                "qualityAdjustments[{index}].adjustmentPerTon is required"
            ))
        })?;

        Ok(QualityRule { metric, operator: operator.as_str().to_string(), value, adjustment_per_ton })
    }
}

fn validate_rules(rules: Vec<QualityRuleInput>) -> Result<Vec<QualityRule>, DomainError> {
    rules.into_iter().enumerate().map(|(index, rule)| rule.validate(index)).collect()
}

fn validate_rate(rate: Decimal) -> Result<Decimal, DomainError> {
    if rate < Decimal::ZERO {
        return Err(DomainError::validation("ratePerTon must be greater than or equal to 0"));
    }
    Ok(rate)
}

/// Raw request body for creating or patching a rate card.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCardInput {
    pub party_type: Option<String>,
    pub party_id: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub effective_from: Option<String>,
    pub rate_per_ton: Option<Decimal>,
    pub quality_adjustments: Option<Vec<QualityRuleInput>>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRateCard {
    pub party: PartyKey,
    pub feedstock_type_id: String,
    pub effective_from: DateTime<Utc>,
    pub rate_per_ton: Decimal,
    pub quality_adjustments: Vec<QualityRule>,
}

impl RateCardInput {
    pub fn into_new(self) -> Result<NewRateCard, DomainError> {
        let (Some(party_type), Some(party_id), Some(feedstock_type_id), Some(effective_from), Some(rate)) = (
            self.party_type.filter(|value| !value.trim().is_empty()),
            self.party_id.filter(|value| !value.trim().is_empty()),
            self.feedstock_type_id.filter(|value| !value.trim().is_empty()),
            self.effective_from.filter(|value| !value.trim().is_empty()),
            self.rate_per_ton,
        ) else {
            return Err(DomainError::validation(
                "partyType, partyId, feedstockTypeId, effectiveFrom and ratePerTon are required",
            ));
        };

        let party_type = party_type.parse::<PartyType>()?;
        let party_ref = PartyRef::parse("partyId", &party_id)?;

        Ok(NewRateCard {
            party: PartyKey::new(party_type, party_ref),
            feedstock_type_id: parse_id("feedstockTypeId", &feedstock_type_id)?,
            effective_from: parse_date("effectiveFrom", &effective_from)?,
            rate_per_ton: validate_rate(rate)?,
            quality_adjustments: validate_rules(self.quality_adjustments.unwrap_or_default())?,
        })
    }

    /// Applies the present fields onto an existing card, validating each one.
    pub fn apply_to(self, card: &mut RateCard) -> Result<(), DomainError> {
        if let Some(party_type) = self.party_type {
            card.party_type = party_type.parse()?;
        }
        if let Some(party_id) = self.party_id {
            card.party_id = PartyRef::parse("partyId", &party_id)?;
        }
        if let Some(feedstock_type_id) = self.feedstock_type_id {
            card.feedstock_type_id = parse_id("feedstockTypeId", &feedstock_type_id)?;
        }
        if let Some(effective_from) = self.effective_from {
            card.effective_from = parse_date("effectiveFrom", &effective_from)?;
        }
        if let Some(rate) = self.rate_per_ton {
            card.rate_per_ton = validate_rate(rate)?;
        }
        if let Some(rules) = self.quality_adjustments {
            card.quality_adjustments = validate_rules(rules)?;
        }
        if let Some(is_active) = self.is_active {
            card.is_active = is_active;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateCardFilter {
    pub party_type: Option<PartyType>,
    pub party_id: Option<PartyRef>,
    pub feedstock_type_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateCardQuery {
    pub party_type: Option<String>,
    pub party_id: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub is_active: Option<String>,
}

impl RateCardQuery {
    pub fn into_filter(self) -> Result<RateCardFilter, DomainError> {
        Ok(RateCardFilter {
            party_type: self
                .party_type
                .filter(|value| !value.is_empty())
                .map(|value| value.parse())
                .transpose()?,
            party_id: self
                .party_id
                .filter(|value| !value.trim().is_empty())
                .map(|value| PartyRef::parse("partyId", &value))
                .transpose()?,
            feedstock_type_id: self
                .feedstock_type_id
                .filter(|value| !value.is_empty())
                .map(|value| parse_id("feedstockTypeId", &value))
                .transpose()?,
            is_active: self.is_active.filter(|value| !value.is_empty()).map(|value| value == "true"),
        })
    }
}
