use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::party::{PartyKey, PartyRef, PartyType};
use crate::domain::rate_card::RateCard;
use crate::domain::tenant::TenantContext;
use crate::domain::values::{parse_date, parse_id};
use crate::errors::{ApplicationError, DomainError};

/// Effective-dated rate lookup. `Ok(None)` means no card applies, which is
/// never the same as a zero rate.
#[async_trait]
pub trait RateResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &TenantContext,
        party: &PartyKey,
        feedstock_type_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<RateCard>, ApplicationError>;
}

/// Picks the card in force at `as_of`: active, same party and feedstock,
/// `effective_from <= as_of`; greatest `effective_from` wins, then latest creation.
pub fn select_effective<'a, I>(
    cards: I,
    party: &PartyKey,
    feedstock_type_id: &str,
    as_of: DateTime<Utc>,
) -> Option<&'a RateCard>
where
    I: IntoIterator<Item = &'a RateCard>,
{
    cards
        .into_iter()
        .filter(|card| {
            card.is_active
                && card.party_type == party.party_type
                && card.party_id == party.party_ref
                && card.feedstock_type_id == feedstock_type_id
                && card.effective_from <= as_of
        })
        .max_by(|left, right| {
            left.effective_from
                .cmp(&right.effective_from)
                .then_with(|| left.created_at.cmp(&right.created_at))
        })
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRateQuery {
    pub party_type: Option<String>,
    pub party_id: Option<String>,
    pub feedstock_type_id: Option<String>,
    pub as_of: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveRateRequest {
    pub party: PartyKey,
    pub feedstock_type_id: String,
    pub as_of: DateTime<Utc>,
}

impl ResolveRateQuery {
    /// `asOf` defaults to `now` when absent.
    pub fn into_request(self, now: DateTime<Utc>) -> Result<ResolveRateRequest, DomainError> {
        let (Some(party_type), Some(party_id), Some(feedstock_type_id)) = (
            self.party_type.filter(|value| !value.trim().is_empty()),
            self.party_id.filter(|value| !value.trim().is_empty()),
            self.feedstock_type_id.filter(|value| !value.trim().is_empty()),
        ) else {
            return Err(DomainError::validation(
                "partyType, partyId and feedstockTypeId are required",
            ));
        };

        let party_type = party_type.parse::<PartyType>()?;
        let party = PartyKey::new(party_type, PartyRef::parse("partyId", &party_id)?);
        let feedstock_type_id = parse_id("feedstockTypeId", &feedstock_type_id)?;
        let as_of = match self.as_of.filter(|value| !value.trim().is_empty()) {
            Some(raw) => parse_date("asOf", &raw)?,
            None => now,
        };

        Ok(ResolveRateRequest { party, feedstock_type_id, as_of })
    }
}
