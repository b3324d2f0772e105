use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Counterparty category a rate card or invoice is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartyType {
    Farmer,
    CollectionCenter,
    LandLease,
    Supplier,
}

impl PartyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::CollectionCenter => "collection-center",
            Self::LandLease => "land-lease",
            Self::Supplier => "supplier",
        }
    }

    /// Intake source whose rows are billed to this party type, if it is invoiceable.
    pub fn invoice_source(self) -> Option<SourceType> {
        match self {
            Self::Farmer => Some(SourceType::Farmer),
            Self::Supplier => Some(SourceType::Supplier),
            Self::CollectionCenter => Some(SourceType::CollectionCenter),
            Self::LandLease => None,
        }
    }
}

impl fmt::Display for PartyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "farmer" => Ok(Self::Farmer),
            "collection-center" => Ok(Self::CollectionCenter),
            "land-lease" => Ok(Self::LandLease),
            "supplier" => Ok(Self::Supplier),
            _ => Err(DomainError::validation(
                "partyType must be one of farmer, collection-center, land-lease, supplier",
            )),
        }
    }
}

/// Where a receipt or intake physically came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    Farmer,
    CollectionCenter,
    OwnFarm,
    Supplier,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::CollectionCenter => "collection-center",
            Self::OwnFarm => "own-farm",
            Self::Supplier => "supplier",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "farmer" => Ok(Self::Farmer),
            "collection-center" => Ok(Self::CollectionCenter),
            "own-farm" => Ok(Self::OwnFarm),
            "supplier" => Ok(Self::Supplier),
            _ => Err(DomainError::validation(
                "sourceType must be one of farmer, collection-center, own-farm, supplier",
            )),
        }
    }
}

/// Normalized counterparty reference. Always trimmed and non-empty, so the
/// value used to store a rate card is byte-identical to the one used to look it up.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyRef(String);

impl PartyRef {
    pub fn parse(field: &str, raw: &str) -> Result<Self, DomainError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation(format!("{field} is required")));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartyKey {
    pub party_type: PartyType,
    pub party_ref: PartyRef,
}

impl PartyKey {
    pub fn new(party_type: PartyType, party_ref: PartyRef) -> Self {
        Self { party_type, party_ref }
    }
}

#[cfg(test)]
mod tests {
    use super::{PartyRef, PartyType, SourceType};

    #[test]
    fn party_ref_is_trimmed_and_rejects_blank() {
        let party = PartyRef::parse("partyId", "  farmer-17 ").expect("valid ref");
        assert_eq!(party.as_str(), "farmer-17");
        assert!(PartyRef::parse("partyId", "   ").is_err());
    }

    #[test]
    fn only_three_party_types_map_to_an_intake_source() {
        assert_eq!(PartyType::Farmer.invoice_source(), Some(SourceType::Farmer));
        assert_eq!(
            PartyType::CollectionCenter.invoice_source(),
            Some(SourceType::CollectionCenter)
        );
        assert_eq!(PartyType::Supplier.invoice_source(), Some(SourceType::Supplier));
        assert_eq!(PartyType::LandLease.invoice_source(), None);
    }

    #[test]
    fn kebab_case_names_round_trip_through_from_str() {
        for party_type in [
            PartyType::Farmer,
            PartyType::CollectionCenter,
            PartyType::LandLease,
            PartyType::Supplier,
        ] {
            assert_eq!(party_type.as_str().parse::<PartyType>().expect("parse"), party_type);
        }
        assert!("own-farm".parse::<PartyType>().is_err());
        assert_eq!("own-farm".parse::<SourceType>().expect("parse"), SourceType::OwnFarm);
    }
}
