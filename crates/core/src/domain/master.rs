//! Simple tenant-scoped reference data (farmers, centers, vehicles, ...).
//!
//! These entities carry no billing or stock logic, so they share one record
//! shape: a per-kind natural key plus a JSON payload.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codes::{reference_code, CodePrefix};
use crate::domain::tenant::Role;
use crate::domain::values::{new_id, parse_date, parse_id};
use crate::errors::DomainError;

const RESERVED_FIELDS: [&str; 6] = ["id", "tenantId", "kind", "isActive", "createdAt", "updatedAt"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasterKind {
    FeedstockTypes,
    Farmers,
    CollectionCenters,
    Vehicles,
    LandParcels,
    CropPlans,
    HarvestBatches,
    DispatchTrips,
}

/// A field filled from a reference code when the caller omits it.
struct GeneratedField {
    field: &'static str,
    prefix: CodePrefix,
    date_field: &'static str,
}

impl MasterKind {
    pub const ALL: [MasterKind; 8] = [
        Self::FeedstockTypes,
        Self::Farmers,
        Self::CollectionCenters,
        Self::Vehicles,
        Self::LandParcels,
        Self::CropPlans,
        Self::HarvestBatches,
        Self::DispatchTrips,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeedstockTypes => "feedstock-types",
            Self::Farmers => "farmers",
            Self::CollectionCenters => "collection-centers",
            Self::Vehicles => "vehicles",
            Self::LandParcels => "land-parcels",
            Self::CropPlans => "crop-plans",
            Self::HarvestBatches => "harvest-batches",
            Self::DispatchTrips => "dispatch-trips",
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::FeedstockTypes | Self::Farmers | Self::CollectionCenters => &["code", "name"],
            Self::Vehicles => &["number"],
            Self::LandParcels => &["parcelCode", "areaAcres"],
            Self::CropPlans => &[
                "planCode",
                "landParcelId",
                "feedstockTypeId",
                "sowingDate",
                "expectedHarvestDate",
                "expectedYieldTon",
            ],
            Self::HarvestBatches => &["landParcelId", "feedstockTypeId", "harvestDate", "grossQtyTon"],
            Self::DispatchTrips => &["sourceType"],
        }
    }

    /// Natural key, unique per tenant and kind.
    pub fn code_field(self) -> &'static str {
        match self {
            Self::FeedstockTypes | Self::Farmers | Self::CollectionCenters => "code",
            Self::Vehicles => "number",
            Self::LandParcels => "parcelCode",
            Self::CropPlans => "planCode",
            Self::HarvestBatches => "batchCode",
            Self::DispatchTrips => "tripCode",
        }
    }

    fn reference_fields(self) -> &'static [&'static str] {
        match self {
            Self::CropPlans | Self::HarvestBatches => &["landParcelId", "feedstockTypeId"],
            Self::DispatchTrips => &["collectionCenterId", "landParcelId", "vehicleId"],
            _ => &[],
        }
    }

    fn date_fields(self) -> &'static [&'static str] {
        match self {
            Self::LandParcels => &["leaseStartDate", "leaseEndDate"],
            Self::CropPlans => &["sowingDate", "expectedHarvestDate"],
            Self::HarvestBatches => &["harvestDate"],
            Self::DispatchTrips => &["dispatchDate", "arrivalDate"],
            _ => &[],
        }
    }

    fn generated_fields(self) -> &'static [GeneratedField] {
        match self {
            Self::HarvestBatches => &[
                GeneratedField {
                    field: "batchCode",
                    prefix: CodePrefix::HarvestBatch,
                    date_field: "harvestDate",
                },
                GeneratedField {
                    field: "lotNo",
                    prefix: CodePrefix::HarvestLot,
                    date_field: "harvestDate",
                },
            ],
            Self::DispatchTrips => &[GeneratedField {
                field: "tripCode",
                prefix: CodePrefix::DispatchTrip,
                date_field: "dispatchDate",
            }],
            _ => &[],
        }
    }

    fn defaults(self) -> Vec<(&'static str, Value)> {
        match self {
            Self::DispatchTrips => vec![
                ("status", Value::from("planned")),
                ("destinationPlantName", Value::from("Main Plant")),
                ("plannedLots", Value::Array(Vec::new())),
            ],
            _ => Vec::new(),
        }
    }

    fn allowed_values(self, field: &str) -> Option<&'static [&'static str]> {
        match (self, field) {
            (Self::DispatchTrips, "sourceType") => Some(&["collection-center", "own-farm", "mixed"]),
            (Self::DispatchTrips, "status") => Some(&[
                "planned",
                "dispatched",
                "in_transit",
                "arrived",
                "closed",
                "cancelled",
            ]),
            _ => None,
        }
    }

    /// Roles allowed to create, patch and deactivate records of this kind.
    pub fn writer_roles(self) -> &'static [Role] {
        match self {
            Self::DispatchTrips => &[Role::Admin, Role::Procurement, Role::Operations],
            _ => &[Role::Admin, Role::Procurement],
        }
    }
}

impl FromStr for MasterKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| DomainError::not_found(format!("unknown master collection `{value}`")))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterRecord {
    pub id: String,
    pub tenant_id: String,
    #[serde(skip)]
    pub kind: MasterKind,
    #[serde(skip)]
    pub code: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

fn strip_reserved(payload: &mut Map<String, Value>) {
    for field in RESERVED_FIELDS {
        payload.remove(field);
    }
}

/// Trims strings, canonicalizes ids, checks enum-like and date fields.
fn normalize_fields(kind: MasterKind, payload: &mut Map<String, Value>) -> Result<(), DomainError> {
    for value in payload.values_mut() {
        if let Value::String(text) = value {
            let trimmed = text.trim();
            if trimmed.len() != text.len() {
                *text = trimmed.to_string();
            }
        }
    }

    for field in kind.reference_fields() {
        let raw = match payload.get(*field) {
            Some(Value::String(raw)) => raw.clone(),
            _ => continue,
        };
        if raw.is_empty() {
            payload.remove(*field);
            continue;
        }
        let canonical = parse_id(field, &raw)?;
        payload.insert((*field).to_string(), Value::String(canonical));
    }

    for field in kind.date_fields() {
        if let Some(Value::String(raw)) = payload.get(*field) {
            parse_date(field, raw)?;
        }
    }

    for (field, value) in payload.iter() {
        if let (Some(allowed), Value::String(text)) = (kind.allowed_values(field), value) {
            if !allowed.contains(&text.as_str()) {
                return Err(DomainError::validation(format!(
                    "{field} must be one of {}",
                    allowed.join(", ")
                )));
            }
        }
    }

    Ok(())
}

fn code_of(kind: MasterKind, payload: &Map<String, Value>) -> Option<String> {
    match payload.get(kind.code_field()) {
        Some(Value::String(code)) if !code.is_empty() => Some(code.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

impl MasterRecord {
    pub fn create(
        kind: MasterKind,
        tenant_id: &str,
        mut payload: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        strip_reserved(&mut payload);

        for field in kind.required_fields() {
            if is_blank(payload.get(*field)) {
                return Err(DomainError::validation(format!("{field} is required")));
            }
        }

        normalize_fields(kind, &mut payload)?;

        let id = new_id();
        for generated in kind.generated_fields() {
            if is_blank(payload.get(generated.field)) {
                let date = match payload.get(generated.date_field) {
                    Some(Value::String(raw)) => parse_date(generated.date_field, raw)?,
                    _ => now,
                };
                payload.insert(
                    generated.field.to_string(),
                    Value::String(reference_code(generated.prefix, date, &id)),
                );
            }
        }

        for (field, value) in kind.defaults() {
            if is_blank(payload.get(field)) {
                payload.insert(field.to_string(), value);
            }
        }

        Ok(Self {
            id,
            tenant_id: tenant_id.to_string(),
            kind,
            code: code_of(kind, &payload),
            payload,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges a partial update. `isActive` may be toggled, other reserved keys are ignored.
    pub fn apply_patch(
        &mut self,
        mut patch: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let kind = self.kind;
        let is_active = patch.get("isActive").and_then(Value::as_bool);
        strip_reserved(&mut patch);
        normalize_fields(kind, &mut patch)?;

        for field in kind.required_fields() {
            if patch.contains_key(*field) && is_blank(patch.get(*field)) {
                return Err(DomainError::validation(format!("{field} cannot be empty")));
            }
        }

        for (field, value) in patch {
            self.payload.insert(field, value);
        }
        if let Some(is_active) = is_active {
            self.is_active = is_active;
        }
        self.code = code_of(kind, &self.payload);
        self.updated_at = now;
        Ok(())
    }
}
