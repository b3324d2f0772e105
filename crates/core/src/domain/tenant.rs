use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operations,
    Procurement,
    Driver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operations => "operations",
            Self::Procurement => "procurement",
            Self::Driver => "driver",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "operations" => Ok(Self::Operations),
            "procurement" => Ok(Self::Procurement),
            "driver" => Ok(Self::Driver),
            other => Err(DomainError::validation(format!(
                "unsupported role `{other}` (expected admin|operations|procurement|driver)"
            ))),
        }
    }
}

/// Identity of the caller for one request. Every store call is scoped by it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub subject: String,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, subject: impl Into<String>, role: Role) -> Self {
        Self { tenant_id: TenantId(tenant_id.into()), subject: subject.into(), role }
    }

    pub fn tenant(&self) -> &str {
        self.tenant_id.as_str()
    }

    pub fn require_any(&self, allowed: &[Role]) -> Result<(), ApplicationError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        Err(ApplicationError::Forbidden(format!(
            "Forbidden: role `{}` cannot perform this action",
            self.role.as_str()
        )))
    }
}
