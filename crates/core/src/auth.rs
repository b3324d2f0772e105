//! Bearer token issuing and verification (HS256).
//!
//! Tokens carry the tenant boundary and the caller's role; the server turns a
//! verified token into a [`TenantContext`] and never reads the tenant from
//! anywhere else.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, MIN_JWT_SECRET_LEN};
use crate::domain::tenant::{Role, TenantContext};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub tenant_id: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn into_context(self) -> TenantContext {
        TenantContext::new(self.tenant_id, self.sub, self.role)
    }
}

#[derive(Clone)]
pub struct TokenService {
    secret: SecretString,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").field("ttl_secs", &self.ttl_secs).finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: SecretString, ttl_secs: u64) -> Result<Self, ApplicationError> {
        if secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(ApplicationError::Configuration(format!(
                "jwt secret must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        Ok(Self { secret, ttl_secs })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ApplicationError> {
        Self::new(config.jwt_secret.clone(), config.token_ttl_secs)
    }

    pub fn issue(
        &self,
        tenant_id: &str,
        subject: &str,
        role: Role,
    ) -> Result<String, ApplicationError> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(ApplicationError::Configuration("tenant id is required".to_string()));
        }

        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject.to_string(),
            tenant_id: tenant_id.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|error| ApplicationError::Configuration(format!("failed to sign token: {error}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApplicationError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::default(),
        )
        .map_err(|error| {
            let message = match error.kind() {
                ErrorKind::ExpiredSignature => "Not authorized, token expired",
                ErrorKind::InvalidSignature => "Not authorized, invalid signature",
                _ => "Not authorized, token failed",
            };
            ApplicationError::Unauthorized(message.to_string())
        })?;

        if decoded.claims.tenant_id.trim().is_empty() {
            return Err(ApplicationError::Unauthorized("Tenant context missing".to_string()));
        }
        Ok(decoded.claims)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ").map(str::trim).filter(|token| !token.is_empty())
}
