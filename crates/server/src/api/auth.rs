use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use feedstock_core::auth::bearer_token;
use feedstock_core::domain::tenant::{Role, TenantContext};
use feedstock_core::errors::ApplicationError;

use super::error::ApiError;
use super::AppState;

pub const WRITERS: &[Role] = &[Role::Admin, Role::Procurement];
pub const OPERATORS: &[Role] = &[Role::Admin, Role::Procurement, Role::Operations];

/// Verified caller. The tenant comes from the bearer token and nowhere else.
#[derive(Clone, Debug)]
pub struct Caller(pub TenantContext);

impl Caller {
    pub fn require(&self, allowed: &[Role]) -> Result<&TenantContext, ApiError> {
        self.0.require_any(allowed)?;
        Ok(&self.0)
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApplicationError::Unauthorized("Not authorized, no token".to_string()))?;
        let token = bearer_token(header)
            .ok_or_else(|| ApplicationError::Unauthorized("Not authorized, no token".to_string()))?;

        let claims = state.tokens.verify(token)?;
        Ok(Self(claims.into_context()))
    }
}
