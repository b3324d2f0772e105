use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use feedstock_core::errors::{ApplicationError, DomainError, InterfaceError};
use feedstock_db::repositories::RepositoryError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// HTTP projection of a failed request. The body is always `{"message": ...}`.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApplicationError::from(DomainError::validation(message)).into()
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        match &value {
            ApplicationError::Persistence(detail) | ApplicationError::Configuration(detail) => {
                error!(
                    event_name = "api.request.internal_failure",
                    correlation_id = %correlation_id,
                    error = %detail,
                    "request failed inside the service"
                );
            }
            ApplicationError::Unauthorized(reason) => {
                warn!(
                    event_name = "api.request.unauthorized",
                    correlation_id = %correlation_id,
                    reason = %reason,
                    "rejected unauthenticated request"
                );
            }
            _ => {}
        }
        Self(value.into_interface(correlation_id))
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        ApplicationError::from(value).into()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::from(value).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid JSON body: {}", value.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query string: {}", value.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody { message: self.0.message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use feedstock_core::errors::{ApplicationError, DomainError};

    use super::ApiError;

    #[test]
    fn domain_errors_map_to_their_status_codes() {
        let cases = [
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("missing"), StatusCode::NOT_FOUND),
            (DomainError::conflict("again"), StatusCode::CONFLICT),
            (DomainError::InsufficientQuantity("short".to_string()), StatusCode::BAD_REQUEST),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn persistence_details_stay_out_of_the_message() {
        let error = ApiError::from(ApplicationError::Persistence("disk I/O error".to_string()));

        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!error.0.message.contains("disk"));
    }

    #[test]
    fn auth_failures_are_401_and_403() {
        assert_eq!(
            ApiError::from(ApplicationError::Unauthorized("no token".to_string())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(ApplicationError::Forbidden("role".to_string())).status(),
            StatusCode::FORBIDDEN
        );
    }
}
