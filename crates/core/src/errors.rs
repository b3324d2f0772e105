use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InsufficientQuantity(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServiceUnavailable,
    Internal,
}

/// Caller-facing projection of an [`ApplicationError`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self.kind {
            InterfaceErrorKind::BadRequest => 400,
            InterfaceErrorKind::Unauthorized => 401,
            InterfaceErrorKind::Forbidden => 403,
            InterfaceErrorKind::NotFound => 404,
            InterfaceErrorKind::Conflict => 409,
            InterfaceErrorKind::ServiceUnavailable => 503,
            InterfaceErrorKind::Internal => 500,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let mut mapped = InterfaceError::from(self);
        mapped.correlation_id = correlation_id.into();
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let (kind, message) = match value {
            ApplicationError::Domain(DomainError::Validation(message))
            | ApplicationError::Domain(DomainError::InsufficientQuantity(message)) => {
                (InterfaceErrorKind::BadRequest, message)
            }
            ApplicationError::Domain(DomainError::NotFound(message)) => {
                (InterfaceErrorKind::NotFound, message)
            }
            ApplicationError::Domain(DomainError::Conflict(message)) => {
                (InterfaceErrorKind::Conflict, message)
            }
            ApplicationError::Unauthorized(message) => (InterfaceErrorKind::Unauthorized, message),
            ApplicationError::Forbidden(message) => (InterfaceErrorKind::Forbidden, message),
            ApplicationError::Persistence(_) => (
                InterfaceErrorKind::ServiceUnavailable,
                "The service is temporarily unavailable. Please retry shortly.".to_owned(),
            ),
            ApplicationError::Configuration(_) => {
                (InterfaceErrorKind::Internal, "An unexpected internal error occurred.".to_owned())
            }
        };

        Self { kind, message, correlation_id: "unassigned".to_owned() }
    }
}
