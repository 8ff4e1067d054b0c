use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure categories surfaced by every service operation. The first four
/// describe the request; `Internal` means the store itself misbehaved.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        ServiceError::PermissionDenied(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        ServiceError::AlreadyExists(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        ServiceError::Internal(anyhow::anyhow!(msg))
    }

    /// Wire identifier for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::PermissionDenied(_) => "PERMISSION_DENIED",
            ServiceError::AlreadyExists(_) => "ALREADY_EXISTS",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Internal(e.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Internal(e.into())
    }
}
