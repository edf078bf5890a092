use super::jwt::TokenError;
use super::store::StoreError;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired setup code")]
    InvalidSetupCode,

    #[error("Invalid setup token")]
    InvalidSetupToken,

    #[error("Setup code expired")]
    SetupExpired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ServiceError::InvalidInput(msg.into())
    }

    pub fn forbidden() -> Self {
        ServiceError::Forbidden("Insufficient permissions".to_string())
    }

    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        // Callers learn only that the token was rejected, never why
        tracing::debug!(reason = %err, "Token rejected");
        ServiceError::InvalidToken
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(StoreError::DuplicateKey(collection)) => {
                AppError::Conflict(anyhow::anyhow!("Duplicate entry in {}", collection))
            }
            ServiceError::Store(StoreError::WriteConflict) => {
                AppError::Conflict(anyhow::anyhow!("Concurrent update, please retry"))
            }
            ServiceError::Store(StoreError::Backend(e)) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::InvalidSetupCode => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired setup code"))
            }
            ServiceError::InvalidSetupToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid setup token"))
            }
            ServiceError::SetupExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Setup code expired"))
            }
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
        }
    }
}
