use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Account already exists: {0}:{1}")]
    AlreadyExists(String, String),

    #[error("Account not found")]
    NotFound,

    #[error("Account deleted")]
    Deleted,

    #[error("Insufficient balance")]
    Insufficient,

    #[error("Request already processed (idempotency)")]
    AlreadyProcessed,

    #[error("Operation cancelled by deadline")]
    Canceled,

    #[error("Invariant violation: {0}")]
    Fatal(String),
}

impl ResponseError for LedgerError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Bus(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::AlreadyExists(_, _) => StatusCode::CONFLICT,
            LedgerError::NotFound => StatusCode::NOT_FOUND,
            LedgerError::Deleted => StatusCode::NOT_FOUND,
            LedgerError::Insufficient => StatusCode::PAYMENT_REQUIRED,
            LedgerError::AlreadyProcessed => StatusCode::CONFLICT,
            LedgerError::Canceled => StatusCode::REQUEST_TIMEOUT,
            LedgerError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl LedgerError {
    fn error_type(&self) -> &str {
        match self {
            LedgerError::Database(_) => "database_error",
            LedgerError::Cache(_) => "cache_error",
            LedgerError::Bus(_) => "messaging_error",
            LedgerError::Serialization(_) => "serialization_error",
            LedgerError::Validation(_) => "validation_error",
            LedgerError::AlreadyExists(_, _) => "already_exists",
            LedgerError::NotFound => "not_found",
            LedgerError::Deleted => "deleted",
            LedgerError::Insufficient => "insufficient_balance",
            LedgerError::AlreadyProcessed => "already_processed",
            LedgerError::Canceled => "cancelled",
            LedgerError::Fatal(_) => "invariant_violation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_status_codes() {
        assert_eq!(
            LedgerError::Insufficient.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            LedgerError::AlreadyProcessed.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(LedgerError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(LedgerError::Deleted.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            LedgerError::AlreadyExists("u1".into(), "credits".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::Validation("amount must be positive".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::Canceled.status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[test]
    fn test_transport_errors_are_internal() {
        assert_eq!(
            LedgerError::Bus("nats unreachable".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            LedgerError::Fatal("balance row missing".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
