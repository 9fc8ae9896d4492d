// Ledger error taxonomy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::error;

/// Closed set of failures a ledger operation can surface.
///
/// Every variant except `Storage` carries a specific, user-visible reason.
/// `Storage` wraps unexpected database faults, which are logged with full
/// context server-side and surfaced as a generic failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient funds: {available} BU available, {requested} BU requested")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation not permitted")]
    Unauthorized,

    #[error("conflicting concurrent mutation, retry the request")]
    Conflict,

    #[error("duplicate value: {0} already exists")]
    Duplicate(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(&'static str),

    #[error("{0}")]
    Validation(&'static str),

    #[error("storage error")]
    Storage(#[source] sqlx::Error),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(code) = db.code() {
                // Serialization failures and deadlocks are retryable.
                if code == "40001" || code == "40P01" {
                    return LedgerError::Conflict;
                }
                // Unique violations are permanent; retrying the same request
                // cannot succeed.
                if code == "23505" {
                    return LedgerError::Duplicate(
                        db.constraint().unwrap_or("unique value").to_string(),
                    );
                }
                // Foreign key violation: the referenced row does not exist.
                if code == "23503" {
                    return LedgerError::NotFound("referenced record");
                }
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return LedgerError::NotFound("record");
        }
        LedgerError::Storage(err)
    }
}

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::InvalidAmount
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::InvalidDestination(_)
            | LedgerError::Validation(_)
            | LedgerError::Duplicate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidState(_) | LedgerError::Conflict => StatusCode::CONFLICT,
            LedgerError::Unauthorized => StatusCode::FORBIDDEN,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            LedgerError::Storage(e) => {
                error!("storage error: {e:?}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_failures_surface_their_reason() {
        let err = LedgerError::InsufficientFunds {
            available: Decimal::from(200),
            requested: Decimal::from(250),
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: 200 BU available, 250 BU requested"
        );
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            LedgerError::InvalidAmount.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::NotFound("sale").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LedgerError::InvalidState("already issued".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::Unauthorized.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(LedgerError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            LedgerError::Duplicate("users_phone_key".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::Storage(sqlx::Error::PoolClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn duplicates_are_not_presented_as_retryable() {
        let err = LedgerError::Duplicate("users_phone_key".into());
        assert!(err.to_string().contains("already exists"));
        assert!(!err.to_string().contains("retry"));
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }
}
