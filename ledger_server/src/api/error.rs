//! Mapping of ledger failures onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chip_ledger::LedgerError;
use serde::Serialize;

use crate::locks::UserBusy;
use crate::logging;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every ledger handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Busy(#[from] UserBusy),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Busy(_) => StatusCode::CONFLICT,
            ApiError::Ledger(err) => match err {
                LedgerError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
                LedgerError::InsufficientFunds { .. }
                | LedgerError::NotEligible(_)
                | LedgerError::ActivationWindowClosed => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::NothingToClaim
                | LedgerError::AlreadyFinalized { .. }
                | LedgerError::AlreadyStaked(_)
                | LedgerError::NotStaked(_)
                | LedgerError::AffiliateCodeTaken(_)
                | LedgerError::AlreadyAffiliated(_) => StatusCode::CONFLICT,
                LedgerError::EntryNotFound(_) | LedgerError::AffiliateCodeNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::OwnerMismatch(_) | LedgerError::NotOwner(_) => StatusCode::FORBIDDEN,
                LedgerError::SessionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Database(_)
                | LedgerError::BalanceOverflow
                | LedgerError::CorruptRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::Ledger(err) => err.client_message(),
            ApiError::Busy(err) => err.to_string(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            ApiError::Ledger(err) => err.is_recoverable(),
            ApiError::Busy(_) => true,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Full detail goes to the log, the client gets the sanitized message
        logging::log_ledger_rejection(
            status.canonical_reason().unwrap_or("error"),
            self.is_recoverable(),
            &self.to_string(),
        );

        let body = Json(ErrorResponse {
            error: self.client_message(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
