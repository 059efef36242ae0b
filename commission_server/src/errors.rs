use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use commission_engine::CommissionLedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Conflicting withdrawal request. {0}")]
    WithdrawalConflict(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidSignature,
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::WithdrawalConflict(_) => StatusCode::CONFLICT,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<CommissionLedgerError> for ServerError {
    fn from(e: CommissionLedgerError) -> Self {
        match &e {
            CommissionLedgerError::DatabaseError(_) => ServerError::BackendError(e.to_string()),
            CommissionLedgerError::OrderNotFound(_) |
            CommissionLedgerError::WithdrawalNotFound(_) |
            CommissionLedgerError::EventNotFound(_) |
            CommissionLedgerError::TenantNotFound(_) => ServerError::NoRecordFound(e.to_string()),
            CommissionLedgerError::WithdrawalAlreadyOpen { .. } |
            CommissionLedgerError::StaleWithdrawalRequest { .. } => ServerError::WithdrawalConflict(e.to_string()),
            CommissionLedgerError::InvalidCommissionConfig { .. } |
            CommissionLedgerError::AmountUpdateForbidden(_) |
            CommissionLedgerError::InvalidTransition { .. } |
            CommissionLedgerError::InsufficientBalance { .. } |
            CommissionLedgerError::WithdrawalNotPending(_) => ServerError::InvalidRequestBody(e.to_string()),
        }
    }
}
