use rust_decimal::Decimal;
use thiserror::Error;

/// Application-level error type shared across services and repositories.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("installment is already paid; last payment was registered on {last_paid_on}")]
    AlreadyPaid { last_paid_on: chrono::NaiveDate },

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error("reset window expired: last payment is {hours_since_last}h old, limit is {window_hours}h")]
    ResetWindowExpired {
        hours_since_last: i64,
        window_hours: i64,
    },

    #[error("edit window expired: last payment was registered on {last_paid_on}")]
    EditWindowExpired { last_paid_on: chrono::NaiveDate },

    #[error("installment has no payments to reset")]
    NoPaymentsToReset,

    #[error("installment has no payments to edit")]
    NoPaymentsToEdit,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-readable code used in bulk results and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION",
            AppError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            AppError::AlreadyPaid { .. } => "ALREADY_PAID",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::ResetWindowExpired { .. } => "RESET_WINDOW_EXPIRED",
            AppError::EditWindowExpired { .. } => "EDIT_WINDOW_EXPIRED",
            AppError::NoPaymentsToReset => "NO_PAYMENTS_TO_RESET",
            AppError::NoPaymentsToEdit => "NO_PAYMENTS_TO_EDIT",
            AppError::Config(_) => "CONFIG",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a caller may safely retry the operation.
    /// Waterfall transactions can exceed their statement timeout under load;
    /// that surfaces as a database error and is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
