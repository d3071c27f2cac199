use serde::Serialize;
use uuid::Uuid;

use crate::money::Currency;
use crate::store::StoreError;

/// Crate-wide error taxonomy.
///
/// Every fallible core operation returns one of these; nothing is swallowed
/// inside aggregation. A failure to compute one booking's figures aborts the
/// whole view computation rather than silently omitting the booking.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The caller's scope does not cover the requested vendor or order.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested transition is not defined from the entity's current state.
    #[error("transition '{transition}' not allowed from state '{from}'")]
    IllegalTransition { transition: String, from: String },

    /// Malformed numeric or currency fields on a booking.
    #[error("invalid booking data: {0}")]
    InvalidBookingData(String),

    /// Aggregation attempted across incompatible currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// An id did not resolve in the record store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Lock contention on the same order exceeded the configured timeout.
    #[error("concurrent modification of order {0}")]
    ConcurrentModification(Uuid),

    /// Malformed service input (request validation).
    #[error("validation error: {0}")]
    Validation(String),

    /// Record store backend failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Anything else, with context attached.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Validation(err.to_string())
    }
}

impl CoreError {
    /// Stable machine-readable code for presentation and export layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::InvalidBookingData(_) => "invalid_booking_data",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::NotFound(_) => "not_found",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Validation(_) => "validation_error",
            Self::Store(_) => "store_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Whether retrying the same call can reasonably succeed without
    /// intervening changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_) | Self::Store(_))
    }
}

/// Serializable error shape handed to surrounding presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl From<&CoreError> for ErrorDetails {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
