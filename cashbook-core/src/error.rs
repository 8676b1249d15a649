use thiserror::Error;

/// Result alias for core parsing and validation.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building core domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),
    #[error("invalid party id: {0:?}")]
    InvalidPartyId(String),
    #[error("unknown party role: {0}")]
    UnknownRole(String),
    #[error("rate for {from}->{to} must be positive")]
    NonPositiveRate { from: String, to: String },
}
