use cashbook_core::{CoreError, CurrencyCode, PartyId};
use thiserror::Error;
use uuid::Uuid;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
///
/// Everything except [`LedgerError::CommitFailed`], [`LedgerError::Storage`] and
/// [`LedgerError::Serialization`] is detected before any balance is touched.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(String),
    #[error("giver and taker are the same party: {0}")]
    SameParty(PartyId),
    #[error("exchange must receive a different currency than {0}")]
    SameCurrency(CurrencyCode),
    #[error("custom rate must be positive, got {0}")]
    InvalidRate(String),
    #[error("unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),
    #[error("unknown party: {0}")]
    UnknownParty(PartyId),
    #[error("{0} is a built-in account and cannot be changed")]
    ReservedParty(PartyId),
    #[error("no rate available for {from}->{to}")]
    RateUnavailable { from: CurrencyCode, to: CurrencyCode },
    #[error("transaction not found: {0}")]
    NotFound(Uuid),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// Only a rejected commit is worth retrying; validation failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::CommitFailed(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<CoreError> for LedgerError {
    fn from(value: CoreError) -> Self {
        Self::Serialization(value.to_string())
    }
}
