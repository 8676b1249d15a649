use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Code of the currency every report is normalised to.
pub const REFERENCE_CURRENCY: &str = "CAD";

const MAX_CODE_LEN: usize = 8;

/// Normalised currency code such as `USD` or `CAD`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and normalise a user supplied code.
    pub fn new(raw: impl AsRef<str>) -> CoreResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_CODE_LEN
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CoreError::InvalidCurrencyCode(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The implicit reference currency.
    pub fn cad() -> Self {
        Self(REFERENCE_CURRENCY.to_string())
    }

    pub fn is_reference(&self) -> bool {
        self.0 == REFERENCE_CURRENCY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

/// A user-defined currency with its display symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub symbol: String,
}

impl Currency {
    pub fn new(code: CurrencyCode, symbol: impl Into<String>) -> Self {
        Self {
            code,
            symbol: symbol.into(),
        }
    }

    /// The always-present reference currency.
    pub fn cad() -> Self {
        Self::new(CurrencyCode::cad(), "$")
    }
}
