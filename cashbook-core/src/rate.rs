use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, CurrencyCode};

/// Directed rate edge: one unit of `from` equals `rate` units of `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: Decimal,
}

impl DirectRate {
    pub fn new(from: CurrencyCode, to: CurrencyCode, rate: Decimal) -> CoreResult<Self> {
        if rate <= Decimal::ZERO {
            return Err(CoreError::NonPositiveRate {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Self { from, to, rate })
    }
}
