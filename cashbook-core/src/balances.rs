use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CurrencyCode;

/// Per-currency balances of a single party.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances(BTreeMap<CurrencyCode, Decimal>);

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance in `currency`; currencies never touched read as zero.
    pub fn get(&self, currency: &CurrencyCode) -> Decimal {
        self.0.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn set(&mut self, currency: CurrencyCode, amount: Decimal) {
        self.0.insert(currency, amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, &Decimal)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CurrencyCode, Decimal)> for Balances {
    fn from_iter<T: IntoIterator<Item = (CurrencyCode, Decimal)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
