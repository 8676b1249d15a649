use cashbook_core::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{LedgerResult, RateSource};

/// Resolves conversion rates from stored directional edges.
///
/// Resolution is exactly two lookups: the direct edge, then the reverse edge
/// inverted. There is no multi-hop search through a third currency, and when
/// both edges are stored the direct one wins even if they disagree.
pub struct RateResolver<'a, S: RateSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RateSource + ?Sized> RateResolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Rate such that one unit of `from` equals the result in units of `to`,
    /// or `None` when neither edge is stored.
    pub fn resolve(&self, from: &CurrencyCode, to: &CurrencyCode) -> LedgerResult<Option<Decimal>> {
        if from == to {
            return Ok(Some(Decimal::ONE));
        }
        if let Some(rate) = usable(self.source.direct_rate(from, to)?) {
            debug!(%from, %to, %rate, "resolved direct rate");
            return Ok(Some(rate));
        }
        if let Some(reverse) = usable(self.source.direct_rate(to, from)?) {
            let rate = Decimal::ONE.checked_div(reverse);
            debug!(%from, %to, %reverse, "resolved inverted rate");
            return Ok(rate);
        }
        debug!(%from, %to, "no rate stored in either direction");
        Ok(None)
    }

    /// Convert `amount` of `from` into `to`, if a rate resolves.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> LedgerResult<Option<Decimal>> {
        Ok(self
            .resolve(from, to)?
            .and_then(|rate| amount.checked_mul(rate)))
    }
}

fn usable(rate: Option<Decimal>) -> Option<Decimal> {
    rate.filter(|value| *value > Decimal::ZERO)
}

/// Custom rate as typed by the user, in whichever direction they quoted it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", content = "rate", rename_all = "snake_case")]
pub enum RateQuote {
    /// One unit of the giver's currency buys `rate` of the receiving currency.
    Forward(Decimal),
    /// One unit of the receiving currency costs `rate` of the giver's currency.
    Inverse(Decimal),
}

impl RateQuote {
    /// The quoted value before normalisation.
    pub fn quoted(&self) -> Decimal {
        match self {
            RateQuote::Forward(rate) | RateQuote::Inverse(rate) => *rate,
        }
    }

    /// Rate in the giver -> receiver direction; `None` if it cannot be inverted.
    pub fn normalized(&self) -> Option<Decimal> {
        match self {
            RateQuote::Forward(rate) => Some(*rate),
            RateQuote::Inverse(rate) => Decimal::ONE.checked_div(*rate),
        }
    }
}

impl From<Decimal> for RateQuote {
    fn from(value: Decimal) -> Self {
        RateQuote::Forward(value)
    }
}
