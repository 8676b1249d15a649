use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CurrencyCode, Party, PartyId, PartyRef};

/// Exchange leg of a transaction: what the taker received and at which rate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDetails {
    pub receiving_currency: CurrencyCode,
    pub received_amount: Decimal,
    /// Rate the parties agreed on, expressed giver currency -> receiving currency.
    pub custom_rate: Decimal,
}

/// Post-transaction balances captured for display. Never authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub giver_balance: Decimal,
    pub taker_balance: Decimal,
}

/// Immutable record of a money movement between two parties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub giver: PartyRef,
    pub taker: PartyRef,
    /// Amount debited from the giver, in `currency`.
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub exchange: Option<ExchangeDetails>,
    pub snapshot: Option<BalanceSnapshot>,
}

impl Transaction {
    /// Build a regular transfer stamped with `timestamp` and a fresh id.
    pub fn new(
        giver: &Party,
        taker: &Party,
        amount: Decimal,
        currency: CurrencyCode,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            giver: giver.to_ref(),
            taker: taker.to_ref(),
            amount,
            currency,
            exchange: None,
            snapshot: None,
        }
    }

    pub fn with_exchange(mut self, details: ExchangeDetails) -> Self {
        self.exchange = Some(details);
        self
    }

    pub fn is_exchange(&self) -> bool {
        self.exchange.is_some()
    }

    /// Currency the taker was credited in.
    pub fn credited_currency(&self) -> &CurrencyCode {
        self.exchange
            .as_ref()
            .map(|ex| &ex.receiving_currency)
            .unwrap_or(&self.currency)
    }

    /// Amount the taker was credited.
    pub fn credited_amount(&self) -> Decimal {
        self.exchange
            .as_ref()
            .map(|ex| ex.received_amount)
            .unwrap_or(self.amount)
    }

    /// Whether `party` is the giver or the taker.
    pub fn involves(&self, party: &PartyId) -> bool {
        &self.giver.id == party || &self.taker.id == party
    }
}
