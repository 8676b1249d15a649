use cashbook_core::{BalanceSnapshot, CurrencyCode, PartyId, Transaction};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Where a party's balance in one currency is persisted.
///
/// System parties keep every currency, CAD included, in their single shared
/// document. Ordinary parties keep CAD as a scalar on their own record and
/// every other currency in a side document.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BalanceSlot {
    Scalar,
    Keyed,
}

impl BalanceSlot {
    pub fn locate(party: &PartyId, currency: &CurrencyCode) -> Self {
        if !party.is_system() && currency.is_reference() {
            BalanceSlot::Scalar
        } else {
            BalanceSlot::Keyed
        }
    }
}

/// Signed change applied to one balance inside a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub party: PartyId,
    pub currency: CurrencyCode,
    pub delta: Decimal,
}

/// Everything one ledger operation writes, committed all-or-nothing.
#[derive(Clone, Debug, Default)]
pub struct CommitBatch {
    pub adjustments: Vec<BalanceAdjustment>,
    pub create: Vec<Transaction>,
    pub delete: Vec<Uuid>,
}

impl CommitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adjust(mut self, party: &PartyId, currency: &CurrencyCode, delta: Decimal) -> Self {
        self.adjustments.push(BalanceAdjustment {
            party: party.clone(),
            currency: currency.clone(),
            delta,
        });
        self
    }

    pub fn create(mut self, transaction: Transaction) -> Self {
        self.create.push(transaction);
        self
    }

    pub fn delete(mut self, id: Uuid) -> Self {
        self.delete.push(id);
        self
    }
}

/// Post-commit balances of every slot a batch adjusted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub balances: Vec<(PartyId, CurrencyCode, Decimal)>,
}

impl CommitReceipt {
    pub fn record(&mut self, party: &PartyId, currency: &CurrencyCode, balance: Decimal) {
        match self
            .balances
            .iter_mut()
            .find(|(p, c, _)| p == party && c == currency)
        {
            Some(entry) => entry.2 = balance,
            None => self
                .balances
                .push((party.clone(), currency.clone(), balance)),
        }
    }

    pub fn balance(&self, party: &PartyId, currency: &CurrencyCode) -> Option<Decimal> {
        self.balances
            .iter()
            .find(|(p, c, _)| p == party && c == currency)
            .map(|(_, _, balance)| *balance)
    }

    /// Display snapshot for a transaction whose legs were part of this commit.
    pub fn snapshot_for(&self, transaction: &Transaction) -> Option<BalanceSnapshot> {
        Some(BalanceSnapshot {
            giver_balance: self.balance(&transaction.giver.id, &transaction.currency)?,
            taker_balance: self.balance(&transaction.taker.id, transaction.credited_currency())?,
        })
    }
}
