use cashbook_core::{
    Balances, Currency, CurrencyCode, DirectRate, Party, PartyId, Transaction,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{CommitBatch, CommitReceipt, LedgerResult, TransactionQuery};

/// Storage of user-entered directional rate edges.
pub trait RateSource: Send + Sync {
    /// Look up the stored edge `from -> to` only; no inversion.
    fn direct_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> LedgerResult<Option<Decimal>>;

    /// Insert or replace the edge `rate.from -> rate.to`.
    fn set_rate(&self, rate: &DirectRate) -> LedgerResult<()>;

    /// Every stored edge.
    fn rates(&self) -> LedgerResult<Vec<DirectRate>>;
}

/// Abstraction over the document store holding parties, balances and records.
///
/// `commit` must be atomic across the whole batch, and must apply balance
/// adjustments as a read-modify-write inside its own transaction so that
/// concurrent writers touching the same party cannot lose updates.
pub trait BalanceStore: RateSource {
    fn party(&self, id: &PartyId) -> LedgerResult<Option<Party>>;

    /// Insert or rename a party. The system accounts are fixed and must be
    /// rejected with [`LedgerError::ReservedParty`](crate::LedgerError::ReservedParty).
    fn upsert_party(&self, party: &Party) -> LedgerResult<()>;

    fn parties(&self) -> LedgerResult<Vec<Party>>;

    /// CAD is implicitly present in every store.
    fn currency_exists(&self, code: &CurrencyCode) -> LedgerResult<bool>;

    fn add_currency(&self, currency: &Currency) -> LedgerResult<()>;

    fn currencies(&self) -> LedgerResult<Vec<Currency>>;

    /// Balance of `party` in `currency`; zero if never touched.
    fn balance(&self, party: &PartyId, currency: &CurrencyCode) -> LedgerResult<Decimal> {
        Ok(self.balances(party)?.get(currency))
    }

    /// All balances of `party`, merged across its scalar and keyed slots.
    fn balances(&self, party: &PartyId) -> LedgerResult<Balances>;

    fn transaction(&self, id: &Uuid) -> LedgerResult<Option<Transaction>>;

    fn query_transactions(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>>;

    /// Apply a batch all-or-nothing.
    fn commit(&self, batch: CommitBatch) -> LedgerResult<CommitReceipt>;
}
