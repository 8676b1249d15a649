use std::collections::{BTreeMap, HashMap};

use cashbook_core::{
    Balances, Currency, CurrencyCode, DirectRate, Party, PartyId, Transaction,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    BalanceSlot, BalanceStore, CommitBatch, CommitReceipt, LedgerError, LedgerResult, RateSource,
    TransactionQuery,
};

#[derive(Clone, Debug)]
struct PartyDoc {
    party: Party,
    cad_balance: Decimal,
}

#[derive(Debug, Default)]
struct State {
    parties: BTreeMap<PartyId, PartyDoc>,
    /// Keyed balance documents: system accounts and non-CAD side maps.
    keyed: HashMap<PartyId, Balances>,
    currencies: BTreeMap<CurrencyCode, Currency>,
    rates: BTreeMap<(CurrencyCode, CurrencyCode), Decimal>,
    transactions: HashMap<Uuid, Transaction>,
    injected_failures: usize,
}

impl State {
    fn read(&self, party: &PartyId, currency: &CurrencyCode) -> Decimal {
        match BalanceSlot::locate(party, currency) {
            BalanceSlot::Scalar => self
                .parties
                .get(party)
                .map(|doc| doc.cad_balance)
                .unwrap_or(Decimal::ZERO),
            BalanceSlot::Keyed => self
                .keyed
                .get(party)
                .map(|balances| balances.get(currency))
                .unwrap_or(Decimal::ZERO),
        }
    }

    fn write(&mut self, party: &PartyId, currency: &CurrencyCode, value: Decimal) {
        match BalanceSlot::locate(party, currency) {
            BalanceSlot::Scalar => {
                if let Some(doc) = self.parties.get_mut(party) {
                    doc.cad_balance = value;
                }
            }
            BalanceSlot::Keyed => self
                .keyed
                .entry(party.clone())
                .or_default()
                .set(currency.clone(), value),
        }
    }
}

/// In-process store guarded by a single mutex.
///
/// Each commit validates and computes every new value under the lock before
/// mutating anything, so a rejected batch leaves no trace.
#[derive(Debug)]
pub struct MemoryBalanceStore {
    state: Mutex<State>,
}

impl Default for MemoryBalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBalanceStore {
    /// Empty store seeded with CAD and the two system accounts.
    pub fn new() -> Self {
        let mut state = State::default();
        for party in [Party::myself_cash(), Party::myself_bank()] {
            state.parties.insert(
                party.id.clone(),
                PartyDoc {
                    party,
                    cad_balance: Decimal::ZERO,
                },
            );
        }
        state
            .currencies
            .insert(CurrencyCode::cad(), Currency::cad());
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make the next `count` commits fail with `CommitFailed`, as a flaky backend would.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.lock().injected_failures = count;
    }

    /// Overwrite a balance directly, bypassing the ledger. Used to seed opening balances.
    pub fn seed_balance(
        &self,
        party: &PartyId,
        currency: &CurrencyCode,
        amount: Decimal,
    ) -> LedgerResult<()> {
        let mut state = self.state.lock();
        if !state.parties.contains_key(party) {
            return Err(LedgerError::UnknownParty(party.clone()));
        }
        state.write(party, currency, amount);
        Ok(())
    }
}

impl RateSource for MemoryBalanceStore {
    fn direct_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> LedgerResult<Option<Decimal>> {
        Ok(self
            .state
            .lock()
            .rates
            .get(&(from.clone(), to.clone()))
            .copied())
    }

    fn set_rate(&self, rate: &DirectRate) -> LedgerResult<()> {
        self.state
            .lock()
            .rates
            .insert((rate.from.clone(), rate.to.clone()), rate.rate);
        Ok(())
    }

    fn rates(&self) -> LedgerResult<Vec<DirectRate>> {
        Ok(self
            .state
            .lock()
            .rates
            .iter()
            .map(|((from, to), rate)| DirectRate {
                from: from.clone(),
                to: to.clone(),
                rate: *rate,
            })
            .collect())
    }
}

impl BalanceStore for MemoryBalanceStore {
    fn party(&self, id: &PartyId) -> LedgerResult<Option<Party>> {
        Ok(self
            .state
            .lock()
            .parties
            .get(id)
            .map(|doc| doc.party.clone()))
    }

    fn upsert_party(&self, party: &Party) -> LedgerResult<()> {
        if party.is_system() {
            return Err(LedgerError::ReservedParty(party.id.clone()));
        }
        let mut state = self.state.lock();
        match state.parties.get_mut(&party.id) {
            Some(doc) => doc.party = party.clone(),
            None => {
                state.parties.insert(
                    party.id.clone(),
                    PartyDoc {
                        party: party.clone(),
                        cad_balance: Decimal::ZERO,
                    },
                );
            }
        }
        Ok(())
    }

    fn parties(&self) -> LedgerResult<Vec<Party>> {
        Ok(self
            .state
            .lock()
            .parties
            .values()
            .map(|doc| doc.party.clone())
            .collect())
    }

    fn currency_exists(&self, code: &CurrencyCode) -> LedgerResult<bool> {
        Ok(code.is_reference() || self.state.lock().currencies.contains_key(code))
    }

    fn add_currency(&self, currency: &Currency) -> LedgerResult<()> {
        self.state
            .lock()
            .currencies
            .insert(currency.code.clone(), currency.clone());
        Ok(())
    }

    fn currencies(&self) -> LedgerResult<Vec<Currency>> {
        Ok(self.state.lock().currencies.values().cloned().collect())
    }

    fn balances(&self, party: &PartyId) -> LedgerResult<Balances> {
        let state = self.state.lock();
        let doc = state
            .parties
            .get(party)
            .ok_or_else(|| LedgerError::UnknownParty(party.clone()))?;
        let mut balances = state.keyed.get(party).cloned().unwrap_or_default();
        if !party.is_system() {
            balances.set(CurrencyCode::cad(), doc.cad_balance);
        }
        Ok(balances)
    }

    fn transaction(&self, id: &Uuid) -> LedgerResult<Option<Transaction>> {
        Ok(self.state.lock().transactions.get(id).cloned())
    }

    fn query_transactions(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.lock();
        let mut matched: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        if !query.ascending {
            matched.reverse();
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn commit(&self, batch: CommitBatch) -> LedgerResult<CommitReceipt> {
        let mut state = self.state.lock();
        if state.injected_failures > 0 {
            state.injected_failures -= 1;
            return Err(LedgerError::CommitFailed("injected failure".into()));
        }

        for id in &batch.delete {
            if !state.transactions.contains_key(id) {
                return Err(LedgerError::NotFound(*id));
            }
        }
        for tx in &batch.create {
            if state.transactions.contains_key(&tx.id) {
                return Err(LedgerError::CommitFailed(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
        }

        let mut receipt = CommitReceipt::default();
        for adjustment in &batch.adjustments {
            if !state.parties.contains_key(&adjustment.party) {
                return Err(LedgerError::UnknownParty(adjustment.party.clone()));
            }
            let current = receipt
                .balance(&adjustment.party, &adjustment.currency)
                .unwrap_or_else(|| state.read(&adjustment.party, &adjustment.currency));
            let next = current.checked_add(adjustment.delta).ok_or_else(|| {
                LedgerError::CommitFailed(format!(
                    "balance overflow for {} in {}",
                    adjustment.party, adjustment.currency
                ))
            })?;
            receipt.record(&adjustment.party, &adjustment.currency, next);
        }

        // Validation done; nothing below can fail.
        for (party, currency, value) in &receipt.balances {
            state.write(party, currency, *value);
        }
        for id in &batch.delete {
            state.transactions.remove(id);
        }
        for mut tx in batch.create {
            tx.snapshot = receipt.snapshot_for(&tx);
            state.transactions.insert(tx.id, tx);
        }
        Ok(receipt)
    }
}
