use std::sync::Arc;

use cashbook_core::{
    Balances, Currency, CurrencyCode, DirectRate, ExchangeDetails, Party, PartyId, Transaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    BalanceStore, CommitBatch, LedgerError, LedgerResult, ProfitAccountant, ProfitReport,
    RateQuote, RateResolver, Timeframe, TransactionQuery,
};

/// Exchange leg requested by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeInfo {
    pub receiving_currency: CurrencyCode,
    pub custom_rate: RateQuote,
}

impl ExchangeInfo {
    pub fn new(receiving_currency: CurrencyCode, custom_rate: impl Into<RateQuote>) -> Self {
        Self {
            receiving_currency,
            custom_rate: custom_rate.into(),
        }
    }
}

/// A transfer or exchange waiting to be applied.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub giver: Party,
    pub taker: Party,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub exchange: Option<ExchangeInfo>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransferRequest {
    pub fn new(giver: Party, taker: Party, amount: Decimal, currency: CurrencyCode) -> Self {
        Self {
            giver,
            taker,
            amount,
            currency,
            exchange: None,
            timestamp: None,
        }
    }

    pub fn with_exchange(mut self, exchange: ExchangeInfo) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Stamp the record with an explicit time instead of "now".
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Applies and reverses transactions against a [`BalanceStore`].
pub struct LedgerEngine<S: BalanceStore + ?Sized> {
    store: Arc<S>,
}

impl<S: BalanceStore + ?Sized> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: BalanceStore + ?Sized> LedgerEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> RateResolver<'_, S> {
        RateResolver::new(&*self.store)
    }

    /// Market rate preview for display.
    pub fn resolve_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> LedgerResult<Option<Decimal>> {
        self.resolver().resolve(from, to)
    }

    pub fn set_rate(&self, rate: &DirectRate) -> LedgerResult<()> {
        self.store.set_rate(rate)
    }

    pub fn add_currency(&self, currency: &Currency) -> LedgerResult<()> {
        self.store.add_currency(currency)
    }

    pub fn balance(&self, party: &PartyId, currency: &CurrencyCode) -> LedgerResult<Decimal> {
        self.require_party(party)?;
        self.store.balance(party, currency)
    }

    pub fn balances(&self, party: &PartyId) -> LedgerResult<Balances> {
        self.require_party(party)?;
        self.store.balances(party)
    }

    /// Positional form of [`LedgerEngine::apply`].
    pub fn apply_transaction(
        &self,
        giver: &Party,
        taker: &Party,
        amount: Decimal,
        currency: &CurrencyCode,
        exchange: Option<ExchangeInfo>,
    ) -> LedgerResult<Transaction> {
        let mut request = TransferRequest::new(giver.clone(), taker.clone(), amount, currency.clone());
        request.exchange = exchange;
        self.apply(request)
    }

    /// Validate a request, then debit the giver, credit the taker and persist
    /// the record in one atomic commit.
    pub fn apply(&self, request: TransferRequest) -> LedgerResult<Transaction> {
        let transaction = match self.prepare(&request) {
            Ok(tx) => tx,
            Err(err) => {
                warn!(
                    giver = %request.giver.id,
                    taker = %request.taker.id,
                    amount = %request.amount,
                    currency = %request.currency,
                    error = %err,
                    "rejected transaction"
                );
                return Err(err);
            }
        };

        let batch = CommitBatch::new()
            .adjust(
                &transaction.giver.id,
                &transaction.currency,
                -transaction.amount,
            )
            .adjust(
                &transaction.taker.id,
                transaction.credited_currency(),
                transaction.credited_amount(),
            )
            .create(transaction.clone());
        let receipt = self.store.commit(batch)?;

        let mut transaction = transaction;
        transaction.snapshot = receipt.snapshot_for(&transaction);
        info!(
            tx = %transaction.id,
            giver = %transaction.giver.id,
            taker = %transaction.taker.id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            credited = %transaction.credited_amount(),
            credited_currency = %transaction.credited_currency(),
            exchange = transaction.is_exchange(),
            "applied transaction"
        );
        Ok(transaction)
    }

    /// Undo a transaction's balance effects and delete its record atomically.
    ///
    /// The inverse is computed from the stored record, never from current
    /// rates. A second reversal of the same id fails with `NotFound`.
    pub fn reverse_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        self.reverse_transaction_by_id(&transaction.id).map(|_| ())
    }

    /// Load, reverse and return the removed record.
    pub fn reverse_transaction_by_id(&self, id: &Uuid) -> LedgerResult<Transaction> {
        let stored = self
            .store
            .transaction(id)?
            .ok_or(LedgerError::NotFound(*id))?;

        let batch = CommitBatch::new()
            .adjust(&stored.giver.id, &stored.currency, stored.amount)
            .adjust(
                &stored.taker.id,
                stored.credited_currency(),
                -stored.credited_amount(),
            )
            .delete(stored.id);
        self.store.commit(batch)?;

        info!(
            tx = %stored.id,
            giver = %stored.giver.id,
            taker = %stored.taker.id,
            amount = %stored.amount,
            currency = %stored.currency,
            "reversed transaction"
        );
        Ok(stored)
    }

    /// Live profit over every stored exchange in `timeframe`, totalled in CAD.
    pub fn compute_profit(&self, timeframe: Timeframe) -> LedgerResult<ProfitReport> {
        self.compute_profit_in(timeframe, CurrencyCode::cad())
    }

    pub fn compute_profit_in(
        &self,
        timeframe: Timeframe,
        reference: CurrencyCode,
    ) -> LedgerResult<ProfitReport> {
        let exchanges = self
            .store
            .query_transactions(TransactionQuery::default().exchanges_only())?;
        ProfitAccountant::new(&*self.store)
            .with_reference(reference)
            .compute_profit(&exchanges, timeframe)
    }

    fn prepare(&self, request: &TransferRequest) -> LedgerResult<Transaction> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(request.amount.to_string()));
        }
        if request.giver.id == request.taker.id {
            return Err(LedgerError::SameParty(request.giver.id.clone()));
        }
        self.require_currency(&request.currency)?;
        self.require_party(&request.giver.id)?;
        self.require_party(&request.taker.id)?;

        let timestamp = request.timestamp.unwrap_or_else(Utc::now);
        let transaction = Transaction::new(
            &request.giver,
            &request.taker,
            request.amount,
            request.currency.clone(),
            timestamp,
        );
        match &request.exchange {
            None => Ok(transaction),
            Some(exchange) => {
                let details = self.prepare_exchange(request, exchange)?;
                Ok(transaction.with_exchange(details))
            }
        }
    }

    fn prepare_exchange(
        &self,
        request: &TransferRequest,
        exchange: &ExchangeInfo,
    ) -> LedgerResult<ExchangeDetails> {
        let receiving = &exchange.receiving_currency;
        if receiving == &request.currency {
            return Err(LedgerError::SameCurrency(receiving.clone()));
        }
        self.require_currency(receiving)?;

        if exchange.custom_rate.quoted() <= Decimal::ZERO {
            return Err(LedgerError::InvalidRate(
                exchange.custom_rate.quoted().to_string(),
            ));
        }
        let custom_rate = exchange
            .custom_rate
            .normalized()
            .filter(|rate| *rate > Decimal::ZERO)
            .ok_or_else(|| LedgerError::InvalidRate(exchange.custom_rate.quoted().to_string()))?;

        // Exchanges never proceed without a market rate, however far off the custom one is.
        if self.resolver().resolve(&request.currency, receiving)?.is_none() {
            return Err(LedgerError::RateUnavailable {
                from: request.currency.clone(),
                to: receiving.clone(),
            });
        }

        let received_amount = request
            .amount
            .checked_mul(custom_rate)
            .ok_or_else(|| LedgerError::InvalidAmount(request.amount.to_string()))?;
        Ok(ExchangeDetails {
            receiving_currency: receiving.clone(),
            received_amount,
            custom_rate,
        })
    }

    fn require_currency(&self, code: &CurrencyCode) -> LedgerResult<()> {
        if self.store.currency_exists(code)? {
            Ok(())
        } else {
            Err(LedgerError::UnknownCurrency(code.clone()))
        }
    }

    fn require_party(&self, id: &PartyId) -> LedgerResult<()> {
        match self.store.party(id)? {
            Some(_) => Ok(()),
            None => Err(LedgerError::UnknownParty(id.clone())),
        }
    }
}
