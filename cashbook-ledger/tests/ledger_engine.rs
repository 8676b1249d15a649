use std::sync::Arc;
use std::thread;

use cashbook_core::{Currency, CurrencyCode, DirectRate, Party, PartyId, PartyRole};
use cashbook_ledger::{
    BalanceStore, ExchangeInfo, LedgerEngine, LedgerError, MemoryBalanceStore, RateQuote,
    RateSource, SqliteBalanceStore, Timeframe, TransactionQuery, TransferRequest,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn code(raw: &str) -> CurrencyCode {
    CurrencyCode::new(raw).unwrap()
}

fn cad() -> CurrencyCode {
    CurrencyCode::cad()
}

struct Fixture {
    engine: LedgerEngine<MemoryBalanceStore>,
    store: Arc<MemoryBalanceStore>,
    giver: Party,
    taker: Party,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryBalanceStore::new());
    let giver = Party::new(PartyId::new("g").unwrap(), "Giver", PartyRole::Customer);
    let taker = Party::new(PartyId::new("t").unwrap(), "Taker", PartyRole::Supplier);
    store.upsert_party(&giver).unwrap();
    store.upsert_party(&taker).unwrap();
    store.add_currency(&Currency::new(code("USD"), "US$")).unwrap();
    store.add_currency(&Currency::new(code("EUR"), "€")).unwrap();
    Fixture {
        engine: LedgerEngine::new(Arc::clone(&store)),
        store,
        giver,
        taker,
    }
}

fn set_rate(store: &MemoryBalanceStore, from: &str, to: &str, rate: Decimal) {
    store
        .set_rate(&DirectRate::new(code(from), code(to), rate).unwrap())
        .unwrap();
}

#[test]
fn regular_transfer_moves_and_reversal_restores() {
    let fx = fixture();
    fx.store.seed_balance(&fx.giver.id, &cad(), dec!(100)).unwrap();

    let tx = fx
        .engine
        .apply_transaction(&fx.giver, &fx.taker, dec!(40), &cad(), None)
        .unwrap();
    assert_eq!(fx.engine.balance(&fx.giver.id, &cad()).unwrap(), dec!(60));
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), dec!(40));
    let snapshot = tx.snapshot.clone().unwrap();
    assert_eq!(snapshot.giver_balance, dec!(60));
    assert_eq!(snapshot.taker_balance, dec!(40));

    fx.engine.reverse_transaction(&tx).unwrap();
    assert_eq!(fx.engine.balance(&fx.giver.id, &cad()).unwrap(), dec!(100));
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), Decimal::ZERO);
    assert!(fx.store.transaction(&tx.id).unwrap().is_none());
}

#[test]
fn exchange_credits_received_amount_and_reports_profit() {
    let fx = fixture();
    set_rate(&fx.store, "USD", "CAD", dec!(1.35));
    fx.store
        .seed_balance(&fx.giver.id, &code("USD"), dec!(100))
        .unwrap();

    let tx = fx
        .engine
        .apply_transaction(
            &fx.giver,
            &fx.taker,
            dec!(100),
            &code("USD"),
            Some(ExchangeInfo::new(cad(), dec!(1.40))),
        )
        .unwrap();
    assert!(tx.is_exchange());
    assert_eq!(fx.engine.balance(&fx.giver.id, &code("USD")).unwrap(), Decimal::ZERO);
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), dec!(140));
    assert_eq!(fx.engine.balance(&fx.taker.id, &code("USD")).unwrap(), Decimal::ZERO);

    let report = fx.engine.compute_profit(Timeframe::AllTime).unwrap();
    assert_eq!(report.per_currency.get(&cad()), Some(&dec!(5)));
    assert_eq!(report.total_in_reference, dec!(5));
}

#[test]
fn exchange_without_any_rate_is_blocked() {
    let fx = fixture();
    let err = fx
        .engine
        .apply_transaction(
            &fx.giver,
            &fx.taker,
            dec!(10),
            &code("EUR"),
            Some(ExchangeInfo::new(code("USD"), dec!(1.08))),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::RateUnavailable { .. }));
    assert_eq!(fx.engine.balance(&fx.giver.id, &code("EUR")).unwrap(), Decimal::ZERO);
    assert!(fx
        .store
        .query_transactions(TransactionQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn exchange_accepts_reverse_edge_and_any_custom_rate() {
    let fx = fixture();
    set_rate(&fx.store, "USD", "EUR", dec!(0.92));

    // Only EUR -> USD is requested; the USD -> EUR edge is inverted.
    let tx = fx
        .engine
        .apply_transaction(
            &fx.giver,
            &fx.taker,
            dec!(10),
            &code("EUR"),
            Some(ExchangeInfo::new(code("USD"), dec!(5))),
        )
        .unwrap();
    assert_eq!(tx.credited_amount(), dec!(50));
    assert_eq!(fx.engine.balance(&fx.taker.id, &code("USD")).unwrap(), dec!(50));
}

#[test]
fn inverse_quote_is_normalised_to_giver_direction() {
    let fx = fixture();
    set_rate(&fx.store, "CAD", "USD", dec!(0.74));
    let request = TransferRequest::new(fx.giver.clone(), fx.taker.clone(), dec!(100), cad())
        .with_exchange(ExchangeInfo::new(code("USD"), RateQuote::Inverse(dec!(1.25))));
    let tx = fx.engine.apply(request).unwrap();
    let details = tx.exchange.unwrap();
    assert_eq!(details.custom_rate, dec!(0.8));
    assert_eq!(details.received_amount, dec!(80));
}

#[test]
fn validation_failures_leave_no_trace() {
    let fx = fixture();
    set_rate(&fx.store, "USD", "CAD", dec!(1.35));
    let stranger = Party::new(PartyId::new("x").unwrap(), "X", PartyRole::Middleman);
    let request = |amount: Decimal, currency: &str| {
        TransferRequest::new(fx.giver.clone(), fx.taker.clone(), amount, code(currency))
    };
    let rejected = |request: TransferRequest| {
        let err = fx.engine.apply(request).unwrap_err();
        assert!(!err.is_retryable());
        err
    };

    assert!(matches!(
        rejected(request(Decimal::ZERO, "CAD")),
        LedgerError::InvalidAmount(_)
    ));
    assert!(matches!(
        rejected(request(dec!(-5), "CAD")),
        LedgerError::InvalidAmount(_)
    ));
    assert!(matches!(
        rejected(TransferRequest::new(
            fx.giver.clone(),
            fx.giver.clone(),
            dec!(5),
            cad()
        )),
        LedgerError::SameParty(_)
    ));
    assert!(matches!(
        rejected(request(dec!(5), "GBP")),
        LedgerError::UnknownCurrency(_)
    ));
    assert!(matches!(
        rejected(TransferRequest::new(
            fx.giver.clone(),
            stranger,
            dec!(5),
            cad()
        )),
        LedgerError::UnknownParty(_)
    ));
    assert!(matches!(
        rejected(request(dec!(5), "USD").with_exchange(ExchangeInfo::new(code("USD"), dec!(1)))),
        LedgerError::SameCurrency(_)
    ));
    assert!(matches!(
        rejected(request(dec!(5), "USD").with_exchange(ExchangeInfo::new(code("GBP"), dec!(1)))),
        LedgerError::UnknownCurrency(_)
    ));
    assert!(matches!(
        rejected(request(dec!(5), "USD").with_exchange(ExchangeInfo::new(cad(), Decimal::ZERO))),
        LedgerError::InvalidRate(_)
    ));
    assert!(matches!(
        rejected(request(dec!(5), "USD").with_exchange(ExchangeInfo::new(
            cad(),
            RateQuote::Inverse(dec!(-2))
        ))),
        LedgerError::InvalidRate(_)
    ));

    assert_eq!(fx.engine.balances(&fx.giver.id).unwrap().get(&cad()), Decimal::ZERO);
    assert!(fx
        .store
        .query_transactions(TransactionQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn second_reversal_fails_with_not_found() {
    let fx = fixture();
    let tx = fx
        .engine
        .apply_transaction(&fx.giver, &fx.taker, dec!(3), &cad(), None)
        .unwrap();
    fx.engine.reverse_transaction(&tx).unwrap();
    let err = fx.engine.reverse_transaction(&tx).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(id) if id == tx.id));
    assert_eq!(fx.engine.balance(&fx.giver.id, &cad()).unwrap(), Decimal::ZERO);
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), Decimal::ZERO);
}

#[test]
fn reversal_uses_stored_amounts_not_current_rates() {
    let fx = fixture();
    set_rate(&fx.store, "USD", "CAD", dec!(1.35));
    let tx = fx
        .engine
        .apply_transaction(
            &fx.giver,
            &fx.taker,
            dec!(33.33),
            &code("USD"),
            Some(ExchangeInfo::new(cad(), dec!(1.3917))),
        )
        .unwrap();
    set_rate(&fx.store, "USD", "CAD", dec!(2));

    fx.engine.reverse_transaction(&tx).unwrap();
    assert_eq!(fx.engine.balance(&fx.giver.id, &code("USD")).unwrap(), Decimal::ZERO);
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), Decimal::ZERO);
}

#[test]
fn reverse_by_id_returns_the_removed_record() {
    let fx = fixture();
    set_rate(&fx.store, "EUR", "USD", dec!(1.08));
    let tx = fx
        .engine
        .apply_transaction(
            &fx.giver,
            &fx.taker,
            dec!(10),
            &code("EUR"),
            Some(ExchangeInfo::new(code("USD"), dec!(1.1))),
        )
        .unwrap();
    let removed = fx.engine.reverse_transaction_by_id(&tx.id).unwrap();
    assert_eq!(removed.credited_amount(), dec!(11));
    assert_eq!(fx.engine.balance(&fx.taker.id, &code("USD")).unwrap(), Decimal::ZERO);
}

#[test]
fn system_accounts_follow_the_same_rules() {
    let fx = fixture();
    let cash = Party::myself_cash();
    let bank = Party::myself_bank();
    fx.engine
        .apply_transaction(&fx.giver, &cash, dec!(250), &cad(), None)
        .unwrap();
    let deposit = fx
        .engine
        .apply_transaction(&cash, &bank, dec!(200), &cad(), None)
        .unwrap();
    assert_eq!(fx.engine.balance(&cash.id, &cad()).unwrap(), dec!(50));
    assert_eq!(fx.engine.balance(&bank.id, &cad()).unwrap(), dec!(200));

    fx.engine.reverse_transaction(&deposit).unwrap();
    assert_eq!(fx.engine.balance(&cash.id, &cad()).unwrap(), dec!(250));
    assert_eq!(fx.engine.balance(&bank.id, &cad()).unwrap(), Decimal::ZERO);
}

#[test]
fn failed_commit_is_retryable_and_has_no_effect() {
    let fx = fixture();
    fx.store.fail_next_commits(1);
    let err = fx
        .engine
        .apply_transaction(&fx.giver, &fx.taker, dec!(10), &cad(), None)
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), Decimal::ZERO);

    let tx = fx
        .engine
        .apply_transaction(&fx.giver, &fx.taker, dec!(10), &cad(), None)
        .unwrap();
    fx.store.fail_next_commits(1);
    assert!(fx.engine.reverse_transaction(&tx).unwrap_err().is_retryable());
    assert!(fx.store.transaction(&tx.id).unwrap().is_some());
    assert_eq!(fx.engine.balance(&fx.taker.id, &cad()).unwrap(), dec!(10));
}

#[test]
fn concurrent_transfers_do_not_lose_updates() {
    let fx = fixture();
    let engine = &fx.engine;
    let (giver, taker) = (&fx.giver, &fx.taker);
    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(move || {
                for _ in 0..50 {
                    engine
                        .apply_transaction(giver, taker, dec!(1.25), &cad(), None)
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(engine.balance(&giver.id, &cad()).unwrap(), dec!(-500));
    assert_eq!(engine.balance(&taker.id, &cad()).unwrap(), dec!(500));
}

#[test]
fn concurrent_reversals_apply_at_most_once() {
    let fx = fixture();
    let tx = fx
        .engine
        .apply_transaction(&fx.giver, &fx.taker, dec!(9), &cad(), None)
        .unwrap();
    let engine = &fx.engine;
    let outcomes: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| engine.reverse_transaction(&tx).is_ok()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(engine.balance(&fx.giver.id, &cad()).unwrap(), Decimal::ZERO);
    assert_eq!(engine.balance(&fx.taker.id, &cad()).unwrap(), Decimal::ZERO);
}

#[test]
fn sqlite_store_runs_the_full_cycle() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteBalanceStore::new(dir.path().join("cashbook.db")).unwrap());
    let engine = LedgerEngine::new(Arc::clone(&store));
    let giver = Party::new(PartyId::new("g").unwrap(), "Giver", PartyRole::Customer);
    store.upsert_party(&giver).unwrap();
    engine.add_currency(&Currency::new(code("USD"), "US$")).unwrap();
    engine
        .set_rate(&DirectRate::new(code("USD"), cad(), dec!(1.35)).unwrap())
        .unwrap();
    let cash = Party::myself_cash();

    let exchange = engine
        .apply_transaction(
            &giver,
            &cash,
            dec!(100),
            &code("USD"),
            Some(ExchangeInfo::new(cad(), dec!(1.40))),
        )
        .unwrap();
    assert_eq!(engine.balance(&giver.id, &code("USD")).unwrap(), dec!(-100));
    assert_eq!(engine.balance(&cash.id, &cad()).unwrap(), dec!(140));
    let stored = store.transaction(&exchange.id).unwrap().unwrap();
    assert_eq!(stored.snapshot, exchange.snapshot);

    let report = engine.compute_profit(Timeframe::AllTime).unwrap();
    assert_eq!(report.total_in_reference, dec!(5));

    engine.reverse_transaction(&exchange).unwrap();
    assert!(matches!(
        engine.reverse_transaction(&exchange),
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(engine.balance(&giver.id, &code("USD")).unwrap(), Decimal::ZERO);
    assert_eq!(engine.balance(&cash.id, &cad()).unwrap(), Decimal::ZERO);
}

#[test]
fn sqlite_store_serialises_concurrent_writers() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteBalanceStore::new(dir.path().join("cashbook.db")).unwrap());
    let engine = LedgerEngine::new(Arc::clone(&store));
    let giver = Party::new(PartyId::new("g").unwrap(), "Giver", PartyRole::Customer);
    store.upsert_party(&giver).unwrap();
    let cash = Party::myself_cash();

    thread::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            let (giver, cash) = (giver.clone(), cash.clone());
            scope.spawn(move || {
                for _ in 0..10 {
                    engine
                        .apply_transaction(&giver, &cash, dec!(2.5), &cad(), None)
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(engine.balance(&giver.id, &cad()).unwrap(), dec!(-100));
    assert_eq!(engine.balance(&cash.id, &cad()).unwrap(), dec!(100));
    assert_eq!(
        store
            .query_transactions(TransactionQuery::default().with_party(cash.id.clone()))
            .unwrap()
            .len(),
        40
    );
}
