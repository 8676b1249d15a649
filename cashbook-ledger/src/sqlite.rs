use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cashbook_core::{
    Balances, Currency, CurrencyCode, DirectRate, Party, PartyId, PartyRole, Transaction,
};
use chrono::SecondsFormat;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    BalanceSlot, BalanceStore, CommitBatch, CommitReceipt, LedgerError, LedgerResult, RateSource,
    TransactionQuery,
};

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parties (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL,
    cad_balance TEXT NOT NULL DEFAULT '0'
);
CREATE TABLE IF NOT EXISTS keyed_balances (
    party_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (party_id, currency)
);
CREATE TABLE IF NOT EXISTS currencies (
    code TEXT PRIMARY KEY,
    symbol TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS direct_rates (
    from_currency TEXT NOT NULL,
    to_currency TEXT NOT NULL,
    rate TEXT NOT NULL,
    PRIMARY KEY (from_currency, to_currency)
);
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    giver_id TEXT NOT NULL,
    taker_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    is_exchange INTEGER NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_idx_giver ON transactions(giver_id);
CREATE INDEX IF NOT EXISTS transactions_idx_taker ON transactions(taker_id);
CREATE INDEX IF NOT EXISTS transactions_idx_exchange ON transactions(is_exchange, timestamp);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store. Every commit runs in a `BEGIN IMMEDIATE` transaction,
/// so balance reads and writes of one batch cannot interleave with another writer.
#[derive(Clone, Debug)]
pub struct SqliteBalanceStore {
    path: PathBuf,
}

impl SqliteBalanceStore {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let store = Self { path: path.into() };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        for party in [Party::myself_cash(), Party::myself_bank()] {
            conn.execute(
                "INSERT OR IGNORE INTO parties (id, name, role) VALUES (?1, ?2, ?3)",
                params![party.id.as_str(), party.name, party.role.as_str()],
            )?;
        }
        let cad = Currency::cad();
        conn.execute(
            "INSERT OR IGNORE INTO currencies (code, symbol) VALUES (?1, ?2)",
            params![cad.code.as_str(), cad.symbol],
        )?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }
}

impl RateSource for SqliteBalanceStore {
    fn direct_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> LedgerResult<Option<Decimal>> {
        let conn = self.connect()?;
        let rate: Option<String> = conn
            .query_row(
                "SELECT rate FROM direct_rates WHERE from_currency = ?1 AND to_currency = ?2",
                params![from.as_str(), to.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        rate.map(|value| parse_decimal(&value)).transpose()
    }

    fn set_rate(&self, rate: &DirectRate) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO direct_rates (from_currency, to_currency, rate) VALUES (?1, ?2, ?3)
             ON CONFLICT(from_currency, to_currency) DO UPDATE SET rate = excluded.rate",
            params![rate.from.as_str(), rate.to.as_str(), rate.rate.to_string()],
        )?;
        Ok(())
    }

    fn rates(&self) -> LedgerResult<Vec<DirectRate>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT from_currency, to_currency, rate FROM direct_rates
             ORDER BY from_currency, to_currency",
        )?;
        let mut rows = stmt.query([])?;
        let mut rates = Vec::new();
        while let Some(row) = rows.next()? {
            let from: String = row.get(0)?;
            let to: String = row.get(1)?;
            let rate: String = row.get(2)?;
            rates.push(DirectRate {
                from: CurrencyCode::new(from)?,
                to: CurrencyCode::new(to)?,
                rate: parse_decimal(&rate)?,
            });
        }
        Ok(rates)
    }
}

impl BalanceStore for SqliteBalanceStore {
    fn party(&self, id: &PartyId) -> LedgerResult<Option<Party>> {
        let conn = self.connect()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT name, role FROM parties WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(name, role)| -> LedgerResult<Party> {
            Ok(Party::new(id.clone(), name, PartyRole::from_str(&role)?))
        })
        .transpose()
    }

    fn upsert_party(&self, party: &Party) -> LedgerResult<()> {
        if party.is_system() {
            return Err(LedgerError::ReservedParty(party.id.clone()));
        }
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO parties (id, name, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
            params![party.id.as_str(), party.name, party.role.as_str()],
        )?;
        Ok(())
    }

    fn parties(&self) -> LedgerResult<Vec<Party>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name, role FROM parties ORDER BY id")?;
        let mut rows = stmt.query([])?;
        let mut parties = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let role: String = row.get(2)?;
            parties.push(Party::new(PartyId::new(id)?, name, PartyRole::from_str(&role)?));
        }
        Ok(parties)
    }

    fn currency_exists(&self, code: &CurrencyCode) -> LedgerResult<bool> {
        if code.is_reference() {
            return Ok(true);
        }
        let conn = self.connect()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM currencies WHERE code = ?1",
                params![code.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn add_currency(&self, currency: &Currency) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO currencies (code, symbol) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET symbol = excluded.symbol",
            params![currency.code.as_str(), currency.symbol],
        )?;
        Ok(())
    }

    fn currencies(&self) -> LedgerResult<Vec<Currency>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT code, symbol FROM currencies ORDER BY code")?;
        let mut rows = stmt.query([])?;
        let mut currencies = Vec::new();
        while let Some(row) = rows.next()? {
            let code: String = row.get(0)?;
            let symbol: String = row.get(1)?;
            currencies.push(Currency::new(CurrencyCode::new(code)?, symbol));
        }
        Ok(currencies)
    }

    fn balances(&self, party: &PartyId) -> LedgerResult<Balances> {
        let conn = self.connect()?;
        let cad: Option<String> = conn
            .query_row(
                "SELECT cad_balance FROM parties WHERE id = ?1",
                params![party.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let cad = cad.ok_or_else(|| LedgerError::UnknownParty(party.clone()))?;

        let mut balances = Balances::new();
        let mut stmt =
            conn.prepare("SELECT currency, amount FROM keyed_balances WHERE party_id = ?1")?;
        let mut rows = stmt.query(params![party.as_str()])?;
        while let Some(row) = rows.next()? {
            let currency: String = row.get(0)?;
            let amount: String = row.get(1)?;
            balances.set(CurrencyCode::new(currency)?, parse_decimal(&amount)?);
        }
        if !party.is_system() {
            balances.set(CurrencyCode::cad(), parse_decimal(&cad)?);
        }
        Ok(balances)
    }

    fn transaction(&self, id: &Uuid) -> LedgerResult<Option<Transaction>> {
        let conn = self.connect()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM transactions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|json| serde_json::from_str(&json).map_err(LedgerError::from))
            .transpose()
    }

    fn query_transactions(&self, query: TransactionQuery) -> LedgerResult<Vec<Transaction>> {
        let conn = self.connect()?;
        let mut sql = String::from(
            "SELECT payload FROM transactions
             WHERE (?1 IS NULL OR giver_id = ?1 OR taker_id = ?1)
               AND (?2 IS NULL OR giver_id = ?2)
               AND (?3 IS NULL OR taker_id = ?3)
               AND (?4 IS NULL OR currency = ?4)
               AND (?5 IS NULL OR is_exchange = ?5)",
        );
        sql.push_str(if query.ascending {
            " ORDER BY timestamp ASC, id ASC"
        } else {
            " ORDER BY timestamp DESC, id DESC"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?6");
        }

        let mut params: Vec<Value> = Vec::with_capacity(6);
        params.push(optional_text(query.party.map(String::from)));
        params.push(optional_text(query.giver.map(String::from)));
        params.push(optional_text(query.taker.map(String::from)));
        params.push(optional_text(query.currency.map(String::from)));
        params.push(
            query
                .is_exchange
                .map(|flag| Value::Integer(flag as i64))
                .unwrap_or(Value::Null),
        );
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            transactions.push(serde_json::from_str(&payload)?);
        }
        Ok(transactions)
    }

    fn commit(&self, batch: CommitBatch) -> LedgerResult<CommitReceipt> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(commit_failed)?;

        for id in &batch.delete {
            let removed = tx
                .execute(
                    "DELETE FROM transactions WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(commit_failed)?;
            if removed == 0 {
                return Err(LedgerError::NotFound(*id));
            }
        }

        let mut receipt = CommitReceipt::default();
        for adjustment in &batch.adjustments {
            let party = &adjustment.party;
            let currency = &adjustment.currency;
            let current = match receipt.balance(party, currency) {
                Some(value) => value,
                None => read_slot(&tx, party, currency)?,
            };
            let next = current.checked_add(adjustment.delta).ok_or_else(|| {
                LedgerError::CommitFailed(format!("balance overflow for {party} in {currency}"))
            })?;
            write_slot(&tx, party, currency, next)?;
            receipt.record(party, currency, next);
        }

        for mut record in batch.create {
            record.snapshot = receipt.snapshot_for(&record);
            let payload = serde_json::to_string(&record)?;
            tx.execute(
                "INSERT INTO transactions (
                    id, timestamp, giver_id, taker_id, currency, is_exchange, payload
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                    record.giver.id.as_str(),
                    record.taker.id.as_str(),
                    record.currency.as_str(),
                    record.is_exchange() as i64,
                    payload,
                ],
            )
            .map_err(commit_failed)?;
        }

        tx.commit().map_err(commit_failed)?;
        Ok(receipt)
    }
}

fn read_slot(
    tx: &rusqlite::Transaction<'_>,
    party: &PartyId,
    currency: &CurrencyCode,
) -> LedgerResult<Decimal> {
    let cad: Option<String> = tx
        .query_row(
            "SELECT cad_balance FROM parties WHERE id = ?1",
            params![party.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(commit_failed)?;
    let cad = cad.ok_or_else(|| LedgerError::UnknownParty(party.clone()))?;
    match BalanceSlot::locate(party, currency) {
        BalanceSlot::Scalar => parse_decimal(&cad),
        BalanceSlot::Keyed => {
            let amount: Option<String> = tx
                .query_row(
                    "SELECT amount FROM keyed_balances WHERE party_id = ?1 AND currency = ?2",
                    params![party.as_str(), currency.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(commit_failed)?;
            amount
                .map(|value| parse_decimal(&value))
                .unwrap_or(Ok(Decimal::ZERO))
        }
    }
}

fn write_slot(
    tx: &rusqlite::Transaction<'_>,
    party: &PartyId,
    currency: &CurrencyCode,
    value: Decimal,
) -> LedgerResult<()> {
    let written = match BalanceSlot::locate(party, currency) {
        BalanceSlot::Scalar => tx.execute(
            "UPDATE parties SET cad_balance = ?2 WHERE id = ?1",
            params![party.as_str(), value.to_string()],
        ),
        BalanceSlot::Keyed => tx.execute(
            "INSERT INTO keyed_balances (party_id, currency, amount) VALUES (?1, ?2, ?3)
             ON CONFLICT(party_id, currency) DO UPDATE SET amount = excluded.amount",
            params![party.as_str(), currency.as_str(), value.to_string()],
        ),
    };
    written.map_err(commit_failed)?;
    Ok(())
}

fn commit_failed(err: rusqlite::Error) -> LedgerError {
    LedgerError::CommitFailed(err.to_string())
}

fn parse_decimal(value: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {value}: {err}")))
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn customer(id: &str) -> Party {
        Party::new(PartyId::new(id).unwrap(), id, PartyRole::Customer)
    }

    #[test]
    fn schema_seeds_system_parties_and_cad() {
        let dir = tempdir().unwrap();
        let store = SqliteBalanceStore::new(dir.path().join("ledger.db")).unwrap();
        let parties = store.parties().unwrap();
        assert_eq!(parties.len(), 2);
        assert!(parties.iter().all(Party::is_system));
        assert_eq!(store.currencies().unwrap(), vec![Currency::cad()]);
    }

    #[test]
    fn system_parties_keep_their_seeded_row() {
        let dir = tempdir().unwrap();
        let store = SqliteBalanceStore::new(dir.path().join("ledger.db")).unwrap();
        let impostor = Party::new(PartyId::myself_bank(), "X", PartyRole::Supplier);
        let err = store.upsert_party(&impostor).unwrap_err();
        assert!(matches!(err, LedgerError::ReservedParty(_)));
        let kept = store.party(&PartyId::myself_bank()).unwrap().unwrap();
        assert_eq!(kept.role, PartyRole::System);
        assert_ne!(kept.name, "X");
    }

    #[test]
    fn reopening_keeps_balances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let party = customer("c1");
        let usd = CurrencyCode::new("USD").unwrap();
        {
            let store = SqliteBalanceStore::new(&path).unwrap();
            store.upsert_party(&party).unwrap();
            store
                .commit(
                    CommitBatch::new()
                        .adjust(&party.id, &CurrencyCode::cad(), dec!(12.5))
                        .adjust(&party.id, &usd, dec!(-3)),
                )
                .unwrap();
        }
        let store = SqliteBalanceStore::new(&path).unwrap();
        let balances = store.balances(&party.id).unwrap();
        assert_eq!(balances.get(&CurrencyCode::cad()), dec!(12.5));
        assert_eq!(balances.get(&usd), dec!(-3));
    }

    #[test]
    fn failed_delete_rolls_back_adjustments() {
        let dir = tempdir().unwrap();
        let store = SqliteBalanceStore::new(dir.path().join("ledger.db")).unwrap();
        let cash = PartyId::myself_cash();
        store
            .commit(CommitBatch::new().adjust(&cash, &CurrencyCode::cad(), dec!(7)))
            .unwrap();
        let err = store
            .commit(
                CommitBatch::new()
                    .adjust(&cash, &CurrencyCode::cad(), dec!(100))
                    .delete(Uuid::new_v4()),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(store.balance(&cash, &CurrencyCode::cad()).unwrap(), dec!(7));
    }

    #[test]
    fn query_filters_and_orders_records() {
        let dir = tempdir().unwrap();
        let store = SqliteBalanceStore::new(dir.path().join("ledger.db")).unwrap();
        let a = customer("a");
        let b = customer("b");
        store.upsert_party(&a).unwrap();
        store.upsert_party(&b).unwrap();
        let cash = Party::myself_cash();

        let first = Transaction::new(
            &a,
            &cash,
            dec!(1),
            CurrencyCode::cad(),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        );
        let second = Transaction::new(
            &cash,
            &b,
            dec!(2),
            CurrencyCode::cad(),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
        );
        store
            .commit(CommitBatch::new().create(first.clone()).create(second.clone()))
            .unwrap();

        let all = store.query_transactions(TransactionQuery::default()).unwrap();
        assert_eq!(
            all.iter().map(|tx| tx.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        let for_a = store
            .query_transactions(TransactionQuery::default().with_party(a.id.clone()))
            .unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].id, first.id);
        let exchanges = store
            .query_transactions(TransactionQuery::default().exchanges_only())
            .unwrap();
        assert!(exchanges.is_empty());
        let limited = store
            .query_transactions(TransactionQuery::default().ascending().with_limit(1))
            .unwrap();
        assert_eq!(limited[0].id, first.id);
    }

    #[test]
    fn rates_are_directional() {
        let dir = tempdir().unwrap();
        let store = SqliteBalanceStore::new(dir.path().join("ledger.db")).unwrap();
        let usd = CurrencyCode::new("USD").unwrap();
        store
            .set_rate(&DirectRate::new(usd.clone(), CurrencyCode::cad(), dec!(1.35)).unwrap())
            .unwrap();
        assert_eq!(
            store.direct_rate(&usd, &CurrencyCode::cad()).unwrap(),
            Some(dec!(1.35))
        );
        assert_eq!(store.direct_rate(&CurrencyCode::cad(), &usd).unwrap(), None);
        store
            .set_rate(&DirectRate::new(usd.clone(), CurrencyCode::cad(), dec!(1.37)).unwrap())
            .unwrap();
        assert_eq!(store.rates().unwrap().len(), 1);
    }
}
