//! Multi-currency ledger engine and its storage backends.
//!
//! [`LedgerEngine`] applies and reverses transactions between parties,
//! [`RateResolver`] looks up conversion rates from stored directional edges,
//! and [`ProfitAccountant`] recomputes exchange profit against current rates.
//! Persistence goes through the [`BalanceStore`] contract.

mod batch;
mod engine;
mod error;
mod memory;
mod profit;
mod query;
mod rates;
mod repository;
mod sqlite;

pub use batch::{BalanceAdjustment, BalanceSlot, CommitBatch, CommitReceipt};
pub use engine::{ExchangeInfo, LedgerEngine, TransferRequest};
pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryBalanceStore;
pub use profit::{ProfitAccountant, ProfitReport, Timeframe, Window};
pub use query::TransactionQuery;
pub use rates::{RateQuote, RateResolver};
pub use repository::{BalanceStore, RateSource};
pub use sqlite::SqliteBalanceStore;
