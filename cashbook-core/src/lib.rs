//! Core domain types shared by every Cashbook component.

mod balances;
mod currency;
mod error;
mod party;
mod rate;
mod transaction;

pub use balances::Balances;
pub use currency::{Currency, CurrencyCode, REFERENCE_CURRENCY};
pub use error::{CoreError, CoreResult};
pub use party::{Party, PartyId, PartyRef, PartyRole};
pub use rate::DirectRate;
pub use transaction::{BalanceSnapshot, ExchangeDetails, Transaction};
