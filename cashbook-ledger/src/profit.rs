use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cashbook_core::{CurrencyCode, Transaction};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{LedgerResult, RateResolver, RateSource};

/// Calendar-aligned reporting window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeframe {
    #[default]
    AllTime,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
}

/// Half-open `[start, end)` interval; `None` bounds are open.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *ts >= start) && self.end.map_or(true, |end| *ts < end)
    }
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::AllTime => "all",
            Timeframe::ThisMonth => "this-month",
            Timeframe::LastMonth => "last-month",
            Timeframe::ThisYear => "this-year",
            Timeframe::LastYear => "last-year",
        }
    }

    /// Window boundaries using the calendar of `now`'s time zone.
    pub fn window<Tz: TimeZone>(self, now: &DateTime<Tz>) -> Window {
        let tz = now.timezone();
        let (year, month) = (now.year(), now.month());
        let (start, end) = match self {
            Timeframe::AllTime => return Window::default(),
            Timeframe::ThisMonth => ((year, month), next_month(year, month)),
            Timeframe::LastMonth => (previous_month(year, month), (year, month)),
            Timeframe::ThisYear => ((year, 1), (year + 1, 1)),
            Timeframe::LastYear => ((year - 1, 1), (year, 1)),
        };
        Window {
            start: month_start(&tz, start.0, start.1),
            end: month_start(&tz, end.0, end.1),
        }
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Step used to walk forward out of a DST gap.
const GAP_STEP_MINUTES: i64 = 15;

fn month_start<Tz: TimeZone>(tz: &Tz, year: i32, month: u32) -> Option<DateTime<Utc>> {
    let midnight = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    // A DST jump at midnight leaves no local midnight; take the first valid local instant.
    let steps = 24 * 60 / GAP_STEP_MINUTES;
    (0..=steps).find_map(|step| {
        let local = midnight + Duration::minutes(step * GAP_STEP_MINUTES);
        tz.from_local_datetime(&local)
            .earliest()
            .map(|instant| instant.with_timezone(&Utc))
    })
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "all-time" => Ok(Timeframe::AllTime),
            "this-month" => Ok(Timeframe::ThisMonth),
            "last-month" => Ok(Timeframe::LastMonth),
            "this-year" => Ok(Timeframe::ThisYear),
            "last-year" => Ok(Timeframe::LastYear),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// Realised exchange profit, grouped by receiving currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfitReport {
    pub per_currency: BTreeMap<CurrencyCode, Decimal>,
    pub reference_currency: CurrencyCode,
    /// Sum of every convertible currency's profit in `reference_currency`.
    pub total_in_reference: Decimal,
    /// Exchanges that contributed to the totals.
    pub counted: usize,
    /// Exchanges in the window whose current market rate could not be resolved.
    pub skipped: Vec<Uuid>,
    /// Exchanges left out because their profit exceeds the decimal range.
    pub overflowed: Vec<Uuid>,
    /// Currencies reported in `per_currency` but left out of the total.
    pub unconverted: Vec<CurrencyCode>,
}

/// Recomputes exchange profit against today's market rates.
///
/// This is a mark-to-market view: the same history yields different numbers
/// once stored rates change.
pub struct ProfitAccountant<'a, S: RateSource + ?Sized> {
    resolver: RateResolver<'a, S>,
    reference: CurrencyCode,
}

impl<'a, S: RateSource + ?Sized> ProfitAccountant<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            resolver: RateResolver::new(source),
            reference: CurrencyCode::cad(),
        }
    }

    pub fn with_reference(mut self, reference: CurrencyCode) -> Self {
        self.reference = reference;
        self
    }

    /// Profit over `timeframe` measured against the local calendar.
    pub fn compute_profit(
        &self,
        transactions: &[Transaction],
        timeframe: Timeframe,
    ) -> LedgerResult<ProfitReport> {
        self.compute_profit_at(transactions, timeframe, &Local::now())
    }

    pub fn compute_profit_at<Tz: TimeZone>(
        &self,
        transactions: &[Transaction],
        timeframe: Timeframe,
        now: &DateTime<Tz>,
    ) -> LedgerResult<ProfitReport> {
        let window = timeframe.window(now);
        let mut per_currency: BTreeMap<CurrencyCode, Decimal> = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut overflowed = Vec::new();
        let mut counted = 0;

        for tx in transactions {
            let Some(exchange) = &tx.exchange else {
                continue;
            };
            if !window.contains(&tx.timestamp) {
                continue;
            }
            let Some(market) = self
                .resolver
                .resolve(&tx.currency, &exchange.receiving_currency)?
            else {
                debug!(
                    tx = %tx.id,
                    from = %tx.currency,
                    to = %exchange.receiving_currency,
                    "skipping exchange without current rate"
                );
                skipped.push(tx.id);
                continue;
            };
            let running = per_currency
                .get(&exchange.receiving_currency)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let accumulated = exchange
                .custom_rate
                .checked_sub(market)
                .and_then(|spread| spread.checked_mul(tx.amount))
                .and_then(|profit| running.checked_add(profit));
            let Some(accumulated) = accumulated else {
                warn!(
                    tx = %tx.id,
                    amount = %tx.amount,
                    currency = %exchange.receiving_currency,
                    "exchange profit overflows decimal range; left out of report"
                );
                overflowed.push(tx.id);
                continue;
            };
            per_currency.insert(exchange.receiving_currency.clone(), accumulated);
            counted += 1;
        }

        let mut total_in_reference = Decimal::ZERO;
        let mut unconverted = Vec::new();
        for (currency, profit) in &per_currency {
            let converted = self.resolver.convert(*profit, currency, &self.reference)?;
            match converted.and_then(|value| total_in_reference.checked_add(value)) {
                Some(total) => total_in_reference = total,
                None => {
                    debug!(
                        %currency,
                        reference = %self.reference,
                        "profit left out of reference total"
                    );
                    unconverted.push(currency.clone());
                }
            }
        }

        Ok(ProfitReport {
            per_currency,
            reference_currency: self.reference.clone(),
            total_in_reference,
            counted,
            skipped,
            overflowed,
            unconverted,
        })
    }
}
