use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cashbook_config::{AppConfig, StoreBackend};
use cashbook_core::{Currency, CurrencyCode, DirectRate, Party, PartyId, PartyRole, Transaction};
use cashbook_ledger::{
    BalanceStore, ExchangeInfo, LedgerEngine, MemoryBalanceStore, RateQuote, RateSource,
    SqliteBalanceStore, Timeframe, TransactionQuery, TransferRequest,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::telemetry::init_tracing;

type Engine = LedgerEngine<dyn BalanceStore>;

#[derive(Parser, Debug)]
#[command(name = "cashbook", version, about = "Multi-currency cash ledger")]
pub struct Cli {
    /// Optional TOML settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the SQLite database path
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Override the storage backend. `memory` starts empty on every run, so it
    /// only suits previews such as `config` and `rate get CAD CAD`
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BackendArg {
    /// Empty throwaway ledger, discarded on exit
    Memory,
    /// Persistent ledger file (default)
    Sqlite,
}

impl From<BackendArg> for StoreBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Memory => StoreBackend::Memory,
            BackendArg::Sqlite => StoreBackend::Sqlite,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage counterparties
    Party {
        #[command(subcommand)]
        action: PartyCommand,
    },
    /// Manage known currencies
    Currency {
        #[command(subcommand)]
        action: CurrencyCommand,
    },
    /// Manage directional market rates
    Rate {
        #[command(subcommand)]
        action: RateCommand,
    },
    /// Move money between two parties in one currency
    Transfer(TransferArgs),
    /// Pay in one currency and credit the taker in another at a custom rate
    Exchange(ExchangeArgs),
    /// Undo a stored transaction
    Reverse { id: Uuid },
    /// Show every balance held by a party
    Balances { party: PartyId },
    /// List stored transactions, newest first
    History(HistoryArgs),
    /// Exchange profit measured against current market rates
    Profit(ProfitArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum PartyCommand {
    Add {
        id: PartyId,
        name: String,
        #[arg(long, default_value = "customer")]
        role: PartyRole,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum CurrencyCommand {
    Add {
        code: CurrencyCode,
        #[arg(long, default_value = "")]
        symbol: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum RateCommand {
    /// Store the market rate for one direction
    Set {
        from: CurrencyCode,
        to: CurrencyCode,
        rate: Decimal,
    },
    /// Resolve a rate, inverting the opposite edge when needed
    Get { from: CurrencyCode, to: CurrencyCode },
    List,
}

#[derive(Args, Debug)]
struct TransferArgs {
    #[arg(long)]
    from: PartyId,
    #[arg(long)]
    to: PartyId,
    #[arg(long)]
    amount: Decimal,
    #[arg(long, default_value = "CAD")]
    currency: CurrencyCode,
}

#[derive(Args, Debug)]
struct ExchangeArgs {
    #[command(flatten)]
    transfer: TransferArgs,
    /// Currency credited to the taker
    #[arg(long)]
    receive: CurrencyCode,
    /// Agreed rate, giving currency -> receiving currency
    #[arg(long)]
    rate: Decimal,
    /// Treat --rate as quoted receiving -> giving
    #[arg(long)]
    inverse: bool,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long)]
    party: Option<PartyId>,
    #[arg(long)]
    currency: Option<CurrencyCode>,
    #[arg(long, conflicts_with = "transfers")]
    exchanges: bool,
    #[arg(long)]
    transfers: bool,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ProfitArgs {
    /// all, this-month, last-month, this-year or last-year
    #[arg(long, default_value = "all")]
    timeframe: Timeframe,
    #[arg(long)]
    json: bool,
}

pub fn run() -> Result<()> {
    execute(Cli::parse())
}

pub fn execute(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.db {
        config.store.path = path;
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Config => show_config(&config),
        command => {
            let engine = open_engine(&config)?;
            dispatch(&engine, &config, command)
        }
    }
}

fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn open_engine(config: &AppConfig) -> Result<Engine> {
    let store: Arc<dyn BalanceStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("memory backend holds no data from earlier runs and keeps nothing on exit");
            Arc::new(MemoryBalanceStore::new())
        }
        StoreBackend::Sqlite => Arc::new(
            SqliteBalanceStore::new(config.store.path.clone()).with_context(|| {
                format!("failed to open ledger at {}", config.store.path.display())
            })?,
        ),
    };
    info!(backend = ?config.store.backend, "ledger store ready");
    Ok(LedgerEngine::new(store))
}

fn dispatch(engine: &Engine, config: &AppConfig, command: Command) -> Result<()> {
    match command {
        Command::Party { action } => party(engine, action),
        Command::Currency { action } => currency(engine, action),
        Command::Rate { action } => rate(engine, action),
        Command::Transfer(args) => {
            let request = transfer_request(engine, &args)?;
            let tx = engine.apply(request)?;
            println!("{}", describe(&tx));
            Ok(())
        }
        Command::Exchange(args) => {
            let quote = if args.inverse {
                RateQuote::Inverse(args.rate)
            } else {
                RateQuote::Forward(args.rate)
            };
            let request = transfer_request(engine, &args.transfer)?
                .with_exchange(ExchangeInfo::new(args.receive, quote));
            let tx = engine.apply(request)?;
            println!("{}", describe(&tx));
            Ok(())
        }
        Command::Reverse { id } => {
            let removed = engine.reverse_transaction_by_id(&id)?;
            println!("reversed {}", describe(&removed));
            Ok(())
        }
        Command::Balances { party } => {
            let balances = engine.balances(&party)?;
            if balances.is_empty() {
                println!("{party}: no balances");
            }
            for (code, amount) in balances.iter() {
                println!("{code} {amount}");
            }
            Ok(())
        }
        Command::History(args) => history(engine, args),
        Command::Profit(args) => {
            let report =
                engine.compute_profit_in(args.timeframe, config.ledger.reference_currency.clone())?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!(
                "profit ({}) over {} exchange(s)",
                args.timeframe, report.counted
            );
            for (code, amount) in &report.per_currency {
                println!("  {code} {amount}");
            }
            println!(
                "total {} {}",
                report.total_in_reference, report.reference_currency
            );
            if !report.skipped.is_empty() {
                println!("skipped {} exchange(s) with no market rate", report.skipped.len());
            }
            if !report.overflowed.is_empty() {
                println!("left out {} exchange(s) too large to total", report.overflowed.len());
            }
            if !report.unconverted.is_empty() {
                let codes: Vec<&str> = report.unconverted.iter().map(|c| c.as_str()).collect();
                println!("not converted: {}", codes.join(", "));
            }
            Ok(())
        }
        Command::Config => show_config(config),
    }
}

fn party(engine: &Engine, action: PartyCommand) -> Result<()> {
    let store = engine.store();
    match action {
        PartyCommand::Add { id, name, role } => {
            if role == PartyRole::System {
                bail!("system accounts are built in and cannot be added");
            }
            let party = Party::new(id, name, role);
            store.upsert_party(&party)?;
            println!("saved {} ({})", party.id, party.role);
        }
        PartyCommand::List => {
            for party in store.parties()? {
                println!("{}\t{}\t{}", party.id, party.role, party.name);
            }
        }
    }
    Ok(())
}

fn currency(engine: &Engine, action: CurrencyCommand) -> Result<()> {
    match action {
        CurrencyCommand::Add { code, symbol } => {
            engine.add_currency(&Currency::new(code.clone(), symbol))?;
            println!("saved {code}");
        }
        CurrencyCommand::List => {
            for currency in engine.store().currencies()? {
                println!("{}\t{}", currency.code, currency.symbol);
            }
        }
    }
    Ok(())
}

fn rate(engine: &Engine, action: RateCommand) -> Result<()> {
    match action {
        RateCommand::Set { from, to, rate } => {
            let edge = DirectRate::new(from, to, rate)?;
            engine.set_rate(&edge)?;
            println!("{} -> {} = {}", edge.from, edge.to, edge.rate);
        }
        RateCommand::Get { from, to } => match engine.resolve_rate(&from, &to)? {
            Some(rate) => println!("{from} -> {to} = {rate}"),
            None => bail!("no rate available for {from} -> {to}"),
        },
        RateCommand::List => {
            for edge in engine.store().rates()? {
                println!("{} -> {} = {}", edge.from, edge.to, edge.rate);
            }
        }
    }
    Ok(())
}

fn history(engine: &Engine, args: HistoryArgs) -> Result<()> {
    let mut query = TransactionQuery::default();
    if let Some(party) = args.party {
        query = query.with_party(party);
    }
    if let Some(currency) = args.currency {
        query = query.with_currency(currency);
    }
    if args.exchanges {
        query = query.exchanges_only();
    } else if args.transfers {
        query = query.transfers_only();
    }
    if let Some(limit) = args.limit {
        query = query.with_limit(limit);
    }
    let transactions = engine.store().query_transactions(query)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }
    for tx in &transactions {
        println!("{}", describe(tx));
    }
    Ok(())
}

fn transfer_request(engine: &Engine, args: &TransferArgs) -> Result<TransferRequest> {
    let giver = lookup_party(engine, &args.from)?;
    let taker = lookup_party(engine, &args.to)?;
    Ok(TransferRequest::new(
        giver,
        taker,
        args.amount,
        args.currency.clone(),
    ))
}

fn lookup_party(engine: &Engine, id: &PartyId) -> Result<Party> {
    match engine.store().party(id)? {
        Some(party) => Ok(party),
        None => bail!("unknown party '{id}'"),
    }
}

fn describe(tx: &Transaction) -> String {
    let mut line = format!(
        "{} {} {} -> {} {} {}",
        tx.id,
        tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
        tx.giver.id,
        tx.taker.id,
        tx.amount,
        tx.currency
    );
    if let Some(exchange) = &tx.exchange {
        line.push_str(&format!(
            " => {} {} @ {}",
            exchange.received_amount, exchange.receiving_currency, exchange.custom_rate
        ));
    }
    line
}
