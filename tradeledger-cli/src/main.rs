//! TradeLedger CLI: ledger setup, position commands and rankings.
//!
//! Commands:
//! - `init`: create an empty ledger file
//! - `open`: open a position at the current quoted price
//! - `evaluate`: refresh every active position and apply stop-loss / take-profit
//! - `view`: print the whole ledger
//! - `show`: print a single position
//! - `ranking`: export the trailing-window per-user ranking

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tradeledger_core::{
    CsvLedgerStore, EvaluationReport, Position, PositionEngine, QuoteSource, StaticQuotes,
    TradeLedgerConfig, YahooQuoteSource,
};
use tradeledger_report::{rank_users, write_ranking};

#[derive(Parser)]
#[command(
    name = "tradeledger",
    about = "TradeLedger: paper positions with stop-loss / take-profit tracking"
)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger CSV file (overrides `ledger.path`).
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Offline price sheet (`ticker,price` CSV) used instead of Yahoo Finance.
    #[arg(long, global = true)]
    quotes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty ledger if none exists.
    Init,
    /// Open a position at the current quoted price.
    Open {
        /// User the position belongs to.
        user_id: String,

        /// Ticker symbol (e.g., AAPL).
        ticker: String,

        /// Stop-loss price. Below take-profit means long, otherwise short.
        #[arg(long, allow_negative_numbers = true)]
        stop_loss: f64,

        /// Take-profit price.
        #[arg(long, allow_negative_numbers = true)]
        take_profit: f64,
    },
    /// Re-quote every active position and close those past their thresholds.
    Evaluate,
    /// Print every position on the ledger.
    View {
        /// Only active positions.
        #[arg(long, default_value_t = false)]
        active: bool,
    },
    /// Print a single position.
    Show {
        /// Operation id.
        operation_id: u64,
    },
    /// Write the per-user ranking over the trailing window.
    Ranking {
        /// Window length in days (overrides `report.window_days`).
        #[arg(long)]
        window_days: Option<u32>,

        /// Output CSV (overrides `report.output`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// End of the window (YYYY-MM-DD, end of day). Defaults to now.
        #[arg(long)]
        as_of: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = CsvLedgerStore::new(&config.ledger.path);

    match cli.command {
        Commands::Init => run_init(&store),
        Commands::Open {
            user_id,
            ticker,
            stop_loss,
            take_profit,
        } => {
            let quotes = build_quotes(&config, cli.quotes.as_deref())?;
            let engine = PositionEngine::new(&store, quotes.as_ref(), config.engine_options());
            run_open(&engine, &user_id, &ticker, stop_loss, take_profit)
        }
        Commands::Evaluate => {
            let quotes = build_quotes(&config, cli.quotes.as_deref())?;
            let engine = PositionEngine::new(&store, quotes.as_ref(), config.engine_options());
            run_evaluate(&engine)
        }
        Commands::View { active } => run_view(&store, active),
        Commands::Show { operation_id } => run_show(&store, operation_id),
        Commands::Ranking {
            window_days,
            output,
            as_of,
        } => run_ranking(
            &store,
            window_days.unwrap_or(config.report.window_days),
            output.unwrap_or_else(|| config.report.output.clone()),
            as_of.as_deref(),
        ),
    }
}

fn load_config(cli: &Cli) -> Result<TradeLedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => TradeLedgerConfig::from_file(path)?,
        None => TradeLedgerConfig::default(),
    };
    if let Some(ledger) = &cli.ledger {
        config.ledger.path = ledger.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_quotes(
    config: &TradeLedgerConfig,
    sheet: Option<&std::path::Path>,
) -> Result<Box<dyn QuoteSource>> {
    if let Some(path) = sheet {
        let quotes = StaticQuotes::from_csv(path)?;
        info!("Using price sheet {} ({} tickers)", path.display(), quotes.len());
        return Ok(Box::new(quotes));
    }
    let breaker = config.quotes.circuit_breaker();
    Ok(Box::new(YahooQuoteSource::new(breaker, config.quotes.timeout())?))
}

fn run_init(store: &CsvLedgerStore) -> Result<()> {
    if store.init()? {
        println!("Created empty ledger at {}", store.path().display());
    } else {
        println!("Ledger already exists at {}", store.path().display());
    }
    Ok(())
}

fn run_open(
    engine: &PositionEngine<'_>,
    user_id: &str,
    ticker: &str,
    stop_loss: f64,
    take_profit: f64,
) -> Result<()> {
    let position = engine
        .open(user_id, ticker, stop_loss, take_profit)
        .with_context(|| format!("failed to open {ticker} for {user_id}"))?;
    print_position(&position);
    Ok(())
}

fn run_evaluate(engine: &PositionEngine<'_>) -> Result<()> {
    let report = engine.evaluate().context("evaluation failed")?;
    print_evaluation(&report);

    if !report.all_succeeded() {
        for skipped in &report.skipped {
            eprintln!(
                "Error for #{} {}: {}",
                skipped.operation_id, skipped.ticker, skipped.error
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_view(store: &CsvLedgerStore, active_only: bool) -> Result<()> {
    let positions = tradeledger_core::Ledger::load(store)?.into_positions();
    let rows: Vec<&Position> = positions
        .iter()
        .filter(|p| !active_only || p.is_active())
        .collect();

    if rows.is_empty() {
        println!("No positions in {}", store.path().display());
        return Ok(());
    }

    println!(
        "{:>5}  {:<12} {:<8} {:<5} {:>10} {:>10} {:>9} {:>10} {:>10}  {:<6} {:<19}",
        "ID", "User", "Ticker", "Side", "Bought", "Current", "P/L %", "SL", "TP", "Status", "Entered"
    );
    println!("{}", "-".repeat(118));
    for p in rows {
        println!(
            "{:>5}  {:<12} {:<8} {:<5} {:>10.4} {:>10.4} {:>+9.2} {:>10.4} {:>10.4}  {:<6} {:<19}",
            p.operation_id,
            p.user_id,
            p.ticker,
            p.operation.to_string(),
            p.price_purchased,
            p.current_price,
            p.profitability,
            p.stop_loss,
            p.take_profit,
            status_label(p),
            p.timestamp_entry.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

fn run_show(store: &CsvLedgerStore, operation_id: u64) -> Result<()> {
    let ledger = tradeledger_core::Ledger::load(store)?;
    let position = ledger
        .get(operation_id)
        .with_context(|| format!("operation {operation_id} not found in ledger"))?;
    print_position(position);
    Ok(())
}

fn run_ranking(
    store: &CsvLedgerStore,
    window_days: u32,
    output: PathBuf,
    as_of: Option<&str>,
) -> Result<()> {
    anyhow::ensure!(window_days > 0, "--window-days must be at least 1");

    let as_of = match as_of {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of date '{s}'"))?
            .and_hms_opt(23, 59, 59)
            .context("invalid --as-of time")?,
        None => chrono::Local::now().naive_local(),
    };

    let positions = tradeledger_core::Ledger::load(store)?.into_positions();
    let ranking = rank_users(&positions, as_of, window_days);
    if ranking.is_empty() {
        warn!("No positions opened in the last {window_days} days");
    }
    write_ranking(&output, &ranking)?;

    println!();
    println!("=== Ranking ({window_days} days to {}) ===", as_of.format("%Y-%m-%d"));
    for row in &ranking {
        println!(
            "{:<16} {:>14.4}  ({} positions)",
            row.user_id, row.profitability, row.positions
        );
    }
    println!("Saved to: {}", output.display());
    Ok(())
}

fn status_label(p: &Position) -> &'static str {
    if p.is_active() {
        "active"
    } else {
        "closed"
    }
}

fn print_position(p: &Position) {
    println!();
    println!("=== Position #{} ===", p.operation_id);
    println!("User:           {}", p.user_id);
    println!("Ticker:         {}", p.ticker);
    println!("Side:           {}", p.operation);
    println!("Status:         {}", status_label(p));
    println!("Entered:        {}", p.timestamp_entry.format("%Y-%m-%d %H:%M:%S"));
    if let Some(exit) = p.timestamp_exit {
        println!("Exited:         {}", exit.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("Bought:         {:.4}", p.price_purchased);
    println!("Current:        {:.4}", p.current_price);
    println!("Profitability:  {:+.2}%", p.profitability);
    println!("Stop Loss:      {}", p.stop_loss);
    println!("Take Profit:    {}", p.take_profit);
}

fn print_evaluation(report: &EvaluationReport) {
    println!();
    println!(
        "=== Evaluation at {} ===",
        report.evaluated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("Evaluated:      {}", report.evaluated());
    println!("Held:           {}", report.held.len());
    println!("Closed:         {}", report.closed.len());
    println!("Skipped:        {}", report.skipped.len());
    for c in &report.closed {
        println!(
            "  #{} {} closed on {} ({:+.2}%)",
            c.operation_id, c.ticker, c.reason, c.profitability
        );
    }
}
