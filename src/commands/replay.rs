//! Replay command implementation

use anyhow::{Context, Result};
use ledger_replay::account::{Account, CashAccount, Ledger, MarginAccount};
use ledger_replay::config::AccountKind;
use ledger_replay::data::{self, PriceSeries};
use ledger_replay::{Config, HistoricalData, Simulation};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub fn run(
    config_path: String,
    start_override: Option<String>,
    end_override: Option<String>,
    cash_override: Option<f64>,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Starting replay");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(cash) = cash_override {
        info!("Overriding initial cash to: {:.2}", cash);
        config.account.initial_cash = cash;
    }

    if let Some(start) = start_override {
        info!("Overriding start date to: {}", start);
        config.simulation.start_date = Some(start);
    }

    if let Some(end) = end_override {
        info!("Overriding end date to: {}", end);
        config.simulation.end_date = Some(end);
    }

    info!("Loading data from: {}", config.data.data_dir);
    let symbols = config.data.symbols();
    debug!("Symbols: {:?}", symbols);

    let prices = data::load_multi_symbol(&config.data.data_dir, &symbols)?;
    info!(
        "Loaded {} timestamps for {} symbols",
        prices.len(),
        prices.symbols().len()
    );

    let ledger = Ledger::new(config.account.initial_cash);
    match config.account.kind {
        AccountKind::Cash => replay(&config, prices, CashAccount::from_ledger(ledger), output),
        AccountKind::Margin => {
            config
                .account
                .margin_requirements
                .validate()
                .context("Invalid margin requirements")?;
            let account = MarginAccount::from_ledger(ledger)
                .with_margin_balance(config.account.margin_balance)
                .with_requirements(config.account.margin_requirements);
            replay(&config, prices, account, output)
        }
    }
}

fn replay<A: Account>(
    config: &Config,
    prices: PriceSeries,
    account: A,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut sim = Simulation::new(
        prices,
        account,
        config.simulation.start()?,
        config.simulation.end()?,
    )?
    .with_day_order_expiry(config.simulation.expire_day_orders);

    let first_timestamp = sim.data().time_axis()[sim.current_time_index()];
    for order in config.orders()? {
        sim.submit_order(order.with_timestamp(first_timestamp))?;
    }
    info!("Submitted {} orders", sim.account().oms().len());

    info!("Running replay...");
    let reports = sim.run()?;

    let fills: usize = reports.iter().map(|report| report.fills.len()).sum();
    let expired: usize = reports.iter().map(|report| report.expired.len()).sum();
    let issues: usize = reports.iter().map(|report| report.issues.len()).sum();
    if issues > 0 {
        warn!("{} step issues reported during replay", issues);
    }

    let account = sim.account();
    println!("\n{}", "=".repeat(60));
    println!("REPLAY RESULTS");
    println!("{}", "=".repeat(60));
    println!("Steps:              {}", reports.len());
    println!("Initial Cash:       {:.2}", account.ledger().initial_cash());
    println!("Final Cash:         {:.2}", account.cash());
    match sim.performance_history().last() {
        Some(record) => {
            println!("Final Equity:       {:.2}", record.equity);
            if let Some(excess) = record.maintenance_excess {
                println!("Maint. Excess:      {:.2}", excess);
            }
        }
        None => println!("Final Equity:       n/a"),
    }
    println!("Fills:              {}", fills);
    println!("Expired Orders:     {}", expired);
    println!("Open Orders:        {}", account.oms().open_count());
    println!("Step Issues:        {}", issues);
    println!("Holdings:");
    if account.holdings().is_empty() {
        println!("  (flat)");
    }
    for (symbol, qty) in account.holdings() {
        println!("  {:<16}{:>10}", symbol, qty);
    }
    println!("{}", "=".repeat(60));

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(sim.performance_history())
            .context("Failed to serialize performance history")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Performance history written to: {}", path.display());
    }

    info!("Replay completed successfully");

    Ok(())
}
