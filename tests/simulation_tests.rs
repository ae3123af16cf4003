//! Replay driver tests
//!
//! Step-level behavior of the simulation: fill timing, ordering, missing
//! data, day-order expiry, date bounds and performance records.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};

use ledger_replay::account::{Account, CashAccount, Ledger, MarginAccount};
use ledger_replay::simulation::{SimulationState, StepIssue};
use ledger_replay::{
    Direction, Order, OrderId, OrderStatus, PriceSeries, Simulation, SimulationError, Symbol,
    TimeInForce,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn axis(len: usize) -> Vec<DateTime<Utc>> {
    (0..len as i64).map(day).collect()
}

/// One symbol with a price at every step
fn spy(prices: &[f64]) -> PriceSeries {
    PriceSeries::new(axis(prices.len()))
        .with_series("SPY", prices.iter().map(|p| Some(*p)).collect())
        .unwrap()
}

fn gtc_limit(id: &str, qty: u64, direction: Direction, limit_price: f64) -> Order {
    Order::limit(id, "SPY", qty, direction, TimeInForce::GoodTillCancelled, limit_price).unwrap()
}

fn gtc_market(id: &str, symbol: &str, qty: u64, direction: Direction) -> Order {
    Order::market(id, symbol, qty, direction, TimeInForce::GoodTillCancelled).unwrap()
}

// =============================================================================
// Fills
// =============================================================================

#[test]
fn test_limit_buy_fills_at_limit_price() {
    let mut sim = Simulation::new(spy(&[10.0]), CashAccount::new(1000.0), None, None).unwrap();
    sim.submit_order(gtc_limit("c", 10, Direction::Buy, 11.0)).unwrap();

    let report = sim.step().unwrap();

    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].price, 11.0);
    assert_eq!(sim.account().cash(), 890.0);
    assert_eq!(sim.account().ledger().position(&Symbol::new("SPY")), 10);
    assert_eq!(sim.account().ledger().fill_cash_flows(), vec![-110.0]);

    let record = &sim.performance_history()[0];
    assert_eq!(record.cash, 890.0);
    assert_eq!(record.equity, 990.0);
    assert_eq!(record.holdings.get(&Symbol::new("SPY")), Some(&10));
}

#[test]
fn test_orders_wait_for_qualifying_price() {
    let mut sim = Simulation::new(spy(&[12.0, 11.0, 10.0]), CashAccount::new(1000.0), None, None)
        .unwrap();
    sim.submit_order(gtc_limit("l", 1, Direction::Buy, 10.5)).unwrap();
    sim.submit_order(
        Order::stop("s", "SPY", 1, Direction::Sell, TimeInForce::GoodTillCancelled, 11.0).unwrap(),
    )
    .unwrap();

    let first = sim.step().unwrap();
    assert!(first.fills.is_empty());

    let second = sim.step().unwrap();
    assert_eq!(second.fills.len(), 1);
    assert_eq!(second.fills[0].order_id, OrderId::new("s"));

    let third = sim.step().unwrap();
    assert_eq!(third.fills.len(), 1);
    assert_eq!(third.fills[0].order_id, OrderId::new("l"));
    assert_eq!(sim.account().oms().open_count(), 0);
}

#[test]
fn test_same_step_fills_follow_submission_order_and_snapshot() {
    let mut sim = Simulation::new(spy(&[10.0]), CashAccount::new(1000.0), None, None).unwrap();
    sim.submit_order(gtc_market("z", "SPY", 5, Direction::Buy)).unwrap();
    sim.submit_order(gtc_market("a", "SPY", 5, Direction::Buy)).unwrap();

    let report = sim.step().unwrap();

    let ids: Vec<_> = report.fills.iter().map(|f| f.order_id.as_str()).collect();
    assert_eq!(ids, vec!["z", "a"]);
    assert!(report.fills.iter().all(|f| f.price == 10.0));
    assert_eq!(sim.account().ledger().position(&Symbol::new("SPY")), 10);
    assert_eq!(sim.price_dict().get(&Symbol::new("SPY")), Some(&10.0));
}

#[test]
fn test_order_submitted_between_steps_uses_next_price() {
    let mut sim = Simulation::new(spy(&[10.0, 20.0]), CashAccount::new(1000.0), None, None).unwrap();
    sim.step().unwrap();

    sim.submit_order(gtc_market("late", "SPY", 1, Direction::Buy)).unwrap();
    let report = sim.step().unwrap();

    assert_eq!(report.fills[0].price, 20.0);
    assert_eq!(sim.account().cash(), 980.0);
}

// =============================================================================
// Missing Data
// =============================================================================

#[test]
fn test_missing_price_is_reported_not_fatal() {
    let data = PriceSeries::new(axis(2))
        .with_series("SPY", vec![Some(10.0), Some(10.0)])
        .unwrap()
        .with_series("AAPL", vec![None, Some(90.0)])
        .unwrap();
    let mut sim = Simulation::new(data, CashAccount::new(1000.0), None, None).unwrap();
    sim.submit_order(gtc_market("a1", "AAPL", 1, Direction::Buy)).unwrap();
    sim.submit_order(gtc_market("a2", "AAPL", 1, Direction::Buy)).unwrap();
    sim.submit_order(gtc_market("s", "SPY", 1, Direction::Buy)).unwrap();

    let first = sim.step().unwrap();
    assert_eq!(
        first.issues,
        vec![StepIssue::MissingPrice {
            symbol: Symbol::new("AAPL")
        }]
    );
    assert_eq!(first.fills.len(), 1);
    assert_eq!(first.fills[0].order_id, OrderId::new("s"));

    let second = sim.step().unwrap();
    assert!(second.is_clean());
    assert_eq!(second.fills.len(), 2);
    assert_eq!(sim.account().ledger().position(&Symbol::new("AAPL")), 2);
}

#[test]
fn test_unpriced_holding_skips_performance_record() {
    let data = PriceSeries::new(axis(2))
        .with_series("AAPL", vec![None, Some(90.0)])
        .unwrap();
    let ledger = Ledger::with_holdings(100.0, [(Symbol::new("AAPL"), 1)]);
    let mut sim = Simulation::new(data, CashAccount::from_ledger(ledger), None, None).unwrap();

    let first = sim.step().unwrap();
    assert_eq!(
        first.issues,
        vec![StepIssue::Valuation {
            symbol: Symbol::new("AAPL")
        }]
    );
    assert!(sim.performance_history().is_empty());

    sim.step().unwrap();
    assert_eq!(sim.performance_history().len(), 1);
    assert_eq!(sim.performance_history()[0].time_index, 1);
    assert_eq!(sim.performance_history()[0].equity, 190.0);
}

// =============================================================================
// Day Orders
// =============================================================================

#[test]
fn test_unfilled_day_orders_expire() {
    let mut sim = Simulation::new(spy(&[10.0, 4.0]), CashAccount::new(1000.0), None, None).unwrap();
    sim.submit_order(
        Order::limit("day", "SPY", 1, Direction::Buy, TimeInForce::Day, 5.0).unwrap(),
    )
    .unwrap();
    sim.submit_order(gtc_limit("gtc", 1, Direction::Buy, 5.0)).unwrap();

    let first = sim.step().unwrap();
    assert_eq!(first.expired, vec![OrderId::new("day")]);
    assert_eq!(
        sim.account().oms().status(&OrderId::new("day")),
        Some(OrderStatus::Cancelled)
    );

    let second = sim.step().unwrap();
    assert_eq!(second.fills.len(), 1);
    assert_eq!(second.fills[0].order_id, OrderId::new("gtc"));
}

#[test]
fn test_unpriced_day_order_survives_until_evaluated() {
    let data = PriceSeries::new(axis(3))
        .with_series("SPY", vec![Some(10.0), Some(10.0), Some(10.0)])
        .unwrap()
        .with_series("AAPL", vec![None, Some(95.0), Some(80.0)])
        .unwrap();
    let mut sim = Simulation::new(data, CashAccount::new(1000.0), None, None).unwrap();
    sim.submit_order(
        Order::limit("aapl", "AAPL", 1, Direction::Buy, TimeInForce::Day, 90.0).unwrap(),
    )
    .unwrap();

    // No AAPL price: not evaluated, so not expired
    let first = sim.step().unwrap();
    assert!(first.expired.is_empty());
    assert_eq!(
        sim.account().oms().status(&OrderId::new("aapl")),
        Some(OrderStatus::Open)
    );

    // Priced and evaluated without filling: expires
    let second = sim.step().unwrap();
    assert!(second.fills.is_empty());
    assert_eq!(second.expired, vec![OrderId::new("aapl")]);

    let third = sim.step().unwrap();
    assert!(third.fills.is_empty());
}

#[test]
fn test_day_order_expiry_can_be_disabled() {
    let mut sim = Simulation::new(spy(&[10.0, 4.0]), CashAccount::new(1000.0), None, None)
        .unwrap()
        .with_day_order_expiry(false);
    sim.submit_order(
        Order::limit("day", "SPY", 1, Direction::Buy, TimeInForce::Day, 5.0).unwrap(),
    )
    .unwrap();

    assert!(sim.step().unwrap().expired.is_empty());
    assert_eq!(sim.step().unwrap().fills.len(), 1);
}

// =============================================================================
// Run, Bounds and Reporting
// =============================================================================

#[test]
fn test_run_to_completion() {
    let mut sim = Simulation::new(spy(&[10.0, 11.0, 12.0]), CashAccount::new(100.0), None, None)
        .unwrap();
    let reports = sim.run().unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(sim.state(), SimulationState::Completed);
    assert_eq!(sim.current_time_index(), 3);
    assert_eq!(sim.step().unwrap_err(), SimulationError::Completed);
    assert_eq!(sim.run().unwrap_err(), SimulationError::Completed);
}

#[test]
fn test_date_bounds_limit_the_replay() {
    let mut sim = Simulation::new(
        spy(&[10.0, 11.0, 12.0, 13.0, 14.0]),
        CashAccount::new(100.0),
        Some(day(1)),
        Some(day(3)),
    )
    .unwrap();
    let reports = sim.run().unwrap();

    let indices: Vec<_> = reports.iter().map(|r| r.time_index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(reports[0].timestamp, day(1));
}

#[test]
fn test_empty_range_is_rejected() {
    let result = Simulation::new(
        spy(&[10.0, 11.0]),
        CashAccount::new(100.0),
        Some(day(1)),
        Some(day(0)),
    );
    assert!(matches!(result, Err(SimulationError::EmptyRange)));
}

#[test]
fn test_margin_records_maintenance_excess() {
    let ledger = Ledger::with_holdings(1000.0, [(Symbol::new("SPY"), 2)]);
    let account = MarginAccount::from_ledger(ledger).with_margin_balance(500.0);
    let mut sim = Simulation::new(spy(&[100.0, 40.0]), account, None, None).unwrap();
    sim.run().unwrap();

    let history = sim.performance_history();
    assert_relative_eq!(history[0].equity, 1700.0);
    assert_relative_eq!(history[0].maintenance_excess.unwrap(), 1650.0);
    assert_relative_eq!(history[1].equity, 1580.0);
    assert_relative_eq!(history[1].maintenance_excess.unwrap(), 1560.0);

    let curve = sim.equity_curve();
    assert_eq!(curve.len(), 2);
    assert_eq!(curve[1].0, day(1));
}

#[test]
fn test_cash_account_records_no_maintenance_excess() {
    let mut sim = Simulation::new(spy(&[10.0]), CashAccount::new(100.0), None, None).unwrap();
    sim.run().unwrap();
    assert_eq!(sim.performance_history()[0].maintenance_excess, None);
    assert_eq!(sim.into_account().cash(), 100.0);
}
