//! Replay driver
//!
//! Walks the time axis of a [`HistoricalData`] provider one step at a time.
//! Each step refreshes the price snapshot, evaluates the open orders that
//! existed when the step began (in submission order, all against the same
//! snapshot), books the fills, optionally expires day orders and records a
//! performance snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::account::{Account, Fill, LedgerError};
use crate::data::HistoricalData;
use crate::oms::{check_order_fill, OmsError, Order, OrderId, TimeInForce};
use crate::{PriceMap, Symbol};

/// Errors surfaced by the replay driver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("simulation has completed; reset it before stepping again")]
    Completed,

    #[error("no time index falls between the start and end bounds")]
    EmptyRange,

    #[error(transparent)]
    Oms(#[from] OmsError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Idle → Running → Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    Idle,
    Running,
    Completed,
}

/// Non-fatal conditions reported for one step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepIssue {
    /// An open order's symbol had no price; its orders were skipped
    MissingPrice { symbol: Symbol },

    /// A held symbol had no price; no performance record for this step
    Valuation { symbol: Symbol },
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub time_index: usize,
    pub timestamp: DateTime<Utc>,
    pub fills: Vec<Fill>,
    pub expired: Vec<OrderId>,
    pub issues: Vec<StepIssue>,
}

impl StepReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Portfolio snapshot taken at the end of a step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    pub time_index: usize,
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub equity: f64,
    /// Margin accounts only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_excess: Option<f64>,
    pub holdings: BTreeMap<Symbol, i64>,
}

/// Discrete replay of one account over one price history
pub struct Simulation<A: Account, D: HistoricalData> {
    data: D,
    account: A,
    /// First time index inside the date bounds
    start_index: usize,
    /// One past the last time index inside the date bounds
    end_index: usize,
    current_time_index: usize,
    price_dict: PriceMap,
    performance_history: Vec<PerformanceRecord>,
    state: SimulationState,
    expire_day_orders: bool,
}

impl<A: Account, D: HistoricalData> Simulation<A, D> {
    /// Bound the replay to `[start, end]` (inclusive, either side optional)
    pub fn new(
        data: D,
        account: A,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, SimulationError> {
        let axis = data.time_axis();
        let start_index = match start {
            Some(start) => axis.partition_point(|ts| *ts < start),
            None => 0,
        };
        let end_index = match end {
            Some(end) => axis.partition_point(|ts| *ts <= end),
            None => axis.len(),
        };

        if start_index >= end_index {
            return Err(SimulationError::EmptyRange);
        }

        debug!(
            "Simulation covers time indices {}..{} of {}",
            start_index,
            end_index,
            axis.len()
        );

        Ok(Self {
            data,
            account,
            start_index,
            end_index,
            current_time_index: start_index,
            price_dict: PriceMap::new(),
            performance_history: Vec::new(),
            state: SimulationState::Idle,
            expire_day_orders: true,
        })
    }

    /// Cancel priced day orders still open at the end of each step (default on)
    pub fn with_day_order_expiry(mut self, expire: bool) -> Self {
        self.expire_day_orders = expire;
        self
    }

    pub fn account(&self) -> &A {
        &self.account
    }

    pub fn account_mut(&mut self) -> &mut A {
        &mut self.account
    }

    pub fn into_account(self) -> A {
        self.account
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// Price snapshot of the most recent step
    pub fn price_dict(&self) -> &PriceMap {
        &self.price_dict
    }

    pub fn current_time_index(&self) -> usize {
        self.current_time_index
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn performance_history(&self) -> &[PerformanceRecord] {
        &self.performance_history
    }

    pub fn equity_curve(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.performance_history
            .iter()
            .map(|record| (record.timestamp, record.equity))
            .collect()
    }

    pub fn submit_order(&mut self, order: Order) -> Result<(), OmsError> {
        self.account.submit_order(order)
    }

    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<(), OmsError> {
        self.account.cancel_order(order_id)
    }

    /// Rewind to the start bound and clear the history; the account is untouched
    pub fn reset(&mut self) {
        self.current_time_index = self.start_index;
        self.price_dict.clear();
        self.performance_history.clear();
        self.state = SimulationState::Idle;
    }

    /// Advance one time index
    pub fn step(&mut self) -> Result<StepReport, SimulationError> {
        if self.state == SimulationState::Completed || self.current_time_index >= self.end_index {
            self.state = SimulationState::Completed;
            return Err(SimulationError::Completed);
        }
        self.state = SimulationState::Running;

        let time_index = self.current_time_index;
        let timestamp = self.data.time_axis()[time_index];
        self.refresh_prices(time_index);

        let mut issues = Vec::new();
        let fills = self.fill_open_orders(&mut issues)?;
        let expired = if self.expire_day_orders {
            self.expire_open_day_orders()?
        } else {
            Vec::new()
        };

        match self.snapshot(time_index, timestamp) {
            Ok(record) => {
                if let Some(excess) = record.maintenance_excess.filter(|excess| *excess < 0.0) {
                    warn!(
                        "Maintenance call at {}: excess {:.2}",
                        timestamp.format("%Y-%m-%d %H:%M"),
                        excess
                    );
                }
                self.performance_history.push(record);
            }
            Err(LedgerError::MissingPrice { symbol }) => {
                warn!("Cannot value holdings at index {}: no price for {}", time_index, symbol);
                issues.push(StepIssue::Valuation { symbol });
            }
            Err(e) => return Err(e.into()),
        }

        self.current_time_index += 1;
        if self.current_time_index >= self.end_index {
            self.state = SimulationState::Completed;
            info!("Simulation completed after {} steps", self.end_index - self.start_index);
        }

        Ok(StepReport {
            time_index,
            timestamp,
            fills,
            expired,
            issues,
        })
    }

    /// Step until the end bound
    pub fn run(&mut self) -> Result<Vec<StepReport>, SimulationError> {
        if self.state == SimulationState::Completed {
            return Err(SimulationError::Completed);
        }

        let mut reports = Vec::with_capacity(self.end_index - self.current_time_index);
        while self.state != SimulationState::Completed {
            reports.push(self.step()?);
        }
        Ok(reports)
    }

    fn refresh_prices(&mut self, time_index: usize) {
        self.price_dict.clear();
        for symbol in self.data.symbols() {
            if let Some(price) = self.data.price_at(&symbol, time_index) {
                self.price_dict.insert(symbol, price);
            }
        }
    }

    /// Evaluate the orders open at the start of the step against one snapshot
    fn fill_open_orders(&mut self, issues: &mut Vec<StepIssue>) -> Result<Vec<Fill>, SimulationError> {
        let mut fills = Vec::new();

        for order_id in self.account.oms().open_order_ids() {
            let Some(order) = self.account.oms().get(&order_id) else {
                continue;
            };

            let Some(&price) = self.price_dict.get(&order.symbol) else {
                let symbol = order.symbol.clone();
                if !issues
                    .iter()
                    .any(|issue| matches!(issue, StepIssue::MissingPrice { symbol: s } if *s == symbol))
                {
                    warn!("No price for {} at index {}", symbol, self.current_time_index);
                    issues.push(StepIssue::MissingPrice { symbol });
                }
                continue;
            };

            if check_order_fill(price, order) {
                fills.push(self.account.ledger_mut().execute_order(&order_id, price)?);
            }
        }

        Ok(fills)
    }

    /// Cancel open day orders that were evaluated this step
    ///
    /// A day order whose symbol had no price was never evaluated, so it stays
    /// open until a step that prices its symbol.
    fn expire_open_day_orders(&mut self) -> Result<Vec<OrderId>, SimulationError> {
        let day_orders: Vec<OrderId> = self
            .account
            .oms()
            .open_orders()
            .filter(|order| order.time_in_force == TimeInForce::Day)
            .filter(|order| self.price_dict.contains_key(&order.symbol))
            .map(|order| order.id.clone())
            .collect();

        for order_id in &day_orders {
            self.account.cancel_order(order_id)?;
            info!("Expired day order {}", order_id);
        }

        Ok(day_orders)
    }

    fn snapshot(
        &self,
        time_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<PerformanceRecord, LedgerError> {
        Ok(PerformanceRecord {
            time_index,
            timestamp,
            cash: self.account.cash(),
            equity: self.account.equity(&self.price_dict)?,
            maintenance_excess: self.account.maintenance_excess(&self.price_dict)?,
            holdings: self.account.holdings().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::CashAccount;
    use crate::data::PriceSeries;
    use crate::Direction;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn series(prices: &[f64]) -> PriceSeries {
        let axis = (0..prices.len() as i64).map(day).collect();
        PriceSeries::new(axis)
            .with_series("SPY", prices.iter().map(|p| Some(*p)).collect())
            .unwrap()
    }

    #[test]
    fn test_state_machine() {
        let mut sim = Simulation::new(series(&[10.0, 11.0]), CashAccount::new(100.0), None, None).unwrap();
        assert_eq!(sim.state(), SimulationState::Idle);

        sim.step().unwrap();
        assert_eq!(sim.state(), SimulationState::Running);
        assert_eq!(sim.current_time_index(), 1);

        sim.step().unwrap();
        assert_eq!(sim.state(), SimulationState::Completed);
        assert_eq!(sim.step().unwrap_err(), SimulationError::Completed);
        assert_eq!(sim.performance_history().len(), 2);
    }

    #[test]
    fn test_bounds_select_indices() {
        let sim = Simulation::new(
            series(&[1.0, 2.0, 3.0, 4.0]),
            CashAccount::new(0.0),
            Some(day(1)),
            Some(day(2)),
        )
        .unwrap();
        assert_eq!(sim.current_time_index(), 1);

        let err = Simulation::new(series(&[1.0]), CashAccount::new(0.0), Some(day(5)), None);
        assert!(matches!(err, Err(SimulationError::EmptyRange)));
    }

    #[test]
    fn test_reset_rewinds_without_touching_account() {
        let mut sim = Simulation::new(series(&[10.0, 11.0]), CashAccount::new(100.0), None, None).unwrap();
        sim.submit_order(Order::market("M", "SPY", 1, Direction::Buy, TimeInForce::Day).unwrap())
            .unwrap();
        sim.run().unwrap();
        assert_eq!(sim.account().cash(), 90.0);

        sim.reset();
        assert_eq!(sim.state(), SimulationState::Idle);
        assert_eq!(sim.current_time_index(), 0);
        assert!(sim.performance_history().is_empty());
        assert!(sim.price_dict().is_empty());
        assert_eq!(sim.account().cash(), 90.0);
    }

    #[test]
    fn test_equity_curve_matches_history() {
        let mut sim = Simulation::new(series(&[10.0, 12.0]), CashAccount::new(100.0), None, None).unwrap();
        sim.submit_order(Order::market("M", "SPY", 2, Direction::Buy, TimeInForce::Day).unwrap())
            .unwrap();
        sim.run().unwrap();

        assert_eq!(sim.equity_curve(), vec![(day(0), 100.0), (day(1), 104.0)]);
    }
}
