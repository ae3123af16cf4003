//! Margin account
//!
//! Adds a margin balance and long/short requirement fractions on top of the
//! shared ledger. A negative maintenance excess is reported as a value; the
//! engine never liquidates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::{price_of, reservation_price, Account, Ledger, LedgerError};
use crate::oms::Order;
use crate::{Direction, PriceMap};

/// A requirement fraction outside (0, 1]
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name} must be in (0, 1], got {value}")]
pub struct MarginRequirementsError {
    pub name: &'static str,
    pub value: f64,
}

/// Initial and maintenance requirements, as fractions of position value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginRequirements {
    pub initial_long: f64,
    pub initial_short: f64,
    pub maint_long: f64,
    pub maint_short: f64,
}

impl Default for MarginRequirements {
    fn default() -> Self {
        Self {
            initial_long: 0.5,
            initial_short: 0.5,
            maint_long: 0.25,
            maint_short: 0.3,
        }
    }
}

impl MarginRequirements {
    /// Create validated requirements
    pub fn new(
        initial_long: f64,
        initial_short: f64,
        maint_long: f64,
        maint_short: f64,
    ) -> Result<Self, MarginRequirementsError> {
        let requirements = Self {
            initial_long,
            initial_short,
            maint_long,
            maint_short,
        };
        requirements.validate()?;
        Ok(requirements)
    }

    /// Check every fraction lies in (0, 1]
    pub fn validate(&self) -> Result<(), MarginRequirementsError> {
        for (name, value) in [
            ("initial_long", self.initial_long),
            ("initial_short", self.initial_short),
            ("maint_long", self.maint_long),
            ("maint_short", self.maint_short),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(MarginRequirementsError { name, value });
            }
        }
        Ok(())
    }
}

/// Account with margin credit
#[derive(Debug, Clone, Default)]
pub struct MarginAccount {
    ledger: Ledger,
    margin_balance: f64,
    requirements: MarginRequirements,
}

impl MarginAccount {
    pub fn new(initial_cash: f64) -> Self {
        Self::from_ledger(Ledger::new(initial_cash))
    }

    pub fn from_ledger(ledger: Ledger) -> Self {
        Self {
            ledger,
            margin_balance: 0.0,
            requirements: MarginRequirements::default(),
        }
    }

    pub fn with_margin_balance(mut self, margin_balance: f64) -> Self {
        self.margin_balance = margin_balance;
        self
    }

    pub fn with_requirements(mut self, requirements: MarginRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn margin_balance(&self) -> f64 {
        self.margin_balance
    }

    pub fn set_margin_balance(&mut self, margin_balance: f64) {
        self.margin_balance = margin_balance;
    }

    pub fn requirements(&self) -> &MarginRequirements {
        &self.requirements
    }

    /// Σ over longs of rate_long·qty·price + Σ over shorts of rate_short·|qty|·price
    fn requirement(
        &self,
        prices: &PriceMap,
        rate_long: f64,
        rate_short: f64,
    ) -> Result<f64, LedgerError> {
        let mut total = 0.0;
        for (symbol, &qty) in self.ledger.holdings() {
            let rate = if qty > 0 { rate_long } else { rate_short };
            total += rate * qty.unsigned_abs() as f64 * price_of(prices, symbol)?;
        }
        Ok(total)
    }

    /// Minimum equity required against current positions
    pub fn maintenance_requirement(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.requirement(
            prices,
            self.requirements.maint_long,
            self.requirements.maint_short,
        )
    }

    /// Equity needed to have opened the current positions
    pub fn initial_requirement(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.requirement(
            prices,
            self.requirements.initial_long,
            self.requirements.initial_short,
        )
    }

    /// Requirement contributed by open orders
    ///
    /// Non-short buys are scaled by `rate_long`, short sells by `rate_short`;
    /// any other order contributes nothing.
    fn open_order_requirement(
        &self,
        prices: &PriceMap,
        rate_long: f64,
        rate_short: f64,
    ) -> Result<f64, LedgerError> {
        let mut total = 0.0;
        for order in self.ledger.oms().open_orders() {
            let rate = match order_leg(order) {
                Some(Direction::Buy) => rate_long,
                Some(Direction::Sell) => rate_short,
                None => continue,
            };
            total += rate * order.quantity() as f64 * reservation_price(order, prices)?;
        }
        Ok(total)
    }

    pub fn open_order_initial_req(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.open_order_requirement(
            prices,
            self.requirements.initial_long,
            self.requirements.initial_short,
        )
    }

    pub fn open_order_maint_req(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.open_order_requirement(
            prices,
            self.requirements.maint_long,
            self.requirements.maint_short,
        )
    }

    /// Equity above the initial requirement of positions and open orders
    pub fn initial_excess(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.equity(prices)?
            - self.initial_requirement(prices)?
            - self.open_order_initial_req(prices)?)
    }

    /// Negative maintenance excess: a maintenance call condition
    pub fn is_maintenance_call(&self, prices: &PriceMap) -> Result<bool, LedgerError> {
        Ok(self.maintenance_excess_value(prices)? < 0.0)
    }

    fn maintenance_excess_value(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.equity(prices)? - self.maintenance_requirement(prices)?)
    }
}

/// Which requirement leg an order opens: long for non-short buys, short for
/// short sells, none otherwise
fn order_leg(order: &Order) -> Option<Direction> {
    match (order.direction, order.short) {
        (Direction::Buy, false) => Some(Direction::Buy),
        (Direction::Sell, true) => Some(Direction::Sell),
        _ => None,
    }
}

impl Account for MarginAccount {
    fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    fn cash_available_to_invest(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.ledger.cash() + self.margin_balance - self.ledger.open_order_cost(prices)?)
    }

    /// Initial excess levered by the long initial rate
    fn buying_power(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.initial_excess(prices)? / self.requirements.initial_long)
    }

    /// Cash plus margin balance plus market value of holdings
    fn equity(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.ledger.cash() + self.margin_balance + self.ledger.holdings_value(prices)?)
    }

    fn maintenance_excess(&self, prices: &PriceMap) -> Result<Option<f64>, LedgerError> {
        self.maintenance_excess_value(prices).map(Some)
    }
}
