//! Account ledger
//!
//! A [`Ledger`] owns cash, holdings, the activity log and the order manager.
//! Cash and margin accounts wrap a ledger and add their own buying-power
//! arithmetic through the [`Account`] trait.
//!
//! Every cash mutation appends an [`Activity`] entry, so at all times
//! `cash == initial_cash + Σ activity.amount()`.

pub mod cash;
pub mod margin;

pub use cash::CashAccount;
pub use margin::{MarginAccount, MarginRequirements, MarginRequirementsError};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use crate::oms::{fill_price, OmsError, Order, OrderId, OrderKind, OrderManager};
use crate::{Direction, PriceMap, Symbol};

/// Data errors raised by ledger computations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("missing price for symbol: {symbol}")]
    MissingPrice { symbol: Symbol },

    #[error("fill of {quantity} {symbol} would overflow the position of {position}")]
    PositionOverflow {
        symbol: Symbol,
        position: i64,
        quantity: u64,
    },

    #[error(transparent)]
    Oms(#[from] OmsError),
}

/// Look up a symbol's price, naming the symbol when absent
pub fn price_of(prices: &PriceMap, symbol: &Symbol) -> Result<f64, LedgerError> {
    prices
        .get(symbol)
        .copied()
        .ok_or_else(|| LedgerError::MissingPrice {
            symbol: symbol.clone(),
        })
}

/// Price used to reserve capital for a resting order
///
/// Market orders reserve at the live price; limit and stop orders reserve at
/// their own threshold (worst-case commitment).
pub fn reservation_price(order: &Order, prices: &PriceMap) -> Result<f64, LedgerError> {
    match order.kind() {
        OrderKind::Market => price_of(prices, &order.symbol),
        OrderKind::Limit { limit_price } => Ok(limit_price),
        OrderKind::Stop { stop_price } => Ok(stop_price),
    }
}

/// A realized trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: u64,
    pub price: f64,
}

impl Fill {
    /// Signed cash flow: negative for buys, positive for sells
    pub fn cash_flow(&self) -> f64 {
        -self.direction.sign() * self.price * self.quantity as f64
    }

    /// Signed position change; `None` when the quantity has no signed form
    pub fn position_delta(&self) -> Option<i64> {
        let quantity = i64::try_from(self.quantity).ok()?;
        match self.direction {
            Direction::Buy => Some(quantity),
            Direction::Sell => Some(-quantity),
        }
    }
}

/// One entry in the activity log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Activity {
    Deposit { amount: f64 },
    Withdrawal { amount: f64 },
    Fill(Fill),
}

impl Activity {
    /// Signed effect on cash
    pub fn amount(&self) -> f64 {
        match self {
            Activity::Deposit { amount } => *amount,
            Activity::Withdrawal { amount } => -*amount,
            Activity::Fill(fill) => fill.cash_flow(),
        }
    }
}

/// Cash, holdings, activity log and order manager of one account
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    initial_cash: f64,
    cash: f64,
    holdings: BTreeMap<Symbol, i64>,
    activity: Vec<Activity>,
    oms: OrderManager,
}

impl Ledger {
    /// Create a ledger with starting cash
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            ..Self::default()
        }
    }

    /// Create a ledger with starting cash and existing positions
    pub fn with_holdings(
        initial_cash: f64,
        holdings: impl IntoIterator<Item = (Symbol, i64)>,
    ) -> Self {
        let mut ledger = Self::new(initial_cash);
        ledger.holdings = holdings.into_iter().filter(|(_, qty)| *qty != 0).collect();
        ledger
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Positions by symbol; absent symbol means flat
    pub fn holdings(&self) -> &BTreeMap<Symbol, i64> {
        &self.holdings
    }

    /// Signed position in `symbol` (0 when flat)
    pub fn position(&self, symbol: &Symbol) -> i64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }

    pub fn activity(&self) -> &[Activity] {
        &self.activity
    }

    /// Cash flows of fills only, in the order they happened
    pub fn fill_cash_flows(&self) -> Vec<f64> {
        self.activity
            .iter()
            .filter_map(|a| match a {
                Activity::Fill(fill) => Some(fill.cash_flow()),
                _ => None,
            })
            .collect()
    }

    /// Cash rebuilt from the activity log
    pub fn reconciled_cash(&self) -> f64 {
        self.activity
            .iter()
            .fold(self.initial_cash, |cash, entry| cash + entry.amount())
    }

    pub fn oms(&self) -> &OrderManager {
        &self.oms
    }

    pub fn deposit_cash(&mut self, amount: f64) {
        self.record(Activity::Deposit { amount });
    }

    /// No lower bound: overdraft is representable
    pub fn withdraw_cash(&mut self, amount: f64) {
        self.record(Activity::Withdrawal { amount });
    }

    pub fn submit_order(&mut self, order: Order) -> Result<(), OmsError> {
        self.oms.submit(order)
    }

    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<&Order, OmsError> {
        self.oms.cancel(order_id)
    }

    /// Execute an open order against `market_price` and book the fill
    ///
    /// The position change is checked before the OMS transition, and the
    /// transition before anything is booked, so a rejected execution leaves
    /// the order open and cash, holdings and activity untouched.
    pub fn execute_order(
        &mut self,
        order_id: &OrderId,
        market_price: f64,
    ) -> Result<Fill, LedgerError> {
        let order = self
            .oms
            .get(order_id)
            .ok_or_else(|| OmsError::UnknownOrder(order_id.clone()))?;
        let fill = Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            direction: order.direction,
            quantity: order.quantity(),
            price: fill_price(market_price, order),
        };

        let position = self.position(&fill.symbol);
        fill.position_delta()
            .and_then(|delta| position.checked_add(delta))
            .ok_or_else(|| LedgerError::PositionOverflow {
                symbol: fill.symbol.clone(),
                position,
                quantity: fill.quantity,
            })?;

        self.oms.execute(order_id, fill.price)?;

        info!(
            "FILL {} {} {} x{} @ {:.4}",
            fill.order_id, fill.direction, fill.symbol, fill.quantity, fill.price
        );

        self.record(Activity::Fill(fill.clone()));
        Ok(fill)
    }

    /// Append an activity entry and apply its cash and position effects
    fn record(&mut self, entry: Activity) {
        self.cash += entry.amount();

        if let Activity::Fill(fill) = &entry {
            // Overflow was ruled out in execute_order
            let position = self.position(&fill.symbol) + fill.position_delta().unwrap_or(0);
            if position == 0 {
                self.holdings.remove(&fill.symbol);
            } else {
                self.holdings.insert(fill.symbol.clone(), position);
            }
        }

        self.activity.push(entry);
    }

    /// Σ quantity × price over held symbols
    pub fn holdings_value(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        let mut total = 0.0;
        for (symbol, qty) in &self.holdings {
            total += *qty as f64 * price_of(prices, symbol)?;
        }
        Ok(total)
    }

    /// Cash plus market value of holdings
    pub fn portfolio_value(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        Ok(self.cash + self.holdings_value(prices)?)
    }

    /// Capital reserved by open buy orders
    pub fn open_order_cost(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        let mut total = 0.0;
        for order in self.oms.open_orders().filter(|order| order.is_buy()) {
            total += order.quantity() as f64 * reservation_price(order, prices)?;
        }
        Ok(total)
    }
}

/// Shared surface of cash and margin accounts
pub trait Account {
    fn ledger(&self) -> &Ledger;

    fn ledger_mut(&mut self) -> &mut Ledger;

    /// Capital free for new commitments after reserving for open orders
    fn cash_available_to_invest(&self, prices: &PriceMap) -> Result<f64, LedgerError>;

    /// Capacity to open new positions
    fn buying_power(&self, prices: &PriceMap) -> Result<f64, LedgerError>;

    /// Mark-to-market value recorded in the performance history
    fn equity(&self, prices: &PriceMap) -> Result<f64, LedgerError>;

    /// Equity above the maintenance requirement; `None` for cash accounts
    fn maintenance_excess(&self, _prices: &PriceMap) -> Result<Option<f64>, LedgerError> {
        Ok(None)
    }

    fn cash(&self) -> f64 {
        self.ledger().cash()
    }

    fn holdings(&self) -> &BTreeMap<Symbol, i64> {
        self.ledger().holdings()
    }

    fn activity(&self) -> &[Activity] {
        self.ledger().activity()
    }

    fn oms(&self) -> &OrderManager {
        self.ledger().oms()
    }

    fn deposit_cash(&mut self, amount: f64) {
        self.ledger_mut().deposit_cash(amount)
    }

    fn withdraw_cash(&mut self, amount: f64) {
        self.ledger_mut().withdraw_cash(amount)
    }

    fn portfolio_value(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.ledger().portfolio_value(prices)
    }

    fn open_order_cost(&self, prices: &PriceMap) -> Result<f64, LedgerError> {
        self.ledger().open_order_cost(prices)
    }

    fn submit_order(&mut self, order: Order) -> Result<(), OmsError> {
        self.ledger_mut().submit_order(order)
    }

    fn cancel_order(&mut self, order_id: &OrderId) -> Result<(), OmsError> {
        self.ledger_mut().cancel_order(order_id).map(|_| ())
    }
}
