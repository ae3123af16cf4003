//! Core OMS types
//!
//! Defines orders, their type-specific threshold prices, and the lifecycle
//! enumerations the order manager transitions between.

use crate::{Direction, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Validation errors raised while constructing an order
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("limit_price must be positive, got {0}")]
    InvalidLimitPrice(f64),

    #[error("stop_price must be positive, got {0}")]
    InvalidStopPrice(f64),

    #[error("limit order requires a limit_price")]
    MissingLimitPrice,

    #[error("stop order requires a stop_price")]
    MissingStopPrice,

    #[error("market order must not carry a threshold price")]
    UnexpectedThreshold,

    #[error("quantity must be positive")]
    ZeroQuantity,

    #[error("quantity {0} exceeds the largest representable position")]
    QuantityTooLarge(u64),

    #[error("order id must not be empty")]
    EmptyOrderId,

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("direction must be 'buy' or 'sell', got '{0}'")]
    InvalidDirection(String),

    #[error("time_in_force must be 'day' or 'gtc', got '{0}'")]
    InvalidTimeInForce(String),
}

/// Caller-assigned order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        OrderId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        OrderId::new(s)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        OrderId(s)
    }
}

/// Order type with its threshold price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderKind {
    /// Fills at whatever price the step offers
    Market,

    /// Buy limit: fills when price ≤ limit_price
    /// Sell limit: fills when price ≥ limit_price
    Limit { limit_price: f64 },

    /// Buy stop: fills when price ≥ stop_price
    /// Sell stop: fills when price ≤ stop_price
    Stop { stop_price: f64 },
}

impl OrderKind {
    /// Threshold price, absent for market orders
    pub fn threshold(&self) -> Option<f64> {
        match *self {
            OrderKind::Market => None,
            OrderKind::Limit { limit_price } => Some(limit_price),
            OrderKind::Stop { stop_price } => Some(stop_price),
        }
    }

    fn validate(&self) -> Result<(), OrderError> {
        match *self {
            OrderKind::Market => Ok(()),
            OrderKind::Limit { limit_price } if !is_valid_threshold(limit_price) => {
                Err(OrderError::InvalidLimitPrice(limit_price))
            }
            OrderKind::Stop { stop_price } if !is_valid_threshold(stop_price) => {
                Err(OrderError::InvalidStopPrice(stop_price))
            }
            _ => Ok(()),
        }
    }
}

fn is_valid_threshold(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::Limit { limit_price } => write!(f, "limit@{}", limit_price),
            OrderKind::Stop { stop_price } => write!(f, "stop@{}", stop_price),
        }
    }
}

/// Time-in-force specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Expires at the end of the step it was live in
    #[serde(rename = "day")]
    Day,

    /// Good till cancelled
    #[serde(rename = "gtc")]
    GoodTillCancelled,
}

impl FromStr for TimeInForce {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(TimeInForce::Day),
            "gtc" => Ok(TimeInForce::GoodTillCancelled),
            other => Err(OrderError::InvalidTimeInForce(other.to_string())),
        }
    }
}

/// Order lifecycle: Open → {Executed, Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Executed,
    Cancelled,
}

impl OrderStatus {
    /// Executed and Cancelled admit no further transition
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Executed => write!(f, "executed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single trading instruction
///
/// Status and execution price change only through the order manager; once
/// an order is executed or cancelled it is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    /// Unique, caller-assigned id
    pub id: OrderId,

    /// Symbol being traded
    pub symbol: Symbol,

    /// Buy or sell
    pub direction: Direction,

    /// Day or GTC
    pub time_in_force: TimeInForce,

    /// Opens or extends a short position (meaningful for sells)
    pub short: bool,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    quantity: u64,
    kind: OrderKind,
    pub(crate) status: OrderStatus,
    pub(crate) executed_price: Option<f64>,
}

impl Order {
    /// Create a new open order, validating quantity, identity and threshold
    pub fn new(
        id: impl Into<OrderId>,
        symbol: impl Into<Symbol>,
        quantity: u64,
        direction: Direction,
        time_in_force: TimeInForce,
        kind: OrderKind,
    ) -> Result<Self, OrderError> {
        let id = id.into();
        let symbol = symbol.into();

        if id.as_str().trim().is_empty() {
            return Err(OrderError::EmptyOrderId);
        }
        if symbol.as_str().trim().is_empty() {
            return Err(OrderError::EmptySymbol);
        }
        if quantity == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        if quantity > i64::MAX as u64 {
            return Err(OrderError::QuantityTooLarge(quantity));
        }
        kind.validate()?;

        Ok(Self {
            id,
            symbol,
            direction,
            time_in_force,
            short: false,
            timestamp: Utc::now(),
            quantity,
            kind,
            status: OrderStatus::Open,
            executed_price: None,
        })
    }

    /// Market order: no threshold price
    pub fn market(
        id: impl Into<OrderId>,
        symbol: impl Into<Symbol>,
        quantity: u64,
        direction: Direction,
        time_in_force: TimeInForce,
    ) -> Result<Self, OrderError> {
        Self::new(id, symbol, quantity, direction, time_in_force, OrderKind::Market)
    }

    /// Limit order at `limit_price`
    pub fn limit(
        id: impl Into<OrderId>,
        symbol: impl Into<Symbol>,
        quantity: u64,
        direction: Direction,
        time_in_force: TimeInForce,
        limit_price: f64,
    ) -> Result<Self, OrderError> {
        Self::new(
            id,
            symbol,
            quantity,
            direction,
            time_in_force,
            OrderKind::Limit { limit_price },
        )
    }

    /// Stop order at `stop_price`
    pub fn stop(
        id: impl Into<OrderId>,
        symbol: impl Into<Symbol>,
        quantity: u64,
        direction: Direction,
        time_in_force: TimeInForce,
        stop_price: f64,
    ) -> Result<Self, OrderError> {
        Self::new(
            id,
            symbol,
            quantity,
            direction,
            time_in_force,
            OrderKind::Stop { stop_price },
        )
    }

    /// Mark the order as opening/extending a short
    pub fn with_short(mut self, short: bool) -> Self {
        self.short = short;
        self
    }

    /// Override the creation timestamp (replays stamp orders with bar time)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Price the order was filled at, once executed
    pub fn executed_price(&self) -> Option<f64> {
        self.executed_price
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    pub fn is_buy(&self) -> bool {
        self.direction == Direction::Buy
    }

    /// Signed quantity: positive for buys, negative for sells
    pub fn signed_quantity(&self) -> f64 {
        self.direction.sign() * self.quantity as f64
    }
}
