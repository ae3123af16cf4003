//! Configuration management
//!
//! Handles loading and parsing of JSON replay configurations with
//! environment variable overrides for the data directory and starting cash.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::account::MarginRequirements;
use crate::data::parse_timestamp;
use crate::oms::{Order, OrderError, OrderKind, TimeInForce};
use crate::{Direction, Symbol};

/// Environment override for `data.data_dir`
pub const ENV_DATA_DIR: &str = "LEDGER_REPLAY_DATA_DIR";

/// Environment override for `account.initial_cash`
pub const ENV_INITIAL_CASH: &str = "LEDGER_REPLAY_INITIAL_CASH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Orders submitted before the first step
    #[serde(default)]
    pub orders: Vec<OrderSpec>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        dotenv::dotenv().ok();
        config.apply_env_overrides()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(data_dir) = std::env::var(ENV_DATA_DIR) {
            self.data.data_dir = data_dir;
        }
        if let Ok(cash) = std::env::var(ENV_INITIAL_CASH) {
            self.account.initial_cash = cash
                .trim()
                .parse()
                .with_context(|| format!("{} is not a number: {}", ENV_INITIAL_CASH, cash))?;
        }
        Ok(())
    }

    /// Validated orders from the `orders` section
    pub fn orders(&self) -> Result<Vec<Order>> {
        self.orders
            .iter()
            .map(|spec| {
                Order::try_from(spec.clone())
                    .with_context(|| format!("Invalid order '{}' in config", spec.id))
            })
            .collect()
    }
}

/// Cash or margin account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    #[default]
    Cash,
    Margin,
}

/// Account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub kind: AccountKind,
    pub initial_cash: f64,
    /// Margin credit; ignored for cash accounts
    #[serde(default)]
    pub margin_balance: f64,
    #[serde(default)]
    pub margin_requirements: MarginRequirements,
}

impl Default for AccountConfig {
    fn default() -> Self {
        AccountConfig {
            kind: AccountKind::Cash,
            initial_cash: 100_000.0,
            margin_balance: 0.0,
            margin_requirements: MarginRequirements::default(),
        }
    }
}

/// Replay bounds and order expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Inclusive start (YYYY-MM-DD or RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Inclusive end (YYYY-MM-DD or RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default = "default_expire_day_orders")]
    pub expire_day_orders: bool,
}

fn default_expire_day_orders() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            start_date: None,
            end_date: None,
            expire_day_orders: true,
        }
    }
}

impl SimulationConfig {
    pub fn start(&self) -> Result<Option<DateTime<Utc>>> {
        self.start_date
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .context("Invalid start_date")
    }

    /// End bound; a bare date covers the whole day
    pub fn end(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(end) = self.end_date.as_deref() else {
            return Ok(None);
        };
        let parsed = parse_timestamp(end).context("Invalid end_date")?;
        if end.trim().len() == 10 {
            return Ok(Some(parsed + chrono::Duration::days(1) - chrono::Duration::nanoseconds(1)));
        }
        Ok(Some(parsed))
    }
}

/// Price data location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: String,
    pub symbols: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            data_dir: "data".to_string(),
            symbols: Vec::new(),
        }
    }
}

impl DataConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }
}

/// Order as written in a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub id: String,
    pub symbol: String,
    pub quantity: u64,
    /// "buy" or "sell"
    pub direction: String,
    /// "day" or "gtc"
    #[serde(default = "default_time_in_force")]
    pub time_in_force: String,
    #[serde(rename = "type", default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub short: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

fn default_time_in_force() -> String {
    "gtc".to_string()
}

fn default_order_type() -> OrderType {
    OrderType::Market
}

impl TryFrom<OrderSpec> for Order {
    type Error = OrderError;

    fn try_from(spec: OrderSpec) -> Result<Self, Self::Error> {
        let direction: Direction = spec.direction.parse()?;
        let time_in_force: TimeInForce = spec.time_in_force.parse()?;

        let kind = match (spec.order_type, spec.limit_price, spec.stop_price) {
            (OrderType::Market, None, None) => OrderKind::Market,
            (OrderType::Limit, Some(limit_price), None) => OrderKind::Limit { limit_price },
            (OrderType::Stop, None, Some(stop_price)) => OrderKind::Stop { stop_price },
            (OrderType::Limit, None, _) => return Err(OrderError::MissingLimitPrice),
            (OrderType::Stop, _, None) => return Err(OrderError::MissingStopPrice),
            _ => return Err(OrderError::UnexpectedThreshold),
        };

        Ok(Order::new(spec.id, spec.symbol, spec.quantity, direction, time_in_force, kind)?
            .with_short(spec.short))
    }
}
