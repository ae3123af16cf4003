//! Ledger Replay
//!
//! A trading-account replay engine: market, limit and stop orders are held
//! by an order manager, evaluated against a historical price series one step
//! at a time, and booked into a cash or margin account ledger.

pub mod account;
pub mod config;
pub mod data;
pub mod oms;
pub mod simulation;
pub mod types;

pub use account::{Account, CashAccount, Ledger, LedgerError, MarginAccount, MarginRequirements};
pub use config::Config;
pub use data::{HistoricalData, PriceSeries};
pub use oms::{Order, OrderId, OrderKind, OrderManager, OrderStatus, TimeInForce};
pub use simulation::{PerformanceRecord, Simulation, SimulationError, StepReport};
pub use types::*;
