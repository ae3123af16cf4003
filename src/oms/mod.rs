//! Order Management System (OMS)
//!
//! Order lifecycle for the replay engine:
//! - Market, limit and stop orders with validated threshold prices
//! - Exact, inclusive fill determination against a step price
//! - Open / executed / cancelled partitions with exactly-once transitions

pub mod fill;
pub mod manager;
pub mod types;

// Re-export core types
pub use fill::{check_order_fill, fill_price};
pub use manager::{OmsError, OrderManager};
pub use types::{Order, OrderError, OrderId, OrderKind, OrderStatus, TimeInForce};
