//! Fill determination against a single step price
//!
//! Comparisons are against the literal threshold, inclusive, with no epsilon.

use crate::oms::types::{Order, OrderKind};
use crate::Direction;

/// Check whether `order` qualifies for a fill at `price`
///
/// Non-finite prices never fill. The order is not mutated.
pub fn check_order_fill(price: f64, order: &Order) -> bool {
    if !price.is_finite() {
        return false;
    }

    match (order.direction, order.kind()) {
        (_, OrderKind::Market) => true,

        // Buy limit: fills at or below the limit
        (Direction::Buy, OrderKind::Limit { limit_price }) => price <= limit_price,

        // Sell limit: fills at or above the limit
        (Direction::Sell, OrderKind::Limit { limit_price }) => price >= limit_price,

        // Buy stop: triggers at or above the stop
        (Direction::Buy, OrderKind::Stop { stop_price }) => price >= stop_price,

        // Sell stop: triggers at or below the stop
        (Direction::Sell, OrderKind::Stop { stop_price }) => price <= stop_price,
    }
}

/// Price a qualifying order executes at
///
/// Market orders take the step price; limit and stop orders execute at their
/// own threshold, the same price used to reserve capital for them. This holds
/// even when the step price gaps through a stop.
pub fn fill_price(price: f64, order: &Order) -> f64 {
    order.kind().threshold().unwrap_or(price)
}
