//! Order manager: one map from id to order plus an explicit status tag
//!
//! The open / executed / cancelled partitions are views over the same map,
//! so an order can never sit in two partitions at once. Every status change
//! goes through [`OrderManager::transition`].

use crate::oms::types::{Order, OrderId, OrderStatus};
use crate::Symbol;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// State errors: operating on an order outside the expected partition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OmsError {
    #[error("order {0} has already been submitted")]
    DuplicateOrderId(OrderId),

    #[error("order {id} is {status}; only open orders can be submitted")]
    NotSubmittable { id: OrderId, status: OrderStatus },

    #[error("order {0} is unknown")]
    UnknownOrder(OrderId),

    #[error("order {id} is {status}, expected open")]
    NotOpen { id: OrderId, status: OrderStatus },
}

/// Order Management System
#[derive(Debug, Clone, Default)]
pub struct OrderManager {
    /// Fast lookup: OrderId → Order
    orders: HashMap<OrderId, Order>,

    /// Submission order, used for every ordered view
    sequence: Vec<OrderId>,
}

impl OrderManager {
    /// Create an empty order manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a new open order
    ///
    /// Rejects an id that is already known in any partition.
    pub fn submit(&mut self, order: Order) -> Result<(), OmsError> {
        if order.status() != OrderStatus::Open {
            return Err(OmsError::NotSubmittable {
                id: order.id.clone(),
                status: order.status(),
            });
        }
        if self.orders.contains_key(&order.id) {
            return Err(OmsError::DuplicateOrderId(order.id.clone()));
        }

        debug!(
            "Submitted order {}: {} {} {} ({})",
            order.id,
            order.direction,
            order.quantity(),
            order.symbol,
            order.kind()
        );

        self.sequence.push(order.id.clone());
        self.orders.insert(order.id.clone(), order);
        Ok(())
    }

    /// Cancel an open order
    pub fn cancel(&mut self, order_id: &OrderId) -> Result<&Order, OmsError> {
        let order = self.transition(order_id, OrderStatus::Cancelled, None)?;
        debug!("Cancelled order {}", order.id);
        Ok(order)
    }

    /// Mark an open order executed at `executed_price`
    pub fn execute(&mut self, order_id: &OrderId, executed_price: f64) -> Result<&Order, OmsError> {
        self.transition(order_id, OrderStatus::Executed, Some(executed_price))
    }

    /// Single state-transition function: Open → {Executed, Cancelled}
    ///
    /// Validates first, then writes status and price together, so a failed
    /// transition leaves the order untouched.
    fn transition(
        &mut self,
        order_id: &OrderId,
        to: OrderStatus,
        executed_price: Option<f64>,
    ) -> Result<&Order, OmsError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| OmsError::UnknownOrder(order_id.clone()))?;

        if order.status != OrderStatus::Open {
            return Err(OmsError::NotOpen {
                id: order_id.clone(),
                status: order.status,
            });
        }

        order.status = to;
        order.executed_price = executed_price;
        Ok(&*order)
    }

    /// All open orders on `symbol`, in submission order
    pub fn orders_for_symbol(&self, symbol: &Symbol) -> Vec<&Order> {
        self.open_orders()
            .filter(|order| &order.symbol == symbol)
            .collect()
    }

    /// Get order by ID
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Current status of an order, `None` if never submitted
    pub fn status(&self, order_id: &OrderId) -> Option<OrderStatus> {
        self.orders.get(order_id).map(|o| o.status())
    }

    fn with_status(&self, status: OrderStatus) -> impl Iterator<Item = &Order> + '_ {
        self.sequence
            .iter()
            .filter_map(|id| self.orders.get(id))
            .filter(move |order| order.status() == status)
    }

    /// Open orders in submission order
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.with_status(OrderStatus::Open)
    }

    /// Executed orders in submission order
    pub fn executed_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.with_status(OrderStatus::Executed)
    }

    /// Cancelled orders in submission order
    pub fn cancelled_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.with_status(OrderStatus::Cancelled)
    }

    /// Snapshot of open order ids, in submission order
    pub fn open_order_ids(&self) -> Vec<OrderId> {
        self.open_orders().map(|o| o.id.clone()).collect()
    }

    /// Number of open orders
    pub fn open_count(&self) -> usize {
        self.open_orders().count()
    }

    /// Number of orders ever submitted
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
