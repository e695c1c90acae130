//! Protocol-level spot order entity.

use std::fmt;

use super::pair::PairSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// Venue-reported order state, distinct from the local lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled)
    }
}

/// A spot order as exchanged with a venue. `order_id` is client-assigned;
/// timestamps are unix seconds.
#[derive(Debug, Clone)]
pub struct SpotOrder {
    pub order_id: String,
    pub pair: PairSpec,
    pub quantity: f64,
    pub quantity_cumulative: f64,
    pub price: f64,
    pub side: TradeSide,
    pub order_type: OrderType,
    pub status: Option<OrderStatus>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SpotOrder {
    /// A fresh order intent; id and status are assigned by the exchange
    /// façade before it is enqueued.
    pub fn new(quantity: f64, price: f64, side: TradeSide, order_type: OrderType, pair: PairSpec) -> Self {
        Self {
            order_id: String::new(),
            pair,
            quantity,
            quantity_cumulative: 0.0,
            price,
            side,
            order_type,
            status: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Quantity not yet executed.
    pub fn remaining(&self) -> f64 {
        self.quantity - self.quantity_cumulative
    }
}

impl fmt::Display for SpotOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} order of pair {} with quantity {:.3} and price {:.3}, filled {}",
            self.order_type.as_str(),
            self.side.as_str(),
            self.pair.trading_pair,
            self.quantity,
            self.price,
            self.quantity_cumulative,
        )
    }
}
