//! Exchange loop and order lifecycle management.

pub mod order_manager;
pub mod spot;

pub use order_manager::{Lifecycle, OrderManager, SubOrderManager};
pub use spot::{ExchangeStatus, PhaseStatus, Readiness, SpotExchange};
