//! Read-only strategy: logs the account state each cycle and places nothing.
//! Handy for verifying connectivity before enabling a quoting strategy.

use tracing::info;

use crate::error::StrategyError;
use crate::exchange::SpotExchange;

use super::Strategy;

#[derive(Debug, Default)]
pub struct ObserverStrategy;

impl Strategy for ObserverStrategy {
    fn name(&self) -> &'static str {
        "observer"
    }

    fn run(&mut self, exchange: &mut SpotExchange) -> Result<(), StrategyError> {
        for (token, balance) in exchange.inventory().current_balances() {
            info!(
                exchange = %exchange.exchange_name(),
                token = %token,
                free = balance.free,
                used = balance.used,
                "balance"
            );
        }
        for pair in exchange.pairs() {
            if let Some(mid) = pair.mid_price() {
                info!(pair = %pair.trading_pair(), mid, "market");
            }
        }
        Ok(())
    }
}
