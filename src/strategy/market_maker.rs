//! Symmetric level quoting around the order-book mid.

use tracing::debug;

use crate::entities::{OrderType, SpotOrder, TradeSide};
use crate::error::StrategyError;
use crate::exchange::SpotExchange;

use super::Strategy;

#[derive(Debug, Clone)]
pub struct MarketMakerConfig {
    /// Full quoted spread around the mid.
    pub spread: f64,
    /// Quote levels on each side.
    pub levels: usize,
    /// Multiplicative price offset between consecutive levels.
    pub level_offset: f64,
    /// Quantity per level, in base asset.
    pub quantity: f64,
}

impl Default for MarketMakerConfig {
    fn default() -> Self {
        Self {
            spread: 0.08,
            levels: 1,
            level_offset: 0.01,
            quantity: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct MarketMakerStrategy {
    cfg: MarketMakerConfig,
}

impl MarketMakerStrategy {
    pub fn new(cfg: MarketMakerConfig) -> Self {
        Self { cfg }
    }
}

impl Strategy for MarketMakerStrategy {
    fn name(&self) -> &'static str {
        "market_maker"
    }

    fn run(&mut self, exchange: &mut SpotExchange) -> Result<(), StrategyError> {
        let mut quotes = Vec::new();
        for pair in exchange.pairs() {
            let Some(mid) = pair.current_orderbook().and_then(|b| b.mid_price()) else {
                debug!(pair = %pair.trading_pair(), "no orderbook mid yet, not quoting");
                continue;
            };
            let spec = pair.spec().clone();
            let ask = mid * (1.0 + self.cfg.spread / 2.0);
            let bid = mid * (1.0 - self.cfg.spread / 2.0);
            for level in 0..self.cfg.levels {
                let ask_price = ask * (1.0 + level as f64 * self.cfg.level_offset);
                quotes.push(SpotOrder::new(
                    self.cfg.quantity,
                    ask_price,
                    TradeSide::Sell,
                    OrderType::Limit,
                    spec.clone(),
                ));
                let bid_price = bid * (1.0 - level as f64 * self.cfg.level_offset);
                quotes.push(SpotOrder::new(
                    self.cfg.quantity,
                    bid_price,
                    TradeSide::Buy,
                    OrderType::Limit,
                    spec.clone(),
                ));
            }
        }
        if !quotes.is_empty() {
            exchange.create_spot_orders(quotes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_straddle_the_mid() {
        let cfg = MarketMakerConfig::default();
        let mid = 100.0;
        let ask = mid * (1.0 + cfg.spread / 2.0);
        let bid = mid * (1.0 - cfg.spread / 2.0);
        assert!(ask > mid && bid < mid);
        assert!((ask - 104.0).abs() < 1e-9);
        assert!((bid - 96.0).abs() < 1e-9);
    }
}
