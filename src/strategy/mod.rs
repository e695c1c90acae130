//! Pluggable strategy bodies behind a compile-time registry.
//!
//! The host invokes [`Strategy::run`] once per interval on an exchange that
//! finished its fetch; a strategy interacts solely through the exchange
//! façade (post/cancel orders, read pairs, inventory, active orders).

pub mod market_maker;
pub mod observer;

use crate::error::StrategyError;
use crate::exchange::SpotExchange;

pub use market_maker::MarketMakerStrategy;
pub use observer::ObserverStrategy;

pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, exchange: &mut SpotExchange) -> Result<(), StrategyError>;
}

/// Resolve a profile's `strategy_file` name; unknown names are a fatal
/// config problem at bot construction time.
pub fn build(name: &str) -> Result<Box<dyn Strategy>, StrategyError> {
    match name {
        "MM" | "market_maker" => Ok(Box::new(MarketMakerStrategy::default())),
        "MM2" | "observer" | "test" => Ok(Box::new(ObserverStrategy)),
        other => Err(StrategyError::NoSuchStrategy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        assert_eq!(build("MM").unwrap().name(), "market_maker");
        assert_eq!(build("market_maker").unwrap().name(), "market_maker");
        assert_eq!(build("test").unwrap().name(), "observer");
    }

    #[test]
    fn registry_rejects_unknown_names() {
        assert!(matches!(
            build("momentum"),
            Err(StrategyError::NoSuchStrategy(_))
        ));
    }
}
