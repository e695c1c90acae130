//! Domain entities: value types shared by the connectors, the order manager
//! and the exchange loop.

pub mod inventory;
pub mod market_data;
pub mod order;
pub mod order_book;
pub mod pair;

pub use inventory::{Inventory, TokenBalance};
pub use market_data::{CandlePeriod, PriceCandles, Tickers};
pub use order::{OrderStatus, OrderType, SpotOrder, TradeSide};
pub use order_book::OrderBook;
pub use pair::{Pair, PairSpec};

use std::fmt;

/// A token symbol, uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(symbol: &str) -> Self {
        Self(symbol.to_uppercase())
    }

    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Venue credentials. Key material never appears in Debug output.
#[derive(Clone)]
pub struct Account {
    pub api_key: String,
    pub secret_key: String,
}

impl Account {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self { api_key, secret_key }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("api_key", &"***").finish()
    }
}

/// Everything needed to bring one venue up: name, pairs, credentials.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub exchange: String,
    pub pairs: Vec<PairSpec>,
    pub account: Account,
}

impl MarketInfo {
    pub fn new(exchange: &str, pairs: Vec<PairSpec>, account: Account) -> Self {
        Self {
            exchange: exchange.to_uppercase(),
            pairs,
            account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_uppercases() {
        assert_eq!(Token::new("eth").symbol(), "ETH");
    }

    #[test]
    fn account_debug_redacts_secrets() {
        let a = Account::new("key".into(), "secret".into());
        let dbg = format!("{a:?}");
        assert!(dbg.contains("***"));
        assert!(!dbg.contains("secret"));
    }
}
