//! Trading pair: static venue parameters plus rolling market-data history.

use std::collections::VecDeque;

use super::market_data::{PriceCandles, Tickers};
use super::order_book::OrderBook;
use super::Token;

/// The static half of a pair: identity and venue-configured granularity.
/// Cheap to clone; orders and connectors hold this, never the stateful
/// [`Pair`], so ownership stays a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PairSpec {
    pub base_asset: Token,
    pub quote_asset: Token,
    pub trading_pair: String,
    pub tick_size: f64,
    pub quantity_increment: f64,
    pub taker_rate: f64,
    pub maker_rate: f64,
}

impl PairSpec {
    pub fn new(base: Token, quote: Token, symbol: Option<String>) -> Self {
        let trading_pair =
            symbol.unwrap_or_else(|| format!("{}{}", base.symbol(), quote.symbol()));
        Self {
            base_asset: base,
            quote_asset: quote,
            trading_pair,
            tick_size: 0.0,
            quantity_increment: 0.0,
            taker_rate: 0.0,
            maker_rate: 0.0,
        }
    }
}

/// A pair together with the latest snapshot of each market-data kind and a
/// bounded history. Eviction is FIFO; the current snapshot is by construction
/// the last element appended.
#[derive(Debug)]
pub struct Pair {
    spec: PairSpec,
    max_length: usize,
    orderbooks: VecDeque<OrderBook>,
    tickers: VecDeque<Tickers>,
    candles: VecDeque<PriceCandles>,
}

impl Pair {
    pub fn new(spec: PairSpec, max_length: usize) -> Self {
        Self {
            spec,
            max_length,
            orderbooks: VecDeque::new(),
            tickers: VecDeque::new(),
            candles: VecDeque::new(),
        }
    }

    pub fn spec(&self) -> &PairSpec {
        &self.spec
    }

    pub fn trading_pair(&self) -> &str {
        &self.spec.trading_pair
    }

    pub fn base_asset(&self) -> &str {
        self.spec.base_asset.symbol()
    }

    pub fn quote_asset(&self) -> &str {
        self.spec.quote_asset.symbol()
    }

    pub fn current_orderbook(&self) -> Option<&OrderBook> {
        self.orderbooks.back()
    }

    pub fn current_ticker(&self) -> Option<&Tickers> {
        self.tickers.back()
    }

    pub fn current_candles(&self) -> Option<&PriceCandles> {
        self.candles.back()
    }

    pub fn orderbooks(&self) -> &VecDeque<OrderBook> {
        &self.orderbooks
    }

    pub fn tickers(&self) -> &VecDeque<Tickers> {
        &self.tickers
    }

    pub fn candles(&self) -> &VecDeque<PriceCandles> {
        &self.candles
    }

    /// Mid of the current ticker's best bid/ask.
    pub fn mid_price(&self) -> Option<f64> {
        self.tickers.back().map(|t| (t.ask + t.bid) / 2.0)
    }

    /// Last trade price from the current ticker.
    pub fn reference_price(&self) -> Option<f64> {
        self.tickers.back().map(|t| t.close)
    }

    pub fn add_orderbook(&mut self, book: OrderBook) {
        push_bounded(&mut self.orderbooks, book, self.max_length);
    }

    pub fn add_ticker(&mut self, ticker: Tickers) {
        push_bounded(&mut self.tickers, ticker, self.max_length);
    }

    pub fn add_candles(&mut self, candles: PriceCandles) {
        push_bounded(&mut self.candles, candles, self.max_length);
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, max: usize) {
    if ring.len() >= max {
        ring.pop_front();
    }
    ring.push_back(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::market_data::CandlePeriod;

    fn spec() -> PairSpec {
        PairSpec::new(Token::new("eth"), Token::new("usdt"), None)
    }

    fn ticker(close: f64) -> Tickers {
        Tickers {
            timestamp: 0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close,
            ask: close + 1.0,
            bid: close - 1.0,
            volume: 0.0,
        }
    }

    #[test]
    fn symbol_is_base_concat_quote_uppercased() {
        assert_eq!(spec().trading_pair, "ETHUSDT");
        let custom = PairSpec::new(Token::new("eth"), Token::new("usdt"), Some("ETH-USDT".into()));
        assert_eq!(custom.trading_pair, "ETH-USDT");
    }

    #[test]
    fn history_evicts_fifo_and_current_is_last_appended() {
        let mut pair = Pair::new(spec(), 3);
        for i in 0..5 {
            pair.add_ticker(ticker(i as f64));
        }
        assert_eq!(pair.tickers().len(), 3);
        assert!((pair.tickers().front().unwrap().close - 2.0).abs() < 1e-9);
        assert!((pair.current_ticker().unwrap().close - 4.0).abs() < 1e-9);
    }

    #[test]
    fn derived_prices_come_from_current_ticker() {
        let mut pair = Pair::new(spec(), 10);
        assert_eq!(pair.mid_price(), None);
        pair.add_ticker(ticker(2000.0));
        assert!((pair.mid_price().unwrap() - 2000.0).abs() < 1e-9);
        assert!((pair.reference_price().unwrap() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn candle_history_is_bounded_too() {
        let mut pair = Pair::new(spec(), 2);
        for i in 0..4 {
            pair.add_candles(PriceCandles {
                timestamp: i,
                open: 0.0,
                high: 0.0,
                low: 0.0,
                close: 0.0,
                volume: 0.0,
                period: CandlePeriod::M1,
            });
        }
        assert_eq!(pair.candles().len(), 2);
        assert_eq!(pair.current_candles().unwrap().timestamp, 3);
    }
}
