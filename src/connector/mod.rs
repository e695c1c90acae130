//! Venue adapters behind one uniform surface.
//!
//! A connector is created empty by the registry, then configured with the
//! pair set and credentials. Operations return `None` (or a partial batch)
//! on definitive failure after retries; the exchange loop decides what a
//! miss means for the interval.

pub mod bitrue;
pub mod fmfw;
pub mod http;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::entities::{
    Account, CandlePeriod, OrderBook, PairSpec, PriceCandles, SpotOrder, Tickers, TokenBalance,
};
use crate::error::ConfigError;
use crate::settings::Settings;

use self::bitrue::BitrueConnector;
use self::fmfw::FmfwConnector;
use self::http::RestClient;

/// Round a value to the nearest multiple of `increment`, half to even.
/// Applied to every price (tick size) and quantity (quantity increment)
/// before it leaves for a venue.
pub fn round_nearest(value: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return value;
    }
    (value / increment).round_ties_even() * increment
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Install the pair set and credentials. Must be called once before any
    /// operation.
    fn configure(&mut self, pairs: Vec<PairSpec>, account: Account);

    /// Signed. Token -> {free, used, total}, normalised from whatever shape
    /// the venue reports.
    async fn get_inventory_balance(&self) -> Option<HashMap<String, TokenBalance>>;

    /// Public. trading_pair -> order book for every configured pair.
    async fn get_order_book(&self) -> Option<HashMap<String, OrderBook>>;

    /// Public. trading_pair -> 24h ticker.
    async fn get_tickers(&self) -> Option<HashMap<String, Tickers>>;

    /// Public. trading_pair -> latest candle of `period`.
    async fn get_trading_candles(
        &self,
        period: CandlePeriod,
    ) -> Option<HashMap<String, PriceCandles>>;

    /// Signed. All orders the venue considers open for the configured pairs.
    async fn get_active_spot_orders(&self) -> Vec<SpotOrder>;

    /// Signed POST. Returns the order enriched with venue status and
    /// timestamps, or `None` when the venue gave no usable answer.
    async fn create_spot_order(&self, order: SpotOrder) -> Option<SpotOrder>;

    /// Signed DELETE by client order id.
    async fn cancel_spot_order(&self, order: SpotOrder) -> Option<SpotOrder>;

    /// Signed. Refresh status / cumulative quantity / updated_at.
    async fn query_order(&self, order: SpotOrder) -> Option<SpotOrder>;

    /// Post a batch; the returned subset contains the orders the venue
    /// answered for.
    async fn create_spot_orders(&self, orders: Vec<SpotOrder>) -> Vec<SpotOrder> {
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            if let Some(res) = self.create_spot_order(order).await {
                out.push(res);
            }
        }
        out
    }

    /// Cancel a batch; partial on per-order failure.
    async fn cancel_spot_orders(&self, orders: Vec<SpotOrder>) -> Vec<SpotOrder> {
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            if let Some(res) = self.cancel_spot_order(order).await {
                out.push(res);
            }
        }
        out
    }

    /// Query a batch of tracked orders; misses are dropped from the result
    /// and the order manager decides whether that is tolerable.
    async fn query_orders(&self, orders: Vec<SpotOrder>) -> Vec<SpotOrder> {
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            if let Some(res) = self.query_order(order).await {
                out.push(res);
            }
        }
        out
    }
}

/// Registry of concrete adapters; unknown venue is a fatal config error.
pub fn build(name: &str, settings: &Settings) -> Result<Box<dyn Connector>, ConfigError> {
    match name.to_uppercase().as_str() {
        "FMFW" => Ok(Box::new(FmfwConnector::new(settings))),
        "BITRUE" => Ok(Box::new(BitrueConnector::new(settings))),
        other => Err(ConfigError::NoSuchConnector(other.to_string())),
    }
}

/// State every adapter shares: the configured pairs in venue order, the
/// derived token set, credentials and the REST pipeline.
pub struct ConnectorCore {
    pub rest: RestClient,
    pub pairs: Vec<PairSpec>,
    pub trading_pairs: Vec<String>,
    pub tokens: Vec<String>,
    pub account: Option<Account>,
}

impl ConnectorCore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            rest: RestClient::new(settings),
            pairs: Vec::new(),
            trading_pairs: Vec::new(),
            tokens: Vec::new(),
            account: None,
        }
    }

    pub fn configure(&mut self, pairs: Vec<PairSpec>, account: Account) {
        self.trading_pairs = pairs.iter().map(|p| p.trading_pair.clone()).collect();
        let mut tokens: Vec<String> = Vec::new();
        for p in &pairs {
            for sym in [p.base_asset.symbol(), p.quote_asset.symbol()] {
                if !tokens.iter().any(|t| t == sym) {
                    tokens.push(sym.to_string());
                }
            }
        }
        self.tokens = tokens;
        self.pairs = pairs;
        self.account = Some(account);
    }

    /// Map a venue symbol back to its configured pair by positional lookup
    /// on the ordered pair list.
    pub fn get_pair(&self, symbol: &str) -> Option<&PairSpec> {
        let idx = self.trading_pairs.iter().position(|s| s == symbol)?;
        self.pairs.get(idx)
    }

    pub fn api_key(&self) -> &str {
        self.account.as_ref().map(|a| a.api_key.as_str()).unwrap_or("")
    }

    pub fn secret_key(&self) -> &str {
        self.account.as_ref().map(|a| a.secret_key.as_str()).unwrap_or("")
    }

    /// Collapse a pipeline result to presence, logging the failure class.
    /// Fatal statuses (401/403/500) are operator problems; everything else
    /// is an interval-level miss.
    pub fn ok_or_log(
        &self,
        venue: &str,
        what: &str,
        res: Result<serde_json::Value, crate::error::ApiError>,
    ) -> Option<serde_json::Value> {
        match res {
            Ok(v) => Some(v),
            Err(err) if err.is_fatal() => {
                tracing::error!(venue, what, %err, "venue call failed, operator attention needed");
                None
            }
            Err(err) => {
                tracing::warn!(venue, what, %err, "venue call failed");
                None
            }
        }
    }
}

/// A JSON number that venues may spell as a number or a string.
pub(crate) fn json_f64(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}
