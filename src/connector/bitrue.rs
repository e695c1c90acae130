//! BITRUE adapter (Binance-compatible API). Every request carries
//! `recvWindow` + `timestamp` and an HMAC-SHA256 signature over the encoded
//! query string; the api key travels in the `X-MBX-APIKEY` header.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::entities::{
    Account, CandlePeriod, OrderBook, OrderStatus, OrderType, PairSpec, PriceCandles, SpotOrder,
    Tickers, TokenBalance, TradeSide,
};
use crate::settings::Settings;

use super::http::{encode_query, RestRequest};
use super::{json_f64, round_nearest, Connector, ConnectorCore};

const API_ENDPOINT: &str = "https://openapi.bitrue.com";
const VENUE: &str = "BITRUE";
const RECV_WINDOW: &str = "10000";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of the encoded query string.
fn sign_query(secret_key: &str, query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn parse_status(raw: &str) -> OrderStatus {
    match raw {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        _ => OrderStatus::Canceled,
    }
}

fn decode_levels(value: &Value) -> Vec<(f64, f64)> {
    value
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let level = row.as_array()?;
                    Some((json_f64(level.first()?)?, json_f64(level.get(1)?)?))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct BitrueConnector {
    core: ConnectorCore,
    /// Client order id -> venue-assigned numeric id; the venue wants its own
    /// id back on cancel and query.
    order_ids: Mutex<HashMap<String, i64>>,
}

impl BitrueConnector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            core: ConnectorCore::new(settings),
            order_ids: Mutex::new(HashMap::new()),
        }
    }

    fn order_ids(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.order_ids.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Build a signed request: query + recvWindow + timestamp, signature
    /// appended, api key in the header.
    fn signed_request(&self, method: Method, path: &str, query: &[(&str, String)]) -> RestRequest {
        let mut pairs: Vec<(&str, String)> = query.to_vec();
        pairs.push(("recvWindow", RECV_WINDOW.to_string()));
        pairs.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));
        let encoded = encode_query(&pairs);
        let signature = sign_query(self.core.secret_key(), &encoded);
        let url = format!("{API_ENDPOINT}{path}?{encoded}&signature={signature}");
        RestRequest::get(url)
            .with_method(method)
            .with_header("X-MBX-APIKEY", self.core.api_key().to_string())
    }

    /// Open/queried order payload to [`SpotOrder`].
    fn decode_order(&self, value: &Value) -> Option<SpotOrder> {
        let symbol = value.get("symbol")?.as_str()?;
        let pair = self.core.get_pair(symbol)?.clone();
        let order = SpotOrder {
            order_id: value.get("clientOrderId")?.as_str()?.to_string(),
            quantity: json_f64(value.get("origQty")?)?,
            quantity_cumulative: value.get("executedQty").and_then(json_f64).unwrap_or(0.0),
            price: value.get("price").and_then(json_f64).unwrap_or(0.0),
            side: if value.get("side")?.as_str()? == "BUY" {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            order_type: if value.get("type")?.as_str()? == "LIMIT" {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            status: Some(parse_status(value.get("status")?.as_str()?)),
            created_at: value
                .get("time")
                .and_then(|v| v.as_i64())
                .map(|ms| ms / 1000)
                .unwrap_or(0),
            updated_at: value
                .get("updateTime")
                .and_then(|v| v.as_i64())
                .map(|ms| ms / 1000)
                .unwrap_or(0),
            pair,
        };
        if let Some(venue_id) = value.get("orderId").and_then(|v| v.as_i64()) {
            self.order_ids().insert(order.order_id.clone(), venue_id);
        }
        Some(order)
    }
}

#[async_trait]
impl Connector for BitrueConnector {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn configure(&mut self, pairs: Vec<PairSpec>, account: Account) {
        self.core.configure(pairs, account);
    }

    async fn get_inventory_balance(&self) -> Option<HashMap<String, TokenBalance>> {
        let req = self.signed_request(Method::GET, "/api/v1/account", &[]);
        let value = self
            .core
            .ok_or_log(VENUE, "balance", self.core.rest.request(req).await)?;
        let rows = value.get("balances")?.as_array()?;
        let mut balances = HashMap::new();
        for row in rows {
            let asset = row
                .get("asset")
                .and_then(|v| v.as_str())
                .map(str::to_uppercase);
            let free = row.get("free").and_then(json_f64);
            let locked = row.get("locked").and_then(json_f64).unwrap_or(0.0);
            if let (Some(asset), Some(free)) = (asset, free) {
                if self.core.tokens.contains(&asset) {
                    balances.insert(asset, TokenBalance::new(free, locked));
                }
            }
        }
        if balances.is_empty() {
            warn!(venue = VENUE, "no balances for the configured tokens");
            return None;
        }
        Some(balances)
    }

    async fn get_order_book(&self) -> Option<HashMap<String, OrderBook>> {
        let mut books = HashMap::new();
        let ts = chrono::Utc::now().timestamp();
        for symbol in &self.core.trading_pairs {
            let req =
                self.signed_request(Method::GET, "/api/v1/depth", &[("symbol", symbol.clone())]);
            if let Some(value) = self
                .core
                .ok_or_log(VENUE, "orderbook", self.core.rest.request(req).await)
            {
                books.insert(
                    symbol.clone(),
                    OrderBook::new(
                        decode_levels(value.get("bids").unwrap_or(&Value::Null)),
                        decode_levels(value.get("asks").unwrap_or(&Value::Null)),
                        ts,
                    ),
                );
            }
        }
        (!books.is_empty()).then_some(books)
    }

    async fn get_tickers(&self) -> Option<HashMap<String, Tickers>> {
        let mut tickers = HashMap::new();
        let ts = chrono::Utc::now().timestamp();
        for symbol in &self.core.trading_pairs {
            let req = self.signed_request(
                Method::GET,
                "/api/v1/ticker/24hr",
                &[("symbol", symbol.clone())],
            );
            let Some(value) = self
                .core
                .ok_or_log(VENUE, "ticker", self.core.rest.request(req).await)
            else {
                continue;
            };
            // The venue wraps the 24h stats in a one-element array.
            let row = if let Some(rows) = value.as_array() {
                match rows.first() {
                    Some(row) => row,
                    None => continue,
                }
            } else {
                &value
            };
            tickers.insert(
                symbol.clone(),
                Tickers {
                    timestamp: ts,
                    open: row.get("openPrice").and_then(json_f64).unwrap_or(0.0),
                    high: row.get("highPrice").and_then(json_f64).unwrap_or(0.0),
                    low: row.get("lowPrice").and_then(json_f64).unwrap_or(0.0),
                    close: row.get("lastPrice").and_then(json_f64).unwrap_or(0.0),
                    ask: row.get("askPrice").and_then(json_f64).unwrap_or(0.0),
                    bid: row.get("bidPrice").and_then(json_f64).unwrap_or(0.0),
                    volume: row.get("volume").and_then(json_f64).unwrap_or(0.0),
                },
            );
        }
        (!tickers.is_empty()).then_some(tickers)
    }

    async fn get_trading_candles(
        &self,
        period: CandlePeriod,
    ) -> Option<HashMap<String, PriceCandles>> {
        let mut candles = HashMap::new();
        for symbol in &self.core.trading_pairs {
            let req = self.signed_request(
                Method::GET,
                "/api/v1/klines",
                &[
                    ("symbol", symbol.clone()),
                    ("interval", period.as_interval().to_string()),
                    ("limit", "1".to_string()),
                ],
            );
            let Some(value) = self
                .core
                .ok_or_log(VENUE, "candles", self.core.rest.request(req).await)
            else {
                continue;
            };
            let Some(row) = value.as_array().and_then(|a| a.last()) else {
                continue;
            };
            let cells = row.as_array();
            let cell = |i: usize| {
                cells
                    .and_then(|c| c.get(i))
                    .and_then(json_f64)
                    .unwrap_or(0.0)
            };
            candles.insert(
                symbol.clone(),
                PriceCandles {
                    timestamp: cells
                        .and_then(|c| c.first())
                        .and_then(|v| v.as_i64())
                        .map(|ms| ms / 1000)
                        .unwrap_or(0),
                    open: cell(1),
                    high: cell(2),
                    low: cell(3),
                    close: cell(4),
                    volume: cell(5),
                    period,
                },
            );
        }
        (!candles.is_empty()).then_some(candles)
    }

    async fn get_active_spot_orders(&self) -> Vec<SpotOrder> {
        let mut orders = Vec::new();
        self.order_ids().clear();
        for symbol in &self.core.trading_pairs {
            let req = self.signed_request(
                Method::GET,
                "/api/v1/openOrders",
                &[("symbol", symbol.clone())],
            );
            let Some(value) = self
                .core
                .ok_or_log(VENUE, "active orders", self.core.rest.request(req).await)
            else {
                continue;
            };
            if let Some(rows) = value.as_array() {
                orders.extend(rows.iter().filter_map(|r| self.decode_order(r)));
            }
        }
        orders
    }

    async fn create_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        order.quantity = round_nearest(order.quantity, order.pair.quantity_increment);
        order.price = round_nearest(order.price, order.pair.tick_size);

        let mut query = vec![
            ("symbol", order.pair.trading_pair.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
            ("quantity", format!("{}", order.quantity)),
        ];
        if order.order_type == OrderType::Limit {
            query.push(("price", format!("{}", order.price)));
        }
        query.push(("newClientOrderId", order.order_id.clone()));

        let req = self.signed_request(Method::POST, "/api/v1/order", &query);
        let value = self
            .core
            .ok_or_log(VENUE, "create order", self.core.rest.request(req).await)?;

        order.status = Some(OrderStatus::New);
        let ts = value
            .get("transactTime")
            .and_then(|v| v.as_i64())
            .map(|ms| ms / 1000)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        order.created_at = ts;
        order.updated_at = ts;
        if let Some(venue_id) = value.get("orderId").and_then(|v| v.as_i64()) {
            self.order_ids().insert(order.order_id.clone(), venue_id);
        }
        info!(venue = VENUE, order = %order, "order posted");
        Some(order)
    }

    async fn cancel_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        let mut query = vec![
            ("symbol", order.pair.trading_pair.clone()),
            ("origClientOrderId", order.order_id.clone()),
        ];
        if let Some(venue_id) = self.order_ids().get(&order.order_id).copied() {
            query.push(("orderId", venue_id.to_string()));
        }
        let req = self.signed_request(Method::DELETE, "/api/v1/order", &query);
        self.core
            .ok_or_log(VENUE, "cancel order", self.core.rest.request(req).await)?;
        order.status = Some(OrderStatus::Canceled);
        order.updated_at = chrono::Utc::now().timestamp();
        Some(order)
    }

    async fn query_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        let mut query = vec![("symbol", order.pair.trading_pair.clone())];
        match self.order_ids().get(&order.order_id).copied() {
            Some(venue_id) => query.push(("orderId", venue_id.to_string())),
            None => query.push(("origClientOrderId", order.order_id.clone())),
        }
        let req = self.signed_request(Method::GET, "/api/v1/order", &query);
        let value = self
            .core
            .ok_or_log(VENUE, "query order", self.core.rest.request(req).await)?;
        order.status = Some(parse_status(value.get("status")?.as_str()?));
        if let Some(executed) = value.get("executedQty").and_then(json_f64) {
            order.quantity_cumulative = executed;
        }
        if let Some(ms) = value.get("updateTime").and_then(|v| v.as_i64()) {
            order.updated_at = ms / 1000;
        }
        Some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Token;
    use serde_json::json;

    fn connector() -> BitrueConnector {
        let mut c = BitrueConnector::new(&Settings::default());
        c.configure(
            vec![PairSpec::new(Token::new("ETH"), Token::new("USDT"), None)],
            Account::new("key".into(), "secret".into()),
        );
        c
    }

    #[test]
    fn signature_is_hex_sha256_and_deterministic() {
        let q = "symbol=ETHUSDT&recvWindow=10000&timestamp=1700000000000";
        let s1 = sign_query("secret", q);
        let s2 = sign_query("secret", q);
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 64);
        assert!(s1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sign_query("other", q), s1);
        assert_ne!(sign_query("secret", "symbol=BTCUSDT"), s1);
    }

    #[test]
    fn signed_request_carries_window_timestamp_signature_and_key() {
        let c = connector();
        let req = c.signed_request(Method::GET, "/api/v1/depth", &[("symbol", "ETHUSDT".into())]);
        assert!(req.url.starts_with("https://openapi.bitrue.com/api/v1/depth?symbol=ETHUSDT"));
        assert!(req.url.contains("recvWindow=10000"));
        assert!(req.url.contains("timestamp="));
        assert!(req.url.contains("&signature="));
        assert_eq!(req.headers[0].0, "X-MBX-APIKEY");
        assert_eq!(req.headers[0].1, "key");
    }

    #[test]
    fn decode_order_maps_binance_fields() {
        let c = connector();
        let payload = json!({
            "symbol": "ETHUSDT",
            "orderId": 42,
            "clientOrderId": "meld_bitrue_xyz",
            "price": "2000.12",
            "origQty": "1.000",
            "executedQty": "0.400",
            "status": "PARTIALLY_FILLED",
            "type": "LIMIT",
            "side": "BUY",
            "time": 1_700_000_000_000i64,
            "updateTime": 1_700_000_060_000i64
        });
        let order = c.decode_order(&payload).unwrap();
        assert_eq!(order.order_id, "meld_bitrue_xyz");
        assert_eq!(order.side, TradeSide::Buy);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.status, Some(OrderStatus::PartiallyFilled));
        assert!((order.quantity_cumulative - 0.4).abs() < 1e-9);
        assert_eq!(order.created_at, 1_700_000_000);
        assert_eq!(order.updated_at, 1_700_000_060);
        // venue id learned for later cancel/query
        assert_eq!(c.order_ids().get("meld_bitrue_xyz"), Some(&42));
    }

    #[test]
    fn status_mapping_defaults_to_canceled() {
        assert_eq!(parse_status("NEW"), OrderStatus::New);
        assert_eq!(parse_status("REJECTED"), OrderStatus::Canceled);
        assert_eq!(parse_status("EXPIRED"), OrderStatus::Canceled);
    }
}
