//! FMFW adapter. Basic-auth REST API; symbols are batched per request and
//! timestamps arrive as ISO-8601 strings.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use chrono::NaiveDateTime;
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use crate::entities::{
    Account, CandlePeriod, OrderBook, OrderStatus, OrderType, PairSpec, PriceCandles, SpotOrder,
    Tickers, TokenBalance, TradeSide,
};
use crate::settings::Settings;

use super::http::{encode_query, RestRequest};
use super::{json_f64, round_nearest, Connector, ConnectorCore};

const API_ENDPOINT: &str = "https://api.fmfw.io";
const VENUE: &str = "FMFW";

/// `Authorization: Basic base64(key:secret)`.
fn basic_auth_header(api_key: &str, secret_key: &str) -> String {
    let msg = format!("{api_key}:{secret_key}");
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(msg))
}

/// ISO-8601 prefix ("2024-01-05T10:21:33.123Z") to unix seconds.
fn parse_iso_timestamp(ts: &str) -> Option<i64> {
    let prefix = ts.get(..19)?;
    NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|t| t.and_utc().timestamp())
}

fn parse_side(raw: &str) -> TradeSide {
    if raw == "buy" {
        TradeSide::Buy
    } else {
        TradeSide::Sell
    }
}

fn parse_status(raw: &str) -> OrderStatus {
    match raw {
        "new" => OrderStatus::New,
        "partiallyFilled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        _ => OrderStatus::Canceled,
    }
}

fn parse_order_type(raw: &str) -> OrderType {
    if raw == "limit" {
        OrderType::Limit
    } else {
        OrderType::Market
    }
}

fn side_str(side: TradeSide) -> &'static str {
    match side {
        TradeSide::Buy => "buy",
        TradeSide::Sell => "sell",
    }
}

fn type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "limit",
        OrderType::Market => "market",
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

pub struct FmfwConnector {
    core: ConnectorCore,
}

impl FmfwConnector {
    pub fn new(settings: &Settings) -> Self {
        Self {
            core: ConnectorCore::new(settings),
        }
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        if query.is_empty() {
            format!("{API_ENDPOINT}{path}")
        } else {
            format!("{API_ENDPOINT}{path}?{}", encode_query(query))
        }
    }

    fn signed(&self, req: RestRequest) -> RestRequest {
        req.with_header(
            "Authorization",
            basic_auth_header(self.core.api_key(), self.core.secret_key()),
        )
    }

    /// Venue order payload to [`SpotOrder`]; `None` for symbols outside the
    /// configured pair set.
    fn decode_order(&self, value: &Value) -> Option<SpotOrder> {
        let symbol = value.get("symbol")?.as_str()?;
        let pair = self.core.get_pair(symbol)?.clone();
        Some(SpotOrder {
            order_id: value.get("client_order_id")?.as_str()?.to_string(),
            quantity: json_f64(value.get("quantity")?)?,
            quantity_cumulative: value
                .get("quantity_cumulative")
                .and_then(json_f64)
                .unwrap_or(0.0),
            price: value.get("price").and_then(json_f64).unwrap_or(0.0),
            side: parse_side(value.get("side")?.as_str()?),
            order_type: parse_order_type(value.get("type")?.as_str()?),
            status: Some(parse_status(value.get("status")?.as_str()?)),
            created_at: value
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(parse_iso_timestamp)
                .unwrap_or(0),
            updated_at: value
                .get("updated_at")
                .and_then(|v| v.as_str())
                .and_then(parse_iso_timestamp)
                .unwrap_or(0),
            pair,
        })
    }
}

#[async_trait]
impl Connector for FmfwConnector {
    fn name(&self) -> &'static str {
        VENUE
    }

    fn configure(&mut self, pairs: Vec<PairSpec>, account: Account) {
        self.core.configure(pairs, account);
    }

    async fn get_inventory_balance(&self) -> Option<HashMap<String, TokenBalance>> {
        let req = self.signed(RestRequest::get(self.url("/api/3/spot/balance", &[])));
        let value = self
            .core
            .ok_or_log(VENUE, "balance", self.core.rest.request(req).await)?;
        let rows = value.as_array()?;
        let mut balances = HashMap::new();
        for row in rows {
            let currency = row.get("currency").and_then(|v| v.as_str());
            let available = row.get("available").and_then(json_f64);
            let reserved = row.get("reserved").and_then(json_f64).unwrap_or(0.0);
            if let (Some(currency), Some(available)) = (currency, available) {
                balances.insert(currency.to_uppercase(), TokenBalance::new(available, reserved));
            }
        }
        if balances.is_empty() {
            warn!(venue = VENUE, "balance response had no rows");
            return None;
        }
        Some(balances)
    }

    async fn get_order_book(&self) -> Option<HashMap<String, OrderBook>> {
        let symbols = self.core.trading_pairs.join(",");
        let req = RestRequest::get(self.url(
            "/api/3/public/orderbook",
            &[("depth", "0".to_string()), ("symbols", symbols)],
        ));
        let value = self
            .core
            .ok_or_log(VENUE, "orderbook", self.core.rest.request(req).await)?;
        let mut books = HashMap::new();
        for symbol in &self.core.trading_pairs {
            let entry = value.get(symbol)?;
            let ts = entry
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(parse_iso_timestamp)
                .unwrap_or(0);
            books.insert(
                symbol.clone(),
                OrderBook::new(
                    decode_levels(entry.get("bid").unwrap_or(&Value::Null)),
                    decode_levels(entry.get("ask").unwrap_or(&Value::Null)),
                    ts,
                ),
            );
        }
        Some(books)
    }

    async fn get_tickers(&self) -> Option<HashMap<String, Tickers>> {
        let symbols = self.core.trading_pairs.join(",");
        let req = RestRequest::get(self.url("/api/3/public/ticker", &[("symbols", symbols)]));
        let value = self
            .core
            .ok_or_log(VENUE, "ticker", self.core.rest.request(req).await)?;
        let mut tickers = HashMap::new();
        for symbol in &self.core.trading_pairs {
            let entry = value.get(symbol)?;
            tickers.insert(
                symbol.clone(),
                Tickers {
                    timestamp: entry
                        .get("timestamp")
                        .and_then(|v| v.as_str())
                        .and_then(parse_iso_timestamp)
                        .unwrap_or(0),
                    open: entry.get("open").and_then(json_f64).unwrap_or(0.0),
                    high: entry.get("high").and_then(json_f64).unwrap_or(0.0),
                    low: entry.get("low").and_then(json_f64).unwrap_or(0.0),
                    close: entry.get("last").and_then(json_f64).unwrap_or(0.0),
                    ask: entry.get("ask").and_then(json_f64).unwrap_or(0.0),
                    bid: entry.get("bid").and_then(json_f64).unwrap_or(0.0),
                    volume: entry.get("volume").and_then(json_f64).unwrap_or(0.0),
                },
            );
        }
        Some(tickers)
    }

    async fn get_trading_candles(
        &self,
        period: CandlePeriod,
    ) -> Option<HashMap<String, PriceCandles>> {
        let symbols = self.core.trading_pairs.join(",");
        let req = RestRequest::get(self.url(
            "/api/3/public/candles",
            &[
                ("symbols", symbols),
                ("period", period.as_str().to_string()),
                ("limit", "1".to_string()),
            ],
        ));
        let value = self
            .core
            .ok_or_log(VENUE, "candles", self.core.rest.request(req).await)?;
        let mut candles = HashMap::new();
        for symbol in &self.core.trading_pairs {
            let row = value.get(symbol)?.as_array()?.first()?;
            candles.insert(
                symbol.clone(),
                PriceCandles {
                    timestamp: row
                        .get("timestamp")
                        .and_then(|v| v.as_str())
                        .and_then(parse_iso_timestamp)
                        .unwrap_or(0),
                    open: row.get("open").and_then(json_f64).unwrap_or(0.0),
                    high: row.get("max").and_then(json_f64).unwrap_or(0.0),
                    low: row.get("min").and_then(json_f64).unwrap_or(0.0),
                    close: row.get("close").and_then(json_f64).unwrap_or(0.0),
                    volume: row.get("volume").and_then(json_f64).unwrap_or(0.0),
                    period,
                },
            );
        }
        Some(candles)
    }

    async fn get_active_spot_orders(&self) -> Vec<SpotOrder> {
        let req = self.signed(RestRequest::get(self.url("/api/3/spot/order", &[])));
        let Some(value) = self
            .core
            .ok_or_log(VENUE, "active orders", self.core.rest.request(req).await)
        else {
            return Vec::new();
        };
        value
            .as_array()
            .map(|rows| rows.iter().filter_map(|r| self.decode_order(r)).collect())
            .unwrap_or_default()
    }

    async fn create_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        order.quantity = round_nearest(order.quantity, order.pair.quantity_increment);
        order.price = round_nearest(order.price, order.pair.tick_size);

        let mut form = vec![
            ("client_order_id".to_string(), order.order_id.clone()),
            ("symbol".to_string(), order.pair.trading_pair.clone()),
            ("side".to_string(), side_str(order.side).to_string()),
            ("quantity".to_string(), format!("{}", order.quantity)),
            ("type".to_string(), type_str(order.order_type).to_string()),
        ];
        if order.order_type == OrderType::Limit {
            form.push(("price".to_string(), format!("{}", order.price)));
        }
        let req = self
            .signed(RestRequest::get(self.url("/api/3/spot/order", &[])))
            .with_method(Method::POST)
            .with_form(form);
        let value = self
            .core
            .ok_or_log(VENUE, "create order", self.core.rest.request(req).await)?;

        // Fills are observed through later status queries, never assumed at
        // submission time.
        order.status = Some(OrderStatus::New);
        order.created_at = value
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(parse_iso_timestamp)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        order.updated_at = order.created_at;
        info!(venue = VENUE, order = %order, "order posted");
        Some(order)
    }

    async fn cancel_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        let path = format!("/api/3/spot/order/{}", order.order_id);
        let req = self
            .signed(RestRequest::get(self.url(&path, &[])))
            .with_method(Method::DELETE);
        let value = self
            .core
            .ok_or_log(VENUE, "cancel order", self.core.rest.request(req).await)?;
        order.status = Some(
            value
                .get("status")
                .and_then(|v| v.as_str())
                .map(parse_status)
                .unwrap_or(OrderStatus::Canceled),
        );
        if let Some(cumulative) = value.get("quantity_cumulative").and_then(json_f64) {
            order.quantity_cumulative = cumulative;
        }
        if let Some(ts) = value
            .get("updated_at")
            .and_then(|v| v.as_str())
            .and_then(parse_iso_timestamp)
        {
            order.updated_at = ts;
        }
        Some(order)
    }

    async fn query_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        let path = format!("/api/3/spot/order/{}", order.order_id);
        let req = self.signed(RestRequest::get(self.url(&path, &[])));
        let value = self
            .core
            .ok_or_log(VENUE, "query order", self.core.rest.request(req).await)?;
        order.status = Some(parse_status(value.get("status")?.as_str()?));
        if let Some(cumulative) = value.get("quantity_cumulative").and_then(json_f64) {
            order.quantity_cumulative = cumulative;
        }
        if let Some(ts) = value
            .get("updated_at")
            .and_then(|v| v.as_str())
            .and_then(parse_iso_timestamp)
        {
            order.updated_at = ts;
        }
        Some(order)
    }
}
