//! Whole-cycle scenarios driven against a scripted in-memory connector.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use meld_mm::connector::{round_nearest, Connector};
use meld_mm::entities::{
    Account, CandlePeriod, MarketInfo, OrderBook, OrderStatus, OrderType, Pair, PairSpec,
    PriceCandles, SpotOrder, Tickers, Token, TokenBalance, TradeSide,
};
use meld_mm::error::StrategyError;
use meld_mm::exchange::{Lifecycle, PhaseStatus, Readiness, SpotExchange};
use meld_mm::settings::Settings;
use meld_mm::strategy::Strategy;

// ─────────────────────────────────────────────────────────
// Scripted connector
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MockState {
    pairs: Vec<PairSpec>,
    /// Free balances the venue reports.
    balances: HashMap<String, TokenBalance>,
    /// Fail the ticker fetch this many times before succeeding.
    fail_tickers: u32,
    /// Orders the venue already had open at cold start.
    seeded_active: Vec<SpotOrder>,
    /// Per-order overrides applied by query_order: (status, cumulative).
    query_overrides: HashMap<String, (OrderStatus, f64)>,
    /// Everything POSTed / DELETEd, for assertions.
    created: Vec<SpotOrder>,
    cancelled: Vec<SpotOrder>,
    /// Swallow POST responses (simulates an unanswered create).
    drop_post_responses: bool,
}

#[derive(Clone)]
struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    fn new() -> Self {
        let mut balances = HashMap::new();
        balances.insert("ETH".to_string(), TokenBalance::new(10.0, 0.0));
        balances.insert("USDT".to_string(), TokenBalance::new(10_000.0, 0.0));
        let state = MockState {
            balances,
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "MOCK"
    }

    fn configure(&mut self, pairs: Vec<PairSpec>, _account: Account) {
        self.state().pairs = pairs;
    }

    async fn get_inventory_balance(&self) -> Option<HashMap<String, TokenBalance>> {
        Some(self.state().balances.clone())
    }

    async fn get_order_book(&self) -> Option<HashMap<String, OrderBook>> {
        let state = self.state();
        Some(
            state
                .pairs
                .iter()
                .map(|p| {
                    (
                        p.trading_pair.clone(),
                        OrderBook::new(vec![(1999.0, 1.0)], vec![(2001.0, 1.0)], 1_700_000_000),
                    )
                })
                .collect(),
        )
    }

    async fn get_tickers(&self) -> Option<HashMap<String, Tickers>> {
        let mut state = self.state();
        if state.fail_tickers > 0 {
            state.fail_tickers -= 1;
            return None;
        }
        Some(
            state
                .pairs
                .iter()
                .map(|p| {
                    (
                        p.trading_pair.clone(),
                        Tickers {
                            timestamp: 1_700_000_000,
                            open: 1990.0,
                            high: 2010.0,
                            low: 1985.0,
                            close: 2000.0,
                            ask: 2001.0,
                            bid: 1999.0,
                            volume: 123.0,
                        },
                    )
                })
                .collect(),
        )
    }

    async fn get_trading_candles(
        &self,
        period: CandlePeriod,
    ) -> Option<HashMap<String, PriceCandles>> {
        let state = self.state();
        Some(
            state
                .pairs
                .iter()
                .map(|p| {
                    (
                        p.trading_pair.clone(),
                        PriceCandles {
                            timestamp: 1_700_000_000,
                            open: 1990.0,
                            high: 2010.0,
                            low: 1985.0,
                            close: 2000.0,
                            volume: 123.0,
                            period,
                        },
                    )
                })
                .collect(),
        )
    }

    async fn get_active_spot_orders(&self) -> Vec<SpotOrder> {
        self.state().seeded_active.clone()
    }

    async fn create_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        order.quantity = round_nearest(order.quantity, order.pair.quantity_increment);
        order.price = round_nearest(order.price, order.pair.tick_size);
        order.status = Some(OrderStatus::New);
        order.created_at = 1_700_000_000;
        order.updated_at = 1_700_000_000;
        let mut state = self.state();
        state.created.push(order.clone());
        if state.drop_post_responses {
            None
        } else {
            Some(order)
        }
    }

    async fn cancel_spot_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        order.status = Some(OrderStatus::Canceled);
        order.updated_at = 1_700_000_100;
        self.state().cancelled.push(order.clone());
        Some(order)
    }

    async fn query_order(&self, mut order: SpotOrder) -> Option<SpotOrder> {
        let state = self.state();
        if let Some((status, cumulative)) = state.query_overrides.get(&order.order_id) {
            order.status = Some(*status);
            order.quantity_cumulative = *cumulative;
            order.updated_at = 1_700_000_050;
        }
        Some(order)
    }
}

// ─────────────────────────────────────────────────────────
// Scripted strategy
// ─────────────────────────────────────────────────────────

enum Action {
    Idle,
    Post(Vec<SpotOrder>),
    CancelAll,
}

struct ScriptedStrategy {
    script: VecDeque<Action>,
}

impl ScriptedStrategy {
    fn new(script: Vec<Action>) -> Self {
        Self {
            script: script.into(),
        }
    }

    fn idle() -> Self {
        Self::new(Vec::new())
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run(&mut self, exchange: &mut SpotExchange) -> Result<(), StrategyError> {
        match self.script.pop_front() {
            Some(Action::Post(orders)) => {
                exchange.create_spot_orders(orders);
            }
            Some(Action::CancelAll) => exchange.cancel_all_spot_orders(),
            Some(Action::Idle) | None => {}
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────

fn eth_usdt() -> PairSpec {
    let mut spec = PairSpec::new(Token::new("ETH"), Token::new("USDT"), None);
    spec.tick_size = 0.01;
    spec.quantity_increment = 0.001;
    spec
}

fn settings() -> Settings {
    Settings {
        loop_interval: Duration::from_millis(5),
        ..Settings::default()
    }
}

fn exchange_with(mock: &MockConnector) -> SpotExchange {
    let info = MarketInfo::new(
        "FMFW",
        vec![eth_usdt()],
        Account::new("k".into(), "s".into()),
    );
    SpotExchange::new(info, Box::new(mock.clone()), settings())
}

fn buy(qty: f64, price: f64) -> SpotOrder {
    SpotOrder::new(qty, price, TradeSide::Buy, OrderType::Limit, eth_usdt())
}

fn pair<'a>(exchange: &'a SpotExchange) -> &'a Pair {
    exchange.pair().expect("single configured pair")
}

// ─────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn cold_start_becomes_ready_with_full_data() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::idle();

    exchange.run_interval(&mut strategy).await;

    let status = exchange.status();
    assert_eq!(status.market_ready, Readiness::Ready);
    assert_eq!(status.fetch_data, PhaseStatus::Processed);
    assert_eq!(status.process_action, PhaseStatus::Processed);
    assert_eq!(status.main_process, PhaseStatus::Processed);

    let book = pair(&exchange).current_orderbook().expect("book populated");
    assert_eq!(book.best_bid(), Some(1999.0));
    assert!((exchange.inventory().single_balance("USDT") - 10_000.0).abs() < 1e-9);
}

#[tokio::test]
async fn cold_start_with_missing_tickers_retries_next_interval() {
    let mock = MockConnector::new();
    mock.state().fail_tickers = 1;
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::idle();

    exchange.run_interval(&mut strategy).await;
    assert_eq!(exchange.status().market_ready, Readiness::NotReady);
    assert_eq!(exchange.status().fetch_data, PhaseStatus::ProcessedError);
    // strategy never saw the interval
    assert_eq!(exchange.status().ready_for_strategy, Readiness::NotReady);

    exchange.run_interval(&mut strategy).await;
    assert_eq!(exchange.status().market_ready, Readiness::Ready);
    assert!(pair(&exchange).current_ticker().is_some());
}

#[tokio::test]
async fn place_then_cancel_completes_and_untracks() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle, // cold interval: just become ready
        Action::Post(vec![buy(1.0, 2000.123_456)]),
        Action::CancelAll,
        Action::Idle,
    ]);

    exchange.run_interval(&mut strategy).await; // ready
    exchange.run_interval(&mut strategy).await; // post

    let active = exchange.active_spot_orders();
    assert_eq!(active.len(), 1);
    let posted = &active[0];
    // rounded to the venue increments before submission
    assert!((posted.price - 2000.12).abs() < 1e-9);
    assert!((posted.quantity - 1.0).abs() < 1e-9);
    assert_eq!(posted.status, Some(OrderStatus::New));
    assert_eq!(exchange.order_manager().tracked_orders().len(), 1);
    let id = posted.order_id.clone();

    exchange.run_interval(&mut strategy).await; // cancel

    assert!(exchange.active_spot_orders().is_empty());
    assert!(exchange.order_manager().tracked_orders().is_empty());
    let sub = exchange.order_manager().sub("ETHUSDT").unwrap();
    assert_eq!(sub.state_of(&id), Some(Lifecycle::Completed));
    assert_eq!(mock.state().cancelled.len(), 1);
    assert_eq!(mock.state().cancelled[0].order_id, id);
}

#[tokio::test]
async fn insufficient_funds_rejects_whole_batch() {
    let mock = MockConnector::new();
    mock.state()
        .balances
        .insert("USDT".to_string(), TokenBalance::new(100.0, 0.0));
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle,
        // 200 * 1.0 * 1.01 = 202 >= 100 -> rejected
        Action::Post(vec![buy(1.0, 200.0)]),
    ]);

    exchange.run_interval(&mut strategy).await;
    exchange.run_interval(&mut strategy).await;

    assert!(exchange.active_spot_orders().is_empty());
    assert!(exchange.order_manager().initialized_orders().is_empty());
    assert!(mock.state().created.is_empty());
}

#[tokio::test]
async fn sell_gate_allows_buffered_quantity_and_rejects_beyond() {
    let mock = MockConnector::new(); // 10 ETH free
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::idle();
    exchange.run_interval(&mut strategy).await;

    let sell = |qty: f64| SpotOrder::new(qty, 2100.0, TradeSide::Sell, OrderType::Limit, eth_usdt());

    // 11 > 10 * 1.01 -> rejected
    assert!(!exchange.create_spot_orders(vec![sell(11.0)]));
    assert!(exchange.order_manager().initialized_orders().is_empty());

    // 10.05 < 10 * 1.01 -> accepted within the buffer
    assert!(exchange.create_spot_orders(vec![sell(10.05)]));
    assert_eq!(exchange.order_manager().initialized_orders().len(), 1);
}

#[tokio::test]
async fn inventory_gates_reject_on_exact_boundary() {
    let mock = MockConnector::new();
    {
        let mut state = mock.state();
        state
            .balances
            .insert("ETH".to_string(), TokenBalance::new(8.0, 0.0));
        state
            .balances
            .insert("USDT".to_string(), TokenBalance::new(500.0, 0.0));
    }
    let info = MarketInfo::new(
        "FMFW",
        vec![eth_usdt()],
        Account::new("k".into(), "s".into()),
    );
    // 1.25 and the balances are exact in binary, so the boundary products
    // below compare without float slack.
    let settings = Settings {
        buffer_order_quantity: 1.25,
        loop_interval: Duration::from_millis(5),
        ..Settings::default()
    };
    let mut exchange = SpotExchange::new(info, Box::new(mock.clone()), settings);
    let mut strategy = ScriptedStrategy::idle();
    exchange.run_interval(&mut strategy).await;

    // SELL: 10.0 == 8.0 * 1.25 -> equality rejects
    let sell = SpotOrder::new(10.0, 2100.0, TradeSide::Sell, OrderType::Limit, eth_usdt());
    assert!(!exchange.create_spot_orders(vec![sell]));
    assert!(exchange.order_manager().initialized_orders().is_empty());

    // BUY: 2.0 * 200.0 * 1.25 == 500.0 -> equality rejects
    let buy_at_edge = SpotOrder::new(2.0, 200.0, TradeSide::Buy, OrderType::Limit, eth_usdt());
    assert!(!exchange.create_spot_orders(vec![buy_at_edge]));
    assert!(exchange.order_manager().initialized_orders().is_empty());
    assert!(mock.state().created.is_empty());
}

#[tokio::test]
async fn partial_fill_keeps_order_active_and_tracked() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle,
        Action::Post(vec![buy(1.0, 2000.0)]),
        Action::Idle,
    ]);

    exchange.run_interval(&mut strategy).await;
    exchange.run_interval(&mut strategy).await;
    let id = exchange.active_spot_orders()[0].order_id.clone();

    mock.state()
        .query_overrides
        .insert(id.clone(), (OrderStatus::PartiallyFilled, 0.4));
    exchange.run_interval(&mut strategy).await;

    let active = exchange.active_spot_orders();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].status, Some(OrderStatus::PartiallyFilled));
    assert!((active[0].quantity_cumulative - 0.4).abs() < 1e-9);
    assert_eq!(exchange.order_manager().tracked_orders().len(), 1);
}

#[tokio::test]
async fn fill_observed_by_query_completes_order() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle,
        Action::Post(vec![buy(1.0, 2000.0)]),
        Action::Idle,
    ]);

    exchange.run_interval(&mut strategy).await;
    exchange.run_interval(&mut strategy).await;
    let id = exchange.active_spot_orders()[0].order_id.clone();

    mock.state()
        .query_overrides
        .insert(id.clone(), (OrderStatus::Filled, 1.0));
    exchange.run_interval(&mut strategy).await;

    assert!(exchange.active_spot_orders().is_empty());
    assert!(exchange.order_manager().tracked_orders().is_empty());
    let sub = exchange.order_manager().sub("ETHUSDT").unwrap();
    assert_eq!(sub.state_of(&id), Some(Lifecycle::Completed));
}

#[tokio::test]
async fn backlog_round_trip_resubmits_remainder() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle,
        Action::Post(vec![buy(2.0, 2000.0)]),
        Action::Idle,
    ]);

    exchange.run_interval(&mut strategy).await;
    exchange.run_interval(&mut strategy).await;
    let id = exchange.active_spot_orders()[0].order_id.clone();

    mock.state()
        .query_overrides
        .insert(id.clone(), (OrderStatus::PartiallyFilled, 0.5));
    exchange.run_interval(&mut strategy).await;

    exchange.add_backlog(Vec::new(), true);
    let backlog = exchange.order_manager().back_log_orders();
    assert_eq!(backlog.len(), 1);
    assert!((backlog[0].quantity - 1.5).abs() < 1e-9);
    let sub = exchange.order_manager().sub("ETHUSDT").unwrap();
    assert_eq!(sub.state_of(&id), Some(Lifecycle::CancelledList));

    assert!(exchange.recover_backlog(None));
    assert!(exchange.order_manager().back_log_orders().is_empty());
    let resubmitted = exchange.order_manager().initialized_orders();
    assert_eq!(resubmitted.len(), 1);
    assert!((resubmitted[0].quantity - 1.5).abs() < 1e-9);
    assert_ne!(resubmitted[0].order_id, id);
}

#[tokio::test]
async fn unanswered_post_is_retried_next_interval() {
    let mock = MockConnector::new();
    mock.state().drop_post_responses = true;
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::new(vec![
        Action::Idle,
        Action::Post(vec![buy(1.0, 2000.0)]),
        Action::Idle,
        Action::Idle,
    ]);

    exchange.run_interval(&mut strategy).await; // ready
    exchange.run_interval(&mut strategy).await; // post, response swallowed

    assert!(exchange.active_spot_orders().is_empty());
    assert_eq!(exchange.order_manager().initialized_orders().len(), 1);
    let first_attempts = mock.state().created.len();
    assert_eq!(first_attempts, 1);

    mock.state().drop_post_responses = false;
    exchange.run_interval(&mut strategy).await; // retried

    assert_eq!(mock.state().created.len(), 2);
    let active = exchange.active_spot_orders();
    assert_eq!(active.len(), 1);
    // same client id both times: the retry is idempotent at the venue
    let ids: HashSet<String> = mock.state().created.iter().map(|o| o.order_id.clone()).collect();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn seeded_venue_orders_are_tracked_from_cold_start() {
    let mock = MockConnector::new();
    {
        let mut state = mock.state();
        let mut seeded = buy(1.0, 1990.0);
        seeded.order_id = "meld_fmfw_preexisting0000000000".to_string();
        seeded.status = Some(OrderStatus::New);
        state.seeded_active = vec![seeded];
    }
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::idle();

    exchange.run_interval(&mut strategy).await;

    let tracked = exchange.order_manager().tracked_orders();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].order_id, "meld_fmfw_preexisting0000000000");
    assert_eq!(exchange.active_spot_orders().len(), 1);
}

#[tokio::test]
async fn close_ends_the_loop() {
    let mock = MockConnector::new();
    let mut exchange = exchange_with(&mock);
    let mut strategy = ScriptedStrategy::idle();

    exchange.close();
    assert!(!exchange.is_enabled());
    // run() returns without an interval once disabled
    exchange.run(&mut strategy).await;
}
