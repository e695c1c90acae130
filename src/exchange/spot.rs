//! Per-venue control loop.
//!
//! Each interval runs three cooperating phases: an interval timer that
//! lower-bounds the cycle, a fetch fan-out pulling market and account state
//! through the connector, and a reconcile step that hands control to the
//! strategy and then flushes its order intents back to the venue. Phase
//! transitions are published on a watch channel so the supervisor (and
//! tests) can observe every status change.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::connector::Connector;
use crate::entities::{
    CandlePeriod, Inventory, MarketInfo, OrderStatus, Pair, SpotOrder, TradeSide,
};
use crate::settings::Settings;
use crate::strategy::Strategy;

use super::order_manager::OrderManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Initializing,
    Processing,
    Processed,
    ProcessedError,
}

/// Snapshot of every status variable the loop publishes.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeStatus {
    /// Becomes `Ready` once the first full cold fetch succeeds.
    pub market_ready: Readiness,
    pub fetch_data: PhaseStatus,
    pub strategy_calculation: PhaseStatus,
    pub ready_for_strategy: Readiness,
    pub process_action: PhaseStatus,
    pub main_process: PhaseStatus,
}

impl Default for ExchangeStatus {
    fn default() -> Self {
        Self {
            market_ready: Readiness::NotReady,
            fetch_data: PhaseStatus::Processing,
            strategy_calculation: PhaseStatus::Processing,
            ready_for_strategy: Readiness::NotReady,
            process_action: PhaseStatus::Initializing,
            main_process: PhaseStatus::Initializing,
        }
    }
}

pub struct SpotExchange {
    exchange_name: String,
    connector: Box<dyn Connector>,
    pairs: Vec<Pair>,
    inventory: Inventory,
    order_manager: OrderManager,
    settings: Settings,
    status: ExchangeStatus,
    status_tx: watch::Sender<ExchangeStatus>,
    enabled: Arc<AtomicBool>,
}

impl SpotExchange {
    pub fn new(market_info: MarketInfo, mut connector: Box<dyn Connector>, settings: Settings) -> Self {
        connector.configure(market_info.pairs.clone(), market_info.account.clone());

        let pairs: Vec<Pair> = market_info
            .pairs
            .iter()
            .map(|spec| Pair::new(spec.clone(), settings.data_max_length))
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        for spec in &market_info.pairs {
            for sym in [spec.base_asset.symbol(), spec.quote_asset.symbol()] {
                if !tokens.iter().any(|t| t == sym) {
                    tokens.push(sym.to_string());
                }
            }
        }
        let inventory = Inventory::new(tokens, settings.data_max_length);
        let order_manager = OrderManager::new(
            &market_info.exchange,
            &settings.client_order_prefix,
            &market_info.pairs,
        );
        let status = ExchangeStatus::default();
        let (status_tx, _) = watch::channel(status);

        Self {
            exchange_name: market_info.exchange,
            connector,
            pairs,
            inventory,
            order_manager,
            settings,
            status,
            status_tx,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// The single configured pair, when there is exactly one.
    pub fn pair(&self) -> Option<&Pair> {
        (self.pairs.len() == 1).then(|| &self.pairs[0])
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.order_manager
    }

    pub fn active_spot_orders(&self) -> Vec<SpotOrder> {
        self.order_manager.active_orders()
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    /// Observe every status transition the loop makes.
    pub fn subscribe_status(&self) -> watch::Receiver<ExchangeStatus> {
        self.status_tx.subscribe()
    }

    /// Flag shared with the supervisor's signal handler; flipping it false
    /// ends the loop after the current interval.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        info!(exchange = %self.exchange_name, "exit exchange requested");
    }

    fn set_status(&mut self, f: impl FnOnce(&mut ExchangeStatus)) {
        f(&mut self.status);
        self.status_tx.send_replace(self.status);
    }

    // ─────────────────────────────────────────────────
    // Strategy façade
    // ─────────────────────────────────────────────────

    /// Create a single spot order. Returns false (and enqueues nothing) when
    /// inventory cannot cover it with the safety buffer.
    pub fn create_spot_order(&mut self, order: SpotOrder) -> bool {
        self.create_spot_orders(vec![order])
    }

    /// Create a batch of orders. The inventory check aggregates all BUY
    /// (resp. SELL) quantities per pair before comparing; one shortfall
    /// rejects the entire batch.
    pub fn create_spot_orders(&mut self, mut orders: Vec<SpotOrder>) -> bool {
        if orders.is_empty() {
            return true;
        }
        for order in &mut orders {
            order.order_id = self.order_manager.create_id();
            order.status = Some(OrderStatus::New);
        }

        // (pair spec, buy volume in quote, sell volume in base)
        let mut per_pair: HashMap<String, (crate::entities::PairSpec, f64, f64)> = HashMap::new();
        for order in &orders {
            let entry = per_pair
                .entry(order.pair.trading_pair.clone())
                .or_insert_with(|| (order.pair.clone(), 0.0, 0.0));
            match order.side {
                TradeSide::Buy => entry.1 += order.quantity * order.price,
                TradeSide::Sell => entry.2 += order.quantity,
            }
        }

        let buffer = self.settings.buffer_order_quantity;
        for (symbol, (spec, buy_quote, sell_base)) in &per_pair {
            if *buy_quote > 0.0 {
                let free = self.inventory.single_balance(spec.quote_asset.symbol());
                if buy_quote * buffer >= free {
                    error!(
                        exchange = %self.exchange_name,
                        pair = %symbol,
                        need = buy_quote * buffer,
                        free,
                        "buy volume larger than current inventory, dropping batch"
                    );
                    return false;
                }
            }
            if *sell_base > 0.0 {
                let free = self.inventory.single_balance(spec.base_asset.symbol());
                if *sell_base >= free * buffer {
                    error!(
                        exchange = %self.exchange_name,
                        pair = %symbol,
                        need = *sell_base,
                        free,
                        "sell volume larger than current inventory, dropping batch"
                    );
                    return false;
                }
            }
        }

        for order in &orders {
            info!(exchange = %self.exchange_name, "posting {order}");
        }
        match self.order_manager.add_post_orders(orders) {
            Ok(()) => true,
            Err(err) => {
                error!(exchange = %self.exchange_name, %err, "rejected order batch");
                false
            }
        }
    }

    /// Queue active orders for cancellation in the next dispatch.
    pub fn cancel_spot_orders(&mut self, orders: Vec<SpotOrder>) {
        self.order_manager.add_cancel_orders(orders);
    }

    pub fn cancel_all_spot_orders(&mut self) {
        self.order_manager.cancel_all();
        info!(exchange = %self.exchange_name, "cancel all spot orders");
    }

    /// Park the unfilled remainder of the given orders (or every active
    /// order) and queue the originals for cancellation.
    pub fn add_backlog(&mut self, orders: Vec<SpotOrder>, all: bool) {
        self.order_manager.add_backlog(orders, all);
    }

    /// Resubmit parked remainders through the normal create path. Fresh ids
    /// are assigned; the parked entries are dropped from the backlog.
    pub fn recover_backlog(&mut self, ids: Option<&[String]>) -> bool {
        let orders = self.order_manager.take_backlog(ids);
        if orders.is_empty() {
            return true;
        }
        self.create_spot_orders(orders)
    }

    // ─────────────────────────────────────────────────
    // Interval loop
    // ─────────────────────────────────────────────────

    pub async fn run(&mut self, strategy: &mut dyn Strategy) {
        info!(exchange = %self.exchange_name, "exchange loop starting");
        while self.is_enabled() {
            self.run_interval(strategy).await;
        }
        info!(exchange = %self.exchange_name, "exchange loop stopped");
    }

    /// One fetch → strategize → reconcile cycle, lower-bounded by the loop
    /// interval. Fetch completion happens-before the strategy call, which
    /// happens-before batch dispatch; the timer only bounds the cycle below.
    pub async fn run_interval(&mut self, strategy: &mut dyn Strategy) {
        debug!(exchange = %self.exchange_name, "start new loop");
        self.set_status(|s| {
            s.main_process = PhaseStatus::Processing;
            s.strategy_calculation = PhaseStatus::Processing;
            s.ready_for_strategy = Readiness::NotReady;
        });
        let interval = tokio::time::sleep(self.settings.loop_interval);
        tokio::pin!(interval);

        let fetched = self.fetch_data().await;
        self.reconcile(strategy, fetched).await;

        interval.as_mut().await;
        self.set_status(|s| s.main_process = PhaseStatus::Processed);
        debug!(exchange = %self.exchange_name, "end loop");
    }

    /// Fetch fan-out. Cold path: all five requests must land before the
    /// market is declared ready. Warm path: individual market-data misses
    /// are tolerated; a missing inventory skips the interval.
    async fn fetch_data(&mut self) -> bool {
        self.set_status(|s| s.fetch_data = PhaseStatus::Processing);

        if self.status.market_ready == Readiness::NotReady {
            let (inventory_res, orderbook_res, candles_res, tickers_res, active_orders) = tokio::join!(
                self.connector.get_inventory_balance(),
                self.connector.get_order_book(),
                self.connector.get_trading_candles(CandlePeriod::default()),
                self.connector.get_tickers(),
                self.connector.get_active_spot_orders(),
            );

            let missing = [
                (inventory_res.is_none(), "inventory"),
                (orderbook_res.is_none(), "orderbook"),
                (candles_res.is_none(), "candles"),
                (tickers_res.is_none(), "tickers"),
            ];
            if let Some((_, what)) = missing.iter().find(|(absent, _)| *absent) {
                warn!(
                    exchange = %self.exchange_name,
                    "market not ready, no {what} data, retrying"
                );
                self.set_status(|s| s.fetch_data = PhaseStatus::ProcessedError);
                return false;
            }

            let orderbooks = orderbook_res.unwrap_or_default();
            let candles = candles_res.unwrap_or_default();
            let tickers = tickers_res.unwrap_or_default();
            for pair in &mut self.pairs {
                if let Some(book) = orderbooks.get(pair.trading_pair()) {
                    pair.add_orderbook(book.clone());
                }
                if let Some(candle) = candles.get(pair.trading_pair()) {
                    pair.add_candles(*candle);
                }
                if let Some(ticker) = tickers.get(pair.trading_pair()) {
                    pair.add_ticker(*ticker);
                }
            }
            if let Some(balances) = inventory_res {
                self.inventory.update(&balances);
            }
            self.order_manager.insert_active_orders(active_orders);

            info!(exchange = %self.exchange_name, "exchange ready");
            self.set_status(|s| {
                s.market_ready = Readiness::Ready;
                s.fetch_data = PhaseStatus::Processed;
            });
            true
        } else {
            let tracked = self.order_manager.tracked_orders();
            let (inventory_res, orderbook_res, candles_res, tickers_res, tracked_res) = tokio::join!(
                self.connector.get_inventory_balance(),
                self.connector.get_order_book(),
                self.connector.get_trading_candles(CandlePeriod::default()),
                self.connector.get_tickers(),
                self.connector.query_orders(tracked),
            );

            let Some(balances) = inventory_res else {
                warn!(exchange = %self.exchange_name, "no inventory data, skipping interval");
                self.set_status(|s| s.fetch_data = PhaseStatus::ProcessedError);
                return false;
            };
            self.inventory.update(&balances);

            match orderbook_res {
                Some(orderbooks) => {
                    for pair in &mut self.pairs {
                        if let Some(book) = orderbooks.get(pair.trading_pair()) {
                            pair.add_orderbook(book.clone());
                        }
                    }
                }
                None => warn!(exchange = %self.exchange_name, "no data for orderbook"),
            }
            match candles_res {
                Some(candles) => {
                    for pair in &mut self.pairs {
                        if let Some(candle) = candles.get(pair.trading_pair()) {
                            pair.add_candles(*candle);
                        }
                    }
                }
                None => warn!(exchange = %self.exchange_name, "no data for candles"),
            }
            match tickers_res {
                Some(tickers) => {
                    for pair in &mut self.pairs {
                        if let Some(ticker) = tickers.get(pair.trading_pair()) {
                            pair.add_ticker(*ticker);
                        }
                    }
                }
                None => warn!(exchange = %self.exchange_name, "no data for tickers"),
            }

            for err in self.order_manager.update_state(tracked_res) {
                warn!(exchange = %self.exchange_name, %err, "order states left unchanged this interval");
            }

            self.set_status(|s| s.fetch_data = PhaseStatus::Processed);
            true
        }
    }

    /// Hand the interval to the strategy, then flush its intents: the cancel
    /// and create batches go out concurrently, cancels are applied first.
    async fn reconcile(&mut self, strategy: &mut dyn Strategy, fetched: bool) {
        if !fetched {
            self.set_status(|s| s.process_action = PhaseStatus::ProcessedError);
            return;
        }

        self.set_status(|s| s.ready_for_strategy = Readiness::Ready);
        if let Err(err) = strategy.run(self) {
            error!(exchange = %self.exchange_name, %err, "strategy run failed");
        }
        self.set_status(|s| {
            s.strategy_calculation = PhaseStatus::Processed;
            s.ready_for_strategy = Readiness::NotReady;
        });

        if !self.order_manager.has_pending_actions() {
            self.set_status(|s| s.process_action = PhaseStatus::Processed);
            return;
        }

        self.set_status(|s| s.process_action = PhaseStatus::Processing);
        let cancel_batch = self.order_manager.take_cancel_batch();
        let post_batch = self.order_manager.take_post_batch();
        debug!(
            exchange = %self.exchange_name,
            cancels = cancel_batch.len(),
            posts = post_batch.len(),
            "dispatching order batches"
        );
        let (cancel_res, post_res) = tokio::join!(
            self.connector.cancel_spot_orders(cancel_batch),
            self.connector.create_spot_orders(post_batch),
        );
        self.order_manager.apply_cancel_responses(cancel_res);
        self.order_manager.apply_post_responses(post_res);
        self.set_status(|s| s.process_action = PhaseStatus::Processed);
    }
}
