//! Order lifecycle manager: one sub-manager per pair plus an aggregator.
//!
//! Lifecycle, distinct from the venue status:
//!
//! ```text
//! INITIALIZED -> HANGING_POSTING -> ACTIVE -> CANCELLED_LIST
//!                      |              |             |
//!                      |              v             v
//!                      |          COMPLETED <- HANGING_CANCELLING
//!                      `-> (back to INITIALIZED when the POST got no answer)
//! ```
//!
//! Only orders in the tracked set are polled against the venue each interval;
//! entering COMPLETED always removes an order from it.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{PairSpec, SpotOrder};
use crate::error::OrderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Initialized,
    HangingPosting,
    Active,
    CancelledList,
    HangingCancelling,
    Completed,
}

const ALL_STATES: [Lifecycle; 6] = [
    Lifecycle::Initialized,
    Lifecycle::HangingPosting,
    Lifecycle::Active,
    Lifecycle::CancelledList,
    Lifecycle::HangingCancelling,
    Lifecycle::Completed,
];

/// Per-pair state machine. Every order lives in exactly one bucket; the
/// reverse index gives O(1) state lookup by id.
pub struct SubOrderManager {
    pair: PairSpec,
    buckets: HashMap<Lifecycle, HashMap<String, SpotOrder>>,
    state_index: HashMap<String, Lifecycle>,
    tracked: HashSet<String>,
    back_log: HashMap<String, SpotOrder>,
}

impl SubOrderManager {
    fn new(pair: PairSpec) -> Self {
        let buckets = ALL_STATES.iter().map(|s| (*s, HashMap::new())).collect();
        Self {
            pair,
            buckets,
            state_index: HashMap::new(),
            tracked: HashSet::new(),
            back_log: HashMap::new(),
        }
    }

    pub fn pair(&self) -> &PairSpec {
        &self.pair
    }

    fn bucket(&self, state: Lifecycle) -> &HashMap<String, SpotOrder> {
        &self.buckets[&state]
    }

    fn orders_in(&self, state: Lifecycle) -> Vec<SpotOrder> {
        self.bucket(state).values().cloned().collect()
    }

    pub fn active_orders(&self) -> Vec<SpotOrder> {
        self.orders_in(Lifecycle::Active)
    }

    pub fn back_log_orders(&self) -> Vec<SpotOrder> {
        self.back_log.values().cloned().collect()
    }

    pub fn tracked_orders(&self) -> Vec<SpotOrder> {
        self.tracked
            .iter()
            .filter_map(|id| {
                let state = self.state_index.get(id)?;
                self.bucket(*state).get(id).cloned()
            })
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn state_of(&self, order_id: &str) -> Option<Lifecycle> {
        self.state_index.get(order_id).copied()
    }

    /// Move an order to `target`, replacing the stored copy with `order`
    /// (venue responses carry fresher fields than what we stored).
    fn change_state(&mut self, order: SpotOrder, target: Lifecycle) {
        let id = order.order_id.clone();
        if let Some(current) = self.state_index.get(&id).copied() {
            if let Some(bucket) = self.buckets.get_mut(&current) {
                bucket.remove(&id);
            }
        }
        self.state_index.insert(id.clone(), target);
        if let Some(bucket) = self.buckets.get_mut(&target) {
            bucket.insert(id, order);
        }
    }

    fn add_post_orders(&mut self, orders: Vec<SpotOrder>) -> Result<(), OrderError> {
        for order in &orders {
            if self.state_index.contains_key(&order.order_id) {
                return Err(OrderError::DuplicateOrder(order.order_id.clone()));
            }
        }
        for order in orders {
            let id = order.order_id.clone();
            self.state_index.insert(id.clone(), Lifecycle::Initialized);
            if let Some(bucket) = self.buckets.get_mut(&Lifecycle::Initialized) {
                bucket.insert(id, order);
            }
        }
        Ok(())
    }

    /// INITIALIZED -> HANGING_POSTING; returns the batch to POST.
    fn take_post_batch(&mut self) -> Vec<SpotOrder> {
        let batch = self.orders_in(Lifecycle::Initialized);
        for order in &batch {
            self.change_state(order.clone(), Lifecycle::HangingPosting);
        }
        batch
    }

    /// Apply POST responses: terminal venue status completes the order,
    /// anything else becomes ACTIVE and tracked. Orders the venue did not
    /// answer for fall back to INITIALIZED so the next batch retries them.
    fn apply_post_responses(&mut self, responses: Vec<SpotOrder>) {
        for order in responses {
            let id = order.order_id.clone();
            if order.status.map(|s| s.is_terminal()).unwrap_or(false) {
                self.change_state(order, Lifecycle::Completed);
                self.tracked.remove(&id);
            } else {
                self.change_state(order, Lifecycle::Active);
                self.tracked.insert(id);
            }
        }
        for order in self.orders_in(Lifecycle::HangingPosting) {
            debug!(order_id = %order.order_id, "post unanswered, requeueing");
            self.change_state(order, Lifecycle::Initialized);
        }
    }

    /// Queue ACTIVE orders for cancellation; other states are left alone.
    fn add_cancel_orders(&mut self, orders: &[SpotOrder]) {
        for order in orders {
            if self.state_of(&order.order_id) == Some(Lifecycle::Active) {
                if let Some(stored) = self.bucket(Lifecycle::Active).get(&order.order_id).cloned() {
                    self.change_state(stored, Lifecycle::CancelledList);
                }
            }
        }
    }

    fn cancel_all(&mut self) {
        let active = self.active_orders();
        self.add_cancel_orders(&active);
    }

    /// CANCELLED_LIST -> HANGING_CANCELLING; returns the batch to DELETE.
    fn take_cancel_batch(&mut self) -> Vec<SpotOrder> {
        let batch = self.orders_in(Lifecycle::CancelledList);
        for order in &batch {
            self.change_state(order.clone(), Lifecycle::HangingCancelling);
        }
        batch
    }

    /// Apply DELETE responses; unanswered orders return to CANCELLED_LIST
    /// for the next interval.
    fn apply_cancel_responses(&mut self, responses: Vec<SpotOrder>) {
        for order in responses {
            let id = order.order_id.clone();
            self.change_state(order, Lifecycle::Completed);
            self.tracked.remove(&id);
        }
        for order in self.orders_in(Lifecycle::HangingCancelling) {
            debug!(order_id = %order.order_id, "cancel unanswered, requeueing");
            self.change_state(order, Lifecycle::CancelledList);
        }
    }

    /// Move unfilled remainders into the backlog and queue the originals for
    /// cancellation. Only ACTIVE orders participate.
    fn add_backlog(&mut self, orders: &[SpotOrder]) {
        let mut to_cancel = Vec::new();
        for order in orders {
            if self.state_of(&order.order_id) != Some(Lifecycle::Active) {
                continue;
            }
            if let Some(stored) = self.bucket(Lifecycle::Active).get(&order.order_id).cloned() {
                let mut parked = stored.clone();
                parked.quantity = stored.remaining();
                parked.quantity_cumulative = 0.0;
                self.back_log.insert(parked.order_id.clone(), parked);
                to_cancel.push(stored);
            }
        }
        self.add_cancel_orders(&to_cancel);
    }

    fn add_backlog_all(&mut self) {
        let active = self.active_orders();
        self.add_backlog(&active);
    }

    /// Remove and return backlog entries; `ids = None` drains everything.
    fn take_backlog(&mut self, ids: Option<&[String]>) -> Vec<SpotOrder> {
        match ids {
            None => self.back_log.drain().map(|(_, o)| o).collect(),
            Some(ids) => ids.iter().filter_map(|id| self.back_log.remove(id)).collect(),
        }
    }

    /// Apply status-query responses for this pair's tracked orders. A
    /// response set smaller than the tracked set aborts the whole pair
    /// without touching any state.
    fn update_state(&mut self, responses: Vec<SpotOrder>) -> Result<(), OrderError> {
        if responses.len() < self.tracked.len() {
            return Err(OrderError::InsufficientOrders {
                pair: self.pair.trading_pair.clone(),
                got: responses.len(),
                tracked: self.tracked.len(),
            });
        }
        for order in responses {
            let id = order.order_id.clone();
            let terminal = order.status.map(|s| s.is_terminal()).unwrap_or(false);
            match self.state_of(&id) {
                Some(Lifecycle::Active) => {
                    if terminal {
                        self.change_state(order, Lifecycle::Completed);
                        self.tracked.remove(&id);
                    } else {
                        // refresh stored cumulative / status in place
                        self.change_state(order, Lifecycle::Active);
                    }
                }
                Some(Lifecycle::CancelledList) => {
                    if terminal {
                        self.change_state(order, Lifecycle::Completed);
                        self.tracked.remove(&id);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Seed venue-side open orders learned during the cold fetch.
    fn insert_active_orders(&mut self, orders: Vec<SpotOrder>) {
        for order in orders {
            let id = order.order_id.clone();
            self.change_state(order, Lifecycle::Active);
            self.tracked.insert(id);
        }
    }
}

/// Aggregator over the per-pair sub-managers; owns the client-id rule.
pub struct OrderManager {
    exchange_name: String,
    client_order_prefix: String,
    pair_symbols: Vec<String>,
    subs: HashMap<String, SubOrderManager>,
}

impl OrderManager {
    pub fn new(exchange_name: &str, client_order_prefix: &str, pairs: &[PairSpec]) -> Self {
        let pair_symbols = pairs.iter().map(|p| p.trading_pair.clone()).collect();
        let subs = pairs
            .iter()
            .map(|p| (p.trading_pair.clone(), SubOrderManager::new(p.clone())))
            .collect();
        Self {
            exchange_name: exchange_name.to_string(),
            client_order_prefix: client_order_prefix.to_string(),
            pair_symbols,
            subs,
        }
    }

    pub fn sub(&self, trading_pair: &str) -> Option<&SubOrderManager> {
        self.subs.get(trading_pair)
    }

    /// `prefix || lowercase(venue) || "_" || truncated uuid hex`, 32 chars
    /// total, unique for the process lifetime.
    pub fn create_id(&self) -> String {
        let name = self.exchange_name.to_lowercase();
        let hex = Uuid::new_v4().simple().to_string();
        let keep = hex.len().saturating_sub(6 + name.len());
        format!("{}{}_{}", self.client_order_prefix, name, &hex[..keep])
    }

    fn divide_orders(&self, orders: Vec<SpotOrder>) -> HashMap<String, Vec<SpotOrder>> {
        let mut by_pair: HashMap<String, Vec<SpotOrder>> = HashMap::new();
        for order in orders {
            let symbol = order.pair.trading_pair.clone();
            if self.subs.contains_key(&symbol) {
                by_pair.entry(symbol).or_default().push(order);
            } else {
                warn!(%symbol, order_id = %order.order_id, "order for unmanaged pair dropped");
            }
        }
        by_pair
    }

    fn collect<F>(&self, f: F) -> Vec<SpotOrder>
    where
        F: Fn(&SubOrderManager) -> Vec<SpotOrder>,
    {
        self.pair_symbols
            .iter()
            .filter_map(|s| self.subs.get(s))
            .flat_map(|sub| f(sub))
            .collect()
    }

    fn for_each_group<F>(&mut self, orders: Vec<SpotOrder>, mut f: F)
    where
        F: FnMut(&mut SubOrderManager, Vec<SpotOrder>),
    {
        for (symbol, group) in self.divide_orders(orders) {
            if let Some(sub) = self.subs.get_mut(&symbol) {
                f(sub, group);
            }
        }
    }

    pub fn active_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.active_orders())
    }

    pub fn back_log_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.back_log_orders())
    }

    pub fn tracked_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.tracked_orders())
    }

    pub fn initialized_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.orders_in(Lifecycle::Initialized))
    }

    pub fn cancelled_list_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.orders_in(Lifecycle::CancelledList))
    }

    pub fn completed_orders(&self) -> Vec<SpotOrder> {
        self.collect(|s| s.orders_in(Lifecycle::Completed))
    }

    /// True when the reconcile phase has something to send.
    pub fn has_pending_actions(&self) -> bool {
        self.subs.values().any(|s| {
            !s.bucket(Lifecycle::Initialized).is_empty()
                || !s.bucket(Lifecycle::CancelledList).is_empty()
        })
    }

    pub fn add_post_orders(&mut self, orders: Vec<SpotOrder>) -> Result<(), OrderError> {
        // validate the whole batch before touching any bucket
        for order in &orders {
            let symbol = &order.pair.trading_pair;
            if let Some(sub) = self.subs.get(symbol) {
                if sub.state_index.contains_key(&order.order_id) {
                    return Err(OrderError::DuplicateOrder(order.order_id.clone()));
                }
            }
        }
        let mut result = Ok(());
        self.for_each_group(orders, |sub, group| {
            if let Err(err) = sub.add_post_orders(group) {
                result = Err(err);
            }
        });
        result
    }

    pub fn add_cancel_orders(&mut self, orders: Vec<SpotOrder>) {
        self.for_each_group(orders, |sub, group| sub.add_cancel_orders(&group));
    }

    pub fn cancel_all(&mut self) {
        for sub in self.subs.values_mut() {
            sub.cancel_all();
        }
    }

    pub fn take_post_batch(&mut self) -> Vec<SpotOrder> {
        let mut batch = Vec::new();
        for symbol in &self.pair_symbols {
            if let Some(sub) = self.subs.get_mut(symbol) {
                batch.extend(sub.take_post_batch());
            }
        }
        batch
    }

    pub fn take_cancel_batch(&mut self) -> Vec<SpotOrder> {
        let mut batch = Vec::new();
        for symbol in &self.pair_symbols {
            if let Some(sub) = self.subs.get_mut(symbol) {
                batch.extend(sub.take_cancel_batch());
            }
        }
        batch
    }

    pub fn apply_post_responses(&mut self, responses: Vec<SpotOrder>) {
        self.for_each_group(responses, |sub, group| sub.apply_post_responses(group));
        // pairs with no response at all still need their hanging orders back
        for sub in self.subs.values_mut() {
            if !sub.bucket(Lifecycle::HangingPosting).is_empty() {
                sub.apply_post_responses(Vec::new());
            }
        }
    }

    pub fn apply_cancel_responses(&mut self, responses: Vec<SpotOrder>) {
        self.for_each_group(responses, |sub, group| sub.apply_cancel_responses(group));
        for sub in self.subs.values_mut() {
            if !sub.bucket(Lifecycle::HangingCancelling).is_empty() {
                sub.apply_cancel_responses(Vec::new());
            }
        }
    }

    /// Apply status-query responses, pair by pair. Pairs whose response set
    /// came back short are skipped and reported.
    pub fn update_state(&mut self, responses: Vec<SpotOrder>) -> Vec<OrderError> {
        let mut grouped = self.divide_orders(responses);
        let mut errors = Vec::new();
        for symbol in &self.pair_symbols {
            let Some(sub) = self.subs.get_mut(symbol) else {
                continue;
            };
            if sub.tracked_count() == 0 {
                continue;
            }
            let group = grouped.remove(symbol).unwrap_or_default();
            if let Err(err) = sub.update_state(group) {
                errors.push(err);
            }
        }
        errors
    }

    pub fn insert_active_orders(&mut self, orders: Vec<SpotOrder>) {
        self.for_each_group(orders, |sub, group| sub.insert_active_orders(group));
    }

    pub fn add_backlog(&mut self, orders: Vec<SpotOrder>, all: bool) {
        if all {
            for sub in self.subs.values_mut() {
                sub.add_backlog_all();
            }
        } else {
            self.for_each_group(orders, |sub, group| sub.add_backlog(&group));
        }
    }

    /// Drain backlog entries (all, or the given ids) for resubmission.
    pub fn take_backlog(&mut self, ids: Option<&[String]>) -> Vec<SpotOrder> {
        let mut out = Vec::new();
        for sub in self.subs.values_mut() {
            out.extend(sub.take_backlog(ids));
        }
        out
    }
}
