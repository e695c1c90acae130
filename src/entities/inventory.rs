//! Account inventory: per-token balances with a bounded snapshot history.

use std::collections::{HashMap, VecDeque};

/// Balance of one token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenBalance {
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

impl TokenBalance {
    pub fn new(free: f64, used: f64) -> Self {
        Self { free, used, total: free + used }
    }
}

/// Latest balances for the configured tokens plus a timestamped history of
/// snapshots, bounded like the market-data rings.
#[derive(Debug)]
pub struct Inventory {
    tokens: Vec<String>,
    current: HashMap<String, TokenBalance>,
    history: VecDeque<(i64, HashMap<String, TokenBalance>)>,
    max_length: usize,
}

impl Inventory {
    pub fn new(tokens: Vec<String>, max_length: usize) -> Self {
        let current = tokens
            .iter()
            .map(|t| (t.clone(), TokenBalance::default()))
            .collect();
        Self {
            tokens,
            current,
            history: VecDeque::new(),
            max_length,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Replace the current snapshot with venue-reported balances. Tokens the
    /// venue omitted keep a zero balance.
    pub fn update(&mut self, balances: &HashMap<String, TokenBalance>) {
        for token in &self.tokens {
            let bal = balances.get(token).copied().unwrap_or_default();
            self.current.insert(token.clone(), bal);
        }
        if self.history.len() >= self.max_length {
            self.history.pop_front();
        }
        self.history
            .push_back((chrono::Utc::now().timestamp(), self.current.clone()));
    }

    pub fn current_balances(&self) -> &HashMap<String, TokenBalance> {
        &self.current
    }

    pub fn all_balances(&self) -> &VecDeque<(i64, HashMap<String, TokenBalance>)> {
        &self.history
    }

    /// Available (free) balance of a single token; zero when unknown.
    pub fn single_balance(&self, symbol: &str) -> f64 {
        self.current.get(symbol).map(|b| b.free).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(free: f64) -> HashMap<String, TokenBalance> {
        let mut m = HashMap::new();
        m.insert("USDT".to_string(), TokenBalance::new(free, 1.0));
        m
    }

    #[test]
    fn update_replaces_current_and_appends_history() {
        let mut inv = Inventory::new(vec!["ETH".into(), "USDT".into()], 10);
        assert_eq!(inv.single_balance("USDT"), 0.0);

        inv.update(&snapshot(100.0));
        assert!((inv.single_balance("USDT") - 100.0).abs() < 1e-9);
        // ETH absent from the venue payload -> zeroed, not stale.
        assert_eq!(inv.single_balance("ETH"), 0.0);
        assert_eq!(inv.all_balances().len(), 1);

        let b = inv.current_balances()["USDT"];
        assert!((b.total - 101.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut inv = Inventory::new(vec!["USDT".into()], 2);
        for i in 0..4 {
            inv.update(&snapshot(i as f64));
        }
        assert_eq!(inv.all_balances().len(), 2);
        assert!((inv.single_balance("USDT") - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_token_reads_zero() {
        let inv = Inventory::new(vec!["USDT".into()], 2);
        assert_eq!(inv.single_balance("DOGE"), 0.0);
    }
}
