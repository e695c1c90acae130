//! Process tunables. All values configurable through the environment,
//! injected by value into each exchange at construction.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Per-HTTP-request timeout.
    pub time_out: Duration,
    /// Outer timeout around a whole connector call (including retries).
    pub time_out_process: Duration,
    /// Max retries on transient HTTP statuses.
    pub retry_num: u32,
    /// Lower bound of one fetch→strategize→reconcile cycle.
    pub loop_interval: Duration,
    /// Capacity of every market-data / inventory history ring.
    pub data_max_length: usize,
    /// Safety multiplier on the pre-flight inventory check.
    pub buffer_order_quantity: f64,
    /// Prefix of every client order id (provenance tag in venue logs).
    pub client_order_prefix: String,
    /// Worker parallelism cap when launching several bots.
    pub max_num_threads: usize,
    /// Default log filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_out: Duration::from_secs(5),
            time_out_process: Duration::from_secs(2),
            retry_num: 3,
            loop_interval: Duration::from_secs(2),
            data_max_length: 5000,
            buffer_order_quantity: 1.01,
            client_order_prefix: "meld_".to_string(),
            max_num_threads: 8,
            log_level: "debug".to_string(),
        }
    }
}

impl Settings {
    /// Load overrides from environment variables (if set).
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Ok(v) = std::env::var("MM_TIME_OUT") {
            if let Ok(f) = v.parse() { s.time_out = Duration::from_secs_f64(f); }
        }
        if let Ok(v) = std::env::var("MM_TIME_OUT_PROCESS") {
            if let Ok(f) = v.parse() { s.time_out_process = Duration::from_secs_f64(f); }
        }
        if let Ok(v) = std::env::var("MM_RETRY_NUM") {
            if let Ok(n) = v.parse() { s.retry_num = n; }
        }
        if let Ok(v) = std::env::var("MM_LOOP_INTERVAL") {
            if let Ok(f) = v.parse() { s.loop_interval = Duration::from_secs_f64(f); }
        }
        if let Ok(v) = std::env::var("MM_DATA_MAX_LENGTH") {
            if let Ok(n) = v.parse() { s.data_max_length = n; }
        }
        if let Ok(v) = std::env::var("MM_BUFFER_ORDER_QUANTITY") {
            if let Ok(f) = v.parse() { s.buffer_order_quantity = f; }
        }
        if let Ok(v) = std::env::var("MM_CLIENT_ORDER_PREFIX") {
            s.client_order_prefix = v;
        }
        if let Ok(v) = std::env::var("MM_MAX_NUM_THREADS") {
            if let Ok(n) = v.parse() { s.max_num_threads = n; }
        }
        if let Ok(v) = std::env::var("MM_LOG_LEVEL") {
            s.log_level = v;
        }
        s
    }
}
