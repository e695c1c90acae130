//! Crate error types.
//!
//! `ApiError` classifies REST failures for the retry policy; the order and
//! strategy errors are surfaced to the exchange loop / bot supervisor, which
//! log and keep the loop alive.

use thiserror::Error;

/// REST call failure, classified by how the uniform pipeline should react.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Retryable status (400, 404, 429, 503, 504), retries exhausted.
    #[error("transient http {status} after {retries} retries")]
    Transient { status: u16, retries: u32 },
    /// 401 / 403 / 500: retrying cannot help, operator attention needed.
    #[error("fatal http {status}")]
    Fatal { status: u16 },
    /// Any other non-2xx the taxonomy does not know.
    #[error("unexpected http {status}")]
    Unexpected { status: u16 },
    /// The whole call exceeded the process timeout.
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    /// Response decoded but did not have the shape the venue documents.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Fatal { .. })
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    /// A status query returned fewer orders than are tracked for the pair.
    #[error("venue returned fewer orders than tracked for {pair}: {got} < {tracked}")]
    InsufficientOrders {
        pair: String,
        got: usize,
        tracked: usize,
    },
    #[error("order id {0} already exists")]
    DuplicateOrder(String),
    #[error("order id {0} is not managed here")]
    UnknownOrder(String),
    #[error("failed to apply venue responses: {0}")]
    UpdateFailed(String),
}

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("no strategy named {0}")]
    NoSuchStrategy(String),
    #[error("strategy calculation failed: {0}")]
    Calculation(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no bot with id {0}")]
    NoSuchBot(String),
    #[error("no connector for exchange {0}")]
    NoSuchConnector(String),
    #[error("no venue settings for pair {pair} on {venue}")]
    MissingPairSettings { venue: String, pair: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },
}
