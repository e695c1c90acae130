//! Uniform REST pipeline shared by every venue adapter.
//!
//! One entry point executes a request: build URL, apply headers, send the
//! verb, classify the status, retry transient classes up to the configured
//! count, decode JSON. The whole call (retries included) runs under the
//! process timeout; a timed-out call surfaces as [`ApiError::Timeout`] and
//! callers treat it as absent.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::settings::Settings;

/// How the retry policy reacts to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    Transient,
    Fatal,
    Unknown,
}

/// Status taxonomy:
/// 200-class succeeds; 400/404/429/503/504 are worth retrying;
/// 401/403/500 cannot be fixed by retrying.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Ok,
        400 | 404 | 429 | 503 | 504 => StatusClass::Transient,
        401 | 403 | 500 => StatusClass::Fatal,
        _ => StatusClass::Unknown,
    }
}

/// Encode query pairs the way venues expect them signed: `k=v&k=v`.
pub fn encode_query(pairs: &[(&str, String)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

/// A fully prepared request: the adapter has already resolved URL shape,
/// auth headers and body encoding for its venue.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Form-encoded body (basic-auth venues post forms).
    pub form: Option<Vec<(String, String)>>,
}

impl RestRequest {
    pub fn get(url: String) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            form: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: &str, value: String) -> Self {
        self.headers.push((name.to_string(), value));
        self
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = Some(form);
        self
    }
}

/// Shared executor owned by each connector.
pub struct RestClient {
    client: reqwest::Client,
    retries: u32,
    call_timeout: Duration,
}

impl RestClient {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.time_out)
            .build()
            .unwrap_or_default();
        Self {
            client,
            retries: settings.retry_num,
            call_timeout: settings.time_out_process,
        }
    }

    /// Execute under the process timeout. Transient statuses and network
    /// errors retry with a short linear backoff; fatal statuses surface
    /// immediately.
    pub async fn request(&self, req: RestRequest) -> Result<Value, ApiError> {
        match timeout(self.call_timeout, self.request_with_retry(req)).await {
            Ok(res) => res,
            Err(_) => Err(ApiError::Timeout),
        }
    }

    async fn request_with_retry(&self, req: RestRequest) -> Result<Value, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            match self.execute_once(&req).await {
                Ok(value) => {
                    debug!(method = %req.method, url = %req.url, "request ok");
                    return Ok(value);
                }
                Err(err) => {
                    let retryable = match &err {
                        ApiError::Transient { .. } | ApiError::Network(_) => true,
                        _ => false,
                    };
                    if !retryable || attempt >= self.retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(url = %req.url, attempt, %err, "transient request failure, retrying");
                    sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
            }
        }
    }

    async fn execute_once(&self, req: &RestRequest) -> Result<Value, ApiError> {
        let mut builder = self.client.request(req.method.clone(), &req.url);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(form) = &req.form {
            builder = builder.form(form);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        match classify_status(status) {
            StatusClass::Ok => {
                let body = response.text().await?;
                Ok(serde_json::from_str(&body)?)
            }
            StatusClass::Transient => Err(ApiError::Transient {
                status,
                retries: self.retries,
            }),
            StatusClass::Fatal => Err(ApiError::Fatal { status }),
            StatusClass::Unknown => Err(ApiError::Unexpected { status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_taxonomy() {
        assert_eq!(classify_status(200), StatusClass::Ok);
        assert_eq!(classify_status(201), StatusClass::Ok);
        for s in [400u16, 404, 429, 503, 504] {
            assert_eq!(classify_status(s), StatusClass::Transient, "status {s}");
        }
        for s in [401u16, 403, 500] {
            assert_eq!(classify_status(s), StatusClass::Fatal, "status {s}");
        }
        assert_eq!(classify_status(418), StatusClass::Unknown);
        assert_eq!(classify_status(302), StatusClass::Unknown);
    }

    #[test]
    fn encode_query_is_ordered_and_escaped() {
        let q = encode_query(&[
            ("symbol", "ETHUSDT".to_string()),
            ("symbols", "ETH/USDT,BTCUSDT".to_string()),
        ]);
        assert_eq!(q, "symbol=ETHUSDT&symbols=ETH%2FUSDT%2CBTCUSDT");
    }

    #[test]
    fn request_builder_accumulates() {
        let req = RestRequest::get("https://x.test/api".into())
            .with_method(Method::POST)
            .with_header("X-KEY", "k".into())
            .with_form(vec![("a".into(), "1".into())]);
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.headers.len(), 1);
        assert!(req.form.is_some());
    }
}
