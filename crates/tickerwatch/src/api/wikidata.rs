//! Wikidata SPARQL client

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("tickerwatch/", env!("CARGO_PKG_VERSION"));

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// One result row: variable name to `{type, value, ...}` object
pub type Binding = Map<String, Value>;

/// Executes SELECT queries against a knowledge base
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Run a query and return its result rows in order
    async fn select(&self, query: &str) -> Result<Vec<Binding>>;
}

/// Read the `value` of a labeled binding, if the row bound it
pub fn label(binding: &Binding, key: &str) -> Option<String> {
    binding
        .get(key)
        .and_then(|field| field.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull `results.bindings` out of a SPARQL JSON response
///
/// Rows that are not objects are skipped.
pub fn parse_bindings(response: &Value) -> Result<Vec<Binding>> {
    let rows = response
        .get("results")
        .and_then(|results| results.get("bindings"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            WatchError::MalformedInput(format!("Malformed Wikidata response: {response}"))
        })?;

    Ok(rows
        .iter()
        .filter_map(|row| match row.as_object() {
            Some(binding) => Some(binding.clone()),
            None => {
                warn!("Skipping malformed binding: {}", row);
                None
            }
        })
        .collect())
}

/// Wikidata query service client
pub struct WikidataClient {
    client: Client,
    endpoint: String,
    rate_limiter: SharedRateLimiter,
}

impl WikidataClient {
    /// Create a new client with a per-minute query budget
    ///
    /// # Arguments
    /// * `endpoint` - SPARQL endpoint URL
    /// * `rate_limit` - Queries per minute
    /// * `timeout` - Request timeout
    pub fn new(endpoint: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Create from the watch configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        Self::new(
            config.wikidata_url.clone(),
            config.knowledge_base_rate_limit,
            config.request_timeout,
        )
    }
}

#[async_trait]
impl KnowledgeBase for WikidataClient {
    async fn select(&self, query: &str) -> Result<Vec<Binding>> {
        self.rate_limiter.until_ready().await;

        debug!("Wikidata query: {}", query);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Api {
                provider: "wikidata".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        debug!("Wikidata response: {}", body);
        parse_bindings(&body)
    }
}
