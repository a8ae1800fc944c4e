//! Configuration for the watch pipeline

use crate::error::{Result, WatchError};
use std::time::Duration;
use tickerwatch_utils::{env_duration_millis, env_duration_secs, env_parse, env_string};

/// Account whose posts are watched when nothing else is configured
pub const DEFAULT_SOURCE_ACCOUNT_ID: &str = "1112802541018992640";

const DEFAULT_STREAM_URL: &str = "https://stream.twitter.com/1.1/statuses/filter.json";
const DEFAULT_PUBLISH_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
const DEFAULT_WIKIDATA_URL: &str = "https://query.wikidata.org/sparql";
const DEFAULT_LANGUAGE_URL: &str = "https://language.googleapis.com/v1";

/// Largest reconnect budget whose doubling delay still fits the backoff arithmetic
pub const MAX_TRIES_LIMIT: u32 = 31;

/// Configuration for the watch pipeline
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Only posts authored by this account id are processed
    pub source_account_id: String,

    /// Size of the worker pool draining the post queue
    pub worker_count: usize,

    /// Capacity of the bounded post queue
    pub queue_capacity: usize,

    /// How long an idle worker waits for work before re-checking for shutdown
    pub queue_idle_timeout: Duration,

    /// A stream delivering nothing, keep-alives included, for this long is stalled
    pub stream_idle_timeout: Duration,

    /// Delay before the first reconnect of a backoff sequence
    pub backoff_base: Duration,

    /// Reconnect attempts allowed within one backoff sequence
    pub max_tries: u32,

    /// A backoff sequence older than this starts over
    pub backoff_reset: Duration,

    /// Timeout applied to every outbound HTTP request
    pub request_timeout: Duration,

    /// How long resolved companies stay cached per entity id
    pub resolver_cache_ttl: Duration,

    /// Knowledge-base queries allowed per minute
    pub knowledge_base_rate_limit: u32,

    /// Attempts per published message before giving up
    pub publish_max_attempts: u32,

    /// Pause between publish attempts
    pub publish_retry_delay: Duration,

    /// Bind address of the health endpoint
    pub health_addr: String,

    /// Filtered stream endpoint
    pub stream_url: String,

    /// Status update endpoint
    pub publish_url: String,

    /// SPARQL endpoint
    pub wikidata_url: String,

    /// Natural language API base URL
    pub language_url: String,

    /// OAuth consumer key of the publishing app
    pub twitter_consumer_key: Option<String>,

    /// OAuth consumer secret of the publishing app
    pub twitter_consumer_secret: Option<String>,

    /// OAuth access token of the publishing account
    pub twitter_access_token: Option<String>,

    /// OAuth access token secret of the publishing account
    pub twitter_access_token_secret: Option<String>,

    /// API key for the natural language service
    pub language_api_key: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            source_account_id: DEFAULT_SOURCE_ACCOUNT_ID.to_string(),
            worker_count: 100,
            queue_capacity: 1000,
            queue_idle_timeout: Duration::from_secs(5 * 60),
            stream_idle_timeout: Duration::from_secs(90),
            backoff_base: Duration::from_millis(100),
            max_tries: 12,
            backoff_reset: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(30),
            resolver_cache_ttl: Duration::from_secs(3600),
            knowledge_base_rate_limit: 30,
            publish_max_attempts: 60,
            publish_retry_delay: Duration::from_secs(1),
            health_addr: "0.0.0.0:1025".to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            publish_url: DEFAULT_PUBLISH_URL.to_string(),
            wikidata_url: DEFAULT_WIKIDATA_URL.to_string(),
            language_url: DEFAULT_LANGUAGE_URL.to_string(),
            twitter_consumer_key: None,
            twitter_consumer_secret: None,
            twitter_access_token: None,
            twitter_access_token_secret: None,
            language_api_key: None,
        }
    }
}

impl WatchConfig {
    /// Create a new configuration builder
    pub fn builder() -> WatchConfigBuilder {
        WatchConfigBuilder::default()
    }

    /// Load the whole configuration from the environment over the defaults
    pub fn from_env() -> Result<Self> {
        let config = Self::builder().with_env()?.build()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_account_id.trim().is_empty() {
            return Err(WatchError::ConfigError(
                "source_account_id must not be empty".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(WatchError::ConfigError(
                "worker_count must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(WatchError::ConfigError(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.max_tries == 0 {
            return Err(WatchError::ConfigError(
                "max_tries must be greater than 0".to_string(),
            ));
        }

        if self.max_tries > MAX_TRIES_LIMIT {
            return Err(WatchError::ConfigError(format!(
                "max_tries must be at most {MAX_TRIES_LIMIT}"
            )));
        }

        if self.stream_idle_timeout.is_zero() {
            return Err(WatchError::ConfigError(
                "stream_idle_timeout must be greater than 0".to_string(),
            ));
        }

        if self.publish_max_attempts == 0 {
            return Err(WatchError::ConfigError(
                "publish_max_attempts must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("stream_url", &self.stream_url),
            ("publish_url", &self.publish_url),
            ("wikidata_url", &self.wikidata_url),
            ("language_url", &self.language_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                WatchError::ConfigError(format!("{name} is not a valid URL ({value}): {e}"))
            })?;
        }

        Ok(())
    }

    /// Check that the credentials needed for live streaming are present
    pub fn require_credentials(&self) -> Result<()> {
        for (name, value) in [
            ("TWITTER_CONSUMER_KEY", &self.twitter_consumer_key),
            ("TWITTER_CONSUMER_SECRET", &self.twitter_consumer_secret),
            ("TWITTER_ACCESS_TOKEN", &self.twitter_access_token),
            ("TWITTER_ACCESS_TOKEN_SECRET", &self.twitter_access_token_secret),
        ] {
            if value.is_none() {
                return Err(WatchError::ConfigError(format!("{name} not set")));
            }
        }
        if self.language_api_key.is_none() {
            return Err(WatchError::ConfigError(
                "GOOGLE_LANGUAGE_API_KEY not set".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconnect delay after `tries` failed attempts in the current sequence
    pub fn backoff_delay(&self, tries: u32) -> Duration {
        2_u32
            .checked_pow(tries)
            .and_then(|factor| self.backoff_base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

/// Builder for WatchConfig
#[derive(Debug, Default)]
pub struct WatchConfigBuilder {
    source_account_id: Option<String>,
    worker_count: Option<usize>,
    queue_capacity: Option<usize>,
    queue_idle_timeout: Option<Duration>,
    stream_idle_timeout: Option<Duration>,
    backoff_base: Option<Duration>,
    max_tries: Option<u32>,
    backoff_reset: Option<Duration>,
    request_timeout: Option<Duration>,
    resolver_cache_ttl: Option<Duration>,
    knowledge_base_rate_limit: Option<u32>,
    publish_max_attempts: Option<u32>,
    publish_retry_delay: Option<Duration>,
    health_addr: Option<String>,
    stream_url: Option<String>,
    publish_url: Option<String>,
    wikidata_url: Option<String>,
    language_url: Option<String>,
    twitter_consumer_key: Option<String>,
    twitter_consumer_secret: Option<String>,
    twitter_access_token: Option<String>,
    twitter_access_token_secret: Option<String>,
    language_api_key: Option<String>,
}

impl WatchConfigBuilder {
    /// Set the watched account id
    pub fn source_account_id(mut self, id: impl Into<String>) -> Self {
        self.source_account_id = Some(id.into());
        self
    }

    /// Set the worker pool size
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Set the queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set the idle wait of a worker
    pub fn queue_idle_timeout(mut self, duration: Duration) -> Self {
        self.queue_idle_timeout = Some(duration);
        self
    }

    /// Set how long a silent stream is tolerated before reconnecting
    pub fn stream_idle_timeout(mut self, duration: Duration) -> Self {
        self.stream_idle_timeout = Some(duration);
        self
    }

    /// Set the base reconnect delay
    pub fn backoff_base(mut self, duration: Duration) -> Self {
        self.backoff_base = Some(duration);
        self
    }

    /// Set the reconnect budget per backoff sequence
    pub fn max_tries(mut self, tries: u32) -> Self {
        self.max_tries = Some(tries);
        self
    }

    /// Set the age after which a backoff sequence starts over
    pub fn backoff_reset(mut self, duration: Duration) -> Self {
        self.backoff_reset = Some(duration);
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Set the resolver cache TTL
    pub fn resolver_cache_ttl(mut self, duration: Duration) -> Self {
        self.resolver_cache_ttl = Some(duration);
        self
    }

    /// Set the knowledge-base queries per minute
    pub fn knowledge_base_rate_limit(mut self, per_minute: u32) -> Self {
        self.knowledge_base_rate_limit = Some(per_minute);
        self
    }

    /// Set publish attempts per message
    pub fn publish_max_attempts(mut self, attempts: u32) -> Self {
        self.publish_max_attempts = Some(attempts);
        self
    }

    /// Set the pause between publish attempts
    pub fn publish_retry_delay(mut self, duration: Duration) -> Self {
        self.publish_retry_delay = Some(duration);
        self
    }

    /// Set the health endpoint bind address
    pub fn health_addr(mut self, addr: impl Into<String>) -> Self {
        self.health_addr = Some(addr.into());
        self
    }

    /// Set the stream endpoint
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    /// Set the publish endpoint
    pub fn publish_url(mut self, url: impl Into<String>) -> Self {
        self.publish_url = Some(url.into());
        self
    }

    /// Set the SPARQL endpoint
    pub fn wikidata_url(mut self, url: impl Into<String>) -> Self {
        self.wikidata_url = Some(url.into());
        self
    }

    /// Set the natural language API base URL
    pub fn language_url(mut self, url: impl Into<String>) -> Self {
        self.language_url = Some(url.into());
        self
    }

    /// Set the OAuth consumer key
    pub fn twitter_consumer_key(mut self, key: impl Into<String>) -> Self {
        self.twitter_consumer_key = Some(key.into());
        self
    }

    /// Set the OAuth consumer secret
    pub fn twitter_consumer_secret(mut self, secret: impl Into<String>) -> Self {
        self.twitter_consumer_secret = Some(secret.into());
        self
    }

    /// Set the OAuth access token
    pub fn twitter_access_token(mut self, token: impl Into<String>) -> Self {
        self.twitter_access_token = Some(token.into());
        self
    }

    /// Set the OAuth access token secret
    pub fn twitter_access_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.twitter_access_token_secret = Some(secret.into());
        self
    }

    /// Set the natural language API key
    pub fn language_api_key(mut self, key: impl Into<String>) -> Self {
        self.language_api_key = Some(key.into());
        self
    }

    /// Fill every field that has an environment override
    ///
    /// Values already set on the builder win over the environment.
    pub fn with_env(mut self) -> Result<Self> {
        self.source_account_id = self
            .source_account_id
            .or_else(|| env_string("TICKERWATCH_SOURCE_ACCOUNT_ID"));
        self.worker_count = self.worker_count.or(env_parse("TICKERWATCH_WORKERS")?);
        self.queue_capacity = self
            .queue_capacity
            .or(env_parse("TICKERWATCH_QUEUE_CAPACITY")?);
        self.queue_idle_timeout = self
            .queue_idle_timeout
            .or(env_duration_secs("TICKERWATCH_QUEUE_IDLE_TIMEOUT_SECS")?);
        self.stream_idle_timeout = self
            .stream_idle_timeout
            .or(env_duration_secs("TICKERWATCH_STREAM_IDLE_TIMEOUT_SECS")?);
        self.backoff_base = self
            .backoff_base
            .or(env_duration_millis("TICKERWATCH_BACKOFF_BASE_MS")?);
        self.max_tries = self.max_tries.or(env_parse("TICKERWATCH_MAX_TRIES")?);
        self.backoff_reset = self
            .backoff_reset
            .or(env_duration_secs("TICKERWATCH_BACKOFF_RESET_SECS")?);
        self.request_timeout = self
            .request_timeout
            .or(env_duration_secs("TICKERWATCH_REQUEST_TIMEOUT_SECS")?);
        self.resolver_cache_ttl = self
            .resolver_cache_ttl
            .or(env_duration_secs("TICKERWATCH_RESOLVER_CACHE_TTL_SECS")?);
        self.knowledge_base_rate_limit = self
            .knowledge_base_rate_limit
            .or(env_parse("TICKERWATCH_KB_RATE_LIMIT")?);
        self.publish_max_attempts = self
            .publish_max_attempts
            .or(env_parse("TICKERWATCH_PUBLISH_MAX_ATTEMPTS")?);
        self.publish_retry_delay = self
            .publish_retry_delay
            .or(env_duration_secs("TICKERWATCH_PUBLISH_RETRY_DELAY_SECS")?);
        self.health_addr = self
            .health_addr
            .or_else(|| env_string("TICKERWATCH_HEALTH_ADDR"));
        self.stream_url = self
            .stream_url
            .or_else(|| env_string("TICKERWATCH_STREAM_URL"));
        self.publish_url = self
            .publish_url
            .or_else(|| env_string("TICKERWATCH_PUBLISH_URL"));
        self.wikidata_url = self
            .wikidata_url
            .or_else(|| env_string("TICKERWATCH_WIKIDATA_URL"));
        self.language_url = self
            .language_url
            .or_else(|| env_string("TICKERWATCH_LANGUAGE_URL"));
        self.twitter_consumer_key = self
            .twitter_consumer_key
            .or_else(|| env_string("TWITTER_CONSUMER_KEY"));
        self.twitter_consumer_secret = self
            .twitter_consumer_secret
            .or_else(|| env_string("TWITTER_CONSUMER_SECRET"));
        self.twitter_access_token = self
            .twitter_access_token
            .or_else(|| env_string("TWITTER_ACCESS_TOKEN"));
        self.twitter_access_token_secret = self
            .twitter_access_token_secret
            .or_else(|| env_string("TWITTER_ACCESS_TOKEN_SECRET"));
        self.language_api_key = self
            .language_api_key
            .or_else(|| env_string("GOOGLE_LANGUAGE_API_KEY"));
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<WatchConfig> {
        let defaults = WatchConfig::default();

        let config = WatchConfig {
            source_account_id: self.source_account_id.unwrap_or(defaults.source_account_id),
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            queue_idle_timeout: self.queue_idle_timeout.unwrap_or(defaults.queue_idle_timeout),
            stream_idle_timeout: self
                .stream_idle_timeout
                .unwrap_or(defaults.stream_idle_timeout),
            backoff_base: self.backoff_base.unwrap_or(defaults.backoff_base),
            max_tries: self.max_tries.unwrap_or(defaults.max_tries),
            backoff_reset: self.backoff_reset.unwrap_or(defaults.backoff_reset),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            resolver_cache_ttl: self.resolver_cache_ttl.unwrap_or(defaults.resolver_cache_ttl),
            knowledge_base_rate_limit: self
                .knowledge_base_rate_limit
                .unwrap_or(defaults.knowledge_base_rate_limit),
            publish_max_attempts: self
                .publish_max_attempts
                .unwrap_or(defaults.publish_max_attempts),
            publish_retry_delay: self
                .publish_retry_delay
                .unwrap_or(defaults.publish_retry_delay),
            health_addr: self.health_addr.unwrap_or(defaults.health_addr),
            stream_url: self.stream_url.unwrap_or(defaults.stream_url),
            publish_url: self.publish_url.unwrap_or(defaults.publish_url),
            wikidata_url: self.wikidata_url.unwrap_or(defaults.wikidata_url),
            language_url: self.language_url.unwrap_or(defaults.language_url),
            twitter_consumer_key: self.twitter_consumer_key,
            twitter_consumer_secret: self.twitter_consumer_secret,
            twitter_access_token: self.twitter_access_token,
            twitter_access_token_secret: self.twitter_access_token_secret,
            language_api_key: self.language_api_key,
        };

        config.validate()?;
        Ok(config)
    }
}
