//! Social platform clients: the filtered post stream and status publishing

use crate::api::oauth::OAuthCredentials;
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const PROVIDER: &str = "twitter";
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Longest frame buffered while waiting for its newline
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Raw frames of a live stream; an `Err` item is a transport failure
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Opens the live post stream for one account
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Connect and return the frame stream; end of stream is a clean stop
    async fn connect(&self, account_id: &str) -> Result<FrameStream>;
}

/// Posts composed messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message, retrying transient failures internally
    async fn publish(&self, text: &str) -> Result<()>;
}

/// Split a chunked body into newline-delimited frames
///
/// Blank keep-alive lines come through as empty frames so idle detection sees
/// them. A chunk error, or more than `max_len` bytes without a newline, is
/// yielded once and ends the stream.
pub fn frames<S, B, E>(chunks: S, max_len: usize) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Into<WatchError> + Send,
{
    stream::unfold(
        (chunks, Vec::<u8>::new(), false),
        move |(mut chunks, mut buffer, mut finished)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let frame = String::from_utf8_lossy(&line).trim().to_string();
                    return Some((Ok(frame), (chunks, buffer, finished)));
                }

                if buffer.len() > max_len {
                    let len = buffer.len();
                    buffer.clear();
                    let e = WatchError::Stream(format!(
                        "frame exceeds {max_len} bytes without a newline ({len} buffered)"
                    ));
                    return Some((Err(e), (chunks, buffer, true)));
                }

                if finished {
                    let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                    buffer.clear();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((Ok(rest), (chunks, buffer, finished)));
                }

                match chunks.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        buffer.clear();
                        return Some((Err(e.into()), (chunks, buffer, true)));
                    }
                    None => finished = true,
                }
            }
        },
    )
}

async fn api_error(response: Response) -> WatchError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    WatchError::Api {
        provider: PROVIDER.to_string(),
        status: status.as_u16(),
        body,
    }
}

/// Filtered stream client following a single account
#[derive(Debug, Clone)]
pub struct TwitterStream {
    client: Client,
    url: String,
    credentials: OAuthCredentials,
}

impl TwitterStream {
    /// Create a new stream client
    ///
    /// The stream is long-lived, so there is no total timeout. Each read is
    /// bounded by `idle_timeout`, which outlasts the server's keep-alive period.
    pub fn new(
        url: impl Into<String>,
        credentials: OAuthCredentials,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(idle_timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }

    /// Create from the watch configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        Self::new(
            config.stream_url.clone(),
            OAuthCredentials::from_config(config)?,
            config.request_timeout,
            config.stream_idle_timeout,
        )
    }
}

#[async_trait]
impl StreamSource for TwitterStream {
    async fn connect(&self, account_id: &str) -> Result<FrameStream> {
        info!("Connecting to stream for account {}", account_id);
        let params = [("follow", account_id), ("stall_warnings", "true")];
        let response = self
            .client
            .post(&self.url)
            .header(
                AUTHORIZATION,
                self.credentials.authorization("POST", &self.url, &params),
            )
            .query(&params)
            .send()
            .await
            .map_err(|e| WatchError::Stream(format!("connect failed: {e}")))?;

        if !response.status().is_success() {
            return Err(WatchError::Stream(api_error(response).await.to_string()));
        }

        Ok(frames(response.bytes_stream().boxed(), MAX_FRAME_LEN).boxed())
    }
}

/// Status update client, posting as the account the credentials belong to
#[derive(Debug, Clone)]
pub struct TwitterPublisher {
    client: Client,
    url: String,
    credentials: OAuthCredentials,
    retry_policy: RetryPolicy,
}

impl TwitterPublisher {
    /// Create a new publisher
    pub fn new(
        url: impl Into<String>,
        credentials: OAuthCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            credentials,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Create from the watch configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let credentials = OAuthCredentials::from_config(config)?;
        Ok(
            Self::new(config.publish_url.clone(), credentials, config.request_timeout)?
                .with_retry_policy(RetryPolicy::fixed(
                    config.publish_max_attempts,
                    config.publish_retry_delay,
                )),
        )
    }

    /// Signed form request for one status update
    fn status_request(&self, text: &str) -> reqwest::RequestBuilder {
        let authorization = self
            .credentials
            .authorization("POST", &self.url, &[("status", text)]);
        self.client
            .post(&self.url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(format!("status={}", urlencoding::encode(text)))
    }

    async fn post_status(&self, text: &str) -> Result<()> {
        let response = self.status_request(text).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let reset = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(WatchError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after: rate_limit_wait(reset, SystemTime::now()),
            });
        }

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(())
    }
}

/// How long to wait for a rate-limit window that resets at `reset` (epoch seconds)
fn rate_limit_wait(reset: Option<u64>, now: SystemTime) -> Duration {
    let Some(reset) = reset else {
        return DEFAULT_RATE_LIMIT_WAIT;
    };
    let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Duration::from_secs(reset.saturating_sub(now)).min(MAX_RATE_LIMIT_WAIT)
}

#[async_trait]
impl Publisher for TwitterPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        debug!("Publishing: {}", text);
        self.retry_policy
            .execute("publish", || self.post_status(text))
            .await?;
        info!("Published message ({} chars)", text.chars().count());
        Ok(())
    }
}
