//! Session supervisor: reconnects the stream with exponential backoff

use crate::api::twitter::StreamSource;
use crate::config::WatchConfig;
use crate::consumer::StreamConsumer;
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One streaming session, run to completion
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// Runs until the session ends; `Err` carries the reason it failed
    async fn run_session(&self) -> Result<()>;
}

/// Consumer bound to its stream source
pub struct StreamSession {
    consumer: Arc<StreamConsumer>,
    source: Arc<dyn StreamSource>,
}

impl StreamSession {
    pub fn new(consumer: Arc<StreamConsumer>, source: Arc<dyn StreamSource>) -> Self {
        Self { consumer, source }
    }
}

#[async_trait]
impl SessionRunner for StreamSession {
    /// A stream that ends without the consumer being closed is reported as
    /// [`WatchError::SessionTerminated`]
    async fn run_session(&self) -> Result<()> {
        self.consumer.open(self.source.as_ref()).await?;
        if self.consumer.is_closed() {
            return Ok(());
        }
        Err(WatchError::SessionTerminated(
            "stream ended by the server".to_string(),
        ))
    }
}

/// Backoff bookkeeping, owned by the supervisor loop
#[derive(Debug, Clone, Copy)]
pub struct Session {
    /// Reconnects made in the current backoff sequence
    pub tries: u32,
    /// When the current backoff sequence started
    pub sequence_start: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            tries: 0,
            sequence_start: now,
        }
    }

    /// Account for a session that just ended at `now`
    ///
    /// The first failure starts a sequence. A sequence older than `reset`
    /// starts over, so a long healthy run earns back the full budget.
    pub fn record_end(&mut self, now: Instant, reset: Duration) {
        if self.tries == 0 {
            self.sequence_start = now;
        }
        if now.duration_since(self.sequence_start) > reset {
            self.tries = 0;
            self.sequence_start = now;
        }
    }
}

/// Keeps a session running, backing off between reconnects
pub struct SessionSupervisor {
    runner: Arc<dyn SessionRunner>,
    config: WatchConfig,
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    pub fn new(config: &WatchConfig, runner: Arc<dyn SessionRunner>) -> Self {
        Self {
            runner,
            config: config.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop reconnecting once this token is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Run sessions until shutdown or until the retry budget is spent
    ///
    /// Session failures are logged and retried. The only error returned is
    /// [`WatchError::RetryBudgetExhausted`].
    pub async fn run(&self) -> Result<()> {
        let mut session = Session::new(Instant::now());

        loop {
            info!("Starting session");
            match self.runner.run_session().await {
                Ok(()) => info!("Session ended"),
                Err(e) => error!("Session failed: {}", e),
            }

            if self.shutdown.is_cancelled() {
                info!("Supervisor stopped");
                return Ok(());
            }

            session.record_end(Instant::now(), self.config.backoff_reset);

            if session.tries >= self.config.max_tries {
                error!("Giving up after {} tries", session.tries);
                return Err(WatchError::RetryBudgetExhausted {
                    tries: session.tries,
                });
            }

            let delay = self.config.backoff_delay(session.tries);
            warn!("Reconnecting in {:?} (try {})", delay, session.tries + 1);
            tokio::select! {
                () = sleep(delay) => {}
                () = self.shutdown.cancelled() => {
                    info!("Supervisor stopped during backoff");
                    return Ok(());
                }
            }
            session.tries += 1;
        }
    }
}
