//! Stream consumer: one reader feeding a bounded queue drained by a worker pool
//!
//! The reader accepts only posts authored by the watched account. Each
//! accepted post is handled exactly once by one worker. Stopping, whether
//! through [`StreamConsumer::close`] or a transport failure, always lets the
//! queue drain before the workers are joined. A stream that stays silent for
//! longer than the configured idle timeout is treated as a transport failure.

use crate::api::twitter::StreamSource;
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::post::Post;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Work performed for every accepted post
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostHandler: Send + Sync {
    async fn handle(&self, post: Post) -> Result<()>;
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Post>>>;

/// Consumes the live stream of one account
pub struct StreamConsumer {
    source_account_id: String,
    worker_count: usize,
    queue_capacity: usize,
    idle_timeout: Duration,
    stream_idle_timeout: Duration,
    handler: Arc<dyn PostHandler>,
    shutdown: CancellationToken,
}

impl StreamConsumer {
    /// Create a consumer from the watch configuration
    pub fn new(config: &WatchConfig, handler: Arc<dyn PostHandler>) -> Self {
        Self {
            source_account_id: config.source_account_id.clone(),
            worker_count: config.worker_count.max(1),
            queue_capacity: config.queue_capacity.max(1),
            idle_timeout: config.queue_idle_timeout,
            stream_idle_timeout: config.stream_idle_timeout,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Share an existing shutdown token, e.g. with the supervisor
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Stop accepting frames; queued posts are still handled
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Closing stream consumer");
        }
        self.shutdown.cancel();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run one streaming session until the stream ends, fails, or is closed
    ///
    /// Returns the transport error that ended the session, if any, including
    /// [`WatchError::Stream`] when no frame or keep-alive arrives in time.
    pub async fn open(&self, source: &dyn StreamSource) -> Result<()> {
        if self.is_closed() {
            debug!("Consumer already closed, not connecting");
            return Ok(());
        }

        let mut frames = source.connect(&self.source_account_id).await?;
        info!(
            "Stream open for account {} with {} workers",
            self.source_account_id, self.worker_count
        );

        let (sender, receiver) = mpsc::channel::<Post>(self.queue_capacity);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let stop = Arc::new(AtomicBool::new(false));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            workers.spawn(run_worker(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&stop),
                Arc::clone(&self.handler),
                self.idle_timeout,
            ));
        }

        let mut failure: Option<WatchError> = None;
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Stream consumer closed");
                    break;
                }
                frame = timeout(self.stream_idle_timeout, frames.next()) => match frame {
                    Err(_) => {
                        let e = WatchError::Stream(format!(
                            "stalled: no data for {:?}",
                            self.stream_idle_timeout
                        ));
                        error!("Stream failed: {}", e);
                        failure = Some(e);
                        break;
                    }
                    Ok(Some(Ok(frame))) if frame.is_empty() => trace!("Keep-alive"),
                    Ok(Some(Ok(frame))) => {
                        let Some(post) = self.accept(&frame) else {
                            continue;
                        };
                        if sender.send(post).await.is_err() {
                            warn!("Post queue closed unexpectedly");
                            break;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        error!("Stream failed: {}", e);
                        failure = Some(e);
                        break;
                    }
                    Ok(None) => {
                        info!("Stream ended");
                        break;
                    }
                }
            }
        }

        // Workers see the closed channel only after every queued post is taken.
        drop(frames);
        drop(sender);
        stop.store(true, Ordering::SeqCst);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker task failed: {}", e);
            }
        }
        debug!("All workers stopped");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn accept(&self, frame: &str) -> Option<Post> {
        match Post::from_frame(frame) {
            Ok(post) if post.author_id == self.source_account_id => {
                debug!("Accepted post {}", post.id);
                Some(post)
            }
            Ok(post) => {
                trace!("Skipping post {} by {}", post.id, post.author_id);
                None
            }
            Err(e) => {
                trace!("Skipping frame: {}", e);
                None
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    stop: Arc<AtomicBool>,
    handler: Arc<dyn PostHandler>,
    idle_timeout: Duration,
) {
    loop {
        let next = timeout(idle_timeout, async { receiver.lock().await.recv().await }).await;

        match next {
            Ok(Some(post)) => {
                let id = post.id.clone();
                if let Err(e) = handler.handle(post).await {
                    warn!("Worker {} failed on post {}: {}", worker_id, id, e);
                }
            }
            Ok(None) => break,
            Err(_) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                trace!("Worker {} idle", worker_id);
            }
        }
    }
    trace!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::twitter::FrameStream;
    use futures::stream;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    const ACCOUNT: &str = "1112802541018992640";

    fn frame(id: &str, author: &str) -> String {
        json!({
            "id_str": id,
            "text": "Ford is bringing jobs back",
            "user": {"id_str": author, "screen_name": "watched"},
            "entities": {"user_mentions": []}
        })
        .to_string()
    }

    struct FakeSource {
        stream: StdMutex<Option<FrameStream>>,
    }

    impl FakeSource {
        fn new(stream: FrameStream) -> Self {
            Self {
                stream: StdMutex::new(Some(stream)),
            }
        }

        fn frames(items: Vec<Result<String>>) -> Self {
            Self::new(stream::iter(items).boxed())
        }
    }

    #[async_trait]
    impl StreamSource for FakeSource {
        async fn connect(&self, account_id: &str) -> Result<FrameStream> {
            assert_eq!(account_id, ACCOUNT);
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| WatchError::Stream("already connected".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        handled: StdMutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl PostHandler for Recorder {
        async fn handle(&self, post: Post) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.handled.lock().unwrap().push(post.id);
            Ok(())
        }
    }

    fn config(workers: usize) -> WatchConfig {
        WatchConfig::builder()
            .source_account_id(ACCOUNT)
            .worker_count(workers)
            .queue_capacity(10)
            .queue_idle_timeout(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_only_watched_account_is_handled() {
        let source = FakeSource::frames(vec![
            Ok(frame("1", ACCOUNT)),
            Ok(frame("2", "25073877")),
            Ok("not json".to_string()),
            Ok(json!({"limit": {"track": 3}}).to_string()),
            Ok(frame("3", ACCOUNT)),
        ]);
        let recorder = Arc::new(Recorder::default());
        let consumer = StreamConsumer::new(&config(4), recorder.clone());

        consumer.open(&source).await.unwrap();

        let mut handled = recorder.handled.lock().unwrap().clone();
        handled.sort();
        assert_eq!(handled, vec!["1".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_each_post_handled_once() {
        let mut handler = MockPostHandler::new();
        handler
            .expect_handle()
            .withf(|post| post.id == "7")
            .times(1)
            .returning(|_| Ok(()));
        let source = FakeSource::frames(vec![Ok(frame("7", ACCOUNT))]);
        let consumer = StreamConsumer::new(&config(8), Arc::new(handler));

        consumer.open(&source).await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_drains_then_returns_error() {
        let source = FakeSource::frames(vec![
            Ok(frame("1", ACCOUNT)),
            Ok(frame("2", ACCOUNT)),
            Err(WatchError::Stream("connection reset".to_string())),
            Ok(frame("3", ACCOUNT)),
        ]);
        let recorder = Arc::new(Recorder::default());
        let consumer = StreamConsumer::new(&config(1), recorder.clone());

        let result = consumer.open(&source).await;

        assert!(matches!(result, Err(WatchError::Stream(_))));
        assert_eq!(*recorder.handled.lock().unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_handler_errors_do_not_stop_workers() {
        let mut handler = MockPostHandler::new();
        handler
            .expect_handle()
            .times(3)
            .returning(|_| Err(WatchError::Other("publish failed".to_string())));
        let source = FakeSource::frames(vec![
            Ok(frame("1", ACCOUNT)),
            Ok(frame("2", ACCOUNT)),
            Ok(frame("3", ACCOUNT)),
        ]);
        let consumer = StreamConsumer::new(&config(1), Arc::new(handler));

        assert!(consumer.open(&source).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let source = FakeSource::frames(Vec::new());
        let consumer = StreamConsumer::new(&config(1), Arc::new(Recorder::default()));

        consumer.open(&source).await.unwrap();
        assert!(consumer.open(&source).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drains_queue() {
        let posts: Vec<Result<String>> = (1..=5)
            .map(|i| Ok(frame(&i.to_string(), ACCOUNT)))
            .collect();
        let source = FakeSource::new(stream::iter(posts).chain(stream::pending()).boxed());
        let recorder = Arc::new(Recorder {
            handled: StdMutex::new(Vec::new()),
            delay: Duration::from_millis(20),
        });
        let consumer = Arc::new(StreamConsumer::new(&config(1), recorder.clone()));

        let closer = Arc::clone(&consumer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
            closer.close();
        });

        consumer.open(&source).await.unwrap();

        assert!(consumer.is_closed());
        assert_eq!(recorder.handled.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_is_a_stall() {
        let source = FakeSource::new(
            stream::iter(vec![Ok(frame("1", ACCOUNT))])
                .chain(stream::pending())
                .boxed(),
        );
        let recorder = Arc::new(Recorder::default());
        let consumer = StreamConsumer::new(&config(1), recorder.clone());

        let started = tokio::time::Instant::now();
        let result = consumer.open(&source).await;

        match result {
            Err(WatchError::Stream(msg)) => assert!(msg.contains("stalled")),
            other => panic!("Expected stall, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(!consumer.is_closed());
        assert_eq!(*recorder.handled.lock().unwrap(), vec!["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alives_hold_off_stall() {
        // A keep-alive every 60s for three minutes, then the stream ends.
        let keep_alives = stream::iter(0..3).then(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, WatchError>(String::new())
        });
        let source = FakeSource::new(keep_alives.boxed());
        let consumer = StreamConsumer::new(&config(1), Arc::new(Recorder::default()));

        let started = tokio::time::Instant::now();
        consumer.open(&source).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_closed_consumer_does_not_connect() {
        let source = FakeSource::frames(Vec::new());
        let consumer = StreamConsumer::new(&config(1), Arc::new(Recorder::default()));
        consumer.close();

        consumer.open(&source).await.unwrap();
        assert!(source.stream.lock().unwrap().is_some());
    }
}
