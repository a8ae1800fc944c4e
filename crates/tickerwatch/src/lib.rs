//! Ticker watcher
//!
//! Follows the live post stream of one account, finds the publicly traded
//! companies each post mentions, and publishes a short summary with tickers
//! and a sentiment glyph. It includes:
//!
//! - A stream consumer feeding a bounded queue drained by a worker pool
//! - A session supervisor reconnecting with exponential backoff
//! - @-mention expansion before text analysis
//! - Entity extraction and sentiment scoring (Google Natural Language)
//! - Entity to NYSE/NASDAQ listing resolution (Wikidata SPARQL), cached
//! - Message composition within the platform's length limit
//! - A health endpoint for the hosting platform
//!
//! # Architecture
//!
//! `SessionSupervisor` runs `StreamSession`s. Each session opens the
//! `StreamConsumer`, whose workers hand every accepted post to `PostPipeline`:
//! - `Aggregator`: expands mentions, extracts entities, resolves companies
//! - `compose`: builds the message
//! - `Publisher`: posts it, retrying transient failures
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickerwatch::{
//!     Aggregator, LanguageClient, PostPipeline, Resolver, TwitterPublisher, WatchConfig,
//!     WikidataClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = WatchConfig::from_env()?;
//!     let language = Arc::new(LanguageClient::from_config(&config)?);
//!     let resolver = Resolver::new(Arc::new(WikidataClient::from_config(&config)?));
//!     let aggregator = Aggregator::new(language.clone(), language, Arc::new(resolver));
//!     let publisher = Arc::new(TwitterPublisher::from_config(&config)?);
//!     let pipeline = PostPipeline::new(aggregator, publisher);
//!
//!     if let Some(message) = pipeline.analyze(&post).await? {
//!         println!("{}", message);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod company;
pub mod composer;
pub mod config;
pub mod consumer;
pub mod error;
pub mod health;
pub mod mention;
pub mod pipeline;
pub mod post;
pub mod resolver;
pub mod retry;
pub mod supervisor;

// Re-export main types for convenience
pub use aggregator::Aggregator;
pub use api::{
    EntityExtractor, KnowledgeBase, LanguageClient, OAuthCredentials, Publisher, SentimentScorer,
    StreamSource, TwitterPublisher, TwitterStream, WikidataClient,
};
pub use cache::ResolutionCache;
pub use company::{CompanyRecord, Entity};
pub use composer::compose;
pub use config::WatchConfig;
pub use consumer::{PostHandler, StreamConsumer};
pub use error::{Result, WatchError};
pub use mention::expand_mentions;
pub use pipeline::PostPipeline;
pub use post::{Mention, Post};
pub use resolver::{CompanyResolver, Resolver};
pub use retry::RetryPolicy;
pub use supervisor::{SessionRunner, SessionSupervisor, StreamSession};
