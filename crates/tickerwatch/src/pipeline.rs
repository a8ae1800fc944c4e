//! Per-post pipeline: aggregate companies, compose, publish

use crate::aggregator::Aggregator;
use crate::api::twitter::Publisher;
use crate::composer::compose;
use crate::consumer::PostHandler;
use crate::error::Result;
use crate::post::Post;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a post into a published message
pub struct PostPipeline {
    aggregator: Aggregator,
    publisher: Option<Arc<dyn Publisher>>,
}

impl PostPipeline {
    /// Pipeline that publishes through `publisher`
    pub fn new(aggregator: Aggregator, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            aggregator,
            publisher: Some(publisher),
        }
    }

    /// Pipeline that composes but never publishes
    pub fn dry_run(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            publisher: None,
        }
    }

    /// Compose the message for a post, `None` when it names no company
    pub async fn analyze(&self, post: &Post) -> Result<Option<String>> {
        let companies = self.aggregator.find_companies(Some(post)).await?;
        if companies.is_empty() {
            info!("No companies in post {}", post.id);
            return Ok(None);
        }

        Ok(Some(compose(&companies, &post.permalink())))
    }
}

#[async_trait]
impl PostHandler for PostPipeline {
    async fn handle(&self, post: Post) -> Result<()> {
        let Some(message) = self.analyze(&post).await? else {
            return Ok(());
        };

        match &self.publisher {
            Some(publisher) => publisher.publish(&message).await,
            None => {
                warn!("Dry run, not publishing: {}", message);
                Ok(())
            }
        }
    }
}
