//! Per-post company aggregation
//!
//! Expands mentions, extracts entities, resolves each entity to its stock
//! listings, attaches the post sentiment, and keeps the first record seen for
//! every ticker.

use crate::api::language::{EntityExtractor, SentimentScorer};
use crate::company::{CompanyRecord, format_entities};
use crate::error::{Result, WatchError};
use crate::mention::expand_mentions;
use crate::post::Post;
use crate::resolver::CompanyResolver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Finds the companies a post talks about
pub struct Aggregator {
    extractor: Arc<dyn EntityExtractor>,
    scorer: Arc<dyn SentimentScorer>,
    resolver: Arc<dyn CompanyResolver>,
}

impl Aggregator {
    /// Create an aggregator over the three capabilities
    pub fn new(
        extractor: Arc<dyn EntityExtractor>,
        scorer: Arc<dyn SentimentScorer>,
        resolver: Arc<dyn CompanyResolver>,
    ) -> Self {
        Self {
            extractor,
            scorer,
            resolver,
        }
    }

    /// Companies mentioned in a post, unique by ticker, in discovery order
    ///
    /// Returns `NoInput` for an absent post and `MalformedInput` when the post
    /// has no usable text. Failed lookups only drop the affected entity.
    pub async fn find_companies(&self, post: Option<&Post>) -> Result<Vec<CompanyRecord>> {
        let Some(post) = post else {
            warn!("No post to find companies.");
            return Err(WatchError::NoInput);
        };

        let text = expand_mentions(Some(&post.text), &post.mentions)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                WatchError::MalformedInput(format!("no text in post {}", post.id))
            })?;

        let entities = match self.extractor.extract(&text).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!("Entity extraction failed for post {}: {}", post.id, e);
                Vec::new()
            }
        };
        debug!("Found entities: {}", format_entities(&entities));

        let mut companies: Vec<CompanyRecord> = Vec::new();
        for entity in &entities {
            let Some(entity_id) = entity.knowledge_base_id.as_deref() else {
                debug!("No MID found for entity: {}", entity.name);
                continue;
            };

            let resolved = match self.resolver.resolve(entity_id).await {
                Ok(Some(resolved)) if !resolved.is_empty() => resolved,
                Ok(_) => {
                    debug!(
                        "No company data found for entity: {} ({})",
                        entity.name, entity_id
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Company lookup failed for entity: {} ({}): {}",
                        entity.name, entity_id, e
                    );
                    continue;
                }
            };
            debug!("Found company data: {:?}", resolved);

            for company in resolved {
                let sentiment = self.sentiment(&text).await;
                let company = company.with_sentiment(sentiment);
                debug!("Using sentiment for company: {:?} {:?}", sentiment, company);
                insert_unique_ticker(&mut companies, company);
            }
        }

        info!("Using companies for post {}: {:?}", post.id, companies);
        Ok(companies)
    }

    async fn sentiment(&self, text: &str) -> Option<f64> {
        match self.scorer.score(text).await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!("Sentiment scoring failed: {}", e);
                None
            }
        }
    }
}

/// Append `company` unless its ticker is missing or already taken
fn insert_unique_ticker(companies: &mut Vec<CompanyRecord>, company: CompanyRecord) {
    let Some(ticker) = company.ticker() else {
        warn!("Skipping company without ticker: {:?}", company);
        return;
    };

    if companies.iter().any(|existing| existing.ticker() == Some(ticker)) {
        warn!("Skipping company with duplicate ticker: {:?}", company);
        return;
    }

    companies.push(company);
}
