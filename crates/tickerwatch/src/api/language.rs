//! Natural language API client for entity extraction and sentiment

use crate::company::Entity;
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Finds named entities in text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Entities in the order the service reported them
    async fn extract(&self, text: &str) -> Result<Vec<Entity>>;
}

/// Scores the overall sentiment of text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    /// Score in [-1.0, 1.0]; empty text scores 0.0
    async fn score(&self, text: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct AnalyzeEntitiesResponse {
    #[serde(default)]
    entities: Vec<RawEntity>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    salience: f64,
    #[serde(default)]
    mentions: Vec<RawEntityMention>,
}

#[derive(Debug, Deserialize)]
struct RawEntityMention {
    text: RawTextSpan,
}

#[derive(Debug, Deserialize)]
struct RawTextSpan {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentResponse {
    document_sentiment: RawSentiment,
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    magnitude: f64,
}

impl From<RawEntity> for Entity {
    fn from(raw: RawEntity) -> Self {
        Entity {
            knowledge_base_id: raw.metadata.get("mid").cloned(),
            name: raw.name,
            kind: raw.kind,
            salience: raw.salience,
            mentions: raw.mentions.into_iter().map(|m| m.text.content).collect(),
        }
    }
}

/// Google Cloud Natural Language client
#[derive(Debug, Clone)]
pub struct LanguageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LanguageClient {
    /// Create a new client
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create from the watch configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let api_key = config.language_api_key.clone().ok_or_else(|| {
            WatchError::ConfigError("GOOGLE_LANGUAGE_API_KEY not set".to_string())
        })?;
        Self::new(config.language_url.clone(), api_key, config.request_timeout)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/documents:{}", self.base_url, method)
    }

    async fn analyze<T: DeserializeOwned>(&self, method: &str, text: &str) -> Result<T> {
        let body = json!({
            "document": {
                "type": "PLAIN_TEXT",
                "language": "en",
                "content": text,
            },
            "encodingType": "UTF8",
        });

        let response = self
            .client
            .post(self.method_url(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Api {
                provider: "language".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl EntityExtractor for LanguageClient {
    async fn extract(&self, text: &str) -> Result<Vec<Entity>> {
        let response: AnalyzeEntitiesResponse = self.analyze("analyzeEntities", text).await?;
        Ok(response.entities.into_iter().map(Entity::from).collect())
    }
}

#[async_trait]
impl SentimentScorer for LanguageClient {
    async fn score(&self, text: &str) -> Result<f64> {
        if text.is_empty() {
            debug!("No sentiment for empty text.");
            return Ok(0.0);
        }

        let response: AnalyzeSentimentResponse = self.analyze("analyzeSentiment", text).await?;
        let sentiment = response.document_sentiment;
        debug!(
            "Sentiment score and magnitude for text: {} {} \"{}\"",
            sentiment.score, sentiment.magnitude, text
        );
        Ok(sentiment.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_response_parsing() {
        let body = json!({
            "entities": [
                {
                    "name": "General Motors",
                    "type": "ORGANIZATION",
                    "metadata": {
                        "mid": "/m/035nm",
                        "wikipedia_url": "https://en.wikipedia.org/wiki/General_Motors"
                    },
                    "salience": 0.4,
                    "mentions": [{
                        "text": {"content": "General Motors", "beginOffset": 0},
                        "type": "PROPER"
                    }]
                },
                {"name": "jobs", "type": "OTHER", "salience": 0.1}
            ],
            "language": "en"
        });

        let response: AnalyzeEntitiesResponse = serde_json::from_value(body).unwrap();
        let entities: Vec<Entity> = response.entities.into_iter().map(Entity::from).collect();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].knowledge_base_id.as_deref(), Some("/m/035nm"));
        assert_eq!(entities[0].kind, "ORGANIZATION");
        assert_eq!(entities[0].mentions, vec!["General Motors".to_string()]);
        assert_eq!(entities[1].knowledge_base_id, None);
    }

    #[test]
    fn test_sentiment_response_parsing() {
        let body = json!({
            "documentSentiment": {"magnitude": 0.9, "score": -0.6},
            "language": "en"
        });
        let response: AnalyzeSentimentResponse = serde_json::from_value(body).unwrap();
        assert!((response.document_sentiment.score + 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_text_scores_zero_without_request() {
        // Unroutable base URL: any request would fail
        let client =
            LanguageClient::new("http://127.0.0.1:9", "key", Duration::from_millis(50)).unwrap();
        assert_eq!(client.score("").await.unwrap(), 0.0);
    }

    #[test]
    fn test_method_url() {
        let client = LanguageClient::new(
            "https://language.googleapis.com/v1/",
            "key",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.method_url("analyzeEntities"),
            "https://language.googleapis.com/v1/documents:analyzeEntities"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(LanguageClient::from_config(&WatchConfig::default()).is_err());
    }
}
