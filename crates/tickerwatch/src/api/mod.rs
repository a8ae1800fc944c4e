//! Clients for the external services the watcher talks to

pub mod language;
pub mod oauth;
pub mod twitter;
pub mod wikidata;

pub use language::{EntityExtractor, LanguageClient, SentimentScorer};
pub use oauth::OAuthCredentials;
pub use twitter::{FrameStream, Publisher, StreamSource, TwitterPublisher, TwitterStream};
pub use wikidata::{Binding, KnowledgeBase, WikidataClient};
