//! Entities found in text and the companies they resolve to

use std::fmt;

/// A named thing detected in text by the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Canonical name reported by the extractor
    pub name: String,
    /// Extractor category, e.g. `ORGANIZATION`
    pub kind: String,
    /// Knowledge-base id (Freebase MID); only these entities are resolvable
    pub knowledge_base_id: Option<String>,
    /// Importance of the entity within the text, 0.0 to 1.0
    pub salience: f64,
    /// Text spans that referred to the entity
    pub mentions: Vec<String>,
}

impl Entity {
    /// Entity with a name and optional id, other fields empty
    pub fn new(name: impl Into<String>, knowledge_base_id: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
            knowledge_base_id: knowledge_base_id.map(str::to_string),
            salience: 0.0,
            mentions: Vec::new(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self
            .knowledge_base_id
            .as_ref()
            .map(|mid| format!("\"mid\": \"{mid}\""))
            .unwrap_or_default();
        let mentions = self
            .mentions
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", ");

        write!(
            f,
            "{{name: \"{}\", type: \"{}\", metadata: {{{}}}, salience: {}, mentions: [{}]}}",
            self.name, self.kind, metadata, self.salience, mentions
        )
    }
}

/// Render a list of entities for debug logs
pub fn format_entities(entities: &[Entity]) -> String {
    let rendered = entities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{rendered}]")
}

/// A publicly traded company an entity resolved to
///
/// Fields a knowledge-base row did not bind stay `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompanyRecord {
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub exchange: Option<String>,
    /// Owner or parent company, only when it differs from `name`
    pub root_name: Option<String>,
    /// Post sentiment, attached after resolution
    pub sentiment: Option<f64>,
}

impl CompanyRecord {
    /// Record for a company listed under its own name
    pub fn new(
        name: impl Into<String>,
        ticker: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            ticker: Some(ticker.into()),
            exchange: Some(exchange.into()),
            root_name: None,
            sentiment: None,
        }
    }

    /// Attach the owner or parent name, dropping it when it repeats `name`
    pub fn with_root(mut self, root: Option<String>) -> Self {
        self.root_name = root.filter(|root| Some(root) != self.name.as_ref());
        self
    }

    /// Attach a sentiment score
    pub fn with_sentiment(mut self, sentiment: Option<f64>) -> Self {
        self.sentiment = sentiment;
        self
    }

    /// Ticker symbol when present and non-empty
    pub fn ticker(&self) -> Option<&str> {
        self.ticker.as_deref().filter(|t| !t.is_empty())
    }

    /// Identity used for resolver-level dedup; sentiment is not part of it
    pub fn same_listing(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ticker == other.ticker
            && self.exchange == other.exchange
            && self.root_name == other.root_name
    }
}
