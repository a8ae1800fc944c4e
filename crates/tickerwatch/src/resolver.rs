//! Resolution of knowledge-base ids to publicly traded companies

use crate::api::wikidata::{Binding, KnowledgeBase, label};
use crate::cache::{Resolution, ResolutionCache};
use crate::company::CompanyRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Finds the stock listings an entity id refers to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanyResolver: Send + Sync {
    /// `Ok(None)` when the lookup worked but matched no company, `Err` when it failed
    async fn resolve(&self, entity_id: &str) -> Result<Resolution>;
}

/// Build the SPARQL query mapping a Freebase id to listed companies
///
/// The entity may be a product (followed through its manufacturer), a
/// renamed company (followed through "replaced by"), or a company whose owner
/// or parent is the listed one. Only NYSE and NASDAQ listings count. The
/// `FILTER NOT EXISTS` clauses drop abstract classes (industries, business
/// sectors, and similar) that the traversal would otherwise report as
/// companies.
pub fn company_query(entity_id: &str) -> String {
    let entity_id = entity_id.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "SELECT ?companyLabel ?rootLabel ?tickerLabel ?exchangeNameLabel \
         WHERE {{ \
           ?entity wdt:P646 \"{entity_id}\" . \
           ?entity wdt:P176* ?manufacturer . \
           ?manufacturer wdt:P1366* ?company . \
           {{ ?company p:P414 ?exchange }} UNION \
           {{ ?company wdt:P127+ / wdt:P1366* ?root . \
             ?root p:P414 ?exchange }} UNION \
           {{ ?company wdt:P749+ / wdt:P1366* ?root . \
             ?root p:P414 ?exchange }} . \
           VALUES ?exchanges {{ wd:Q13677 wd:Q82059 }} . \
           ?exchange ps:P414 ?exchanges . \
           ?exchange pq:P249 ?ticker . \
           ?exchange ps:P414 ?exchangeName . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q11032 }} . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q192283 }} . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q1684600 }} . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q14350 }} . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q1616075 }} . \
           FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:Q2001305 }} . \
           SERVICE wikibase:label {{ \
             bd:serviceParam wikibase:language \"en\" . \
           }} \
         }} GROUP BY ?companyLabel ?rootLabel ?tickerLabel ?exchangeNameLabel \
         ORDER BY ?companyLabel ?rootLabel ?tickerLabel ?exchangeNameLabel"
    )
}

/// Normalize result rows into company records, dropping exact repeats
pub fn normalize(bindings: &[Binding]) -> Vec<CompanyRecord> {
    let mut companies: Vec<CompanyRecord> = Vec::new();

    for binding in bindings {
        let company = CompanyRecord {
            name: label(binding, "companyLabel"),
            ticker: label(binding, "tickerLabel"),
            exchange: label(binding, "exchangeNameLabel"),
            ..CompanyRecord::default()
        }
        .with_root(label(binding, "rootLabel"));

        if companies.iter().any(|existing| existing.same_listing(&company)) {
            warn!("Skipping duplicate company data: {:?}", company);
            continue;
        }

        debug!("Adding company data: {:?}", company);
        companies.push(company);
    }

    companies
}

/// Resolver backed by a knowledge base, with an optional lookup cache
pub struct Resolver {
    knowledge_base: Arc<dyn KnowledgeBase>,
    cache: Option<ResolutionCache>,
}

impl Resolver {
    /// Create an uncached resolver
    pub fn new(knowledge_base: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            knowledge_base,
            cache: None,
        }
    }

    /// Cache successful lookups
    pub fn with_cache(mut self, cache: ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn lookup(&self, entity_id: &str) -> Result<Resolution> {
        let bindings = self
            .knowledge_base
            .select(&company_query(entity_id))
            .await?;

        if bindings.is_empty() {
            debug!("No company data found for MID: {}", entity_id);
            return Ok(None);
        }

        Ok(Some(normalize(&bindings)))
    }
}

#[async_trait]
impl CompanyResolver for Resolver {
    async fn resolve(&self, entity_id: &str) -> Result<Resolution> {
        if entity_id.trim().is_empty() {
            return Ok(None);
        }

        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_fetch(entity_id, || self.lookup(entity_id))
                    .await
            }
            None => self.lookup(entity_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::wikidata::MockKnowledgeBase;
    use crate::error::WatchError;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn row(value: Value) -> Binding {
        value.as_object().cloned().unwrap()
    }

    fn listing(company: &str, root: Option<&str>, ticker: &str, exchange: &str) -> Binding {
        let mut value = json!({
            "companyLabel": {"type": "literal", "xml:lang": "en", "value": company},
            "tickerLabel": {"type": "literal", "value": ticker},
            "exchangeNameLabel": {"type": "literal", "xml:lang": "en", "value": exchange},
        });
        if let Some(root) = root {
            value["rootLabel"] = json!({"type": "literal", "xml:lang": "en", "value": root});
        }
        row(value)
    }

    fn knowledge_base(rows: Vec<Binding>) -> Arc<MockKnowledgeBase> {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_select().returning(move |_| Ok(rows.clone()));
        Arc::new(kb)
    }

    #[test]
    fn test_query_embeds_entity_and_exclusions() {
        let query = company_query("/m/035nm");
        assert!(query.contains("?entity wdt:P646 \"/m/035nm\""));
        for class in ["Q11032", "Q192283", "Q1684600", "Q14350", "Q1616075", "Q2001305"] {
            let exclusion =
                format!("FILTER NOT EXISTS {{ ?company wdt:P31 / wdt:P279* wd:{class} }}");
            assert!(query.contains(&exclusion), "missing exclusion for {class}");
        }
        assert!(query.contains("VALUES ?exchanges { wd:Q13677 wd:Q82059 }"));
    }

    #[test]
    fn test_query_escapes_quotes() {
        let query = company_query("x\" } DROP");
        assert!(query.contains("\"x\\\" } DROP\""));
    }

    #[tokio::test]
    async fn test_resolve_general_motors() {
        let kb = knowledge_base(vec![listing(
            "General Motors",
            None,
            "GM",
            "New York Stock Exchange",
        )]);
        let resolver = Resolver::new(kb);

        let companies = resolver.resolve("/m/035nm").await.unwrap();
        assert_eq!(
            companies,
            Some(vec![CompanyRecord::new(
                "General Motors",
                "GM",
                "New York Stock Exchange"
            )])
        );
    }

    #[tokio::test]
    async fn test_resolve_with_root_and_duplicates() {
        let kb = knowledge_base(vec![
            listing("Boeing", None, "BA", "New York Stock Exchange"),
            listing("Boeing", None, "BA", "New York Stock Exchange"),
            listing("Boeing", Some("Boeing"), "BA", "New York Stock Exchange"),
            listing("Ford Motor Company", Some("Ford"), "F", "New York Stock Exchange"),
        ]);
        let resolver = Resolver::new(kb);

        let companies = resolver.resolve("/m/0hkqn").await.unwrap().unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].name.as_deref(), Some("Boeing"));
        assert_eq!(companies[0].root_name, None);
        assert_eq!(companies[1].root_name.as_deref(), Some("Ford"));
    }

    #[tokio::test]
    async fn test_missing_labels_stay_empty() {
        let kb = knowledge_base(vec![row(json!({"companyLabel": {"value": "Orphan Corp"}}))]);
        let resolver = Resolver::new(kb);

        let companies = resolver.resolve("/m/orphan").await.unwrap().unwrap();
        assert_eq!(companies[0].name.as_deref(), Some("Orphan Corp"));
        assert_eq!(companies[0].ticker, None);
        assert_eq!(companies[0].exchange, None);
    }

    #[tokio::test]
    async fn test_no_match_is_none() {
        let resolver = Resolver::new(knowledge_base(Vec::new()));
        assert_eq!(resolver.resolve("/m/0d6lp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_id_skips_query() {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_select().never();
        let resolver = Resolver::new(Arc::new(kb));
        assert_eq!(resolver.resolve("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_error() {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_select()
            .returning(|_| Err(WatchError::MalformedInput("no results".to_string())));
        let resolver = Resolver::new(Arc::new(kb));

        assert!(resolver.resolve("/m/035nm").await.is_err());
    }

    #[tokio::test]
    async fn test_cache_skips_second_query() {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_select()
            .times(1)
            .returning(|_| Ok(vec![listing("Ford", None, "F", "New York Stock Exchange")]));
        let resolver = Resolver::new(Arc::new(kb))
            .with_cache(ResolutionCache::new(Duration::from_secs(60)));

        let first = resolver.resolve("/m/02zs4").await.unwrap();
        let second = resolver.resolve("/m/02zs4").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    #[ignore] // requires network access to query.wikidata.org
    async fn test_live_general_motors() {
        use crate::api::wikidata::WikidataClient;
        use crate::config::WatchConfig;

        let kb = WikidataClient::from_config(&WatchConfig::default()).unwrap();
        let resolver = Resolver::new(Arc::new(kb));

        assert_eq!(
            resolver.resolve("/m/035nm").await.unwrap(),
            Some(vec![CompanyRecord::new(
                "General Motors",
                "GM",
                "New York Stock Exchange"
            )])
        );
        assert_eq!(resolver.resolve("/m/0d6lp").await.unwrap(), None);
    }
}
