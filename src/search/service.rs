//! Main search service implementation

use crate::search::client::SearchClient;
use crate::search::config::SearchSettings;
use crate::search::document::AnnotationDocument;
use crate::search::error::SearchResult;
use crate::search::query::{QueryBuilder, SearchRequest};
use crate::search::registry::QueryRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single search result hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Annotation ID
    pub id: String,

    /// Relevance score, absent when sorting by a field
    pub score: Option<f64>,

    /// Indexed document, when the backend returned a readable source
    pub document: Option<AnnotationDocument>,
}

/// Search response with results and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total number of matches (before pagination)
    pub total: u64,

    /// Hit IDs in backend order
    pub ids: Vec<String>,

    /// Search results
    pub hits: Vec<SearchHit>,

    /// Offset used for pagination
    pub offset: usize,

    /// Limit used for pagination
    pub limit: usize,

    /// Backend execution time in milliseconds
    pub took_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    took: u64,
    hits: RawHits,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    total: RawTotal,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// `hits.total` is a bare number on older backends
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

impl RawTotal {
    fn value(&self) -> u64 {
        match self {
            RawTotal::Count(n) | RawTotal::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Option<Value>,
}

/// Main search service
pub struct SearchService {
    /// Backend client
    client: Arc<dyn SearchClient>,

    /// Query builder
    builder: QueryBuilder,
}

impl SearchService {
    /// Create a new search service
    pub fn new(
        client: Arc<dyn SearchClient>,
        registry: Arc<QueryRegistry>,
        settings: Arc<SearchSettings>,
    ) -> Self {
        Self {
            client,
            builder: QueryBuilder::new(registry, settings),
        }
    }

    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Backend query body for `request`, without executing it
    pub fn build_query(&self, request: &SearchRequest) -> SearchResult<Value> {
        Ok(self.builder.build(request)?.to_json())
    }

    /// Search for annotations
    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
        let body = self.builder.build(request)?;
        let index = &self.builder.settings().index;

        let raw = self.client.search(index, &body.to_json()).await?;
        let raw: RawResponse = serde_json::from_value(raw)?;

        let hits: Vec<SearchHit> = raw
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let document = hit.source.and_then(|source| {
                    serde_json::from_value(source)
                        .map_err(|e| {
                            warn!(id = %hit.id, error = %e, "Unreadable document in search hit");
                        })
                        .ok()
                });
                SearchHit {
                    id: hit.id,
                    score: hit.score,
                    document,
                }
            })
            .collect();

        let total = raw.hits.total.value();
        debug!(index = %index, total, returned = hits.len(), "Search completed");

        Ok(SearchResponse {
            total,
            ids: hits.iter().map(|h| h.id.clone()).collect(),
            hits,
            offset: body.from,
            limit: body.size,
            took_ms: raw.took,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_formats() {
        let legacy: RawHits = serde_json::from_value(serde_json::json!({"total": 7})).unwrap();
        assert_eq!(legacy.total.value(), 7);
        assert!(legacy.hits.is_empty());

        let current: RawHits = serde_json::from_value(
            serde_json::json!({"total": {"value": 3, "relation": "eq"}, "hits": []}),
        )
        .unwrap();
        assert_eq!(current.total.value(), 3);
    }

    #[test]
    fn test_hit_without_source() {
        let hit: RawHit =
            serde_json::from_value(serde_json::json!({"_id": "abc", "_score": null})).unwrap();
        assert_eq!(hit.id, "abc");
        assert!(hit.score.is_none());
        assert!(hit.source.is_none());
    }
}
