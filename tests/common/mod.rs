//! Common test utilities for search testing
//!
//! Builds search services over the in-memory backend and seeds it with
//! annotation documents.

#![allow(dead_code)]

use annotation_search::search::{
    InMemorySearchClient, QueryRegistry, SearchClient, SearchService, SearchSettings,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const INDEX: &str = "hypothesis";
pub const WORLD: &str = "__world__";

/// In-memory backend with an empty `hypothesis` index
pub async fn create_test_client() -> Arc<InMemorySearchClient> {
    let client = Arc::new(InMemorySearchClient::new());
    client
        .create_index(INDEX, &json!({}))
        .await
        .expect("create test index");
    client
}

/// Search service using the stock registry
pub fn create_test_service(client: Arc<InMemorySearchClient>) -> SearchService {
    let settings = Arc::new(SearchSettings::default());
    let registry = Arc::new(QueryRegistry::with_defaults(&settings));
    SearchService::new(client, registry, settings)
}

/// Annotation document in the shape the indexer writes
pub fn annotation(user: &str, group: &str, shared: bool, uri: &str, text: &str) -> Value {
    json!({
        "authority": "example.com",
        "created": "2024-01-02T03:04:05Z",
        "updated": "2024-01-02T03:04:05Z",
        "quote": null,
        "tags": [],
        "tags_raw": [],
        "text": text,
        "deleted": false,
        "uri": uri,
        "user": user.to_lowercase(),
        "user_raw": user,
        "target": [{"source": uri, "scope": [uri], "selector": []}],
        "shared": shared,
        "references": [],
        "group": group,
        "thread_ids": [],
    })
}

/// Store `doc` under `id` in the test index
pub async fn index(client: &InMemorySearchClient, id: &str, doc: Value) {
    client
        .insert_document(INDEX, id, doc)
        .await
        .expect("insert test document");
}
