//! Tests for the Elasticsearch REST client against a mock backend

use annotation_search::search::*;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(server: &Server) -> HttpSearchClient {
    HttpSearchClient::new(server.url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_alias_resolves_indices() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/_alias/hypothesis")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"hypothesis-20240101000000-abcd1234": {"aliases": {"hypothesis": {}}}}"#)
        .create_async()
        .await;

    let indices = client(&server).get_alias("hypothesis").await.unwrap();

    assert_eq!(indices, vec!["hypothesis-20240101000000-abcd1234"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_get_alias_missing_is_empty() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/_alias/hypothesis")
        .with_status(404)
        .with_body(r#"{"error": "alias [hypothesis] missing", "status": 404}"#)
        .create_async()
        .await;

    let indices = client(&server).get_alias("hypothesis").await.unwrap();

    assert!(indices.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_swap_sends_single_aliases_request() {
    let mut server = Server::new_async().await;
    let alias = server
        .mock("GET", "/_alias/hypothesis")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"old-index": {"aliases": {"hypothesis": {}}}}"#)
        .create_async()
        .await;
    let swap = server
        .mock("POST", "/_aliases")
        .match_body(Matcher::Json(json!({
            "actions": [
                {"add": {"index": "new-index", "alias": "hypothesis"}},
                {"remove": {"index": "old-index", "alias": "hypothesis"}},
            ]
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged": true}"#)
        .expect(1)
        .create_async()
        .await;

    let manager = IndexManager::new(
        Arc::new(client(&server)),
        "hypothesis",
        AnalysisConfig::default(),
    )
    .unwrap();
    manager.update_aliased_index("new-index").await.unwrap();

    alias.assert_async().await;
    swap.assert_async().await;
}

#[tokio::test]
async fn test_configure_index_creates_with_analysis() {
    let mut server = Server::new_async().await;
    let head = server
        .mock("HEAD", "/hypothesis")
        .with_status(404)
        .create_async()
        .await;
    let create = server
        .mock("PUT", "/hypothesis")
        .match_body(Matcher::PartialJson(json!({
            "settings": {"analysis": {"tokenizer": {"uri_part": {"type": "pattern"}}}},
            "mappings": {"properties": {"user_raw": {"type": "keyword"}}},
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged": true}"#)
        .create_async()
        .await;

    let manager = IndexManager::new(
        Arc::new(client(&server)),
        "hypothesis",
        AnalysisConfig::default(),
    )
    .unwrap();
    assert!(manager.configure_index().await.unwrap());

    head.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_search_parses_hits() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hypothesis/_search")
        .match_body(Matcher::PartialJson(json!({"from": 0, "size": 20})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "took": 4,
                "hits": {
                    "total": {"value": 2, "relation": "eq"},
                    "hits": [
                        {"_id": "a1", "_score": 1.5, "_source": {"unexpected": true}},
                        {"_id": "a2", "_score": 0.5},
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let settings = Arc::new(SearchSettings::default());
    let registry = Arc::new(QueryRegistry::with_defaults(&settings));
    let service = SearchService::new(Arc::new(client(&server)), registry, settings);

    let response = service
        .search(&SearchRequest::new().with_query("climate"))
        .await
        .unwrap();

    assert_eq!(response.total, 2);
    assert_eq!(response.ids, vec!["a1", "a2"]);
    assert_eq!(response.took_ms, 4);
    assert_eq!(response.hits[0].score, Some(1.5));
    assert!(response.hits[0].document.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_backend_error_is_reported() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/hypothesis/_search")
        .with_status(503)
        .with_body("cluster unavailable")
        .create_async()
        .await;

    let err = client(&server)
        .search("hypothesis", &json!({"query": {"match_all": {}}}))
        .await
        .unwrap_err();

    match err {
        SearchError::Backend { status, ref body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "cluster unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_client_error());
}
