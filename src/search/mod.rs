//! Annotation search: query construction and index lifecycle
//!
//! This module turns annotation search requests into structured queries for an
//! Elasticsearch-compatible backend, and manages the index those queries run
//! against.
//!
//! - **Analysis**: URI-aware char filters, tokenizers and token filters the
//!   index is created with
//! - **Index Lifecycle**: create the index, resolve the alias, swap it
//!   atomically to a rebuilt index
//! - **Registry**: ordered, pluggable filters (AND) and matchers (OR)
//! - **Query Builder**: filters, mandatory read-permission scoping, field
//!   filters, matchers, pagination and sort
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           SearchService                          │
//! │  - search()        - build_query()               │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │           QueryBuilder                           │
//! │  QueryRegistry filters  → must                   │
//! │  permission_clause      → must (always)          │
//! │  field filters          → must                   │
//! │  QueryRegistry matchers → should                 │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │           SearchClient                           │
//! │  search / get_alias / update_aliases / create    │
//! └─────────────────────────────────────────────────┘
//!                      ▲
//!                      │
//! ┌─────────────────────────────────────────────────┐
//! │           IndexManager (deploy time)             │
//! │  AnalysisConfig + mappings, alias swaps          │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use annotation_search::search::{
//!     FilterField, HttpSearchClient, QueryRegistry, SearchRequest, SearchService,
//!     SearchSettings,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Arc::new(SearchSettings::default());
//!     let registry = Arc::new(QueryRegistry::with_defaults(&settings));
//!     let client = Arc::new(HttpSearchClient::new("http://localhost:9200", Duration::from_secs(10))?);
//!     let search = SearchService::new(client, registry, settings);
//!
//!     let request = SearchRequest::new()
//!         .with_query("climate")
//!         .with_filter(FilterField::Uri, "http://example.com/article")
//!         .with_user("acct:alice@example.com")
//!         .with_limit(20);
//!
//!     let results = search.search(&request).await?;
//!     println!("Found {} annotations", results.total);
//!
//!     Ok(())
//! }
//! ```

mod analysis;
mod client;
mod config;
mod document;
mod error;
mod index;
mod query;
mod registry;
mod service;

pub use analysis::{
    Analyzer, AnalysisConfig, CharFilter, CompiledAnalysis, TokenFilter, Tokenizer,
    PATH_URL_PATTERN, RSTRIP_SLASH_PATTERN, STRIP_SCHEME_PATTERN, URI_PART_PATTERN, USER_PATTERN,
};
pub use client::{AliasAction, HttpSearchClient, InMemorySearchClient, SearchClient};
pub use config::{SearchSettings, SearchSettingsBuilder};
pub use document::{annotation_mapping, AnnotationDocument, DocumentTarget, Selector};
pub use error::{SearchError, SearchResult};
pub use index::IndexManager;
pub use query::{
    permission_clause, BoolQuery, Clause, FilterField, QueryBuilder, SearchBody, SearchRequest,
    SortField, SortOrder, SortSpec,
};
pub use registry::{
    AnyMatcher, AuthorityFilter, Filter, Matcher, NotDeletedFilter, QueryContext, QueryRegistry,
    TagsMatcher, TopLevelFilter, UriPartsMatcher, TEXT_FIELDS,
};
pub use service::{SearchHit, SearchResponse, SearchService};
