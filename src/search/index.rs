//! Search index lifecycle management
//!
//! The application reads and writes through a stable name (the alias, default
//! `hypothesis`). Deployments that change analysis or mappings build a fresh
//! concrete index and swap the alias over in one atomic backend call:
//!
//! ```text
//! absent ──configure_index──▶ concrete-only
//! absent ──init─────────────▶ aliased ──update_aliased_index──▶ aliased
//! ```

use crate::search::analysis::AnalysisConfig;
use crate::search::client::{AliasAction, SearchClient};
use crate::search::document::annotation_mapping;
use crate::search::error::{SearchError, SearchResult};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Manages the annotation index and its alias
pub struct IndexManager {
    /// Backend client
    client: Arc<dyn SearchClient>,

    /// Name the application uses; an alias once initialised
    alias: String,

    /// Analysis the index is created with
    analysis: AnalysisConfig,
}

impl IndexManager {
    /// Create a new IndexManager.
    ///
    /// Compiles `analysis` up front so a malformed pattern stops startup
    /// instead of surfacing at index creation.
    pub fn new(
        client: Arc<dyn SearchClient>,
        alias: impl Into<String>,
        analysis: AnalysisConfig,
    ) -> SearchResult<Self> {
        analysis.compile()?;
        Ok(Self {
            client,
            alias: alias.into(),
            analysis,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn analysis(&self) -> &AnalysisConfig {
        &self.analysis
    }

    /// Settings and mappings a concrete index is created with
    pub fn index_body(&self) -> SearchResult<Value> {
        Ok(json!({
            "settings": {"analysis": self.analysis.to_settings()?},
            "mappings": annotation_mapping(),
        }))
    }

    /// Ensure an index named after the alias exists. No-op when it (or an
    /// alias of that name) is already present.
    ///
    /// Returns whether an index was created.
    pub async fn configure_index(&self) -> SearchResult<bool> {
        if self.client.index_exists(&self.alias).await? {
            return Ok(false);
        }
        self.create_index(&self.alias).await?;
        Ok(true)
    }

    /// Create a concrete index with the annotation settings and mappings
    pub async fn create_index(&self, name: &str) -> SearchResult<()> {
        self.client.create_index(name, &self.index_body()?).await?;
        info!(index = name, "Created search index");
        Ok(())
    }

    /// Fresh concrete index name, e.g. `hypothesis-20240102030405-1a2b3c4d`
    pub fn new_index_name(&self) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            self.alias,
            Utc::now().format("%Y%m%d%H%M%S"),
            &suffix[..8]
        )
    }

    /// Create a fresh concrete index and point the alias at it, unless the
    /// name is already taken.
    ///
    /// Returns the concrete index created, if any.
    pub async fn init(&self) -> SearchResult<Option<String>> {
        if self.client.index_exists(&self.alias).await? {
            return Ok(None);
        }
        let index = self.new_index_name();
        self.create_index(&index).await?;
        self.client.put_alias(&index, &self.alias).await?;
        info!(alias = %self.alias, index = %index, "Initialised aliased search index");
        Ok(Some(index))
    }

    /// The concrete index the alias points at.
    ///
    /// `None` when the name is a concrete index rather than an alias.
    pub async fn get_aliased_index(&self) -> SearchResult<Option<String>> {
        let mut indices = self.client.get_alias(&self.alias).await?;
        match indices.len() {
            0 => Ok(None),
            1 => Ok(indices.pop()),
            _ => {
                warn!(alias = %self.alias, indices = ?indices, "Alias resolves to multiple indices");
                Err(SearchError::AmbiguousAlias {
                    alias: self.alias.clone(),
                    indices,
                })
            }
        }
    }

    /// Repoint the alias at `new_target` in a single backend request.
    ///
    /// Fails with [`SearchError::NotAnAlias`] when the name is a concrete index.
    pub async fn update_aliased_index(&self, new_target: &str) -> SearchResult<()> {
        let old_target = self
            .get_aliased_index()
            .await?
            .ok_or_else(|| SearchError::NotAnAlias(self.alias.clone()))?;

        self.client
            .update_aliases(&[
                AliasAction::Add {
                    index: new_target.to_string(),
                    alias: self.alias.clone(),
                },
                AliasAction::Remove {
                    index: old_target.clone(),
                    alias: self.alias.clone(),
                },
            ])
            .await?;

        info!(
            alias = %self.alias,
            from = %old_target,
            to = new_target,
            "Swapped search alias"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::analysis::Tokenizer;
    use crate::search::client::InMemorySearchClient;

    fn manager(client: Arc<InMemorySearchClient>) -> IndexManager {
        IndexManager::new(client, "hypothesis", AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_malformed_analysis_rejected() {
        let mut analysis = AnalysisConfig::default();
        analysis.tokenizer.insert(
            "uri_part".to_string(),
            Tokenizer::Pattern {
                pattern: "(".to_string(),
            },
        );
        let result = IndexManager::new(
            Arc::new(InMemorySearchClient::new()),
            "hypothesis",
            analysis,
        );
        assert!(matches!(result, Err(SearchError::Configuration(_))));
    }

    #[test]
    fn test_new_index_name_is_prefixed() {
        let manager = manager(Arc::new(InMemorySearchClient::new()));
        let a = manager.new_index_name();
        let b = manager.new_index_name();
        assert!(a.starts_with("hypothesis-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_configure_index_is_idempotent() {
        let client = Arc::new(InMemorySearchClient::new());
        let manager = manager(client.clone());

        assert!(manager.configure_index().await.unwrap());
        assert!(!manager.configure_index().await.unwrap());
        assert_eq!(client.indices().await, vec!["hypothesis"]);

        let body = client.index_body("hypothesis").await.unwrap();
        assert!(body["settings"]["analysis"]["analyzer"]["uri"].is_object());
        assert!(body["mappings"]["properties"]["uri"].is_object());
    }

    #[tokio::test]
    async fn test_concrete_index_is_not_an_alias() {
        let client = Arc::new(InMemorySearchClient::new());
        let manager = manager(client.clone());
        manager.configure_index().await.unwrap();

        assert_eq!(manager.get_aliased_index().await.unwrap(), None);
        let err = manager.update_aliased_index("other").await.unwrap_err();
        assert!(matches!(err, SearchError::NotAnAlias(_)));
        assert!(client.alias_updates().await.is_empty());
    }
}
