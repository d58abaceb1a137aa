//! Search backend clients
//!
//! [`SearchClient`] is the only surface the query and index layers talk to.
//! [`HttpSearchClient`] speaks the Elasticsearch REST API; the in-memory
//! client evaluates the same query DSL locally for development and tests.

use crate::config::ElasticsearchConfig;
use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One step of an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

/// Capabilities the search layer needs from the backend
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run a search body against an index or alias, returning the raw response
    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value>;

    /// Concrete indices `name` resolves to as an alias; empty when it is not one
    async fn get_alias(&self, name: &str) -> SearchResult<Vec<String>>;

    /// Apply every action in a single request
    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()>;

    /// Create a concrete index with the given settings and mappings
    async fn create_index(&self, name: &str, body: &Value) -> SearchResult<()>;

    /// Whether an index or alias called `name` exists
    async fn index_exists(&self, name: &str) -> SearchResult<bool>;

    /// Point `alias` at `index`
    async fn put_alias(&self, index: &str, alias: &str) -> SearchResult<()>;
}

/// Elasticsearch REST client
#[derive(Clone)]
pub struct HttpSearchClient {
    base_url: String,
    client: Client,
}

impl HttpSearchClient {
    /// Create a new client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SearchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ElasticsearchConfig) -> SearchResult<Self> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: Response) -> SearchResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Search backend returned an error");
        Err(SearchError::Backend {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value> {
        let response = self
            .client
            .post(self.url(&format!("{}/_search", index)))
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_alias(&self, name: &str) -> SearchResult<Vec<String>> {
        let response = self
            .client
            .get(self.url(&format!("_alias/{}", name)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body: BTreeMap<String, Value> = Self::check(response).await?.json().await?;
        Ok(body.into_keys().collect())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()> {
        let response = self
            .client
            .post(self.url("_aliases"))
            .json(&json!({ "actions": actions }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_index(&self, name: &str, body: &Value) -> SearchResult<()> {
        let response = self.client.put(self.url(name)).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> SearchResult<bool> {
        let response = self.client.head(self.url(name)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check(response).await.map(|_| true),
        }
    }

    async fn put_alias(&self, index: &str, alias: &str) -> SearchResult<()> {
        let response = self
            .client
            .put(self.url(&format!("{}/_alias/{}", index, alias)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct InMemoryState {
    /// index name -> (creation body, documents by id)
    indices: BTreeMap<String, (Value, BTreeMap<String, Value>)>,
    aliases: BTreeMap<String, Vec<String>>,
    alias_updates: Vec<Vec<AliasAction>>,
    searches: Vec<(String, Value)>,
}

impl InMemoryState {
    fn resolve(&self, name: &str) -> Vec<String> {
        match self.aliases.get(name) {
            Some(targets) if !targets.is_empty() => targets.clone(),
            _ if self.indices.contains_key(name) => vec![name.to_string()],
            _ => Vec::new(),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.indices.contains_key(name)
            || self.aliases.get(name).is_some_and(|t| !t.is_empty())
    }
}

/// In-process backend evaluating the query DSL the builder emits
#[derive(Debug, Default)]
pub struct InMemorySearchClient {
    state: RwLock<InMemoryState>,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document in the index (or alias target) `index`
    pub async fn insert_document(
        &self,
        index: &str,
        id: impl Into<String>,
        doc: Value,
    ) -> SearchResult<()> {
        let mut state = self.state.write().await;
        let target = match state.resolve(index).as_slice() {
            [single] => single.clone(),
            [] => {
                return Err(SearchError::Backend {
                    status: 404,
                    body: format!("no such index [{}]", index),
                })
            }
            _ => {
                return Err(SearchError::Backend {
                    status: 400,
                    body: format!("alias [{}] has more than one index", index),
                })
            }
        };
        if let Some((_, docs)) = state.indices.get_mut(&target) {
            docs.insert(id.into(), doc);
        }
        Ok(())
    }

    /// Point `alias` at exactly `indices`, bypassing validation
    pub async fn set_alias(&self, alias: &str, indices: &[&str]) {
        let mut state = self.state.write().await;
        state.aliases.insert(
            alias.to_string(),
            indices.iter().map(|i| i.to_string()).collect(),
        );
    }

    /// Every `update_aliases` call received, in order
    pub async fn alias_updates(&self) -> Vec<Vec<AliasAction>> {
        self.state.read().await.alias_updates.clone()
    }

    /// Every search received, as (index, body)
    pub async fn searches(&self) -> Vec<(String, Value)> {
        self.state.read().await.searches.clone()
    }

    /// Names of every concrete index
    pub async fn indices(&self) -> Vec<String> {
        self.state.read().await.indices.keys().cloned().collect()
    }

    /// Creation body of a concrete index
    pub async fn index_body(&self, name: &str) -> Option<Value> {
        self.state
            .read()
            .await
            .indices
            .get(name)
            .map(|(body, _)| body.clone())
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value> {
        let mut state = self.state.write().await;
        state.searches.push((index.to_string(), body.clone()));

        let targets = state.resolve(index);
        if targets.is_empty() {
            return Err(SearchError::Backend {
                status: 404,
                body: format!("no such index [{}]", index),
            });
        }

        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        let mut hits: Vec<(String, f64, Value)> = Vec::new();
        for target in &targets {
            if let Some((_, docs)) = state.indices.get(target) {
                for (id, doc) in docs {
                    if let Some(score) = evaluate(&query, id, doc) {
                        hits.push((id.clone(), score, doc.clone()));
                    }
                }
            }
        }

        if let Some((field, descending)) = sort_key(body) {
            hits.sort_by(|a, b| {
                let ordering = if field == "_score" {
                    a.1.total_cmp(&b.1)
                } else {
                    compare_values(a.2.get(&field), b.2.get(&field))
                };
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = hits.len();
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let page: Vec<Value> = hits
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, score, doc)| json!({"_id": id, "_score": score, "_source": doc}))
            .collect();

        debug!(index, total, returned = page.len(), "In-memory search");
        Ok(json!({
            "took": 0,
            "hits": {"total": {"value": total, "relation": "eq"}, "hits": page}
        }))
    }

    async fn get_alias(&self, name: &str) -> SearchResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .aliases
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> SearchResult<()> {
        let mut state = self.state.write().await;
        state.alias_updates.push(actions.to_vec());

        // All or nothing
        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(SearchError::Backend {
                            status: 404,
                            body: format!("no such index [{}]", index),
                        });
                    }
                    let targets = aliases.entry(alias.clone()).or_default();
                    if !targets.contains(index) {
                        targets.push(index.clone());
                    }
                }
                AliasAction::Remove { index, alias } => {
                    let targets = aliases.entry(alias.clone()).or_default();
                    let before = targets.len();
                    targets.retain(|t| t != index);
                    if targets.len() == before {
                        return Err(SearchError::Backend {
                            status: 404,
                            body: format!("aliases [{}] missing on [{}]", alias, index),
                        });
                    }
                }
            }
        }
        aliases.retain(|_, targets| !targets.is_empty());
        state.aliases = aliases;
        Ok(())
    }

    async fn create_index(&self, name: &str, body: &Value) -> SearchResult<()> {
        let mut state = self.state.write().await;
        if state.exists(name) {
            return Err(SearchError::Backend {
                status: 400,
                body: format!("resource_already_exists_exception: index [{}]", name),
            });
        }
        state
            .indices
            .insert(name.to_string(), (body.clone(), BTreeMap::new()));
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> SearchResult<bool> {
        Ok(self.state.read().await.exists(name))
    }

    async fn put_alias(&self, index: &str, alias: &str) -> SearchResult<()> {
        self.update_aliases(&[AliasAction::Add {
            index: index.to_string(),
            alias: alias.to_string(),
        }])
        .await
    }
}

fn sort_key(body: &Value) -> Option<(String, bool)> {
    let first = body.get("sort")?.as_array()?.first()?.as_object()?;
    let (field, spec) = first.iter().next()?;
    let descending = spec.get("order").and_then(Value::as_str) != Some("asc");
    Some((field.clone(), descending))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    let key = |v: Option<&Value>| v.map(|v| v.to_string()).unwrap_or_default();
    key(a).cmp(&key(b))
}

/// Values stored under a dotted path, flattening arrays along the way
fn field_values<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let path = path.strip_suffix(".parts").unwrap_or(path);
    let mut current = vec![doc];
    for segment in path.split('.') {
        current = current
            .into_iter()
            .filter_map(|v| v.get(segment))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
    }
    current
}

fn text_matches(doc: &Value, field: &str, query: &str) -> bool {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    field_values(doc, field).iter().any(|value| {
        value
            .as_str()
            .map(|text| {
                let text = text.to_lowercase();
                words.iter().any(|w| text.contains(w.as_str()))
            })
            .unwrap_or(false)
    })
}

/// Score of `doc` under `query`, or `None` when it does not match
fn evaluate(query: &Value, id: &str, doc: &Value) -> Option<f64> {
    let (kind, body) = query.as_object()?.iter().next()?;
    let field_spec = || body.as_object().and_then(|o| o.iter().next());

    match kind.as_str() {
        "match_all" => Some(1.0),
        "term" => {
            let (field, expected) = field_spec()?;
            let hit = if field == "_id" {
                expected.as_str() == Some(id)
            } else {
                field_values(doc, field).contains(&expected)
            };
            hit.then_some(1.0)
        }
        "terms" => {
            let (field, expected) = field_spec()?;
            let expected = expected.as_array()?;
            let hit = if field == "_id" {
                expected.iter().any(|e| e.as_str() == Some(id))
            } else {
                field_values(doc, field)
                    .iter()
                    .any(|value| expected.contains(value))
            };
            hit.then_some(1.0)
        }
        "exists" => {
            let field = body.get("field")?.as_str()?;
            (!field_values(doc, field).iter().all(|v| v.is_null())).then_some(1.0)
        }
        "match" => {
            let (field, spec) = field_spec()?;
            let text = spec.get("query").and_then(Value::as_str).or(spec.as_str())?;
            let boost = spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0);
            text_matches(doc, field, text).then_some(boost)
        }
        "multi_match" => {
            let text = body.get("query")?.as_str()?;
            let fields = body.get("fields")?.as_array()?;
            fields
                .iter()
                .filter_map(Value::as_str)
                .any(|field| text_matches(doc, field, text))
                .then_some(1.0)
        }
        "bool" => {
            let clauses = |key: &str| {
                body.get(key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            };
            let must = clauses("must");
            let should = clauses("should");
            let must_not = clauses("must_not");

            let mut score = 0.0;
            for clause in &must {
                score += evaluate(clause, id, doc)?;
            }
            if must_not.iter().any(|c| evaluate(c, id, doc).is_some()) {
                return None;
            }

            let should_scores: Vec<f64> = should
                .iter()
                .filter_map(|c| evaluate(c, id, doc))
                .collect();
            let required = body
                .get("minimum_should_match")
                .and_then(Value::as_u64)
                .unwrap_or(if must.is_empty() && !should.is_empty() { 1 } else { 0 });
            if (should_scores.len() as u64) < required {
                return None;
            }
            Some(score + should_scores.iter().sum::<f64>())
        }
        other => {
            warn!(clause = other, "Unsupported clause in in-memory search");
            None
        }
    }
}
