//! Search request parsing and query building

use crate::search::config::SearchSettings;
use crate::search::error::{SearchError, SearchResult};
use crate::search::registry::{QueryContext, QueryRegistry};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Sort order for search results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> SearchResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(SearchError::validation(format!(
                "order must be \"asc\" or \"desc\", got {:?}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Field to sort by
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Relevance,
    Created,
    Updated,
    Group,
    User,
}

impl SortField {
    pub fn parse(value: &str) -> SearchResult<Self> {
        match value {
            "relevance" | "_score" => Ok(Self::Relevance),
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "group" => Ok(Self::Group),
            "user" => Ok(Self::User),
            other => Err(SearchError::validation(format!(
                "unsupported sort field {:?}",
                other
            ))),
        }
    }

    /// Indexed field the sort applies to
    pub fn index_field(self) -> &'static str {
        match self {
            Self::Relevance => "_score",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Group => "group",
            Self::User => "user_raw",
        }
    }
}

/// Request keys that restrict results to exact field values
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    User,
    Tag,
    Uri,
    Group,
    Authority,
    References,
    ThreadId,
    Id,
}

impl FilterField {
    /// Parse a request parameter name. `tags` and `url` are accepted aliases.
    pub fn parse(key: &str) -> SearchResult<Self> {
        match key {
            "user" => Ok(Self::User),
            "tag" | "tags" => Ok(Self::Tag),
            "uri" | "url" => Ok(Self::Uri),
            "group" => Ok(Self::Group),
            "authority" => Ok(Self::Authority),
            "references" => Ok(Self::References),
            "thread_id" => Ok(Self::ThreadId),
            "id" => Ok(Self::Id),
            other => Err(SearchError::validation(format!(
                "unknown filter field {:?}",
                other
            ))),
        }
    }

    /// Indexed field the filter matches against
    pub fn index_field(self) -> &'static str {
        match self {
            Self::User => "user_raw",
            Self::Tag => "tags_raw",
            Self::Uri => "target.scope",
            Self::Group => "group",
            Self::Authority => "authority",
            Self::References => "references",
            Self::ThreadId => "thread_ids",
            Self::Id => "_id",
        }
    }
}

/// A parsed annotation search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    pub query: Option<String>,

    /// Field filters in request order; values within a field are OR-ed
    pub filters: Vec<(FilterField, Vec<String>)>,

    pub sort: SortField,
    pub order: SortOrder,
    pub offset: usize,
    pub limit: usize,

    /// Principal performing the search, `None` when anonymous
    pub authenticated_userid: Option<String>,

    /// Groups the principal may read, besides the world group
    pub readable_groups: Vec<String>,

    /// Exclude replies
    pub top_level_only: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            filters: Vec::new(),
            sort: SortField::default(),
            order: SortOrder::default(),
            offset: 0,
            limit: SearchSettings::default().default_limit,
            authenticated_userid: None,
            readable_groups: Vec::new(),
            top_level_only: false,
        }
    }
}

impl SearchRequest {
    /// Empty request: anonymous, no query, no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw view parameters.
    ///
    /// `q`, `sort`, `order`, `offset`, `limit` and `_separate_replies` are
    /// reserved; every other key is a repeatable field filter and must name a
    /// known [`FilterField`].
    pub fn from_params<K, V>(params: &[(K, V)], settings: &SearchSettings) -> SearchResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = Self {
            limit: settings.default_limit,
            ..Self::default()
        };

        for (key, value) in params {
            let value = value.as_ref();
            match key.as_ref() {
                "q" => request.query = Some(value.to_string()),
                "sort" => request.sort = SortField::parse(value)?,
                "order" => request.order = SortOrder::parse(value)?,
                "offset" => request.offset = parse_bound("offset", value)?,
                "limit" => request.limit = parse_bound("limit", value)?,
                "_separate_replies" => request.top_level_only = parse_flag(value)?,
                other => {
                    let field = FilterField::parse(other)?;
                    request = request.with_filter(field, value);
                }
            }
        }

        request.limit = request.limit.min(settings.max_limit);
        Ok(request)
    }

    /// Set free-text query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Add one value to a field filter
    pub fn with_filter(mut self, field: FilterField, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.filters.iter_mut().find(|(f, _)| *f == field) {
            Some((_, values)) => values.push(value),
            None => self.filters.push((field, vec![value])),
        }
        self
    }

    /// Add one value to a field filter named by its request key
    pub fn with_filter_key(self, key: &str, value: impl Into<String>) -> SearchResult<Self> {
        let field = FilterField::parse(key)?;
        Ok(self.with_filter(field, value))
    }

    /// Set the searching principal
    pub fn with_user(mut self, userid: impl Into<String>) -> Self {
        self.authenticated_userid = Some(userid.into());
        self
    }

    /// Set the groups the principal may read
    pub fn with_readable_groups(mut self, groups: Vec<impl Into<String>>) -> Self {
        self.readable_groups = groups.into_iter().map(|g| g.into()).collect();
        self
    }

    /// Set sorting
    pub fn with_sort(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Set limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Exclude replies
    pub fn top_level_only(mut self) -> Self {
        self.top_level_only = true;
        self
    }

    /// Free-text query, trimmed; `None` when absent or blank
    pub fn free_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Values requested for `field`
    pub fn filter_values(&self, field: FilterField) -> &[String] {
        self.filters
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }
}

fn parse_bound(name: &str, value: &str) -> SearchResult<usize> {
    let parsed: i64 = value.trim().parse().map_err(|_| {
        SearchError::validation(format!("{} must be an integer, got {:?}", name, value))
    })?;
    usize::try_from(parsed)
        .map_err(|_| SearchError::validation(format!("{} must not be negative", name)))
}

fn parse_flag(value: &str) -> SearchResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(SearchError::validation(format!(
            "expected a boolean, got {:?}",
            other
        ))),
    }
}

/// A structured query clause
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MatchAll,
    /// Exact value
    Term { field: String, value: Value },
    /// Any of the exact values
    Terms { field: String, values: Vec<Value> },
    /// Analyzed full-text match on one field
    Match {
        field: String,
        query: String,
        boost: Option<f32>,
    },
    /// Analyzed full-text match across fields
    MultiMatch { fields: Vec<String>, query: String },
    /// Field has a value
    Exists { field: String },
    Bool(BoolQuery),
}

impl Clause {
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn terms<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Terms {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
        }
    }

    /// Field this clause targets, for single-field clauses
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Term { field, .. }
            | Self::Terms { field, .. }
            | Self::Match { field, .. }
            | Self::Exists { field } => Some(field),
            Self::MatchAll | Self::MultiMatch { .. } | Self::Bool(_) => None,
        }
    }

    /// Backend query DSL
    pub fn to_json(&self) -> Value {
        match self {
            Self::MatchAll => json!({"match_all": {}}),
            Self::Term { field, value } => json!({"term": {field.as_str(): value}}),
            Self::Terms { field, values } => json!({"terms": {field.as_str(): values}}),
            Self::Match {
                field,
                query,
                boost,
            } => {
                let mut body = Map::new();
                body.insert("query".to_string(), json!(query));
                if let Some(boost) = boost {
                    body.insert("boost".to_string(), json!(boost));
                }
                json!({"match": {field.as_str(): body}})
            }
            Self::MultiMatch { fields, query } => json!({
                "multi_match": {"query": query, "fields": fields, "type": "cross_fields"}
            }),
            Self::Exists { field } => json!({"exists": {"field": field}}),
            Self::Bool(bool_query) => bool_query.to_json(),
        }
    }
}

impl Serialize for Clause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Boolean combination of clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    /// Every clause must match
    pub must: Vec<Clause>,
    /// Scoring clauses
    pub should: Vec<Clause>,
    /// No clause may match
    pub must_not: Vec<Clause>,
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        for (key, clauses) in [
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
        ] {
            if !clauses.is_empty() {
                body.insert(
                    key.to_string(),
                    Value::Array(clauses.iter().map(Clause::to_json).collect()),
                );
            }
        }
        if let Some(min) = self.minimum_should_match {
            body.insert("minimum_should_match".to_string(), json!(min));
        }
        json!({ "bool": body })
    }
}

/// The read-permission clause every query carries.
///
/// Shared annotations are visible in the world group and in the principal's
/// readable groups; private annotations only to their author. Anonymous
/// requests get no private branch.
pub fn permission_clause(request: &SearchRequest, world_group: &str) -> Clause {
    let mut groups = vec![world_group.to_string()];
    for group in &request.readable_groups {
        if !groups.contains(group) {
            groups.push(group.clone());
        }
    }

    let mut branches = vec![Clause::Bool(BoolQuery {
        must: vec![Clause::term("shared", true), Clause::terms("group", groups)],
        ..Default::default()
    })];

    if let Some(ref userid) = request.authenticated_userid {
        branches.push(Clause::Bool(BoolQuery {
            must: vec![
                Clause::term("shared", false),
                Clause::term("user_raw", userid.as_str()),
            ],
            ..Default::default()
        }));
    }

    Clause::Bool(BoolQuery {
        should: branches,
        minimum_should_match: Some(1),
        ..Default::default()
    })
}

/// One sort key
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

/// A complete search body ready for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct SearchBody {
    pub query: BoolQuery,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortSpec>,
}

impl SearchBody {
    pub fn to_json(&self) -> Value {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|spec| {
                let field = spec.field.index_field();
                if spec.field == SortField::Relevance {
                    json!({field: {"order": spec.order.as_str()}})
                } else {
                    json!({field: {"order": spec.order.as_str(), "unmapped_type": "boolean"}})
                }
            })
            .collect();

        json!({
            "query": self.query.to_json(),
            "from": self.from,
            "size": self.size,
            "sort": sort,
        })
    }
}

/// Builds backend queries from search requests
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    registry: Arc<QueryRegistry>,
    settings: Arc<SearchSettings>,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new(registry: Arc<QueryRegistry>, settings: Arc<SearchSettings>) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Build the backend query for `request`.
    ///
    /// Errors from registered filters and matchers are returned as-is.
    pub fn build(&self, request: &SearchRequest) -> SearchResult<SearchBody> {
        let mut ctx = QueryContext::new(self.settings.clone());
        let mut query = BoolQuery::default();

        for filter in self.registry.filters() {
            if let Some(clause) = filter.apply(request, &mut ctx)? {
                query.must.push(clause);
            }
        }

        query
            .must
            .push(permission_clause(request, &self.settings.world_group));

        for (field, values) in &request.filters {
            if values.is_empty() || ctx.is_consumed(*field) {
                continue;
            }
            let clause = match values.as_slice() {
                [value] => Clause::term(field.index_field(), value.as_str()),
                _ => Clause::terms(field.index_field(), values.iter().map(String::as_str)),
            };
            query.must.push(clause);
        }

        for matcher in self.registry.matchers() {
            if let Some(clause) = matcher.apply(request, &mut ctx)? {
                query.should.push(clause);
            }
        }

        if !query.should.is_empty() && request.free_text().is_some() {
            query.minimum_should_match = Some(1);
        }

        let body = SearchBody {
            query,
            from: request.offset,
            size: request.limit.min(self.settings.max_limit),
            sort: vec![SortSpec {
                field: request.sort,
                order: request.order,
            }],
        };

        debug!(
            must = body.query.must.len(),
            should = body.query.should.len(),
            from = body.from,
            size = body.size,
            "Built search query"
        );

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(registry: QueryRegistry) -> QueryBuilder {
        QueryBuilder::new(Arc::new(registry), Arc::new(SearchSettings::default()))
    }

    #[test]
    fn test_search_request_builder() {
        let request = SearchRequest::new()
            .with_query("climate")
            .with_filter(FilterField::Tag, "science")
            .with_filter(FilterField::Tag, "policy")
            .with_limit(50)
            .with_offset(10);

        assert_eq!(request.free_text(), Some("climate"));
        assert_eq!(request.limit, 50);
        assert_eq!(request.offset, 10);
        assert_eq!(request.filters.len(), 1);
        assert_eq!(request.filter_values(FilterField::Tag), ["science", "policy"]);
    }

    #[test]
    fn test_blank_query_is_absent() {
        assert_eq!(SearchRequest::new().with_query(" \t ").free_text(), None);
        assert_eq!(SearchRequest::new().free_text(), None);
    }

    #[test]
    fn test_from_params() {
        let settings = SearchSettings::default();
        let params = [
            ("q", "hello"),
            ("user", "acct:bob@example.com"),
            ("tag", "a"),
            ("tags", "b"),
            ("sort", "created"),
            ("order", "ASC"),
            ("offset", "40"),
            ("limit", "1000"),
            ("_separate_replies", "true"),
        ];
        let request = SearchRequest::from_params(&params, &settings).unwrap();

        assert_eq!(request.query.as_deref(), Some("hello"));
        assert_eq!(request.filter_values(FilterField::Tag), ["a", "b"]);
        assert_eq!(request.sort, SortField::Created);
        assert_eq!(request.order, SortOrder::Asc);
        assert_eq!(request.offset, 40);
        assert_eq!(request.limit, 200);
        assert!(request.top_level_only);
    }

    #[test]
    fn test_from_params_rejects_bad_input() {
        let settings = SearchSettings::default();
        for params in [
            [("usr", "acct:bob@example.com")],
            [("limit", "-1")],
            [("offset", "ten")],
            [("sort", "quote")],
            [("order", "sideways")],
        ] {
            let err = SearchRequest::from_params(&params, &settings).unwrap_err();
            assert!(err.is_client_error(), "{:?} -> {}", params, err);
        }
    }

    #[test]
    fn test_permission_clause_anonymous() {
        let clause = permission_clause(&SearchRequest::new(), "__world__");
        let Clause::Bool(bool_query) = clause else {
            panic!("expected bool clause");
        };
        assert_eq!(bool_query.should.len(), 1);
        assert_eq!(bool_query.minimum_should_match, Some(1));
    }

    #[test]
    fn test_permission_clause_authenticated() {
        let request = SearchRequest::new()
            .with_user("acct:alice@example.com")
            .with_readable_groups(vec!["abc123", "__world__"]);
        let json = permission_clause(&request, "__world__").to_json();

        let branches = json["bool"]["should"].as_array().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[0]["bool"]["must"][1],
            json!({"terms": {"group": ["__world__", "abc123"]}})
        );
        assert_eq!(
            branches[1]["bool"]["must"][1],
            json!({"term": {"user_raw": "acct:alice@example.com"}})
        );
    }

    #[test]
    fn test_empty_registry_still_scopes_permissions() {
        let body = builder(QueryRegistry::new())
            .build(&SearchRequest::new())
            .unwrap();

        assert_eq!(body.query.must.len(), 1);
        assert_eq!(
            body.query.must[0],
            permission_clause(&SearchRequest::new(), "__world__")
        );
        assert!(body.query.should.is_empty());
        assert_eq!(body.query.minimum_should_match, None);
    }

    #[test]
    fn test_multiple_values_become_terms() {
        let request = SearchRequest::new()
            .with_filter(FilterField::User, "acct:a@example.com")
            .with_filter(FilterField::User, "acct:b@example.com")
            .with_filter(FilterField::Group, "abc");
        let body = builder(QueryRegistry::new()).build(&request).unwrap();

        assert_eq!(
            body.query.must[1],
            Clause::terms("user_raw", ["acct:a@example.com", "acct:b@example.com"])
        );
        assert_eq!(body.query.must[2], Clause::term("group", "abc"));
    }

    #[test]
    fn test_sort_json() {
        let request = SearchRequest::new().with_sort(SortField::Updated, SortOrder::Asc);
        let json = builder(QueryRegistry::new())
            .build(&request)
            .unwrap()
            .to_json();
        assert_eq!(
            json["sort"],
            json!([{"updated": {"order": "asc", "unmapped_type": "boolean"}}])
        );

        let json = builder(QueryRegistry::new())
            .build(&SearchRequest::new())
            .unwrap()
            .to_json();
        assert_eq!(json["sort"], json!([{"_score": {"order": "desc"}}]));
    }

    #[test]
    fn test_match_clause_json() {
        let clause = Clause::Match {
            field: "tags".to_string(),
            query: "news".to_string(),
            boost: Some(2.0),
        };
        assert_eq!(
            clause.to_json(),
            json!({"match": {"tags": {"query": "news", "boost": 2.0}}})
        );
    }
}
