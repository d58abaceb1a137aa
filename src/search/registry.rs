//! Pluggable query filters and matchers
//!
//! A [`QueryRegistry`] holds the ordered list of [`Filter`]s (restrictions,
//! AND-ed into `must`) and [`Matcher`]s (relevance clauses, OR-ed into
//! `should`) the [`QueryBuilder`](crate::search::QueryBuilder) applies to every
//! request. It is assembled once at startup and shared read-only afterwards.

use crate::search::config::SearchSettings;
use crate::search::error::SearchResult;
use crate::search::query::{BoolQuery, Clause, FilterField, SearchRequest};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Text fields the free-text query is matched against
pub const TEXT_FIELDS: &[&str] = &["quote", "tags", "text", "uri.parts", "user"];

/// Per-build state handed to every filter and matcher
#[derive(Debug)]
pub struct QueryContext {
    settings: Arc<SearchSettings>,
    consumed: BTreeSet<FilterField>,
}

impl QueryContext {
    pub fn new(settings: Arc<SearchSettings>) -> Self {
        Self {
            settings,
            consumed: BTreeSet::new(),
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Mark a field filter as handled so the builder does not add its own
    /// term clause for it.
    pub fn consume(&mut self, field: FilterField) {
        self.consumed.insert(field);
    }

    pub fn is_consumed(&self, field: FilterField) -> bool {
        self.consumed.contains(&field)
    }
}

/// Mandatory restriction on the result set
pub trait Filter: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Clause every hit must satisfy, or `None` to contribute nothing
    fn apply(&self, request: &SearchRequest, ctx: &mut QueryContext)
        -> SearchResult<Option<Clause>>;
}

/// Optional clause contributing to relevance
pub trait Matcher: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Scoring clause, or `None` to contribute nothing
    fn apply(&self, request: &SearchRequest, ctx: &mut QueryContext)
        -> SearchResult<Option<Clause>>;
}

type ClauseFn =
    dyn Fn(&SearchRequest, &mut QueryContext) -> SearchResult<Option<Clause>> + Send + Sync;

struct FnFilter {
    name: String,
    f: Box<ClauseFn>,
}

impl Filter for FnFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        request: &SearchRequest,
        ctx: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        (self.f)(request, ctx)
    }
}

struct FnMatcher {
    name: String,
    f: Box<ClauseFn>,
}

impl Matcher for FnMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        request: &SearchRequest,
        ctx: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        (self.f)(request, ctx)
    }
}

/// Ordered filters and matchers
#[derive(Default)]
pub struct QueryRegistry {
    filters: Vec<Arc<dyn Filter>>,
    matchers: Vec<Arc<dyn Matcher>>,
}

impl QueryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stock annotation filters and matchers
    pub fn with_defaults(settings: &SearchSettings) -> Self {
        let mut registry = Self::new();
        registry.add_filter(NotDeletedFilter);
        if let Some(ref authority) = settings.authority {
            registry.add_filter(AuthorityFilter::new(authority.clone()));
        }
        registry.add_filter(TopLevelFilter);
        registry.add_matcher(AnyMatcher);
        registry.add_matcher(TagsMatcher);
        registry
    }

    /// Append a filter
    pub fn add_filter(&mut self, filter: impl Filter) -> &mut Self {
        debug!(filter = filter.name(), "Registered search filter");
        self.filters.push(Arc::new(filter));
        self
    }

    /// Append a matcher
    pub fn add_matcher(&mut self, matcher: impl Matcher) -> &mut Self {
        debug!(matcher = matcher.name(), "Registered search matcher");
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Append a filter given as a function
    pub fn add_filter_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&SearchRequest, &mut QueryContext) -> SearchResult<Option<Clause>>
            + Send
            + Sync
            + 'static,
    {
        self.add_filter(FnFilter {
            name: name.into(),
            f: Box::new(f),
        })
    }

    /// Append a matcher given as a function
    pub fn add_matcher_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&SearchRequest, &mut QueryContext) -> SearchResult<Option<Clause>>
            + Send
            + Sync
            + 'static,
    {
        self.add_matcher(FnMatcher {
            name: name.into(),
            f: Box::new(f),
        })
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub fn matchers(&self) -> &[Arc<dyn Matcher>] {
        &self.matchers
    }
}

impl std::fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRegistry")
            .field(
                "filters",
                &self.filters.iter().map(|x| x.name()).collect::<Vec<_>>(),
            )
            .field(
                "matchers",
                &self.matchers.iter().map(|x| x.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Excludes annotations marked deleted
pub struct NotDeletedFilter;

impl Filter for NotDeletedFilter {
    fn name(&self) -> &str {
        "not_deleted"
    }

    fn apply(&self, _: &SearchRequest, _: &mut QueryContext) -> SearchResult<Option<Clause>> {
        Ok(Some(Clause::Bool(BoolQuery {
            must_not: vec![Clause::term("deleted", true)],
            ..Default::default()
        })))
    }
}

/// Restricts results to a single authority
pub struct AuthorityFilter {
    authority: String,
}

impl AuthorityFilter {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }
}

impl Filter for AuthorityFilter {
    fn name(&self) -> &str {
        "authority"
    }

    fn apply(&self, _: &SearchRequest, _: &mut QueryContext) -> SearchResult<Option<Clause>> {
        Ok(Some(Clause::term("authority", self.authority.as_str())))
    }
}

/// Drops replies when the request asks for top-level annotations only
pub struct TopLevelFilter;

impl Filter for TopLevelFilter {
    fn name(&self) -> &str {
        "top_level"
    }

    fn apply(
        &self,
        request: &SearchRequest,
        _: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        if !request.top_level_only {
            return Ok(None);
        }
        Ok(Some(Clause::Bool(BoolQuery {
            must_not: vec![Clause::exists("references")],
            ..Default::default()
        })))
    }
}

/// Matches the free-text query against every text field
pub struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn name(&self) -> &str {
        "any"
    }

    fn apply(
        &self,
        request: &SearchRequest,
        _: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        Ok(request.free_text().map(|text| Clause::MultiMatch {
            fields: TEXT_FIELDS.iter().map(|f| f.to_string()).collect(),
            query: text.to_string(),
        }))
    }
}

/// Boosts annotations whose tags match the free-text query
pub struct TagsMatcher;

impl Matcher for TagsMatcher {
    fn name(&self) -> &str {
        "tags"
    }

    fn apply(
        &self,
        request: &SearchRequest,
        _: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        Ok(request.free_text().map(|text| Clause::Match {
            field: "tags".to_string(),
            query: text.to_string(),
            boost: Some(2.0),
        }))
    }
}

/// Scores annotations by how many URI components they share with the
/// requested `uri` filter values. Inactive without a `uri` filter.
pub struct UriPartsMatcher;

impl Matcher for UriPartsMatcher {
    fn name(&self) -> &str {
        "uri_parts"
    }

    fn apply(
        &self,
        request: &SearchRequest,
        _: &mut QueryContext,
    ) -> SearchResult<Option<Clause>> {
        let uris = request.filter_values(FilterField::Uri);
        if uris.is_empty() {
            return Ok(None);
        }
        Ok(Some(Clause::Match {
            field: "uri.parts".to_string(),
            query: uris.join(" "),
            boost: None,
        }))
    }
}
