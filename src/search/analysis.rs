//! Index-time text analysis
//!
//! [`AnalysisConfig`] declares the char filters, tokenizers, token filters and
//! analyzers the annotation index is created with. It serializes straight into
//! the backend's `settings.analysis` block, and [`AnalysisConfig::compile`]
//! turns the same declarations into a [`CompiledAnalysis`] that applies them
//! locally, so the URI normalization rules can be checked without a backend.
//!
//! ```text
//! uri        keyword  → strip_scheme → path_url → rstrip_slash → lowercase
//! uri_parts  uri_part → lowercase
//! user       keyword  → user → lowercase
//! thread     path_hierarchy
//! text       icu_tokenizer → icu_folding
//! ```

use crate::search::error::{SearchError, SearchResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Leading `scheme://`. Strings without `//` after the colon (`localhost:5000`,
/// `urn:isbn:...`) are ambiguous with host:port and are left alone.
pub const STRIP_SCHEME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9.+-]*://";

/// Everything before the query string or fragment.
pub const PATH_URL_PATTERN: &str = r"^([^?#]*)";

pub const RSTRIP_SLASH_PATTERN: &str = r"/$";

/// `acct:alice@example.com` → `alice@example.com`, `alice`
pub const USER_PATTERN: &str = r"^acct:((.+)@.*)$";

/// URI delimiters plus their percent-encoded forms, so url-encoded URIs nested
/// in query parameters get split too.
pub const URI_PART_PATTERN: &str = r"[:/?&=#.]|%(?:2[36EFef]|3[ADFadf])";

/// Char filter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CharFilter {
    PatternReplace { pattern: String, replacement: String },
}

/// Token filter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenFilter {
    /// Emit the capture groups of each pattern as tokens
    PatternCapture {
        preserve_original: bool,
        patterns: Vec<String>,
    },
    PatternReplace { pattern: String, replacement: String },
}

/// Tokenizer definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tokenizer {
    /// Split on every match of `pattern`
    Pattern { pattern: String },
}

/// Analyzer definition: char filters → tokenizer → token filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyzer {
    pub tokenizer: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub char_filter: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
}

impl Analyzer {
    pub fn new(tokenizer: impl Into<String>) -> Self {
        Self {
            tokenizer: tokenizer.into(),
            char_filter: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn char_filters(mut self, names: &[&str]) -> Self {
        self.char_filter = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn filters(mut self, names: &[&str]) -> Self {
        self.filter = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// The analysis block an index is created with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub char_filter: BTreeMap<String, CharFilter>,
    pub filter: BTreeMap<String, TokenFilter>,
    pub tokenizer: BTreeMap<String, Tokenizer>,
    pub analyzer: BTreeMap<String, Analyzer>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut char_filter = BTreeMap::new();
        char_filter.insert(
            "strip_scheme".to_string(),
            CharFilter::PatternReplace {
                pattern: STRIP_SCHEME_PATTERN.to_string(),
                replacement: String::new(),
            },
        );

        let mut filter = BTreeMap::new();
        filter.insert(
            "path_url".to_string(),
            TokenFilter::PatternCapture {
                preserve_original: false,
                patterns: vec![PATH_URL_PATTERN.to_string()],
            },
        );
        filter.insert(
            "rstrip_slash".to_string(),
            TokenFilter::PatternReplace {
                pattern: RSTRIP_SLASH_PATTERN.to_string(),
                replacement: String::new(),
            },
        );
        filter.insert(
            "user".to_string(),
            TokenFilter::PatternCapture {
                preserve_original: true,
                patterns: vec![USER_PATTERN.to_string()],
            },
        );

        let mut tokenizer = BTreeMap::new();
        tokenizer.insert(
            "uri_part".to_string(),
            Tokenizer::Pattern {
                pattern: URI_PART_PATTERN.to_string(),
            },
        );

        let mut analyzer = BTreeMap::new();
        analyzer.insert(
            "uri".to_string(),
            Analyzer::new("keyword")
                .char_filters(&["strip_scheme"])
                .filters(&["path_url", "rstrip_slash", "lowercase"]),
        );
        analyzer.insert(
            "uri_parts".to_string(),
            Analyzer::new("uri_part").filters(&["lowercase"]),
        );
        analyzer.insert(
            "user".to_string(),
            Analyzer::new("keyword").filters(&["user", "lowercase"]),
        );
        analyzer.insert("thread".to_string(), Analyzer::new("path_hierarchy"));
        analyzer.insert(
            "uni_normalizer".to_string(),
            Analyzer::new("icu_tokenizer").filters(&["icu_folding"]),
        );

        Self {
            char_filter,
            filter,
            tokenizer,
            analyzer,
        }
    }
}

impl AnalysisConfig {
    /// Backend representation, ready for `settings.analysis`
    pub fn to_settings(&self) -> SearchResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Compile every pattern and resolve every analyzer reference.
    ///
    /// Fails on the first malformed pattern or dangling name.
    pub fn compile(&self) -> SearchResult<CompiledAnalysis> {
        let mut char_filters = BTreeMap::new();
        for (name, def) in &self.char_filter {
            let compiled = match def {
                CharFilter::PatternReplace {
                    pattern,
                    replacement,
                } => CompiledCharFilter::Replace {
                    regex: compile_pattern(name, pattern)?,
                    replacement: replacement.clone(),
                },
            };
            char_filters.insert(name.clone(), compiled);
        }

        let mut filters = BTreeMap::new();
        for (name, def) in &self.filter {
            let compiled = match def {
                TokenFilter::PatternCapture {
                    preserve_original,
                    patterns,
                } => CompiledTokenFilter::Capture {
                    preserve_original: *preserve_original,
                    regexes: patterns
                        .iter()
                        .map(|p| compile_pattern(name, p))
                        .collect::<SearchResult<_>>()?,
                },
                TokenFilter::PatternReplace {
                    pattern,
                    replacement,
                } => CompiledTokenFilter::Replace {
                    regex: compile_pattern(name, pattern)?,
                    replacement: replacement.clone(),
                },
            };
            filters.insert(name.clone(), compiled);
        }

        let mut tokenizers = BTreeMap::new();
        for (name, def) in &self.tokenizer {
            let compiled = match def {
                Tokenizer::Pattern { pattern } => {
                    CompiledTokenizer::Pattern(compile_pattern(name, pattern)?)
                }
            };
            tokenizers.insert(name.clone(), compiled);
        }

        for (name, analyzer) in &self.analyzer {
            if !tokenizers.contains_key(&analyzer.tokenizer)
                && builtin_tokenizer(&analyzer.tokenizer).is_none()
            {
                return Err(SearchError::Configuration(format!(
                    "analyzer {} uses unknown tokenizer {}",
                    name, analyzer.tokenizer
                )));
            }
            for char_filter in &analyzer.char_filter {
                if !char_filters.contains_key(char_filter) {
                    return Err(SearchError::Configuration(format!(
                        "analyzer {} uses unknown char filter {}",
                        name, char_filter
                    )));
                }
            }
            for filter in &analyzer.filter {
                if !filters.contains_key(filter) && builtin_filter(filter).is_none() {
                    return Err(SearchError::Configuration(format!(
                        "analyzer {} uses unknown token filter {}",
                        name, filter
                    )));
                }
            }
        }

        Ok(CompiledAnalysis {
            char_filters,
            filters,
            tokenizers,
            analyzers: self.analyzer.clone(),
        })
    }
}

fn compile_pattern(name: &str, pattern: &str) -> SearchResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        SearchError::Configuration(format!("invalid pattern for {}: {}", name, e))
    })
}

#[derive(Debug)]
enum CompiledCharFilter {
    Replace { regex: Regex, replacement: String },
}

#[derive(Debug)]
enum CompiledTokenFilter {
    Capture {
        preserve_original: bool,
        regexes: Vec<Regex>,
    },
    Replace {
        regex: Regex,
        replacement: String,
    },
}

#[derive(Debug)]
enum CompiledTokenizer {
    Pattern(Regex),
}

#[derive(Debug, Clone, Copy)]
enum BuiltinTokenizer {
    Keyword,
    PathHierarchy,
    Words,
}

fn builtin_tokenizer(name: &str) -> Option<BuiltinTokenizer> {
    match name {
        "keyword" => Some(BuiltinTokenizer::Keyword),
        "path_hierarchy" => Some(BuiltinTokenizer::PathHierarchy),
        "standard" | "icu_tokenizer" => Some(BuiltinTokenizer::Words),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum BuiltinFilter {
    Lowercase,
    Unique,
    Folding,
}

fn builtin_filter(name: &str) -> Option<BuiltinFilter> {
    match name {
        "lowercase" => Some(BuiltinFilter::Lowercase),
        "unique" => Some(BuiltinFilter::Unique),
        "icu_folding" | "asciifolding" => Some(BuiltinFilter::Folding),
        _ => None,
    }
}

/// Analysis rules with every pattern compiled, applied locally
#[derive(Debug)]
pub struct CompiledAnalysis {
    char_filters: BTreeMap<String, CompiledCharFilter>,
    filters: BTreeMap<String, CompiledTokenFilter>,
    tokenizers: BTreeMap<String, CompiledTokenizer>,
    analyzers: BTreeMap<String, Analyzer>,
}

impl CompiledAnalysis {
    /// Run the named analyzer over `text`
    pub fn analyze(&self, analyzer: &str, text: &str) -> SearchResult<Vec<String>> {
        let def = self.analyzers.get(analyzer).ok_or_else(|| {
            SearchError::Configuration(format!("unknown analyzer {}", analyzer))
        })?;

        let mut filtered = text.to_string();
        for name in &def.char_filter {
            filtered = self.char_filter(name, &filtered)?;
        }

        let mut tokens = self.tokenize(&def.tokenizer, &filtered)?;
        for name in &def.filter {
            tokens = self.token_filter(name, tokens)?;
        }
        Ok(tokens)
    }

    /// Apply a single char filter
    pub fn char_filter(&self, name: &str, text: &str) -> SearchResult<String> {
        match self.char_filters.get(name) {
            Some(CompiledCharFilter::Replace { regex, replacement }) => {
                Ok(regex.replace_all(text, replacement.as_str()).into_owned())
            }
            None => Err(SearchError::Configuration(format!(
                "unknown char filter {}",
                name
            ))),
        }
    }

    /// Split `text` with the named tokenizer. Empty tokens are kept.
    pub fn tokenize(&self, name: &str, text: &str) -> SearchResult<Vec<String>> {
        if let Some(CompiledTokenizer::Pattern(regex)) = self.tokenizers.get(name) {
            return Ok(regex.split(text).map(str::to_string).collect());
        }

        match builtin_tokenizer(name) {
            Some(BuiltinTokenizer::Keyword) => Ok(vec![text.to_string()]),
            Some(BuiltinTokenizer::PathHierarchy) => Ok(path_hierarchy(text)),
            Some(BuiltinTokenizer::Words) => Ok(text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|word| !word.is_empty())
                .map(str::to_string)
                .collect()),
            None => Err(SearchError::Configuration(format!(
                "unknown tokenizer {}",
                name
            ))),
        }
    }

    /// Apply a single token filter to a token stream
    pub fn token_filter(&self, name: &str, tokens: Vec<String>) -> SearchResult<Vec<String>> {
        if let Some(filter) = self.filters.get(name) {
            return Ok(match filter {
                CompiledTokenFilter::Capture {
                    preserve_original,
                    regexes,
                } => tokens
                    .into_iter()
                    .flat_map(|token| capture_groups(&token, *preserve_original, regexes))
                    .collect(),
                CompiledTokenFilter::Replace { regex, replacement } => tokens
                    .into_iter()
                    .map(|token| regex.replace_all(&token, replacement.as_str()).into_owned())
                    .collect(),
            });
        }

        match builtin_filter(name) {
            Some(BuiltinFilter::Lowercase) => {
                Ok(tokens.into_iter().map(|t| t.to_lowercase()).collect())
            }
            Some(BuiltinFilter::Unique) => {
                let mut seen = std::collections::HashSet::new();
                Ok(tokens
                    .into_iter()
                    .filter(|t| seen.insert(t.clone()))
                    .collect())
            }
            Some(BuiltinFilter::Folding) => Ok(tokens.iter().map(|t| fold(t)).collect()),
            None => Err(SearchError::Configuration(format!(
                "unknown token filter {}",
                name
            ))),
        }
    }

    /// `strip_scheme` char filter
    pub fn strip_scheme(&self, uri: &str) -> SearchResult<String> {
        self.char_filter("strip_scheme", uri)
    }

    /// `path_url` token filter on a single token
    pub fn path_url(&self, uri: &str) -> SearchResult<String> {
        self.single("path_url", uri)
    }

    /// `rstrip_slash` token filter on a single token
    pub fn rstrip_slash(&self, uri: &str) -> SearchResult<String> {
        self.single("rstrip_slash", uri)
    }

    /// `uri_part` tokenizer
    pub fn uri_parts(&self, uri: &str) -> SearchResult<Vec<String>> {
        self.tokenize("uri_part", uri)
    }

    fn single(&self, filter: &str, token: &str) -> SearchResult<String> {
        let mut out = self.token_filter(filter, vec![token.to_string()])?;
        Ok(if out.is_empty() {
            String::new()
        } else {
            out.swap_remove(0)
        })
    }
}

/// Capture groups of every match, or the token itself when nothing matched.
fn capture_groups(token: &str, preserve_original: bool, regexes: &[Regex]) -> Vec<String> {
    let mut out = Vec::new();
    if preserve_original {
        out.push(token.to_string());
    }

    let mut matched = false;
    for regex in regexes {
        for caps in regex.captures_iter(token) {
            matched = true;
            for group in caps.iter().skip(1).flatten() {
                let value = group.as_str().to_string();
                if !out.contains(&value) {
                    out.push(value);
                }
            }
        }
    }

    if !matched && !preserve_original {
        out.push(token.to_string());
    }
    out
}

/// `a/b/c` → `a`, `a/b`, `a/b/c`
fn path_hierarchy(text: &str) -> Vec<String> {
    let mut out: Vec<String> = text
        .char_indices()
        .filter(|&(i, c)| c == '/' && i > 0)
        .map(|(i, _)| text[..i].to_string())
        .collect();
    if out.last().map(String::as_str) != Some(text) {
        out.push(text.to_string());
    }
    out
}

/// Decompose, drop combining marks, lowercase.
fn fold(token: &str) -> String {
    token
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled() -> CompiledAnalysis {
        AnalysisConfig::default().compile().unwrap()
    }

    #[test]
    fn test_strip_scheme() {
        let analysis = compiled();
        let cases = [
            ("http://ping/pong#hash", "ping/pong#hash"),
            ("chrome-extension://1234/a.pdf", "1234/a.pdf"),
            ("a+b.c://example.com/", "example.com/"),
            ("example.com/foo", "example.com/foo"),
            ("localhost:5000", "localhost:5000"),
        ];
        for (input, expected) in cases {
            assert_eq!(analysis.strip_scheme(input).unwrap(), expected, "{}", input);
        }
    }

    #[test]
    fn test_path_url() {
        let analysis = compiled();
        assert_eq!(
            analysis.path_url("example.com/foo/bar?query#hash").unwrap(),
            "example.com/foo/bar"
        );
        assert_eq!(
            analysis.path_url("example.com/foo/bar/").unwrap(),
            "example.com/foo/bar/"
        );
        assert_eq!(analysis.path_url("example.com#frag").unwrap(), "example.com");
    }

    #[test]
    fn test_rstrip_slash() {
        let analysis = compiled();
        assert_eq!(analysis.rstrip_slash("example.com/").unwrap(), "example.com");
        assert_eq!(analysis.rstrip_slash("example.com").unwrap(), "example.com");
        assert_eq!(analysis.rstrip_slash("example.com//").unwrap(), "example.com/");
    }

    #[test]
    fn test_uri_analyzer_chain() {
        let analysis = compiled();
        assert_eq!(
            analysis
                .analyze("uri", "HTTPS://Example.com/Foo/?q=1#top")
                .unwrap(),
            vec!["example.com/foo"]
        );
    }

    #[test]
    fn test_user_analyzer() {
        let analysis = compiled();
        assert_eq!(
            analysis.analyze("user", "acct:Alice@example.com").unwrap(),
            vec!["acct:alice@example.com", "alice@example.com", "alice"]
        );
    }

    #[test]
    fn test_thread_analyzer() {
        let analysis = compiled();
        assert_eq!(
            analysis.analyze("thread", "a/b/c").unwrap(),
            vec!["a", "a/b", "a/b/c"]
        );
    }

    #[test]
    fn test_uni_normalizer_folds_diacritics() {
        let analysis = compiled();
        assert_eq!(
            analysis.analyze("uni_normalizer", "Café naïve").unwrap(),
            vec!["cafe", "naive"]
        );
    }

    #[test]
    fn test_malformed_pattern_fails_fast() {
        let mut config = AnalysisConfig::default();
        config.tokenizer.insert(
            "broken".to_string(),
            Tokenizer::Pattern {
                pattern: "[unclosed".to_string(),
            },
        );
        let err = config.compile().unwrap_err();
        assert!(matches!(err, SearchError::Configuration(_)));
    }

    #[test]
    fn test_dangling_filter_reference_fails() {
        let mut config = AnalysisConfig::default();
        config.analyzer.insert(
            "bad".to_string(),
            Analyzer::new("keyword").filters(&["no_such_filter"]),
        );
        assert!(config.compile().is_err());
    }

    #[test]
    fn test_settings_shape() {
        let settings = AnalysisConfig::default().to_settings().unwrap();
        assert_eq!(
            settings["char_filter"]["strip_scheme"]["type"],
            "pattern_replace"
        );
        assert_eq!(settings["tokenizer"]["uri_part"]["type"], "pattern");
        assert_eq!(settings["analyzer"]["uri"]["tokenizer"], "keyword");
        assert_eq!(
            settings["filter"]["path_url"]["preserve_original"],
            serde_json::json!(false)
        );
    }
}
