//! Indexed annotation documents and the index mapping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Annotation as stored in the search index.
///
/// Written by the indexer; the search layer only reads it back out of hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDocument {
    pub authority: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tags_raw: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub deleted: bool,

    pub uri: String,
    pub user: String,
    pub user_raw: String,

    #[serde(default)]
    pub target: Vec<DocumentTarget>,

    pub shared: bool,

    /// Thread ancestry, root first
    #[serde(default)]
    pub references: Vec<String>,

    pub group: String,

    #[serde(default)]
    pub thread_ids: Vec<String>,
}

impl AnnotationDocument {
    /// Whether this annotation is a reply
    pub fn is_reply(&self) -> bool {
        !self.references.is_empty()
    }

    /// Thread root, or `None` for top-level annotations
    pub fn thread_root(&self) -> Option<&str> {
        self.references.first().map(String::as_str)
    }
}

/// Annotated resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTarget {
    pub source: String,

    /// Normalized URIs the annotation should be found under
    #[serde(default)]
    pub scope: Vec<String>,

    #[serde(default)]
    pub selector: Vec<Selector>,
}

/// Anchoring selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    TextQuoteSelector {
        exact: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        suffix: Option<String>,
    },
    TextPositionSelector {
        start: u64,
        end: u64,
    },
    RangeSelector {
        #[serde(rename = "startContainer")]
        start_container: String,
        #[serde(rename = "startOffset")]
        start_offset: u64,
        #[serde(rename = "endContainer")]
        end_container: String,
        #[serde(rename = "endOffset")]
        end_offset: u64,
    },
    FragmentSelector {
        value: String,
        #[serde(default, rename = "conformsTo")]
        conforms_to: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Field mappings for the annotation index.
///
/// Analyzer names refer to [`AnalysisConfig::default`](crate::search::AnalysisConfig).
pub fn annotation_mapping() -> Value {
    json!({
        "dynamic": false,
        "properties": {
            "authority": {"type": "keyword"},
            "created": {"type": "date"},
            "updated": {"type": "date"},
            "quote": {"type": "text", "analyzer": "uni_normalizer"},
            "tags": {"type": "text", "analyzer": "uni_normalizer"},
            "tags_raw": {"type": "keyword"},
            "text": {"type": "text", "analyzer": "uni_normalizer"},
            "deleted": {"type": "boolean"},
            "uri": {
                "type": "text",
                "analyzer": "uri",
                "fields": {
                    "parts": {"type": "text", "analyzer": "uri_parts"}
                }
            },
            "user": {"type": "text", "analyzer": "user"},
            "user_raw": {"type": "keyword"},
            "target": {
                "properties": {
                    "source": {"type": "text", "analyzer": "uri", "copy_to": ["uri"]},
                    "scope": {"type": "keyword"},
                    "selector": {
                        "properties": {
                            "type": {"type": "keyword"},
                            "exact": {"type": "text", "analyzer": "uni_normalizer"},
                            "prefix": {"type": "text", "analyzer": "uni_normalizer"},
                            "suffix": {"type": "text", "analyzer": "uni_normalizer"},
                            "start": {"type": "long"},
                            "end": {"type": "long"}
                        }
                    }
                }
            },
            "shared": {"type": "boolean"},
            "references": {"type": "keyword"},
            "group": {"type": "keyword"},
            "thread_ids": {"type": "keyword"}
        }
    })
}
