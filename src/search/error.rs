//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Invalid request parameters (unknown filter field, bad sort, negative limit)
    #[error("Invalid search request: {0}")]
    Validation(String),

    /// Invalid configuration (malformed analyzer pattern, bad settings)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The alias resolves to more than one concrete index
    #[error("Alias {alias} resolves to multiple indices: {indices:?}")]
    AmbiguousAlias { alias: String, indices: Vec<String> },

    /// An alias operation was attempted against a concrete index
    #[error("{0} is not an alias")]
    NotAnAlias(String),

    /// Transport failure talking to the search backend
    #[error("Search backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The search backend answered with an error status
    #[error("Search backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// Response or request body could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Whether the caller sent a bad request (maps to a 4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::Validation(_))
    }

    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        SearchError::Validation(msg.into())
    }
}

impl From<regex::Error> for SearchError {
    fn from(err: regex::Error) -> Self {
        SearchError::Configuration(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(msg) => AppError::Validation(msg),
            SearchError::Configuration(msg) => AppError::Configuration(msg),
            err @ (SearchError::AmbiguousAlias { .. } | SearchError::NotAnAlias(_)) => {
                AppError::Configuration(err.to_string())
            }
            err @ (SearchError::Transport(_) | SearchError::Backend { .. }) => {
                AppError::Backend(err.to_string())
            }
            SearchError::Serialization(err) => AppError::Serialization(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_client_error() {
        let err = SearchError::validation("unknown filter field: usr");
        assert!(err.is_client_error());

        let app: AppError = err.into();
        assert_eq!(app.status_code(), 400);
    }

    #[test]
    fn test_alias_errors_are_configuration_errors() {
        let err = SearchError::AmbiguousAlias {
            alias: "hypothesis".to_string(),
            indices: vec!["a".to_string(), "b".to_string()],
        };
        assert!(!err.is_client_error());
        assert!(matches!(AppError::from(err), AppError::Configuration(_)));
    }

    #[test]
    fn test_backend_error_maps_to_bad_gateway() {
        let err = SearchError::Backend {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(AppError::from(err).status_code(), 502);
    }
}
