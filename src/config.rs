use crate::search::SearchSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search backend connection
    pub elasticsearch: ElasticsearchConfig,

    /// Query-building settings
    #[serde(default)]
    pub search: SearchSettings,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("ANNOTATION_SEARCH_CONFIG")
            .unwrap_or_else(|_| "config/local.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering the defaults, `path` and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::from(path.as_ref()).required(false))
            // Override with environment variables (prefix: ANNOTATION_SEARCH__)
            .add_source(
                config::Environment::with_prefix("ANNOTATION_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the search backend
    #[serde(default = "default_url")]
    pub url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_url(), "http://localhost:9200");
        assert_eq!(default_timeout(), 10);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_embedded_defaults_load() {
        let config = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.search.index, "hypothesis");
        assert_eq!(config.search.max_limit, 200);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[search]\nindex = \"annotations\"\nmax_limit = 50\nauthority = \"example.com\"\n\n[elasticsearch]\nurl = \"http://search:9200\""
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.search.index, "annotations");
        assert_eq!(config.search.max_limit, 50);
        assert_eq!(config.search.authority.as_deref(), Some("example.com"));
        assert_eq!(config.elasticsearch.url, "http://search:9200");
        assert_eq!(config.elasticsearch.timeout_secs, 10);
    }
}
