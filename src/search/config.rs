//! Search configuration

use serde::{Deserialize, Serialize};

/// Query-building settings shared by every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Alias the application reads and writes through
    #[serde(default = "default_index")]
    pub index: String,

    /// Page size used when the request names none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound a requested page size is clamped to
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Group every principal may read
    #[serde(default = "default_world_group")]
    pub world_group: String,

    /// Restrict results to this authority when set
    #[serde(default)]
    pub authority: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            index: default_index(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            world_group: default_world_group(),
            authority: None,
        }
    }
}

fn default_index() -> String {
    "hypothesis".to_string()
}

fn default_limit() -> usize {
    20
}

fn default_max_limit() -> usize {
    200
}

fn default_world_group() -> String {
    "__world__".to_string()
}

/// Builder for SearchSettings
pub struct SearchSettingsBuilder {
    settings: SearchSettings,
}

impl SearchSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: SearchSettings::default(),
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.settings.index = index.into();
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.settings.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.settings.max_limit = limit;
        self
    }

    pub fn world_group(mut self, group: impl Into<String>) -> Self {
        self.settings.world_group = group.into();
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.settings.authority = Some(authority.into());
        self
    }

    pub fn build(self) -> SearchSettings {
        self.settings
    }
}

impl Default for SearchSettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SearchSettings::default();
        assert_eq!(settings.index, "hypothesis");
        assert_eq!(settings.default_limit, 20);
        assert_eq!(settings.max_limit, 200);
        assert_eq!(settings.world_group, "__world__");
        assert!(settings.authority.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let settings = SearchSettingsBuilder::new()
            .index("annotations")
            .max_limit(50)
            .authority("example.com")
            .build();

        assert_eq!(settings.index, "annotations");
        assert_eq!(settings.max_limit, 50);
        assert_eq!(settings.authority.as_deref(), Some("example.com"));
        assert_eq!(settings.default_limit, 20);
    }
}
