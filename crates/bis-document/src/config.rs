//! Document loading and saving options.

use serde::{Deserialize, Serialize};

/// Configuration for loading and saving documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Author written into auto-inserted `0 Author:` placeholders.
    pub default_author: String,

    /// Insert description, `Name:` and `Author:` placeholders when missing.
    pub insert_missing_headers: bool,

    /// Load unresolved references from the project and search directories.
    pub resolve_external_files: bool,

    /// Maximum nesting depth of `!LPUB INCLUDE` directives.
    pub max_include_depth: usize,

    /// Write changed external submodels back to their own files on save.
    pub write_external_files: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            default_author: "Unknown".to_string(),
            insert_missing_headers: true,
            resolve_external_files: true,
            max_include_depth: 8,
            write_external_files: false,
        }
    }
}

impl DocumentConfig {
    /// Leave headers exactly as loaded.
    #[must_use]
    pub fn without_header_repair(mut self) -> Self {
        self.insert_missing_headers = false;
        self
    }

    #[must_use]
    pub fn with_default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DocumentConfig =
            serde_json::from_str(r#"{"default_author": "J. Builder"}"#).unwrap();
        assert_eq!(config.default_author, "J. Builder");
        assert!(config.insert_missing_headers);
        assert_eq!(config.max_include_depth, 8);
    }
}
