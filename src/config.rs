//! Engine settings

use serde::{Deserialize, Serialize};

/// Default nesting limit for nested entities.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Settings for an [`Extractor`](crate::Extractor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractorConfig {
    /// Deepest allowed nested-entity level; the top-level entity is level 0.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ExtractorConfig {
    /// Parse settings from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ExtractorConfig::default().max_depth, 32);
        assert_eq!(ExtractorConfig::from_json("{}").unwrap(), ExtractorConfig::default());
    }

    #[test]
    fn test_from_json() {
        let config = ExtractorConfig::from_json(r#"{"max_depth": 4}"#).unwrap();
        assert_eq!(config.max_depth, 4);
        assert!(ExtractorConfig::from_json(r#"{"max_dept": 4}"#).is_err());
        assert_eq!(
            serde_json::to_string(&config).unwrap(),
            r#"{"max_depth":4}"#
        );
    }
}
