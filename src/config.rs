//! Configuration for the section store and the subscription orchestrator.

use crate::error::{Result, SyncError};
use crate::types::SectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Field layout of one section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionSpec {
    pub id: SectionId,

    /// Field holding the ordering timestamp.
    /// Default: "createdAt"
    pub ordering_field: String,

    /// Fields joined with ':' into the identity key.
    /// Default: ["address", "chain"]
    pub identity_fields: Vec<String>,

    /// Fields matched by the search view.
    /// Default: ["name", "symbol", "address"]
    pub search_fields: Vec<String>,
}

impl SectionSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: SectionId::new(id),
            ..Default::default()
        }
    }
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for SectionSpec {
    fn default() -> Self {
        Self {
            id: SectionId::new("default"),
            ordering_field: "createdAt".to_string(),
            identity_fields: strings(&["address", "chain"]),
            search_fields: strings(&["name", "symbol", "address"]),
        }
    }
}

/// Section store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Max records per section.
    /// Default: 50
    pub limit: usize,

    /// Stamp difference below which a merge updates in place.
    /// Default: 1000ms
    pub same_moment_epsilon_ms: f64,

    /// Buffered change events per watcher before it is dropped.
    /// Default: 256
    pub watch_buffer: usize,

    pub sections: Vec<SectionSpec>,
}

impl StoreConfig {
    /// Config with default tuning and the given sections.
    pub fn with_sections(sections: Vec<SectionSpec>) -> Self {
        Self {
            sections,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SyncError::Misconfiguration(msg));
        if self.limit == 0 {
            return invalid("section limit must be positive".to_string());
        }
        if !self.same_moment_epsilon_ms.is_finite() || self.same_moment_epsilon_ms < 0.0 {
            return invalid(format!("invalid merge epsilon: {}", self.same_moment_epsilon_ms));
        }

        let mut seen = HashSet::new();
        for spec in &self.sections {
            if !seen.insert(&spec.id) {
                return invalid(format!("duplicate section: {}", spec.id));
            }
            if spec.identity_fields.is_empty() {
                return invalid(format!("section {} has no identity fields", spec.id));
            }
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            same_moment_epsilon_ms: 1000.0,
            watch_buffer: 256,
            sections: Vec::new(),
        }
    }
}

/// Orchestrator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause applied around `apply_filters`.
    /// Default: 500ms
    pub settle_window_ms: u64,
}

impl OrchestratorConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: 500,
        }
    }
}

/// Full configuration, loadable from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
}

impl SyncConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(input)
            .map_err(|e| SyncError::Misconfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.store.limit, 50);
        assert_eq!(config.store.same_moment_epsilon_ms, 1000.0);
        assert_eq!(config.orchestrator.settle_window(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_json() {
        let config = SyncConfig::from_json_str(
            r#"{
                "store": {
                    "limit": 3,
                    "sections": [
                        {"id": "new"},
                        {"id": "migrated", "ordering_field": "migratedAt"}
                    ]
                },
                "orchestrator": {"settle_window_ms": 250}
            }"#,
        )
        .unwrap();

        assert_eq!(config.store.limit, 3);
        assert_eq!(config.store.sections.len(), 2);
        assert_eq!(config.store.sections[0].ordering_field, "createdAt");
        assert_eq!(config.store.sections[1].ordering_field, "migratedAt");
        assert_eq!(config.orchestrator.settle_window_ms, 250);
    }

    #[test]
    fn test_validation() {
        let dup = StoreConfig::with_sections(vec![SectionSpec::new("a"), SectionSpec::new("a")]);
        assert!(matches!(dup.validate(), Err(SyncError::Misconfiguration(_))));

        let zero = StoreConfig {
            limit: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let no_identity = StoreConfig::with_sections(vec![SectionSpec {
            identity_fields: Vec::new(),
            ..SectionSpec::new("a")
        }]);
        assert!(no_identity.validate().is_err());

        assert!(SyncConfig::from_json_str("{not json").is_err());
    }
}
