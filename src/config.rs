//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables shared by clustering, deduplication and selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Euclidean distance under which a face joins a cluster without its own override
    pub default_similarity_threshold: f64,
    /// Upper bound for merge suggestions; must be looser than the match threshold
    pub suggestion_threshold: f64,
    /// Gap that separates two bursts
    pub burst_gap_ms: i64,
    /// Weight of the per-subject standard deviation in group-balanced selection
    pub balance_penalty: f64,
    /// Bonus applied for or against group shots depending on `group_balance`
    pub group_bias_bonus: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_similarity_threshold: 0.4,
            suggestion_threshold: 0.55,
            burst_gap_ms: 2000,
            balance_penalty: 25.0,
            group_bias_bonus: 0.5,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

/// Per-signal weights for the selection quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
    pub smile: f64,
    pub confidence: f64,
    pub frontality: f64,
    pub centeredness: f64,
    pub blur: f64,
    /// 0 prefers solo shots, 1 prefers group shots.
    pub group_balance: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            smile: 0.5,
            confidence: 0.3,
            frontality: 0.3,
            centeredness: 0.2,
            blur: 0.4,
            group_balance: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("albumrs.json");
        std::fs::write(&path, r#"{"default_similarity_threshold": 0.5}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.default_similarity_threshold, 0.5);
        assert_eq!(config.burst_gap_ms, 2000);
        assert_eq!(config.balance_penalty, 25.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        assert!(EngineConfig::from_file(&temp_dir.path().join("nope.json")).is_err());
    }
}
