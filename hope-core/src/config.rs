//! Engine configuration
//!
//! Thresholds and policies come from deployment configuration, not code.
//! Every config section validates itself before a service will accept it.

use crate::{ConfigError, HopeError, HopeResult};
use serde::{Deserialize, Serialize};

/// Deduplication thresholds and paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationConfig {
    /// Maximum absolute number of duplicates allowed within one import.
    pub duplicates_allowed: i64,
    /// Maximum percentage of an import allowed to be duplicates (0-100).
    pub duplicates_percentage_allowed: f64,
    /// Biometric similarity score at or above which a pair is a duplicate.
    pub duplicate_score: f64,
    /// Biometric similarity score at or above which a pair needs
    /// adjudication (possible duplicate).
    pub possible_duplicate_score: f64,
    /// Page size for bulk status writes.
    pub batch_size: usize,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            duplicates_allowed: 5,
            duplicates_percentage_allowed: 15.0,
            duplicate_score: 0.9,
            possible_duplicate_score: 0.7,
            batch_size: 500,
        }
    }
}

/// Field-level policy for collision merges: which canonical household
/// fields the incoming batch overwrites. The identification key is always
/// preserved and never part of this list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub overwrite_fields: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            overwrite_fields: vec![
                "size".to_string(),
                "village".to_string(),
                "address".to_string(),
                "residence_status".to_string(),
            ],
        }
    }
}

impl MergePolicy {
    /// Whether the incoming batch wins for a household field.
    pub fn overwrites(&self, field: &str) -> bool {
        self.overwrite_fields.iter().any(|f| f == field)
    }
}

/// Snapshot service paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Payments processed per page to bound the working set.
    pub page_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

/// Master engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub deduplication: DeduplicationConfig,
    pub merge: MergePolicy,
    pub snapshot: SnapshotConfig,
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> HopeResult<()> {
        if self.deduplication.duplicates_allowed < 0 {
            return Err(HopeError::Config(ConfigError::InvalidValue {
                field: "deduplication.duplicates_allowed".to_string(),
                value: self.deduplication.duplicates_allowed.to_string(),
                reason: "must be non-negative".to_string(),
            }));
        }
        let pct = self.deduplication.duplicates_percentage_allowed;
        if !(0.0..=100.0).contains(&pct) {
            return Err(HopeError::Config(ConfigError::InvalidValue {
                field: "deduplication.duplicates_percentage_allowed".to_string(),
                value: pct.to_string(),
                reason: "must be between 0 and 100".to_string(),
            }));
        }
        for (field, score) in [
            (
                "deduplication.duplicate_score",
                self.deduplication.duplicate_score,
            ),
            (
                "deduplication.possible_duplicate_score",
                self.deduplication.possible_duplicate_score,
            ),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(HopeError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: score.to_string(),
                    reason: "must be between 0.0 and 1.0".to_string(),
                }));
            }
        }
        if self.deduplication.possible_duplicate_score > self.deduplication.duplicate_score {
            return Err(HopeError::Config(ConfigError::InvalidValue {
                field: "deduplication.possible_duplicate_score".to_string(),
                value: self.deduplication.possible_duplicate_score.to_string(),
                reason: "must not exceed duplicate_score".to_string(),
            }));
        }
        if self.deduplication.batch_size == 0 {
            return Err(HopeError::Config(ConfigError::InvalidValue {
                field: "deduplication.batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        if self.snapshot.page_size == 0 {
            return Err(HopeError::Config(ConfigError::InvalidValue {
                field: "snapshot.page_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> EngineConfig {
        EngineConfig {
            deduplication: DeduplicationConfig {
                duplicates_allowed: 5,
                duplicates_percentage_allowed: 15.0,
                duplicate_score: 0.9,
                possible_duplicate_score: 0.7,
                batch_size: 500,
            },
            merge: MergePolicy::default(),
            snapshot: SnapshotConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn test_negative_duplicates_allowed_rejected() {
        let mut config = valid_config();
        config.deduplication.duplicates_allowed = -1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicates_allowed"));
    }

    #[test]
    fn test_percentage_out_of_range_rejected() {
        let mut config = valid_config();
        config.deduplication.duplicates_percentage_allowed = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_possible_score_above_duplicate_score_rejected() {
        let mut config = valid_config();
        config.deduplication.possible_duplicate_score = 0.95;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("possible_duplicate_score"));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = valid_config();
        config.snapshot.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_merge_policy_preserves_identification_key() {
        let policy = MergePolicy::default();
        assert!(policy.overwrites("size"));
        assert!(policy.overwrites("village"));
        assert!(!policy.overwrites("identification_key"));
    }
}
