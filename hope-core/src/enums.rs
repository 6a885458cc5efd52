//! Enum types for HOPE entities
//!
//! Every enum here is a durable state-machine marker or demographic code
//! persisted to the database. The string values are loaded/polled by other
//! components and by existing data, so they are pinned via `as_db_str` /
//! `from_db_str` and serde renames and must never change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an invalid database enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEnumParseError {
    pub enum_name: &'static str,
    pub value: String,
}

impl fmt::Display for DbEnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} value: {}", self.enum_name, self.value)
    }
}

impl std::error::Error for DbEnumParseError {}

/// Shared Display body for db-string enums.
macro_rules! fmt_as_db_str {
    () => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.as_db_str())
        }
    };
}

// ============================================================================
// REGISTRATION DATA IMPORT
// ============================================================================

/// Status of a registration data import (the pipeline state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RdiStatus {
    #[serde(rename = "LOADING")]
    Loading,
    #[serde(rename = "DEDUPLICATION")]
    Deduplication,
    #[serde(rename = "DEDUPLICATION_FAILED")]
    DeduplicationFailed,
    #[serde(rename = "IN_REVIEW")]
    InReview,
    #[serde(rename = "MERGING")]
    Merging,
    #[serde(rename = "MERGED")]
    Merged,
    #[serde(rename = "MERGE_ERROR")]
    MergeError,
    #[serde(rename = "REFUSED")]
    Refused,
}

impl RdiStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            RdiStatus::Loading => "LOADING",
            RdiStatus::Deduplication => "DEDUPLICATION",
            RdiStatus::DeduplicationFailed => "DEDUPLICATION_FAILED",
            RdiStatus::InReview => "IN_REVIEW",
            RdiStatus::Merging => "MERGING",
            RdiStatus::Merged => "MERGED",
            RdiStatus::MergeError => "MERGE_ERROR",
            RdiStatus::Refused => "REFUSED",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, DbEnumParseError> {
        match s {
            "LOADING" => Ok(RdiStatus::Loading),
            "DEDUPLICATION" => Ok(RdiStatus::Deduplication),
            "DEDUPLICATION_FAILED" => Ok(RdiStatus::DeduplicationFailed),
            "IN_REVIEW" => Ok(RdiStatus::InReview),
            "MERGING" => Ok(RdiStatus::Merging),
            "MERGED" => Ok(RdiStatus::Merged),
            "MERGE_ERROR" => Ok(RdiStatus::MergeError),
            "REFUSED" => Ok(RdiStatus::Refused),
            _ => Err(DbEnumParseError {
                enum_name: "RdiStatus",
                value: s.to_string(),
            }),
        }
    }

    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// Failed states are re-enterable so a stuck import can be retried or
    /// manually reset by an operator.
    pub fn can_transition(&self, to: RdiStatus) -> bool {
        use RdiStatus::*;
        matches!(
            (self, to),
            (Loading, Deduplication)
                | (Loading, InReview)
                | (Deduplication, InReview)
                | (Deduplication, DeduplicationFailed)
                | (DeduplicationFailed, Deduplication)
                | (InReview, Merging)
                | (InReview, Refused)
                | (Merging, Merged)
                | (Merging, MergeError)
                | (MergeError, Merging)
        )
    }
}

impl fmt::Display for RdiStatus {
    fmt_as_db_str!();
}

impl FromStr for RdiStatus {
    type Err = DbEnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Merge status of a household/individual record: pending records are staging
/// data produced by an import, merged records are part of the canonical
/// population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "MERGED")]
    Merged,
}

impl MergeStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MergeStatus::Pending => "PENDING",
            MergeStatus::Merged => "MERGED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, DbEnumParseError> {
        match s {
            "PENDING" => Ok(MergeStatus::Pending),
            "MERGED" => Ok(MergeStatus::Merged),
            _ => Err(DbEnumParseError {
                enum_name: "MergeStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MergeStatus {
    fmt_as_db_str!();
}

// ============================================================================
// DEDUPLICATION STATUSES
// ============================================================================

/// Batch-level deduplication status: an individual compared against the
/// other individuals of the same import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeduplicationBatchStatus {
    #[serde(rename = "UNIQUE_IN_BATCH")]
    UniqueInBatch,
    #[serde(rename = "DUPLICATE_IN_BATCH")]
    DuplicateInBatch,
    #[serde(rename = "SIMILAR_IN_BATCH")]
    SimilarInBatch,
    #[default]
    #[serde(rename = "NOT_PROCESSED")]
    NotProcessed,
}

impl DeduplicationBatchStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeduplicationBatchStatus::UniqueInBatch => "UNIQUE_IN_BATCH",
            DeduplicationBatchStatus::DuplicateInBatch => "DUPLICATE_IN_BATCH",
            DeduplicationBatchStatus::SimilarInBatch => "SIMILAR_IN_BATCH",
            DeduplicationBatchStatus::NotProcessed => "NOT_PROCESSED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, DbEnumParseError> {
        match s {
            "UNIQUE_IN_BATCH" => Ok(DeduplicationBatchStatus::UniqueInBatch),
            "DUPLICATE_IN_BATCH" => Ok(DeduplicationBatchStatus::DuplicateInBatch),
            "SIMILAR_IN_BATCH" => Ok(DeduplicationBatchStatus::SimilarInBatch),
            "NOT_PROCESSED" => Ok(DeduplicationBatchStatus::NotProcessed),
            _ => Err(DbEnumParseError {
                enum_name: "DeduplicationBatchStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DeduplicationBatchStatus {
    fmt_as_db_str!();
}

/// Golden-record deduplication status: an individual compared against the
/// canonical population of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeduplicationGoldenRecordStatus {
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "DUPLICATE")]
    Duplicate,
    #[serde(rename = "NEEDS_ADJUDICATION")]
    NeedsAdjudication,
    #[serde(rename = "POSTPONE")]
    Postpone,
    #[default]
    #[serde(rename = "NOT_PROCESSED")]
    NotProcessed,
}

impl DeduplicationGoldenRecordStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeduplicationGoldenRecordStatus::Unique => "UNIQUE",
            DeduplicationGoldenRecordStatus::Duplicate => "DUPLICATE",
            DeduplicationGoldenRecordStatus::NeedsAdjudication => "NEEDS_ADJUDICATION",
            DeduplicationGoldenRecordStatus::Postpone => "POSTPONE",
            DeduplicationGoldenRecordStatus::NotProcessed => "NOT_PROCESSED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, DbEnumParseError> {
        match s {
            "UNIQUE" => Ok(DeduplicationGoldenRecordStatus::Unique),
            "DUPLICATE" => Ok(DeduplicationGoldenRecordStatus::Duplicate),
            "NEEDS_ADJUDICATION" => Ok(DeduplicationGoldenRecordStatus::NeedsAdjudication),
            "POSTPONE" => Ok(DeduplicationGoldenRecordStatus::Postpone),
            "NOT_PROCESSED" => Ok(DeduplicationGoldenRecordStatus::NotProcessed),
            _ => Err(DbEnumParseError {
                enum_name: "DeduplicationGoldenRecordStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DeduplicationGoldenRecordStatus {
    fmt_as_db_str!();
}

// ============================================================================
// DEMOGRAPHICS
// ============================================================================

/// Registered sex of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "MALE")]
    Male,
    #[serde(rename = "FEMALE")]
    Female,
}

impl Sex {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Sex::Male => "MALE",
            Sex::Female => "FEMALE",
        }
    }
}

impl fmt::Display for Sex {
    fmt_as_db_str!();
}

/// Relationship of an individual to the head of their household.
///
/// `RemovedByCollision` is not a registration-time value: it is applied by
/// the merge task when an incoming individual loses a household collision
/// and is withdrawn instead of duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relationship {
    #[serde(rename = "HEAD")]
    Head,
    #[serde(rename = "WIFE_HUSBAND")]
    WifeHusband,
    #[serde(rename = "SON_DAUGHTER")]
    SonDaughter,
    #[serde(rename = "BROTHER_SISTER")]
    BrotherSister,
    #[serde(rename = "MOTHER_FATHER")]
    MotherFather,
    #[serde(rename = "AUNT_UNCLE")]
    AuntUncle,
    #[serde(rename = "GRANDMOTHER_GRANDFATHER")]
    GrandmotherGrandfather,
    #[serde(rename = "COUSIN")]
    Cousin,
    #[serde(rename = "NON_BENEFICIARY")]
    NonBeneficiary,
    #[serde(rename = "REMOVED_BY_COLLISION")]
    RemovedByCollision,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Relationship {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Relationship::Head => "HEAD",
            Relationship::WifeHusband => "WIFE_HUSBAND",
            Relationship::SonDaughter => "SON_DAUGHTER",
            Relationship::BrotherSister => "BROTHER_SISTER",
            Relationship::MotherFather => "MOTHER_FATHER",
            Relationship::AuntUncle => "AUNT_UNCLE",
            Relationship::GrandmotherGrandfather => "GRANDMOTHER_GRANDFATHER",
            Relationship::Cousin => "COUSIN",
            Relationship::NonBeneficiary => "NON_BENEFICIARY",
            Relationship::RemovedByCollision => "REMOVED_BY_COLLISION",
            Relationship::Unknown => "UNKNOWN",
        }
    }

    /// Whether this relationship counts toward household composition.
    pub fn is_beneficiary(&self) -> bool {
        !matches!(
            self,
            Relationship::NonBeneficiary | Relationship::RemovedByCollision
        )
    }
}

impl fmt::Display for Relationship {
    fmt_as_db_str!();
}

/// Collector role of an individual within a household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectorRole {
    #[serde(rename = "PRIMARY")]
    Primary,
    #[serde(rename = "ALTERNATE")]
    Alternate,
    #[serde(rename = "NO_ROLE")]
    NoRole,
}

impl CollectorRole {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CollectorRole::Primary => "PRIMARY",
            CollectorRole::Alternate => "ALTERNATE",
            CollectorRole::NoRole => "NO_ROLE",
        }
    }
}

impl fmt::Display for CollectorRole {
    fmt_as_db_str!();
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// Status of a payment within a payment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SENT_TO_PAYMENT_GATEWAY")]
    SentToPaymentGateway,
    #[serde(rename = "DISTRIBUTION_SUCCESS")]
    DistributionSuccess,
    #[serde(rename = "NOT_DISTRIBUTED")]
    NotDistributed,
    #[serde(rename = "TRANSACTION_ERRONEOUS")]
    TransactionErroneous,
}

impl PaymentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::SentToPaymentGateway => "SENT_TO_PAYMENT_GATEWAY",
            PaymentStatus::DistributionSuccess => "DISTRIBUTION_SUCCESS",
            PaymentStatus::NotDistributed => "NOT_DISTRIBUTED",
            PaymentStatus::TransactionErroneous => "TRANSACTION_ERRONEOUS",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fmt_as_db_str!();
}

// ============================================================================
// PROGRAM CONFIGURATION
// ============================================================================

/// Collision detection strategy configured per program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CollisionStrategy {
    /// Match pending households against canonical ones by identification key.
    #[serde(rename = "IDENTIFICATION_KEY")]
    IdentificationKey,
    /// Collision detection disabled; every pending household is promoted.
    #[default]
    #[serde(rename = "NONE")]
    None,
}

impl CollisionStrategy {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CollisionStrategy::IdentificationKey => "IDENTIFICATION_KEY",
            CollisionStrategy::None => "NONE",
        }
    }
}

impl fmt::Display for CollisionStrategy {
    fmt_as_db_str!();
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rdi_status_db_round_trip() {
        for status in [
            RdiStatus::Loading,
            RdiStatus::Deduplication,
            RdiStatus::DeduplicationFailed,
            RdiStatus::InReview,
            RdiStatus::Merging,
            RdiStatus::Merged,
            RdiStatus::MergeError,
            RdiStatus::Refused,
        ] {
            assert_eq!(RdiStatus::from_db_str(status.as_db_str()), Ok(status));
        }
    }

    #[test]
    fn test_rdi_status_exact_strings() {
        // Durable markers polled by other components; pinned by contract.
        assert_eq!(RdiStatus::DeduplicationFailed.as_db_str(), "DEDUPLICATION_FAILED");
        assert_eq!(RdiStatus::MergeError.as_db_str(), "MERGE_ERROR");
        assert_eq!(RdiStatus::InReview.as_db_str(), "IN_REVIEW");
    }

    #[test]
    fn test_rdi_status_serde_uses_db_strings() {
        let json = serde_json::to_string(&RdiStatus::MergeError).unwrap();
        assert_eq!(json, "\"MERGE_ERROR\"");
        let parsed: RdiStatus = serde_json::from_str("\"IN_REVIEW\"").unwrap();
        assert_eq!(parsed, RdiStatus::InReview);
    }

    #[test]
    fn test_rdi_status_invalid_string() {
        let err = RdiStatus::from_db_str("IMPORTING").unwrap_err();
        assert!(err.to_string().contains("IMPORTING"));
    }

    #[test]
    fn test_rdi_transitions_happy_path() {
        use RdiStatus::*;
        assert!(Loading.can_transition(Deduplication));
        assert!(Deduplication.can_transition(InReview));
        assert!(InReview.can_transition(Merging));
        assert!(Merging.can_transition(Merged));
    }

    #[test]
    fn test_rdi_transitions_failure_and_retry() {
        use RdiStatus::*;
        assert!(Deduplication.can_transition(DeduplicationFailed));
        assert!(DeduplicationFailed.can_transition(Deduplication));
        assert!(Merging.can_transition(MergeError));
        assert!(MergeError.can_transition(Merging));
    }

    #[test]
    fn test_rdi_transitions_rejected() {
        use RdiStatus::*;
        assert!(!Loading.can_transition(Merged));
        assert!(!Merged.can_transition(Merging));
        assert!(!Refused.can_transition(InReview));
        assert!(!InReview.can_transition(Merged));
    }

    #[test]
    fn test_dedup_statuses_exact_strings() {
        assert_eq!(
            DeduplicationBatchStatus::DuplicateInBatch.as_db_str(),
            "DUPLICATE_IN_BATCH"
        );
        assert_eq!(
            DeduplicationGoldenRecordStatus::NeedsAdjudication.as_db_str(),
            "NEEDS_ADJUDICATION"
        );
        assert_eq!(DeduplicationBatchStatus::default().as_db_str(), "NOT_PROCESSED");
        assert_eq!(
            DeduplicationGoldenRecordStatus::default().as_db_str(),
            "NOT_PROCESSED"
        );
    }

    #[test]
    fn test_relationship_beneficiary_filter() {
        assert!(Relationship::Head.is_beneficiary());
        assert!(Relationship::SonDaughter.is_beneficiary());
        assert!(!Relationship::NonBeneficiary.is_beneficiary());
        assert!(!Relationship::RemovedByCollision.is_beneficiary());
    }

    #[test]
    fn test_removed_by_collision_serde() {
        let json = serde_json::to_string(&Relationship::RemovedByCollision).unwrap();
        assert_eq!(json, "\"REMOVED_BY_COLLISION\"");
    }
}
