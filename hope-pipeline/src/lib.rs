//! HOPE Pipeline - Population Engine Services
//!
//! The services that move registration data through its lifecycle:
//!
//! - [`collision`]: match incoming households against canonical ones by
//!   identification key
//! - [`deduplication`]: batch and golden-record duplicate detection with
//!   threshold enforcement
//! - [`merge`]: promote an approved import into the canonical population
//! - [`recalculation`]: rebuild denormalized household composition counts
//! - [`snapshot`]: capture household state for payment plans and sign
//!   payments
//!
//! All services run against a [`hope_storage::PopulationStore`] and are
//! synchronous; concurrency control is delegated to the store's row locks.

pub mod collision;
pub mod deduplication;
pub mod merge;
pub mod recalculation;
pub mod snapshot;

pub use collision::{detector_for, CollisionDetector, IdentificationKeyDetector, NoopDetector};
pub use deduplication::{
    check_duplicates_threshold, duplicated_document_signatures, BiometricProvider,
    DeduplicationEngine, DeduplicationOutcome, SimilarityPair,
};
pub use merge::{MergeSummary, MergeTask};
pub use recalculation::recalculate_composition;
pub use snapshot::{create_payment_plan_snapshot_data, SnapshotReport};
