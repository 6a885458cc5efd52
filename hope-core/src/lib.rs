//! HOPE Core - Entity Types
//!
//! Pure data structures for the population engine. All other crates depend
//! on this. This crate contains ONLY data types, configuration, and small
//! pure helpers - no orchestration logic.

pub mod age;
pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod signature;

pub use age::{age_in_years, AgeBand};
pub use config::{DeduplicationConfig, EngineConfig, MergePolicy, SnapshotConfig};
pub use entities::{
    BankAccountInfo, Document, Household, HouseholdComposition, Individual,
    IndividualRoleInHousehold, Payment, PaymentHouseholdSnapshot, PaymentPlan, Program,
    RegistrationDataImport,
};
pub use enums::{
    CollectorRole, CollisionStrategy, DbEnumParseError, DeduplicationBatchStatus,
    DeduplicationGoldenRecordStatus, MergeStatus, PaymentStatus, RdiStatus, Relationship, Sex,
};
pub use error::{
    CollisionError, ConfigError, DeduplicationError, HopeError, HopeResult, MergeError,
    StorageError, ValidationError,
};
pub use identity::{
    new_entity_id, BusinessAreaId, EntityId, HouseholdId, IndividualId, PaymentId, PaymentPlanId,
    ProgramId, RdiId, RoleId, SignatureHash, SnapshotId, Timestamp,
};
pub use signature::payment_signature;
