//! Identity types for HOPE entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// Per-entity ID aliases. Kept as aliases rather than newtypes so they read
// well in store signatures while staying interchangeable with raw Uuid keys.
pub type HouseholdId = EntityId;
pub type IndividualId = EntityId;
pub type RdiId = EntityId;
pub type ProgramId = EntityId;
pub type BusinessAreaId = EntityId;
pub type PaymentId = EntityId;
pub type PaymentPlanId = EntityId;
pub type RoleId = EntityId;
pub type SnapshotId = EntityId;

/// Lowercase hex SHA-1 digest (40 characters) persisted on payments
/// for tamper detection.
pub type SignatureHash = String;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}
