//! Collision detection
//!
//! Decides whether an incoming pending household is a re-registration of a
//! household already in the canonical population. Detection runs during
//! merge, per household, against canonical (merged, non-withdrawn) rows of
//! the same program.

use hope_core::{CollisionError, CollisionStrategy, Household, HouseholdId, HopeResult};
use hope_storage::PopulationStore;
use tracing::debug;

// ============================================================================
// DETECTOR TRAIT
// ============================================================================

/// Strategy seam for collision detection. One detector instance serves a
/// whole merge run.
pub trait CollisionDetector: Send + Sync {
    /// The canonical household the incoming one collides with, if any.
    ///
    /// Returns an error when the population contains more than one
    /// canonical candidate for the same key; that is a data-integrity
    /// failure the merge must not paper over.
    fn detect(
        &self,
        store: &dyn PopulationStore,
        incoming: &Household,
    ) -> HopeResult<Option<HouseholdId>>;
}

/// Detector for programs with no collision strategy. Never matches.
#[derive(Debug, Default)]
pub struct NoopDetector;

impl CollisionDetector for NoopDetector {
    fn detect(
        &self,
        _store: &dyn PopulationStore,
        _incoming: &Household,
    ) -> HopeResult<Option<HouseholdId>> {
        Ok(None)
    }
}

/// Detector matching on the household identification key. Households
/// without a key never collide.
#[derive(Debug, Default)]
pub struct IdentificationKeyDetector;

impl CollisionDetector for IdentificationKeyDetector {
    fn detect(
        &self,
        store: &dyn PopulationStore,
        incoming: &Household,
    ) -> HopeResult<Option<HouseholdId>> {
        let key = match incoming.identification_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Ok(None),
        };

        let candidates = store.household_find_by_identification_key(incoming.program_id, key)?;
        match candidates.as_slice() {
            [] => Ok(None),
            [existing] => {
                debug!(
                    incoming = %incoming.household_id,
                    existing = %existing.household_id,
                    key,
                    "household collision detected"
                );
                Ok(Some(existing.household_id))
            }
            many => Err(CollisionError::AmbiguousMatch {
                key: key.to_string(),
                candidate_ids: many.iter().map(|h| h.household_id).collect(),
            }
            .into()),
        }
    }
}

/// The detector a program's collision strategy calls for.
pub fn detector_for(strategy: CollisionStrategy) -> Box<dyn CollisionDetector> {
    match strategy {
        CollisionStrategy::IdentificationKey => Box::new(IdentificationKeyDetector),
        CollisionStrategy::None => Box::new(NoopDetector),
    }
}

// =============================================================================
// TESTS
// =============================================================================
