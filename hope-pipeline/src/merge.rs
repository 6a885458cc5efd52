//! Import merge task
//!
//! Promotes an approved import into the canonical population. Households
//! that collide with an existing canonical household (per the program's
//! collision strategy) are folded into it under the survivor's row lock;
//! everything else flips from pending to merged in place.
//!
//! A failure mid-merge marks the import MERGE_ERROR and leaves the
//! remaining pending rows untouched, so the merge can be retried after
//! the cause is fixed. Each household is one recovery unit.

use crate::collision::{detector_for, CollisionDetector};
use crate::recalculation::recalculate_composition;
use hope_core::{
    Household, HouseholdId, HopeResult, MergeError, MergePolicy, MergeStatus, Program, RdiId,
    RdiStatus, RegistrationDataImport, Relationship, StorageError,
};
use hope_storage::{HouseholdUpdate, IndividualUpdate, PopulationStore, RdiUpdate};
use tracing::{info, warn};

/// Counters reported after a successful merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Households promoted to canonical as new rows.
    pub households_created: usize,
    /// Incoming households folded into an existing canonical household.
    pub households_collided: usize,
    /// Individuals promoted to canonical.
    pub individuals_created: usize,
    /// Canonical individuals refreshed from a colliding re-registration.
    pub individuals_updated: usize,
    /// Incoming individuals withdrawn because they matched an existing
    /// member of the surviving household.
    pub individuals_removed_by_collision: usize,
}

/// The merge task for one deployment.
pub struct MergeTask {
    policy: MergePolicy,
}

impl MergeTask {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Merge one import into the canonical population.
    ///
    /// The import must be IN_REVIEW, or MERGE_ERROR for a retry. On
    /// success the import is MERGED and its counters reflect the merged
    /// rows; on failure it is MERGE_ERROR with the cause stored durably.
    pub fn merge_rdi(
        &self,
        store: &dyn PopulationStore,
        rdi_id: RdiId,
    ) -> HopeResult<MergeSummary> {
        let mut rdi = store.rdi_get(rdi_id)?.ok_or(StorageError::NotFound {
            entity: "RegistrationDataImport",
            id: rdi_id,
        })?;
        if !matches!(rdi.status, RdiStatus::InReview | RdiStatus::MergeError) {
            return Err(MergeError::NotReady {
                rdi_id,
                status: rdi.status.as_db_str().to_string(),
            }
            .into());
        }
        let program = store
            .program_get(rdi.program_id)?
            .ok_or(StorageError::NotFound {
                entity: "Program",
                id: rdi.program_id,
            })?;

        rdi.transition(RdiStatus::Merging)?;
        store.rdi_update(
            rdi_id,
            RdiUpdate {
                status: Some(RdiStatus::Merging),
                ..Default::default()
            },
        )?;
        info!(rdi = %rdi_id, program = %program.program_id, "merging import");

        let detector = detector_for(program.collision_strategy);
        match self.merge_pending(store, &rdi, &program, detector.as_ref()) {
            Ok(summary) => {
                rdi.transition(RdiStatus::Merged)?;
                store.rdi_update(
                    rdi_id,
                    RdiUpdate {
                        status: Some(RdiStatus::Merged),
                        // A retried import drops its old failure message.
                        error_message: Some(None),
                        number_of_households: Some(
                            (summary.households_created + summary.households_collided) as i64,
                        ),
                        number_of_individuals: Some(
                            (summary.individuals_created + summary.individuals_updated) as i64,
                        ),
                        ..Default::default()
                    },
                )?;
                info!(
                    rdi = %rdi_id,
                    created = summary.households_created,
                    collided = summary.households_collided,
                    "merge complete"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(rdi = %rdi_id, error = %err, "merge failed");
                let reason = err.to_string();
                store.rdi_update(
                    rdi_id,
                    RdiUpdate {
                        status: Some(RdiStatus::MergeError),
                        error_message: Some(Some(reason.clone())),
                        ..Default::default()
                    },
                )?;
                Err(MergeError::Failed { rdi_id, reason }.into())
            }
        }
    }

    fn merge_pending(
        &self,
        store: &dyn PopulationStore,
        rdi: &RegistrationDataImport,
        program: &Program,
        detector: &dyn CollisionDetector,
    ) -> HopeResult<MergeSummary> {
        let mut summary = MergeSummary::default();
        let mut touched: Vec<HouseholdId> = Vec::new();

        for household in store.households_by_rdi(rdi.rdi_id, MergeStatus::Pending)? {
            match detector.detect(store, &household)? {
                Some(existing_id) => {
                    self.fold_into_existing(store, rdi, &household, existing_id, &mut summary)?;
                    touched.push(existing_id);
                }
                None => {
                    self.promote(store, &household, &mut summary)?;
                    touched.push(household.household_id);
                }
            }
        }

        // Individuals without a household (external collectors) flip in place.
        for individual in store.individuals_by_rdi(rdi.rdi_id, MergeStatus::Pending)? {
            if individual.household_id.is_none() {
                store.individual_update(
                    individual.individual_id,
                    IndividualUpdate {
                        rdi_merge_status: Some(MergeStatus::Merged),
                        ..Default::default()
                    },
                )?;
                summary.individuals_created += 1;
            }
        }

        if program.recalculate_composition {
            for household_id in touched {
                recalculate_composition(store, household_id)?;
            }
        }
        Ok(summary)
    }

    /// Promote a pending household and its members to canonical.
    fn promote(
        &self,
        store: &dyn PopulationStore,
        household: &Household,
        summary: &mut MergeSummary,
    ) -> HopeResult<()> {
        store.household_update(
            household.household_id,
            HouseholdUpdate {
                rdi_merge_status: Some(MergeStatus::Merged),
                ..Default::default()
            },
        )?;
        summary.households_created += 1;
        for member in store.individuals_by_household(household.household_id)? {
            if member.rdi_merge_status == MergeStatus::Pending {
                store.individual_update(
                    member.individual_id,
                    IndividualUpdate {
                        rdi_merge_status: Some(MergeStatus::Merged),
                        ..Default::default()
                    },
                )?;
                summary.individuals_created += 1;
            }
        }
        Ok(())
    }

    /// Fold an incoming household into the canonical one it collides
    /// with. Runs under the survivor's row lock. The incoming staging
    /// household row is deleted; its members either refresh a matched
    /// existing member (and are kept withdrawn for audit) or join the
    /// survivor.
    fn fold_into_existing(
        &self,
        store: &dyn PopulationStore,
        rdi: &RegistrationDataImport,
        incoming: &Household,
        existing_id: HouseholdId,
        summary: &mut MergeSummary,
    ) -> HopeResult<()> {
        let lock = store.household_lock(existing_id)?;
        let _guard = lock.acquire()?;

        let mut existing = store
            .household_get(existing_id)?
            .ok_or(StorageError::NotFound {
                entity: "Household",
                id: existing_id,
            })?;
        existing.register_extra_rdi(rdi.rdi_id);

        let mut update = HouseholdUpdate {
            extra_rdis: Some(existing.extra_rdis.clone()),
            ..Default::default()
        };
        // The identification key is never overwritten; the policy governs
        // the rest of the contested fields.
        if self.policy.overwrites("village") {
            update.village = incoming.village.clone();
        }
        if self.policy.overwrites("address") {
            update.address = incoming.address.clone();
        }
        if self.policy.overwrites("residence_status") {
            update.residence_status = incoming.residence_status.clone();
        }
        if self.policy.overwrites("size") {
            let mut composition = existing.composition;
            composition.size = incoming.composition.size;
            update.composition = Some(composition);
        }
        store.household_update(existing_id, update)?;

        let existing_members = store.individuals_by_household(existing_id)?;
        let now = chrono::Utc::now();
        for member in store.individuals_by_household(incoming.household_id)? {
            if member.rdi_merge_status != MergeStatus::Pending {
                continue;
            }
            let matched = member.identification_key.as_deref().and_then(|key| {
                existing_members
                    .iter()
                    .find(|e| e.identification_key.as_deref() == Some(key) && !e.withdrawn)
            });
            match matched {
                Some(existing_member) => {
                    // Refresh the canonical member from the re-registration.
                    store.individual_update(
                        existing_member.individual_id,
                        IndividualUpdate {
                            full_name: Some(member.full_name.clone()),
                            phone_no: member.phone_no.clone(),
                            birth_date: Some(member.birth_date),
                            last_registration_date: Some(member.last_registration_date),
                            disability: Some(member.disability),
                            pregnant: member.pregnant,
                            ..Default::default()
                        },
                    )?;
                    summary.individuals_updated += 1;

                    let mut removed = member.clone();
                    removed.mark_removed_by_collision(rdi.rdi_id, now);
                    store.individual_update(
                        member.individual_id,
                        IndividualUpdate {
                            household_id: Some(existing_id),
                            withdrawn: Some(true),
                            relationship: Some(Relationship::RemovedByCollision),
                            internal_data: Some(removed.internal_data),
                            rdi_merge_status: Some(MergeStatus::Merged),
                            ..Default::default()
                        },
                    )?;
                    summary.individuals_removed_by_collision += 1;
                }
                None => {
                    store.individual_update(
                        member.individual_id,
                        IndividualUpdate {
                            household_id: Some(existing_id),
                            rdi_merge_status: Some(MergeStatus::Merged),
                            ..Default::default()
                        },
                    )?;
                    summary.individuals_created += 1;
                }
            }
        }

        // The staging household row has served its purpose.
        store.household_delete(incoming.household_id)?;
        summary.households_collided += 1;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
