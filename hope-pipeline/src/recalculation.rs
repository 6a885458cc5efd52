//! Household composition recalculation
//!
//! Rebuilds a household's denormalized demographic counts from its live
//! member set. Runs under the household row lock so concurrent member
//! changes cannot interleave with the read-aggregate-write cycle.

use hope_core::{AgeBand, HouseholdId, HopeResult, MergeStatus, Sex, StorageError};
use hope_storage::{HouseholdUpdate, PopulationStore};
use tracing::debug;

/// Recalculate one household's composition and persist it if it changed.
///
/// Members count when they are canonical, not withdrawn, not flagged
/// duplicate, and hold a beneficiary relationship. Age bands are taken at
/// each member's last registration date. Returns the names of the fields
/// that changed; empty when the stored counts were already current or the
/// program has composition recalculation disabled.
pub fn recalculate_composition(
    store: &dyn PopulationStore,
    household_id: HouseholdId,
) -> HopeResult<Vec<&'static str>> {
    let household = store
        .household_get(household_id)?
        .ok_or(StorageError::NotFound {
            entity: "Household",
            id: household_id,
        })?;
    let program = store
        .program_get(household.program_id)?
        .ok_or(StorageError::NotFound {
            entity: "Program",
            id: household.program_id,
        })?;
    if !program.recalculate_composition {
        return Ok(Vec::new());
    }

    let lock = store.household_lock(household_id)?;
    let _guard = lock.acquire()?;

    // Re-read under the lock; the pre-lock read only located the program.
    let household = store
        .household_get(household_id)?
        .ok_or(StorageError::NotFound {
            entity: "Household",
            id: household_id,
        })?;

    let members = store.individuals_by_household(household_id)?;
    let mut fresh = hope_core::HouseholdComposition::default();
    for member in &members {
        if member.rdi_merge_status != MergeStatus::Merged || !member.is_active_beneficiary() {
            continue;
        }
        let band = AgeBand::for_age(member.age());
        fresh.record(member.sex, band, member.disability);
        if member.sex == Sex::Female && member.pregnant == Some(true) {
            fresh.pregnant_count += 1;
        }
    }

    if let Some(head_id) = household.head_of_household {
        if let Some(head) = members.iter().find(|m| m.individual_id == head_id) {
            if head.is_active_beneficiary() && AgeBand::for_age(head.age()).is_child() {
                fresh.child_hoh = true;
                fresh.fchild_hoh = head.sex == Sex::Female;
            }
        }
    }

    let changed = household.composition.diff(&fresh);
    if changed.is_empty() {
        return Ok(changed);
    }

    debug!(
        household = %household_id,
        fields = changed.len(),
        "household composition changed"
    );
    store.household_update(
        household_id,
        HouseholdUpdate {
            composition: Some(fresh),
            ..Default::default()
        },
    )?;
    Ok(changed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hope_core::{new_entity_id, Household, Individual, Program, Relationship};
    use hope_storage::InMemoryStore;

    fn setup() -> (InMemoryStore, Program, Household) {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "p");
        store.program_insert(&program).unwrap();
        let mut hh =
            Household::pending(program.program_id, program.business_area_id, new_entity_id());
        hh.rdi_merge_status = MergeStatus::Merged;
        store.household_insert(&hh).unwrap();
        (store, program, hh)
    }

    fn member(
        program: &Program,
        hh: &Household,
        sex: Sex,
        birth: NaiveDate,
        registered: NaiveDate,
    ) -> Individual {
        let mut ind = Individual::pending(
            program.program_id,
            program.business_area_id,
            hh.rdi_id,
            "Member",
            sex,
            birth,
        )
        .in_household(hh.household_id, Relationship::SonDaughter);
        ind.rdi_merge_status = MergeStatus::Merged;
        ind.last_registration_date = registered;
        ind
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_recalculation_counts_members_by_band() {
        let (store, program, hh) = setup();
        let registered = date(2024, 1, 1);
        store
            .individual_insert(&member(&program, &hh, Sex::Female, date(2020, 3, 1), registered))
            .unwrap();
        store
            .individual_insert(&member(&program, &hh, Sex::Male, date(1980, 3, 1), registered))
            .unwrap();
        let mut disabled = member(&program, &hh, Sex::Female, date(1950, 3, 1), registered);
        disabled.disability = true;
        store.individual_insert(&disabled).unwrap();

        let changed = recalculate_composition(&store, hh.household_id).unwrap();
        assert!(changed.contains(&"size"));

        let comp = store
            .household_get(hh.household_id)
            .unwrap()
            .unwrap()
            .composition;
        assert_eq!(comp.female_age_group_0_5_count, 1);
        assert_eq!(comp.male_age_group_18_59_count, 1);
        assert_eq!(comp.female_age_group_60_count, 1);
        assert_eq!(comp.female_age_group_60_disabled_count, 1);
        assert_eq!(comp.children_count, 1);
        assert_eq!(comp.adults_count, 2);
        assert_eq!(comp.size, 3);
        assert_eq!(comp.band_total(), comp.size);
    }

    #[test]
    fn test_recalculation_idempotent() {
        let (store, program, hh) = setup();
        store
            .individual_insert(&member(
                &program,
                &hh,
                Sex::Male,
                date(1990, 1, 1),
                date(2024, 1, 1),
            ))
            .unwrap();

        let first = recalculate_composition(&store, hh.household_id).unwrap();
        assert!(!first.is_empty());
        let second = recalculate_composition(&store, hh.household_id).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_recalculation_skips_withdrawn_duplicate_and_pending() {
        let (store, program, hh) = setup();
        let registered = date(2024, 1, 1);

        let mut withdrawn = member(&program, &hh, Sex::Male, date(1990, 1, 1), registered);
        withdrawn.withdrawn = true;
        store.individual_insert(&withdrawn).unwrap();

        let mut duplicate = member(&program, &hh, Sex::Male, date(1990, 1, 1), registered);
        duplicate.duplicate = true;
        store.individual_insert(&duplicate).unwrap();

        let mut pending = member(&program, &hh, Sex::Male, date(1990, 1, 1), registered);
        pending.rdi_merge_status = MergeStatus::Pending;
        store.individual_insert(&pending).unwrap();

        let mut non_beneficiary = member(&program, &hh, Sex::Male, date(1990, 1, 1), registered);
        non_beneficiary.relationship = Relationship::NonBeneficiary;
        store.individual_insert(&non_beneficiary).unwrap();

        store
            .individual_insert(&member(&program, &hh, Sex::Male, date(1990, 1, 1), registered))
            .unwrap();

        recalculate_composition(&store, hh.household_id).unwrap();
        let comp = store
            .household_get(hh.household_id)
            .unwrap()
            .unwrap()
            .composition;
        assert_eq!(comp.size, 1);
    }

    #[test]
    fn test_recalculation_pregnant_and_child_head() {
        let (store, program, hh) = setup();
        let registered = date(2024, 1, 1);

        let mut pregnant = member(&program, &hh, Sex::Female, date(1995, 1, 1), registered);
        pregnant.pregnant = Some(true);
        store.individual_insert(&pregnant).unwrap();

        let mut head = member(&program, &hh, Sex::Female, date(2010, 1, 1), registered);
        head.relationship = Relationship::Head;
        store.individual_insert(&head).unwrap();
        store
            .household_update(
                hh.household_id,
                HouseholdUpdate {
                    head_of_household: Some(head.individual_id),
                    ..Default::default()
                },
            )
            .unwrap();

        recalculate_composition(&store, hh.household_id).unwrap();
        let comp = store
            .household_get(hh.household_id)
            .unwrap()
            .unwrap()
            .composition;
        assert_eq!(comp.pregnant_count, 1);
        assert!(comp.child_hoh);
        assert!(comp.fchild_hoh);
    }

    #[test]
    fn test_recalculation_disabled_per_program() {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "p").without_composition_recalculation();
        store.program_insert(&program).unwrap();
        let mut hh =
            Household::pending(program.program_id, program.business_area_id, new_entity_id());
        hh.rdi_merge_status = MergeStatus::Merged;
        store.household_insert(&hh).unwrap();
        store
            .individual_insert(&member(
                &program,
                &hh,
                Sex::Male,
                date(1990, 1, 1),
                date(2024, 1, 1),
            ))
            .unwrap();

        let changed = recalculate_composition(&store, hh.household_id).unwrap();
        assert!(changed.is_empty());
        let comp = store
            .household_get(hh.household_id)
            .unwrap()
            .unwrap()
            .composition;
        assert_eq!(comp.size, 0);
    }

    #[test]
    fn test_recalculation_missing_household_errors() {
        let store = InMemoryStore::new();
        let err = recalculate_composition(&store, new_entity_id()).unwrap_err();
        assert!(err.to_string().contains("Entity not found"));
    }
}
