//! HOPE Test Utilities
//!
//! Centralized test infrastructure for the HOPE workspace:
//! - Proptest generators for entity types
//! - Test fixtures for common population scenarios
//! - Custom assertions for population invariants

// Re-export the in-memory store from its source crate
pub use hope_storage::InMemoryStore;

// Re-export core types for convenience
pub use hope_core::{
    age_in_years, new_entity_id, payment_signature, AgeBand, CollectorRole, CollisionStrategy,
    DeduplicationBatchStatus, DeduplicationConfig, DeduplicationGoldenRecordStatus, Document,
    EngineConfig, Household, HouseholdComposition, HouseholdId, HopeError, HopeResult, Individual,
    IndividualId, IndividualRoleInHousehold, MergePolicy, MergeStatus, Payment,
    PaymentHouseholdSnapshot, PaymentPlan, PaymentStatus, Program, ProgramId, RdiId, RdiStatus,
    RegistrationDataImport, Relationship, Sex, SnapshotConfig, StorageError, Timestamp,
};

use chrono::NaiveDate;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating HOPE entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a valid UUIDv7 (timestamp-sortable).
    pub fn arb_uuid_v7() -> impl Strategy<Value = Uuid> {
        Just(()).prop_map(|_| Uuid::now_v7())
    }

    /// Generate a birth date between 1930 and 2025.
    pub fn arb_birth_date() -> impl Strategy<Value = NaiveDate> {
        (1930i32..2026, 1u32..13, 1u32..29).prop_map(|(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| {
                NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
            })
        })
    }

    // === Enum Generators ===

    /// Generate a Sex variant.
    pub fn arb_sex() -> impl Strategy<Value = Sex> {
        prop_oneof![Just(Sex::Female), Just(Sex::Male)]
    }

    /// Generate a beneficiary-counting Relationship variant.
    pub fn arb_beneficiary_relationship() -> impl Strategy<Value = Relationship> {
        prop_oneof![
            Just(Relationship::Head),
            Just(Relationship::WifeHusband),
            Just(Relationship::SonDaughter),
            Just(Relationship::BrotherSister),
            Just(Relationship::MotherFather),
            Just(Relationship::AuntUncle),
            Just(Relationship::GrandmotherGrandfather),
            Just(Relationship::Cousin),
            Just(Relationship::Unknown),
        ]
    }

    /// Generate any RdiStatus variant.
    pub fn arb_rdi_status() -> impl Strategy<Value = RdiStatus> {
        prop_oneof![
            Just(RdiStatus::Loading),
            Just(RdiStatus::Deduplication),
            Just(RdiStatus::DeduplicationFailed),
            Just(RdiStatus::InReview),
            Just(RdiStatus::Merging),
            Just(RdiStatus::Merged),
            Just(RdiStatus::MergeError),
            Just(RdiStatus::Refused),
        ]
    }

    // === Entity Generators ===

    /// Generate a document valid for deduplication.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        ("[A-Z0-9]{6,10}", prop_oneof![Just("UKR"), Just("AFG"), Just("SDN")]).prop_map(
            |(number, country)| Document {
                type_key: "national_id".to_string(),
                number,
                country: country.to_string(),
                valid_for_deduplication: true,
            },
        )
    }

    /// Generate a pending individual for an import.
    pub fn arb_pending_individual(
        program_id: ProgramId,
        business_area_id: Uuid,
        rdi_id: RdiId,
    ) -> impl Strategy<Value = Individual> {
        ("[A-Za-z]{2,12} [A-Za-z]{2,12}", arb_sex(), arb_birth_date()).prop_map(
            move |(full_name, sex, birth_date)| {
                Individual::pending(
                    program_id,
                    business_area_id,
                    rdi_id,
                    &full_name,
                    sex,
                    birth_date,
                )
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common population scenarios.

    use super::*;
    use hope_storage::PopulationStore;

    /// A seeded store with one program and one import ready for loading.
    pub struct PopulationFixture {
        pub store: InMemoryStore,
        pub program: Program,
        pub rdi: RegistrationDataImport,
    }

    /// Program with collision detection by identification key, plus an
    /// import in LOADING.
    pub fn population(strategy: CollisionStrategy) -> PopulationFixture {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "fixture-program")
            .with_collision_strategy(strategy);
        store.program_insert(&program).expect("seed program");
        let rdi = RegistrationDataImport::new(
            "fixture-import",
            program.business_area_id,
            program.program_id,
        );
        store.rdi_insert(&rdi).expect("seed rdi");
        PopulationFixture {
            store,
            program,
            rdi,
        }
    }

    impl PopulationFixture {
        /// Add a pending household with an identification key.
        pub fn pending_household(&self, key: Option<&str>) -> Household {
            let mut hh = Household::pending(
                self.program.program_id,
                self.program.business_area_id,
                self.rdi.rdi_id,
            );
            if let Some(key) = key {
                hh.identification_key = Some(key.to_string());
            }
            self.store.household_insert(&hh).expect("seed household");
            hh
        }

        /// Add a pending member of a household.
        pub fn pending_member(
            &self,
            household: &Household,
            name: &str,
            sex: Sex,
            birth_date: NaiveDate,
            relationship: Relationship,
        ) -> Individual {
            let ind = Individual::pending(
                self.program.program_id,
                self.program.business_area_id,
                self.rdi.rdi_id,
                name,
                sex,
                birth_date,
            )
            .in_household(household.household_id, relationship);
            self.store.individual_insert(&ind).expect("seed individual");
            ind
        }

        /// Add an already-canonical household from a previous import.
        pub fn canonical_household(&self, key: Option<&str>) -> Household {
            let mut hh = Household::pending(
                self.program.program_id,
                self.program.business_area_id,
                new_entity_id(),
            );
            if let Some(key) = key {
                hh.identification_key = Some(key.to_string());
            }
            hh.rdi_merge_status = MergeStatus::Merged;
            self.store.household_insert(&hh).expect("seed household");
            hh
        }

        /// Add an already-canonical member of a household.
        pub fn canonical_member(
            &self,
            household: &Household,
            name: &str,
            sex: Sex,
            birth_date: NaiveDate,
            relationship: Relationship,
        ) -> Individual {
            let mut ind = Individual::pending(
                self.program.program_id,
                self.program.business_area_id,
                household.rdi_id,
                name,
                sex,
                birth_date,
            )
            .in_household(household.household_id, relationship);
            ind.rdi_merge_status = MergeStatus::Merged;
            self.store.individual_insert(&ind).expect("seed individual");
            ind
        }
    }

    /// A mid-1990 birth date, an adult in any recent program.
    pub fn adult_birth_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 6, 15).expect("valid date")
    }

    /// A 2020 birth date, a small child in any recent program.
    pub fn child_birth_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 15).expect("valid date")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for population invariants.

    use super::*;

    /// Assert the per-band counts of a composition sum to its size.
    pub fn assert_composition_consistent(composition: &HouseholdComposition) {
        assert_eq!(
            composition.band_total(),
            composition.size,
            "band counts must sum to household size"
        );
        assert_eq!(
            composition.children_count + composition.adults_count,
            composition.size,
            "children + adults must equal household size"
        );
    }

    /// Assert a household holds at most one live PRIMARY and one live
    /// ALTERNATE collector role.
    pub fn assert_role_invariant(roles: &[IndividualRoleInHousehold]) {
        let primaries = roles
            .iter()
            .filter(|r| r.role == CollectorRole::Primary)
            .count();
        let alternates = roles
            .iter()
            .filter(|r| r.role == CollectorRole::Alternate)
            .count();
        assert!(primaries <= 1, "more than one PRIMARY collector");
        assert!(alternates <= 1, "more than one ALTERNATE collector");
    }
}

// =============================================================================
// TESTS
// =============================================================================
