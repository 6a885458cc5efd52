//! HOPE Storage - Population Store Trait and In-Memory Implementation
//!
//! Defines the storage abstraction the pipeline runs against. Production
//! deployments back this trait with the relational database; the in-memory
//! implementation here serves tests and provides the reference semantics
//! for row locking and keyed queries.

use hope_core::{
    CollectorRole, DeduplicationBatchStatus, DeduplicationGoldenRecordStatus, Household,
    HouseholdComposition, HouseholdId, HopeResult, Individual, IndividualId,
    IndividualRoleInHousehold, MergeStatus, Payment, PaymentHouseholdSnapshot, PaymentId,
    PaymentPlan, PaymentPlanId, Program, ProgramId, RdiId, RdiStatus, RegistrationDataImport,
    Relationship, SignatureHash, StorageError,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Update payload for registration data imports.
#[derive(Debug, Clone, Default)]
pub struct RdiUpdate {
    pub status: Option<RdiStatus>,
    /// Outer `Option` is "touch the column at all"; the inner value is
    /// what to store, so `Some(None)` clears a stale failure message.
    pub error_message: Option<Option<String>>,
    pub number_of_households: Option<i64>,
    pub number_of_individuals: Option<i64>,
}

/// Update payload for households.
#[derive(Debug, Clone, Default)]
pub struct HouseholdUpdate {
    pub village: Option<String>,
    pub address: Option<String>,
    pub residence_status: Option<String>,
    pub head_of_household: Option<IndividualId>,
    pub composition: Option<HouseholdComposition>,
    pub extra_rdis: Option<Vec<RdiId>>,
    pub rdi_merge_status: Option<MergeStatus>,
    pub withdrawn: Option<bool>,
    pub internal_data: Option<serde_json::Value>,
}

/// Update payload for individuals.
#[derive(Debug, Clone, Default)]
pub struct IndividualUpdate {
    pub household_id: Option<HouseholdId>,
    pub full_name: Option<String>,
    pub phone_no: Option<String>,
    pub relationship: Option<Relationship>,
    pub disability: Option<bool>,
    pub pregnant: Option<bool>,
    pub birth_date: Option<NaiveDate>,
    pub last_registration_date: Option<NaiveDate>,
    pub withdrawn: Option<bool>,
    pub duplicate: Option<bool>,
    pub rdi_merge_status: Option<MergeStatus>,
    pub deduplication_batch_status: Option<DeduplicationBatchStatus>,
    pub deduplication_batch_results: Option<serde_json::Value>,
    pub deduplication_golden_record_status: Option<DeduplicationGoldenRecordStatus>,
    pub deduplication_golden_record_results: Option<serde_json::Value>,
    pub internal_data: Option<serde_json::Value>,
}

/// Update payload for payments.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub signature_hash: Option<SignatureHash>,
    pub entitlement_quantity: Option<String>,
    pub transaction_reference_id: Option<String>,
}

// ============================================================================
// ROW LOCK
// ============================================================================

/// Handle to a household's row lock (select-for-update analog). Obtained
/// from the store, acquired by the caller for the duration of a
/// read-aggregate-write cycle.
#[derive(Debug, Clone)]
pub struct HouseholdLock(Arc<Mutex<()>>);

/// Guard proving the household row lock is held.
#[derive(Debug)]
pub struct HouseholdRowGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl HouseholdLock {
    /// Block until the row lock is held.
    pub fn acquire(&self) -> HopeResult<HouseholdRowGuard<'_>> {
        let guard = self.0.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(HouseholdRowGuard { _guard: guard })
    }
}

// ============================================================================
// POPULATION STORE TRAIT
// ============================================================================

/// Storage trait for the population engine. Implementations provide
/// persistence for programs, imports, households, individuals, roles,
/// payments, and snapshots, plus the keyed queries the pipeline needs.
pub trait PopulationStore: Send + Sync {
    // === Program Operations ===

    fn program_insert(&self, p: &Program) -> HopeResult<()>;
    fn program_get(&self, id: ProgramId) -> HopeResult<Option<Program>>;

    // === Registration Data Import Operations ===

    fn rdi_insert(&self, r: &RegistrationDataImport) -> HopeResult<()>;
    fn rdi_get(&self, id: RdiId) -> HopeResult<Option<RegistrationDataImport>>;
    fn rdi_update(&self, id: RdiId, update: RdiUpdate) -> HopeResult<()>;

    // === Household Operations ===

    fn household_insert(&self, h: &Household) -> HopeResult<()>;
    fn household_get(&self, id: HouseholdId) -> HopeResult<Option<Household>>;
    fn household_update(&self, id: HouseholdId, update: HouseholdUpdate) -> HopeResult<()>;
    /// Remove a household row. Only used for pending staging records that
    /// lost a collision; canonical households are withdrawn, never deleted.
    fn household_delete(&self, id: HouseholdId) -> HopeResult<()>;
    /// Canonical (merged, non-withdrawn) households in a program sharing an
    /// identification key.
    fn household_find_by_identification_key(
        &self,
        program_id: ProgramId,
        key: &str,
    ) -> HopeResult<Vec<Household>>;
    fn households_by_rdi(&self, rdi_id: RdiId, status: MergeStatus) -> HopeResult<Vec<Household>>;
    /// Row lock handle for serializing recalculation on one household.
    fn household_lock(&self, id: HouseholdId) -> HopeResult<HouseholdLock>;

    // === Individual Operations ===

    fn individual_insert(&self, i: &Individual) -> HopeResult<()>;
    fn individual_get(&self, id: IndividualId) -> HopeResult<Option<Individual>>;
    fn individual_update(&self, id: IndividualId, update: IndividualUpdate) -> HopeResult<()>;
    fn individuals_by_household(&self, household_id: HouseholdId) -> HopeResult<Vec<Individual>>;
    fn individuals_by_rdi(&self, rdi_id: RdiId, status: MergeStatus)
        -> HopeResult<Vec<Individual>>;
    fn individuals_by_program(
        &self,
        program_id: ProgramId,
        status: MergeStatus,
    ) -> HopeResult<Vec<Individual>>;

    // === Collector Role Operations ===

    /// Assign a collector role within a household. Enforces the invariant
    /// that at most one live PRIMARY and one live ALTERNATE exist per
    /// household: an existing holder of the same role is demoted rather
    /// than duplicated.
    fn role_assign(
        &self,
        household_id: HouseholdId,
        individual_id: IndividualId,
        role: CollectorRole,
    ) -> HopeResult<()>;
    fn roles_by_household(
        &self,
        household_id: HouseholdId,
    ) -> HopeResult<Vec<IndividualRoleInHousehold>>;

    // === Payment Operations ===

    fn payment_plan_insert(&self, p: &PaymentPlan) -> HopeResult<()>;
    fn payment_plan_get(&self, id: PaymentPlanId) -> HopeResult<Option<PaymentPlan>>;
    fn payment_insert(&self, p: &Payment) -> HopeResult<()>;
    fn payment_get(&self, id: PaymentId) -> HopeResult<Option<Payment>>;
    fn payment_update(&self, id: PaymentId, update: PaymentUpdate) -> HopeResult<()>;
    /// Payments of a plan in ascending id order (UUIDv7, so creation order).
    fn payments_by_plan_ordered(&self, plan_id: PaymentPlanId) -> HopeResult<Vec<Payment>>;
    fn snapshot_insert(&self, s: &PaymentHouseholdSnapshot) -> HopeResult<()>;
    fn snapshot_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> HopeResult<Option<PaymentHouseholdSnapshot>>;
    fn snapshot_exists(&self, payment_id: PaymentId) -> HopeResult<bool>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory population store. Reference implementation for tests and the
/// semantics contract for database-backed implementations.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    programs: Arc<RwLock<HashMap<Uuid, Program>>>,
    rdis: Arc<RwLock<HashMap<Uuid, RegistrationDataImport>>>,
    households: Arc<RwLock<HashMap<Uuid, Household>>>,
    individuals: Arc<RwLock<HashMap<Uuid, Individual>>>,
    roles: Arc<RwLock<HashMap<Uuid, IndividualRoleInHousehold>>>,
    payment_plans: Arc<RwLock<HashMap<Uuid, PaymentPlan>>>,
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
    snapshots: Arc<RwLock<HashMap<Uuid, PaymentHouseholdSnapshot>>>,
    row_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

fn read_table<T>(table: &RwLock<HashMap<Uuid, T>>) -> HopeResult<RwLockReadGuard<'_, HashMap<Uuid, T>>> {
    table.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write_table<T>(
    table: &RwLock<HashMap<Uuid, T>>,
) -> HopeResult<RwLockWriteGuard<'_, HashMap<Uuid, T>>> {
    table.write().map_err(|_| StorageError::LockPoisoned.into())
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) -> HopeResult<()> {
        write_table(&self.programs)?.clear();
        write_table(&self.rdis)?.clear();
        write_table(&self.households)?.clear();
        write_table(&self.individuals)?.clear();
        write_table(&self.roles)?.clear();
        write_table(&self.payment_plans)?.clear();
        write_table(&self.payments)?.clear();
        write_table(&self.snapshots)?.clear();
        Ok(())
    }

    /// Count of stored households.
    pub fn household_count(&self) -> usize {
        self.households.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Count of stored individuals.
    pub fn individual_count(&self) -> usize {
        self.individuals.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Count of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().map(|t| t.len()).unwrap_or(0)
    }
}

impl PopulationStore for InMemoryStore {
    fn program_insert(&self, p: &Program) -> HopeResult<()> {
        write_table(&self.programs)?.insert(p.program_id, p.clone());
        Ok(())
    }

    fn program_get(&self, id: ProgramId) -> HopeResult<Option<Program>> {
        Ok(read_table(&self.programs)?.get(&id).cloned())
    }

    fn rdi_insert(&self, r: &RegistrationDataImport) -> HopeResult<()> {
        write_table(&self.rdis)?.insert(r.rdi_id, r.clone());
        Ok(())
    }

    fn rdi_get(&self, id: RdiId) -> HopeResult<Option<RegistrationDataImport>> {
        Ok(read_table(&self.rdis)?.get(&id).cloned())
    }

    fn rdi_update(&self, id: RdiId, update: RdiUpdate) -> HopeResult<()> {
        let mut table = write_table(&self.rdis)?;
        let rdi = table.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "RegistrationDataImport",
            id,
        })?;
        if let Some(status) = update.status {
            rdi.status = status;
        }
        if let Some(message) = update.error_message {
            rdi.error_message = message;
        }
        if let Some(n) = update.number_of_households {
            rdi.number_of_households = n;
        }
        if let Some(n) = update.number_of_individuals {
            rdi.number_of_individuals = n;
        }
        rdi.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn household_insert(&self, h: &Household) -> HopeResult<()> {
        write_table(&self.households)?.insert(h.household_id, h.clone());
        Ok(())
    }

    fn household_get(&self, id: HouseholdId) -> HopeResult<Option<Household>> {
        Ok(read_table(&self.households)?.get(&id).cloned())
    }

    fn household_update(&self, id: HouseholdId, update: HouseholdUpdate) -> HopeResult<()> {
        let mut table = write_table(&self.households)?;
        let hh = table.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "Household",
            id,
        })?;
        if let Some(village) = update.village {
            hh.village = Some(village);
        }
        if let Some(address) = update.address {
            hh.address = Some(address);
        }
        if let Some(residence_status) = update.residence_status {
            hh.residence_status = Some(residence_status);
        }
        if let Some(head) = update.head_of_household {
            hh.head_of_household = Some(head);
        }
        if let Some(composition) = update.composition {
            hh.composition = composition;
        }
        if let Some(extra_rdis) = update.extra_rdis {
            hh.extra_rdis = extra_rdis;
        }
        if let Some(status) = update.rdi_merge_status {
            hh.rdi_merge_status = status;
        }
        if let Some(withdrawn) = update.withdrawn {
            hh.withdrawn = withdrawn;
        }
        if let Some(internal_data) = update.internal_data {
            hh.internal_data = internal_data;
        }
        hh.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn household_delete(&self, id: HouseholdId) -> HopeResult<()> {
        write_table(&self.households)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| {
                StorageError::NotFound {
                    entity: "Household",
                    id,
                }
                .into()
            })
    }

    fn household_find_by_identification_key(
        &self,
        program_id: ProgramId,
        key: &str,
    ) -> HopeResult<Vec<Household>> {
        let mut found: Vec<Household> = read_table(&self.households)?
            .values()
            .filter(|h| {
                h.program_id == program_id
                    && h.rdi_merge_status == MergeStatus::Merged
                    && !h.withdrawn
                    && h.identification_key.as_deref() == Some(key)
            })
            .cloned()
            .collect();
        found.sort_by_key(|h| h.household_id);
        Ok(found)
    }

    fn households_by_rdi(&self, rdi_id: RdiId, status: MergeStatus) -> HopeResult<Vec<Household>> {
        let mut found: Vec<Household> = read_table(&self.households)?
            .values()
            .filter(|h| h.rdi_id == rdi_id && h.rdi_merge_status == status)
            .cloned()
            .collect();
        found.sort_by_key(|h| h.household_id);
        Ok(found)
    }

    fn household_lock(&self, id: HouseholdId) -> HopeResult<HouseholdLock> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        let lock = locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(())));
        Ok(HouseholdLock(Arc::clone(lock)))
    }

    fn individual_insert(&self, i: &Individual) -> HopeResult<()> {
        write_table(&self.individuals)?.insert(i.individual_id, i.clone());
        Ok(())
    }

    fn individual_get(&self, id: IndividualId) -> HopeResult<Option<Individual>> {
        Ok(read_table(&self.individuals)?.get(&id).cloned())
    }

    fn individual_update(&self, id: IndividualId, update: IndividualUpdate) -> HopeResult<()> {
        let mut table = write_table(&self.individuals)?;
        let ind = table.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "Individual",
            id,
        })?;
        if let Some(household_id) = update.household_id {
            ind.household_id = Some(household_id);
        }
        if let Some(full_name) = update.full_name {
            ind.full_name = full_name;
        }
        if let Some(phone_no) = update.phone_no {
            ind.phone_no = Some(phone_no);
        }
        if let Some(relationship) = update.relationship {
            ind.relationship = relationship;
        }
        if let Some(disability) = update.disability {
            ind.disability = disability;
        }
        if let Some(pregnant) = update.pregnant {
            ind.pregnant = Some(pregnant);
        }
        if let Some(birth_date) = update.birth_date {
            ind.birth_date = birth_date;
        }
        if let Some(date) = update.last_registration_date {
            ind.last_registration_date = date;
        }
        if let Some(withdrawn) = update.withdrawn {
            ind.withdrawn = withdrawn;
        }
        if let Some(duplicate) = update.duplicate {
            ind.duplicate = duplicate;
        }
        if let Some(status) = update.rdi_merge_status {
            ind.rdi_merge_status = status;
        }
        if let Some(status) = update.deduplication_batch_status {
            ind.deduplication_batch_status = status;
        }
        if let Some(results) = update.deduplication_batch_results {
            ind.deduplication_batch_results = results;
        }
        if let Some(status) = update.deduplication_golden_record_status {
            ind.deduplication_golden_record_status = status;
        }
        if let Some(results) = update.deduplication_golden_record_results {
            ind.deduplication_golden_record_results = results;
        }
        if let Some(internal_data) = update.internal_data {
            ind.internal_data = internal_data;
        }
        ind.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn individuals_by_household(&self, household_id: HouseholdId) -> HopeResult<Vec<Individual>> {
        let mut found: Vec<Individual> = read_table(&self.individuals)?
            .values()
            .filter(|i| i.household_id == Some(household_id))
            .cloned()
            .collect();
        found.sort_by_key(|i| i.individual_id);
        Ok(found)
    }

    fn individuals_by_rdi(
        &self,
        rdi_id: RdiId,
        status: MergeStatus,
    ) -> HopeResult<Vec<Individual>> {
        let mut found: Vec<Individual> = read_table(&self.individuals)?
            .values()
            .filter(|i| i.rdi_id == rdi_id && i.rdi_merge_status == status)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.individual_id);
        Ok(found)
    }

    fn individuals_by_program(
        &self,
        program_id: ProgramId,
        status: MergeStatus,
    ) -> HopeResult<Vec<Individual>> {
        let mut found: Vec<Individual> = read_table(&self.individuals)?
            .values()
            .filter(|i| i.program_id == program_id && i.rdi_merge_status == status)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.individual_id);
        Ok(found)
    }

    fn role_assign(
        &self,
        household_id: HouseholdId,
        individual_id: IndividualId,
        role: CollectorRole,
    ) -> HopeResult<()> {
        let mut table = write_table(&self.roles)?;
        if role != CollectorRole::NoRole {
            // Demote any existing holder of the same role in this household.
            for existing in table.values_mut() {
                if existing.household_id == household_id
                    && existing.role == role
                    && existing.individual_id != individual_id
                {
                    existing.role = CollectorRole::NoRole;
                }
            }
        }
        // One role row per (household, individual): update in place if present.
        if let Some(existing) = table
            .values_mut()
            .find(|r| r.household_id == household_id && r.individual_id == individual_id)
        {
            existing.role = role;
            return Ok(());
        }
        let row = IndividualRoleInHousehold::new(household_id, individual_id, role);
        table.insert(row.role_id, row);
        Ok(())
    }

    fn roles_by_household(
        &self,
        household_id: HouseholdId,
    ) -> HopeResult<Vec<IndividualRoleInHousehold>> {
        let mut found: Vec<IndividualRoleInHousehold> = read_table(&self.roles)?
            .values()
            .filter(|r| r.household_id == household_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.role_id);
        Ok(found)
    }

    fn payment_plan_insert(&self, p: &PaymentPlan) -> HopeResult<()> {
        write_table(&self.payment_plans)?.insert(p.payment_plan_id, p.clone());
        Ok(())
    }

    fn payment_plan_get(&self, id: PaymentPlanId) -> HopeResult<Option<PaymentPlan>> {
        Ok(read_table(&self.payment_plans)?.get(&id).cloned())
    }

    fn payment_insert(&self, p: &Payment) -> HopeResult<()> {
        write_table(&self.payments)?.insert(p.payment_id, p.clone());
        Ok(())
    }

    fn payment_get(&self, id: PaymentId) -> HopeResult<Option<Payment>> {
        Ok(read_table(&self.payments)?.get(&id).cloned())
    }

    fn payment_update(&self, id: PaymentId, update: PaymentUpdate) -> HopeResult<()> {
        let mut table = write_table(&self.payments)?;
        let payment = table.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "Payment",
            id,
        })?;
        if let Some(hash) = update.signature_hash {
            payment.signature_hash = Some(hash);
        }
        if let Some(quantity) = update.entitlement_quantity {
            payment.entitlement_quantity = Some(quantity);
        }
        if let Some(reference) = update.transaction_reference_id {
            payment.transaction_reference_id = Some(reference);
        }
        payment.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn payments_by_plan_ordered(&self, plan_id: PaymentPlanId) -> HopeResult<Vec<Payment>> {
        let mut found: Vec<Payment> = read_table(&self.payments)?
            .values()
            .filter(|p| p.parent_id == plan_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.payment_id);
        Ok(found)
    }

    fn snapshot_insert(&self, s: &PaymentHouseholdSnapshot) -> HopeResult<()> {
        write_table(&self.snapshots)?.insert(s.snapshot_id, s.clone());
        Ok(())
    }

    fn snapshot_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> HopeResult<Option<PaymentHouseholdSnapshot>> {
        Ok(read_table(&self.snapshots)?
            .values()
            .find(|s| s.payment_id == payment_id)
            .cloned())
    }

    fn snapshot_exists(&self, payment_id: PaymentId) -> HopeResult<bool> {
        Ok(read_table(&self.snapshots)?
            .values()
            .any(|s| s.payment_id == payment_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hope_core::{new_entity_id, Sex};
    use proptest::prelude::*;

    fn store_with_program() -> (InMemoryStore, Program) {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "test-program");
        store.program_insert(&program).unwrap();
        (store, program)
    }

    fn pending_individual(program: &Program, rdi_id: RdiId, name: &str) -> Individual {
        Individual::pending(
            program.program_id,
            program.business_area_id,
            rdi_id,
            name,
            Sex::Female,
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        )
    }

    #[test]
    fn test_household_insert_get_update() {
        let (store, program) = store_with_program();
        let hh = Household::pending(program.program_id, program.business_area_id, new_entity_id())
            .with_village("Odessa");
        store.household_insert(&hh).unwrap();

        store
            .household_update(
                hh.household_id,
                HouseholdUpdate {
                    village: Some("Lviv".to_string()),
                    withdrawn: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        let loaded = store.household_get(hh.household_id).unwrap().unwrap();
        assert_eq!(loaded.village.as_deref(), Some("Lviv"));
        assert!(loaded.withdrawn);
    }

    #[test]
    fn test_update_missing_household_is_not_found() {
        let (store, _) = store_with_program();
        let err = store
            .household_update(new_entity_id(), HouseholdUpdate::default())
            .unwrap_err();
        assert!(err.to_string().contains("Entity not found"));
    }

    #[test]
    fn test_identification_key_query_only_sees_canonical() {
        let (store, program) = store_with_program();
        let rdi_id = new_entity_id();

        let mut merged =
            Household::pending(program.program_id, program.business_area_id, rdi_id)
                .with_identification_key("HH-001");
        merged.rdi_merge_status = MergeStatus::Merged;
        store.household_insert(&merged).unwrap();

        // Pending household with the same key must not match.
        let pending = Household::pending(program.program_id, program.business_area_id, rdi_id)
            .with_identification_key("HH-001");
        store.household_insert(&pending).unwrap();

        // Withdrawn canonical household must not match either.
        let mut withdrawn =
            Household::pending(program.program_id, program.business_area_id, rdi_id)
                .with_identification_key("HH-001");
        withdrawn.rdi_merge_status = MergeStatus::Merged;
        withdrawn.withdrawn = true;
        store.household_insert(&withdrawn).unwrap();

        let found = store
            .household_find_by_identification_key(program.program_id, "HH-001")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].household_id, merged.household_id);
    }

    #[test]
    fn test_role_assign_demotes_previous_primary() {
        let (store, _) = store_with_program();
        let household_id = new_entity_id();
        let first = new_entity_id();
        let second = new_entity_id();

        store
            .role_assign(household_id, first, CollectorRole::Primary)
            .unwrap();
        store
            .role_assign(household_id, second, CollectorRole::Primary)
            .unwrap();

        let roles = store.roles_by_household(household_id).unwrap();
        let primaries: Vec<_> = roles
            .iter()
            .filter(|r| r.role == CollectorRole::Primary)
            .collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].individual_id, second);
        assert!(roles
            .iter()
            .any(|r| r.individual_id == first && r.role == CollectorRole::NoRole));
    }

    #[test]
    fn test_role_assign_primary_and_alternate_coexist() {
        let (store, _) = store_with_program();
        let household_id = new_entity_id();
        let primary = new_entity_id();
        let alternate = new_entity_id();

        store
            .role_assign(household_id, primary, CollectorRole::Primary)
            .unwrap();
        store
            .role_assign(household_id, alternate, CollectorRole::Alternate)
            .unwrap();

        let roles = store.roles_by_household(household_id).unwrap();
        assert_eq!(roles.len(), 2);
        assert!(roles.iter().any(|r| r.role == CollectorRole::Primary));
        assert!(roles.iter().any(|r| r.role == CollectorRole::Alternate));
    }

    #[test]
    fn test_individuals_by_rdi_filters_merge_status() {
        let (store, program) = store_with_program();
        let rdi_id = new_entity_id();

        let pending = pending_individual(&program, rdi_id, "Pending Person");
        store.individual_insert(&pending).unwrap();

        let mut merged = pending_individual(&program, rdi_id, "Merged Person");
        merged.rdi_merge_status = MergeStatus::Merged;
        store.individual_insert(&merged).unwrap();

        let found = store
            .individuals_by_rdi(rdi_id, MergeStatus::Pending)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_name, "Pending Person");
    }

    #[test]
    fn test_payments_ordered_by_id() {
        let (store, _) = store_with_program();
        let plan = PaymentPlan::new(new_entity_id(), new_entity_id());
        store.payment_plan_insert(&plan).unwrap();

        // UUIDv7 ids are creation-ordered, so insertion order is id order.
        let mut ids = Vec::new();
        for _ in 0..5 {
            let p = Payment::new(plan.payment_plan_id, new_entity_id(), "USD");
            ids.push(p.payment_id);
            store.payment_insert(&p).unwrap();
        }

        let ordered = store.payments_by_plan_ordered(plan.payment_plan_id).unwrap();
        let got: Vec<_> = ordered.iter().map(|p| p.payment_id).collect();
        assert_eq!(got, ids);
    }

    #[test]
    fn test_rdi_update_can_clear_error_message() {
        let (store, program) = store_with_program();
        let mut rdi =
            RegistrationDataImport::new("batch", program.business_area_id, program.program_id);
        rdi.error_message = Some("too many duplicates".to_string());
        store.rdi_insert(&rdi).unwrap();

        // Untouched field leaves the stored message alone.
        store
            .rdi_update(
                rdi.rdi_id,
                RdiUpdate {
                    status: Some(RdiStatus::Deduplication),
                    ..Default::default()
                },
            )
            .unwrap();
        let kept = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(kept.error_message.as_deref(), Some("too many duplicates"));

        store
            .rdi_update(
                rdi.rdi_id,
                RdiUpdate {
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        let cleared = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(cleared.error_message, None);
    }

    #[test]
    fn test_snapshot_exists() {
        let (store, _) = store_with_program();
        let payment_id = new_entity_id();
        assert!(!store.snapshot_exists(payment_id).unwrap());

        let snap = PaymentHouseholdSnapshot::new(payment_id, serde_json::json!({"size": 1}));
        store.snapshot_insert(&snap).unwrap();
        assert!(store.snapshot_exists(payment_id).unwrap());
        assert_eq!(store.snapshot_count(), 1);
    }

    #[test]
    fn test_household_lock_serializes_access() {
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        let household_id = new_entity_id();
        let counter = Arc::new(Mutex::new(0i64));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let lock = store.household_lock(household_id).unwrap();
                    let _guard = lock.acquire().unwrap();
                    // Non-atomic read-modify-write, safe only under the row lock.
                    let mut c = counter.lock().unwrap();
                    let v = *c;
                    *c = v + 1;
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 400);
    }

    #[test]
    fn test_clear_empties_all_tables() {
        let (store, program) = store_with_program();
        let rdi_id = new_entity_id();
        store
            .individual_insert(&pending_individual(&program, rdi_id, "Someone"))
            .unwrap();
        assert_eq!(store.individual_count(), 1);
        store.clear().unwrap();
        assert_eq!(store.individual_count(), 0);
        assert_eq!(store.household_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_payments_listed_in_id_order_for_any_insertion_order(
            order in (1usize..12)
                .prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
        ) {
            let store = InMemoryStore::new();
            let plan = PaymentPlan::new(new_entity_id(), new_entity_id());
            store.payment_plan_insert(&plan).unwrap();

            let payments: Vec<Payment> = (0..order.len())
                .map(|_| Payment::new(plan.payment_plan_id, new_entity_id(), "USD"))
                .collect();
            for &i in &order {
                store.payment_insert(&payments[i]).unwrap();
            }

            let listed = store.payments_by_plan_ordered(plan.payment_plan_id).unwrap();
            prop_assert_eq!(listed.len(), payments.len());
            let ids: Vec<_> = listed.iter().map(|p| p.payment_id).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(ids, sorted);
        }
    }
}
