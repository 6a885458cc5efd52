//! Core entity structures
//!
//! These mirror the durable rows the pipeline reads and writes: programs,
//! registration data imports, households and individuals (pending and
//! canonical share one struct, discriminated by `rdi_merge_status`),
//! collector roles, payments, and payment household snapshots.

use crate::{
    age_in_years, new_entity_id, BusinessAreaId, CollectorRole, CollisionStrategy,
    DeduplicationBatchStatus, DeduplicationGoldenRecordStatus, HouseholdId, IndividualId,
    MergeStatus, PaymentId, PaymentPlanId, PaymentStatus, ProgramId, RdiId, RdiStatus,
    Relationship, RoleId, Sex, SignatureHash, SnapshotId, Timestamp, ValidationError,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PROGRAM
// ============================================================================

/// A program: the population scope within a business area. Collision
/// detection and composition recalculation are configured per program
/// (the latter comes from the program's data collecting type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub program_id: ProgramId,
    pub business_area_id: BusinessAreaId,
    pub name: String,
    pub collision_strategy: CollisionStrategy,
    /// False when the data collecting type disables household composition
    /// recalculation entirely.
    pub recalculate_composition: bool,
    pub created_at: Timestamp,
}

impl Program {
    /// Create a new program with collision detection disabled.
    pub fn new(business_area_id: BusinessAreaId, name: &str) -> Self {
        Self {
            program_id: new_entity_id(),
            business_area_id,
            name: name.to_string(),
            collision_strategy: CollisionStrategy::None,
            recalculate_composition: true,
            created_at: Utc::now(),
        }
    }

    /// Set the collision strategy.
    pub fn with_collision_strategy(mut self, strategy: CollisionStrategy) -> Self {
        self.collision_strategy = strategy;
        self
    }

    /// Disable composition recalculation (data collecting types without
    /// member-level demographics).
    pub fn without_composition_recalculation(mut self) -> Self {
        self.recalculate_composition = false;
        self
    }
}

// ============================================================================
// REGISTRATION DATA IMPORT
// ============================================================================

/// A registration data import: one batch of incoming household/individual
/// data, owned by the import pipeline and advanced through a strict status
/// machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationDataImport {
    pub rdi_id: RdiId,
    pub name: String,
    pub status: RdiStatus,
    pub business_area_id: BusinessAreaId,
    pub program_id: ProgramId,
    pub number_of_households: i64,
    pub number_of_individuals: i64,
    /// Durable failure message for DEDUPLICATION_FAILED / MERGE_ERROR.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RegistrationDataImport {
    /// Create a new import in LOADING.
    pub fn new(name: &str, business_area_id: BusinessAreaId, program_id: ProgramId) -> Self {
        let now = Utc::now();
        Self {
            rdi_id: new_entity_id(),
            name: name.to_string(),
            status: RdiStatus::Loading,
            business_area_id,
            program_id,
            number_of_households: 0,
            number_of_individuals: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status machine; illegal transitions are validation errors.
    pub fn transition(&mut self, to: RdiStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition(to) {
            return Err(ValidationError::InvalidStatusTransition {
                rdi_id: self.rdi_id,
                from: self.status.as_db_str().to_string(),
                to: to.as_db_str().to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a merge failure. MERGING -> MERGE_ERROR is always legal.
    pub fn mark_merge_error(&mut self, message: &str) {
        self.status = RdiStatus::MergeError;
        self.error_message = Some(message.to_string());
        self.updated_at = Utc::now();
    }

    /// Record a deduplication threshold failure.
    pub fn mark_dedup_failed(&mut self, message: &str) {
        self.status = RdiStatus::DeduplicationFailed;
        self.error_message = Some(message.to_string());
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// HOUSEHOLD COMPOSITION
// ============================================================================

/// Denormalized household composition counts, recalculated from the live
/// member set. Field names double as the partial-update column names
/// reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HouseholdComposition {
    pub female_age_group_0_5_count: i64,
    pub female_age_group_6_11_count: i64,
    pub female_age_group_12_17_count: i64,
    pub female_age_group_18_59_count: i64,
    pub female_age_group_60_count: i64,
    pub male_age_group_0_5_count: i64,
    pub male_age_group_6_11_count: i64,
    pub male_age_group_12_17_count: i64,
    pub male_age_group_18_59_count: i64,
    pub male_age_group_60_count: i64,
    pub female_age_group_0_5_disabled_count: i64,
    pub female_age_group_6_11_disabled_count: i64,
    pub female_age_group_12_17_disabled_count: i64,
    pub female_age_group_18_59_disabled_count: i64,
    pub female_age_group_60_disabled_count: i64,
    pub male_age_group_0_5_disabled_count: i64,
    pub male_age_group_6_11_disabled_count: i64,
    pub male_age_group_12_17_disabled_count: i64,
    pub male_age_group_18_59_disabled_count: i64,
    pub male_age_group_60_disabled_count: i64,
    pub children_count: i64,
    pub female_children_count: i64,
    pub male_children_count: i64,
    pub children_disabled_count: i64,
    pub female_children_disabled_count: i64,
    pub male_children_disabled_count: i64,
    pub adults_count: i64,
    pub pregnant_count: i64,
    pub size: i64,
    pub child_hoh: bool,
    pub fchild_hoh: bool,
}

macro_rules! diff_fields {
    ($a:ident, $b:ident, $out:ident, $($f:ident),+ $(,)?) => {
        $( if $a.$f != $b.$f { $out.push(stringify!($f)); } )+
    };
}

impl HouseholdComposition {
    /// Count one active beneficiary into the appropriate buckets.
    pub fn record(&mut self, sex: Sex, band: crate::AgeBand, disabled: bool) {
        use crate::AgeBand::*;
        match (sex, band) {
            (Sex::Female, Y0To5) => self.female_age_group_0_5_count += 1,
            (Sex::Female, Y6To11) => self.female_age_group_6_11_count += 1,
            (Sex::Female, Y12To17) => self.female_age_group_12_17_count += 1,
            (Sex::Female, Y18To59) => self.female_age_group_18_59_count += 1,
            (Sex::Female, Y60Plus) => self.female_age_group_60_count += 1,
            (Sex::Male, Y0To5) => self.male_age_group_0_5_count += 1,
            (Sex::Male, Y6To11) => self.male_age_group_6_11_count += 1,
            (Sex::Male, Y12To17) => self.male_age_group_12_17_count += 1,
            (Sex::Male, Y18To59) => self.male_age_group_18_59_count += 1,
            (Sex::Male, Y60Plus) => self.male_age_group_60_count += 1,
        }
        if disabled {
            match (sex, band) {
                (Sex::Female, Y0To5) => self.female_age_group_0_5_disabled_count += 1,
                (Sex::Female, Y6To11) => self.female_age_group_6_11_disabled_count += 1,
                (Sex::Female, Y12To17) => self.female_age_group_12_17_disabled_count += 1,
                (Sex::Female, Y18To59) => self.female_age_group_18_59_disabled_count += 1,
                (Sex::Female, Y60Plus) => self.female_age_group_60_disabled_count += 1,
                (Sex::Male, Y0To5) => self.male_age_group_0_5_disabled_count += 1,
                (Sex::Male, Y6To11) => self.male_age_group_6_11_disabled_count += 1,
                (Sex::Male, Y12To17) => self.male_age_group_12_17_disabled_count += 1,
                (Sex::Male, Y18To59) => self.male_age_group_18_59_disabled_count += 1,
                (Sex::Male, Y60Plus) => self.male_age_group_60_disabled_count += 1,
            }
        }
        if band.is_child() {
            self.children_count += 1;
            match sex {
                Sex::Female => self.female_children_count += 1,
                Sex::Male => self.male_children_count += 1,
            }
            if disabled {
                self.children_disabled_count += 1;
                match sex {
                    Sex::Female => self.female_children_disabled_count += 1,
                    Sex::Male => self.male_children_disabled_count += 1,
                }
            }
        } else {
            self.adults_count += 1;
        }
        self.size += 1;
    }

    /// Sum of all per-band-per-sex counts. Must equal `size` for any
    /// composition built through `record`.
    pub fn band_total(&self) -> i64 {
        self.female_age_group_0_5_count
            + self.female_age_group_6_11_count
            + self.female_age_group_12_17_count
            + self.female_age_group_18_59_count
            + self.female_age_group_60_count
            + self.male_age_group_0_5_count
            + self.male_age_group_6_11_count
            + self.male_age_group_12_17_count
            + self.male_age_group_18_59_count
            + self.male_age_group_60_count
    }

    /// Field names that differ from `other`, for partial-update callers.
    pub fn diff(&self, other: &HouseholdComposition) -> Vec<&'static str> {
        let mut changed = Vec::new();
        diff_fields!(
            self, other, changed,
            female_age_group_0_5_count,
            female_age_group_6_11_count,
            female_age_group_12_17_count,
            female_age_group_18_59_count,
            female_age_group_60_count,
            male_age_group_0_5_count,
            male_age_group_6_11_count,
            male_age_group_12_17_count,
            male_age_group_18_59_count,
            male_age_group_60_count,
            female_age_group_0_5_disabled_count,
            female_age_group_6_11_disabled_count,
            female_age_group_12_17_disabled_count,
            female_age_group_18_59_disabled_count,
            female_age_group_60_disabled_count,
            male_age_group_0_5_disabled_count,
            male_age_group_6_11_disabled_count,
            male_age_group_12_17_disabled_count,
            male_age_group_18_59_disabled_count,
            male_age_group_60_disabled_count,
            children_count,
            female_children_count,
            male_children_count,
            children_disabled_count,
            female_children_disabled_count,
            male_children_disabled_count,
            adults_count,
            pregnant_count,
            size,
            child_hoh,
            fchild_hoh,
        );
        changed
    }
}

// ============================================================================
// HOUSEHOLD
// ============================================================================

/// A household. Pending (staging) and canonical households share this
/// struct; `rdi_merge_status` discriminates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Household {
    pub household_id: HouseholdId,
    pub program_id: ProgramId,
    pub business_area_id: BusinessAreaId,
    /// The import that created this household.
    pub rdi_id: RdiId,
    /// Imports merged into this household after a collision.
    pub extra_rdis: Vec<RdiId>,
    pub rdi_merge_status: MergeStatus,
    /// Business key for collision detection. Optional; programs without a
    /// collision strategy never set it.
    pub identification_key: Option<String>,
    pub head_of_household: Option<IndividualId>,
    pub village: Option<String>,
    pub address: Option<String>,
    pub residence_status: Option<String>,
    pub composition: HouseholdComposition,
    pub withdrawn: bool,
    /// Audit trail for operator-facing events (collision removals, status
    /// resets). Free-form JSON object.
    pub internal_data: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Household {
    /// Create a pending household belonging to an import.
    pub fn pending(program_id: ProgramId, business_area_id: BusinessAreaId, rdi_id: RdiId) -> Self {
        let now = Utc::now();
        Self {
            household_id: new_entity_id(),
            program_id,
            business_area_id,
            rdi_id,
            extra_rdis: Vec::new(),
            rdi_merge_status: MergeStatus::Pending,
            identification_key: None,
            head_of_household: None,
            village: None,
            address: None,
            residence_status: None,
            composition: HouseholdComposition::default(),
            withdrawn: false,
            internal_data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the identification key.
    pub fn with_identification_key(mut self, key: &str) -> Self {
        self.identification_key = Some(key.to_string());
        self
    }

    /// Set the registered household size.
    pub fn with_size(mut self, size: i64) -> Self {
        self.composition.size = size;
        self
    }

    /// Set the village.
    pub fn with_village(mut self, village: &str) -> Self {
        self.village = Some(village.to_string());
        self
    }

    /// Register an import as an extra contributor after a collision merge.
    pub fn register_extra_rdi(&mut self, rdi_id: RdiId) {
        if self.rdi_id != rdi_id && !self.extra_rdis.contains(&rdi_id) {
            self.extra_rdis.push(rdi_id);
        }
    }
}

// ============================================================================
// INDIVIDUAL
// ============================================================================

/// A document held by an individual, used for hard deduplication matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document type key, e.g. "national_id", "birth_certificate".
    pub type_key: String,
    pub number: String,
    /// ISO-3 country code of the issuing country.
    pub country: String,
    /// Only document types flagged valid for deduplication participate in
    /// signature matching.
    pub valid_for_deduplication: bool,
}

impl Document {
    /// Normalized signature used for exact duplicate detection.
    pub fn signature(&self) -> String {
        format!("{}--{}--{}", self.type_key, self.number, self.country)
    }
}

/// Bank account details captured at registration, snapshotted for payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccountInfo {
    pub bank_name: String,
    pub account_number: String,
    pub financial_institution: Option<String>,
}

/// An individual. Pending and canonical individuals share this struct,
/// discriminated by `rdi_merge_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub individual_id: IndividualId,
    pub household_id: Option<HouseholdId>,
    pub program_id: ProgramId,
    pub business_area_id: BusinessAreaId,
    pub rdi_id: RdiId,
    pub rdi_merge_status: MergeStatus,
    pub full_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub relationship: Relationship,
    pub disability: bool,
    /// Only meaningful for FEMALE individuals; None when not collected.
    pub pregnant: Option<bool>,
    pub withdrawn: bool,
    pub duplicate: bool,
    pub deduplication_batch_status: DeduplicationBatchStatus,
    pub deduplication_batch_results: serde_json::Value,
    pub deduplication_golden_record_status: DeduplicationGoldenRecordStatus,
    pub deduplication_golden_record_results: serde_json::Value,
    pub documents: Vec<Document>,
    pub bank_account: Option<BankAccountInfo>,
    pub phone_no: Option<String>,
    /// Reference date for age-band computation.
    pub last_registration_date: NaiveDate,
    pub identification_key: Option<String>,
    pub internal_data: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Individual {
    /// Create a pending individual belonging to an import.
    pub fn pending(
        program_id: ProgramId,
        business_area_id: BusinessAreaId,
        rdi_id: RdiId,
        full_name: &str,
        sex: Sex,
        birth_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            individual_id: new_entity_id(),
            household_id: None,
            program_id,
            business_area_id,
            rdi_id,
            rdi_merge_status: MergeStatus::Pending,
            full_name: full_name.to_string(),
            given_name: None,
            family_name: None,
            sex,
            birth_date,
            relationship: Relationship::Unknown,
            disability: false,
            pregnant: None,
            withdrawn: false,
            duplicate: false,
            deduplication_batch_status: DeduplicationBatchStatus::NotProcessed,
            deduplication_batch_results: serde_json::json!([]),
            deduplication_golden_record_status: DeduplicationGoldenRecordStatus::NotProcessed,
            deduplication_golden_record_results: serde_json::json!([]),
            documents: Vec::new(),
            bank_account: None,
            phone_no: None,
            last_registration_date: now.date_naive(),
            identification_key: None,
            internal_data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach to a household with a relationship.
    pub fn in_household(mut self, household_id: HouseholdId, relationship: Relationship) -> Self {
        self.household_id = Some(household_id);
        self.relationship = relationship;
        self
    }

    /// Add a document.
    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    /// Set the identification key.
    pub fn with_identification_key(mut self, key: &str) -> Self {
        self.identification_key = Some(key.to_string());
        self
    }

    /// Set the disability flag.
    pub fn with_disability(mut self, disability: bool) -> Self {
        self.disability = disability;
        self
    }

    /// Age in whole years at their last registration date.
    pub fn age(&self) -> i32 {
        age_in_years(self.birth_date, self.last_registration_date)
    }

    /// Whether this individual counts toward household composition:
    /// not withdrawn, not a duplicate, and a beneficiary relationship.
    pub fn is_active_beneficiary(&self) -> bool {
        !self.withdrawn && !self.duplicate && self.relationship.is_beneficiary()
    }

    /// Document signatures eligible for deduplication matching.
    pub fn deduplication_document_signatures(&self) -> Vec<String> {
        self.documents
            .iter()
            .filter(|d| d.valid_for_deduplication)
            .map(Document::signature)
            .collect()
    }

    /// Withdraw this individual after losing a household collision.
    /// The record is kept for audit, never deleted.
    pub fn mark_removed_by_collision(&mut self, rdi_id: RdiId, now: Timestamp) {
        self.withdrawn = true;
        self.relationship = Relationship::RemovedByCollision;
        if let Some(map) = self.internal_data.as_object_mut() {
            map.insert(
                "removed_by_collision".to_string(),
                serde_json::json!({
                    "rdi_id": rdi_id,
                    "withdrawn_at": now,
                }),
            );
        }
        self.updated_at = now;
    }
}

/// Role assignment of an individual within a household. The business
/// invariant (at most one live PRIMARY and one live ALTERNATE per
/// household) is enforced by the store's reassignment logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualRoleInHousehold {
    pub role_id: RoleId,
    pub household_id: HouseholdId,
    pub individual_id: IndividualId,
    pub role: CollectorRole,
    pub created_at: Timestamp,
}

impl IndividualRoleInHousehold {
    pub fn new(household_id: HouseholdId, individual_id: IndividualId, role: CollectorRole) -> Self {
        Self {
            role_id: new_entity_id(),
            household_id,
            individual_id,
            role,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// A payment plan: the unit the snapshot service runs over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub payment_plan_id: PaymentPlanId,
    pub program_id: ProgramId,
    pub business_area_id: BusinessAreaId,
    pub created_at: Timestamp,
}

impl PaymentPlan {
    pub fn new(program_id: ProgramId, business_area_id: BusinessAreaId) -> Self {
        Self {
            payment_plan_id: new_entity_id(),
            program_id,
            business_area_id,
            created_at: Utc::now(),
        }
    }
}

/// A payment to a household within a payment plan.
///
/// Monetary quantities are carried as already-rendered decimal strings;
/// the engine never does arithmetic on them, only snapshots and hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    /// The owning payment plan.
    pub parent_id: PaymentPlanId,
    pub household_id: HouseholdId,
    pub collector_id: Option<IndividualId>,
    pub status: PaymentStatus,
    pub currency: String,
    pub conflicted: bool,
    pub excluded: bool,
    pub entitlement_date: Option<Timestamp>,
    pub entitlement_quantity: Option<String>,
    pub entitlement_quantity_usd: Option<String>,
    pub delivered_quantity: Option<String>,
    pub transaction_reference_id: Option<String>,
    /// SHA-1 over the signature fields; set by the snapshot service.
    pub signature_hash: Option<SignatureHash>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    pub fn new(parent_id: PaymentPlanId, household_id: HouseholdId, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            payment_id: new_entity_id(),
            parent_id,
            household_id,
            collector_id: None,
            status: PaymentStatus::Pending,
            currency: currency.to_string(),
            conflicted: false,
            excluded: false,
            entitlement_date: None,
            entitlement_quantity: None,
            entitlement_quantity_usd: None,
            delivered_quantity: None,
            transaction_reference_id: None,
            signature_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the entitlement quantities.
    pub fn with_entitlement(mut self, quantity: &str, quantity_usd: &str) -> Self {
        self.entitlement_quantity = Some(quantity.to_string());
        self.entitlement_quantity_usd = Some(quantity_usd.to_string());
        self
    }

    /// Set the collector.
    pub fn with_collector(mut self, collector_id: IndividualId) -> Self {
        self.collector_id = Some(collector_id);
        self
    }
}

/// Immutable point-in-time capture of a household/individual subgraph,
/// taken when a payment plan is prepared. Append-only; used as hash input
/// for the payment signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHouseholdSnapshot {
    pub snapshot_id: SnapshotId,
    pub payment_id: PaymentId,
    pub snapshot_data: serde_json::Value,
    pub created_at: Timestamp,
}

impl PaymentHouseholdSnapshot {
    pub fn new(payment_id: PaymentId, snapshot_data: serde_json::Value) -> Self {
        Self {
            snapshot_id: new_entity_id(),
            payment_id,
            snapshot_data,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
