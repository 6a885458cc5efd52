//! Deduplication engine
//!
//! Flags duplicates within a pending import (batch scope) and against the
//! canonical population (golden record scope). Two independent signals
//! feed the statuses: exact document signature matches and, when a
//! provider is configured, biometric similarity scores.
//!
//! All statuses are staged in memory and committed only after the
//! threshold check passes. A failed check marks the import
//! DEDUPLICATION_FAILED with a durable message and leaves every pending
//! individual at NOT_PROCESSED, so a retry starts from a clean slate.

use hope_core::{
    DeduplicationBatchStatus, DeduplicationConfig, DeduplicationError,
    DeduplicationGoldenRecordStatus, HopeResult, Individual, IndividualId, MergeStatus, RdiId,
    RdiStatus, StorageError, ValidationError,
};
use hope_storage::{IndividualUpdate, PopulationStore, RdiUpdate};
use std::collections::HashMap;
use tracing::{info, warn};

// ============================================================================
// THRESHOLD CHECK
// ============================================================================

/// Decide whether an import has too many duplicates to proceed.
///
/// Fails on either of two rules, checked in order:
/// 1. the duplicate count exceeds the absolute maximum `max_allowed`;
/// 2. the comparison set holds more than one duplicate, the import has
///    more than one individual, and the duplicate count exceeds
///    `allowed_pct_count` (the percentage cap already resolved against
///    the import size).
///
/// Returns the operator-facing failure message, or `None` when the import
/// may proceed.
pub fn check_duplicates_threshold(
    duplicates_count: i64,
    max_allowed: i64,
    duplicates_set_size: i64,
    allowed_pct_count: f64,
    individuals_count: i64,
) -> Option<String> {
    if duplicates_count > max_allowed {
        return Some(format!(
            "The number of duplicates ({duplicates_count}) exceed the maximum allowed ({max_allowed})"
        ));
    }
    if duplicates_set_size > 1
        && individuals_count > 1
        && duplicates_count as f64 > allowed_pct_count
    {
        return Some(format!(
            "The percentage of duplicates is higher than the allowed ({allowed_pct_count})"
        ));
    }
    None
}

/// Split the deduplication-eligible document signatures of a batch into
/// those that repeat across individuals and those that occur once.
/// Both lists are sorted for deterministic reporting.
pub fn duplicated_document_signatures(individuals: &[Individual]) -> (Vec<String>, Vec<String>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for individual in individuals {
        for signature in individual.deduplication_document_signatures() {
            *counts.entry(signature).or_insert(0) += 1;
        }
    }
    let mut duplicated = Vec::new();
    let mut unique = Vec::new();
    for (signature, count) in counts {
        if count > 1 {
            duplicated.push(signature);
        } else {
            unique.push(signature);
        }
    }
    duplicated.sort();
    unique.sort();
    (duplicated, unique)
}

// ============================================================================
// BIOMETRIC PROVIDER SEAM
// ============================================================================

/// A scored match between two individuals, reported by a biometric
/// provider. Order of the two ids carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityPair {
    pub first: IndividualId,
    pub second: IndividualId,
    pub score: f64,
}

/// Seam for biometric matching backends. The engine passes the pending
/// individuals of the import and the canonical individuals of the program;
/// the provider returns every scored pair it considers a possible match.
pub trait BiometricProvider: Send + Sync {
    fn similarity_pairs(
        &self,
        pending: &[Individual],
        canonical: &[Individual],
    ) -> Result<Vec<SimilarityPair>, DeduplicationError>;
}

// ============================================================================
// ENGINE
// ============================================================================

/// Per-individual statuses staged before commit.
#[derive(Debug, Default)]
struct Staged {
    batch_status: Option<DeduplicationBatchStatus>,
    batch_results: Vec<serde_json::Value>,
    golden_status: Option<DeduplicationGoldenRecordStatus>,
    golden_results: Vec<serde_json::Value>,
}

impl Staged {
    /// Duplicate always wins over Similar.
    fn raise_batch(&mut self, status: DeduplicationBatchStatus, result: serde_json::Value) {
        if self.batch_status != Some(DeduplicationBatchStatus::DuplicateInBatch) {
            self.batch_status = Some(status);
        }
        self.batch_results.push(result);
    }

    /// Duplicate always wins over NeedsAdjudication.
    fn raise_golden(
        &mut self,
        status: DeduplicationGoldenRecordStatus,
        result: serde_json::Value,
    ) {
        if self.golden_status != Some(DeduplicationGoldenRecordStatus::Duplicate) {
            self.golden_status = Some(status);
        }
        self.golden_results.push(result);
    }
}

/// Counts reported after a successful deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeduplicationOutcome {
    pub individuals_processed: usize,
    pub duplicates_in_batch: usize,
    pub similar_in_batch: usize,
    pub duplicates_against_population: usize,
    pub needs_adjudication: usize,
}

/// The deduplication engine for one deployment. Stateless between runs;
/// a run operates on one import.
pub struct DeduplicationEngine {
    config: DeduplicationConfig,
    biometrics: Option<Box<dyn BiometricProvider>>,
}

impl DeduplicationEngine {
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            config,
            biometrics: None,
        }
    }

    /// Attach a biometric provider.
    pub fn with_biometrics(mut self, provider: Box<dyn BiometricProvider>) -> Self {
        self.biometrics = Some(provider);
        self
    }

    /// Deduplicate one import.
    ///
    /// The import must be in DEDUPLICATION, or in DEDUPLICATION_FAILED for
    /// a retry. On success every pending individual has its statuses
    /// committed and the import moves to IN_REVIEW. On threshold failure
    /// the import moves to DEDUPLICATION_FAILED, nothing is committed, and
    /// the error carries the same message stored on the import.
    pub fn deduplicate_rdi(
        &self,
        store: &dyn PopulationStore,
        rdi_id: RdiId,
    ) -> HopeResult<DeduplicationOutcome> {
        let mut rdi = store.rdi_get(rdi_id)?.ok_or(StorageError::NotFound {
            entity: "RegistrationDataImport",
            id: rdi_id,
        })?;
        match rdi.status {
            RdiStatus::Deduplication => {}
            RdiStatus::DeduplicationFailed => {
                rdi.transition(RdiStatus::Deduplication)?;
                store.rdi_update(
                    rdi_id,
                    RdiUpdate {
                        status: Some(RdiStatus::Deduplication),
                        ..Default::default()
                    },
                )?;
            }
            other => {
                return Err(ValidationError::ConstraintViolation {
                    constraint: "rdi_status".to_string(),
                    reason: format!(
                        "import {} must be in DEDUPLICATION to deduplicate, is {}",
                        rdi_id,
                        other.as_db_str()
                    ),
                }
                .into());
            }
        }

        let pending = store.individuals_by_rdi(rdi_id, MergeStatus::Pending)?;
        let canonical: Vec<Individual> = store
            .individuals_by_program(rdi.program_id, MergeStatus::Merged)?
            .into_iter()
            .filter(|i| !i.withdrawn && !i.duplicate)
            .collect();
        info!(
            rdi = %rdi_id,
            pending = pending.len(),
            canonical = canonical.len(),
            "deduplicating import"
        );

        let mut staged: HashMap<IndividualId, Staged> = pending
            .iter()
            .map(|i| (i.individual_id, Staged::default()))
            .collect();

        self.match_documents_in_batch(&pending, &mut staged);
        self.match_documents_against_population(&pending, &canonical, &mut staged);
        if let Some(provider) = &self.biometrics {
            if let Err(err) = self.match_biometrics(provider.as_ref(), &pending, &canonical, &mut staged)
            {
                warn!(rdi = %rdi_id, error = %err, "biometric matching failed");
                rdi.mark_dedup_failed(&err.to_string());
                store.rdi_update(
                    rdi_id,
                    RdiUpdate {
                        status: Some(RdiStatus::DeduplicationFailed),
                        error_message: Some(rdi.error_message.clone()),
                        ..Default::default()
                    },
                )?;
                return Err(err.into());
            }
        }

        let duplicates_count = staged
            .values()
            .filter(|s| s.golden_status == Some(DeduplicationGoldenRecordStatus::Duplicate))
            .count() as i64;
        let duplicates_set_size = staged
            .values()
            .filter(|s| s.batch_status == Some(DeduplicationBatchStatus::DuplicateInBatch))
            .count() as i64;

        let allowed_pct_count =
            pending.len() as f64 * self.config.duplicates_percentage_allowed / 100.0;
        if let Some(message) = check_duplicates_threshold(
            duplicates_count,
            self.config.duplicates_allowed,
            duplicates_set_size,
            allowed_pct_count,
            pending.len() as i64,
        ) {
            warn!(rdi = %rdi_id, reason = %message, "deduplication threshold exceeded");
            rdi.mark_dedup_failed(&message);
            store.rdi_update(
                rdi_id,
                RdiUpdate {
                    status: Some(RdiStatus::DeduplicationFailed),
                    error_message: Some(Some(message.clone())),
                    ..Default::default()
                },
            )?;
            return Err(DeduplicationError::ThresholdExceeded { message }.into());
        }

        let outcome = self.commit(store, &pending, staged)?;

        rdi.transition(RdiStatus::InReview)?;
        store.rdi_update(
            rdi_id,
            RdiUpdate {
                status: Some(RdiStatus::InReview),
                // A retried import drops its old failure message.
                error_message: Some(None),
                ..Default::default()
            },
        )?;
        info!(
            rdi = %rdi_id,
            duplicates_in_batch = outcome.duplicates_in_batch,
            duplicates_against_population = outcome.duplicates_against_population,
            "deduplication complete"
        );
        Ok(outcome)
    }

    /// Exact document signature matches within the pending batch.
    fn match_documents_in_batch(
        &self,
        pending: &[Individual],
        staged: &mut HashMap<IndividualId, Staged>,
    ) {
        let mut by_signature: HashMap<String, Vec<IndividualId>> = HashMap::new();
        for individual in pending {
            for signature in individual.deduplication_document_signatures() {
                by_signature
                    .entry(signature)
                    .or_default()
                    .push(individual.individual_id);
            }
        }
        for (signature, holders) in by_signature {
            if holders.len() < 2 {
                continue;
            }
            for id in &holders {
                let partners: Vec<_> = holders.iter().filter(|h| *h != id).collect();
                if let Some(entry) = staged.get_mut(id) {
                    entry.raise_batch(
                        DeduplicationBatchStatus::DuplicateInBatch,
                        serde_json::json!({
                            "kind": "document",
                            "signature": signature,
                            "matches": partners,
                        }),
                    );
                }
            }
        }
    }

    /// Exact document signature matches against canonical individuals.
    fn match_documents_against_population(
        &self,
        pending: &[Individual],
        canonical: &[Individual],
        staged: &mut HashMap<IndividualId, Staged>,
    ) {
        let mut canonical_by_signature: HashMap<String, Vec<IndividualId>> = HashMap::new();
        for individual in canonical {
            for signature in individual.deduplication_document_signatures() {
                canonical_by_signature
                    .entry(signature)
                    .or_default()
                    .push(individual.individual_id);
            }
        }
        for individual in pending {
            for signature in individual.deduplication_document_signatures() {
                if let Some(matches) = canonical_by_signature.get(&signature) {
                    if let Some(entry) = staged.get_mut(&individual.individual_id) {
                        entry.raise_golden(
                            DeduplicationGoldenRecordStatus::Duplicate,
                            serde_json::json!({
                                "kind": "document",
                                "signature": signature,
                                "matches": matches,
                            }),
                        );
                    }
                }
            }
        }
    }

    /// Biometric similarity scoring. Pairs wholly inside the batch raise
    /// batch statuses; pairs spanning batch and population raise golden
    /// record statuses.
    fn match_biometrics(
        &self,
        provider: &dyn BiometricProvider,
        pending: &[Individual],
        canonical: &[Individual],
        staged: &mut HashMap<IndividualId, Staged>,
    ) -> Result<(), DeduplicationError> {
        let pairs = provider.similarity_pairs(pending, canonical)?;
        for pair in pairs {
            if pair.score < self.config.possible_duplicate_score {
                continue;
            }
            let is_duplicate = pair.score >= self.config.duplicate_score;
            let both_pending =
                staged.contains_key(&pair.first) && staged.contains_key(&pair.second);
            for (id, partner) in [(pair.first, pair.second), (pair.second, pair.first)] {
                let Some(entry) = staged.get_mut(&id) else {
                    continue;
                };
                let result = serde_json::json!({
                    "kind": "biometric",
                    "match": partner,
                    "score": pair.score,
                });
                if both_pending {
                    let status = if is_duplicate {
                        DeduplicationBatchStatus::DuplicateInBatch
                    } else {
                        DeduplicationBatchStatus::SimilarInBatch
                    };
                    entry.raise_batch(status, result);
                } else {
                    let status = if is_duplicate {
                        DeduplicationGoldenRecordStatus::Duplicate
                    } else {
                        DeduplicationGoldenRecordStatus::NeedsAdjudication
                    };
                    entry.raise_golden(status, result);
                }
            }
        }
        Ok(())
    }

    /// Persist staged statuses in pages of `batch_size`.
    fn commit(
        &self,
        store: &dyn PopulationStore,
        pending: &[Individual],
        mut staged: HashMap<IndividualId, Staged>,
    ) -> HopeResult<DeduplicationOutcome> {
        let mut outcome = DeduplicationOutcome {
            individuals_processed: pending.len(),
            ..Default::default()
        };
        for page in pending.chunks(self.config.batch_size.max(1)) {
            for individual in page {
                let entry = staged.remove(&individual.individual_id).unwrap_or_default();
                let batch_status = entry
                    .batch_status
                    .unwrap_or(DeduplicationBatchStatus::UniqueInBatch);
                let golden_status = entry
                    .golden_status
                    .unwrap_or(DeduplicationGoldenRecordStatus::Unique);
                match batch_status {
                    DeduplicationBatchStatus::DuplicateInBatch => {
                        outcome.duplicates_in_batch += 1
                    }
                    DeduplicationBatchStatus::SimilarInBatch => outcome.similar_in_batch += 1,
                    _ => {}
                }
                match golden_status {
                    DeduplicationGoldenRecordStatus::Duplicate => {
                        outcome.duplicates_against_population += 1
                    }
                    DeduplicationGoldenRecordStatus::NeedsAdjudication => {
                        outcome.needs_adjudication += 1
                    }
                    _ => {}
                }
                store.individual_update(
                    individual.individual_id,
                    IndividualUpdate {
                        deduplication_batch_status: Some(batch_status),
                        deduplication_batch_results: Some(serde_json::Value::Array(
                            entry.batch_results,
                        )),
                        deduplication_golden_record_status: Some(golden_status),
                        deduplication_golden_record_results: Some(serde_json::Value::Array(
                            entry.golden_results,
                        )),
                        ..Default::default()
                    },
                )?;
            }
        }
        Ok(outcome)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hope_core::{new_entity_id, Document, Program, RegistrationDataImport, Sex};
    use hope_storage::InMemoryStore;
    use proptest::prelude::*;

    fn national_id(number: &str) -> Document {
        Document {
            type_key: "national_id".to_string(),
            number: number.to_string(),
            country: "UKR".to_string(),
            valid_for_deduplication: true,
        }
    }

    fn receipt(number: &str) -> Document {
        Document {
            type_key: "receipt".to_string(),
            number: number.to_string(),
            country: "UKR".to_string(),
            valid_for_deduplication: false,
        }
    }

    fn setup() -> (InMemoryStore, Program, RegistrationDataImport) {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "p");
        store.program_insert(&program).unwrap();
        let mut rdi =
            RegistrationDataImport::new("batch-1", program.business_area_id, program.program_id);
        rdi.transition(RdiStatus::Deduplication).unwrap();
        store.rdi_insert(&rdi).unwrap();
        (store, program, rdi)
    }

    fn pending(
        store: &InMemoryStore,
        program: &Program,
        rdi: &RegistrationDataImport,
        name: &str,
        docs: Vec<Document>,
    ) -> Individual {
        let mut ind = Individual::pending(
            program.program_id,
            program.business_area_id,
            rdi.rdi_id,
            name,
            Sex::Female,
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        );
        ind.documents = docs;
        store.individual_insert(&ind).unwrap();
        ind
    }

    fn canonical(
        store: &InMemoryStore,
        program: &Program,
        name: &str,
        docs: Vec<Document>,
    ) -> Individual {
        let mut ind = Individual::pending(
            program.program_id,
            program.business_area_id,
            new_entity_id(),
            name,
            Sex::Male,
            NaiveDate::from_ymd_opt(1985, 1, 1).unwrap(),
        );
        ind.rdi_merge_status = MergeStatus::Merged;
        ind.documents = docs;
        store.individual_insert(&ind).unwrap();
        ind
    }

    struct FixedPairs(Vec<SimilarityPair>);

    impl BiometricProvider for FixedPairs {
        fn similarity_pairs(
            &self,
            _pending: &[Individual],
            _canonical: &[Individual],
        ) -> Result<Vec<SimilarityPair>, DeduplicationError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenProvider;

    impl BiometricProvider for BrokenProvider {
        fn similarity_pairs(
            &self,
            _pending: &[Individual],
            _canonical: &[Individual],
        ) -> Result<Vec<SimilarityPair>, DeduplicationError> {
            Err(DeduplicationError::ProviderUnavailable {
                reason: "deployment offline".to_string(),
            })
        }
    }

    // === Threshold check ===

    #[test]
    fn test_threshold_absolute_limit() {
        let message = check_duplicates_threshold(10, 5, 0, 50.0, 100).unwrap();
        assert!(message.contains("exceed the maximum allowed (5)"));
    }

    #[test]
    fn test_threshold_within_limits() {
        assert_eq!(check_duplicates_threshold(3, 10, 3, 5.0, 100), None);
    }

    #[test]
    fn test_threshold_percentage_limit() {
        let message = check_duplicates_threshold(3, 10, 2, 0.4, 4).unwrap();
        assert!(message.contains("higher than the allowed (0.4)"));
        assert!(!message.contains("maximum allowed"));
    }

    #[test]
    fn test_threshold_percentage_needs_multiple_batch_duplicates() {
        // One batch duplicate never triggers the percentage rule.
        assert_eq!(check_duplicates_threshold(3, 10, 1, 0.4, 4), None);
    }

    #[test]
    fn test_duplicated_document_signatures_split() {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "p");
        store.program_insert(&program).unwrap();
        let mut rdi =
            RegistrationDataImport::new("batch", program.business_area_id, program.program_id);
        rdi.transition(RdiStatus::Deduplication).unwrap();
        store.rdi_insert(&rdi).unwrap();

        let a = pending(&store, &program, &rdi, "A", vec![national_id("111")]);
        let b = pending(&store, &program, &rdi, "B", vec![national_id("111")]);
        let c = pending(
            &store,
            &program,
            &rdi,
            "C",
            vec![national_id("222"), receipt("333")],
        );

        let (duplicated, unique) = duplicated_document_signatures(&[a, b, c]);
        assert_eq!(duplicated, vec!["national_id--111--UKR".to_string()]);
        // The receipt is not valid for deduplication, so only one unique.
        assert_eq!(unique, vec!["national_id--222--UKR".to_string()]);
    }

    // === Document matching ===

    #[test]
    fn test_batch_duplicates_by_document() {
        let (store, program, rdi) = setup();
        let a = pending(&store, &program, &rdi, "A", vec![national_id("111")]);
        let b = pending(&store, &program, &rdi, "B", vec![national_id("111")]);
        let c = pending(&store, &program, &rdi, "C", vec![national_id("222")]);

        let engine = DeduplicationEngine::new(DeduplicationConfig::default());
        let outcome = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap();
        assert_eq!(outcome.duplicates_in_batch, 2);

        let a = store.individual_get(a.individual_id).unwrap().unwrap();
        let b = store.individual_get(b.individual_id).unwrap().unwrap();
        let c = store.individual_get(c.individual_id).unwrap().unwrap();
        assert_eq!(
            a.deduplication_batch_status,
            DeduplicationBatchStatus::DuplicateInBatch
        );
        assert_eq!(
            b.deduplication_batch_status,
            DeduplicationBatchStatus::DuplicateInBatch
        );
        assert_eq!(
            c.deduplication_batch_status,
            DeduplicationBatchStatus::UniqueInBatch
        );
        // Results name the partner.
        assert_eq!(
            a.deduplication_batch_results[0]["matches"][0],
            serde_json::json!(b.individual_id)
        );
    }

    #[test]
    fn test_golden_duplicates_by_document() {
        let (store, program, rdi) = setup();
        let existing = canonical(&store, &program, "Old", vec![national_id("111")]);
        let incoming = pending(&store, &program, &rdi, "New", vec![national_id("111")]);

        let engine = DeduplicationEngine::new(DeduplicationConfig::default());
        let outcome = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap();
        assert_eq!(outcome.duplicates_against_population, 1);

        let incoming = store.individual_get(incoming.individual_id).unwrap().unwrap();
        assert_eq!(
            incoming.deduplication_golden_record_status,
            DeduplicationGoldenRecordStatus::Duplicate
        );
        assert_eq!(
            incoming.deduplication_golden_record_results[0]["matches"][0],
            serde_json::json!(existing.individual_id)
        );
    }

    #[test]
    fn test_documents_not_valid_for_dedup_ignored() {
        let (store, program, rdi) = setup();
        pending(&store, &program, &rdi, "A", vec![receipt("111")]);
        pending(&store, &program, &rdi, "B", vec![receipt("111")]);

        let engine = DeduplicationEngine::new(DeduplicationConfig::default());
        let outcome = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap();
        assert_eq!(outcome.duplicates_in_batch, 0);
    }

    #[test]
    fn test_withdrawn_canonical_excluded_from_golden_matching() {
        let (store, program, rdi) = setup();
        let mut existing = canonical(&store, &program, "Old", vec![national_id("111")]);
        existing.withdrawn = true;
        store.individual_insert(&existing).unwrap();
        pending(&store, &program, &rdi, "New", vec![national_id("111")]);

        let engine = DeduplicationEngine::new(DeduplicationConfig::default());
        let outcome = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap();
        assert_eq!(outcome.duplicates_against_population, 0);
    }

    // === Biometrics ===

    #[test]
    fn test_biometric_batch_and_golden_classification() {
        let (store, program, rdi) = setup();
        let a = pending(&store, &program, &rdi, "A", vec![]);
        let b = pending(&store, &program, &rdi, "B", vec![]);
        let c = pending(&store, &program, &rdi, "C", vec![]);
        let existing = canonical(&store, &program, "Old", vec![]);

        let provider = FixedPairs(vec![
            // Strong pair within the batch.
            SimilarityPair {
                first: a.individual_id,
                second: b.individual_id,
                score: 0.95,
            },
            // Weak pair against the population.
            SimilarityPair {
                first: c.individual_id,
                second: existing.individual_id,
                score: 0.75,
            },
            // Below the floor, ignored entirely.
            SimilarityPair {
                first: a.individual_id,
                second: c.individual_id,
                score: 0.5,
            },
        ]);
        let engine =
            DeduplicationEngine::new(DeduplicationConfig::default()).with_biometrics(Box::new(provider));
        let outcome = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap();
        assert_eq!(outcome.duplicates_in_batch, 2);
        assert_eq!(outcome.needs_adjudication, 1);

        let c = store.individual_get(c.individual_id).unwrap().unwrap();
        assert_eq!(
            c.deduplication_golden_record_status,
            DeduplicationGoldenRecordStatus::NeedsAdjudication
        );
        assert_eq!(
            c.deduplication_batch_status,
            DeduplicationBatchStatus::UniqueInBatch
        );
    }

    #[test]
    fn test_biometric_provider_failure_marks_import_failed() {
        let (store, program, rdi) = setup();
        pending(&store, &program, &rdi, "A", vec![]);

        let engine = DeduplicationEngine::new(DeduplicationConfig::default())
            .with_biometrics(Box::new(BrokenProvider));
        let err = engine.deduplicate_rdi(&store, rdi.rdi_id).unwrap_err();
        assert!(err.to_string().contains("deployment offline"));

        let rdi = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(rdi.status, RdiStatus::DeduplicationFailed);
    }

    // === Threshold enforcement and state machine ===

    #[test]
    fn test_threshold_failure_commits_nothing() {
        let (store, program, rdi) = setup();
        let mut incoming = Vec::new();
        for n in 0..3 {
            let doc = national_id(&n.to_string());
            canonical(&store, &program, "Old", vec![doc.clone()]);
            incoming.push(pending(&store, &program, &rdi, "New", vec![doc]));
        }

        let config = DeduplicationConfig {
            duplicates_allowed: 1,
            ..Default::default()
        };
        let err = DeduplicationEngine::new(config)
            .deduplicate_rdi(&store, rdi.rdi_id)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("exceed the maximum allowed (1)"));

        let rdi_after = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(rdi_after.status, RdiStatus::DeduplicationFailed);
        assert!(rdi_after
            .error_message
            .as_deref()
            .unwrap()
            .contains("maximum allowed (1)"));
        for ind in &incoming {
            let ind = store.individual_get(ind.individual_id).unwrap().unwrap();
            assert_eq!(
                ind.deduplication_golden_record_status,
                DeduplicationGoldenRecordStatus::NotProcessed
            );
        }
    }

    #[test]
    fn test_failed_import_can_be_retried() {
        let (store, program, rdi) = setup();
        let doc = national_id("111");
        canonical(&store, &program, "Old", vec![doc.clone()]);
        canonical(&store, &program, "Older", vec![doc.clone()]);
        pending(&store, &program, &rdi, "New", vec![doc]);

        let strict = DeduplicationConfig {
            duplicates_allowed: 0,
            ..Default::default()
        };
        DeduplicationEngine::new(strict)
            .deduplicate_rdi(&store, rdi.rdi_id)
            .unwrap_err();
        let failed = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(failed.status, RdiStatus::DeduplicationFailed);
        assert!(failed.error_message.is_some());

        // Retry from DEDUPLICATION_FAILED with a laxer limit succeeds and
        // drops the stale failure message.
        DeduplicationEngine::new(DeduplicationConfig::default())
            .deduplicate_rdi(&store, rdi.rdi_id)
            .unwrap();
        let retried = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(retried.status, RdiStatus::InReview);
        assert_eq!(retried.error_message, None);
    }

    #[test]
    fn test_success_moves_import_to_in_review() {
        let (store, program, rdi) = setup();
        pending(&store, &program, &rdi, "A", vec![national_id("1")]);

        DeduplicationEngine::new(DeduplicationConfig::default())
            .deduplicate_rdi(&store, rdi.rdi_id)
            .unwrap();
        let rdi = store.rdi_get(rdi.rdi_id).unwrap().unwrap();
        assert_eq!(rdi.status, RdiStatus::InReview);
    }

    #[test]
    fn test_wrong_status_rejected() {
        let store = InMemoryStore::new();
        let program = Program::new(new_entity_id(), "p");
        store.program_insert(&program).unwrap();
        let rdi =
            RegistrationDataImport::new("batch-1", program.business_area_id, program.program_id);
        store.rdi_insert(&rdi).unwrap();

        let err = DeduplicationEngine::new(DeduplicationConfig::default())
            .deduplicate_rdi(&store, rdi.rdi_id)
            .unwrap_err();
        assert!(err.to_string().contains("must be in DEDUPLICATION"));
    }

    proptest! {
        #[test]
        fn prop_threshold_quiet_within_absolute_limit_and_single_set(
            duplicates in 0i64..100,
            slack in 0i64..100,
            individuals in 0i64..1000,
        ) {
            // A single duplicate set never trips the percentage rule, so
            // staying under the absolute cap means no failure.
            let verdict =
                check_duplicates_threshold(duplicates, duplicates + slack, 1, 0.0, individuals);
            prop_assert_eq!(verdict, None);
        }

        #[test]
        fn prop_threshold_flags_any_absolute_overflow(
            max_allowed in 0i64..100,
            excess in 1i64..100,
        ) {
            let verdict =
                check_duplicates_threshold(max_allowed + excess, max_allowed, 0, 1_000.0, 10);
            let message = verdict.unwrap();
            let expected = format!("maximum allowed ({max_allowed})");
            prop_assert!(message.contains(&expected));
        }
    }
}
