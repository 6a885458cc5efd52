//! Payment household snapshots
//!
//! Captures the state of each payment's household at plan preparation
//! time, then signs the payment over that capture. Snapshots are
//! append-only: a payment that already has one is never re-captured, so
//! later population changes cannot alter what was paid against.

use hope_core::{
    payment_signature, CollectorRole, HopeResult, Payment, PaymentHouseholdSnapshot, PaymentId,
    PaymentPlanId, SnapshotConfig, StorageError, ValidationError,
};
use hope_storage::{PaymentUpdate, PopulationStore};
use tracing::{info, warn};

/// Outcome of one snapshot run over a payment plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Snapshots created in this run.
    pub created: usize,
    /// Payments skipped because a snapshot already existed.
    pub skipped_existing: usize,
    /// Per-payment failures. Failures never abort the run; the remaining
    /// payments of the plan are still processed.
    pub errors: Vec<(PaymentId, String)>,
}

/// Create household snapshots for every un-snapshotted payment of a plan
/// and stamp each payment's signature hash.
///
/// Payments are processed in id order, in pages of
/// [`SnapshotConfig::page_size`] to bound the working set. Idempotent:
/// re-running over a fully snapshotted plan is a no-op.
pub fn create_payment_plan_snapshot_data(
    store: &dyn PopulationStore,
    plan_id: PaymentPlanId,
    config: &SnapshotConfig,
) -> HopeResult<SnapshotReport> {
    store
        .payment_plan_get(plan_id)?
        .ok_or(StorageError::NotFound {
            entity: "PaymentPlan",
            id: plan_id,
        })?;

    let mut report = SnapshotReport::default();
    let mut todo = Vec::new();
    for payment in store.payments_by_plan_ordered(plan_id)? {
        if store.snapshot_exists(payment.payment_id)? {
            report.skipped_existing += 1;
        } else {
            todo.push(payment);
        }
    }
    info!(
        plan = %plan_id,
        pending = todo.len(),
        skipped = report.skipped_existing,
        "creating payment snapshots"
    );

    for page in todo.chunks(config.page_size.max(1)) {
        for payment in page {
            match snapshot_one(store, payment) {
                Ok(()) => report.created += 1,
                Err(err) => {
                    warn!(payment = %payment.payment_id, error = %err, "snapshot failed");
                    report.errors.push((payment.payment_id, err.to_string()));
                }
            }
        }
    }
    Ok(report)
}

/// Capture one payment's household and sign the payment.
fn snapshot_one(store: &dyn PopulationStore, payment: &Payment) -> HopeResult<()> {
    let data = household_snapshot_data(store, payment)?;
    let snapshot = PaymentHouseholdSnapshot::new(payment.payment_id, data);
    store.snapshot_insert(&snapshot)?;

    let hash = payment_signature(payment, Some(&snapshot));
    store.payment_update(
        payment.payment_id,
        PaymentUpdate {
            signature_hash: Some(hash),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Point-in-time JSON capture of the payment's household: the household
/// row, its members (with documents and bank accounts), its collector
/// role assignments, and the resolved primary and alternate collectors.
fn household_snapshot_data(
    store: &dyn PopulationStore,
    payment: &Payment,
) -> HopeResult<serde_json::Value> {
    let household = store
        .household_get(payment.household_id)?
        .ok_or(StorageError::NotFound {
            entity: "Household",
            id: payment.household_id,
        })?;
    let members = store.individuals_by_household(household.household_id)?;
    let roles = store.roles_by_household(household.household_id)?;

    let collector_for = |role: CollectorRole| {
        roles
            .iter()
            .find(|r| r.role == role)
            .and_then(|r| members.iter().find(|m| m.individual_id == r.individual_id))
    };
    let primary_collector = collector_for(CollectorRole::Primary);
    let alternate_collector = collector_for(CollectorRole::Alternate);

    let mut data = to_json(&household)?;
    if let Some(map) = data.as_object_mut() {
        map.insert(
            "individuals".to_string(),
            serde_json::Value::Array(
                members.iter().map(to_json).collect::<HopeResult<Vec<_>>>()?,
            ),
        );
        map.insert(
            "roles".to_string(),
            serde_json::Value::Array(
                roles.iter().map(to_json).collect::<HopeResult<Vec<_>>>()?,
            ),
        );
        map.insert(
            "primary_collector".to_string(),
            match primary_collector {
                Some(collector) => to_json(collector)?,
                None => serde_json::Value::Null,
            },
        );
        map.insert(
            "alternate_collector".to_string(),
            match alternate_collector {
                Some(collector) => to_json(collector)?,
                None => serde_json::Value::Null,
            },
        );
    }
    Ok(data)
}

fn to_json<T: serde::Serialize>(value: &T) -> HopeResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| {
        ValidationError::InvalidValue {
            field: "snapshot_data".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// =============================================================================
// TESTS
// =============================================================================
