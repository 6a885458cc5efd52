//! Payment signature hashing
//!
//! SHA-1 over the UTF-8 concatenation of a fixed, ordered list of payment
//! fields plus the household snapshot. The digest is persisted on the
//! payment; recomputing it against an unchanged snapshot must reproduce the
//! stored value byte for byte, so the field order and rendering here are
//! part of the wire format and must not change.

use crate::entities::{Payment, PaymentHouseholdSnapshot};
use crate::identity::SignatureHash;
use sha1::{Digest, Sha1};

/// Render one signature field. Absent values render as the empty string so
/// that setting a previously-absent field always changes the digest.
fn render_opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

/// Compute the tamper-evidence signature for a payment and its household
/// snapshot.
///
/// Field order: parent_id, conflicted, excluded, entitlement_date,
/// collector_id, currency, entitlement_quantity, entitlement_quantity_usd,
/// delivered_quantity, household snapshot JSON, status,
/// transaction_reference_id.
pub fn payment_signature(
    payment: &Payment,
    snapshot: Option<&PaymentHouseholdSnapshot>,
) -> SignatureHash {
    let snapshot_data = snapshot
        .map(|s| s.snapshot_data.to_string())
        .unwrap_or_default();

    let fields = [
        payment.parent_id.to_string(),
        payment.conflicted.to_string(),
        payment.excluded.to_string(),
        payment
            .entitlement_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_default(),
        render_opt(&payment.collector_id),
        payment.currency.clone(),
        render_opt(&payment.entitlement_quantity),
        render_opt(&payment.entitlement_quantity_usd),
        render_opt(&payment.delivered_quantity),
        snapshot_data,
        payment.status.as_db_str().to_string(),
        render_opt(&payment.transaction_reference_id),
    ];

    let mut hasher = Sha1::new();
    for field in &fields {
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// TESTS
// =============================================================================
