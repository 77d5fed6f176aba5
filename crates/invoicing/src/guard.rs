//! Duplicate-creation guard scoped to (patient, purpose).
//!
//! This is a time-window check, not a lock: the store keeps the creation time
//! of the most recent invoice per key in an index row that every creation reads
//! and writes, so two concurrent creations conflict at commit and the retried
//! one sees the first.

use chrono::{DateTime, Duration, Utc};

use clinicflow_core::{DomainError, DomainResult, PatientId};

use crate::purpose::InvoicePurpose;

/// Index key for the guard.
pub type GuardKey = (PatientId, InvoicePurpose);

/// Reject when the last invoice for the same key was created less than
/// `window` before `now`.
pub fn ensure_guard_window_elapsed(
    purpose: InvoicePurpose,
    last_created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> DomainResult<()> {
    let Some(last) = last_created_at else {
        return Ok(());
    };
    let elapsed = now - last;
    if elapsed >= window {
        return Ok(());
    }
    let remaining = (window - elapsed).num_seconds().max(1);
    Err(DomainError::conflict(format!(
        "Cannot create another {purpose} invoice for this patient. \
         Please wait {remaining} more seconds before creating another invoice of the same purpose. \
         Last invoice was created {} seconds ago.",
        elapsed.num_seconds().max(0)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn first_invoice_is_always_allowed() {
        assert!(
            ensure_guard_window_elapsed(
                InvoicePurpose::ConsultationInvoice,
                None,
                test_time(),
                Duration::seconds(120)
            )
            .is_ok()
        );
    }

    #[test]
    fn second_invoice_inside_window_conflicts() {
        let err = ensure_guard_window_elapsed(
            InvoicePurpose::TreatmentInvoiceBill,
            Some(test_time()),
            test_time() + Duration::seconds(119),
            Duration::seconds(120),
        )
        .unwrap_err();
        match err {
            DomainError::Conflict(msg) => {
                assert!(msg.contains("TREATMENT_INVOICE_BILL"));
                assert!(msg.contains("wait 1 more seconds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn window_boundary_is_inclusive_of_elapsed() {
        assert!(
            ensure_guard_window_elapsed(
                InvoicePurpose::TreatmentInvoiceBill,
                Some(test_time()),
                test_time() + Duration::seconds(120),
                Duration::seconds(120),
            )
            .is_ok()
        );
    }
}
