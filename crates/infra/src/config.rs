//! Workflow tunables.

use chrono::Duration;
use rust_decimal::Decimal;

use clinicflow_core::Quantity;
use clinicflow_inventory::{NewTheaterStore, TheaterStoreItemDefaults, TheaterStoreType};

/// Knobs shared by every service. `Default` matches production behavior.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Minimum gap between two invoices of the same purpose for one patient.
    pub invoice_guard_window: Duration,
    /// Tax percentage applied to generated (procedure, investigation, treatment, optics) invoices.
    pub generated_invoice_tax: Decimal,
    /// Days until a generated invoice falls due.
    pub payment_due_days: i64,
    /// How often a conflicting transaction is re-run before giving up.
    pub commit_attempts: u32,
    /// Label of the general store on transfer records.
    pub general_store_label: String,
    /// Store created on demand when an approval finds no active theater store.
    pub default_theater_store: NewTheaterStore,
    /// Levels of theater store rows opened by transfers.
    pub theater_row_defaults: TheaterStoreItemDefaults,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            invoice_guard_window: Duration::seconds(120),
            generated_invoice_tax: Decimal::from(18),
            payment_due_days: 30,
            commit_attempts: 8,
            general_store_label: "General Store".to_string(),
            default_theater_store: NewTheaterStore {
                name: "Main Theater Store".to_string(),
                description: Some("Created automatically for requisition transfers".to_string()),
                location: None,
                store_type: TheaterStoreType::Surgical,
                capacity: 1000,
            },
            theater_row_defaults: TheaterStoreItemDefaults {
                minimum_quantity: Quantity::ZERO,
                maximum_quantity: Quantity::from_units(1000),
                is_sterile: false,
            },
        }
    }
}

impl WorkflowConfig {
    pub fn with_invoice_guard_window(mut self, window: Duration) -> Self {
        self.invoice_guard_window = window;
        self
    }

    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts;
        self
    }
}
