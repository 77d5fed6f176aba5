//! InvoiceLedger domain: priced invoices, payment tracking, the duplicate
//! guard, and the visit-attached sources that generators bill from.
//!
//! The [`Invoice`] aggregate emits [`InvoiceEvent::Paid`] exactly when the
//! invoice transitions into PAID, whichever path (amount-based payment or a
//! direct status change) caused it. Stock debiting for dispensary sales is
//! keyed on the persisted `stock_debited` flag, not on the event, so it fires
//! at most once per invoice.

pub mod archive;
pub mod billing;
pub mod guard;
pub mod invoice;
pub mod numbering;
pub mod pricing;
pub mod purpose;

pub use archive::DeletedInvoice;
pub use billing::{
    NewInvestigation, NewProcedure, NewTreatment, OpticsSelection, PatientInvestigation,
    PatientProcedure, PatientTreatment,
};
pub use guard::{GuardKey, ensure_guard_window_elapsed};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceEvent, MarkStockDebited, RecordPayment,
    SetInvoiceStatus,
};
pub use numbering::invoice_number;
pub use pricing::{InvoiceItem, InvoiceTotals, LineAmounts, NewInvoiceItem};
pub use purpose::{InvoicePurpose, InvoiceStatus, ItemType, PaymentMethod, PaymentStatus};
