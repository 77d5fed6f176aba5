//! `clinicflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the error taxonomy shared by every workflow, typed identifiers, the aggregate
//! contract, decimal value objects and the wall clock abstraction.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    ClinicalRecordId, ConsumableItemId, DepartmentId, InventoryItemId, InvestigationId,
    InvoiceId, InvoiceItemId, PatientId, PatientProcedureId, RequisitionId, RequisitionItemId,
    TheaterStoreId, TheaterStoreItemId, TransferId, TreatmentId, UsageId, UserId,
    VisitSessionId,
};
pub use value_object::{Money, Percentage, Quantity, ValueObject};
