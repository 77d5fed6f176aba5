//! RequisitionWorkflow domain: bundled requests to move consumables from the
//! general store into a theater store.
//!
//! `DRAFT → SUBMITTED → {APPROVED, REJECTED}`. Approval fixes the approved
//! quantity of every line; the stock movement itself is performed by the
//! transfer engine in the infra crate, in the same transaction.

pub mod numbering;
pub mod requisition;

pub use numbering::requisition_number;
pub use requisition::{
    ApproveRequisition, CreateRequisition, PricedLine, Priority, RejectRequisition,
    RequisitionCommand, RequisitionDetails, RequisitionEvent, RequisitionItem, RequisitionStatus,
    SubmitRequisition, TheaterRequisition, UpdateRequisition,
};
