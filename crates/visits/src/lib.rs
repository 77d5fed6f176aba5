//! VisitWorkflow domain: the visit session state machine and the
//! one-per-visit clinical records that move it forward.
//!
//! ```text
//! RECEPTION → CASHIER → TRIAGE → BASIC_REFRACTION_EXAM → DOCTOR_VISIT → PHARMACY → COMPLETED
//!                     ^
//!                     payment gate
//! ```
//!
//! The aggregate never looks up invoices itself. Callers pass the payment
//! state of the linked invoice into the commands that cross the gate.

pub mod clinical;
pub mod session;
pub mod stage;

pub use clinical::{
    BasicRefractionExam, ClinicalData, ClinicalRecord, ClinicalRecordKind, EyeRefraction,
    MainExamination, TriageMeasurement,
};
pub use session::{
    AdvanceStage, CancelVisit, CompleteClinicalStage, CompleteVisit, LinkInvoice, MarkNoShow,
    RecordVisitPayment, RegisterVisit, SetVisitStatus, UnlinkInvoice, VisitCommand, VisitEvent,
    VisitSession,
};
pub use stage::{EmergencyLevel, VisitPurpose, VisitStage, VisitStatus};
