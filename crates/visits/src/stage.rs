//! Stage and status vocabulary of a visit.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinicflow_core::DomainError;

/// Clinical pipeline position. The derived ordering is the pipeline order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStage {
    Reception,
    Cashier,
    Triage,
    BasicRefractionExam,
    DoctorVisit,
    Pharmacy,
    Completed,
}

impl VisitStage {
    pub const ALL: [VisitStage; 7] = [
        VisitStage::Reception,
        VisitStage::Cashier,
        VisitStage::Triage,
        VisitStage::BasicRefractionExam,
        VisitStage::DoctorVisit,
        VisitStage::Pharmacy,
        VisitStage::Completed,
    ];

    /// Next stage; COMPLETED is its own successor.
    pub fn successor(self) -> VisitStage {
        match self {
            VisitStage::Reception => VisitStage::Cashier,
            VisitStage::Cashier => VisitStage::Triage,
            VisitStage::Triage => VisitStage::BasicRefractionExam,
            VisitStage::BasicRefractionExam => VisitStage::DoctorVisit,
            VisitStage::DoctorVisit => VisitStage::Pharmacy,
            VisitStage::Pharmacy | VisitStage::Completed => VisitStage::Completed,
        }
    }

    /// Status recorded on entering this stage. `None` leaves the status alone.
    pub fn entry_status(self, current: VisitStatus) -> Option<VisitStatus> {
        match self {
            VisitStage::Reception => None,
            VisitStage::Cashier => Some(VisitStatus::PaymentPending),
            VisitStage::Triage if current == VisitStatus::Free => None,
            VisitStage::Triage => Some(VisitStatus::PaymentCompleted),
            VisitStage::BasicRefractionExam => Some(VisitStatus::TriageCompleted),
            VisitStage::DoctorVisit => Some(VisitStatus::BasicRefractionCompleted),
            VisitStage::Pharmacy => Some(VisitStatus::DoctorVisitCompleted),
            VisitStage::Completed => Some(VisitStatus::Completed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStatus {
    Registered,
    Free,
    PaymentPending,
    PaymentCompleted,
    InvoiceCreated,
    TriageCompleted,
    BasicRefractionCompleted,
    DoctorVisitCompleted,
    MedicationDispensed,
    Completed,
    Cancelled,
    NoShow,
}

impl VisitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VisitStatus::Registered => "REGISTERED",
            VisitStatus::Free => "FREE",
            VisitStatus::PaymentPending => "PAYMENT_PENDING",
            VisitStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            VisitStatus::InvoiceCreated => "INVOICE_CREATED",
            VisitStatus::TriageCompleted => "TRIAGE_COMPLETED",
            VisitStatus::BasicRefractionCompleted => "BASIC_REFRACTION_COMPLETED",
            VisitStatus::DoctorVisitCompleted => "DOCTOR_VISIT_COMPLETED",
            VisitStatus::MedicationDispensed => "MEDICATION_DISPENSED",
            VisitStatus::Completed => "COMPLETED",
            VisitStatus::Cancelled => "CANCELLED",
            VisitStatus::NoShow => "NO_SHOW",
        }
    }

    /// Cancelled and no-show sessions accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, VisitStatus::Cancelled | VisitStatus::NoShow)
    }
}

impl FromStr for VisitStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "REGISTERED" => VisitStatus::Registered,
            "FREE" => VisitStatus::Free,
            "PAYMENT_PENDING" => VisitStatus::PaymentPending,
            "PAYMENT_COMPLETED" => VisitStatus::PaymentCompleted,
            "INVOICE_CREATED" => VisitStatus::InvoiceCreated,
            "TRIAGE_COMPLETED" => VisitStatus::TriageCompleted,
            "BASIC_REFRACTION_COMPLETED" => VisitStatus::BasicRefractionCompleted,
            "DOCTOR_VISIT_COMPLETED" => VisitStatus::DoctorVisitCompleted,
            "MEDICATION_DISPENSED" => VisitStatus::MedicationDispensed,
            "COMPLETED" => VisitStatus::Completed,
            "CANCELLED" => VisitStatus::Cancelled,
            "NO_SHOW" => VisitStatus::NoShow,
            other => return Err(DomainError::validation(format!("unknown visit status: {other}"))),
        };
        Ok(status)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitPurpose {
    NewConsultation,
    FollowUp,
    MedicationRefill,
    Review,
    Emergency,
    Surgery,
    RoutineCheckup,
    ComplaintVisit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}
