//! Strict tags for invoice purpose, line type, and payment state.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use clinicflow_core::DomainError;

/// Identifies which subsystem generated a bill.
///
/// Used to scope the duplicate-creation guard and to decide whether payment
/// debits dispensary stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoicePurpose {
    ConsultationInvoice,
    ProceduresInvoiceBill,
    InvestigationInvoiceBill,
    TreatmentInvoiceBill,
    OpticsInvoiceBill,
    MedicationInvoice,
    GeneralInvoice,
}

impl InvoicePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoicePurpose::ConsultationInvoice => "CONSULTATION_INVOICE",
            InvoicePurpose::ProceduresInvoiceBill => "PROCEDURES_INVOICE_BILL",
            InvoicePurpose::InvestigationInvoiceBill => "INVESTIGATION_INVOICE_BILL",
            InvoicePurpose::TreatmentInvoiceBill => "TREATMENT_INVOICE_BILL",
            InvoicePurpose::OpticsInvoiceBill => "OPTICS_INVOICE_BILL",
            InvoicePurpose::MedicationInvoice => "MEDICATION_INVOICE",
            InvoicePurpose::GeneralInvoice => "GENERAL_INVOICE",
        }
    }

    /// Whether the transition into PAID debits the dispensary rows referenced
    /// by the invoice lines.
    pub fn debits_stock_on_payment(self) -> bool {
        matches!(
            self,
            InvoicePurpose::TreatmentInvoiceBill | InvoicePurpose::OpticsInvoiceBill
        )
    }

    /// Purpose implied by the first line of a hand-built invoice.
    pub fn from_first_item(items: &[ItemType]) -> Self {
        match items.first() {
            Some(ItemType::Consultation) => InvoicePurpose::ConsultationInvoice,
            Some(ItemType::Procedure) => InvoicePurpose::ProceduresInvoiceBill,
            Some(ItemType::Medication) => InvoicePurpose::MedicationInvoice,
            Some(ItemType::LabTest) | Some(ItemType::Investigation) => {
                InvoicePurpose::InvestigationInvoiceBill
            }
            Some(ItemType::Treatment) => InvoicePurpose::TreatmentInvoiceBill,
            Some(ItemType::InventoryItem) | Some(ItemType::Optics) => {
                InvoicePurpose::OpticsInvoiceBill
            }
            Some(ItemType::Other) | None => InvoicePurpose::GeneralInvoice,
        }
    }
}

impl fmt::Display for InvoicePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoicePurpose {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let purpose = match s.trim().to_ascii_uppercase().as_str() {
            "CONSULTATION_INVOICE" => InvoicePurpose::ConsultationInvoice,
            "PROCEDURES_INVOICE_BILL" => InvoicePurpose::ProceduresInvoiceBill,
            "INVESTIGATION_INVOICE_BILL" => InvoicePurpose::InvestigationInvoiceBill,
            "TREATMENT_INVOICE_BILL" => InvoicePurpose::TreatmentInvoiceBill,
            "OPTICS_INVOICE_BILL" => InvoicePurpose::OpticsInvoiceBill,
            "MEDICATION_INVOICE" => InvoicePurpose::MedicationInvoice,
            "GENERAL_INVOICE" => InvoicePurpose::GeneralInvoice,
            other => {
                return Err(DomainError::validation(format!("unknown invoice purpose: {other}")));
            }
        };
        Ok(purpose)
    }
}

/// Kind of a billed line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Consultation,
    Procedure,
    Medication,
    LabTest,
    Investigation,
    Treatment,
    InventoryItem,
    Optics,
    Other,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Sent,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    /// No payment may be recorded against these.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Refunded
        )
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => InvoiceStatus::Draft,
            "PENDING" => InvoiceStatus::Pending,
            "SENT" => InvoiceStatus::Sent,
            "PAID" => InvoiceStatus::Paid,
            "OVERDUE" => InvoiceStatus::Overdue,
            "CANCELLED" => InvoiceStatus::Cancelled,
            "REFUNDED" => InvoiceStatus::Refunded,
            other => {
                return Err(DomainError::validation(format!("unknown invoice status: {other}")));
            }
        };
        Ok(status)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Refunded,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
    Card,
    Insurance,
    Cheque,
}
