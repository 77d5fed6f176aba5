use serde::Deserialize;

use clinicflow_core::{InvestigationId, Money, PatientId, Quantity, RequisitionItemId, TheaterStoreId};
use clinicflow_infra::RequisitionLine;
use clinicflow_inventory::UsageLine;
use clinicflow_invoicing::{OpticsSelection, PaymentMethod};
use clinicflow_requisitions::RequisitionDetails;

// -------------------------
// Visits
// -------------------------

#[derive(Debug, Deserialize)]
pub struct VisitPaymentRequest {
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelVisitRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisitStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitListQuery {
    pub patient_id: Option<String>,
    pub status: Option<String>,
}

// -------------------------
// Invoices
// -------------------------

#[derive(Debug, Deserialize)]
pub struct InvoicePaymentRequest {
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceStatusRequest {
    pub status: String,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateInvoiceRequest {
    #[serde(default)]
    pub investigation_ids: Option<Vec<InvestigationId>>,
    #[serde(default)]
    pub selections: Vec<OpticsSelection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub patient_id: Option<String>,
}

// -------------------------
// Requisitions
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RequisitionRequest {
    #[serde(flatten)]
    pub details: RequisitionDetails,
    pub items: Vec<RequisitionLine>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalLine {
    pub item_id: RequisitionItemId,
    pub quantity: Quantity,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequisitionRequest {
    #[serde(default)]
    pub approvals: Vec<ApprovalLine>,
    #[serde(default)]
    pub target_store_id: Option<TheaterStoreId>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequisitionRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequisitionListQuery {
    pub status: Option<String>,
    /// `true` lists the caller's own requisitions.
    #[serde(default)]
    pub mine: bool,
}

// -------------------------
// Stock
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: Quantity,
}

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    pub lines: Vec<UsageLine>,
}

/// Query helper shared by list endpoints that filter on a patient.
pub fn patient_filter(raw: Option<&str>) -> Result<Option<PatientId>, axum::response::Response> {
    raw.map(crate::app::errors::parse::<PatientId>).transpose()
}
