use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{DomainError, DomainResult, InvoiceId, Money, PatientId, UserId};

use crate::invoice::Invoice;
use crate::purpose::InvoicePurpose;

/// Snapshot kept after an invoice is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedInvoice {
    pub original_invoice_id: InvoiceId,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub patient_id: Option<PatientId>,
    pub total_amount: Money,
    pub invoice_purpose: InvoicePurpose,
    /// The deleted lines, serialized as JSON.
    pub items_json: String,
    pub deleted_by: UserId,
    pub deleted_at: DateTime<Utc>,
}

impl DeletedInvoice {
    pub fn archive(invoice: &Invoice, deleted_by: UserId, at: DateTime<Utc>) -> DomainResult<Self> {
        let items_json = serde_json::to_string(invoice.items())
            .map_err(|e| DomainError::invariant(format!("failed to serialize invoice items: {e}")))?;
        Ok(Self {
            original_invoice_id: invoice.id_typed(),
            invoice_number: invoice.invoice_number().to_string(),
            invoice_date: invoice.invoice_date().map(|d| d.date_naive()),
            patient_id: invoice.patient_id(),
            total_amount: invoice.total_amount(),
            invoice_purpose: invoice.purpose(),
            items_json,
            deleted_by,
            deleted_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use clinicflow_core::{Aggregate, InvoiceItemId};
    use rust_decimal_macros::dec;

    use crate::invoice::{CreateInvoice, InvoiceCommand};
    use crate::pricing::{InvoiceItem, NewInvoiceItem};
    use crate::purpose::ItemType;

    #[test]
    fn archive_keeps_lines_as_json() {
        let at = Utc.with_ymd_and_hms(2025, 9, 9, 9, 9, 9).unwrap();
        let id = InvoiceId::new();
        let item = InvoiceItem::price(
            InvoiceItemId::new(),
            NewInvoiceItem::simple("Lens", ItemType::Optics, 1, Money::new(dec!(300)).unwrap()),
        )
        .unwrap();
        let mut invoice = Invoice::empty(id);
        invoice
            .execute(&InvoiceCommand::Create(CreateInvoice {
                invoice_id: id,
                invoice_number: "INV-20250909-0001".to_string(),
                purpose: InvoicePurpose::OpticsInvoiceBill,
                patient_id: PatientId::new(),
                visit_session_id: None,
                created_by: None,
                due_date: at.date_naive(),
                items: vec![item],
                notes: None,
                occurred_at: at,
            }))
            .unwrap();

        let deleted_by = UserId::new();
        let archived = DeletedInvoice::archive(&invoice, deleted_by, at).unwrap();
        assert_eq!(archived.original_invoice_id, id);
        assert_eq!(archived.total_amount.value(), dec!(300));
        let lines: Vec<InvoiceItem> = serde_json::from_str(&archived.items_json).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_name, "Lens");
    }
}
