//! Billable sources recorded against a visit session.
//!
//! Generators turn these into invoice lines. Investigations carry a `billed`
//! flag that is flipped in the same transaction as the invoice insert, so an
//! investigation can appear on at most one invoice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    DomainError, DomainResult, InvestigationId, InventoryItemId, Money, PatientId,
    PatientProcedureId, Percentage, TreatmentId, VisitSessionId,
};

use crate::pricing::NewInvoiceItem;
use crate::purpose::ItemType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProcedure {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProcedure {
    pub id: PatientProcedureId,
    pub visit_session_id: VisitSessionId,
    pub patient_id: PatientId,
    pub name: String,
    pub description: Option<String>,
    pub cost: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PatientProcedure {
    pub fn register(
        id: PatientProcedureId,
        visit_session_id: VisitSessionId,
        patient_id: PatientId,
        input: NewProcedure,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = required(&input.name, "procedure name")?;
        Ok(Self {
            id,
            visit_session_id,
            patient_id,
            name,
            description: input.description,
            cost: input.cost,
            notes: input.notes,
            created_at: at,
        })
    }

    pub fn to_invoice_line(&self, tax: Percentage) -> NewInvoiceItem {
        let mut line = NewInvoiceItem::simple(&self.name, ItemType::Procedure, 1, self.cost).with_tax(tax);
        line.item_description = self.description.clone();
        line.notes = self.notes.clone();
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvestigation {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    pub cost: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInvestigation {
    pub id: InvestigationId,
    pub visit_session_id: VisitSessionId,
    pub patient_id: PatientId,
    pub name: String,
    pub quantity: u32,
    pub cost: Money,
    pub notes: Option<String>,
    pub billed: bool,
    pub billed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PatientInvestigation {
    pub fn register(
        id: InvestigationId,
        visit_session_id: VisitSessionId,
        patient_id: PatientId,
        input: NewInvestigation,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = required(&input.name, "investigation name")?;
        if input.quantity == 0 {
            return Err(DomainError::validation("investigation quantity must be greater than zero"));
        }
        Ok(Self {
            id,
            visit_session_id,
            patient_id,
            name,
            quantity: input.quantity,
            cost: input.cost,
            notes: input.notes,
            billed: false,
            billed_at: None,
            created_at: at,
        })
    }

    pub fn to_invoice_line(&self, tax: Percentage) -> NewInvoiceItem {
        let mut line =
            NewInvoiceItem::simple(&self.name, ItemType::Investigation, self.quantity, self.cost).with_tax(tax);
        line.notes = self.notes.clone();
        line
    }

    pub fn mark_billed(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.billed {
            return Err(DomainError::conflict(format!(
                "investigation {} has already been billed",
                self.id
            )));
        }
        self.billed = true;
        self.billed_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTreatment {
    pub item_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub inventory_item_id: Option<InventoryItemId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A prescribed treatment, usually dispensed from dispensary stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientTreatment {
    pub id: TreatmentId,
    pub visit_session_id: VisitSessionId,
    pub patient_id: PatientId,
    pub item_name: String,
    pub sku: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub inventory_item_id: Option<InventoryItemId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PatientTreatment {
    pub fn register(
        id: TreatmentId,
        visit_session_id: VisitSessionId,
        patient_id: PatientId,
        input: NewTreatment,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let item_name = required(&input.item_name, "treatment item name")?;
        if input.quantity == 0 {
            return Err(DomainError::validation("treatment quantity must be greater than zero"));
        }
        Ok(Self {
            id,
            visit_session_id,
            patient_id,
            item_name,
            sku: input.sku,
            quantity: input.quantity,
            unit_price: input.unit_price,
            inventory_item_id: input.inventory_item_id,
            notes: input.notes,
            created_at: at,
        })
    }

    pub fn to_invoice_line(&self, tax: Percentage) -> NewInvoiceItem {
        let mut line =
            NewInvoiceItem::simple(&self.item_name, ItemType::Treatment, self.quantity, self.unit_price)
                .with_tax(tax);
        line.inventory_item_id = self.inventory_item_id;
        line.sku = self.sku.clone();
        line.notes = self.notes.clone();
        line
    }
}

/// One dispensary item picked for an optics invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpticsSelection {
    pub inventory_item_id: InventoryItemId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

fn required(value: &str, field: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap()
    }

    #[test]
    fn investigation_can_only_be_billed_once() {
        let mut inv = PatientInvestigation::register(
            InvestigationId::new(),
            VisitSessionId::new(),
            PatientId::new(),
            NewInvestigation {
                name: "OCT scan".to_string(),
                quantity: 1,
                cost: Money::new(dec!(45000)).unwrap(),
                notes: None,
            },
            test_time(),
        )
        .unwrap();
        inv.mark_billed(test_time()).unwrap();
        assert_eq!(inv.billed_at, Some(test_time()));
        assert!(matches!(inv.mark_billed(test_time()), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn treatment_line_keeps_the_inventory_reference() {
        let stock = InventoryItemId::new();
        let treatment = PatientTreatment::register(
            TreatmentId::new(),
            VisitSessionId::new(),
            PatientId::new(),
            NewTreatment {
                item_name: "Timolol 0.5%".to_string(),
                sku: Some("TIM-05".to_string()),
                quantity: 2,
                unit_price: Money::new(dec!(8500)).unwrap(),
                inventory_item_id: Some(stock),
                notes: None,
            },
            test_time(),
        )
        .unwrap();
        let line = treatment.to_invoice_line(Percentage::new(dec!(18)).unwrap());
        assert_eq!(line.inventory_item_id, Some(stock));
        assert_eq!(line.item_type, ItemType::Treatment);
        assert_eq!(line.quantity, 2);
    }

    #[test]
    fn procedure_name_is_required() {
        let err = PatientProcedure::register(
            PatientProcedureId::new(),
            VisitSessionId::new(),
            PatientId::new(),
            NewProcedure {
                name: " ".to_string(),
                description: None,
                cost: Money::ZERO,
                notes: None,
            },
            test_time(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::validation("procedure name is required"));
    }
}
