use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    ConsumableItemId, DomainError, DomainResult, PatientProcedureId, Quantity, TheaterStoreId,
    TheaterStoreItemId, UsageId, UserId,
};

use crate::ledger::LedgerRef;

/// One consumption line as submitted by theater staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLine {
    pub consumable_item_id: ConsumableItemId,
    #[serde(default)]
    pub theater_store_id: Option<TheaterStoreId>,
    pub quantity: Quantity,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UsageLine {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity.is_zero() {
            return Err(DomainError::validation("quantity used must be greater than zero"));
        }
        if let Some(batch) = &self.batch_number {
            if batch.trim().is_empty() {
                return Err(DomainError::validation("batch number cannot be blank"));
            }
            if self.theater_store_id.is_none() {
                return Err(DomainError::validation(
                    "a batch number requires a theater store",
                ));
            }
        }
        Ok(())
    }
}

/// Immutable record of stock consumed against a clinical procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureUsage {
    id: UsageId,
    procedure_id: PatientProcedureId,
    consumable_item_id: ConsumableItemId,
    theater_store_id: Option<TheaterStoreId>,
    depleted: LedgerRef,
    quantity_used: Quantity,
    batch_number: Option<String>,
    purpose: Option<String>,
    notes: Option<String>,
    used_by: UserId,
    used_at: DateTime<Utc>,
}

impl ProcedureUsage {
    pub fn record(
        id: UsageId,
        procedure_id: PatientProcedureId,
        line: UsageLine,
        depleted: LedgerRef,
        used_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            procedure_id,
            consumable_item_id: line.consumable_item_id,
            theater_store_id: line.theater_store_id,
            depleted,
            quantity_used: line.quantity,
            batch_number: line.batch_number,
            purpose: line.purpose,
            notes: line.notes,
            used_by,
            used_at: at,
        }
    }

    pub fn id_typed(&self) -> UsageId {
        self.id
    }

    pub fn procedure_id(&self) -> PatientProcedureId {
        self.procedure_id
    }

    pub fn consumable_item_id(&self) -> ConsumableItemId {
        self.consumable_item_id
    }

    pub fn theater_store_id(&self) -> Option<TheaterStoreId> {
        self.theater_store_id
    }

    /// The ledger row this usage was debited from.
    pub fn depleted(&self) -> LedgerRef {
        self.depleted
    }

    pub fn theater_store_item_id(&self) -> Option<TheaterStoreItemId> {
        match self.depleted {
            LedgerRef::Theater(id) => Some(id),
            _ => None,
        }
    }

    pub fn quantity_used(&self) -> Quantity {
        self.quantity_used
    }

    pub fn batch_number(&self) -> Option<&str> {
        self.batch_number.as_deref()
    }

    pub fn used_by(&self) -> UserId {
        self.used_by
    }

    pub fn used_at(&self) -> DateTime<Utc> {
        self.used_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> UsageLine {
        UsageLine {
            consumable_item_id: ConsumableItemId::new(),
            theater_store_id: None,
            quantity: Quantity::from_units(1),
            batch_number: None,
            purpose: Some("phaco".to_string()),
            notes: None,
        }
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut l = line();
        l.quantity = Quantity::ZERO;
        assert!(matches!(l.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn batch_without_store_is_rejected() {
        let mut l = line();
        l.batch_number = Some("B-1".to_string());
        assert!(l.validate().is_err());
        l.theater_store_id = Some(TheaterStoreId::new());
        assert!(l.validate().is_ok());
    }
}
