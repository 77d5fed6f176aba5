use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{DomainError, DomainResult, InventoryItemId, Money, Quantity};

use crate::ledger::{LedgerLocation, LedgerRef, LedgerRow};

/// Input for registering a dispensary item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sku: String,
    pub unit_price: Money,
    #[serde(default)]
    pub quantity_in_stock: Quantity,
    #[serde(default)]
    pub reorder_level: Quantity,
}

/// Dispensary stock (drugs, spectacles, lenses) sold over the counter or on
/// treatment/optics invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    name: String,
    description: Option<String>,
    sku: String,
    unit_price: Money,
    quantity_in_stock: Quantity,
    reorder_level: Quantity,
    updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn create(id: InventoryItemId, input: NewInventoryItem, at: DateTime<Utc>) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if input.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            sku: input.sku.trim().to_string(),
            unit_price: input.unit_price,
            quantity_in_stock: input.quantity_in_stock,
            reorder_level: input.reorder_level,
            updated_at: at,
        })
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn quantity_in_stock(&self) -> Quantity {
        self.quantity_in_stock
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity_in_stock <= self.reorder_level
    }

    /// Availability check used when a sale is billed; stock is only debited
    /// once the invoice is paid.
    pub fn ensure_available(&self, quantity: Quantity) -> DomainResult<()> {
        if self.quantity_in_stock < quantity {
            return Err(DomainError::insufficient_stock(format!(
                "Insufficient stock for item: {}. Available: {}, Requested: {}",
                self.name, self.quantity_in_stock, quantity
            )));
        }
        Ok(())
    }
}

impl LedgerRow for InventoryItem {
    fn ledger_ref(&self) -> LedgerRef {
        LedgerRef::Dispensary(self.id)
    }

    fn location(&self) -> LedgerLocation {
        LedgerLocation::Dispensary
    }

    fn item_name(&self) -> &str {
        &self.name
    }

    fn on_hand(&self) -> Quantity {
        self.quantity_in_stock
    }

    fn store_on_hand(&mut self, quantity: Quantity, at: DateTime<Utc>) {
        self.quantity_in_stock = quantity;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn availability_check_does_not_touch_stock() {
        let at = Utc.with_ymd_and_hms(2025, 5, 5, 10, 0, 0).unwrap();
        let item = InventoryItem::create(
            InventoryItemId::new(),
            NewInventoryItem {
                name: "Timolol 0.5% drops".to_string(),
                description: None,
                sku: "TIM-05".to_string(),
                unit_price: Money::new(dec!(7500)).unwrap(),
                quantity_in_stock: Quantity::from_units(2),
                reorder_level: Quantity::from_units(1),
            },
            at,
        )
        .unwrap();

        assert!(item.ensure_available(Quantity::from_units(2)).is_ok());
        let err = item.ensure_available(Quantity::from_units(3)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(_)));
        assert_eq!(item.quantity_in_stock(), Quantity::from_units(2));
    }
}
