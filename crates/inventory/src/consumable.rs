use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicflow_core::{ConsumableItemId, DomainError, DomainResult, Money, Quantity};

use crate::ledger::{LedgerLocation, LedgerRef, LedgerRow};

/// Input for registering a consumable in the general store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConsumable {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub unit_of_measure: String,
    #[serde(default)]
    pub opening_stock: Quantity,
    #[serde(default)]
    pub minimum_stock_level: Quantity,
    #[serde(default)]
    pub maximum_stock_level: Quantity,
    #[serde(default)]
    pub reorder_point: Quantity,
    #[serde(default)]
    pub reorder_quantity: Quantity,
    pub cost_per_unit: Money,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

/// General-store stock row: exactly one per consumable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableItem {
    id: ConsumableItemId,
    name: String,
    description: Option<String>,
    sku: Option<String>,
    unit_of_measure: String,
    current_stock: Quantity,
    minimum_stock_level: Quantity,
    maximum_stock_level: Quantity,
    reorder_point: Quantity,
    reorder_quantity: Quantity,
    cost_per_unit: Money,
    expiry_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConsumableItem {
    pub fn create(id: ConsumableItemId, input: NewConsumable, at: DateTime<Utc>) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if input.unit_of_measure.trim().is_empty() {
            return Err(DomainError::validation("unit of measure cannot be empty"));
        }
        if !input.maximum_stock_level.is_zero() && input.maximum_stock_level < input.minimum_stock_level {
            return Err(DomainError::validation(
                "maximum stock level cannot be below minimum stock level",
            ));
        }
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            sku: input.sku,
            unit_of_measure: input.unit_of_measure,
            current_stock: input.opening_stock,
            minimum_stock_level: input.minimum_stock_level,
            maximum_stock_level: input.maximum_stock_level,
            reorder_point: input.reorder_point,
            reorder_quantity: input.reorder_quantity,
            cost_per_unit: input.cost_per_unit,
            expiry_date: input.expiry_date,
            is_active: true,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn id_typed(&self) -> ConsumableItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn unit_of_measure(&self) -> &str {
        &self.unit_of_measure
    }

    pub fn current_stock(&self) -> Quantity {
        self.current_stock
    }

    pub fn minimum_stock_level(&self) -> Quantity {
        self.minimum_stock_level
    }

    pub fn reorder_point(&self) -> Quantity {
        self.reorder_point
    }

    pub fn cost_per_unit(&self) -> Money {
        self.cost_per_unit
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// At or below the reorder point, or at or below the minimum level.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_point || self.current_stock <= self.minimum_stock_level
    }

    /// `current_stock × cost_per_unit`, unrounded.
    pub fn stock_value(&self) -> Decimal {
        self.current_stock.value() * self.cost_per_unit.value()
    }
}

impl LedgerRow for ConsumableItem {
    fn ledger_ref(&self) -> LedgerRef {
        LedgerRef::General(self.id)
    }

    fn location(&self) -> LedgerLocation {
        LedgerLocation::GeneralStore
    }

    fn item_name(&self) -> &str {
        &self.name
    }

    fn on_hand(&self) -> Quantity {
        self.current_stock
    }

    fn store_on_hand(&mut self, quantity: Quantity, at: DateTime<Utc>) {
        self.current_stock = quantity;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 8, 0, 0).unwrap()
    }

    fn gauze(stock: Decimal) -> ConsumableItem {
        ConsumableItem::create(
            ConsumableItemId::new(),
            NewConsumable {
                name: "Sterile gauze".to_string(),
                description: None,
                sku: Some("GZ-01".to_string()),
                unit_of_measure: "pack".to_string(),
                opening_stock: Quantity::new(stock).unwrap(),
                minimum_stock_level: Quantity::new(dec!(5)).unwrap(),
                maximum_stock_level: Quantity::new(dec!(500)).unwrap(),
                reorder_point: Quantity::new(dec!(10)).unwrap(),
                reorder_quantity: Quantity::new(dec!(100)).unwrap(),
                cost_per_unit: Money::new(dec!(2.50)).unwrap(),
                expiry_date: None,
            },
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn debit_reduces_stock_and_reports_movement() {
        let mut item = gauze(dec!(20));
        let movement = item.debit(Quantity::new(dec!(7)).unwrap(), test_time()).unwrap();
        assert_eq!(item.current_stock().value(), dec!(13));
        assert_eq!(movement.delta, dec!(-7));
        assert_eq!(movement.balance_after.value(), dec!(13));
    }

    #[test]
    fn overdraw_is_rejected_without_change() {
        let mut item = gauze(dec!(3));
        let err = item.debit(Quantity::new(dec!(4)).unwrap(), test_time()).unwrap_err();
        match err {
            DomainError::InsufficientStock(msg) => {
                assert!(msg.contains("general store"));
                assert!(msg.contains("Sterile gauze"));
                assert!(msg.contains("Available: 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(item.current_stock().value(), dec!(3));
    }

    #[test]
    fn zero_debit_is_a_validation_error() {
        let mut item = gauze(dec!(3));
        assert!(matches!(
            item.debit(Quantity::ZERO, test_time()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn low_stock_uses_reorder_point_or_minimum() {
        assert!(gauze(dec!(10)).is_low_stock());
        assert!(!gauze(dec!(11)).is_low_stock());
    }

    #[test]
    fn stock_value_multiplies_cost() {
        assert_eq!(gauze(dec!(4)).stock_value(), dec!(10.00));
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = ConsumableItem::create(
            ConsumableItemId::new(),
            NewConsumable {
                name: "  ".to_string(),
                description: None,
                sku: None,
                unit_of_measure: "pack".to_string(),
                opening_stock: Quantity::ZERO,
                minimum_stock_level: Quantity::ZERO,
                maximum_stock_level: Quantity::ZERO,
                reorder_point: Quantity::ZERO,
                reorder_quantity: Quantity::ZERO,
                cost_per_unit: Money::ZERO,
                expiry_date: None,
            },
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn stock_never_goes_negative(
            opening in 0u32..1_000,
            ops in proptest::collection::vec((any::<bool>(), 1u32..200), 0..40),
        ) {
            let mut item = gauze(Decimal::from(opening));
            let mut expected = Decimal::from(opening);
            for (is_debit, qty) in ops {
                let q = Quantity::from_units(qty);
                if is_debit {
                    match item.debit(q, test_time()) {
                        Ok(_) => expected -= Decimal::from(qty),
                        Err(DomainError::InsufficientStock(_)) => prop_assert!(Decimal::from(qty) > expected),
                        Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                    }
                } else {
                    item.credit(q, test_time()).unwrap();
                    expected += Decimal::from(qty);
                }
                prop_assert!(item.current_stock().value() >= Decimal::ZERO);
                prop_assert_eq!(item.current_stock().value(), expected);
            }
        }
    }
}
