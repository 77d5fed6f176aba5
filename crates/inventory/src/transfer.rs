use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    ConsumableItemId, DomainResult, Money, Quantity, RequisitionId, TheaterStoreId,
    TheaterStoreItemId, TransferId, UserId,
};

/// One line of a transfer: how much of an item moved into which theater row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub consumable_item_id: ConsumableItemId,
    pub theater_store_item_id: TheaterStoreItemId,
    pub quantity: Quantity,
    pub unit_cost: Money,
    pub total_cost: Money,
}

/// Immutable audit record of one approval-triggered movement from the general
/// store to a theater store. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterStoreTransfer {
    id: TransferId,
    requisition_id: RequisitionId,
    from_store: String,
    to_store_id: TheaterStoreId,
    transferred_by: UserId,
    transferred_at: DateTime<Utc>,
    items: Vec<TransferItem>,
}

impl TheaterStoreTransfer {
    pub fn begin(
        id: TransferId,
        requisition_id: RequisitionId,
        from_store: impl Into<String>,
        to_store_id: TheaterStoreId,
        transferred_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requisition_id,
            from_store: from_store.into(),
            to_store_id,
            transferred_by,
            transferred_at: at,
            items: Vec::new(),
        }
    }

    /// Append a line; only used while the transfer is being assembled.
    pub fn record_line(
        &mut self,
        consumable_item_id: ConsumableItemId,
        theater_store_item_id: TheaterStoreItemId,
        quantity: Quantity,
        unit_cost: Money,
    ) -> DomainResult<()> {
        let total_cost = unit_cost.checked_mul_quantity(quantity.value())?;
        self.items.push(TransferItem {
            consumable_item_id,
            theater_store_item_id,
            quantity,
            unit_cost,
            total_cost,
        });
        Ok(())
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn requisition_id(&self) -> RequisitionId {
        self.requisition_id
    }

    pub fn from_store(&self) -> &str {
        &self.from_store
    }

    pub fn to_store_id(&self) -> TheaterStoreId {
        self.to_store_id
    }

    pub fn transferred_by(&self) -> UserId {
        self.transferred_by
    }

    pub fn transferred_at(&self) -> DateTime<Utc> {
        self.transferred_at
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    /// Total quantity moved for one consumable across all lines.
    pub fn quantity_for(&self, item: ConsumableItemId) -> Decimal {
        self.items
            .iter()
            .filter(|line| line.consumable_item_id == item)
            .map(|line| line.quantity.value())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn lines_carry_total_cost() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let item = ConsumableItemId::new();
        let mut transfer = TheaterStoreTransfer::begin(
            TransferId::new(),
            RequisitionId::new(),
            "General Store",
            TheaterStoreId::new(),
            UserId::new(),
            at,
        );
        transfer
            .record_line(item, TheaterStoreItemId::new(), Quantity::new(dec!(4)).unwrap(), Money::new(dec!(1.25)).unwrap())
            .unwrap();
        transfer
            .record_line(item, TheaterStoreItemId::new(), Quantity::new(dec!(2)).unwrap(), Money::new(dec!(1.25)).unwrap())
            .unwrap();

        assert_eq!(transfer.items()[0].total_cost.value(), dec!(5.00));
        assert_eq!(transfer.quantity_for(item), dec!(6));
        assert_eq!(transfer.quantity_for(ConsumableItemId::new()), Decimal::ZERO);
    }
}
