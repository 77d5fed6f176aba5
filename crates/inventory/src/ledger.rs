use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    ConsumableItemId, DomainError, DomainResult, InventoryItemId, Quantity, TheaterStoreItemId,
};

use crate::events::StockMovement;

/// Which ledger a stock row belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerLocation {
    GeneralStore,
    TheaterStore,
    Dispensary,
}

impl LedgerLocation {
    fn describe(self) -> &'static str {
        match self {
            LedgerLocation::GeneralStore => "in general store ",
            LedgerLocation::TheaterStore => "in theater store ",
            LedgerLocation::Dispensary => "",
        }
    }
}

/// Primary key of exactly one ledger row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ledger", content = "id", rename_all = "snake_case")]
pub enum LedgerRef {
    General(ConsumableItemId),
    Theater(TheaterStoreItemId),
    Dispensary(InventoryItemId),
}

/// A row holding an on-hand quantity.
///
/// Implementors expose their balance; the provided `debit`/`credit` methods are
/// the only code paths that change it.
pub trait LedgerRow {
    fn ledger_ref(&self) -> LedgerRef;

    fn location(&self) -> LedgerLocation;

    /// Display name used in error messages.
    fn item_name(&self) -> &str;

    fn on_hand(&self) -> Quantity;

    #[doc(hidden)]
    fn store_on_hand(&mut self, quantity: Quantity, at: DateTime<Utc>);

    fn debit(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        if quantity.is_zero() {
            return Err(DomainError::validation("debit quantity must be greater than zero"));
        }
        let before = self.on_hand();
        let after = before.checked_sub(quantity).ok_or_else(|| {
            DomainError::insufficient_stock(format!(
                "Insufficient stock {}for item: {}. Available: {}, Required: {}",
                self.location().describe(),
                self.item_name(),
                before,
                quantity
            ))
        })?;
        self.store_on_hand(after, at);
        Ok(StockMovement {
            ledger: self.ledger_ref(),
            delta: -quantity.value(),
            balance_after: after,
            occurred_at: at,
        })
    }

    fn credit(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<StockMovement> {
        if quantity.is_zero() {
            return Err(DomainError::validation("credit quantity must be greater than zero"));
        }
        let after = self.on_hand().checked_add(quantity)?;
        self.store_on_hand(after, at);
        Ok(StockMovement {
            ledger: self.ledger_ref(),
            delta: quantity.value(),
            balance_after: after,
            occurred_at: at,
        })
    }
}
