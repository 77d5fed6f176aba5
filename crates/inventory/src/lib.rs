//! StockLedger domain: the rows that hold stock quantities and the immutable
//! records describing how stock moved between them.
//!
//! Three ledger row kinds exist:
//! - [`ConsumableItem`]: the single general-store row per consumable
//! - [`TheaterStoreItem`]: one row per (theater store, item, batch)
//! - [`InventoryItem`]: dispensary stock sold through treatment/optics invoices
//!
//! Quantities only change through [`LedgerRow::debit`] / [`LedgerRow::credit`],
//! which refuse to take a row below zero. Everything here is pure domain logic;
//! the infra crate persists rows with compare-and-set semantics.

pub mod consumable;
pub mod dispensary;
pub mod events;
pub mod ledger;
pub mod theater_store;
pub mod transfer;
pub mod usage;

pub use consumable::{ConsumableItem, NewConsumable};
pub use dispensary::{InventoryItem, NewInventoryItem};
pub use events::{StockEvent, StockMovement};
pub use ledger::{LedgerLocation, LedgerRef, LedgerRow};
pub use theater_store::{
    NewTheaterStore, StoreItemKey, TheaterStore, TheaterStoreItem, TheaterStoreItemDefaults,
    TheaterStoreType,
};
pub use transfer::{TheaterStoreTransfer, TransferItem};
pub use usage::{ProcedureUsage, UsageLine};
