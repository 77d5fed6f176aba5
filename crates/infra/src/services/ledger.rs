//! Ledger primitives for use inside a transaction.
//!
//! Quantities only change through [`LedgerRow::debit`] and
//! [`LedgerRow::credit`]; every change is staged together with a stock event.

use std::fmt::Display;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use clinicflow_core::{
    ConsumableItemId, DomainError, DomainResult, InventoryItemId, Quantity, TheaterStoreId,
    TheaterStoreItemId,
};
use clinicflow_inventory::{
    ConsumableItem, InventoryItem, LedgerRow, StockEvent, StockMovement, StoreItemKey,
    TheaterStoreItem, TheaterStoreItemDefaults,
};

use crate::error::ServiceResult;
use crate::store::{TableTx, Transaction};

fn change_row<K, V>(
    mut table: TableTx<'_, K, V>,
    key: K,
    what: &str,
    change: impl FnOnce(&mut V) -> DomainResult<StockMovement>,
) -> ServiceResult<(V, StockMovement)>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    let mut row = table
        .get(&key)?
        .ok_or_else(|| DomainError::not_found(format!("{what} {key}")))?;
    let movement = change(&mut row)?;
    table.put(key, row.clone())?;
    Ok((row, movement))
}

pub(crate) fn debit_general(
    tx: &mut Transaction<'_>,
    item_id: ConsumableItemId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> ServiceResult<ConsumableItem> {
    let mut was_low = false;
    let (item, movement) = change_row(tx.consumables(), item_id, "consumable item", |row| {
        was_low = row.is_low_stock();
        row.debit(quantity, at)
    })?;
    tx.record(item_id, StockEvent::Debited(movement));
    if item.is_low_stock() && !was_low {
        tx.record(
            item_id,
            StockEvent::LowStock {
                item_id,
                current_stock: item.current_stock(),
                occurred_at: at,
            },
        );
    }
    Ok(item)
}

pub(crate) fn credit_general(
    tx: &mut Transaction<'_>,
    item_id: ConsumableItemId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> ServiceResult<ConsumableItem> {
    let (item, movement) = change_row(tx.consumables(), item_id, "consumable item", |row| {
        row.credit(quantity, at)
    })?;
    tx.record(item_id, StockEvent::Credited(movement));
    Ok(item)
}

pub(crate) fn debit_theater_row(
    tx: &mut Transaction<'_>,
    row_id: TheaterStoreItemId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> ServiceResult<TheaterStoreItem> {
    let (row, movement) = change_row(tx.theater_items(), row_id, "theater store item", |row| {
        row.debit(quantity, at)
    })?;
    tx.record(row_id, StockEvent::Debited(movement));
    Ok(row)
}

pub(crate) fn credit_theater_row(
    tx: &mut Transaction<'_>,
    row_id: TheaterStoreItemId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> ServiceResult<TheaterStoreItem> {
    let (row, movement) = change_row(tx.theater_items(), row_id, "theater store item", |row| {
        row.credit(quantity, at)
    })?;
    tx.record(row_id, StockEvent::Credited(movement));
    Ok(row)
}

pub(crate) fn debit_dispensary(
    tx: &mut Transaction<'_>,
    item_id: InventoryItemId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> ServiceResult<InventoryItem> {
    let (item, movement) = change_row(tx.inventory_items(), item_id, "inventory item", |row| {
        row.debit(quantity, at)
    })?;
    tx.record(item_id, StockEvent::Debited(movement));
    Ok(item)
}

/// Rows of one item in one theater store, oldest first.
pub(crate) fn theater_rows(
    tx: &mut Transaction<'_>,
    store_id: TheaterStoreId,
    item_id: ConsumableItemId,
) -> ServiceResult<Vec<TheaterStoreItem>> {
    let mut rows = tx.theater_items().scan(|_, row| {
        row.store_id() == store_id && row.consumable_item_id() == item_id
    })?;
    rows.sort_by_key(|row| (row.created_at(), row.id_typed()));
    Ok(rows)
}

/// Row for `key`, opening an empty one when none exists.
pub(crate) fn find_or_open_theater_row(
    tx: &mut Transaction<'_>,
    key: StoreItemKey,
    item_name: &str,
    defaults: &TheaterStoreItemDefaults,
    at: DateTime<Utc>,
) -> ServiceResult<TheaterStoreItemId> {
    if let Some(existing) = tx.theater_item_keys().get(&key)? {
        return Ok(existing);
    }
    let row = TheaterStoreItem::open(TheaterStoreItemId::new(), key, item_name, defaults, at)?;
    let row_id = row.id_typed();
    tx.theater_item_keys().put(row.key(), row_id)?;
    tx.theater_items().put(row_id, row)?;
    Ok(row_id)
}
