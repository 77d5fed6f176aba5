//! Stock administration and stock queries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use clinicflow_core::{
    ConsumableItemId, DomainError, InventoryItemId, Quantity, RequisitionId, TheaterStoreId,
    UserId,
};
use clinicflow_events::EventBus;
use clinicflow_inventory::{
    ConsumableItem, InventoryItem, NewConsumable, NewInventoryItem, NewTheaterStore, StockEvent,
    StoreItemKey, TheaterStore, TheaterStoreItem, TheaterStoreTransfer,
};

use super::{ClinicEnvelope, ClinicServices, ledger};
use crate::error::ServiceResult;

/// Stock received directly into a theater store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterRestock {
    pub consumable_item_id: ConsumableItemId,
    pub batch_number: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl<B> ClinicServices<B>
where
    B: EventBus<ClinicEnvelope>,
{
    pub fn create_consumable(&self, actor: UserId, input: NewConsumable) -> ServiceResult<ConsumableItem> {
        let now = self.now();
        let item = self.execute(Some(actor), |tx| {
            let item = ConsumableItem::create(ConsumableItemId::new(), input.clone(), now)?;
            if let Some(sku) = item.sku() {
                let taken = tx
                    .consumables()
                    .scan(|_, existing| existing.sku() == Some(sku))?;
                if !taken.is_empty() {
                    return Err(DomainError::conflict(format!("a consumable with SKU {sku} already exists")).into());
                }
            }
            tx.consumables().put(item.id_typed(), item.clone())?;
            tx.record(
                item.id_typed(),
                StockEvent::ConsumableRegistered {
                    item_id: item.id_typed(),
                    name: item.name().to_string(),
                    occurred_at: now,
                },
            );
            Ok(item)
        })?;
        info!(item_id = %item.id_typed(), name = item.name(), "consumable registered");
        Ok(item)
    }

    /// Receive stock into the general store.
    pub fn restock_general(
        &self,
        item_id: ConsumableItemId,
        actor: UserId,
        quantity: Quantity,
    ) -> ServiceResult<ConsumableItem> {
        let now = self.now();
        self.execute(Some(actor), |tx| ledger::credit_general(tx, item_id, quantity, now))
    }

    pub fn create_theater_store(&self, actor: UserId, input: NewTheaterStore) -> ServiceResult<TheaterStore> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let store = TheaterStore::create(TheaterStoreId::new(), input.clone(), now)?;
            tx.theater_stores().put(store.id_typed(), store.clone())?;
            tx.record(
                store.id_typed(),
                StockEvent::TheaterStoreOpened {
                    store_id: store.id_typed(),
                    name: store.name().to_string(),
                    occurred_at: now,
                },
            );
            Ok(store)
        })
    }

    /// Stop a theater store from receiving transfers and restocks.
    pub fn deactivate_theater_store(&self, store_id: TheaterStoreId, actor: UserId) -> ServiceResult<TheaterStore> {
        let now = self.now();
        let store = self.execute(Some(actor), |tx| {
            let mut store = tx
                .theater_stores()
                .get(&store_id)?
                .ok_or_else(|| DomainError::not_found(format!("theater store {store_id}")))?;
            store.deactivate()?;
            tx.theater_stores().put(store_id, store.clone())?;
            tx.record(store_id, StockEvent::TheaterStoreDeactivated { store_id, occurred_at: now });
            Ok(store)
        })?;
        info!(store_id = %store_id, "theater store deactivated");
        Ok(store)
    }

    /// Receive stock directly into a theater store, merging by batch.
    pub fn restock_theater_store(
        &self,
        store_id: TheaterStoreId,
        actor: UserId,
        restock: TheaterRestock,
    ) -> ServiceResult<TheaterStoreItem> {
        let now = self.now();
        let defaults = self.config.theater_row_defaults.clone();
        self.execute(Some(actor), |tx| {
            let store = tx
                .theater_stores()
                .get(&store_id)?
                .ok_or_else(|| DomainError::not_found(format!("theater store {store_id}")))?;
            if !store.is_active() {
                return Err(DomainError::validation(format!("theater store {} is not active", store.name())).into());
            }
            let item = tx
                .consumables()
                .get(&restock.consumable_item_id)?
                .ok_or_else(|| {
                    DomainError::not_found(format!("consumable item {}", restock.consumable_item_id))
                })?;
            let key = StoreItemKey {
                store_id,
                item_id: item.id_typed(),
                batch_number: restock.batch_number.trim().to_string(),
            };
            let row_id = ledger::find_or_open_theater_row(tx, key, item.name(), &defaults, now)?;
            let row = ledger::credit_theater_row(tx, row_id, restock.quantity, now)?;
            if restock.expiry_date.is_none() {
                return Ok(row);
            }
            let row = row.with_expiry(restock.expiry_date);
            tx.theater_items().put(row_id, row.clone())?;
            Ok(row)
        })
    }

    pub fn create_inventory_item(&self, actor: UserId, input: NewInventoryItem) -> ServiceResult<InventoryItem> {
        let now = self.now();
        self.execute(Some(actor), |tx| {
            let item = InventoryItem::create(InventoryItemId::new(), input.clone(), now)?;
            let sku = item.sku().to_string();
            if !tx.inventory_items().scan(|_, existing| existing.sku() == sku)?.is_empty() {
                return Err(DomainError::conflict(format!("an inventory item with SKU {sku} already exists")).into());
            }
            tx.inventory_items().put(item.id_typed(), item.clone())?;
            tx.record(
                item.id_typed(),
                StockEvent::InventoryItemRegistered {
                    item_id: item.id_typed(),
                    sku,
                    occurred_at: now,
                },
            );
            Ok(item)
        })
    }

    pub fn consumable(&self, item_id: ConsumableItemId) -> ServiceResult<ConsumableItem> {
        self.view(|t| t.consumables.get(&item_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("consumable item {item_id}")).into())
    }

    pub fn consumables(&self) -> ServiceResult<Vec<ConsumableItem>> {
        let mut items: Vec<ConsumableItem> = self.view(|t| t.consumables.values().cloned().collect())?;
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    /// Active consumables at or below their reorder point.
    pub fn low_stock_consumables(&self) -> ServiceResult<Vec<ConsumableItem>> {
        Ok(self
            .consumables()?
            .into_iter()
            .filter(|item| item.is_active() && item.is_low_stock())
            .collect())
    }

    /// Value of everything on hand in the general store.
    pub fn general_stock_value(&self) -> ServiceResult<Decimal> {
        self.view(|t| t.consumables.values().map(ConsumableItem::stock_value).sum())
    }

    pub fn theater_store(&self, store_id: TheaterStoreId) -> ServiceResult<TheaterStore> {
        self.view(|t| t.theater_stores.get(&store_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("theater store {store_id}")).into())
    }

    pub fn theater_stores(&self) -> ServiceResult<Vec<TheaterStore>> {
        let mut stores: Vec<TheaterStore> = self.view(|t| t.theater_stores.values().cloned().collect())?;
        stores.sort_by_key(|store| (store.created_at(), store.id_typed()));
        Ok(stores)
    }

    /// Rows held by one theater store, oldest first.
    pub fn theater_store_contents(&self, store_id: TheaterStoreId) -> ServiceResult<Vec<TheaterStoreItem>> {
        self.theater_store(store_id)?;
        let mut rows: Vec<TheaterStoreItem> = self.view(|t| {
            t.theater_items
                .values()
                .filter(|row| row.store_id() == store_id)
                .cloned()
                .collect()
        })?;
        rows.sort_by_key(|row| (row.created_at(), row.id_typed()));
        Ok(rows)
    }

    /// Total on hand of one consumable across every theater store row.
    pub fn theater_stock_of(&self, item_id: ConsumableItemId) -> ServiceResult<Quantity> {
        let total: Decimal = self.view(|t| {
            t.theater_items
                .values()
                .filter(|row| row.consumable_item_id() == item_id)
                .map(|row| row.quantity_available().value())
                .sum()
        })?;
        Ok(Quantity::new(total)?)
    }

    pub fn inventory_item(&self, item_id: InventoryItemId) -> ServiceResult<InventoryItem> {
        self.view(|t| t.inventory_items.get(&item_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")).into())
    }

    pub fn inventory_items(&self) -> ServiceResult<Vec<InventoryItem>> {
        let mut items: Vec<InventoryItem> = self.view(|t| t.inventory_items.values().cloned().collect())?;
        items.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(items)
    }

    pub fn transfers_for_requisition(&self, requisition_id: RequisitionId) -> ServiceResult<Vec<TheaterStoreTransfer>> {
        let mut transfers: Vec<TheaterStoreTransfer> = self.view(|t| {
            t.transfers
                .values()
                .filter(|transfer| transfer.requisition_id() == requisition_id)
                .cloned()
                .collect()
        })?;
        transfers.sort_by_key(|transfer| (transfer.transferred_at(), transfer.id_typed()));
        Ok(transfers)
    }
}
