//! Transfer engine: moves the approved quantities of a requisition from the
//! general store into a theater store, inside the approval transaction.

use chrono::{DateTime, Utc};
use tracing::info;

use clinicflow_core::{DomainError, TheaterStoreId, TransferId, UserId};
use clinicflow_inventory::{StockEvent, StoreItemKey, TheaterStore, TheaterStoreTransfer};
use clinicflow_requisitions::TheaterRequisition;

use super::ledger;
use crate::config::WorkflowConfig;
use crate::error::ServiceResult;
use crate::store::Transaction;

/// The store a transfer lands in.
///
/// An explicit store must exist and be active. Otherwise the oldest active
/// store is used, and when there is none the configured default store is
/// created.
pub(crate) fn resolve_target_store(
    tx: &mut Transaction<'_>,
    requested: Option<TheaterStoreId>,
    config: &WorkflowConfig,
    at: DateTime<Utc>,
) -> ServiceResult<TheaterStore> {
    if let Some(store_id) = requested {
        let store = tx
            .theater_stores()
            .get(&store_id)?
            .ok_or_else(|| DomainError::not_found(format!("theater store {store_id}")))?;
        if !store.is_active() {
            return Err(DomainError::validation(format!("theater store {} is not active", store.name())).into());
        }
        return Ok(store);
    }

    let mut stores = tx.theater_stores().scan(|_, _| true)?;
    stores.retain(TheaterStore::is_active);
    stores.sort_by_key(|store| (store.created_at(), store.id_typed()));
    if let Some(store) = stores.into_iter().next() {
        return Ok(store);
    }

    let store = TheaterStore::create(TheaterStoreId::new(), config.default_theater_store.clone(), at)?;
    tx.theater_stores().put(store.id_typed(), store.clone())?;
    tx.record(
        store.id_typed(),
        StockEvent::TheaterStoreOpened {
            store_id: store.id_typed(),
            name: store.name().to_string(),
            occurred_at: at,
        },
    );
    info!(store_id = %store.id_typed(), "opened default theater store for transfer");
    Ok(store)
}

/// Debit the general store and credit the target store for every approved line.
///
/// Credits merge into the oldest existing row of the item in the target store;
/// an item the store has never held gets a fresh row with a generated batch.
pub(crate) fn transfer_requisition(
    tx: &mut Transaction<'_>,
    requisition: &TheaterRequisition,
    target: Option<TheaterStoreId>,
    actor: UserId,
    config: &WorkflowConfig,
    at: DateTime<Utc>,
) -> ServiceResult<TheaterStoreTransfer> {
    let store = resolve_target_store(tx, target, config, at)?;
    let store_id = store.id_typed();
    let mut transfer = TheaterStoreTransfer::begin(
        TransferId::new(),
        requisition.id_typed(),
        config.general_store_label.clone(),
        store_id,
        actor,
        at,
    );

    for (line, quantity) in requisition.approved_lines() {
        ledger::debit_general(tx, line.consumable_item_id, quantity, at)?;

        let existing = ledger::theater_rows(tx, store_id, line.consumable_item_id)?;
        let row_id = match existing.first() {
            Some(row) => row.id_typed(),
            None => {
                let key = StoreItemKey {
                    store_id,
                    item_id: line.consumable_item_id,
                    batch_number: format!("REQ-{}", at.timestamp_millis()),
                };
                ledger::find_or_open_theater_row(tx, key, &line.item_name, &config.theater_row_defaults, at)?
            }
        };
        ledger::credit_theater_row(tx, row_id, quantity, at)?;
        transfer.record_line(line.consumable_item_id, row_id, quantity, line.unit_cost)?;
    }

    if transfer.items().is_empty() {
        return Err(DomainError::invariant("approved requisition has nothing to transfer").into());
    }

    tx.transfers().put(transfer.id_typed(), transfer.clone())?;
    tx.record(
        transfer.id_typed(),
        StockEvent::TransferRecorded {
            transfer_id: transfer.id_typed(),
            requisition_id: requisition.id_typed(),
            to_store_id: store_id,
            line_count: transfer.items().len(),
            occurred_at: at,
        },
    );
    Ok(transfer)
}
