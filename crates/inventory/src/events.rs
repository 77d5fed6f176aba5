use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    ConsumableItemId, InventoryItemId, PatientProcedureId, Quantity, RequisitionId, TheaterStoreId,
    TransferId, UsageId,
};
use clinicflow_events::Event;

use crate::ledger::LedgerRef;

/// A single change to one ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub ledger: LedgerRef,
    /// Signed change: negative for debits.
    pub delta: Decimal,
    pub balance_after: Quantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    ConsumableRegistered {
        item_id: ConsumableItemId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    InventoryItemRegistered {
        item_id: InventoryItemId,
        sku: String,
        occurred_at: DateTime<Utc>,
    },
    TheaterStoreOpened {
        store_id: TheaterStoreId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    TheaterStoreDeactivated {
        store_id: TheaterStoreId,
        occurred_at: DateTime<Utc>,
    },
    Debited(StockMovement),
    Credited(StockMovement),
    TransferRecorded {
        transfer_id: TransferId,
        requisition_id: RequisitionId,
        to_store_id: TheaterStoreId,
        line_count: usize,
        occurred_at: DateTime<Utc>,
    },
    UsageRecorded {
        usage_id: UsageId,
        procedure_id: PatientProcedureId,
        ledger: LedgerRef,
        quantity: Quantity,
        occurred_at: DateTime<Utc>,
    },
    LowStock {
        item_id: ConsumableItemId,
        current_stock: Quantity,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::ConsumableRegistered { .. } => "stock.consumable_registered",
            StockEvent::InventoryItemRegistered { .. } => "stock.inventory_item_registered",
            StockEvent::TheaterStoreOpened { .. } => "stock.theater_store_opened",
            StockEvent::TheaterStoreDeactivated { .. } => "stock.theater_store_deactivated",
            StockEvent::Debited(_) => "stock.debited",
            StockEvent::Credited(_) => "stock.credited",
            StockEvent::TransferRecorded { .. } => "stock.transfer_recorded",
            StockEvent::UsageRecorded { .. } => "stock.usage_recorded",
            StockEvent::LowStock { .. } => "stock.low_stock",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::ConsumableRegistered { occurred_at, .. }
            | StockEvent::InventoryItemRegistered { occurred_at, .. }
            | StockEvent::TheaterStoreOpened { occurred_at, .. }
            | StockEvent::TheaterStoreDeactivated { occurred_at, .. }
            | StockEvent::TransferRecorded { occurred_at, .. }
            | StockEvent::UsageRecorded { occurred_at, .. }
            | StockEvent::LowStock { occurred_at, .. } => *occurred_at,
            StockEvent::Debited(m) | StockEvent::Credited(m) => m.occurred_at,
        }
    }
}
