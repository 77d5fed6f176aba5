use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use clinicflow_core::{
    ConsumableItemId, DomainError, DomainResult, Quantity, TheaterStoreId, TheaterStoreItemId,
};

use crate::ledger::{LedgerLocation, LedgerRef, LedgerRow};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TheaterStoreType {
    Surgical,
    Emergency,
    Outpatient,
    General,
}

/// Input for registering a theater store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTheaterStore {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub store_type: TheaterStoreType,
    pub capacity: u32,
}

/// A named physical store location in the theater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterStore {
    id: TheaterStoreId,
    name: String,
    description: Option<String>,
    location: Option<String>,
    store_type: TheaterStoreType,
    capacity: u32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TheaterStore {
    pub fn create(id: TheaterStoreId, input: NewTheaterStore, at: DateTime<Utc>) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("store name cannot be empty"));
        }
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            location: input.location,
            store_type: input.store_type,
            capacity: input.capacity,
            is_active: true,
            created_at: at,
        })
    }

    pub fn id_typed(&self) -> TheaterStoreId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store_type(&self) -> TheaterStoreType {
        self.store_type
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Take the store out of service. Its stock rows stay readable, but it no
    /// longer receives transfers or restocks.
    pub fn deactivate(&mut self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::conflict(format!("theater store {} is already inactive", self.name)));
        }
        self.is_active = false;
        Ok(())
    }
}

/// Unique key of a theater stock row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreItemKey {
    pub store_id: TheaterStoreId,
    pub item_id: ConsumableItemId,
    pub batch_number: String,
}

/// Levels applied to a freshly created theater stock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheaterStoreItemDefaults {
    pub minimum_quantity: Quantity,
    pub maximum_quantity: Quantity,
    pub is_sterile: bool,
}

/// Per-(store, item, batch) stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterStoreItem {
    id: TheaterStoreItemId,
    store_id: TheaterStoreId,
    consumable_item_id: ConsumableItemId,
    item_name: String,
    batch_number: String,
    quantity_available: Quantity,
    minimum_quantity: Quantity,
    maximum_quantity: Quantity,
    expiry_date: Option<NaiveDate>,
    is_sterile: bool,
    is_active: bool,
    last_restocked: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TheaterStoreItem {
    /// A new, empty row; stock arrives through `credit`.
    pub fn open(
        id: TheaterStoreItemId,
        key: StoreItemKey,
        item_name: impl Into<String>,
        defaults: &TheaterStoreItemDefaults,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if key.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number cannot be empty"));
        }
        Ok(Self {
            id,
            store_id: key.store_id,
            consumable_item_id: key.item_id,
            item_name: item_name.into(),
            batch_number: key.batch_number.trim().to_string(),
            quantity_available: Quantity::ZERO,
            minimum_quantity: defaults.minimum_quantity,
            maximum_quantity: defaults.maximum_quantity,
            expiry_date: None,
            is_sterile: defaults.is_sterile,
            is_active: true,
            last_restocked: at,
            created_at: at,
        })
    }

    pub fn id_typed(&self) -> TheaterStoreItemId {
        self.id
    }

    pub fn key(&self) -> StoreItemKey {
        StoreItemKey {
            store_id: self.store_id,
            item_id: self.consumable_item_id,
            batch_number: self.batch_number.clone(),
        }
    }

    pub fn store_id(&self) -> TheaterStoreId {
        self.store_id
    }

    pub fn consumable_item_id(&self) -> ConsumableItemId {
        self.consumable_item_id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn quantity_available(&self) -> Quantity {
        self.quantity_available
    }

    pub fn is_sterile(&self) -> bool {
        self.is_sterile
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_restocked(&self) -> DateTime<Utc> {
        self.last_restocked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn with_expiry(mut self, expiry: Option<NaiveDate>) -> Self {
        self.expiry_date = expiry;
        self
    }
}

impl LedgerRow for TheaterStoreItem {
    fn ledger_ref(&self) -> LedgerRef {
        LedgerRef::Theater(self.id)
    }

    fn location(&self) -> LedgerLocation {
        LedgerLocation::TheaterStore
    }

    fn item_name(&self) -> &str {
        &self.item_name
    }

    fn on_hand(&self) -> Quantity {
        self.quantity_available
    }

    fn store_on_hand(&mut self, quantity: Quantity, at: DateTime<Utc>) {
        if quantity > self.quantity_available {
            self.last_restocked = at;
        }
        self.quantity_available = quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn defaults() -> TheaterStoreItemDefaults {
        TheaterStoreItemDefaults {
            minimum_quantity: Quantity::ZERO,
            maximum_quantity: Quantity::from_units(1000),
            is_sterile: false,
        }
    }

    #[test]
    fn stores_deactivate_once() {
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 7, 0, 0).unwrap();
        let mut store = TheaterStore::create(
            TheaterStoreId::new(),
            NewTheaterStore {
                name: "Theater 2".to_string(),
                description: None,
                location: None,
                store_type: TheaterStoreType::Surgical,
                capacity: 50,
            },
            at,
        )
        .unwrap();

        store.deactivate().unwrap();
        assert!(!store.is_active());
        assert!(matches!(store.deactivate(), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn credit_stamps_last_restocked() {
        let opened = Utc.with_ymd_and_hms(2025, 4, 1, 7, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 4, 2, 7, 0, 0).unwrap();
        let key = StoreItemKey {
            store_id: TheaterStoreId::new(),
            item_id: ConsumableItemId::new(),
            batch_number: "B-17".to_string(),
        };
        let mut row = TheaterStoreItem::open(TheaterStoreItemId::new(), key, "Suture 6-0", &defaults(), opened).unwrap();
        row.credit(Quantity::new(dec!(12)).unwrap(), later).unwrap();
        assert_eq!(row.quantity_available().value(), dec!(12));
        assert_eq!(row.last_restocked(), later);

        let err = row.debit(Quantity::new(dec!(13)).unwrap(), later).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock(ref m) if m.contains("theater store")));
    }

    #[test]
    fn blank_batch_is_rejected() {
        let key = StoreItemKey {
            store_id: TheaterStoreId::new(),
            item_id: ConsumableItemId::new(),
            batch_number: " ".to_string(),
        };
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 7, 0, 0).unwrap();
        assert!(TheaterStoreItem::open(TheaterStoreItemId::new(), key, "x", &defaults(), at).is_err());
    }
}
