//! Row-versioned in-process store with optimistic, multi-table transactions.
//!
//! ```text
//! Transaction
//!   ↓
//! 1. Read rows (version of every row read is remembered)
//!   ↓
//! 2. Decide (pure aggregate logic) and stage writes + events
//!   ↓
//! 3. Commit: under the write lock, re-check every remembered version
//!   ↓
//! 4. Persist to the durable store, if one is attached (compare-and-set per row)
//!   ↓
//! 5. Apply all staged writes at once, or none on conflict (then retry)
//! ```
//!
//! Rejections based on stale reads are retried as well, so an operation only
//! fails with a domain error that is still true against committed state.

mod durable;
pub mod postgres;
mod table;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clinicflow_core::{
    ClinicalRecordId, ConsumableItemId, InventoryItemId, InvestigationId, InvoiceId,
    PatientProcedureId, RequisitionId, TheaterStoreId, TheaterStoreItemId, TransferId,
    TreatmentId, UsageId, VisitSessionId,
};
use clinicflow_inventory::{
    ConsumableItem, InventoryItem, ProcedureUsage, StoreItemKey, TheaterStore, TheaterStoreItem,
    TheaterStoreTransfer,
};
use clinicflow_invoicing::{
    DeletedInvoice, GuardKey, Invoice, PatientInvestigation, PatientProcedure, PatientTreatment,
};
use clinicflow_requisitions::TheaterRequisition;
use clinicflow_visits::{
    BasicRefractionExam, ClinicalRecord, ClinicalRecordKind, MainExamination, TriageMeasurement,
    VisitSession,
};

use crate::error::{ServiceError, ServiceResult};
use crate::events::ClinicEvent;

pub use durable::{ChangeSet, DurableStore, RowCheck, RowWrite, StoredRow, TableChanges};
pub use table::{Table, TableTx, Versioned};
use table::{TablePlan, TxTable};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row read by the transaction changed before it could commit.
    #[error("write conflict on table `{table}`")]
    Conflict { table: &'static str },
    #[error("gave up after {attempts} conflicting attempts")]
    Contention { attempts: u32 },
    #[error("store lock poisoned")]
    Poisoned,
    /// The durable store failed or returned data that could not be decoded.
    #[error("durable store error: {0}")]
    Backend(String),
}

macro_rules! tables {
    ($($name:ident: $key:ty => $value:ty,)+) => {
        /// Committed state of every table.
        #[derive(Debug, Default)]
        pub struct Tables {
            $(pub $name: Table<$key, $value>,)+
        }

        #[derive(Debug, Default)]
        struct Staged {
            $($name: TxTable<$key, $value>,)+
        }

        impl Staged {
            fn validate(&self, tables: &Tables) -> Result<(), StoreError> {
                $(self.$name.validate(&tables.$name, stringify!($name))?;)+
                Ok(())
            }

            fn plan(self, tables: &Tables) -> Plan {
                Plan {
                    $($name: self.$name.plan(&tables.$name),)+
                }
            }
        }

        /// Versions fixed for every staged write of a validated transaction.
        struct Plan {
            $($name: TablePlan<$key, $value>,)+
        }

        impl Plan {
            fn changes(&self) -> Result<ChangeSet, StoreError> {
                Ok(ChangeSet {
                    tables: vec![$(self.$name.changes(stringify!($name))?,)+],
                })
            }

            fn apply(self, tables: &mut Tables) {
                $(self.$name.apply(&mut tables.$name);)+
            }
        }

        impl Tables {
            fn load(durable: &dyn DurableStore) -> Result<Self, StoreError> {
                let mut tables = Tables::default();
                $(tables.$name.restore(durable.load(stringify!($name))?)?;)+
                Ok(tables)
            }

            /// Replace one table with its durable contents.
            fn reload(&mut self, durable: &dyn DurableStore, table: &str) -> Result<(), StoreError> {
                match table {
                    $(stringify!($name) => self.$name.restore(durable.load(stringify!($name))?),)+
                    other => Err(StoreError::Backend(format!("unknown table `{other}`"))),
                }
            }
        }

        impl Transaction<'_> {
            $(
                pub fn $name(&mut self) -> TableTx<'_, $key, $value> {
                    fn select(tables: &Tables) -> &Table<$key, $value> {
                        &tables.$name
                    }
                    TableTx::new(self.db, select, &mut self.staged.$name)
                }
            )+
        }
    };
}

tables! {
    consumables: ConsumableItemId => ConsumableItem,
    theater_stores: TheaterStoreId => TheaterStore,
    theater_items: TheaterStoreItemId => TheaterStoreItem,
    theater_item_keys: StoreItemKey => TheaterStoreItemId,
    inventory_items: InventoryItemId => InventoryItem,
    transfers: TransferId => TheaterStoreTransfer,
    usages: UsageId => ProcedureUsage,
    requisitions: RequisitionId => TheaterRequisition,
    requisition_counters: i32 => u32,
    invoices: InvoiceId => Invoice,
    invoice_guards: GuardKey => DateTime<Utc>,
    invoice_counters: NaiveDate => u32,
    deleted_invoices: InvoiceId => DeletedInvoice,
    visits: VisitSessionId => VisitSession,
    procedures: PatientProcedureId => PatientProcedure,
    investigations: InvestigationId => PatientInvestigation,
    treatments: TreatmentId => PatientTreatment,
    triage: ClinicalRecordId => ClinicalRecord<TriageMeasurement>,
    refraction: ClinicalRecordId => ClinicalRecord<BasicRefractionExam>,
    main_exams: ClinicalRecordId => ClinicalRecord<MainExamination>,
    clinical_index: (VisitSessionId, ClinicalRecordKind) => ClinicalRecordId,
}

/// An event staged by a transaction, published only after commit.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub subject: Uuid,
    pub event: ClinicEvent,
}

/// One attempt at a unit of work.
pub struct Transaction<'db> {
    db: &'db Database,
    staged: Staged,
    pending: Vec<PendingEvent>,
}

impl<'db> Transaction<'db> {
    fn new(db: &'db Database) -> Self {
        Self {
            db,
            staged: Staged::default(),
            pending: Vec::new(),
        }
    }

    pub fn record(&mut self, subject: impl Into<Uuid>, event: impl Into<ClinicEvent>) {
        self.pending.push(PendingEvent {
            subject: subject.into(),
            event: event.into(),
        });
    }

    /// Whether everything read so far still matches committed state.
    fn is_current(&self) -> Result<bool, StoreError> {
        let tables = self.db.read()?;
        Ok(self.staged.validate(&tables).is_ok())
    }

    fn commit(self) -> Result<Vec<PendingEvent>, StoreError> {
        let db = self.db;
        let mut tables = db.write()?;
        self.staged.validate(&tables)?;
        let plan = self.staged.plan(&tables);
        if let Some(durable) = &db.durable {
            let changes = plan.changes()?;
            if changes.write_count() > 0 {
                if let Err(err) = durable.persist(&changes) {
                    if let StoreError::Conflict { table } = &err {
                        // Another writer got there first; pick up its rows before the retry.
                        tables.reload(durable.as_ref(), table)?;
                    }
                    return Err(err);
                }
            }
        }
        plan.apply(&mut tables);
        Ok(self.pending)
    }
}

/// The whole clinic state behind one lock.
///
/// Transactions only hold the lock for single reads and for commit; decision
/// logic runs unlocked against the rows the transaction has read. With a
/// durable store attached, the tables are loaded from it once and every commit
/// writes through to it.
#[derive(Debug, Default)]
pub struct Database {
    tables: RwLock<Tables>,
    durable: Option<Arc<dyn DurableStore>>,
}

impl Database {
    /// A database that lives only in this process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every table from `durable` and write through to it from now on.
    pub fn open(durable: Arc<dyn DurableStore>) -> Result<Self, StoreError> {
        let tables = Tables::load(durable.as_ref())?;
        info!(
            visits = tables.visits.len(),
            invoices = tables.invoices.len(),
            consumables = tables.consumables.len(),
            "clinic state loaded from durable store"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            durable: Some(durable),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }

    /// Read-only access to committed state.
    pub fn view<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self.read()?;
        Ok(f(&tables))
    }

    /// Run `op` until it commits, retrying on conflicts.
    ///
    /// `op` may run several times and must not have side effects outside the
    /// transaction.
    pub fn transaction<T>(
        &self,
        max_attempts: u32,
        mut op: impl FnMut(&mut Transaction<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<(T, Vec<PendingEvent>)> {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            let mut tx = Transaction::new(self);
            match op(&mut tx) {
                Ok(value) => match tx.commit() {
                    Ok(events) => return Ok((value, events)),
                    Err(StoreError::Conflict { table }) => {
                        debug!(attempt, table, "commit conflict; retrying");
                    }
                    Err(err @ StoreError::Backend(_)) => {
                        warn!(attempt, error = %err, "durable commit failed");
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                },
                Err(ServiceError::Domain(err)) => {
                    if tx.is_current()? {
                        return Err(err.into());
                    }
                    debug!(attempt, error = %err, "rejected on stale reads; retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::Contention { attempts }.into())
    }
}
