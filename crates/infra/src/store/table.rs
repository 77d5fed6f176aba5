use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

use clinicflow_core::ExpectedVersion;

use super::durable::{
    self, RowCheck, RowWrite, StoredRow, TableChanges, decode_body, decode_key, encode_body, encode_key,
};
use super::{Database, StoreError, Tables};

/// A committed row and the table clock value of its last write.
#[derive(Debug, Clone)]
pub struct Versioned<V> {
    pub version: u64,
    pub value: V,
}

/// Committed state of one table.
///
/// Versions come from a per-table clock, so a row that is deleted and
/// re-inserted never reuses a version an older reader may have seen.
#[derive(Debug)]
pub struct Table<K, V> {
    rows: HashMap<K, Versioned<V>>,
    clock: u64,
    inserts: u64,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            clock: 0,
            inserts: 0,
        }
    }
}

impl<K: Eq + Hash, V> Table<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key).map(|row| &row.value)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values().map(|row| &row.value)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn version_of(&self, key: &K) -> Option<u64> {
        self.rows.get(key).map(|row| row.version)
    }
}

impl<K: Eq + Hash + DeserializeOwned, V: DeserializeOwned> Table<K, V> {
    /// Replace every row with `stored`.
    ///
    /// The clock never moves backwards, and the insert counter moves so that
    /// open scans of this table conflict.
    pub(super) fn restore(&mut self, stored: Vec<StoredRow>) -> Result<(), StoreError> {
        let mut rows = HashMap::with_capacity(stored.len());
        for row in stored {
            let version = durable::from_stored_version(row.version)?;
            self.clock = self.clock.max(version);
            rows.insert(
                decode_key(&row.key)?,
                Versioned {
                    version,
                    value: decode_body(row.body)?,
                },
            );
        }
        self.rows = rows;
        self.inserts += 1;
        Ok(())
    }
}

/// A staged write with its versions fixed against committed state.
#[derive(Debug)]
pub(super) struct PlannedWrite<K, V> {
    key: K,
    /// Version the row has now; `None` when it does not exist.
    expected: Option<u64>,
    /// `None` deletes.
    next: Option<Versioned<V>>,
}

/// What a validated transaction will do to one table.
#[derive(Debug)]
pub(super) struct TablePlan<K, V> {
    writes: Vec<PlannedWrite<K, V>>,
    /// Rows read but not written, with the version seen.
    checks: Vec<(K, Option<u64>)>,
    clock: u64,
}

impl<K: Eq + Hash, V> TablePlan<K, V> {
    pub(super) fn apply(self, table: &mut Table<K, V>) {
        for write in self.writes {
            match write.next {
                Some(next) => {
                    if table.rows.insert(write.key, next).is_none() {
                        table.inserts += 1;
                    }
                }
                None => {
                    table.rows.remove(&write.key);
                }
            }
        }
        table.clock = table.clock.max(self.clock);
    }
}

impl<K: Serialize, V: Serialize> TablePlan<K, V> {
    pub(super) fn changes(&self, name: &'static str) -> Result<TableChanges, StoreError> {
        let mut writes = Vec::with_capacity(self.writes.len());
        for write in &self.writes {
            let key = encode_key(&write.key)?;
            let expected = write.expected.map(durable::to_stored_version).transpose()?;
            let row = match (&write.next, expected) {
                (Some(next), None) => RowWrite::Insert {
                    key,
                    version: durable::to_stored_version(next.version)?,
                    body: encode_body(&next.value)?,
                },
                (Some(next), Some(expected)) => RowWrite::Update {
                    key,
                    expected,
                    version: durable::to_stored_version(next.version)?,
                    body: encode_body(&next.value)?,
                },
                (None, Some(expected)) => RowWrite::Delete { key, expected },
                // Deleting a row that never existed.
                (None, None) => continue,
            };
            writes.push(row);
        }
        let checks = self
            .checks
            .iter()
            .map(|(key, seen)| {
                Ok(RowCheck {
                    key: encode_key(key)?,
                    expected: seen.map(durable::to_stored_version).transpose()?,
                })
            })
            .collect::<Result<_, StoreError>>()?;
        Ok(TableChanges {
            table: name,
            writes,
            checks,
        })
    }
}

/// Reads observed and writes staged against one table by a transaction.
#[derive(Debug)]
pub(super) struct TxTable<K, V> {
    /// First version seen per key; `None` means the row was absent.
    reads: HashMap<K, Option<u64>>,
    /// Insert counter seen by the first scan, if any.
    scanned_inserts: Option<u64>,
    /// `None` stages a delete.
    writes: HashMap<K, Option<V>>,
}

impl<K, V> Default for TxTable<K, V> {
    fn default() -> Self {
        Self {
            reads: HashMap::new(),
            scanned_inserts: None,
            writes: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TxTable<K, V> {
    fn observe(&mut self, key: &K, version: Option<u64>) {
        self.reads.entry(key.clone()).or_insert(version);
    }

    pub(super) fn validate(&self, table: &Table<K, V>, name: &'static str) -> Result<(), StoreError> {
        if let Some(seen) = self.scanned_inserts {
            if seen != table.inserts {
                return Err(StoreError::Conflict { table: name });
            }
        }
        for (key, seen) in &self.reads {
            let expected = match seen {
                Some(version) => ExpectedVersion::Exact(*version),
                None => ExpectedVersion::Absent,
            };
            if !expected.matches(table.version_of(key)) {
                return Err(StoreError::Conflict { table: name });
            }
        }
        Ok(())
    }

    /// Fix the versions of every staged write. Call only after `validate`.
    pub(super) fn plan(self, table: &Table<K, V>) -> TablePlan<K, V> {
        let mut clock = table.clock;
        let checks = self
            .reads
            .into_iter()
            .filter(|(key, _)| !self.writes.contains_key(key))
            .collect();
        let writes = self
            .writes
            .into_iter()
            .map(|(key, staged)| {
                let expected = table.version_of(&key);
                let next = staged.map(|value| {
                    clock += 1;
                    Versioned { version: clock, value }
                });
                PlannedWrite { key, expected, next }
            })
            .collect();
        TablePlan { writes, checks, clock }
    }
}

/// Transactional handle on one table.
///
/// Reads see the transaction's own staged writes first. Every committed row
/// version observed is re-checked when the transaction commits.
pub struct TableTx<'t, K, V> {
    db: &'t Database,
    select: fn(&Tables) -> &Table<K, V>,
    staged: &'t mut TxTable<K, V>,
}

impl<'t, K: Eq + Hash + Clone, V: Clone> TableTx<'t, K, V> {
    pub(super) fn new(
        db: &'t Database,
        select: fn(&Tables) -> &Table<K, V>,
        staged: &'t mut TxTable<K, V>,
    ) -> Self {
        Self { db, select, staged }
    }

    pub fn get(&mut self, key: &K) -> Result<Option<V>, StoreError> {
        if let Some(staged) = self.staged.writes.get(key) {
            return Ok(staged.clone());
        }
        let tables = self.db.read()?;
        let row = (self.select)(&tables).rows.get(key);
        self.staged.observe(key, row.map(|row| row.version));
        Ok(row.map(|row| row.value.clone()))
    }

    /// Stage an insert or update.
    pub fn put(&mut self, key: K, value: V) -> Result<(), StoreError> {
        self.observe_current(&key)?;
        self.staged.writes.insert(key, Some(value));
        Ok(())
    }

    pub fn delete(&mut self, key: &K) -> Result<(), StoreError> {
        self.observe_current(key)?;
        self.staged.writes.insert(key.clone(), None);
        Ok(())
    }

    /// All rows matching `filter`, staged writes included.
    ///
    /// The filter should only look at fields that never change after insert:
    /// rows it rejects are not tracked, so a concurrent update that would make
    /// one match goes unnoticed. New rows are caught through the insert counter.
    pub fn scan(&mut self, mut filter: impl FnMut(&K, &V) -> bool) -> Result<Vec<V>, StoreError> {
        let mut found: HashMap<K, V> = HashMap::new();
        {
            let tables = self.db.read()?;
            let table = (self.select)(&tables);
            self.staged.scanned_inserts.get_or_insert(table.inserts);
            for (key, row) in &table.rows {
                if filter(key, &row.value) {
                    self.staged.observe(key, Some(row.version));
                    found.insert(key.clone(), row.value.clone());
                }
            }
        }
        for (key, staged) in &self.staged.writes {
            match staged {
                Some(value) if filter(key, value) => {
                    found.insert(key.clone(), value.clone());
                }
                _ => {
                    found.remove(key);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    fn observe_current(&mut self, key: &K) -> Result<(), StoreError> {
        if self.staged.reads.contains_key(key) || self.staged.writes.contains_key(key) {
            return Ok(());
        }
        let tables = self.db.read()?;
        let version = (self.select)(&tables).version_of(key);
        self.staged.observe(key, version);
        Ok(())
    }
}
