//! Write-through persistence for the in-process tables.
//!
//! The in-process tables stay the working set every transaction reads from.
//! When a durable store is attached, a commit first persists its changes there
//! (one database transaction, every row compare-and-set on its version) and is
//! applied in memory only once the durable write succeeded.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::StoreError;

/// One persisted row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub key: String,
    pub version: i64,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
    /// The row must not exist yet.
    Insert { key: String, version: i64, body: Value },
    /// The row must still be at `expected`.
    Update {
        key: String,
        expected: i64,
        version: i64,
        body: Value,
    },
    Delete { key: String, expected: i64 },
}

impl RowWrite {
    pub fn key(&self) -> &str {
        match self {
            RowWrite::Insert { key, .. } | RowWrite::Update { key, .. } | RowWrite::Delete { key, .. } => key,
        }
    }
}

/// A row the transaction read but did not write; `None` means it was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCheck {
    pub key: String,
    pub expected: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableChanges {
    pub table: &'static str,
    pub writes: Vec<RowWrite>,
    pub checks: Vec<RowCheck>,
}

/// Everything one commit persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub tables: Vec<TableChanges>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.writes.is_empty() && t.checks.is_empty())
    }

    pub fn write_count(&self) -> usize {
        self.tables.iter().map(|t| t.writes.len()).sum()
    }
}

/// Durable home of the clinic tables.
///
/// Calls are synchronous; implementations backed by async drivers block on
/// the ambient runtime and must be called from a blocking thread.
pub trait DurableStore: fmt::Debug + Send + Sync {
    /// Persist `changes` atomically.
    ///
    /// Fails with [`StoreError::Conflict`] naming the first table where a
    /// stored version no longer matches what the transaction saw.
    fn persist(&self, changes: &ChangeSet) -> Result<(), StoreError>;

    /// Every stored row of `table`.
    fn load(&self, table: &'static str) -> Result<Vec<StoredRow>, StoreError>;
}

pub(super) fn codec_error(context: &str, err: impl fmt::Display) -> StoreError {
    StoreError::Backend(format!("{context}: {err}"))
}

/// Row key as stored: string-like keys (ids, dates) as their plain string,
/// composite keys as compact JSON.
pub(super) fn encode_key<K: Serialize>(key: &K) -> Result<String, StoreError> {
    match serde_json::to_value(key).map_err(|e| codec_error("encode key", e))? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

pub(super) fn decode_key<K: DeserializeOwned>(raw: &str) -> Result<K, StoreError> {
    serde_json::from_value(Value::String(raw.to_string()))
        .or_else(|_| serde_json::from_str(raw))
        .map_err(|e| codec_error("decode key", e))
}

pub(super) fn encode_body<V: Serialize>(value: &V) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| codec_error("encode row", e))
}

pub(super) fn decode_body<V: DeserializeOwned>(body: Value) -> Result<V, StoreError> {
    serde_json::from_value(body).map_err(|e| codec_error("decode row", e))
}

pub(super) fn to_stored_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|e| codec_error("row version", e))
}

pub(super) fn from_stored_version(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|e| codec_error("row version", e))
}
