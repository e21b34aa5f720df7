//! Key-value store adapter.
//!
//! Node modules treat persistence as an opaque store of named tables, each table being an ordered
//! map from byte keys to byte values. Single-key operations are atomic, [`KeyValueStore::write()`]
//! applies a batch of operations atomically.
//!
//! [`MemoryKvStore`] is an in-process implementation used for development and tests.

mod memory;
#[cfg(test)]
mod tests;

pub use crate::memory::MemoryKvStore;
use std::sync::Arc;
use std::{fmt, io};

/// Key-value store error
#[derive(Debug, thiserror::Error)]
pub enum KvStoreError {
    /// Store is not available
    #[error("Store is not available")]
    Unavailable,
    /// Low-level I/O error
    #[error("I/O error: {error}")]
    Io {
        /// Low-level error
        #[from]
        error: io::Error,
    },
}

/// Single operation of an atomic batch
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WriteOp {
    /// Insert or replace value
    Put {
        /// Table name
        table: String,
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete value if present
    Delete {
        /// Table name
        table: String,
        /// Key
        key: Vec<u8>,
    },
}

/// Key-value store with named tables.
///
/// Tables are created implicitly on first write.
pub trait KeyValueStore: fmt::Debug + Send + Sync + 'static {
    /// Insert or replace value under a key
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvStoreError>;

    /// Get value under a key
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError>;

    /// Delete value under a key.
    ///
    /// Returns `false` if there was no value.
    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, KvStoreError>;

    /// All entries whose keys start with `prefix`, in key order
    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError>;

    /// Apply all operations atomically, either all of them are applied or none
    fn write(&self, ops: Vec<WriteOp>) -> Result<(), KvStoreError>;

    /// All entries of a table, in key order
    #[inline]
    fn entries(&self, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError> {
        self.scan_prefix(table, &[])
    }
}

impl<S> KeyValueStore for Arc<S>
where
    S: KeyValueStore,
{
    #[inline(always)]
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.as_ref().put(table, key, value)
    }

    #[inline(always)]
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        self.as_ref().get(table, key)
    }

    #[inline(always)]
    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, KvStoreError> {
        self.as_ref().delete(table, key)
    }

    #[inline(always)]
    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError> {
        self.as_ref().scan_prefix(table, prefix)
    }

    #[inline(always)]
    fn write(&self, ops: Vec<WriteOp>) -> Result<(), KvStoreError> {
        self.as_ref().write(ops)
    }
}
