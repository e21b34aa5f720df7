use crate::{KeyValueStore, KvStoreError, WriteOp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug)]
struct Inner {
    tables: RwLock<HashMap<String, Table>>,
    available: AtomicBool,
}

/// In-memory [`KeyValueStore`].
///
/// Clones share the same underlying tables.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    inner: Arc<Inner>,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.ensure_available()?;

        self.inner
            .tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());

        Ok(())
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        self.ensure_available()?;

        Ok(self
            .inner
            .tables
            .read()
            .get(table)
            .and_then(|table| table.get(key).cloned()))
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, KvStoreError> {
        self.ensure_available()?;

        Ok(self
            .inner
            .tables
            .write()
            .get_mut(table)
            .is_some_and(|table| table.remove(key).is_some()))
    }

    fn scan_prefix(
        &self,
        table: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvStoreError> {
        self.ensure_available()?;

        let tables = self.inner.tables.read();
        let Some(table) = tables.get(table) else {
            return Ok(Vec::new());
        };

        Ok(table
            .range(prefix.to_vec()..)
            .take_while(|(key, _value)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write(&self, ops: Vec<WriteOp>) -> Result<(), KvStoreError> {
        self.ensure_available()?;

        trace!(ops = ops.len(), "Applying write batch");

        let mut tables = self.inner.tables.write();
        for op in ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    tables.entry(table).or_default().insert(key, value);
                }
                WriteOp::Delete { table, key } => {
                    if let Some(table) = tables.get_mut(&table) {
                        table.remove(&key);
                    }
                }
            }
        }

        Ok(())
    }
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::default(),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Toggle availability.
    ///
    /// While unavailable every operation fails with [`KvStoreError::Unavailable`], the way a
    /// remote store behaves during an outage.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    #[inline(always)]
    fn ensure_available(&self) -> Result<(), KvStoreError> {
        if self.inner.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(KvStoreError::Unavailable)
        }
    }
}
