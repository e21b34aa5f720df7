//! Log of committed cross-chain transactions.
//!
//! Every cross-chain transaction carries the hash of the transaction on the origin chain that
//! anchors it. Once committed locally, the local transaction is recorded under that anchor hash so
//! that the same anchor is not processed twice.
//!
//! The log is a thin layer over [`KeyValueStore`] with one table per chain. Storage faults are
//! logged and reported as `false`/`None`, callers treat them as "operation did not happen".
//! Callers that must tell a fault apart from a missing record use [`CommittedCrossChainTxLog::try_get()`]
//! and [`CommittedCrossChainTxLog::try_delete()`] instead.


use ll_kv_store::{KeyValueStore, KvStoreError};
use ll_primitives::chain::ChainId;
use ll_primitives::transaction::{Transaction, TransactionError, TransactionHash};
use tracing::{error, trace};

/// Error of committed cross-chain transaction log
#[derive(Debug, thiserror::Error)]
pub enum CommitLogError {
    /// Store error
    #[error("Store error: {error}")]
    Store {
        /// Low-level error
        #[from]
        error: KvStoreError,
    },
    /// Recorded transaction can't be decoded
    #[error("Failed to decode recorded transaction: {error}")]
    Decode {
        /// Low-level error
        #[from]
        error: TransactionError,
    },
}

fn table_name(chain_id: ChainId) -> String {
    format!("committed_ctx_{chain_id}")
}

/// Log of committed cross-chain transactions keyed by anchor hash
#[derive(Debug, Clone)]
pub struct CommittedCrossChainTxLog<S> {
    store: S,
}

impl<S> CommittedCrossChainTxLog<S>
where
    S: KeyValueStore,
{
    /// Create new instance
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record local transaction under anchor hash, replacing previous record if any
    pub fn save(&self, anchor_hash: &TransactionHash, tx: &Transaction, chain_id: ChainId) -> bool {
        match self
            .store
            .put(&table_name(chain_id), anchor_hash.as_ref(), &tx.to_bytes())
        {
            Ok(()) => {
                trace!(%chain_id, %anchor_hash, tx_hash = %tx.hash(), "Saved committed cross-chain transaction");
                true
            }
            Err(error) => {
                error!(%chain_id, %anchor_hash, %error, "Failed to save committed cross-chain transaction");
                false
            }
        }
    }

    /// Local transaction recorded under anchor hash, `Ok(None)` means there is no record
    pub fn try_get(
        &self,
        anchor_hash: &TransactionHash,
        chain_id: ChainId,
    ) -> Result<Option<Transaction>, CommitLogError> {
        let Some(bytes) = self
            .store
            .get(&table_name(chain_id), anchor_hash.as_ref())?
        else {
            return Ok(None);
        };

        Ok(Some(Transaction::from_bytes(&bytes)?))
    }

    /// Local transaction recorded under anchor hash
    pub fn get(&self, anchor_hash: &TransactionHash, chain_id: ChainId) -> Option<Transaction> {
        self.try_get(anchor_hash, chain_id)
            .inspect_err(|error| {
                error!(%chain_id, %anchor_hash, %error, "Failed to read committed cross-chain transaction");
            })
            .ok()
            .flatten()
    }

    /// Remove record, `Ok(false)` means there was no record
    pub fn try_delete(
        &self,
        anchor_hash: &TransactionHash,
        chain_id: ChainId,
    ) -> Result<bool, CommitLogError> {
        Ok(self
            .store
            .delete(&table_name(chain_id), anchor_hash.as_ref())?)
    }

    /// Remove record, returns `false` if there was no record
    pub fn delete(&self, anchor_hash: &TransactionHash, chain_id: ChainId) -> bool {
        self.try_delete(anchor_hash, chain_id)
            .inspect_err(|error| {
                error!(%chain_id, %anchor_hash, %error, "Failed to delete committed cross-chain transaction");
            })
            .unwrap_or_default()
    }

    /// Whether there is a record under anchor hash
    pub fn contains(&self, anchor_hash: &TransactionHash, chain_id: ChainId) -> bool {
        self.get(anchor_hash, chain_id).is_some()
    }

    /// All recorded transactions of a chain, in no particular order.
    ///
    /// Returns `None` on storage faults.
    pub fn get_list(&self, chain_id: ChainId) -> Option<Vec<Transaction>> {
        let entries = match self.store.entries(&table_name(chain_id)) {
            Ok(entries) => entries,
            Err(error) => {
                error!(%chain_id, %error, "Failed to list committed cross-chain transactions");
                return None;
            }
        };

        entries
            .into_iter()
            .map(|(_anchor_hash, bytes)| Transaction::from_bytes(&bytes))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|error| {
                error!(%chain_id, %error, "Failed to decode committed cross-chain transaction");
            })
            .ok()
    }
}
