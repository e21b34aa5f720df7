//! Pool of unconfirmed transactions of a single chain.
//!
//! Transactions enter the pool after passing processor validation and being recorded by the ledger
//! as unconfirmed, which advances shadow nonces so that further transactions can spend from them.
//! Transactions leave the pool when they are included in a block, evicted or expired.


use ll_ledger::{LedgerError, LedgerService, LedgerServiceExt};
use ll_primitives::chain::ChainId;
use ll_primitives::transaction::{Transaction, TransactionHash};
use ll_tx_processor::{BatchOrchestrator, ErrorCode};
use std::collections::{HashMap, VecDeque};
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use tracing::{debug, trace};

/// Transaction pool limits
#[derive(Debug, Copy, Clone)]
pub struct TransactionPoolLimits {
    /// Number of transactions.
    ///
    /// Default: 10 000.
    pub count: NonZeroUsize,
    /// Total size of all transactions in bytes.
    ///
    /// Default: 16 MiB.
    pub size: NonZeroUsize,
}

impl Default for TransactionPoolLimits {
    fn default() -> Self {
        Self {
            count: NonZeroUsize::new(10_000).expect("Not zero; qed"),
            size: NonZeroUsize::new(16 * 1024 * 1024).expect("Not zero; qed"),
        }
    }
}

/// Transaction in the pool
#[derive(Debug)]
#[non_exhaustive]
pub struct PoolTransaction {
    /// Transaction
    pub tx: Transaction,
    /// Encoded size in bytes
    pub size: usize,
    /// Time transaction was added, in milliseconds since UNIX epoch
    pub added_at: u64,
}

/// Error for [`TransactionPool::add()`] method
#[derive(Debug, thiserror::Error)]
pub enum TransactionAddError {
    /// Already exists
    #[error("Already exists")]
    AlreadyExists,
    /// Too many transactions
    #[error("Too many transactions")]
    TooManyTransactions,
    /// Total size too large
    #[error("Total size too large")]
    TotalSizeTooLarge,
    /// Transaction is invalid
    #[error("Transaction is invalid: {code}")]
    Rejected {
        /// Rejection reason
        code: ErrorCode,
    },
    /// Ledger error
    #[error("Ledger error: {error}")]
    Ledger {
        /// Low-level error
        #[from]
        error: LedgerError,
    },
}

/// Transaction pool implementation.
///
/// Transactions are kept in arrival order, which is also the order in which they are offered for
/// block production.
#[derive(Debug)]
pub struct TransactionPool<L>
where
    L: LedgerService,
{
    chain_id: ChainId,
    orchestrator: Arc<BatchOrchestrator<L>>,
    transactions: HashMap<TransactionHash, PoolTransaction>,
    order: VecDeque<TransactionHash>,
    total_size: usize,
    max_age: NonZeroU64,
    limits: TransactionPoolLimits,
}

impl<L> TransactionPool<L>
where
    L: LedgerService,
{
    /// Create new instance.
    ///
    /// `max_age` defines how old (in milliseconds) should transaction be before it is removed by
    /// [`Self::prune_expired()`].
    ///
    /// `limits` defines the limits of transaction pool.
    pub fn new(
        chain_id: ChainId,
        orchestrator: Arc<BatchOrchestrator<L>>,
        max_age: NonZeroU64,
        limits: TransactionPoolLimits,
    ) -> Self {
        Self {
            chain_id,
            orchestrator,
            transactions: HashMap::default(),
            order: VecDeque::default(),
            total_size: 0,
            max_age,
            limits,
        }
    }

    /// Validate and add new transaction to the pool, `now` is current time in milliseconds since
    /// UNIX epoch
    pub fn add(&mut self, tx: Transaction, now: u64) -> Result<(), TransactionAddError> {
        let tx_hash = *tx.hash();
        if self.contains(&tx_hash) {
            return Err(TransactionAddError::AlreadyExists);
        }

        if self.transactions.len() == self.limits.count.get() {
            return Err(TransactionAddError::TooManyTransactions);
        }

        let tx_size = tx.to_bytes().len();
        if self.limits.size.get() - self.total_size < tx_size {
            return Err(TransactionAddError::TotalSizeTooLarge);
        }

        let outcome = self
            .orchestrator
            .validate_unconfirmed(self.chain_id, std::slice::from_ref(&tx));
        if let Some(code) = outcome.code_of(&tx_hash) {
            return Err(TransactionAddError::Rejected { code });
        }

        let result = self
            .orchestrator
            .ledger()
            .commit_unconfirmed(self.chain_id, &tx)?;
        if let Some(code) = ErrorCode::from_ledger_code(result.code) {
            debug!(
                chain_id = %self.chain_id,
                %tx_hash,
                %code,
                description = %result.description,
                "Transaction rejected by ledger"
            );
            return Err(TransactionAddError::Rejected { code });
        }

        trace!(chain_id = %self.chain_id, %tx_hash, tx_size, "Transaction added to the pool");

        self.total_size += tx_size;
        self.order.push_back(tx_hash);
        self.transactions.insert(
            tx_hash,
            PoolTransaction {
                tx,
                size: tx_size,
                added_at: now,
            },
        );

        Ok(())
    }

    /// Whether transaction pool contains a transaction
    pub fn contains(&self, tx_hash: &TransactionHash) -> bool {
        self.transactions.contains_key(tx_hash)
    }

    /// Get transaction from the pool
    pub fn get(&self, tx_hash: &TransactionHash) -> Option<&PoolTransaction> {
        self.transactions.get(tx_hash)
    }

    /// Number of transactions in the pool
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the pool is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Total size of all transactions in bytes
    #[inline(always)]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Transactions in arrival order, to be offered for inclusion into the next block
    pub fn candidates(&self) -> impl Iterator<Item = &'_ Transaction> + '_ {
        self.order
            .iter()
            .filter_map(|tx_hash| self.transactions.get(tx_hash))
            .map(|pool_tx| &pool_tx.tx)
    }

    /// Remove transactions that were included in a block.
    ///
    /// The ledger forgets about committed transactions on its own, so this only updates the pool.
    pub fn remove_committed(&mut self, txs: &[Transaction]) {
        for tx in txs {
            self.remove_single_tx(tx.hash());
        }
    }

    /// Evict a transaction together with all transactions that depend on it.
    ///
    /// Returns hashes of evicted transactions, empty if transaction is unknown.
    pub fn evict(&mut self, tx_hash: &TransactionHash) -> Result<Vec<TransactionHash>, LedgerError> {
        let Some(pool_tx) = self.transactions.get(tx_hash) else {
            return Ok(Vec::new());
        };

        let mut removed = self
            .orchestrator
            .ledger()
            .rollback_unconfirmed(self.chain_id, &pool_tx.tx)?;
        // Ledger may have forgotten transaction already, pool must not keep it either way
        if !removed.contains(tx_hash) {
            removed.insert(0, *tx_hash);
        }
        for removed_tx_hash in &removed {
            self.remove_single_tx(removed_tx_hash);
        }

        debug!(
            chain_id = %self.chain_id,
            %tx_hash,
            evicted = removed.len(),
            "Transaction evicted"
        );

        Ok(removed)
    }

    /// Evict transactions older than configured max age, returns hashes of all evicted
    /// transactions
    pub fn prune_expired(&mut self, now: u64) -> Result<Vec<TransactionHash>, LedgerError> {
        let mut evicted = Vec::new();

        while let Some(tx_hash) = self.order.front().copied() {
            let Some(pool_tx) = self.transactions.get(&tx_hash) else {
                self.order.pop_front();
                continue;
            };
            if pool_tx.added_at.saturating_add(self.max_age.get()) > now {
                break;
            }

            evicted.extend(self.evict(&tx_hash)?);
        }

        Ok(evicted)
    }

    fn remove_single_tx(&mut self, tx_hash: &TransactionHash) {
        if let Some(pool_tx) = self.transactions.remove(tx_hash) {
            self.total_size -= pool_tx.size;
            self.order.retain(|existing| existing != tx_hash);
        }
    }
}
