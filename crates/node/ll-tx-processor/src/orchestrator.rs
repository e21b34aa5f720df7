use crate::{
    BatchInfo, ErrorCode, ProcessorError, ProcessorRegistry, TransactionProcessor,
    ValidateOutcome,
};
use ll_ledger::{LedgerError, LedgerService, LedgerServiceExt};
use ll_primitives::chain::{BlockHeader, BlockHeight, ChainId};
use ll_primitives::transaction::{Transaction, TransactionHash, TxType};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::{fmt, mem};
use tracing::{debug, error, info, warn};

/// Mode of a batch session
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BatchMode {
    /// Assembling a block: rejected transactions are excluded, the rest is committed
    BlockBuild,
    /// Verifying a received block: any rejected transaction invalidates the whole block
    BlockVerify,
}

/// Stage of batch commit
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommitStage {
    /// Execution hook of a processor
    Execute(TxType),
    /// Ledger
    Ledger,
    /// Commit of a processor
    Processor(TxType),
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute(tx_type) => write!(f, "execute of tx type {tx_type}"),
            Self::Ledger => f.write_str("ledger"),
            Self::Processor(tx_type) => write!(f, "processor of tx type {tx_type}"),
        }
    }
}

/// Batch orchestrator error
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Another session is live for the chain
    #[error("Batch session for chain {chain_id} is already in progress")]
    SessionInProgress {
        /// Chain ID
        chain_id: ChainId,
    },
    /// Ledger refused to open a batch
    #[error("Ledger refused to open batch for chain {chain_id}")]
    BatchNotifyRejected {
        /// Chain ID
        chain_id: ChainId,
    },
    /// Ledger error
    #[error("Ledger error: {error}")]
    Ledger {
        /// Low-level error
        #[from]
        error: LedgerError,
    },
    /// Block contains invalid transactions
    #[error("Block {height} of chain {chain_id} has {rejected} invalid transactions")]
    InvalidBlock {
        /// Chain ID
        chain_id: ChainId,
        /// Block height
        height: BlockHeight,
        /// Number of rejected transactions
        rejected: usize,
    },
    /// Commit stage failed, previously committed stages were rolled back
    #[error("Commit failed at {stage}: {error}")]
    CommitFailed {
        /// Failed stage
        stage: CommitStage,
        /// Low-level error
        #[source]
        error: ProcessorError,
    },
    /// Block rollback failed
    #[error("Rollback failed at {stage}: {error}")]
    RollbackFailed {
        /// Failed stage
        stage: CommitStage,
        /// Low-level error
        #[source]
        error: ProcessorError,
    },
}

/// Successfully committed batch
#[derive(Debug)]
pub struct CommittedBatch {
    /// Committed transactions in block order
    pub txs: Vec<Transaction>,
    /// Batch info produced while committing
    pub batch_info: BatchInfo,
}

/// Group transactions by type preserving order within each type
fn group_by_type(txs: &[Transaction]) -> HashMap<TxType, Vec<Transaction>> {
    let mut txs_by_type = HashMap::<TxType, Vec<Transaction>>::new();
    for tx in txs {
        txs_by_type.entry(tx.tx_type()).or_default().push(tx.clone());
    }
    txs_by_type
}

/// Releases per-chain slot on drop
#[derive(Debug)]
struct SlotGuard<'a> {
    live: &'a Mutex<HashSet<ChainId>>,
    chain_id: ChainId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.live.lock().remove(&self.chain_id);
    }
}

impl<'a> SlotGuard<'a> {
    fn acquire(
        live: &'a Mutex<HashSet<ChainId>>,
        chain_id: ChainId,
    ) -> Result<Self, OrchestratorError> {
        if !live.lock().insert(chain_id) {
            return Err(OrchestratorError::SessionInProgress { chain_id });
        }

        Ok(Self { live, chain_id })
    }
}

/// Drives batches of transactions through validation, the ledger and processors.
///
/// At most one session ([`BatchSession`]) is live per chain at any time.
#[derive(Debug)]
pub struct BatchOrchestrator<L> {
    ledger: L,
    registry: ProcessorRegistry,
    live: Mutex<HashSet<ChainId>>,
}

impl<L> BatchOrchestrator<L>
where
    L: LedgerService,
{
    /// Create new instance
    pub fn new(ledger: L, registry: ProcessorRegistry) -> Self {
        Self {
            ledger,
            registry,
            live: Mutex::default(),
        }
    }

    /// Ledger used by the orchestrator
    #[inline(always)]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Registered processors
    #[inline(always)]
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Start a batch session for a block
    pub fn begin(
        &self,
        chain_id: ChainId,
        mode: BatchMode,
        block_header: BlockHeader,
    ) -> Result<BatchSession<'_, L>, OrchestratorError> {
        let slot = SlotGuard::acquire(&self.live, chain_id)?;

        if !self.ledger.coin_data_batch_notify(chain_id)? {
            return Err(OrchestratorError::BatchNotifyRejected { chain_id });
        }

        debug!(
            %chain_id,
            ?mode,
            height = %block_header.height,
            "Batch session started"
        );

        Ok(BatchSession {
            orchestrator: self,
            _slot: slot,
            chain_id,
            mode,
            block_header,
            candidates: Vec::new(),
            seen: HashSet::new(),
            rejected: ValidateOutcome::default(),
            finished: false,
        })
    }

    /// Validate transactions for the unconfirmed pool with processors only, the caller is
    /// expected to check coin data with [`LedgerService::commit_unconfirmed_tx()`] afterwards
    pub fn validate_unconfirmed(&self, chain_id: ChainId, txs: &[Transaction]) -> ValidateOutcome {
        let (_survivors, outcome) =
            self.validate_with_processors(chain_id, txs, &HashMap::new(), None, &HashSet::new());
        outcome
    }

    /// Roll back a previously committed block, processors in reverse registration order first,
    /// then the ledger
    pub fn rollback_block(
        &self,
        chain_id: ChainId,
        block_header: &BlockHeader,
        txs: &[Transaction],
    ) -> Result<(), OrchestratorError> {
        let _slot = SlotGuard::acquire(&self.live, chain_id)?;
        let txs_by_type = group_by_type(txs);

        for processor in self.registry.iter().rev() {
            let tx_type = processor.tx_type();
            let Some(txs) = txs_by_type.get(&tx_type) else {
                continue;
            };
            processor
                .rollback(chain_id, txs, block_header)
                .map_err(|error| OrchestratorError::RollbackFailed {
                    stage: CommitStage::Processor(tx_type),
                    error,
                })?;
        }

        let rolled_back = self
            .ledger
            .rollback_txs(chain_id, txs, block_header.height)
            .map_err(|error| OrchestratorError::RollbackFailed {
                stage: CommitStage::Ledger,
                error: error.into(),
            })?;
        if !rolled_back {
            return Err(OrchestratorError::RollbackFailed {
                stage: CommitStage::Ledger,
                error: ProcessorError::LedgerRejected,
            });
        }

        info!(
            %chain_id,
            height = %block_header.height,
            txs = txs.len(),
            "Block rolled back"
        );

        Ok(())
    }

    /// Deduplicate against `seen` and within `txs`, check processor presence and run processor
    /// validation.
    ///
    /// Returns transactions that passed in their original order.
    fn validate_with_processors(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        context: &HashMap<TxType, Vec<Transaction>>,
        block_header: Option<&BlockHeader>,
        seen: &HashSet<TransactionHash>,
    ) -> (Vec<Transaction>, ValidateOutcome) {
        let mut outcome = ValidateOutcome::default();
        let mut known = Vec::with_capacity(txs.len());
        let mut offered = HashSet::with_capacity(txs.len());

        for tx in txs {
            if seen.contains(tx.hash()) || !offered.insert(*tx.hash()) {
                outcome.reject(*tx.hash(), ErrorCode::DuplicateTransaction);
            } else if !self.registry.contains(tx.tx_type()) {
                outcome.reject(*tx.hash(), ErrorCode::UnsupportedTxType);
            } else {
                known.push(tx.clone());
            }
        }

        let known_by_type = group_by_type(&known);
        let mut processor_outcome = ValidateOutcome::default();
        for processor in self.registry.iter() {
            let Some(txs) = known_by_type.get(&processor.tx_type()) else {
                continue;
            };
            processor_outcome.extend(processor.validate(chain_id, txs, context, block_header));
        }

        // Duplicates share the hash with accepted transactions, only processor rejections apply
        known.retain(|tx| !processor_outcome.is_rejected(tx.hash()));
        outcome.extend(processor_outcome);

        (known, outcome)
    }
}

/// Live batch session.
///
/// Dropping a session without calling [`Self::commit()`] aborts it, in [`BatchMode::BlockBuild`]
/// mode batch frontier advances of its candidates are discarded.
pub struct BatchSession<'a, L>
where
    L: LedgerService,
{
    orchestrator: &'a BatchOrchestrator<L>,
    _slot: SlotGuard<'a>,
    chain_id: ChainId,
    mode: BatchMode,
    block_header: BlockHeader,
    candidates: Vec<Transaction>,
    seen: HashSet<TransactionHash>,
    rejected: ValidateOutcome,
    finished: bool,
}

impl<L> fmt::Debug for BatchSession<'_, L>
where
    L: LedgerService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSession")
            .field("chain_id", &self.chain_id)
            .field("mode", &self.mode)
            .field("block_header", &self.block_header)
            .field("candidates", &self.candidates.len())
            .field("rejected", &self.rejected.rejected.len())
            .finish_non_exhaustive()
    }
}

impl<L> Drop for BatchSession<'_, L>
where
    L: LedgerService,
{
    fn drop(&mut self) {
        if !self.finished {
            self.discard_staged(&self.candidates);
            debug!(
                chain_id = %self.chain_id,
                height = %self.block_header.height,
                "Batch session aborted"
            );
        }
    }
}

impl<L> BatchSession<'_, L>
where
    L: LedgerService,
{
    /// Chain of this session
    #[inline(always)]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Transactions accepted so far, in block order
    #[inline(always)]
    pub fn candidates(&self) -> &[Transaction] {
        &self.candidates
    }

    /// All rejections so far
    #[inline(always)]
    pub fn rejected(&self) -> &ValidateOutcome {
        &self.rejected
    }

    /// Validate more transactions of the block.
    ///
    /// Accepted transactions become candidates for commit, rejections are returned and also
    /// accumulated in the session.
    pub fn validate(&mut self, txs: &[Transaction]) -> Result<ValidateOutcome, OrchestratorError> {
        let orchestrator = self.orchestrator;
        let context = group_by_type(&self.candidates);
        let (mut survivors, mut outcome) = orchestrator.validate_with_processors(
            self.chain_id,
            txs,
            &context,
            Some(&self.block_header),
            &self.seen,
        );

        match self.mode {
            BatchMode::BlockBuild => {
                let mut ledger_outcome = ValidateOutcome::default();
                for tx in &survivors {
                    let result = orchestrator.ledger.verify_tx(self.chain_id, tx, true)?;
                    if let Some(code) = ErrorCode::from_ledger_code(result.code) {
                        debug!(
                            chain_id = %self.chain_id,
                            tx_hash = %tx.hash(),
                            %code,
                            description = %result.description,
                            "Transaction rejected by ledger"
                        );
                        ledger_outcome.reject(*tx.hash(), code);
                    }
                }
                survivors.retain(|tx| !ledger_outcome.is_rejected(tx.hash()));
                outcome.extend(ledger_outcome);
            }
            BatchMode::BlockVerify => {
                let block_txs = self
                    .candidates
                    .iter()
                    .chain(&survivors)
                    .cloned()
                    .collect::<Vec<_>>();
                let valid = orchestrator.ledger.verify_block_txs(
                    self.chain_id,
                    &block_txs,
                    self.block_header.height,
                )?;
                if !valid {
                    for tx in survivors.drain(..) {
                        outcome.reject(*tx.hash(), ErrorCode::InvalidBlockCoinData);
                    }
                }
            }
        }

        // Only accepted transactions are remembered, rejected ones may be offered again
        self.seen.extend(survivors.iter().map(|tx| *tx.hash()));
        self.candidates.extend(survivors);
        self.rejected.extend(outcome.clone());

        Ok(outcome)
    }

    /// Explicitly abort the session
    pub fn abort(mut self) {
        self.discard_staged(&self.candidates);
        self.finished = true;
        debug!(
            chain_id = %self.chain_id,
            height = %self.block_header.height,
            "Batch session aborted explicitly"
        );
    }

    /// Commit candidates: execution hooks, then the ledger, then processors in registration
    /// order.
    ///
    /// On failure stages that were already committed, including a processor whose commit failed,
    /// are rolled back in reverse order. Batch frontier advances of candidates are discarded if
    /// the ledger was not reached.
    pub fn commit(mut self) -> Result<CommittedBatch, OrchestratorError> {
        let orchestrator = self.orchestrator;
        let chain_id = self.chain_id;
        let block_header = self.block_header;

        if self.mode == BatchMode::BlockVerify && !self.rejected.is_empty() {
            return Err(OrchestratorError::InvalidBlock {
                chain_id,
                height: block_header.height,
                rejected: self.rejected.rejected.len(),
            });
        }

        let txs = mem::take(&mut self.candidates);
        let txs_by_type = group_by_type(&txs);
        let mut batch_info = BatchInfo::new(chain_id);

        for processor in orchestrator.registry.iter() {
            let tx_type = processor.tx_type();
            let Some(processor_txs) = txs_by_type.get(&tx_type) else {
                continue;
            };
            if let Err(error) =
                processor.execute(chain_id, processor_txs, &block_header, &mut batch_info)
            {
                self.discard_staged(&txs);
                return Err(OrchestratorError::CommitFailed {
                    stage: CommitStage::Execute(tx_type),
                    error,
                });
            }
        }

        let ledger_error = match orchestrator
            .ledger
            .commit_txs(chain_id, &txs, block_header.height)
        {
            Ok(true) => None,
            Ok(false) => Some(ProcessorError::LedgerRejected),
            Err(error) => Some(error.into()),
        };
        if let Some(error) = ledger_error {
            self.discard_staged(&txs);
            return Err(OrchestratorError::CommitFailed {
                stage: CommitStage::Ledger,
                error,
            });
        }

        let mut committed = Vec::<&dyn TransactionProcessor>::new();
        for processor in orchestrator.registry.iter() {
            let tx_type = processor.tx_type();
            let Some(processor_txs) = txs_by_type.get(&tx_type) else {
                continue;
            };

            // Failed commit may be partial and is rolled back as well
            committed.push(processor);
            if let Err(error) = processor.commit(chain_id, processor_txs, &block_header, &batch_info)
            {
                warn!(
                    %chain_id,
                    height = %block_header.height,
                    %tx_type,
                    %error,
                    "Processor commit failed, rolling back"
                );
                self.compensate(&committed, &txs_by_type, &txs);
                return Err(OrchestratorError::CommitFailed {
                    stage: CommitStage::Processor(tx_type),
                    error,
                });
            }
        }

        self.finished = true;
        info!(
            %chain_id,
            height = %block_header.height,
            txs = txs.len(),
            "Batch committed"
        );

        Ok(CommittedBatch { txs, batch_info })
    }

    /// Revert batch frontier advances of staged transactions, newest first
    fn discard_staged(&self, txs: &[Transaction]) {
        if self.mode != BatchMode::BlockBuild {
            return;
        }

        for tx in txs.iter().rev() {
            match self
                .orchestrator
                .ledger
                .rollback_validate_status(self.chain_id, tx)
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        chain_id = %self.chain_id,
                        tx_hash = %tx.hash(),
                        "Transaction was not staged in batch frontier"
                    );
                }
                Err(error) => {
                    error!(
                        chain_id = %self.chain_id,
                        tx_hash = %tx.hash(),
                        %error,
                        "Failed to discard staged transaction"
                    );
                }
            }
        }
    }

    /// Roll back processors that attempted commit in reverse order and then the ledger
    fn compensate(
        &self,
        committed: &[&dyn TransactionProcessor],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        txs: &[Transaction],
    ) {
        let chain_id = self.chain_id;
        let block_header = &self.block_header;

        for processor in committed.iter().rev() {
            let tx_type = processor.tx_type();
            let Some(processor_txs) = txs_by_type.get(&tx_type) else {
                continue;
            };
            if let Err(error) = processor.rollback(chain_id, processor_txs, block_header) {
                error!(
                    %chain_id,
                    height = %block_header.height,
                    %tx_type,
                    %error,
                    "Failed to roll back processor after failed commit"
                );
            }
        }

        match self
            .orchestrator
            .ledger
            .rollback_txs(chain_id, txs, block_header.height)
        {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    %chain_id,
                    height = %block_header.height,
                    "Ledger refused to roll back after failed commit"
                );
            }
            Err(error) => {
                error!(
                    %chain_id,
                    height = %block_header.height,
                    %error,
                    "Failed to roll back ledger after failed commit"
                );
            }
        }
    }
}
