//! Transaction processors and batch orchestration.
//!
//! Every transaction type has a [`TransactionProcessor`] responsible for type-specific validation
//! and side effects. Processors are registered in a [`ProcessorRegistry`], registration order is
//! the order in which processors are invoked.
//!
//! [`BatchOrchestrator`] drives a batch of transactions (a block being built or verified) through
//! validation, the ledger and processors, making sure that either all stages commit or none of
//! them do.

mod batch_info;
mod orchestrator;
mod protocol_version;
mod registry;
#[cfg(test)]
mod tests;

pub use crate::batch_info::{BatchInfo, ContractResult};
pub use crate::orchestrator::{
    BatchMode, BatchOrchestrator, BatchSession, CommitStage, CommittedBatch, OrchestratorError,
};
pub use crate::protocol_version::{ProtocolVersionSource, StaticProtocolVersions};
pub use crate::registry::{ProcessorRegistry, ProcessorRegistryBuilder, RegistryError};
use ll_kv_store::KvStoreError;
use ll_ledger::{LedgerCode, LedgerError};
use ll_primitives::chain::{BlockHeader, ChainId};
use ll_primitives::payload::PayloadError;
use ll_primitives::transaction::{Transaction, TransactionHash, TxType};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reason a transaction was rejected
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    /// Spend is not covered by spendable balance
    InsufficientBalance,
    /// Nonce was already consumed
    DoubleSpend,
    /// Nonce is not known yet
    OrphanNonce,
    /// Transaction or its payload can't be decoded or is structurally invalid
    Malformed,
    /// Transaction shape is not supported by protocol version of the chain
    UnsupportedProtocolVersion,
    /// No processor registered for transaction type
    UnsupportedTxType,
    /// Transaction is already part of the batch
    DuplicateTransaction,
    /// Called contract doesn't exist
    UnknownContract,
    /// Contract call parameters are invalid
    InvalidContractCall,
    /// Alias doesn't satisfy format rules
    AliasInvalid,
    /// Alias is already used
    AliasTaken,
    /// Address already has an alias
    AddressAlreadyAliased,
    /// Burned amount is below alias fee
    InsufficientAliasBurn,
    /// Anchor hash was already committed by a different transaction
    AnchorAlreadyCommitted,
    /// Origin chain of cross-chain transaction is invalid
    InvalidCrossChainOrigin,
    /// Coinbase transaction rules are violated
    CoinBaseRules,
    /// Spend is not authorized
    Unauthorized,
    /// Ledger rejected coin data of the block as a whole
    InvalidBlockCoinData,
    /// Collaborator failed, transaction may be valid
    CollaboratorFault,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ErrorCode {
    /// Error code corresponding to ledger rejection, `None` for [`LedgerCode::Success`]
    pub fn from_ledger_code(code: LedgerCode) -> Option<Self> {
        Some(match code {
            LedgerCode::Success => {
                return None;
            }
            LedgerCode::Orphan => Self::OrphanNonce,
            LedgerCode::DoubleSpend => Self::DoubleSpend,
            LedgerCode::InsufficientBalance => Self::InsufficientBalance,
            LedgerCode::Malformed => Self::Malformed,
            LedgerCode::Unauthorized => Self::Unauthorized,
        })
    }
}

/// Rejected transaction
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RejectedTx {
    /// Transaction hash
    pub tx_hash: TransactionHash,
    /// Rejection reason
    pub code: ErrorCode,
}

/// Result of validation: transactions that are invalid, all others are valid
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct ValidateOutcome {
    /// Rejected transactions with reasons
    pub rejected: Vec<RejectedTx>,
}

impl ValidateOutcome {
    /// Record rejection
    pub fn reject(&mut self, tx_hash: TransactionHash, code: ErrorCode) {
        self.rejected.push(RejectedTx { tx_hash, code });
    }

    /// Whether transaction was rejected
    pub fn is_rejected(&self, tx_hash: &TransactionHash) -> bool {
        self.rejected
            .iter()
            .any(|rejected| &rejected.tx_hash == tx_hash)
    }

    /// Rejection code of a transaction
    pub fn code_of(&self, tx_hash: &TransactionHash) -> Option<ErrorCode> {
        self.rejected
            .iter()
            .find(|rejected| &rejected.tx_hash == tx_hash)
            .map(|rejected| rejected.code)
    }

    /// Whether all transactions are valid
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Append rejections from another outcome
    pub fn extend(&mut self, other: ValidateOutcome) {
        self.rejected.extend(other.rejected);
    }
}

/// Error of processor commit, rollback or execution
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Ledger error
    #[error("Ledger error: {error}")]
    Ledger {
        /// Low-level error
        #[from]
        error: LedgerError,
    },
    /// Ledger refused to apply transactions
    #[error("Ledger refused to apply transactions")]
    LedgerRejected,
    /// Store error
    #[error("Store error: {error}")]
    Store {
        /// Low-level error
        #[from]
        error: KvStoreError,
    },
    /// Payload error
    #[error("Payload error: {error}")]
    Payload {
        /// Low-level error
        #[from]
        error: PayloadError,
    },
    /// Custom processor error
    #[error("Custom processor error: {error}")]
    Custom {
        /// Custom processor error
        #[from]
        error: anyhow::Error,
    },
}

/// Type-specific transaction logic.
///
/// Transactions are always passed in block order.
pub trait TransactionProcessor: fmt::Debug + Send + Sync + 'static {
    /// Transaction type this processor handles
    fn tx_type(&self) -> TxType;

    /// Check transactions without changing any state, returns the invalid ones.
    ///
    /// `txs_by_type` contains transactions accepted earlier into the same batch, grouped by type.
    /// `block_header` is `None` when validating for the unconfirmed pool. Must be idempotent.
    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome;

    /// Block assembly hook that runs after the set of transactions is frozen and before commit
    fn execute(
        &self,
        _chain_id: ChainId,
        _txs: &[Transaction],
        _block_header: &BlockHeader,
        _batch_info: &mut BatchInfo,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Apply side effects of transactions.
    ///
    /// Must be a no-op for transactions whose effects are already persisted.
    fn commit(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError>;

    /// Reverse side effects of a previous [`Self::commit()`] of these transactions.
    ///
    /// Must be a no-op for transactions that were not committed.
    fn rollback(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError>;
}

impl<P> TransactionProcessor for Arc<P>
where
    P: TransactionProcessor,
{
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        self.as_ref().tx_type()
    }

    #[inline(always)]
    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        self.as_ref()
            .validate(chain_id, txs, txs_by_type, block_header)
    }

    #[inline(always)]
    fn execute(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &mut BatchInfo,
    ) -> Result<(), ProcessorError> {
        self.as_ref()
            .execute(chain_id, txs, block_header, batch_info)
    }

    #[inline(always)]
    fn commit(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        self.as_ref()
            .commit(chain_id, txs, block_header, batch_info)
    }

    #[inline(always)]
    fn rollback(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        self.as_ref().rollback(chain_id, txs, block_header)
    }
}
