//! Nonce-chain ledger.
//!
//! Every address/asset pair has a nonce pointer: a spend must declare the current pointer as its
//! nonce, and once applied the pointer becomes the last 8 bytes of the spending transaction's
//! hash. Three views of pointers exist per chain:
//! * confirmed: state after all committed blocks, persisted in a [`KeyValueStore`]
//! * shadow: confirmed plus unconfirmed transactions accepted into the pool
//! * batch frontier: confirmed plus transactions staged while a block is being assembled
//!
//! [`LedgerService`] is the contract the rest of the node consumes, transactions cross it
//! hex-encoded. [`LedgerServiceExt`] provides typed wrappers on top. [`NonceChainLedger`] is the
//! reference implementation.
//!
//! [`KeyValueStore`]: ll_kv_store::KeyValueStore

mod authorizer;
mod ext;
mod nonce_chain;

pub use crate::authorizer::{
    AuthorizationError, Ed25519SpendAuthorizer, PermissiveSpendAuthorizer, SpendAuthorizer,
};
pub use crate::ext::LedgerServiceExt;
pub use crate::nonce_chain::NonceChainLedger;
use ll_kv_store::KvStoreError;
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeight, ChainId};
use ll_primitives::coin_data::Asset;
use ll_primitives::nonce::Nonce;
use ll_primitives::transaction::{TransactionError, TransactionHash};
use std::fmt;
use std::sync::Arc;

/// Outcome code of coin data verification
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LedgerCode {
    /// Coin data is valid
    Success,
    /// Declared nonce is not known yet, transaction may become valid later
    Orphan,
    /// Declared nonce was already consumed
    DoubleSpend,
    /// Spend is not covered by spendable balance
    InsufficientBalance,
    /// Coin data can't be decoded or violates structural invariants
    Malformed,
    /// Spend is not authorized by the owner of the address
    Unauthorized,
}

impl fmt::Display for LedgerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Orphan => "orphan",
            Self::DoubleSpend => "double spend",
            Self::InsufficientBalance => "insufficient balance",
            Self::Malformed => "malformed",
            Self::Unauthorized => "unauthorized",
        })
    }
}

/// Result of coin data verification
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VerifyCoinDataResult {
    /// Outcome code
    pub code: LedgerCode,
    /// Human-readable description, empty on success
    pub description: String,
}

impl VerifyCoinDataResult {
    /// Successful verification
    #[inline]
    pub fn success() -> Self {
        Self {
            code: LedgerCode::Success,
            description: String::new(),
        }
    }

    /// Rejected verification
    #[inline]
    pub fn rejected(code: LedgerCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Whether verification succeeded
    #[inline(always)]
    pub fn is_success(&self) -> bool {
        self.code == LedgerCode::Success
    }
}

/// Confirmed balance of an address/asset pair
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct AccountBalance {
    /// Spendable in the next block
    pub available: Amount,
    /// Locked until a future block height
    pub locked: Amount,
}

/// Balance and nonce including unconfirmed transactions
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct BalanceNonce {
    /// Confirmed spendable balance minus unconfirmed spends
    pub available: Amount,
    /// Latest nonce pointer
    pub nonce: Nonce,
}

/// Ledger error.
///
/// Rejections of coin data are not errors, they are reported through [`VerifyCoinDataResult`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Store error
    #[error("Store error: {error}")]
    Store {
        /// Low-level error
        #[from]
        error: KvStoreError,
    },
    /// Invalid transaction encoding
    #[error("Invalid transaction: {error}")]
    InvalidTransaction {
        /// Low-level error
        #[from]
        error: TransactionError,
    },
    /// Persisted ledger state is corrupted
    #[error("Corrupted ledger state in table {table}: {error}")]
    CorruptedState {
        /// Table name
        table: String,
        /// Low-level error
        error: parity_scale_codec::Error,
    },
}

/// Ledger contract.
///
/// Transactions are passed hex-encoded, see [`LedgerServiceExt`] for typed wrappers.
pub trait LedgerService: fmt::Debug + Send + Sync + 'static {
    /// Verify coin data of a single transaction.
    ///
    /// With `is_batch == false` nonces are checked against confirmed state plus unconfirmed
    /// transactions. With `is_batch == true` nonces are checked against confirmed state plus the
    /// batch frontier and successful verification advances the frontier. Re-verifying a
    /// transaction that is already staged succeeds without staging it again.
    fn verify_coin_data(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
        is_batch: bool,
    ) -> Result<VerifyCoinDataResult, LedgerError>;

    /// Verify coin data of all transactions of a block in order against confirmed state, later
    /// transactions may spend nonces produced by earlier ones
    fn verify_block_txs_coin_data(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError>;

    /// Latest nonce pointer: unconfirmed if any, confirmed otherwise
    fn get_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<Nonce, LedgerError>;

    /// Confirmed balance
    fn get_balance(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<AccountBalance, LedgerError>;

    /// Confirmed balance minus in-flight unconfirmed spends together with the latest nonce
    fn get_balance_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<BalanceNonce, LedgerError>;

    /// Open a new batch, discarding the previous batch frontier if any
    fn coin_data_batch_notify(&self, chain_id: ChainId) -> Result<bool, LedgerError>;

    /// Verify transaction against unconfirmed view and on success advance the shadow pointers
    fn commit_unconfirmed_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<VerifyCoinDataResult, LedgerError>;

    /// Apply transactions of a block to confirmed state.
    ///
    /// All-or-nothing: returns `false` without changing anything if any transaction doesn't
    /// apply. Transactions that were already committed are skipped. Committed transactions are
    /// removed from the unconfirmed set and the batch frontier is cleared.
    fn commit_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError>;

    /// Revert a staged batch advance, the transaction must be the tip of every nonce chain it
    /// spends from
    fn rollback_tx_validate_status(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<bool, LedgerError>;

    /// Remove unconfirmed transaction together with every unconfirmed transaction that depends
    /// on its nonces.
    ///
    /// Returns hashes of all removed transactions, empty if transaction was not unconfirmed.
    fn roll_back_unconfirm_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<Vec<TransactionHash>, LedgerError>;

    /// Revert confirmed advances of a block in reverse order, transactions that are not
    /// committed are skipped.
    ///
    /// All-or-nothing like [`Self::commit_txs_ledger()`].
    fn rollback_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError>;
}

impl<L> LedgerService for Arc<L>
where
    L: LedgerService,
{
    #[inline(always)]
    fn verify_coin_data(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
        is_batch: bool,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        self.as_ref().verify_coin_data(chain_id, tx_hex, is_batch)
    }

    #[inline(always)]
    fn verify_block_txs_coin_data(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.as_ref()
            .verify_block_txs_coin_data(chain_id, txs_hex, height)
    }

    #[inline(always)]
    fn get_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<Nonce, LedgerError> {
        self.as_ref().get_nonce(chain_id, address, asset)
    }

    #[inline(always)]
    fn get_balance(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<AccountBalance, LedgerError> {
        self.as_ref().get_balance(chain_id, address, asset)
    }

    #[inline(always)]
    fn get_balance_nonce(
        &self,
        chain_id: ChainId,
        address: &Address,
        asset: Asset,
    ) -> Result<BalanceNonce, LedgerError> {
        self.as_ref().get_balance_nonce(chain_id, address, asset)
    }

    #[inline(always)]
    fn coin_data_batch_notify(&self, chain_id: ChainId) -> Result<bool, LedgerError> {
        self.as_ref().coin_data_batch_notify(chain_id)
    }

    #[inline(always)]
    fn commit_unconfirmed_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        self.as_ref().commit_unconfirmed_tx(chain_id, tx_hex)
    }

    #[inline(always)]
    fn commit_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.as_ref().commit_txs_ledger(chain_id, txs_hex, height)
    }

    #[inline(always)]
    fn rollback_tx_validate_status(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<bool, LedgerError> {
        self.as_ref().rollback_tx_validate_status(chain_id, tx_hex)
    }

    #[inline(always)]
    fn roll_back_unconfirm_tx(
        &self,
        chain_id: ChainId,
        tx_hex: &str,
    ) -> Result<Vec<TransactionHash>, LedgerError> {
        self.as_ref().roll_back_unconfirm_tx(chain_id, tx_hex)
    }

    #[inline(always)]
    fn rollback_txs_ledger(
        &self,
        chain_id: ChainId,
        txs_hex: &[String],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.as_ref().rollback_txs_ledger(chain_id, txs_hex, height)
    }
}
