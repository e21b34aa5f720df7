use crate::{LedgerError, LedgerService, VerifyCoinDataResult};
use ll_primitives::chain::{BlockHeight, ChainId};
use ll_primitives::transaction::{Transaction, TransactionHash};

fn to_hex_list(txs: &[Transaction]) -> Vec<String> {
    txs.iter().map(Transaction::to_hex).collect()
}

/// Typed wrappers around [`LedgerService`] that take decoded transactions
pub trait LedgerServiceExt: LedgerService {
    /// Typed version of [`LedgerService::verify_coin_data()`]
    fn verify_tx(
        &self,
        chain_id: ChainId,
        tx: &Transaction,
        is_batch: bool,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        self.verify_coin_data(chain_id, &tx.to_hex(), is_batch)
    }

    /// Typed version of [`LedgerService::verify_block_txs_coin_data()`]
    fn verify_block_txs(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.verify_block_txs_coin_data(chain_id, &to_hex_list(txs), height)
    }

    /// Typed version of [`LedgerService::commit_unconfirmed_tx()`]
    fn commit_unconfirmed(
        &self,
        chain_id: ChainId,
        tx: &Transaction,
    ) -> Result<VerifyCoinDataResult, LedgerError> {
        self.commit_unconfirmed_tx(chain_id, &tx.to_hex())
    }

    /// Typed version of [`LedgerService::commit_txs_ledger()`]
    fn commit_txs(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.commit_txs_ledger(chain_id, &to_hex_list(txs), height)
    }

    /// Typed version of [`LedgerService::rollback_tx_validate_status()`]
    fn rollback_validate_status(
        &self,
        chain_id: ChainId,
        tx: &Transaction,
    ) -> Result<bool, LedgerError> {
        self.rollback_tx_validate_status(chain_id, &tx.to_hex())
    }

    /// Typed version of [`LedgerService::roll_back_unconfirm_tx()`]
    fn rollback_unconfirmed(
        &self,
        chain_id: ChainId,
        tx: &Transaction,
    ) -> Result<Vec<TransactionHash>, LedgerError> {
        self.roll_back_unconfirm_tx(chain_id, &tx.to_hex())
    }

    /// Typed version of [`LedgerService::rollback_txs_ledger()`]
    fn rollback_txs(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        height: BlockHeight,
    ) -> Result<bool, LedgerError> {
        self.rollback_txs_ledger(chain_id, &to_hex_list(txs), height)
    }
}

impl<L> LedgerServiceExt for L where L: LedgerService + ?Sized {}
