use ll_primitives::chain::{BlockHeader, ChainId};
use ll_primitives::payload::TxPayload;
use ll_primitives::transaction::{Transaction, TxType};
use ll_tx_processor::{
    BatchInfo, ErrorCode, ProcessorError, TransactionProcessor, ValidateOutcome,
};
use std::collections::HashMap;
use tracing::debug;

/// Processor of [`TxType::TRANSFER`] transactions.
///
/// Balances are maintained by the ledger, so there is nothing to commit or roll back.
#[derive(Debug, Default, Copy, Clone)]
pub struct TransferProcessor;

impl TransactionProcessor for TransferProcessor {
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        TxType::TRANSFER
    }

    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        _txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        _block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        let mut outcome = ValidateOutcome::default();

        for tx in txs {
            let valid = matches!(TxPayload::decode(tx), Ok(TxPayload::Transfer))
                && tx
                    .coin_data()
                    .is_ok_and(|coin_data| !coin_data.from.is_empty() && !coin_data.to.is_empty());
            if !valid {
                debug!(%chain_id, tx_hash = %tx.hash(), "Malformed transfer");
                outcome.reject(*tx.hash(), ErrorCode::Malformed);
            }
        }

        outcome
    }

    #[inline(always)]
    fn commit(
        &self,
        _chain_id: ChainId,
        _txs: &[Transaction],
        _block_header: &BlockHeader,
        _batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    #[inline(always)]
    fn rollback(
        &self,
        _chain_id: ChainId,
        _txs: &[Transaction],
        _block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }
}
