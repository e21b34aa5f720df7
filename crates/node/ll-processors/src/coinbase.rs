use ll_primitives::chain::{BlockHeader, ChainId};
use ll_primitives::payload::TxPayload;
use ll_primitives::transaction::{Transaction, TxType};
use ll_tx_processor::{
    BatchInfo, ErrorCode, ProcessorError, TransactionProcessor, ValidateOutcome,
};
use std::collections::HashMap;
use tracing::debug;

/// Processor of [`TxType::COIN_BASE`] transactions.
///
/// Coinbase only mints, it is accepted inside blocks only and at most once per block.
#[derive(Debug, Default, Copy, Clone)]
pub struct CoinBaseProcessor;

impl TransactionProcessor for CoinBaseProcessor {
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        TxType::COIN_BASE
    }

    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        let mut outcome = ValidateOutcome::default();
        let mut has_coinbase = txs_by_type
            .get(&TxType::COIN_BASE)
            .is_some_and(|txs| !txs.is_empty());

        for tx in txs {
            let tx_hash = *tx.hash();
            if !matches!(TxPayload::decode(tx), Ok(TxPayload::CoinBase)) {
                outcome.reject(tx_hash, ErrorCode::Malformed);
                continue;
            }
            let Ok(coin_data) = tx.coin_data() else {
                outcome.reject(tx_hash, ErrorCode::Malformed);
                continue;
            };

            if block_header.is_none() || !coin_data.from.is_empty() || has_coinbase {
                debug!(
                    %chain_id,
                    %tx_hash,
                    in_block = block_header.is_some(),
                    has_coinbase,
                    "Coinbase rules violated"
                );
                outcome.reject(tx_hash, ErrorCode::CoinBaseRules);
                continue;
            }

            has_coinbase = true;
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
