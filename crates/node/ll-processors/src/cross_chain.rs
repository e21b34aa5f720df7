use crate::contract_call::{
    ContractCallExecutor, ContractCallProcessor, ContractRegistry, ContractWrapperTransaction,
};
use ll_commit_log::CommittedCrossChainTxLog;
use ll_kv_store::KeyValueStore;
use ll_primitives::chain::{BlockHeader, ChainId};
use ll_primitives::payload::{CrossChainData, PayloadError, TxPayload};
use ll_primitives::transaction::{Transaction, TransactionHash, TxType};
use ll_tx_processor::{
    BatchInfo, ErrorCode, ProcessorError, ProtocolVersionSource, TransactionProcessor,
    ValidateOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

fn cross_chain_data(tx: &Transaction) -> Result<CrossChainData, PayloadError> {
    match TxPayload::decode(tx)? {
        TxPayload::CrossChain(data) => Ok(data),
        _ => Err(PayloadError::UnsupportedType {
            tx_type: tx.tx_type(),
        }),
    }
}

/// Processor of [`TxType::CROSS_CHAIN`] transactions.
///
/// Committed transactions are recorded in [`CommittedCrossChainTxLog`] under their anchor hash,
/// so the same anchor is never applied twice. Wrapped contract calls are handled by
/// [`ContractCallProcessor`].
#[derive(Debug)]
pub struct CrossChainProcessor<S, C, V> {
    log: CommittedCrossChainTxLog<S>,
    contract_calls: Arc<ContractCallProcessor<C, V>>,
}

impl<S, C, V> TransactionProcessor for CrossChainProcessor<S, C, V>
where
    S: KeyValueStore,
    C: ContractRegistry + ContractCallExecutor,
    V: ProtocolVersionSource,
{
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        TxType::CROSS_CHAIN
    }

    fn validate(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        txs_by_type: &HashMap<TxType, Vec<Transaction>>,
        _block_header: Option<&BlockHeader>,
    ) -> ValidateOutcome {
        let mut outcome = ValidateOutcome::default();
        let mut batch_anchors = txs_by_type
            .get(&TxType::CROSS_CHAIN)
            .into_iter()
            .flatten()
            .filter_map(|tx| cross_chain_data(tx).ok())
            .map(|data| data.anchor_hash)
            .collect::<HashSet<_>>();

        for tx in txs {
            let tx_hash = *tx.hash();
            let data = match cross_chain_data(tx) {
                Ok(data) => data,
                Err(error) => {
                    debug!(%chain_id, %tx_hash, %error, "Malformed cross-chain transaction");
                    outcome.reject(tx_hash, ErrorCode::Malformed);
                    continue;
                }
            };
            let Ok(coin_data) = tx.coin_data() else {
                outcome.reject(tx_hash, ErrorCode::Malformed);
                continue;
            };

            if data.anchor_hash == TransactionHash::default() {
                outcome.reject(tx_hash, ErrorCode::Malformed);
                continue;
            }
            if data.origin_chain_id == chain_id {
                outcome.reject(tx_hash, ErrorCode::InvalidCrossChainOrigin);
                continue;
            }
            if batch_anchors.contains(&data.anchor_hash) {
                debug!(
                    %chain_id,
                    %tx_hash,
                    anchor_hash = %data.anchor_hash,
                    "Anchor is already used in this batch"
                );
                outcome.reject(tx_hash, ErrorCode::AnchorAlreadyCommitted);
                continue;
            }
            match self.log.try_get(&data.anchor_hash, chain_id) {
                Ok(Some(committed)) if committed.hash() != tx.hash() => {
                    debug!(
                        %chain_id,
                        %tx_hash,
                        anchor_hash = %data.anchor_hash,
                        committed_tx_hash = %committed.hash(),
                        "Anchor is already committed"
                    );
                    outcome.reject(tx_hash, ErrorCode::AnchorAlreadyCommitted);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        %chain_id,
                        %tx_hash,
                        anchor_hash = %data.anchor_hash,
                        %error,
                        "Failed to look up committed anchor"
                    );
                    outcome.reject(tx_hash, ErrorCode::CollaboratorFault);
                    continue;
                }
            }

            if let Some(wrapper) = ContractWrapperTransaction::from_payload(
                tx,
                TxPayload::CrossChain(data.clone()),
            ) && let Err(code) = self
                .contract_calls
                .validate_call(chain_id, &wrapper, &coin_data)
            {
                outcome.reject(tx_hash, code);
                continue;
            }

            batch_anchors.insert(data.anchor_hash);
        }

        outcome
    }

    fn execute(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &mut BatchInfo,
    ) -> Result<(), ProcessorError> {
        let wrappers = ContractCallProcessor::<C, V>::parse_all(txs)?;
        self.contract_calls
            .execute_calls(chain_id, &wrappers, block_header, batch_info)
    }

    fn commit(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        let anchors = txs
            .iter()
            .map(|tx| cross_chain_data(tx).map(|data| data.anchor_hash))
            .collect::<Result<Vec<_>, _>>()?;

        // Anchors that were not in the log before this commit
        let mut saved = Vec::with_capacity(txs.len());
        for (tx, anchor_hash) in txs.iter().zip(&anchors) {
            let existed = match self.log.try_get(anchor_hash, chain_id) {
                Ok(record) => record.is_some(),
                Err(error) => {
                    self.forget(chain_id, &saved);
                    return Err(anyhow::anyhow!(
                        "Failed to look up anchor {anchor_hash} of cross-chain transaction {}: \
                        {error}",
                        tx.hash()
                    )
                    .into());
                }
            };
            if !self.log.save(anchor_hash, tx, chain_id) {
                self.forget(chain_id, &saved);
                return Err(anyhow::anyhow!(
                    "Failed to save cross-chain transaction {} with anchor {anchor_hash}",
                    tx.hash()
                )
                .into());
            }
            if !existed {
                saved.push(*anchor_hash);
            }
        }

        let wrappers = ContractCallProcessor::<C, V>::parse_all(txs)?;
        if let Err(error) =
            self.contract_calls
                .commit_calls(chain_id, &wrappers, block_header, batch_info)
        {
            self.forget(chain_id, &saved);
            return Err(error);
        }

        trace!(
            %chain_id,
            height = %block_header.height,
            txs = txs.len(),
            "Cross-chain transactions committed"
        );

        Ok(())
    }

    fn rollback(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        let wrappers = ContractCallProcessor::<C, V>::parse_all(txs)?;
        self.contract_calls
            .rollback_calls(chain_id, &wrappers, block_header)?;

        for tx in txs.iter().rev() {
            let anchor_hash = cross_chain_data(tx)?.anchor_hash;
            let record = self.log.try_get(&anchor_hash, chain_id).map_err(|error| {
                anyhow::anyhow!(
                    "Failed to look up anchor {anchor_hash} of cross-chain transaction {}: {error}",
                    tx.hash()
                )
            })?;
            match record {
                Some(committed) if committed.hash() == tx.hash() => {
                    self.log
                        .try_delete(&anchor_hash, chain_id)
                        .map_err(|error| {
                            anyhow::anyhow!(
                                "Failed to delete cross-chain transaction {} with anchor \
                                {anchor_hash}: {error}",
                                tx.hash()
                            )
                        })?;
                }
                Some(committed) => {
                    warn!(
                        %chain_id,
                        tx_hash = %tx.hash(),
                        %anchor_hash,
                        committed_tx_hash = %committed.hash(),
                        "Anchor belongs to a different transaction, not removing"
                    );
                }
                None => {
                    warn!(
                        %chain_id,
                        tx_hash = %tx.hash(),
                        %anchor_hash,
                        "Cross-chain transaction to roll back is not in the log"
                    );
                }
            }
        }

        Ok(())
    }
}

impl<S, C, V> CrossChainProcessor<S, C, V>
where
    S: KeyValueStore,
    C: ContractRegistry + ContractCallExecutor,
    V: ProtocolVersionSource,
{
    /// Create new instance
    pub fn new(
        log: CommittedCrossChainTxLog<S>,
        contract_calls: Arc<ContractCallProcessor<C, V>>,
    ) -> Self {
        Self {
            log,
            contract_calls,
        }
    }

    /// Log of committed cross-chain transactions
    #[inline(always)]
    pub fn log(&self) -> &CommittedCrossChainTxLog<S> {
        &self.log
    }

    fn forget(&self, chain_id: ChainId, anchors: &[TransactionHash]) {
        for anchor_hash in anchors.iter().rev() {
            if !self.log.delete(anchor_hash, chain_id) {
                error!(
                    %chain_id,
                    %anchor_hash,
                    "Failed to remove cross-chain transaction after failed commit"
                );
            }
        }
    }
}
