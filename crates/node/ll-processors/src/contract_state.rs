use crate::contract_call::{ContractCallExecutor, ContractRegistry, ContractWrapperTransaction};
use ll_kv_store::{KeyValueStore, KvStoreError};
use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, BlockHeight, ChainId};
use ll_primitives::transaction::TransactionHash;
use ll_tx_processor::{ContractResult, ProcessorError};
use parity_scale_codec::{Decode, Encode};
use tracing::trace;

/// Gas charged for every call
const BASE_GAS: u64 = 21_000;
/// Gas charged per argument byte
const ARG_BYTE_GAS: u64 = 16;

fn contracts_table(chain_id: ChainId) -> String {
    format!("contract_{chain_id}")
}

fn results_table(chain_id: ChainId) -> String {
    format!("contract_result_{chain_id}")
}

/// Committed contract call result
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct StoredContractResult {
    /// Height of the block the call was committed in
    pub height: BlockHeight,
    /// Whether execution succeeded
    pub success: bool,
    /// Gas consumed
    pub gas_used: u64,
    /// Fee charged for execution
    pub fee: Amount,
    /// Error message of failed execution
    pub error_message: Option<String>,
    /// State changes produced by execution
    pub state_changes: Vec<u8>,
}

/// Contract registry and call executor backed by a key-value store.
///
/// Execution is simulated: gas is derived from the size of the call and state changes are the
/// encoded call itself.
#[derive(Debug, Clone)]
pub struct KvContractState<S> {
    store: S,
}

impl<S> ContractRegistry for KvContractState<S>
where
    S: KeyValueStore,
{
    fn contract_exists(
        &self,
        chain_id: ChainId,
        contract_address: &Address,
    ) -> Result<bool, ProcessorError> {
        Ok(self
            .store
            .get(&contracts_table(chain_id), contract_address.as_ref())?
            .is_some())
    }
}

impl<S> ContractCallExecutor for KvContractState<S>
where
    S: KeyValueStore,
{
    fn execute(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        _block_header: &BlockHeader,
    ) -> Result<ContractResult, ProcessorError> {
        let call = &wrapper.call;
        let tx_hash = *wrapper.tx.hash();

        let (success, gas_used, error_message) =
            if !self.contract_exists(chain_id, &call.contract_address)? {
                (false, BASE_GAS.min(call.gas_limit), Some("Contract not found"))
            } else {
                let required = Self::required_gas(wrapper);
                if required > call.gas_limit {
                    (false, call.gas_limit, Some("Out of gas"))
                } else {
                    (true, required, None)
                }
            };

        Ok(ContractResult {
            tx_hash,
            success,
            gas_used,
            fee: Amount::from(gas_used.saturating_mul(call.price)),
            error_message: error_message.map(String::from),
            state_changes: if success {
                (&call.method_name, &call.args).encode()
            } else {
                Vec::new()
            },
        })
    }

    fn on_commit(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        result: &ContractResult,
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        let record = StoredContractResult {
            height: block_header.height,
            success: result.success,
            gas_used: result.gas_used,
            fee: result.fee.clone(),
            error_message: result.error_message.clone(),
            state_changes: result.state_changes.clone(),
        };
        self.store.put(
            &results_table(chain_id),
            wrapper.tx.hash().as_ref(),
            &record.encode(),
        )?;

        trace!(%chain_id, tx_hash = %wrapper.tx.hash(), "Contract call result stored");

        Ok(())
    }

    fn on_rollback(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        _block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        let existed = self
            .store
            .delete(&results_table(chain_id), wrapper.tx.hash().as_ref())?;

        trace!(%chain_id, tx_hash = %wrapper.tx.hash(), %existed, "Contract call result removed");

        Ok(())
    }
}

impl<S> KvContractState<S>
where
    S: KeyValueStore,
{
    /// Create new instance
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Deploy contract at an address
    pub fn register_contract(
        &self,
        chain_id: ChainId,
        contract_address: &Address,
    ) -> Result<(), KvStoreError> {
        self.store
            .put(&contracts_table(chain_id), contract_address.as_ref(), &[])
    }

    /// Committed result of a contract call
    pub fn contract_result(
        &self,
        chain_id: ChainId,
        tx_hash: &TransactionHash,
    ) -> Result<Option<StoredContractResult>, ProcessorError> {
        let Some(bytes) = self.store.get(&results_table(chain_id), tx_hash.as_ref())? else {
            return Ok(None);
        };

        StoredContractResult::decode(&mut bytes.as_slice())
            .map(Some)
            .map_err(|error| {
                anyhow::anyhow!("Corrupted contract result of transaction {tx_hash}: {error}")
                    .into()
            })
    }

    fn required_gas(wrapper: &ContractWrapperTransaction) -> u64 {
        let call = &wrapper.call;
        let arg_bytes = call
            .args
            .iter()
            .flatten()
            .map(|arg| arg.len() as u64)
            .sum::<u64>();
        let method_bytes = (call.method_name.len() + call.method_desc.len()) as u64;

        BASE_GAS.saturating_add(
            arg_bytes
                .saturating_add(method_bytes)
                .saturating_mul(ARG_BYTE_GAS),
        )
    }
}
