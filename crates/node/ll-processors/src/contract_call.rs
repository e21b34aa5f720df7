use ll_primitives::address::Address;
use ll_primitives::amount::Amount;
use ll_primitives::chain::{BlockHeader, ChainId, ProtocolVersion};
use ll_primitives::coin_data::{Asset, CoinData};
use ll_primitives::payload::{CallContractData, PayloadError, TxPayload};
use ll_primitives::transaction::{Transaction, TxType};
use ll_tx_processor::{
    BatchInfo, ContractResult, ErrorCode, ProcessorError, ProtocolVersionSource,
    TransactionProcessor, ValidateOutcome,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Contract call processing options
#[derive(Debug, Copy, Clone)]
pub struct ContractCallConfig {
    /// Protocol version starting with which contract calls triggered by cross-chain transactions
    /// are accepted.
    ///
    /// Default: 5.
    pub cross_chain_call_version: ProtocolVersion,
    /// Max gas limit of a single call.
    ///
    /// Default: 10 000 000.
    pub max_gas_limit: u64,
    /// Min gas price.
    ///
    /// Default: 25.
    pub min_gas_price: u64,
}

impl Default for ContractCallConfig {
    fn default() -> Self {
        Self {
            cross_chain_call_version: ProtocolVersion::new(5),
            max_gas_limit: 10_000_000,
            min_gas_price: 25,
        }
    }
}

/// Contract call together with the transaction that carries it
#[derive(Debug, Clone)]
pub struct ContractWrapperTransaction {
    /// Transaction carrying the call
    pub tx: Transaction,
    /// Call
    pub call: CallContractData,
    /// Whether the call arrived wrapped into a cross-chain transaction
    pub cross_chain: bool,
}

impl ContractWrapperTransaction {
    /// Extract contract call from a transaction.
    ///
    /// Returns `None` for transactions that don't carry a contract call.
    pub fn parse(tx: &Transaction) -> Result<Option<Self>, PayloadError> {
        Ok(Self::from_payload(tx, TxPayload::decode(tx)?))
    }

    /// Same as [`Self::parse()`], but for an already decoded payload
    pub fn from_payload(tx: &Transaction, payload: TxPayload) -> Option<Self> {
        let (call, cross_chain) = match payload {
            TxPayload::CallContract(call) => (call, false),
            TxPayload::CrossChain(data) => (data.contract_call?, true),
            TxPayload::CoinBase | TxPayload::Transfer | TxPayload::Alias(_) => {
                return None;
            }
        };

        Some(Self {
            tx: tx.clone(),
            call,
            cross_chain,
        })
    }
}

/// Registry of deployed contracts
pub trait ContractRegistry: fmt::Debug + Send + Sync + 'static {
    /// Whether contract is deployed on a chain
    fn contract_exists(
        &self,
        chain_id: ChainId,
        contract_address: &Address,
    ) -> Result<bool, ProcessorError>;
}

impl<T> ContractRegistry for Arc<T>
where
    T: ContractRegistry,
{
    #[inline(always)]
    fn contract_exists(
        &self,
        chain_id: ChainId,
        contract_address: &Address,
    ) -> Result<bool, ProcessorError> {
        self.as_ref().contract_exists(chain_id, contract_address)
    }
}

/// Executes contract calls and applies or reverts their effects
pub trait ContractCallExecutor: fmt::Debug + Send + Sync + 'static {
    /// Execute call without persisting anything
    fn execute(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        block_header: &BlockHeader,
    ) -> Result<ContractResult, ProcessorError>;

    /// Persist effects of an executed call, must be idempotent
    fn on_commit(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        result: &ContractResult,
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError>;

    /// Revert effects of a committed call, must be a no-op if there is nothing to revert
    fn on_rollback(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError>;
}

impl<T> ContractCallExecutor for Arc<T>
where
    T: ContractCallExecutor,
{
    #[inline(always)]
    fn execute(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        block_header: &BlockHeader,
    ) -> Result<ContractResult, ProcessorError> {
        self.as_ref().execute(chain_id, wrapper, block_header)
    }

    #[inline(always)]
    fn on_commit(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        result: &ContractResult,
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        self.as_ref()
            .on_commit(chain_id, wrapper, result, block_header)
    }

    #[inline(always)]
    fn on_rollback(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        self.as_ref().on_rollback(chain_id, wrapper, block_header)
    }
}

/// Processor of [`TxType::CALL_CONTRACT`] transactions.
///
/// Also validates, executes, commits and rolls back contract calls wrapped into cross-chain
/// transactions on behalf of [`CrossChainProcessor`](crate::CrossChainProcessor).
#[derive(Debug)]
pub struct ContractCallProcessor<C, V> {
    contracts: C,
    versions: V,
    config: ContractCallConfig,
}

impl<C, V> TransactionProcessor for ContractCallProcessor<C, V>
where
    C: ContractRegistry + ContractCallExecutor,
    V: ProtocolVersionSource,
{
    #[inline(always)]
    fn tx_type(&self) -> TxType {
        TxType::CALL_CONTRACT
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
            let wrapper = match ContractWrapperTransaction::parse(tx) {
                Ok(Some(wrapper)) => wrapper,
                Ok(None) => {
                    outcome.reject(*tx.hash(), ErrorCode::Malformed);
                    continue;
                }
                Err(error) => {
                    debug!(%chain_id, tx_hash = %tx.hash(), %error, "Malformed contract call");
                    outcome.reject(*tx.hash(), ErrorCode::Malformed);
                    continue;
                }
            };
            let Ok(coin_data) = tx.coin_data() else {
                outcome.reject(*tx.hash(), ErrorCode::Malformed);
                continue;
            };

            if let Err(code) = self.validate_call(chain_id, &wrapper, &coin_data) {
                outcome.reject(*tx.hash(), code);
            }
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
        self.execute_calls(chain_id, &Self::parse_all(txs)?, block_header, batch_info)
    }

    fn commit(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        self.commit_calls(chain_id, &Self::parse_all(txs)?, block_header, batch_info)
    }

    fn rollback(
        &self,
        chain_id: ChainId,
        txs: &[Transaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        self.rollback_calls(chain_id, &Self::parse_all(txs)?, block_header)
    }
}

impl<C, V> ContractCallProcessor<C, V>
where
    C: ContractRegistry + ContractCallExecutor,
    V: ProtocolVersionSource,
{
    /// Create new instance
    pub fn new(contracts: C, versions: V, config: ContractCallConfig) -> Self {
        Self {
            contracts,
            versions,
            config,
        }
    }

    /// Contract state collaborator
    #[inline(always)]
    pub fn contracts(&self) -> &C {
        &self.contracts
    }

    /// Extract contract calls from transactions, transactions without a call are skipped
    pub fn parse_all(
        txs: &[Transaction],
    ) -> Result<Vec<ContractWrapperTransaction>, PayloadError> {
        let mut wrappers = Vec::with_capacity(txs.len());
        for tx in txs {
            if let Some(wrapper) = ContractWrapperTransaction::parse(tx)? {
                wrappers.push(wrapper);
            }
        }
        Ok(wrappers)
    }

    /// Whether calls wrapped into cross-chain transactions are accepted on a chain
    pub fn cross_chain_calls_enabled(&self, chain_id: ChainId) -> bool {
        self.versions.protocol_version(chain_id) >= self.config.cross_chain_call_version
    }

    /// Check a single call against its transaction's coin data and the contract registry
    pub fn validate_call(
        &self,
        chain_id: ChainId,
        wrapper: &ContractWrapperTransaction,
        coin_data: &CoinData,
    ) -> Result<(), ErrorCode> {
        let call = &wrapper.call;
        let tx_hash = wrapper.tx.hash();

        if wrapper.cross_chain && !self.cross_chain_calls_enabled(chain_id) {
            debug!(
                %chain_id,
                %tx_hash,
                protocol_version = %self.versions.protocol_version(chain_id),
                "Cross-chain contract call before it is supported"
            );
            return Err(ErrorCode::UnsupportedProtocolVersion);
        }

        if call.method_name.is_empty()
            || call.gas_limit == 0
            || call.gas_limit > self.config.max_gas_limit
            || call.price < self.config.min_gas_price
        {
            debug!(
                %chain_id,
                %tx_hash,
                method_name = %call.method_name,
                gas_limit = call.gas_limit,
                price = call.price,
                "Invalid contract call parameters"
            );
            return Err(ErrorCode::InvalidContractCall);
        }

        // Sender of a wrapped call lives on the origin chain
        if !wrapper.cross_chain && !coin_data.is_spender(&call.sender) {
            return Err(ErrorCode::InvalidContractCall);
        }

        let main_asset = Asset::main(chain_id);
        let mut attached = Amount::zero();
        for coin_to in &coin_data.to {
            if coin_to.address == call.contract_address && coin_to.asset == main_asset {
                attached += &coin_to.amount;
            }
        }
        if attached != call.value {
            debug!(
                %chain_id,
                %tx_hash,
                value = %call.value,
                %attached,
                "Contract call value doesn't match transferred amount"
            );
            return Err(ErrorCode::InvalidContractCall);
        }

        match self
            .contracts
            .contract_exists(chain_id, &call.contract_address)
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ErrorCode::UnknownContract),
            Err(error) => {
                warn!(%chain_id, %tx_hash, %error, "Failed to check contract existence");
                Err(ErrorCode::CollaboratorFault)
            }
        }
    }

    /// Execute calls and store their results in batch info
    pub fn execute_calls(
        &self,
        chain_id: ChainId,
        wrappers: &[ContractWrapperTransaction],
        block_header: &BlockHeader,
        batch_info: &mut BatchInfo,
    ) -> Result<(), ProcessorError> {
        for wrapper in wrappers {
            let result = self.contracts.execute(chain_id, wrapper, block_header)?;
            trace!(
                %chain_id,
                tx_hash = %wrapper.tx.hash(),
                success = result.success,
                gas_used = result.gas_used,
                "Contract call executed"
            );
            batch_info.insert_contract_result(result);
        }

        Ok(())
    }

    /// Persist results of executed calls.
    ///
    /// Calls without a result in batch info are skipped with a warning. If any call fails to
    /// commit, calls committed before it are reverted in reverse order and the error is returned.
    pub fn commit_calls(
        &self,
        chain_id: ChainId,
        wrappers: &[ContractWrapperTransaction],
        block_header: &BlockHeader,
        batch_info: &BatchInfo,
    ) -> Result<(), ProcessorError> {
        let mut committed = Vec::with_capacity(wrappers.len());
        for wrapper in wrappers {
            let tx_hash = wrapper.tx.hash();
            let Some(result) = batch_info.contract_result(tx_hash) else {
                warn!(
                    %chain_id,
                    height = %block_header.height,
                    %tx_hash,
                    "Missing contract result, skipping commit of contract call"
                );
                continue;
            };

            if let Err(error) = self
                .contracts
                .on_commit(chain_id, wrapper, result, block_header)
            {
                warn!(
                    %chain_id,
                    height = %block_header.height,
                    %tx_hash,
                    %error,
                    "Contract call commit failed, reverting calls committed before it"
                );
                for earlier in committed.into_iter().rev() {
                    if let Err(error) = self.contracts.on_rollback(chain_id, earlier, block_header) {
                        error!(
                            %chain_id,
                            height = %block_header.height,
                            tx_hash = %earlier.tx.hash(),
                            %error,
                            "Failed to revert contract call after failed commit"
                        );
                    }
                }
                return Err(error);
            }
            committed.push(wrapper);
        }

        Ok(())
    }

    /// Revert committed calls in reverse order.
    ///
    /// Wrapped calls are skipped while the chain doesn't support them, they could not have been
    /// committed.
    pub fn rollback_calls(
        &self,
        chain_id: ChainId,
        wrappers: &[ContractWrapperTransaction],
        block_header: &BlockHeader,
    ) -> Result<(), ProcessorError> {
        let cross_chain_calls_enabled = self.cross_chain_calls_enabled(chain_id);

        for wrapper in wrappers.iter().rev() {
            if wrapper.cross_chain && !cross_chain_calls_enabled {
                trace!(
                    %chain_id,
                    tx_hash = %wrapper.tx.hash(),
                    "Skipping rollback of unsupported cross-chain contract call"
                );
                continue;
            }

            self.contracts
                .on_rollback(chain_id, wrapper, block_header)?;
        }

        Ok(())
    }
}
