use ll_primitives::amount::Amount;
use ll_primitives::chain::ChainId;
use ll_primitives::transaction::TransactionHash;
use std::collections::HashMap;

/// Result of contract execution for a single transaction
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContractResult {
    /// Transaction that was executed
    pub tx_hash: TransactionHash,
    /// Whether execution succeeded
    pub success: bool,
    /// Gas consumed
    pub gas_used: u64,
    /// Fee charged for execution
    pub fee: Amount,
    /// Error message of failed execution
    pub error_message: Option<String>,
    /// Opaque state changes to apply on commit
    pub state_changes: Vec<u8>,
}

/// Data shared between processors within a single batch
#[derive(Debug)]
pub struct BatchInfo {
    chain_id: ChainId,
    contract_results: HashMap<TransactionHash, ContractResult>,
}

impl BatchInfo {
    /// Create empty batch info
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            contract_results: HashMap::new(),
        }
    }

    /// Chain this batch belongs to
    #[inline(always)]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Store contract result, replacing previous one for the same transaction
    pub fn insert_contract_result(&mut self, result: ContractResult) {
        self.contract_results.insert(result.tx_hash, result);
    }

    /// Contract result of a transaction
    pub fn contract_result(&self, tx_hash: &TransactionHash) -> Option<&ContractResult> {
        self.contract_results.get(tx_hash)
    }

    /// Number of contract results
    pub fn contract_results_len(&self) -> usize {
        self.contract_results.len()
    }
}
