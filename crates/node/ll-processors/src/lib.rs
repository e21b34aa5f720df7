//! Processors for every supported transaction type.
//!
//! Each processor implements [`TransactionProcessor`] for a single [`TxType`]. Contract calls may
//! arrive either directly or wrapped into a cross-chain transaction, both shapes are handled by
//! [`ContractCallProcessor`], which [`CrossChainProcessor`] delegates to.
//!
//! [`TransactionProcessor`]: ll_tx_processor::TransactionProcessor
//! [`TxType`]: ll_primitives::transaction::TxType

mod alias;
mod coinbase;
mod contract_call;
mod contract_state;
mod cross_chain;
mod transfer;

pub use crate::alias::{AliasConfig, AliasProcessor, is_valid_alias};
pub use crate::coinbase::CoinBaseProcessor;
pub use crate::contract_call::{
    ContractCallConfig, ContractCallExecutor, ContractCallProcessor, ContractRegistry,
    ContractWrapperTransaction,
};
pub use crate::contract_state::{KvContractState, StoredContractResult};
pub use crate::cross_chain::CrossChainProcessor;
pub use crate::transfer::TransferProcessor;
