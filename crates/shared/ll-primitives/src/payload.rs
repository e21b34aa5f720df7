//! Type-specific transaction payloads

use crate::address::Address;
use crate::amount::Amount;
use crate::chain::ChainId;
use crate::transaction::{Transaction, TransactionHash, TxType};
use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Payload of [`TxType::ACCOUNT_ALIAS`] transaction
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct AliasData {
    /// Address the alias is registered for
    pub address: Address,
    /// Alias
    pub alias: String,
}

/// Payload of [`TxType::CALL_CONTRACT`] transaction, also carried by cross-chain transactions that
/// trigger a contract call on this chain
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CallContractData {
    /// Caller
    pub sender: Address,
    /// Contract being called
    pub contract_address: Address,
    /// Amount of the main asset transferred to the contract with the call
    pub value: Amount,
    /// Max gas the call may consume
    pub gas_limit: u64,
    /// Price of a unit of gas
    pub price: u64,
    /// Name of the method being called
    pub method_name: String,
    /// Method descriptor, empty if method name is not overloaded
    pub method_desc: String,
    /// Call arguments
    pub args: Vec<Vec<String>>,
}

/// Payload of [`TxType::CROSS_CHAIN`] transaction
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CrossChainData {
    /// Hash of the anchor transaction on the origin chain
    pub anchor_hash: TransactionHash,
    /// Chain the transfer originates from
    pub origin_chain_id: ChainId,
    /// Contract call triggered on this chain by the transfer
    pub contract_call: Option<CallContractData>,
}

/// Error for [`TxPayload::decode()`]
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Unsupported transaction type
    #[error("Unsupported transaction type {tx_type}")]
    UnsupportedType {
        /// Transaction type
        tx_type: TxType,
    },
    /// Transaction type doesn't carry a payload, but some bytes were found
    #[error("Unexpected payload for transaction type {tx_type}")]
    UnexpectedData {
        /// Transaction type
        tx_type: TxType,
    },
    /// Failed to decode payload
    #[error("Failed to decode payload of transaction type {tx_type}: {error}")]
    Decode {
        /// Transaction type
        tx_type: TxType,
        /// Low-level error
        error: parity_scale_codec::Error,
    },
}

/// Decoded type-specific payload of a transaction
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TxPayload {
    /// Block reward
    CoinBase,
    /// Plain coin transfer
    Transfer,
    /// Alias registration
    Alias(AliasData),
    /// Cross-chain transfer
    CrossChain(CrossChainData),
    /// Contract call
    CallContract(CallContractData),
}

impl TxPayload {
    /// Decode payload of a transaction according to its type
    pub fn decode(tx: &Transaction) -> Result<Self, PayloadError> {
        let tx_type = tx.tx_type();
        let mut data = tx.tx_data();

        fn decode_all<T>(tx_type: TxType, data: &mut &[u8]) -> Result<T, PayloadError>
        where
            T: Decode,
        {
            T::decode_all(data).map_err(|error| PayloadError::Decode { tx_type, error })
        }

        Ok(match tx_type {
            TxType::COIN_BASE | TxType::TRANSFER => {
                if !data.is_empty() {
                    return Err(PayloadError::UnexpectedData { tx_type });
                }
                if tx_type == TxType::COIN_BASE {
                    Self::CoinBase
                } else {
                    Self::Transfer
                }
            }
            TxType::ACCOUNT_ALIAS => Self::Alias(decode_all(tx_type, &mut data)?),
            TxType::CROSS_CHAIN => Self::CrossChain(decode_all(tx_type, &mut data)?),
            TxType::CALL_CONTRACT => Self::CallContract(decode_all(tx_type, &mut data)?),
            tx_type => {
                return Err(PayloadError::UnsupportedType { tx_type });
            }
        })
    }

    /// Transaction type this payload belongs to
    pub fn tx_type(&self) -> TxType {
        match self {
            Self::CoinBase => TxType::COIN_BASE,
            Self::Transfer => TxType::TRANSFER,
            Self::Alias(_) => TxType::ACCOUNT_ALIAS,
            Self::CrossChain(_) => TxType::CROSS_CHAIN,
            Self::CallContract(_) => TxType::CALL_CONTRACT,
        }
    }

    /// Serialize payload into transaction data bytes
    pub fn to_tx_data(&self) -> Vec<u8> {
        match self {
            Self::CoinBase | Self::Transfer => Vec::new(),
            Self::Alias(data) => data.encode(),
            Self::CrossChain(data) => data.encode(),
            Self::CallContract(data) => data.encode(),
        }
    }
}
