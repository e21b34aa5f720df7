//! Core primitives shared by every module of the node.
//!
//! A [`Transaction`] is immutable once built: its [`TransactionHash`] is derived from every field
//! except signatures. Its economic effect lives in [`CoinData`], a list of spends ([`CoinFrom`])
//! and receipts ([`CoinTo`]). Spends are chained per address/asset pair through [`Nonce`]s, each
//! nonce being a suffix of the hash of the transaction that last spent from that pair.
//!
//! [`Transaction`]: transaction::Transaction
//! [`TransactionHash`]: transaction::TransactionHash
//! [`CoinData`]: coin_data::CoinData
//! [`CoinFrom`]: coin_data::CoinFrom
//! [`CoinTo`]: coin_data::CoinTo
//! [`Nonce`]: nonce::Nonce

pub mod address;
pub mod amount;
pub mod chain;
pub mod coin_data;
pub mod nonce;
pub mod payload;
#[cfg(test)]
mod tests;
pub mod transaction;
