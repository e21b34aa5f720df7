//! Spends and receipts attached to transactions

use crate::address::Address;
use crate::amount::Amount;
use crate::chain::ChainId;
use crate::nonce::Nonce;
use core::fmt;
use parity_scale_codec::{Decode, DecodeAll, Encode};
use std::collections::{BTreeMap, HashSet};

/// Asset identifier
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Encode, Decode)]
pub struct Asset {
    /// Chain that issued the asset
    pub chain_id: ChainId,
    /// Asset identifier within the issuing chain
    pub asset_id: u16,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.chain_id, self.asset_id)
    }
}

impl Asset {
    /// Asset id of the main asset of every chain
    pub const MAIN_ASSET_ID: u16 = 1;

    /// Create new instance
    #[inline(always)]
    pub const fn new(chain_id: ChainId, asset_id: u16) -> Self {
        Self { chain_id, asset_id }
    }

    /// Main asset of the chain, fees are paid in it
    #[inline(always)]
    pub const fn main(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            asset_id: Self::MAIN_ASSET_ID,
        }
    }
}

/// A spend, consumed exactly once
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CoinFrom {
    /// Address funds are spent from
    pub address: Address,
    /// Asset being spent
    pub asset: Asset,
    /// Amount being spent
    pub amount: Amount,
    /// Current nonce of the address/asset pair
    pub nonce: Nonce,
    /// Non-zero for spends that unlock locked funds
    pub locked: u8,
}

/// A receipt
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CoinTo {
    /// Address receiving funds
    pub address: Address,
    /// Asset being received
    pub asset: Asset,
    /// Amount being received
    pub amount: Amount,
    /// `0` if funds are spendable immediately, otherwise block height from which they are
    /// spendable
    pub lock_time: u64,
}

/// Errors for [`CoinData`]
#[derive(Debug, thiserror::Error)]
pub enum CoinDataError {
    /// Failed to decode coin data
    #[error("Failed to decode coin data: {error}")]
    Decode {
        /// Low-level error
        #[from]
        error: parity_scale_codec::Error,
    },
    /// Zero amount
    #[error("Zero amount in coin data")]
    ZeroAmount,
    /// The same address/asset pair is spent from more than once
    #[error("Duplicate spend from {address} of asset {asset}")]
    DuplicateFrom {
        /// Address
        address: Address,
        /// Asset
        asset: Asset,
    },
    /// Spend of locked funds
    #[error("Spend of locked funds from {address}")]
    LockedSpend {
        /// Address
        address: Address,
    },
    /// Receipts exceed spends for an asset
    #[error("Receipts exceed spends for asset {asset}: {to} > {from}")]
    AmountMismatch {
        /// Asset
        asset: Asset,
        /// Total spent
        from: Amount,
        /// Total received
        to: Amount,
    },
}

/// Per-asset totals of [`CoinData`]
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct AssetTotals {
    /// Sum of all spends
    pub from: Amount,
    /// Sum of all receipts
    pub to: Amount,
}

/// Spends and receipts of a transaction
#[derive(Debug, Default, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CoinData {
    /// Spends in declaration order
    pub from: Vec<CoinFrom>,
    /// Receipts in declaration order
    pub to: Vec<CoinTo>,
}

impl CoinData {
    /// Decode coin data, all bytes must be consumed
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, CoinDataError> {
        Ok(Self::decode_all(&mut bytes)?)
    }

    /// Encode coin data into bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    /// Totals spent and received per asset
    pub fn totals(&self) -> BTreeMap<Asset, AssetTotals> {
        let mut totals = BTreeMap::<Asset, AssetTotals>::new();
        for coin_from in &self.from {
            totals.entry(coin_from.asset).or_default().from += &coin_from.amount;
        }
        for coin_to in &self.to {
            totals.entry(coin_to.asset).or_default().to += &coin_to.amount;
        }
        totals
    }

    /// Check structural invariants: no zero amounts, no locked spends, every address/asset pair
    /// spent from at most once and for every asset spends cover receipts.
    ///
    /// Does not check nonces or balances, that requires ledger state.
    pub fn check_well_formed(&self) -> Result<(), CoinDataError> {
        let mut spent_pairs = HashSet::with_capacity(self.from.len());
        for coin_from in &self.from {
            if coin_from.amount.is_zero() {
                return Err(CoinDataError::ZeroAmount);
            }
            if coin_from.locked != 0 {
                return Err(CoinDataError::LockedSpend {
                    address: coin_from.address,
                });
            }
            if !spent_pairs.insert((coin_from.address, coin_from.asset)) {
                return Err(CoinDataError::DuplicateFrom {
                    address: coin_from.address,
                    asset: coin_from.asset,
                });
            }
        }
        if self.to.iter().any(|coin_to| coin_to.amount.is_zero()) {
            return Err(CoinDataError::ZeroAmount);
        }

        for (asset, AssetTotals { from, to }) in self.totals() {
            if to > from {
                return Err(CoinDataError::AmountMismatch { asset, from, to });
            }
        }

        Ok(())
    }

    /// Fee paid by the transaction: surplus of spends over receipts of the main asset
    pub fn fee(&self, main_asset: Asset) -> Amount {
        self.totals()
            .remove(&main_asset)
            .and_then(|AssetTotals { from, to }| from.checked_sub(&to))
            .unwrap_or_default()
    }

    /// Whether provided address spends funds in this coin data
    pub fn is_spender(&self, address: &Address) -> bool {
        self.from
            .iter()
            .any(|coin_from| &coin_from.address == address)
    }
}
