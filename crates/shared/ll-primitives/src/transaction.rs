//! Transaction-related primitives

use crate::coin_data::{CoinData, CoinDataError};
use core::fmt;
use derive_more::{Display, From, Into};
use parity_scale_codec::{Decode, DecodeAll, Encode, Input, Output};

/// Transaction type code
#[derive(
    Debug, Display, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, Encode, Decode,
)]
pub struct TxType(u16);

impl TxType {
    /// Block reward, only valid inside blocks
    pub const COIN_BASE: Self = Self(1);
    /// Plain coin transfer
    pub const TRANSFER: Self = Self(2);
    /// Account alias registration
    pub const ACCOUNT_ALIAS: Self = Self(3);
    /// Cross-chain transfer materialized on this chain
    pub const CROSS_CHAIN: Self = Self(10);
    /// Smart contract call
    pub const CALL_CONTRACT: Self = Self(16);

    /// Create new instance
    #[inline(always)]
    pub const fn new(tx_type: u16) -> Self {
        Self(tx_type)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Transaction hash
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, From, Into, Encode, Decode)]
pub struct TransactionHash([u8; TransactionHash::SIZE]);

impl fmt::Debug for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for TransactionHash {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<blake3::Hash> for TransactionHash {
    #[inline(always)]
    fn from(value: blake3::Hash) -> Self {
        Self(value.into())
    }
}

impl TransactionHash {
    /// Size in bytes
    pub const SIZE: usize = blake3::OUT_LEN;

    /// Create new instance
    #[inline(always)]
    pub const fn new(hash: [u8; Self::SIZE]) -> Self {
        Self(hash)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }
}

/// Signature authorizing spends of the address derived from the public key
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct TransactionSignature {
    /// Ed25519 public key
    pub public_key: [u8; 32],
    /// Ed25519 signature of the transaction hash
    pub signature: [u8; 64],
}

/// Errors for [`Transaction`] decoding
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Invalid hex
    #[error("Invalid hex: {error}")]
    InvalidHex {
        /// Low-level error
        #[from]
        error: hex::FromHexError,
    },
    /// Failed to decode transaction
    #[error("Failed to decode transaction: {error}")]
    Decode {
        /// Low-level error
        #[from]
        error: parity_scale_codec::Error,
    },
}

/// Everything that is covered by the transaction hash
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
struct TransactionContents {
    tx_type: TxType,
    time: u64,
    remark: Vec<u8>,
    tx_data: Vec<u8>,
    coin_data: Vec<u8>,
}

/// Transaction.
///
/// Immutable once built, identity is [`Transaction::hash()`], which covers everything except
/// signatures. Decoding from bytes recomputes the hash.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Transaction {
    contents: TransactionContents,
    signatures: Vec<TransactionSignature>,
    hash: TransactionHash,
}

impl Encode for Transaction {
    fn size_hint(&self) -> usize {
        self.contents.size_hint() + self.signatures.size_hint()
    }

    fn encode_to<T>(&self, dest: &mut T)
    where
        T: Output + ?Sized,
    {
        self.contents.encode_to(dest);
        self.signatures.encode_to(dest);
    }
}

impl Decode for Transaction {
    fn decode<I>(input: &mut I) -> Result<Self, parity_scale_codec::Error>
    where
        I: Input,
    {
        let contents = TransactionContents::decode(input)?;
        let signatures = Vec::<TransactionSignature>::decode(input)?;

        Ok(Self::from_parts(contents, signatures))
    }
}

impl Transaction {
    /// Start building a transaction of provided type
    pub fn builder(tx_type: TxType) -> TransactionBuilder {
        TransactionBuilder {
            contents: TransactionContents {
                tx_type,
                time: 0,
                remark: Vec::new(),
                tx_data: Vec::new(),
                coin_data: Vec::new(),
            },
        }
    }

    fn from_parts(contents: TransactionContents, signatures: Vec<TransactionSignature>) -> Self {
        let hash = TransactionHash::from(blake3::hash(&contents.encode()));

        Self {
            contents,
            signatures,
            hash,
        }
    }

    /// Attach signatures, hash doesn't change since signatures are not covered by it
    pub fn with_signatures(mut self, signatures: Vec<TransactionSignature>) -> Self {
        self.signatures = signatures;
        self
    }

    /// Decode transaction from bytes, all bytes must be consumed
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, TransactionError> {
        Ok(Self::decode_all(&mut bytes)?)
    }

    /// Decode transaction from hex string
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        Self::from_bytes(&hex::decode(s)?)
    }

    /// Encode transaction into bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    /// Encode transaction into hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Transaction hash
    #[inline(always)]
    pub fn hash(&self) -> &TransactionHash {
        &self.hash
    }

    /// Transaction type
    #[inline(always)]
    pub fn tx_type(&self) -> TxType {
        self.contents.tx_type
    }

    /// Creation time in milliseconds since UNIX epoch
    #[inline(always)]
    pub fn time(&self) -> u64 {
        self.contents.time
    }

    /// Free-form remark
    #[inline(always)]
    pub fn remark(&self) -> &[u8] {
        &self.contents.remark
    }

    /// Serialized type-specific payload
    #[inline(always)]
    pub fn tx_data(&self) -> &[u8] {
        &self.contents.tx_data
    }

    /// Serialized coin data
    #[inline(always)]
    pub fn coin_data_bytes(&self) -> &[u8] {
        &self.contents.coin_data
    }

    /// Decode coin data
    pub fn coin_data(&self) -> Result<CoinData, CoinDataError> {
        CoinData::from_bytes(&self.contents.coin_data)
    }

    /// Signatures
    #[inline(always)]
    pub fn signatures(&self) -> &[TransactionSignature] {
        &self.signatures
    }
}

/// Builder for [`Transaction`]
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    contents: TransactionContents,
}

impl TransactionBuilder {
    /// Set creation time in milliseconds since UNIX epoch
    pub fn time(mut self, time: u64) -> Self {
        self.contents.time = time;
        self
    }

    /// Set remark
    pub fn remark(mut self, remark: impl Into<Vec<u8>>) -> Self {
        self.contents.remark = remark.into();
        self
    }

    /// Set serialized type-specific payload
    pub fn tx_data(mut self, tx_data: impl Into<Vec<u8>>) -> Self {
        self.contents.tx_data = tx_data.into();
        self
    }

    /// Set coin data
    pub fn coin_data(mut self, coin_data: &CoinData) -> Self {
        self.contents.coin_data = coin_data.to_bytes();
        self
    }

    /// Set raw coin data bytes as is, without checking them
    pub fn coin_data_bytes(mut self, coin_data: impl Into<Vec<u8>>) -> Self {
        self.contents.coin_data = coin_data.into();
        self
    }

    /// Build transaction without signatures
    pub fn build(self) -> Transaction {
        Transaction::from_parts(self.contents, Vec::new())
    }
}
