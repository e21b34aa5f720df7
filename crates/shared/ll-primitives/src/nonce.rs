//! Nonce chain pointers

use crate::transaction::TransactionHash;
use core::fmt;
use derive_more::{From, Into};
use parity_scale_codec::{Decode, Encode};

/// Pointer to the last spend of an address/asset pair.
///
/// It is a suffix of the hash of the transaction that spent last from the pair, or all zeroes if
/// the pair was never spent from. A spend is only authorized when it declares the current pointer,
/// which turns the spends of every pair into a singly-linked chain.
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, From, Into, Encode, Decode)]
pub struct Nonce([u8; Nonce::SIZE]);

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Nonce {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Nonce {
    /// Size in bytes
    pub const SIZE: usize = 8;
    /// Nonce of an address/asset pair that was never spent from
    pub const ZERO: Self = Self([0; Self::SIZE]);

    /// Create new instance
    #[inline(always)]
    pub const fn new(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Nonce produced by a transaction with provided hash
    pub fn from_hash(hash: &TransactionHash) -> Self {
        let mut bytes = [0; Self::SIZE];
        bytes.copy_from_slice(&hash.as_bytes()[TransactionHash::SIZE - Self::SIZE..]);
        Self(bytes)
    }
}
