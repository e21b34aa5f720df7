//! Account addresses

use core::fmt;
use derive_more::{From, Into};
use parity_scale_codec::{Decode, Encode};

/// Error for [`Address::from_hex()`]
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// Invalid hex
    #[error("Invalid hex: {error}")]
    InvalidHex {
        /// Low-level error
        #[from]
        error: hex::FromHexError,
    },
    /// Wrong length
    #[error("Wrong address length {actual}, expected {expected}")]
    WrongLength {
        /// Actual length in bytes
        actual: usize,
        /// Expected length in bytes
        expected: usize,
    },
}

/// Account address
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, From, Into, Encode, Decode)]
pub struct Address([u8; Address::SIZE]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Address {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Address {
    /// Size in bytes
    pub const SIZE: usize = 20;
    /// Address nobody controls, anything sent here is burned
    pub const BLACK_HOLE: Self = Self([0; Self::SIZE]);

    /// Create new instance
    #[inline(always)]
    pub const fn new(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// Address that corresponds to an Ed25519 public key: the first [`Self::SIZE`] bytes of its
    /// BLAKE3 hash
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let hash = blake3::hash(public_key);
        let mut bytes = [0; Self::SIZE];
        bytes.copy_from_slice(&hash.as_bytes()[..Self::SIZE]);
        Self(bytes)
    }

    /// Parse address from hex string
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s)?;
        let bytes = <[u8; Self::SIZE]>::try_from(bytes.as_slice()).map_err(|_error| {
            AddressError::WrongLength {
                actual: bytes.len(),
                expected: Self::SIZE,
            }
        })?;

        Ok(Self(bytes))
    }
}
