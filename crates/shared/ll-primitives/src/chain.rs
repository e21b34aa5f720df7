//! Chain-level primitives

use derive_more::{Display, From, Into};
use parity_scale_codec::{Decode, Encode};

/// Chain identifier
#[derive(
    Debug, Display, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, From, Into, Encode, Decode,
)]
pub struct ChainId(u16);

impl ChainId {
    /// Create new instance
    #[inline(always)]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Protocol version that is active on a chain.
///
/// Versions only grow, certain transaction shapes are only accepted once a chain reaches a
/// specific version.
#[derive(
    Debug,
    Display,
    Default,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    From,
    Into,
    Encode,
    Decode,
)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    /// Create new instance
    #[inline(always)]
    pub const fn new(version: u16) -> Self {
        Self(version)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Block height
#[derive(
    Debug,
    Display,
    Default,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    From,
    Into,
    Encode,
    Decode,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Genesis block height
    pub const ZERO: Self = Self(0);
    /// First block height
    pub const ONE: Self = Self(1);

    /// Create new instance
    #[inline(always)]
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    /// Get internal representation
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Saturating addition
    #[inline(always)]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction
    #[inline(always)]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

/// Subset of the block header that transaction processing depends on
#[derive(Debug, Copy, Clone, Eq, PartialEq, Encode, Decode)]
pub struct BlockHeader {
    /// Block height
    pub height: BlockHeight,
    /// Block timestamp in milliseconds since UNIX epoch
    pub time: u64,
}
