//! Arbitrary-precision amounts

use core::fmt;
use core::ops::{Add, AddAssign};
use core::str::FromStr;
use derive_more::{From, Into};
use num_bigint::{BigUint, ParseBigIntError};
use parity_scale_codec::{Decode, Encode, EncodeLike, Input, Output};

/// Non-negative amount of an asset of arbitrary precision.
///
/// Encoded as a SCALE byte vector containing little-endian representation of the number.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, From, Into)]
pub struct Amount(BigUint);

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Amount {
    #[inline]
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for Amount {
    type Err = ParseBigIntError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s).map(Self)
    }
}

impl Add for Amount {
    type Output = Amount;

    #[inline]
    fn add(self, rhs: Amount) -> Amount {
        Self(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for Amount {
    type Output = Amount;

    #[inline]
    fn add(self, rhs: &'a Amount) -> Amount {
        Self(self.0 + &rhs.0)
    }
}

impl<'a> AddAssign<&'a Amount> for Amount {
    #[inline]
    fn add_assign(&mut self, rhs: &'a Amount) {
        self.0 += &rhs.0;
    }
}

impl Encode for Amount {
    fn size_hint(&self) -> usize {
        // Compact length prefix plus bytes
        1 + self.0.bits().div_ceil(8) as usize
    }

    fn encode_to<T>(&self, dest: &mut T)
    where
        T: Output + ?Sized,
    {
        self.0.to_bytes_le().encode_to(dest);
    }
}

impl EncodeLike for Amount {}

impl Decode for Amount {
    fn decode<I>(input: &mut I) -> Result<Self, parity_scale_codec::Error>
    where
        I: Input,
    {
        let bytes = Vec::<u8>::decode(input)?;
        Ok(Self(BigUint::from_bytes_le(&bytes)))
    }
}

impl Amount {
    /// Zero amount
    #[inline]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether amount is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// Checked subtraction, returns `None` on underflow
    pub fn checked_sub(&self, rhs: &Amount) -> Option<Amount> {
        if self.0 >= rhs.0 {
            Some(Self(&self.0 - &rhs.0))
        } else {
            None
        }
    }

    /// Inner big integer
    #[inline]
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}
