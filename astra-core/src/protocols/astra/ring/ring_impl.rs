//! A wrapper around [`IntRing2k`] types that makes all arithmetic wrapping.

use super::int_ring::IntRing2k;
use crate::protocols::astra::stream::{OctetStream, Packable};
use crate::protocols::astra::Result;
use num_traits::{One, Zero};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Mul, MulAssign,
    Neg, Not, Shl, ShlAssign, Shr, ShrAssign, Sub, SubAssign,
};

/// A ring element of Z/2^k with wrapping semantics.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, PartialOrd, Eq, Ord, Hash,
)]
#[serde(bound = "")]
#[repr(transparent)]
pub struct RingElement<T: IntRing2k>(pub T);

impl<T: IntRing2k> RingElement<T> {
    /// Unwraps into the inner type.
    pub fn convert(self) -> T {
        self.0
    }

    /// Returns bit `index` as a ring element in {0, 1}; zero past the ring
    /// width.
    pub fn get_bit(&self, index: usize) -> Self {
        if index >= T::K {
            RingElement(T::zero())
        } else {
            RingElement((self.0.wrapping_shr(index as u32)) & T::one())
        }
    }

    /// Returns the top bit of the ring representation.
    pub fn msb(&self) -> Self {
        self.get_bit(T::K - 1)
    }

    /// Keeps the low `n_bits` bits, zeroing the rest.
    pub fn mask_low(&self, n_bits: usize) -> Self {
        if n_bits >= T::K {
            *self
        } else {
            let mask = (T::one().wrapping_shl(n_bits as u32)).wrapping_sub(&T::one());
            RingElement(self.0 & mask)
        }
    }

    /// 2^exp as a ring element (zero once exp reaches the ring width).
    pub fn two_pow(exp: usize) -> Self {
        RingElement::one() << exp
    }
}

impl<T: IntRing2k + std::fmt::Display> std::fmt::Display for RingElement<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl<T: IntRing2k> Add for RingElement<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(&rhs.0))
    }
}

impl<T: IntRing2k> Add<&Self> for RingElement<T> {
    type Output = Self;

    fn add(self, rhs: &Self) -> Self::Output {
        Self(self.0.wrapping_add(&rhs.0))
    }
}

impl<T: IntRing2k> AddAssign for RingElement<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.0.wrapping_add_assign(&rhs.0)
    }
}

impl<T: IntRing2k> AddAssign<&Self> for RingElement<T> {
    fn add_assign(&mut self, rhs: &Self) {
        self.0.wrapping_add_assign(&rhs.0)
    }
}

impl<T: IntRing2k> Sub for RingElement<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_sub(&rhs.0))
    }
}

impl<T: IntRing2k> Sub<&Self> for RingElement<T> {
    type Output = Self;

    fn sub(self, rhs: &Self) -> Self::Output {
        Self(self.0.wrapping_sub(&rhs.0))
    }
}

impl<T: IntRing2k> SubAssign for RingElement<T> {
    fn sub_assign(&mut self, rhs: Self) {
        self.0.wrapping_sub_assign(&rhs.0)
    }
}

impl<T: IntRing2k> Mul for RingElement<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_mul(&rhs.0))
    }
}

impl<T: IntRing2k> Mul<&Self> for RingElement<T> {
    type Output = Self;

    fn mul(self, rhs: &Self) -> Self::Output {
        Self(self.0.wrapping_mul(&rhs.0))
    }
}

impl<T: IntRing2k> MulAssign for RingElement<T> {
    fn mul_assign(&mut self, rhs: Self) {
        self.0.wrapping_mul_assign(&rhs.0)
    }
}

impl<T: IntRing2k> Neg for RingElement<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0.wrapping_neg())
    }
}

impl<T: IntRing2k> Zero for RingElement<T> {
    fn zero() -> Self {
        Self(T::zero())
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl<T: IntRing2k> One for RingElement<T> {
    fn one() -> Self {
        Self(T::one())
    }
}

impl<T: IntRing2k> Not for RingElement<T> {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl<T: IntRing2k> BitXor for RingElement<T> {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl<T: IntRing2k> BitXorAssign for RingElement<T> {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl<T: IntRing2k> BitAnd for RingElement<T> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl<T: IntRing2k> BitAndAssign for RingElement<T> {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl<T: IntRing2k> BitOr for RingElement<T> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl<T: IntRing2k> BitOrAssign for RingElement<T> {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl<T: IntRing2k> Shl<usize> for RingElement<T> {
    type Output = Self;

    fn shl(self, rhs: usize) -> Self::Output {
        if rhs >= T::K {
            RingElement(T::zero())
        } else {
            RingElement(self.0.wrapping_shl(rhs as u32))
        }
    }
}

impl<T: IntRing2k> ShlAssign<usize> for RingElement<T> {
    fn shl_assign(&mut self, rhs: usize) {
        *self = *self << rhs
    }
}

impl<T: IntRing2k> Shr<usize> for RingElement<T> {
    type Output = Self;

    fn shr(self, rhs: usize) -> Self::Output {
        if rhs >= T::K {
            RingElement(T::zero())
        } else {
            RingElement(self.0.wrapping_shr(rhs as u32))
        }
    }
}

impl<T: IntRing2k> ShrAssign<usize> for RingElement<T> {
    fn shr_assign(&mut self, rhs: usize) {
        *self = *self >> rhs
    }
}

impl<T: IntRing2k> Distribution<RingElement<T>> for Standard
where
    Standard: Distribution<T>,
{
    #[inline(always)]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> RingElement<T> {
        RingElement(rng.gen())
    }
}

impl<T: IntRing2k> From<T> for RingElement<T> {
    fn from(other: T) -> Self {
        RingElement(other)
    }
}

impl<T: IntRing2k> From<bool> for RingElement<T> {
    fn from(bit: bool) -> Self {
        RingElement(T::from(bit))
    }
}

impl<T: IntRing2k> Packable for RingElement<T> {
    const SIZE: usize = T::BYTES;

    fn pack(&self, os: &mut OctetStream) {
        let dst = os.append_uninit(T::BYTES);
        self.0.write_le(dst);
    }

    fn unpack(os: &mut OctetStream) -> Result<Self> {
        let src = os.consume(T::BYTES)?;
        Ok(RingElement(T::read_le(src)))
    }
}
