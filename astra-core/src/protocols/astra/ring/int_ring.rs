//! The trait that admits a primitive unsigned integer as a Z/2^k domain.

use num_traits::{One, WrappingAdd, WrappingMul, WrappingNeg, WrappingShl, WrappingShr, WrappingSub, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not};

/// Types that can serve as the cleartext domain Z/2^k.
pub trait IntRing2k:
    std::fmt::Display
    + Serialize
    + for<'a> Deserialize<'a>
    + WrappingAdd
    + WrappingSub
    + WrappingMul
    + WrappingNeg
    + WrappingShl
    + WrappingShr
    + Not<Output = Self>
    + BitXor<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXorAssign
    + BitAndAssign
    + BitOrAssign
    + PartialEq
    + Eq
    + From<bool>
    + Copy
    + Debug
    + Zero
    + One
    + Send
    + Sync
    + 'static
{
    /// Ring bit width k.
    const K: usize;
    /// Wire size in bytes.
    const BYTES: usize;

    /// Writes the little-endian encoding into `dst` (exactly [`Self::BYTES`]
    /// bytes).
    fn write_le(self, dst: &mut [u8]);

    /// Reads the little-endian encoding from `src` (exactly [`Self::BYTES`]
    /// bytes).
    fn read_le(src: &[u8]) -> Self;

    /// a += b
    #[inline(always)]
    fn wrapping_add_assign(&mut self, rhs: &Self) {
        *self = self.wrapping_add(rhs);
    }

    /// a -= b
    #[inline(always)]
    fn wrapping_sub_assign(&mut self, rhs: &Self) {
        *self = self.wrapping_sub(rhs);
    }

    /// a *= b
    #[inline(always)]
    fn wrapping_mul_assign(&mut self, rhs: &Self) {
        *self = self.wrapping_mul(rhs);
    }
}

macro_rules! int_ring_impl {
    ($($ty:ty),*) => ($(
        impl IntRing2k for $ty {
            const K: usize = Self::BITS as usize;
            const BYTES: usize = Self::K / 8;

            fn write_le(self, dst: &mut [u8]) {
                dst.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(src: &[u8]) -> Self {
                let mut bytes = [0u8; Self::BYTES];
                bytes.copy_from_slice(src);
                Self::from_le_bytes(bytes)
            }
        }
    )*)
}

int_ring_impl! { u8, u16, u32, u64, u128 }

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: IntRing2k + PartialEq>(val: T) {
        let mut buf = vec![0u8; T::BYTES];
        val.write_le(&mut buf);
        assert_eq!(T::read_le(&buf), val);
    }

    #[test]
    fn le_roundtrip() {
        roundtrip(0x12u8);
        roundtrip(0x1234u16);
        roundtrip(0x12345678u32);
        roundtrip(0x123456789abcdef0u64);
        roundtrip(0x123456789abcdef0_0fedcba987654321u128);
    }

    #[test]
    fn widths() {
        assert_eq!(u64::K, 64);
        assert_eq!(u64::BYTES, 8);
        assert_eq!(u128::BYTES, 16);
    }
}
