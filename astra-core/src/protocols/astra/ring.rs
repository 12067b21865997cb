//! Rings Z/2^k.
//!
//! Contains the [`int_ring::IntRing2k`] trait over the primitive unsigned
//! integers and the wrapping [`ring_impl::RingElement`] newtype used for all
//! cleartext arithmetic.

pub mod int_ring;
pub mod ring_impl;
