//! # Astra Core
//!
//! This crate implements a family of semi-honest three-party MPC protocols
//! for arithmetic over power-of-two rings Z/2^k, in the honest-majority
//! setting with a dealer: a preprocessing phase run by three parties produces
//! correlated randomness on disk, and an online phase run by the two compute
//! parties consumes it. The two protocol families are
//! [ASTRA](https://eprint.iacr.org/2019/429) ([`protocols::astra`]) and a
//! variant with transposed masking conventions ([`protocols::trio`]).

#![warn(missing_docs)]

pub mod protocols;

pub(crate) type RngType = rand_chacha::ChaCha12Rng;
pub(crate) const SEED_SIZE: usize = std::mem::size_of::<<RngType as rand::SeedableRng>::Seed>();

/// A PRNG seed of the size used throughout the crate.
pub type Seed = [u8; SEED_SIZE];
