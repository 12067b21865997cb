//! # Astra
//!
//! Semi-honest three-party MPC over Z/2^k with a dealer-assisted online
//! phase. The preprocessing protocol runs between three parties (the dealer
//! P0 and the two compute parties) and writes correlated randomness to prep
//! files; the online protocol runs between the two compute parties only and
//! consumes those files. Multiplications, dot products, probabilistic
//! truncation and bit composition all cost one network round per batch
//! online.
//!
//! The module also hosts the infrastructure shared with the [`trio`]
//! variant: rings, byte streams, correlated PRNGs, prep files and the
//! generic engine types.
//!
//! [`trio`]: crate::protocols::trio

use std::cell::Cell;

pub mod error;
pub mod files;
pub mod input;
pub mod mc;
pub mod online;
pub mod options;
pub mod prep;
pub mod preprocessing;
pub mod ring;
pub mod rngs;
pub mod share;
pub mod stream;
pub mod trunc;
pub mod unsplit;

pub(crate) mod itervec;

pub use online::{Astra, OnlineEngine};
pub use prep::{AstraPrep, PrepEngine};
pub use share::{AstraPrepShare, AstraShare};

/// Result type of this module.
pub type Result<T> = std::result::Result<T, error::AstraError>;

/// Which engine a thread guard belongs to. At most one engine of each kind
/// may be live per OS thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineKind {
    AstraOnline,
    AstraPrep,
    TrioOnline,
    TrioPrep,
}

impl EngineKind {
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

thread_local! {
    static LIVE_ENGINES: Cell<u8> = const { Cell::new(0) };
}

/// Enforces the one-engine-per-thread rule. Acquired by engine constructors,
/// released on drop.
#[derive(Debug)]
pub(crate) struct ThreadGuard {
    kind: EngineKind,
}

impl ThreadGuard {
    pub(crate) fn acquire(kind: EngineKind) -> Self {
        LIVE_ENGINES.with(|live| {
            let bits = live.get();
            if bits & kind.bit() != 0 {
                panic!("there can only be one");
            }
            live.set(bits | kind.bit());
        });
        Self { kind }
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        LIVE_ENGINES.with(|live| live.set(live.get() & !self.kind.bit()));
    }
}

/// Helpers to secret-share and reconstruct cleartexts outside the protocol,
/// mainly for tests and share distribution at the system boundary.
pub mod utils {
    use rand::{CryptoRng, Rng};

    use super::ring::int_ring::IntRing2k;
    use super::ring::ring_impl::RingElement;
    use super::share::{AstraShare, Share2k};

    /// Shares `val` between the two online parties with fresh masks.
    pub fn share_ring_element<T: IntRing2k, R: Rng + CryptoRng>(
        val: RingElement<T>,
        rng: &mut R,
    ) -> [AstraShare<T>; 2]
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        let neg_lambda1 = RingElement(rng.gen::<T>());
        let neg_lambda2 = RingElement(rng.gen::<T>());
        let m = val - neg_lambda1 - neg_lambda2;
        [
            AstraShare::from_slots(m, neg_lambda1),
            AstraShare::from_slots(m, neg_lambda2),
        ]
    }

    /// Reconstructs a cleartext from the two online shares.
    pub fn combine_ring_element<T: IntRing2k>(
        share1: AstraShare<T>,
        share2: AstraShare<T>,
    ) -> RingElement<T> {
        debug_assert_eq!(share1.m(), share2.m());
        share1.m() + share1.neg_lambda() + share2.neg_lambda()
    }
}
