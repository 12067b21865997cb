//! # Trio
//!
//! The second protocol family: same dealer-assisted structure as
//! [`astra`], but with a transposed masking convention. The masked value is
//! not stored directly; each compute party keeps `common_m + neg_lambda` in
//! its first slot, so the common masked value is the slot difference. The
//! multiplication round exchanges locally masked products between the two
//! compute parties instead of broadcasting the masked result.
//!
//! All infrastructure (rings, streams, PRNGs, prep files, the engine
//! skeletons and the input machines) is shared with [`astra`].
//!
//! [`astra`]: crate::protocols::astra

pub mod online;
pub mod prep;
pub mod share;

pub use online::Trio;
pub use prep::TrioPrep;
pub use share::{TrioPrepShare, TrioShare};

/// Helpers to secret-share and reconstruct cleartexts outside the
/// protocol, mainly for tests.
pub mod utils {
    use rand::{CryptoRng, Rng};

    use super::share::TrioShare;
    use crate::protocols::astra::ring::int_ring::IntRing2k;
    use crate::protocols::astra::ring::ring_impl::RingElement;
    use crate::protocols::astra::share::Share2k;

    /// Shares `val` between the two online parties with fresh masks.
    pub fn share_ring_element<T: IntRing2k, R: Rng + CryptoRng>(
        val: RingElement<T>,
        rng: &mut R,
    ) -> [TrioShare<T>; 2]
    where
        rand::distributions::Standard: rand::distributions::Distribution<T>,
    {
        let neg_lambda1 = RingElement(rng.gen::<T>());
        let neg_lambda2 = RingElement(rng.gen::<T>());
        let common_m = val - neg_lambda1 - neg_lambda2;
        [
            TrioShare::from_slots(common_m + neg_lambda1, neg_lambda1),
            TrioShare::from_slots(common_m + neg_lambda2, neg_lambda2),
        ]
    }

    /// Reconstructs a cleartext from the two online shares.
    pub fn combine_ring_element<T: IntRing2k>(
        share1: TrioShare<T>,
        share2: TrioShare<T>,
    ) -> RingElement<T> {
        debug_assert_eq!(share1.common_m(), share2.common_m());
        share1.a() + share2.b()
    }
}
