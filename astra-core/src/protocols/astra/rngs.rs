//! Correlated randomness between adjacent parties.
//!
//! Every preprocessing party holds a pair of seeded PRNGs: `prngs[0]` shares
//! its seed with the next party, `prngs[1]` with the previous one. Any two
//! adjacent parties can thus draw identical pseudorandom ring elements
//! without communication.

use rand::distributions::{Distribution, Standard};
use rand::{Rng, SeedableRng};

use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::stream::OctetStream;
use super::Result;
use crate::{RngType, Seed};
use astra_net::Network;

/// A pair of PRNGs shared with the ring neighbors.
#[derive(Debug)]
pub struct SharedPrngs {
    prngs: [RngType; 2],
}

impl SharedPrngs {
    /// Bootstraps the pair with a fresh random seed: seeds `prngs[0]`,
    /// sends the seed one step around the ring and seeds `prngs[1]` from
    /// the seed received from the previous party.
    pub fn setup<N: Network>(net: &N) -> Result<Self> {
        Self::from_seed(RngType::from_entropy().gen(), net)
    }

    /// Bootstraps the pair from a caller-chosen seed, making the engine
    /// deterministic in its seed.
    pub fn from_seed<N: Network>(seed: Seed, net: &N) -> Result<Self> {
        if !net.is_encrypted() {
            tracing::warn!("seed exchange over unencrypted channels");
        }
        let mut os = OctetStream::new();
        os.append(&seed);
        let mut recv_os = OctetStream::new();
        os.pass_around(net, 1, &mut recv_os)?;
        let mut prev_seed = Seed::default();
        prev_seed.copy_from_slice(recv_os.consume(crate::SEED_SIZE)?);
        Ok(Self {
            prngs: [RngType::from_seed(seed), RngType::from_seed(prev_seed)],
        })
    }

    /// A pair from two explicit seeds, for the party-local test harness.
    pub fn from_seeds(next: Seed, prev: Seed) -> Self {
        Self {
            prngs: [RngType::from_seed(next), RngType::from_seed(prev)],
        }
    }

    /// Draws one ring element from the PRNG with index `i` (0 = shared with
    /// the next party, 1 = shared with the previous).
    pub fn random_element<T: IntRing2k>(&mut self, i: usize) -> RingElement<T>
    where
        Standard: Distribution<T>,
    {
        RingElement(self.prngs[i].gen())
    }

    /// Draws one ring element restricted to the low `n_bits` bits.
    pub fn random_element_part<T: IntRing2k>(&mut self, i: usize, n_bits: usize) -> RingElement<T>
    where
        Standard: Distribution<T>,
    {
        self.random_element::<T>(i).mask_low(n_bits)
    }

    /// Draws one element from each PRNG: the pair of components shared with
    /// the next and the previous party, respectively.
    pub fn get_random<T: IntRing2k>(&mut self) -> [RingElement<T>; 2]
    where
        Standard: Distribution<T>,
    {
        [self.random_element(0), self.random_element(1)]
    }

}
