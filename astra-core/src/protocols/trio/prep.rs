//! The T-family preprocessing engine.
//!
//! The dealer computes the mask product itself and ships it, blinded, to
//! P2; the compute parties only draw and store correlation. The reduced
//! multiplication, dealer input, truncation and unsplit machinery is the
//! shared preprocessing code.

use num_traits::Zero;
use rand::distributions::{Distribution, Standard};
use rand::{Rng, SeedableRng};

use super::share::TrioPrepShare;
use crate::protocols::astra::error::AstraError;
use crate::protocols::astra::online::MulState;
use crate::protocols::astra::options::{code_location, AstraOptions};
use crate::protocols::astra::prep::PrepEngine;
use crate::protocols::astra::ring::int_ring::IntRing2k;
use crate::protocols::astra::ring::ring_impl::RingElement;
use crate::protocols::astra::share::{PrepShare, Share2k};
use crate::protocols::astra::stream::{OctetStream, Packable};
use crate::protocols::astra::{EngineKind, Result};
use crate::{RngType, Seed};
use astra_net::Network;

/// The T-variant preprocessing engine.
pub type TrioPrep<T, N> = PrepEngine<TrioPrepShare<T>, T, N>;

impl<T, N> TrioPrep<T, N>
where
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    /// Creates the T-variant preprocessing engine with a fresh seed.
    pub fn new(net: N, options: AstraOptions) -> Result<Self> {
        Self::with_seed(net, options, RngType::from_entropy().gen::<Seed>())
    }

    /// Creates the T-variant preprocessing engine deterministically from
    /// `seed`.
    pub fn with_seed(net: N, options: AstraOptions, seed: Seed) -> Result<Self> {
        Self::new_internal(
            net,
            options,
            seed,
            EngineKind::TrioPrep,
            "Trio",
            format!("trio-{}", T::K),
        )
    }

    /// The dealer's per-product step: blind the mask product with the
    /// share going to P1 and queue the outgoing value for P2.
    fn pre_p0(&mut self, input: RingElement<T>) {
        let r01 = self.prngs.random_element(0);
        let masked = input + r01;
        self.os.store_no_resize(&masked);
    }

    /// Runs the preprocessing multiplication round.
    pub fn exchange(&mut self) -> Result<()> {
        code_location!(self.options);
        if self.options.verbose_astra {
            tracing::debug!(target: "astra", "trio prep exchange {}", self.inputs.len());
        }
        self.set_state(MulState::Exchanging);
        debug_assert!(self.results.is_empty());

        self.n_mults += self.input_pairs.len();
        let total = self.inputs.len() + self.input_pairs.len();
        self.results.reserve(total);
        self.os.reset_write_head();
        self.os.reserve::<RingElement<T>>(2 * total);

        match self.my_num() {
            0 => {
                let inputs = std::mem::take(&mut self.inputs);
                for input in &inputs {
                    self.pre_p0(*input);
                    let slots = self.prngs.get_random();
                    self.results.push(TrioPrepShare::from_slots(slots[0], slots[1]));
                }
                let pairs = std::mem::take(&mut self.input_pairs);
                for (x, y) in &pairs {
                    self.pre_p0(TrioPrepShare::local_mul(0, x, y));
                    let slots = self.prngs.get_random();
                    self.results.push(TrioPrepShare::from_slots(slots[0], slots[1]));
                }
                self.os.send(&self.net, 2)?;
            }
            1 => {
                self.inputs.clear();
                self.input_pairs.clear();
                for _ in 0..total {
                    let r01 = self.prngs.random_element(1);
                    let neg_lambda = self.prngs.random_element(1);
                    self.results.push(TrioPrepShare::from_slots(
                        RingElement::zero(),
                        neg_lambda,
                    ));
                    self.os.store_no_resize(&r01);
                    self.os.store_no_resize(&neg_lambda);
                }
                let os = std::mem::take(&mut self.os);
                self.store(&os)?;
                self.os = os;
            }
            _ => {
                self.inputs.clear();
                self.input_pairs.clear();
                self.os.recv(&self.net, 0)?;
                if self.os.left() < total * RingElement::<T>::SIZE {
                    return Err(AstraError::insufficient_data("multiplication"));
                }
                let mut prep_os = OctetStream::new();
                prep_os.reserve::<RingElement<T>>(2 * total);
                let mut os = std::mem::take(&mut self.os);
                for _ in 0..total {
                    let masked: RingElement<T> = os.get_no_check();
                    prep_os.store_no_resize(&masked);
                    let neg_lambda = self.prngs.random_element(0);
                    prep_os.store_no_resize(&neg_lambda);
                    self.results.push(TrioPrepShare::from_slots(
                        RingElement::zero(),
                        neg_lambda,
                    ));
                }
                self.os = os;
                self.store(&prep_os)?;
            }
        }

        self.results.reset();
        self.set_state(MulState::Finalizing);
        self.maybe_check()
    }
}
