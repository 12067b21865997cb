//! The T-family online engine.
//!
//! Same state machine as the base engine; the multiplication round differs:
//! each party masks its local product with its fresh mask share and sends
//! it to the peer, then recovers its masked-value slot from the difference
//! of the two contributions.

use num_traits::Zero;

use super::share::TrioShare;
use crate::protocols::astra::error::AstraError;
use crate::protocols::astra::online::{MulState, OnlineEngine};
use crate::protocols::astra::options::{code_location, AstraOptions};
use crate::protocols::astra::preprocessing::{
    get_dabit_batch, get_edabit_batch, DabitBatch, EdabitVec, PrepPipeline,
};
use crate::protocols::astra::ring::int_ring::IntRing2k;
use crate::protocols::astra::ring::ring_impl::RingElement;
use crate::protocols::astra::share::{OnlineShare, Share2k};
use crate::protocols::astra::stream::Packable;
use crate::protocols::astra::trunc::SmallGapOps;
use crate::protocols::astra::{EngineKind, Result};
use astra_net::Network;

/// The T-variant online engine.
pub type Trio<T, N> = OnlineEngine<TrioShare<T>, T, N>;

impl<T, N> Trio<T, N>
where
    T: IntRing2k,
    N: Network,
{
    /// Creates the T-variant online engine for this party.
    pub fn new(net: N, options: AstraOptions) -> Result<Self> {
        Self::new_internal(
            net,
            options,
            EngineKind::TrioOnline,
            "Trio",
            format!("trio-{}", T::K),
        )
    }

    /// Draws `(γ, neg_lambda)` from prep, masks the local contribution and
    /// queues the result share together with the outgoing value.
    fn pre_dot(&mut self, input: RingElement<T>) -> (TrioShare<T>, RingElement<T>) {
        let gamma: RingElement<T> = self.os_prep.get_no_check();
        let v = input + gamma;
        let neg_lambda: RingElement<T> = self.os_prep.get_no_check();
        let z = TrioShare::from_slots(RingElement::zero(), neg_lambda);
        let outgoing = if self.my_num == 1 {
            v + z.neg_lambda()
        } else {
            v - z.neg_lambda()
        };
        self.os.store_no_resize(&outgoing);
        (z, v)
    }

    /// Runs the multiplication round.
    pub fn exchange(&mut self) -> Result<()> {
        code_location!(self.options);
        self.set_state(MulState::Exchanging);
        debug_assert!(self.results.is_empty());

        let n_mults = self.inputs.len() + self.input_pairs.len();

        self.os_prep = self.read()?;
        if self.os_prep.left() < 2 * n_mults * RingElement::<T>::SIZE {
            return Err(AstraError::insufficient_preprocessing());
        }

        self.os.reset_write_head();
        self.os.reserve::<RingElement<T>>(n_mults);
        self.results.reserve(n_mults);

        let inputs = std::mem::take(&mut self.inputs);
        for input in &inputs {
            let res = self.pre_dot(*input);
            self.results.push(res);
        }
        let pairs = std::mem::take(&mut self.input_pairs);
        for (x, y) in &pairs {
            let res = self.pre_dot(TrioShare::local_mul(self.my_num, x, y));
            self.results.push(res);
        }

        let os = std::mem::take(&mut self.os);
        os.exchange(&self.net, self.peer(), &mut self.recv_os)?;
        self.os = os;

        if self.recv_os.left() < RingElement::<T>::SIZE * n_mults {
            return Err(AstraError::insufficient_data("Trio"));
        }

        if self.my_num == 1 {
            for res in self.results.iter_mut() {
                *res.0.a_mut() = self.recv_os.get_no_check::<RingElement<T>>() - res.1;
            }
        } else {
            for res in self.results.iter_mut() {
                *res.0.a_mut() = res.1 - self.recv_os.get_no_check::<RingElement<T>>();
            }
        }

        debug_assert_eq!(self.os_prep.left(), 0);
        self.results.reset();
        self.set_state(MulState::Finalizing);
        self.maybe_check()
    }

    /// Reads the reduced-multiplication correlation for `n_mul` products.
    pub(crate) fn init_reduced_mul(&mut self, n_mul: usize) -> Result<()> {
        self.os_prep = self.read()?;
        self.os_prep
            .require::<RingElement<T>>(2 * n_mul)
            .map_err(|_| AstraError::insufficient_preprocessing())?;
        self.os.reset_write_head();
        self.os.reserve::<RingElement<T>>(n_mul);
        self.results.clear();
        self.results.reserve(n_mul);
        Ok(())
    }

    /// One reduced product: reads the correlated `(a, c)` pair, masks this
    /// party's contribution and queues the outgoing value.
    pub(crate) fn pre_reduced_mul(
        &mut self,
        _aa: RingElement<T>,
        bb: RingElement<T>,
    ) -> (TrioShare<T>, TrioShare<T>, TrioShare<T>) {
        let a1: RingElement<T> = self.os_prep.get_no_check();
        let c1: RingElement<T> = self.os_prep.get_no_check();
        let a = TrioShare::from_slots(a1, a1);
        let c = TrioShare::from_slots(RingElement::zero(), c1);
        let b = TrioShare::from_slots(bb, RingElement::zero());

        let v = if self.my_num == 1 {
            let v1 = b.a() * a.lambda();
            self.os.store_no_resize(&(v1 + c.neg_lambda()));
            v1
        } else {
            let v2 = a.a() * b.a();
            self.os.store_no_resize(&(v2 - c.neg_lambda()));
            v2
        };
        self.results.push((TrioShare::default(), v));
        (a, b, c)
    }

    /// The single network round of a reduced-multiplication batch.
    pub(crate) fn exchange_reduced_mul(&mut self, n_mul: usize) -> Result<()> {
        let os = std::mem::take(&mut self.os);
        os.exchange(&self.net, self.peer(), &mut self.recv_os)?;
        self.os = os;
        self.recv_os
            .require::<RingElement<T>>(n_mul)
            .map_err(|_| AstraError::insufficient_data("Trio"))?;
        self.results.reset();
        debug_assert_eq!(self.results.left(), n_mul);
        Ok(())
    }

    /// Pops one reduced product: the queued share and the recovered masked
    /// contribution.
    pub(crate) fn post_reduced_mul(&mut self) -> (TrioShare<T>, RingElement<T>) {
        let (share, v) = self.results.next();
        let peer: RingElement<T> = self.recv_os.get_no_check();
        let carry = if self.my_num == 1 { peer - v } else { v - peer };
        (share, carry)
    }

    /// Single-destination unsplit: one reduced multiplication per bit.
    pub fn unsplit1(
        &mut self,
        dest: &mut [TrioShare<T>],
        source: &[TrioShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        code_location!(self.options);
        if self.options.verbose_and {
            tracing::debug!(target: "astra", "unsplit batch of {n_bits} bits");
        }
        let unit = T::K;
        if dest.len() < n_bits || source.len() < n_bits.div_ceil(unit) {
            return Err(AstraError::Protocol("wrong vector length".to_string()));
        }

        self.init_reduced_mul(n_bits)?;

        for (i, block) in source.iter().enumerate().take(n_bits.div_ceil(unit)) {
            let bits = block.common_m_bitwise();
            let left = unit.min(n_bits - unit * i);
            for j in 0..left {
                let bit = bits.get_bit(j);
                let (a, b, c) = self.pre_reduced_mul(RingElement::zero(), bit);
                self.results.back_mut().0 = a + b - c.double();
            }
        }

        self.exchange_reduced_mul(n_bits)?;

        for slot in dest.iter_mut().take(n_bits) {
            let (share, carry) = self.post_reduced_mul();
            let mut x = share;
            *x.a_mut() -= carry + carry;
            *slot = x;
        }

        debug_assert_eq!(self.recv_os.left(), 0);
        debug_assert_eq!(self.os_prep.left(), 0);
        Ok(())
    }

    /// Dispatches on the number of destination vectors: one produces the
    /// arithmetic bit shares, two additionally hands out the raw masked
    /// bits.
    pub fn unsplit(
        &mut self,
        dests: &mut [Vec<TrioShare<T>>],
        source: &[TrioShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        match dests {
            [dest] => self.unsplit1(dest, source, n_bits),
            [dest_arith, dest_raw] => self.unsplit2(dest_arith, dest_raw, source, n_bits),
            _ => Err(AstraError::Protocol(
                "number of split summands not implemented".to_string(),
            )),
        }
    }
}

impl<T, N> SmallGapOps<T> for Trio<T, N>
where
    T: IntRing2k,
    N: Network,
{
    type Share = TrioShare<T>;

    const REAL_SHARES: bool = true;

    fn gap_my_num(&self) -> usize {
        self.my_num()
    }

    fn constant_share(c: RingElement<T>) -> Self::Share {
        <TrioShare<T> as OnlineShare<T>>::constant(c)
    }

    fn common_m_of(share: &Self::Share) -> RingElement<T> {
        share.common_m()
    }

    fn init_reduced(&mut self, n: usize) -> Result<()> {
        self.init_reduced_mul(n)
    }

    fn pre_reduced(
        &mut self,
        aa: RingElement<T>,
        bb: RingElement<T>,
    ) -> (Self::Share, Self::Share, Self::Share) {
        self.pre_reduced_mul(aa, bb)
    }

    fn exchange_reduced(&mut self, n: usize) -> Result<()> {
        self.exchange_reduced_mul(n)
    }

    fn post_reduced(&mut self) -> (Self::Share, RingElement<T>) {
        self.post_reduced_mul()
    }

    fn init_inp0(&mut self, n: usize) {
        self.init_input0(n);
    }

    fn pre_inp0(&mut self, _value: RingElement<T>) {
        unreachable!("the dealer is absent online");
    }

    fn exchange_inp0(&mut self, n: usize) -> Result<()> {
        self.exchange_input0(n)
    }

    fn post_inp0(&mut self) -> Self::Share {
        self.post_input0()
    }

    fn finalize_inp0(&mut self, n: usize) -> Result<()> {
        self.finalize_input0(n)
    }
}

impl<T, N> PrepPipeline<T> for Trio<T, N>
where
    T: IntRing2k,
    N: Network,
{
    type Share = TrioShare<T>;

    fn use_rep3_prep(&self) -> bool {
        self.options().rep3_prep
    }

    fn boolean_random_columns(&mut self, n: usize) -> Result<Vec<TrioShare<T>>> {
        self.randoms(n, T::K)
    }

    fn unsplit_bits(
        &mut self,
        dest: &mut [TrioShare<T>],
        source: &[TrioShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        self.unsplit1(dest, source, n_bits)
    }

    fn dabit_batch_rep3(&mut self) -> Result<DabitBatch<TrioShare<T>>> {
        let mut os = self.read()?;
        let batch = get_dabit_batch(&mut os)?;
        debug_assert_eq!(os.left(), 0);
        Ok(batch)
    }

    fn edabit_batch_rep3(&mut self, _n_bits: usize) -> Result<EdabitVec<TrioShare<T>>> {
        let mut os = self.read()?;
        let batch = get_edabit_batch(&mut os)?;
        debug_assert_eq!(os.left(), 0);
        Ok(batch)
    }
}
