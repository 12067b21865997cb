//! Probabilistic truncation.
//!
//! Right-shifts a secret-shared fixed-point value by `m` bits with an
//! unbiased rounding correction. Tuples with `k` far enough below the ring
//! width run the non-interactive big-gap path; the rest run the small-gap
//! path built from a dealer input and a reduced multiplication.

use num_traits::{One, Zero};
use rand::distributions::{Distribution, Standard};

use super::error::AstraError;
use super::online::OnlineEngine;
use super::options::code_location;
use super::prep::PrepEngine;
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::share::{AstraShare, OnlineShare, PrepShare, Share2k};
use super::stream::OctetStream;
use super::Result;
use astra_net::Network;

/// One truncation request: `mem[dest_base..+size] = mem[source_base..+size]
/// >> m`, where the values are `k`-bit fixed-point numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncPrTuple {
    /// Destination base index into the caller's share memory.
    pub dest_base: usize,
    /// Source base index into the caller's share memory.
    pub source_base: usize,
    /// Cleartext bit width.
    pub k: usize,
    /// Shift distance.
    pub m: usize,
}

impl TruncPrTuple {
    /// A validated tuple; aborts on parameters outside `0 < m < k <=
    /// n_bits`.
    pub fn new(dest_base: usize, source_base: usize, k: usize, m: usize, n_bits: usize) -> Self {
        assert!(k > 0 && m > 0, "degenerate truncation");
        assert!(m < k, "shift must leave bits");
        assert!(k <= n_bits, "cleartext exceeds ring width");
        Self {
            dest_base,
            source_base,
            k,
            m,
        }
    }

    /// Whether the tuple runs the non-interactive regime.
    pub fn big_gap(&self, trunc_error: u32, n_bits: usize) -> bool {
        self.k <= n_bits.saturating_sub(trunc_error as usize)
    }

    pub(crate) fn add_before<T: IntRing2k>(&self) -> RingElement<T> {
        RingElement::two_pow(self.k - 1)
    }

    pub(crate) fn subtract_after<T: IntRing2k>(&self) -> RingElement<T> {
        RingElement::two_pow(self.k - self.m - 1)
    }

    /// Shifts a correction bit up to the truncation headroom.
    pub(crate) fn correction_shift<T: IntRing2k>(&self) -> RingElement<T> {
        RingElement::two_pow(T::K - self.m)
    }

    /// The top bit of the masked value; the small-gap slack guarantees it
    /// coincides with the wrap-around indicator of the mask addition.
    pub(crate) fn masked_msb<T: IntRing2k>(&self, x: RingElement<T>) -> RingElement<T> {
        x.msb()
    }
}

/// The variant-independent surface of the small-gap machinery: a reduced
/// multiplication plus a dealer input, driven by the same skeleton at all
/// parties. Implemented by every engine; not meant to be called directly.
pub trait SmallGapOps<T: IntRing2k> {
    /// The engine's share type.
    type Share: Share2k<T>;

    /// Whether this engine holds real (online) shares.
    const REAL_SHARES: bool;

    /// This engine's protocol number.
    fn gap_my_num(&self) -> usize;
    /// Public constant in the engine's share encoding.
    fn constant_share(c: RingElement<T>) -> Self::Share;
    /// The common masked value, where the engine has one.
    fn common_m_of(share: &Self::Share) -> RingElement<T>;
    /// Prepares a reduced-multiplication batch.
    fn init_reduced(&mut self, n: usize) -> Result<()>;
    /// Queues one reduced product.
    fn pre_reduced(
        &mut self,
        aa: RingElement<T>,
        bb: RingElement<T>,
    ) -> (Self::Share, Self::Share, Self::Share);
    /// Finishes the reduced-multiplication batch.
    fn exchange_reduced(&mut self, n: usize) -> Result<()>;
    /// Pops one reduced product.
    fn post_reduced(&mut self) -> (Self::Share, RingElement<T>);
    /// Prepares a dealer-input batch.
    fn init_inp0(&mut self, n: usize);
    /// Queues one dealer input (dealer only).
    fn pre_inp0(&mut self, value: RingElement<T>);
    /// Runs the dealer-input round.
    fn exchange_inp0(&mut self, n: usize) -> Result<()>;
    /// Pops one dealer-input share.
    fn post_inp0(&mut self) -> Self::Share;
    /// Closes the dealer-input batch.
    fn finalize_inp0(&mut self, n: usize) -> Result<()>;
}

/// The shared small-gap schedule: mask the sign, share the shifted mask
/// from the dealer, compose the carry with one reduced multiplication.
pub(crate) fn trunc_pr_small_gap<E, T>(
    engine: &mut E,
    infos: &[TruncPrTuple],
    size: usize,
    mem: &mut [E::Share],
) -> Result<()>
where
    E: SmallGapOps<T>,
    T: IntRing2k,
{
    let n = size * infos.len();
    let generate = engine.gap_my_num() == 0;

    engine.init_reduced(n)?;
    engine.init_inp0(n);

    for info in infos {
        for i in 0..size {
            let y = mem[info.source_base + i];
            let mut c_prime = E::Share::default();
            let mut c_msb = RingElement::zero();
            let mut r_msb = RingElement::zero();

            if generate && !E::REAL_SHARES {
                let r = y.sum() + info.add_before::<T>() - RingElement::one();
                r_msb = info.masked_msb(r);
                engine.pre_inp0(r >> info.m);
            }

            if E::REAL_SHARES {
                let c = E::common_m_of(&y);
                c_prime = E::Share::from_slots(c >> info.m, RingElement::zero());
                c_msb = info.masked_msb(c);
            }

            let (r_dprime, c_dprime, prod) = engine.pre_reduced(r_msb, c_msb);

            let mut x = c_prime;
            x += (prod - (r_dprime + c_dprime)) * info.correction_shift::<T>();
            mem[info.dest_base + i] = x;
        }
    }

    engine.exchange_reduced(n)?;
    engine.exchange_inp0(n)?;

    for info in infos {
        for i in 0..size {
            let r_prime = engine.post_inp0();
            let (_, carry) = engine.post_reduced();
            let x = &mut mem[info.dest_base + i];
            *x += r_prime - E::constant_share(info.subtract_after::<T>() - RingElement::one());
            *x.a_mut() += carry * info.correction_shift::<T>();
        }
    }

    engine.finalize_inp0(n)
}

impl<S, T, N> OnlineEngine<S, T, N>
where
    S: OnlineShare<T>,
    T: IntRing2k,
    N: Network,
{
    /// Truncates a batch of tuples over the caller's share memory; one
    /// prep read for the big-gap part, one round for the small-gap part.
    pub fn trunc_pr(&mut self, tuples: &[TruncPrTuple], size: usize, mem: &mut [S]) -> Result<()>
    where
        Self: SmallGapOps<T, Share = S>,
    {
        let trunc_error = self.options().trunc_error;
        let big: Vec<TruncPrTuple> = tuples
            .iter()
            .copied()
            .filter(|t| t.big_gap(trunc_error, T::K))
            .collect();
        let small: Vec<TruncPrTuple> = tuples
            .iter()
            .copied()
            .filter(|t| !t.big_gap(trunc_error, T::K))
            .collect();
        if !big.is_empty() {
            self.trunc_pr_big_gap(&big, size, mem)?;
        }
        if !small.is_empty() {
            trunc_pr_small_gap(self, &small, size, mem)?;
        }
        Ok(())
    }

    /// The non-interactive regime: this party's fresh mask share comes
    /// from prep, the masked value is shifted locally.
    fn trunc_pr_big_gap(
        &mut self,
        infos: &[TruncPrTuple],
        size: usize,
        mem: &mut [S],
    ) -> Result<()> {
        code_location!(self.options);
        let mut cs = self.read()?;
        cs.require::<RingElement<T>>(infos.len() * size)
            .map_err(|_| AstraError::insufficient_preprocessing())?;

        for info in infos {
            for i in 0..size {
                let x = mem[info.source_base + i];
                let y = &mut mem[info.dest_base + i];
                y.set_neg_lambda(cs.get_no_check());
                y.set_common_m(x.common_m() >> info.m);
            }
        }
        debug_assert_eq!(cs.left(), 0);
        Ok(())
    }
}

impl<T, N> SmallGapOps<T> for OnlineEngine<AstraShare<T>, T, N>
where
    T: IntRing2k,
    N: Network,
{
    type Share = AstraShare<T>;

    const REAL_SHARES: bool = true;

    fn gap_my_num(&self) -> usize {
        self.my_num()
    }

    fn constant_share(c: RingElement<T>) -> Self::Share {
        <AstraShare<T> as OnlineShare<T>>::constant(c)
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

impl<S, T, N> PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    /// Preprocessing counterpart of [`OnlineEngine::trunc_pr`].
    pub fn trunc_pr(&mut self, tuples: &[TruncPrTuple], size: usize, mem: &mut [S]) -> Result<()> {
        let trunc_error = self.options().trunc_error;
        let big: Vec<TruncPrTuple> = tuples
            .iter()
            .copied()
            .filter(|t| t.big_gap(trunc_error, T::K))
            .collect();
        let small: Vec<TruncPrTuple> = tuples
            .iter()
            .copied()
            .filter(|t| !t.big_gap(trunc_error, T::K))
            .collect();
        if !big.is_empty() {
            self.trunc_pr_big_gap(&big, size, mem)?;
        }
        if !small.is_empty() {
            trunc_pr_small_gap(self, &small, size, mem)?;
        }
        Ok(())
    }

    /// Big-gap mask refresh: the dealer splits the shifted mask between a
    /// wire share for P1 and a PRNG share for P2.
    fn trunc_pr_big_gap(
        &mut self,
        infos: &[TruncPrTuple],
        size: usize,
        mem: &mut [S],
    ) -> Result<()> {
        code_location!(self.options);
        let mut cs = OctetStream::new();
        cs.reserve::<RingElement<T>>(infos.len() * size);

        match self.my_num() {
            0 => {
                for info in infos {
                    for i in 0..size {
                        let x = mem[info.source_base + i];
                        let r = self.prngs.random_element(1);
                        let shifted = -((-x.sum()) >> info.m) - r;
                        mem[info.dest_base + i] = S::from_slots(shifted, r);
                        cs.store_no_resize(&shifted);
                    }
                }
                cs.send(&self.net, 1)?;
            }
            1 => {
                cs.recv(&self.net, 0)?;
                let mut os = OctetStream::new();
                os.reserve::<RingElement<T>>(infos.len() * size);
                for info in infos {
                    cs.require::<RingElement<T>>(size)
                        .map_err(|_| AstraError::insufficient_data("Astra"))?;
                    for i in 0..size {
                        let v: RingElement<T> = cs.get_no_check();
                        let y = &mut mem[info.dest_base + i];
                        *y.b_mut() = v;
                        os.store_no_resize(&v);
                    }
                }
                self.store(&os)?;
            }
            _ => {
                for info in infos {
                    for i in 0..size {
                        let v = self.prngs.random_element(0);
                        let y = &mut mem[info.dest_base + i];
                        *y.b_mut() = v;
                        cs.store_no_resize(&v);
                    }
                }
                self.store(&cs)?;
            }
        }
        Ok(())
    }
}

impl<S, T, N> SmallGapOps<T> for PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    type Share = S;

    const REAL_SHARES: bool = false;

    fn gap_my_num(&self) -> usize {
        self.my_num()
    }

    fn constant_share(_c: RingElement<T>) -> Self::Share {
        S::default()
    }

    fn common_m_of(_share: &Self::Share) -> RingElement<T> {
        unreachable!("preprocessing shares carry no masked value")
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

    fn pre_inp0(&mut self, value: RingElement<T>) {
        self.pre_input0(value);
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
