//! Unsplit: composing boolean-shared bits into arithmetic shares.
//!
//! Boolean shares pack up to one ring width of bits per element, XOR-shared
//! over the same two-slot layout. The single-destination form composes each
//! bit through one reduced multiplication (`a + b - 2ab` is arithmetic
//! XOR); the two-destination form replays a dealer input of the mask bits
//! and hands out the raw masked bits in parallel.

use num_traits::Zero;
use rand::distributions::{Distribution, Standard};

use super::error::AstraError;
use super::online::OnlineEngine;
use super::options::code_location;
use super::prep::PrepEngine;
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::rngs::SharedPrngs;
use super::share::{rep_index, AstraShare, OnlineShare, PrepShare, Share2k};
use super::stream::OctetStream;
use super::Result;
use astra_net::Network;

fn check_lengths(dest_len: usize, source_len: usize, n_bits: usize, unit: usize) -> Result<()> {
    let n_blocks = n_bits.div_ceil(unit);
    if dest_len < n_bits || source_len < n_blocks {
        return Err(AstraError::Protocol("wrong vector length".to_string()));
    }
    Ok(())
}

fn split_summands_error() -> AstraError {
    AstraError::Protocol("number of split summands not implemented".to_string())
}

impl<S, T, N> OnlineEngine<S, T, N>
where
    S: OnlineShare<T>,
    T: IntRing2k,
    N: Network,
{
    /// Two-destination unsplit: `dest_arith` receives the prep-produced
    /// arithmetic shares of the mask bits, `dest_raw` the raw masked bits
    /// in its masked-value slot.
    pub fn unsplit2(
        &mut self,
        dest_arith: &mut [S],
        dest_raw: &mut [S],
        source: &[S],
        n_bits: usize,
    ) -> Result<()> {
        code_location!(self.options);
        let unit = T::K;
        check_lengths(dest_arith.len().min(dest_raw.len()), source.len(), n_bits, unit)?;

        let mut os = self.read()?;
        os.require::<S>(n_bits)
            .map_err(|_| AstraError::insufficient_preprocessing())?;

        for (i, block) in source.iter().enumerate().take(n_bits.div_ceil(unit)) {
            let common_bits = block.common_m_bitwise();
            let left = unit.min(n_bits - unit * i);
            for j in 0..left {
                let raw: S = os.get_no_check();
                let idx = i * unit + j;
                dest_arith[idx] = S::from_rep3([raw.a(), raw.b()]);
                dest_raw[idx] = S::from_slots(common_bits.get_bit(j), RingElement::zero());
            }
        }
        debug_assert_eq!(os.left(), 0);
        Ok(())
    }
}

impl<T, N> OnlineEngine<AstraShare<T>, T, N>
where
    T: IntRing2k,
    N: Network,
{
    /// Single-destination unsplit: one reduced multiplication per bit, one
    /// network round for the whole batch.
    pub fn unsplit1(
        &mut self,
        dest: &mut [AstraShare<T>],
        source: &[AstraShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        code_location!(self.options);
        if self.options.verbose_and {
            tracing::debug!(target: "astra", "unsplit batch of {n_bits} bits");
        }
        let unit = T::K;
        check_lengths(dest.len(), source.len(), n_bits, unit)?;

        self.init_reduced_mul(n_bits)?;

        for (i, block) in source.iter().enumerate().take(n_bits.div_ceil(unit)) {
            let m_bits = block.m();
            let left = unit.min(n_bits - unit * i);
            for j in 0..left {
                let bit = m_bits.get_bit(j);
                let (a, b, c) = self.pre_reduced_mul(RingElement::zero(), bit);
                *self.results.back_mut() = (a + b - c.double(), RingElement::zero());
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
        dests: &mut [Vec<AstraShare<T>>],
        source: &[AstraShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        match dests {
            [dest] => self.unsplit1(dest, source, n_bits),
            [dest_arith, dest_raw] => self.unsplit2(dest_arith, dest_raw, source, n_bits),
            _ => Err(split_summands_error()),
        }
    }
}

impl<S, T, N> PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    /// Dispatches on the number of destination vectors, mirroring the
    /// online call.
    pub fn unsplit(&mut self, dests: &mut [Vec<S>], source: &[S], n_bits: usize) -> Result<()> {
        match dests {
            [dest] => self.unsplit1(dest, source, n_bits),
            [dest_arith, dest_raw] => self.unsplit2(dest_arith, dest_raw, source, n_bits),
            _ => Err(split_summands_error()),
        }
    }

    /// Single-destination unsplit at the prep side: the dealer feeds its
    /// XOR of the mask slots through the reduced-multiplication
    /// correlation; the compute parties only lay down mask material.
    pub fn unsplit1(&mut self, dest: &mut [S], source: &[S], n_bits: usize) -> Result<()> {
        code_location!(self.options);
        let unit = T::K;
        check_lengths(dest.len(), source.len(), n_bits, unit)?;

        self.init_reduced_mul(n_bits)?;

        if self.my_num() == 0 {
            let mut idx = 0;
            for (i, block) in source.iter().enumerate().take(n_bits.div_ceil(unit)) {
                let mask_bits = block.a() ^ block.b();
                let left = unit.min(n_bits - unit * i);
                for j in 0..left {
                    let bit = mask_bits.get_bit(j);
                    let (a, _b, c) = self.pre_reduced_mul(bit, RingElement::zero());
                    dest[idx] = a - c.double();
                    idx += 1;
                }
            }
        } else {
            for slot in dest.iter_mut().take(n_bits) {
                let (a, _b, c) = self.pre_reduced_mul(RingElement::zero(), RingElement::zero());
                *slot = S::from_slots(RingElement::zero(), a.b() - (c.b() + c.b()));
            }
        }

        self.exchange_reduced_mul(n_bits)
    }

    /// Two-destination unsplit at the prep side: a replicated input of the
    /// dealer's mask bits, re-encoded and stored for the online parties.
    pub fn unsplit2(
        &mut self,
        dest_arith: &mut [S],
        dest_raw: &mut [S],
        source: &[S],
        n_bits: usize,
    ) -> Result<()> {
        code_location!(self.options);
        let unit = T::K;
        check_lengths(dest_arith.len().min(dest_raw.len()), source.len(), n_bits, unit)?;

        if self.unsplit_prngs.is_none() {
            self.unsplit_prngs = Some(SharedPrngs::setup(&self.net)?);
        }

        // stored in the base slot order; the online reader applies the
        // variant re-encode
        let my_num = self.my_num();
        let base_map =
            |slots: [RingElement<T>; 2]| S::from_slots(slots[rep_index(0, my_num)], slots[rep_index(1, my_num)]);

        let mut os = OctetStream::new();
        os.reserve::<S>(n_bits);

        match self.my_num() {
            0 => {
                let mut send_os = OctetStream::new();
                send_os.reserve::<RingElement<T>>(n_bits);
                let mut rep3: Vec<[RingElement<T>; 2]> = Vec::with_capacity(n_bits);
                for (i, block) in source.iter().enumerate().take(n_bits.div_ceil(unit)) {
                    let mask_bits = block.a() ^ block.b();
                    let left = unit.min(n_bits - unit * i);
                    for j in 0..left {
                        let bit = mask_bits.get_bit(j);
                        let r = self
                            .unsplit_prngs
                            .as_mut()
                            .expect("set up above")
                            .random_element(0);
                        send_os.store_no_resize(&(bit - r));
                        rep3.push([r, bit - r]);
                    }
                }
                send_os.send(&self.net, 2)?;
                for (idx, slots) in rep3.into_iter().enumerate() {
                    let share = base_map(slots);
                    os.store_no_resize(&share);
                    dest_arith[idx] = share;
                    dest_raw[idx] = S::default();
                }
            }
            1 => {
                for idx in 0..n_bits {
                    let r = self
                        .unsplit_prngs
                        .as_mut()
                        .expect("set up above")
                        .random_element(1);
                    let share = base_map([RingElement::zero(), r]);
                    os.store_no_resize(&share);
                    dest_arith[idx] = share;
                    dest_raw[idx] = S::default();
                }
            }
            _ => {
                let mut recv_os = OctetStream::new();
                recv_os.recv(&self.net, 0)?;
                recv_os
                    .require::<RingElement<T>>(n_bits)
                    .map_err(|_| AstraError::insufficient_data("Astra input"))?;
                for idx in 0..n_bits {
                    let v: RingElement<T> = recv_os.get_no_check();
                    let share = base_map([v, RingElement::zero()]);
                    os.store_no_resize(&share);
                    dest_arith[idx] = share;
                    dest_raw[idx] = S::default();
                }
            }
        }

        self.store(&os)
    }
}
