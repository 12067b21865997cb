//! Preprocessing buffers: random bits, daBits and edaBits.
//!
//! The buffers refill in batches of one ring width. Under `rep3_prep` the
//! offline engine generates daBits/edaBits with a classical replicated
//! three-party preprocessor, re-encodes them into the variant layout and
//! ships whole batches through the prep file; the online engine reads the
//! matching batch. Without `rep3_prep` both phases build them from boolean
//! randomness and the engine's own bit composition, which keeps the two
//! phases in lockstep without extra file traffic.

use itertools::izip;
use num_traits::Zero;
use rand::distributions::{Distribution, Standard};

use super::online::OnlineEngine;
use super::prep::PrepEngine;
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::share::{AstraShare, PrepShare, Share2k};
use super::stream::OctetStream;
use super::Result;
use astra_net::Network;

/// One daBit batch: a ring width of arithmetic bit shares plus the packed
/// boolean share of the same bits.
#[derive(Debug, Clone)]
pub struct DabitBatch<S> {
    /// Arithmetic shares, one per bit.
    pub arith: Vec<S>,
    /// The packed boolean share; bit `j` matches `arith[j]`.
    pub bits: S,
}

/// One edaBit batch: a ring width of values with both an arithmetic share
/// per value and boolean shares of the value bits, stored as packed
/// columns.
#[derive(Debug, Clone)]
pub struct EdabitVec<S> {
    /// Arithmetic value shares.
    pub a: Vec<S>,
    /// Packed boolean bit columns; column `i` holds bit `i` of every value.
    pub b: Vec<S>,
}

impl<S> EdabitVec<S> {
    /// Number of bits per value.
    pub fn n_bits(&self) -> usize {
        self.b.len()
    }
}

/// What the buffers need from an engine: boolean randomness, bit
/// composition, and the replicated batch channel. Implemented by every
/// engine.
pub trait PrepPipeline<T: IntRing2k> {
    /// The engine's share type.
    type Share: Share2k<T>;

    /// Whether daBits/edaBits come from the replicated preprocessor.
    fn use_rep3_prep(&self) -> bool;

    /// `n` packed boolean random shares (one ring width of bits each).
    fn boolean_random_columns(&mut self, n: usize) -> Result<Vec<Self::Share>>;

    /// Composes packed boolean shares into one arithmetic share per bit.
    fn unsplit_bits(
        &mut self,
        dest: &mut [Self::Share],
        source: &[Self::Share],
        n_bits: usize,
    ) -> Result<()>;

    /// One daBit batch from the replicated preprocessor (generated and
    /// stored offline, read online).
    fn dabit_batch_rep3(&mut self) -> Result<DabitBatch<Self::Share>>;

    /// One edaBit batch from the replicated preprocessor.
    fn edabit_batch_rep3(&mut self, n_bits: usize) -> Result<EdabitVec<Self::Share>>;
}

/// Buffered preprocessing material feeding the higher-level protocols.
#[derive(Debug)]
pub struct BufferPrep<S> {
    bits: Vec<S>,
    dabits: Vec<(S, S)>,
    edabits: std::collections::BTreeMap<usize, Vec<EdabitVec<S>>>,
}

impl<S> Default for BufferPrep<S> {
    fn default() -> Self {
        Self {
            bits: Vec::new(),
            dabits: Vec::new(),
            edabits: std::collections::BTreeMap::new(),
        }
    }
}

impl<S> BufferPrep<S> {
    /// Empty buffers.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> BufferPrep<S> {
    /// Pops one random-bit share, refilling from boolean randomness plus
    /// bit composition when empty.
    pub fn get_bit<T, E>(&mut self, engine: &mut E) -> Result<S>
    where
        T: IntRing2k,
        E: PrepPipeline<T, Share = S>,
        S: Share2k<T>,
    {
        if self.bits.is_empty() {
            let columns = engine.boolean_random_columns(1)?;
            let mut arith = vec![S::default(); T::K];
            engine.unsplit_bits(&mut arith, &columns, T::K)?;
            self.bits = arith;
            self.bits.reverse();
        }
        Ok(self.bits.pop().expect("refilled above"))
    }

    /// Pops one daBit: an arithmetic and a boolean share of one random
    /// bit.
    pub fn get_dabit<T, E>(&mut self, engine: &mut E) -> Result<(S, S)>
    where
        T: IntRing2k,
        E: PrepPipeline<T, Share = S>,
        S: Share2k<T>,
    {
        if self.dabits.is_empty() {
            if engine.use_rep3_prep() {
                let batch = engine.dabit_batch_rep3()?;
                for (j, arith) in batch.arith.into_iter().enumerate() {
                    self.dabits.push((arith, extract_bit(&batch.bits, j)));
                }
            } else {
                let columns = engine.boolean_random_columns(1)?;
                let mut arith = vec![S::default(); T::K];
                engine.unsplit_bits(&mut arith, &columns, T::K)?;
                for (j, a) in arith.into_iter().enumerate() {
                    self.dabits.push((a, extract_bit(&columns[0], j)));
                }
            }
            self.dabits.reverse();
        }
        Ok(self.dabits.pop().expect("refilled above"))
    }

    /// Pops one edaBit batch of `n_bits`-bit values.
    pub fn get_edabit_vec<T, E>(&mut self, engine: &mut E, n_bits: usize) -> Result<EdabitVec<S>>
    where
        T: IntRing2k,
        E: PrepPipeline<T, Share = S>,
        S: Share2k<T>,
    {
        let buffer = self.edabits.entry(n_bits).or_default();
        if let Some(batch) = buffer.pop() {
            return Ok(batch);
        }
        if engine.use_rep3_prep() {
            return engine.edabit_batch_rep3(n_bits);
        }

        let columns = engine.boolean_random_columns(n_bits)?;
        let mut arith_columns = Vec::with_capacity(n_bits);
        for column in &columns {
            let mut arith = vec![S::default(); T::K];
            engine.unsplit_bits(&mut arith, std::slice::from_ref(column), T::K)?;
            arith_columns.push(arith);
        }
        let a = (0..T::K)
            .map(|j| {
                let mut acc = S::default();
                for (i, column) in arith_columns.iter().enumerate() {
                    acc += column[j] * RingElement::two_pow(i);
                }
                acc
            })
            .collect();
        Ok(EdabitVec { a, b: columns })
    }
}

/// The boolean share of bit `j` of a packed share, moved to bit position 0.
fn extract_bit<S: Share2k<T>, T: IntRing2k>(packed: &S, j: usize) -> S {
    S::from_slots(packed.a().get_bit(j), packed.b().get_bit(j))
}

// --- batch framing through the prep file ---

pub(crate) fn store_dabit_batch<S: Share2k<T>, T: IntRing2k>(
    os: &mut OctetStream,
    batch: &DabitBatch<S>,
) {
    os.store_vec(&batch.arith);
    os.store(&batch.bits);
}

pub(crate) fn get_dabit_batch<S: Share2k<T>, T: IntRing2k>(
    os: &mut OctetStream,
) -> Result<DabitBatch<S>> {
    let arith = os.get_vec()?;
    let bits = os.get()?;
    Ok(DabitBatch { arith, bits })
}

pub(crate) fn store_edabit_batch<S: Share2k<T>, T: IntRing2k>(
    os: &mut OctetStream,
    batch: &EdabitVec<S>,
) {
    os.store_vec(&batch.a);
    os.store_vec(&batch.b);
}

pub(crate) fn get_edabit_batch<S: Share2k<T>, T: IntRing2k>(
    os: &mut OctetStream,
) -> Result<EdabitVec<S>> {
    let a = os.get_vec()?;
    let b = os.get_vec()?;
    Ok(EdabitVec { a, b })
}

// --- the replicated three-party generator (prep phase only) ---

type Rep3Pair<T> = [RingElement<T>; 2];

/// Batched semi-honest replicated multiplication: one reshare round.
fn rep3_mul_many<T, N, S>(
    engine: &mut PrepEngine<S, T, N>,
    xs: &[Rep3Pair<T>],
    ys: &[Rep3Pair<T>],
) -> Result<Vec<Rep3Pair<T>>>
where
    T: IntRing2k,
    N: Network,
    S: PrepShare<T>,
    Standard: Distribution<T>,
{
    debug_assert_eq!(xs.len(), ys.len());
    let mut os = OctetStream::new();
    os.reserve::<RingElement<T>>(xs.len());
    let locals: Vec<RingElement<T>> = izip!(xs, ys)
        .map(|(x, y)| {
            let zero_share =
                engine.prngs.random_element(0) - engine.prngs.random_element(1);
            let local = x[0] * y[0] + x[0] * y[1] + x[1] * y[0] + zero_share;
            os.store_no_resize(&local);
            local
        })
        .collect();

    let mut recv_os = OctetStream::new();
    os.pass_around(engine.network(), 1, &mut recv_os)?;
    recv_os
        .require::<RingElement<T>>(xs.len())
        .map_err(|_| super::error::AstraError::insufficient_data("replicated resharing"))?;

    Ok(locals
        .into_iter()
        .map(|local| [local, recv_os.get_no_check()])
        .collect())
}

/// Arithmetic XOR of two replicated bit sharings: `x + y - 2xy`.
fn rep3_xor_many<T, N, S>(
    engine: &mut PrepEngine<S, T, N>,
    xs: &[Rep3Pair<T>],
    ys: &[Rep3Pair<T>],
) -> Result<Vec<Rep3Pair<T>>>
where
    T: IntRing2k,
    N: Network,
    S: PrepShare<T>,
    Standard: Distribution<T>,
{
    let products = rep3_mul_many(engine, xs, ys)?;
    Ok(izip!(xs, ys, products)
        .map(|(x, y, p)| {
            [
                x[0] + y[0] - (p[0] + p[0]),
                x[1] + y[1] - (p[1] + p[1]),
            ]
        })
        .collect())
}

/// The replicated component sharings of each party's XOR contribution: for
/// logical component `k`, the additive share is this party's packed bit
/// word if `k` is its own index, the previous party's word if `k` precedes
/// it, zero otherwise.
fn component_pairs<T: IntRing2k>(
    my_id: usize,
    own_bits: RingElement<T>,
    prev_bits: RingElement<T>,
    j: usize,
) -> [Rep3Pair<T>; 3] {
    let mut pairs = [[RingElement::zero(); 2]; 3];
    pairs[my_id][0] = own_bits.get_bit(j);
    pairs[(my_id + 2) % 3][1] = prev_bits.get_bit(j);
    pairs
}

impl<S, T, N> PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    /// Generates one daBit batch with the replicated preprocessor: a packed
    /// boolean random word, injected bit by bit into arithmetic replicated
    /// sharings, then re-encoded and stored for the online phase.
    pub(crate) fn rep3_dabit_batch(&mut self) -> Result<DabitBatch<S>> {
        let own_bits = self.prngs.random_element(0);
        let prev_bits = self.prngs.random_element(1);
        let my_id = self.network().id();

        let mut x0 = Vec::with_capacity(T::K);
        let mut x1 = Vec::with_capacity(T::K);
        let mut x2 = Vec::with_capacity(T::K);
        for j in 0..T::K {
            let [p0, p1, p2] = component_pairs(my_id, own_bits, prev_bits, j);
            x0.push(p0);
            x1.push(p1);
            x2.push(p2);
        }

        let t = rep3_xor_many(self, &x0, &x1)?;
        let injected = rep3_xor_many(self, &t, &x2)?;

        let arith: Vec<S> = injected
            .into_iter()
            .map(|pair| S::from_rep3(pair, self.my_num()))
            .collect();
        let bits = S::from_rep3_bitwise([own_bits, prev_bits], self.my_num());
        let batch = DabitBatch { arith, bits };

        let mut os = OctetStream::new();
        store_dabit_batch(&mut os, &batch);
        self.store(&os)?;
        Ok(batch)
    }

    /// Generates one edaBit batch with the replicated preprocessor.
    pub(crate) fn rep3_edabit_batch(&mut self, n_bits: usize) -> Result<EdabitVec<S>> {
        let mut columns = Vec::with_capacity(n_bits);
        let mut value_pairs = vec![[RingElement::<T>::zero(); 2]; T::K];

        for i in 0..n_bits {
            let own_bits = self.prngs.random_element(0);
            let prev_bits = self.prngs.random_element(1);
            let my_id = self.network().id();

            let mut x0 = Vec::with_capacity(T::K);
            let mut x1 = Vec::with_capacity(T::K);
            let mut x2 = Vec::with_capacity(T::K);
            for j in 0..T::K {
                let [p0, p1, p2] = component_pairs(my_id, own_bits, prev_bits, j);
                x0.push(p0);
                x1.push(p1);
                x2.push(p2);
            }
            let t = rep3_xor_many(self, &x0, &x1)?;
            let injected = rep3_xor_many(self, &t, &x2)?;
            for (j, pair) in injected.into_iter().enumerate() {
                value_pairs[j][0] += pair[0] * RingElement::two_pow(i);
                value_pairs[j][1] += pair[1] * RingElement::two_pow(i);
            }

            columns.push(S::from_rep3_bitwise([own_bits, prev_bits], self.my_num()));
        }

        let a: Vec<S> = value_pairs
            .into_iter()
            .map(|pair| S::from_rep3(pair, self.my_num()))
            .collect();
        let batch = EdabitVec { a, b: columns };

        let mut os = OctetStream::new();
        store_edabit_batch(&mut os, &batch);
        self.store(&os)?;
        Ok(batch)
    }
}

impl<S, T, N> PrepPipeline<T> for PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    type Share = S;

    fn use_rep3_prep(&self) -> bool {
        self.options().rep3_prep
    }

    fn boolean_random_columns(&mut self, n: usize) -> Result<Vec<S>> {
        self.boolean_randoms(n)
    }

    fn unsplit_bits(&mut self, dest: &mut [S], source: &[S], n_bits: usize) -> Result<()> {
        self.unsplit1(dest, source, n_bits)
    }

    fn dabit_batch_rep3(&mut self) -> Result<DabitBatch<S>> {
        self.rep3_dabit_batch()
    }

    fn edabit_batch_rep3(&mut self, n_bits: usize) -> Result<EdabitVec<S>> {
        self.rep3_edabit_batch(n_bits)
    }
}

impl<T, N> PrepPipeline<T> for OnlineEngine<AstraShare<T>, T, N>
where
    T: IntRing2k,
    N: Network,
{
    type Share = AstraShare<T>;

    fn use_rep3_prep(&self) -> bool {
        self.options().rep3_prep
    }

    fn boolean_random_columns(&mut self, n: usize) -> Result<Vec<AstraShare<T>>> {
        self.randoms(n, T::K)
    }

    fn unsplit_bits(
        &mut self,
        dest: &mut [AstraShare<T>],
        source: &[AstraShare<T>],
        n_bits: usize,
    ) -> Result<()> {
        self.unsplit1(dest, source, n_bits)
    }

    fn dabit_batch_rep3(&mut self) -> Result<DabitBatch<AstraShare<T>>> {
        let mut os = self.read()?;
        let batch = get_dabit_batch(&mut os)?;
        debug_assert_eq!(os.left(), 0);
        Ok(batch)
    }

    fn edabit_batch_rep3(&mut self, _n_bits: usize) -> Result<EdabitVec<AstraShare<T>>> {
        let mut os = self.read()?;
        let batch = get_edabit_batch(&mut os)?;
        debug_assert_eq!(os.left(), 0);
        Ok(batch)
    }
}
