//! The preprocessing multiplication engine.
//!
//! [`PrepEngine`] runs between the three preprocessing parties. The dealer
//! (P0) learns every mask; the two compute parties write the correlation
//! the online phase will consume to their prep files. The engine mirrors
//! the online state machine call for call, since preprocessing is
//! function-dependent: the same program drives both phases.

use num_traits::Zero;
use rand::distributions::{Distribution, Standard};
use rand::{Rng, SeedableRng};

use super::error::AstraError;
use super::files::{filename, PrepReader, PrepWriter};
use super::itervec::IterVec;
use super::online::MulState;
use super::options::{code_location, AstraOptions};
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::rngs::SharedPrngs;
use super::share::{AstraPrepShare, PrepShare, Share2k};
use super::stream::{OctetStream, Packable};
use super::{EngineKind, Result, ThreadGuard};
use crate::{RngType, Seed};
use astra_net::Network;

/// The preprocessing engine for a three-party offline phase.
///
/// `S` selects the protocol variant through its share type.
#[derive(Debug)]
pub struct PrepEngine<S, T: IntRing2k, N> {
    pub(crate) net: N,
    pub(crate) my_num: usize,
    pub(crate) options: AstraOptions,
    name: &'static str,
    protocol: String,
    suffix: String,
    pub(crate) prngs: SharedPrngs,
    pub(crate) prngs_input0: SharedPrngs,
    pub(crate) unsplit_prngs: Option<SharedPrngs>,
    prep: Option<PrepWriter>,
    outputs: Option<PrepReader>,
    pub(crate) os: OctetStream,
    pub(crate) os_prep: OctetStream,
    pub(crate) cs: OctetStream,
    pub(crate) gen_values: IterVec<S>,
    pub(crate) inputs: Vec<RingElement<T>>,
    pub(crate) input_pairs: Vec<(S, S)>,
    pub(crate) results: IterVec<S>,
    pub(crate) n_mults: usize,
    state: MulState,
    _guard: ThreadGuard,
}

/// The A-variant preprocessing engine.
pub type AstraPrep<T, N> = PrepEngine<AstraPrepShare<T>, T, N>;

impl<S, T, N> PrepEngine<S, T, N>
where
    S: PrepShare<T>,
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    pub(crate) fn new_internal(
        net: N,
        options: AstraOptions,
        seed: Seed,
        kind: EngineKind,
        name: &'static str,
        protocol: String,
    ) -> Result<Self> {
        if net.num_parties() != 3 {
            return Err(AstraError::Config(format!(
                "{name} preprocessing runs with three parties, got {}",
                net.num_parties()
            )));
        }
        // one engine seed feeds both correlated pairs
        let mut seeder = RngType::from_seed(seed);
        let prngs = SharedPrngs::from_seed(seeder.gen::<Seed>(), &net)?;
        let prngs_input0 = SharedPrngs::from_seed(seeder.gen::<Seed>(), &net)?;
        let my_num = net.id();
        Ok(Self {
            net,
            my_num,
            options,
            name,
            protocol,
            suffix: String::new(),
            prngs,
            prngs_input0,
            unsplit_prngs: None,
            prep: None,
            outputs: None,
            os: OctetStream::new(),
            os_prep: OctetStream::new(),
            cs: OctetStream::new(),
            gen_values: IterVec::default(),
            inputs: Vec::new(),
            input_pairs: Vec::new(),
            results: IterVec::default(),
            n_mults: 0,
            state: MulState::Idle,
            _guard: ThreadGuard::acquire(kind),
        })
    }

    /// This party's preprocessing number (0 is the dealer).
    pub fn my_num(&self) -> usize {
        self.my_num
    }

    /// The underlying network.
    pub fn network(&self) -> &N {
        &self.net
    }

    /// The engine options.
    pub fn options(&self) -> &AstraOptions {
        &self.options
    }

    /// Current multiplication-cycle state.
    pub fn state(&self) -> MulState {
        self.state
    }

    /// Dot products flushed in the current cycle.
    pub fn queued_dotprods(&self) -> usize {
        self.n_mults
    }

    /// Re-targets prep and output files; the next store reopens them.
    pub fn set_suffix(&mut self, suffix: &str) {
        self.suffix = format!("-{suffix}");
        self.prep = None;
        self.outputs = None;
    }

    fn init_prep(&mut self) -> Result<()> {
        let path = filename(
            &self.options,
            &self.protocol,
            &self.suffix,
            "Protocol",
            self.my_num,
        );
        self.prep = Some(PrepWriter::create(&path)?);
        Ok(())
    }

    /// Appends one chunk to this party's prep file; the dealer keeps no
    /// file.
    pub(crate) fn store(&mut self, os: &OctetStream) -> Result<()> {
        if self.my_num == 0 {
            return Ok(());
        }
        if self.prep.is_none() {
            self.init_prep()?;
        }
        if self.options.verbose_astra {
            tracing::debug!(target: "astra", "{} prep store of {} bytes", self.name, os.len());
        }
        self.prep.as_mut().expect("opened above").store(os)
    }

    /// Stores a single packed value as one chunk.
    pub(crate) fn store_value<P: Packable>(&mut self, value: &P) -> Result<()> {
        if self.my_num == 0 {
            return Ok(());
        }
        let mut os = OctetStream::new();
        os.store(value);
        self.store(&os)
    }

    /// Re-encodes a replicated sharing into this variant's layout for this
    /// party.
    pub fn from_rep3(&self, slots: [RingElement<T>; 2]) -> S {
        S::from_rep3(slots, self.my_num)
    }

    /// Starts a multiplication cycle.
    pub fn init_mul(&mut self) -> Result<()> {
        if self.state == MulState::Finalizing && self.results.left() > 0 {
            return Err(AstraError::unused_data(self.name));
        }
        self.inputs.clear();
        self.input_pairs.clear();
        self.results.clear();
        self.n_mults = 0;
        self.state = MulState::Collecting;
        Ok(())
    }

    /// Queues one product.
    pub fn prepare_mul(&mut self, x: S, y: S) {
        debug_assert_eq!(self.state, MulState::Collecting);
        self.input_pairs.push((x, y));
    }

    /// Alias of [`Self::prepare_mul`].
    pub fn prepare_mul_fast(&mut self, x: S, y: S) {
        self.prepare_mul(x, y);
    }

    /// Starts a dot-product cycle.
    pub fn init_dotprod(&mut self) -> Result<()> {
        self.init_mul()
    }

    /// Adds an operand pair to the current dot product.
    pub fn prepare_dotprod(&mut self, x: S, y: S) {
        self.prepare_mul(x, y);
    }

    /// Closes the current dot product.
    pub fn next_dotprod(&mut self) {
        let mut acc = RingElement::zero();
        for (x, y) in &self.input_pairs {
            acc += S::local_mul(self.my_num, x, y);
        }
        self.inputs.push(acc);
        self.n_mults += 1;
        self.input_pairs.clear();
    }

    /// Pops the next multiplication result.
    pub fn finalize_mul(&mut self) -> S {
        debug_assert_eq!(self.state, MulState::Finalizing);
        self.results.next()
    }

    /// Alias of [`Self::finalize_mul`].
    pub fn finalize_mul_fast(&mut self) -> S {
        self.finalize_mul()
    }

    /// Pops the next dot-product result.
    pub fn finalize_dotprod(&mut self, _length: usize) -> S {
        self.finalize_mul()
    }

    /// Semi-honest correctness hook; nothing to verify at this layer.
    pub fn check(&mut self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn maybe_check(&mut self) -> Result<()> {
        if self.options.always_check {
            self.check()?;
        }
        Ok(())
    }

    pub(crate) fn set_state(&mut self, state: MulState) {
        self.state = state;
    }

    /// Generates one random share and stores it for the online party.
    pub fn get_random(&mut self) -> Result<S> {
        let slots = self.prngs.get_random();
        let res = self.from_rep3(slots);
        self.store_value(&res)?;
        Ok(res)
    }

    /// Generates `n` random shares of `n_bits`-bounded values, packed into
    /// one prep chunk.
    pub fn randoms(&mut self, n: usize, n_bits: usize) -> Result<Vec<S>> {
        let mut os = OctetStream::new();
        os.reserve::<S>(n);
        let res: Vec<S> = (0..n)
            .map(|_| {
                let slots = [
                    self.prngs.random_element_part(0, n_bits),
                    self.prngs.random_element_part(1, n_bits),
                ];
                let share = self.from_rep3(slots);
                os.store_no_resize(&share);
                share
            })
            .collect();
        self.store(&os)?;
        Ok(res)
    }

    /// Generates `n` random boolean shares (XOR sharing packed over the
    /// ring width), re-encoded bitwise and stored for the online party.
    pub fn boolean_randoms(&mut self, n: usize) -> Result<Vec<S>> {
        let mut os = OctetStream::new();
        os.reserve::<S>(n);
        let res: Vec<S> = (0..n)
            .map(|_| {
                let slots = [self.prngs.random_element(0), self.prngs.random_element(1)];
                let share = S::from_rep3_bitwise(slots, self.my_num);
                os.store_no_resize(&share);
                share
            })
            .collect();
        self.store(&os)?;
        Ok(res)
    }

    /// Replays a batch of values opened by the previous online run; party 1
    /// reads them from the output file and broadcasts.
    pub fn sync(&mut self) -> Result<Vec<RingElement<T>>> {
        let mut os = OctetStream::new();
        if self.my_num == 1 {
            if self.outputs.is_none() {
                let path = filename(&self.options, &self.protocol, &self.suffix, "Outputs", 1);
                self.outputs = Some(PrepReader::open(&path)?);
            }
            self.outputs.as_mut().expect("opened above").read(&mut os)?;
            for peer in [0, 2] {
                os.send(&self.net, peer)?;
            }
        } else {
            os.recv(&self.net, 1)?;
        }
        let values = os.get_vec()?;
        debug_assert_eq!(os.left(), 0);
        Ok(values)
    }

    /// Forwards a batch of values to the online phase through the prep
    /// file.
    pub fn forward_sync(&mut self, values: &[RingElement<T>]) -> Result<()> {
        let mut os = OctetStream::new();
        os.store_vec(values);
        self.store(&os)
    }

    // --- dealer-input sub-protocol (used by small-gap truncation) ---

    /// The dealer shares `value` towards the compute parties: one mask
    /// component goes over the PRNG shared with P2, the other over the wire
    /// to P1.
    pub(crate) fn add_gen(&mut self, value: RingElement<T>) {
        debug_assert_eq!(self.my_num, 0);
        let b = self.prngs_input0.random_element(1);
        let a = value - b;
        self.gen_values.push(S::from_slots(a, b));
        self.cs.store_no_resize(&a);
    }

    pub(crate) fn init_input0(&mut self, n: usize) {
        self.cs.reset_write_head();
        self.cs.reserve::<RingElement<T>>(n);
    }

    pub(crate) fn pre_input0(&mut self, value: RingElement<T>) {
        self.add_gen(value);
    }

    pub(crate) fn exchange_input0(&mut self, n: usize) -> Result<()> {
        match self.my_num {
            0 => {
                self.cs.send(&self.net, 1)?;
                self.gen_values.reset();
                debug_assert_eq!(self.gen_values.left(), n);
            }
            1 => {
                self.cs.recv(&self.net, 0)?;
                self.cs
                    .require::<RingElement<T>>(n)
                    .map_err(|_| AstraError::insufficient_data("dealer input"))?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn post_input0(&mut self) -> S {
        match self.my_num {
            0 => self.gen_values.next(),
            1 => {
                let b = self.cs.get_no_check();
                S::from_slots(RingElement::zero(), b)
            }
            _ => {
                let b = self.prngs_input0.random_element(0);
                self.cs.store_no_resize(&b);
                S::from_slots(RingElement::zero(), b)
            }
        }
    }

    pub(crate) fn finalize_input0(&mut self, n: usize) -> Result<()> {
        if self.my_num != 0 {
            self.cs.reset_read_head();
            self.cs
                .require::<RingElement<T>>(n)
                .map_err(|_| AstraError::insufficient_data("dealer input"))?;
            let cs = std::mem::take(&mut self.cs);
            self.store(&cs)?;
            self.cs = cs;
        }
        debug_assert_eq!(self.gen_values.left(), 0);
        Ok(())
    }

    // --- reduced multiplication (generator operand at the dealer) ---

    /// Prepares a reduced-multiplication batch; P2 first receives the
    /// dealer's operand shares.
    pub(crate) fn init_reduced_mul(&mut self, n_mul: usize) -> Result<()> {
        self.os_prep.reset_write_head();
        self.os.reset_write_head();
        self.os.reserve::<RingElement<T>>(n_mul);
        self.os_prep.reserve::<RingElement<T>>(2 * n_mul);
        if self.my_num == 2 {
            self.os.recv(&self.net, 0)?;
            self.os
                .require::<RingElement<T>>(n_mul)
                .map_err(|_| AstraError::insufficient_data(self.name))?;
        }
        Ok(())
    }

    /// One reduced product at the prep side: `aa` is the dealer's cleartext
    /// operand; the compute parties only produce correlation.
    pub(crate) fn pre_reduced_mul(
        &mut self,
        aa: RingElement<T>,
        _bb: RingElement<T>,
    ) -> (S, S, S) {
        match self.my_num {
            0 => {
                let a0 = self.prngs.random_element(0);
                let a1 = aa - a0;
                self.os.store_no_resize(&a1);
                let a = S::from_slots(a0, a1);
                let c_slots = self.prngs.get_random();
                let c = S::from_slots(c_slots[0], c_slots[1]);
                (a, S::default(), c)
            }
            1 => {
                let a1 = self.prngs.random_element(1);
                let c1 = self.prngs.random_element(1);
                self.os_prep.store_no_resize(&a1);
                self.os_prep.store_no_resize(&c1);
                (
                    S::from_slots(RingElement::zero(), a1),
                    S::default(),
                    S::from_slots(RingElement::zero(), c1),
                )
            }
            _ => {
                let a1: RingElement<T> = self.os.get_no_check();
                let c1 = self.prngs.random_element(0);
                self.os_prep.store_no_resize(&a1);
                self.os_prep.store_no_resize(&c1);
                (
                    S::from_slots(RingElement::zero(), a1),
                    S::default(),
                    S::from_slots(RingElement::zero(), c1),
                )
            }
        }
    }

    /// Finishes a reduced-multiplication batch: the dealer ships its
    /// operand shares, the compute parties store the correlation.
    pub(crate) fn exchange_reduced_mul(&mut self, _n_mul: usize) -> Result<()> {
        if self.my_num == 0 {
            self.os.send(&self.net, 2)?;
        }
        if self.my_num == 2 {
            debug_assert_eq!(self.os.left(), 0);
        }
        let os_prep = std::mem::take(&mut self.os_prep);
        self.store(&os_prep)?;
        self.os_prep = os_prep;
        Ok(())
    }

    /// The prep side produces no online product value.
    pub(crate) fn post_reduced_mul(&mut self) -> (S, RingElement<T>) {
        (S::default(), RingElement::zero())
    }
}

impl<T, N> AstraPrep<T, N>
where
    T: IntRing2k,
    N: Network,
    Standard: Distribution<T>,
{
    /// Creates the A-variant preprocessing engine with a fresh seed.
    pub fn new(net: N, options: AstraOptions) -> Result<Self> {
        Self::with_seed(net, options, RngType::from_entropy().gen::<Seed>())
    }

    /// Creates the A-variant preprocessing engine deterministically from
    /// `seed`.
    pub fn with_seed(net: N, options: AstraOptions, seed: Seed) -> Result<Self> {
        Self::new_internal(
            net,
            options,
            seed,
            EngineKind::AstraPrep,
            "Astra",
            format!("astra-{}", T::K),
        )
    }

    fn pre_element(&mut self, res: &mut AstraPrepShare<T>) {
        if self.my_num == 0 {
            *res.a_mut() = self.prngs.random_element(0);
            *res.b_mut() = self.prngs.random_element(1);
        } else {
            *res.b_mut() = self.prngs.random_element(2 - self.my_num);
        }
    }

    fn pre_gamma(&mut self, res: &AstraPrepShare<T>, input: RingElement<T>) {
        if self.my_num < 2 {
            let gamma = self.prngs.random_element(self.my_num);
            if self.my_num == 0 {
                let masked = input - gamma;
                self.os.store_no_resize(&masked);
            } else {
                self.post(res, gamma);
            }
        }
    }

    fn post(&mut self, res: &AstraPrepShare<T>, gamma: RingElement<T>) {
        self.os_prep.store_no_resize(&gamma);
        self.os_prep.store_no_resize(&res.neg_lambda());
    }

    /// Runs the preprocessing multiplication round: the dealer ships the
    /// masked mask products to P2, the compute parties store `(γ, mask)`
    /// pairs for the online phase.
    pub fn exchange(&mut self) -> Result<()> {
        code_location!(self.options);
        if self.options.verbose_astra {
            tracing::debug!(target: "astra", "astra prep exchange {}", self.inputs.len());
        }
        self.set_state(MulState::Exchanging);
        debug_assert!(self.results.is_empty());

        self.n_mults += self.input_pairs.len();
        let total = self.inputs.len() + self.input_pairs.len();
        self.results.reserve(total);

        if self.my_num == 0 {
            self.os.reset_write_head();
            self.os.reserve::<RingElement<T>>(total);
        } else {
            self.os_prep.reset_write_head();
            self.os_prep.reserve::<RingElement<T>>(2 * total);
        }

        let inputs = std::mem::take(&mut self.inputs);
        for input in &inputs {
            let mut res = AstraPrepShare::default();
            self.pre_element(&mut res);
            self.pre_gamma(&res, *input);
            self.results.push(res);
        }
        let pairs = std::mem::take(&mut self.input_pairs);
        for (x, y) in &pairs {
            let input = AstraPrepShare::local_mul(self.my_num, x, y);
            let mut res = AstraPrepShare::default();
            self.pre_element(&mut res);
            self.pre_gamma(&res, input);
            self.results.push(res);
        }

        if self.my_num == 0 {
            self.os.send(&self.net, 2)?;
        } else if self.my_num == 2 {
            self.os.recv(&self.net, 0)?;
            if self.os.left() < RingElement::<T>::SIZE * self.results.len() {
                return Err(AstraError::insufficient_data("Astra"));
            }
            let mut os = std::mem::take(&mut self.os);
            let gammas: Vec<RingElement<T>> =
                (0..self.results.len()).map(|_| os.get_no_check()).collect();
            self.os = os;
            self.results.reset();
            for gamma in gammas {
                let res = self.results.next();
                self.post(&res, gamma);
            }
        }

        let os_prep = std::mem::take(&mut self.os_prep);
        self.store(&os_prep)?;
        self.os_prep = os_prep;

        self.results.reset();
        self.set_state(MulState::Finalizing);
        self.maybe_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_net::local::LocalNetwork;

    #[test]
    fn rejects_two_party_network() {
        let [n0, _n1] = LocalNetwork::new_2_parties();
        assert!(AstraPrep::<u64, _>::new(n0, AstraOptions::default()).is_err());
    }
}
