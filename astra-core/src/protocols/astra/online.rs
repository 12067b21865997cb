//! The online multiplication engine.
//!
//! [`OnlineEngine`] is generic over the share variant; everything the two
//! online compute parties do that does not depend on the variant lives
//! here, together with the A-variant specialization [`Astra`]. The engine
//! is an explicit state machine: `init_mul` starts collecting, `exchange`
//! performs exactly one network round, `finalize_mul` pops results in
//! queue order.

use std::fs::File;
use std::io::{BufWriter, Write};

use num_traits::Zero;

use super::error::AstraError;
use super::files::{filename, PrepReader};
use super::itervec::IterVec;
use super::options::{code_location, AstraOptions};
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::share::{AstraShare, OnlineShare, Share2k};
use super::stream::{OctetStream, Packable};
use super::{EngineKind, Result, ThreadGuard};
use astra_net::Network;

/// Where the engine stands in its multiplication cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulState {
    /// No cycle started yet.
    Idle,
    /// Collecting queued multiplications and dot products.
    Collecting,
    /// Inside the network round.
    Exchanging,
    /// Results ready to be popped.
    Finalizing,
}

/// The online engine for a two-party compute phase consuming prep files.
///
/// `S` selects the protocol variant through its share type.
#[derive(Debug)]
pub struct OnlineEngine<S, T: IntRing2k, N> {
    pub(crate) net: N,
    pub(crate) my_num: usize,
    pub(crate) options: AstraOptions,
    name: &'static str,
    protocol: String,
    suffix: String,
    prep: Option<PrepReader>,
    outputs: Option<BufWriter<File>>,
    pub(crate) os: OctetStream,
    pub(crate) os_prep: OctetStream,
    pub(crate) recv_os: OctetStream,
    pub(crate) cs_prep: OctetStream,
    pub(crate) inputs: Vec<RingElement<T>>,
    pub(crate) input_pairs: Vec<(S, S)>,
    pub(crate) results: IterVec<(S, RingElement<T>)>,
    pub(crate) n_mults: usize,
    state: MulState,
    _guard: ThreadGuard,
}

/// The A-variant online engine.
pub type Astra<T, N> = OnlineEngine<AstraShare<T>, T, N>;

impl<S, T, N> OnlineEngine<S, T, N>
where
    S: OnlineShare<T>,
    T: IntRing2k,
    N: Network,
{
    pub(crate) fn new_internal(
        net: N,
        options: AstraOptions,
        kind: EngineKind,
        name: &'static str,
        protocol: String,
    ) -> Result<Self> {
        if net.num_parties() != 2 {
            return Err(AstraError::Config(format!(
                "{name} online runs with two parties, got {}",
                net.num_parties()
            )));
        }
        let my_num = net.id() + 1;
        Ok(Self {
            net,
            my_num,
            options,
            name,
            protocol,
            suffix: String::new(),
            prep: None,
            outputs: None,
            os: OctetStream::new(),
            os_prep: OctetStream::new(),
            recv_os: OctetStream::new(),
            cs_prep: OctetStream::new(),
            inputs: Vec::new(),
            input_pairs: Vec::new(),
            results: IterVec::default(),
            n_mults: 0,
            state: MulState::Idle,
            _guard: ThreadGuard::acquire(kind),
        })
    }

    /// This party's protocol number (1 or 2).
    pub fn my_num(&self) -> usize {
        self.my_num
    }

    /// The network id of the other online party.
    pub(crate) fn peer(&self) -> usize {
        1 - self.net.id()
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

    pub(crate) fn set_state(&mut self, state: MulState) {
        self.state = state;
    }

    /// Re-targets prep and output files; the next read reopens them.
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
        self.prep = Some(PrepReader::open(&path)?);
        Ok(())
    }

    /// Reads the next length-prefixed chunk from the prep file.
    pub(crate) fn read(&mut self) -> Result<OctetStream> {
        if self.prep.is_none() {
            self.init_prep()?;
        }
        if self.options.verbose_astra {
            tracing::debug!(target: "astra", "{} prep read, thread {}", self.name, self.options.thread_num);
        }
        let mut os = OctetStream::new();
        self.prep.as_mut().expect("opened above").read(&mut os)?;
        Ok(os)
    }

    /// Reads one packed value from the prep file; the chunk must contain
    /// exactly one value.
    pub(crate) fn read_value<P: Packable>(&mut self) -> Result<P> {
        let mut os = self.read()?;
        let res = os.get::<P>()?;
        debug_assert_eq!(os.left(), 0);
        Ok(res)
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

    /// Alias of [`Self::prepare_mul`]; the reshare-skipping fast path
    /// belongs to the classical replicated protocol only.
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

    /// Closes the current dot product, flushing the accumulated local
    /// products as a single pseudo-input.
    pub fn next_dotprod(&mut self) {
        let mut acc = RingElement::zero();
        for (x, y) in &self.input_pairs {
            acc += S::local_mul(self.my_num, x, y);
        }
        self.inputs.push(acc);
        self.n_mults += 1;
        self.input_pairs.clear();
    }

    /// Pops the next multiplication result in queue order.
    pub fn finalize_mul(&mut self) -> S {
        debug_assert_eq!(self.state, MulState::Finalizing);
        self.results.next().0
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

    /// Reads one random share from the prep file.
    pub fn get_random(&mut self) -> Result<S> {
        self.read_value()
    }

    /// Reads `n` random shares of `n_bits`-bounded values from the prep
    /// file.
    pub fn randoms(&mut self, n: usize, _n_bits: usize) -> Result<Vec<S>> {
        let mut os = self.read()?;
        os.require::<S>(n)
            .map_err(|_| AstraError::insufficient_preprocessing())?;
        let res = (0..n).map(|_| os.get_no_check::<S>()).collect();
        debug_assert_eq!(os.left(), 0);
        Ok(res)
    }

    /// Records a batch of opened values for the preprocessing phase of the
    /// next run; only the first online party keeps the output file.
    pub fn sync(&mut self, values: &[RingElement<T>]) -> Result<()> {
        if self.my_num != 1 {
            return Ok(());
        }
        if self.outputs.is_none() {
            let path = filename(
                &self.options,
                &self.protocol,
                &self.suffix,
                "Outputs",
                self.my_num,
            );
            let file = File::create(&path).map_err(|e| {
                AstraError::Config(format!("cannot open output file {}: {e}", path.display()))
            })?;
            self.outputs = Some(BufWriter::new(file));
        }
        let mut os = OctetStream::new();
        os.store_vec(values);
        let outputs = self.outputs.as_mut().expect("opened above");
        os.output(outputs)?;
        outputs.flush()?;
        Ok(())
    }

    /// Receives a batch of values the preprocessing phase forwarded through
    /// the prep file.
    pub fn forward_sync(&mut self) -> Result<Vec<RingElement<T>>> {
        let mut os = self.read()?;
        let values = os.get_vec()?;
        debug_assert_eq!(os.left(), 0);
        Ok(values)
    }

    /// Reads the dealer-input mask batch for this cycle from prep.
    pub(crate) fn exchange_input0(&mut self, n: usize) -> Result<()> {
        self.cs_prep = self.read()?;
        self.cs_prep
            .require::<RingElement<T>>(n)
            .map_err(|_| AstraError::insufficient_data("dealer input"))?;
        Ok(())
    }

    /// Pops the next dealer-input share.
    pub(crate) fn post_input0(&mut self) -> S {
        S::from_input0(self.cs_prep.get_no_check())
    }

    pub(crate) fn init_input0(&mut self, _n: usize) {}

    pub(crate) fn finalize_input0(&mut self, _n: usize) -> Result<()> {
        debug_assert_eq!(self.cs_prep.left(), 0);
        Ok(())
    }
}

impl<T, N> Astra<T, N>
where
    T: IntRing2k,
    N: Network,
{
    /// Creates the A-variant online engine for this party.
    pub fn new(net: N, options: AstraOptions) -> Result<Self> {
        Self::new_internal(
            net,
            options,
            EngineKind::AstraOnline,
            "Astra",
            format!("astra-{}", T::K),
        )
    }

    fn pre(&mut self, input: RingElement<T>) -> AstraShare<T> {
        let gamma: RingElement<T> = self.os_prep.get_no_check();
        let slot1: RingElement<T> = self.os_prep.get_no_check();
        let m_z = input - slot1 + gamma;
        self.os.store_no_resize(&m_z);
        AstraShare::from_slots(m_z, slot1)
    }

    /// Runs the multiplication round: reads the prep correlation, sends
    /// this party's masked products to the peer in one message and merges
    /// the peer's batch into the results.
    pub fn exchange(&mut self) -> Result<()> {
        code_location!(self.options);
        if self.options.verbose_astra {
            tracing::debug!(target: "astra", "astra exchange {}", self.inputs.len());
        }
        self.state = MulState::Exchanging;
        debug_assert!(self.results.is_empty());

        let n_mults = self.inputs.len() + self.input_pairs.len();

        self.os_prep = self.read()?;
        self.os.reset_write_head();
        self.os.reserve::<RingElement<T>>(n_mults);

        if self.os_prep.left() < 2 * n_mults * RingElement::<T>::SIZE {
            return Err(AstraError::insufficient_preprocessing());
        }

        let inputs = std::mem::take(&mut self.inputs);
        for input in &inputs {
            let res = self.pre(*input);
            self.results.push((res, RingElement::zero()));
        }
        let pairs = std::mem::take(&mut self.input_pairs);
        for (x, y) in &pairs {
            let res = self.pre(AstraShare::local_mul(self.my_num, x, y));
            self.results.push((res, RingElement::zero()));
        }

        let os = std::mem::take(&mut self.os);
        os.exchange(&self.net, self.peer(), &mut self.recv_os)?;
        self.os = os;

        if self.recv_os.left() < RingElement::<T>::SIZE * self.results.len() {
            return Err(AstraError::insufficient_data("Astra"));
        }
        for res in self.results.iter_mut() {
            *res.0.a_mut() += self.recv_os.get_no_check::<RingElement<T>>();
        }

        debug_assert_eq!(self.os_prep.left(), 0);
        self.results.reset();
        self.state = MulState::Finalizing;
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

    /// One reduced product: the generator-side operand lives in the prep
    /// correlation, `bb` is this party's cleartext contribution. Returns
    /// the `(a, b, c)` shares entering the composition.
    pub(crate) fn pre_reduced_mul(
        &mut self,
        _aa: RingElement<T>,
        bb: RingElement<T>,
    ) -> (AstraShare<T>, AstraShare<T>, AstraShare<T>) {
        let mut a = AstraShare::default();
        let mut c = AstraShare::default();
        *a.b_mut() = self.os_prep.get_no_check();
        *c.b_mut() = self.os_prep.get_no_check();
        let m_i = bb * a.neg_lambda() - c.neg_lambda();
        self.os.store_no_resize(&m_i);
        let b = AstraShare::from_slots(bb, RingElement::zero());
        *c.a_mut() = m_i;
        self.results.push((AstraShare::default(), RingElement::zero()));
        (a, b, c)
    }

    /// The single network round of a reduced-multiplication batch.
    pub(crate) fn exchange_reduced_mul(&mut self, n_mul: usize) -> Result<()> {
        let os = std::mem::take(&mut self.os);
        os.exchange(&self.net, self.peer(), &mut self.recv_os)?;
        self.os = os;
        self.recv_os
            .require::<RingElement<T>>(n_mul)
            .map_err(|_| AstraError::insufficient_data("Astra"))?;
        self.results.reset();
        debug_assert_eq!(self.results.left(), n_mul);
        Ok(())
    }

    /// Pops one reduced product: the queued share and the peer's masked
    /// contribution.
    pub(crate) fn post_reduced_mul(&mut self) -> (AstraShare<T>, RingElement<T>) {
        let res = self.results.next().0;
        (res, self.recv_os.get_no_check())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astra_net::local::LocalNetwork;

    #[test]
    #[should_panic(expected = "there can only be one")]
    fn one_engine_per_thread() {
        let [n0, _n1] = LocalNetwork::new_2_parties();
        let [m0, _m1] = LocalNetwork::new_2_parties();
        let _a = Astra::<u64, _>::new(n0, AstraOptions::default()).unwrap();
        let _b = Astra::<u64, _>::new(m0, AstraOptions::default()).unwrap();
    }

    #[test]
    fn rejects_three_party_network() {
        let mut nets = LocalNetwork::new(3);
        let net = nets.remove(2);
        assert!(Astra::<u64, _>::new(net, AstraOptions::default()).is_err());
    }

    #[test]
    fn engine_numbers() {
        let [n0, n1] = LocalNetwork::new_2_parties();
        let a = Astra::<u64, _>::new(n0, AstraOptions::default()).unwrap();
        assert_eq!(a.my_num(), 1);
        assert_eq!(a.peer(), 1);
        assert_eq!(a.state(), MulState::Idle);
        drop(a);
        let b = Astra::<u64, _>::new(n1, AstraOptions::default()).unwrap();
        assert_eq!(b.my_num(), 2);
        assert_eq!(b.peer(), 0);
    }
}
