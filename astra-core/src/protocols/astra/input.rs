//! The private-input protocol.
//!
//! A cleartext owned by one online party becomes a share held by both. The
//! preprocessing side only counts inputs per owner and lays down the masks;
//! no cleartext exists before the online phase.

use num_traits::Zero;
use rand::distributions::{Distribution, Standard};

use super::error::AstraError;
use super::itervec::IterVec;
use super::online::OnlineEngine;
use super::options::code_location;
use super::prep::PrepEngine;
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::share::{OnlineShare, PrepShare, Share2k};
use super::stream::{OctetStream, Packable};
use super::Result;
use astra_net::Network;

/// Online side of the input protocol, shared by both protocol variants.
/// Players are addressed by their 0-based online index.
#[derive(Debug)]
pub struct OnlineInput<S, T: IntRing2k> {
    my_player: usize,
    send_os: OctetStream,
    recv_os: OctetStream,
    inputs: Vec<RingElement<T>>,
    my_results: IterVec<S>,
    results: IterVec<S>,
}

impl<S, T> OnlineInput<S, T>
where
    S: OnlineShare<T>,
    T: IntRing2k,
{
    /// An input machine for the engine's party.
    pub fn new<N: Network>(engine: &OnlineEngine<S, T, N>) -> Self {
        Self {
            my_player: engine.my_num() - 1,
            send_os: OctetStream::new(),
            recv_os: OctetStream::new(),
            inputs: Vec::new(),
            my_results: IterVec::default(),
            results: IterVec::default(),
        }
    }

    /// Clears all queues for a fresh input round.
    pub fn reset_all(&mut self) {
        self.send_os.reset_write_head();
        self.inputs.clear();
        self.my_results.clear();
        self.results.clear();
    }

    /// Queues one of this party's own cleartexts.
    pub fn add_mine(&mut self, input: RingElement<T>) {
        self.inputs.push(input);
    }

    /// Registers a pending input owned by online player `player` (0 or 1).
    pub fn add_other(&mut self, player: usize) {
        debug_assert!(player < 2 && player != self.my_player);
        self.results.push(S::default());
    }

    /// Runs the single input round: reads this party's masks from prep,
    /// broadcasts the masked cleartexts and receives the peer's batch.
    pub fn exchange<N: Network>(&mut self, engine: &mut OnlineEngine<S, T, N>) -> Result<()> {
        code_location!(engine.options());
        if engine.options().verbose_astra {
            tracing::debug!(target: "astra", "astra input exchange {}", self.inputs.len());
        }

        let mut prep_os = engine.read()?;
        self.my_results.reserve(self.inputs.len());
        self.send_os.reserve::<RingElement<T>>(self.inputs.len());

        if prep_os.left() < self.inputs.len() * RingElement::<T>::SIZE {
            return Err(AstraError::insufficient_data("input"));
        }

        for input in &self.inputs {
            let gamma: RingElement<T> = prep_os.get_no_check();
            let masked = *input - gamma;
            self.send_os.store_no_resize(&masked);
            self.my_results.push(S::from_slots(RingElement::zero(), gamma));
        }
        debug_assert_eq!(
            self.send_os.left(),
            self.my_results.len() * RingElement::<T>::SIZE
        );
        debug_assert_eq!(prep_os.left(), 0);

        self.send_os
            .exchange(engine.network(), engine.peer(), &mut self.recv_os)?;

        if self.recv_os.left() < self.results.len() * RingElement::<T>::SIZE {
            return Err(AstraError::insufficient_data("Astra input"));
        }

        self.results.reset();
        self.my_results.reset();
        Ok(())
    }

    /// Pops the next share of an input owned by online player `player`, in
    /// the order the inputs were queued.
    pub fn finalize(&mut self, player: usize) -> S {
        if player == self.my_player {
            let res = self.my_results.next();
            let m = self.send_os.get_no_check();
            S::finalize_input_mine(m, res.b())
        } else {
            let _ = self.results.next();
            let m = self.recv_os.get_no_check();
            S::finalize_input_other(m)
        }
    }
}

/// Preprocessing side of the input protocol: counts inputs per owner and
/// writes each owner's masks to its prep file.
#[derive(Debug)]
pub struct PrepInput<S, T: IntRing2k> {
    my_num: usize,
    prep_os: OctetStream,
    results: [IterVec<S>; 3],
    n_inputs: [usize; 2],
    _marker: std::marker::PhantomData<T>,
}

impl<S, T> PrepInput<S, T>
where
    S: PrepShare<T>,
    T: IntRing2k,
    Standard: Distribution<T>,
{
    /// An input machine for the engine's party.
    pub fn new<N: Network>(engine: &PrepEngine<S, T, N>) -> Self {
        Self {
            my_num: engine.my_num(),
            prep_os: OctetStream::new(),
            results: Default::default(),
            n_inputs: [0; 2],
            _marker: std::marker::PhantomData,
        }
    }

    /// Clears all counters for a fresh input round.
    pub fn reset_all(&mut self) {
        self.prep_os.reset_write_head();
        self.n_inputs = [0; 2];
        for r in &mut self.results {
            r.clear();
        }
    }

    /// Counts one input this party will own online. The dealer owns no
    /// online inputs.
    pub fn add_mine(&mut self) {
        if self.my_num == 0 {
            panic!("should not be called");
        }
        self.add_other(self.my_num - 1);
    }

    /// Counts one input owned by online player `player` (0 or 1).
    pub fn add_other(&mut self, player: usize) {
        assert!(player < 2, "only the compute parties provide inputs");
        self.n_inputs[player] += 1;
    }

    /// Lays down the input masks: the dealer draws both mask components
    /// from the owner-matched PRNGs; each compute party draws its own
    /// masks and stores them for its online self.
    pub fn exchange<N: Network>(&mut self, engine: &mut PrepEngine<S, T, N>) -> Result<()> {
        code_location!(engine.options());
        if engine.options().verbose_astra {
            for (player, n) in self.n_inputs.iter().enumerate() {
                tracing::debug!(target: "astra", "astra input from {player} exchange {n}");
            }
        }

        for r in &mut self.results {
            r.clear();
        }

        if self.my_num == 0 {
            for player in 0..2 {
                let n = self.n_inputs[player];
                self.results[1 + player].reserve(n);
                for _ in 0..n {
                    let gamma = engine.prngs.random_element(player);
                    let mut res = S::default();
                    *match player {
                        0 => res.a_mut(),
                        _ => res.b_mut(),
                    } = gamma;
                    self.results[1 + player].push(res);
                }
            }
        } else {
            // the other online player's inputs carry no mask share here
            let other = usize::from(self.my_num == 1);
            let offset = 1 + usize::from(self.my_num == 2);
            for _ in 0..self.n_inputs[other] {
                self.results[offset].push(S::default());
            }

            // my own inputs
            let mine = self.my_num - 1;
            let n = self.n_inputs[mine];
            self.prep_os.reserve::<RingElement<T>>(n);
            self.results[0].reserve(n);
            for _ in 0..n {
                let gamma = engine.prngs.random_element(other);
                self.prep_os.store_no_resize(&gamma);
                self.results[0].push(S::from_slots(RingElement::zero(), gamma));
            }
        }

        engine.store(&self.prep_os)?;

        for r in &mut self.results {
            r.reset();
        }
        Ok(())
    }

    /// Pops the next share of an input owned by online player `player`
    /// (0 or 1).
    pub fn finalize(&mut self, player: usize) -> S {
        let offset = (player + 4 - self.my_num) % 3;
        self.finalize_offset(offset)
    }

    /// Pops by result-list offset (0 = own inputs).
    pub fn finalize_offset(&mut self, offset: usize) -> S {
        self.results[offset].next()
    }
}
