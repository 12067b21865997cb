//! Channel-backed network for tests and single-machine runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use eyre::ContextCompat;
use intmap::IntMap;

use crate::{ConnectionStats, Network, PeerStats, DEFAULT_CONNECTION_TIMEOUT};

#[derive(Debug, Default)]
struct Counters {
    bytes: AtomicUsize,
    frames: AtomicUsize,
}

impl Counters {
    fn bump(&self, len: usize) {
        self.bytes.fetch_add(len, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// An in-process network where every ordered party pair is connected by an
/// unbounded channel.
#[derive(Debug)]
pub struct LocalNetwork {
    id: usize,
    num_parties: usize,
    timeout: Duration,
    send: IntMap<(Sender<Vec<u8>>, Counters)>,
    recv: IntMap<(Receiver<Vec<u8>>, Counters)>,
}

impl LocalNetwork {
    /// Create connected [`LocalNetwork`]s for `num_parties` parties.
    pub fn new(num_parties: usize) -> Vec<Self> {
        Self::new_with_timeout(num_parties, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Create connected [`LocalNetwork`]s with a custom receive timeout.
    pub fn new_with_timeout(num_parties: usize, timeout: Duration) -> Vec<Self> {
        let mut senders: Vec<IntMap<(Sender<Vec<u8>>, Counters)>> =
            (0..num_parties).map(|_| IntMap::new()).collect();
        let mut receivers: Vec<IntMap<(Receiver<Vec<u8>>, Counters)>> =
            (0..num_parties).map(|_| IntMap::new()).collect();

        for i in 0..num_parties {
            for j in 0..num_parties {
                if i != j {
                    let (tx, rx) = crossbeam_channel::unbounded();
                    senders[i].insert(j as u64, (tx, Counters::default()));
                    receivers[j].insert(i as u64, (rx, Counters::default()));
                }
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(id, (send, recv))| LocalNetwork {
                id,
                num_parties,
                timeout,
                send,
                recv,
            })
            .collect()
    }

    /// The three prep-phase parties.
    pub fn new_3_parties() -> [Self; 3] {
        Self::new(3).try_into().expect("correct len")
    }

    /// The two online parties.
    pub fn new_2_parties() -> [Self; 2] {
        Self::new(2).try_into().expect("correct len")
    }
}

impl Network for LocalNetwork {
    fn id(&self) -> usize {
        self.id
    }

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn send(&self, to: usize, data: &[u8]) -> eyre::Result<()> {
        let (sender, counters) = self.send.get(to as u64).context("party id out-of-bounds")?;
        counters.bump(data.len());
        sender.send(data.to_owned())?;
        Ok(())
    }

    fn recv(&self, from: usize) -> eyre::Result<Vec<u8>> {
        let (receiver, counters) = self.recv.get(from as u64).context("party id out-of-bounds")?;
        let data = receiver.recv_timeout(self.timeout)?;
        counters.bump(data.len());
        Ok(data)
    }

    fn connection_stats(&self) -> ConnectionStats {
        let mut stats = std::collections::BTreeMap::new();
        for id in 0..self.num_parties {
            if id == self.id {
                continue;
            }
            let sent = &self.send.get(id as u64).expect("peer is connected").1;
            let recv = &self.recv.get(id as u64).expect("peer is connected").1;
            stats.insert(
                id,
                PeerStats {
                    sent_bytes: sent.bytes.load(Ordering::Relaxed),
                    sent_frames: sent.frames.load(Ordering::Relaxed),
                    recv_bytes: recv.bytes.load(Ordering::Relaxed),
                    recv_frames: recv.frames.load(Ordering::Relaxed),
                },
            );
        }
        ConnectionStats {
            my_id: self.id,
            stats,
        }
    }
}
