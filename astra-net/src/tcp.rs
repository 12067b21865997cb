//! Plain-TCP mesh network.
//!
//! Frames are length-prefixed with eight little-endian bytes, matching the
//! protocol wire format. Each incoming stream is drained by a reader thread
//! into a channel so that `recv` never blocks a concurrent `send`.

use std::cmp::Ordering as CmpOrdering;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::Receiver;
use eyre::ContextCompat;
use intmap::IntMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    ConnectionStats, Network, PeerStats, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_MAX_FRAME_LENGTH,
};

/// One party in the mesh.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TcpParty {
    /// 0-based party id.
    pub id: usize,
    /// Host name or address, including port.
    pub address: String,
}

/// Configuration for [`TcpNetwork::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// All parties of the mesh, in id order.
    pub parties: Vec<TcpParty>,
    /// Our own id.
    pub my_id: usize,
    /// The address we listen on.
    pub bind_addr: SocketAddr,
    /// Connect/receive timeout; defaults to [`DEFAULT_CONNECTION_TIMEOUT`].
    pub timeout: Option<Duration>,
    /// Frame size bound; defaults to [`DEFAULT_MAX_FRAME_LENGTH`].
    pub max_frame_length: Option<usize>,
}

struct Peer {
    stream: Mutex<TcpStream>,
    sent_bytes: AtomicUsize,
    sent_frames: AtomicUsize,
}

struct Incoming {
    queue: Receiver<eyre::Result<Vec<u8>>>,
    recv_bytes: AtomicUsize,
    recv_frames: AtomicUsize,
}

/// A fully connected mesh over [`TcpStream`]s.
pub struct TcpNetwork {
    id: usize,
    num_parties: usize,
    timeout: Duration,
    max_frame_length: usize,
    send: IntMap<Peer>,
    recv: IntMap<Incoming>,
}

impl TcpNetwork {
    /// Bind, connect to every lower-id party and accept every higher-id one.
    pub fn connect(config: TcpConfig) -> eyre::Result<Self> {
        let timeout = config.timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        let max_frame_length = config.max_frame_length.unwrap_or(DEFAULT_MAX_FRAME_LENGTH);
        let id = config.my_id;
        let listener = TcpListener::bind(config.bind_addr)?;

        let mut net = Self {
            id,
            num_parties: config.parties.len(),
            timeout,
            max_frame_length,
            send: IntMap::new(),
            recv: IntMap::new(),
        };

        for party in &config.parties {
            match id.cmp(&party.id) {
                CmpOrdering::Less => {
                    let addr = party
                        .address
                        .to_socket_addrs()?
                        .next()
                        .context("no address for party")?;
                    let stream = Self::connect_with_retry(addr, timeout)?;
                    stream.set_nodelay(true)?;
                    let mut stream = stream;
                    stream.write_u64::<LittleEndian>(id as u64)?;
                    net.add_peer(party.id, stream)?;
                }
                CmpOrdering::Greater => {
                    let (mut stream, _) = listener.accept()?;
                    stream.set_nodelay(true)?;
                    let other_id = stream.read_u64::<LittleEndian>()? as usize;
                    net.add_peer(other_id, stream)?;
                }
                CmpOrdering::Equal => {}
            }
        }

        Ok(net)
    }

    fn connect_with_retry(addr: SocketAddr, timeout: Duration) -> eyre::Result<TcpStream> {
        let start = Instant::now();
        loop {
            if let Ok(stream) = TcpStream::connect_timeout(&addr, timeout) {
                return Ok(stream);
            }
            if start.elapsed() > timeout {
                eyre::bail!("timeout while connecting to {addr}");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn add_peer(&mut self, other_id: usize, stream: TcpStream) -> eyre::Result<()> {
        let mut reader = stream.try_clone()?;
        let max_frame_length = self.max_frame_length;
        let (tx, rx) = crossbeam_channel::bounded(32);
        std::thread::spawn(move || loop {
            let frame = read_frame(&mut reader, max_frame_length);
            if tx.send(frame).is_err() {
                break;
            }
        });
        self.send.insert(
            other_id as u64,
            Peer {
                stream: Mutex::new(stream),
                sent_bytes: AtomicUsize::new(0),
                sent_frames: AtomicUsize::new(0),
            },
        );
        self.recv.insert(
            other_id as u64,
            Incoming {
                queue: rx,
                recv_bytes: AtomicUsize::new(0),
                recv_frames: AtomicUsize::new(0),
            },
        );
        Ok(())
    }
}

impl Network for TcpNetwork {
    fn id(&self) -> usize {
        self.id
    }

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn send(&self, to: usize, data: &[u8]) -> eyre::Result<()> {
        if data.len() > self.max_frame_length {
            eyre::bail!("frame len {} > max {}", data.len(), self.max_frame_length);
        }
        let peer = self.send.get(to as u64).context("party id out-of-bounds")?;
        peer.sent_bytes.fetch_add(data.len(), Ordering::Relaxed);
        peer.sent_frames.fetch_add(1, Ordering::Relaxed);
        let mut stream = peer.stream.lock();
        stream.write_u64::<LittleEndian>(data.len() as u64)?;
        stream.write_all(data)?;
        Ok(())
    }

    fn recv(&self, from: usize) -> eyre::Result<Vec<u8>> {
        let incoming = self.recv.get(from as u64).context("party id out-of-bounds")?;
        let data = incoming.queue.recv_timeout(self.timeout)??;
        incoming.recv_bytes.fetch_add(data.len(), Ordering::Relaxed);
        incoming.recv_frames.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    fn connection_stats(&self) -> ConnectionStats {
        let mut stats = std::collections::BTreeMap::new();
        for id in 0..self.num_parties {
            if id == self.id {
                continue;
            }
            let (peer, incoming) = match (self.send.get(id as u64), self.recv.get(id as u64)) {
                (Some(peer), Some(incoming)) => (peer, incoming),
                _ => continue,
            };
            stats.insert(
                id,
                PeerStats {
                    sent_bytes: peer.sent_bytes.load(Ordering::Relaxed),
                    sent_frames: peer.sent_frames.load(Ordering::Relaxed),
                    recv_bytes: incoming.recv_bytes.load(Ordering::Relaxed),
                    recv_frames: incoming.recv_frames.load(Ordering::Relaxed),
                },
            );
        }
        ConnectionStats {
            my_id: self.id,
            stats,
        }
    }
}

fn read_frame(stream: &mut TcpStream, max_frame_length: usize) -> eyre::Result<Vec<u8>> {
    let len = stream.read_u64::<LittleEndian>()? as usize;
    if len > max_frame_length {
        eyre::bail!("frame len {len} > max {max_frame_length}");
    }
    let mut data = vec![0; len];
    stream.read_exact(&mut data)?;
    Ok(data)
}
