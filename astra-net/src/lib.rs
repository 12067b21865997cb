//! A synchronous networking layer for honest-majority MPC protocols.
//!
//! The protocol engines only need a reliable ordered byte transport between
//! parties, addressed by 0-based party id. This crate provides the [`Network`]
//! trait plus two implementations: a channel-backed [`local::LocalNetwork`]
//! for tests and single-machine runs, and a plain-TCP [`tcp::TcpNetwork`]
//! mesh. Session security (TLS etc.) is out of scope and left to the
//! deployment.
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::time::Duration;

pub mod local;
pub mod tcp;

/// How long sends and receives may block before giving up.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a single frame, as a safety net against corrupt length
/// prefixes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1 << 30;

/// A reliable, ordered, message-oriented transport between `n` parties.
///
/// Implementations must deliver frames between any ordered pair of parties
/// in FIFO order. All methods take `&self` so that a send and a receive can
/// run concurrently from scoped threads (full-duplex exchange).
pub trait Network: Send + Sync {
    /// This party's 0-based id.
    fn id(&self) -> usize;

    /// Number of parties in this network.
    fn num_parties(&self) -> usize;

    /// Sends one frame to party `to`.
    fn send(&self, to: usize, data: &[u8]) -> eyre::Result<()>;

    /// Receives the next frame from party `from`.
    fn recv(&self, from: usize) -> eyre::Result<Vec<u8>>;

    /// Whether the transport is encrypted. Protocol bootstrap warns on
    /// plaintext channels but does not abort.
    fn is_encrypted(&self) -> bool {
        false
    }

    /// Per-peer traffic counters.
    fn connection_stats(&self) -> ConnectionStats;
}

/// Sent/received byte and message counts per peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// The id of the party these stats belong to.
    pub my_id: usize,
    /// Maps peer id to (sent bytes, sent frames, received bytes, received frames).
    pub stats: BTreeMap<usize, PeerStats>,
}

/// Traffic counters towards one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    /// Bytes sent to the peer.
    pub sent_bytes: usize,
    /// Frames sent to the peer.
    pub sent_frames: usize,
    /// Bytes received from the peer.
    pub recv_bytes: usize,
    /// Frames received from the peer.
    pub recv_frames: usize,
}

impl ConnectionStats {
    /// Total frames sent to all peers.
    pub fn total_sent_frames(&self) -> usize {
        self.stats.values().map(|s| s.sent_frames).sum()
    }

    /// Total bytes sent to all peers.
    pub fn total_sent_bytes(&self) -> usize {
        self.stats.values().map(|s| s.sent_bytes).sum()
    }
}

impl std::fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, s) in &self.stats {
            writeln!(
                f,
                "party {} <-> {id}: sent {} bytes / {} frames, recv {} bytes / {} frames",
                self.my_id, s.sent_bytes, s.sent_frames, s.recv_bytes, s.recv_frames
            )?;
        }
        Ok(())
    }
}
