//! Public reconstruction.
//!
//! Each online party derives a summand from its share such that the two
//! summands add up to the cleartext, then the parties swap summand batches
//! in one all-to-all pass and sum.

use super::error::AstraError;
use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::share::OnlineShare;
use super::stream::{OctetStream, Packable};
use super::Result;
use astra_net::Network;

/// Opens a batch of shares in one round between the two online parties.
pub fn open_many<S, T, N>(net: &N, secrets: &[S]) -> Result<Vec<RingElement<T>>>
where
    S: OnlineShare<T>,
    T: IntRing2k,
    N: Network,
{
    let my_num = net.id() + 1;
    let peer = 1 - net.id();

    let mut os = OctetStream::new();
    os.reserve::<RingElement<T>>(secrets.len());
    for secret in secrets {
        os.store_no_resize(&secret.summand(my_num));
    }

    let mut recv_os = OctetStream::new();
    os.exchange(net, peer, &mut recv_os)?;

    if recv_os.left() < secrets.len() * RingElement::<T>::SIZE {
        return Err(AstraError::insufficient_data("opening"));
    }

    let values = secrets
        .iter()
        .map(|secret| secret.summand(my_num) + recv_os.get_no_check::<RingElement<T>>())
        .collect();
    Ok(values)
}

/// Opens a single share.
pub fn open<S, T, N>(net: &N, secret: S) -> Result<RingElement<T>>
where
    S: OnlineShare<T>,
    T: IntRing2k,
    N: Network,
{
    let mut values = open_many(net, &[secret])?;
    Ok(values.pop().expect("one secret, one value"))
}
