//! Growable byte buffer with separate read and write cursors.
//!
//! This is the wire-format primitive of the whole crate: everything that
//! crosses a socket or a prep file is staged in an [`OctetStream`]. Frames
//! are length-prefixed with eight little-endian bytes when sent or stored.
//!
//! A parallel bit-packing sub-stream accumulates 1..=7-bit appends in a
//! one-byte staging buffer. The staging buffer must be flushed before the
//! next byte-aligned append; reading mirrors this.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use num_bigint::{BigInt, Sign};

use super::error::AstraError;
use super::Result;
use astra_net::Network;

type Blake2b256 = Blake2b<U32>;

/// Values with a fixed-size encoding that can be staged into an
/// [`OctetStream`].
pub trait Packable: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Appends the encoding of `self`.
    fn pack(&self, os: &mut OctetStream);

    /// Consumes and decodes one value.
    fn unpack(os: &mut OctetStream) -> Result<Self>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BitBuffer {
    n: u8,
    buffer: u8,
}

/// Buffer for network communication and prep files, with a read pointer for
/// sequential consumption.
#[derive(Debug, Default, Clone)]
pub struct OctetStream {
    data: Vec<u8>,
    ptr: usize,
    write_bits: BitBuffer,
    read_bits: BitBuffer,
}

impl OctetStream {
    /// An empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            ..Self::default()
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read.
    pub fn left(&self) -> usize {
        self.data.len() - self.ptr
    }

    /// The whole written content.
    pub fn data(&self) -> &[u8] {
        debug_assert_eq!(self.write_bits.n, 0, "unflushed bit sub-stream");
        &self.data
    }

    /// Restarts reading from the beginning.
    pub fn reset_read_head(&mut self) {
        self.ptr = 0;
        self.read_bits = BitBuffer::default();
    }

    /// Drops the content but keeps the allocation.
    pub fn reset_write_head(&mut self) {
        self.data.clear();
        self.write_bits = BitBuffer::default();
        self.reset_read_head();
    }

    /// Pre-allocates room for `n` additional values of type `P`.
    pub fn reserve<P: Packable>(&mut self, n: usize) {
        self.data.reserve(n * P::SIZE);
    }

    /// Errors with "insufficient data" unless `n` values of type `P` are
    /// left to read.
    pub fn require<P: Packable>(&self, n: usize) -> Result<()> {
        if self.left() < n * P::SIZE {
            Err(AstraError::insufficient_data("octet stream"))
        } else {
            Ok(())
        }
    }

    /// Appends raw bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.write_bits.n, 0, "unflushed bit sub-stream");
        self.data.extend_from_slice(bytes);
    }

    /// Appends raw bytes; the caller guarantees capacity suffices.
    pub fn append_no_resize(&mut self, bytes: &[u8]) {
        debug_assert!(self.data.len() + bytes.len() <= self.data.capacity());
        self.append(bytes);
    }

    /// Appends `n` zero bytes and returns them for in-place encoding.
    pub(crate) fn append_uninit(&mut self, n: usize) -> &mut [u8] {
        debug_assert_eq!(self.write_bits.n, 0, "unflushed bit sub-stream");
        let start = self.data.len();
        self.data.resize(start + n, 0);
        &mut self.data[start..]
    }

    /// Consumes `n` raw bytes.
    pub fn consume(&mut self, n: usize) -> Result<&[u8]> {
        debug_assert_eq!(self.read_bits.n, 0, "unflushed bit sub-stream");
        if self.left() < n {
            return Err(AstraError::insufficient_data("octet stream"));
        }
        let start = self.ptr;
        self.ptr += n;
        Ok(&self.data[start..self.ptr])
    }

    /// Appends an integer as `n_bytes` little-endian bytes.
    pub fn store_int(&mut self, value: u64, n_bytes: usize) {
        debug_assert!(n_bytes <= 8);
        self.append(&value.to_le_bytes()[..n_bytes]);
    }

    /// Consumes an `n_bytes` little-endian integer.
    pub fn get_int(&mut self, n_bytes: usize) -> Result<u64> {
        debug_assert!(n_bytes <= 8);
        let mut bytes = [0u8; 8];
        bytes[..n_bytes].copy_from_slice(self.consume(n_bytes)?);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Appends a length-prefixed byte string.
    pub fn store_bytes(&mut self, bytes: &[u8]) {
        self.store_int(bytes.len() as u64, 8);
        self.append(bytes);
    }

    /// Consumes a length-prefixed byte string.
    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_int(8)? as usize;
        if self.left() < len {
            return Err(AstraError::wrong_format("byte string length"));
        }
        Ok(self.consume(len)?.to_vec())
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn store_string(&mut self, s: &str) {
        self.store_bytes(s.as_bytes());
    }

    /// Consumes a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes).map_err(|_| AstraError::wrong_format("string"))
    }

    /// Appends a signed big integer: one sign byte (0 or 1), then the
    /// length-prefixed little-endian magnitude.
    pub fn store_bigint(&mut self, value: &BigInt) {
        let (sign, magnitude) = value.to_bytes_le();
        self.store_int(u64::from(sign == Sign::Minus), 1);
        self.store_bytes(&magnitude);
    }

    /// Consumes a signed big integer.
    pub fn get_bigint(&mut self) -> Result<BigInt> {
        let sign = self.get_int(1)?;
        if sign > 1 {
            return Err(AstraError::wrong_format("bigint sign byte"));
        }
        let magnitude = self.get_bytes()?;
        let sign = if sign == 1 { Sign::Minus } else { Sign::Plus };
        Ok(BigInt::from_bytes_le(sign, &magnitude))
    }

    /// Appends a packable value.
    pub fn store<P: Packable>(&mut self, value: &P) {
        value.pack(self);
    }

    /// Appends a packable value; the caller guarantees capacity suffices.
    pub fn store_no_resize<P: Packable>(&mut self, value: &P) {
        debug_assert!(self.data.len() + P::SIZE <= self.data.capacity());
        value.pack(self);
    }

    /// Consumes a packable value.
    pub fn get<P: Packable>(&mut self) -> Result<P> {
        P::unpack(self)
    }

    /// Consumes a packable value after a prior [`Self::require`].
    pub fn get_no_check<P: Packable>(&mut self) -> P {
        debug_assert!(self.left() >= P::SIZE, "get_no_check without require");
        P::unpack(self).expect("checked by require")
    }

    /// Appends a length-prefixed vector of packable values.
    pub fn store_vec<P: Packable>(&mut self, values: &[P]) {
        self.store_int(values.len() as u64, 8);
        self.reserve::<P>(values.len());
        for value in values {
            value.pack(self);
        }
    }

    /// Consumes a length-prefixed vector of packable values.
    pub fn get_vec<P: Packable>(&mut self) -> Result<Vec<P>> {
        let n = self.get_int(8)? as usize;
        self.require::<P>(n)?;
        (0..n).map(|_| P::unpack(self)).collect()
    }

    /// Appends the low `n` bits of `value` (1 <= n <= 7) to the bit
    /// sub-stream.
    pub fn store_bits(&mut self, value: u8, n: usize) {
        debug_assert!(n >= 1 && n <= 7);
        for i in 0..n {
            let bit = (value >> i) & 1;
            self.write_bits.buffer |= bit << self.write_bits.n;
            self.write_bits.n += 1;
            if self.write_bits.n == 8 {
                self.data.push(self.write_bits.buffer);
                self.write_bits = BitBuffer::default();
            }
        }
    }

    /// Appends one bit to the bit sub-stream.
    pub fn store_bit(&mut self, bit: bool) {
        self.store_bits(bit as u8, 1);
    }

    /// Consumes `n` bits (1 <= n <= 7) from the bit sub-stream.
    pub fn get_bits(&mut self, n: usize) -> Result<u8> {
        debug_assert!(n >= 1 && n <= 7);
        let mut value = 0u8;
        for i in 0..n {
            if self.read_bits.n == 0 {
                let byte = {
                    debug_assert!(self.write_bits.n == 0);
                    if self.left() < 1 {
                        return Err(AstraError::insufficient_data("octet stream"));
                    }
                    let b = self.data[self.ptr];
                    self.ptr += 1;
                    b
                };
                self.read_bits = BitBuffer { n: 8, buffer: byte };
            }
            value |= (self.read_bits.buffer & 1) << i;
            self.read_bits.buffer >>= 1;
            self.read_bits.n -= 1;
        }
        Ok(value)
    }

    /// Consumes one bit from the bit sub-stream.
    pub fn get_bit(&mut self) -> Result<bool> {
        Ok(self.get_bits(1)? != 0)
    }

    /// Pads the write-side bit staging buffer to a full byte and discards
    /// read-side staging bits, restoring byte alignment on both cursors.
    pub fn flush_bits(&mut self) {
        if self.write_bits.n > 0 {
            self.data.push(self.write_bits.buffer);
            self.write_bits = BitBuffer::default();
        }
        self.read_bits = BitBuffer::default();
    }

    /// BLAKE2b digest of the content, 32 bytes.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Blake2b256::new();
        hasher.update(&self.data);
        hasher.finalize().into()
    }

    /// Writes the stream with its 8-byte little-endian length prefix.
    pub fn output<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&(self.data.len() as u64).to_le_bytes())?;
        writer.write_all(&self.data)
    }

    /// Replaces the content with one length-prefixed stream read from
    /// `reader`.
    pub fn input<R: std::io::Read>(&mut self, reader: &mut R) -> std::io::Result<()> {
        let mut prefix = [0u8; 8];
        reader.read_exact(&mut prefix)?;
        let len = u64::from_le_bytes(prefix) as usize;
        self.reset_write_head();
        self.data.resize(len, 0);
        reader.read_exact(&mut self.data)
    }

    /// Sends the stream to party `to`.
    pub fn send<N: Network>(&self, net: &N, to: usize) -> Result<()> {
        net.send(to, self.data())?;
        Ok(())
    }

    /// Replaces the content with the next frame from party `from`.
    pub fn recv<N: Network>(&mut self, net: &N, from: usize) -> Result<()> {
        self.data = net.recv(from)?;
        self.ptr = 0;
        self.write_bits = BitBuffer::default();
        self.read_bits = BitBuffer::default();
        Ok(())
    }

    /// Full-duplex exchange: sends this stream to `with` while receiving a
    /// frame from the same party into `recv_os`.
    pub fn exchange<N: Network>(&self, net: &N, with: usize, recv_os: &mut OctetStream) -> Result<()> {
        let sent = std::thread::scope(|scope| {
            let handle = scope.spawn(|| self.send(net, with));
            let received = recv_os.recv(net, with);
            let sent = handle.join().expect("send thread never panics");
            received?;
            sent
        });
        sent
    }

    /// Ring pass-around: sends this stream `offset` parties ahead while
    /// receiving from `offset` parties behind.
    pub fn pass_around<N: Network>(
        &self,
        net: &N,
        offset: usize,
        recv_os: &mut OctetStream,
    ) -> Result<()> {
        let n = net.num_parties();
        let to = (net.id() + offset) % n;
        let from = (net.id() + n - offset % n) % n;
        let sent = std::thread::scope(|scope| {
            let handle = scope.spawn(|| self.send(net, to));
            let received = recv_os.recv(net, from);
            let sent = handle.join().expect("send thread never panics");
            received?;
            sent
        });
        sent
    }
}

impl PartialEq for OctetStream {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for OctetStream {}
