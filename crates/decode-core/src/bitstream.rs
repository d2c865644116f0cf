//! Bounded encoded-bitstream buffer and its feeder.

use std::fmt;
use std::io::{self, ErrorKind, Read};
use std::str::FromStr;

/// Elementary stream codec tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Avc,
    Hevc,
    Av1,
}

impl Codec {
    pub fn as_str(self) -> &'static str {
        match self {
            Codec::Avc => "avc",
            Codec::Hevc => "hevc",
            Codec::Av1 => "av1",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avc" | "h264" => Ok(Codec::Avc),
            "hevc" | "h265" => Ok(Codec::Hevc),
            "av1" => Ok(Codec::Av1),
            other => Err(format!("unknown codec '{other}' (expected avc, hevc or av1)")),
        }
    }
}

/// Fixed-capacity encoded-bitstream buffer.
///
/// The feeder appends bytes after the unconsumed tail; the decode
/// submission consumes from the front by advancing the offset. The data
/// bytes themselves are only ever written by the feeder.
pub struct Bitstream {
    data: Box<[u8]>,
    offset: usize,
    len: usize,
    codec: Codec,
}

impl Bitstream {
    pub fn with_capacity(capacity: usize, codec: Codec) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            offset: 0,
            len: 0,
            codec,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Unconsumed byte count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes not yet consumed by the decoder.
    pub fn unconsumed(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Advance the consumed offset. Called by the decode submission as
    /// it eats input; capped at the unconsumed length.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.offset += n;
        self.len -= n;
    }

    /// Move the unconsumed tail to the front of the buffer.
    fn compact(&mut self) {
        if self.offset > 0 {
            self.data.copy_within(self.offset..self.offset + self.len, 0);
            self.offset = 0;
        }
    }
}

/// Outcome of a feeder refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// The buffer holds unconsumed bytes.
    Filled,
    /// The source is exhausted and the buffer is fully consumed.
    EndOfInput,
}

/// Refills a [`Bitstream`] from a sequential source of encoded bytes.
pub struct BitstreamFeeder<R> {
    source: R,
}

impl<R: Read> BitstreamFeeder<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Compact the buffer, then read until it is full or the source is
    /// exhausted. `EndOfInput` is reported only once no unconsumed
    /// bytes remain; a partially drained buffer at source EOF still
    /// counts as `Filled`.
    pub fn refill(&mut self, bitstream: &mut Bitstream) -> io::Result<FeedStatus> {
        bitstream.compact();
        while bitstream.len < bitstream.data.len() {
            match self.source.read(&mut bitstream.data[bitstream.len..]) {
                Ok(0) => break,
                Ok(n) => bitstream.len += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if bitstream.len == 0 {
            Ok(FeedStatus::EndOfInput)
        } else {
            Ok(FeedStatus::Filled)
        }
    }
}
