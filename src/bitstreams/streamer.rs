//! The bit streamer: a cached bit-serial reader over a byte buffer.

use std::marker::PhantomData;

use crate::bitstreams::{BitOrder, BitStreamCache, MAX_GET_BITS};
use crate::error::{CodecError, Result};

/// Reads 1..=32 bits at a time from a byte buffer under a chosen bit
/// order. Refills a 64-bit cache in chunks of
/// `O::MAX_PROCESS_BYTES` bytes; near the end of the input a
/// zero-padded temporary keeps the fill invariants without reading out
/// of bounds.
pub struct BitStreamer<'a, O: BitOrder> {
    cache: O::Cache,
    input: &'a [u8],
    /// Byte offset of the next refill, may run past `input.len()` into
    /// the virtual zero padding.
    pos: usize,
    end_of_stream_pos: Option<usize>,
    _order: PhantomData<O>,
}

impl<'a, O: BitOrder> BitStreamer<'a, O> {
    pub fn new(input: &'a [u8]) -> Result<Self> {
        if input.len() < O::MAX_PROCESS_BYTES {
            return Err(CodecError::InsufficientInput);
        }
        Ok(Self {
            cache: O::Cache::default(),
            input,
            pos: 0,
            end_of_stream_pos: None,
            _order: PhantomData,
        })
    }

    /// Ensure the cache holds at least `nbits` bits; no-op if it
    /// already does. A single refill always suffices for `nbits <= 32`.
    pub fn fill(&mut self, nbits: u32) -> Result<()> {
        debug_assert!(nbits >= 1 && nbits <= MAX_GET_BITS);

        if self.cache.fill_level() >= nbits {
            return Ok(());
        }

        let refill = if self.pos + O::MAX_PROCESS_BYTES <= self.input.len() {
            O::fill_cache(&mut self.cache, &self.input[self.pos..self.pos + O::MAX_PROCESS_BYTES])
        } else {
            // Note that in order to keep all fill-level invariants we
            // must allow to over-read past-the-end a bit.
            if self.pos > self.input.len() + 2 * O::MAX_PROCESS_BYTES {
                return Err(CodecError::EndOfStream);
            }
            let mut tmp = [0u8; 8];
            let avail = self.input.len().saturating_sub(self.pos);
            let n = avail.min(O::MAX_PROCESS_BYTES);
            if n > 0 {
                tmp[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            }
            O::fill_cache(&mut self.cache, &tmp[..O::MAX_PROCESS_BYTES])
        };

        match refill.end_of_stream_at {
            Some(rel) => {
                if self.end_of_stream_pos.is_none() {
                    self.end_of_stream_pos = Some(self.pos + rel);
                }
                // No further reading from this buffer shall happen:
                // claim the remaining bytes as consumed.
                self.pos = self.pos.max(self.input.len());
            }
            None => self.pos += refill.consumed,
        }
        Ok(())
    }

    /// Byte offset of the next unread input byte (one past the last
    /// chunk whose bits entered the cache).
    pub fn input_position(&self) -> usize {
        self.pos
    }

    /// The logical byte position a byte-aligned consumer would expect:
    /// `input_position() - fill/8`, or the recorded end-of-stream
    /// marker position once one has been detected.
    pub fn stream_position(&self) -> usize {
        match self.end_of_stream_pos {
            Some(pos) => pos,
            None => self.input_position() - (self.cache.fill_level() / 8) as usize,
        }
    }

    pub fn remaining_size(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    pub fn fill_level(&self) -> u32 {
        self.cache.fill_level()
    }

    #[inline]
    pub fn peek_bits_no_fill(&self, nbits: u32) -> u32 {
        self.cache.peek(nbits)
    }

    #[inline]
    pub fn skip_bits_no_fill(&mut self, nbits: u32) {
        self.cache.skip(nbits);
    }

    #[inline]
    pub fn get_bits_no_fill(&mut self, nbits: u32) -> u32 {
        let ret = self.peek_bits_no_fill(nbits);
        self.skip_bits_no_fill(nbits);
        ret
    }

    pub fn peek_bits(&mut self, nbits: u32) -> Result<u32> {
        self.fill(nbits)?;
        Ok(self.peek_bits_no_fill(nbits))
    }

    pub fn skip_bits(&mut self, nbits: u32) -> Result<()> {
        self.fill(nbits)?;
        self.skip_bits_no_fill(nbits);
        Ok(())
    }

    pub fn get_bits(&mut self, nbits: u32) -> Result<u32> {
        self.fill(nbits)?;
        Ok(self.get_bits_no_fill(nbits))
    }

    /// Skip an arbitrarily large number of *bytes*, not limited by the
    /// cache size.
    pub fn skip_bytes(&mut self, nbytes: usize) -> Result<()> {
        let mut remaining_bits = 8 * nbytes;
        while remaining_bits >= MAX_GET_BITS as usize {
            self.fill(MAX_GET_BITS)?;
            self.skip_bits_no_fill(MAX_GET_BITS);
            remaining_bits -= MAX_GET_BITS as usize;
        }
        if remaining_bits > 0 {
            self.fill(remaining_bits as u32)?;
            self.skip_bits_no_fill(remaining_bits as u32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstreams::{Jpeg, Lsb, Msb, Msb16, Msb32};

    #[test]
    fn rejects_short_input() {
        assert_eq!(
            BitStreamer::<Msb>::new(&[0u8; 3]).err(),
            Some(CodecError::InsufficientInput)
        );
        assert_eq!(
            BitStreamer::<Jpeg>::new(&[0u8; 7]).err(),
            Some(CodecError::InsufficientInput)
        );
    }

    // 0x9C = 0b10011100. LSB order delivers bits starting from the
    // least significant end.
    #[test]
    fn lsb_single_byte() {
        let input = [0x9C, 0, 0, 0];
        let mut bs = BitStreamer::<Lsb>::new(&input).unwrap();
        bs.fill(8).unwrap();
        assert_eq!(bs.get_bits_no_fill(3), 0b100);
        assert_eq!(bs.get_bits_no_fill(2), 0b11);
        assert_eq!(bs.get_bits_no_fill(3), 0b100);
    }

    #[test]
    fn msb_single_byte() {
        let input = [0x9C, 0, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert_eq!(bs.get_bits(3).unwrap(), 0b100);
        assert_eq!(bs.get_bits(2).unwrap(), 0b11);
        assert_eq!(bs.get_bits(3).unwrap(), 0b100);
    }

    #[test]
    fn msb16_half_word_order() {
        // Two LE 16-bit half-words; the high bits of the first
        // half-word come out first.
        let input = [0x34, 0x12, 0x78, 0x56];
        let mut bs = BitStreamer::<Msb16>::new(&input).unwrap();
        assert_eq!(bs.get_bits(16).unwrap(), 0x1234);
        assert_eq!(bs.get_bits(16).unwrap(), 0x5678);
    }

    #[test]
    fn msb32_word_order() {
        let input = [0x78, 0x56, 0x34, 0x12];
        let mut bs = BitStreamer::<Msb32>::new(&input).unwrap();
        assert_eq!(bs.get_bits(32).unwrap(), 0x1234_5678);
    }

    #[test]
    fn peek_is_non_destructive() {
        let input = [0xA5, 0x5A, 0xC3, 0x3C];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        let first = bs.peek_bits(13).unwrap();
        let pos = bs.stream_position();
        assert_eq!(bs.peek_bits(13).unwrap(), first);
        assert_eq!(bs.stream_position(), pos);
    }

    #[test]
    fn get_equals_peek_then_skip() {
        let input = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04];
        let mut a = BitStreamer::<Msb>::new(&input).unwrap();
        let mut b = BitStreamer::<Msb>::new(&input).unwrap();
        for nbits in [5u32, 11, 3, 32, 13] {
            let peeked = b.peek_bits(nbits).unwrap();
            b.skip_bits(nbits).unwrap();
            assert_eq!(a.get_bits(nbits).unwrap(), peeked);
            assert_eq!(a.stream_position(), b.stream_position());
        }
    }

    #[test]
    fn jpeg_unstuffing() {
        // 0xFF followed by the 0x00 stuffing byte is a data byte.
        let input = [0xFF, 0x00, 0xAB, 0x11, 0x22, 0x33, 0x44, 0x55];
        let mut bs = BitStreamer::<Jpeg>::new(&input).unwrap();
        assert_eq!(bs.get_bits(8).unwrap(), 0xFF);
        assert_eq!(bs.get_bits(8).unwrap(), 0xAB);
    }

    #[test]
    fn jpeg_marker_terminates_stream() {
        let input = [0xFF, 0xD9, 0, 0, 0, 0, 0, 0];
        let mut bs = BitStreamer::<Jpeg>::new(&input).unwrap();
        // Any attempt to fill hits the marker; reads saturate to zero.
        assert_eq!(bs.get_bits(16).unwrap(), 0);
        assert_eq!(bs.stream_position(), 0);
    }

    #[test]
    fn jpeg_marker_mid_stream() {
        let input = [0x12, 0x34, 0xFF, 0xD0, 0, 0, 0, 0];
        let mut bs = BitStreamer::<Jpeg>::new(&input).unwrap();
        assert_eq!(bs.get_bits(16).unwrap(), 0x1234);
        assert_eq!(bs.stream_position(), 2);
        // Everything after the marker reads as zeros.
        assert_eq!(bs.get_bits(32).unwrap(), 0);
        assert_eq!(bs.stream_position(), 2);
    }

    #[test]
    fn overreads_eventually_fail() {
        let input = [0u8; 4];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        let mut err = None;
        for _ in 0..8 {
            if let Err(e) = bs.get_bits(32) {
                err = Some(e);
                break;
            }
        }
        assert_eq!(err, Some(CodecError::EndOfStream));
    }

    #[test]
    fn skip_bytes_crosses_refills() {
        let mut input = vec![0u8; 64];
        input[32] = 0x80;
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        bs.skip_bytes(32).unwrap();
        assert_eq!(bs.get_bits(1).unwrap(), 1);
    }
}
