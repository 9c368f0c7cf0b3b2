//! The bit vacuumer: the writing inverse of the bit streamer.

use std::marker::PhantomData;

use crate::bitstreams::{BitOrder, BitStreamCache};

/// Accepts bit packets and drains 32-bit chunks to a byte vector in
/// the chosen bit order. `flush` pads with zero bits to the next
/// 32-bit boundary; it is idempotent and also runs on drop.
pub struct BitVacuumer<'a, O: BitOrder> {
    cache: O::Cache,
    out: &'a mut Vec<u8>,
    flushed: bool,
    _order: PhantomData<O>,
}

impl<'a, O: BitOrder> BitVacuumer<'a, O> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Self { cache: O::Cache::default(), out, flushed: false, _order: PhantomData }
    }

    const CHUNK_BITWIDTH: u32 = 32;

    fn drain(&mut self) {
        debug_assert!(!self.flushed);
        if self.cache.fill_level() < Self::CHUNK_BITWIDTH {
            return; // NOTE: does not mean the cache is empty!
        }
        O::drain_cache(&mut self.cache, self.out);
        debug_assert!(self.cache.fill_level() < Self::CHUNK_BITWIDTH);
    }

    /// Append the low `count` bits of `bits`, `count <= 32`.
    pub fn put(&mut self, bits: u32, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        self.drain();
        let clean = if count == 32 { bits } else { bits & ((1u32 << count) - 1) };
        self.cache.push(u64::from(clean), count);
    }

    /// Zero-pad to the next 32-bit boundary and drain everything.
    pub fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.drain();
        if self.cache.fill_level() == 0 {
            self.flushed = true;
            return;
        }
        let pad = Self::CHUNK_BITWIDTH - self.cache.fill_level() % Self::CHUNK_BITWIDTH;
        if pad != Self::CHUNK_BITWIDTH {
            self.put(0, pad);
        }
        self.drain();
        debug_assert!(self.cache.fill_level() == 0);
        self.flushed = true;
    }
}

impl<O: BitOrder> Drop for BitVacuumer<'_, O> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstreams::{Jpeg, Lsb, Msb, Msb16, Msb32};

    #[test]
    fn flush_pads_to_chunk() {
        let mut out = Vec::new();
        let mut bv = BitVacuumer::<Msb>::new(&mut out);
        bv.put(0b1, 1);
        bv.flush();
        bv.flush(); // idempotent
        drop(bv);
        assert_eq!(out, vec![0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn empty_flush_emits_nothing() {
        let mut out = Vec::new();
        BitVacuumer::<Msb32>::new(&mut out).flush();
        assert!(out.is_empty());
    }

    #[test]
    fn drop_flushes() {
        let mut out = Vec::new();
        {
            let mut bv = BitVacuumer::<Lsb>::new(&mut out);
            bv.put(0xFF, 8);
        }
        assert_eq!(out, vec![0xFF, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn msb16_emits_le_half_words() {
        let mut out = Vec::new();
        let mut bv = BitVacuumer::<Msb16>::new(&mut out);
        bv.put(0x1234, 16);
        bv.put(0x5678, 16);
        bv.flush();
        drop(bv);
        assert_eq!(out, vec![0x34, 0x12, 0x78, 0x56]);
    }

    #[test]
    fn jpeg_stuffs_ff_bytes() {
        let mut out = Vec::new();
        let mut bv = BitVacuumer::<Jpeg>::new(&mut out);
        bv.put(0xFF, 8);
        bv.put(0xAB, 8);
        bv.put(0xFFFF, 16);
        bv.flush();
        drop(bv);
        assert_eq!(out, vec![0xFF, 0x00, 0xAB, 0xFF, 0x00, 0xFF, 0x00]);
    }
}
