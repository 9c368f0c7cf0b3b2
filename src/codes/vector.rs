//! Parallel-vector prefix code decoder.
//!
//! Keeps the histogram, symbols and values side by side and scans the
//! per-length symbol slice for an equality match after every bit.
//! Worst-case slower than the lookup variant, but with trivial
//! invariants and good cache behavior for tiny tables.

use crate::bitstreams::{BitStreamer, PrefixCodeStreamOrder};
use crate::codes::decoder::{decode_with_backend, DecoderBackend, DecoderCore, PrefixCodeDecoder};
use crate::codes::{CodeSymbol, CodeTag, HuffmanCode, PrefixCode};
use crate::error::{CodecError, Result};

#[derive(Debug)]
pub struct PrefixCodeVectorDecoder<T: CodeTag> {
    core: DecoderCore<T>,
    /// For each code length, the id of its first symbol; index is the
    /// length, one extra entry past the maximum length.
    first_code_id_for_len: Vec<u32>,
}

impl<T: CodeTag> PrefixCodeVectorDecoder<T> {
    pub fn new(code: PrefixCode<T>, full_decode: bool, fix_dng_bug_16: bool) -> Result<Self> {
        Self::from_prefix_code(code, full_decode, fix_dng_bug_16)
    }

    pub fn from_huffman(
        hc: HuffmanCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        Self::from_prefix_code(hc.into_prefix_code()?, full_decode, fix_dng_bug_16)
    }
}

impl<T: CodeTag> DecoderBackend<T> for PrefixCodeVectorDecoder<T> {
    fn from_prefix_code(
        code: PrefixCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        let core = DecoderCore::new(code, full_decode, fix_dng_bug_16)?;

        // For lengths 0 and 1 the minimal code id is always 0.
        let mut first_code_id_for_len = vec![0u32; 2];
        for code_len in 1..core.code.n_codes_per_length.len() {
            let min_code_id =
                first_code_id_for_len.last().unwrap() + core.code.n_codes_per_length[code_len];
            first_code_id_for_len.push(min_code_id);
        }

        Ok(Self { core, first_code_id_for_len })
    }

    fn core(&self) -> &DecoderCore<T> {
        &self.core
    }

    fn finish_reading_partial_symbol<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
        partial: CodeSymbol,
    ) -> Result<(CodeSymbol, u32)> {
        let mut partial = partial;

        while u32::from(partial.code_len) < self.core.max_code_length() {
            let bit = bs.get_bits_no_fill(1);
            partial.code = (partial.code << 1) | bit;
            partial.code_len += 1;

            // Global ordering plus the code length pin down the id range.
            let len = partial.code_len as usize;
            let begin = self.first_code_id_for_len[len] as usize;
            let end = self.first_code_id_for_len[len + 1] as usize;
            for code_id in begin..end {
                let symbol = &self.core.code.symbols[code_id];
                debug_assert!(symbol.code_len == partial.code_len);
                if *symbol == partial {
                    return Ok((*symbol, self.core.code.code_values[code_id]));
                }
            }
        }

        Err(CodecError::BadCode { code: partial.code, len: partial.code_len })
    }
}

impl<T: CodeTag> PrefixCodeDecoder<T> for PrefixCodeVectorDecoder<T> {
    fn is_full_decode(&self) -> bool {
        self.core.is_full_decode()
    }

    fn decode_code_value<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<u32> {
        debug_assert!(!self.is_full_decode());
        decode_with_backend::<T, _, O, false>(self, bs).map(|v| v as u32)
    }

    fn decode_difference<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<i32> {
        debug_assert!(self.is_full_decode());
        decode_with_backend::<T, _, O, true>(self, bs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstreams::Msb;
    use crate::codes::{BaselineCodeTag, Vc5CodeTag};

    #[test]
    fn decodes_canonical_dht() {
        let lengths = [0u8, 1, 5, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let values: Vec<u8> = (0..11).collect();
        let hc = HuffmanCode::<BaselineCodeTag>::from_dht(&lengths, &values).unwrap();
        let dec = PrefixCodeVectorDecoder::from_huffman(hc, false, false).unwrap();

        // Symbol 0b00 (len 2) -> value 0, symbol 0b110 (len 3) -> 5.
        let input = [0b0011_0000u8, 0, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 0);
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 5);
    }

    #[test]
    fn exhausted_lengths_are_bad_code() {
        let code = PrefixCode::<BaselineCodeTag>::new(
            vec![CodeSymbol::new(0b0, 1), CodeSymbol::new(0b10, 2)],
            vec![1, 2],
        )
        .unwrap();
        let dec = PrefixCodeVectorDecoder::new(code, false, false).unwrap();
        let input = [0b1100_0000u8, 0, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert!(matches!(
            dec.decode_code_value(&mut bs),
            Err(CodecError::BadCode { .. })
        ));
    }

    #[test]
    fn handles_explicit_vc5_style_symbols() {
        // Not a DHT build: symbols given explicitly, wide values.
        let code = PrefixCode::<Vc5CodeTag>::new(
            vec![
                CodeSymbol::new(0b0, 1),
                CodeSymbol::new(0b10, 2),
                CodeSymbol::new(0b11, 2),
            ],
            vec![0, 300_000, 7],
        )
        .unwrap();
        let dec = PrefixCodeVectorDecoder::new(code, false, false).unwrap();
        let input = [0b1011_0000u8, 0, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 300_000);
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 7);
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 0);
    }
}
