//! Per-length lookup decoder (the classic IJG decoding tables).
//!
//! Figure F.15: for every code length l, `max_code[l]` is the last
//! canonically assigned code and `code_offset[l]` translates a code
//! into an index into the value alphabet. Requires a *canonical* code,
//! hence construction goes through [`HuffmanCode`].

use crate::bitstreams::{BitStreamer, PrefixCodeStreamOrder};
use crate::codes::decoder::{decode_with_backend, DecoderBackend, DecoderCore, PrefixCodeDecoder};
use crate::codes::{CodeSymbol, CodeTag, HuffmanCode, PrefixCode};
use crate::error::{CodecError, Result};

const SENTINEL: u32 = u32::MAX;

pub struct PrefixCodeLookupDecoder<T: CodeTag> {
    core: DecoderCore<T>,
    /// Last assigned code per length; index is the code length.
    max_code: Vec<u32>,
    /// `first_code_at_len - codes_shorter_than_len` per length.
    code_offset: Vec<u32>,
}

impl<T: CodeTag> PrefixCodeLookupDecoder<T> {
    pub fn new(hc: HuffmanCode<T>, full_decode: bool, fix_dng_bug_16: bool) -> Result<Self> {
        Self::from_prefix_code(hc.into_prefix_code()?, full_decode, fix_dng_bug_16)
    }
}

impl<T: CodeTag> DecoderBackend<T> for PrefixCodeLookupDecoder<T> {
    fn from_prefix_code(
        code: PrefixCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        // The per-length table arithmetic is only valid for canonical
        // code assignment.
        let canonical: Vec<CodeSymbol> = {
            let mut symbols = Vec::with_capacity(code.symbols.len());
            let mut running = 0u32;
            for l in 1..code.n_codes_per_length.len() {
                for _ in 0..code.n_codes_per_length[l] {
                    symbols.push(CodeSymbol::new(running, l as u8));
                    running += 1;
                }
                running <<= 1;
            }
            symbols
        };
        if canonical != code.symbols {
            return Err(CodecError::CorruptCode(
                "lookup decoder requires a canonical code".into(),
            ));
        }

        let core = DecoderCore::new(code, full_decode, fix_dng_bug_16)?;

        let max_len = core.max_code_length() as usize;
        let mut max_code = vec![SENTINEL; max_len + 1];
        let mut code_offset = vec![SENTINEL; max_len + 1];
        let mut num_codes_so_far = 0u32;
        for code_len in 1..=max_len {
            if core.code.n_codes_per_length[code_len] == 0 {
                continue;
            }
            code_offset[code_len] =
                core.code.symbols[num_codes_so_far as usize].code - num_codes_so_far;
            num_codes_so_far += core.code.n_codes_per_length[code_len];
            max_code[code_len] = core.code.symbols[num_codes_so_far as usize - 1].code;
        }

        Ok(Self { core, max_code, code_offset })
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
        let max_len = self.core.max_code_length();

        while u32::from(partial.code_len) < max_len
            && (self.max_code[partial.code_len as usize] == SENTINEL
                || partial.code > self.max_code[partial.code_len as usize])
        {
            let bit = bs.get_bits_no_fill(1);
            partial.code = (partial.code << 1) | bit;
            partial.code_len += 1;
        }

        // When called from the LUT accelerator the partial length can
        // exceed this table's longest code, a symptom of corrupt input.
        if u32::from(partial.code_len) > max_len
            || partial.code > self.max_code[partial.code_len as usize]
        {
            return Err(CodecError::BadCode { code: partial.code, len: partial.code_len });
        }

        debug_assert!(self.code_offset[partial.code_len as usize] != SENTINEL);
        let code_index = (partial.code - self.code_offset[partial.code_len as usize]) as usize;
        debug_assert!(code_index < self.core.code.code_values.len());

        let code_value = self.core.code.code_values[code_index];
        Ok((partial, code_value))
    }
}

impl<T: CodeTag> PrefixCodeDecoder<T> for PrefixCodeLookupDecoder<T> {
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
    use crate::codes::BaselineCodeTag;

    fn standard_dc_decoder(full: bool) -> PrefixCodeLookupDecoder<BaselineCodeTag> {
        let lengths = [0u8, 1, 5, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let values: Vec<u8> = (0..11).collect();
        let hc = HuffmanCode::<BaselineCodeTag>::from_dht(&lengths, &values).unwrap();
        PrefixCodeLookupDecoder::new(hc, full, false).unwrap()
    }

    #[test]
    fn decodes_code_values() {
        let dec = standard_dc_decoder(false);
        // 00 -> 0, 010 -> 1, 1110 -> 6.
        let input = [0b0001_0111u8, 0b0000_0000, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 0);
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 1);
        assert_eq!(dec.decode_code_value(&mut bs).unwrap(), 6);
    }

    #[test]
    fn decodes_differences() {
        let dec = standard_dc_decoder(true);
        // 010 announces a 1-bit diff; bit 1 -> +1. Then 00 -> diff 0.
        let input = [0b0101_0000u8, 0, 0, 0];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert_eq!(dec.decode_difference(&mut bs).unwrap(), 1);
        assert_eq!(dec.decode_difference(&mut bs).unwrap(), 0);
    }

    #[test]
    fn all_ones_walk_is_bad_code() {
        let dec = standard_dc_decoder(false);
        let input = [0xFFu8, 0xFF, 0xFF, 0xFF];
        let mut bs = BitStreamer::<Msb>::new(&input).unwrap();
        assert!(matches!(
            dec.decode_code_value(&mut bs),
            Err(CodecError::BadCode { .. })
        ));
    }
}
