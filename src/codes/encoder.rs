//! Prefix code encoder, vector variant.
//!
//! Encoders are small: the symbol for a code value is found by a
//! linear scan over the alphabet.

use crate::bitstreams::{BitVacuumer, PrefixCodeVacuumOrder};
use crate::codes::decoder::DecoderCore;
use crate::codes::{CodeTag, HuffmanCode, PrefixCode};
use crate::error::{CodecError, Result};

pub struct PrefixCodeVectorEncoder<T: CodeTag> {
    core: DecoderCore<T>,
}

impl<T: CodeTag> PrefixCodeVectorEncoder<T> {
    pub fn new(code: PrefixCode<T>, full_decode: bool, fix_dng_bug_16: bool) -> Result<Self> {
        Ok(Self { core: DecoderCore::new(code, full_decode, fix_dng_bug_16)? })
    }

    pub fn from_huffman(
        hc: HuffmanCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        Self::new(hc.into_prefix_code()?, full_decode, fix_dng_bug_16)
    }

    pub fn is_full_decode(&self) -> bool {
        self.core.is_full_decode()
    }

    fn code_index_of_code_value(&self, value: u32) -> Result<usize> {
        self.core
            .code
            .code_values
            .iter()
            .position(|&v| v == value)
            .ok_or_else(|| {
                CodecError::CorruptCode(format!("code value {value} not in the alphabet"))
            })
    }

    fn put_symbol<O: PrefixCodeVacuumOrder>(&self, bv: &mut BitVacuumer<'_, O>, code_index: usize) {
        let symbol = &self.core.code.symbols[code_index];
        bv.put(symbol.code, u32::from(symbol.code_len));
    }

    /// Emit the symbol for `code_value`. The encoder must be in
    /// non-full mode.
    pub fn encode_code_value<O: PrefixCodeVacuumOrder>(
        &self,
        bv: &mut BitVacuumer<'_, O>,
        code_value: u32,
    ) -> Result<()> {
        debug_assert!(!self.is_full_decode());
        let code_index = self.code_index_of_code_value(code_value)?;
        self.put_symbol(bv, code_index);
        Ok(())
    }

    /// Emit the symbol announcing the difference's bit length, then
    /// the reduced difference bits. The encoder must be in full mode.
    pub fn encode_difference<O: PrefixCodeVacuumOrder>(
        &self,
        bv: &mut BitVacuumer<'_, O>,
        value: i32,
    ) -> Result<()> {
        debug_assert!(self.is_full_decode());
        let (diff, diff_len) = reduce(value);
        let code_index = self.code_index_of_code_value(diff_len)?;
        self.put_symbol(bv, code_index);
        if diff_len != 16 || self.core.handle_dng_bug_16() {
            bv.put(diff, diff_len);
        }
        Ok(())
    }
}

/// The inverse of the decoder's sign extension: split an extended
/// difference back into its magnitude bits and their count.
pub fn reduce(extended_diff: i32) -> (u32, u32) {
    if extended_diff >= 0 {
        let diff = extended_diff as u32;
        return (diff, num_active_bits(diff));
    }
    let diff = (extended_diff - 1) as u32;
    let len = num_significant_bits(diff) - 1;
    (extract_low_bits(diff, len), len)
}

fn num_active_bits(v: u32) -> u32 {
    u32::BITS - v.leading_zeros()
}

fn num_significant_bits(v: u32) -> u32 {
    let sign_bits = if (v as i32) < 0 { (!v).leading_zeros() } else { v.leading_zeros() };
    u32::BITS - sign_bits + 1
}

fn extract_low_bits(v: u32, nbits: u32) -> u32 {
    if nbits == 0 {
        return 0;
    }
    v & (!0u32 >> (u32::BITS - nbits))
}
