//! Shared state and flow of the prefix-code decoders.

use crate::bitstreams::{BitStreamer, PrefixCodeStreamOrder};
use crate::codes::{CodeSymbol, CodeTag, PrefixCode};
use crate::error::{CodecError, Result};

/// State common to every decoder representation: the validated code
/// plus the two setup flags.
///
/// With `full_decode` a code value is the bit length of an immediately
/// following signed difference; `fix_dng_bug_16` makes a code value of
/// 16 consume 16 extra padding bits instead of acting as the bare
/// -32768 sentinel.
#[derive(Debug, Clone)]
pub struct DecoderCore<T: CodeTag> {
    pub code: PrefixCode<T>,
    full_decode: bool,
    fix_dng_bug_16: bool,
}

impl<T: CodeTag> DecoderCore<T> {
    pub fn new(code: PrefixCode<T>, full_decode: bool, fix_dng_bug_16: bool) -> Result<Self> {
        if full_decode && !T::SUPPORTS_FULL_DECODE {
            return Err(CodecError::CorruptCode(
                "this code family does not support full decoding".into(),
            ));
        }
        let core = Self { code, full_decode, fix_dng_bug_16 };
        if full_decode {
            // Code values are bit lengths of the following difference;
            // symbol plus difference must fit a single 32-bit fill.
            core.verify_code_values_as_diff_lengths()?;
        }
        Ok(core)
    }

    fn verify_code_values_as_diff_lengths(&self) -> Result<()> {
        for &value in &self.code.code_values {
            if value > T::MAX_DIFF_LENGTH {
                return Err(CodecError::CorruptCode(format!(
                    "difference length {value} longer than {}",
                    T::MAX_DIFF_LENGTH
                )));
            }
        }
        debug_assert!(
            self.code.max_code_length()
                + self.code.code_values.iter().copied().max().unwrap_or(0)
                <= 32
        );
        Ok(())
    }

    pub fn is_full_decode(&self) -> bool {
        self.full_decode
    }

    pub fn handle_dng_bug_16(&self) -> bool {
        self.fix_dng_bug_16
    }

    pub fn max_code_length(&self) -> u32 {
        self.code.max_code_length()
    }

    /// Turn a just-read symbol and its code value into the decode
    /// result, consuming the difference bits in full-decode mode. The
    /// caller has already `fill`ed 32 bits.
    #[inline]
    pub fn process_symbol<O: PrefixCodeStreamOrder, const FULL_DECODE: bool>(
        &self,
        bs: &mut BitStreamer<'_, O>,
        symbol: CodeSymbol,
        code_value: u32,
    ) -> i32 {
        debug_assert!(u32::from(symbol.code_len) <= T::MAX_CODE_LENGTH);

        if !FULL_DECODE {
            return code_value as i32;
        }

        // The code value is the bit length of the following difference.
        let diff_len = code_value;
        debug_assert!(diff_len <= 16);

        if diff_len == 16 {
            if self.fix_dng_bug_16 {
                bs.skip_bits_no_fill(16);
            }
            return -32768;
        }

        debug_assert!(u32::from(symbol.code_len) + diff_len <= 32);
        if diff_len != 0 {
            extend(bs.get_bits_no_fill(diff_len), diff_len)
        } else {
            0
        }
    }
}

/// Figure F.12 - extending the sign bit of a decoded value.
/// WARNING: this is *not* your normal 2's complement sign extension!
#[inline]
pub fn extend(diff: u32, len: u32) -> i32 {
    debug_assert!(len > 0);
    let mut ret = diff as i32;
    if diff & (1 << (len - 1)) == 0 {
        ret -= (1 << len) - 1;
    }
    ret
}

/// The common capability set of all decoder representations.
pub trait PrefixCodeDecoder<T: CodeTag> {
    fn is_full_decode(&self) -> bool;

    /// Read one symbol and return its code value. The decoder must be
    /// in non-full mode.
    fn decode_code_value<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<u32>;

    /// Read one symbol and the signed difference it announces. The
    /// decoder must be in full mode.
    fn decode_difference<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<i32>;
}

/// The part of a decoder the LUT accelerator can wrap: resuming a
/// symbol walk from an already-consumed partial code.
pub trait DecoderBackend<T: CodeTag>: Sized {
    fn from_prefix_code(code: PrefixCode<T>, full_decode: bool, fix_dng_bug_16: bool)
        -> Result<Self>;

    fn core(&self) -> &DecoderCore<T>;

    /// Continue reading bits after `partial` until a symbol completes.
    fn finish_reading_partial_symbol<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
        partial: CodeSymbol,
    ) -> Result<(CodeSymbol, u32)>;
}

/// The decode flow shared by the tree, vector and lookup decoders:
/// fill 32 bits up front (enough for the longest baseline symbol plus
/// difference), walk one symbol, process it.
#[inline]
pub(crate) fn decode_with_backend<T, D, O, const FULL_DECODE: bool>(
    decoder: &D,
    bs: &mut BitStreamer<'_, O>,
) -> Result<i32>
where
    T: CodeTag,
    D: DecoderBackend<T>,
    O: PrefixCodeStreamOrder,
{
    debug_assert!(FULL_DECODE == decoder.core().is_full_decode());
    bs.fill(32)?;

    let (symbol, code_value) =
        decoder.finish_reading_partial_symbol(bs, CodeSymbol::default())?;
    Ok(decoder
        .core()
        .process_symbol::<O, FULL_DECODE>(bs, symbol, code_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_fixed_points() {
        // extend maps the len-bit magnitude onto the two-sided range.
        assert_eq!(extend(0, 1), -1);
        assert_eq!(extend(1, 1), 1);
        assert_eq!(extend(0, 4), -15);
        assert_eq!(extend(7, 4), -8);
        assert_eq!(extend(8, 4), 8);
        assert_eq!(extend(15, 4), 15);
        assert_eq!(extend(0, 16), -65535);
        assert_eq!(extend(0x7FFF, 16), -32768);
        assert_eq!(extend(0x8000, 16), 32768);
        assert_eq!(extend(0xFFFF, 16), 65535);
    }
}
