//! Table-lookup accelerator wrapping any backend decoder.
//!
//! A table of `2^LOOKUP_DEPTH` entries resolves most symbols (and, in
//! full-decode mode, often the whole difference) with a single peek.
//! Entries are `payload:23 | flag:1 | len:8` words; a zero entry means
//! the symbol is longer than the lookup depth and the walk falls back
//! to the backend, resuming from the already-peeked partial code.

use crate::bitstreams::{BitStreamer, PrefixCodeStreamOrder};
use crate::codes::decoder::{extend, DecoderBackend, DecoderCore, PrefixCodeDecoder};
use crate::codes::{CodeSymbol, CodeTag, HuffmanCode, PrefixCode};
use crate::error::{CodecError, Result};

const PAYLOAD_SHIFT: u32 = 9;
const FLAG_MASK: u32 = 0x100;
const LEN_MASK: u32 = 0xFF;
const LOOKUP_DEPTH: u32 = 11;

pub struct PrefixCodeLutDecoder<T: CodeTag, B: DecoderBackend<T>> {
    backend: B,
    lut: Vec<i32>,
    _tag: std::marker::PhantomData<T>,
}

impl<T: CodeTag, B: DecoderBackend<T>> PrefixCodeLutDecoder<T, B> {
    pub fn new(hc: HuffmanCode<T>, full_decode: bool, fix_dng_bug_16: bool) -> Result<Self> {
        Self::from_prefix_code(hc.into_prefix_code()?, full_decode, fix_dng_bug_16)
    }

    pub fn from_prefix_code(
        code: PrefixCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        let backend = B::from_prefix_code(code, full_decode, fix_dng_bug_16)?;
        let lut = Self::build_lut(backend.core())?;
        Ok(Self { backend, lut, _tag: std::marker::PhantomData })
    }

    fn build_lut(core: &DecoderCore<T>) -> Result<Vec<i32>> {
        let mut lut = vec![0i32; 1 << LOOKUP_DEPTH];
        let code = &core.code;

        for (symbol, &code_value) in code.symbols.iter().zip(&code.code_values) {
            let code_len = u32::from(symbol.code_len);
            if code_len > LOOKUP_DEPTH {
                break; // Symbols only get longer from here.
            }

            // Every table slot whose high bits match this symbol.
            let first = symbol.code << (LOOKUP_DEPTH - code_len);
            let last = first | ((1 << (LOOKUP_DEPTH - code_len)) - 1);
            let diff_len = code_value;

            for slot in first..=last {
                if slot as usize >= lut.len() {
                    return Err(CodecError::CorruptCode("corrupt code in LUT build".into()));
                }

                if !core.is_full_decode() || (code_len + diff_len > LOOKUP_DEPTH && diff_len != 16)
                {
                    // The lookup depth cannot hold both the symbol and
                    // its difference: store the code value and length
                    // only, the caller consumes the difference.
                    let mut entry = (diff_len << PAYLOAD_SHIFT | code_len) as i32;
                    if !core.is_full_decode() {
                        entry |= FLAG_MASK as i32;
                    }
                    lut[slot as usize] = entry;
                } else {
                    // The depth suffices to encode the final value.
                    let mut entry = (FLAG_MASK | code_len) as i32;
                    if diff_len != 16 || core.handle_dng_bug_16() {
                        entry += diff_len as i32;
                    }
                    if diff_len != 0 {
                        let diff = if diff_len != 16 {
                            (slot >> (LOOKUP_DEPTH - code_len - diff_len)) & ((1 << diff_len) - 1)
                        } else {
                            -32768i32 as u32
                        };
                        entry |= extend(diff, diff_len) << PAYLOAD_SHIFT;
                    }
                    lut[slot as usize] = entry;
                }
            }
        }
        Ok(lut)
    }

    #[inline]
    fn decode<O: PrefixCodeStreamOrder, const FULL_DECODE: bool>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<i32> {
        debug_assert!(FULL_DECODE == self.backend.core().is_full_decode());
        bs.fill(32)?;

        let mut partial = CodeSymbol {
            code: bs.peek_bits_no_fill(LOOKUP_DEPTH),
            code_len: LOOKUP_DEPTH as u8,
        };

        let lut_entry = self.lut[partial.code as usize] as u32;
        let payload = (lut_entry as i32) >> PAYLOAD_SHIFT;
        let len = lut_entry & LEN_MASK;

        // How far did reading those LOOKUP_DEPTH bits *actually* move us?
        bs.skip_bits_no_fill(len);

        // Flag set: all bits already skipped, payload is the answer.
        if lut_entry & FLAG_MASK != 0 {
            return Ok(payload);
        }

        let (symbol, code_value) = if lut_entry != 0 {
            // Flag clear but non-empty: payload is the code value.
            partial.code_len = len as u8;
            let code_value = payload as u32;
            debug_assert!(!FULL_DECODE || code_value > 0);
            (partial, code_value)
        } else {
            // Symbol longer than the lookup depth, or corrupt input.
            debug_assert!(len == 0);
            bs.skip_bits_no_fill(u32::from(partial.code_len));
            self.backend.finish_reading_partial_symbol(bs, partial)?
        };

        Ok(self
            .backend
            .core()
            .process_symbol::<O, FULL_DECODE>(bs, symbol, code_value))
    }
}

impl<T: CodeTag, B: DecoderBackend<T>> PrefixCodeDecoder<T> for PrefixCodeLutDecoder<T, B> {
    fn is_full_decode(&self) -> bool {
        self.backend.core().is_full_decode()
    }

    fn decode_code_value<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<u32> {
        debug_assert!(!self.is_full_decode());
        self.decode::<O, false>(bs).map(|v| v as u32)
    }

    fn decode_difference<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
    ) -> Result<i32> {
        debug_assert!(self.is_full_decode());
        self.decode::<O, true>(bs)
    }
}
