//! Binary prefix tree decoder, arena-backed.
//!
//! The tree is a single vector of nodes; children are 32-bit indices
//! into it. Index 0 is the root branch, index 0 as a *child* marks a
//! vacant direction.

use crate::bitstreams::{BitStreamer, PrefixCodeStreamOrder};
use crate::codes::decoder::{decode_with_backend, DecoderBackend, DecoderCore, PrefixCodeDecoder};
use crate::codes::{CodeSymbol, CodeTag, HuffmanCode, PrefixCode};
use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy)]
enum Node {
    Branch { buds: [u32; 2] },
    Leaf { value: u32 },
}

/// Decodes one bit per tree step, MSB-first; leaves carry the code
/// value. Slow but trivially correct for any (even non-canonical)
/// prefix code.
pub struct PrefixCodeTreeDecoder<T: CodeTag> {
    core: DecoderCore<T>,
    nodes: Vec<Node>,
}

impl<T: CodeTag> PrefixCodeTreeDecoder<T> {
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

    fn add(nodes: &mut Vec<Node>, symbol: CodeSymbol, value: u32) {
        let mut at = 0usize;
        for bit in symbol.bits_msb() {
            let next = match &nodes[at] {
                Node::Branch { buds } => buds[bit as usize],
                // Would only happen for a non-prefix code, which
                // PrefixCode::new has already ruled out.
                Node::Leaf { .. } => unreachable!("prefix tree collision"),
            };
            if next != 0 {
                at = next as usize;
                continue;
            }
            let fresh = nodes.len() as u32;
            nodes.push(Node::Branch { buds: [0, 0] });
            match &mut nodes[at] {
                Node::Branch { buds } => buds[bit as usize] = fresh,
                Node::Leaf { .. } => unreachable!(),
            }
            at = fresh as usize;
        }
        // The final bud must be vacant; turn it into the leaf.
        debug_assert!(matches!(nodes[at], Node::Branch { buds: [0, 0] }));
        nodes[at] = Node::Leaf { value };
    }
}

impl<T: CodeTag> DecoderBackend<T> for PrefixCodeTreeDecoder<T> {
    fn from_prefix_code(
        code: PrefixCode<T>,
        full_decode: bool,
        fix_dng_bug_16: bool,
    ) -> Result<Self> {
        let core = DecoderCore::new(code, full_decode, fix_dng_bug_16)?;

        let mut nodes = vec![Node::Branch { buds: [0, 0] }];
        for (symbol, &value) in core.code.symbols.iter().zip(&core.code.code_values) {
            Self::add(&mut nodes, *symbol, value);
        }
        Ok(Self { core, nodes })
    }

    fn core(&self) -> &DecoderCore<T> {
        &self.core
    }

    fn finish_reading_partial_symbol<O: PrefixCodeStreamOrder>(
        &self,
        bs: &mut BitStreamer<'_, O>,
        initial_partial: CodeSymbol,
    ) -> Result<(CodeSymbol, u32)> {
        let mut partial = CodeSymbol::default();
        let mut at = 0usize;

        let mut walk = |bit: u32, partial: &mut CodeSymbol| -> Result<Option<(CodeSymbol, u32)>> {
            partial.code = (partial.code << 1) | bit;
            partial.code_len += 1;

            let next = match &self.nodes[at] {
                Node::Branch { buds } => buds[bit as usize],
                Node::Leaf { .. } => unreachable!(),
            };
            if next == 0 {
                // Got nothing in this direction.
                return Err(CodecError::BadCode {
                    code: partial.code,
                    len: partial.code_len,
                });
            }
            match self.nodes[next as usize] {
                Node::Leaf { value } => Ok(Some((*partial, value))),
                Node::Branch { .. } => {
                    at = next as usize;
                    Ok(None)
                }
            }
        };

        // First, translate the pre-existing code bits.
        for bit in initial_partial.bits_msb() {
            if let Some(sym) = walk(bit, &mut partial)? {
                return Ok(sym);
            }
        }

        // Read bits until the code completes or proves incorrect.
        loop {
            debug_assert!(u32::from(partial.code_len) <= T::MAX_CODE_LENGTH);
            let bit = bs.get_bits_no_fill(1);
            if let Some(sym) = walk(bit, &mut partial)? {
                return Ok(sym);
            }
        }
    }
}

impl<T: CodeTag> PrefixCodeDecoder<T> for PrefixCodeTreeDecoder<T> {
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
