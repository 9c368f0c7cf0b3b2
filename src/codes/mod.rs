//! Abstract prefix codes (Huffman and relatives).
//!
//! A prefix code is three parallel views of the same data: a per-length
//! histogram, the code symbols in non-decreasing length order, and the
//! code-value alphabet they map to. [`HuffmanCode`] is the JPEG DHT
//! form (histogram + values) from which canonical symbols are
//! generated; [`PrefixCode`] is the fully expanded, validated form the
//! decoders consume.

pub mod decoder;
pub mod encoder;
pub mod lookup;
pub mod lut;
pub mod tree;
pub mod vector;

pub use decoder::PrefixCodeDecoder;
pub use encoder::PrefixCodeVectorEncoder;
pub use lookup::PrefixCodeLookupDecoder;
pub use lut::PrefixCodeLutDecoder;
pub use tree::PrefixCodeTreeDecoder;
pub use vector::PrefixCodeVectorDecoder;

use std::marker::PhantomData;

use crate::error::{CodecError, Result};

/// Limits of one code family.
pub trait CodeTag: Copy + Default + 'static {
    /// Longest admissible symbol, in bits.
    const MAX_CODE_LENGTH: u32;
    /// Most code values a table may hold.
    const MAX_NUM_CODE_VALUES: usize;
    /// Largest admissible code value.
    const MAX_CODE_VALUE: u32;
    /// Largest code value when interpreted as a difference bit length.
    const MAX_DIFF_LENGTH: u32;
    /// Whether code values may be interpreted as difference lengths.
    const SUPPORTS_FULL_DECODE: bool;
}

/// JPEG baseline Huffman codes (DHT).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineCodeTag;

impl CodeTag for BaselineCodeTag {
    const MAX_CODE_LENGTH: u32 = 16;
    const MAX_NUM_CODE_VALUES: usize = 162;
    const MAX_CODE_VALUE: u32 = 255;
    const MAX_DIFF_LENGTH: u32 = 16;
    const SUPPORTS_FULL_DECODE: bool = true;
}

/// GoPro/CineForm VC-5 codebooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vc5CodeTag;

impl CodeTag for Vc5CodeTag {
    const MAX_CODE_LENGTH: u32 = 26;
    const MAX_NUM_CODE_VALUES: usize = 264;
    const MAX_CODE_VALUE: u32 = 524_287;
    const MAX_DIFF_LENGTH: u32 = 0; // unused
    const SUPPORTS_FULL_DECODE: bool = false;
}

/// One prefix code: the bit pattern and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeSymbol {
    pub code: u32,
    pub code_len: u8,
}

impl CodeSymbol {
    pub fn new(code: u32, code_len: u8) -> Self {
        debug_assert!(code_len > 0);
        debug_assert!(u64::from(code) <= (1u64 << code_len) - 1);
        Self { code, code_len }
    }

    /// The symbol's bits, most significant first.
    pub fn bits_msb(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.code_len).rev().map(move |i| (self.code >> i) & 1)
    }

    /// Do the high `partial.code_len` bits of `symbol` equal `partial`?
    pub fn have_common_prefix(symbol: &CodeSymbol, partial: &CodeSymbol) -> bool {
        debug_assert!(partial.code_len <= symbol.code_len);
        let shift = u32::from(symbol.code_len - partial.code_len);
        (symbol.code >> shift) == partial.code
    }
}

/// A validated prefix code: symbols plus the values they decode to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixCode<T: CodeTag> {
    /// Codes per bit length, index is the length (index 0 always
    /// zero). Trimmed of trailing zeros.
    pub n_codes_per_length: Vec<u32>,
    pub symbols: Vec<CodeSymbol>,
    pub code_values: Vec<u32>,
    _tag: PhantomData<T>,
}

impl<T: CodeTag> PrefixCode<T> {
    pub fn new(symbols: Vec<CodeSymbol>, code_values: Vec<u32>) -> Result<Self> {
        if symbols.is_empty() || code_values.is_empty() || symbols.len() != code_values.len() {
            return Err(CodecError::CorruptCode("malformed code".into()));
        }
        if symbols.len() > T::MAX_NUM_CODE_VALUES {
            return Err(CodecError::CorruptCode("too big code-values table".into()));
        }
        for &value in &code_values {
            if value > T::MAX_CODE_VALUE {
                return Err(CodecError::CorruptCode(format!(
                    "code value {value} is larger than maximum {}",
                    T::MAX_CODE_VALUE
                )));
            }
        }

        let mut n_codes_per_length = vec![0u32; 1 + T::MAX_CODE_LENGTH as usize];
        for s in &symbols {
            if s.code_len == 0 || u32::from(s.code_len) > T::MAX_CODE_LENGTH {
                return Err(CodecError::CorruptCode(format!(
                    "symbol length {} out of range",
                    s.code_len
                )));
            }
            n_codes_per_length[s.code_len as usize] += 1;
        }
        while n_codes_per_length.last() == Some(&0) {
            n_codes_per_length.pop();
        }

        let code = Self {
            n_codes_per_length,
            symbols,
            code_values,
            _tag: PhantomData,
        };
        code.verify_code_symbols()?;
        Ok(code)
    }

    fn verify_code_symbols(&self) -> Result<()> {
        // At the root, length 1, there are two possible child nodes.
        let mut max_codes = 2u64;
        for code_len in 1..self.n_codes_per_length.len() {
            let n_codes = u64::from(self.n_codes_per_length[code_len]);
            if n_codes > max_codes {
                return Err(CodecError::CorruptCode(format!(
                    "too many codes of length {code_len}"
                )));
            }
            // The leaves on this level can not also be branches.
            max_codes -= n_codes;
            max_codes *= 2;
        }

        // Symbols must be ordered by non-decreasing code length.
        // NOTE: codes of the same length are not necessarily sorted.
        if self.symbols.windows(2).any(|w| w[0].code_len > w[1].code_len) {
            return Err(CodecError::CorruptCode(
                "code symbols are not globally ordered".into(),
            ));
        }

        // No two symbols may share a prefix.
        for (i, symbol) in self.symbols.iter().enumerate() {
            for partial in &self.symbols[..i] {
                if CodeSymbol::have_common_prefix(symbol, partial) {
                    return Err(CodecError::CorruptCode("not prefix codes".into()));
                }
            }
        }
        Ok(())
    }

    pub fn max_code_length(&self) -> u32 {
        (self.n_codes_per_length.len() - 1) as u32
    }
}

/// The JPEG DHT form of a Huffman code: a codes-per-length histogram
/// plus the code-value alphabet. Symbols are assigned canonically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HuffmanCode<T: CodeTag> {
    n_codes_per_length: Vec<u32>,
    code_values: Vec<u32>,
    _tag: PhantomData<T>,
}

impl<T: CodeTag> HuffmanCode<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the two DHT tables in one step.
    pub fn from_dht(codes_per_length: &[u8], code_values: &[u8]) -> Result<Self> {
        let mut hc = Self::new();
        hc.set_n_codes_per_length(codes_per_length)?;
        hc.set_code_values_u8(code_values)?;
        Ok(hc)
    }

    pub fn num_codes(&self) -> usize {
        self.n_codes_per_length.iter().map(|&n| n as usize).sum()
    }

    pub fn max_code_length(&self) -> u32 {
        (self.n_codes_per_length.len().saturating_sub(1)) as u32
    }

    /// Ingest the 16-byte (for baseline) codes-per-length table.
    /// Returns the total number of codes.
    pub fn set_n_codes_per_length(&mut self, data: &[u8]) -> Result<usize> {
        debug_assert!(data.len() == T::MAX_CODE_LENGTH as usize);

        self.n_codes_per_length = vec![0u32; 1 + T::MAX_CODE_LENGTH as usize];
        for (dst, &src) in self.n_codes_per_length[1..].iter_mut().zip(data) {
            *dst = u32::from(src);
        }

        // Trim empty entries from the codes-per-length table on the right.
        while self.n_codes_per_length.last() == Some(&0) {
            self.n_codes_per_length.pop();
        }
        if self.n_codes_per_length.is_empty() {
            return Err(CodecError::CorruptCode(
                "codes-per-length table is empty".into(),
            ));
        }

        let count = self.num_codes();
        if count > T::MAX_NUM_CODE_VALUES {
            return Err(CodecError::CorruptCode("too big code-values table".into()));
        }

        // At the root, length 1, there are two possible child nodes.
        let mut max_codes = 2u64;
        for code_len in 1..self.n_codes_per_length.len() {
            let n_codes = u64::from(self.n_codes_per_length[code_len]);
            // With code_len bits there can only be that many codes at all.
            let max_codes_in_curr_len = 1u64 << code_len;
            if n_codes > max_codes_in_curr_len {
                return Err(CodecError::CorruptCode(format!(
                    "can never have {n_codes} codes in {code_len}-bit len"
                )));
            }
            // And only this many slots are left unclaimed by shorter codes.
            if n_codes > max_codes {
                return Err(CodecError::CorruptCode(format!(
                    "can only fit {max_codes} out of {n_codes} codes in {code_len}-bit len"
                )));
            }
            max_codes -= n_codes;
            max_codes *= 2;
        }

        Ok(count)
    }

    pub fn set_code_values(&mut self, data: &[u32]) -> Result<()> {
        debug_assert!(data.len() <= T::MAX_NUM_CODE_VALUES);
        debug_assert!(data.len() == self.num_codes());

        for &value in data {
            if value > T::MAX_CODE_VALUE {
                return Err(CodecError::CorruptCode(format!(
                    "code value {value} is larger than maximum {}",
                    T::MAX_CODE_VALUE
                )));
            }
        }
        self.code_values = data.to_vec();
        Ok(())
    }

    pub fn set_code_values_u8(&mut self, data: &[u8]) -> Result<()> {
        let widened: Vec<u32> = data.iter().map(|&v| u32::from(v)).collect();
        self.set_code_values(&widened)
    }

    /// JPEG figures C.1/C.2: assign consecutive codes per length,
    /// doubling the running code between lengths.
    pub fn generate_code_symbols(&self) -> Vec<CodeSymbol> {
        let mut symbols = Vec::with_capacity(self.num_codes());
        let mut code = 0u32;
        for l in 1..self.n_codes_per_length.len() {
            for _ in 0..self.n_codes_per_length[l] {
                symbols.push(CodeSymbol::new(code, l as u8));
                code += 1;
            }
            code <<= 1;
        }
        symbols
    }

    pub fn into_prefix_code(self) -> Result<PrefixCode<T>> {
        let symbols = self.generate_code_symbols();
        PrefixCode::new(symbols, self.code_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_code_assignment() {
        let lengths = [0u8, 1, 5, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let values: Vec<u8> = (0..11).collect();
        let hc = HuffmanCode::<BaselineCodeTag>::from_dht(&lengths, &values).unwrap();
        let symbols = hc.generate_code_symbols();
        let lens: Vec<u8> = symbols.iter().map(|s| s.code_len).collect();
        assert_eq!(lens, vec![2, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8]);
        // First code of each length doubles the previous running code.
        assert_eq!(symbols[0].code, 0b00);
        assert_eq!(symbols[1].code, 0b010);
        assert_eq!(symbols[5].code, 0b110);
        assert_eq!(symbols[6].code, 0b1110);
        assert_eq!(symbols[10].code, 0b11111110);
    }

    #[test]
    fn rejects_over_subscribed_length() {
        let mut lengths = [0u8; 16];
        lengths[0] = 3; // three 1-bit codes can not exist
        let mut hc = HuffmanCode::<BaselineCodeTag>::new();
        assert!(matches!(
            hc.set_n_codes_per_length(&lengths),
            Err(CodecError::CorruptCode(_))
        ));
    }

    #[test]
    fn rejects_kraft_violation() {
        let mut lengths = [0u8; 16];
        lengths[0] = 2; // 0b0, 0b1: tree is exhausted
        lengths[1] = 1; // no 2-bit code can fit anymore
        let mut hc = HuffmanCode::<BaselineCodeTag>::new();
        assert!(matches!(
            hc.set_n_codes_per_length(&lengths),
            Err(CodecError::CorruptCode(_))
        ));
    }

    #[test]
    fn rejects_empty_histogram() {
        let lengths = [0u8; 16];
        let mut hc = HuffmanCode::<BaselineCodeTag>::new();
        assert!(matches!(
            hc.set_n_codes_per_length(&lengths),
            Err(CodecError::CorruptCode(_))
        ));
    }

    #[test]
    fn rejects_shared_prefix_symbols() {
        let symbols = vec![CodeSymbol::new(0b0, 1), CodeSymbol::new(0b01, 2)];
        let values = vec![1, 2];
        assert!(matches!(
            PrefixCode::<BaselineCodeTag>::new(symbols, values),
            Err(CodecError::CorruptCode(_))
        ));
    }

    #[test]
    fn rejects_unordered_symbols() {
        let symbols = vec![CodeSymbol::new(0b10, 2), CodeSymbol::new(0b0, 1)];
        let values = vec![1, 2];
        assert!(matches!(
            PrefixCode::<BaselineCodeTag>::new(symbols, values),
            Err(CodecError::CorruptCode(_))
        ));
    }

    #[test]
    fn rejects_oversized_code_value() {
        let symbols = vec![CodeSymbol::new(0b0, 1)];
        let values = vec![256];
        assert!(matches!(
            PrefixCode::<BaselineCodeTag>::new(symbols, values),
            Err(CodecError::CorruptCode(_))
        ));
        // The same value is fine for the wider VC5 alphabet.
        let symbols = vec![CodeSymbol::new(0b0, 1)];
        assert!(PrefixCode::<Vc5CodeTag>::new(symbols, vec![256]).is_ok());
    }

    #[test]
    fn common_prefix_detection() {
        let a = CodeSymbol::new(0b1101, 4);
        let b = CodeSymbol::new(0b11, 2);
        let c = CodeSymbol::new(0b10, 2);
        assert!(CodeSymbol::have_common_prefix(&a, &b));
        assert!(!CodeSymbol::have_common_prefix(&a, &c));
    }

    #[test]
    fn bits_msb_iteration() {
        let s = CodeSymbol::new(0b1011, 4);
        let bits: Vec<u32> = s.bits_msb().collect();
        assert_eq!(bits, vec![1, 0, 1, 1]);
    }
}
