// Encode/decode round trips across every prefix-code decoder
// representation, in both code-value and full-decode modes.

use rawcodec_rs::bitstreams::{BitStreamer, BitVacuumer, Jpeg, Msb32};
use rawcodec_rs::codes::{
    BaselineCodeTag, CodeSymbol, HuffmanCode, PrefixCode, PrefixCodeDecoder,
    PrefixCodeLookupDecoder, PrefixCodeLutDecoder, PrefixCodeTreeDecoder,
    PrefixCodeVectorDecoder, PrefixCodeVectorEncoder, Vc5CodeTag,
};

struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        (x >> 32) as u32
    }
}

/// A histogram that respects the Kraft bound, with `n_values` codes.
/// Lengths are drawn at random but never over-subscribe a level.
fn random_histogram(rng: &mut XorShift, n_values: usize, max_len: usize) -> Vec<u8> {
    loop {
        let mut histogram = vec![0u8; max_len];
        let mut max_codes: u64 = 2;
        let mut left = n_values;
        for (len, slot) in histogram.iter_mut().enumerate() {
            let cap = max_codes.min(left as u64);
            // Keep the last level able to absorb the remainder.
            let n = if len + 1 == max_len {
                cap
            } else {
                u64::from(rng.next_u32()) % (cap + 1)
            };
            *slot = n as u8;
            left -= n as usize;
            max_codes -= n;
            max_codes *= 2;
            if left == 0 {
                break;
            }
        }
        if left == 0 {
            return histogram;
        }
        // Unlucky draw; try again deterministically.
    }
}

fn diff_code(rng: &mut XorShift, n_diff_lengths: usize) -> HuffmanCode<BaselineCodeTag> {
    let histogram = random_histogram(rng, n_diff_lengths, 16);
    let values: Vec<u8> = (0..n_diff_lengths as u8).collect();
    HuffmanCode::from_dht(&histogram, &values).unwrap()
}

fn roundtrip_differences<D: PrefixCodeDecoder<BaselineCodeTag>>(
    decoder: &D,
    encoder: &PrefixCodeVectorEncoder<BaselineCodeTag>,
    diffs: &[i32],
) {
    let mut encoded = Vec::new();
    {
        let mut bv = BitVacuumer::<Jpeg>::new(&mut encoded);
        for &d in diffs {
            encoder.encode_difference(&mut bv, d).unwrap();
        }
        bv.flush();
    }
    encoded.resize(encoded.len() + 16, 0);

    let mut bs = BitStreamer::<Jpeg>::new(&encoded).unwrap();
    for &d in diffs {
        assert_eq!(decoder.decode_difference(&mut bs).unwrap(), d);
    }
}

fn roundtrip_code_values<T, D>(
    decoder: &D,
    encoder: &PrefixCodeVectorEncoder<T>,
    values: &[u32],
) where
    T: rawcodec_rs::codes::CodeTag,
    D: PrefixCodeDecoder<T>,
{
    let mut encoded = Vec::new();
    {
        let mut bv = BitVacuumer::<Msb32>::new(&mut encoded);
        for &v in values {
            encoder.encode_code_value(&mut bv, v).unwrap();
        }
        bv.flush();
    }
    encoded.resize(encoded.len() + 16, 0);

    let mut bs = BitStreamer::<Msb32>::new(&encoded).unwrap();
    for &v in values {
        assert_eq!(decoder.decode_code_value(&mut bs).unwrap(), v);
    }
}

#[test]
fn full_decode_roundtrip_all_representations() {
    let mut rng = XorShift::new(0xC0DE_C0DE_1234_5678);

    for round in 0..8 {
        // Alphabets of diff lengths 0..n; n up to 12 keeps diffs in
        // sane sample ranges.
        let n_diff_lengths = 2 + (round % 11);
        let hc = diff_code(&mut rng, n_diff_lengths);

        let max_mag = (1i64 << (n_diff_lengths - 1)) - 1;
        let diffs: Vec<i32> = (0..256)
            .map(|_| {
                let span = (2 * max_mag + 1) as u64;
                (u64::from(rng.next_u32()) % span) as i64 - max_mag
            })
            .map(|d| d as i32)
            .collect();

        let encoder = PrefixCodeVectorEncoder::from_huffman(hc.clone(), true, false).unwrap();

        let tree = PrefixCodeTreeDecoder::from_huffman(hc.clone(), true, false).unwrap();
        roundtrip_differences(&tree, &encoder, &diffs);

        let vector = PrefixCodeVectorDecoder::from_huffman(hc.clone(), true, false).unwrap();
        roundtrip_differences(&vector, &encoder, &diffs);

        let lookup = PrefixCodeLookupDecoder::new(hc.clone(), true, false).unwrap();
        roundtrip_differences(&lookup, &encoder, &diffs);

        let lut: PrefixCodeLutDecoder<_, PrefixCodeLookupDecoder<_>> =
            PrefixCodeLutDecoder::new(hc.clone(), true, false).unwrap();
        roundtrip_differences(&lut, &encoder, &diffs);

        let lut_over_tree: PrefixCodeLutDecoder<_, PrefixCodeTreeDecoder<_>> =
            PrefixCodeLutDecoder::new(hc.clone(), true, false).unwrap();
        roundtrip_differences(&lut_over_tree, &encoder, &diffs);

        let lut_over_vector: PrefixCodeLutDecoder<_, PrefixCodeVectorDecoder<_>> =
            PrefixCodeLutDecoder::new(hc, true, false).unwrap();
        roundtrip_differences(&lut_over_vector, &encoder, &diffs);
    }
}

#[test]
fn code_value_roundtrip_all_representations() {
    let mut rng = XorShift::new(0xBADC_0FFE_E0DD_F00D);

    for n_values in [1usize, 4, 11, 16] {
        let histogram = random_histogram(&mut rng, n_values, 16);
        // Arbitrary (not diff-length) code values in value-only mode.
        let alphabet: Vec<u8> = (0..n_values as u8).map(|v| v.wrapping_mul(17)).collect();
        let hc = HuffmanCode::<BaselineCodeTag>::from_dht(&histogram, &alphabet).unwrap();

        let values: Vec<u32> = (0..256)
            .map(|_| u32::from(alphabet[(rng.next_u32() as usize) % alphabet.len()]))
            .collect();

        let encoder = PrefixCodeVectorEncoder::from_huffman(hc.clone(), false, false).unwrap();

        let tree = PrefixCodeTreeDecoder::from_huffman(hc.clone(), false, false).unwrap();
        roundtrip_code_values(&tree, &encoder, &values);

        let vector = PrefixCodeVectorDecoder::from_huffman(hc.clone(), false, false).unwrap();
        roundtrip_code_values(&vector, &encoder, &values);

        let lookup = PrefixCodeLookupDecoder::new(hc.clone(), false, false).unwrap();
        roundtrip_code_values(&lookup, &encoder, &values);

        let lut: PrefixCodeLutDecoder<_, PrefixCodeLookupDecoder<_>> =
            PrefixCodeLutDecoder::new(hc, false, false).unwrap();
        roundtrip_code_values(&lut, &encoder, &values);
    }
}

#[test]
fn vc5_wide_alphabet_roundtrip() {
    // VC5-style codebook: explicit symbols, code values wider than a
    // byte, no full-decode mode.
    let symbols = vec![
        CodeSymbol::new(0b0, 1),
        CodeSymbol::new(0b10, 2),
        CodeSymbol::new(0b110, 3),
        CodeSymbol::new(0b111, 3),
    ];
    let code_values = vec![0u32, 1, 12, 524_287];
    let code = PrefixCode::<Vc5CodeTag>::new(symbols, code_values.clone()).unwrap();

    let encoder = PrefixCodeVectorEncoder::new(code.clone(), false, false).unwrap();
    let tree = PrefixCodeTreeDecoder::new(code.clone(), false, false).unwrap();
    let vector = PrefixCodeVectorDecoder::new(code, false, false).unwrap();

    let mut rng = XorShift::new(7);
    let values: Vec<u32> =
        (0..128).map(|_| code_values[(rng.next_u32() as usize) % code_values.len()]).collect();

    roundtrip_code_values(&tree, &encoder, &values);
    roundtrip_code_values(&vector, &encoder, &values);
}

#[test]
fn deep_codes_cross_the_lut_depth() {
    // Codes straddling the 11-bit LUT depth: short codes resolve in
    // the table, long ones fall back to the backend walk.
    let mut lengths = [0u8; 16];
    lengths[0] = 1; // len 1
    lengths[10] = 1; // len 11 (exactly the depth)
    lengths[13] = 1; // len 14 (miss)
    lengths[14] = 2; // len 15 (miss)
    let values = [0u8, 3, 6, 9, 12];
    let hc = HuffmanCode::<BaselineCodeTag>::from_dht(&lengths, &values).unwrap();

    let encoder = PrefixCodeVectorEncoder::from_huffman(hc.clone(), false, false).unwrap();
    let lut: PrefixCodeLutDecoder<_, PrefixCodeLookupDecoder<_>> =
        PrefixCodeLutDecoder::new(hc, false, false).unwrap();

    let mut rng = XorShift::new(99);
    let values: Vec<u32> =
        (0..256).map(|_| u32::from(values[(rng.next_u32() as usize) % values.len()])).collect();
    roundtrip_code_values(&lut, &encoder, &values);
}
