//! Lossless JPEG (ITU-T T.81 process 14, SOF3) decompression.
//!
//! [`decoder::LJpegDecoder`] runs the marker state machine and
//! dispatches the entropy-coded scan either to the plain tiled path
//! ([`scan`]) or to the Canon CR2 sliced path ([`cr2`]).

pub mod cr2;
pub mod decoder;
pub mod markers;
pub mod scan;

pub use cr2::{Cr2Decompressor, Cr2Slicing};
pub use decoder::{LJpegDecoder, OutputLayout};
pub use markers::JpegMarker;

use crate::codes::lookup::PrefixCodeLookupDecoder;
use crate::codes::lut::PrefixCodeLutDecoder;
use crate::codes::BaselineCodeTag;
use crate::error::{CodecError, Result};

/// The decoder representation the LJPEG machinery builds from DHT
/// segments: the LUT accelerator over the per-length lookup walker.
pub type LJpegPrefixDecoder =
    PrefixCodeLutDecoder<BaselineCodeTag, PrefixCodeLookupDecoder<BaselineCodeTag>>;

/// Per-component state from SOF/SOS markers.
#[derive(Debug, Clone, Copy)]
pub struct JpegComponentInfo {
    /// Identifier for this component (0..255), from SOF.
    pub component_id: u32,
    /// DC Huffman table selector (0..3), from SOS.
    pub dc_tbl_index: u32,
    /// Horizontal sampling factor.
    pub super_h: u32,
    /// Vertical sampling factor.
    pub super_v: u32,
}

impl Default for JpegComponentInfo {
    fn default() -> Self {
        Self { component_id: !0, dc_tbl_index: !0, super_h: !0, super_v: !0 }
    }
}

/// The parsed SOF3 frame header.
#[derive(Debug, Clone, Default)]
pub struct SofInfo {
    pub comp_info: [JpegComponentInfo; 4],
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub precision: u32,
    pub initialized: bool,
}

impl SofInfo {
    /// The initial DC predictor for every component:
    /// `2^(precision - pt - 1)`.
    pub fn initial_predictor(&self, pt: u32) -> Result<u16> {
        if self.precision < pt + 1 {
            return Err(CodecError::BadImageParameters(format!(
                "invalid precision ({}) and point transform ({pt}) combination",
                self.precision
            )));
        }
        Ok(1 << (self.precision - pt - 1))
    }
}

/// What the destination image expects of the frame.
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    /// Samples per pixel of the destination (1..=3).
    pub cpp: u32,
    /// The destination's declared (horizontal, vertical) subsampling;
    /// the first frame component must match.
    pub subsampling: (u32, u32),
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self { cpp: 1, subsampling: (1, 1) }
    }
}
