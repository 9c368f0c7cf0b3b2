/*!
# rawcodec-rs

`rawcodec-rs` is the bitstream codec core of a RAW camera image
decoder: the layered facilities every supported RAW format ultimately
consumes its data through.

## Layers

- **Byte buffers** (`byte_stream`): bounds-checked views and an
  endian-aware cursor reader.
- **Bit streamers** (`bitstreams::streamer`): a 64-bit cached reader of
  1-32 bit fields under five bit orderings (LSB, MSB, MSB16, MSB32 and
  JPEG with byte unstuffing).
- **Bit vacuumers** (`bitstreams::vacuumer`): the symmetric writers,
  including JPEG byte stuffing.
- **Prefix codes** (`codes`): the abstract Huffman/prefix-code model
  with baseline (JPEG) and VC-5 instantiations, four decoder
  representations (binary tree, parallel vectors, per-length lookup,
  and a LUT accelerator over any of them) and a vector encoder.
- **Lossless JPEG** (`ljpeg`): the SOF3 marker state machine and scan
  decompressor, including restart intervals, chroma subsampling and
  the Canon CR2 sliced output layout.

## Scope

The core is single-threaded and reentrant per instance; callers may
parallelize across independent decompressor instances with disjoint
inputs and outputs. Vendor RAW decoders, TIFF parsing, color
processing and pixel storage policy live elsewhere.
*/

pub mod bitstreams;
pub mod byte_stream;
pub mod codes;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod ljpeg;

pub use byte_stream::{Buffer, ByteStream, Endianness};
pub use error::{CodecError, Result};
pub use grid::Grid2D;
pub use ljpeg::{Cr2Slicing, ImageSpec, LJpegDecoder, OutputLayout};

use byte_stream::Endianness as En;
use ljpeg::markers::{advance_to_next_marker, JpegMarker};

/// Basic information about an LJPEG frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Width of the frame in MCUs per row.
    pub width: u32,
    /// Height of the frame in rows.
    pub height: u32,
    /// Bits per sample (2-16).
    pub bits_per_sample: u32,
    /// Number of components (1-4).
    pub component_count: u32,
}

/// Scan `input` (starting at SOI) for the SOF3 marker and report the
/// frame geometry without decoding anything.
pub fn peek_frame_info(input: &[u8]) -> Result<FrameInfo> {
    let mut bs = ByteStream::new(input, En::Big);
    if advance_to_next_marker(&mut bs, false)? != JpegMarker::Soi {
        return Err(CodecError::BadMarker(
            "image did not start with SOI, probably not an LJPEG".into(),
        ));
    }
    bs.skip_bytes(2)?;

    loop {
        let marker = advance_to_next_marker(&mut bs, true)?;
        bs.skip_bytes(2)?;
        match marker {
            JpegMarker::Eoi => {
                return Err(CodecError::BadMarker("no SOF3 marker in stream".into()))
            }
            JpegMarker::Sof3 => {
                let len = bs.peek_u16(0)? as usize;
                let mut data = bs.get_stream(len)?;
                data.skip_bytes(2)?;
                let precision = u32::from(data.get_u8()?);
                let height = u32::from(data.get_u16()?);
                let width = u32::from(data.get_u16()?);
                let components = u32::from(data.get_u8()?);
                return Ok(FrameInfo {
                    width,
                    height,
                    bits_per_sample: precision,
                    component_count: components,
                });
            }
            JpegMarker::Tem => continue,
            m if m.restart_marker_number().is_some() => continue,
            JpegMarker::Sos => {
                return Err(CodecError::BadMarker("no SOF3 marker before SOS".into()))
            }
            _ => {
                let len = bs.peek_u16(0)? as usize;
                if len < 2 {
                    return Err(CodecError::BadMarker("invalid marker segment length".into()));
                }
                bs.skip_bytes(len)?;
            }
        }
    }
}
