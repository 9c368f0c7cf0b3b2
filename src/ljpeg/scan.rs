//! Plain tiled scan decompression (no subsampling), with restart
//! interval support.

use crate::bitstreams::{BitStreamer, Jpeg};
use crate::codes::PrefixCodeDecoder;
use crate::error::{CodecError, Result};
use crate::grid::Grid2D;
use crate::ljpeg::{LJpegPrefixDecoder, SofInfo};

/// Destination rectangle within the output grid, in samples/rows.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileDest {
    pub offset_x: usize,
    pub offset_y: usize,
    pub width: usize,
    pub height: usize,
}

/// The next real marker (`FF xx`, `xx` neither stuffing nor fill) at
/// or after `from`. Safe to call over entropy-coded data: data `FF`s
/// are always followed by a `00` stuffing byte.
fn find_marker(scan: &[u8], from: usize) -> Option<(usize, u8)> {
    let mut i = from;
    while i + 1 < scan.len() {
        if scan[i] == 0xFF && scan[i + 1] != 0x00 && scan[i + 1] != 0xFF {
            return Some((i, scan[i + 1]));
        }
        i += 1;
    }
    None
}

/// Decode `frame`-shaped MCU rows into `dest`, predictor mode 1.
///
/// Every MCU holds one sample per component. The frame row may be
/// wider than the destination; trailing samples are decoded and
/// discarded to keep the bit stream in sync. Returns the number of
/// scan bytes consumed.
pub(crate) fn decode_scan(
    out: &mut Grid2D<'_>,
    dest: TileDest,
    frame: &SofInfo,
    decoders: &[&LJpegPrefixDecoder],
    initial_pred: u16,
    restart_interval: u32,
    scan_input: &[u8],
) -> Result<usize> {
    let n_comp = frame.components as usize;
    let mcus_per_row = frame.width as usize;
    let frame_row_samples = mcus_per_row * n_comp;

    if dest.width > frame_row_samples {
        return Err(CodecError::BadImageParameters(
            "tile row is wider than the frame row".into(),
        ));
    }
    if dest.height > frame.height as usize {
        return Err(CodecError::BadImageParameters(
            "tile is taller than the frame".into(),
        ));
    }

    let mcus_per_interval =
        if restart_interval == 0 { usize::MAX } else { restart_interval as usize };

    let mut offset = 0usize; // Scan offset the current bit streamer starts at.
    let mut bs = BitStreamer::<Jpeg>::new(scan_input)?;
    let mut pred = vec![initial_pred; n_comp];
    let mut row_start_pred = vec![initial_pred; n_comp];
    let mut mcus_in_interval = 0usize;
    let mut completed_intervals = 0usize;

    'scan: for row in 0..dest.height {
        // The predictor at a row start is the pixel directly above.
        if row > 0 {
            pred.copy_from_slice(&row_start_pred);
        }

        for mcu_col in 0..mcus_per_row {
            if mcus_in_interval == mcus_per_interval {
                // Re-align to the byte boundary and consume the RSTn
                // marker; all DC predictors reset.
                let consumed = offset + bs.stream_position();
                let Some((marker_pos, marker_byte)) = find_marker(scan_input, consumed) else {
                    return Err(CodecError::BadMarker("missing restart marker".into()));
                };
                let expected = 0xD0 + (completed_intervals % 8) as u8;
                if marker_byte != expected {
                    return Err(CodecError::BadMarker(format!(
                        "expected RST{} marker, found FF {marker_byte:02X}",
                        completed_intervals % 8
                    )));
                }
                offset = marker_pos + 2;
                bs = match BitStreamer::<Jpeg>::new(&scan_input[offset..]) {
                    Ok(bs) => bs,
                    // The stream ends right after the marker; decoding
                    // simply stops here.
                    Err(CodecError::InsufficientInput) => return Ok(offset),
                    Err(e) => return Err(e),
                };
                completed_intervals += 1;
                mcus_in_interval = 0;
                pred.fill(initial_pred);
            }

            for (c, decoder) in decoders.iter().enumerate() {
                let diff = match decoder.decode_difference(&mut bs) {
                    Ok(diff) => diff,
                    // Speculative decode ran off the end of the input;
                    // hand back what was decoded so far.
                    Err(CodecError::EndOfStream) => break 'scan,
                    Err(e) => return Err(e),
                };
                pred[c] = pred[c].wrapping_add(diff as u16);
                if mcu_col == 0 {
                    row_start_pred[c] = pred[c];
                }
                let col = mcu_col * n_comp + c;
                if col < dest.width {
                    out.set(dest.offset_y + row, dest.offset_x + col, pred[c]);
                }
            }
            mcus_in_interval += 1;
        }
    }

    Ok(offset + bs.stream_position())
}
