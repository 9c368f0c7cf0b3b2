//! Canon CR2 sliced output layout and its scan decompressor.
//!
//! The LJPEG frame is laid out into vertical slices of fixed width
//! (the last one may differ); tiles within a slice stack vertically
//! and coalesce into vertical output strips. Subsampled formats
//! decode one pixel group at a time. See
//! <https://github.com/lclevy/libcraw2/blob/master/docs/cr2_lossless.pdf>
//! for the slice handling and sampling factor behavior.

use crate::bitstreams::{BitStreamer, Jpeg};
use crate::codes::{BaselineCodeTag, PrefixCodeDecoder};
use crate::error::{CodecError, Result};
use crate::geometry::{Point2, Rect2};
use crate::grid::Grid2D;

/// Slice widths, supplied out-of-band by the container format.
#[derive(Debug, Clone, Copy)]
pub struct Cr2Slicing {
    pub num_slices: i32,
    pub slice_width: i32,
    pub last_slice_width: i32,
}

impl Cr2Slicing {
    pub fn new(num_slices: i32, slice_width: i32, last_slice_width: i32) -> Self {
        Self { num_slices, slice_width, last_slice_width }
    }

    pub fn width_of_slice(&self, slice_id: i32) -> i32 {
        if slice_id == self.num_slices - 1 {
            self.last_slice_width
        } else {
            self.slice_width
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileSequenceStatus {
    ContinuesColumn,
    BeginsNewColumn,
    Invalid,
}

fn evaluate_consecutive_tiles(rect: &Rect2, next_rect: &Rect2) -> TileSequenceStatus {
    // Vertically adjacent rectangles of the same width?
    if rect.bottom_left() == next_rect.top_left() && rect.bottom_right() == next_rect.top_right()
    {
        return TileSequenceStatus::ContinuesColumn;
    }
    // Otherwise the next rectangle must start the next column.
    if next_rect.top() == 0 && next_rect.left() == rect.right() {
        return TileSequenceStatus::BeginsNewColumn;
    }
    TileSequenceStatus::Invalid
}

/// Yields the output tiles: one (slice width x frame height) tile per
/// slice, clamped to the remaining image rows at the bottom edge.
#[derive(Debug, Clone)]
struct OutputTileIter {
    img_dim: Point2,
    frame_height: i32,
    slicing: Cr2Slicing,
    slice_id: i32,
    slice_row: i32,
    out_pos: Point2,
}

impl OutputTileIter {
    fn new(img_dim: Point2, frame_height: i32, slicing: Cr2Slicing) -> Self {
        Self { img_dim, frame_height, slicing, slice_id: 0, slice_row: 0, out_pos: Point2::new(0, 0) }
    }
}

impl Iterator for OutputTileIter {
    type Item = Rect2;

    fn next(&mut self) -> Option<Rect2> {
        if self.slice_id >= self.slicing.num_slices {
            return None;
        }
        let slice_dim =
            Point2::new(self.slicing.width_of_slice(self.slice_id), self.frame_height);

        // Positioning, then clamping to the image's bottom edge.
        let mut tile = Rect2::new(self.out_pos, slice_dim);
        let out_rows_remaining = self.img_dim.y - tile.top();
        let tile_rows_remaining = tile.height() - self.slice_row;
        tile.dim.y = out_rows_remaining.min(tile_rows_remaining);

        self.slice_row += tile.height();
        self.out_pos = tile.bottom_left();
        if self.slice_row >= slice_dim.y {
            self.slice_id += 1;
            self.slice_row = 0;
        }
        if self.out_pos.y == self.img_dim.y {
            self.out_pos.y = 0;
            self.out_pos.x += tile.width();
        }
        Some(tile)
    }
}

/// One frame component's decoding recipe.
#[derive(Debug)]
pub struct PerComponentRecipe<'d, D: PrefixCodeDecoder<BaselineCodeTag>> {
    pub decoder: &'d D,
    pub init_pred: u16,
}

/// Per-format decode geometry. The inner loop decodes one group of
/// pixels at a time:
///  * for (N,1,1): N  = N*1*1 (full raw)
///  * for (3,2,1): 6  = 3*2*1
///  * for (3,2,2): 12 = 3*2*2
/// and advances x by N_COMP*X_S_F and y by Y_S_F.
#[derive(Debug, Clone, Copy)]
struct Dsc {
    n_comp: i32,
    x_s_f: i32,
    y_s_f: i32,
    slice_col_step: i32,
    pixels_per_group: i32,
    group_size: i32,
}

impl Dsc {
    fn new(format: (i32, i32, i32)) -> Self {
        let (n_comp, x_s_f, y_s_f) = format;
        let sub_sampled = x_s_f != 1 || y_s_f != 1;
        let pixels_per_group = x_s_f * y_s_f;
        Self {
            n_comp,
            x_s_f,
            y_s_f,
            slice_col_step: n_comp * x_s_f,
            pixels_per_group,
            group_size: if sub_sampled { 2 + pixels_per_group } else { n_comp },
        }
    }
}

fn le_both(a: Point2, b: Point2) -> bool {
    a.x <= b.x && a.y <= b.y
}

fn lt_both(a: Point2, b: Point2) -> bool {
    a.x < b.x && a.y < b.y
}

/// Decompresses a Canon CR2 sliced LJPEG scan.
#[derive(Debug)]
pub struct Cr2Decompressor<'a, 'd, D: PrefixCodeDecoder<BaselineCodeTag>> {
    dsc: Dsc,
    /// LJPEG frame dimensions, in groups.
    frame: Point2,
    /// Image dimensions: x in groups, y in rows.
    dim: Point2,
    /// Slice widths, in groups.
    slicing: Cr2Slicing,
    rec: Vec<PerComponentRecipe<'d, D>>,
    input: &'a [u8],
}

impl<'a, 'd, D: PrefixCodeDecoder<BaselineCodeTag>> Cr2Decompressor<'a, 'd, D> {
    /// `img_width` is in samples, `img_height` in rows; `frame_dim` is
    /// the logical LJPEG frame (width, height); slice widths are in
    /// samples.
    pub fn new(
        img_width: usize,
        img_height: usize,
        format: (i32, i32, i32),
        frame_dim: (i32, i32),
        mut slicing: Cr2Slicing,
        rec: Vec<PerComponentRecipe<'d, D>>,
        input: &'a [u8],
    ) -> Result<Self> {
        if !matches!(format, (3, 2, 2) | (3, 2, 1) | (2, 1, 1) | (4, 1, 1)) {
            return Err(CodecError::BadImageParameters(format!(
                "unknown format <{},{},{}>",
                format.0, format.1, format.2
            )));
        }
        let dsc = Dsc::new(format);

        let mut dim = Point2::new(img_width as i32, img_height as i32);
        if !dim.has_positive_area() || dim.x % dsc.group_size != 0 {
            return Err(CodecError::BadImageParameters(
                "unexpected image dimension multiplicity".into(),
            ));
        }
        dim.x /= dsc.group_size;

        let mut frame = Point2::new(frame_dim.0, frame_dim.1);
        if !frame.has_positive_area() || frame.x % dsc.x_s_f != 0 || frame.y % dsc.y_s_f != 0 {
            return Err(CodecError::BadImageParameters(
                "unexpected LJpeg frame dimension multiplicity".into(),
            ));
        }
        frame.x /= dsc.x_s_f;
        frame.y /= dsc.y_s_f;

        if img_width > 19440 || img_height > 5920 {
            return Err(CodecError::BadImageParameters(format!(
                "unexpected image dimensions found: ({img_width}; {img_height})"
            )));
        }

        for slice_id in 0..slicing.num_slices {
            if slicing.width_of_slice(slice_id) <= 0 {
                return Err(CodecError::BadImageParameters(format!(
                    "bad slice width: {}",
                    slicing.width_of_slice(slice_id)
                )));
            }
        }

        if rec.len() != dsc.n_comp as usize {
            return Err(CodecError::BadImageParameters(
                "HT/initial predictor count does not match component count".into(),
            ));
        }
        for recipe in &rec {
            if !recipe.decoder.is_full_decode() {
                return Err(CodecError::BadImageParameters(
                    "Huffman table is not of a full decoding variety".into(),
                ));
            }
        }

        for width in [&mut slicing.slice_width, &mut slicing.last_slice_width] {
            if *width % dsc.slice_col_step != 0 {
                return Err(CodecError::BadImageParameters(format!(
                    "slice width ({width}) should be multiple of pixel group size ({})",
                    dsc.slice_col_step
                )));
            }
            *width /= dsc.slice_col_step;
        }

        if frame.area() < dim.area() {
            return Err(CodecError::BadImageParameters(
                "frame area smaller than the image area".into(),
            ));
        }

        let this = Self { dsc, frame, dim, slicing, rec, input };
        this.validate_tiling()?;
        Ok(this)
    }

    fn all_output_tiles(&self) -> OutputTileIter {
        OutputTileIter::new(self.dim, self.frame.y, self.slicing)
    }

    fn validate_tiling(&self) -> Result<()> {
        let mut last_tile: Option<Rect2> = None;
        for tile in self.all_output_tiles() {
            if let Some(prev) = last_tile {
                if evaluate_consecutive_tiles(&prev, &tile) == TileSequenceStatus::Invalid {
                    return Err(CodecError::BadTiling(
                        "invalid tiling - slice width change mid-output row?".into(),
                    ));
                }
            }
            if le_both(tile.bottom_right(), self.dim) {
                last_tile = Some(tile);
                continue; // Tile still inbounds of the image.
            }
            if lt_both(tile.top_left(), self.dim) {
                return Err(CodecError::BadTiling(
                    "output tile partially outside of image".into(),
                ));
            }
            // The remaining tiles do not contribute to the image.
            break;
        }
        let Some(last_tile) = last_tile else {
            return Err(CodecError::BadTiling("no tiles are provided".into()));
        };
        if last_tile.bottom_right() != self.dim {
            return Err(CodecError::BadTiling(
                "tiles do not cover the entire image area".into(),
            ));
        }
        Ok(())
    }

    /// The tiles that contribute to the image, ending at the one whose
    /// bottom-right corner is the image corner.
    fn output_tiles(&self) -> Vec<Rect2> {
        let mut tiles = Vec::new();
        for tile in self.all_output_tiles() {
            tiles.push(tile);
            if tile.bottom_right() == self.dim {
                break;
            }
        }
        tiles
    }

    /// Coalesce vertically adjacent same-column tiles into strips.
    fn vertical_output_strips(&self) -> Vec<Rect2> {
        let tiles = self.output_tiles();
        let mut strips: Vec<Rect2> = Vec::new();
        for tile in tiles {
            match strips.last_mut() {
                Some(strip)
                    if evaluate_consecutive_tiles(strip, &tile)
                        == TileSequenceStatus::ContinuesColumn =>
                {
                    strip.dim.y += tile.dim.y;
                }
                _ => strips.push(tile),
            }
        }
        strips
    }

    /// Decode the scan; returns the number of scan bytes consumed.
    pub fn decompress(&self, out: &mut Grid2D<'_>) -> Result<usize> {
        let dsc = &self.dsc;
        let n_comp = dsc.n_comp as usize;
        let group_size = dsc.group_size as usize;

        debug_assert!(out.width() == (self.dim.x as usize) * group_size);

        let mut pred: Vec<u16> = self.rec.iter().map(|r| r.init_pred).collect();
        // Where to reload predictors from when a logical frame row
        // wraps: the first group decoded in the previous frame row.
        let mut pred_next_row = 0usize;
        let mut pred_next_base = 0usize;

        let mut bs = BitStreamer::<Jpeg>::new(self.input)?;

        let mut global_frame_col: i32 = 0;

        for strip in self.vertical_output_strips() {
            for row in strip.top()..strip.bottom() {
                let mut col = strip.left();
                let col_end = strip.right();
                while col != col_end {
                    // Did we process one full raw row worth of pixels?
                    if self.frame.x - global_frame_col == 0 {
                        // If yes -> update the predictor by going back
                        // exactly one row, no matter where we are right
                        // now. Makes no sense from an image compression
                        // point of view, ask Canon.
                        for (c, pred) in pred.iter_mut().enumerate() {
                            let idx = if c == 0 { 0 } else { group_size - (n_comp - c) };
                            *pred = out.at(pred_next_row, pred_next_base + idx);
                        }
                        pred_next_row = row as usize;
                        pred_next_base = group_size * col as usize;
                        global_frame_col = 0;
                    }

                    // Decode until the end of either the frame row
                    // (predictor change time) or the current strip row.
                    let col_frame_end = col_end.min(col + (self.frame.x - global_frame_col));
                    while col != col_frame_end {
                        for p in 0..group_size {
                            let c = if p < dsc.pixels_per_group as usize {
                                0
                            } else {
                                p - dsc.pixels_per_group as usize + 1
                            };
                            let diff = self.rec[c].decoder.decode_difference(&mut bs)?;
                            pred[c] = pred[c].wrapping_add(diff as u16);
                            out.set(row as usize, group_size * col as usize + p, pred[c]);
                        }
                        col += 1;
                        global_frame_col += 1;
                    }
                }
            }
        }
        Ok(bs.stream_position())
    }
}
