//! The LJPEG marker state machine.
//!
//! Parses SOI/DHT/SOF3/SOS/DRI/EOI, builds prefix-code decoders from
//! DHT segments (de-duplicating identical tables), and hands the
//! entropy-coded scan to the plain tiled or CR2 sliced decompressor.

use log::debug;

use crate::byte_stream::{ByteStream, Endianness};
use crate::codes::{BaselineCodeTag, HuffmanCode};
use crate::error::{CodecError, Result};
use crate::grid::Grid2D;
use crate::ljpeg::cr2::{Cr2Decompressor, Cr2Slicing, PerComponentRecipe};
use crate::ljpeg::markers::{advance_to_next_marker, JpegMarker};
use crate::ljpeg::scan::{self, TileDest};
use crate::ljpeg::{ImageSpec, LJpegPrefixDecoder, SofInfo};

/// Where the decoded samples go.
#[derive(Debug, Clone)]
pub enum OutputLayout {
    /// A plain rectangular tile of the destination, in samples/rows.
    Tile { offset_x: usize, offset_y: usize, width: usize, height: usize },
    /// Canon CR2 vertical slices; widths are supplied out-of-band.
    Cr2Sliced { slicing: Cr2Slicing },
}

/// Decompresses one lossless JPEG stream into a caller-provided
/// 16-bit sample grid.
pub struct LJpegDecoder<'a> {
    input: ByteStream<'a>,
    spec: ImageSpec,
    frame: SofInfo,
    predictor_mode: u32,
    pt: u32,
    restart_interval: u16,
    fix_dng_bug_16: bool,
    /// Decoders interpret code values as difference lengths. Some
    /// broken files (Hasselblad) need the value-only mode instead.
    full_decode: bool,
    /// Old Hasselblad erratum: no EOI after the (first) full scan.
    erratum_implicit_eoi_after_scan: bool,
    huffman_store: Vec<HuffmanCode<BaselineCodeTag>>,
    decoder_store: Vec<LJpegPrefixDecoder>,
    /// Table destination slots, indices into the store.
    huff: [Option<usize>; 4],
}

impl<'a> LJpegDecoder<'a> {
    /// `input` must point at the SOI marker.
    pub fn new(input: &'a [u8], spec: ImageSpec) -> Result<Self> {
        if spec.cpp < 1 || spec.cpp > 3 {
            return Err(CodecError::BadImageParameters(format!(
                "unexpected component count ({})",
                spec.cpp
            )));
        }
        Ok(Self {
            input: ByteStream::new(input, Endianness::Big),
            spec,
            frame: SofInfo::default(),
            predictor_mode: 0,
            pt: 0,
            restart_interval: 0,
            fix_dng_bug_16: false,
            full_decode: true,
            erratum_implicit_eoi_after_scan: false,
            huffman_store: Vec::new(),
            decoder_store: Vec::new(),
            huff: [None; 4],
        })
    }

    /// Opt into the old-Hasselblad tolerance for streams that omit the
    /// EOI marker after the first complete scan.
    pub fn with_implicit_eoi_erratum(mut self) -> Self {
        self.erratum_implicit_eoi_after_scan = true;
        self
    }

    /// The parsed frame header, once a scan has been decoded.
    pub fn frame(&self) -> &SofInfo {
        &self.frame
    }

    pub fn sample_precision(&self) -> u32 {
        self.frame.precision
    }

    /// Run the full marker machine and decode the scan into `out`.
    pub fn decode(
        &mut self,
        out: &mut Grid2D<'_>,
        layout: OutputLayout,
        fix_dng_bug_16: bool,
    ) -> Result<()> {
        if out.width() == 0 || out.height() == 0 {
            return Err(CodecError::BadImageParameters("image has zero size".into()));
        }
        if let OutputLayout::Tile { offset_x, offset_y, width, height } = &layout {
            let (offset_x, offset_y, width, height) = (*offset_x, *offset_y, *width, *height);
            if offset_x >= out.width() || offset_y >= out.height() {
                return Err(CodecError::BadImageParameters(
                    "tile offset outside of image".into(),
                ));
            }
            if width > out.width() || height > out.height() {
                return Err(CodecError::BadImageParameters(
                    "tile larger than image".into(),
                ));
            }
            if offset_x + width > out.width() || offset_y + height > out.height() {
                return Err(CodecError::BadImageParameters(
                    "tile overflows image".into(),
                ));
            }
            if width == 0 || height == 0 {
                return Ok(()); // Nothing needed from this tile.
            }
        }

        self.fix_dng_bug_16 = fix_dng_bug_16;
        self.decode_soi(out, &layout)
    }

    fn get_next_marker(&mut self, allow_skip: bool) -> Result<JpegMarker> {
        let marker = advance_to_next_marker(&mut self.input, allow_skip)?;
        self.input.skip_bytes(2)?;
        Ok(marker)
    }

    fn decode_soi(&mut self, out: &mut Grid2D<'_>, layout: &OutputLayout) -> Result<()> {
        if self.get_next_marker(false)? != JpegMarker::Soi {
            return Err(CodecError::BadMarker(
                "image did not start with SOI, probably not an LJPEG".into(),
            ));
        }
        debug!("Start of image");

        let mut found_dri = false;
        let mut found_dht = false;
        let mut found_sof = false;
        let mut found_sos = false;

        loop {
            let marker = self.get_next_marker(true)?;
            if marker == JpegMarker::Eoi {
                break;
            }
            // Restart and stand-alone markers carry no segment.
            if matches!(marker, JpegMarker::Tem) || marker.restart_marker_number().is_some() {
                continue;
            }

            let segment_len = self.input.peek_u16(0)? as usize;
            if segment_len < 2 {
                return Err(CodecError::BadMarker("invalid marker segment length".into()));
            }
            let mut data = self.input.get_stream(segment_len)?;
            data.skip_bytes(2)?; // The length field itself.

            match marker {
                JpegMarker::Dht => {
                    if found_sos {
                        return Err(CodecError::BadMarker(
                            "found second DHT marker after SOS".into(),
                        ));
                    }
                    // There can be more than one DHT marker.
                    self.parse_dht(data)?;
                    found_dht = true;
                }
                JpegMarker::Sof3 => {
                    if found_sos {
                        return Err(CodecError::BadMarker(
                            "found second SOF marker after SOS".into(),
                        ));
                    }
                    if found_sof {
                        return Err(CodecError::BadMarker("found second SOF marker".into()));
                    }
                    // SOF is not required to be after DHT.
                    self.parse_sof(data, out)?;
                    found_sof = true;
                }
                JpegMarker::Sos => {
                    if found_sos {
                        return Err(CodecError::BadMarker("found second SOS marker".into()));
                    }
                    if !found_dht {
                        return Err(CodecError::BadMarker(
                            "did not find DHT marker before SOS".into(),
                        ));
                    }
                    if !found_sof {
                        return Err(CodecError::BadMarker(
                            "did not find SOF marker before SOS".into(),
                        ));
                    }
                    self.parse_sos(data, out, layout)?;
                    found_sos = true;
                    if self.erratum_implicit_eoi_after_scan {
                        return Ok(());
                    }
                }
                JpegMarker::Dqt => {
                    return Err(CodecError::BadMarker("not a valid RAW file".into()));
                }
                JpegMarker::Dri => {
                    if found_dri {
                        return Err(CodecError::BadMarker("found second DRI marker".into()));
                    }
                    self.parse_dri(data)?;
                    found_dri = true;
                }
                // Just skip to the next marker.
                _ => debug!("Skipping marker {marker:?}"),
            }
        }

        if !found_sos {
            return Err(CodecError::BadMarker("did not find SOS marker".into()));
        }
        Ok(())
    }

    fn parse_sof(&mut self, mut data: ByteStream<'a>, out: &Grid2D<'_>) -> Result<()> {
        let sof = &mut self.frame;
        sof.precision = u32::from(data.get_u8()?);
        sof.height = u32::from(data.get_u16()?);
        sof.width = u32::from(data.get_u16()?);
        sof.components = u32::from(data.get_u8()?);

        if sof.precision < 2 || sof.precision > 16 {
            return Err(CodecError::BadImageParameters(format!(
                "invalid precision ({})",
                sof.precision
            )));
        }
        if sof.height == 0 || sof.width == 0 {
            return Err(CodecError::BadImageParameters(
                "frame width or height set to zero".into(),
            ));
        }
        if sof.components < 1 || sof.components > 4 {
            return Err(CodecError::BadImageParameters(
                "only from 1 to 4 components are supported".into(),
            ));
        }
        if sof.components < self.spec.cpp {
            return Err(CodecError::BadImageParameters(format!(
                "component count should be no less than sample count ({} vs {})",
                sof.components, self.spec.cpp
            )));
        }
        if sof.components as usize > out.width() {
            return Err(CodecError::BadImageParameters(format!(
                "component count should be no greater than row length ({} vs {})",
                sof.components,
                out.width()
            )));
        }

        if data.remaining() != 3 * sof.components as usize {
            return Err(CodecError::BadImageParameters("header size mismatch".into()));
        }

        for i in 0..sof.components as usize {
            sof.comp_info[i].component_id = u32::from(data.get_u8()?);

            let subs = u32::from(data.get_u8()?);
            sof.comp_info[i].super_v = subs & 0xF;
            sof.comp_info[i].super_h = subs >> 4;

            if sof.comp_info[i].super_v < 1 || sof.comp_info[i].super_v > 4 {
                return Err(CodecError::BadImageParameters(
                    "vertical sampling factor is invalid".into(),
                ));
            }
            if sof.comp_info[i].super_h < 1 || sof.comp_info[i].super_h > 4 {
                return Err(CodecError::BadImageParameters(
                    "horizontal sampling factor is invalid".into(),
                ));
            }

            let tq = data.get_u8()?;
            if tq != 0 {
                return Err(CodecError::BadImageParameters(
                    "quantized components not supported".into(),
                ));
            }
        }

        if sof.comp_info[0].super_h != self.spec.subsampling.0
            || sof.comp_info[0].super_v != self.spec.subsampling.1
        {
            return Err(CodecError::BadImageParameters(
                "LJpeg's subsampling does not match image's subsampling".into(),
            ));
        }

        debug!(
            "SOF3: {}x{}, {} bits, {} components",
            sof.width, sof.height, sof.precision, sof.components
        );
        sof.initialized = true;
        Ok(())
    }

    fn parse_sos(
        &mut self,
        mut data: ByteStream<'a>,
        out: &mut Grid2D<'_>,
        layout: &OutputLayout,
    ) -> Result<()> {
        debug_assert!(self.frame.initialized);

        if data.remaining() != 1 + 2 * self.frame.components as usize + 3 {
            return Err(CodecError::BadImageParameters("invalid SOS header length".into()));
        }

        let sos_cps = u32::from(data.get_u8()?);
        if sos_cps != self.frame.components {
            return Err(CodecError::BadImageParameters("component number mismatch".into()));
        }

        for _ in 0..self.frame.components {
            let cs = u32::from(data.get_u8()?);
            let td = u32::from(data.get_u8()?) >> 4;

            if td >= self.huff.len() as u32 || self.huff[td as usize].is_none() {
                return Err(CodecError::BadImageParameters(
                    "invalid Huffman table selection".into(),
                ));
            }

            let ci = (0..self.frame.components as usize)
                .find(|&j| self.frame.comp_info[j].component_id == cs)
                .ok_or_else(|| {
                    CodecError::BadImageParameters("invalid component selector".into())
                })?;
            self.frame.comp_info[ci].dc_tbl_index = td;
        }

        // Predictor selection, table H.1. T.81 allows [0..7], but
        // Hasselblad uses '8'.
        self.predictor_mode = u32::from(data.get_u8()?);
        if self.predictor_mode > 8 {
            return Err(CodecError::BadImageParameters("invalid predictor mode".into()));
        }

        // Se and Ah are not used in LJPEG.
        if data.get_u8()? != 0 {
            return Err(CodecError::BadImageParameters("Se/Ah not zero".into()));
        }

        self.pt = u32::from(data.get_u8()?); // Point transform
        if self.pt > 15 {
            return Err(CodecError::BadImageParameters("invalid point transform".into()));
        }
        if self.pt != 0 {
            return Err(CodecError::BadImageParameters(
                "point transform not supported".into(),
            ));
        }

        debug!(
            "SOS: predictor mode {}, Pt {}, restart interval {}",
            self.predictor_mode, self.pt, self.restart_interval
        );

        let scan_length = self.decode_scan(out, layout)?;
        self.input.skip_bytes(scan_length.min(self.input.remaining()))?;
        Ok(())
    }

    fn parse_dht(&mut self, mut data: ByteStream<'a>) -> Result<()> {
        while data.remaining() > 0 {
            let b = u32::from(data.get_u8()?);

            let ht_class = b >> 4;
            if ht_class != 0 {
                return Err(CodecError::CorruptCode("unsupported table class".into()));
            }

            let ht_index = (b & 0xF) as usize;
            if ht_index >= self.huff.len() {
                return Err(CodecError::CorruptCode(
                    "invalid huffman table destination id".into(),
                ));
            }
            if self.huff[ht_index].is_some() {
                return Err(CodecError::CorruptCode("duplicate table definition".into()));
            }

            let mut hc = HuffmanCode::<BaselineCodeTag>::new();
            let n_codes = hc.set_n_codes_per_length(data.get_slice(16)?)?;

            // T.81 allows at most 16 codes, but Hasselblad
            // violates that -> 17.
            if n_codes > 17 {
                return Err(CodecError::CorruptCode("invalid DHT table".into()));
            }

            hc.set_code_values_u8(data.get_slice(n_codes)?)?;

            // Reuse an already-built decoder for identical tables.
            debug_assert!(self.huffman_store.len() == self.decoder_store.len());
            for (index, stored) in self.huffman_store.iter().enumerate() {
                if *stored == hc {
                    self.huff[ht_index] = Some(index);
                }
            }

            if self.huff[ht_index].is_none() {
                debug!("DHT: new table for destination {ht_index}, {n_codes} codes");
                let decoder = LJpegPrefixDecoder::new(
                    hc.clone(),
                    self.full_decode,
                    self.fix_dng_bug_16,
                )?;
                self.huffman_store.push(hc);
                self.decoder_store.push(decoder);
                self.huff[ht_index] = Some(self.decoder_store.len() - 1);
            }
        }
        Ok(())
    }

    fn parse_dri(&mut self, mut dri: ByteStream<'a>) -> Result<()> {
        if dri.remaining() != 2 {
            return Err(CodecError::BadMarker("invalid DRI header length".into()));
        }
        self.restart_interval = dri.get_u16()?;
        debug!("DRI: {} MCUs per restart interval", self.restart_interval);
        Ok(())
    }

    fn prefix_code_decoders(&self, n_comp: usize) -> Result<Vec<&LJpegPrefixDecoder>> {
        (0..n_comp)
            .map(|i| {
                let dc_tbl = self.frame.comp_info[i].dc_tbl_index as usize;
                self.huff
                    .get(dc_tbl)
                    .copied()
                    .flatten()
                    .map(|idx| &self.decoder_store[idx])
                    .ok_or_else(|| {
                        CodecError::BadImageParameters(format!(
                            "decoding table {dc_tbl} for comp {i} does not exist"
                        ))
                    })
            })
            .collect()
    }

    fn decode_scan(&mut self, out: &mut Grid2D<'_>, layout: &OutputLayout) -> Result<usize> {
        debug_assert!(self.frame.components > 0);

        if self.predictor_mode != 1 {
            return Err(CodecError::BadImageParameters(format!(
                "unsupported predictor mode: {}",
                self.predictor_mode
            )));
        }

        let n_comp = self.frame.components as usize;
        let decoders = self.prefix_code_decoders(n_comp)?;
        let initial_pred = self.frame.initial_predictor(self.pt)?;
        let scan_input = self.input.remaining_slice();

        match layout {
            OutputLayout::Tile { offset_x, offset_y, width, height } => {
                for i in 0..n_comp {
                    if self.frame.comp_info[i].super_h != 1
                        || self.frame.comp_info[i].super_v != 1
                    {
                        return Err(CodecError::BadImageParameters(
                            "unsupported subsampling".into(),
                        ));
                    }
                }
                let dest = TileDest {
                    offset_x: *offset_x,
                    offset_y: *offset_y,
                    width: *width,
                    height: *height,
                };
                scan::decode_scan(
                    out,
                    dest,
                    &self.frame,
                    &decoders,
                    initial_pred,
                    u32::from(self.restart_interval),
                    scan_input,
                )
            }
            OutputLayout::Cr2Sliced { slicing } => {
                let format = (
                    self.frame.components as i32,
                    self.frame.comp_info[0].super_h as i32,
                    self.frame.comp_info[0].super_v as i32,
                );
                let rec: Vec<PerComponentRecipe<'_, LJpegPrefixDecoder>> = decoders
                    .iter()
                    .map(|&d| PerComponentRecipe { decoder: d, init_pred: initial_pred })
                    .collect();
                let cr2 = Cr2Decompressor::new(
                    out.width(),
                    out.height(),
                    format,
                    (self.frame.width as i32, self.frame.height as i32),
                    *slicing,
                    rec,
                    scan_input,
                )?;
                cr2.decompress(out)
            }
        }
    }
}
