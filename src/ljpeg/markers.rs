//! JPEG marker codes and marker scanning.

use num_enum::TryFromPrimitive;

use crate::byte_stream::ByteStream;
use crate::error::{CodecError, Result};

/// JPEG marker codes (ITU-T T.81 table B.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum JpegMarker {
    /// Byte stuffing placeholder, not a real marker.
    Stuff = 0x00,

    /// SOF0: baseline DCT.
    Sof0 = 0xC0,
    /// SOF1: extended sequential DCT.
    Sof1 = 0xC1,
    /// SOF2: progressive DCT.
    Sof2 = 0xC2,
    /// SOF3: lossless (sequential).
    Sof3 = 0xC3,
    /// DHT: define Huffman tables.
    Dht = 0xC4,
    /// SOF5: differential sequential DCT.
    Sof5 = 0xC5,
    /// SOF6: differential progressive DCT.
    Sof6 = 0xC6,
    /// SOF7: differential lossless.
    Sof7 = 0xC7,
    /// JPG: JPEG extensions.
    Jpg = 0xC8,
    /// SOF9: extended sequential DCT, arithmetic coding.
    Sof9 = 0xC9,
    /// SOF10: progressive DCT, arithmetic coding.
    Sof10 = 0xCA,
    /// SOF11: lossless (sequential), arithmetic coding.
    Sof11 = 0xCB,
    /// DAC: define arithmetic conditioning table.
    Dac = 0xCC,
    /// SOF13: differential sequential DCT, arithmetic coding.
    Sof13 = 0xCD,
    /// SOF14: differential progressive DCT, arithmetic coding.
    Sof14 = 0xCE,
    /// SOF15: differential lossless, arithmetic coding.
    Sof15 = 0xCF,

    Rst0 = 0xD0,
    Rst1 = 0xD1,
    Rst2 = 0xD2,
    Rst3 = 0xD3,
    Rst4 = 0xD4,
    Rst5 = 0xD5,
    Rst6 = 0xD6,
    Rst7 = 0xD7,

    /// SOI: start of image.
    Soi = 0xD8,
    /// EOI: end of image.
    Eoi = 0xD9,
    /// SOS: start of scan.
    Sos = 0xDA,
    /// DQT: define quantization tables.
    Dqt = 0xDB,
    /// DNL: define number of lines.
    Dnl = 0xDC,
    /// DRI: define restart interval.
    Dri = 0xDD,
    /// DHP: define hierarchical progression.
    Dhp = 0xDE,
    /// EXP: expand reference image(s).
    Exp = 0xDF,

    App0 = 0xE0,
    App1 = 0xE1,
    App2 = 0xE2,
    App3 = 0xE3,
    App4 = 0xE4,
    App5 = 0xE5,
    App6 = 0xE6,
    App7 = 0xE7,
    App8 = 0xE8,
    App9 = 0xE9,
    App10 = 0xEA,
    App11 = 0xEB,
    App12 = 0xEC,
    App13 = 0xED,
    App14 = 0xEE,
    App15 = 0xEF,

    /// JPG0: reserved for JPEG extensions.
    Jpg0 = 0xF0,
    /// JPG13: reserved for JPEG extensions.
    Jpg13 = 0xFD,
    /// COM: comment.
    Com = 0xFE,

    /// TEM: temporary use.
    Tem = 0x01,
    /// Fill byte run.
    Fill = 0xFF,
}

impl JpegMarker {
    /// The number of this restart marker (modulo 8), if it is one.
    pub fn restart_marker_number(self) -> Option<u32> {
        match self {
            JpegMarker::Rst0
            | JpegMarker::Rst1
            | JpegMarker::Rst2
            | JpegMarker::Rst3
            | JpegMarker::Rst4
            | JpegMarker::Rst5
            | JpegMarker::Rst6
            | JpegMarker::Rst7 => Some(u32::from(self as u8 - JpegMarker::Rst0 as u8)),
            _ => None,
        }
    }
}

/// The marker at the stream's current position, if there is one.
/// `FF 00` (stuffing) and `FF FF` (fill) are not markers.
pub fn peek_marker(input: &ByteStream<'_>) -> Option<JpegMarker> {
    let c0 = input.peek_u8(0).ok()?;
    let c1 = input.peek_u8(1).ok()?;
    if c0 == 0xFF && c1 != 0x00 && c1 != 0xFF {
        return JpegMarker::try_from(c1).ok();
    }
    None
}

/// Advance the stream to the next marker. With `skip_padding`, pad
/// bytes before the marker are tolerated and skipped one at a time.
pub fn advance_to_next_marker(input: &mut ByteStream<'_>, skip_padding: bool) -> Result<JpegMarker> {
    while input.remaining() >= 2 {
        if let Some(m) = peek_marker(input) {
            return Ok(m);
        }
        if !skip_padding {
            break;
        }
        input.skip_bytes(1)?;
    }
    Err(CodecError::BadMarker(
        "expected marker not found, probably corrupt file".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_stream::Endianness;

    #[test]
    fn recognizes_markers() {
        let data = [0xFF, 0xD8];
        let bs = ByteStream::new(&data, Endianness::Big);
        assert_eq!(peek_marker(&bs), Some(JpegMarker::Soi));
    }

    #[test]
    fn stuffing_and_fill_are_not_markers() {
        let stuffed = [0xFF, 0x00];
        assert_eq!(peek_marker(&ByteStream::new(&stuffed, Endianness::Big)), None);
        let fill = [0xFF, 0xFF];
        assert_eq!(peek_marker(&ByteStream::new(&fill, Endianness::Big)), None);
    }

    #[test]
    fn skips_padding_when_allowed() {
        let data = [0x12, 0x34, 0xFF, 0xC3];
        let mut bs = ByteStream::new(&data, Endianness::Big);
        assert!(advance_to_next_marker(&mut bs, false).is_err());
        let mut bs = ByteStream::new(&data, Endianness::Big);
        assert_eq!(advance_to_next_marker(&mut bs, true).unwrap(), JpegMarker::Sof3);
        assert_eq!(bs.position(), 2);
    }

    #[test]
    fn restart_marker_numbers() {
        assert_eq!(JpegMarker::Rst0.restart_marker_number(), Some(0));
        assert_eq!(JpegMarker::Rst7.restart_marker_number(), Some(7));
        assert_eq!(JpegMarker::Soi.restart_marker_number(), None);
    }
}
