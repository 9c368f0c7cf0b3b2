use thiserror::Error;

/// The single error type surfaced by every fallible operation in this
/// crate. There is no recovery and no retry; on error the contents of
/// any output buffer are unspecified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Read past the end of the input buffer")]
    OutOfBounds,
    #[error("String is not null-terminated")]
    NotNullTerminated,
    #[error("Bit stream size is smaller than the refill chunk")]
    InsufficientInput,
    #[error("Bit streamer ran past the end of its input")]
    EndOfStream,
    #[error("Corrupt prefix code: {0}")]
    CorruptCode(String),
    #[error("Bad prefix code: {code} (len: {len})")]
    BadCode { code: u32, len: u8 },
    #[error("Bad JPEG marker: {0}")]
    BadMarker(String),
    #[error("Bad image parameters: {0}")]
    BadImageParameters(String),
    #[error("Bad output tiling: {0}")]
    BadTiling(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
