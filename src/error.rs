use alloc::string::String;
use enough::StopReason;

use crate::pixel::{BitmapFormat, SourceFormat};
use crate::status::DecodeStatus;

/// Errors from image detection, decoding and resampling.
///
/// The public state machine never returns these directly; each failing
/// operation moves the decoder to [`DecodeStatus::Error`] and keeps the
/// cause available through [`ProgressiveDecoder::last_error`](crate::ProgressiveDecoder::last_error).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("unrecognized format magic bytes")]
    UnrecognizedFormat,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("unsupported format variant: {0}")]
    UnsupportedVariant(String),

    #[error("invalid pixel data: {0}")]
    InvalidData(String),

    /// The byte source ended while the codec still needed input.
    #[error("unexpected end of input")]
    Truncated,

    /// The byte source may still grow but has nothing more to offer yet.
    #[error("input not yet available")]
    InputPending,

    #[error("failed to allocate {requested} bytes of input buffer")]
    AllocationFailed { requested: usize },

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} is not valid in state {status:?}")]
    InvalidState {
        operation: &'static str,
        status: DecodeStatus,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no conversion from {from:?} scanlines into {to:?} bitmaps")]
    UnsupportedConversion {
        from: SourceFormat,
        to: BitmapFormat,
    },

    #[error("frame {index} out of range (image has {count} frames)")]
    FrameOutOfRange { index: usize, count: usize },

    /// The format backend failed abnormally; its context has been discarded.
    #[error("codec fault: {0}")]
    CodecFault(String),

    #[error("dimensions too large: {width}x{height}")]
    DimensionsTooLarge { width: u32, height: u32 },

    #[error("operation cancelled")]
    Cancelled(StopReason),
}

impl From<StopReason> for DecodeError {
    fn from(r: StopReason) -> Self {
        DecodeError::Cancelled(r)
    }
}
