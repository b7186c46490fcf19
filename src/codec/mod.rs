//! Per-format decoder backends behind one incremental interface.
//!
//! An adapter never touches the destination bitmap. It parses headers
//! from the bytes buffered in a [`CodecMemory`] and emits decoded rows
//! (or whole frames) as [`CodecEvent`]s; the orchestrator resamples them.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::decoder::ImageAttributes;
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::geometry::Rect;
use crate::limits::Limits;
use crate::pixel::{BitmapFormat, SourceFormat};

#[cfg(feature = "bmp")]
pub(crate) mod bmp;
#[cfg(feature = "gif")]
pub(crate) mod gif;
#[cfg(feature = "jpeg")]
pub(crate) mod jpeg;
#[cfg(feature = "png")]
pub(crate) mod png;
#[cfg(feature = "tiff")]
pub(crate) mod tiff;

/// Image container family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Detect by trying every compiled-in format.
    #[default]
    Unknown,
    Bmp,
    Jpeg,
    Png,
    Gif,
    Tiff,
}

impl ImageType {
    /// Formats tried, in order, when the type is [`Unknown`](Self::Unknown).
    pub fn detection_order() -> &'static [ImageType] {
        &[
            #[cfg(feature = "jpeg")]
            ImageType::Jpeg,
            #[cfg(feature = "bmp")]
            ImageType::Bmp,
            #[cfg(feature = "gif")]
            ImageType::Gif,
            #[cfg(feature = "png")]
            ImageType::Png,
            #[cfg(feature = "tiff")]
            ImageType::Tiff,
        ]
    }
}

/// Result of a step that may stall on input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress<T> {
    Ready(T),
    /// Feed more bytes and call again.
    NeedMoreInput,
}

/// What a header parse learned about the image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    /// Channels in the stored image.
    pub components: u8,
    /// Bits per component.
    pub bpc: u8,
    /// Interlace passes (1 when not interlaced).
    pub pass_number: u8,
    /// Global palette, ARGB.
    pub palette: Vec<u32>,
    pub bg_index: u8,
    /// Rows arrive top to bottom.
    pub top_down: bool,
    pub attributes: ImageAttributes,
}

/// One frame of a multi-frame image, announced before its rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame rectangle in image coordinates, clamped to the image.
    pub rect: Rect,
    /// Effective palette, ARGB. The transparent entry has alpha 0.
    pub palette: Vec<u32>,
    pub transparent: Option<u8>,
    pub interlaced: bool,
}

/// Unit of decoded output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecEvent {
    /// A new frame starts; its rows follow.
    Frame(FrameInfo),
    /// The row buffer holds one scanline in the negotiated [`SourceFormat`].
    ///
    /// `line` counts from the top of the current frame (the whole image
    /// for single-frame formats). `pass` is 1-based.
    Row { line: i32, pass: u8 },
    /// The whole frame as straight BGRA, `width * height * 4` bytes.
    Image { width: u32, height: u32, bgra: Vec<u8> },
    Done,
}

/// Per-decode request passed to [`CodecAdapter::start_decode`].
#[derive(Clone, Copy, Debug)]
pub struct StartParams {
    pub frame: usize,
    /// 1, 2, 4 or 8. Only adapters that support down-scaling see values above 1.
    pub down_scale: u32,
    pub dest: BitmapFormat,
}

/// Incremental decoder for one container format.
pub trait CodecAdapter {
    fn image_type(&self) -> ImageType;

    /// Called after every feed with the (possibly moved) buffer.
    fn input(&mut self, mem: &mut CodecMemory) -> Result<(), DecodeError> {
        let _ = mem;
        Ok(())
    }

    /// Bytes the codec still needs kept; the feeder may discard the rest.
    fn avail_input(&self, mem: &CodecMemory) -> usize {
        mem.remaining()
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError>;

    /// Count frames. Single-frame formats report 1 immediately.
    fn load_frame_info(&mut self, mem: &mut CodecMemory) -> Result<Progress<usize>, DecodeError> {
        let _ = mem;
        Ok(Progress::Ready(1))
    }

    /// Whether the backend can decode at 1/2, 1/4 or 1/8 scale natively.
    fn supports_down_scale(&self) -> bool {
        false
    }

    /// Prepare to decode `params.frame` and report the scanline layout
    /// the following [`CodecEvent::Row`]s will use.
    fn start_decode(&mut self, params: &StartParams) -> Result<SourceFormat, DecodeError>;

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError>;
}

/// Construct the adapter for `kind`, or `None` when it is not compiled in.
pub(crate) fn open(kind: ImageType, limits: &Limits) -> Option<Box<dyn CodecAdapter>> {
    let _ = limits;
    match kind {
        #[cfg(feature = "jpeg")]
        ImageType::Jpeg => Some(Box::new(jpeg::JpegAdapter::new(*limits))),
        #[cfg(feature = "bmp")]
        ImageType::Bmp => Some(Box::new(bmp::BmpAdapter::new())),
        #[cfg(feature = "gif")]
        ImageType::Gif => Some(Box::new(gif::GifAdapter::new(*limits))),
        #[cfg(feature = "png")]
        ImageType::Png => Some(Box::new(png::PngAdapter::new(*limits))),
        #[cfg(feature = "tiff")]
        ImageType::Tiff => Some(Box::new(tiff::TiffAdapter::new(*limits))),
        _ => None,
    }
}

/// Run a backend call, turning a panic into [`DecodeError::CodecFault`].
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, DecodeError>) -> Result<T, DecodeError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| String::from(*s))
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("backend panicked"));
            Err(DecodeError::CodecFault(msg))
        }
    }
}

/// Pack 8-bit channels into ARGB.
#[inline]
pub(crate) fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    u32::from(a) << 24 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)
}
