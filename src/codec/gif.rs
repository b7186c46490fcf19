//! GIF adapter over the `gif` crate.
//!
//! The logical screen descriptor and global palette are parsed as soon as
//! they are buffered. Frame counting and frame decoding need the whole
//! stream. Decoded frames are handed out as palette-index rows, in
//! interlace pass order when the frame is interlaced.

use alloc::format;
use alloc::vec::Vec;
use core::num::NonZeroU64;
use std::io::Cursor;

use gif::{ColorOutput, DecodeOptions, MemoryLimit};

use crate::codec::{
    CodecAdapter, CodecEvent, FrameInfo, HeaderInfo, ImageType, Progress, StartParams, argb,
};
use crate::decoder::ImageAttributes;
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::geometry::Rect;
use crate::limits::Limits;
use crate::pixel::SourceFormat;

/// Interlaced row order: (first row, step) for each of the four passes.
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ScreenDescriptor {
    pub width: u16,
    pub height: u16,
    pub bg_index: u8,
    /// Global palette as ARGB, empty when absent.
    pub palette: Vec<u32>,
}

/// Parse the signature, logical screen descriptor and global color table.
///
/// Returns `Ok(None)` while they are not fully buffered.
pub(crate) fn scan_screen(data: &[u8]) -> Result<Option<ScreenDescriptor>, DecodeError> {
    let magic_len = data.len().min(3);
    if data[..magic_len] != b"GIF"[..magic_len] {
        return Err(DecodeError::UnrecognizedFormat);
    }
    if data.len() < 13 {
        return Ok(None);
    }
    if &data[3..6] != b"87a" && &data[3..6] != b"89a" {
        return Err(DecodeError::UnrecognizedFormat);
    }
    let width = u16::from_le_bytes([data[6], data[7]]);
    let height = u16::from_le_bytes([data[8], data[9]]);
    let flags = data[10];
    let bg_index = data[11];
    let mut palette = Vec::new();
    if flags & 0x80 != 0 {
        let count = 2usize << (flags & 0x07);
        let Some(table) = data.get(13..13 + count * 3) else {
            return Ok(None);
        };
        palette.extend(table.chunks_exact(3).map(|c| argb(0xFF, c[0], c[1], c[2])));
    }
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidHeader(format!(
            "GIF logical screen {width}x{height}"
        )));
    }
    Ok(Some(ScreenDescriptor {
        width,
        height,
        bg_index,
        palette,
    }))
}

fn gif_error(e: gif::DecodingError) -> DecodeError {
    DecodeError::InvalidData(format!("GIF: {e}"))
}

/// Decoded frame waiting to be handed out.
#[derive(Debug)]
struct PendingFrame {
    width: usize,
    /// Rows of `width` indices, already clipped to the logical screen.
    pixels: Vec<u8>,
    /// Row numbers in emission order, with their 1-based pass.
    order: Vec<(usize, u8)>,
    next: usize,
}

#[derive(Debug)]
pub(crate) struct GifAdapter {
    limits: Limits,
    screen: Option<ScreenDescriptor>,
    frame_index: usize,
    announced: Option<FrameInfo>,
    pending: Option<PendingFrame>,
    done: bool,
}

impl GifAdapter {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            screen: None,
            frame_index: 0,
            announced: None,
            pending: None,
            done: false,
        }
    }

    fn open<'a>(&self, data: &'a [u8]) -> Result<gif::Decoder<Cursor<&'a [u8]>>, DecodeError> {
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::Indexed);
        if let Some(bytes) = self.limits.max_memory_bytes.and_then(NonZeroU64::new) {
            options.set_memory_limit(MemoryLimit::Bytes(bytes));
        }
        options
            .read_info(Cursor::new(data))
            .map_err(gif_error)
    }

    /// Decode frame `self.frame_index` and queue its rows.
    fn decode_frame(&mut self, data: &[u8]) -> Result<Option<FrameInfo>, DecodeError> {
        let Some(screen) = self.screen.as_ref() else {
            return Err(DecodeError::InvalidHeader("GIF header not parsed".into()));
        };
        let (img_w, img_h) = (i32::from(screen.width), i32::from(screen.height));
        let mut decoder = self.open(data)?;
        let mut seen = 0usize;
        // `read_next_frame` clears the interlace flag, so take the
        // descriptor first and fill the buffer separately.
        let (frame, buffer) = loop {
            let Some(frame) = decoder.next_frame_info().map_err(gif_error)? else {
                return Ok(None);
            };
            let frame = frame.clone();
            let len = decoder.buffer_size();
            self.limits.check_memory(len)?;
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(len)
                .map_err(|_| DecodeError::AllocationFailed { requested: len })?;
            buffer.resize(len, 0);
            decoder.read_into_buffer(&mut buffer).map_err(gif_error)?;
            if seen == self.frame_index {
                break (frame, buffer);
            }
            seen += 1;
        };

        let rect = Rect::new(
            i32::from(frame.left),
            i32::from(frame.top),
            i32::from(frame.left) + i32::from(frame.width),
            i32::from(frame.top) + i32::from(frame.height),
        )
        .intersect(&Rect::from_size(img_w, img_h));

        let mut palette: Vec<u32> = match frame.palette.as_deref() {
            Some(local) => local
                .chunks_exact(3)
                .map(|c| argb(0xFF, c[0], c[1], c[2]))
                .collect(),
            None => screen.palette.clone(),
        };
        if let Some(entry) = frame
            .transparent
            .and_then(|t| palette.get_mut(usize::from(t)))
        {
            *entry &= 0x00FF_FFFF;
        }

        let frame_w = usize::from(frame.width);
        let width = rect.width().max(0) as usize;
        let mut pixels = Vec::with_capacity(width * rect.height().max(0) as usize);
        for row in buffer
            .chunks_exact(frame_w.max(1))
            .take(rect.height().max(0) as usize)
        {
            pixels.extend_from_slice(&row[..width]);
        }
        let rows = if width == 0 { 0 } else { pixels.len() / width };
        let order = if frame.interlaced {
            INTERLACE_PASSES
                .iter()
                .zip(1u8..)
                .flat_map(|(&(first, step), pass)| {
                    (first..rows).step_by(step).map(move |r| (r, pass))
                })
                .collect()
        } else {
            (0..rows).map(|r| (r, 1)).collect()
        };
        ldebug!(
            "gif: frame {} at {:?}, {} colors, transparent {:?}, interlaced {}",
            self.frame_index,
            rect,
            palette.len(),
            frame.transparent,
            frame.interlaced
        );
        let info = FrameInfo {
            rect,
            palette,
            transparent: frame.transparent,
            interlaced: frame.interlaced,
        };
        self.pending = Some(PendingFrame {
            width,
            pixels,
            order,
            next: 0,
        });
        Ok(Some(info))
    }
}

impl CodecAdapter for GifAdapter {
    fn image_type(&self) -> ImageType {
        ImageType::Gif
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
        let Some(screen) = scan_screen(mem.data())? else {
            if mem.is_end_of_stream() {
                return Err(DecodeError::Truncated);
            }
            return Ok(Progress::NeedMoreInput);
        };
        ldebug!(
            "gif: {}x{}, {} global colors, background {}",
            screen.width,
            screen.height,
            screen.palette.len(),
            screen.bg_index
        );
        let info = HeaderInfo {
            width: u32::from(screen.width),
            height: u32::from(screen.height),
            components: 1,
            bpc: 8,
            pass_number: 1,
            palette: screen.palette.clone(),
            bg_index: screen.bg_index,
            top_down: true,
            attributes: ImageAttributes::default(),
        };
        self.screen = Some(screen);
        Ok(Progress::Ready(info))
    }

    fn load_frame_info(&mut self, mem: &mut CodecMemory) -> Result<Progress<usize>, DecodeError> {
        if !mem.is_end_of_stream() {
            return Ok(Progress::NeedMoreInput);
        }
        let mut decoder = self.open(mem.data())?;
        let mut count = 0usize;
        while decoder.read_next_frame().map_err(gif_error)?.is_some() {
            count += 1;
        }
        if count == 0 {
            return Err(DecodeError::InvalidData("GIF contains no frames".into()));
        }
        ldebug!("gif: {} frames", count);
        Ok(Progress::Ready(count))
    }

    fn start_decode(&mut self, params: &StartParams) -> Result<SourceFormat, DecodeError> {
        if self.screen.is_none() {
            return Err(DecodeError::InvalidHeader("GIF header not parsed".into()));
        }
        self.frame_index = params.frame;
        self.announced = None;
        self.pending = None;
        self.done = false;
        Ok(SourceFormat::Pal8)
    }

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        if self.done {
            return Ok(Progress::Ready(CodecEvent::Done));
        }
        if self.announced.is_none() {
            if !mem.is_end_of_stream() {
                return Ok(Progress::NeedMoreInput);
            }
            let Some(info) = self.decode_frame(mem.data())? else {
                return Err(DecodeError::FrameOutOfRange {
                    index: self.frame_index,
                    count: self.frame_index,
                });
            };
            self.announced = Some(info.clone());
            return Ok(Progress::Ready(CodecEvent::Frame(info)));
        }
        let Some(frame) = self.pending.as_mut() else {
            return Err(DecodeError::InvalidData("GIF frame rows missing".into()));
        };
        let Some(&(r, pass)) = frame.order.get(frame.next) else {
            self.done = true;
            self.pending = None;
            return Ok(Progress::Ready(CodecEvent::Done));
        };
        frame.next += 1;
        row.clear();
        row.extend_from_slice(&frame.pixels[r * frame.width..(r + 1) * frame.width]);
        Ok(Progress::Ready(CodecEvent::Row {
            line: r as i32,
            pass,
        }))
    }
}
