//! The progressive decode state machine.
//!
//! A [`ProgressiveDecoder`] owns the byte source, the codec adapter and all
//! scratch state for one image. The caller drives it step by step:
//!
//! ```text
//! load_image_info -> [set_clip_box] -> get_frames -> start_decode -> continue_decode*
//! ```
//!
//! No operation returns an error directly. Failures move the session to
//! [`DecodeStatus::Error`] and leave the cause in [`ProgressiveDecoder::last_error`].

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::fmt;

use enough::Stop;

use crate::bitmap::Bitmap;
use crate::codec::{self, CodecAdapter, CodecEvent, FrameInfo, HeaderInfo, ImageType, Progress, StartParams};
use crate::error::DecodeError;
use crate::feeder::{CodecMemory, Feed, InputFeeder};
use crate::geometry::Rect;
use crate::limits::Limits;
use crate::pixel::BitmapFormat;
use crate::resample::{Placement, Resampler, stretch_bgra_into};
use crate::source::ByteSource;
use crate::status::DecodeStatus;

/// Largest accepted output width or height.
pub const MAX_OUTPUT_SIZE: i32 = 65535;

/// Unit of [`ImageAttributes`] resolution values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DpiUnit {
    #[default]
    None,
    Inch,
    Centimeter,
    Meter,
}

/// Resolution metadata found in the image header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageAttributes {
    pub x_dpi: i32,
    pub y_dpi: i32,
    pub unit: DpiUnit,
}

/// Shape of the bitmap a decode was started with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Binding {
    width: u32,
    height: u32,
    format: BitmapFormat,
    pitch: usize,
}

impl Binding {
    fn of(bmp: &Bitmap) -> Self {
        Self {
            width: bmp.width(),
            height: bmp.height(),
            format: bmp.format(),
            pitch: bmp.pitch(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct GifFrame {
    rect: Rect,
    palette_len: usize,
    transparent: Option<u8>,
    /// Index painted where the frame has no pixels.
    pal_index: u8,
    pass_number: u8,
}

/// Scratch state that lives from `start_decode` to a terminal status.
#[derive(Debug)]
struct DecodeSession {
    binding: Binding,
    resampler: Resampler,
    interpolate: bool,
    top_down: bool,
    pass_number: u8,
    bg_index: u8,
    src_width: usize,
    row: Vec<u8>,
    /// Full-width GIF row assembled from a frame row.
    composed: Vec<u8>,
    gif: Option<GifFrame>,
}

impl DecodeSession {
    /// Resample one decoded row. Returns true once nothing more is needed.
    fn put_row(
        &mut self,
        kind: ImageType,
        bmp: &mut Bitmap,
        line: i32,
        pass: u8,
    ) -> Result<bool, DecodeError> {
        if kind == ImageType::Gif {
            self.put_gif_row(bmp, line)?;
            return Ok(false);
        }
        let need = self.src_width * self.resampler.src_format().bytes_per_pixel();
        if self.row.len() < need {
            return Err(DecodeError::InvalidData(format!(
                "scanline {line} has {} bytes, expected {need}",
                self.row.len()
            )));
        }
        let place = *self.resampler.placement();
        match kind {
            ImageType::Jpeg => {
                if line >= place.clip.bottom {
                    return Ok(true);
                }
                self.resampler.resample(bmp, line, &self.row);
            }
            ImageType::Bmp => {
                let Some(des_row) = place.dest_row(line) else {
                    return Ok(false);
                };
                self.resampler.resample_scanline(bmp, des_row, &self.row);
                if place.scale_y() > 1.0 {
                    if self.top_down || !self.interpolate {
                        self.resampler.resample_vert(bmp, des_row);
                    } else {
                        self.resampler.resample_vert_bottom_up(bmp, des_row);
                    }
                }
            }
            ImageType::Png => {
                let Some(des_row) = place.dest_row(line) else {
                    return Ok(false);
                };
                self.resampler.resample_one_to_one(bmp, des_row, &self.row);
                if place.scale_y() > 1.0 && (self.pass_number == 1 || pass == self.pass_number) {
                    self.resampler.resample_vert(bmp, des_row);
                }
            }
            other => {
                return Err(DecodeError::InvalidData(format!(
                    "{other:?} codec produced a scanline"
                )));
            }
        }
        Ok(false)
    }

    /// Install the frame palette and paint the background.
    fn begin_frame(&mut self, bmp: &mut Bitmap, info: &FrameInfo) -> Result<(), DecodeError> {
        if info.palette.is_empty() {
            return Err(DecodeError::InvalidData("GIF frame has no color table".into()));
        }
        self.resampler.set_palette(&info.palette, false);
        let transparent = info
            .transparent
            .filter(|&t| usize::from(t) < info.palette.len());
        let pal_index = match transparent {
            Some(t) if bmp.is_alpha_format() => t,
            _ => self.bg_index,
        };
        self.resampler
            .fill_region(bmp, self.resampler.palette_entry(pal_index));
        self.gif = Some(GifFrame {
            rect: info.rect,
            palette_len: info.palette.len(),
            transparent,
            pal_index,
            pass_number: if info.interlaced { 4 } else { 1 },
        });
        Ok(())
    }

    fn put_gif_row(&mut self, bmp: &mut Bitmap, row_num: i32) -> Result<(), DecodeError> {
        let Some(frame) = self.gif else {
            return Err(DecodeError::InvalidData("GIF row before its frame".into()));
        };
        if let Some(&idx) = self.row.iter().find(|&&i| usize::from(i) >= frame.palette_len) {
            return Err(DecodeError::InvalidData(format!(
                "palette index {idx} out of range (palette has {} entries)",
                frame.palette_len
            )));
        }
        self.composed.fill(frame.pal_index);
        let left = (frame.rect.left.max(0) as usize).min(self.composed.len());
        let n = self.row.len().min(self.composed.len() - left);
        let span = &mut self.composed[left..left + n];
        span.copy_from_slice(&self.row[..n]);
        if let Some(t) = frame.transparent.filter(|_| !bmp.is_alpha_format()) {
            for v in span.iter_mut().filter(|v| **v == t) {
                *v = self.bg_index;
            }
        }

        let place = *self.resampler.placement();
        let Some(des_row) = place.dest_row(row_num + frame.rect.top) else {
            return Ok(());
        };
        self.resampler.resample_scanline(bmp, des_row, &self.composed);
        let scale_y = place.scale_y();
        if scale_y <= 1.0 {
            return Ok(());
        }
        if !self.interpolate || frame.pass_number == 1 {
            self.resampler.resample_vert(bmp, des_row);
            return Ok(());
        }
        if des_row + scale_y as i32 >= place.start_y + place.size_y - 1 {
            self.resampler.broadcast_tail(bmp, des_row);
        }
        if row_num % 2 == 1 {
            self.resampler.gif_double_line(bmp, des_row);
        }
        Ok(())
    }

    /// Place a whole decoded BGRA frame.
    fn put_image(
        &mut self,
        bmp: &mut Bitmap,
        width: u32,
        height: u32,
        bgra: &[u8],
    ) -> Result<(), DecodeError> {
        let (w, h) = match (i32::try_from(width), i32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(DecodeError::DimensionsTooLarge { width, height }),
        };
        let row_len = width as usize * 4;
        if bgra.len() < row_len * height as usize {
            return Err(DecodeError::InvalidData("decoded frame shorter than its size".into()));
        }
        let mut place = *self.resampler.placement();
        let full = Rect::from_size(w, h);
        if bmp.bpp() == 32 && place.clip == full && place.size_x == w && place.size_y == h {
            let opaque = bmp.format() == BitmapFormat::Bgrx;
            let offset = place.start_x as usize * 4;
            for (y, src) in bgra.chunks_exact(row_len).take(h as usize).enumerate() {
                let dst = &mut bmp.scanline_mut(place.start_y as usize + y)[offset..offset + row_len];
                dst.copy_from_slice(src);
                if opaque {
                    dst.chunks_exact_mut(4).for_each(|p| p[3] = 0xFF);
                }
            }
            return Ok(());
        }
        place.clip = place.clip.intersect(&full);
        if place.clip.is_empty() {
            return Err(DecodeError::InvalidData(
                "frame does not cover the clip box".into(),
            ));
        }
        stretch_bgra_into(bmp, &place, self.interpolate, bgra, width as usize)
    }
}

/// Pull one more block, with the codec's input hook guarded.
fn feed<S: ByteSource>(
    feeder: &mut InputFeeder,
    source: &mut S,
    mem: &mut CodecMemory,
    codec: &mut dyn CodecAdapter,
    limits: &Limits,
) -> Result<Feed, DecodeError> {
    codec::guarded(|| feeder.read_more(source, mem, codec, limits))
}

/// Empty scratch buffer with room for `bytes`, within the memory limit.
fn alloc_row(limits: &Limits, bytes: usize) -> Result<Vec<u8>, DecodeError> {
    limits.check_memory(bytes)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| DecodeError::AllocationFailed { requested: bytes })?;
    Ok(buf)
}

/// Resumable decoder for one image at a time.
pub struct ProgressiveDecoder<S: ByteSource> {
    limits: Limits,
    status: DecodeStatus,
    source: Option<S>,
    codec: Option<Box<dyn CodecAdapter>>,
    mem: CodecMemory,
    feeder: InputFeeder,
    image_type: ImageType,
    header: HeaderInfo,
    frame_count: usize,
    clip: Rect,
    session: Option<DecodeSession>,
    last_error: Option<DecodeError>,
}

impl<S: ByteSource> fmt::Debug for ProgressiveDecoder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressiveDecoder")
            .field("status", &self.status)
            .field("image_type", &self.image_type)
            .field("width", &self.header.width)
            .field("height", &self.header.height)
            .field("frame_count", &self.frame_count)
            .field("clip", &self.clip)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<S: ByteSource> Default for ProgressiveDecoder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ByteSource> ProgressiveDecoder<S> {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits,
            status: DecodeStatus::DecodeFinished,
            source: None,
            codec: None,
            mem: CodecMemory::new(),
            feeder: InputFeeder::new(),
            image_type: ImageType::Unknown,
            header: HeaderInfo::default(),
            frame_count: 0,
            clip: Rect::default(),
            session: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> DecodeStatus {
        self.status
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Detected container type, `Unknown` before a successful load.
    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn components(&self) -> u8 {
        self.header.components
    }

    /// Bits per component of the stored image.
    pub fn bpc(&self) -> u8 {
        self.header.bpc
    }

    /// Frames counted by [`get_frames`](Self::get_frames), 0 before that.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn clip_box(&self) -> Rect {
        self.clip
    }

    pub fn attributes(&self) -> &ImageAttributes {
        &self.header.attributes
    }

    /// Cause of the most recent failed or rejected operation.
    pub fn last_error(&self) -> Option<&DecodeError> {
        self.last_error.as_ref()
    }

    /// Destination format that keeps everything the image carries.
    pub fn bitmap_format(&self) -> BitmapFormat {
        match (self.image_type, self.header.components) {
            (ImageType::Gif, _) => BitmapFormat::Bgra,
            (ImageType::Png | ImageType::Tiff, 2 | 4) => BitmapFormat::Bgra,
            (ImageType::Bmp, 4) => BitmapFormat::Bgrx,
            (_, 1) if self.header.palette.is_empty() => BitmapFormat::Pal8,
            _ => BitmapFormat::Bgr,
        }
    }

    /// Detect the image in `source` and read its header.
    ///
    /// With a `hint` other than `Unknown` that format is tried first; when
    /// it fails, the remaining formats are tried unless `skip_type_check`
    /// is set. Only valid when no decode is in flight.
    pub fn load_image_info(
        &mut self,
        mut source: S,
        hint: ImageType,
        skip_type_check: bool,
    ) -> DecodeStatus {
        if !self.status.is_terminal() {
            return self.reject("load_image_info");
        }
        self.release();
        self.image_type = ImageType::Unknown;
        self.header = HeaderInfo::default();
        self.frame_count = 0;
        self.clip = Rect::default();
        self.last_error = None;

        match self.detect_any(&mut source, hint, skip_type_check) {
            Ok(()) => {
                self.source = Some(source);
                self.status = DecodeStatus::FrameReady;
                self.status
            }
            Err(e) => self.fail(e),
        }
    }

    fn detect_any(&mut self, source: &mut S, hint: ImageType, skip_type_check: bool) -> Result<(), DecodeError> {
        if hint != ImageType::Unknown {
            match self.detect(source, hint) {
                Ok(()) => return Ok(()),
                Err(e) if skip_type_check => return Err(e),
                Err(DecodeError::InputPending) => return Err(DecodeError::InputPending),
                Err(_e) => {
                    ldebug!("{:?} detection failed: {}", hint, _e);
                }
            }
        }
        let mut first_err = None;
        for &kind in ImageType::detection_order() {
            if kind == hint {
                continue;
            }
            match self.detect(source, kind) {
                Ok(()) => return Ok(()),
                Err(DecodeError::InputPending) => return Err(DecodeError::InputPending),
                Err(DecodeError::UnrecognizedFormat) => {}
                Err(e) => {
                    ldebug!("{:?} detection failed: {}", kind, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or(DecodeError::UnrecognizedFormat))
    }

    fn detect(&mut self, source: &mut S, kind: ImageType) -> Result<(), DecodeError> {
        let mut codec = codec::open(kind, &self.limits).ok_or_else(|| {
            DecodeError::UnsupportedVariant(format!("{kind:?} support is not compiled in"))
        })?;
        self.feeder.reset(&mut self.mem);
        let header = loop {
            match codec::guarded(|| codec.read_header(&mut self.mem))? {
                Progress::Ready(h) => break h,
                Progress::NeedMoreInput => {}
            }
            match feed(&mut self.feeder, source, &mut self.mem, &mut *codec, &self.limits)? {
                Feed::Fed => {}
                Feed::Pending => return Err(DecodeError::InputPending),
                Feed::Exhausted => return Err(DecodeError::Truncated),
            }
        };
        if header.width == 0 || header.height == 0 {
            return Err(DecodeError::InvalidHeader(format!(
                "image dimensions {}x{}",
                header.width, header.height
            )));
        }
        let (Ok(w), Ok(h)) = (i32::try_from(header.width), i32::try_from(header.height)) else {
            return Err(DecodeError::DimensionsTooLarge {
                width: header.width,
                height: header.height,
            });
        };
        self.limits.check(header.width, header.height)?;
        ldebug!(
            "detected {:?} {}x{}, {} components, {} bits",
            kind,
            w,
            h,
            header.components,
            header.bpc
        );
        self.clip = Rect::from_size(w, h);
        self.image_type = kind;
        self.header = header;
        self.codec = Some(codec);
        Ok(())
    }

    /// Count frames, advancing to `DecodeReady`.
    ///
    /// Returns `FrameToBeContinued` when more input is needed from a
    /// growing source or `stop` asked for a pause; call again to resume.
    pub fn get_frames(&mut self, stop: &dyn Stop) -> (DecodeStatus, usize) {
        if !matches!(
            self.status,
            DecodeStatus::FrameReady | DecodeStatus::FrameToBeContinued
        ) {
            return (self.reject("get_frames"), 0);
        }
        match self.count_frames(stop) {
            Ok(Some(n)) => {
                self.frame_count = n;
                self.status = DecodeStatus::DecodeReady;
                (self.status, n)
            }
            Ok(None) => {
                self.status = DecodeStatus::FrameToBeContinued;
                (self.status, 0)
            }
            Err(e) => (self.fail(e), 0),
        }
    }

    fn count_frames(&mut self, stop: &dyn Stop) -> Result<Option<usize>, DecodeError> {
        let status = self.status;
        let Self {
            codec,
            source,
            mem,
            feeder,
            limits,
            ..
        } = self;
        let (Some(codec), Some(source)) = (codec.as_mut(), source.as_mut()) else {
            return Err(DecodeError::InvalidState {
                operation: "get_frames",
                status,
            });
        };
        loop {
            match codec::guarded(|| codec.load_frame_info(mem))? {
                Progress::Ready(0) => {
                    return Err(DecodeError::InvalidData("image has no frames".into()));
                }
                Progress::Ready(n) => return Ok(Some(n)),
                Progress::NeedMoreInput => {}
            }
            match feed(feeder, source, mem, &mut **codec, limits)? {
                Feed::Fed => {}
                Feed::Pending => return Ok(None),
                Feed::Exhausted => return Err(DecodeError::Truncated),
            }
            if stop.check().is_err() {
                return Ok(None);
            }
        }
    }

    /// Restrict decoding to `clip`, in source pixels.
    ///
    /// Only valid right after [`load_image_info`](Self::load_image_info).
    /// The box is clamped to the image; an empty result clears it, which
    /// makes the following `start_decode` fail.
    pub fn set_clip_box(&mut self, clip: Rect) -> bool {
        if self.status != DecodeStatus::FrameReady {
            self.reject("set_clip_box");
            return false;
        }
        self.clip = if clip.is_empty() {
            Rect::default()
        } else {
            clip.intersect(&Rect::from_size(
                self.header.width as i32,
                self.header.height as i32,
            ))
        };
        true
    }

    /// Begin decoding frame `frame` into `bmp`.
    ///
    /// The clip box is mapped onto the `size_x` x `size_y` rectangle at
    /// (`start_x`, `start_y`); parts falling outside the bitmap are cut
    /// from the clip box proportionally. Invalid arguments return `Error`
    /// but leave the session in `DecodeReady`.
    #[allow(clippy::too_many_arguments)]
    pub fn start_decode(
        &mut self,
        bmp: &mut Bitmap,
        start_x: i32,
        start_y: i32,
        size_x: i32,
        size_y: i32,
        frame: usize,
        interpolate: bool,
    ) -> DecodeStatus {
        if self.status != DecodeStatus::DecodeReady {
            return self.reject("start_decode");
        }
        let (place, down_scale) = match self.plan(bmp, start_x, start_y, size_x, size_y, frame) {
            Ok(p) => p,
            Err(e) => {
                lwarn!("start_decode rejected: {}", e);
                self.last_error = Some(e);
                return DecodeStatus::Error;
            }
        };
        match self.begin(bmp, place, down_scale, frame, interpolate) {
            Ok(session) => {
                self.session = Some(session);
                self.status = DecodeStatus::DecodeToBeContinued;
                self.status
            }
            Err(e) => self.fail(e),
        }
    }

    /// Validate the request and work out where the clip box lands.
    fn plan(
        &self,
        bmp: &Bitmap,
        start_x: i32,
        start_y: i32,
        size_x: i32,
        size_y: i32,
        frame: usize,
    ) -> Result<(Placement, u32), DecodeError> {
        if bmp.bpp() < 8 {
            return Err(DecodeError::InvalidParameter(format!(
                "destination needs at least 8 bits per pixel, has {}",
                bmp.bpp()
            )));
        }
        if bmp.has_palette() {
            return Err(DecodeError::InvalidParameter(
                "palettized destination bitmaps are not supported".into(),
            ));
        }
        if frame >= self.frame_count {
            return Err(DecodeError::FrameOutOfRange {
                index: frame,
                count: self.frame_count,
            });
        }
        if self.clip.is_empty() {
            return Err(DecodeError::InvalidParameter("clip box is empty".into()));
        }
        let valid = 1..=MAX_OUTPUT_SIZE;
        if !valid.contains(&size_x) || !valid.contains(&size_y) {
            return Err(DecodeError::InvalidParameter(format!(
                "output size {size_x}x{size_y} outside 1..={MAX_OUTPUT_SIZE}"
            )));
        }
        let (Some(right), Some(bottom)) = (start_x.checked_add(size_x), start_y.checked_add(size_y)) else {
            return Err(DecodeError::InvalidParameter(format!(
                "output origin ({start_x}, {start_y}) overflows"
            )));
        };
        let bmp_w = i32::try_from(bmp.width()).unwrap_or(i32::MAX);
        let bmp_h = i32::try_from(bmp.height()).unwrap_or(i32::MAX);
        let out_x = right - bmp_w;
        let out_y = bottom - bmp_h;
        let device = Rect::new(start_x, start_y, right, bottom).intersect(&Rect::from_size(bmp_w, bmp_h));
        if device.is_empty() {
            return Err(DecodeError::InvalidParameter(
                "output rectangle does not overlap the bitmap".into(),
            ));
        }

        let mut clip = self.clip;
        let scale_x = f64::from(clip.width()) / f64::from(size_x);
        if start_x < 0 {
            clip.left -= (f64::from(start_x) * scale_x).ceil() as i32;
        }
        if out_x > 0 {
            clip.right -= (f64::from(out_x) * scale_x).floor() as i32;
        }
        let scale_y = f64::from(clip.height()) / f64::from(size_y);
        if start_y < 0 {
            clip.top -= (f64::from(start_y) * scale_y).ceil() as i32;
        }
        if out_y > 0 {
            clip.bottom -= (f64::from(out_y) * scale_y).floor() as i32;
        }
        if clip.is_empty() {
            return Err(DecodeError::InvalidParameter(
                "clip box is empty after fitting to the bitmap".into(),
            ));
        }

        let supports_down_scale = self.codec.as_ref().is_some_and(|c| c.supports_down_scale());
        let mut down_scale = 1;
        if supports_down_scale {
            let ratio = (clip.width() / device.width()).min(clip.height() / device.height());
            down_scale = match ratio {
                8.. => 8,
                4.. => 4,
                2.. => 2,
                _ => 1,
            };
            if down_scale > 1 {
                let ds = down_scale as i32;
                clip = Rect::new(clip.left / ds, clip.top / ds, clip.right / ds, clip.bottom / ds);
                clip.right = clip.right.max(clip.left + 1);
                clip.bottom = clip.bottom.max(clip.top + 1);
            }
        }

        Ok((
            Placement {
                clip,
                start_x: device.left,
                start_y: device.top,
                size_x: device.width(),
                size_y: device.height(),
            },
            down_scale,
        ))
    }

    fn begin(
        &mut self,
        bmp: &Bitmap,
        place: Placement,
        down_scale: u32,
        frame: usize,
        interpolate: bool,
    ) -> Result<DecodeSession, DecodeError> {
        let status = self.status;
        let codec = self.codec.as_mut().ok_or(DecodeError::InvalidState {
            operation: "start_decode",
            status,
        })?;
        let params = StartParams {
            frame,
            down_scale,
            dest: bmp.format(),
        };
        let src_format = codec::guarded(|| codec.start_decode(&params))?;
        let src_width = (self.header.width as usize).div_ceil(down_scale as usize);
        let row_bytes = src_width
            .checked_mul(src_format.bytes_per_pixel())
            .ok_or(DecodeError::AllocationFailed { requested: usize::MAX })?;
        let row = alloc_row(&self.limits, row_bytes)?;
        let mut composed = alloc_row(&self.limits, src_width)?;
        composed.resize(src_width, 0);
        let mut resampler = Resampler::new(place, bmp.format(), src_format, interpolate)?;
        if !self.header.palette.is_empty() {
            resampler.set_palette(&self.header.palette, true);
        }
        ldebug!(
            "start {:?} frame {}: {:?} rows, down-scale {}, {:?}",
            self.image_type,
            frame,
            src_format,
            down_scale,
            place
        );
        Ok(DecodeSession {
            binding: Binding::of(bmp),
            resampler,
            interpolate,
            top_down: self.header.top_down,
            pass_number: self.header.pass_number.max(1),
            bg_index: self.header.bg_index,
            src_width,
            row,
            composed,
            gif: None,
        })
    }

    /// Decode as far as the input and `stop` allow.
    ///
    /// `bmp` must be the bitmap passed to `start_decode`. Returns
    /// `DecodeToBeContinued` while the source is still growing or after a
    /// pause, `DecodeFinished` once the frame is complete.
    pub fn continue_decode(&mut self, bmp: &mut Bitmap, stop: &dyn Stop) -> DecodeStatus {
        if self.status != DecodeStatus::DecodeToBeContinued {
            return self.reject("continue_decode");
        }
        match self.pump(bmp, stop) {
            Ok(true) => {
                ldebug!("decode finished");
                self.status = DecodeStatus::DecodeFinished;
                self.release();
                self.status
            }
            Ok(false) => self.status,
            Err(e) => self.fail(e),
        }
    }

    fn pump(&mut self, bmp: &mut Bitmap, stop: &dyn Stop) -> Result<bool, DecodeError> {
        let kind = self.image_type;
        let status = self.status;
        let Self {
            codec,
            source,
            mem,
            feeder,
            limits,
            session,
            ..
        } = self;
        let (Some(codec), Some(source), Some(session)) = (codec.as_mut(), source.as_mut(), session.as_mut()) else {
            return Err(DecodeError::InvalidState {
                operation: "continue_decode",
                status,
            });
        };
        if session.binding != Binding::of(bmp) {
            return Err(DecodeError::InvalidParameter(
                "bitmap differs from the one decoding started with".into(),
            ));
        }
        loop {
            match codec::guarded(|| codec.next_event(mem, &mut session.row))? {
                Progress::NeedMoreInput => match feed(feeder, source, mem, &mut **codec, limits)? {
                    Feed::Fed => {}
                    Feed::Pending => return Ok(false),
                    Feed::Exhausted => return Err(DecodeError::Truncated),
                },
                Progress::Ready(CodecEvent::Done) => return Ok(true),
                Progress::Ready(CodecEvent::Frame(info)) => session.begin_frame(bmp, &info)?,
                Progress::Ready(CodecEvent::Image { width, height, bgra }) => {
                    session.put_image(bmp, width, height, &bgra)?;
                }
                Progress::Ready(CodecEvent::Row { line, pass }) => {
                    if session.put_row(kind, bmp, line, pass)? {
                        return Ok(true);
                    }
                    if stop.check().is_err() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Drop everything tied to the current source.
    fn release(&mut self) {
        self.session = None;
        self.codec = None;
        self.source = None;
        self.feeder.reset(&mut self.mem);
    }

    fn fail(&mut self, e: DecodeError) -> DecodeStatus {
        lwarn!("{:?} decode failed: {}", self.image_type, e);
        self.status = DecodeStatus::Error;
        self.last_error = Some(e);
        self.release();
        self.status
    }

    /// Refuse an operation called in the wrong state, keeping the session.
    fn reject(&mut self, operation: &'static str) -> DecodeStatus {
        let e = DecodeError::InvalidState {
            operation,
            status: self.status,
        };
        lwarn!("{}", e);
        self.last_error = Some(e);
        DecodeStatus::Error
    }
}
