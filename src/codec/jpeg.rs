//! JPEG adapter over `jpeg-decoder`.
//!
//! Headers are read by scanning markers as bytes arrive, so detection does
//! not need the whole file. Pixel decoding waits for the end of the stream
//! and then hands the buffered file to `jpeg-decoder` in one go, asking it
//! to shrink 1/2, 1/4 or 1/8 inside the IDCT when the output is small.

use alloc::format;
use alloc::vec::Vec;

use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat};

use crate::codec::{CodecAdapter, CodecEvent, HeaderInfo, ImageType, Progress, StartParams};
use crate::decoder::{DpiUnit, ImageAttributes};
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::limits::Limits;
use crate::pixel::SourceFormat;

/// Header fields gathered from the marker segments before the first scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct JpegHeader {
    pub width: u16,
    pub height: u16,
    pub components: u8,
    pub precision: u8,
    /// APP14 color transform, when an Adobe segment is present.
    pub adobe_transform: Option<u8>,
    pub attributes: ImageAttributes,
}

/// Scan markers up to the first SOS.
///
/// Returns `Ok(None)` when `data` ends before the header does.
pub(crate) fn scan_header(data: &[u8]) -> Result<Option<JpegHeader>, DecodeError> {
    match data {
        [] | [0xFF] => return Ok(None),
        [0xFF, 0xD8, ..] => {}
        _ => return Err(DecodeError::UnrecognizedFormat),
    }
    let mut header = JpegHeader::default();
    let mut seen_sof = false;
    let mut pos = 2;
    loop {
        // Fill bytes may precede any marker.
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let (Some(&ff), Some(&marker)) = (data.get(pos), data.get(pos + 1)) else {
            return Ok(None);
        };
        if ff != 0xFF {
            return Err(DecodeError::InvalidHeader(format!(
                "expected JPEG marker at offset {pos}, found {ff:#04x}"
            )));
        }
        pos += 2;
        if matches!(marker, 0x01 | 0xD0..=0xD7) {
            continue;
        }
        if marker == 0xD9 {
            return Err(DecodeError::InvalidHeader("JPEG ends before first scan".into()));
        }
        let Some(len) = data
            .get(pos..pos + 2)
            .map(|b| usize::from(u16::from_be_bytes([b[0], b[1]])))
        else {
            return Ok(None);
        };
        if len < 2 {
            return Err(DecodeError::InvalidHeader(format!("JPEG segment length {len}")));
        }
        let Some(seg) = data.get(pos + 2..pos + len) else {
            return Ok(None);
        };
        match marker {
            0xDA => {
                if !seen_sof {
                    return Err(DecodeError::InvalidHeader("JPEG scan before frame header".into()));
                }
                return Ok(Some(header));
            }
            0xE0 if seg.len() >= 12 && seg.starts_with(b"JFIF\0") => {
                header.attributes = ImageAttributes {
                    x_dpi: i32::from(u16::from_be_bytes([seg[8], seg[9]])),
                    y_dpi: i32::from(u16::from_be_bytes([seg[10], seg[11]])),
                    unit: match seg[7] {
                        1 => DpiUnit::Inch,
                        2 => DpiUnit::Centimeter,
                        _ => DpiUnit::None,
                    },
                };
            }
            0xEE if seg.len() >= 12 && seg.starts_with(b"Adobe") => {
                header.adobe_transform = Some(seg[11]);
            }
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if seg.len() < 6 {
                    return Err(DecodeError::InvalidHeader("short JPEG frame header".into()));
                }
                header.precision = seg[0];
                header.height = u16::from_be_bytes([seg[1], seg[2]]);
                header.width = u16::from_be_bytes([seg[3], seg[4]]);
                header.components = seg[5];
                if header.width == 0 || header.height == 0 {
                    return Err(DecodeError::UnsupportedVariant(format!(
                        "JPEG frame size {}x{}",
                        header.width, header.height
                    )));
                }
                if !matches!(header.components, 1 | 3 | 4) {
                    return Err(DecodeError::UnsupportedVariant(format!(
                        "JPEG with {} components",
                        header.components
                    )));
                }
                seen_sof = true;
            }
            _ => {}
        }
        pos += len;
    }
}

/// Average `ds x ds` blocks of a packed image, for sizes the IDCT
/// scaling cannot produce.
fn box_downscale(src: &[u8], width: usize, height: usize, channels: usize, ds: usize) -> Vec<u8> {
    let out_w = width.div_ceil(ds);
    let out_h = height.div_ceil(ds);
    let mut out = Vec::with_capacity(out_w * out_h * channels);
    for oy in 0..out_h {
        let ys = oy * ds..((oy + 1) * ds).min(height);
        for ox in 0..out_w {
            let xs = ox * ds..((ox + 1) * ds).min(width);
            let count = (ys.len() * xs.len()) as u32;
            for c in 0..channels {
                let mut sum = 0u32;
                for y in ys.clone() {
                    let row = &src[y * width * channels..];
                    for x in xs.clone() {
                        sum += u32::from(row[x * channels + c]);
                    }
                }
                out.push(((sum + count / 2) / count) as u8);
            }
        }
    }
    out
}

#[derive(Debug)]
pub(crate) struct JpegAdapter {
    limits: Limits,
    header: Option<JpegHeader>,
    down_scale: usize,
    source: SourceFormat,
    /// Decoded rows and their geometry once the stream has been decoded.
    pixels: Option<(Vec<u8>, usize)>,
    next_row: usize,
}

impl JpegAdapter {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            header: None,
            down_scale: 1,
            source: SourceFormat::Bgr,
            pixels: None,
            next_row: 0,
        }
    }

    fn decode_all(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidHeader("JPEG header not parsed".into()))?;
        let (width, height) = (usize::from(header.width), usize::from(header.height));
        let ds = self.down_scale;
        let (out_w, out_h) = (width.div_ceil(ds), height.div_ceil(ds));

        let mut decoder = JpegDecoder::new(data);
        if let Some(max) = self.limits.max_memory_bytes {
            decoder.set_max_decoding_buffer_size(usize::try_from(max).unwrap_or(usize::MAX));
        }
        let scaled = if ds > 1 {
            decoder
                .scale(out_w as u16, out_h as u16)
                .map_err(|e| DecodeError::InvalidData(format!("JPEG: {e}")))?
        } else {
            (header.width, header.height)
        };
        // The IDCT can only hit the requested size when both axes agree on
        // the factor; otherwise decode in full and average blocks.
        let native = (usize::from(scaled.0), usize::from(scaled.1)) == (out_w, out_h);
        if !native {
            decoder
                .scale(header.width, header.height)
                .map_err(|e| DecodeError::InvalidData(format!("JPEG: {e}")))?;
        }
        let mut pixels = decoder
            .decode()
            .map_err(|e| DecodeError::InvalidData(format!("JPEG: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| DecodeError::InvalidData("JPEG decoder returned no frame info".into()))?;
        let (dec_w, dec_h) = (usize::from(info.width), usize::from(info.height));
        ltrace!(
            "jpeg: decoded {}x{} {:?}, idct scaled {}",
            dec_w,
            dec_h,
            info.pixel_format,
            native && ds > 1
        );

        if info.pixel_format == PixelFormat::L16 {
            let shift = u32::from(header.precision.saturating_sub(8));
            pixels = pixels
                .chunks_exact(2)
                .map(|p| (u16::from_ne_bytes([p[0], p[1]]) >> shift).min(255) as u8)
                .collect();
        }
        let channels = self.source.bytes_per_pixel();
        if pixels.len() < dec_w * dec_h * channels {
            return Err(DecodeError::InvalidData(format!(
                "JPEG decoded {} bytes, expected {}",
                pixels.len(),
                dec_w * dec_h * channels
            )));
        }
        match self.source {
            SourceFormat::Bgr => {
                for px in pixels.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
            }
            // Four-component output is ink amounts; rows carry the inverted form.
            SourceFormat::Cmyk => {
                for v in pixels.iter_mut() {
                    *v = 255 - *v;
                }
            }
            _ => {}
        }
        if !native {
            pixels = box_downscale(&pixels, dec_w, dec_h, channels, ds);
        }
        self.pixels = Some((pixels, out_w * channels));
        Ok(())
    }
}

impl CodecAdapter for JpegAdapter {
    fn image_type(&self) -> ImageType {
        ImageType::Jpeg
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
        let Some(header) = scan_header(mem.data())? else {
            if mem.is_end_of_stream() {
                return Err(DecodeError::Truncated);
            }
            return Ok(Progress::NeedMoreInput);
        };
        ldebug!(
            "jpeg: {}x{}, {} components, adobe transform {:?}",
            header.width,
            header.height,
            header.components,
            header.adobe_transform
        );
        let info = HeaderInfo {
            width: u32::from(header.width),
            height: u32::from(header.height),
            components: header.components,
            bpc: header.precision,
            pass_number: 1,
            palette: Vec::new(),
            bg_index: 0,
            top_down: true,
            attributes: header.attributes.clone(),
        };
        self.header = Some(header);
        Ok(Progress::Ready(info))
    }

    fn supports_down_scale(&self) -> bool {
        true
    }

    fn start_decode(&mut self, params: &StartParams) -> Result<SourceFormat, DecodeError> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidHeader("JPEG header not parsed".into()))?;
        self.source = match header.components {
            1 => SourceFormat::Gray8,
            4 => SourceFormat::Cmyk,
            _ => SourceFormat::Bgr,
        };
        self.down_scale = params.down_scale.clamp(1, 8) as usize;
        self.next_row = 0;
        self.pixels = None;
        Ok(self.source)
    }

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        if self.pixels.is_none() {
            if !mem.is_end_of_stream() {
                return Ok(Progress::NeedMoreInput);
            }
            self.decode_all(mem.data())?;
            mem.consume_all();
        }
        let Some((pixels, stride)) = self.pixels.as_ref() else {
            return Ok(Progress::Ready(CodecEvent::Done));
        };
        let start = self.next_row * stride;
        if start + stride > pixels.len() {
            return Ok(Progress::Ready(CodecEvent::Done));
        }
        row.clear();
        row.extend_from_slice(&pixels[start..start + stride]);
        let line = self.next_row as i32;
        self.next_row += 1;
        Ok(Progress::Ready(CodecEvent::Row { line, pass: 1 }))
    }
}
