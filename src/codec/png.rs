//! PNG adapter over the `png` crate.
//!
//! The chunk walk up to the first IDAT runs incrementally; the image data
//! is decoded in one pass once the whole stream is buffered, then handed
//! out row by row in the layout the destination asks for.

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use std::io::Cursor;

use png::{ColorType, Transformations};

use crate::codec::{CodecAdapter, CodecEvent, HeaderInfo, ImageType, Progress, StartParams};
use crate::decoder::{DpiUnit, ImageAttributes};
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::limits::Limits;
use crate::pixel::{BitmapFormat, SourceFormat};
use crate::resample::rgb_to_gray;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PngHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlaced: bool,
    pub attributes: ImageAttributes,
}

impl PngHeader {
    fn components(&self) -> u8 {
        match self.color_type {
            0 => 1,
            4 => 2,
            // Palette images expand to RGB.
            2 | 3 => 3,
            _ => 4,
        }
    }
}

fn be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Walk chunks from the signature to the first IDAT.
///
/// Returns `Ok(None)` while the header is incomplete.
pub(crate) fn scan_header(data: &[u8]) -> Result<Option<PngHeader>, DecodeError> {
    let sig_len = data.len().min(SIGNATURE.len());
    if data[..sig_len] != SIGNATURE[..sig_len] {
        return Err(DecodeError::UnrecognizedFormat);
    }
    let mut header: Option<PngHeader> = None;
    let mut pos = SIGNATURE.len();
    loop {
        let Some(chunk) = data.get(pos..pos + 8) else {
            return Ok(None);
        };
        let len = be32(&chunk[..4]) as usize;
        let kind = &chunk[4..8];
        if kind == b"IDAT" {
            return header
                .map(Some)
                .ok_or_else(|| DecodeError::InvalidHeader("PNG image data before IHDR".into()));
        }
        let Some(body) = data.get(pos + 8..pos + 8 + len) else {
            return Ok(None);
        };
        match (kind, header.as_mut()) {
            (b"IHDR", None) => {
                if len < 13 {
                    return Err(DecodeError::InvalidHeader("short PNG IHDR chunk".into()));
                }
                let h = PngHeader {
                    width: be32(&body[0..4]),
                    height: be32(&body[4..8]),
                    bit_depth: body[8],
                    color_type: body[9],
                    interlaced: body[12] == 1,
                    attributes: ImageAttributes::default(),
                };
                if h.width == 0 || h.height == 0 || h.width > i32::MAX as u32 || h.height > i32::MAX as u32 {
                    return Err(DecodeError::InvalidHeader(format!(
                        "PNG dimensions {}x{} out of range",
                        h.width, h.height
                    )));
                }
                if !matches!(h.color_type, 0 | 2 | 3 | 4 | 6) {
                    return Err(DecodeError::InvalidHeader(format!(
                        "PNG color type {}",
                        h.color_type
                    )));
                }
                header = Some(h);
            }
            (b"IHDR", Some(_)) => {
                return Err(DecodeError::InvalidHeader("duplicate PNG IHDR chunk".into()));
            }
            (_, None) => {
                return Err(DecodeError::InvalidHeader("PNG does not start with IHDR".into()));
            }
            (b"pHYs", Some(h)) if len >= 9 => {
                h.attributes = ImageAttributes {
                    x_dpi: be32(&body[0..4]) as i32,
                    y_dpi: be32(&body[4..8]) as i32,
                    unit: if body[8] == 1 { DpiUnit::Meter } else { DpiUnit::None },
                };
            }
            _ => {}
        }
        // Skip the body and CRC.
        pos += 8 + len + 4;
    }
}

#[derive(Debug)]
pub(crate) struct PngAdapter {
    limits: Limits,
    header: Option<PngHeader>,
    source: SourceFormat,
    pixels: Option<Vec<u8>>,
    next_row: usize,
}

impl PngAdapter {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            header: None,
            source: SourceFormat::Bgra,
            pixels: None,
            next_row: 0,
        }
    }

    /// Decode the whole stream and convert it to `self.source`.
    fn decode_all(&mut self, data: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut decoder = match self.limits.max_memory_bytes {
            Some(bytes) => png::Decoder::new_with_limits(
                Cursor::new(data),
                png::Limits {
                    bytes: usize::try_from(bytes).unwrap_or(usize::MAX),
                },
            ),
            None => png::Decoder::new(Cursor::new(data)),
        };
        decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| DecodeError::InvalidData(format!("PNG: {e}")))?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let out = reader
            .next_frame(&mut buf)
            .map_err(|e| DecodeError::InvalidData(format!("PNG: {e}")))?;

        let width = out.width as usize;
        let channels = match out.color_type {
            ColorType::Grayscale => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
            ColorType::Indexed => {
                return Err(DecodeError::UnsupportedVariant(
                    "PNG palette was not expanded".into(),
                ));
            }
        };
        let bpp = self.source.bytes_per_pixel();
        let mut pixels = Vec::with_capacity(width * out.height as usize * bpp);
        for line in buf.chunks_exact(out.line_size).take(out.height as usize) {
            for px in line[..width * channels].chunks_exact(channels) {
                let (r, g, b, a) = match channels {
                    1 | 2 => (px[0], px[0], px[0], if channels == 2 { px[1] } else { 0xFF }),
                    3 => (px[0], px[1], px[2], 0xFF),
                    _ => (px[0], px[1], px[2], px[3]),
                };
                match self.source {
                    SourceFormat::Gray8 => pixels.push(rgb_to_gray(r, g, b)),
                    SourceFormat::Bgr => pixels.extend_from_slice(&[b, g, r]),
                    _ => pixels.extend_from_slice(&[b, g, r, a]),
                }
            }
        }
        Ok(pixels)
    }
}

impl CodecAdapter for PngAdapter {
    fn image_type(&self) -> ImageType {
        ImageType::Png
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
        let Some(header) = scan_header(mem.data())? else {
            if mem.is_end_of_stream() {
                return Err(DecodeError::Truncated);
            }
            return Ok(Progress::NeedMoreInput);
        };
        ldebug!(
            "png: {}x{} color type {} depth {} interlaced {}",
            header.width,
            header.height,
            header.color_type,
            header.bit_depth,
            header.interlaced
        );
        let info = HeaderInfo {
            width: header.width,
            height: header.height,
            components: header.components(),
            bpc: header.bit_depth,
            pass_number: if header.interlaced { 7 } else { 1 },
            palette: Vec::new(),
            bg_index: 0,
            top_down: true,
            attributes: header.attributes.clone(),
        };
        self.header = Some(header);
        Ok(Progress::Ready(info))
    }

    fn start_decode(&mut self, params: &StartParams) -> Result<SourceFormat, DecodeError> {
        if self.header.is_none() {
            return Err(DecodeError::InvalidHeader("PNG header not parsed".into()));
        }
        self.source = match params.dest {
            BitmapFormat::Mask8 | BitmapFormat::Pal8 => SourceFormat::Gray8,
            BitmapFormat::Bgr => SourceFormat::Bgr,
            _ => SourceFormat::Bgra,
        };
        self.pixels = None;
        self.next_row = 0;
        Ok(self.source)
    }

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        let Some(header) = self.header.as_ref() else {
            return Err(DecodeError::InvalidHeader("PNG header not parsed".into()));
        };
        let stride = header.width as usize * self.source.bytes_per_pixel();
        let height = header.height as usize;
        let pass = if header.interlaced { 7 } else { 1 };
        if self.pixels.is_none() {
            if !mem.is_end_of_stream() {
                return Ok(Progress::NeedMoreInput);
            }
            let pixels = self.decode_all(mem.data())?;
            if pixels.len() < stride * height {
                return Err(DecodeError::InvalidData("PNG frame smaller than its header".into()));
            }
            self.pixels = Some(pixels);
            mem.consume_all();
        }
        if self.next_row >= height {
            return Ok(Progress::Ready(CodecEvent::Done));
        }
        let pixels = self.pixels.as_deref().unwrap_or_default();
        let start = self.next_row * stride;
        row.clear();
        row.extend_from_slice(&pixels[start..start + stride]);
        let line = self.next_row as i32;
        self.next_row += 1;
        Ok(Progress::Ready(CodecEvent::Row { line, pass }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut v = (body.len() as u32).to_be_bytes().to_vec();
        v.extend_from_slice(kind);
        v.extend_from_slice(body);
        v.extend_from_slice(&[0; 4]);
        v
    }

    fn header_bytes(interlace: u8) -> Vec<u8> {
        let mut v = SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&3u32.to_be_bytes());
        ihdr.extend_from_slice(&2u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, interlace]);
        v.extend(chunk(b"IHDR", &ihdr));
        let mut phys = Vec::new();
        phys.extend_from_slice(&3780u32.to_be_bytes());
        phys.extend_from_slice(&3780u32.to_be_bytes());
        phys.push(1);
        v.extend(chunk(b"pHYs", &phys));
        v.extend(chunk(b"IDAT", &[]));
        v
    }

    #[test]
    fn scans_ihdr_and_phys() {
        let h = scan_header(&header_bytes(1)).unwrap().unwrap();
        assert_eq!((h.width, h.height, h.bit_depth, h.color_type), (3, 2, 8, 6));
        assert!(h.interlaced);
        assert_eq!(h.components(), 4);
        assert_eq!(h.attributes.unit, DpiUnit::Meter);
        assert_eq!(h.attributes.x_dpi, 3780);
    }

    #[test]
    fn incomplete_header_is_pending() {
        let full = header_bytes(0);
        for cut in [0, 4, 8, 20, 40] {
            assert_eq!(scan_header(&full[..cut]).unwrap(), None, "cut at {cut}");
        }
    }

    #[test]
    fn rejects_foreign_signature() {
        assert!(matches!(scan_header(b"GIF8"), Err(DecodeError::UnrecognizedFormat)));
    }

    #[test]
    fn interlaced_header_reports_seven_passes() {
        let mut mem = CodecMemory::from_bytes(&header_bytes(1), false);
        let mut codec = PngAdapter::new(Limits::default());
        let Progress::Ready(info) = codec.read_header(&mut mem).unwrap() else {
            panic!("header should be complete");
        };
        assert_eq!(info.pass_number, 7);
        assert_eq!(info.components, 4);
    }
}
