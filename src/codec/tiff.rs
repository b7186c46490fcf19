//! TIFF adapter over the `tiff` crate.
//!
//! TIFF directories can sit anywhere in the file, so nothing is parsed
//! until the stream is complete. Each frame is delivered whole as straight
//! BGRA and stretched by the orchestrator.

use alloc::format;
use alloc::vec::Vec;
use std::io::Cursor;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};

use crate::cmyk::cmyk_to_rgb;
use crate::codec::{CodecAdapter, CodecEvent, HeaderInfo, ImageType, Progress, StartParams};
use crate::decoder::ImageAttributes;
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::limits::Limits;
use crate::pixel::SourceFormat;

const LE_MAGIC: [u8; 4] = *b"II*\0";
const BE_MAGIC: [u8; 4] = *b"MM\0*";

fn tiff_err(e: tiff::TiffError) -> DecodeError {
    match e {
        tiff::TiffError::LimitsExceeded => DecodeError::LimitExceeded("TIFF decoding buffer".into()),
        tiff::TiffError::UnsupportedError(e) => DecodeError::UnsupportedVariant(format!("TIFF: {e}")),
        e => DecodeError::InvalidData(format!("TIFF: {e}")),
    }
}

/// Convert one decoded directory into straight BGRA.
fn to_bgra(color: ColorType, pixels: &DecodingResult, count: usize) -> Result<Vec<u8>, DecodeError> {
    let samples: Vec<u8> = match pixels {
        DecodingResult::U8(v) => v.clone(),
        DecodingResult::U16(v) => v.iter().map(|&s| (s >> 8) as u8).collect(),
        _ => {
            return Err(DecodeError::UnsupportedVariant(
                "TIFF sample format other than 8 or 16 bit unsigned".into(),
            ));
        }
    };
    let channels = match color {
        ColorType::Gray(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        other => {
            return Err(DecodeError::UnsupportedVariant(format!(
                "TIFF color type {other:?}"
            )));
        }
    };
    if samples.len() < count * channels {
        return Err(DecodeError::InvalidData("TIFF strip data shorter than image".into()));
    }
    let mut out = Vec::with_capacity(count * 4);
    for p in samples.chunks_exact(channels).take(count) {
        let bgra = match color {
            ColorType::Gray(_) => [p[0], p[0], p[0], 0xFF],
            ColorType::GrayA(_) => [p[0], p[0], p[0], p[1]],
            ColorType::RGB(_) => [p[2], p[1], p[0], 0xFF],
            ColorType::CMYK(_) => {
                let (r, g, b) = cmyk_to_rgb(p[0], p[1], p[2], p[3]);
                [b, g, r, 0xFF]
            }
            _ => [p[2], p[1], p[0], p[3]],
        };
        out.extend_from_slice(&bgra);
    }
    Ok(out)
}

#[derive(Debug)]
pub(crate) struct TiffAdapter {
    limits: Limits,
    frame: usize,
    delivered: bool,
}

impl TiffAdapter {
    pub(crate) fn new(limits: Limits) -> Self {
        Self {
            limits,
            frame: 0,
            delivered: false,
        }
    }

    fn open<'a>(&self, data: &'a [u8]) -> Result<Decoder<Cursor<&'a [u8]>>, DecodeError> {
        let decoder = Decoder::new(Cursor::new(data)).map_err(tiff_err)?;
        Ok(match self.limits.max_memory_bytes {
            Some(bytes) => {
                let mut limits = tiff::decoder::Limits::default();
                limits.decoding_buffer_size = usize::try_from(bytes).unwrap_or(usize::MAX);
                decoder.with_limits(limits)
            }
            None => decoder,
        })
    }
}

impl CodecAdapter for TiffAdapter {
    fn image_type(&self) -> ImageType {
        ImageType::Tiff
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
        let data = mem.data();
        let n = data.len().min(4);
        if data[..n] != LE_MAGIC[..n] && data[..n] != BE_MAGIC[..n] {
            return Err(DecodeError::UnrecognizedFormat);
        }
        if !mem.is_end_of_stream() {
            return Ok(Progress::NeedMoreInput);
        }
        if n < 4 {
            return Err(DecodeError::Truncated);
        }
        let mut decoder = self.open(data)?;
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let color = decoder.colortype().map_err(tiff_err)?;
        let (components, bpc) = match color {
            ColorType::Gray(b) => (1, b),
            ColorType::GrayA(b) => (2, b),
            ColorType::RGB(b) | ColorType::YCbCr(b) => (3, b),
            ColorType::RGBA(b) | ColorType::CMYK(b) => (4, b),
            ColorType::Palette(b) => (1, b),
            _ => (0, 0),
        };
        ldebug!("tiff: {}x{} {:?}", width, height, color);
        Ok(Progress::Ready(HeaderInfo {
            width,
            height,
            components,
            bpc,
            pass_number: 1,
            palette: Vec::new(),
            bg_index: 0,
            top_down: true,
            attributes: ImageAttributes::default(),
        }))
    }

    fn load_frame_info(&mut self, mem: &mut CodecMemory) -> Result<Progress<usize>, DecodeError> {
        let mut decoder = self.open(mem.data())?;
        let mut count = 1usize;
        while decoder.more_images() {
            decoder.next_image().map_err(tiff_err)?;
            count += 1;
        }
        ldebug!("tiff: {} directories", count);
        Ok(Progress::Ready(count))
    }

    fn start_decode(&mut self, params: &StartParams) -> Result<SourceFormat, DecodeError> {
        self.frame = params.frame;
        self.delivered = false;
        Ok(SourceFormat::Bgra)
    }

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        _row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        if self.delivered {
            return Ok(Progress::Ready(CodecEvent::Done));
        }
        let mut decoder = self.open(mem.data())?;
        decoder.seek_to_image(self.frame).map_err(tiff_err)?;
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let color = decoder.colortype().map_err(tiff_err)?;
        let pixels = decoder.read_image().map_err(tiff_err)?;
        let bgra = to_bgra(color, &pixels, width as usize * height as usize)?;
        self.delivered = true;
        Ok(Progress::Ready(CodecEvent::Image {
            width,
            height,
            bgra,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::BitmapFormat;
    use tiff::encoder::{TiffEncoder, colortype};

    fn encode_rgb(frames: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut enc = TiffEncoder::new(&mut out).unwrap();
            for (w, h, data) in frames {
                enc.write_image::<colortype::RGB8>(*w, *h, data).unwrap();
            }
        }
        out.into_inner()
    }

    #[test]
    fn waits_for_whole_file() {
        let data = encode_rgb(&[(2, 1, vec![255, 0, 0, 0, 0, 255])]);
        let mut codec = TiffAdapter::new(Limits::default());
        let mut partial = CodecMemory::from_bytes(&data, false);
        assert_eq!(codec.read_header(&mut partial).unwrap(), Progress::NeedMoreInput);
        let mut mem = CodecMemory::from_bytes(&data, true);
        let Progress::Ready(info) = codec.read_header(&mut mem).unwrap() else {
            panic!("header should be complete");
        };
        assert_eq!((info.width, info.height, info.components, info.bpc), (2, 1, 3, 8));
    }

    #[test]
    fn counts_directories_and_selects_frame() {
        let data = encode_rgb(&[
            (1, 1, vec![10, 20, 30]),
            (1, 1, vec![40, 50, 60]),
        ]);
        let mut mem = CodecMemory::from_bytes(&data, true);
        let mut codec = TiffAdapter::new(Limits::default());
        codec.read_header(&mut mem).unwrap();
        assert_eq!(codec.load_frame_info(&mut mem).unwrap(), Progress::Ready(2));
        codec
            .start_decode(&StartParams {
                frame: 1,
                down_scale: 1,
                dest: BitmapFormat::Bgra,
            })
            .unwrap();
        let mut row = Vec::new();
        match codec.next_event(&mut mem, &mut row).unwrap() {
            Progress::Ready(CodecEvent::Image { width, height, bgra }) => {
                assert_eq!((width, height), (1, 1));
                assert_eq!(bgra, vec![60, 50, 40, 255]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_magic_is_rejected_early() {
        let mut mem = CodecMemory::from_bytes(b"GIF89a", false);
        let mut codec = TiffAdapter::new(Limits::default());
        assert!(matches!(
            codec.read_header(&mut mem),
            Err(DecodeError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn cmyk_converts_to_bgra() {
        let px = to_bgra(ColorType::CMYK(8), &DecodingResult::U8(vec![0, 0, 0, 255]), 1).unwrap();
        assert_eq!(px, vec![0, 0, 0, 255]);
    }
}
