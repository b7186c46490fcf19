//! Incremental BMP adapter.
//!
//! Uncompressed rows are decoded as soon as a full stored row is
//! buffered. RLE streams are decoded once the whole file is available.
//! Rows are reported in file order, which is bottom-up unless the header
//! height is negative.

mod header;
mod rle;
mod utils;

use alloc::format;
use alloc::vec::Vec;

use self::header::{BmpHeader, Compression};
use self::utils::{Channel, expand_bits_to_byte};
use crate::codec::{CodecAdapter, CodecEvent, HeaderInfo, ImageType, Progress, StartParams};
use crate::decoder::{DpiUnit, ImageAttributes};
use crate::error::DecodeError;
use crate::feeder::CodecMemory;
use crate::pixel::SourceFormat;

#[derive(Debug, Default)]
pub(crate) struct BmpAdapter {
    header: Option<BmpHeader>,
    source: Option<SourceFormat>,
    /// Red, green and blue channel extractors for 16/32-bit rows.
    channels: Option<[Channel; 3]>,
    rle_pixels: Option<Vec<u8>>,
    rows_done: u32,
}

impl BmpAdapter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn source_format(h: &BmpHeader) -> SourceFormat {
        match h.depth {
            1..=8 if h.palette.is_empty() => SourceFormat::Gray8,
            1..=8 => SourceFormat::Pal8,
            16 | 24 => SourceFormat::Bgr,
            _ => SourceFormat::Bgrx,
        }
    }

    fn header(&self) -> Result<&BmpHeader, DecodeError> {
        self.header
            .as_ref()
            .ok_or_else(|| DecodeError::InvalidHeader("BMP header not parsed".into()))
    }

    fn check_indices(palette_len: usize, indices: &[u8]) -> Result<(), DecodeError> {
        if palette_len == 0 {
            return Ok(());
        }
        if let Some(&idx) = indices.iter().find(|&&i| usize::from(i) >= palette_len) {
            return Err(DecodeError::InvalidData(format!(
                "palette index {idx} out of range (palette has {palette_len} entries)"
            )));
        }
        Ok(())
    }

    /// Convert one stored row into the negotiated source layout.
    fn decode_row(&self, h: &BmpHeader, src: &[u8], row: &mut Vec<u8>) -> Result<(), DecodeError> {
        let width = h.width as usize;
        row.clear();
        match h.depth {
            1 | 2 | 4 => {
                row.resize(width, 0);
                expand_bits_to_byte(usize::from(h.depth), src, row);
                Self::check_indices(h.palette.len(), row)?;
            }
            8 => {
                row.extend_from_slice(&src[..width]);
                Self::check_indices(h.palette.len(), row)?;
            }
            24 => row.extend_from_slice(&src[..width * 3]),
            16 => {
                let [r, g, b] = self.channels.unwrap_or_else(default_565);
                for px in src[..width * 2].chunks_exact(2) {
                    let v = u32::from(u16::from_le_bytes([px[0], px[1]]));
                    row.extend_from_slice(&[b.extract(v), g.extract(v), r.extract(v)]);
                }
            }
            _ => match self.channels {
                Some([r, g, b]) => {
                    for px in src[..width * 4].chunks_exact(4) {
                        let v = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                        row.extend_from_slice(&[b.extract(v), g.extract(v), r.extract(v), 0xFF]);
                    }
                }
                None => row.extend_from_slice(&src[..width * 4]),
            },
        }
        Ok(())
    }
}

/// 5-5-5 masks used when a 16-bit file carries none.
fn default_565() -> [Channel; 3] {
    [
        Channel::new(31 << 10),
        Channel::new(31 << 5),
        Channel::new(31),
    ]
}

impl CodecAdapter for BmpAdapter {
    fn image_type(&self) -> ImageType {
        ImageType::Bmp
    }

    fn read_header(&mut self, mem: &mut CodecMemory) -> Result<Progress<HeaderInfo>, DecodeError> {
        let h = match header::parse(mem.unconsumed()) {
            Ok(h) => h,
            Err(DecodeError::Truncated) if !mem.is_end_of_stream() => {
                return Ok(Progress::NeedMoreInput);
            }
            Err(e) => return Err(e),
        };
        if mem.remaining() < h.data_offset {
            if mem.is_end_of_stream() {
                return Err(DecodeError::Truncated);
            }
            return Ok(Progress::NeedMoreInput);
        }
        mem.consume(h.data_offset);

        let source = Self::source_format(&h);
        let info = HeaderInfo {
            width: h.width,
            height: h.height,
            components: source.bytes_per_pixel() as u8,
            bpc: 8,
            pass_number: 1,
            palette: h.palette.clone(),
            bg_index: 0,
            top_down: h.top_down,
            attributes: ImageAttributes {
                x_dpi: h.x_ppm,
                y_dpi: h.y_ppm,
                unit: DpiUnit::Meter,
            },
        };
        ldebug!(
            "bmp: {}x{} depth {} {:?}, palette {}",
            h.width,
            h.height,
            h.depth,
            h.compression,
            h.palette.len()
        );
        self.source = Some(source);
        self.header = Some(h);
        Ok(Progress::Ready(info))
    }

    fn start_decode(&mut self, _params: &StartParams) -> Result<SourceFormat, DecodeError> {
        let h = self.header()?;
        let masks = h.bitfields;
        let has_masks = h.compression == Compression::Bitfields && masks[..3] != [0; 3];
        let from_masks = || [masks[0], masks[1], masks[2]].map(Channel::new);
        self.channels = match h.depth {
            16 if has_masks => Some(from_masks()),
            16 => Some(default_565()),
            32 if has_masks => Some(from_masks()),
            _ => None,
        };
        if self.channels.is_some_and(|c| c.iter().all(Channel::is_empty)) {
            return Err(DecodeError::InvalidHeader("BMP bitfield masks are all zero".into()));
        }
        self.rows_done = 0;
        self.source
            .ok_or_else(|| DecodeError::InvalidHeader("BMP header not parsed".into()))
    }

    fn next_event(
        &mut self,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        let h = self
            .header
            .take()
            .ok_or_else(|| DecodeError::InvalidHeader("BMP header not parsed".into()))?;
        let r = self.emit_row(&h, mem, row);
        self.header = Some(h);
        r
    }
}

impl BmpAdapter {
    fn emit_row(
        &mut self,
        h: &BmpHeader,
        mem: &mut CodecMemory,
        row: &mut Vec<u8>,
    ) -> Result<Progress<CodecEvent>, DecodeError> {
        if self.rows_done >= h.height {
            return Ok(Progress::Ready(CodecEvent::Done));
        }
        let line = if h.top_down {
            self.rows_done
        } else {
            h.height - 1 - self.rows_done
        };
        let width = h.width as usize;

        if h.is_rle() {
            if self.rle_pixels.is_none() {
                if !mem.is_end_of_stream() {
                    return Ok(Progress::NeedMoreInput);
                }
                self.rle_pixels = Some(rle::decode(
                    mem.unconsumed(),
                    width,
                    h.height as usize,
                    h.depth,
                )?);
                mem.consume_all();
            }
            let pixels = self.rle_pixels.as_deref().unwrap_or_default();
            let start = line as usize * width;
            row.clear();
            row.extend_from_slice(&pixels[start..start + width]);
            Self::check_indices(h.palette.len(), row)?;
        } else {
            let stride = h.stride();
            if mem.remaining() < stride {
                return Ok(Progress::NeedMoreInput);
            }
            self.decode_row(h, &mem.unconsumed()[..stride], row)?;
            mem.consume(stride);
        }
        self.rows_done += 1;
        Ok(Progress::Ready(CodecEvent::Row {
            line: line as i32,
            pass: 1,
        }))
    }
}
