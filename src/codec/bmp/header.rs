//! BMP file and info header parsing.

use alloc::format;
use alloc::vec::Vec;

use crate::codec::argb;
use crate::error::DecodeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Compression {
    Rgb,
    Rle8,
    Rle4,
    Bitfields,
}

impl Compression {
    fn from_u32(num: u32) -> Option<Self> {
        match num {
            0 => Some(Self::Rgb),
            1 => Some(Self::Rle8),
            2 => Some(Self::Rle4),
            3 | 6 => Some(Self::Bitfields), // 6 = BI_ALPHABITFIELDS
            _ => None,
        }
    }
}

/// Little-endian reader over a header prefix. Running short is
/// [`DecodeError::Truncated`], so callers can wait for more bytes.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let bytes = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.set_position(self.pos + n)
    }

    fn set_position(&mut self, pos: usize) -> Result<(), DecodeError> {
        if pos > self.data.len() {
            return Err(DecodeError::Truncated);
        }
        self.pos = pos;
        Ok(())
    }
}

/// Everything needed to decode the pixel array.
#[derive(Clone, Debug)]
pub(crate) struct BmpHeader {
    pub width: u32,
    pub height: u32,
    pub top_down: bool,
    pub depth: u16,
    pub compression: Compression,
    /// Red, green, blue and alpha masks.
    pub bitfields: [u32; 4],
    /// ARGB, opaque.
    pub palette: Vec<u32>,
    /// Offset of the pixel array from the start of the file.
    pub data_offset: usize,
    /// Pixels per meter.
    pub x_ppm: i32,
    pub y_ppm: i32,
}

impl BmpHeader {
    /// Bytes per stored row, padded to 4.
    pub(crate) fn stride(&self) -> usize {
        (self.width as usize * usize::from(self.depth)).div_ceil(32) * 4
    }

    pub(crate) fn is_rle(&self) -> bool {
        matches!(self.compression, Compression::Rle4 | Compression::Rle8)
    }
}

/// Parse the headers and palette at the start of `data`.
///
/// Fails with `UnrecognizedFormat` as soon as two bytes are present and
/// are not `BM`.
pub(crate) fn parse(data: &[u8]) -> Result<BmpHeader, DecodeError> {
    let mut bytes = Cursor::new(data);
    if bytes.take::<2>()? != *b"BM" {
        return Err(DecodeError::UnrecognizedFormat);
    }
    let _file_size = bytes.u32()?;
    bytes.skip(4)?;

    let hsize = bytes.u32()?;
    let ihsize = bytes.u32()?;
    if ihsize.saturating_add(14) > hsize {
        return Err(DecodeError::InvalidHeader("invalid BMP header size".into()));
    }

    let mut bitfields = [0u32; 4];
    let (mut x_ppm, mut y_ppm) = (0i32, 0i32);
    let (width, height, planes, depth, compression);
    match ihsize {
        12 => {
            // OS/2 BMPv1
            width = u32::from(bytes.u16()?);
            height = u32::from(bytes.u16()?);
            planes = bytes.u16()?;
            depth = bytes.u16()?;
            compression = Compression::Rgb;
        }
        16 | 40 | 52 | 56 | 64 | 108 | 124 => {
            width = bytes.u32()?;
            height = bytes.u32()?;
            planes = bytes.u16()?;
            depth = bytes.u16()?;
            compression = if ihsize >= 40 {
                let raw = bytes.u32()?;
                Compression::from_u32(raw).ok_or_else(|| {
                    DecodeError::UnsupportedVariant(format!("BMP compression scheme {raw}"))
                })?
            } else {
                Compression::Rgb
            };
            if ihsize > 16 {
                let _image_size = bytes.u32()?;
                x_ppm = bytes.u32()? as i32;
                y_ppm = bytes.u32()? as i32;
                let _colors_used = bytes.u32()?;
                let _important_colors = bytes.u32()?;
                // Masks live inside V2+ headers, or right after a 40-byte
                // header when the compression says so.
                if ihsize >= 52 || compression == Compression::Bitfields {
                    bitfields[0] = bytes.u32()?;
                    bitfields[1] = bytes.u32()?;
                    bitfields[2] = bytes.u32()?;
                }
                if ihsize > 40 {
                    bitfields[3] = bytes.u32()?;
                }
            }
        }
        _ => {
            return Err(DecodeError::InvalidHeader(format!(
                "unknown BMP info header size: {ihsize}"
            )));
        }
    }

    if planes != 1 {
        return Err(DecodeError::InvalidHeader(format!(
            "BMP planes field is {planes}, expected 1"
        )));
    }
    let top_down = (height as i32) < 0;
    let height = (height as i32).unsigned_abs();
    if width == 0 || height == 0 || width > i32::MAX as u32 {
        return Err(DecodeError::InvalidHeader(format!(
            "BMP dimensions {width}x{height} out of range"
        )));
    }
    if top_down && matches!(compression, Compression::Rle4 | Compression::Rle8) {
        return Err(DecodeError::InvalidData(
            "RLE compression with top-down row order".into(),
        ));
    }
    match (depth, compression) {
        (1 | 2 | 4 | 8 | 16 | 24 | 32, Compression::Rgb) => {}
        (16 | 32, Compression::Bitfields) => {}
        (8, Compression::Rle8) | (4, Compression::Rle4) => {}
        _ => {
            return Err(DecodeError::UnsupportedVariant(format!(
                "BMP bit depth {depth} with {compression:?} compression"
            )));
        }
    }

    let gap = hsize.wrapping_sub(ihsize).wrapping_sub(14);
    let mut palette = Vec::new();
    if depth <= 8 {
        let max_colors = 1u32 << depth;
        let colors = if ihsize >= 36 {
            bytes.set_position(46)?;
            let t = bytes.u32()?;
            if t > max_colors {
                return Err(DecodeError::InvalidHeader(format!(
                    "BMP palette count ({t}) exceeds max for {depth}-bit depth ({max_colors})"
                )));
            }
            if t == 0 { max_colors } else { t }
        } else {
            max_colors.min(gap / 3)
        };
        let entry_size = if ihsize == 12 { 3 } else { 4 };
        // Palettes must sit between the info header and the pixel data.
        let colors = colors.min(gap / entry_size);
        if colors == 0 && depth < 8 {
            return Err(DecodeError::UnsupportedVariant(format!(
                "unknown palette for {}-color BMP",
                max_colors
            )));
        }
        bytes.set_position(14 + ihsize as usize)?;
        for _ in 0..colors {
            let [b, g, r] = bytes.take::<3>()?;
            if entry_size == 4 {
                bytes.skip(1)?;
            }
            palette.push(argb(0xFF, r, g, b));
        }
    }

    Ok(BmpHeader {
        width,
        height,
        top_down,
        depth,
        compression,
        bitfields,
        palette,
        data_offset: hsize as usize,
        x_ppm,
        y_ppm,
    })
}
