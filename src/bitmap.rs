//! Caller-owned destination pixel store.

use alloc::format;
use alloc::vec::Vec;

use crate::error::DecodeError;
use crate::pixel::BitmapFormat;

/// A 2D pixel buffer with 32-bit aligned rows.
#[derive(Clone, Debug)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: BitmapFormat,
    pitch: usize,
    data: Vec<u8>,
    palette: Option<Vec<u32>>,
}

impl Bitmap {
    /// Allocate a zero-filled bitmap.
    pub fn new(width: u32, height: u32, format: BitmapFormat) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidParameter(format!(
                "bitmap dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let pitch = (width as usize)
            .checked_mul(format.bpp() as usize)
            .and_then(|bits| bits.checked_add(31))
            .map(|bits| bits / 32 * 4)
            .ok_or(DecodeError::DimensionsTooLarge { width, height })?;
        let size = pitch
            .checked_mul(height as usize)
            .ok_or(DecodeError::DimensionsTooLarge { width, height })?;
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| DecodeError::AllocationFailed { requested: size })?;
        data.resize(size, 0);
        Ok(Self {
            width,
            height,
            format,
            pitch,
            data,
            palette: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> BitmapFormat {
        self.format
    }

    pub fn bpp(&self) -> u32 {
        self.format.bpp()
    }

    /// Bytes per row, including alignment padding.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn is_alpha_format(&self) -> bool {
        self.format.is_alpha()
    }

    pub fn is_mask_format(&self) -> bool {
        self.format.is_mask()
    }

    pub fn has_palette(&self) -> bool {
        self.palette.is_some()
    }

    /// Attach an ARGB palette. Decoding into a palettized bitmap is rejected.
    pub fn set_palette(&mut self, palette: Option<Vec<u32>>) {
        self.palette = palette;
    }

    pub fn palette(&self) -> Option<&[u32]> {
        self.palette.as_deref()
    }

    /// Row `row`, including padding bytes.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height`.
    pub fn scanline(&self, row: usize) -> &[u8] {
        &self.data[row * self.pitch..(row + 1) * self.pitch]
    }

    /// Mutable row `row`, including padding bytes.
    ///
    /// # Panics
    ///
    /// Panics if `row >= height`.
    pub fn scanline_mut(&mut self, row: usize) -> &mut [u8] {
        &mut self.data[row * self.pitch..(row + 1) * self.pitch]
    }

    /// Whole pixel buffer, `pitch * height` bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `len` bytes starting at byte `offset` from row `src` into row `dst`.
    pub(crate) fn copy_row_span(&mut self, src: usize, dst: usize, offset: usize, len: usize) {
        if src == dst {
            return;
        }
        let from = src * self.pitch + offset;
        let to = dst * self.pitch + offset;
        self.data.copy_within(from..from + len, to);
    }

    /// Typed view of row `row` for 24/32-bit formats.
    ///
    /// Returns `None` when `P` does not match the bitmap's pixel size.
    #[cfg(feature = "rgb")]
    pub fn pixels<P: BitmapPixel>(&self, row: usize) -> Option<&[P]> {
        if P::BYTES != self.format.bytes_per_pixel() {
            return None;
        }
        let len = self.width as usize * P::BYTES;
        P::from_bytes(&self.scanline(row)[..len])
    }

    /// Copy a 32-bit bitmap out as an `ImgVec` of BGRA pixels.
    #[cfg(feature = "imgref")]
    pub fn to_imgvec_bgra(&self) -> Option<imgref::ImgVec<rgb::alt::BGRA8>> {
        if self.format.bytes_per_pixel() != 4 {
            return None;
        }
        let opaque = self.format == BitmapFormat::Bgrx;
        let mut buf = Vec::with_capacity(self.width as usize * self.height as usize);
        for row in 0..self.height as usize {
            let line = &self.scanline(row)[..self.width as usize * 4];
            buf.extend(line.chunks_exact(4).map(|p| rgb::alt::BGRA8 {
                b: p[0],
                g: p[1],
                r: p[2],
                a: if opaque { 0xFF } else { p[3] },
            }));
        }
        Some(imgref::ImgVec::new(
            buf,
            self.width as usize,
            self.height as usize,
        ))
    }
}

/// Pixel types that can view bitmap rows.
#[cfg(feature = "rgb")]
pub trait BitmapPixel: Sized {
    const BYTES: usize;
    #[doc(hidden)]
    fn from_bytes(bytes: &[u8]) -> Option<&[Self]>;
}

#[cfg(feature = "rgb")]
impl BitmapPixel for rgb::alt::BGR8 {
    const BYTES: usize = 3;
    fn from_bytes(bytes: &[u8]) -> Option<&[Self]> {
        use rgb::FromSlice;
        Some(bytes.as_bgr())
    }
}

#[cfg(feature = "rgb")]
impl BitmapPixel for rgb::alt::BGRA8 {
    const BYTES: usize = 4;
    fn from_bytes(bytes: &[u8]) -> Option<&[Self]> {
        use rgb::FromSlice;
        Some(bytes.as_bgra())
    }
}
