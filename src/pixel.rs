/// Destination bitmap pixel model.
///
/// Multi-byte formats are stored in B, G, R(, X/A) byte order.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitmapFormat {
    /// 1 bit per pixel mask.
    Mask1,
    /// 1 bit per pixel palette index.
    Pal1,
    /// 8-bit coverage mask (decoded as gray).
    Mask8,
    /// 8-bit gray, or palette index when a palette is attached.
    Pal8,
    /// 3 bytes per pixel, B G R.
    Bgr,
    /// 4 bytes per pixel, B G R and an unused byte.
    Bgrx,
    /// 4 bytes per pixel, B G R A (straight alpha).
    Bgra,
}

impl BitmapFormat {
    /// Bits per pixel.
    pub fn bpp(&self) -> u32 {
        match self {
            Self::Mask1 | Self::Pal1 => 1,
            Self::Mask8 | Self::Pal8 => 8,
            Self::Bgr => 24,
            Self::Bgrx | Self::Bgra => 32,
        }
    }

    /// Bytes per pixel for byte-addressable formats (0 for 1-bit formats).
    pub fn bytes_per_pixel(&self) -> usize {
        self.bpp() as usize / 8
    }

    pub fn is_alpha(&self) -> bool {
        matches!(self, Self::Bgra)
    }

    pub fn is_mask(&self) -> bool {
        matches!(self, Self::Mask1 | Self::Mask8)
    }

    /// Color channels written by the vertical resampler.
    pub(crate) fn blend_channels(&self) -> usize {
        match self {
            Self::Mask1 | Self::Pal1 | Self::Mask8 | Self::Pal8 => 1,
            Self::Bgr | Self::Bgrx => 3,
            Self::Bgra => 4,
        }
    }
}

/// Scanline layout produced by a codec adapter.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// 1 byte gray per pixel.
    Gray8,
    /// 1 byte palette index per pixel.
    Pal8,
    /// B G R.
    Bgr,
    /// B G R and an unused byte.
    Bgrx,
    /// B G R A (straight alpha).
    Bgra,
    /// C M Y K, Adobe inverted (0 = full ink).
    Cmyk,
}

impl SourceFormat {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Gray8 | Self::Pal8 => 1,
            Self::Bgr => 3,
            Self::Bgrx | Self::Bgra | Self::Cmyk => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_format_sizes() {
        assert_eq!(BitmapFormat::Mask1.bytes_per_pixel(), 0);
        assert_eq!(BitmapFormat::Pal8.bytes_per_pixel(), 1);
        assert_eq!(BitmapFormat::Bgr.bytes_per_pixel(), 3);
        assert_eq!(BitmapFormat::Bgrx.bpp(), 32);
        assert!(BitmapFormat::Bgra.is_alpha());
        assert!(!BitmapFormat::Bgrx.is_alpha());
        assert!(BitmapFormat::Mask8.is_mask());
    }

    #[test]
    fn blend_channels_skip_padding_byte() {
        assert_eq!(BitmapFormat::Bgrx.blend_channels(), 3);
        assert_eq!(BitmapFormat::Bgra.blend_channels(), 4);
    }
}
