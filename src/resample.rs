//! Scanline resampling into the destination bitmap.
//!
//! Horizontal work happens once per decoded source row: the row is mapped
//! through the horizontal [`WeightTable`] and converted to the destination
//! pixel model by one [`TransformMethod`] chosen at decode start. Vertical
//! work operates on rows already written into the bitmap.

use alloc::vec;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::cmyk::cmyk_to_rgb;
use crate::error::DecodeError;
use crate::geometry::Rect;
use crate::pixel::{BitmapFormat, SourceFormat};
use crate::weights::{PixelWeight, StretchTable, WeightTable};

/// Gray from 8-bit R, G, B.
#[inline]
pub(crate) fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(b) * 29 + u32::from(g) * 150 + u32::from(r) * 77) >> 8) as u8
}

/// Fixed-point accumulator back to a channel value, rounded.
#[inline]
fn px(sum: i32) -> u8 {
    ((sum + 0x7FFF) >> 16).clamp(0, 255) as u8
}

#[inline]
fn argb_parts(argb: u32) -> [u8; 4] {
    [(argb >> 24) as u8, (argb >> 16) as u8, (argb >> 8) as u8, argb as u8]
}

/// Contributing `(source index, weight)` pairs of one entry.
#[inline]
fn taps(w: &PixelWeight) -> impl Iterator<Item = (usize, i32)> {
    let n = if w.src_start == w.src_end { 1 } else { 2 };
    [
        (w.src_start as usize, w.weights[0]),
        (w.src_end as usize, w.weights[1]),
    ]
    .into_iter()
    .take(n)
}

/// Pixel conversion applied by the horizontal pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformMethod {
    GrayToGray,
    PalToGray,
    BgrToGray,
    CmykToGray,
    GrayToBgr,
    PalToBgr,
    BgrToBgr,
    CmykToBgr,
    /// Alpha-weighted blend of straight BGRA.
    BgraToBgra,
    PalToBgra,
}

impl TransformMethod {
    /// Conversion for `src` scanlines written into `dest` bitmaps, if any.
    pub fn select(dest: BitmapFormat, src: SourceFormat) -> Option<Self> {
        use SourceFormat as S;
        Some(match dest {
            BitmapFormat::Mask8 | BitmapFormat::Pal8 => match src {
                S::Gray8 => Self::GrayToGray,
                S::Pal8 => Self::PalToGray,
                S::Bgr | S::Bgrx | S::Bgra => Self::BgrToGray,
                S::Cmyk => Self::CmykToGray,
            },
            BitmapFormat::Bgr => match src {
                S::Gray8 => Self::GrayToBgr,
                S::Pal8 => Self::PalToBgr,
                S::Bgr | S::Bgrx | S::Bgra => Self::BgrToBgr,
                S::Cmyk => Self::CmykToBgr,
            },
            BitmapFormat::Bgrx => match src {
                S::Gray8 => Self::GrayToBgr,
                S::Pal8 => Self::PalToBgr,
                S::Bgr | S::Bgrx => Self::BgrToBgr,
                S::Bgra => Self::BgraToBgra,
                S::Cmyk => Self::CmykToBgr,
            },
            BitmapFormat::Bgra => match src {
                S::Gray8 => Self::GrayToBgr,
                S::Pal8 => Self::PalToBgra,
                S::Bgr | S::Bgrx => Self::BgrToBgr,
                S::Bgra => Self::BgraToBgra,
                S::Cmyk => Self::CmykToBgr,
            },
            BitmapFormat::Mask1 | BitmapFormat::Pal1 => return None,
        })
    }
}

/// Where the clip box lands in the destination bitmap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    /// Source rectangle being decoded.
    pub clip: Rect,
    pub start_x: i32,
    pub start_y: i32,
    pub size_x: i32,
    pub size_y: i32,
}

impl Placement {
    pub fn scale_y(&self) -> f64 {
        f64::from(self.size_y) / f64::from(self.clip.height())
    }

    /// Destination row for source row `src_line`, if it lands inside the region.
    ///
    /// When several source rows share a destination row, only the last of
    /// them maps, whatever order rows arrive in.
    pub fn dest_row(&self, src_line: i32) -> Option<i32> {
        if src_line < self.clip.top || src_line >= self.clip.bottom {
            return None;
        }
        let row = self.row_of(src_line);
        if src_line + 1 < self.clip.bottom && self.row_of(src_line + 1) == row {
            return None;
        }
        (row < self.start_y + self.size_y).then_some(row)
    }

    fn row_of(&self, src_line: i32) -> i32 {
        (f64::from(src_line - self.clip.top) * self.scale_y()) as i32 + self.start_y
    }
}

/// Per-session resampling state.
#[derive(Debug)]
pub struct Resampler {
    place: Placement,
    interpolate: bool,
    method: TransformMethod,
    src_format: SourceFormat,
    dest_format: BitmapFormat,
    palette: Vec<u32>,
    palette_opaque: bool,
    horz: WeightTable,
    vert: WeightTable,
    row_a: Vec<u8>,
    row_b: Vec<u8>,
}

impl Resampler {
    pub fn new(
        place: Placement,
        dest_format: BitmapFormat,
        src_format: SourceFormat,
        interpolate: bool,
    ) -> Result<Self, DecodeError> {
        let method = TransformMethod::select(dest_format, src_format).ok_or(
            DecodeError::UnsupportedConversion {
                from: src_format,
                to: dest_format,
            },
        )?;
        let horz = WeightTable::horizontal(place.size_x, place.clip.width(), interpolate)?;
        let vert = WeightTable::vertical(place.size_y, place.clip.height())?;
        ldebug!(
            "resampler: {:?} -> {:?} via {:?}, clip {:?} into {}x{}",
            src_format,
            dest_format,
            method,
            place.clip,
            place.size_x,
            place.size_y
        );
        Ok(Self {
            place,
            interpolate,
            method,
            src_format,
            dest_format,
            palette: vec![0xFF00_0000; 256],
            palette_opaque: false,
            horz,
            vert,
            row_a: Vec::new(),
            row_b: Vec::new(),
        })
    }

    pub fn method(&self) -> TransformMethod {
        self.method
    }

    pub fn placement(&self) -> &Placement {
        &self.place
    }

    pub fn src_format(&self) -> SourceFormat {
        self.src_format
    }

    /// Install an ARGB palette. Missing entries read as opaque black.
    ///
    /// `opaque` forces alpha to 0xFF on palette lookups.
    pub fn set_palette(&mut self, palette: &[u32], opaque: bool) {
        self.palette.clear();
        self.palette.extend(palette.iter().take(256));
        self.palette.resize(256, 0xFF00_0000);
        self.palette_opaque = opaque;
    }

    pub(crate) fn palette_entry(&self, index: u8) -> u32 {
        self.palette[usize::from(index)]
    }

    fn span(&self) -> (usize, usize) {
        let bpp = self.dest_format.bytes_per_pixel();
        (
            self.place.start_x as usize * bpp,
            self.place.size_x as usize * bpp,
        )
    }

    /// Map one source scanline (full source width) onto destination row `des_row`.
    pub fn resample_scanline(&self, bmp: &mut Bitmap, des_row: i32, src: &[u8]) {
        let s_bpp = self.src_format.bytes_per_pixel();
        let d_bpp = self.dest_format.bytes_per_pixel();
        let src = &src[(self.place.clip.left as usize * s_bpp).min(src.len())..];
        let (offset, len) = self.span();
        let dst = &mut bmp.scanline_mut(des_row as usize)[offset..offset + len];

        for (w, out) in self.horz.iter().zip(dst.chunks_exact_mut(d_bpp)) {
            match self.method {
                TransformMethod::GrayToGray => {
                    let g: i32 = taps(w).map(|(j, wt)| wt * i32::from(src[j])).sum();
                    out[0] = px(g);
                }
                TransformMethod::GrayToBgr => {
                    let g = px(taps(w).map(|(j, wt)| wt * i32::from(src[j])).sum());
                    out[..3].fill(g);
                    if d_bpp == 4 {
                        out[3] = 0xFF;
                    }
                }
                TransformMethod::PalToGray | TransformMethod::PalToBgr | TransformMethod::PalToBgra => {
                    let mut sum = [0i32; 4];
                    for (j, wt) in taps(w) {
                        let [a, r, g, b] = argb_parts(self.palette[usize::from(src[j])]);
                        sum[0] += wt * i32::from(b);
                        sum[1] += wt * i32::from(g);
                        sum[2] += wt * i32::from(r);
                        sum[3] += wt * i32::from(a);
                    }
                    let [b, g, r, a] = sum.map(px);
                    match self.method {
                        TransformMethod::PalToGray => out[0] = rgb_to_gray(r, g, b),
                        TransformMethod::PalToBgr => {
                            out[..3].copy_from_slice(&[b, g, r]);
                            if d_bpp == 4 {
                                out[3] = 0xFF;
                            }
                        }
                        _ => {
                            let a = if self.palette_opaque { 0xFF } else { a };
                            out.copy_from_slice(&[b, g, r, a]);
                        }
                    }
                }
                TransformMethod::BgrToGray | TransformMethod::BgrToBgr => {
                    let mut sum = [0i32; 3];
                    for (j, wt) in taps(w) {
                        let p = &src[j * s_bpp..j * s_bpp + 3];
                        for c in 0..3 {
                            sum[c] += wt * i32::from(p[c]);
                        }
                    }
                    let [b, g, r] = sum.map(px);
                    if self.method == TransformMethod::BgrToGray {
                        out[0] = rgb_to_gray(r, g, b);
                    } else {
                        out[..3].copy_from_slice(&[b, g, r]);
                        if d_bpp == 4 {
                            out[3] = 0xFF;
                        }
                    }
                }
                TransformMethod::CmykToGray | TransformMethod::CmykToBgr => {
                    let mut sum = [0i32; 3];
                    for (j, wt) in taps(w) {
                        let p = &src[j * 4..j * 4 + 4];
                        let (r, g, b) = cmyk_to_rgb(255 - p[0], 255 - p[1], 255 - p[2], 255 - p[3]);
                        sum[0] += wt * i32::from(b);
                        sum[1] += wt * i32::from(g);
                        sum[2] += wt * i32::from(r);
                    }
                    let [b, g, r] = sum.map(px);
                    if self.method == TransformMethod::CmykToGray {
                        out[0] = rgb_to_gray(r, g, b);
                    } else {
                        out[..3].copy_from_slice(&[b, g, r]);
                        if d_bpp == 4 {
                            out[3] = 0xFF;
                        }
                    }
                }
                TransformMethod::BgraToBgra => {
                    let mut sum = [0i64; 3];
                    let mut alpha = 0i64;
                    for (j, wt) in taps(w) {
                        let p = &src[j * 4..j * 4 + 4];
                        let aw = i64::from(wt) * i64::from(p[3]) / 255;
                        for c in 0..3 {
                            sum[c] += aw * i64::from(p[c]);
                        }
                        alpha += aw;
                    }
                    if alpha == 0 {
                        out[..3].fill(0);
                    } else {
                        for c in 0..3 {
                            out[c] = ((sum[c] + alpha / 2) / alpha).min(255) as u8;
                        }
                    }
                    out[3] = if d_bpp == 4 && self.dest_format == BitmapFormat::Bgrx {
                        0xFF
                    } else {
                        ((alpha * 255 + 0x7FFF) >> 16).min(255) as u8
                    };
                }
            }
        }
    }

    /// Straight per-channel 2-tap mapping for rows whose source layout
    /// already matches the destination channels.
    pub fn resample_one_to_one(&self, bmp: &mut Bitmap, des_row: i32, src: &[u8]) {
        let s_bpp = self.src_format.bytes_per_pixel();
        let d_bpp = self.dest_format.bytes_per_pixel();
        let channels = self.dest_format.blend_channels();
        let src = &src[(self.place.clip.left as usize * s_bpp).min(src.len())..];
        let (offset, len) = self.span();
        let dst = &mut bmp.scanline_mut(des_row as usize)[offset..offset + len];

        for (w, out) in self.horz.iter().zip(dst.chunks_exact_mut(d_bpp)) {
            for c in 0..channels {
                let sum: i32 = taps(w)
                    .map(|(j, wt)| wt * i32::from(src[j * s_bpp + c]))
                    .sum();
                out[c] = px(sum);
            }
            if self.dest_format == BitmapFormat::Bgrx {
                out[3] = 0xFF;
            }
        }
    }

    /// Resample `src` (source row `src_line`) and fill the rows it spans.
    ///
    /// Returns false when the row falls outside the clip.
    pub fn resample(&mut self, bmp: &mut Bitmap, src_line: i32, src: &[u8]) -> bool {
        let Some(des_row) = self.place.dest_row(src_line) else {
            return false;
        };
        self.resample_scanline(bmp, des_row, src);
        if self.place.scale_y() > 1.0 {
            self.resample_vert(bmp, des_row);
        }
        true
    }

    /// Fill rows between the previous anchor and `des_row`, for rows
    /// arriving top to bottom.
    pub fn resample_vert(&mut self, bmp: &mut Bitmap, des_row: i32) {
        let scale_y = self.place.scale_y();
        let step = scale_y as i32;
        let top = self.place.start_y;
        let bottom = top + self.place.size_y;
        if self.interpolate {
            let mut row = des_row - step;
            if row >= top {
                while row < des_row {
                    self.blend_row(bmp, row);
                    row += 1;
                }
            }
            if des_row + step >= bottom - 1 {
                self.broadcast_tail(bmp, des_row);
            }
            return;
        }
        let multiple = (scale_y - 1.0).ceil() as i32;
        let (offset, len) = self.span();
        for i in 1..=multiple {
            if des_row + i >= bottom {
                return;
            }
            bmp.copy_row_span(des_row as usize, (des_row + i) as usize, offset, len);
        }
    }

    /// Fill rows between `des_row` and the anchor below it, for rows
    /// arriving bottom to top.
    pub fn resample_vert_bottom_up(&mut self, bmp: &mut Bitmap, des_row: i32) {
        let step = self.place.scale_y() as i32;
        let bottom = self.place.start_y + self.place.size_y;
        let below = des_row + step;
        if below >= bottom - 1 {
            self.broadcast_tail(bmp, des_row);
            return;
        }
        for row in (des_row + 1..=below).rev() {
            self.blend_row(bmp, row);
        }
    }

    /// Backfill for interlaced rows: blend the two-step window above
    /// `des_row`, repeating one step further down near the bottom edge.
    pub fn gif_double_line(&mut self, bmp: &mut Bitmap, des_row: i32) {
        let scale_y = self.place.scale_y();
        let step = scale_y as i32;
        let double_step = (2.0 * scale_y) as i32;
        let top = self.place.start_y;
        let last = top + self.place.size_y - 1;
        let mut des_row = des_row;
        loop {
            let mut row = (des_row - double_step).max(top);
            while row < des_row {
                self.blend_row(bmp, row);
                row += 1;
            }
            if des_row + double_step >= last && des_row + step < last {
                des_row += step;
            } else {
                break;
            }
        }
    }

    /// Copy row `des_row` into every row below it in the region.
    pub fn broadcast_tail(&self, bmp: &mut Bitmap, des_row: i32) {
        let (offset, len) = self.span();
        let bottom = self.place.start_y + self.place.size_y;
        for row in des_row + 1..bottom {
            bmp.copy_row_span(des_row as usize, row as usize, offset, len);
        }
    }

    /// Recompute destination row `row` from the rows its vertical weight names.
    fn blend_row(&mut self, bmp: &mut Bitmap, row: i32) {
        let top = self.place.start_y;
        let Some(&w) = self.vert.get((row - top) as usize) else {
            return;
        };
        let (offset, len) = self.span();
        let s1 = (w.src_start + top) as usize;
        let s2 = (w.src_end + top) as usize;
        if s1 == s2 {
            bmp.copy_row_span(s1, row as usize, offset, len);
            return;
        }
        self.row_a.clear();
        self.row_a.extend_from_slice(&bmp.scanline(s1)[offset..offset + len]);
        self.row_b.clear();
        self.row_b.extend_from_slice(&bmp.scanline(s2)[offset..offset + len]);

        let bpp = self.dest_format.bytes_per_pixel();
        let channels = self.dest_format.blend_channels();
        let pad = self.dest_format == BitmapFormat::Bgrx;
        let dst = &mut bmp.scanline_mut(row as usize)[offset..offset + len];
        for ((out, a), b) in dst
            .chunks_exact_mut(bpp)
            .zip(self.row_a.chunks_exact(bpp))
            .zip(self.row_b.chunks_exact(bpp))
        {
            for c in 0..channels {
                out[c] = px(w.weights[0] * i32::from(a[c]) + w.weights[1] * i32::from(b[c]));
            }
            if pad {
                out[3] = 0xFF;
            }
        }
    }

    /// Paint the whole destination region with one ARGB color, converted
    /// the way palette lookups are.
    pub fn fill_region(&self, bmp: &mut Bitmap, argb: u32) {
        let [a, r, g, b] = argb_parts(argb);
        let bpp = self.dest_format.bytes_per_pixel();
        let pixel: [u8; 4] = match self.dest_format {
            BitmapFormat::Mask8 | BitmapFormat::Pal8 => [rgb_to_gray(r, g, b), 0, 0, 0],
            BitmapFormat::Bgra if self.method == TransformMethod::PalToBgra => {
                [b, g, r, if self.palette_opaque { 0xFF } else { a }]
            }
            _ => [b, g, r, 0xFF],
        };
        let (offset, len) = self.span();
        for row in self.place.start_y..self.place.start_y + self.place.size_y {
            let dst = &mut bmp.scanline_mut(row as usize)[offset..offset + len];
            for out in dst.chunks_exact_mut(bpp) {
                out.copy_from_slice(&pixel[..bpp]);
            }
        }
    }
}

/// Clip a decoded BGRA image, convert it to the bitmap's pixel model,
/// stretch it to the placement size and copy it into the bitmap.
///
/// Non-alpha destinations composite over white.
pub(crate) fn stretch_bgra_into(
    bmp: &mut Bitmap,
    place: &Placement,
    interpolate: bool,
    image: &[u8],
    image_width: usize,
) -> Result<(), DecodeError> {
    let format = bmp.format();
    let channels = match format {
        BitmapFormat::Mask8 | BitmapFormat::Pal8 => 1,
        BitmapFormat::Bgr => 3,
        BitmapFormat::Bgrx | BitmapFormat::Bgra => 4,
        BitmapFormat::Mask1 | BitmapFormat::Pal1 => {
            return Err(DecodeError::UnsupportedConversion {
                from: SourceFormat::Bgra,
                to: format,
            });
        }
    };
    let clip = place.clip;
    let cw = clip.width() as usize;
    let ch = clip.height() as usize;

    let mut clipped = vec![0u8; cw * ch * channels];
    for (y, out_row) in clipped.chunks_exact_mut(cw * channels).enumerate() {
        let src_y = clip.top as usize + y;
        let start = (src_y * image_width + clip.left as usize) * 4;
        let src_row = &image[start..start + cw * 4];
        for (p, out) in src_row.chunks_exact(4).zip(out_row.chunks_exact_mut(channels)) {
            if format == BitmapFormat::Bgra {
                out.copy_from_slice(p);
                continue;
            }
            let a = u32::from(p[3]);
            let over_white = |v: u8| ((u32::from(v) * a + 0xFF * (255 - a)) / 255) as u8;
            let (b, g, r) = (over_white(p[0]), over_white(p[1]), over_white(p[2]));
            match channels {
                1 => out[0] = rgb_to_gray(r, g, b),
                3 => out.copy_from_slice(&[b, g, r]),
                _ => out.copy_from_slice(&[b, g, r, 0xFF]),
            }
        }
    }

    let dw = place.size_x as usize;
    let dh = place.size_y as usize;
    let htab = StretchTable::new(place.size_x, clip.width(), interpolate)?;
    let vtab = StretchTable::new(place.size_y, clip.height(), interpolate)?;

    let mut horz = vec![0u8; dw * ch * channels];
    for (src_row, out_row) in clipped
        .chunks_exact(cw * channels)
        .zip(horz.chunks_exact_mut(dw * channels))
    {
        for (x, out) in out_row.chunks_exact_mut(channels).enumerate() {
            let (start, _, weights) = htab.entry(x);
            for c in 0..channels {
                let sum: i32 = weights
                    .iter()
                    .enumerate()
                    .map(|(k, &wt)| wt * i32::from(src_row[(start as usize + k) * channels + c]))
                    .sum();
                out[c] = px(sum);
            }
        }
    }

    let row_len = dw * channels;
    let d_bpp = format.bytes_per_pixel();
    let offset = place.start_x as usize * d_bpp;
    for y in 0..dh {
        let (start, _, weights) = vtab.entry(y);
        let dst = &mut bmp.scanline_mut(place.start_y as usize + y)[offset..offset + dw * d_bpp];
        for (i, out) in dst.iter_mut().enumerate().take(row_len) {
            let sum: i32 = weights
                .iter()
                .enumerate()
                .map(|(k, &wt)| wt * i32::from(horz[(start as usize + k) * row_len + i]))
                .sum();
            *out = px(sum);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_ramp_bitmap() -> (Bitmap, Resampler) {
        let bmp = Bitmap::new(8, 4, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(4, 4),
            start_x: 0,
            start_y: 0,
            size_x: 8,
            size_y: 4,
        };
        let rs = Resampler::new(place, BitmapFormat::Pal8, SourceFormat::Gray8, true).unwrap();
        (bmp, rs)
    }

    #[test]
    fn gray_ramp_doubles_width() {
        let (mut bmp, mut rs) = gray_ramp_bitmap();
        for line in 0..4 {
            assert!(rs.resample(&mut bmp, line, &[0, 85, 170, 255]));
        }
        for row in 0..4 {
            assert_eq!(&bmp.scanline(row)[..8], &[0, 42, 85, 127, 170, 212, 255, 255]);
        }
    }

    #[test]
    fn method_table() {
        use TransformMethod as T;
        assert_eq!(T::select(BitmapFormat::Pal8, SourceFormat::Gray8), Some(T::GrayToGray));
        assert_eq!(T::select(BitmapFormat::Mask8, SourceFormat::Cmyk), Some(T::CmykToGray));
        assert_eq!(T::select(BitmapFormat::Bgr, SourceFormat::Bgra), Some(T::BgrToBgr));
        assert_eq!(T::select(BitmapFormat::Bgrx, SourceFormat::Bgra), Some(T::BgraToBgra));
        assert_eq!(T::select(BitmapFormat::Bgrx, SourceFormat::Pal8), Some(T::PalToBgr));
        assert_eq!(T::select(BitmapFormat::Bgra, SourceFormat::Pal8), Some(T::PalToBgra));
        assert_eq!(T::select(BitmapFormat::Bgra, SourceFormat::Bgrx), Some(T::BgrToBgr));
        assert_eq!(T::select(BitmapFormat::Mask1, SourceFormat::Gray8), None);
    }

    #[test]
    fn palette_to_bgr_identity() {
        let mut bmp = Bitmap::new(2, 1, BitmapFormat::Bgr).unwrap();
        let place = Placement {
            clip: Rect::from_size(2, 1),
            size_x: 2,
            size_y: 1,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Bgr, SourceFormat::Pal8, true).unwrap();
        rs.set_palette(&[0xFF40_80C0, 0xFF01_0203], true);
        rs.resample(&mut bmp, 0, &[1, 0]);
        assert_eq!(&bmp.scanline(0)[..6], &[0x03, 0x02, 0x01, 0xC0, 0x80, 0x40]);
    }

    #[test]
    fn bgra_blend_keeps_straight_color() {
        let mut bmp = Bitmap::new(1, 1, BitmapFormat::Bgra).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 1),
            size_x: 1,
            size_y: 1,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Bgra, SourceFormat::Bgra, true).unwrap();
        rs.resample(&mut bmp, 0, &[200, 100, 50, 128]);
        assert_eq!(&bmp.scanline(0)[..4], &[200, 100, 50, 128]);
    }

    #[test]
    fn vertical_magnify_blends_rows() {
        let mut bmp = Bitmap::new(1, 4, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 2),
            size_x: 1,
            size_y: 4,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Pal8, SourceFormat::Gray8, true).unwrap();
        rs.resample(&mut bmp, 0, &[0]);
        rs.resample(&mut bmp, 1, &[200]);
        let col: Vec<u8> = (0..4).map(|r| bmp.scanline(r)[0]).collect();
        assert_eq!(col, vec![0, 100, 200, 200]);
    }

    #[test]
    fn vertical_magnify_without_interpolation_repeats() {
        let mut bmp = Bitmap::new(1, 4, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 2),
            size_x: 1,
            size_y: 4,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Pal8, SourceFormat::Gray8, false).unwrap();
        rs.resample(&mut bmp, 0, &[10]);
        rs.resample(&mut bmp, 1, &[200]);
        let col: Vec<u8> = (0..4).map(|r| bmp.scanline(r)[0]).collect();
        assert_eq!(col, vec![10, 10, 200, 200]);
    }

    #[test]
    fn minified_rows_keep_the_last_of_each_group() {
        let place = Placement {
            clip: Rect::from_size(1, 8),
            size_x: 1,
            size_y: 3,
            ..Default::default()
        };
        let rows: Vec<Option<i32>> = (0..8).map(|l| place.dest_row(l)).collect();
        assert_eq!(
            rows,
            vec![None, None, Some(0), None, None, Some(1), None, Some(2)]
        );
        assert_eq!(place.dest_row(8), None);
    }

    #[test]
    fn bottom_up_rows_blend_downwards() {
        let mut bmp = Bitmap::new(1, 4, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 2),
            size_x: 1,
            size_y: 4,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Pal8, SourceFormat::Gray8, true).unwrap();
        for (line, v) in [(1, 200u8), (0, 0u8)] {
            let row = place.dest_row(line).unwrap();
            rs.resample_scanline(&mut bmp, row, &[v]);
            rs.resample_vert_bottom_up(&mut bmp, row);
        }
        let col: Vec<u8> = (0..4).map(|r| bmp.scanline(r)[0]).collect();
        assert_eq!(col, vec![0, 100, 200, 200]);
    }

    #[test]
    fn interlaced_rows_backfill() {
        // Source rows arrive 0, 2, 1, 3 (two passes), destination doubles height.
        let mut bmp = Bitmap::new(1, 8, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 4),
            size_x: 1,
            size_y: 8,
            ..Default::default()
        };
        let mut rs = Resampler::new(place, BitmapFormat::Pal8, SourceFormat::Gray8, true).unwrap();
        let values = [0u8, 60, 120, 180];
        for line in [0, 2, 1, 3] {
            let row = place.dest_row(line).unwrap();
            rs.resample_scanline(&mut bmp, row, &[values[line as usize]]);
            if row + 2 >= 7 {
                rs.broadcast_tail(&mut bmp, row);
            }
            if line % 2 == 1 {
                rs.gif_double_line(&mut bmp, row);
            }
        }
        let col: Vec<u8> = (0..8).map(|r| bmp.scanline(r)[0]).collect();
        assert_eq!(col, vec![0, 30, 60, 90, 120, 150, 180, 180]);
    }

    #[test]
    fn fill_region_respects_placement() {
        let mut bmp = Bitmap::new(3, 2, BitmapFormat::Bgr).unwrap();
        let place = Placement {
            clip: Rect::from_size(1, 1),
            start_x: 1,
            start_y: 1,
            size_x: 2,
            size_y: 1,
        };
        let rs = Resampler::new(place, BitmapFormat::Bgr, SourceFormat::Pal8, true).unwrap();
        rs.fill_region(&mut bmp, 0xFF11_2233);
        assert_eq!(&bmp.scanline(0)[..9], &[0; 9]);
        assert_eq!(&bmp.scanline(1)[..9], &[0, 0, 0, 0x33, 0x22, 0x11, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn stretch_halves_gray() {
        let mut bmp = Bitmap::new(2, 1, BitmapFormat::Pal8).unwrap();
        let place = Placement {
            clip: Rect::from_size(4, 1),
            size_x: 2,
            size_y: 1,
            ..Default::default()
        };
        let image: Vec<u8> = [0u8, 100, 200, 255]
            .iter()
            .flat_map(|&v| [v, v, v, 255])
            .collect();
        stretch_bgra_into(&mut bmp, &place, true, &image, 4).unwrap();
        assert_eq!(&bmp.scanline(0)[..2], &[50, 227]);
    }
}
