//! Shared fixtures: in-memory image writers, sources and stop tokens.
#![allow(dead_code)]

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use enough::{Stop, StopReason, Unstoppable};
use zenprogressive::{Bitmap, BitmapFormat, ByteSource, DecodeStatus, ImageType, ProgressiveDecoder};

fn write_bmp_header(out: &mut Vec<u8>, width: u32, height: i32, bpp: u16, pixel_data_size: usize) {
    let file_size = 54 + pixel_data_size;
    // File header
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&54u32.to_le_bytes());

    // BITMAPINFOHEADER
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&bpp.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(pixel_data_size as u32).to_le_bytes());
    out.extend_from_slice(&2835u32.to_le_bytes()); // 72 DPI
    out.extend_from_slice(&2835u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
}

/// Bottom-up 24-bit BMP from top-down BGR pixels.
pub fn bmp24(width: u32, height: u32, bgr: &[u8]) -> Vec<u8> {
    let w = width as usize;
    let row_stride = (w * 3 + 3) & !3;
    let mut out = Vec::with_capacity(54 + row_stride * height as usize);
    write_bmp_header(&mut out, width, height as i32, 24, row_stride * height as usize);
    for row in bgr.chunks_exact(w * 3).rev() {
        out.extend_from_slice(row);
        out.extend(std::iter::repeat_n(0u8, row_stride - w * 3));
    }
    out
}

/// Bottom-up 8-bit BMP without a color table, read as gray.
pub fn bmp_gray(width: u32, gray: &[u8]) -> Vec<u8> {
    let w = width as usize;
    let height = gray.len() / w;
    let row_stride = (w + 3) & !3;
    let mut out = Vec::new();
    write_bmp_header(&mut out, width, height as i32, 8, row_stride * height);
    for row in gray.chunks_exact(w).rev() {
        out.extend_from_slice(row);
        out.extend(std::iter::repeat_n(0u8, row_stride - w));
    }
    out
}

/// Deterministic BGR test pattern.
pub fn pattern_bgr(width: u32, height: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let (x, y) = (i % width, i / width);
            [(x * 13 + y * 7) as u8, (x * 3 + y * 29) as u8, (x * y + 40) as u8]
        })
        .collect()
}

pub struct GifFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: Vec<u8>,
    pub transparent: Option<u8>,
}

/// GIF with a 4-entry global palette: black, red, green, blue.
pub fn gif(width: u16, height: u16, frames: &[GifFrame]) -> Vec<u8> {
    let palette = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];
    let mut out = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut out, width, height, &palette).unwrap();
        for f in frames {
            let frame = gif::Frame {
                left: f.left,
                top: f.top,
                width: f.width,
                height: f.height,
                buffer: std::borrow::Cow::Borrowed(&f.indices),
                transparent: f.transparent,
                ..gif::Frame::default()
            };
            enc.write_frame(&frame).unwrap();
        }
    }
    out
}

pub fn png(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut enc = png::Encoder::new(&mut out, width, height);
        enc.set_color(color);
        enc.set_depth(png::BitDepth::Eight);
        let mut writer = enc.write_header().unwrap();
        writer.write_image_data(data).unwrap();
    }
    out
}

pub fn tiff_rgb(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    use tiff::encoder::{TiffEncoder, colortype};
    let mut out = io::Cursor::new(Vec::new());
    {
        let mut enc = TiffEncoder::new(&mut out).unwrap();
        enc.write_image::<colortype::RGB8>(width, height, rgb).unwrap();
    }
    out.into_inner()
}

pub fn jpeg_rgb(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    use image::ImageEncoder;
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 100)
        .write_image(rgb, width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Source whose visible length the test controls after handing it over.
#[derive(Clone)]
pub struct GrowingSource {
    data: Rc<Vec<u8>>,
    visible: Rc<Cell<usize>>,
}

impl GrowingSource {
    pub fn new(data: Vec<u8>, visible: usize) -> Self {
        Self {
            visible: Rc::new(Cell::new(visible.min(data.len()))),
            data: Rc::new(data),
        }
    }

    /// Reveal `n` more bytes. Returns false once everything is visible.
    pub fn grow(&self, n: usize) -> bool {
        let v = (self.visible.get() + n).min(self.data.len());
        self.visible.set(v);
        v < self.data.len()
    }
}

impl ByteSource for GrowingSource {
    fn size(&self) -> u64 {
        self.visible.get() as u64
    }

    fn read_block_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.visible.get() {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.visible.get() == self.data.len()
    }
}

/// Asks for a pause at every check.
pub struct PauseAlways;

impl Stop for PauseAlways {
    fn check(&self) -> Result<(), StopReason> {
        Err(StopReason::Cancelled)
    }
}

/// Load, count frames and decode frame `frame` of `data` in one go.
pub fn decode_all(
    data: Vec<u8>,
    format: BitmapFormat,
    size: (u32, u32),
    frame: usize,
    interpolate: bool,
) -> Bitmap {
    let mut dec = ProgressiveDecoder::new();
    assert_eq!(
        dec.load_image_info(data, ImageType::Unknown, false),
        DecodeStatus::FrameReady,
        "{:?}",
        dec.last_error()
    );
    let (status, _) = dec.get_frames(&Unstoppable);
    assert_eq!(status, DecodeStatus::DecodeReady, "{:?}", dec.last_error());
    let mut bmp = Bitmap::new(size.0, size.1, format).unwrap();
    assert_eq!(
        dec.start_decode(&mut bmp, 0, 0, size.0 as i32, size.1 as i32, frame, interpolate),
        DecodeStatus::DecodeToBeContinued,
        "{:?}",
        dec.last_error()
    );
    assert_eq!(
        dec.continue_decode(&mut bmp, &Unstoppable),
        DecodeStatus::DecodeFinished,
        "{:?}",
        dec.last_error()
    );
    bmp
}

/// Pixels of row `row`, without padding.
pub fn row(bmp: &Bitmap, row: usize) -> &[u8] {
    &bmp.scanline(row)[..bmp.width() as usize * bmp.format().bytes_per_pixel()]
}
