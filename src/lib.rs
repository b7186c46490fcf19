//! # zenprogressive
//!
//! Resumable image decoding straight into a caller-owned bitmap.
//!
//! A [`ProgressiveDecoder`] reads JPEG, BMP, GIF, PNG or TIFF data from a
//! [`ByteSource`] that may still be growing, and resamples each decoded
//! scanline into a rectangle of a destination [`Bitmap`] as it arrives.
//! Every step can be paused, either because the source has no more bytes
//! yet or because a [`Stop`] token asked for it, and resumed later.
//!
//! ## Supported Formats
//!
//! - **JPEG** (`jpeg` feature): baseline and progressive, shrunk 1/2, 1/4
//!   or 1/8 inside the IDCT when the output is small enough
//! - **BMP** (`bmp` feature): 1 to 32 bits, bitfields, RLE4/RLE8, decoded
//!   row by row as bytes arrive
//! - **GIF** (`gif` feature): every frame addressable, interlaced rows
//!   filled in progressively
//! - **PNG** (`png` feature): all color types, 8 and 16 bit
//! - **TIFF** (`tiff` feature): multi-directory files, gray, RGB(A) and CMYK
//!
//! ## Destination Formats
//!
//! 8-bit gray (or mask), BGR, BGRX and BGRA. 1-bit and palettized
//! destinations with an attached palette are rejected.
//!
//! ## Usage
//!
//! ```no_run
//! use zenprogressive::{Bitmap, DecodeStatus, ImageType, ProgressiveDecoder, Unstoppable};
//!
//! let data: Vec<u8> = std::fs::read("photo.jpg")?;
//! let mut decoder = ProgressiveDecoder::new();
//! if decoder.load_image_info(data, ImageType::Unknown, false) != DecodeStatus::FrameReady {
//!     return Err(format!("{:?}", decoder.last_error()).into());
//! }
//! let (_, frames) = decoder.get_frames(&Unstoppable);
//! let mut bmp = Bitmap::new(200, 150, decoder.bitmap_format())?;
//! decoder.start_decode(&mut bmp, 0, 0, 200, 150, frames - 1, true);
//! while decoder.continue_decode(&mut bmp, &Unstoppable) == DecodeStatus::DecodeToBeContinued {}
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]

extern crate alloc;

#[macro_use]
mod log;

mod bitmap;
mod cmyk;
mod codec;
mod decoder;
mod error;
mod feeder;
mod geometry;
mod limits;
mod pixel;
mod resample;
mod source;
mod status;
mod weights;

pub use bitmap::Bitmap;
#[cfg(feature = "rgb")]
pub use bitmap::BitmapPixel;
pub use codec::ImageType;
pub use decoder::{DpiUnit, ImageAttributes, MAX_OUTPUT_SIZE, ProgressiveDecoder};
pub use enough::{Stop, StopReason, Unstoppable};
pub use error::DecodeError;
pub use geometry::Rect;
pub use limits::Limits;
pub use pixel::{BitmapFormat, SourceFormat};
pub use source::ByteSource;
pub use status::DecodeStatus;
