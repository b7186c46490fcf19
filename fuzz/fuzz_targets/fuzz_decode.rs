#![no_main]
use libfuzzer_sys::fuzz_target;
use zenprogressive::{Bitmap, BitmapFormat, DecodeStatus, ImageType, Limits, ProgressiveDecoder};

fuzz_target!(|data: &[u8]| {
    // Keep hostile headers from asking for huge buffers.
    let limits = Limits {
        max_pixels: Some(1 << 22),
        max_memory_bytes: Some(64 << 20),
        ..Default::default()
    };
    let mut dec = ProgressiveDecoder::with_limits(limits);
    if dec.load_image_info(data, ImageType::Unknown, false) != DecodeStatus::FrameReady {
        return;
    }
    let (status, frames) = dec.get_frames(&enough::Unstoppable);
    if status != DecodeStatus::DecodeReady {
        return;
    }
    // Decode the last frame small, scaled and offset, so clipping paths run too.
    let Ok(mut bmp) = Bitmap::new(48, 40, BitmapFormat::Bgra) else {
        return;
    };
    if dec.start_decode(&mut bmp, -3, 2, 50, 37, frames - 1, true)
        != DecodeStatus::DecodeToBeContinued
    {
        return;
    }
    while dec.continue_decode(&mut bmp, &enough::Unstoppable) == DecodeStatus::DecodeToBeContinued {}
});
