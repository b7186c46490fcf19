mod common;

use common::*;
use enough::Unstoppable;
use zenprogressive::*;

#[test]
fn bmp_gray_ramp_doubles_width() {
    let ramp = [0u8, 85, 170, 255].repeat(4);
    let bmp = decode_all(bmp_gray(4, &ramp), BitmapFormat::Pal8, (8, 4), 0, true);
    for y in 0..4 {
        assert_eq!(row(&bmp, y), &[0, 42, 85, 127, 170, 212, 255, 255]);
    }
}

#[test]
fn vertical_minify_ends_on_the_last_source_row() {
    // Eight rows of a vertical ramp squeezed into three. Each output row
    // takes the last source row of its group, so the bottom edge is kept.
    let ramp: Vec<u8> = (0..8u8).flat_map(|r| [r * 30; 2]).collect();
    let expected: [&[u8]; 3] = [&[60, 60], &[150, 150], &[210, 210]];

    let bmp = decode_all(bmp_gray(2, &ramp), BitmapFormat::Pal8, (2, 3), 0, true);
    for (y, want) in expected.iter().enumerate() {
        assert_eq!(row(&bmp, y), *want, "bmp row {y}");
    }

    let bmp = decode_all(png(2, 8, png::ColorType::Grayscale, &ramp), BitmapFormat::Pal8, (2, 3), 0, true);
    for (y, want) in expected.iter().enumerate() {
        assert_eq!(row(&bmp, y), *want, "png row {y}");
    }
}

#[test]
fn bmp_identity_copies_pixels() {
    let pixels = pattern_bgr(5, 3);
    let bmp = decode_all(bmp24(5, 3, &pixels), BitmapFormat::Bgr, (5, 3), 0, true);
    for y in 0..3 {
        assert_eq!(row(&bmp, y), &pixels[y * 15..(y + 1) * 15]);
    }
}

#[test]
fn bmp_to_bgrx_sets_padding_byte() {
    let pixels = pattern_bgr(2, 2);
    let bmp = decode_all(bmp24(2, 2, &pixels), BitmapFormat::Bgrx, (2, 2), 0, false);
    assert_eq!(row(&bmp, 0), &[pixels[0], pixels[1], pixels[2], 0xFF, pixels[3], pixels[4], pixels[5], 0xFF]);
}

#[test]
fn header_metadata_is_reported() {
    let mut dec = ProgressiveDecoder::new();
    let data = bmp24(7, 3, &pattern_bgr(7, 3));
    assert_eq!(dec.load_image_info(data, ImageType::Unknown, false), DecodeStatus::FrameReady);
    assert_eq!(dec.image_type(), ImageType::Bmp);
    assert_eq!((dec.width(), dec.height(), dec.components()), (7, 3, 3));
    assert_eq!(dec.bitmap_format(), BitmapFormat::Bgr);
    assert_eq!(
        dec.attributes(),
        &ImageAttributes {
            x_dpi: 2835,
            y_dpi: 2835,
            unit: DpiUnit::Meter,
        }
    );
    assert_eq!(dec.frame_count(), 0);
}

#[test]
fn growing_source_resumes_to_identical_output() {
    let pixels = pattern_bgr(64, 48);
    let data = bmp24(64, 48, &pixels);
    let expected = decode_all(data.clone(), BitmapFormat::Bgr, (32, 96), 0, true);

    let src = GrowingSource::new(data, 100);
    let mut dec = ProgressiveDecoder::new();
    assert_eq!(
        dec.load_image_info(src.clone(), ImageType::Unknown, false),
        DecodeStatus::FrameReady
    );
    assert_eq!(dec.get_frames(&Unstoppable), (DecodeStatus::DecodeReady, 1));
    let mut bmp = Bitmap::new(32, 96, BitmapFormat::Bgr).unwrap();
    assert_eq!(
        dec.start_decode(&mut bmp, 0, 0, 32, 96, 0, true),
        DecodeStatus::DecodeToBeContinued
    );
    let mut pauses = 0;
    loop {
        match dec.continue_decode(&mut bmp, &Unstoppable) {
            DecodeStatus::DecodeToBeContinued => {
                pauses += 1;
                src.grow(700);
            }
            DecodeStatus::DecodeFinished => break,
            other => panic!("{other:?}: {:?}", dec.last_error()),
        }
    }
    assert!(pauses > 5);
    assert_eq!(bmp.data(), expected.data());
    assert_eq!(dec.status(), DecodeStatus::DecodeFinished);
}

#[test]
fn stop_token_pauses_between_rows() {
    let data = bmp24(6, 6, &pattern_bgr(6, 6));
    let expected = decode_all(data.clone(), BitmapFormat::Bgra, (6, 6), 0, true);

    let mut dec = ProgressiveDecoder::new();
    dec.load_image_info(data, ImageType::Bmp, true);
    dec.get_frames(&Unstoppable);
    let mut bmp = Bitmap::new(6, 6, BitmapFormat::Bgra).unwrap();
    dec.start_decode(&mut bmp, 0, 0, 6, 6, 0, true);
    let mut calls = 1;
    while dec.continue_decode(&mut bmp, &PauseAlways) == DecodeStatus::DecodeToBeContinued {
        calls += 1;
    }
    assert_eq!(dec.status(), DecodeStatus::DecodeFinished);
    assert!(calls >= 6, "only {calls} calls");
    assert_eq!(bmp.data(), expected.data());
}

#[test]
fn rejected_geometry_leaves_bitmap_untouched() {
    let mut dec = ProgressiveDecoder::new();
    dec.load_image_info(bmp24(4, 4, &pattern_bgr(4, 4)), ImageType::Unknown, false);
    dec.get_frames(&Unstoppable);
    let mut bmp = Bitmap::new(4, 4, BitmapFormat::Bgr).unwrap();
    bmp.data_mut().fill(0x5A);
    for (x, y, w, h) in [(0, 0, 0, 4), (0, 0, 4, 70000), (4, 0, 4, 4), (0, -4, 4, 4)] {
        assert_eq!(dec.start_decode(&mut bmp, x, y, w, h, 0, true), DecodeStatus::Error);
        assert_eq!(dec.status(), DecodeStatus::DecodeReady);
        assert!(matches!(dec.last_error(), Some(DecodeError::InvalidParameter(_))));
    }
    assert!(bmp.data().iter().all(|&b| b == 0x5A));
}

#[test]
fn placement_offset_only_writes_target_rect() {
    let pixels = pattern_bgr(2, 2);
    let mut dec = ProgressiveDecoder::new();
    dec.load_image_info(bmp24(2, 2, &pixels), ImageType::Unknown, false);
    dec.get_frames(&Unstoppable);
    let mut bmp = Bitmap::new(4, 4, BitmapFormat::Bgr).unwrap();
    dec.start_decode(&mut bmp, 1, 2, 2, 2, 0, true);
    assert_eq!(dec.continue_decode(&mut bmp, &Unstoppable), DecodeStatus::DecodeFinished);
    assert!(row(&bmp, 0).iter().all(|&b| b == 0));
    assert_eq!(&row(&bmp, 2)[..3], &[0, 0, 0]);
    assert_eq!(&row(&bmp, 2)[3..9], &pixels[..6]);
    assert_eq!(&row(&bmp, 3)[3..9], &pixels[6..12]);
}

#[test]
fn clip_box_selects_source_region() {
    let pixels = pattern_bgr(4, 4);
    let mut dec = ProgressiveDecoder::new();
    dec.load_image_info(bmp24(4, 4, &pixels), ImageType::Unknown, false);
    assert!(dec.set_clip_box(Rect::new(1, 1, 3, 3)));
    dec.get_frames(&Unstoppable);
    let mut bmp = Bitmap::new(2, 2, BitmapFormat::Bgr).unwrap();
    dec.start_decode(&mut bmp, 0, 0, 2, 2, 0, true);
    assert_eq!(dec.continue_decode(&mut bmp, &Unstoppable), DecodeStatus::DecodeFinished);
    // Source row 1, columns 1..3.
    assert_eq!(row(&bmp, 0), &pixels[15..21]);
    assert_eq!(row(&bmp, 1), &pixels[27..33]);
}

#[test]
fn truncated_bmp_fails_with_truncated() {
    let mut data = bmp24(8, 8, &pattern_bgr(8, 8));
    data.truncate(data.len() - 10);
    let mut dec = ProgressiveDecoder::new();
    dec.load_image_info(data, ImageType::Unknown, false);
    dec.get_frames(&Unstoppable);
    let mut bmp = Bitmap::new(8, 8, BitmapFormat::Bgr).unwrap();
    dec.start_decode(&mut bmp, 0, 0, 8, 8, 0, true);
    assert_eq!(dec.continue_decode(&mut bmp, &Unstoppable), DecodeStatus::Error);
    assert!(matches!(dec.last_error(), Some(DecodeError::Truncated)));
    // Nothing more happens after a terminal state.
    assert_eq!(dec.continue_decode(&mut bmp, &Unstoppable), DecodeStatus::Error);
    assert!(matches!(dec.last_error(), Some(DecodeError::InvalidState { .. })));
}

#[test]
fn unrecognized_input_is_reported() {
    let mut dec = ProgressiveDecoder::new();
    let status = dec.load_image_info(vec![0x42; 64], ImageType::Unknown, false);
    assert_eq!(status, DecodeStatus::Error);
    assert!(matches!(dec.last_error(), Some(DecodeError::UnrecognizedFormat)));
    assert_eq!(dec.image_type(), ImageType::Unknown);
}

#[test]
fn wrong_hint_falls_back_unless_forced() {
    let data = bmp24(2, 2, &pattern_bgr(2, 2));
    let mut dec = ProgressiveDecoder::new();
    assert_eq!(dec.load_image_info(data.clone(), ImageType::Gif, true), DecodeStatus::Error);
    assert_eq!(dec.load_image_info(data, ImageType::Gif, false), DecodeStatus::FrameReady);
    assert_eq!(dec.image_type(), ImageType::Bmp);
}

#[test]
fn pending_header_reports_input_pending() {
    let data = bmp24(4, 4, &pattern_bgr(4, 4));
    let mut dec = ProgressiveDecoder::new();
    let src = GrowingSource::new(data, 20);
    assert_eq!(dec.load_image_info(src.clone(), ImageType::Unknown, false), DecodeStatus::Error);
    assert!(matches!(dec.last_error(), Some(DecodeError::InputPending)));
    src.grow(1000);
    assert_eq!(dec.load_image_info(src, ImageType::Unknown, false), DecodeStatus::FrameReady);
}
