#!/usr/bin/env -S cargo +nightly -Zscript
//! Generate seed corpus files for fuzzing.
//! Run: cargo +nightly -Zscript fuzz/generate_seeds.rs

fn main() {
    use std::fs;
    let dir = "fuzz/corpus/fuzz_decode";
    fs::create_dir_all(dir).unwrap();

    // Minimal BMP 1x1 24-bit
    let mut bmp = vec![0u8; 58]; // 54 header + 4 pixel (3 + 1 padding)
    bmp[0] = b'B'; bmp[1] = b'M';
    bmp[2..6].copy_from_slice(&58u32.to_le_bytes()); // file size
    bmp[10..14].copy_from_slice(&54u32.to_le_bytes()); // data offset
    bmp[14..18].copy_from_slice(&40u32.to_le_bytes()); // DIB header size
    bmp[18..22].copy_from_slice(&1i32.to_le_bytes()); // width
    bmp[22..26].copy_from_slice(&1i32.to_le_bytes()); // height
    bmp[26..28].copy_from_slice(&1u16.to_le_bytes()); // planes
    bmp[28..30].copy_from_slice(&24u16.to_le_bytes()); // bpp
    bmp[54] = 0xff; bmp[55] = 0x00; bmp[56] = 0x00; // BGR
    fs::write(format!("{dir}/bmp_1x1.bmp"), &bmp).unwrap();

    // BMP 2x2 RLE8: two runs, end of line, end of bitmap
    let mut rle = vec![0u8; 54 + 8 + 10];
    rle[0] = b'B'; rle[1] = b'M';
    rle[2..6].copy_from_slice(&(rle.len() as u32).to_le_bytes());
    rle[10..14].copy_from_slice(&62u32.to_le_bytes());
    rle[14..18].copy_from_slice(&40u32.to_le_bytes());
    rle[18..22].copy_from_slice(&2i32.to_le_bytes());
    rle[22..26].copy_from_slice(&2i32.to_le_bytes());
    rle[26..28].copy_from_slice(&1u16.to_le_bytes());
    rle[28..30].copy_from_slice(&8u16.to_le_bytes());
    rle[30..34].copy_from_slice(&1u32.to_le_bytes()); // RLE8
    rle[46..50].copy_from_slice(&2u32.to_le_bytes()); // colors used
    rle[54..62].copy_from_slice(&[0, 0, 0xff, 0, 0xff, 0, 0, 0]);
    rle[62..72].copy_from_slice(&[2, 0, 0, 0, 2, 1, 0, 0, 0, 1]);
    fs::write(format!("{dir}/bmp_rle8_2x2.bmp"), &rle).unwrap();

    // GIF 1x1, global palette of two colors, one uncompressed frame
    let gif: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\
        \xff\x00\x00\x00\x00\xff\
        \x2c\x00\x00\x00\x00\x01\x00\x01\x00\x00\
        \x02\x02\x44\x01\x00\x3b";
    fs::write(format!("{dir}/gif_1x1.gif"), gif).unwrap();

    // Truncated/malformed seeds for edge coverage
    fs::write(format!("{dir}/empty.bin"), b"").unwrap();
    fs::write(format!("{dir}/bm_short.bin"), b"BM\x00\x00").unwrap();
    fs::write(format!("{dir}/jpeg_soi_only.bin"), b"\xff\xd8\xff").unwrap();
    fs::write(format!("{dir}/png_sig_only.bin"), b"\x89PNG\r\n\x1a\n").unwrap();
    fs::write(format!("{dir}/tiff_le_magic.bin"), b"II*\x00\x08\x00\x00\x00").unwrap();

    println!("Generated seed corpus in {dir}/");
}
