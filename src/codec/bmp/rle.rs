//! RLE4 and RLE8 pixel arrays.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::DecodeError;

/// Byte reader that yields zeros past the end, like a zero-padded stream.
struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Bytes<'_> {
    fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn u8(&mut self) -> u8 {
        let b = self.data.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }
}

/// Decode an RLE pixel array into one palette index per pixel.
///
/// Row `r` of the result is image row `r` counted from the top; the
/// stream itself runs bottom-up. Pixels the stream never sets stay 0.
pub(crate) fn decode(
    data: &[u8],
    width: usize,
    height: usize,
    depth: u16,
) -> Result<Vec<u8>, DecodeError> {
    let len = width
        .checked_mul(height)
        .ok_or(DecodeError::DimensionsTooLarge {
            width: width as u32,
            height: height as u32,
        })?;
    let mut pixels = vec![0u8; len];
    let mut bytes = Bytes { data, pos: 0 };
    let mut rle = Rle {
        width,
        line: height as i64 - 1,
        pos: 0,
    };
    match depth {
        4 => rle.decode4(&mut bytes, &mut pixels)?,
        8 => rle.decode8(&mut bytes, &mut pixels)?,
        d => {
            return Err(DecodeError::UnsupportedVariant(alloc::format!(
                "RLE with {d}-bit pixels"
            )));
        }
    }
    Ok(pixels)
}

struct Rle {
    width: usize,
    line: i64,
    pos: usize,
}

impl Rle {
    fn put(&self, pixels: &mut [u8], pos: usize, value: u8) {
        if pos < self.width {
            let idx = self.line as usize * self.width + pos;
            if let Some(p) = pixels.get_mut(idx) {
                *p = value;
            }
        }
    }

    /// Handle an escape after a zero count byte. Returns false at end of bitmap.
    fn escape(&mut self, code: u8, bytes: &mut Bytes<'_>) -> Result<bool, DecodeError> {
        match code {
            0 => {
                self.line -= 1;
                self.pos = 0;
                if self.line >= 0 {
                    return Ok(true);
                }
                if bytes.eof() || is_end_marker(bytes) {
                    return Ok(false);
                }
                Err(DecodeError::InvalidData("RLE line beyond picture bounds".into()))
            }
            1 => Ok(false),
            2 => {
                let dx = bytes.u8();
                let dy = bytes.u8();
                self.pos += usize::from(dx);
                self.line -= i64::from(dy);
                if self.line < 0 {
                    return Err(DecodeError::InvalidData("RLE delta line underflow".into()));
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    fn decode8(&mut self, bytes: &mut Bytes<'_>, pixels: &mut [u8]) -> Result<(), DecodeError> {
        while !bytes.eof() && self.line >= 0 {
            let count = bytes.u8();
            if count == 0 {
                let code = bytes.u8();
                if code <= 2 {
                    if !self.escape(code, bytes)? {
                        return Ok(());
                    }
                    continue;
                }
                // Absolute run, padded to 16 bits.
                for _ in 0..code {
                    let v = bytes.u8();
                    self.put(pixels, self.pos, v);
                    self.pos += 1;
                }
                if code & 1 == 1 {
                    bytes.skip(1);
                }
            } else {
                if self.pos + usize::from(count) > self.width {
                    return Err(DecodeError::InvalidData("RLE position overrun".into()));
                }
                let v = bytes.u8();
                for _ in 0..count {
                    self.put(pixels, self.pos, v);
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }

    fn decode4(&mut self, bytes: &mut Bytes<'_>, pixels: &mut [u8]) -> Result<(), DecodeError> {
        while !bytes.eof() && self.line >= 0 {
            let count = bytes.u8();
            if count == 0 {
                let code = bytes.u8();
                if code <= 2 {
                    if !self.escape(code, bytes)? {
                        return Ok(());
                    }
                    continue;
                }
                // Absolute run of `code` nibbles, padded to 16 bits.
                let mut left = usize::from(code);
                let mut read = 0usize;
                while left > 0 {
                    let b = bytes.u8();
                    read += 1;
                    self.put(pixels, self.pos, b >> 4);
                    self.pos += 1;
                    left -= 1;
                    if left > 0 {
                        self.put(pixels, self.pos, b & 0x0F);
                        self.pos += 1;
                        left -= 1;
                    }
                }
                if read % 2 == 1 {
                    bytes.skip(1);
                }
            } else {
                if self.pos + usize::from(count) > self.width + 1 {
                    return Err(DecodeError::InvalidData(
                        "RLE4 frame pointer out of bounds".into(),
                    ));
                }
                let v = bytes.u8();
                for i in 0..count {
                    let nibble = if i & 1 == 0 { v >> 4 } else { v & 0x0F };
                    self.put(pixels, self.pos, nibble);
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }
}

/// An end-of-bitmap marker directly follows the current position.
fn is_end_marker(bytes: &Bytes<'_>) -> bool {
    bytes.data.get(bytes.pos..bytes.pos + 2) == Some(&[0, 1][..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle8_runs_and_absolute_blocks() {
        // Bottom row: run of 3 x 7. Top row: absolute [1, 2, 3] (padded).
        let data = [3, 7, 0, 0, 0, 3, 1, 2, 3, 0, 0, 1];
        let px = decode(&data, 3, 2, 8).unwrap();
        assert_eq!(px, vec![1, 2, 3, 7, 7, 7]);
    }

    #[test]
    fn rle8_delta_skips_pixels() {
        // Skip two pixels right and one row up, then a run of 1.
        let data = [0, 2, 2, 1, 1, 9, 0, 1];
        let px = decode(&data, 3, 2, 8).unwrap();
        assert_eq!(px, vec![0, 0, 9, 0, 0, 0]);
    }

    #[test]
    fn rle4_alternates_nibbles() {
        let data = [5, 0x12, 0, 1];
        let px = decode(&data, 5, 1, 4).unwrap();
        assert_eq!(px, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn rle4_absolute_nibbles() {
        let data = [0, 3, 0xAB, 0xC0, 0, 1];
        let px = decode(&data, 3, 1, 4).unwrap();
        assert_eq!(px, vec![0xA, 0xB, 0xC]);
    }

    #[test]
    fn rle8_overrun_is_invalid() {
        let data = [4, 1, 0, 1];
        assert!(matches!(decode(&data, 3, 1, 8), Err(DecodeError::InvalidData(_))));
    }
}
