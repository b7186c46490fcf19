//! Bit-level helpers for packed BMP rows.

/// Unpack 1, 2 or 4 bit palette indices, most significant bits first.
///
/// Writes `out.len()` indices; input bytes past what `out` needs are ignored.
pub(crate) fn expand_bits_to_byte(depth: usize, input: &[u8], out: &mut [u8]) {
    let per_byte = 8 / depth;
    let mask = ((1u16 << depth) - 1) as u8;
    for (i, (o, byte)) in out
        .iter_mut()
        .zip(input.iter().flat_map(|b| core::iter::repeat_n(*b, per_byte)))
        .enumerate()
    {
        let shift = 8 - depth * (i % per_byte + 1);
        *o = (byte >> shift) & mask;
    }
}

/// Multipliers that replicate an N-bit value across 8 bits.
pub(crate) const MUL_TABLE: [u32; 9] = [
    0,    // 0 bits
    0xff, // 1 bit:  0b11111111
    0x55, // 2 bits: 0b01010101
    0x49, // 3 bits: 0b01001001
    0x11, // 4 bits: 0b00010001
    0x21, // 5 bits: 0b00100001
    0x41, // 6 bits: 0b01000001
    0x81, // 7 bits: 0b10000001
    0x01, // 8 bits: 0b00000001
];

pub(crate) const SHIFT_TABLE: [i32; 9] = [0, 0, 0, 1, 0, 2, 4, 6, 0];

/// Extract a masked bitfield value and scale it to 8 bits.
pub(crate) fn shift_signed(mut v: u32, shift: i32, bits: u32) -> u32 {
    if shift < 0 {
        v <<= -shift;
    } else {
        v >>= shift;
    }
    let bits = bits.min(8);
    v >>= 8 - bits;
    (v.wrapping_mul(MUL_TABLE[bits as usize])) >> SHIFT_TABLE[bits as usize]
}

/// A channel mask with the shift and width `shift_signed` needs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Channel {
    mask: u32,
    shift: i32,
    bits: u32,
}

impl Channel {
    pub(crate) fn new(mask: u32) -> Self {
        Self {
            mask,
            shift: (32u32.wrapping_sub(mask.leading_zeros())).wrapping_sub(8) as i32,
            bits: mask.count_ones(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mask == 0
    }

    #[inline]
    pub(crate) fn extract(&self, v: u32) -> u8 {
        shift_signed(v & self.mask, self.shift, self.bits) as u8
    }
}
