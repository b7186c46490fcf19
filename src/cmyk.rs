/// Naive CMYK to RGB: each channel is `(255 - ink) * (255 - k) / 255`, rounded.
///
/// Inputs are ink amounts (0 = no ink).
#[inline]
pub fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> (u8, u8, u8) {
    let kw = 255 - u32::from(k);
    let ch = |ink: u8| (((255 - u32::from(ink)) * kw + 127) / 255) as u8;
    (ch(c), ch(m), ch(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes() {
        assert_eq!(cmyk_to_rgb(0, 0, 0, 0), (255, 255, 255));
        assert_eq!(cmyk_to_rgb(0, 0, 0, 255), (0, 0, 0));
        assert_eq!(cmyk_to_rgb(255, 0, 0, 0), (0, 255, 255));
    }

    #[test]
    fn half_black_rounds() {
        // 255 * 127 / 255 = 127
        assert_eq!(cmyk_to_rgb(0, 0, 0, 128), (127, 127, 127));
    }
}
