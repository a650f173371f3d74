use std::ops::RangeInclusive;

/// Helpers to read and modify single bits, bit fields and bytes.
/// Bit indices go from lsb to msb (right to left).
pub trait Bits: Copy {
    fn get_bit(self, bit_idx: u8) -> bool;

    fn set_bit(&mut self, bit_idx: u8, value: bool);

    /// Extracts the field covered by `bits_range` and moves it to bit 0.
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    fn get_byte(self, byte_nth: u8) -> u8;

    fn set_byte(&mut self, byte_nth: u8, value: u8);

    /// Interprets the low `number_of_bits` as a two's complement number
    /// and returns it widened to 32 bits.
    fn sign_extended(self, number_of_bits: u8) -> i32;
}

macro_rules! impl_bits {
    ($($t:ty),*) => {$(
        impl Bits for $t {
            fn get_bit(self, bit_idx: u8) -> bool {
                debug_assert!(u32::from(bit_idx) < <$t>::BITS);
                (self >> bit_idx) & 1 == 1
            }

            fn set_bit(&mut self, bit_idx: u8, value: bool) {
                debug_assert!(u32::from(bit_idx) < <$t>::BITS);
                *self = (*self & !(1 << bit_idx)) | (<$t>::from(value) << bit_idx);
            }

            fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                let start = *bits_range.start();
                let length = u32::from(*bits_range.end() - start) + 1;
                let field = self >> start;
                if length >= <$t>::BITS {
                    field
                } else {
                    field & ((1 << length) - 1)
                }
            }

            fn get_byte(self, byte_nth: u8) -> u8 {
                debug_assert!(u32::from(byte_nth) * 8 < <$t>::BITS);
                (self >> (byte_nth * 8)) as u8
            }

            fn set_byte(&mut self, byte_nth: u8, value: u8) {
                debug_assert!(u32::from(byte_nth) * 8 < <$t>::BITS);
                let shift = byte_nth * 8;
                *self = (*self & !(0xFF << shift)) | (<$t>::from(value) << shift);
            }

            fn sign_extended(self, number_of_bits: u8) -> i32 {
                let unused = 32 - u32::from(number_of_bits);
                ((u32::from(self) << unused) as i32) >> unused
            }
        }
    )*};
}

impl_bits!(u8, u16, u32);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn get_bit() {
        let b = 0b10_1100_1110_u32;
        assert!(b.get_bit(1));
        assert!(!b.get_bit(0));
        assert!(b.get_bit(2));
        assert!(!b.get_bit(31));
    }

    #[test]
    fn set_bit() {
        let mut b = 0b110_0110_u32;
        b.set_bit(0, true);
        b.set_bit(1, true);
        b.set_bit(2, false);
        b.set_bit(3, false);
        b.set_bit(31, true);
        assert_eq!(b, 0x8000_0063);
    }

    #[test]
    fn get_bits() {
        let b = 0b10_1100_1110_u32;
        assert_eq!(b.get_bits(0..=3), 0b1110);
        assert_eq!(b.get_bits(1..=1), 0b1);
        assert_eq!(b.get_bits(4..=7), 0b1100);
        assert_eq!(b.get_bits(8..=9), 0b10);
        assert_eq!(b.get_bits(0..=31), 0b10_1100_1110);
        assert_eq!(b.get_bits(28..=31), 0b0);
        assert_eq!(0xF00D_u16.get_bits(12..=15), 0xF);
    }

    #[test]
    fn bytes() {
        let mut w = 0x1234_5678_u32;
        assert_eq!(w.get_byte(0), 0x78);
        assert_eq!(w.get_byte(3), 0x12);

        w.set_byte(2, 0xAB);
        assert_eq!(w, 0x12AB_5678);

        let mut h = 0_u16;
        h.set_byte(1, 0xFF);
        assert_eq!(h, 0xFF00);
    }

    #[test]
    fn sign_extended() {
        assert_eq!(0b1001_u32.sign_extended(4), -7);
        assert_eq!(0b0111_u32.sign_extended(4), 7);
        assert_eq!(0x80_u8.sign_extended(8), -128);
        assert_eq!(0x7FF_u16.sign_extended(11), -1);
        assert_eq!(0x3FF_u16.sign_extended(11), 0x3FF);
        assert_eq!(0xFF_FFFF_u32.sign_extended(24), -1);
        assert_eq!(0xFFFF_FFFF_u32.sign_extended(32), -1);
    }
}
