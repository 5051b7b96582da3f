//! Carry, half-carry, and borrow predicates for the SM83 ALU.
//!
//! These are pure functions over the raw operand values. The CPU core calls
//! them with the *pre-operation* operands so that the H and C flags reflect
//! the addition itself, never an intermediate result.

/// Carry from bit 11 to bit 12 when adding two words.
///
/// This is the "half carry" position for 16-bit arithmetic: the carry out of
/// the low nibble of the upper byte.
#[inline]
pub fn half_carry_add16(x: u16, y: u16) -> bool {
    ((x & 0x0FFF) + (y & 0x0FFF)) & 0x1000 != 0
}

/// Carry out of bit 15 (overflow) when adding two words.
#[inline]
pub fn carry_add16(x: u16, y: u16) -> bool {
    (x as u32) + (y as u32) > 0xFFFF
}

/// Carry out of bit 7 (overflow) when adding two bytes.
#[inline]
pub fn carry_add8(x: u8, y: u8) -> bool {
    (x as u16) + (y as u16) > 0xFF
}

/// Carry from bit 3 to bit 4 (low nibble into high nibble) when adding two
/// bytes.
#[inline]
pub fn half_carry_add8(x: u8, y: u8) -> bool {
    ((x & 0x0F) + (y & 0x0F)) & 0x10 != 0
}

/// Borrow from bit 4 into the low nibble when subtracting `y` from `x`.
#[inline]
pub fn half_borrow_sub8(x: u8, y: u8) -> bool {
    (x & 0x0F) < (y & 0x0F)
}

/// Borrow out of bit 7 (underflow) when subtracting `y` from `x`.
#[inline]
pub fn borrow_sub8(x: u8, y: u8) -> bool {
    x < y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add8_predicates_match_widened_arithmetic() {
        for x in 0..=0xFFu16 {
            for y in 0..=0xFFu16 {
                let (x8, y8) = (x as u8, y as u8);
                assert_eq!(carry_add8(x8, y8), x + y > 0xFF, "carry {x:#x}+{y:#x}");
                assert_eq!(
                    half_carry_add8(x8, y8),
                    (x & 0x0F) + (y & 0x0F) > 0x0F,
                    "half carry {x:#x}+{y:#x}"
                );
            }
        }
    }

    #[test]
    fn sub8_predicates_match_unsigned_compare() {
        for x in 0..=0xFFu8 {
            for y in 0..=0xFFu8 {
                assert_eq!(borrow_sub8(x, y), x < y);
                assert_eq!(half_borrow_sub8(x, y), x & 0x0F < y & 0x0F);
            }
        }
    }

    #[test]
    fn add16_predicates_match_widened_arithmetic() {
        // The 16-bit domain is too large to sweep exhaustively; cover every
        // boundary around the bit-11 and bit-15 carry positions plus a
        // deterministic stride over the rest of the space.
        let interesting = [
            0x0000u16, 0x0001, 0x07FF, 0x0800, 0x0FFF, 0x1000, 0x7FFF, 0x8000, 0xEFFF, 0xF000,
            0xFFFE, 0xFFFF,
        ];
        let mut operands: Vec<u16> = interesting.to_vec();
        operands.extend((0..=0xFFFFu16).step_by(251));

        for &x in &operands {
            for &y in &operands {
                let wide = (x as u32) + (y as u32);
                assert_eq!(carry_add16(x, y), wide > 0xFFFF, "carry {x:#x}+{y:#x}");
                assert_eq!(
                    half_carry_add16(x, y),
                    (x as u32 & 0x0FFF) + (y as u32 & 0x0FFF) > 0x0FFF,
                    "half carry {x:#x}+{y:#x}"
                );
            }
        }
    }

    #[test]
    fn add_hl_bc_example() {
        // HL=0x1880 + BC=0x0C00: half carry out of bit 11, no full carry.
        assert!(half_carry_add16(0x1880, 0x0C00));
        assert!(!carry_add16(0x1880, 0x0C00));
    }
}
