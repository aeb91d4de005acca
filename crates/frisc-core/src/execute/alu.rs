//! Arithmetic and shift primitives shared by the ALU instructions.

use super::Flags;

const NON_SIGN_BITS: u32 = 0x7FFF_FFFF;

/// Result of the three-operand add primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddResult {
    /// Wrapped 32-bit sum.
    pub value: u32,
    /// Carry out of bit 31.
    pub carry: bool,
    /// Signed overflow.
    pub overflow: bool,
}

impl AddResult {
    /// Returns the `NCVZ` flags for this result.
    #[must_use]
    pub const fn flags(self) -> Flags {
        Flags::for_result(self.value, self.carry, self.overflow)
    }
}

/// Computes `a + b + carry_in` with carry and overflow.
///
/// The low 31 bits are summed separately; their carry into bit 31 combines
/// with the three sign bits to give the carry out, and overflow is the XOR of
/// the carries into and out of bit 31.
#[must_use]
#[allow(clippy::cast_lossless)]
pub const fn add_three(a: u32, b: u32, carry_in: bool) -> AddResult {
    let c = carry_in as u32;
    let value = a.wrapping_add(b).wrapping_add(c);
    let low = (a & NON_SIGN_BITS) + (b & NON_SIGN_BITS) + c;
    let carry_into_sign = (low >> 31) & 1;
    let carry = (a >> 31) + (b >> 31) + carry_into_sign > 1;
    AddResult {
        value,
        carry,
        overflow: (carry_into_sign == 1) != carry,
    }
}

/// Computes `a - b - borrow_in`; `carry` holds the borrow.
#[must_use]
pub const fn subtract(a: u32, b: u32, borrow_in: bool) -> AddResult {
    let sum = add_three(a, !b, !borrow_in);
    AddResult {
        carry: !sum.carry,
        ..sum
    }
}

/// Reduces a shift operand to its 5-bit amount.
#[must_use]
pub const fn shift_amount(operand: u32) -> u32 {
    operand & 0x1F
}

const fn bit(value: u32, index: u32) -> bool {
    (value >> index) & 1 != 0
}

/// Logical left shift; carry is the last bit shifted out of bit 31.
#[must_use]
pub const fn shl(value: u32, operand: u32) -> (u32, bool) {
    match shift_amount(operand) {
        0 => (value, false),
        n => (value << n, bit(value, 32 - n)),
    }
}

/// Logical right shift; carry is the last bit shifted out of bit 0.
#[must_use]
pub const fn shr(value: u32, operand: u32) -> (u32, bool) {
    match shift_amount(operand) {
        0 => (value, false),
        n => (value >> n, bit(value, n - 1)),
    }
}

/// Arithmetic right shift; carry is the last bit shifted out of bit 0.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub const fn ashr(value: u32, operand: u32) -> (u32, bool) {
    match shift_amount(operand) {
        0 => (value, false),
        n => (((value as i32) >> n) as u32, bit(value, n - 1)),
    }
}

/// Left rotate; carry is the bit that lands in bit 0.
#[must_use]
pub const fn rotl(value: u32, operand: u32) -> (u32, bool) {
    match shift_amount(operand) {
        0 => (value, false),
        n => (value.rotate_left(n), bit(value, 32 - n)),
    }
}

/// Right rotate; carry is the bit that lands in bit 31.
#[must_use]
pub const fn rotr(value: u32, operand: u32) -> (u32, bool) {
    match shift_amount(operand) {
        0 => (value, false),
        n => (value.rotate_right(n), bit(value, n - 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::{add_three, ashr, rotl, rotr, shl, shr, subtract};
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn add_overflows_into_sign() {
        let sum = add_three(0x7FFF_FFFF, 5, false);
        assert_eq!(sum.value, 0x8000_0004);
        assert!(!sum.carry);
        assert!(sum.overflow);
        assert!(sum.flags().n);
        assert!(!sum.flags().z);
    }

    #[test]
    fn add_carries_out_without_overflow() {
        let sum = add_three(0xFFFF_FFFF, 0, true);
        assert_eq!(sum.value, 0);
        assert!(sum.carry);
        assert!(!sum.overflow);
        assert!(sum.flags().z);
    }

    #[test]
    fn subtract_reports_borrow() {
        let diff = subtract(3, 5, false);
        assert_eq!(diff.value, 0xFFFF_FFFE);
        assert!(diff.carry);

        let diff = subtract(5, 0, false);
        assert_eq!(diff.value, 5);
        assert!(!diff.carry);

        let diff = subtract(5, 5, true);
        assert_eq!(diff.value, 0xFFFF_FFFF);
        assert!(diff.carry);
    }

    #[test]
    fn subtract_signed_overflow() {
        let diff = subtract(0x8000_0000, 1, false);
        assert_eq!(diff.value, 0x7FFF_FFFF);
        assert!(diff.overflow);
        assert!(!diff.carry);
    }

    #[rstest]
    #[case(0x8000_0001, 1, 0x0000_0002, true)]
    #[case(0x4000_0000, 1, 0x8000_0000, false)]
    #[case(0x0000_0001, 31, 0x8000_0000, false)]
    #[case(0x0000_0002, 31, 0x0000_0000, true)]
    #[case(0x1234_5678, 32, 0x1234_5678, false)]
    #[case(0xFFFF_FFFF, 0, 0xFFFF_FFFF, false)]
    fn shl_cases(#[case] value: u32, #[case] amount: u32, #[case] out: u32, #[case] carry: bool) {
        assert_eq!(shl(value, amount), (out, carry));
    }

    #[rstest]
    #[case(0x8000_0001, 1, 0x4000_0000, true)]
    #[case(0x8000_0000, 31, 0x0000_0001, false)]
    #[case(0x4000_0000, 31, 0x0000_0000, true)]
    #[case(0x0000_00F0, 33, 0x0000_0078, false)]
    fn shr_cases(#[case] value: u32, #[case] amount: u32, #[case] out: u32, #[case] carry: bool) {
        assert_eq!(shr(value, amount), (out, carry));
    }

    #[rstest]
    #[case(0x8000_0001, 1, 0xC000_0000, true)]
    #[case(0x8000_0000, 31, 0xFFFF_FFFF, false)]
    #[case(0x7FFF_FFFF, 4, 0x07FF_FFFF, true)]
    fn ashr_cases(#[case] value: u32, #[case] amount: u32, #[case] out: u32, #[case] carry: bool) {
        assert_eq!(ashr(value, amount), (out, carry));
    }

    #[rstest]
    #[case(0x8000_0001, 1, 0x0000_0003, true)]
    #[case(0x0000_0001, 31, 0x8000_0000, false)]
    #[case(0x0000_0002, 31, 0x0000_0001, true)]
    #[case(0xDEAD_BEEF, 0, 0xDEAD_BEEF, false)]
    fn rotl_cases(#[case] value: u32, #[case] amount: u32, #[case] out: u32, #[case] carry: bool) {
        assert_eq!(rotl(value, amount), (out, carry));
    }

    #[rstest]
    #[case(0x8000_0001, 1, 0xC000_0000, true)]
    #[case(0x0000_0002, 1, 0x0000_0001, false)]
    #[case(0x8000_0000, 31, 0x0000_0001, false)]
    #[case(0x4000_0000, 63, 0x8000_0000, true)]
    fn rotr_cases(#[case] value: u32, #[case] amount: u32, #[case] out: u32, #[case] carry: bool) {
        assert_eq!(rotr(value, amount), (out, carry));
    }

    proptest! {
        #[test]
        fn add_matches_wide_arithmetic(a in any::<u32>(), b in any::<u32>(), c in any::<bool>()) {
            let sum = add_three(a, b, c);
            let wide = u64::from(a) + u64::from(b) + u64::from(c);
            let signed = i64::from(i32::from_ne_bytes(a.to_ne_bytes()))
                + i64::from(i32::from_ne_bytes(b.to_ne_bytes()))
                + i64::from(c);
            prop_assert_eq!(u64::from(sum.value), wide & 0xFFFF_FFFF);
            prop_assert_eq!(sum.carry, wide > u64::from(u32::MAX));
            prop_assert_eq!(sum.overflow, i32::try_from(signed).is_err());
        }

        #[test]
        fn subtract_carry_is_inverted_add_carry(
            a in any::<u32>(),
            b in any::<u32>(),
            borrow in any::<bool>(),
        ) {
            let diff = subtract(a, b, borrow);
            prop_assert_eq!(diff.carry, !add_three(a, !b, !borrow).carry);
            prop_assert_eq!(diff.carry, u64::from(a) < u64::from(b) + u64::from(borrow));
            prop_assert_eq!(diff.value, a.wrapping_sub(b).wrapping_sub(u32::from(borrow)));
        }

        #[test]
        fn rotations_are_inverse(value in any::<u32>(), amount in any::<u32>()) {
            let (left, _) = rotl(value, amount);
            prop_assert_eq!(rotr(left, amount).0, value);
        }
    }
}
