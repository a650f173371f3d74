//! # Operand and Flag Arithmetic
//!
//! Pure helpers shared by every ARM and Thumb handler: the barrel shifter,
//! addition/subtraction with their carry and overflow rules, and the
//! multiplier timing rule. Nothing here touches the CPSR, handlers decide
//! which of the returned flags they commit.
//!
//! ## Barrel shifter
//!
//! ```text
//!  amount │ LSL            │ LSR             │ ASR             │ ROR
//! ────────┼────────────────┼─────────────────┼─────────────────┼──────────────
//!   0     │ v, C kept      │ v, C kept       │ v, C kept       │ v, C kept
//!   1-31  │ v<<n, b[32-n]  │ v>>n, b[n-1]    │ v>>n (sign)     │ rot, b31 of
//!         │                │                 │ b[n-1]          │ result
//!   32    │ 0, b0          │ 0, b31          │ 0/-1, b31       │ v, b31
//!   >32   │ 0, 0           │ 0, 0            │ 0/-1, b31       │ rot n%32
//! ```
//!
//! Shifts by an immediate reinterpret an amount of 0: `LSR #0` and `ASR #0`
//! mean 32, `ROR #0` means RRX (33-bit rotate through carry).

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

/// Result of an arithmetic operation together with the NZCV it produces.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

impl ArithmeticOpResult {
    const fn new(result: u32, carry: bool, overflow: bool) -> Self {
        Self {
            result,
            carry,
            overflow,
            sign: result >> 31 == 1,
            zero: result == 0,
        }
    }
}

/// `first + second + carry_in`, with C from the 33rd bit of the widened sum.
#[must_use]
pub fn add_with_carry(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first) + u64::from(second) + u64::from(carry_in);
    let result = wide as u32;
    // Both operands share a sign and the result does not.
    let overflow = (!(first ^ second) & (first ^ result)).get_bit(31);

    ArithmeticOpResult::new(result, wide > u64::from(u32::MAX), overflow)
}

#[must_use]
pub fn add(first: u32, second: u32) -> ArithmeticOpResult {
    add_with_carry(first, second, false)
}

/// `first - second - !carry_in`. C is set when no borrow happened.
#[must_use]
pub fn sub_with_carry(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    let borrow = u64::from(!carry_in);
    let wide = u64::from(first)
        .wrapping_sub(u64::from(second))
        .wrapping_sub(borrow);
    let result = wide as u32;
    // Operands differ in sign and the result took the sign of the subtrahend.
    let overflow = ((first ^ second) & (first ^ result)).get_bit(31);

    ArithmeticOpResult::new(result, wide >> 32 == 0, overflow)
}

#[must_use]
pub fn sub(first: u32, second: u32) -> ArithmeticOpResult {
    sub_with_carry(first, second, true)
}

#[must_use]
pub fn lsl(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (value << amount, value.get_bit((32 - amount) as u8)),
        32 => (0, value.get_bit(0)),
        _ => (0, false),
    }
}

#[must_use]
pub fn lsr(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (value >> amount, value.get_bit((amount - 1) as u8)),
        32 => (0, value.get_bit(31)),
        _ => (0, false),
    }
}

#[must_use]
pub fn asr(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match amount {
        0 => (value, carry),
        1..=31 => (
            ((value as i32) >> amount) as u32,
            value.get_bit((amount - 1) as u8),
        ),
        _ => (((value as i32) >> 31) as u32, value.get_bit(31)),
    }
}

#[must_use]
pub fn ror(value: u32, amount: u32, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry);
    }
    let result = value.rotate_right(amount & 31);
    (result, result.get_bit(31))
}

/// Rotate right by one through the carry flag.
#[must_use]
pub fn rrx(value: u32, carry: bool) -> (u32, bool) {
    ((value >> 1) | (u32::from(carry) << 31), value.get_bit(0))
}

/// Shift by a register amount (already masked to 8 bits by the caller).
#[must_use]
pub fn shift(kind: ShiftKind, value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match kind {
        ShiftKind::Lsl => lsl(value, amount, carry),
        ShiftKind::Lsr => lsr(value, amount, carry),
        ShiftKind::Asr => asr(value, amount, carry),
        ShiftKind::Ror => ror(value, amount, carry),
    }
}

/// Shift by a 5-bit immediate, where 0 encodes LSR/ASR #32 and RRX.
#[must_use]
pub fn shift_by_immediate(kind: ShiftKind, value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match (kind, amount) {
        (ShiftKind::Lsr | ShiftKind::Asr, 0) => shift(kind, value, 32, carry),
        (ShiftKind::Ror, 0) => rrx(value, carry),
        _ => shift(kind, value, amount, carry),
    }
}

/// Internal cycles the multiplier needs for operand `rs`: one per
/// significant byte, where leading zero bytes (and, when `signed`,
/// leading 0xFF bytes) are skipped early.
#[must_use]
pub const fn multiplier_cycles(rs: u32, signed: bool) -> u32 {
    let masks = [0xFFFF_FF00, 0xFFFF_0000, 0xFF00_0000];
    let mut i = 0;
    while i < masks.len() {
        let top = rs & masks[i];
        if top == 0 || (signed && top == masks[i]) {
            return i as u32 + 1;
        }
        i += 1;
    }
    4
}
