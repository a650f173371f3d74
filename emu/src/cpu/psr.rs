//! # Program Status Registers (CPSR and SPSR)
//!
//! ```text
//! 31 30 29 28 27      8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by [`condition`](super::condition)
//! - **I/F (7-6)**: IRQ/FIQ disable
//! - **T (5)**: ARM (0) or Thumb (1) state
//! - **Mode (4-0)**: see [`cpu_modes`](super::cpu_modes)
//!
//! The mode field of the CPSR is only ever changed through the CPU's mode
//! switch so the banked registers stay consistent. [`Psr::set_mode`] is the
//! raw bit assignment used by that switch.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR), wrapping the raw `u32`.
///
/// # Example
///
/// ```
/// use emu::cpu::psr::Psr;
///
/// let mut cpsr = Psr::default();
/// cpsr.set_zero_flag(true);
/// assert!(cpsr.zero_flag());
/// ```
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        let (n, z, c, v) = (
            self.sign_flag(),
            self.zero_flag(),
            self.carry_flag(),
            self.overflow_flag(),
        );
        match cond {
            EQ => z,
            NE => !z,
            CS => c,
            CC => !c,
            MI => n,
            PL => !n,
            VS => v,
            VC => !v,
            HI => c && !z,
            LS => !c || z,
            GE => n == v,
            LT => n != v,
            GT => !z && n == v,
            LE => z || n != v,
            AL => true,
            NV => false,
        }
    }

    /// N => Bit 31
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29 (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7 (1=IRQ disabled)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6 (1=FIQ disabled)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5 (0=ARM, 1=THUMB)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// Mode of a register whose mode field is kept valid (the CPSR).
    #[must_use]
    pub fn mode(self) -> Mode {
        match self.try_mode() {
            Ok(mode) => mode,
            Err(e) => unreachable!("CPSR holds an invalid mode: {e}"),
        }
    }

    /// Mode field of a raw value, for SPSRs that software may have filled with anything.
    pub fn try_mode(self) -> Result<Mode, String> {
        Mode::try_from(self.0 & 0b1_1111)
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Sets N, Z, C and V from an arithmetic result.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_sign_flag(op_result.sign);
        self.set_zero_flag(op_result.zero);
        self.set_carry_flag(op_result.carry);
        self.set_overflow_flag(op_result.overflow);
    }

    /// Sets N and Z from `result` and C from the shifter, leaving V alone.
    pub fn set_logical_flags(&mut self, result: u32, shifter_carry: bool) {
        self.set_sign_flag(result.get_bit(31));
        self.set_zero_flag(result == 0);
        self.set_carry_flag(shifter_carry);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// Raw assignment of the mode bits. The CPSR must go through
    /// `Arm7tdmi::switch_mode` instead.
    pub const fn set_mode(&mut self, m: Mode) {
        self.0 = (self.0 & !0b1_1111) | m as u32;
    }

    #[must_use]
    pub fn flag(self, flag: Flag) -> bool {
        self.0.get_bit(flag as u8)
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        self.0.set_bit(flag as u8, value);
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);
        s.set_mode(m);
        s
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// Single-bit fields of a PSR, valued by their bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    N = 31,
    Z = 30,
    C = 29,
    V = 28,
    I = 7,
    F = 6,
    T = 5,
}

/// The CPU execution state, controlled by the T bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// 16-bit instructions.
    Thumb,
    /// 32-bit instructions.
    Arm,
}

impl CpuState {
    /// Size in bytes of one instruction.
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            Self::Arm => 4,
            Self::Thumb => 2,
        }
    }
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_flags() {
        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        cpsr.set_overflow_flag(true);
        assert!(cpsr.sign_flag());
        assert!(!cpsr.zero_flag());
        assert!(!cpsr.carry_flag());
        assert!(cpsr.overflow_flag());
        assert_eq!(u32::from(cpsr), 0x9000_0000);
    }

    #[test]
    fn check_control_bits() {
        let mut cpsr = Psr::from(Mode::System);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        cpsr.set_cpu_state(CpuState::Thumb);
        assert_eq!(u32::from(cpsr), 0xFF);
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_flag_accessors() {
        let mut cpsr = Psr(0);
        cpsr.set_flag(Flag::C, true);
        cpsr.set_flag(Flag::T, true);
        assert!(cpsr.carry_flag());
        assert!(cpsr.flag(Flag::T));
        assert!(!cpsr.flag(Flag::I));
        assert_eq!(u32::from(cpsr), 0x2000_0020);
    }

    #[test]
    fn check_modes() {
        for mode in Mode::ALL {
            let mut cpsr = Psr(0xF000_00C0);
            cpsr.set_mode(mode);
            assert_eq!(cpsr.mode(), mode);
            assert_eq!(u32::from(cpsr) & !0b1_1111, 0xF000_00C0);
        }
    }

    #[test]
    fn check_invalid_mode() {
        assert!(Psr(0).try_mode().is_err());
        assert_eq!(Psr(0b1_0010).try_mode(), Ok(Mode::Irq));
    }

    #[test]
    fn check_conditions() {
        use Condition::*;

        let mut cpsr = Psr(0);
        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(EQ));
        assert!(!cpsr.can_execute(NE));
        assert!(cpsr.can_execute(LS));
        assert!(!cpsr.can_execute(HI));
        assert!(cpsr.can_execute(LE));
        assert!(!cpsr.can_execute(GT));

        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        assert!(cpsr.can_execute(LT));
        cpsr.set_overflow_flag(true);
        assert!(cpsr.can_execute(GE));
        assert!(cpsr.can_execute(GT));

        assert!(cpsr.can_execute(AL));
        assert!(!cpsr.can_execute(NV));
    }

    #[test]
    fn set_logical_flags_keeps_overflow() {
        let mut cpsr = Psr(0);
        cpsr.set_overflow_flag(true);
        cpsr.set_logical_flags(0x8000_0000, true);
        assert!(cpsr.sign_flag());
        assert!(!cpsr.zero_flag());
        assert!(cpsr.carry_flag());
        assert!(cpsr.overflow_flag());
    }
}
