//! # Interrupt Controller
//!
//! ```text
//!  0x0400_0200  IE    enable mask
//!  0x0400_0202  IF    request flags, write 1 to acknowledge
//!  0x0400_0208  IME   master enable (bit 0)
//!  0x0400_0300  POSTFLG
//!  0x0400_0301  HALTCNT (write only)
//! ```
//!
//! Peripherals raise requests through [`InterruptControl::request`]. The CPU
//! polls [`InterruptControl::pending`] at every step boundary.

use serde::{Deserialize, Serialize};

/// Bits 0-13 of IE and IF.
pub const VALID_SOURCES: u16 = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCount = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl Interrupt {
    #[must_use]
    pub const fn mask(self) -> u16 {
        1 << self as u16
    }

    #[must_use]
    pub const fn timer(index: usize) -> Self {
        match index {
            0 => Self::Timer0,
            1 => Self::Timer1,
            2 => Self::Timer2,
            _ => Self::Timer3,
        }
    }

    #[must_use]
    pub const fn dma(index: usize) -> Self {
        match index {
            0 => Self::Dma0,
            1 => Self::Dma1,
            2 => Self::Dma2,
            _ => Self::Dma3,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InterruptControl {
    pub interrupt_enable: u16,
    /// Interrupt Request Flags (IF), bits are set when interrupts are requested,
    /// cleared by writing 1 to the corresponding bit
    pub interrupt_request: u16,
    pub interrupt_master_enable: bool,
    pub post_boot_flag: u8,
    halted: bool,
}

impl InterruptControl {
    /// Sets the request flag of `source`. An enabled source also wakes a halted CPU.
    pub fn request(&mut self, source: Interrupt) {
        self.interrupt_request |= source.mask();
        if self.interrupt_enable & source.mask() != 0 {
            self.halted = false;
        }
    }

    /// Clears the request flags set in `mask`, as a write to IF does.
    pub const fn acknowledge(&mut self, mask: u16) {
        self.interrupt_request &= !mask;
    }

    /// An enabled source is requested, regardless of IME.
    #[must_use]
    pub const fn has_enabled_request(&self) -> bool {
        self.interrupt_enable & self.interrupt_request & VALID_SOURCES != 0
    }

    #[must_use]
    pub const fn pending(&self) -> bool {
        self.interrupt_master_enable && self.has_enabled_request()
    }

    pub const fn halt(&mut self) {
        self.halted = true;
    }

    pub const fn wake(&mut self) {
        self.halted = false;
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pending_needs_master_enable_and_enable_bit() {
        let mut ic = InterruptControl::default();
        ic.request(Interrupt::Timer1);
        assert_eq!(ic.interrupt_request, 0b1_0000);
        assert!(!ic.pending());

        ic.interrupt_enable = Interrupt::Timer1.mask();
        assert!(!ic.pending());
        assert!(ic.has_enabled_request());

        ic.interrupt_master_enable = true;
        assert!(ic.pending());

        ic.acknowledge(Interrupt::Timer1.mask());
        assert!(!ic.pending());
    }

    #[test]
    fn bits_above_thirteen_are_ignored() {
        let ic = InterruptControl {
            interrupt_enable: 0xC000,
            interrupt_request: 0xC000,
            interrupt_master_enable: true,
            ..Default::default()
        };
        assert!(!ic.pending());
    }

    #[test]
    fn enabled_request_wakes_from_halt() {
        let mut ic = InterruptControl::default();
        ic.halt();
        ic.request(Interrupt::Keypad);
        assert!(ic.is_halted());

        ic.interrupt_enable = Interrupt::Dma2.mask();
        ic.request(Interrupt::dma(2));
        assert!(!ic.is_halted());
    }

    #[test]
    fn source_helpers() {
        assert_eq!(Interrupt::timer(3), Interrupt::Timer3);
        assert_eq!(Interrupt::dma(0).mask(), 0x100);
        assert_eq!(Interrupt::GamePak.mask(), 0x2000);
    }
}
