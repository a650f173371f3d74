use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};

/// GBA button bit positions in KEYINPUT register (when pressed are set to 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbaButton {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// Create a new Keypad with all buttons released (all bits set to 1).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_input: 0x03FF, // All 10 buttons released (bits 0-9 = 1)
            key_interrupt_control: 0,
        }
    }

    /// `offset` is relative to the I/O base, 0x130 or 0x132.
    #[must_use]
    pub const fn read16(&self, offset: u32) -> u16 {
        if offset & 2 == 0 {
            self.key_input
        } else {
            self.key_interrupt_control
        }
    }

    /// KEYINPUT is read only.
    pub fn write16(&mut self, offset: u32, value: u16, interrupt_control: &mut InterruptControl) {
        if offset & 2 != 0 {
            self.key_interrupt_control = value & 0xC3FF;
            self.check_interrupt(interrupt_control);
        }
    }

    /// Set button state: pressed = true, released = false.
    /// GBA uses active-low logic: bit 0 = pressed, bit 1 = released.
    pub fn set_button(
        &mut self,
        button: GbaButton,
        pressed: bool,
        interrupt_control: &mut InterruptControl,
    ) {
        if pressed {
            // Press: clear the bit (set to 0)
            self.key_input &= !(button as u16);
        } else {
            // Release: set the bit (set to 1)
            self.key_input |= button as u16;
        }
        self.check_interrupt(interrupt_control);
    }

    /// KEYCNT bit 14 enables the IRQ, bit 15 selects AND (all selected
    /// keys held) over OR (any selected key held).
    fn check_interrupt(&self, interrupt_control: &mut InterruptControl) {
        if !self.key_interrupt_control.get_bit(14) {
            return;
        }
        let selected = self.key_interrupt_control & 0x03FF;
        let held = !self.key_input & 0x03FF & selected;
        let raise = if self.key_interrupt_control.get_bit(15) {
            selected != 0 && held == selected
        } else {
            held != 0
        };
        if raise {
            interrupt_control.request(Interrupt::Keypad);
        }
    }
}
