//! Serial port in normal (single-player) mode, without a link partner.
//!
//! A transfer started with the internal clock completes after
//! `bits * rate` cycles and shifts in all ones.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Event;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::scheduler::{EventHandle, Scheduler};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Serial {
    // This is SIODATA32 in normal mode, or SIOMULTI0 and SIOMULTI1 in multiplayer mode
    pub data_32: u32,
    pub multi_data: [u16; 2],
    pub control: u16,
    // This is SIOMLT_SEND and SIODATA8
    pub data_8: u16,
    pub mode_select: u16,
    transfer: Option<EventHandle>,
}

impl Serial {
    /// `offset` is relative to the I/O base.
    #[must_use]
    pub fn read16(&self, offset: u32) -> u16 {
        match offset {
            0x120 => self.data_32 as u16,
            0x122 => (self.data_32 >> 16) as u16,
            0x124 => self.multi_data[0],
            0x126 => self.multi_data[1],
            0x128 => self.control,
            0x12A => self.data_8,
            0x134 => self.mode_select,
            _ => 0,
        }
    }

    pub fn write16(&mut self, offset: u32, value: u16, scheduler: &mut Scheduler<Event>) {
        match offset {
            0x120 => self.data_32 = (self.data_32 & 0xFFFF_0000) | u32::from(value),
            0x122 => self.data_32 = (self.data_32 & 0xFFFF) | (u32::from(value) << 16),
            0x124 => self.multi_data[0] = value,
            0x126 => self.multi_data[1] = value,
            0x128 => self.write_control(value, scheduler),
            0x12A => self.data_8 = value,
            0x134 => self.mode_select = value,
            _ => {}
        }
    }

    fn write_control(&mut self, value: u16, scheduler: &mut Scheduler<Event>) {
        self.control = value;

        if !value.get_bit(7) {
            if let Some(handle) = self.transfer.take() {
                scheduler.cancel(handle);
            }
            return;
        }

        let start = value.get_bit(7) && value.get_bit(0);
        let idle = self.transfer.is_none_or(|handle| !scheduler.is_pending(handle));
        if start && idle {
            let bits = if value.get_bit(12) { 32 } else { 8 };
            // 2 MHz or 256 KHz shift clock
            let rate = if value.get_bit(1) { 8 } else { 64 };
            self.transfer = Some(scheduler.schedule(bits * rate, Event::SerialComplete));
        }
    }

    /// End of a transfer: clears the start bit and receives all ones.
    pub fn complete(&mut self, interrupt_control: &mut InterruptControl) {
        self.transfer = None;
        self.control.set_bit(7, false);
        self.data_32 = 0xFFFF_FFFF;
        self.data_8 |= 0x00FF;

        if self.control.get_bit(14) {
            interrupt_control.request(Interrupt::Serial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn internal_clock_transfer_completes() {
        let mut serial = Serial::default();
        let mut scheduler = Scheduler::new();
        let mut ic = InterruptControl::default();

        // 8-bit, 2 MHz, IRQ, start
        serial.write16(0x128, 0x4083, &mut scheduler);
        assert_eq!(scheduler.len(), 1);

        // A second start while busy does not queue another transfer.
        serial.write16(0x128, 0x4083, &mut scheduler);
        assert_eq!(scheduler.len(), 1);

        let mut completions = 0;
        for _ in 0..64 {
            scheduler.advance(|event, _| {
                assert_eq!(event, Event::SerialComplete);
                completions += 1;
            });
        }
        assert_eq!(completions, 1);
        serial.complete(&mut ic);

        assert_eq!(serial.read16(0x128), 0x4003);
        assert_eq!(serial.read16(0x120), 0xFFFF);
        assert_eq!(serial.read16(0x122), 0xFFFF);
        assert_eq!(ic.interrupt_request, Interrupt::Serial.mask());
    }

    #[test]
    fn external_clock_waits_for_a_partner() {
        let mut serial = Serial::default();
        let mut scheduler = Scheduler::new();
        serial.write16(0x128, 0x0080, &mut scheduler);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn transfer_length_follows_width_and_rate() {
        let mut serial = Serial::default();
        let mut scheduler = Scheduler::new();
        // 32-bit at 256 KHz
        serial.write16(0x128, 0x1081, &mut scheduler);
        let handle = serial.transfer.expect("transfer scheduled");
        assert_eq!(scheduler.deadline(handle), Some(32 * 64));
    }

    #[test]
    fn clearing_start_aborts_the_transfer() {
        let mut serial = Serial::default();
        let mut scheduler = Scheduler::new();

        serial.write16(0x128, 0x4083, &mut scheduler);
        serial.write16(0x128, 0x4003, &mut scheduler);
        assert!(scheduler.is_empty());

        for _ in 0..100 {
            scheduler.advance(|event, _| panic!("{event:?} fired"));
        }
        assert_eq!(serial.read16(0x128), 0x4003);
    }
}
