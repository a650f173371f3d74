//! # DMA Channels (0x0400_00B0 - 0x0400_00DF)
//!
//! Four channels, 12 bytes of registers each:
//!
//! ```text
//!  +0x0  SAD     source address (write only)
//!  +0x4  DAD     destination address (write only)
//!  +0x8  CNT_L   unit count (write only)
//!  +0xA  CNT_H   control
//!
//!  CNT_H  15      14    13-12   11   10     9      8-7     6-5
//!        ┌──────┬─────┬───────┬────┬──────┬──────┬───────┬───────┐
//!        │enable│ IRQ │timing │DRQ │ word │repeat│src ctl│dst ctl│
//!        └──────┴─────┴───────┴────┴──────┴──────┴───────┴───────┘
//! ```
//!
//! This module keeps the registers and the priority bookkeeping. The copy
//! loop itself lives on the bus, which owns the memory it walks.
//!
//! Priority: channel 0 is the highest. Activating a channel while a lower
//! priority one is copying raises the early-exit flag. The running copy
//! stops at its next unit boundary and resumes once the higher priority
//! channels are done.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Event;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::scheduler::{EventHandle, Scheduler};

const SOURCE_MASK: [u32; 4] = [0x07FF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF];
const DESTINATION_MASK: [u32; 4] = [0x07FF_FFFF, 0x07FF_FFFF, 0x07FF_FFFF, 0x0FFF_FFFF];
const COUNT_MASK: [u32; 4] = [0x3FFF, 0x3FFF, 0x3FFF, 0xFFFF];
const CONTROL_MASK: [u16; 4] = [0xF7E0, 0xF7E0, 0xF7E0, 0xFFE0];

/// Cycles between enabling an immediate channel and its first unit.
const START_DELAY: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DmaTiming {
    Immediate,
    VBlank,
    HBlank,
    /// Sound FIFO for channels 1-2, video capture for channel 3.
    Special,
}

impl From<u16> for DmaTiming {
    fn from(value: u16) -> Self {
        match value & 3 {
            0 => Self::Immediate,
            1 => Self::VBlank,
            2 => Self::HBlank,
            _ => Self::Special,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    /// Increments, and reloads the destination on every repeat.
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(value: u16) -> Self {
        match value & 3 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

impl AddressControl {
    /// Address step for a unit of `bytes`.
    #[must_use]
    pub const fn step(self, bytes: u32) -> u32 {
        match self {
            Self::Increment | Self::IncrementReload => bytes,
            Self::Decrement => bytes.wrapping_neg(),
            Self::Fixed => 0,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Channel {
    source: u32,
    destination: u32,
    count: u16,
    control: u16,

    /// Working copies latched when the channel is enabled.
    pub(crate) internal_source: u32,
    pub(crate) internal_destination: u32,
    pub(crate) internal_count: u32,

    /// Pending start of an immediate transfer.
    start: Option<EventHandle>,
}

impl Channel {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(15)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(14)
    }

    #[must_use]
    pub fn timing(&self) -> DmaTiming {
        DmaTiming::from(self.control.get_bits(12..=13))
    }

    #[must_use]
    pub fn word_transfer(&self) -> bool {
        self.control.get_bit(10)
    }

    #[must_use]
    pub fn repeat(&self) -> bool {
        self.control.get_bit(9)
    }

    #[must_use]
    pub fn source_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(7..=8))
    }

    #[must_use]
    pub fn destination_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(5..=6))
    }

    #[must_use]
    pub const fn control(&self) -> u16 {
        self.control
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Dma {
    channels: [Channel; 4],
    /// Bit `i` set while channel `i` waits for (or is in the middle of) a transfer.
    pending: u8,
    running: Option<usize>,
    early_exit: bool,
    /// Last unit read, written again when the source cannot be read.
    pub(crate) latch: u32,
}

fn count_value(index: usize, count: u16) -> u32 {
    match u32::from(count) & COUNT_MASK[index] {
        0 => COUNT_MASK[index] + 1,
        count => count,
    }
}

impl Dma {
    #[must_use]
    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    pub(crate) fn channel_mut(&mut self, index: usize) -> &mut Channel {
        &mut self.channels[index]
    }

    /// `offset` is relative to the I/O base, in 0xB0..=0xDF. Only CNT_H reads back.
    #[must_use]
    pub fn read16(&self, offset: u32) -> u16 {
        let relative = offset - 0xB0;
        let channel = &self.channels[(relative / 12) as usize];
        match relative % 12 {
            0xA => channel.control,
            _ => 0,
        }
    }

    pub fn write16(&mut self, offset: u32, value: u16, scheduler: &mut Scheduler<Event>) {
        let relative = offset - 0xB0;
        let index = (relative / 12) as usize;
        let channel = &mut self.channels[index];
        let value32 = u32::from(value);

        match relative % 12 {
            0x0 => channel.source = (channel.source & 0xFFFF_0000) | value32,
            0x2 => channel.source = (channel.source & 0xFFFF) | (value32 << 16),
            0x4 => channel.destination = (channel.destination & 0xFFFF_0000) | value32,
            0x6 => channel.destination = (channel.destination & 0xFFFF) | (value32 << 16),
            0x8 => channel.count = value,
            _ => self.write_control(index, value, scheduler),
        }
    }

    fn write_control(&mut self, index: usize, value: u16, scheduler: &mut Scheduler<Event>) {
        let channel = &mut self.channels[index];
        let was_enabled = channel.enabled();
        channel.control = value & CONTROL_MASK[index];

        if !channel.enabled() || channel.timing() != DmaTiming::Immediate {
            if let Some(handle) = channel.start.take() {
                scheduler.cancel(handle);
            }
        }

        if !channel.enabled() {
            self.pending &= !(1 << index);
            return;
        }

        if !was_enabled {
            channel.internal_source = channel.source & SOURCE_MASK[index];
            channel.internal_destination = channel.destination & DESTINATION_MASK[index];
            channel.internal_count = count_value(index, channel.count);

            tracing::debug!(
                "dma {index} armed: {:#010X} -> {:#010X}, {} units, {:?}",
                channel.internal_source,
                channel.internal_destination,
                channel.internal_count,
                channel.timing()
            );

            if channel.timing() == DmaTiming::Immediate {
                channel.start = Some(scheduler.schedule(START_DELAY, Event::DmaStart(index)));
            }
        }
    }

    /// Start delay of an immediate channel elapsed.
    pub fn start(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        channel.start = None;
        if channel.timing() == DmaTiming::Immediate {
            self.activate(index);
        }
    }

    /// Marks channel `index` as ready to transfer.
    pub fn activate(&mut self, index: usize) {
        if !self.channels[index].enabled() {
            return;
        }
        self.pending |= 1 << index;
        if self.running.is_some_and(|running| index < running) {
            self.early_exit = true;
        }
    }

    /// Activates every enabled channel started by `timing`.
    pub fn activate_matching(&mut self, timing: DmaTiming) {
        for index in 0..self.channels.len() {
            if self.channels[index].enabled() && self.channels[index].timing() == timing {
                self.activate(index);
            }
        }
    }

    /// Highest priority channel waiting to transfer.
    #[must_use]
    pub fn next_pending(&self) -> Option<usize> {
        (self.pending != 0).then(|| self.pending.trailing_zeros() as usize)
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) const fn begin(&mut self, index: usize) {
        self.running = Some(index);
        self.early_exit = false;
    }

    pub(crate) const fn end(&mut self) {
        self.running = None;
    }

    #[must_use]
    pub(crate) const fn early_exit(&self) -> bool {
        self.early_exit
    }

    /// Completes the transfer of channel `index`.
    pub(crate) fn finish(&mut self, index: usize, interrupt_control: &mut InterruptControl) {
        self.pending &= !(1 << index);
        let channel = &mut self.channels[index];

        if channel.irq_enabled() {
            interrupt_control.request(Interrupt::dma(index));
        }

        if channel.repeat() && channel.timing() != DmaTiming::Immediate {
            channel.internal_count = count_value(index, channel.count);
            if channel.destination_control() == AddressControl::IncrementReload {
                channel.internal_destination = channel.destination & DESTINATION_MASK[index];
            }
        } else {
            channel.control.set_bit(15, false);
        }

        tracing::debug!("dma {index} done");
    }
}
