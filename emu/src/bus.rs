//! # System Bus
//!
//! Routes every CPU and DMA access to one of sixteen regions selected by
//! address bits 27-24, charges its wait states and moves time forward.
//!
//! ```text
//!  0x00  BIOS        0x04  I/O         0x08-0x09  ROM, wait state 0
//!  0x01  unused      0x05  palette     0x0A-0x0B  ROM, wait state 1
//!  0x02  EWRAM       0x06  VRAM        0x0C-0x0D  ROM, wait state 2
//!  0x03  IWRAM       0x07  OAM         0x0E-0x0F  SRAM
//! ```
//!
//! Every cycle the bus charges goes through [`Bus::tick`], which runs the
//! prefetch buffer, the pixel processor hook and the scheduled events in
//! that order, then starts any DMA that became ready.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cpu::hardware::bios::{Bios, BIOS_SIZE};
use crate::cpu::hardware::dma::{Dma, DmaTiming};
use crate::cpu::hardware::gamepak::{Rom, Sram};
use crate::cpu::hardware::internal_memory::{Ram, Vram};
use crate::cpu::hardware::interrupt_control::InterruptControl;
use crate::cpu::hardware::keypad::{GbaButton, Keypad};
use crate::cpu::hardware::prefetch::Prefetch;
use crate::cpu::hardware::serial::Serial;
use crate::cpu::hardware::timers::Timers;
use crate::cpu::hardware::waitstate::Waitstate;
use crate::cpu::pipeline::Fetch;
use crate::scheduler::Scheduler;

/// Relation of an access to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    NonSequential,
    Sequential,
}

/// Deferred work kept in the bus scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TimerOverflow(usize),
    DmaStart(usize),
    SerialComplete,
}

/// Little-endian byte addressed storage. Wider accesses compose bytes
/// unless a device overrides them.
pub trait Memory {
    fn read8(&self, address: u32) -> u8;
    fn write8(&mut self, address: u32, value: u8);

    fn read16(&self, address: u32) -> u16 {
        u16::from_le_bytes([self.read8(address), self.read8(address.wrapping_add(1))])
    }

    fn read32(&self, address: u32) -> u32 {
        u32::from(self.read16(address)) | (u32::from(self.read16(address.wrapping_add(2))) << 16)
    }

    fn write16(&mut self, address: u32, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write8(address, low);
        self.write8(address.wrapping_add(1), high);
    }

    fn write32(&mut self, address: u32, value: u32) {
        self.write16(address, value as u16);
        self.write16(address.wrapping_add(2), (value >> 16) as u16);
    }
}

/// Called once per bus cycle, before scheduled events. The pixel
/// processor lives behind this hook: it may raise interrupts and returns
/// the DMA timing it signals on that cycle, if any.
pub trait TickHook {
    fn tick(&mut self, interrupt_control: &mut InterruptControl) -> Option<DmaTiming>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Bios,
    Unused,
    Ewram,
    Iwram,
    Io,
    Palette,
    Vram,
    Oam,
    /// Cartridge ROM behind wait state 0, 1 or 2.
    Gamepak(usize),
    Sram,
}

pub const REGIONS: [Region; 16] = [
    Region::Bios,
    Region::Unused,
    Region::Ewram,
    Region::Iwram,
    Region::Io,
    Region::Palette,
    Region::Vram,
    Region::Oam,
    Region::Gamepak(0),
    Region::Gamepak(0),
    Region::Gamepak(1),
    Region::Gamepak(1),
    Region::Gamepak(2),
    Region::Gamepak(2),
    Region::Sram,
    Region::Sram,
];

impl Region {
    #[must_use]
    pub const fn of(address: u32) -> Self {
        if address >> 28 != 0 {
            Self::Unused
        } else {
            REGIONS[(address >> 24) as usize]
        }
    }
}

/// Last I/O offset that holds a register.
const IO_END: u32 = 0x803;

fn read_width<M: Memory>(memory: &M, address: u32, bytes: u32) -> u32 {
    match bytes {
        1 => u32::from(memory.read8(address)),
        2 => u32::from(memory.read16(address)),
        _ => memory.read32(address),
    }
}

fn write_width<M: Memory>(memory: &mut M, address: u32, value: u32, bytes: u32) {
    match bytes {
        1 => memory.write8(address, value as u8),
        2 => memory.write16(address, value as u16),
        _ => memory.write32(address, value),
    }
}

/// The lane of a latched word that an access of `bytes` at `address` sees.
const fn lane(value: u32, address: u32, bytes: u32) -> u32 {
    let value = value >> ((address & (4 - bytes)) * 8);
    match bytes {
        1 => value & 0xFF,
        2 => value & 0xFFFF,
        _ => value,
    }
}

pub struct Bus {
    bios: Bios,
    ewram: Ram,
    iwram: Ram,
    palette: Ram,
    vram: Vram,
    oam: Ram,
    rom: Rom,
    sram: Sram,

    pub interrupt_control: InterruptControl,
    pub waitstate: Waitstate,
    prefetch: Prefetch,
    pub timers: Timers,
    pub dma: Dma,
    pub serial: Serial,
    pub keypad: Keypad,

    scheduler: Scheduler<Event>,
    /// Registers with no behaviour behind them, stored as written.
    io_registers: HashMap<u32, u16>,
    tick_hook: Option<Box<dyn TickHook>>,

    /// Last opcode fetched, seen by reads of unmapped addresses.
    open_bus: u32,
    /// Last word fetched from the BIOS, seen by protected BIOS reads.
    bios_latch: u32,
    last_fetch: u32,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(Bios::default(), Rom::default())
    }
}

impl Bus {
    #[must_use]
    pub fn new(bios: Bios, rom: Rom) -> Self {
        Self {
            bios,
            ewram: Ram::ewram(),
            iwram: Ram::iwram(),
            palette: Ram::new(0x400),
            vram: Vram::default(),
            oam: Ram::new(0x400),
            rom,
            sram: Sram::default(),
            interrupt_control: InterruptControl::default(),
            waitstate: Waitstate::default(),
            prefetch: Prefetch::default(),
            timers: Timers::default(),
            dma: Dma::default(),
            serial: Serial::default(),
            keypad: Keypad::new(),
            scheduler: Scheduler::new(),
            io_registers: HashMap::new(),
            tick_hook: None,
            open_bus: 0,
            bios_latch: 0,
            last_fetch: 0,
        }
    }

    pub fn attach_tick_hook(&mut self, hook: Box<dyn TickHook>) {
        self.tick_hook = Some(hook);
    }

    /// Cycles elapsed since power on.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.scheduler.counter()
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<Event> {
        &self.scheduler
    }

    pub const fn scheduler_mut(&mut self) -> &mut Scheduler<Event> {
        &mut self.scheduler
    }

    /// An internal cycle with no memory access.
    pub fn idle(&mut self) {
        self.tick();
    }

    pub fn step(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.tick();
        }
    }

    pub fn tick(&mut self) {
        self.prefetch.tick();

        if let Some(hook) = self.tick_hook.as_mut() {
            if let Some(timing) = hook.tick(&mut self.interrupt_control) {
                self.dma.activate_matching(timing);
            }
        }

        let Self {
            scheduler,
            timers,
            dma,
            serial,
            interrupt_control,
            ..
        } = self;
        scheduler.advance(|event, scheduler| match event {
            Event::TimerOverflow(index) => timers.overflow(index, scheduler, interrupt_control),
            Event::DmaStart(index) => dma.start(index),
            Event::SerialComplete => serial.complete(interrupt_control),
        });

        if self.dma.next_pending().is_some() && !self.dma.is_running() {
            self.run_dma();
        }
    }

    /// Start of a blanking period signalled outside of the tick hook.
    pub fn notify_blank(&mut self, timing: DmaTiming) {
        self.dma.activate_matching(timing);
        if !self.dma.is_running() {
            self.run_dma();
        }
    }

    pub fn set_button(&mut self, button: GbaButton, pressed: bool) {
        self.keypad
            .set_button(button, pressed, &mut self.interrupt_control);
    }

    pub fn read8(&mut self, address: u32, access: Access) -> u8 {
        self.charge(address, access, 1, false);
        self.load(address, 1) as u8
    }

    /// Reads the aligned halfword holding `address`.
    pub fn read16(&mut self, address: u32, access: Access) -> u16 {
        let address = address & !1;
        self.charge(address, access, 2, false);
        self.load(address, 2) as u16
    }

    /// Reads the aligned word holding `address`.
    pub fn read32(&mut self, address: u32, access: Access) -> u32 {
        let address = address & !3;
        self.charge(address, access, 4, false);
        self.load(address, 4)
    }

    pub fn write8(&mut self, address: u32, value: u8, access: Access) {
        self.charge(address, access, 1, false);
        self.store(address, u32::from(value), 1);
    }

    pub fn write16(&mut self, address: u32, value: u16, access: Access) {
        let address = address & !1;
        self.charge(address, access, 2, false);
        self.store(address, u32::from(value), 2);
    }

    pub fn write32(&mut self, address: u32, value: u32, access: Access) {
        let address = address & !3;
        self.charge(address, access, 4, false);
        self.store(address, value, 4);
    }

    /// Reads without spending cycles.
    #[must_use]
    pub fn peek8(&self, address: u32) -> u8 {
        self.load(address, 1) as u8
    }

    #[must_use]
    pub fn peek16(&self, address: u32) -> u16 {
        self.load(address & !1, 2) as u16
    }

    #[must_use]
    pub fn peek32(&self, address: u32) -> u32 {
        self.load(address & !3, 4)
    }

    fn charge(&mut self, address: u32, access: Access, bytes: u32, fetch: bool) {
        let cycles = self.access_cycles(address, access, bytes, fetch);
        self.step(cycles);
    }

    fn access_cycles(&mut self, address: u32, access: Access, bytes: u32, fetch: bool) -> u32 {
        match Region::of(address) {
            Region::Ewram => {
                if bytes == 4 {
                    6
                } else {
                    3
                }
            }
            Region::Palette | Region::Vram => {
                if bytes == 4 {
                    2
                } else {
                    1
                }
            }
            Region::Gamepak(region) => {
                // Every 128 KiB page starts a new burst.
                let access = if address & 0x1_FFFF == 0 && !self.dma.is_running() {
                    Access::NonSequential
                } else {
                    access
                };
                let (non_sequential, sequential) = self.waitstate.gamepak(region);
                let first = match access {
                    Access::NonSequential => non_sequential,
                    Access::Sequential => sequential,
                };
                let (cycles, successor) = if bytes == 4 {
                    (first + sequential, sequential * 2)
                } else {
                    (first, sequential)
                };

                if fetch {
                    self.prefetch.fetch(address, cycles, successor, bytes)
                } else {
                    self.prefetch.data_access(cycles)
                }
            }
            Region::Sram => self.waitstate.sram(),
            _ => 1,
        }
    }

    fn load(&self, address: u32, bytes: u32) -> u32 {
        match Region::of(address) {
            Region::Bios => self.read_bios(address, bytes),
            Region::Unused => lane(self.open_bus, address, bytes),
            Region::Ewram => read_width(&self.ewram, address, bytes),
            Region::Iwram => read_width(&self.iwram, address, bytes),
            Region::Io => self.read_io(address, bytes),
            Region::Palette => read_width(&self.palette, address, bytes),
            Region::Vram => read_width(&self.vram, address, bytes),
            Region::Oam => read_width(&self.oam, address, bytes),
            Region::Gamepak(_) => read_width(&self.rom, address, bytes),
            Region::Sram => read_width(&self.sram, address, bytes),
        }
    }

    fn store(&mut self, address: u32, value: u32, bytes: u32) {
        match Region::of(address) {
            Region::Bios => tracing::warn!("write to BIOS at {address:#010X} ignored"),
            Region::Unused => tracing::debug!("write to unused memory at {address:#010X}"),
            Region::Ewram => write_width(&mut self.ewram, address, value, bytes),
            Region::Iwram => write_width(&mut self.iwram, address, value, bytes),
            Region::Io => self.write_io(address, value, bytes),
            // Byte writes to video memory store the byte in both lanes.
            Region::Palette if bytes == 1 => {
                self.palette.write16(address & !1, (value as u16) * 0x0101);
            }
            Region::Palette => write_width(&mut self.palette, address, value, bytes),
            Region::Vram if bytes == 1 => {
                if address & 0x1_FFFF < 0x1_0000 {
                    self.vram.write16(address & !1, (value as u16) * 0x0101);
                }
            }
            Region::Vram => write_width(&mut self.vram, address, value, bytes),
            Region::Oam if bytes == 1 => {}
            Region::Oam => write_width(&mut self.oam, address, value, bytes),
            Region::Gamepak(_) => write_width(&mut self.rom, address, value, bytes),
            Region::Sram => write_width(&mut self.sram, address, value, bytes),
        }
    }

    /// Once execution has left the BIOS only the last word it fetched can
    /// be read back.
    fn read_bios(&self, address: u32, bytes: u32) -> u32 {
        if address >= BIOS_SIZE as u32 {
            lane(self.open_bus, address, bytes)
        } else if self.last_fetch < BIOS_SIZE as u32 {
            read_width(&self.bios, address, bytes)
        } else {
            lane(self.bios_latch, address, bytes)
        }
    }

    fn read_io(&self, address: u32, bytes: u32) -> u32 {
        let offset = address & 0x00FF_FFFF;
        match bytes {
            1 => u32::from(self.io_read16(offset & !1) >> ((offset & 1) * 8)) & 0xFF,
            2 => u32::from(self.io_read16(offset)),
            _ => u32::from(self.io_read16(offset)) | (u32::from(self.io_read16(offset + 2)) << 16),
        }
    }

    fn write_io(&mut self, address: u32, value: u32, bytes: u32) {
        let offset = address & 0x00FF_FFFF;
        match bytes {
            1 => self.io_write8(offset, value as u8),
            2 => self.io_write16(offset, value as u16),
            _ => {
                self.io_write16(offset, value as u16);
                self.io_write16(offset + 2, (value >> 16) as u16);
            }
        }
    }

    fn io_read16(&self, offset: u32) -> u16 {
        match offset {
            0xB0..=0xDF => self.dma.read16(offset),
            0x100..=0x10F => self.timers.read16(offset, &self.scheduler),
            0x120..=0x12F | 0x134 => self.serial.read16(offset),
            0x130..=0x133 => self.keypad.read16(offset),
            0x200 => self.interrupt_control.interrupt_enable,
            0x202 => self.interrupt_control.interrupt_request,
            0x204 => self.waitstate.read(),
            0x208 => u16::from(self.interrupt_control.interrupt_master_enable),
            0x300 => u16::from(self.interrupt_control.post_boot_flag),
            offset if offset > IO_END => {
                tracing::warn!("read of unmapped I/O offset {offset:#05X}");
                0
            }
            _ => self.io_registers.get(&offset).copied().unwrap_or(0),
        }
    }

    fn io_write16(&mut self, offset: u32, value: u16) {
        match offset {
            0xB0..=0xDF => self.dma.write16(offset, value, &mut self.scheduler),
            0x100..=0x10F => self.timers.write16(offset, value, &mut self.scheduler),
            0x120..=0x12F | 0x134 => self.serial.write16(offset, value, &mut self.scheduler),
            0x130..=0x133 => self
                .keypad
                .write16(offset, value, &mut self.interrupt_control),
            0x200 => self.interrupt_control.interrupt_enable = value,
            0x202 => self.interrupt_control.acknowledge(value),
            0x204 => {
                self.waitstate.write(value);
                self.prefetch.set_enabled(self.waitstate.prefetch_enabled());
            }
            0x208 => self.interrupt_control.interrupt_master_enable = value & 1 != 0,
            0x300 => {
                self.interrupt_control.post_boot_flag = (value & 1) as u8;
                self.halt();
            }
            offset if offset > IO_END => {
                tracing::warn!("write of {value:#06X} to unmapped I/O offset {offset:#05X}");
            }
            _ => {
                self.io_registers.insert(offset, value);
            }
        }
    }

    fn io_write8(&mut self, offset: u32, value: u8) {
        match offset {
            0x202 | 0x203 => self
                .interrupt_control
                .acknowledge(u16::from(value) << ((offset & 1) * 8)),
            0x300 => self.interrupt_control.post_boot_flag = value & 1,
            0x301 => self.halt(),
            _ => {
                let aligned = offset & !1;
                let shift = (offset & 1) * 8;
                let old = self.io_read16(aligned);
                let new = (old & !(0xFF << shift)) | (u16::from(value) << shift);
                self.io_write16(aligned, new);
            }
        }
    }

    fn halt(&mut self) {
        tracing::trace!("halted at cycle {}", self.scheduler.counter());
        self.interrupt_control.halt();
    }

    fn run_dma(&mut self) {
        while let Some(index) = self.dma.next_pending() {
            self.dma.begin(index);
            self.transfer(index);
            self.dma.end();
        }
    }

    /// Copies the units left in channel `index`, stopping early when a
    /// higher priority channel becomes ready.
    fn transfer(&mut self, index: usize) {
        let channel = self.dma.channel(index);
        let word = channel.word_transfer();
        let bytes: u32 = if word { 4 } else { 2 };

        let mut source = channel.internal_source & !(bytes - 1);
        let mut destination = channel.internal_destination & !(bytes - 1);
        let mut count = channel.internal_count;
        let source_step = if (0x0800_0000..0x0E00_0000).contains(&source) {
            bytes
        } else {
            channel.source_control().step(bytes)
        };
        let destination_step = channel.destination_control().step(bytes);

        let mut access = Access::NonSequential;
        while count > 0 {
            if self.dma.early_exit() {
                break;
            }

            if source >= 0x0200_0000 {
                self.dma.latch = if word {
                    self.read32(source, access)
                } else {
                    u32::from(self.read16(source, access)) * 0x0001_0001
                };
            } else {
                self.idle();
            }

            if word {
                self.write32(destination, self.dma.latch, access);
            } else {
                self.write16(
                    destination,
                    (self.dma.latch >> ((destination & 2) * 8)) as u16,
                    access,
                );
            }

            source = source.wrapping_add(source_step);
            destination = destination.wrapping_add(destination_step);
            count -= 1;
            access = Access::Sequential;
        }

        let channel = self.dma.channel_mut(index);
        channel.internal_source = source;
        channel.internal_destination = destination;
        channel.internal_count = count;

        if count == 0 {
            self.dma.finish(index, &mut self.interrupt_control);
        }
    }

    fn latch_fetch(&mut self, address: u32) {
        self.last_fetch = address;
        if address < BIOS_SIZE as u32 {
            self.bios_latch = self.bios.read32(address & !3);
        }
    }
}

impl Fetch for Bus {
    fn fetch16(&mut self, address: u32, access: Access) -> u16 {
        let address = address & !1;
        self.charge(address, access, 2, true);
        self.latch_fetch(address);
        let value = self.load(address, 2) as u16;
        self.open_bus = u32::from(value) * 0x0001_0001;
        value
    }

    fn fetch32(&mut self, address: u32, access: Access) -> u32 {
        let address = address & !3;
        self.charge(address, access, 4, true);
        self.latch_fetch(address);
        let value = self.load(address, 4);
        self.open_bus = value;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::interrupt_control::Interrupt;
    use pretty_assertions::assert_eq;

    #[test]
    fn regions_by_address() {
        assert_eq!(Region::of(0x0000_0000), Region::Bios);
        assert_eq!(Region::of(0x0300_7FFC), Region::Iwram);
        assert_eq!(Region::of(0x0A00_0000), Region::Gamepak(1));
        assert_eq!(Region::of(0x0D00_0000), Region::Gamepak(2));
        assert_eq!(Region::of(0x0F00_0000), Region::Sram);
        assert_eq!(Region::of(0x1000_0000), Region::Unused);
    }

    #[test]
    fn ewram_wait_states() {
        let mut bus = Bus::default();
        bus.write32(0x0200_0000, 0xDEAD_BEEF, Access::NonSequential);
        assert_eq!(bus.cycles(), 6);
        assert_eq!(bus.read16(0x0200_0002, Access::Sequential), 0xDEAD);
        assert_eq!(bus.cycles(), 9);
        bus.read8(0x0300_0000, Access::Sequential);
        assert_eq!(bus.cycles(), 10);
    }

    #[test]
    fn gamepak_wait_states() {
        let mut bus = Bus::new(Bios::default(), Rom::new(vec![0; 0x100]));
        bus.read16(0x0800_0010, Access::NonSequential);
        assert_eq!(bus.cycles(), 5);
        bus.read16(0x0800_0012, Access::Sequential);
        assert_eq!(bus.cycles(), 8);
        // Sequential access at a page start is non sequential.
        bus.read32(0x0802_0000, Access::Sequential);
        assert_eq!(bus.cycles(), 16);
    }

    #[test]
    fn misaligned_reads_are_aligned() {
        let mut bus = Bus::default();
        bus.write32(0x0300_0000, 0x1122_3344, Access::NonSequential);
        assert_eq!(bus.read32(0x0300_0003, Access::NonSequential), 0x1122_3344);
        assert_eq!(bus.read16(0x0300_0001, Access::NonSequential), 0x3344);
        assert_eq!(bus.read8(0x0300_0003, Access::NonSequential), 0x11);
    }

    #[test]
    fn bios_is_protected_outside_of_it() {
        let mut data = vec![0; BIOS_SIZE];
        data[0x10..0x14].copy_from_slice(&0xE3A0_0001u32.to_le_bytes());
        data[0x20..0x24].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        let bios = Bios::new(data).unwrap();
        let mut bus = Bus::new(bios, Rom::new(vec![0; 0x100]));

        assert_eq!(bus.read32(0x20, Access::NonSequential), 0x1234_5678);

        bus.fetch32(0x10, Access::NonSequential);
        bus.fetch32(0x0800_0000, Access::NonSequential);
        assert_eq!(bus.read32(0x20, Access::NonSequential), 0xE3A0_0001);
        assert_eq!(bus.read16(0x22, Access::NonSequential), 0xE3A0);
    }

    #[test]
    fn unused_memory_reads_the_last_opcode() {
        let mut rom = vec![0; 0x100];
        rom[0x40..0x44].copy_from_slice(&0xE1A0_0000u32.to_le_bytes());
        let mut bus = Bus::new(Bios::default(), Rom::new(rom));

        bus.fetch32(0x0800_0040, Access::NonSequential);
        assert_eq!(bus.read32(0x1000_0000, Access::NonSequential), 0xE1A0_0000);
        assert_eq!(bus.read8(0x0100_0003, Access::NonSequential), 0xE1);

        bus.fetch16(0x0800_0042, Access::Sequential);
        assert_eq!(bus.read32(0x1000_0000, Access::NonSequential), 0xE1A0_E1A0);
    }

    #[test]
    fn video_memory_byte_writes() {
        let mut bus = Bus::default();
        bus.write8(0x0500_0001, 0xAB, Access::NonSequential);
        assert_eq!(bus.peek16(0x0500_0000), 0xABAB);

        bus.write8(0x0600_0004, 0x12, Access::NonSequential);
        assert_eq!(bus.peek16(0x0600_0004), 0x1212);

        bus.write16(0x0700_0000, 0x5555, Access::NonSequential);
        bus.write8(0x0700_0000, 0x12, Access::NonSequential);
        assert_eq!(bus.peek16(0x0700_0000), 0x5555);
    }

    #[test]
    fn interrupt_request_write_one_to_clear() {
        let mut bus = Bus::default();
        bus.interrupt_control.request(Interrupt::VBlank);
        bus.interrupt_control.request(Interrupt::Timer0);
        bus.interrupt_control.request(Interrupt::Dma0);

        bus.write16(0x0400_0202, Interrupt::VBlank.mask(), Access::NonSequential);
        assert_eq!(
            bus.read16(0x0400_0202, Access::NonSequential),
            Interrupt::Timer0.mask() | Interrupt::Dma0.mask()
        );

        bus.write8(0x0400_0203, (Interrupt::Dma0.mask() >> 8) as u8, Access::NonSequential);
        assert_eq!(bus.interrupt_control.interrupt_request, Interrupt::Timer0.mask());
    }

    #[test]
    fn io_byte_writes_merge() {
        let mut bus = Bus::default();
        bus.write8(0x0400_0200, 0x01, Access::NonSequential);
        bus.write8(0x0400_0201, 0x20, Access::NonSequential);
        assert_eq!(bus.interrupt_control.interrupt_enable, 0x2001);

        bus.write32(0x0400_0208, 1, Access::NonSequential);
        assert!(bus.interrupt_control.interrupt_master_enable);

        bus.write16(0x0400_0008, 0x1F83, Access::NonSequential);
        assert_eq!(bus.read16(0x0400_0008, Access::NonSequential), 0x1F83);
    }

    #[test]
    fn waitcnt_controls_prefetch() {
        let mut bus = Bus::default();
        bus.write16(0x0400_0204, 0x4317, Access::NonSequential);
        assert_eq!(bus.waitstate.read(), 0x4317);
        assert!(bus.prefetch.is_enabled());
        assert_eq!(bus.waitstate.sram(), 9);
    }

    #[test]
    fn halt_register() {
        let mut bus = Bus::default();
        bus.write8(0x0400_0300, 1, Access::NonSequential);
        assert_eq!(bus.read8(0x0400_0300, Access::NonSequential), 1);
        assert!(!bus.interrupt_control.is_halted());

        bus.write8(0x0400_0301, 0, Access::NonSequential);
        assert!(bus.interrupt_control.is_halted());
    }

    #[test]
    fn immediate_dma_copies_halfwords() {
        let mut bus = Bus::default();
        bus.write32(0x0300_0000, 0x1111_2222, Access::NonSequential);
        bus.write32(0x0300_0004, 0x3333_4444, Access::NonSequential);

        bus.write32(0x0400_00B0, 0x0300_0000, Access::NonSequential);
        bus.write32(0x0400_00B4, 0x0300_0100, Access::NonSequential);
        // 4 units, enabled, immediate, halfwords.
        bus.write32(0x0400_00B8, 0x8000_0004, Access::NonSequential);
        bus.step(4);

        assert_eq!(bus.peek32(0x0300_0100), 0x1111_2222);
        assert_eq!(bus.peek32(0x0300_0104), 0x3333_4444);
        assert!(!bus.dma.channel(0).enabled());
        assert_eq!(bus.dma.next_pending(), None);
    }

    #[test]
    fn vblank_dma_waits_for_vblank_after_rearming() {
        let mut bus = Bus::default();
        bus.write32(0x0300_0000, 0xCAFE_F00D, Access::NonSequential);
        bus.write32(0x0400_00D4, 0x0300_0000, Access::NonSequential);
        bus.write32(0x0400_00D8, 0x0300_0040, Access::NonSequential);
        bus.write16(0x0400_00DC, 1, Access::NonSequential);

        // Immediate word transfer, disabled, then re-enabled on VBlank.
        bus.write16(0x0400_00DE, 0x8400, Access::NonSequential);
        bus.write16(0x0400_00DE, 0x0000, Access::NonSequential);
        bus.write16(0x0400_00DE, 0x9400, Access::NonSequential);
        bus.step(4);

        assert_eq!(bus.peek32(0x0300_0040), 0);
        assert!(bus.dma.channel(3).enabled());

        bus.notify_blank(DmaTiming::VBlank);
        assert_eq!(bus.peek32(0x0300_0040), 0xCAFE_F00D);
        assert!(!bus.dma.channel(3).enabled());
    }

    #[test]
    fn dma_raises_its_interrupt() {
        let mut bus = Bus::default();
        bus.write32(0x0400_00D4, 0x0300_0000, Access::NonSequential);
        bus.write32(0x0400_00D8, 0x0300_0200, Access::NonSequential);
        // 1 word, enabled, IRQ, immediate.
        bus.write32(0x0400_00DC, 0xC400_0001, Access::NonSequential);
        bus.step(4);

        assert_eq!(
            bus.interrupt_control.interrupt_request,
            Interrupt::Dma3.mask()
        );
    }

    #[test]
    fn timer_overflow_through_io() {
        let mut bus = Bus::default();
        bus.write16(0x0400_0100, 0xFFF0, Access::NonSequential);
        // Enabled with IRQ, prescaler 1.
        bus.write16(0x0400_0102, 0x00C0, Access::NonSequential);
        bus.step(8);
        let counter = bus.read16(0x0400_0100, Access::NonSequential);
        assert!(counter > 0xFFF0);
        bus.step(16);

        assert_eq!(
            bus.interrupt_control.interrupt_request,
            Interrupt::Timer0.mask()
        );
    }

    struct VBlankOnce {
        fired: bool,
    }

    impl TickHook for VBlankOnce {
        fn tick(&mut self, interrupt_control: &mut InterruptControl) -> Option<DmaTiming> {
            if self.fired {
                return None;
            }
            self.fired = true;
            interrupt_control.request(Interrupt::VBlank);
            Some(DmaTiming::VBlank)
        }
    }

    #[test]
    fn tick_hook_starts_blank_dma() {
        let mut bus = Bus::default();
        bus.write32(0x0300_0000, 0xCAFE_F00D, Access::NonSequential);
        bus.write32(0x0400_00BC, 0x0300_0000, Access::NonSequential);
        bus.write32(0x0400_00C0, 0x0300_0040, Access::NonSequential);
        // 1 word, enabled, VBlank timing.
        bus.write32(0x0400_00C4, 0x9400_0001, Access::NonSequential);
        assert_eq!(bus.peek32(0x0300_0040), 0);

        bus.attach_tick_hook(Box::new(VBlankOnce { fired: false }));
        bus.idle();

        assert_eq!(bus.peek32(0x0300_0040), 0xCAFE_F00D);
        assert_eq!(
            bus.interrupt_control.interrupt_request,
            Interrupt::VBlank.mask()
        );
    }

    #[test]
    fn keypad_through_the_bus() {
        let mut bus = Bus::default();
        bus.set_button(GbaButton::A, true);
        assert_eq!(bus.read16(0x0400_0130, Access::NonSequential), 0x03FE);
    }
}
