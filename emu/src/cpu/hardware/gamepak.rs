//! Cartridge address space:
//!
//! ```text
//!  0x0800_0000-0x09FF_FFFF  ROM, wait state 0
//!  0x0A00_0000-0x0BFF_FFFF  ROM mirror, wait state 1
//!  0x0C00_0000-0x0DFF_FFFF  ROM mirror, wait state 2
//!  0x0E00_0000-0x0E00_FFFF  SRAM, 8-bit bus
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::bus::Memory;

pub const MAX_ROM_SIZE: usize = 0x0200_0000;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Rom {
    data: Vec<u8>,
}

impl Rom {
    #[must_use]
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Memory for Rom {
    fn read8(&self, address: u32) -> u8 {
        let address = address as usize & (MAX_ROM_SIZE - 1);
        if let Some(value) = self.data.get(address) {
            *value
        } else {
            // The GamePak ROM is halfword addressed. The lower 16 bits of
            // the halfword address and the data share the same lines
            // (AD0-15). An address with nothing behind it leaves the
            // address on those lines, and that is what the CPU reads.
            //
            // https://rust-console.github.io/gbatek-gbaonly/#auxgbagamepakbus
            (((address >> 1) & 0xFFFF) as u16).get_byte((address & 0b1) as u8)
        }
    }

    fn write8(&mut self, address: u32, _value: u8) {
        tracing::warn!("write to ROM at {address:#010X} ignored");
    }
}

pub const SRAM_SIZE: usize = 0x1_0000;

/// Battery backed RAM. Only a byte wide bus is wired, so wider reads
/// repeat the byte and wider writes store one lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sram {
    data: Vec<u8>,
}

impl Default for Sram {
    fn default() -> Self {
        Self {
            data: vec![0xFF; SRAM_SIZE],
        }
    }
}

impl Memory for Sram {
    fn read8(&self, address: u32) -> u8 {
        self.data[address as usize & (SRAM_SIZE - 1)]
    }

    fn write8(&mut self, address: u32, value: u8) {
        self.data[address as usize & (SRAM_SIZE - 1)] = value;
    }

    fn read16(&self, address: u32) -> u16 {
        u16::from(self.read8(address)) * 0x0101
    }

    fn read32(&self, address: u32) -> u32 {
        u32::from(self.read8(address)) * 0x0101_0101
    }

    fn write16(&mut self, address: u32, value: u16) {
        self.write8(address, (value >> ((address & 1) * 8)) as u8);
    }

    fn write32(&mut self, address: u32, value: u32) {
        self.write8(address, (value >> ((address & 3) * 8)) as u8);
    }
}
