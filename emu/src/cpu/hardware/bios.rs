use serde::{Deserialize, Serialize};

use crate::bus::Memory;
use crate::cartridge_header::LoadError;

pub const BIOS_SIZE: usize = 0x4000;

/// System ROM at 0x0000_0000 (16 `KBytes`). Read protection, which makes it
/// unreadable once the program counter leaves it, is applied by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bios {
    data: Vec<u8>,
}

impl Bios {
    pub fn new(data: Vec<u8>) -> Result<Self, LoadError> {
        if data.len() != BIOS_SIZE {
            return Err(LoadError::BiosSize {
                expected: BIOS_SIZE,
                found: data.len(),
            });
        }
        Ok(Self { data })
    }
}

impl Default for Bios {
    fn default() -> Self {
        Self {
            data: vec![0; BIOS_SIZE],
        }
    }
}

impl Memory for Bios {
    fn read8(&self, address: u32) -> u8 {
        self.data[address as usize & (BIOS_SIZE - 1)]
    }

    fn write8(&mut self, address: u32, _value: u8) {
        tracing::warn!("write to BIOS at {address:#010X} ignored");
    }
}
