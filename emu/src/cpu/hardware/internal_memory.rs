use serde::{Deserialize, Serialize};

use crate::bus::Memory;

/// On-board RAM mirrored across its whole 16 MiB region.
///
/// - EWRAM: 0x0200_0000, 256 `KBytes`.
/// - IWRAM: 0x0300_0000, 32 `KBytes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ram {
    data: Vec<u8>,
    mask: u32,
}

impl Ram {
    /// `size` must be a power of two.
    #[must_use]
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            data: vec![0; size],
            mask: size as u32 - 1,
        }
    }

    #[must_use]
    pub fn ewram() -> Self {
        Self::new(0x0004_0000)
    }

    #[must_use]
    pub fn iwram() -> Self {
        Self::new(0x0000_8000)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Memory for Ram {
    fn read8(&self, address: u32) -> u8 {
        self.data[(address & self.mask) as usize]
    }

    fn write8(&mut self, address: u32, value: u8) {
        self.data[(address & self.mask) as usize] = value;
    }
}

/// Video RAM: 96 `KBytes` seen through a 128 `KBytes` window, where the
/// last 32 `KBytes` mirror the 32 `KBytes` before them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vram {
    data: Vec<u8>,
}

impl Default for Vram {
    fn default() -> Self {
        Self {
            data: vec![0; 0x1_8000],
        }
    }
}

impl Vram {
    const fn offset(address: u32) -> usize {
        let offset = address & 0x1_FFFF;
        if offset >= 0x1_8000 {
            (offset - 0x8000) as usize
        } else {
            offset as usize
        }
    }
}

impl Memory for Vram {
    fn read8(&self, address: u32) -> u8 {
        self.data[Self::offset(address)]
    }

    fn write8(&mut self, address: u32, value: u8) {
        self.data[Self::offset(address)] = value;
    }
}
