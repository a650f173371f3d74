//! WAITCNT (0x0400_0204): gamepak and SRAM access timing.
//!
//! ```text
//!  15  14  13-11  10   9-8  7    6-5  4    3-2  1-0
//!  ┌───┬───┬─────┬────┬────┬────┬────┬────┬────┬────┐
//!  │   │PF │     │WS2S│WS2N│WS1S│WS1N│WS0S│WS0N│SRAM│
//!  └───┴───┴─────┴────┴────┴────┴────┴────┴────┴────┘
//! ```
//!
//! Every figure below already includes the access cycle itself.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// First access (and SRAM) cycles for field values 0-3.
const CYCLES: [u32; 4] = [5, 4, 3, 9];

/// Sequential access cycles for WS0, WS1, WS2 and field values 0-1.
const SEQUENTIAL_CYCLES: [[u32; 2]; 3] = [[3, 2], [5, 2], [9, 2]];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waitstate {
    value: u16,
    /// `[non-sequential, sequential]` per wait state region.
    lut: [[u32; 2]; 3],
    sram: u32,
}

impl Default for Waitstate {
    fn default() -> Self {
        let mut waitstate = Self {
            value: 0,
            lut: [[0; 2]; 3],
            sram: 0,
        };
        waitstate.write(0);
        waitstate
    }
}

impl Waitstate {
    #[must_use]
    pub const fn read(&self) -> u16 {
        self.value
    }

    pub fn write(&mut self, value: u16) {
        self.value = value;
        let value = u32::from(value);
        for (i, entry) in self.lut.iter_mut().enumerate() {
            let shift = 3 * i as u32;
            entry[0] = CYCLES[((value >> (2 + shift)) & 3) as usize];
            entry[1] = SEQUENTIAL_CYCLES[i][((value >> (4 + shift)) & 1) as usize];
        }
        self.sram = CYCLES[(value & 3) as usize];
    }

    /// `(non-sequential, sequential)` cycles of a 16-bit access to wait state region `region`.
    #[must_use]
    pub const fn gamepak(&self, region: usize) -> (u32, u32) {
        (self.lut[region][0], self.lut[region][1])
    }

    #[must_use]
    pub const fn sram(&self) -> u32 {
        self.sram
    }

    #[must_use]
    pub fn prefetch_enabled(&self) -> bool {
        self.value.get_bit(14)
    }
}
