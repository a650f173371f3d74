//! # Gamepak Prefetch Buffer
//!
//! While the CPU is busy elsewhere (internal cycles, IWRAM code, data
//! accesses outside the cartridge) the gamepak keeps reading opcodes that
//! follow the last ROM fetch, up to 16 bytes ahead:
//!
//! ```text
//!   head                 head + bytes*size
//!    │                         │
//!    ▼                         ▼
//!  ┌─────┬─────┬─────┬─────┬─────────────┐
//!  │ rdy │ rdy │ rdy │ rdy │ in progress │  cycles_left
//!  └─────┴─────┴─────┴─────┴─────────────┘
//! ```
//!
//! - an opcode fetch at `head` costs 1 cycle;
//! - an opcode fetch at the slot in progress costs what is left of it;
//! - any other fetch restarts the buffer behind it and pays the full cost;
//! - a data access to the cartridge stops the buffer.
//!
//! Costs are returned to the bus, which spends them through its tick loop,
//! so every cycle spent also advances the slot in progress.

use serde::{Deserialize, Serialize};

/// Buffer capacity in bytes.
const CAPACITY: u32 = 16;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefetch {
    enabled: bool,
    active: bool,
    /// Address of the oldest buffered opcode.
    head: u32,
    /// Opcodes ready in the buffer.
    size: u32,
    /// Width of the buffered opcodes (2 or 4).
    bytes: u32,
    /// Sequential cost of one opcode.
    unit_cycles: u32,
    cycles_left: u32,
    /// The next data access lands on a slot boundary and costs one more cycle.
    bubble: bool,
}

impl Prefetch {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn buffered(&self) -> u32 {
        self.size
    }

    /// One bus cycle of background fetching.
    pub fn tick(&mut self) {
        if !self.enabled || !self.active {
            return;
        }

        self.bubble = self.cycles_left == 1
            || (self.bytes == 4 && self.cycles_left == self.unit_cycles / 2 + 1);

        self.cycles_left = self.cycles_left.saturating_sub(1);
        if self.cycles_left == 0 {
            self.size += 1;
            self.cycles_left = self.unit_cycles;
            if self.size * self.bytes >= CAPACITY {
                self.active = false;
            }
        }
    }

    /// Cost of an opcode fetch of `bytes` at `address`, whose uncached cost
    /// is `cycles` and whose sequential successors cost `sequential` each.
    pub fn fetch(&mut self, address: u32, cycles: u32, sequential: u32, bytes: u32) -> u32 {
        if !self.enabled {
            return self.data_access(cycles);
        }

        if bytes == self.bytes && self.size > 0 && address == self.head {
            self.head = self.head.wrapping_add(bytes);
            self.size -= 1;
            if !self.active {
                self.active = true;
                self.cycles_left = self.unit_cycles;
            }
            return 1;
        }

        if bytes == self.bytes
            && self.active
            && address == self.head.wrapping_add(bytes * self.size)
        {
            let cost = self.cycles_left;
            self.head = self.head.wrapping_add(bytes * (self.size + 1));
            self.size = 0;
            self.cycles_left += sequential;
            self.bubble = false;
            return cost;
        }

        self.head = address.wrapping_add(bytes);
        self.size = 0;
        self.bytes = bytes;
        self.unit_cycles = sequential;
        self.cycles_left = sequential + cycles;
        self.active = true;
        self.bubble = false;
        cycles
    }

    /// Cost of a data access to the cartridge. Stops the buffer.
    pub fn data_access(&mut self, cycles: u32) -> u32 {
        let extra = u32::from(self.enabled && self.active && self.bubble);
        self.stop();
        cycles + extra
    }

    fn stop(&mut self) {
        self.active = false;
        self.size = 0;
        self.bubble = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROM: u32 = 0x0800_0000;

    fn enabled() -> Prefetch {
        let mut prefetch = Prefetch::default();
        prefetch.set_enabled(true);
        prefetch
    }

    #[test]
    fn disabled_buffer_pays_full_cost() {
        let mut prefetch = Prefetch::default();
        assert_eq!(prefetch.fetch(ROM, 5, 3, 2), 5);
        for _ in 0..100 {
            prefetch.tick();
        }
        assert_eq!(prefetch.fetch(ROM + 2, 3, 3, 2), 3);
        assert_eq!(prefetch.buffered(), 0);
    }

    #[test]
    fn buffered_opcode_costs_one_cycle() {
        let mut prefetch = enabled();
        assert_eq!(prefetch.fetch(ROM, 5, 3, 2), 5);
        // The bus spends the 5 cycles, then the CPU idles 3 more.
        for _ in 0..8 {
            prefetch.tick();
        }
        assert_eq!(prefetch.buffered(), 1);
        assert_eq!(prefetch.fetch(ROM + 2, 3, 3, 2), 1);
        assert_eq!(prefetch.buffered(), 0);
    }

    #[test]
    fn slot_in_progress_costs_the_remainder() {
        let mut prefetch = enabled();
        prefetch.fetch(ROM, 5, 3, 2);
        for _ in 0..6 {
            prefetch.tick();
        }
        assert_eq!(prefetch.fetch(ROM + 2, 3, 3, 2), 2);

        // The next slot starts right behind.
        for _ in 0..2 {
            prefetch.tick();
        }
        for _ in 0..3 {
            prefetch.tick();
        }
        assert_eq!(prefetch.fetch(ROM + 4, 3, 3, 2), 1);
    }

    #[test]
    fn buffer_stops_when_full() {
        let mut prefetch = enabled();
        prefetch.fetch(ROM, 5, 3, 2);
        for _ in 0..1000 {
            prefetch.tick();
        }
        assert_eq!(prefetch.buffered(), 8);

        let mut prefetch = enabled();
        prefetch.fetch(ROM, 8, 6, 4);
        for _ in 0..1000 {
            prefetch.tick();
        }
        assert_eq!(prefetch.buffered(), 4);
    }

    #[test]
    fn data_access_and_jumps_flush() {
        let mut prefetch = enabled();
        prefetch.fetch(ROM, 5, 3, 2);
        for _ in 0..20 {
            prefetch.tick();
        }
        assert!(prefetch.buffered() > 0);
        prefetch.data_access(5);
        assert_eq!(prefetch.buffered(), 0);
        assert_eq!(prefetch.fetch(ROM + 2, 3, 3, 2), 3);

        for _ in 0..20 {
            prefetch.tick();
        }
        // A branch elsewhere misses.
        assert_eq!(prefetch.fetch(ROM + 0x100, 5, 3, 2), 5);
    }
}
