//! # Instruction Pipeline
//!
//! The ARM7TDMI fetches two instructions ahead of the one it executes:
//!
//! ```text
//!            fetch        decode       execute
//! cycle 1    X+2w         X+w          X
//! cycle 2    X+3w         X+2w         X+w
//! ```
//!
//! so an executing instruction reads `pc` as its own address plus `2 * width`
//! (8 in ARM state, 4 in Thumb state). This module keeps the in-flight opcodes
//! in a three-slot queue and owns every opcode fetch the CPU performs.
//!
//! Between two instructions the queue holds the next instruction to execute
//! at the head and its successor in the second slot, and `pc` points at that
//! successor. [`Pipeline::step`] advances `pc`, fetches into the free third
//! slot and pops the head.

use serde::{Deserialize, Serialize};

use crate::bus::Access;
use crate::cpu::psr::CpuState;

/// Opcode reads, implemented by the bus. Fetches are separate from data
/// reads because they drive the gamepak prefetch buffer and the open-bus latch.
pub trait Fetch {
    fn fetch16(&mut self, address: u32, access: Access) -> u16;
    fn fetch32(&mut self, address: u32, access: Access) -> u32;
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    slots: [u32; 3],
    len: usize,
}

fn fetch<F: Fetch>(bus: &mut F, address: u32, state: CpuState, access: Access) -> u32 {
    match state {
        CpuState::Arm => bus.fetch32(address, access),
        CpuState::Thumb => u32::from(bus.fetch16(address, access)),
    }
}

impl Pipeline {
    /// Discards the in-flight opcodes and fetches two at `pc` (aligned to the
    /// width of `state`). Leaves `pc` on the second one.
    pub fn refill<F: Fetch>(&mut self, bus: &mut F, pc: &mut u32, state: CpuState) {
        let width = state.width();
        let target = *pc & !(width - 1);

        self.slots[0] = fetch(bus, target, state, Access::NonSequential);
        self.slots[1] = fetch(bus, target.wrapping_add(width), state, Access::Sequential);
        self.len = 2;

        *pc = target.wrapping_add(width);
    }

    /// Cold start: fetches three opcodes at `pc` so that the next fetch lands
    /// one width past the last one fetched.
    ///
    /// `pc` is left one width past the origin, the same as after
    /// [`Pipeline::refill`]. The origin plus three widths is the fetch address,
    /// see [`Pipeline::next_fetch_address`].
    pub fn fill<F: Fetch>(&mut self, bus: &mut F, pc: &mut u32, state: CpuState) {
        self.refill(bus, pc, state);

        let width = state.width();
        self.slots[2] = fetch(bus, pc.wrapping_add(width), state, Access::Sequential);
        self.len = 3;
    }

    /// Advances `pc` by one width, tops the queue up and returns the opcode
    /// to execute. Afterwards `pc` is two widths past that opcode's address.
    pub fn step<F: Fetch>(
        &mut self,
        bus: &mut F,
        pc: &mut u32,
        state: CpuState,
        access: Access,
    ) -> u32 {
        *pc = pc.wrapping_add(state.width());

        if self.len < 3 {
            self.slots[self.len] = fetch(bus, *pc, state, access);
            self.len += 1;
        }

        let head = self.slots[0];
        self.slots.rotate_left(1);
        self.len -= 1;

        head
    }

    /// Opcode that will execute on the next [`Pipeline::step`].
    #[must_use]
    pub const fn head(&self) -> u32 {
        self.slots[0]
    }

    /// Address the next bus fetch will read.
    #[must_use]
    pub const fn next_fetch_address(&self, pc: u32, state: CpuState) -> u32 {
        pc.wrapping_add(state.width() * (self.len as u32 - 1))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}
