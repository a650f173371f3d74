//! # ARM7TDMI Register File
//!
//! The 16 general-purpose registers visible in the current mode.
//!
//! - **R0-R12**: general purpose
//! - **R13 (SP)**: stack pointer by convention
//! - **R14 (LR)**: link register
//! - **R15 (PC)**: program counter, two instructions ahead of the one executing
//!
//! This is plain storage. Writes to R15 that come from instructions go through
//! `Arm7tdmi::write_register`, which refills the pipeline.

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 0xD;

/// Link Register index (return address for subroutines).
pub const REG_LR: usize = 0xE;

/// Program Counter register index.
pub const REG_PROGRAM_COUNTER: usize = 0xF;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PROGRAM_COUNTER]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PROGRAM_COUNTER] = new_value;
    }

    pub const fn program_counter_mut(&mut self) -> &mut u32 {
        &mut self.0[REG_PROGRAM_COUNTER]
    }

    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.0[reg] = new_value;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg]
    }

    #[must_use]
    pub const fn as_array(&self) -> &[u32; 16] {
        &self.0
    }

    pub(crate) const fn as_array_mut(&mut self) -> &mut [u32; 16] {
        &mut self.0
    }
}
