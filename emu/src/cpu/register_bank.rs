//! # Banked Registers for Exception Modes
//!
//! Storage for registers that are not live in the current mode.
//! See [`cpu_modes`](super::cpu_modes) for the banking table.
//!
//! - User and System share R8-R14, kept in `user` while another mode is live.
//! - FIQ owns R8-R14 (`fiq`) and one SPSR.
//! - IRQ, Supervisor, Abort and Undefined own R13-R14 and one SPSR each. They
//!   use the User R8-R12.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    /// R8-R14 of User/System mode.
    pub user: [u32; 7],
    /// R8-R14 of FIQ mode.
    pub fiq: [u32; 7],

    /// R13 (SP) for Supervisor mode (SWI handler stack).
    pub r13_svc: u32,
    /// R14 (LR) for Supervisor mode.
    pub r14_svc: u32,
    pub r13_abt: u32,
    pub r14_abt: u32,
    /// R13 (SP) for IRQ mode (interrupt handler stack).
    pub r13_irq: u32,
    /// R14 (LR) for IRQ mode (return address from interrupt).
    pub r14_irq: u32,
    pub r13_und: u32,
    pub r14_und: u32,

    pub spsr_fiq: Psr,
    pub spsr_svc: Psr,
    pub spsr_abt: Psr,
    pub spsr_irq: Psr,
    pub spsr_und: Psr,
}

impl RegisterBank {
    /// SP and LR slots of a mode that banks exactly those two registers.
    pub(crate) const fn stack_and_link_mut(&mut self, mode: Mode) -> Option<(&mut u32, &mut u32)> {
        match mode {
            Mode::Supervisor => Some((&mut self.r13_svc, &mut self.r14_svc)),
            Mode::Abort => Some((&mut self.r13_abt, &mut self.r14_abt)),
            Mode::Irq => Some((&mut self.r13_irq, &mut self.r14_irq)),
            Mode::Undefined => Some((&mut self.r13_und, &mut self.r14_und)),
            Mode::User | Mode::System | Mode::Fiq => None,
        }
    }

    /// Stored SPSR of `mode`. User and System have none.
    #[must_use]
    pub const fn spsr(&self, mode: Mode) -> Option<Psr> {
        match mode {
            Mode::Fiq => Some(self.spsr_fiq),
            Mode::Supervisor => Some(self.spsr_svc),
            Mode::Abort => Some(self.spsr_abt),
            Mode::Irq => Some(self.spsr_irq),
            Mode::Undefined => Some(self.spsr_und),
            Mode::User | Mode::System => None,
        }
    }

    pub const fn spsr_mut(&mut self, mode: Mode) -> Option<&mut Psr> {
        match mode {
            Mode::Fiq => Some(&mut self.spsr_fiq),
            Mode::Supervisor => Some(&mut self.spsr_svc),
            Mode::Abort => Some(&mut self.spsr_abt),
            Mode::Irq => Some(&mut self.spsr_irq),
            Mode::Undefined => Some(&mut self.spsr_und),
            Mode::User | Mode::System => None,
        }
    }
}
