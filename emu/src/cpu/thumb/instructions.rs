//! # Thumb Instruction Decoding
//!
//! Thumb opcodes are classified through a flat table of 1024 entries indexed
//! by bits 15-6 of the opcode. Those ten bits carry every format selector,
//! and the ALU/hi-register sub-operations too, so each entry already names
//! the exact handler.
//!
//! ## Thumb Instruction Formats
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Thumb Instruction Formats                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Format 1:  000 xx          Move shifted register                      │
//! │  Format 2:  00011           Add/subtract                               │
//! │  Format 3:  001 xx          Move/compare/add/subtract immediate        │
//! │  Format 4:  010000          ALU operations                             │
//! │  Format 5:  010001          Hi register operations / BX                │
//! │  Format 6:  01001           PC-relative load                           │
//! │  Format 7:  0101 xx0        Load/store with register offset            │
//! │  Format 8:  0101 xx1        Load/store sign-extended byte/halfword     │
//! │  Format 9:  011 xx          Load/store with immediate offset           │
//! │  Format 10: 1000 x          Load/store halfword                        │
//! │  Format 11: 1001 x          SP-relative load/store                     │
//! │  Format 12: 1010 x          Load address                               │
//! │  Format 13: 10110000        Add offset to stack pointer                │
//! │  Format 14: 1011 x10x       Push/pop registers                         │
//! │  Format 15: 1100 x          Multiple load/store                        │
//! │  Format 16: 1101 xxxx       Conditional branch                         │
//! │  Format 17: 11011111        Software interrupt                         │
//! │  Format 18: 11100           Unconditional branch                       │
//! │  Format 19: 1111 x          Long branch with link                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Formats are tested from the most specific pattern to the least specific
//! one (SWI before the conditional branch it overlaps, add/subtract before
//! the shift format that contains it).
//!
//! ## Long Branch (BL)
//!
//! The BL instruction spans ±4MB but requires two 16-bit instructions:
//!
//! ```text
//! First:  1111 0xxx xxxx xxxx  ; LR = PC + (offset_hi << 12)
//! Second: 1111 1xxx xxxx xxxx  ; PC = LR + (offset_lo << 1), LR = old_PC | 1
//! ```

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::cpu::flags::LoadStoreKind;
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
    ThumbSignExtendedOperation,
};

/// Number of entries in the Thumb dispatch table.
pub const TABLE_SIZE: usize = 1024;

#[must_use]
pub const fn table_index(op_code: u32) -> usize {
    ((op_code >> 6) & 0x3FF) as usize
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbInstruction {
    MoveShiftedRegister,
    AddSubtract,
    Immediate(ThumbImmediateOperation),
    Alu(ThumbModeAluInstruction),
    HiRegister(ThumbHighRegisterOperation),
    PcRelativeLoad,
    RegisterOffset,
    SignExtended(ThumbSignExtendedOperation),
    ImmediateOffset,
    Halfword,
    SpRelative,
    LoadAddress,
    SpOffset,
    PushPop(LoadStoreKind),
    MultipleLoadStore(LoadStoreKind),
    ConditionalBranch,
    SoftwareInterrupt,
    UnconditionalBranch,
    /// `low` is set on the second half, which performs the jump.
    LongBranchLink { low: bool },
    Undefined,
}

impl ThumbInstruction {
    #[must_use]
    pub fn decode(index: usize) -> Self {
        let load = LoadStoreKind::from((index >> 5) & 1 == 1);

        if index & 0x3FC == 0x37C {
            Self::SoftwareInterrupt
        } else if index & 0x3D8 == 0x2D0 {
            Self::PushPop(load)
        } else if index & 0x3C0 == 0x300 {
            Self::MultipleLoadStore(load)
        } else if index & 0x3C0 == 0x340 {
            Self::ConditionalBranch
        } else if index & 0x3E0 == 0x380 {
            Self::UnconditionalBranch
        } else if index & 0x3C0 == 0x3C0 {
            Self::LongBranchLink {
                low: (index >> 5) & 1 == 1,
            }
        } else if index & 0x3F0 == 0x100 {
            Self::Alu(ThumbModeAluInstruction::from((index & 0xF) as u32))
        } else if index & 0x3F0 == 0x110 {
            Self::HiRegister(ThumbHighRegisterOperation::from(((index >> 2) & 3) as u32))
        } else if index & 0x3C8 == 0x148 {
            Self::SignExtended(ThumbSignExtendedOperation::from(((index >> 4) & 3) as u32))
        } else if index & 0x3E0 == 0x060 {
            Self::AddSubtract
        } else if index & 0x380 == 0x180 {
            Self::ImmediateOffset
        } else if index & 0x3C0 == 0x200 {
            Self::Halfword
        } else if index & 0x3E0 == 0x120 {
            Self::PcRelativeLoad
        } else if index & 0x3C8 == 0x140 {
            Self::RegisterOffset
        } else if index & 0x3C0 == 0x240 {
            Self::SpRelative
        } else if index & 0x3FC == 0x2C0 {
            Self::SpOffset
        } else if index & 0x3C0 == 0x280 {
            Self::LoadAddress
        } else if index & 0x380 == 0x080 {
            Self::Immediate(ThumbImmediateOperation::from(((index >> 5) & 3) as u32))
        } else if index & 0x380 == 0x000 {
            Self::MoveShiftedRegister
        } else {
            Self::Undefined
        }
    }

    #[must_use]
    pub fn table() -> Vec<Self> {
        (0..TABLE_SIZE).map(Self::decode).collect()
    }
}

impl Display for ThumbInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MoveShiftedRegister => f.write_str("LSL/LSR/ASR #imm"),
            Self::AddSubtract => f.write_str("ADD/SUB"),
            Self::Immediate(op) => write!(f, "{op} #imm"),
            Self::Alu(op) => write!(f, "{op}"),
            Self::HiRegister(op) => write!(f, "{op} (hi)"),
            Self::PcRelativeLoad => f.write_str("LDR [PC]"),
            Self::RegisterOffset => f.write_str("LDR/STR [Rb, Ro]"),
            Self::SignExtended(op) => write!(f, "{op}"),
            Self::ImmediateOffset => f.write_str("LDR/STR [Rb, #imm]"),
            Self::Halfword => f.write_str("LDRH/STRH [Rb, #imm]"),
            Self::SpRelative => f.write_str("LDR/STR [SP]"),
            Self::LoadAddress => f.write_str("ADD Rd, PC/SP"),
            Self::SpOffset => f.write_str("ADD SP"),
            Self::PushPop(LoadStoreKind::Store) => f.write_str("PUSH"),
            Self::PushPop(LoadStoreKind::Load) => f.write_str("POP"),
            Self::MultipleLoadStore(LoadStoreKind::Store) => f.write_str("STMIA"),
            Self::MultipleLoadStore(LoadStoreKind::Load) => f.write_str("LDMIA"),
            Self::ConditionalBranch => f.write_str("B<cond>"),
            Self::SoftwareInterrupt => f.write_str("SWI"),
            Self::UnconditionalBranch => f.write_str("B"),
            Self::LongBranchLink { low: false } => f.write_str("BL (high)"),
            Self::LongBranchLink { low: true } => f.write_str("BL (low)"),
            Self::Undefined => f.write_str("UND"),
        }
    }
}
