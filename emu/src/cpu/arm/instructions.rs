//! # ARM Instruction Decoding
//!
//! ARM opcodes are classified through a flat table of 4096 entries built once
//! when the CPU is constructed. The table index packs the two bit ranges that
//! tell instruction categories apart:
//!
//! ```text
//!  opcode  31  28 27            20 19        8 7     4 3    0
//!         ┌──────┬────────────────┬───────────┬───────┬──────┐
//!         │ cond │  bits 27-20    │           │ 7-4   │      │
//!         └──────┴───────┬────────┴───────────┴───┬───┴──────┘
//!                        │                        │
//!  index                 ▼                        ▼
//!         ┌────────────────────────────┬────────────────┐
//!         │        index 11-4          │   index 3-0    │
//!         └────────────────────────────┴────────────────┘
//! ```
//!
//! The condition field is never part of the index; it is evaluated
//! separately before dispatch.
//!
//! ## Decoding Priority
//!
//! Several encodings overlap (a multiply is a data-processing pattern with
//! bits 7-4 = 1001), so the rules below are tried in order and the first
//! match wins:
//!
//! | # | Mask    | Value           | Category                       |
//! |---|---------|-----------------|--------------------------------|
//! | 1 | `0xF00` | `0xF00`         | SWI                            |
//! | 2 | `0xFFF` | `0x121`         | BX                             |
//! | 3 | `0xE00` | `0xA00`         | B, BL                          |
//! | 4 | `0xFCF` | `0x009`         | MUL, MLA                       |
//! | 5 | `0xF8F` | `0x089`         | UMULL, UMLAL, SMULL, SMLAL     |
//! | 6 | `0xFBF` | `0x109`         | SWP, SWPB                      |
//! | 7 | `0xE10` | `0x810`         | LDM                            |
//! | 8 | `0xE10` | `0x800`         | STM                            |
//! | 9 | `0xE09` | `0x009`         | LDRH, STRH, LDRSB, LDRSH       |
//! | - | `0xE01` | `0x601`         | Undefined (register offset with bit 4 set) |
//! |10 | `0xC10` | `0x410`         | LDR, LDRB                      |
//! |11 | `0xC10` | `0x400`         | STR, STRB                      |
//! |12 | `0xFBF` | `0x100`         | MRS                            |
//! |13 | `0xFBF` / `0xFB0` | `0x120` / `0x320` | MSR (register / immediate) |
//! |14 | `0xC00` | `0x000`         | Data processing                |
//! |15 | -       | -               | Undefined (coprocessor space)  |

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::cpu::flags::LoadStoreKind;

/// Number of entries in the ARM dispatch table.
pub const TABLE_SIZE: usize = 4096;

/// Projects an opcode onto its dispatch table index: bits 27-20 followed by bits 7-4.
#[must_use]
pub const fn table_index(op_code: u32) -> usize {
    (((op_code >> 16) & 0xFF0) | ((op_code >> 4) & 0xF)) as usize
}

/// The 16 data-processing operations, bits 24-21 of the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOpcode {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl AluOpcode {
    /// TST, TEQ, CMP and CMN only update flags.
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }

    /// Operations whose C flag comes from the barrel shifter rather than the adder.
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(
            self,
            Self::And
                | Self::Eor
                | Self::Tst
                | Self::Teq
                | Self::Orr
                | Self::Mov
                | Self::Bic
                | Self::Mvn
        )
    }
}

impl From<u32> for AluOpcode {
    fn from(alu_op_code: u32) -> Self {
        match alu_op_code {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Sub,
            0x3 => Self::Rsb,
            0x4 => Self::Add,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Rsc,
            0x8 => Self::Tst,
            0x9 => Self::Teq,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mov,
            0xE => Self::Bic,
            0xF => Self::Mvn,
            _ => unreachable!("data processing opcode out of range: {alu_op_code}"),
        }
    }
}

impl Display for AluOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Sub => "SUB",
            Self::Rsb => "RSB",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Rsc => "RSC",
            Self::Tst => "TST",
            Self::Teq => "TEQ",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mov => "MOV",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        })
    }
}

/// Category of an ARM opcode, as stored in the dispatch table.
///
/// | Variant                | Example Instructions       |
/// |------------------------|----------------------------|
/// | `DataProcessing`       | AND, ADD, CMP, MOV         |
/// | `PsrRead`              | MRS                        |
/// | `PsrWrite`             | MSR                        |
/// | `Multiply`             | MUL, MLA                   |
/// | `MultiplyLong`         | UMULL, SMLAL               |
/// | `SingleDataSwap`       | SWP, SWPB                  |
/// | `BranchAndExchange`    | BX                         |
/// | `HalfwordDataTransfer` | LDRH, STRH, LDRSB, LDRSH   |
/// | `SingleDataTransfer`   | LDR, STR, LDRB, STRB       |
/// | `BlockDataTransfer`    | LDM, STM                   |
/// | `Branch`               | B, BL                      |
/// | `SoftwareInterrupt`    | SWI                        |
/// | `Undefined`            | coprocessor space          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmInstruction {
    DataProcessing(AluOpcode),
    PsrRead,
    PsrWrite,
    Multiply,
    MultiplyLong { signed: bool },
    SingleDataSwap,
    BranchAndExchange,
    HalfwordDataTransfer(LoadStoreKind),
    SingleDataTransfer(LoadStoreKind),
    BlockDataTransfer(LoadStoreKind),
    Branch { link: bool },
    SoftwareInterrupt,
    Undefined,
}

impl ArmInstruction {
    /// Classifies a table index. Pure, so the table can be rebuilt at will.
    #[must_use]
    pub fn decode(index: usize) -> Self {
        let load = LoadStoreKind::from((index >> 4) & 1 == 1);

        if index & 0xF00 == 0xF00 {
            Self::SoftwareInterrupt
        } else if index == 0x121 {
            Self::BranchAndExchange
        } else if index & 0xE00 == 0xA00 {
            Self::Branch {
                link: (index >> 8) & 1 == 1,
            }
        } else if index & 0xFCF == 0x009 {
            Self::Multiply
        } else if index & 0xF8F == 0x089 {
            Self::MultiplyLong {
                signed: (index >> 6) & 1 == 1,
            }
        } else if index & 0xFBF == 0x109 {
            Self::SingleDataSwap
        } else if index & 0xE00 == 0x800 {
            Self::BlockDataTransfer(load)
        } else if index & 0xE09 == 0x009 {
            Self::HalfwordDataTransfer(load)
        } else if index & 0xE01 == 0x601 {
            Self::Undefined
        } else if index & 0xC00 == 0x400 {
            Self::SingleDataTransfer(load)
        } else if index & 0xFBF == 0x100 {
            Self::PsrRead
        } else if index & 0xFBF == 0x120 || index & 0xFB0 == 0x320 {
            Self::PsrWrite
        } else if index & 0xC00 == 0 {
            Self::DataProcessing(AluOpcode::from(((index >> 5) & 0xF) as u32))
        } else {
            Self::Undefined
        }
    }

    /// The full dispatch table, one entry per index.
    #[must_use]
    pub fn table() -> Vec<Self> {
        (0..TABLE_SIZE).map(Self::decode).collect()
    }
}

impl Display for ArmInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataProcessing(opcode) => write!(f, "{opcode}"),
            Self::PsrRead => f.write_str("MRS"),
            Self::PsrWrite => f.write_str("MSR"),
            Self::Multiply => f.write_str("MUL/MLA"),
            Self::MultiplyLong { signed: false } => f.write_str("UMULL/UMLAL"),
            Self::MultiplyLong { signed: true } => f.write_str("SMULL/SMLAL"),
            Self::SingleDataSwap => f.write_str("SWP"),
            Self::BranchAndExchange => f.write_str("BX"),
            Self::HalfwordDataTransfer(LoadStoreKind::Load) => f.write_str("LDRH/LDRSB/LDRSH"),
            Self::HalfwordDataTransfer(LoadStoreKind::Store) => f.write_str("STRH"),
            Self::SingleDataTransfer(LoadStoreKind::Load) => f.write_str("LDR"),
            Self::SingleDataTransfer(LoadStoreKind::Store) => f.write_str("STR"),
            Self::BlockDataTransfer(LoadStoreKind::Load) => f.write_str("LDM"),
            Self::BlockDataTransfer(LoadStoreKind::Store) => f.write_str("STM"),
            Self::Branch { link: false } => f.write_str("B"),
            Self::Branch { link: true } => f.write_str("BL"),
            Self::SoftwareInterrupt => f.write_str("SWI"),
            Self::Undefined => f.write_str("UND"),
        }
    }
}
