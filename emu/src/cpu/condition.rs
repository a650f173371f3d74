//! # Conditional Execution
//!
//! Every ARM instruction carries a condition in bits 31-28. Thumb only has
//! one for the conditional branch (bits 11-8). Both use the same table:
//!
//! ```text
//! ┌──────┬────┬──────────────────────┬──────────────┐
//! │ Code │    │ Meaning              │ Flags        │
//! ├──────┼────┼──────────────────────┼──────────────┤
//! │ 0000 │ EQ │ equal                │ Z=1          │
//! │ 0001 │ NE │ not equal            │ Z=0          │
//! │ 0010 │ CS │ unsigned >=          │ C=1          │
//! │ 0011 │ CC │ unsigned <           │ C=0          │
//! │ 0100 │ MI │ negative             │ N=1          │
//! │ 0101 │ PL │ positive or zero     │ N=0          │
//! │ 0110 │ VS │ overflow             │ V=1          │
//! │ 0111 │ VC │ no overflow          │ V=0          │
//! │ 1000 │ HI │ unsigned >           │ C=1 and Z=0  │
//! │ 1001 │ LS │ unsigned <=          │ C=0 or Z=1   │
//! │ 1010 │ GE │ signed >=            │ N=V          │
//! │ 1011 │ LT │ signed <             │ N!=V         │
//! │ 1100 │ GT │ signed >             │ Z=0 and N=V  │
//! │ 1101 │ LE │ signed <=            │ Z=1 or N!=V  │
//! │ 1110 │ AL │ always               │              │
//! │ 1111 │ NV │ never                │              │
//! └──────┴────┴──────────────────────┴──────────────┘
//! ```
//!
//! [`ConditionTable`] precomputes all 16 conditions against all 16 flag
//! combinations so the hot path is a single lookup.

use serde::{Deserialize, Serialize};

use crate::cpu::psr::Psr;

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum Condition {
    EQ = 0x0,
    NE = 0x1,
    CS = 0x2,
    CC = 0x3,
    MI = 0x4,
    PL = 0x5,
    VS = 0x6,
    VC = 0x7,
    HI = 0x8,
    LS = 0x9,
    GE = 0xA,
    LT = 0xB,
    GT = 0xC,
    LE = 0xD,
    AL = 0xE,
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(item: u8) -> Self {
        match item {
            0x0 => Self::EQ,
            0x1 => Self::NE,
            0x2 => Self::CS,
            0x3 => Self::CC,
            0x4 => Self::MI,
            0x5 => Self::PL,
            0x6 => Self::VS,
            0x7 => Self::VC,
            0x8 => Self::HI,
            0x9 => Self::LS,
            0xA => Self::GE,
            0xB => Self::LT,
            0xC => Self::GT,
            0xD => Self::LE,
            0xE => Self::AL,
            0xF => Self::NV,
            _ => unreachable!("condition code out of range: {item:#X}"),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EQ => f.write_str("EQ"),
            Self::NE => f.write_str("NE"),
            Self::CS => f.write_str("CS"),
            Self::CC => f.write_str("CC"),
            Self::MI => f.write_str("MI"),
            Self::PL => f.write_str("PL"),
            Self::VS => f.write_str("VS"),
            Self::VC => f.write_str("VC"),
            Self::HI => f.write_str("HI"),
            Self::LS => f.write_str("LS"),
            Self::GE => f.write_str("GE"),
            Self::LT => f.write_str("LT"),
            Self::GT => f.write_str("GT"),
            Self::LE => f.write_str("LE"),
            Self::AL => Ok(()),
            Self::NV => f.write_str("NV"),
        }
    }
}

/// Condition x NZCV lookup, indexed by `condition << 4 | cpsr >> 28`.
pub struct ConditionTable([bool; 256]);

impl Default for ConditionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionTable {
    #[must_use]
    pub fn new() -> Self {
        let mut table = [false; 256];
        for (index, entry) in table.iter_mut().enumerate() {
            let flags = Psr::new((index as u32 & 0xF) << 28);
            *entry = flags.can_execute(Condition::from((index >> 4) as u8));
        }
        Self(table)
    }

    /// `condition` is the raw 4-bit field.
    #[must_use]
    pub fn passes(&self, condition: u32, cpsr: Psr) -> bool {
        self.0[(((condition & 0xF) << 4) | (u32::from(cpsr) >> 28)) as usize]
    }
}
