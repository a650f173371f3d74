//! Single-bit and small fields shared by the ARM and Thumb encodings.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Transfer size of LDR/STR style instructions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadWriteKind {
    #[default]
    Word,
    Byte,
}

impl From<bool> for ReadWriteKind {
    fn from(value: bool) -> Self {
        if value { Self::Byte } else { Self::Word }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStoreKind {
    Store,
    Load,
}

impl From<bool> for LoadStoreKind {
    fn from(b: bool) -> Self {
        if b { Self::Load } else { Self::Store }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indexing {
    /// Add offset after transfer.
    Post,

    /// Add offset before transfer.
    Pre,
}

impl From<bool> for Indexing {
    fn from(state: bool) -> Self {
        if state { Self::Pre } else { Self::Post }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offsetting {
    /// Subtract the offset from base.
    Down,

    /// Add the offset to base.
    Up,
}

impl From<bool> for Offsetting {
    fn from(state: bool) -> Self {
        if state { Self::Up } else { Self::Down }
    }
}

impl Offsetting {
    #[must_use]
    pub const fn apply(self, base: u32, offset: u32) -> u32 {
        match self {
            Self::Up => base.wrapping_add(offset),
            Self::Down => base.wrapping_sub(offset),
        }
    }
}

/// Barrel shifter operation, bits 6-5 of an ARM shifted operand.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ShiftKind {
    Lsl = 0,
    Lsr = 1,
    Asr = 2,
    Ror = 3,
}

impl From<u32> for ShiftKind {
    fn from(op_code: u32) -> Self {
        match op_code {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            3 => Self::Ror,
            _ => unreachable!("shift type out of range: {op_code}"),
        }
    }
}

impl Display for ShiftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lsl => "LSL",
            Self::Lsr => "LSR",
            Self::Asr => "ASR",
            Self::Ror => "ROR",
        })
    }
}

/// The SH field of halfword and signed transfers (bits 6-5).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum HalfwordTransferKind {
    /// SH=00, only reachable where the multiply and swap rules do not claim
    /// the encoding. Behaves as an unsigned byte transfer.
    UnsignedByte,
    UnsignedHalfword,
    SignedByte,
    SignedHalfword,
}

impl From<u32> for HalfwordTransferKind {
    fn from(sh: u32) -> Self {
        match sh {
            0 => Self::UnsignedByte,
            1 => Self::UnsignedHalfword,
            2 => Self::SignedByte,
            3 => Self::SignedHalfword,
            _ => unreachable!("halfword transfer type out of range: {sh}"),
        }
    }
}
