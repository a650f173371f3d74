use serde::{Deserialize, Serialize};

/// Format 4 operations, bits 9-6.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Lsl = 0x2,
    Lsr = 0x3,
    Asr = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Ror = 0x7,
    Tst = 0x8,
    Neg = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mul = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl From<u32> for ThumbModeAluInstruction {
    fn from(alu_op_code: u32) -> Self {
        use ThumbModeAluInstruction::*;
        match alu_op_code {
            0x0 => And,
            0x1 => Eor,
            0x2 => Lsl,
            0x3 => Lsr,
            0x4 => Asr,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Ror,
            0x8 => Tst,
            0x9 => Neg,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mul,
            0xE => Bic,
            0xF => Mvn,
            _ => unreachable!("thumb alu opcode out of range: {alu_op_code}"),
        }
    }
}

impl std::fmt::Display for ThumbModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Lsl => "LSL",
            Self::Lsr => "LSR",
            Self::Asr => "ASR",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Ror => "ROR",
            Self::Tst => "TST",
            Self::Neg => "NEG",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mul => "MUL",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        })
    }
}

/// Format 5 operations, bits 9-8.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbHighRegisterOperation {
    Add,
    Cmp,
    Mov,
    Bx,
}

impl std::fmt::Display for ThumbHighRegisterOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mov => f.write_str("MOV"),
            Self::Cmp => f.write_str("CMP"),
            Self::Add => f.write_str("ADD"),
            Self::Bx => f.write_str("BX"),
        }
    }
}

impl From<u32> for ThumbHighRegisterOperation {
    fn from(op: u32) -> Self {
        match op {
            0 => Self::Add,
            1 => Self::Cmp,
            2 => Self::Mov,
            3 => Self::Bx,
            _ => unreachable!("hi register operation out of range: {op}"),
        }
    }
}

/// Format 3 operations, bits 12-11.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbImmediateOperation {
    Mov,
    Cmp,
    Add,
    Sub,
}

impl From<u32> for ThumbImmediateOperation {
    fn from(op: u32) -> Self {
        match op {
            0 => Self::Mov,
            1 => Self::Cmp,
            2 => Self::Add,
            3 => Self::Sub,
            _ => unreachable!("immediate operation out of range: {op}"),
        }
    }
}

impl std::fmt::Display for ThumbImmediateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mov => "MOV",
            Self::Cmp => "CMP",
            Self::Add => "ADD",
            Self::Sub => "SUB",
        })
    }
}

/// Format 8 operations (H and S bits, 11-10).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbSignExtendedOperation {
    Strh,
    Ldsb,
    Ldrh,
    Ldsh,
}

impl From<u32> for ThumbSignExtendedOperation {
    fn from(op: u32) -> Self {
        match op {
            0 => Self::Strh,
            1 => Self::Ldsb,
            2 => Self::Ldrh,
            3 => Self::Ldsh,
            _ => unreachable!("sign extended operation out of range: {op}"),
        }
    }
}

impl std::fmt::Display for ThumbSignExtendedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Strh => "STRH",
            Self::Ldsb => "LDSB",
            Self::Ldrh => "LDRH",
            Self::Ldsh => "LDSH",
        })
    }
}
