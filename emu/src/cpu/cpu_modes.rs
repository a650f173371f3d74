//! # CPU Operating Modes
//!
//! ```text
//! ┌────────────┬───────┬──────────────────────┐
//! │ Mode       │ Bits  │ Banked registers     │
//! ├────────────┼───────┼──────────────────────┤
//! │ User       │ 10000 │ (none)               │
//! │ FIQ        │ 10001 │ R8-R14, SPSR_fiq     │
//! │ IRQ        │ 10010 │ R13-R14, SPSR_irq    │
//! │ Supervisor │ 10011 │ R13-R14, SPSR_svc    │
//! │ Abort      │ 10111 │ R13-R14, SPSR_abt    │
//! │ Undefined  │ 11011 │ R13-R14, SPSR_und    │
//! │ System     │ 11111 │ shares User's set    │
//! └────────────┴───────┴──────────────────────┘
//! ```

use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// The normal ARM program execution state.
    User = 0b10000,

    /// Fast interrupt, with its own R8-R14.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Protected mode for the operating system, entered by SWI.
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed.
    Undefined = 0b11011,

    /// A privileged mode sharing the User registers.
    System = 0b11111,
}

impl Mode {
    pub const ALL: [Self; 7] = [
        Self::User,
        Self::Fiq,
        Self::Irq,
        Self::Supervisor,
        Self::Abort,
        Self::Undefined,
        Self::System,
    ];

    /// User and System have no SPSR and share the same registers.
    #[must_use]
    pub const fn is_user_bank(self) -> bool {
        matches!(self, Self::User | Self::System)
    }

    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(format!("unexpected value for Mode: 0b{n:05b}")),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "usr",
            Self::Fiq => "fiq",
            Self::Irq => "irq",
            Self::Supervisor => "svc",
            Self::Abort => "abt",
            Self::Undefined => "und",
            Self::System => "sys",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_round_trip() {
        for mode in Mode::ALL {
            assert_eq!(Mode::try_from(u32::from(mode)), Ok(mode));
        }
    }

    #[test]
    fn check_invalid() {
        assert!(Mode::try_from(0).is_err());
        assert!(Mode::try_from(0b10100).is_err());
    }
}
