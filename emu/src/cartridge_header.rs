use std::error::Error;
use std::fmt::Display;

use crate::cpu::hardware::gamepak::MAX_ROM_SIZE;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 0xC0;

/// Boot images that cannot start a system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    BiosSize { expected: usize, found: usize },
    RomTooSmall(usize),
    RomTooLarge(usize),
    HeaderChecksum { expected: u8, computed: u8 },
    /// The byte at 0xB2 must be 0x96.
    FixedValue(u8),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BiosSize { expected, found } => {
                write!(f, "BIOS must be {expected} bytes, found {found}")
            }
            Self::RomTooSmall(len) => {
                write!(f, "ROM of {len} bytes cannot hold a {HEADER_SIZE} byte header")
            }
            Self::RomTooLarge(len) => {
                write!(f, "ROM of {len} bytes exceeds the {MAX_ROM_SIZE} byte address space")
            }
            Self::HeaderChecksum { expected, computed } => write!(
                f,
                "header checksum mismatch: expected {expected:#04X} but got {computed:#04X}"
            ),
            Self::FixedValue(value) => write!(f, "wrong fixed value {value:#04X}, expected 0x96"),
        }
    }
}

impl Error for LoadError {}

/// Contains the information of the cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    rom_entry_point: u32,
    game_title: String,
    game_code: String,
    maker_code: String,
    main_unit_code: u8,
    device_type: u8,
    software_version: u8,
    complement_check: u8,
}

impl CartridgeHeader {
    pub fn new(data: &[u8]) -> Result<Self, LoadError> {
        execute_checks(data)?;

        Ok(Self {
            rom_entry_point: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            game_title: into_ascii_str(&data[0xA0..0xAC]),
            game_code: into_ascii_str(&data[0xAC..0xB0]),
            maker_code: into_ascii_str(&data[0xB0..0xB2]),
            main_unit_code: data[0xB3],
            device_type: data[0xB4],
            software_version: data[0xBC],
            complement_check: data[0xBD],
        })
    }

    /// 32bit ARM branch opcode
    #[must_use]
    pub const fn rom_entry_point(&self) -> u32 {
        self.rom_entry_point
    }

    #[must_use]
    pub fn game_title(&self) -> &str {
        self.game_title.as_str()
    }

    #[must_use]
    pub fn game_code(&self) -> &str {
        self.game_code.as_str()
    }

    #[must_use]
    pub fn maker_code(&self) -> &str {
        self.maker_code.as_str()
    }

    /// 00h for current GBA models
    #[must_use]
    pub const fn main_unit_code(&self) -> u8 {
        self.main_unit_code
    }

    /// Usually 0x00
    #[must_use]
    pub const fn device_type(&self) -> u8 {
        self.device_type
    }

    /// Usually 0x00
    #[must_use]
    pub const fn software_version(&self) -> u8 {
        self.software_version
    }

    #[must_use]
    pub const fn complement_check(&self) -> u8 {
        self.complement_check
    }
}

/// Complement check over 0xA0..=0xBC.
#[must_use]
pub fn header_checksum(data: &[u8]) -> u8 {
    data[0xA0..0xBD]
        .iter()
        .fold(0u8, |acc, &item| acc.wrapping_sub(item))
        .wrapping_sub(0x19)
}

fn execute_checks(data: &[u8]) -> Result<(), LoadError> {
    if data.len() < HEADER_SIZE {
        return Err(LoadError::RomTooSmall(data.len()));
    }
    if data.len() > MAX_ROM_SIZE {
        return Err(LoadError::RomTooLarge(data.len()));
    }

    if data[0xB2] != 0x96 {
        return Err(LoadError::FixedValue(data[0xB2]));
    }

    let expected = data[0xBD];
    let computed = header_checksum(data);
    if computed != expected {
        return Err(LoadError::HeaderChecksum { expected, computed });
    }

    Ok(())
}

fn into_ascii_str(data: &[u8]) -> String {
    data.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
        .collect()
}
