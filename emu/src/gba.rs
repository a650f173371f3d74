use crate::{
    bus::Bus,
    cartridge_header::{CartridgeHeader, LoadError},
    cpu::{
        arm7tdmi::{Arm7tdmi, BootMode},
        hardware::{bios::Bios, gamepak::Rom},
    },
};

/// Cycles in one video frame: 228 lines of 1232 cycles.
pub const CYCLES_PER_FRAME: u64 = 280_896;

pub struct Gba {
    pub cpu: Arm7tdmi,

    pub cartridge_header: CartridgeHeader,
}

impl Gba {
    /// Validates both images before anything runs.
    ///
    /// # Errors
    ///
    /// A BIOS that is not 16 `KBytes` or a ROM with a bad header.
    pub fn new(bios: Vec<u8>, rom: Vec<u8>, boot_mode: BootMode) -> Result<Self, LoadError> {
        let cartridge_header = CartridgeHeader::new(&rom)?;
        let bios = Bios::new(bios)?;
        tracing::info!(
            "loaded \"{}\" ({}), {} bytes",
            cartridge_header.game_title(),
            cartridge_header.game_code(),
            rom.len()
        );

        let bus = Bus::new(bios, Rom::new(rom));
        let cpu = Arm7tdmi::new(bus, boot_mode);

        Ok(Self {
            cpu,
            cartridge_header,
        })
    }

    pub fn step(&mut self) {
        self.cpu.step();
    }

    /// Steps until a frame worth of cycles has elapsed. The last instruction
    /// may overshoot the frame boundary.
    pub fn run_frame(&mut self) {
        let end = self.cycles() + CYCLES_PER_FRAME;
        while self.cycles() < end {
            self.cpu.step();
        }
    }

    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cpu.bus.cycles()
    }
}
