use std::{env, error, fs, io, path::PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use emu::{cpu::arm7tdmi::BootMode, gba::Gba};

const USAGE: &str = "usage: tangerine <bios> <rom> [--skip-bios] [--frames N] [--log <path>]";

struct Args {
    bios: PathBuf,
    rom: PathBuf,
    boot_mode: BootMode,
    frames: Option<u64>,
    log: Option<PathBuf>,
}

fn parse_args() -> Result<Args, Box<dyn error::Error>> {
    let mut positional = Vec::new();
    let mut boot_mode = BootMode::Bios;
    let mut frames = None;
    let mut log = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--skip-bios" => boot_mode = BootMode::Direct,
            "--frames" => {
                let value = args.next().ok_or("--frames needs a value")?;
                frames = Some(value.parse()?);
            }
            "--log" => log = Some(PathBuf::from(args.next().ok_or("--log needs a path")?)),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(bios), Some(rom), None) => Ok(Args {
            bios,
            rom,
            boot_mode,
            frames,
            log,
        }),
        _ => Err(USAGE.into()),
    }
}

/// The returned guard flushes buffered lines when dropped.
fn init_logging(log: Option<&PathBuf>) -> Result<WorkerGuard, Box<dyn error::Error>> {
    let (writer, guard) = match log {
        Some(path) => tracing_appender::non_blocking(fs::File::create(path)?),
        None => tracing_appender::non_blocking(io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log.is_none())
        .init();

    Ok(guard)
}

fn main() -> Result<(), Box<dyn error::Error>> {
    let args = parse_args()?;
    let _guard = init_logging(args.log.as_ref())?;

    tracing::info!("tangerine v{}", env!("CARGO_PKG_VERSION"));
    let bios = fs::read(&args.bios)?;
    let rom = fs::read(&args.rom)?;
    let mut gba = Gba::new(bios, rom, args.boot_mode)?;

    match args.frames {
        Some(frames) => {
            for _ in 0..frames {
                gba.run_frame();
            }
            tracing::info!(
                "ran {frames} frames, {} cycles, pc {:#010X}",
                gba.cycles(),
                gba.cpu.registers.program_counter()
            );
        }
        None => loop {
            gba.run_frame();
        },
    }

    Ok(())
}
