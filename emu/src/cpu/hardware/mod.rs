pub mod bios;
#[allow(clippy::cast_possible_truncation)]
pub mod dma;
pub mod gamepak;
pub mod internal_memory;
pub mod interrupt_control;
pub mod keypad;
pub mod prefetch;
#[allow(clippy::cast_possible_truncation)]
pub mod serial;
#[allow(clippy::cast_possible_truncation)]
pub mod timers;
pub mod waitstate;
