#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
pub mod alu;
pub mod arm;

#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::module_name_repetitions)]
pub mod arm7tdmi;
pub mod condition;
pub mod cpu_modes;

#[allow(clippy::cast_possible_truncation)]
pub mod flags;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod pipeline;
pub mod psr;
pub mod register_bank;
pub mod registers;
pub mod thumb;
