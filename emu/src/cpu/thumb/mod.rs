//! # Thumb Instruction Set (16-bit)
//!
//! A compressed subset of the ARM instructions. Only the conditional branch
//! is conditional, most operations reach R0-R7 only and every data
//! processing operation sets the flags.
//!
//! - [`instructions`] - Decoding table
//! - [`operations`] - Execution
//! - [`alu_instructions`] - Sub-operation fields of formats 3, 4, 5 and 8

pub mod alu_instructions;

#[allow(clippy::cast_possible_truncation)]
pub mod instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::missing_panics_doc)]
pub mod operations;
