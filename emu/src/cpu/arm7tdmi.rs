//! # ARM7TDMI Core
//!
//! One call to [`Arm7tdmi::step`] retires at most one instruction:
//!
//! 1. a pending, unmasked IRQ is taken at the step boundary;
//! 2. a halted CPU burns one idle cycle until an enabled interrupt arrives;
//! 3. the pipeline hands out the next opcode, which is dispatched through the
//!    ARM or Thumb table once its condition passes.
//!
//! Handlers live in [`arm::operations`](super::arm::operations) and
//! [`thumb::operations`](super::thumb::operations). Every write to R15 goes
//! through [`Arm7tdmi::write_register`] so the pipeline is refilled at the
//! new address.

use std::mem;

use crate::bus::{Access, Bus};
use crate::cpu::arm::instructions::{self as arm_instructions, ArmInstruction};
use crate::cpu::condition::ConditionTable;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::pipeline::Pipeline;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP, Registers};
use crate::cpu::thumb::instructions::{self as thumb_instructions, ThumbInstruction};

pub const SWI_VECTOR: u32 = 0x08;
pub const IRQ_VECTOR: u32 = 0x18;

/// Where execution starts after power on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Run the BIOS from its reset vector.
    Bios,
    /// Enter the cartridge with the state the BIOS leaves behind.
    Direct,
}

pub struct Arm7tdmi {
    pub registers: Registers,
    pub cpsr: Psr,
    /// SPSR of the current mode. Banked copies live in `register_bank`.
    pub spsr: Psr,
    pub register_bank: RegisterBank,
    pub bus: Bus,

    pipeline: Pipeline,
    /// Kind of the fetch issued by the next step. Data accesses break the
    /// sequential opcode stream.
    next_fetch_access: Access,
    arm_table: Vec<ArmInstruction>,
    thumb_table: Vec<ThumbInstruction>,
    pub(crate) conditions: ConditionTable,
}

impl Arm7tdmi {
    #[must_use]
    pub fn new(bus: Bus, boot_mode: BootMode) -> Self {
        let mut cpsr = Psr::from(Mode::System);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);

        let mut cpu = Self {
            registers: Registers::default(),
            cpsr,
            spsr: Psr::default(),
            register_bank: RegisterBank::default(),
            bus,
            pipeline: Pipeline::default(),
            next_fetch_access: Access::Sequential,
            arm_table: ArmInstruction::table(),
            thumb_table: ThumbInstruction::table(),
            conditions: ConditionTable::new(),
        };

        cpu.registers.set_register_at(REG_SP, 0x0300_7F00);
        cpu.register_bank.r13_irq = 0x0300_7FA0;
        cpu.register_bank.r13_svc = 0x0300_7FE0;

        match boot_mode {
            BootMode::Bios => cpu.registers.set_program_counter(0),
            BootMode::Direct => {
                cpu.registers.set_register_at(0, 0x0800_0000);
                cpu.registers.set_register_at(1, 0xEA);
                cpu.registers.set_program_counter(0x0800_0000);
                cpu.bus.interrupt_control.post_boot_flag = 1;
            }
        }

        cpu.pipeline.fill(
            &mut cpu.bus,
            cpu.registers.program_counter_mut(),
            cpu.cpsr.cpu_state(),
        );
        cpu
    }

    pub fn step(&mut self) {
        if self.bus.interrupt_control.is_halted() {
            if self.bus.interrupt_control.has_enabled_request() {
                self.bus.interrupt_control.wake();
            } else {
                self.bus.idle();
                return;
            }
        }

        self.handle_interrupts();

        let access = mem::replace(&mut self.next_fetch_access, Access::Sequential);
        let state = self.cpsr.cpu_state();
        let op_code = self.pipeline.step(
            &mut self.bus,
            self.registers.program_counter_mut(),
            state,
            access,
        );
        let address = self
            .registers
            .program_counter()
            .wrapping_sub(2 * state.width());

        match state {
            CpuState::Arm => {
                if !self.conditions.passes(op_code >> 28, self.cpsr) {
                    tracing::trace!("{address:#010X}: {op_code:08X} skipped");
                    return;
                }
                let instruction = self.arm_table[arm_instructions::table_index(op_code)];
                tracing::trace!("{address:#010X}: {op_code:08X} {instruction}");
                if instruction == ArmInstruction::Undefined {
                    panic!("undefined ARM instruction {op_code:#010X} at {address:#010X}");
                }
                self.execute_arm(instruction, op_code);
            }
            CpuState::Thumb => {
                let instruction = self.thumb_table[thumb_instructions::table_index(op_code)];
                tracing::trace!("{address:#010X}: {op_code:04X} {instruction}");
                if instruction == ThumbInstruction::Undefined {
                    panic!("undefined Thumb instruction {op_code:#06X} at {address:#010X}");
                }
                self.execute_thumb(instruction, op_code as u16);
            }
        }
    }

    #[must_use]
    pub const fn read_register(&self, index: usize) -> u32 {
        self.registers.register_at(index)
    }

    /// Writing R15 refills the pipeline at the (aligned) new address.
    pub fn write_register(&mut self, index: usize, value: u32) {
        if index == REG_PROGRAM_COUNTER {
            self.registers.set_program_counter(value);
            self.refill();
        } else {
            self.registers.set_register_at(index, value);
        }
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub(crate) fn refill(&mut self) {
        self.pipeline.refill(
            &mut self.bus,
            self.registers.program_counter_mut(),
            self.cpsr.cpu_state(),
        );
    }

    /// The opcode fetched after the current instruction pays full access time.
    pub(crate) const fn break_sequence(&mut self) {
        self.next_fetch_access = Access::NonSequential;
    }

    /// Moves the live R8-R14 and SPSR into the bank of the current mode,
    /// loads those of `target` and updates the CPSR mode field.
    pub fn switch_mode(&mut self, target: Mode) {
        let current = self.cpsr.mode();
        if current == target {
            return;
        }
        tracing::debug!("mode switch {current} -> {target}");

        self.save_bank(current);
        self.load_bank(target);
        self.cpsr.set_mode(target);
    }

    fn save_bank(&mut self, mode: Mode) {
        let live = self.registers.as_array();
        let bank = &mut self.register_bank;

        match mode {
            Mode::User | Mode::System => bank.user.copy_from_slice(&live[8..15]),
            Mode::Fiq => {
                bank.fiq.copy_from_slice(&live[8..15]);
                bank.spsr_fiq = self.spsr;
            }
            _ => {
                bank.user[..5].copy_from_slice(&live[8..13]);
                if let Some((sp, lr)) = bank.stack_and_link_mut(mode) {
                    *sp = live[REG_SP];
                    *lr = live[REG_LR];
                }
                if let Some(spsr) = bank.spsr_mut(mode) {
                    *spsr = self.spsr;
                }
            }
        }
    }

    fn load_bank(&mut self, mode: Mode) {
        let live = self.registers.as_array_mut();
        let bank = &mut self.register_bank;

        match mode {
            Mode::User | Mode::System => live[8..15].copy_from_slice(&bank.user),
            Mode::Fiq => {
                live[8..15].copy_from_slice(&bank.fiq);
                self.spsr = bank.spsr_fiq;
            }
            _ => {
                live[8..13].copy_from_slice(&bank.user[..5]);
                if let Some((sp, lr)) = bank.stack_and_link_mut(mode) {
                    live[REG_SP] = *sp;
                    live[REG_LR] = *lr;
                }
                if let Some(spsr) = bank.spsr(mode) {
                    self.spsr = spsr;
                }
            }
        }
    }

    /// Copies the SPSR back into the CPSR, switching banks first.
    pub(crate) fn restore_cpsr_from_spsr(&mut self) {
        let spsr = self.spsr;
        let mode = match spsr.try_mode() {
            Ok(mode) => mode,
            Err(e) => panic!("cannot restore CPSR from SPSR {:#010X}: {e}", u32::from(spsr)),
        };
        self.switch_mode(mode);
        self.cpsr = spsr;
    }

    pub(crate) fn enter_exception(&mut self, mode: Mode, vector: u32, link: u32) {
        let saved = self.cpsr;
        self.switch_mode(mode);
        self.registers.set_register_at(REG_LR, link);
        self.spsr = saved;
        self.cpsr.set_irq_disable(true);
        self.cpsr.set_cpu_state(CpuState::Arm);
        self.write_register(REG_PROGRAM_COUNTER, vector);
    }

    /// `link` is the address of the instruction after the SWI.
    pub(crate) fn software_interrupt(&mut self, link: u32) {
        tracing::debug!("swi, returning to {link:#010X}");
        self.enter_exception(Mode::Supervisor, SWI_VECTOR, link);
    }

    fn handle_interrupts(&mut self) {
        if self.cpsr.irq_disable() || !self.bus.interrupt_control.pending() {
            return;
        }

        let pc = self.registers.program_counter();
        // The next instruction plus 4, whatever the state.
        let link = match self.cpsr.cpu_state() {
            CpuState::Arm => pc,
            CpuState::Thumb => pc.wrapping_add(2),
        };
        tracing::debug!(
            "irq {:#06X}, returning to {:#010X}",
            self.bus.interrupt_control.interrupt_request & self.bus.interrupt_control.interrupt_enable,
            link.wrapping_sub(4)
        );

        self.bus.step(2);
        self.enter_exception(Mode::Irq, IRQ_VECTOR, link);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cpu::hardware::bios::{BIOS_SIZE, Bios};
    use crate::cpu::hardware::gamepak::Rom;
    use crate::cpu::hardware::interrupt_control::Interrupt;
    use crate::cpu::psr::Flag;
    use pretty_assertions::assert_eq;

    fn bios_with(bytes: &[u8]) -> Bus {
        let mut data = vec![0; BIOS_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Bus::new(Bios::new(data).unwrap(), Rom::default())
    }

    /// A CPU in ARM state about to run `program` from address 0.
    pub(crate) fn arm_cpu(program: &[u32]) -> Arm7tdmi {
        let bytes: Vec<u8> = program.iter().flat_map(|op| op.to_le_bytes()).collect();
        Arm7tdmi::new(bios_with(&bytes), BootMode::Bios)
    }

    /// A CPU in Thumb state about to run `program` from address 0.
    pub(crate) fn thumb_cpu(program: &[u16]) -> Arm7tdmi {
        let bytes: Vec<u8> = program.iter().flat_map(|op| op.to_le_bytes()).collect();
        let mut cpu = Arm7tdmi::new(bios_with(&bytes), BootMode::Bios);
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.write_register(REG_PROGRAM_COUNTER, 0);
        cpu
    }

    #[test]
    fn reset_values() {
        let cpu = arm_cpu(&[]);
        assert_eq!(cpu.cpsr.mode(), Mode::System);
        assert!(cpu.cpsr.irq_disable());
        assert!(cpu.cpsr.fiq_disable());
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.read_register(REG_SP), 0x0300_7F00);
        assert_eq!(cpu.register_bank.r13_irq, 0x0300_7FA0);
        assert_eq!(cpu.register_bank.r13_svc, 0x0300_7FE0);

        // Three opcodes in flight, the next fetch lands at 12.
        assert_eq!(cpu.registers.program_counter(), 4);
        assert_eq!(cpu.pipeline().len(), 3);
        assert_eq!(cpu.pipeline().next_fetch_address(4, CpuState::Arm), 12);
    }

    #[test]
    fn direct_boot() {
        let cpu = Arm7tdmi::new(Bus::default(), BootMode::Direct);
        assert_eq!(cpu.registers.program_counter(), 0x0800_0004);
        assert_eq!(cpu.read_register(0), 0x0800_0000);
        assert_eq!(cpu.read_register(1), 0xEA);
        assert_eq!(cpu.bus.interrupt_control.post_boot_flag, 1);
    }

    #[test]
    fn nop_only_moves_the_program_counter() {
        // MOV R0, R0
        let mut cpu = arm_cpu(&[0xE1A0_0000, 0xE1A0_0000]);
        let before = cpu.registers.clone();
        let cpsr = cpu.cpsr;

        cpu.step();

        assert_eq!(cpu.registers.program_counter(), before.program_counter() + 4);
        assert_eq!(&cpu.registers.as_array()[..15], &before.as_array()[..15]);
        assert_eq!(cpu.cpsr, cpsr);
    }

    #[test]
    fn skipped_condition() {
        // MOVEQ R0, #1 with Z clear
        let mut cpu = arm_cpu(&[0x03A0_0001]);
        cpu.step();
        assert_eq!(cpu.read_register(0), 0);
        assert_eq!(cpu.registers.program_counter(), 8);
    }

    #[test]
    fn write_register_refills() {
        let mut cpu = arm_cpu(&[]);
        cpu.write_register(REG_PROGRAM_COUNTER, 0x102);
        // Aligned, then one word ahead.
        assert_eq!(cpu.registers.program_counter(), 0x104);
        assert_eq!(cpu.pipeline().len(), 2);

        cpu.write_register(3, 7);
        assert_eq!(cpu.read_register(3), 7);
    }

    #[test]
    fn switch_mode_is_idempotent() {
        let mut cpu = arm_cpu(&[]);
        cpu.registers.set_register_at(13, 1234);
        let bank = cpu.register_bank.clone();

        cpu.switch_mode(Mode::System);

        assert_eq!(cpu.read_register(13), 1234);
        assert_eq!(cpu.register_bank, bank);
    }

    #[test]
    fn switch_mode_banks_registers() {
        let mut cpu = arm_cpu(&[]);
        for i in 0..15 {
            cpu.registers.set_register_at(i, i as u32);
        }

        cpu.switch_mode(Mode::Fiq);
        assert_eq!(cpu.read_register(7), 7);
        assert_eq!(cpu.read_register(8), 0);
        cpu.registers.set_register_at(8, 88);

        cpu.switch_mode(Mode::Irq);
        assert_eq!(cpu.read_register(8), 8);
        assert_eq!(cpu.read_register(13), 0x0300_7FA0);

        cpu.switch_mode(Mode::Fiq);
        assert_eq!(cpu.read_register(8), 88);

        cpu.switch_mode(Mode::System);
        assert_eq!(cpu.read_register(8), 8);
        assert_eq!(cpu.read_register(14), 14);
    }

    #[test]
    fn switch_mode_round_trip() {
        for a in Mode::ALL {
            for b in Mode::ALL {
                if a == b {
                    continue;
                }
                let mut cpu = arm_cpu(&[]);
                cpu.switch_mode(a);
                for i in 0..15 {
                    cpu.registers.set_register_at(i, rand::random::<u32>());
                }
                cpu.spsr = Psr::new(u32::from(Mode::Undefined) | 0xF000_0000);
                let registers = cpu.registers.clone();
                let spsr = cpu.spsr;

                cpu.switch_mode(b);
                cpu.switch_mode(a);

                assert_eq!(cpu.registers, registers, "{a} -> {b} -> {a}");
                assert_eq!(cpu.cpsr.mode(), a);
                if !a.is_user_bank() {
                    assert_eq!(cpu.spsr, spsr, "{a} -> {b} -> {a}");
                }
            }
        }
    }

    #[test]
    fn irq_entry() {
        let mut cpu = arm_cpu(&[0xE1A0_0000; 8]);
        cpu.bus.interrupt_control.interrupt_enable = Interrupt::VBlank.mask();
        cpu.bus.interrupt_control.interrupt_master_enable = true;
        cpu.bus.interrupt_control.request(Interrupt::VBlank);

        // Masked by I.
        cpu.step();
        assert_eq!(cpu.cpsr.mode(), Mode::System);

        cpu.cpsr.set_irq_disable(false);
        cpu.cpsr.set_flag(Flag::C, true);
        let old_cpsr = cpu.cpsr;
        cpu.step();

        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert!(cpu.cpsr.irq_disable());
        assert_eq!(cpu.spsr, old_cpsr);
        // The next instruction was at 4, return with SUBS PC, LR, #4.
        assert_eq!(cpu.read_register(REG_LR), 8);
        assert_eq!(cpu.read_register(REG_SP), 0x0300_7FA0);
        // The instruction at the vector has run.
        assert_eq!(cpu.registers.program_counter(), IRQ_VECTOR + 8);
    }

    #[test]
    fn irq_entry_from_thumb() {
        let mut cpu = thumb_cpu(&[0x46C0; 8]);
        cpu.step();
        cpu.bus.interrupt_control.interrupt_enable = Interrupt::Timer0.mask();
        cpu.bus.interrupt_control.interrupt_master_enable = true;
        cpu.bus.interrupt_control.request(Interrupt::Timer0);
        cpu.cpsr.set_irq_disable(false);

        cpu.step();

        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert!(cpu.spsr.state_bit());
        // Next Thumb instruction at 2, plus 4.
        assert_eq!(cpu.read_register(REG_LR), 6);
    }

    #[test]
    fn halted_cpu_waits_for_an_enabled_interrupt() {
        let mut cpu = arm_cpu(&[0xE1A0_0000; 8]);
        cpu.bus.interrupt_control.halt();
        let pc = cpu.registers.program_counter();
        let cycles = cpu.bus.cycles();

        cpu.step();
        assert_eq!(cpu.registers.program_counter(), pc);
        assert_eq!(cpu.bus.cycles(), cycles + 1);

        // Requested but not enabled.
        cpu.bus.interrupt_control.request(Interrupt::HBlank);
        cpu.step();
        assert_eq!(cpu.registers.program_counter(), pc);

        cpu.bus.interrupt_control.interrupt_enable = Interrupt::HBlank.mask();
        cpu.step();
        assert!(!cpu.bus.interrupt_control.is_halted());
        assert_eq!(cpu.registers.program_counter(), pc + 4);
    }

    #[test]
    #[should_panic(expected = "undefined ARM instruction")]
    fn undefined_instruction_panics() {
        let mut cpu = arm_cpu(&[0xE600_0010]);
        cpu.step();
    }
}
