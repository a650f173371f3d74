use crate::bitwise::Bits;
use crate::bus::Access;
use crate::cpu::alu::{self, ArithmeticOpResult};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::flags::{LoadStoreKind, ReadWriteKind, ShiftKind};
use crate::cpu::psr::CpuState;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
    ThumbSignExtendedOperation,
};
use crate::cpu::thumb::instructions::ThumbInstruction;

/// Register field of a Thumb opcode starting at bit `low`.
fn register(op_code: u16, low: u8) -> usize {
    usize::from(op_code.get_bits(low..=low + 2))
}

impl Arm7tdmi {
    pub(crate) fn execute_thumb(&mut self, instruction: ThumbInstruction, op_code: u16) {
        match instruction {
            ThumbInstruction::MoveShiftedRegister => self.move_shifted_register(op_code),
            ThumbInstruction::AddSubtract => self.add_subtract(op_code),
            ThumbInstruction::Immediate(operation) => self.immediate(operation, op_code),
            ThumbInstruction::Alu(operation) => self.alu_operation(operation, op_code),
            ThumbInstruction::HiRegister(operation) => self.hi_register(operation, op_code),
            ThumbInstruction::PcRelativeLoad => self.pc_relative_load(op_code),
            ThumbInstruction::RegisterOffset => self.register_offset(op_code),
            ThumbInstruction::SignExtended(operation) => self.sign_extended(operation, op_code),
            ThumbInstruction::ImmediateOffset => self.immediate_offset(op_code),
            ThumbInstruction::Halfword => self.halfword(op_code),
            ThumbInstruction::SpRelative => self.sp_relative(op_code),
            ThumbInstruction::LoadAddress => self.load_address(op_code),
            ThumbInstruction::SpOffset => self.sp_offset(op_code),
            ThumbInstruction::PushPop(kind) => self.push_pop(kind, op_code),
            ThumbInstruction::MultipleLoadStore(kind) => self.multiple_load_store(kind, op_code),
            ThumbInstruction::ConditionalBranch => self.conditional_branch(op_code),
            ThumbInstruction::SoftwareInterrupt => {
                let link = self.registers.program_counter().wrapping_sub(2);
                self.software_interrupt(link);
            }
            ThumbInstruction::UnconditionalBranch => self.unconditional_branch(op_code),
            ThumbInstruction::LongBranchLink { low } => self.long_branch_link(low, op_code),
            ThumbInstruction::Undefined => panic!(
                "undefined Thumb instruction {op_code:#06X} at {:#010X}",
                self.registers.program_counter().wrapping_sub(4)
            ),
        }
    }

    fn set_arithmetic_result(&mut self, rd: usize, result: &ArithmeticOpResult) {
        self.cpsr.set_flags(result);
        self.registers.set_register_at(rd, result.result);
    }

    fn set_logical_result(&mut self, rd: usize, result: u32, carry: bool) {
        self.cpsr.set_logical_flags(result, carry);
        self.registers.set_register_at(rd, result);
    }

    /// Format 1: LSL, LSR, ASR by a 5-bit immediate.
    fn move_shifted_register(&mut self, op_code: u16) {
        let kind = ShiftKind::from(u32::from(op_code.get_bits(11..=12)));
        let amount = u32::from(op_code.get_bits(6..=10));
        let value = self.read_register(register(op_code, 3));

        let (result, carry) = alu::shift_by_immediate(kind, value, amount, self.cpsr.carry_flag());
        self.set_logical_result(register(op_code, 0), result, carry);
    }

    /// Format 2
    fn add_subtract(&mut self, op_code: u16) {
        let first = self.read_register(register(op_code, 3));
        let second = if op_code.get_bit(10) {
            u32::from(op_code.get_bits(6..=8))
        } else {
            self.read_register(register(op_code, 6))
        };

        let result = if op_code.get_bit(9) {
            alu::sub(first, second)
        } else {
            alu::add(first, second)
        };
        self.set_arithmetic_result(register(op_code, 0), &result);
    }

    /// Format 3
    fn immediate(&mut self, operation: ThumbImmediateOperation, op_code: u16) {
        let rd = register(op_code, 8);
        let value = u32::from(op_code & 0xFF);
        let current = self.read_register(rd);

        match operation {
            ThumbImmediateOperation::Mov => {
                let carry = self.cpsr.carry_flag();
                self.set_logical_result(rd, value, carry);
            }
            ThumbImmediateOperation::Cmp => self.cpsr.set_flags(&alu::sub(current, value)),
            ThumbImmediateOperation::Add => {
                self.set_arithmetic_result(rd, &alu::add(current, value));
            }
            ThumbImmediateOperation::Sub => {
                self.set_arithmetic_result(rd, &alu::sub(current, value));
            }
        }
    }

    /// Format 4
    fn alu_operation(&mut self, operation: ThumbModeAluInstruction, op_code: u16) {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let rd = register(op_code, 0);
        let first = self.read_register(rd);
        let second = self.read_register(register(op_code, 3));
        let carry = self.cpsr.carry_flag();

        match operation {
            And => self.set_logical_result(rd, first & second, carry),
            Eor => self.set_logical_result(rd, first ^ second, carry),
            Orr => self.set_logical_result(rd, first | second, carry),
            Bic => self.set_logical_result(rd, first & !second, carry),
            Mvn => self.set_logical_result(rd, !second, carry),
            Tst => self.cpsr.set_logical_flags(first & second, carry),
            Lsl | Lsr | Asr | Ror => {
                let kind = match operation {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                self.bus.idle();
                self.break_sequence();
                let (result, carry) = alu::shift(kind, first, second & 0xFF, carry);
                self.set_logical_result(rd, result, carry);
            }
            Adc => self.set_arithmetic_result(rd, &alu::add_with_carry(first, second, carry)),
            Sbc => self.set_arithmetic_result(rd, &alu::sub_with_carry(first, second, carry)),
            Neg => self.set_arithmetic_result(rd, &alu::sub(0, second)),
            Cmp => self.cpsr.set_flags(&alu::sub(first, second)),
            Cmn => self.cpsr.set_flags(&alu::add(first, second)),
            Mul => {
                self.break_sequence();
                self.bus.step(alu::multiplier_cycles(first, true));
                self.set_logical_result(rd, first.wrapping_mul(second), false);
            }
        }
    }

    /// Format 5: operations reaching R8-R15, and BX.
    fn hi_register(&mut self, operation: ThumbHighRegisterOperation, op_code: u16) {
        let rd = register(op_code, 0) | (usize::from(op_code.get_bit(7)) << 3);
        let rs = register(op_code, 3) | (usize::from(op_code.get_bit(6)) << 3);
        let source = self.read_register(rs);

        match operation {
            ThumbHighRegisterOperation::Add => {
                let result = self.read_register(rd).wrapping_add(source);
                self.write_register(rd, result);
            }
            ThumbHighRegisterOperation::Cmp => {
                let result = alu::sub(self.read_register(rd), source);
                self.cpsr.set_flags(&result);
            }
            ThumbHighRegisterOperation::Mov => self.write_register(rd, source),
            ThumbHighRegisterOperation::Bx => {
                self.cpsr.set_cpu_state(CpuState::from(source.get_bit(0)));
                self.write_register(REG_PROGRAM_COUNTER, source);
            }
        }
    }

    /// Word load relative to the program counter, with bit 1 forced to 0.
    fn pc_relative_load(&mut self, op_code: u16) {
        let base = self.registers.program_counter() & !2;
        let address = base.wrapping_add(u32::from(op_code & 0xFF) * 4);
        self.load(register(op_code, 8), address, ReadWriteKind::Word);
    }

    /// Format 7: LDR, STR, LDRB, STRB with a register offset.
    fn register_offset(&mut self, op_code: u16) {
        let address = self
            .read_register(register(op_code, 3))
            .wrapping_add(self.read_register(register(op_code, 6)));
        let kind = LoadStoreKind::from(op_code.get_bit(11));
        let size = ReadWriteKind::from(op_code.get_bit(10));
        self.transfer(kind, register(op_code, 0), address, size);
    }

    /// Format 8
    fn sign_extended(&mut self, operation: ThumbSignExtendedOperation, op_code: u16) {
        let address = self
            .read_register(register(op_code, 3))
            .wrapping_add(self.read_register(register(op_code, 6)));
        let rd = register(op_code, 0);

        self.break_sequence();
        let value = match operation {
            ThumbSignExtendedOperation::Strh => {
                let value = self.read_register(rd) as u16;
                self.bus.write16(address, value, Access::NonSequential);
                return;
            }
            ThumbSignExtendedOperation::Ldrh => {
                u32::from(self.bus.read16(address, Access::NonSequential))
                    .rotate_right((address & 1) * 8)
            }
            ThumbSignExtendedOperation::Ldsb => {
                self.bus.read8(address, Access::NonSequential) as i8 as u32
            }
            ThumbSignExtendedOperation::Ldsh => {
                let halfword = self.bus.read16(address, Access::NonSequential);
                (i32::from(halfword as i16) >> ((address & 1) * 8)) as u32
            }
        };
        self.bus.idle();
        self.registers.set_register_at(rd, value);
    }

    /// Format 9: word offsets are scaled by 4, byte offsets are not.
    fn immediate_offset(&mut self, op_code: u16) {
        let size = ReadWriteKind::from(op_code.get_bit(12));
        let offset = u32::from(op_code.get_bits(6..=10));
        let offset = match size {
            ReadWriteKind::Word => offset * 4,
            ReadWriteKind::Byte => offset,
        };
        let address = self.read_register(register(op_code, 3)).wrapping_add(offset);
        let kind = LoadStoreKind::from(op_code.get_bit(11));
        self.transfer(kind, register(op_code, 0), address, size);
    }

    /// Format 10: LDRH, STRH with a 5-bit halfword offset.
    fn halfword(&mut self, op_code: u16) {
        let offset = u32::from(op_code.get_bits(6..=10)) * 2;
        let address = self.read_register(register(op_code, 3)).wrapping_add(offset);
        let rd = register(op_code, 0);

        self.break_sequence();
        match LoadStoreKind::from(op_code.get_bit(11)) {
            LoadStoreKind::Store => {
                let value = self.read_register(rd) as u16;
                self.bus.write16(address, value, Access::NonSequential);
            }
            LoadStoreKind::Load => {
                let value = u32::from(self.bus.read16(address, Access::NonSequential))
                    .rotate_right((address & 1) * 8);
                self.bus.idle();
                self.registers.set_register_at(rd, value);
            }
        }
    }

    /// Format 11
    fn sp_relative(&mut self, op_code: u16) {
        let address = self
            .read_register(REG_SP)
            .wrapping_add(u32::from(op_code & 0xFF) * 4);
        let kind = LoadStoreKind::from(op_code.get_bit(11));
        self.transfer(kind, register(op_code, 8), address, ReadWriteKind::Word);
    }

    /// Format 12: ADD Rd, PC/SP, #imm
    fn load_address(&mut self, op_code: u16) {
        let base = if op_code.get_bit(11) {
            self.read_register(REG_SP)
        } else {
            self.registers.program_counter() & !2
        };
        let value = base.wrapping_add(u32::from(op_code & 0xFF) * 4);
        self.registers.set_register_at(register(op_code, 8), value);
    }

    /// Format 13: ADD SP, #±imm
    fn sp_offset(&mut self, op_code: u16) {
        let offset = u32::from(op_code & 0x7F) * 4;
        let sp = self.read_register(REG_SP);
        let sp = if op_code.get_bit(7) {
            sp.wrapping_sub(offset)
        } else {
            sp.wrapping_add(offset)
        };
        self.registers.set_register_at(REG_SP, sp);
    }

    /// PUSH stores below SP, POP loads from SP. Bit 8 adds LR to PUSH and
    /// PC to POP.
    fn push_pop(&mut self, kind: LoadStoreKind, op_code: u16) {
        let mut list = u32::from(op_code & 0xFF);
        if op_code.get_bit(8) {
            list |= match kind {
                LoadStoreKind::Store => 1 << REG_LR,
                LoadStoreKind::Load => 1 << REG_PROGRAM_COUNTER,
            };
        }
        let descending = kind == LoadStoreKind::Store;
        self.transfer_list(kind, REG_SP, list, descending);
    }

    /// Format 15: STMIA, LDMIA with write back.
    fn multiple_load_store(&mut self, kind: LoadStoreKind, op_code: u16) {
        let list = u32::from(op_code & 0xFF);
        self.transfer_list(kind, register(op_code, 8), list, false);
    }

    fn conditional_branch(&mut self, op_code: u16) {
        let condition = u32::from(op_code.get_bits(8..=11));
        if !self.conditions.passes(condition, self.cpsr) {
            return;
        }
        let offset = (i32::from(op_code as u8 as i8) << 1) as u32;
        let target = self.registers.program_counter().wrapping_add(offset);
        self.write_register(REG_PROGRAM_COUNTER, target);
    }

    fn unconditional_branch(&mut self, op_code: u16) {
        let offset = (op_code.sign_extended(11) << 1) as u32;
        let target = self.registers.program_counter().wrapping_add(offset);
        self.write_register(REG_PROGRAM_COUNTER, target);
    }

    /// BL is split in two halves. The first parks the upper offset in LR,
    /// the second jumps and leaves the return address (with bit 0 set) in LR.
    fn long_branch_link(&mut self, low: bool, op_code: u16) {
        let pc = self.registers.program_counter();
        if low {
            let target = self
                .read_register(REG_LR)
                .wrapping_add(u32::from(op_code & 0x7FF) << 1);
            self.registers
                .set_register_at(REG_LR, pc.wrapping_sub(2) | 1);
            self.write_register(REG_PROGRAM_COUNTER, target);
        } else {
            let offset = (op_code.sign_extended(11) << 12) as u32;
            self.registers.set_register_at(REG_LR, pc.wrapping_add(offset));
        }
    }

    fn load(&mut self, rd: usize, address: u32, size: ReadWriteKind) {
        self.break_sequence();
        let value = match size {
            ReadWriteKind::Word => self
                .bus
                .read32(address, Access::NonSequential)
                .rotate_right((address & 3) * 8),
            ReadWriteKind::Byte => u32::from(self.bus.read8(address, Access::NonSequential)),
        };
        self.bus.idle();
        self.registers.set_register_at(rd, value);
    }

    fn transfer(&mut self, kind: LoadStoreKind, rd: usize, address: u32, size: ReadWriteKind) {
        match kind {
            LoadStoreKind::Load => self.load(rd, address, size),
            LoadStoreKind::Store => {
                self.break_sequence();
                let value = self.read_register(rd);
                match size {
                    ReadWriteKind::Word => {
                        self.bus.write32(address, value, Access::NonSequential);
                    }
                    ReadWriteKind::Byte => {
                        self.bus.write8(address, value as u8, Access::NonSequential);
                    }
                }
            }
        }
    }

    /// Block transfer with write back, in ascending register order. An
    /// empty list transfers PC and moves the base by 16 words.
    fn transfer_list(&mut self, kind: LoadStoreKind, rb: usize, list: u32, descending: bool) {
        let (list, bytes) = match list {
            0 => (1 << REG_PROGRAM_COUNTER, 0x40),
            list => (list, list.count_ones() * 4),
        };

        let base = self.read_register(rb);
        let final_base = if descending {
            base.wrapping_sub(bytes)
        } else {
            base.wrapping_add(bytes)
        };
        let mut address = if descending { final_base } else { base };

        let first = list.trailing_zeros() as usize;
        let mut loaded_pc = None;
        let mut access = Access::NonSequential;
        self.break_sequence();

        for register in (0..16).filter(|&r| list.get_bit(r as u8)) {
            match kind {
                LoadStoreKind::Store => {
                    let value = if register == REG_PROGRAM_COUNTER {
                        self.registers.program_counter().wrapping_add(2)
                    } else if register == rb && register != first {
                        final_base
                    } else {
                        self.read_register(register)
                    };
                    self.bus.write32(address, value, access);
                }
                LoadStoreKind::Load => {
                    let value = self.bus.read32(address, access);
                    if register == REG_PROGRAM_COUNTER {
                        loaded_pc = Some(value);
                    } else {
                        self.registers.set_register_at(register, value);
                    }
                }
            }
            address = address.wrapping_add(4);
            access = Access::Sequential;
        }

        if kind == LoadStoreKind::Load {
            self.bus.idle();
        }
        let base_loaded = kind == LoadStoreKind::Load && list.get_bit(rb as u8);
        if !base_loaded {
            self.registers.set_register_at(rb, final_base);
        }
        if let Some(pc) = loaded_pc {
            self.write_register(REG_PROGRAM_COUNTER, pc);
        }
    }
}
