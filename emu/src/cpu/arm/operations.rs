use crate::bitwise::Bits;
use crate::bus::Access;
use crate::cpu::alu;
use crate::cpu::arm::instructions::{AluOpcode, ArmInstruction};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, ReadWriteKind, ShiftKind,
};
use crate::cpu::psr::{CpuState, Flag, Psr};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};

/// Bytes of a PSR selected by each bit of the MSR field mask (bits 19-16).
const PSR_FIELDS: [u32; 4] = [0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0xFF00_0000];

fn logical(opcode: AluOpcode, first: u32, second: u32) -> u32 {
    match opcode {
        AluOpcode::And | AluOpcode::Tst => first & second,
        AluOpcode::Eor | AluOpcode::Teq => first ^ second,
        AluOpcode::Orr => first | second,
        AluOpcode::Bic => first & !second,
        AluOpcode::Mov => second,
        AluOpcode::Mvn => !second,
        _ => unreachable!("{opcode} is not a logical operation"),
    }
}

impl Arm7tdmi {
    pub(crate) fn execute_arm(&mut self, instruction: ArmInstruction, op_code: u32) {
        match instruction {
            ArmInstruction::DataProcessing(opcode) => self.data_processing(opcode, op_code),
            ArmInstruction::PsrRead => self.psr_read(op_code),
            ArmInstruction::PsrWrite => self.psr_write(op_code),
            ArmInstruction::Multiply => self.multiply(op_code),
            ArmInstruction::MultiplyLong { signed } => self.multiply_long(op_code, signed),
            ArmInstruction::SingleDataSwap => self.single_data_swap(op_code),
            ArmInstruction::BranchAndExchange => self.branch_and_exchange(op_code),
            ArmInstruction::HalfwordDataTransfer(kind) => {
                self.halfword_data_transfer(op_code, kind);
            }
            ArmInstruction::SingleDataTransfer(kind) => self.single_data_transfer(op_code, kind),
            ArmInstruction::BlockDataTransfer(kind) => self.block_data_transfer(op_code, kind),
            ArmInstruction::Branch { link } => self.branch(op_code, link),
            ArmInstruction::SoftwareInterrupt => {
                let link = self.registers.program_counter().wrapping_sub(4);
                self.software_interrupt(link);
            }
            ArmInstruction::Undefined => panic!(
                "undefined ARM instruction {op_code:#010X} at {:#010X}",
                self.registers.program_counter().wrapping_sub(8)
            ),
        }
    }

    /// R15 as an operand of an instruction that spends a cycle before
    /// reading its registers sits one word further.
    fn read_operand_late(&self, index: usize) -> u32 {
        let value = self.read_register(index);
        if index == REG_PROGRAM_COUNTER {
            value.wrapping_add(4)
        } else {
            value
        }
    }

    fn data_processing(&mut self, opcode: AluOpcode, op_code: u32) {
        let set_flags = op_code.get_bit(20);
        let rn = op_code.get_bits(16..=19) as usize;
        let rd = op_code.get_bits(12..=15) as usize;
        let carry = self.cpsr.carry_flag();

        let (first, (second, shifter_carry)) = if op_code.get_bit(25) {
            let rotate = op_code.get_bits(8..=11) * 2;
            (
                self.read_register(rn),
                alu::ror(op_code & 0xFF, rotate, carry),
            )
        } else {
            let kind = ShiftKind::from(op_code.get_bits(5..=6));
            let rm = op_code.get_bits(0..=3) as usize;

            if op_code.get_bit(4) {
                // The shift amount is read in an extra internal cycle.
                self.bus.idle();
                self.break_sequence();
                let amount = self.read_register(op_code.get_bits(8..=11) as usize) & 0xFF;
                (
                    self.read_operand_late(rn),
                    alu::shift(kind, self.read_operand_late(rm), amount, carry),
                )
            } else {
                let amount = op_code.get_bits(7..=11);
                (
                    self.read_register(rn),
                    alu::shift_by_immediate(kind, self.read_register(rm), amount, carry),
                )
            }
        };

        let arithmetic = match opcode {
            AluOpcode::Sub | AluOpcode::Cmp => Some(alu::sub(first, second)),
            AluOpcode::Rsb => Some(alu::sub(second, first)),
            AluOpcode::Add | AluOpcode::Cmn => Some(alu::add(first, second)),
            AluOpcode::Adc => Some(alu::add_with_carry(first, second, carry)),
            AluOpcode::Sbc => Some(alu::sub_with_carry(first, second, carry)),
            AluOpcode::Rsc => Some(alu::sub_with_carry(second, first, carry)),
            _ => None,
        };
        let result = arithmetic.map_or_else(|| logical(opcode, first, second), |r| r.result);

        if set_flags && rd == REG_PROGRAM_COUNTER {
            // Exception return: the SPSR comes back along with the mode.
            let state = self.cpsr.cpu_state();
            self.restore_cpsr_from_spsr();
            if opcode.writes_result() {
                self.write_register(REG_PROGRAM_COUNTER, result);
            } else if self.cpsr.cpu_state() != state {
                self.refill();
            }
            return;
        }

        if set_flags {
            match arithmetic {
                Some(arithmetic) => self.cpsr.set_flags(&arithmetic),
                None => self.cpsr.set_logical_flags(result, shifter_carry),
            }
        }

        if opcode.writes_result() {
            self.write_register(rd, result);
        }
    }

    /// MRS
    fn psr_read(&mut self, op_code: u32) {
        let rd = op_code.get_bits(12..=15) as usize;
        let psr = if op_code.get_bit(22) {
            self.spsr
        } else {
            self.cpsr
        };
        self.registers.set_register_at(rd, psr.into());
    }

    /// MSR, both the register and the rotated immediate form.
    fn psr_write(&mut self, op_code: u32) {
        let value = if op_code.get_bit(25) {
            (op_code & 0xFF).rotate_right(op_code.get_bits(8..=11) * 2)
        } else {
            self.read_register(op_code.get_bits(0..=3) as usize)
        };

        let mut mask = PSR_FIELDS
            .iter()
            .enumerate()
            .filter(|&(field, _)| op_code.get_bit(16 + field as u8))
            .fold(0, |mask, (_, bytes)| mask | bytes);

        let mode = self.cpsr.mode();
        if op_code.get_bit(22) {
            if mode.is_user_bank() {
                tracing::warn!("MSR to the SPSR in {mode} mode ignored");
                return;
            }
            self.spsr = Psr::new((u32::from(self.spsr) & !mask) | (value & mask));
            return;
        }

        if !mode.is_privileged() {
            mask &= 0xF000_0000;
        }
        // The state bit only changes through BX and exception return.
        mask &= !(1 << Flag::T as u32);

        let cpsr = Psr::new((u32::from(self.cpsr) & !mask) | (value & mask));
        if mask & 0xFF != 0 {
            match cpsr.try_mode() {
                Ok(target) => self.switch_mode(target),
                Err(e) => panic!("MSR wrote an invalid mode {value:#010X}: {e}"),
            }
        }
        self.cpsr = cpsr;
    }

    fn set_multiply_flags(&mut self, sign: bool, zero: bool) {
        self.cpsr.set_sign_flag(sign);
        self.cpsr.set_zero_flag(zero);
    }

    /// MUL, MLA
    fn multiply(&mut self, op_code: u32) {
        let rd = op_code.get_bits(16..=19) as usize;
        let rs = self.read_register(op_code.get_bits(8..=11) as usize);
        let rm = self.read_register(op_code.get_bits(0..=3) as usize);

        self.break_sequence();
        let mut result = rm.wrapping_mul(rs);
        if op_code.get_bit(21) {
            result = result.wrapping_add(self.read_register(op_code.get_bits(12..=15) as usize));
            self.bus.idle();
        }
        self.bus.step(alu::multiplier_cycles(rs, true));

        if op_code.get_bit(20) {
            self.set_multiply_flags(result.get_bit(31), result == 0);
            self.cpsr.set_carry_flag(false);
        }
        self.write_register(rd, result);
    }

    /// UMULL, UMLAL, SMULL, SMLAL
    fn multiply_long(&mut self, op_code: u32, signed: bool) {
        let rd_hi = op_code.get_bits(16..=19) as usize;
        let rd_lo = op_code.get_bits(12..=15) as usize;
        let rs = self.read_register(op_code.get_bits(8..=11) as usize);
        let rm = self.read_register(op_code.get_bits(0..=3) as usize);

        self.break_sequence();
        self.bus.idle();
        let mut result = if signed {
            (i64::from(rm as i32) * i64::from(rs as i32)) as u64
        } else {
            u64::from(rm) * u64::from(rs)
        };
        if op_code.get_bit(21) {
            let accumulator = (u64::from(self.read_register(rd_hi)) << 32)
                | u64::from(self.read_register(rd_lo));
            result = result.wrapping_add(accumulator);
            self.bus.idle();
        }
        self.bus.step(alu::multiplier_cycles(rs, signed));

        if op_code.get_bit(20) {
            self.set_multiply_flags(result >> 63 == 1, result == 0);
        }
        self.write_register(rd_lo, result as u32);
        self.write_register(rd_hi, (result >> 32) as u32);
    }

    /// SWP, SWPB
    fn single_data_swap(&mut self, op_code: u32) {
        let address = self.read_register(op_code.get_bits(16..=19) as usize);
        let rd = op_code.get_bits(12..=15) as usize;
        let source = self.read_register(op_code.get_bits(0..=3) as usize);

        self.break_sequence();
        let value = match ReadWriteKind::from(op_code.get_bit(22)) {
            ReadWriteKind::Byte => {
                let value = self.bus.read8(address, Access::NonSequential);
                self.bus.write8(address, source as u8, Access::NonSequential);
                u32::from(value)
            }
            ReadWriteKind::Word => {
                let value = self
                    .bus
                    .read32(address, Access::NonSequential)
                    .rotate_right((address & 3) * 8);
                self.bus.write32(address, source, Access::NonSequential);
                value
            }
        };
        self.bus.idle();
        self.write_register(rd, value);
    }

    /// BX
    fn branch_and_exchange(&mut self, op_code: u32) {
        let target = self.read_register(op_code.get_bits(0..=3) as usize);
        self.cpsr.set_cpu_state(if target.get_bit(0) {
            CpuState::Thumb
        } else {
            CpuState::Arm
        });
        self.write_register(REG_PROGRAM_COUNTER, target);
    }

    /// B, BL
    fn branch(&mut self, op_code: u32, link: bool) {
        // 24-bit word offset, sign extended and scaled by 4.
        let offset = ((op_code << 8) as i32 >> 6) as u32;
        let pc = self.registers.program_counter();
        if link {
            self.registers.set_register_at(REG_LR, pc.wrapping_sub(4));
        }
        self.write_register(REG_PROGRAM_COUNTER, pc.wrapping_add(offset));
    }

    /// LDR, STR, LDRB, STRB
    fn single_data_transfer(&mut self, op_code: u32, kind: LoadStoreKind) {
        let indexing = Indexing::from(op_code.get_bit(24));
        let offsetting = Offsetting::from(op_code.get_bit(23));
        let size = ReadWriteKind::from(op_code.get_bit(22));
        let write_back = op_code.get_bit(21);
        let rn = op_code.get_bits(16..=19) as usize;
        let rd = op_code.get_bits(12..=15) as usize;

        let offset = if op_code.get_bit(25) {
            let kind = ShiftKind::from(op_code.get_bits(5..=6));
            let rm = self.read_register(op_code.get_bits(0..=3) as usize);
            let carry = self.cpsr.carry_flag();
            alu::shift_by_immediate(kind, rm, op_code.get_bits(7..=11), carry).0
        } else {
            op_code & 0xFFF
        };

        let base = self.read_register(rn);
        let updated = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => updated,
            Indexing::Post => base,
        };
        let writes_base = indexing == Indexing::Post || write_back;

        self.break_sequence();
        match kind {
            LoadStoreKind::Load => {
                let value = match size {
                    ReadWriteKind::Byte => {
                        u32::from(self.bus.read8(address, Access::NonSequential))
                    }
                    ReadWriteKind::Word => self
                        .bus
                        .read32(address, Access::NonSequential)
                        .rotate_right((address & 3) * 8),
                };
                self.bus.idle();
                if writes_base {
                    self.write_register(rn, updated);
                }
                self.write_register(rd, value);
            }
            LoadStoreKind::Store => {
                let value = self.read_operand_late(rd);
                match size {
                    ReadWriteKind::Byte => {
                        self.bus.write8(address, value as u8, Access::NonSequential);
                    }
                    ReadWriteKind::Word => {
                        self.bus.write32(address, value, Access::NonSequential);
                    }
                }
                if writes_base {
                    self.write_register(rn, updated);
                }
            }
        }
    }

    /// LDRH, STRH, LDRSB, LDRSH
    fn halfword_data_transfer(&mut self, op_code: u32, kind: LoadStoreKind) {
        let indexing = Indexing::from(op_code.get_bit(24));
        let offsetting = Offsetting::from(op_code.get_bit(23));
        let write_back = op_code.get_bit(21);
        let rn = op_code.get_bits(16..=19) as usize;
        let rd = op_code.get_bits(12..=15) as usize;

        let offset = if op_code.get_bit(22) {
            (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3)
        } else {
            self.read_register(op_code.get_bits(0..=3) as usize)
        };

        let base = self.read_register(rn);
        let updated = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => updated,
            Indexing::Post => base,
        };
        let writes_base = indexing == Indexing::Post || write_back;

        self.break_sequence();
        match kind {
            LoadStoreKind::Load => {
                let value = match HalfwordTransferKind::from(op_code.get_bits(5..=6)) {
                    HalfwordTransferKind::UnsignedByte => {
                        u32::from(self.bus.read8(address, Access::NonSequential))
                    }
                    HalfwordTransferKind::UnsignedHalfword => {
                        u32::from(self.bus.read16(address, Access::NonSequential))
                            .rotate_right((address & 1) * 8)
                    }
                    HalfwordTransferKind::SignedByte => {
                        self.bus.read8(address, Access::NonSequential) as i8 as u32
                    }
                    // A misaligned signed halfword loads the addressed byte.
                    HalfwordTransferKind::SignedHalfword => {
                        let halfword = self.bus.read16(address, Access::NonSequential);
                        ((i32::from(halfword as i16)) >> ((address & 1) * 8)) as u32
                    }
                };
                self.bus.idle();
                if writes_base {
                    self.write_register(rn, updated);
                }
                self.write_register(rd, value);
            }
            LoadStoreKind::Store => {
                let value = self.read_operand_late(rd);
                self.bus
                    .write16(address, value as u16, Access::NonSequential);
                if writes_base {
                    self.write_register(rn, updated);
                }
            }
        }
    }

    /// LDM, STM
    fn block_data_transfer(&mut self, op_code: u32, kind: LoadStoreKind) {
        let pre = op_code.get_bit(24);
        let up = op_code.get_bit(23);
        let psr_or_user = op_code.get_bit(22);
        let write_back = op_code.get_bit(21);
        let rn = op_code.get_bits(16..=19) as usize;

        // An empty list transfers R15 and still moves the base by 16 words.
        let (list, bytes) = match op_code & 0xFFFF {
            0 => (1 << REG_PROGRAM_COUNTER, 0x40),
            list => (list, list.count_ones() * 4),
        };

        let base = self.read_register(rn);
        let (mut address, final_base) = if up {
            (
                if pre { base.wrapping_add(4) } else { base },
                base.wrapping_add(bytes),
            )
        } else {
            let lowest = base.wrapping_sub(bytes);
            (
                if pre { lowest } else { lowest.wrapping_add(4) },
                lowest,
            )
        };

        let loads_pc = kind == LoadStoreKind::Load && list.get_bit(15);
        let user_bank = psr_or_user && !loads_pc;
        let mode = self.cpsr.mode();
        if user_bank {
            self.switch_mode(Mode::User);
        }

        let first = list.trailing_zeros() as usize;
        let mut loaded_pc = None;
        let mut access = Access::NonSequential;
        self.break_sequence();

        for register in (0..16).filter(|&r| list.get_bit(r as u8)) {
            match kind {
                LoadStoreKind::Store => {
                    let value = if register == rn && register != first && write_back {
                        final_base
                    } else {
                        self.read_operand_late(register)
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
        if user_bank {
            self.switch_mode(mode);
        }

        let base_loaded = kind == LoadStoreKind::Load && list.get_bit(rn as u8);
        if write_back && !base_loaded {
            self.write_register(rn, final_base);
        }

        if let Some(pc) = loaded_pc {
            if psr_or_user {
                self.restore_cpsr_from_spsr();
            }
            self.write_register(REG_PROGRAM_COUNTER, pc);
        }
    }
}
