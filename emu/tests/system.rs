use emu::bus::{Access, Bus};
use emu::cartridge_header::{HEADER_SIZE, header_checksum};
use emu::cpu::arm7tdmi::BootMode;
use emu::cpu::cpu_modes::Mode;
use emu::cpu::hardware::bios::BIOS_SIZE;
use emu::cpu::hardware::interrupt_control::Interrupt;
use emu::gba::Gba;
use emu::scheduler::Scheduler;
use pretty_assertions::assert_eq;

fn bios(program: &[u32]) -> Vec<u8> {
    let mut data = vec![0; BIOS_SIZE];
    for (i, op) in program.iter().enumerate() {
        data[i * 4..i * 4 + 4].copy_from_slice(&op.to_le_bytes());
    }
    data
}

fn rom() -> Vec<u8> {
    let mut rom = vec![0; HEADER_SIZE];
    rom[0xB2] = 0x96;
    rom[0xBD] = header_checksum(&rom);
    rom
}

fn gba(program: &[u32]) -> Gba {
    Gba::new(bios(program), rom(), BootMode::Bios).unwrap()
}

#[test]
fn nop_after_reset_only_moves_the_program_counter() {
    // MOV R0, R0
    let mut gba = gba(&[0xE1A0_0000]);
    let before = gba.cpu.registers.clone();
    let cpsr = gba.cpu.cpsr;

    gba.step();

    let after = gba.cpu.registers.as_array();
    for (i, (b, a)) in before.as_array().iter().zip(after).enumerate().take(15) {
        assert_eq!(b, a, "r{i} changed");
    }
    assert_eq!(
        gba.cpu.registers.program_counter(),
        before.program_counter() + 4
    );
    assert_eq!(gba.cpu.cpsr, cpsr);
}

#[test]
fn adc_wraps_to_zero_with_carry() {
    // MVN R1, #0 ; MOV R2, #1 ; ADCS R0, R1, R2
    let mut gba = gba(&[0xE3E0_1000, 0xE3A0_2001, 0xE0B1_0002]);
    gba.cpu.cpsr.set_carry_flag(false);

    gba.step();
    gba.step();
    gba.step();

    assert_eq!(gba.cpu.read_register(0), 0);
    assert!(gba.cpu.cpsr.zero_flag());
    assert!(gba.cpu.cpsr.carry_flag());
    assert!(!gba.cpu.cpsr.overflow_flag());
    assert!(!gba.cpu.cpsr.sign_flag());
}

#[test]
fn scheduled_event_fires_on_its_deadline() {
    let mut scheduler = Scheduler::new();
    scheduler.schedule(10, "event");
    let mut fired = Vec::new();

    for _ in 0..9 {
        scheduler.advance(|event, _| fired.push(event));
    }
    assert!(fired.is_empty());

    scheduler.advance(|event, _| fired.push(event));
    assert_eq!(fired, vec!["event"]);

    scheduler.advance(|event, _| fired.push(event));
    assert_eq!(fired.len(), 1);
}

#[test]
fn timer_overflow_enters_the_interrupt_handler() {
    // MSR CPSR_c, #0x1F (System, interrupts on) ; B .
    let mut gba = gba(&[0xE321_F01F, 0xEAFF_FFFE]);
    let bus = &mut gba.cpu.bus;
    bus.write16(0x0400_0200, Interrupt::Timer0.mask(), Access::NonSequential);
    bus.write16(0x0400_0208, 1, Access::NonSequential);
    bus.write16(0x0400_0100, 0xFFF0, Access::NonSequential);
    bus.write16(0x0400_0102, 0x00C0, Access::NonSequential);

    for _ in 0..100 {
        gba.step();
        if gba.cpu.cpsr.mode() == Mode::Irq {
            break;
        }
    }

    assert_eq!(gba.cpu.cpsr.mode(), Mode::Irq);
    assert!(gba.cpu.cpsr.irq_disable());
    assert_eq!(gba.cpu.spsr.mode(), Mode::System);
    // Return address of the spinning branch, plus 4 for SUBS PC, LR, #4.
    assert_eq!(gba.cpu.read_register(14), 8);
    // The step that took the interrupt also ran the opcode at the vector.
    assert_eq!(gba.cpu.registers.program_counter(), 0x20);
    assert_eq!(
        gba.cpu.bus.interrupt_control.interrupt_request & Interrupt::Timer0.mask(),
        Interrupt::Timer0.mask()
    );
}

#[test]
fn dma_copies_words_between_regions() {
    let mut bus = Bus::default();
    let words: Vec<u32> = (0..8).map(|_| rand::random::<u32>()).collect();
    for (i, word) in words.iter().enumerate() {
        bus.write32(0x0300_0000 + i as u32 * 4, *word, Access::NonSequential);
    }

    bus.write32(0x0400_00D4, 0x0300_0000, Access::NonSequential);
    bus.write32(0x0400_00D8, 0x0200_0000, Access::NonSequential);
    // 8 words, enabled, immediate.
    bus.write32(0x0400_00DC, 0x8400_0008, Access::NonSequential);
    let start = bus.cycles();
    bus.step(4);

    for (i, word) in words.iter().enumerate() {
        assert_eq!(bus.peek32(0x0200_0000 + i as u32 * 4), *word);
    }
    assert!(!bus.dma.channel(3).enabled());
    // The copy charged EWRAM write time on top of the stepped cycles.
    assert!(bus.cycles() > start + 4);
}
