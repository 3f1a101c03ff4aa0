//! Integration tests for exception entry and return.
//!
//! These tests verify:
//! - Undefined instructions vector through 0x04 and return past the opcode
//! - Software interrupts either run in the high-level BIOS or vector to 0x08
//! - Interrupts taken in Thumb state return to Thumb state

use libagb::devices::{io, Interrupt};
use libagb::{Machine, MachineConfig, MemoryBus, Mode};

fn create_test_machine(program: &[u32]) -> Machine {
    let rom: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&rom);
    machine
}

#[test]
fn test_undefined_instruction_round_trip() {
    let mut machine = create_test_machine(&[
        0xE7F0_00F0, // undefined
        0xE3A0_0007, // mov r0, #7
        0xEAFF_FFFE, // b .
    ]);
    let cpsr = machine.cpsr();

    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::Undefined);
    assert_eq!(machine.pc(), 0x04);
    assert_eq!(machine.reg(14), 0x0800_0004);
    assert_eq!(machine.cpu().spsr(), cpsr);
    assert!(machine.cpu().irq_disabled());

    // The stub returns with movs pc, lr
    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.pc(), 0x0800_0004);
    assert_eq!(machine.cpsr(), cpsr);

    machine.step().unwrap();
    assert_eq!(machine.reg(0), 7);
}

#[test]
fn test_unsupported_bios_call_vectors_to_swi() {
    let mut machine = create_test_machine(&[
        0xEF20_0000, // swi 0x20
        0xE3A0_0007, // mov r0, #7
        0xEAFF_FFFE, // b .
    ]);
    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::Supervisor);
    assert_eq!(machine.pc(), 0x08);
    assert_eq!(machine.reg(14), 0x0800_0004);
    assert_eq!(machine.reg(13), libagb::bios::STACK_SVC);

    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::System);
    machine.step().unwrap();
    assert_eq!(machine.reg(0), 7);
}

#[test]
fn test_swi_with_bios_image_enters_supervisor() {
    let mut machine = create_test_machine(&[
        0xE3A0_0064, // mov r0, #100
        0xE3A0_1007, // mov r1, #7
        0xEF06_0000, // swi 0x06 (Div)
        0xEAFF_FFFE, // b .
    ]);
    machine.load_bios(&libagb::bios::stub_image()).unwrap();
    assert_eq!(machine.pc(), 0x0800_0000);

    for _ in 0..3 {
        machine.step().unwrap();
    }
    assert_eq!(machine.mode(), Mode::Supervisor);
    assert_eq!(machine.pc(), 0x08);

    // The stub services nothing, so the registers come back unchanged
    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.pc(), 0x0800_000C);
    assert_eq!(machine.reg(0), 100);
}

#[test]
fn test_thumb_swi_comment_is_low_byte() {
    let mut machine = create_test_machine(&[
        0xE3A0_0051, // mov r0, #81
        0xE28F_2001, // add r2, pc, #1
        0xE12F_FF12, // bx r2
        0xE7FE_DF08, // swi 0x08 (Sqrt) ; b .
    ]);
    for _ in 0..4 {
        machine.step().unwrap();
    }
    assert!(machine.cpu().is_thumb());
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.reg(0), 9);
}

#[test]
fn test_interrupt_in_thumb_state_returns_to_thumb() {
    let mut machine = create_test_machine(&[
        0xE28F_2001, // add r2, pc, #1
        0xE12F_FF12, // bx r2
        0xE7FE_E7FE, // b . ; b .
    ]);
    let handler = [
        0xE3A0_0301, // mov r0, #0x04000000
        0xE280_0C02, // add r0, r0, #0x200
        0xE3A0_1001, // mov r1, #1
        0xE1C0_10B2, // strh r1, [r0, #2]
        0xE3A0_4001, // mov r4, #1
        0xE12F_FF1E, // bx lr
    ];
    for (i, word) in handler.iter().enumerate() {
        machine.bus_mut().write32(0x0300_0000 + i as u32 * 4, *word);
    }
    machine.bus_mut().write32(0x0300_7FFC, 0x0300_0000);
    machine.write_io(io::DISPSTAT, 0x0008);
    machine.write_io(io::IE, Interrupt::VBlank.mask());
    machine.write_io(io::IME, 1);

    machine.run_frame().unwrap();
    machine.run_frame().unwrap();

    assert_eq!(machine.reg(4), 1);
    assert!(machine.cpu().is_thumb());
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.pc(), 0x0800_0008);
}

#[test]
fn test_irq_entry_from_thumb_saves_return_address() {
    let mut machine = create_test_machine(&[
        0xE28F_2001, // add r2, pc, #1
        0xE12F_FF12, // bx r2
        0xE7FE_E7FE, // b . ; b .
    ]);
    machine.step().unwrap();
    machine.step().unwrap();
    machine.write_io(io::IE, Interrupt::Serial.mask());
    machine.write_io(io::IME, 1);
    machine.request_interrupt(Interrupt::Serial);

    machine.step().unwrap();
    machine.step().unwrap();
    assert_eq!(machine.mode(), Mode::Irq);
    assert!(!machine.cpu().is_thumb());
    // subs pc, lr, #4 lands back on the Thumb branch
    assert_eq!(machine.reg(14), 0x0800_000C);
    assert_ne!(machine.cpu().spsr() & 0x20, 0);
}
