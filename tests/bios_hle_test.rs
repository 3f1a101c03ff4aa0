//! Integration tests for the built-in BIOS services used when no BIOS image
//! is installed.

use libagb::bios::BIOS_CHECKSUM;
use libagb::devices::{io, Interrupt};
use libagb::{Machine, MachineConfig, MemoryBus, Mode};

const EWRAM: u32 = 0x0200_0000;
const IWRAM: u32 = 0x0300_0000;

fn create_test_machine(program: &[u32]) -> Machine {
    let rom: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&rom);
    machine
}

fn run(machine: &mut Machine, steps: usize) {
    for _ in 0..steps {
        machine.step().unwrap();
    }
}

#[test]
fn test_div() {
    let mut machine = create_test_machine(&[
        0xE3A0_0064, // mov r0, #100
        0xE3A0_1007, // mov r1, #7
        0xEF06_0000, // swi 0x06
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0), 14);
    assert_eq!(machine.reg(1), 2);
    assert_eq!(machine.reg(3), 14);
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.pc(), 0x0800_000C);
}

#[test]
fn test_div_negative_numerator() {
    let mut machine = create_test_machine(&[
        0xE3E0_0063, // mvn r0, #99 (-100)
        0xE3A0_1007, // mov r1, #7
        0xEF06_0000, // swi 0x06
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0) as i32, -14);
    assert_eq!(machine.reg(1) as i32, -2);
    assert_eq!(machine.reg(3), 14);
}

#[test]
fn test_div_arm_swaps_operands() {
    let mut machine = create_test_machine(&[
        0xE3A0_0007, // mov r0, #7
        0xE3A0_1064, // mov r1, #100
        0xEF07_0000, // swi 0x07
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0), 14);
    assert_eq!(machine.reg(1), 2);
}

#[test]
fn test_sqrt() {
    let mut machine = create_test_machine(&[
        0xE3A0_0B01, // mov r0, #0x400
        0xE240_0001, // sub r0, r0, #1
        0xEF08_0000, // swi 0x08
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0), 31);
}

#[test]
fn test_bios_checksum() {
    let mut machine = create_test_machine(&[0xEF0D_0000]);
    run(&mut machine, 1);
    assert_eq!(machine.reg(0), BIOS_CHECKSUM);
}

#[test]
fn test_cpu_set_word_copy() {
    let mut machine = create_test_machine(&[
        0xE3A0_0403, // mov r0, #0x03000000
        0xE3A0_1402, // mov r1, #0x02000000
        0xE3A0_2301, // mov r2, #0x04000000 (32-bit)
        0xE382_2004, // orr r2, r2, #4
        0xEF0B_0000, // swi 0x0B
    ]);
    for i in 0..5 {
        machine.bus_mut().write32(IWRAM + i * 4, 0xA0 + i);
    }
    run(&mut machine, 5);
    for i in 0..4 {
        assert_eq!(machine.bus_mut().read32(EWRAM + i * 4), 0xA0 + i);
    }
    assert_eq!(machine.bus_mut().read32(EWRAM + 16), 0);
}

#[test]
fn test_cpu_set_halfword_fill() {
    let mut machine = create_test_machine(&[
        0xE3A0_0403, // mov r0, #0x03000000
        0xE3A0_1402, // mov r1, #0x02000000
        0xE3A0_2401, // mov r2, #0x01000000 (fill)
        0xE382_2003, // orr r2, r2, #3
        0xEF0B_0000, // swi 0x0B
    ]);
    machine.bus_mut().write16(IWRAM, 0xBEEF);
    run(&mut machine, 5);
    for i in 0..3 {
        assert_eq!(machine.bus_mut().read16(EWRAM + i * 2), 0xBEEF);
    }
    assert_eq!(machine.bus_mut().read16(EWRAM + 6), 0);
}

#[test]
fn test_cpu_fast_set_fill_rounds_to_blocks() {
    let mut machine = create_test_machine(&[
        0xE3A0_0403, // mov r0, #0x03000000
        0xE3A0_1402, // mov r1, #0x02000000
        0xE3A0_2401, // mov r2, #0x01000000 (fill)
        0xE382_2003, // orr r2, r2, #3
        0xEF0C_0000, // swi 0x0C
    ]);
    machine.bus_mut().write32(IWRAM, 0x5555_AAAA);
    run(&mut machine, 5);
    for i in 0..8 {
        assert_eq!(machine.bus_mut().read32(EWRAM + i * 4), 0x5555_AAAA);
    }
    assert_eq!(machine.bus_mut().read32(EWRAM + 32), 0);
}

#[test]
fn test_register_ram_reset_keeps_stack_area() {
    let mut machine = create_test_machine(&[
        0xE3A0_0003, // mov r0, #3
        0xEF01_0000, // swi 0x01
    ]);
    let bus = machine.bus_mut();
    bus.write32(EWRAM + 0x100, 0x1234);
    bus.write32(IWRAM + 0x100, 0x5678);
    bus.write32(0x0300_7F00, 0x9ABC);
    machine.write_io(io::DISPCNT, 0x0403);

    run(&mut machine, 2);
    let bus = machine.bus_mut();
    assert_eq!(bus.read32(EWRAM + 0x100), 0);
    assert_eq!(bus.read32(IWRAM + 0x100), 0);
    assert_eq!(bus.read32(0x0300_7F00), 0x9ABC);
    assert_eq!(machine.read_io(io::DISPCNT), 0x0080);
}

#[test]
fn test_soft_reset_restarts_cartridge() {
    let mut machine = create_test_machine(&[
        0xE3A0_0005, // mov r0, #5
        0xEF00_0000, // swi 0x00
    ]);
    machine.bus_mut().write32(0x0300_7F00, 0x1111);
    run(&mut machine, 2);
    assert_eq!(machine.pc(), 0x0800_0000);
    assert_eq!(machine.reg(0), 0);
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.bus_mut().read32(0x0300_7F00), 0);
}

#[test]
fn test_vblank_intr_wait() {
    let mut machine = create_test_machine(&[
        0xEF05_0000, // swi 0x05
        0xE3A0_5001, // mov r5, #1
        0xEAFF_FFFE, // b .
    ]);
    // Handler acknowledges IF and reports the interrupt at 0x03007FF8
    let handler = [
        0xE3A0_0301, // mov r0, #0x04000000
        0xE280_0C02, // add r0, r0, #0x200
        0xE3A0_1001, // mov r1, #1
        0xE1C0_10B2, // strh r1, [r0, #2]
        0xE3A0_0403, // mov r0, #0x03000000
        0xE280_0C7F, // add r0, r0, #0x7F00
        0xE280_00F8, // add r0, r0, #0xF8
        0xE1C0_10B0, // strh r1, [r0]
        0xE12F_FF1E, // bx lr
    ];
    for (i, word) in handler.iter().enumerate() {
        machine.bus_mut().write32(IWRAM + i as u32 * 4, *word);
    }
    machine.bus_mut().write32(0x0300_7FFC, IWRAM);
    machine.write_io(io::DISPSTAT, 0x0008);
    machine.write_io(io::IE, Interrupt::VBlank.mask());

    run(&mut machine, 1);
    assert!(machine.is_halted());
    // IntrWait turns on IME itself
    assert_eq!(machine.read_io(io::IME), 1);

    machine.run_frame().unwrap();
    assert_eq!(machine.mode(), Mode::Irq);
    run(&mut machine, 40);

    assert_eq!(machine.reg(5), 1);
    assert_eq!(machine.mode(), Mode::System);
    assert_eq!(machine.bus_mut().read16(0x0300_7FF8), 0);
}

#[test]
fn test_real_bios_image_disables_high_level_calls() {
    let mut machine = create_test_machine(&[
        0xE3A0_0064, // mov r0, #100
        0xE3A0_1007, // mov r1, #7
        0xEF06_0000, // swi 0x06
        0xEAFF_FFFE, // b .
    ]);
    machine.load_bios(&libagb::bios::stub_image()).unwrap();
    run(&mut machine, 4);
    // The stub image returns without dividing
    assert_eq!(machine.reg(0), 100);
    assert_eq!(machine.reg(1), 7);
}
