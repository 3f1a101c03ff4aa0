//! ARM state instruction tests, run from cartridge ROM through the full
//! machine.

use libagb::{Machine, MachineConfig, MemoryBus, Mode};

const IWRAM: u32 = 0x0300_0000;

const FLAG_N: u32 = 1 << 31;
const FLAG_Z: u32 = 1 << 30;
const FLAG_C: u32 = 1 << 29;
const FLAG_V: u32 = 1 << 28;

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
fn test_subs_sets_negative_and_borrow() {
    let mut machine = create_test_machine(&[
        0xE3B0_0000, // movs r0, #0
        0xE250_1001, // subs r1, r0, #1
    ]);
    run(&mut machine, 1);
    assert_eq!(machine.cpsr() & (FLAG_N | FLAG_Z | FLAG_C | FLAG_V), FLAG_Z);

    run(&mut machine, 1);
    assert_eq!(machine.reg(1), 0xFFFF_FFFF);
    // Borrow clears C
    assert_eq!(machine.cpsr() & (FLAG_N | FLAG_Z | FLAG_C | FLAG_V), FLAG_N);
}

#[test]
fn test_adds_overflow() {
    let mut machine = create_test_machine(&[
        0xE3A0_0102, // mov r0, #0x80000000
        0xE090_1000, // adds r1, r0, r0
    ]);
    run(&mut machine, 2);
    assert_eq!(machine.reg(1), 0);
    assert_eq!(
        machine.cpsr() & (FLAG_N | FLAG_Z | FLAG_C | FLAG_V),
        FLAG_Z | FLAG_C | FLAG_V
    );
}

#[test]
fn test_conditional_execution() {
    let mut machine = create_test_machine(&[
        0xE3B0_0000, // movs r0, #0
        0x03A0_1001, // moveq r1, #1
        0x13A0_2001, // movne r2, #1
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(1), 1);
    assert_eq!(machine.reg(2), 0);
}

#[test]
fn test_shifted_register_operands() {
    let mut machine = create_test_machine(&[
        0xE3A0_1003, // mov r1, #3
        0xE3A0_2004, // mov r2, #4
        0xE1A0_0081, // mov r0, r1, lsl #1
        0xE1A0_3211, // mov r3, r1, lsl r2
        0xE1B0_40A1, // movs r4, r1, lsr #1
    ]);
    run(&mut machine, 5);
    assert_eq!(machine.reg(0), 6);
    assert_eq!(machine.reg(3), 48);
    assert_eq!(machine.reg(4), 1);
    // Last bit shifted out
    assert_ne!(machine.cpsr() & FLAG_C, 0);
}

#[test]
fn test_store_with_writeback() {
    let mut machine = create_test_machine(&[
        0xE3A0_1403, // mov r1, #0x03000000
        0xE3A0_0055, // mov r0, #0x55
        0xE5A1_0004, // str r0, [r1, #4]!
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(1), IWRAM + 4);
    assert_eq!(machine.bus_mut().read32(IWRAM + 4), 0x55);
}

#[test]
fn test_misaligned_load_rotates() {
    let mut machine = create_test_machine(&[
        0xE3A0_1403, // mov r1, #0x03000000
        0xE591_0001, // ldr r0, [r1, #1]
        0xE5D1_2001, // ldrb r2, [r1, #1]
    ]);
    machine.bus_mut().write32(IWRAM, 0x1122_3344);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0), 0x4411_2233);
    assert_eq!(machine.reg(2), 0x33);
}

#[test]
fn test_halfword_and_signed_loads() {
    let mut machine = create_test_machine(&[
        0xE3A0_1403, // mov r1, #0x03000000
        0xE1D1_20F2, // ldrsh r2, [r1, #2]
        0xE1D1_30B2, // ldrh r3, [r1, #2]
        0xE1D1_40D1, // ldrsb r4, [r1, #1]
    ]);
    machine.bus_mut().write32(IWRAM, 0x8001_80FF);
    run(&mut machine, 4);
    assert_eq!(machine.reg(2), 0xFFFF_8001);
    assert_eq!(machine.reg(3), 0x8001);
    assert_eq!(machine.reg(4), 0xFFFF_FF80);
}

#[test]
fn test_block_transfer() {
    let mut machine = create_test_machine(&[
        0xE3A0_1403, // mov r1, #0x03000000
        0xE3A0_0011, // mov r0, #0x11
        0xE3A0_2022, // mov r2, #0x22
        0xE8A1_0005, // stmia r1!, {r0, r2}
        0xE3A0_5403, // mov r5, #0x03000000
        0xE8B5_0018, // ldmia r5!, {r3, r4}
    ]);
    run(&mut machine, 6);
    assert_eq!(machine.reg(1), IWRAM + 8);
    assert_eq!(machine.bus_mut().read32(IWRAM), 0x11);
    assert_eq!(machine.bus_mut().read32(IWRAM + 4), 0x22);
    assert_eq!(machine.reg(3), 0x11);
    assert_eq!(machine.reg(4), 0x22);
    assert_eq!(machine.reg(5), IWRAM + 8);
}

#[test]
fn test_multiply() {
    let mut machine = create_test_machine(&[
        0xE3A0_0006, // mov r0, #6
        0xE3A0_1007, // mov r1, #7
        0xE002_0190, // mul r2, r0, r1
    ]);
    run(&mut machine, 3);
    assert_eq!(machine.reg(2), 42);
}

#[test]
fn test_long_multiply() {
    let mut machine = create_test_machine(&[
        0xE3E0_2000, // mvn r2, #0
        0xE3A0_3002, // mov r3, #2
        0xE081_0392, // umull r0, r1, r2, r3
        0xE0C5_4392, // smull r4, r5, r2, r3
    ]);
    run(&mut machine, 4);
    assert_eq!(machine.reg(0), 0xFFFF_FFFE);
    assert_eq!(machine.reg(1), 1);
    assert_eq!(machine.reg(4), 0xFFFF_FFFE);
    assert_eq!(machine.reg(5), 0xFFFF_FFFF);
}

#[test]
fn test_swap() {
    let mut machine = create_test_machine(&[
        0xE3A0_2403, // mov r2, #0x03000000
        0xE3A0_1099, // mov r1, #0x99
        0xE102_0091, // swp r0, r1, [r2]
    ]);
    machine.bus_mut().write32(IWRAM, 0x1234);
    run(&mut machine, 3);
    assert_eq!(machine.reg(0), 0x1234);
    assert_eq!(machine.bus_mut().read32(IWRAM), 0x99);
}

#[test]
fn test_status_register_transfer() {
    let mut machine = create_test_machine(&[
        0xE10F_0000, // mrs r0, cpsr
        0xE321_F0D3, // msr cpsr_c, #0xD3
        0xE10F_1000, // mrs r1, cpsr
    ]);
    run(&mut machine, 1);
    assert_eq!(machine.reg(0) & 0x1F, 0x1F);

    run(&mut machine, 2);
    assert_eq!(machine.mode(), Mode::Supervisor);
    assert_eq!(machine.reg(1) & 0xFF, 0xD3);
    assert_eq!(machine.reg(13), libagb::bios::STACK_SVC);
}

#[test]
fn test_user_mode_cannot_change_control_bits() {
    let mut machine = create_test_machine(&[
        0xE321_F010, // msr cpsr_c, #0x10 (to User)
        0xE321_F01F, // msr cpsr_c, #0x1F (ignored)
        0xE328_F202, // msr cpsr_f, #0x20000000
    ]);
    run(&mut machine, 1);
    assert_eq!(machine.mode(), Mode::User);
    run(&mut machine, 2);
    assert_eq!(machine.mode(), Mode::User);
    assert_eq!(machine.cpsr() & 0xF000_0000, FLAG_C);
}

#[test]
fn test_branch_with_link() {
    let mut machine = create_test_machine(&[
        0xEB00_0001, // bl +4 (to 0x0C)
        0xEAFF_FFFE, // b .
        0xEAFF_FFFE, // b .
        0xE3A0_0001, // mov r0, #1
        0xE1A0_F00E, // mov pc, lr
    ]);
    run(&mut machine, 1);
    assert_eq!(machine.pc(), 0x0800_000C);
    assert_eq!(machine.reg(14), 0x0800_0004);

    run(&mut machine, 2);
    assert_eq!(machine.reg(0), 1);
    assert_eq!(machine.pc(), 0x0800_0004);
}

#[test]
fn test_pc_reads_two_instructions_ahead() {
    let mut machine = create_test_machine(&[
        0xE1A0_000F, // mov r0, pc
        0xE28F_1000, // add r1, pc, #0
    ]);
    run(&mut machine, 2);
    assert_eq!(machine.reg(0), 0x0800_0008);
    assert_eq!(machine.reg(1), 0x0800_000C);
}
