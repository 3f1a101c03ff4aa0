//! Integration tests for machine snapshots.
//!
//! These tests verify:
//! - Execution after a restore is identical to execution after the save
//! - Rejected snapshots leave the machine untouched
//! - Collaborator state (backup memory) travels with the snapshot

use libagb::devices::{io, Interrupt};
use libagb::{Machine, MachineConfig, MemoryBus, SaveType, SnapshotError};

/// Increments r0 forever, storing it to IWRAM each pass.
const COUNTER_LOOP: [u32; 5] = [
    0xE3A0_0000, // mov r0, #0
    0xE3A0_1403, // mov r1, #0x03000000
    0xE280_0001, // add r0, r0, #1
    0xE581_0000, // str r0, [r1]
    0xEAFF_FFFC, // b 8
];

/// Routes log output through the test harness; set RUST_LOG to see it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn create_test_machine(program: &[u32]) -> Machine {
    let rom: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&rom);
    machine
}

/// Sets up timer 0 and a VBlank handler so snapshots carry live device
/// and interrupt state.
fn start_devices(machine: &mut Machine) {
    let handler = [
        0xE3A0_0301, // mov r0, #0x04000000
        0xE280_0C02, // add r0, r0, #0x200
        0xE3A0_1001, // mov r1, #1
        0xE1C0_10B2, // strh r1, [r0, #2]
        0xE284_4001, // add r4, r4, #1
        0xE12F_FF1E, // bx lr
    ];
    for (i, word) in handler.iter().enumerate() {
        machine.bus_mut().write32(0x0300_0100 + i as u32 * 4, *word);
    }
    machine.bus_mut().write32(0x0300_7FFC, 0x0300_0100);
    machine.write_io(io::DISPSTAT, 0x0008);
    machine.write_io(io::IE, Interrupt::VBlank.mask());
    machine.write_io(io::IME, 1);
    machine.write_io(0x100, 0x8000);
    machine.write_io(0x102, 0x0081);
}

#[derive(Debug, PartialEq)]
struct TraceEntry {
    pc: u32,
    r0: u32,
    r4: u32,
    cpsr: u32,
    cycles: u64,
    vcount: u16,
    timer: u16,
}

fn trace(machine: &mut Machine, steps: usize) -> Vec<TraceEntry> {
    (0..steps)
        .map(|_| {
            machine.step().unwrap();
            TraceEntry {
                pc: machine.pc(),
                r0: machine.reg(0),
                r4: machine.reg(4),
                cpsr: machine.cpsr(),
                cycles: machine.cycles(),
                vcount: machine.vcount(),
                timer: machine.read_io(0x100),
            }
        })
        .collect()
}

#[test]
fn test_restored_machine_replays_identically() {
    init_tracing();
    let mut machine = create_test_machine(&COUNTER_LOOP);
    start_devices(&mut machine);
    // VBlank starts about 42,000 cycles after boot, inside the traced window
    for _ in 0..1_000 {
        machine.step().unwrap();
    }

    let snapshot = machine.save();
    let first = trace(&mut machine, 10_000);

    machine.load(&snapshot).unwrap();
    let second = trace(&mut machine, 10_000);

    assert_eq!(first, second);
    // The trace crossed at least one interrupt
    assert!(first.last().unwrap().r4 > first[0].r4);
}

#[test]
fn test_snapshot_into_fresh_machine() {
    let mut machine = create_test_machine(&COUNTER_LOOP);
    start_devices(&mut machine);
    for _ in 0..3_000 {
        machine.step().unwrap();
    }
    let snapshot = machine.save();

    let mut other = create_test_machine(&COUNTER_LOOP);
    other.load(&snapshot).unwrap();
    assert_eq!(other.save(), snapshot);
    assert_eq!(trace(&mut other, 2_000), trace(&mut machine, 2_000));
}

#[test]
fn test_truncated_snapshot_leaves_machine_unchanged() {
    init_tracing();
    let mut machine = create_test_machine(&COUNTER_LOOP);
    for _ in 0..100 {
        machine.step().unwrap();
    }
    let snapshot = machine.save();
    for _ in 0..100 {
        machine.step().unwrap();
    }
    let before = machine.save();

    let result = machine.load(&snapshot[..snapshot.len() / 2]);
    assert!(matches!(result, Err(SnapshotError::Truncated { .. })));
    assert_eq!(machine.save(), before);
}

#[test]
fn test_bad_magic() {
    let mut machine = create_test_machine(&COUNTER_LOOP);
    let mut snapshot = machine.save();
    snapshot[0] = b'X';
    assert_eq!(machine.load(&snapshot), Err(SnapshotError::BadMagic));
}

#[test]
fn test_bios_setting_must_match() {
    init_tracing();
    let mut with_bios = create_test_machine(&COUNTER_LOOP);
    with_bios.load_bios(&libagb::bios::stub_image()).unwrap();
    let snapshot = with_bios.save();

    let mut without_bios = create_test_machine(&COUNTER_LOOP);
    let before = without_bios.save();
    assert_eq!(without_bios.load(&snapshot), Err(SnapshotError::BiosMismatch));
    assert_eq!(without_bios.save(), before);
}

#[test]
fn test_backup_memory_is_restored() {
    let config = MachineConfig {
        save_type: SaveType::Sram,
        ..MachineConfig::default()
    };
    let mut machine = Machine::new(config);
    machine.load_rom(&0xEAFF_FFFEu32.to_le_bytes());

    machine.bus_mut().write8(0x0E00_0000, 0x42);
    let snapshot = machine.save();
    machine.bus_mut().write8(0x0E00_0000, 0x99);
    assert_eq!(machine.bus_mut().read8(0x0E00_0000), 0x99);

    machine.load(&snapshot).unwrap();
    assert_eq!(machine.bus_mut().read8(0x0E00_0000), 0x42);
    assert_eq!(machine.backup_data()[0], 0x42);
}

#[test]
fn test_halted_state_survives_snapshot() {
    let mut machine = create_test_machine(&[
        0xEF02_0000, // swi 0x02 (Halt)
        0xEAFF_FFFE, // b .
    ]);
    machine.write_io(io::DISPSTAT, 0x0008);
    machine.write_io(io::IE, Interrupt::VBlank.mask());
    machine.step().unwrap();
    assert!(machine.is_halted());

    let snapshot = machine.save();
    machine.run_frame().unwrap();
    assert!(!machine.is_halted());

    machine.load(&snapshot).unwrap();
    assert!(machine.is_halted());
}
