//! Integration tests for the timer block.
//!
//! These tests verify:
//! - Control writes take effect at the next scheduler event
//! - Overflow interrupts
//! - Lazy counter reads between events
//! - Cascade counting

use libagb::devices::io;
use libagb::devices::Timers;
use libagb::{Interrupt, Machine, MachineConfig};

/// `b .` (20 cycles in cartridge ROM with reset wait states)
const SPIN: u32 = 0xEAFF_FFFE;

const TM0CNT_L: u32 = 0x100;
const TM0CNT_H: u32 = 0x102;

fn create_test_machine(program: &[u32]) -> Machine {
    let rom: Vec<u8> = program.iter().flat_map(|w| w.to_le_bytes()).collect();
    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&rom);
    machine
}

#[test]
fn test_control_write_applies_at_next_event() {
    let mut machine = create_test_machine(&[SPIN]);
    machine.write_io(TM0CNT_H, 0xFFFF);
    assert_eq!(machine.read_io(TM0CNT_H), 0);

    machine.step().unwrap();
    // Unused control bits read back as zero
    assert_eq!(machine.read_io(TM0CNT_H), 0xC7);
    assert!(machine.bus().timers().timer(0).is_enabled());
}

#[test]
fn test_overflow_raises_interrupt() {
    let mut machine = create_test_machine(&[SPIN]);
    machine.write_io(TM0CNT_L, 0xFFF0);
    machine.write_io(TM0CNT_H, 0xC0);

    for _ in 0..4 {
        machine.step().unwrap();
    }
    assert_ne!(machine.read_io(io::IF) & Interrupt::Timer0.mask(), 0);
}

#[test]
fn test_no_interrupt_without_irq_enable() {
    let mut machine = create_test_machine(&[SPIN]);
    machine.write_io(TM0CNT_L, 0xFFF0);
    machine.write_io(TM0CNT_H, 0x80);

    for _ in 0..4 {
        machine.step().unwrap();
    }
    assert_eq!(machine.read_io(io::IF) & Interrupt::Timer0.mask(), 0);
}

#[test]
fn test_counter_reads_between_events() {
    let mut machine = create_test_machine(&[SPIN]);
    machine.write_io(TM0CNT_H, 0x80);
    machine.step().unwrap();

    let first = machine.read_io(TM0CNT_L);
    machine.step().unwrap();
    let second = machine.read_io(TM0CNT_L);
    assert_eq!(second.wrapping_sub(first), 20);
}

/// Timer 0 free-running at `prescale`, timer 1 cascading off it, both
/// advanced `calls` times by `clock` cycles.
fn cascade_count(reload: u16, prescale: u16, clock: i32, calls: usize) -> u16 {
    let mut timers = Timers::new();
    timers.write_reload(0, reload);
    timers.write_control(0, 0x80 | prescale);
    timers.write_reload(1, 0);
    timers.write_control(1, 0x84);
    timers.apply_pending();
    for _ in 0..calls {
        timers.advance(clock);
    }
    timers.timer(1).counter()
}

#[test]
fn test_cascade_counts_overflows() {
    // 256-cycle period, 2000 cycles
    assert_eq!(cascade_count(0xFF00, 0, 20, 100), 7);
    // Exactly on the boundary
    assert_eq!(cascade_count(0xFF00, 0, 16, 128), 8);
}

#[test]
fn test_cascade_counts_prescaled_overflows() {
    // 16 counts of 64 cycles, 6400 cycles
    assert_eq!(cascade_count(0xFFF0, 1, 64, 100), 6);
    assert_eq!(cascade_count(0xFFF0, 1, 64, 15), 0);
    assert_eq!(cascade_count(0xFFF0, 1, 64, 16), 1);
}

#[test]
fn test_stopped_timer_keeps_counter() {
    let mut machine = create_test_machine(&[SPIN]);
    machine.write_io(TM0CNT_H, 0x80);
    for _ in 0..10 {
        machine.step().unwrap();
    }
    machine.write_io(TM0CNT_H, 0x00);
    machine.step().unwrap();

    let frozen = machine.read_io(TM0CNT_L);
    for _ in 0..10 {
        machine.step().unwrap();
    }
    assert_eq!(machine.read_io(TM0CNT_L), frozen);
}
