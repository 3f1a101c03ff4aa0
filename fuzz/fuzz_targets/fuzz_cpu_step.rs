//! Fuzz target for instruction execution.
//!
//! This target builds a cartridge from arbitrary instruction words, starts
//! the CPU from an arbitrary register state in ARM or Thumb, and runs a
//! handful of steps through the full system bus.

#![no_main]

use arbitrary::Arbitrary;
use libagb::{Machine, MachineConfig};
use libfuzzer_sys::fuzz_target;

/// Arbitrary CPU initial state for fuzzing
#[derive(Debug, Arbitrary)]
struct FuzzCpuState {
    /// r0-r14
    regs: [u32; 15],
    /// Status word; reserved mode encodings are kept as-is
    cpsr: u32,
    /// Start in Thumb state
    thumb: bool,
}

/// Complete fuzz input
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    cpu_state: FuzzCpuState,
    /// Instruction words placed at the cartridge entry point
    program: [u32; 16],
    /// Pressed buttons
    keys: u16,
}

fuzz_target!(|input: FuzzInput| {
    let rom: Vec<u8> = input
        .program
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect();

    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&rom);
    machine.set_keys(input.keys);

    let cpu = machine.cpu_mut();
    cpu.set_cpsr(input.cpu_state.cpsr);
    for (index, &value) in input.cpu_state.regs.iter().enumerate() {
        cpu.set_reg(index, value);
    }
    cpu.jump(0x0800_0000, input.cpu_state.thumb);

    for _ in 0..32 {
        // A cartridge is loaded, so stepping cannot fail
        let _ = machine.step();

        // The pipeline is always aligned to the current state
        let width = if machine.cpu().is_thumb() { 2 } else { 4 };
        assert_eq!(machine.pc() % width, 0);
    }
});
