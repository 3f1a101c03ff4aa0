//! # Control Instructions
//!
//! Software interrupts for both encodings and the shared handler for every
//! undefined encoding.

use crate::cpu::Cpu;
use crate::MemoryBus;

/// Raises the undefined-instruction exception.
pub(crate) fn execute_undefined<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    cpu.undefined_exception(opcode, old_pc)
}

/// Executes ARM SWI. The call number is in bits 16-23.
pub(crate) fn execute_arm_swi<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    cpu.software_interrupt((opcode >> 16) & 0xFF, old_pc);
    let timing = cpu.timing();
    let ticks = timing.code_ticks_seq32(0) * 2 + timing.code_ticks32(0) + 3;
    timing.reset_prefetch();
    ticks
}

/// Executes Thumb SWI. The call number is the low byte.
pub(crate) fn execute_thumb_swi<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    cpu.software_interrupt(opcode & 0xFF, old_pc);
    let timing = cpu.timing();
    let ticks = timing.code_ticks_seq16(0) * 2 + timing.code_ticks16(0) + 3;
    timing.reset_prefetch();
    ticks
}
