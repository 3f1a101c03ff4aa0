//! # Thumb Branch Instructions
//!
//! - Bcc: conditional branch with a signed 8-bit halfword offset
//! - B: unconditional branch with a signed 11-bit halfword offset
//! - BL: long branch with link, split over two halfwords
//!
//! A not-taken branch costs one sequential fetch plus one cycle. A taken
//! branch refills the pipeline from the target region.

use super::condition_passed;
use crate::cpu::Cpu;
use crate::MemoryBus;

/// Executes a conditional branch.
pub(crate) fn execute_conditional_branch<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    old_pc: u32,
) -> u32 {
    if !condition_passed(&cpu.regs, opcode >> 8) {
        return cpu.timing().code_ticks_seq16(old_pc) + 1;
    }
    let offset = ((opcode as u8 as i8 as i32) << 1) as u32;
    let target = cpu.regs.r[15].wrapping_add(offset);
    cpu.branch_thumb(target)
}

/// Executes an unconditional branch.
pub(crate) fn execute_branch<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let offset = ((((opcode & 0x7FF) << 21) as i32) >> 20) as u32;
    let target = cpu.regs.r[15].wrapping_add(offset);
    cpu.branch_thumb(target)
}

/// Executes the first half of BL: LR = PC + (offset << 12).
pub(crate) fn execute_long_branch_high<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let offset = ((((opcode & 0x7FF) << 21) as i32) >> 9) as u32;
    cpu.regs.r[14] = cpu.regs.r[15].wrapping_add(offset);
    cpu.timing().code_ticks_seq16(old_pc) + 1
}

/// Executes the second half of BL: branch to LR + (offset << 1) and leave
/// the return address, with bit 0 set, in LR.
pub(crate) fn execute_long_branch_low<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let target = cpu.regs.r[14].wrapping_add((opcode & 0x7FF) << 1);
    let return_address = cpu.regs.r[15].wrapping_sub(2);
    cpu.regs.r[14] = return_address | 1;
    cpu.branch_thumb(target)
}

#[cfg(test)]
mod tests {
    use crate::{Cpu, FlatMemory, MemoryBus};

    fn thumb_cpu(halfwords: &[u16]) -> Cpu<FlatMemory> {
        let mut mem = FlatMemory::new();
        for (i, h) in halfwords.iter().enumerate() {
            mem.write16(0x0300_0000 + i as u32 * 2, *h);
        }
        let mut cpu = Cpu::new(mem);
        cpu.jump(0x0300_0000, true);
        cpu
    }

    #[test]
    fn test_beq_taken_and_not_taken() {
        // beq +4
        let mut cpu = thumb_cpu(&[0xD002]);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0002);

        let mut cpu = thumb_cpu(&[0xD002]);
        cpu.set_cpsr(cpu.cpsr() | crate::registers::FLAG_Z);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0008);
    }

    #[test]
    fn test_conditional_branch_costs() {
        // Not taken: one sequential fetch plus one cycle
        let mut cpu = thumb_cpu(&[0xD002]);
        assert_eq!(cpu.step(), 1);

        // Taken: refill from IWRAM, 2 * 0 + 0 + 3
        let mut cpu = thumb_cpu(&[0xD002]);
        cpu.set_cpsr(cpu.cpsr() | crate::registers::FLAG_Z);
        assert_eq!(cpu.step(), 3);
    }

    #[test]
    fn test_b_backward() {
        // b .
        let mut cpu = thumb_cpu(&[0xE7FE]);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0000);
    }

    #[test]
    fn test_bl_pair() {
        // bl +0x100 from 0x03000000
        let mut cpu = thumb_cpu(&[0xF000, 0xF87E]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0100);
        assert_eq!(cpu.reg(14), 0x0300_0005);
    }
}
