//! # ARM Branch Instructions
//!
//! - B/BL: PC-relative branch with a signed 24-bit word offset
//! - BX: branch to a register, switching to Thumb state when bit 0 is set
//!
//! Every taken branch refills the pipeline and costs
//! `2 × seq(target) + nonseq(target) + 3` with the target region's wait
//! states.

use crate::cpu::Cpu;
use crate::MemoryBus;

/// Executes B and BL.
///
/// # Arguments
///
/// * `cpu` - Mutable reference to the CPU
/// * `opcode` - The 32-bit opcode; bit 24 selects BL
pub(crate) fn execute_branch<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let offset = (((opcode & 0x00FF_FFFF) << 8) as i32 >> 6) as u32;
    let pc = cpu.regs.r[15];
    if opcode & (1 << 24) != 0 {
        cpu.regs.r[14] = pc.wrapping_sub(4);
    }
    cpu.branch_arm(pc.wrapping_add(offset))
}

/// Executes BX.
///
/// The decode slot is wider than the instruction, so the fixed bits are
/// checked here.
pub(crate) fn execute_bx<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    if opcode & 0x0FFF_FFF0 != 0x012F_FF10 {
        return cpu.undefined_exception(opcode, old_pc);
    }
    let target = cpu.regs.r[(opcode & 0xF) as usize];
    cpu.branch_exchange(target)
}

#[cfg(test)]
mod tests {
    use crate::{Cpu, FlatMemory, MemoryBus};

    fn cpu_at(addr: u32, words: &[u32]) -> Cpu<FlatMemory> {
        let mut mem = FlatMemory::new();
        for (i, w) in words.iter().enumerate() {
            mem.write32(addr + i as u32 * 4, *w);
        }
        let mut cpu = Cpu::new(mem);
        cpu.jump(addr, false);
        cpu
    }

    #[test]
    fn test_branch_forward_and_link() {
        // bl +8 (target = pc + 8 + 8)
        let mut cpu = cpu_at(0x0300_0000, &[0xEB00_0002]);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0010);
        assert_eq!(cpu.reg(14), 0x0300_0004);
    }

    #[test]
    fn test_branch_backward() {
        // b . (offset -8)
        let mut cpu = cpu_at(0x0300_0000, &[0xEAFF_FFFE]);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0000);
    }

    #[test]
    fn test_bx_to_thumb() {
        // bx r0
        let mut cpu = cpu_at(0x0300_0000, &[0xE12F_FF10]);
        cpu.set_reg(0, 0x0300_0101);
        cpu.step();
        assert!(cpu.is_thumb());
        assert_eq!(cpu.pc(), 0x0300_0100);
        assert_eq!(cpu.reg(15), 0x0300_0102);
    }

    #[test]
    fn test_branch_cost_uses_target_region() {
        // bx from IWRAM into ROM: 2 * seq32(ROM) + nonseq32(ROM) + 3
        let mut cpu = cpu_at(0x0300_0000, &[0xE12F_FF10]);
        cpu.set_reg(0, 0x0800_0000);
        let ticks = cpu.step();
        assert_eq!(ticks, 2 * 5 + 7 + 3);
    }
}
