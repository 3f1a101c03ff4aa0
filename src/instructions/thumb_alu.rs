//! # Thumb Arithmetic and Logic Instructions
//!
//! This module implements the 16-bit encoding's register arithmetic:
//! - LSL/LSR/ASR by immediate
//! - ADD/SUB with a register or 3-bit immediate
//! - MOV/CMP/ADD/SUB with an 8-bit immediate
//! - The sixteen two-register ALU operations, including MUL
//! - High-register ADD/CMP/MOV and BX
//! - ADD Rd, PC/SP and ADD SP, #imm
//!
//! Plain ALU operations cost one sequential fetch plus one cycle.

use super::{
    add_with_flags, multiply_cycles, shift_immediate, shift_register, sub_with_flags, ShiftKind,
};
use crate::cpu::Cpu;
use crate::MemoryBus;

#[inline]
fn low_reg(opcode: u32, shift: u32) -> usize {
    ((opcode >> shift) & 7) as usize
}

#[inline]
fn alu_ticks<M: MemoryBus>(cpu: &mut Cpu<M>, old_pc: u32) -> u32 {
    cpu.timing().code_ticks_seq16(old_pc) + 1
}

/// Executes LSL/LSR/ASR Rd, Rs, #offset.
pub(crate) fn execute_shift_immediate<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let kind = ShiftKind::from_bits(opcode >> 11);
    let value = cpu.regs.r[low_reg(opcode, 3)];
    let (result, carry) = shift_immediate(kind, value, (opcode >> 6) & 0x1F, cpu.regs.flag_c);
    cpu.regs.flag_c = carry;
    cpu.regs.set_nz(result);
    cpu.regs.r[low_reg(opcode, 0)] = result;
    alu_ticks(cpu, old_pc)
}

/// Executes ADD/SUB Rd, Rs, Rn|#imm3.
pub(crate) fn execute_add_subtract<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let field = (opcode >> 6) & 7;
    let operand = if opcode & (1 << 10) != 0 {
        field
    } else {
        cpu.regs.r[field as usize]
    };
    let lhs = cpu.regs.r[low_reg(opcode, 3)];
    let result = if opcode & (1 << 9) != 0 {
        sub_with_flags(&mut cpu.regs, lhs, operand, true)
    } else {
        add_with_flags(&mut cpu.regs, lhs, operand, false)
    };
    cpu.regs.r[low_reg(opcode, 0)] = result;
    alu_ticks(cpu, old_pc)
}

/// Executes MOV/CMP/ADD/SUB Rd, #imm8.
pub(crate) fn execute_immediate<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let rd = low_reg(opcode, 8);
    let imm = opcode & 0xFF;
    let value = cpu.regs.r[rd];
    match (opcode >> 11) & 3 {
        0 => {
            cpu.regs.set_nz(imm);
            cpu.regs.r[rd] = imm;
        }
        1 => {
            sub_with_flags(&mut cpu.regs, value, imm, true);
        }
        2 => cpu.regs.r[rd] = add_with_flags(&mut cpu.regs, value, imm, false),
        _ => cpu.regs.r[rd] = sub_with_flags(&mut cpu.regs, value, imm, true),
    }
    alu_ticks(cpu, old_pc)
}

/// Executes the two-register ALU group.
///
/// Register-specified shifts cost a non-sequential fetch plus two cycles;
/// MUL costs its internal cycles plus a non-sequential fetch plus one.
pub(crate) fn execute_alu<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let rd = low_reg(opcode, 0);
    let rs = cpu.regs.r[low_reg(opcode, 3)];
    let value = cpu.regs.r[rd];
    let regs = &mut cpu.regs;

    let op = (opcode >> 6) & 0xF;
    match op {
        0x0 | 0x1 | 0xC | 0xE | 0xF | 0x8 => {
            let result = match op {
                0x0 | 0x8 => value & rs,
                0x1 => value ^ rs,
                0xC => value | rs,
                0xE => value & !rs,
                _ => !rs,
            };
            regs.set_nz(result);
            if op != 0x8 {
                regs.r[rd] = result;
            }
        }
        0x2 | 0x3 | 0x4 | 0x7 => {
            let kind = match op {
                0x2 => ShiftKind::Lsl,
                0x3 => ShiftKind::Lsr,
                0x4 => ShiftKind::Asr,
                _ => ShiftKind::Ror,
            };
            let (result, carry) = shift_register(kind, value, rs, regs.flag_c);
            regs.flag_c = carry;
            regs.set_nz(result);
            regs.r[rd] = result;
            let next = cpu.next_pc;
            return cpu.timing().code_ticks16(next) + 2;
        }
        0x5 => {
            let carry = regs.flag_c;
            regs.r[rd] = add_with_flags(regs, value, rs, carry);
        }
        0x6 => {
            let carry = regs.flag_c;
            regs.r[rd] = sub_with_flags(regs, value, rs, carry);
        }
        0x9 => regs.r[rd] = sub_with_flags(regs, 0, rs, true),
        0xA => {
            sub_with_flags(regs, value, rs, true);
        }
        0xB => {
            add_with_flags(regs, value, rs, false);
        }
        _ => {
            // MUL: the early-termination count comes from Rd
            let result = value.wrapping_mul(rs);
            regs.set_nz(result);
            regs.r[rd] = result;
            let cycles = multiply_cycles(value, true);
            let next = cpu.next_pc;
            let timing = cpu.timing();
            timing.internal_cycles(cycles);
            return cycles + timing.code_ticks16(next) + 1;
        }
    }
    alu_ticks(cpu, old_pc)
}

/// Executes high-register ADD/CMP/MOV and BX.
///
/// Writing r15 through ADD or MOV branches without leaving Thumb state.
pub(crate) fn execute_hi_register<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let rs = (((opcode >> 3) & 8) | ((opcode >> 3) & 7)) as usize;
    let rd = (((opcode >> 4) & 8) | (opcode & 7)) as usize;
    let source = cpu.regs.r[rs];

    match (opcode >> 8) & 3 {
        0 => {
            let result = cpu.regs.r[rd].wrapping_add(source);
            if rd == 15 {
                return cpu.branch_thumb(result);
            }
            cpu.regs.r[rd] = result;
        }
        1 => {
            let lhs = cpu.regs.r[rd];
            sub_with_flags(&mut cpu.regs, lhs, source, true);
        }
        2 => {
            if rd == 15 {
                return cpu.branch_thumb(source);
            }
            cpu.regs.r[rd] = source;
        }
        _ => return cpu.branch_exchange(source),
    }
    alu_ticks(cpu, old_pc)
}

/// Executes ADD Rd, PC, #imm and ADD Rd, SP, #imm.
pub(crate) fn execute_load_address<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let offset = (opcode & 0xFF) << 2;
    let base = if opcode & (1 << 11) != 0 {
        cpu.regs.r[13]
    } else {
        cpu.regs.r[15] & !3
    };
    cpu.regs.r[low_reg(opcode, 8)] = base.wrapping_add(offset);
    alu_ticks(cpu, old_pc)
}

/// Executes ADD SP, #±imm7×4.
pub(crate) fn execute_adjust_sp<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let offset = (opcode & 0x7F) << 2;
    cpu.regs.r[13] = if opcode & 0x80 != 0 {
        cpu.regs.r[13].wrapping_sub(offset)
    } else {
        cpu.regs.r[13].wrapping_add(offset)
    };
    alu_ticks(cpu, old_pc)
}
