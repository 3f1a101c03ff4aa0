//! # ARM Data Processing Instructions
//!
//! This module implements the 32-bit encoding's register arithmetic:
//! - Data processing (AND, EOR, SUB, RSB, ADD, ADC, SBC, RSC, TST, TEQ, CMP,
//!   CMN, ORR, MOV, BIC, MVN) with all three operand forms
//! - PSR transfer (MRS, MSR)
//! - Multiplies (MUL, MLA, UMULL, UMLAL, SMULL, SMLAL)

use super::{
    add_with_flags, multiply_cycles, shift_immediate, shift_register, sub_with_flags, ShiftKind,
};
use crate::cpu::Cpu;
use crate::registers::{RegisterFile, FLAG_T};
use crate::MemoryBus;

const OP_TST: u32 = 0x8;
const OP_CMN: u32 = 0xB;

/// Executes a data processing instruction with a rotated 8-bit immediate.
pub(crate) fn execute_data_immediate<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let rotate = ((opcode >> 8) & 0xF) * 2;
    let operand = (opcode & 0xFF).rotate_right(rotate);
    let carry = if rotate != 0 {
        operand & 0x8000_0000 != 0
    } else {
        cpu.regs.flag_c
    };
    let rn = cpu.regs.r[((opcode >> 16) & 0xF) as usize];
    data_processing(cpu, opcode, rn, operand, carry, 0)
}

/// Executes a data processing instruction whose second operand is a
/// register shifted by a 5-bit immediate.
pub(crate) fn execute_data_immediate_shift<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    _old_pc: u32,
) -> u32 {
    let rm = cpu.regs.r[(opcode & 0xF) as usize];
    let kind = ShiftKind::from_bits(opcode >> 5);
    let (operand, carry) = shift_immediate(kind, rm, (opcode >> 7) & 0x1F, cpu.regs.flag_c);
    let rn = cpu.regs.r[((opcode >> 16) & 0xF) as usize];
    data_processing(cpu, opcode, rn, operand, carry, 0)
}

/// Executes a data processing instruction whose second operand is a
/// register shifted by another register.
///
/// The extra internal cycle for reading Rs means r15 reads 4 bytes further
/// ahead in this form.
pub(crate) fn execute_data_register_shift<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    _old_pc: u32,
) -> u32 {
    let read = |regs: &RegisterFile, index: u32| -> u32 {
        let value = regs.r[index as usize];
        if index == 15 {
            value.wrapping_add(4)
        } else {
            value
        }
    };
    let rm = read(&cpu.regs, opcode & 0xF);
    let amount = cpu.regs.r[((opcode >> 8) & 0xF) as usize] & 0xFF;
    let kind = ShiftKind::from_bits(opcode >> 5);
    let (operand, carry) = shift_register(kind, rm, amount, cpu.regs.flag_c);
    let rn = read(&cpu.regs, (opcode >> 16) & 0xF);
    data_processing(cpu, opcode, rn, operand, carry, 1)
}

fn data_processing<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    rn: u32,
    operand: u32,
    shifter_carry: bool,
    extra: u32,
) -> u32 {
    let op = (opcode >> 21) & 0xF;
    let set_flags = opcode & (1 << 20) != 0;
    let rd = ((opcode >> 12) & 0xF) as usize;
    let regs = &mut cpu.regs;

    let result = match op {
        0x0 | 0x8 => rn & operand,
        0x1 | 0x9 => rn ^ operand,
        0xC => rn | operand,
        0xD => operand,
        0xE => rn & !operand,
        0xF => !operand,
        _ => arithmetic(regs, op, set_flags, rn, operand),
    };

    let logical = matches!(op, 0x0 | 0x1 | 0x8 | 0x9 | 0xC..=0xF);
    if set_flags && logical {
        regs.set_nz(result);
        regs.flag_c = shifter_carry;
    }

    // TST, TEQ, CMP, CMN only set flags
    if (OP_TST..=OP_CMN).contains(&op) {
        let next = cpu.next_pc;
        return 1 + extra + cpu.timing().code_ticks_seq32(next);
    }

    if rd == 15 {
        let ticks = if set_flags {
            cpu.return_from_exception(result)
        } else {
            cpu.branch_arm(result)
        };
        return ticks + extra;
    }

    cpu.regs.r[rd] = result;
    let next = cpu.next_pc;
    1 + extra + cpu.timing().code_ticks_seq32(next)
}

fn arithmetic(regs: &mut RegisterFile, op: u32, set_flags: bool, rn: u32, operand: u32) -> u32 {
    let carry = regs.flag_c;
    if set_flags {
        match op {
            0x2 | 0xA => sub_with_flags(regs, rn, operand, true),
            0x3 => sub_with_flags(regs, operand, rn, true),
            0x4 | 0xB => add_with_flags(regs, rn, operand, false),
            0x5 => add_with_flags(regs, rn, operand, carry),
            0x6 => sub_with_flags(regs, rn, operand, carry),
            _ => sub_with_flags(regs, operand, rn, carry),
        }
    } else {
        match op {
            0x2 | 0xA => rn.wrapping_sub(operand),
            0x3 => operand.wrapping_sub(rn),
            0x4 | 0xB => rn.wrapping_add(operand),
            0x5 => rn.wrapping_add(operand).wrapping_add(u32::from(carry)),
            0x6 => rn.wrapping_sub(operand).wrapping_sub(u32::from(!carry)),
            _ => operand.wrapping_sub(rn).wrapping_sub(u32::from(!carry)),
        }
    }
}

/// Executes MRS, or MSR with a register operand.
pub(crate) fn execute_psr_transfer<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    if opcode & (1 << 21) == 0 {
        // MRS
        let value = if opcode & (1 << 22) != 0 {
            cpu.regs.spsr()
        } else {
            cpu.regs.cpsr()
        };
        cpu.regs.r[((opcode >> 12) & 0xF) as usize] = value;
    } else {
        let value = cpu.regs.r[(opcode & 0xF) as usize];
        write_psr(cpu, opcode, value);
    }
    let next = cpu.next_pc;
    1 + cpu.timing().code_ticks_seq32(next)
}

/// Executes MSR with a rotated immediate.
pub(crate) fn execute_msr_immediate<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let value = (opcode & 0xFF).rotate_right(((opcode >> 8) & 0xF) * 2);
    write_psr(cpu, opcode, value);
    let next = cpu.next_pc;
    1 + cpu.timing().code_ticks_seq32(next)
}

/// Writes the fields selected by bits 16 (control) and 19 (flags).
///
/// The control field is only writable in privileged modes. The T bit of the
/// CPSR can never be changed this way.
fn write_psr<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, value: u32) {
    let mut mask = 0;
    if opcode & (1 << 19) != 0 {
        mask |= 0xFF00_0000;
    }
    if opcode & (1 << 16) != 0 && cpu.regs.mode.is_privileged() {
        mask |= 0x0000_00FF;
    }

    if opcode & (1 << 22) != 0 {
        let spsr = cpu.regs.spsr();
        cpu.regs.set_spsr((spsr & !mask) | (value & mask));
        return;
    }

    let old = cpu.regs.cpsr();
    let new = (old & !mask) | (value & mask);
    let new = (new & !FLAG_T) | (old & FLAG_T);
    let was_masked = cpu.regs.irq_disabled;
    cpu.regs.set_cpsr(new);
    if was_masked && !cpu.regs.irq_disabled {
        cpu.bus.irq_unmasked();
    }
}

/// Executes MUL/MLA and the 64-bit multiply family.
///
/// # Arguments
///
/// * `cpu` - Mutable reference to the CPU
/// * `opcode` - Opcode with bits 27-23 of `00000` (32-bit) or `00001` (64-bit)
pub(crate) fn execute_multiply<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32) -> u32 {
    let accumulate = opcode & (1 << 21) != 0;
    let set_flags = opcode & (1 << 20) != 0;
    let rs = cpu.regs.r[((opcode >> 8) & 0xF) as usize];
    let rm = cpu.regs.r[(opcode & 0xF) as usize];
    let hi = ((opcode >> 16) & 0xF) as usize;
    let lo = ((opcode >> 12) & 0xF) as usize;

    let mut cycles;
    if opcode & (1 << 23) == 0 {
        let mut result = rm.wrapping_mul(rs);
        if accumulate {
            result = result.wrapping_add(cpu.regs.r[lo]);
        }
        cpu.regs.r[hi] = result;
        if set_flags {
            cpu.regs.set_nz(result);
        }
        cycles = multiply_cycles(rs, true);
    } else {
        let signed = opcode & (1 << 22) != 0;
        let mut result = if signed {
            (i64::from(rm as i32) * i64::from(rs as i32)) as u64
        } else {
            u64::from(rm) * u64::from(rs)
        };
        if accumulate {
            let acc = (u64::from(cpu.regs.r[hi]) << 32) | u64::from(cpu.regs.r[lo]);
            result = result.wrapping_add(acc);
        }
        cpu.regs.r[lo] = result as u32;
        cpu.regs.r[hi] = (result >> 32) as u32;
        if set_flags {
            cpu.regs.flag_n = result & (1 << 63) != 0;
            cpu.regs.flag_z = result == 0;
        }
        cycles = multiply_cycles(rs, signed) + 1;
    }
    if accumulate {
        cycles += 1;
    }

    let next = cpu.next_pc;
    let timing = cpu.timing();
    timing.internal_cycles(cycles);
    cycles + timing.code_ticks32(next) + 1
}
