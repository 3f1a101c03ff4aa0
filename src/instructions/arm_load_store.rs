//! # ARM Load and Store Instructions
//!
//! This module implements the 32-bit encoding's memory transfers:
//! - LDR/STR/LDRB/STRB with immediate or shifted-register offsets
//! - LDRH/STRH/LDRSB/LDRSH
//! - LDM/STM in all four addressing modes, including the S-bit forms
//! - SWP/SWPB
//!
//! The multiply instructions share their decode slot with the halfword
//! transfers, so [`execute_multiply_or_halfword`] finishes that decode.
//!
//! ## Timing
//!
//! Before every transfer the prefetch buffer is armed if idle. Loads cost
//! `3 + data + nonseq32(next)`, stores `2 + data + nonseq32(next)`. A load
//! into r15 replaces the final non-sequential fetch with a full pipeline
//! refill.

use super::{arm_alu, shift_immediate, ShiftKind};
use crate::cpu::Cpu;
use crate::MemoryBus;

const BIT_P: u32 = 1 << 24;
const BIT_U: u32 = 1 << 23;
const BIT_B: u32 = 1 << 22;
const BIT_W: u32 = 1 << 21;
const BIT_L: u32 = 1 << 20;

#[inline]
fn reg_field(opcode: u32, shift: u32) -> usize {
    ((opcode >> shift) & 0xF) as usize
}

/// Applies an offset in the direction selected by the U bit.
#[inline]
fn offset_address(opcode: u32, base: u32, offset: u32) -> u32 {
    if opcode & BIT_U != 0 {
        base.wrapping_add(offset)
    } else {
        base.wrapping_sub(offset)
    }
}

/// Value of Rd as a store operand. r15 reads 12 bytes ahead.
#[inline]
fn store_operand<M: MemoryBus>(cpu: &Cpu<M>, rd: usize) -> u32 {
    let value = cpu.regs.r[rd];
    if rd == 15 {
        value.wrapping_add(4)
    } else {
        value
    }
}

/// Finishes a load: charges the trailing fetch, or refills the pipeline
/// when r15 was loaded.
fn finish_load<M: MemoryBus>(cpu: &mut Cpu<M>, rd: usize, value: u32, data: u32) -> u32 {
    if rd == 15 {
        3 + data + cpu.branch_arm(value)
    } else {
        cpu.regs.r[rd] = value;
        let next = cpu.next_pc;
        3 + data + cpu.timing().code_ticks32(next)
    }
}

fn finish_store<M: MemoryBus>(cpu: &mut Cpu<M>, data: u32) -> u32 {
    let next = cpu.next_pc;
    2 + data + cpu.timing().code_ticks32(next)
}

/// Executes LDR/STR/LDRB/STRB with a 12-bit immediate offset.
pub(crate) fn execute_single_immediate<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    _old_pc: u32,
) -> u32 {
    single_transfer(cpu, opcode, opcode & 0xFFF)
}

/// Executes LDR/STR/LDRB/STRB with a register offset shifted by an immediate.
pub(crate) fn execute_single_register<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    _old_pc: u32,
) -> u32 {
    let rm = cpu.regs.r[reg_field(opcode, 0)];
    let kind = ShiftKind::from_bits(opcode >> 5);
    let (offset, _) = shift_immediate(kind, rm, (opcode >> 7) & 0x1F, cpu.regs.flag_c);
    single_transfer(cpu, opcode, offset)
}

fn single_transfer<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, offset: u32) -> u32 {
    let rn = reg_field(opcode, 16);
    let rd = reg_field(opcode, 12);
    let base = cpu.regs.r[rn];
    let pre_index = opcode & BIT_P != 0;
    let moved = offset_address(opcode, base, offset);
    let addr = if pre_index { moved } else { base };
    // Post-indexed transfers always write back
    let writeback = (!pre_index || opcode & BIT_W != 0) && rn != 15;
    let byte = opcode & BIT_B != 0;

    cpu.timing().begin_data_access();

    if opcode & BIT_L != 0 {
        let (value, data) = if byte {
            let value = u32::from(cpu.bus.read8(addr));
            (value, cpu.timing().data_ticks16(addr))
        } else {
            let value = cpu.bus.read32(addr);
            (value, cpu.timing().data_ticks32(addr))
        };
        if writeback {
            cpu.regs.r[rn] = moved;
        }
        finish_load(cpu, rd, value, data)
    } else {
        let value = store_operand(cpu, rd);
        let data = if byte {
            cpu.bus.write8(addr, value as u8);
            cpu.timing().data_ticks16(addr)
        } else {
            cpu.bus.write32(addr, value);
            cpu.timing().data_ticks32(addr)
        };
        if writeback {
            cpu.regs.r[rn] = moved;
        }
        finish_store(cpu, data)
    }
}

/// Executes the instructions sharing the `bits 7 and 4 set` decode slot:
/// multiplies, SWP, and the halfword/signed transfers.
pub(crate) fn execute_multiply_or_halfword<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    old_pc: u32,
) -> u32 {
    if (opcode >> 5) & 3 != 0 {
        return halfword_transfer(cpu, opcode, old_pc);
    }
    let top = (opcode >> 23) & 0x1F;
    if (top == 0b00000 && opcode & BIT_B == 0) || top == 0b00001 {
        arm_alu::execute_multiply(cpu, opcode)
    } else if top == 0b00010 && (opcode >> 20) & 3 == 0 {
        swap(cpu, opcode)
    } else {
        cpu.undefined_exception(opcode, old_pc)
    }
}

fn halfword_transfer<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32 {
    let load = opcode & BIT_L != 0;
    let sh = (opcode >> 5) & 3;
    if !load && sh != 1 {
        return cpu.undefined_exception(opcode, old_pc);
    }

    let rn = reg_field(opcode, 16);
    let rd = reg_field(opcode, 12);
    let offset = if opcode & BIT_B != 0 {
        ((opcode >> 4) & 0xF0) | (opcode & 0xF)
    } else {
        cpu.regs.r[reg_field(opcode, 0)]
    };
    let base = cpu.regs.r[rn];
    let pre_index = opcode & BIT_P != 0;
    let moved = offset_address(opcode, base, offset);
    let addr = if pre_index { moved } else { base };
    let writeback = (!pre_index || opcode & BIT_W != 0) && rn != 15;

    cpu.timing().begin_data_access();

    if load {
        let value = match sh {
            1 => cpu.bus.read16(addr),
            2 => cpu.bus.read8(addr) as i8 as i32 as u32,
            // LDRSH from an odd address loads a signed byte
            _ if addr & 1 != 0 => cpu.bus.read8(addr) as i8 as i32 as u32,
            _ => cpu.bus.read16(addr) as u16 as i16 as i32 as u32,
        };
        let data = cpu.timing().data_ticks16(addr);
        if writeback {
            cpu.regs.r[rn] = moved;
        }
        finish_load(cpu, rd, value, data)
    } else {
        let value = store_operand(cpu, rd);
        cpu.bus.write16(addr, value as u16);
        let data = cpu.timing().data_ticks16(addr);
        if writeback {
            cpu.regs.r[rn] = moved;
        }
        finish_store(cpu, data)
    }
}

fn swap<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32) -> u32 {
    let addr = cpu.regs.r[reg_field(opcode, 16)];
    let rd = reg_field(opcode, 12);
    let source = cpu.regs.r[reg_field(opcode, 0)];

    cpu.timing().begin_data_access();
    let (value, data) = if opcode & BIT_B != 0 {
        let value = u32::from(cpu.bus.read8(addr));
        cpu.bus.write8(addr, source as u8);
        (value, cpu.timing().data_ticks16(addr))
    } else {
        let value = cpu.bus.read32(addr);
        cpu.bus.write32(addr, source);
        (value, cpu.timing().data_ticks32(addr))
    };
    cpu.regs.r[rd] = value;

    let next = cpu.next_pc;
    4 + data * 2 + cpu.timing().code_ticks32(next)
}

/// Executes LDM/STM.
///
/// An empty register list transfers r15 and moves the base by 0x40. With
/// the S bit and no r15 in a load list, the User bank is transferred; LDM
/// with r15 and the S bit also restores the CPSR from the SPSR.
pub(crate) fn execute_block<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let rn = reg_field(opcode, 16);
    let mut list = opcode & 0xFFFF;
    let size = if list == 0 {
        list = 1 << 15;
        0x40
    } else {
        list.count_ones() * 4
    };

    let base = cpu.regs.r[rn];
    let (start, final_base) = match (opcode & BIT_P != 0, opcode & BIT_U != 0) {
        (false, true) => (base, base.wrapping_add(size)),
        (true, true) => (base.wrapping_add(4), base.wrapping_add(size)),
        (false, false) => (base.wrapping_sub(size).wrapping_add(4), base.wrapping_sub(size)),
        (true, false) => (base.wrapping_sub(size), base.wrapping_sub(size)),
    };
    let writeback = opcode & BIT_W != 0;
    let user_bank = opcode & BIT_B != 0;

    cpu.timing().begin_data_access();

    let mut addr = start;
    let mut ticks = 0;
    let mut first = true;

    if opcode & BIT_L == 0 {
        for i in (0..16).filter(|i| list & (1 << i) != 0) {
            let mut value = if user_bank {
                cpu.regs.user_reg(i)
            } else {
                cpu.regs.r[i]
            };
            if i == 15 {
                value = value.wrapping_add(4);
            }
            cpu.bus.write32(addr & !3, value);
            ticks += 1 + access_ticks(cpu, addr, first);
            if first && writeback {
                cpu.regs.r[rn] = final_base;
            }
            first = false;
            addr = addr.wrapping_add(4);
        }
        let next = cpu.next_pc;
        return ticks + 1 + cpu.timing().code_ticks32(next);
    }

    let loads_pc = list & (1 << 15) != 0;
    let mut new_pc = 0;
    for i in (0..16).filter(|i| list & (1 << i) != 0) {
        let value = cpu.bus.read32(addr & !3);
        ticks += 1 + access_ticks(cpu, addr, first);
        if i == 15 {
            new_pc = value;
        } else if user_bank && !loads_pc {
            cpu.regs.set_user_reg(i, value);
        } else {
            cpu.regs.r[i] = value;
        }
        first = false;
        addr = addr.wrapping_add(4);
    }
    if writeback && list & (1 << rn) == 0 {
        cpu.regs.r[rn] = final_base;
    }

    if loads_pc {
        let refill = if user_bank {
            cpu.return_from_exception(new_pc)
        } else {
            cpu.branch_arm(new_pc)
        };
        ticks + 2 + refill
    } else {
        let next = cpu.next_pc;
        ticks + 2 + cpu.timing().code_ticks32(next)
    }
}

#[inline]
fn access_ticks<M: MemoryBus>(cpu: &mut Cpu<M>, addr: u32, first: bool) -> u32 {
    if first {
        cpu.timing().data_ticks32(addr)
    } else {
        cpu.timing().data_ticks_seq32(addr)
    }
}
