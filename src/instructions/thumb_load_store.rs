//! # Thumb Load and Store Instructions
//!
//! This module implements the 16-bit encoding's memory transfers:
//! - LDR Rd, [PC, #imm]
//! - Register-offset loads and stores, including the signed forms
//! - Immediate-offset word, byte and halfword transfers
//! - SP-relative transfers
//! - PUSH/POP and LDMIA/STMIA
//!
//! Loads cost `3 + data + nonseq16(next)`, stores `data + nonseq16(next) + 2`.
//! Multiple transfers charge the first word non-sequential and the rest
//! sequential, one extra cycle per word.

use crate::cpu::Cpu;
use crate::MemoryBus;

#[inline]
fn low_reg(opcode: u32, shift: u32) -> usize {
    ((opcode >> shift) & 7) as usize
}

/// Width and signedness of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Word,
    Half,
    Byte,
    SignedByte,
    SignedHalf,
}

fn load<M: MemoryBus>(cpu: &mut Cpu<M>, access: Access, addr: u32, rd: usize) -> u32 {
    cpu.timing().begin_data_access();
    let (value, data) = match access {
        Access::Word => {
            let value = cpu.bus.read32(addr);
            (value, cpu.timing().data_ticks32(addr))
        }
        Access::Half => {
            let value = cpu.bus.read16(addr);
            (value, cpu.timing().data_ticks16(addr))
        }
        Access::Byte => {
            let value = u32::from(cpu.bus.read8(addr));
            (value, cpu.timing().data_ticks16(addr))
        }
        Access::SignedByte => {
            let value = cpu.bus.read8(addr) as i8 as i32 as u32;
            (value, cpu.timing().data_ticks16(addr))
        }
        Access::SignedHalf => {
            let value = if addr & 1 != 0 {
                cpu.bus.read8(addr) as i8 as i32 as u32
            } else {
                cpu.bus.read16(addr) as u16 as i16 as i32 as u32
            };
            (value, cpu.timing().data_ticks16(addr))
        }
    };
    cpu.regs.r[rd] = value;
    let next = cpu.next_pc;
    3 + data + cpu.timing().code_ticks16(next)
}

fn store<M: MemoryBus>(cpu: &mut Cpu<M>, access: Access, addr: u32, rd: usize) -> u32 {
    cpu.timing().begin_data_access();
    let value = cpu.regs.r[rd];
    let data = match access {
        Access::Word => {
            cpu.bus.write32(addr, value);
            cpu.timing().data_ticks32(addr)
        }
        Access::Half | Access::SignedHalf => {
            cpu.bus.write16(addr, value as u16);
            cpu.timing().data_ticks16(addr)
        }
        Access::Byte | Access::SignedByte => {
            cpu.bus.write8(addr, value as u8);
            cpu.timing().data_ticks16(addr)
        }
    };
    let next = cpu.next_pc;
    data + cpu.timing().code_ticks16(next) + 2
}

/// Executes LDR Rd, [PC, #imm8×4]. The PC is word-aligned first.
pub(crate) fn execute_load_pc_relative<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let addr = (cpu.regs.r[15] & !3).wrapping_add((opcode & 0xFF) << 2);
    let ticks = load(cpu, Access::Word, addr, low_reg(opcode, 8));
    cpu.timing().reset_prefetch();
    ticks
}

/// Executes STR/STRH/STRB/LDRSB/LDR/LDRH/LDRB/LDRSH Rd, [Rb, Ro].
pub(crate) fn execute_register_offset<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let addr = cpu.regs.r[low_reg(opcode, 3)].wrapping_add(cpu.regs.r[low_reg(opcode, 6)]);
    let rd = low_reg(opcode, 0);
    match (opcode >> 9) & 7 {
        0 => store(cpu, Access::Word, addr, rd),
        1 => store(cpu, Access::Half, addr, rd),
        2 => store(cpu, Access::Byte, addr, rd),
        3 => load(cpu, Access::SignedByte, addr, rd),
        4 => load(cpu, Access::Word, addr, rd),
        5 => load(cpu, Access::Half, addr, rd),
        6 => load(cpu, Access::Byte, addr, rd),
        _ => load(cpu, Access::SignedHalf, addr, rd),
    }
}

/// Executes LDR/STR/LDRB/STRB Rd, [Rb, #imm5].
pub(crate) fn execute_immediate_offset<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let byte = opcode & (1 << 12) != 0;
    let offset = (opcode >> 6) & 0x1F;
    let (access, offset) = if byte {
        (Access::Byte, offset)
    } else {
        (Access::Word, offset << 2)
    };
    let addr = cpu.regs.r[low_reg(opcode, 3)].wrapping_add(offset);
    let rd = low_reg(opcode, 0);
    if opcode & (1 << 11) != 0 {
        load(cpu, access, addr, rd)
    } else {
        store(cpu, access, addr, rd)
    }
}

/// Executes LDRH/STRH Rd, [Rb, #imm5×2].
pub(crate) fn execute_halfword_immediate<M: MemoryBus>(
    cpu: &mut Cpu<M>,
    opcode: u32,
    _old_pc: u32,
) -> u32 {
    let addr = cpu.regs.r[low_reg(opcode, 3)].wrapping_add(((opcode >> 6) & 0x1F) << 1);
    let rd = low_reg(opcode, 0);
    if opcode & (1 << 11) != 0 {
        load(cpu, Access::Half, addr, rd)
    } else {
        store(cpu, Access::Half, addr, rd)
    }
}

/// Executes LDR/STR Rd, [SP, #imm8×4].
pub(crate) fn execute_sp_relative<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let addr = cpu.regs.r[13].wrapping_add((opcode & 0xFF) << 2);
    let rd = low_reg(opcode, 8);
    if opcode & (1 << 11) != 0 {
        load(cpu, Access::Word, addr, rd)
    } else {
        store(cpu, Access::Word, addr, rd)
    }
}

#[inline]
fn word_ticks<M: MemoryBus>(cpu: &mut Cpu<M>, addr: u32, first: bool) -> u32 {
    let data = if first {
        cpu.timing().data_ticks32(addr)
    } else {
        cpu.timing().data_ticks_seq32(addr)
    };
    1 + data
}

/// Executes PUSH {list, LR} and POP {list, PC}.
///
/// POP into the PC stays in Thumb state.
pub(crate) fn execute_push_pop<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let list = opcode & 0xFF;
    let extra = opcode & (1 << 8) != 0;
    let count = list.count_ones() + u32::from(extra);

    cpu.timing().begin_data_access();
    let mut ticks = 0;
    let mut first = true;

    if opcode & (1 << 11) == 0 {
        let start = cpu.regs.r[13].wrapping_sub(count * 4);
        let mut addr = start;
        for i in (0..8).filter(|i| list & (1 << i) != 0) {
            let value = cpu.regs.r[i];
            cpu.bus.write32(addr & !3, value);
            ticks += word_ticks(cpu, addr, first);
            first = false;
            addr = addr.wrapping_add(4);
        }
        if extra {
            let lr = cpu.regs.r[14];
            cpu.bus.write32(addr & !3, lr);
            ticks += word_ticks(cpu, addr, first);
        }
        cpu.regs.r[13] = start;
        let next = cpu.next_pc;
        return ticks + 1 + cpu.timing().code_ticks16(next);
    }

    let mut addr = cpu.regs.r[13];
    for i in (0..8).filter(|i| list & (1 << i) != 0) {
        cpu.regs.r[i] = cpu.bus.read32(addr & !3);
        ticks += word_ticks(cpu, addr, first);
        first = false;
        addr = addr.wrapping_add(4);
    }
    if extra {
        let target = cpu.bus.read32(addr & !3);
        ticks += word_ticks(cpu, addr, first);
        cpu.regs.r[13] = addr.wrapping_add(4);
        return ticks + 2 + cpu.branch_thumb(target);
    }
    cpu.regs.r[13] = addr;
    let next = cpu.next_pc;
    ticks + 2 + cpu.timing().code_ticks16(next)
}

/// Executes LDMIA/STMIA Rb!, {list}.
///
/// STMIA writes the base back after the first store, so a base register
/// stored first stores its original value. LDMIA skips the writeback when the
/// base is in the list. An empty list transfers the PC and moves the base by
/// 0x40.
pub(crate) fn execute_multiple<M: MemoryBus>(cpu: &mut Cpu<M>, opcode: u32, _old_pc: u32) -> u32 {
    let rb = low_reg(opcode, 8);
    let list = opcode & 0xFF;
    let base = cpu.regs.r[rb];

    cpu.timing().begin_data_access();

    if list == 0 {
        cpu.regs.r[rb] = base.wrapping_add(0x40);
        if opcode & (1 << 11) != 0 {
            let target = cpu.bus.read32(base & !3);
            let data = word_ticks(cpu, base, true);
            return data + 2 + cpu.branch_thumb(target);
        }
        let pc = cpu.regs.r[15].wrapping_add(2);
        cpu.bus.write32(base & !3, pc);
        let data = word_ticks(cpu, base, true);
        let next = cpu.next_pc;
        return data + 1 + cpu.timing().code_ticks16(next);
    }

    let final_base = base.wrapping_add(list.count_ones() * 4);
    let mut addr = base;
    let mut ticks = 0;
    let mut first = true;

    if opcode & (1 << 11) == 0 {
        for i in (0..8).filter(|i| list & (1 << i) != 0) {
            let value = cpu.regs.r[i];
            cpu.bus.write32(addr & !3, value);
            ticks += word_ticks(cpu, addr, first);
            if first {
                cpu.regs.r[rb] = final_base;
            }
            first = false;
            addr = addr.wrapping_add(4);
        }
        let next = cpu.next_pc;
        return ticks + 1 + cpu.timing().code_ticks16(next);
    }

    for i in (0..8).filter(|i| list & (1 << i) != 0) {
        cpu.regs.r[i] = cpu.bus.read32(addr & !3);
        ticks += word_ticks(cpu, addr, first);
        first = false;
        addr = addr.wrapping_add(4);
    }
    if list & (1 << rb) == 0 {
        cpu.regs.r[rb] = final_base;
    }
    let next = cpu.next_pc;
    ticks + 2 + cpu.timing().code_ticks16(next)
}
