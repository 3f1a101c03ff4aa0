//! # ARM7TDMI Instruction Implementations
//!
//! This module contains the implementations of both instruction encodings,
//! organized by category. Every handler has the same shape:
//!
//! ```text
//! fn(cpu: &mut Cpu<M>, opcode: u32, old_pc: u32) -> u32
//! ```
//!
//! `old_pc` is the address of the instruction being executed; on entry r15
//! already reads as that address plus 8 (ARM) or plus 4 (Thumb). The return
//! value is the number of cycles consumed, including wait states.
//!
//! ## Categories
//!
//! - **arm_alu**: data processing, PSR transfer, multiplies
//! - **arm_load_store**: single, halfword, block transfers and SWP
//! - **arm_branches**: B, BL, BX
//! - **thumb_alu**: shifts, immediates, register ALU, high registers
//! - **thumb_load_store**: loads, stores, PUSH/POP, LDMIA/STMIA
//! - **thumb_branches**: conditional and unconditional branches, BL
//! - **control**: software interrupts and undefined encodings
//!
//! Shared helpers for condition codes, the barrel shifter and arithmetic
//! flags live here.

pub(crate) mod arm_alu;
pub(crate) mod arm_branches;
pub(crate) mod arm_load_store;
pub(crate) mod control;
pub(crate) mod thumb_alu;
pub(crate) mod thumb_branches;
pub(crate) mod thumb_load_store;

use crate::registers::RegisterFile;

/// Barrel shifter operation, as encoded in bits 5-6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    #[inline]
    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ShiftKind::Lsl,
            1 => ShiftKind::Lsr,
            2 => ShiftKind::Asr,
            _ => ShiftKind::Ror,
        }
    }
}

/// Evaluates a 4-bit condition field against the flags.
#[inline]
pub(crate) fn condition_passed(regs: &RegisterFile, cond: u32) -> bool {
    match cond & 0xF {
        0x0 => regs.flag_z,
        0x1 => !regs.flag_z,
        0x2 => regs.flag_c,
        0x3 => !regs.flag_c,
        0x4 => regs.flag_n,
        0x5 => !regs.flag_n,
        0x6 => regs.flag_v,
        0x7 => !regs.flag_v,
        0x8 => regs.flag_c && !regs.flag_z,
        0x9 => !regs.flag_c || regs.flag_z,
        0xA => regs.flag_n == regs.flag_v,
        0xB => regs.flag_n != regs.flag_v,
        0xC => !regs.flag_z && regs.flag_n == regs.flag_v,
        0xD => regs.flag_z || regs.flag_n != regs.flag_v,
        0xE => true,
        // NV: never on ARMv4
        _ => false,
    }
}

/// Shift by an immediate amount (0-31) with the immediate-form special
/// cases: LSR/ASR #0 mean #32 and ROR #0 means RRX.
///
/// Returns the result and the shifter carry-out.
#[inline]
pub(crate) fn shift_immediate(kind: ShiftKind, value: u32, amount: u32, carry: bool) -> (u32, bool) {
    match (kind, amount) {
        (ShiftKind::Lsl, 0) => (value, carry),
        (ShiftKind::Lsl, n) => (value << n, (value >> (32 - n)) & 1 != 0),
        (ShiftKind::Lsr, 0) => (0, value & 0x8000_0000 != 0),
        (ShiftKind::Lsr, n) => (value >> n, (value >> (n - 1)) & 1 != 0),
        (ShiftKind::Asr, 0) => {
            let fill = ((value as i32) >> 31) as u32;
            (fill, fill & 1 != 0)
        }
        (ShiftKind::Asr, n) => (((value as i32) >> n) as u32, (value >> (n - 1)) & 1 != 0),
        (ShiftKind::Ror, 0) => ((u32::from(carry) << 31) | (value >> 1), value & 1 != 0),
        (ShiftKind::Ror, n) => (value.rotate_right(n), (value >> (n - 1)) & 1 != 0),
    }
}

/// Shift by a register amount (bottom byte, 0-255).
///
/// An amount of zero leaves value and carry unchanged.
#[inline]
pub(crate) fn shift_register(kind: ShiftKind, value: u32, amount: u32, carry: bool) -> (u32, bool) {
    let amount = amount & 0xFF;
    if amount == 0 {
        return (value, carry);
    }
    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => (value << amount, (value >> (32 - amount)) & 1 != 0),
            32 => (0, value & 1 != 0),
            _ => (0, false),
        },
        ShiftKind::Lsr => match amount {
            1..=31 => (value >> amount, (value >> (amount - 1)) & 1 != 0),
            32 => (0, value & 0x8000_0000 != 0),
            _ => (0, false),
        },
        ShiftKind::Asr => {
            if amount < 32 {
                (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
            } else {
                let fill = ((value as i32) >> 31) as u32;
                (fill, fill & 1 != 0)
            }
        }
        ShiftKind::Ror => {
            let rotate = amount & 31;
            if rotate == 0 {
                (value, value & 0x8000_0000 != 0)
            } else {
                (value.rotate_right(rotate), (value >> (rotate - 1)) & 1 != 0)
            }
        }
    }
}

/// `a + b + carry_in`, setting NZCV.
#[inline]
pub(crate) fn add_with_flags(regs: &mut RegisterFile, a: u32, b: u32, carry_in: bool) -> u32 {
    let wide = u64::from(a) + u64::from(b) + u64::from(carry_in);
    let result = wide as u32;
    regs.set_nz(result);
    regs.flag_c = wide > 0xFFFF_FFFF;
    regs.flag_v = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    result
}

/// `a - b - !carry_in`, setting NZCV. Carry is the ARM "no borrow" flag.
#[inline]
pub(crate) fn sub_with_flags(regs: &mut RegisterFile, a: u32, b: u32, carry_in: bool) -> u32 {
    let borrow = u64::from(!carry_in);
    let result = a.wrapping_sub(b).wrapping_sub(borrow as u32);
    regs.set_nz(result);
    regs.flag_c = u64::from(a) >= u64::from(b) + borrow;
    regs.flag_v = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    result
}

/// Internal multiply cycles for a multiplier operand.
///
/// Signed forms terminate early when the top bits are all zeros or all ones;
/// unsigned forms only on zeros.
#[inline]
pub(crate) fn multiply_cycles(rs: u32, signed: bool) -> u32 {
    let value = if signed && rs & 0x8000_0000 != 0 { !rs } else { rs };
    if value & 0xFFFF_FF00 == 0 {
        1
    } else if value & 0xFFFF_0000 == 0 {
        2
    } else if value & 0xFF00_0000 == 0 {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions() {
        let mut regs = RegisterFile::new();
        regs.flag_z = true;
        assert!(condition_passed(&regs, 0x0));
        assert!(!condition_passed(&regs, 0x1));
        assert!(condition_passed(&regs, 0x9)); // LS
        regs.flag_n = true;
        assert!(condition_passed(&regs, 0xB)); // LT
        assert!(condition_passed(&regs, 0xE));
        assert!(!condition_passed(&regs, 0xF));
    }

    #[test]
    fn test_immediate_shift_special_cases() {
        assert_eq!(shift_immediate(ShiftKind::Lsl, 0x8000_0001, 0, true), (0x8000_0001, true));
        assert_eq!(shift_immediate(ShiftKind::Lsr, 0x8000_0000, 0, false), (0, true));
        assert_eq!(shift_immediate(ShiftKind::Asr, 0x8000_0000, 0, false), (0xFFFF_FFFF, true));
        assert_eq!(shift_immediate(ShiftKind::Ror, 0x0000_0003, 0, true), (0x8000_0001, true));
        assert_eq!(shift_immediate(ShiftKind::Lsl, 0x8000_0001, 1, false), (0x0000_0002, true));
    }

    #[test]
    fn test_register_shift_large_amounts() {
        assert_eq!(shift_register(ShiftKind::Lsl, 1, 32, false), (0, true));
        assert_eq!(shift_register(ShiftKind::Lsl, 1, 33, true), (0, false));
        assert_eq!(shift_register(ShiftKind::Lsr, 0x8000_0000, 32, false), (0, true));
        assert_eq!(shift_register(ShiftKind::Asr, 0x8000_0000, 100, false), (0xFFFF_FFFF, true));
        assert_eq!(shift_register(ShiftKind::Ror, 0x8000_0000, 32, false), (0x8000_0000, true));
        // Only the bottom byte counts
        assert_eq!(shift_register(ShiftKind::Lsl, 5, 0x100, true), (5, true));
    }

    #[test]
    fn test_add_sub_flags() {
        let mut regs = RegisterFile::new();
        assert_eq!(add_with_flags(&mut regs, 0x7FFF_FFFF, 1, false), 0x8000_0000);
        assert!(regs.flag_v && regs.flag_n && !regs.flag_c);

        assert_eq!(add_with_flags(&mut regs, 0xFFFF_FFFF, 1, false), 0);
        assert!(regs.flag_c && regs.flag_z && !regs.flag_v);

        assert_eq!(sub_with_flags(&mut regs, 5, 5, true), 0);
        assert!(regs.flag_c && regs.flag_z);

        assert_eq!(sub_with_flags(&mut regs, 0, 1, true), 0xFFFF_FFFF);
        assert!(!regs.flag_c && regs.flag_n);

        // SBC with borrow in
        assert_eq!(sub_with_flags(&mut regs, 5, 2, false), 2);
    }

    #[test]
    fn test_multiply_cycles() {
        assert_eq!(multiply_cycles(0xFF, false), 1);
        assert_eq!(multiply_cycles(0xFFFF_FFFF, true), 1);
        assert_eq!(multiply_cycles(0xFFFF_FFFF, false), 4);
        assert_eq!(multiply_cycles(0x0001_0000, false), 3);
    }
}
