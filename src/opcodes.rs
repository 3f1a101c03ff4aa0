//! # Opcode Class Tables
//!
//! This module is the single source of truth for instruction decoding. Both
//! encodings are decoded through a 1024-entry table:
//!
//! - **ARM**: the index is opcode bits 27-20 followed by bits 7 and 4
//!   (see [`arm_index`])
//! - **Thumb**: the index is `opcode >> 6` (see [`thumb_index`])
//!
//! Rather than spelling out 2048 entries, each encoding is described by an
//! ordered list of [`OpcodeClass`] patterns over the index. The first pattern
//! whose `index & mask == value` wins; an index no pattern matches is
//! undefined. The CPU expands these lists into handler tables once, at
//! construction.
//!
//! Some classes are wider than the real encoding (ARM `BX` needs every bit of
//! the opcode checked). Their handlers finish the decode and raise the
//! undefined-instruction exception themselves.

/// Instruction class for the 32-bit encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmKind {
    /// BX Rm
    BranchExchange,
    /// MUL/MLA, UMULL/SMULL family, SWP, and LDRH/STRH/LDRSB/LDRSH
    MultiplyOrHalfword,
    /// MRS and MSR with a register operand
    PsrTransfer,
    /// MSR with an immediate operand
    PsrImmediate,
    /// Data processing with a rotated immediate
    DataImmediate,
    /// Data processing with a register shifted by a register
    DataRegisterShift,
    /// Data processing with a register shifted by an immediate
    DataImmediateShift,
    /// LDR/STR with a 12-bit immediate offset
    SingleImmediate,
    /// LDR/STR with a shifted register offset
    SingleRegister,
    /// LDM/STM
    Block,
    /// B/BL
    Branch,
    /// SWI
    SoftwareInterrupt,
    /// Reserved, coprocessor and unallocated encodings
    Undefined,
}

/// Instruction class for the 16-bit encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbKind {
    /// LSL/LSR/ASR by immediate
    ShiftImmediate,
    /// ADD/SUB register or 3-bit immediate
    AddSubtract,
    /// MOV/CMP/ADD/SUB with an 8-bit immediate
    Immediate,
    /// Two-register ALU operations
    Alu,
    /// High-register ADD/CMP/MOV and BX
    HiRegister,
    /// LDR Rd, [PC, #imm]
    LoadPcRelative,
    /// Loads and stores with a register offset
    RegisterOffset,
    /// LDR/STR/LDRB/STRB with an immediate offset
    ImmediateOffset,
    /// LDRH/STRH with an immediate offset
    HalfwordImmediate,
    /// LDR/STR relative to SP
    SpRelative,
    /// ADD Rd, PC/SP, #imm
    LoadAddress,
    /// ADD SP, #±imm
    AdjustSp,
    /// PUSH/POP
    PushPop,
    /// LDMIA/STMIA
    Multiple,
    /// SWI
    SoftwareInterrupt,
    /// Conditional B
    ConditionalBranch,
    /// Unconditional B
    Branch,
    /// First half of BL
    LongBranchHigh,
    /// Second half of BL
    LongBranchLow,
    /// Unallocated encodings
    Undefined,
}

/// A pattern over the 10-bit dispatch index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeClass<K> {
    /// Index bits that must match.
    pub mask: u16,
    /// Required value of the masked bits.
    pub value: u16,
    /// Handler class.
    pub kind: K,
    /// Short name for debugging output.
    pub mnemonic: &'static str,
}

impl<K: Copy> OpcodeClass<K> {
    const fn new(mask: u16, value: u16, kind: K, mnemonic: &'static str) -> Self {
        Self {
            mask,
            value,
            kind,
            mnemonic,
        }
    }

    /// Returns true if `index` belongs to this class.
    #[inline]
    pub fn matches(&self, index: usize) -> bool {
        index as u16 & self.mask == self.value
    }
}

/// Ordered class list for the 32-bit encoding. First match wins.
pub const ARM_CLASSES: &[OpcodeClass<ArmKind>] = &[
    OpcodeClass::new(0x3FF, 0x049, ArmKind::BranchExchange, "BX"),
    OpcodeClass::new(0x383, 0x003, ArmKind::MultiplyOrHalfword, "MUL/LDRH"),
    OpcodeClass::new(0x3E7, 0x040, ArmKind::PsrTransfer, "MRS/MSR"),
    OpcodeClass::new(0x3E4, 0x040, ArmKind::Undefined, "???"),
    OpcodeClass::new(0x3EC, 0x0C8, ArmKind::PsrImmediate, "MSR"),
    OpcodeClass::new(0x3EC, 0x0C0, ArmKind::Undefined, "???"),
    OpcodeClass::new(0x380, 0x080, ArmKind::DataImmediate, "ALU"),
    OpcodeClass::new(0x383, 0x001, ArmKind::DataRegisterShift, "ALU"),
    OpcodeClass::new(0x381, 0x000, ArmKind::DataImmediateShift, "ALU"),
    OpcodeClass::new(0x380, 0x100, ArmKind::SingleImmediate, "LDR/STR"),
    OpcodeClass::new(0x381, 0x180, ArmKind::SingleRegister, "LDR/STR"),
    OpcodeClass::new(0x381, 0x181, ArmKind::Undefined, "???"),
    OpcodeClass::new(0x380, 0x200, ArmKind::Block, "LDM/STM"),
    OpcodeClass::new(0x380, 0x280, ArmKind::Branch, "B/BL"),
    OpcodeClass::new(0x380, 0x300, ArmKind::Undefined, "CDP"),
    OpcodeClass::new(0x3C0, 0x380, ArmKind::Undefined, "MCR"),
    OpcodeClass::new(0x3C0, 0x3C0, ArmKind::SoftwareInterrupt, "SWI"),
];

/// Ordered class list for the 16-bit encoding. First match wins.
pub const THUMB_CLASSES: &[OpcodeClass<ThumbKind>] = &[
    OpcodeClass::new(0x3E0, 0x000, ThumbKind::ShiftImmediate, "LSL"),
    OpcodeClass::new(0x3E0, 0x020, ThumbKind::ShiftImmediate, "LSR"),
    OpcodeClass::new(0x3E0, 0x040, ThumbKind::ShiftImmediate, "ASR"),
    OpcodeClass::new(0x3E0, 0x060, ThumbKind::AddSubtract, "ADD/SUB"),
    OpcodeClass::new(0x380, 0x080, ThumbKind::Immediate, "MOV/CMP/ADD/SUB"),
    OpcodeClass::new(0x3F0, 0x100, ThumbKind::Alu, "ALU"),
    OpcodeClass::new(0x3F0, 0x110, ThumbKind::HiRegister, "ADD/CMP/MOV/BX"),
    OpcodeClass::new(0x3E0, 0x120, ThumbKind::LoadPcRelative, "LDR"),
    OpcodeClass::new(0x3C0, 0x140, ThumbKind::RegisterOffset, "LDR/STR"),
    OpcodeClass::new(0x380, 0x180, ThumbKind::ImmediateOffset, "LDR/STR"),
    OpcodeClass::new(0x3C0, 0x200, ThumbKind::HalfwordImmediate, "LDRH/STRH"),
    OpcodeClass::new(0x3C0, 0x240, ThumbKind::SpRelative, "LDR/STR"),
    OpcodeClass::new(0x3C0, 0x280, ThumbKind::LoadAddress, "ADD"),
    OpcodeClass::new(0x3FC, 0x2C0, ThumbKind::AdjustSp, "ADD SP"),
    OpcodeClass::new(0x3D8, 0x2D0, ThumbKind::PushPop, "PUSH/POP"),
    OpcodeClass::new(0x3C0, 0x2C0, ThumbKind::Undefined, "???"),
    OpcodeClass::new(0x3C0, 0x300, ThumbKind::Multiple, "LDMIA/STMIA"),
    OpcodeClass::new(0x3FC, 0x37C, ThumbKind::SoftwareInterrupt, "SWI"),
    OpcodeClass::new(0x3FC, 0x378, ThumbKind::Undefined, "???"),
    OpcodeClass::new(0x3C0, 0x340, ThumbKind::ConditionalBranch, "Bcc"),
    OpcodeClass::new(0x3E0, 0x380, ThumbKind::Branch, "B"),
    OpcodeClass::new(0x3E0, 0x3A0, ThumbKind::Undefined, "???"),
    OpcodeClass::new(0x3E0, 0x3C0, ThumbKind::LongBranchHigh, "BL"),
    OpcodeClass::new(0x3E0, 0x3E0, ThumbKind::LongBranchLow, "BL"),
];

/// Number of entries in each dispatch table.
pub const TABLE_SIZE: usize = 1024;

/// Dispatch index of a 32-bit opcode: bits 27-20, then bit 7, then bit 4.
///
/// # Examples
///
/// ```
/// use libagb::opcodes::arm_index;
///
/// // bx r0
/// assert_eq!(arm_index(0xE12F_FF10), 0x049);
/// ```
#[inline]
pub fn arm_index(opcode: u32) -> usize {
    (((opcode >> 18) & 0x3FC) | ((opcode >> 6) & 2) | ((opcode >> 4) & 1)) as usize
}

/// Dispatch index of a 16-bit opcode.
#[inline]
pub fn thumb_index(opcode: u32) -> usize {
    ((opcode >> 6) & 0x3FF) as usize
}

/// Finds the first class matching `index`.
pub fn find_class<K: Copy>(classes: &[OpcodeClass<K>], index: usize) -> Option<&OpcodeClass<K>> {
    classes.iter().find(|class| class.matches(index))
}

/// Classifies a 32-bit opcode.
///
/// # Examples
///
/// ```
/// use libagb::opcodes::{classify_arm, ArmKind};
///
/// assert_eq!(classify_arm(0xE3A0_0001), ArmKind::DataImmediate); // mov r0, #1
/// assert_eq!(classify_arm(0xEA00_0000), ArmKind::Branch);
/// assert_eq!(classify_arm(0xEE00_0000), ArmKind::Undefined); // cdp
/// ```
pub fn classify_arm(opcode: u32) -> ArmKind {
    find_class(ARM_CLASSES, arm_index(opcode))
        .map(|class| class.kind)
        .unwrap_or(ArmKind::Undefined)
}

/// Classifies a 16-bit opcode.
pub fn classify_thumb(opcode: u32) -> ThumbKind {
    find_class(THUMB_CLASSES, thumb_index(opcode))
        .map(|class| class.kind)
        .unwrap_or(ThumbKind::Undefined)
}

/// Expands a class list into one entry per index, mapping each class through
/// `handler` and unmatched indices to `fallback`.
pub fn expand<K: Copy, H: Copy>(
    classes: &[OpcodeClass<K>],
    handler: impl Fn(K) -> H,
    fallback: H,
) -> Box<[H]> {
    (0..TABLE_SIZE)
        .map(|index| find_class(classes, index).map_or(fallback, |class| handler(class.kind)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_classification() {
        assert_eq!(classify_arm(0xE12F_FF1E), ArmKind::BranchExchange); // bx lr
        assert_eq!(classify_arm(0xE000_0291), ArmKind::MultiplyOrHalfword); // mul r0, r1, r2
        assert_eq!(classify_arm(0xE1D0_00B0), ArmKind::MultiplyOrHalfword); // ldrh r0, [r0]
        assert_eq!(classify_arm(0xE10F_0000), ArmKind::PsrTransfer); // mrs r0, cpsr
        assert_eq!(classify_arm(0xE129_F000), ArmKind::PsrTransfer); // msr cpsr_fc, r0
        assert_eq!(classify_arm(0xE328_F20F), ArmKind::PsrImmediate); // msr cpsr_f, #imm
        assert_eq!(classify_arm(0xE081_0002), ArmKind::DataImmediateShift); // add r0, r1, r2
        assert_eq!(classify_arm(0xE081_0312), ArmKind::DataRegisterShift); // add r0, r1, r2, lsl r3
        assert_eq!(classify_arm(0xE591_0004), ArmKind::SingleImmediate); // ldr r0, [r1, #4]
        assert_eq!(classify_arm(0xE791_0002), ArmKind::SingleRegister); // ldr r0, [r1, r2]
        assert_eq!(classify_arm(0xE8BD_8000), ArmKind::Block); // pop {pc}
        assert_eq!(classify_arm(0xEB00_0000), ArmKind::Branch); // bl
        assert_eq!(classify_arm(0xEF00_0000), ArmKind::SoftwareInterrupt);
        assert_eq!(classify_arm(0xE7F0_00F0), ArmKind::Undefined);
    }

    #[test]
    fn test_thumb_classification() {
        assert_eq!(classify_thumb(0x0048), ThumbKind::ShiftImmediate); // lsl r0, r1, #1
        assert_eq!(classify_thumb(0x1888), ThumbKind::AddSubtract); // add r0, r1, r2
        assert_eq!(classify_thumb(0x2001), ThumbKind::Immediate); // mov r0, #1
        assert_eq!(classify_thumb(0x4008), ThumbKind::Alu); // and r0, r1
        assert_eq!(classify_thumb(0x4770), ThumbKind::HiRegister); // bx lr
        assert_eq!(classify_thumb(0x4801), ThumbKind::LoadPcRelative);
        assert_eq!(classify_thumb(0xB081), ThumbKind::AdjustSp); // sub sp, #4
        assert_eq!(classify_thumb(0xB500), ThumbKind::PushPop); // push {lr}
        assert_eq!(classify_thumb(0xBD00), ThumbKind::PushPop); // pop {pc}
        assert_eq!(classify_thumb(0xBE00), ThumbKind::Undefined); // bkpt
        assert_eq!(classify_thumb(0xDF05), ThumbKind::SoftwareInterrupt);
        assert_eq!(classify_thumb(0xDE00), ThumbKind::Undefined);
        assert_eq!(classify_thumb(0xD0FE), ThumbKind::ConditionalBranch);
        assert_eq!(classify_thumb(0xE7FE), ThumbKind::Branch);
        assert_eq!(classify_thumb(0xE800), ThumbKind::Undefined); // blx suffix
        assert_eq!(classify_thumb(0xF000), ThumbKind::LongBranchHigh);
        assert_eq!(classify_thumb(0xF800), ThumbKind::LongBranchLow);
    }

    #[test]
    fn test_every_thumb_index_is_classified() {
        let undefined = (0..TABLE_SIZE)
            .filter(|&i| find_class(THUMB_CLASSES, i).is_none())
            .count();
        assert_eq!(undefined, 0);
    }

    #[test]
    fn test_expand_uses_fallback() {
        let table = expand(&ARM_CLASSES[..1], |_| 1u8, 0u8);
        assert_eq!(table.len(), TABLE_SIZE);
        assert_eq!(table[0x049], 1);
        assert_eq!(table[0x048], 0);
    }
}
