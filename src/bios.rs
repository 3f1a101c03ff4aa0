//! # BIOS Support
//!
//! The system ROM at 0x0000_0000 holds the exception vectors and the
//! software-interrupt services. When no BIOS image is installed the core maps
//! a small built-in stub and services the common SWI calls directly
//! (high-level emulation).
//!
//! ## Stub Layout
//!
//! | Address | Contents                                           |
//! |---------|----------------------------------------------------|
//! | 0x000   | `mov pc, #0x08000000`                              |
//! | 0x004   | `movs pc, lr` (undefined instruction)              |
//! | 0x008   | `movs pc, lr` (software interrupt)                 |
//! | 0x018   | `b 0x128` (IRQ)                                    |
//! | 0x128   | IRQ dispatcher calling the handler at `[0x03FFFFFC]` |
//!
//! ## High-Level Calls
//!
//! SoftReset, RegisterRamReset, Halt, Stop, IntrWait, VBlankIntrWait, Div,
//! DivArm, Sqrt, CpuSet, CpuFastSet and GetBiosChecksum are serviced without
//! leaving the caller's mode. Any other call number is logged and vectors
//! into the stub, which returns immediately.

use tracing::{debug, warn};

use crate::cpu::Cpu;
use crate::registers::{Mode, RegisterFile, FLAG_F, FLAG_I};
use crate::MemoryBus;

/// Size of a BIOS image in bytes.
pub const BIOS_SIZE: usize = 0x4000;

/// Value reported by GetBiosChecksum.
pub const BIOS_CHECKSUM: u32 = 0xBAAE_187F;

/// Initial stack pointer for System/User mode.
pub const STACK_USER: u32 = 0x0300_7F00;
/// Initial stack pointer for IRQ mode.
pub const STACK_IRQ: u32 = 0x0300_7FA0;
/// Initial stack pointer for Supervisor mode.
pub const STACK_SVC: u32 = 0x0300_7FE0;

/// Cartridge entry point.
pub const ROM_ENTRY: u32 = 0x0800_0000;

/// IRQ flags the user handler acknowledges for IntrWait.
const INTR_CHECK: u32 = 0x0300_7FF8;

const STUB_WORDS: &[(usize, u32)] = &[
    (0x000, 0xE3A0_F302),
    (0x004, 0xE1B0_F00E),
    (0x008, 0xE1B0_F00E),
    (0x018, 0xEA00_0042),
    (0x128, 0xE92D_500F), // stmfd sp!, {r0-r3, r12, lr}
    (0x12C, 0xE3A0_0301), // mov r0, #0x04000000
    (0x130, 0xE28F_E000), // add lr, pc, #0
    (0x134, 0xE510_F004), // ldr pc, [r0, #-4]
    (0x138, 0xE8BD_500F), // ldmfd sp!, {r0-r3, r12, lr}
    (0x13C, 0xE25E_F004), // subs pc, lr, #4
];

/// Builds the built-in 16 KiB stub image.
///
/// # Examples
///
/// ```
/// use libagb::bios::{stub_image, BIOS_SIZE};
///
/// let image = stub_image();
/// assert_eq!(image.len(), BIOS_SIZE);
/// // IRQ vector branches to the dispatcher
/// assert_eq!(&image[0x18..0x1C], &0xEA00_0042u32.to_le_bytes());
/// ```
pub fn stub_image() -> Vec<u8> {
    let mut image = vec![0u8; BIOS_SIZE];
    for &(addr, word) in STUB_WORDS {
        image[addr..addr + 4].copy_from_slice(&word.to_le_bytes());
    }
    image
}

/// Loads the register state the BIOS leaves behind before jumping to the
/// cartridge: System mode, FIQ masked, and the three stacks set up.
pub(crate) fn boot_registers(regs: &mut RegisterFile) {
    *regs = RegisterFile::new();
    regs.r[13] = STACK_USER;
    regs.banks[Mode::Irq.bank_index()].r13 = STACK_IRQ;
    regs.banks[Mode::Supervisor.bank_index()].r13 = STACK_SVC;
    regs.fiq_disabled = true;
}

/// Loads the power-on register state for running a real BIOS image from
/// address 0: Supervisor mode, IRQ and FIQ masked.
pub(crate) fn power_on_registers(regs: &mut RegisterFile) {
    *regs = RegisterFile::new();
    regs.set_cpsr(Mode::Supervisor.bits() | FLAG_I | FLAG_F);
}

/// Services software interrupt `comment` without vectoring into BIOS code.
///
/// `old_pc` is the address of the SWI instruction, used by IntrWait to
/// re-execute the call after an interrupt.
pub(crate) fn call<M: MemoryBus>(cpu: &mut Cpu<M>, comment: u32, old_pc: u32) {
    match comment {
        0x00 => soft_reset(cpu),
        0x01 => {
            let flags = cpu.regs.r[0];
            register_ram_reset(&mut cpu.bus, flags);
        }
        0x02 => cpu.bus.write8(0x0400_0301, 0),
        0x03 => cpu.bus.write8(0x0400_0301, 0x80),
        0x04 => {
            let discard = cpu.regs.r[0] != 0;
            let flags = cpu.regs.r[1];
            intr_wait(cpu, discard, flags, old_pc);
        }
        0x05 => {
            cpu.regs.r[0] = 1;
            cpu.regs.r[1] = 1;
            intr_wait(cpu, true, 1, old_pc);
        }
        0x06 => div(&mut cpu.regs),
        0x07 => {
            cpu.regs.r.swap(0, 1);
            div(&mut cpu.regs);
        }
        0x08 => cpu.regs.r[0] = integer_sqrt(cpu.regs.r[0]),
        0x0B => {
            let (src, dst, cnt) = (cpu.regs.r[0], cpu.regs.r[1], cpu.regs.r[2]);
            cpu_set(&mut cpu.bus, src, dst, cnt);
        }
        0x0C => {
            let (src, dst, cnt) = (cpu.regs.r[0], cpu.regs.r[1], cpu.regs.r[2]);
            cpu_fast_set(&mut cpu.bus, src, dst, cnt);
        }
        0x0D => cpu.regs.r[0] = BIOS_CHECKSUM,
        _ => {
            warn!(comment, "unsupported BIOS call");
            cpu.swi_exception();
        }
    }
}

fn soft_reset<M: MemoryBus>(cpu: &mut Cpu<M>) {
    let flag = cpu.bus.read8(0x0300_7FFA);
    for addr in (0x0300_7E00..0x0300_8000).step_by(4) {
        cpu.bus.write32(addr, 0);
    }
    boot_registers(&mut cpu.regs);
    cpu.regs.fiq_disabled = false;
    cpu.regs.irq_disabled = true;
    let entry = if flag != 0 { 0x0200_0000 } else { ROM_ENTRY };
    debug!(entry = format_args!("{:#010X}", entry), "soft reset");
    cpu.jump(entry, false);
}

fn fill32<M: MemoryBus>(bus: &mut M, start: u32, len: u32) {
    for addr in (start..start + len).step_by(4) {
        bus.write32(addr, 0);
    }
}

/// RegisterRamReset: clears the memory areas and register groups selected by
/// `flags`, always forcing the display blank first.
pub(crate) fn register_ram_reset<M: MemoryBus>(bus: &mut M, flags: u32) {
    bus.write16(0x0400_0000, 0x80);
    if flags & 0x01 != 0 {
        fill32(bus, 0x0200_0000, 0x4_0000);
    }
    if flags & 0x02 != 0 {
        fill32(bus, 0x0300_0000, 0x7E00);
    }
    if flags & 0x04 != 0 {
        fill32(bus, 0x0500_0000, 0x400);
    }
    if flags & 0x08 != 0 {
        fill32(bus, 0x0600_0000, 0x1_8000);
    }
    if flags & 0x10 != 0 {
        fill32(bus, 0x0700_0000, 0x400);
    }

    let io = |offset: u32| 0x0400_0000 + offset;
    if flags & 0x80 != 0 {
        for i in 0..0x10 {
            bus.write16(io(0x200 + i * 2), 0);
        }
        for i in 0..0xF {
            bus.write16(io(0x04 + i * 2), 0);
        }
        for i in 0..0x20 {
            bus.write16(io(0x20 + i * 2), 0);
        }
        for i in 0..0x18 {
            bus.write16(io(0xB0 + i * 2), 0);
        }
        bus.write16(io(0x130), 0);
        // Affine identity matrices
        for offset in [0x20, 0x30, 0x26, 0x36] {
            bus.write16(io(offset), 0x100);
        }
    }
    if flags & 0x20 != 0 {
        for i in 0..8 {
            bus.write16(io(0x110 + i * 2), 0);
        }
        bus.write16(io(0x134), 0x8000);
        for i in 0..7 {
            bus.write16(io(0x140 + i * 2), 0);
        }
    }
    if flags & 0x40 != 0 {
        bus.write8(io(0x84), 0);
        bus.write8(io(0x84), 0x80);
        bus.write32(io(0x80), 0x880E_0000);
        let bias = bus.read16(io(0x88)) & 0x3FF;
        bus.write16(io(0x88), bias as u16);
        bus.write8(io(0x70), 0x70);
        for i in 0..8 {
            bus.write16(io(0x90 + i * 2), 0);
        }
        bus.write8(io(0x70), 0);
        for i in 0..8 {
            bus.write16(io(0x90 + i * 2), 0);
        }
        bus.write8(io(0x84), 0);
    }
}

fn intr_wait<M: MemoryBus>(cpu: &mut Cpu<M>, discard: bool, flags: u32, old_pc: u32) {
    cpu.bus.write16(0x0400_0208, 1);

    if discard && !cpu.intr_wait_active {
        let pending = cpu.bus.read16(INTR_CHECK);
        cpu.bus.write16(INTR_CHECK, (pending & !flags) as u16);
    }

    let pending = cpu.bus.read16(INTR_CHECK);
    if pending & flags != 0 {
        cpu.bus.write16(INTR_CHECK, (pending & !flags) as u16);
        cpu.intr_wait_active = false;
        return;
    }

    // Halt and execute the SWI again once an interrupt has been serviced
    cpu.intr_wait_active = true;
    let thumb = cpu.regs.thumb;
    cpu.jump(old_pc, thumb);
    cpu.bus.write8(0x0400_0301, 0);
}

fn div(regs: &mut RegisterFile) {
    let number = regs.r[0] as i32;
    let denom = regs.r[1] as i32;
    if denom != 0 {
        let quotient = number.wrapping_div(denom);
        regs.r[0] = quotient as u32;
        regs.r[1] = number.wrapping_rem(denom) as u32;
        regs.r[3] = quotient.unsigned_abs();
    }
}

/// Integer square root, rounded down.
pub(crate) fn integer_sqrt(value: u32) -> u32 {
    let mut result = 0u32;
    let mut bit = 1u32 << 30;
    let mut rest = value;
    while bit > rest {
        bit >>= 2;
    }
    while bit != 0 {
        if rest >= result + bit {
            rest -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result
}

/// True if neither the source nor the end of the source range lies in
/// memory the BIOS refuses to read from (the BIOS region itself).
fn source_allowed(src: u32, cnt: u32) -> bool {
    let span = ((cnt << 11) >> 9) & 0x1F_FFFF;
    src & 0x0E00_0000 != 0 && src.wrapping_add(span) & 0x0E00_0000 != 0
}

/// CpuSet: copies or fills `cnt & 0x1FFFFF` halfwords or words.
pub(crate) fn cpu_set<M: MemoryBus>(bus: &mut M, src: u32, dst: u32, cnt: u32) {
    if !source_allowed(src, cnt) {
        return;
    }
    let count = cnt & 0x1F_FFFF;
    let fill = cnt & (1 << 24) != 0;

    if cnt & (1 << 26) != 0 {
        let mut src = src & !3;
        let mut dst = dst & !3;
        let read = |bus: &mut M, addr: u32| {
            if addr > 0x0EFF_FFFF {
                0x1CAD_1CAD
            } else {
                bus.read32(addr)
            }
        };
        let value = read(bus, src);
        for _ in 0..count {
            let word = if fill { value } else { read(bus, src) };
            bus.write32(dst, word);
            if !fill {
                src = src.wrapping_add(4);
            }
            dst = dst.wrapping_add(4);
        }
    } else {
        let mut src = src & !1;
        let mut dst = dst & !1;
        let read = |bus: &mut M, addr: u32| {
            if addr > 0x0EFF_FFFF {
                0x1CAD
            } else {
                bus.read16(addr) as u16
            }
        };
        let value = read(bus, src);
        for _ in 0..count {
            let half = if fill { value } else { read(bus, src) };
            bus.write16(dst, half);
            if !fill {
                src = src.wrapping_add(2);
            }
            dst = dst.wrapping_add(2);
        }
    }
}

/// CpuFastSet: copies or fills words in blocks of eight.
pub(crate) fn cpu_fast_set<M: MemoryBus>(bus: &mut M, src: u32, dst: u32, cnt: u32) {
    if !source_allowed(src, cnt) {
        return;
    }
    let mut src = src & 0x0FFF_FFFC;
    let mut dst = dst & 0x0FFF_FFFC;
    let mut count = (cnt & 0x1F_FFFF) as i32;
    let fill = cnt & (1 << 24) != 0;
    let read = |bus: &mut M, addr: u32| {
        if addr > 0x0EFF_FFFF {
            0xBAFF_FFFB
        } else {
            bus.read32(addr)
        }
    };

    while count > 0 {
        let value = read(bus, src);
        for _ in 0..8 {
            let word = if fill { value } else { read(bus, src) };
            bus.write32(dst, word);
            if !fill {
                src = src.wrapping_add(4);
            }
            dst = dst.wrapping_add(4);
        }
        count -= 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlatMemory;

    #[test]
    fn test_integer_sqrt() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(15), 3);
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(0xFFFF_FFFF), 0xFFFF);
    }

    #[test]
    fn test_div_sets_remainder_and_abs() {
        let mut regs = RegisterFile::new();
        regs.r[0] = (-7i32) as u32;
        regs.r[1] = 2;
        div(&mut regs);
        assert_eq!(regs.r[0] as i32, -3);
        assert_eq!(regs.r[1] as i32, -1);
        assert_eq!(regs.r[3], 3);
    }

    #[test]
    fn test_div_by_zero_leaves_registers() {
        let mut regs = RegisterFile::new();
        regs.r[0] = 10;
        div(&mut regs);
        assert_eq!(regs.r[0], 10);
    }

    #[test]
    fn test_cpu_set_fill_halfwords() {
        let mut mem = FlatMemory::new();
        mem.write16(0x0200_0000, 0xABCD);
        cpu_set(&mut mem, 0x0200_0000, 0x0300_0000, (1 << 24) | 4);
        for i in 0..4 {
            assert_eq!(mem.read16(0x0300_0000 + i * 2), 0xABCD);
        }
        assert_eq!(mem.read16(0x0300_0008), 0);
    }

    #[test]
    fn test_cpu_set_rejects_bios_source() {
        let mut mem = FlatMemory::new();
        mem.write32(0x0000_0100, 0x1234);
        cpu_set(&mut mem, 0x0000_0100, 0x0300_0000, (1 << 26) | 1);
        assert_eq!(mem.read32(0x0300_0000), 0);
    }

    #[test]
    fn test_cpu_fast_set_rounds_up_to_eight_words() {
        let mut mem = FlatMemory::new();
        for i in 0..16 {
            mem.write32(0x0200_0000 + i * 4, i + 1);
        }
        cpu_fast_set(&mut mem, 0x0200_0000, 0x0300_0000, 3);
        assert_eq!(mem.read32(0x0300_001C), 8);
        assert_eq!(mem.read32(0x0300_0020), 0);
    }

    #[test]
    fn test_boot_registers() {
        let mut regs = RegisterFile::new();
        boot_registers(&mut regs);
        assert_eq!(regs.mode(), Mode::System);
        assert_eq!(regs.r[13], STACK_USER);
        assert_eq!(regs.bank(Mode::Irq).r13, STACK_IRQ);
        assert_eq!(regs.bank(Mode::Supervisor).r13, STACK_SVC);
        assert!(regs.fiq_disabled);
    }
}
