//! # Memory Bus Abstraction
//!
//! This module provides the `MemoryBus` trait that decouples the CPU from the
//! machine's memory map, plus the wait-state bookkeeping every access is priced
//! with.
//!
//! ## Design Principles
//!
//! The MemoryBus trait follows the hardware's bus behavior:
//! - No bus errors: reads and writes always succeed
//! - Unmapped reads return whatever is left on the bus ("open bus")
//! - Writes to ROM or unmapped regions are ignored
//! - Access *values* and access *costs* are separate calls
//!
//! ## Wait States
//!
//! The 32-bit address space is split into 16 regions by `address >> 24`. Each
//! region has four costs: 16-bit non-sequential, 16-bit sequential, 32-bit
//! non-sequential and 32-bit sequential. [`WaitStates`] owns the four tables
//! and the cartridge prefetch buffer model, and exposes the tick helpers the
//! instruction handlers charge after every access.

/// Region index of an address.
#[inline]
pub fn region(addr: u32) -> usize {
    ((addr >> 24) & 0xF) as usize
}

/// Rotates a word loaded from a misaligned address.
///
/// The ARM7TDMI returns the aligned word rotated right by `8 × (addr & 3)`.
#[inline]
pub fn rotate_word(value: u32, addr: u32) -> u32 {
    value.rotate_right((addr & 3) * 8)
}

/// Rotates a halfword loaded from an odd address.
#[inline]
pub fn rotate_half(value: u32, addr: u32) -> u32 {
    if addr & 1 != 0 {
        (value >> 8) | (value << 24)
    } else {
        value
    }
}

/// Memory bus trait for CPU loads, stores and instruction fetches.
///
/// Implementations of this trait provide the memory map for the CPU. The CPU
/// accesses all memory (BIOS, RAM, I/O, cartridge) through this abstraction.
///
/// # Design
///
/// - Every method takes `&mut self`: reads can have side effects (lazy timer
///   counters, open-bus latches, backup chips)
/// - `read16`/`read32` return the value *as loaded into a register*, already
///   rotated for misaligned addresses
/// - `fetch16`/`fetch32` are instruction fetches; a bus uses them to track
///   the executing region and the last prefetched opcode
/// - No error types: the hardware has no bus error mechanism
///
/// # Examples
///
/// ```
/// use libagb::{FlatMemory, MemoryBus};
///
/// let mut mem = FlatMemory::new();
/// mem.write32(0x0300_0000, 0x1122_3344);
/// assert_eq!(mem.read32(0x0300_0000), 0x1122_3344);
/// // Misaligned word loads rotate
/// assert_eq!(mem.read32(0x0300_0001), 0x4411_2233);
/// ```
pub trait MemoryBus {
    /// Reads a byte.
    fn read8(&mut self, addr: u32) -> u8;

    /// Reads a halfword, rotated by 8 when `addr` is odd.
    fn read16(&mut self, addr: u32) -> u32;

    /// Reads a word, rotated by `8 × (addr & 3)`.
    fn read32(&mut self, addr: u32) -> u32;

    /// Writes a byte.
    fn write8(&mut self, addr: u32, value: u8);

    /// Writes a halfword. The low address bit is ignored.
    fn write16(&mut self, addr: u32, value: u16);

    /// Writes a word. The low two address bits are ignored.
    fn write32(&mut self, addr: u32, value: u32);

    /// Fetches a Thumb opcode.
    fn fetch16(&mut self, addr: u32) -> u16 {
        self.read16(addr & !1) as u16
    }

    /// Fetches an ARM opcode.
    fn fetch32(&mut self, addr: u32) -> u32 {
        self.read32(addr & !3)
    }

    /// Wait-state tables and prefetch buffer state.
    fn timing(&mut self) -> &mut WaitStates;

    /// Called when software clears the CPSR I bit.
    ///
    /// A bus with an interrupt controller uses this to schedule an immediate
    /// interrupt check. The default does nothing.
    fn irq_unmasked(&mut self) {}

    /// Returns true when software interrupts should be serviced by the
    /// built-in high-level BIOS instead of vectoring into BIOS code.
    fn bios_hle(&self) -> bool {
        false
    }
}

/// Per-region wait states for 16-bit accesses, non-sequential.
pub const POWER_ON_WAIT16: [u8; 16] = [0, 0, 2, 0, 0, 0, 0, 0, 4, 4, 4, 4, 4, 4, 4, 0];
/// Per-region wait states for 32-bit accesses, non-sequential.
pub const POWER_ON_WAIT32: [u8; 16] = [0, 0, 5, 0, 0, 1, 1, 0, 7, 7, 9, 9, 13, 13, 4, 0];
/// Per-region wait states for 16-bit accesses, sequential.
pub const POWER_ON_SEQ16: [u8; 16] = [0, 0, 2, 0, 0, 0, 0, 0, 2, 2, 4, 4, 8, 8, 4, 0];
/// Per-region wait states for 32-bit accesses, sequential.
pub const POWER_ON_SEQ32: [u8; 16] = [0, 0, 5, 0, 0, 1, 1, 0, 5, 5, 9, 9, 17, 17, 4, 0];

/// SRAM and WS0/1/2 first-access waits selected by WAITCNT.
const GAMEPAK_WAIT: [u8; 4] = [4, 3, 2, 8];
const GAMEPAK_RAM_WAIT: [u8; 4] = [4, 3, 2, 8];
const GAMEPAK_SEQ_WS0: [u8; 2] = [2, 1];
const GAMEPAK_SEQ_WS1: [u8; 2] = [4, 1];
const GAMEPAK_SEQ_WS2: [u8; 2] = [8, 1];

/// Wait-state tables plus the cartridge prefetch buffer model.
///
/// The prefetch buffer is modelled as a shift register of already-charged
/// halfword fetches (`prefetch_count`). Data accesses to internal memory while
/// the buffer is active push bits in; sequential code fetches from ROM consume
/// them for free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStates {
    pub(crate) wait16: [u8; 16],
    pub(crate) seq16: [u8; 16],
    pub(crate) wait32: [u8; 16],
    pub(crate) seq32: [u8; 16],

    /// Prefetched fetch counter (shift register).
    pub(crate) prefetch_count: u32,

    /// Buffer is filling during the current data access.
    pub(crate) prefetch_active: bool,

    /// WAITCNT bit 14.
    pub(crate) prefetch_enabled: bool,
}

impl Default for WaitStates {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStates {
    /// Creates the power-on tables with the prefetch buffer disabled.
    pub fn new() -> Self {
        Self {
            wait16: POWER_ON_WAIT16,
            seq16: POWER_ON_SEQ16,
            wait32: POWER_ON_WAIT32,
            seq32: POWER_ON_SEQ32,
            prefetch_count: 0,
            prefetch_active: false,
            prefetch_enabled: false,
        }
    }

    /// Rebuilds the cartridge and SRAM entries from a WAITCNT value.
    ///
    /// Any write clears the prefetch buffer.
    pub fn apply_waitcnt(&mut self, value: u16) {
        let value = value as usize;
        self.wait16[0x0E] = GAMEPAK_RAM_WAIT[value & 3];
        self.seq16[0x0E] = GAMEPAK_RAM_WAIT[value & 3];

        let ws0 = GAMEPAK_WAIT[(value >> 2) & 3];
        let ws0_seq = GAMEPAK_SEQ_WS0[(value >> 4) & 1];
        let ws1 = GAMEPAK_WAIT[(value >> 5) & 3];
        let ws1_seq = GAMEPAK_SEQ_WS1[(value >> 7) & 1];
        let ws2 = GAMEPAK_WAIT[(value >> 8) & 3];
        let ws2_seq = GAMEPAK_SEQ_WS2[(value >> 10) & 1];

        for (regions, wait, seq) in [
            ([0x08, 0x09], ws0, ws0_seq),
            ([0x0A, 0x0B], ws1, ws1_seq),
            ([0x0C, 0x0D], ws2, ws2_seq),
        ] {
            for r in regions {
                self.wait16[r] = wait;
                self.seq16[r] = seq;
            }
        }

        for r in 0x08..0x0F {
            self.wait32[r] = self.wait16[r] + self.seq16[r] + 1;
            self.seq32[r] = self.seq16[r] * 2 + 1;
        }

        self.prefetch_enabled = value & 0x4000 != 0;
        self.prefetch_active = false;
        self.prefetch_count = 0;
    }

    /// Arms the prefetch buffer before a load or store if it is idle.
    #[inline]
    pub fn begin_data_access(&mut self) {
        if self.prefetch_count == 0 {
            self.prefetch_active = self.prefetch_enabled;
        }
    }

    /// Clears the prefetch counter.
    #[inline]
    pub fn reset_prefetch(&mut self) {
        self.prefetch_count = 0;
    }

    /// Charges `cycles` internal multiply cycles to the prefetch buffer.
    #[inline]
    pub fn internal_cycles(&mut self, cycles: u32) {
        let cycles = cycles.min(8);
        self.prefetch_count = self.prefetch_count.wrapping_shl(cycles) | (0xFF >> (8 - cycles));
    }

    #[inline]
    fn data_ticks(&mut self, addr: u32, value: u8) -> u32 {
        let r = region(addr);
        if !(0x02..0x08).contains(&r) {
            self.prefetch_count = 0;
            self.prefetch_active = false;
        } else if self.prefetch_active {
            let wait = u32::from(value.max(1));
            self.prefetch_count = self
                .prefetch_count
                .wrapping_add(1)
                .wrapping_shl(wait)
                .wrapping_sub(1);
        }
        u32::from(value)
    }

    /// Data access, 8 or 16 bits, non-sequential.
    pub fn data_ticks16(&mut self, addr: u32) -> u32 {
        let value = self.wait16[region(addr)];
        self.data_ticks(addr, value)
    }

    /// Data access, 8 or 16 bits, sequential.
    pub fn data_ticks_seq16(&mut self, addr: u32) -> u32 {
        let value = self.seq16[region(addr)];
        self.data_ticks(addr, value)
    }

    /// Data access, 32 bits, non-sequential.
    pub fn data_ticks32(&mut self, addr: u32) -> u32 {
        let value = self.wait32[region(addr)];
        self.data_ticks(addr, value)
    }

    /// Data access, 32 bits, sequential.
    pub fn data_ticks_seq32(&mut self, addr: u32) -> u32 {
        let value = self.seq32[region(addr)];
        self.data_ticks(addr, value)
    }

    #[inline]
    fn in_rom(r: usize) -> bool {
        (0x08..=0x0D).contains(&r)
    }

    #[inline]
    fn consume(&mut self, shift: u32) {
        self.prefetch_count = ((self.prefetch_count & 0xFF) >> shift) | (self.prefetch_count & !0xFF);
    }

    /// Thumb code fetch, non-sequential.
    pub fn code_ticks16(&mut self, addr: u32) -> u32 {
        let r = region(addr);
        if Self::in_rom(r) && self.prefetch_count & 1 != 0 {
            if self.prefetch_count & 2 != 0 {
                self.consume(2);
                return 0;
            }
            self.consume(1);
            return u32::from(self.seq16[r]).saturating_sub(1);
        }
        self.prefetch_count = 0;
        u32::from(self.wait16[r])
    }

    /// ARM code fetch, non-sequential.
    pub fn code_ticks32(&mut self, addr: u32) -> u32 {
        let r = region(addr);
        if Self::in_rom(r) && self.prefetch_count & 1 != 0 {
            if self.prefetch_count & 2 != 0 {
                self.consume(2);
                return 0;
            }
            self.consume(1);
            return u32::from(self.seq16[r]).saturating_sub(1);
        }
        self.prefetch_count = 0;
        u32::from(self.wait32[r])
    }

    /// Thumb code fetch, sequential.
    pub fn code_ticks_seq16(&mut self, addr: u32) -> u32 {
        let r = region(addr);
        if !Self::in_rom(r) {
            self.prefetch_count = 0;
            return u32::from(self.seq16[r]);
        }
        if self.prefetch_count & 1 != 0 {
            self.consume(1);
            0
        } else if self.prefetch_count > 0xFF {
            self.prefetch_count = 0;
            u32::from(self.wait16[r])
        } else {
            u32::from(self.seq16[r])
        }
    }

    /// ARM code fetch, sequential.
    pub fn code_ticks_seq32(&mut self, addr: u32) -> u32 {
        let r = region(addr);
        if !Self::in_rom(r) {
            return u32::from(self.seq32[r]);
        }
        if self.prefetch_count & 1 != 0 {
            if self.prefetch_count & 2 != 0 {
                self.consume(2);
                return 0;
            }
            self.consume(1);
            u32::from(self.seq16[r])
        } else if self.prefetch_count > 0xFF {
            self.prefetch_count = 0;
            u32::from(self.wait32[r])
        } else {
            u32::from(self.seq32[r])
        }
    }

    /// Raw 16-bit non-sequential wait for a region, without prefetch effects.
    pub fn wait16(&self, region: usize) -> u32 {
        u32::from(self.wait16[region & 0xF])
    }

    /// Raw 16-bit sequential wait for a region.
    pub fn seq16(&self, region: usize) -> u32 {
        u32::from(self.seq16[region & 0xF])
    }

    /// Raw 32-bit non-sequential wait for a region.
    pub fn wait32(&self, region: usize) -> u32 {
        u32::from(self.wait32[region & 0xF])
    }

    /// Raw 32-bit sequential wait for a region.
    pub fn seq32(&self, region: usize) -> u32 {
        u32::from(self.seq32[region & 0xF])
    }

    /// Current prefetch counter.
    pub fn prefetch_count(&self) -> u32 {
        self.prefetch_count
    }

    /// Whether WAITCNT enabled the prefetch buffer.
    pub fn prefetch_enabled(&self) -> bool {
        self.prefetch_enabled
    }
}

/// Size of each region in a [`FlatMemory`].
const FLAT_REGION_SIZE: usize = 0x1_0000;

/// Simple flat memory implementation.
///
/// Every one of the 16 regions is backed by its own 64 KiB of RAM, mirrored
/// through the region, with power-on wait states. There is no I/O, no
/// protection and no open bus.
///
/// Useful for:
/// - CPU unit tests and property tests
/// - Fuzzing the instruction decoder
///
/// # Examples
///
/// ```
/// use libagb::{Cpu, FlatMemory, MemoryBus};
///
/// let mut memory = FlatMemory::new();
/// memory.write32(0x0800_0000, 0xE3A0_002A); // mov r0, #42
///
/// let mut cpu = Cpu::new(memory);
/// cpu.jump(0x0800_0000, false);
/// cpu.step();
/// assert_eq!(cpu.reg(0), 42);
/// ```
pub struct FlatMemory {
    data: Vec<u8>,
    timing: WaitStates,
}

impl FlatMemory {
    /// Creates a new FlatMemory with every byte zeroed.
    pub fn new() -> Self {
        Self {
            data: vec![0; FLAT_REGION_SIZE * 16],
            timing: WaitStates::new(),
        }
    }

    #[inline]
    fn index(addr: u32) -> usize {
        region(addr) * FLAT_REGION_SIZE + (addr as usize & (FLAT_REGION_SIZE - 1))
    }

    /// Copies `bytes` starting at `addr`.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            let index = Self::index(addr.wrapping_add(i as u32));
            self.data[index] = *b;
        }
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for FlatMemory {
    fn read8(&mut self, addr: u32) -> u8 {
        self.data[Self::index(addr)]
    }

    fn read16(&mut self, addr: u32) -> u32 {
        let base = Self::index(addr & !1);
        let value = u16::from_le_bytes([self.data[base], self.data[base + 1]]);
        rotate_half(u32::from(value), addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let base = Self::index(addr & !3);
        let value = u32::from_le_bytes([
            self.data[base],
            self.data[base + 1],
            self.data[base + 2],
            self.data[base + 3],
        ]);
        rotate_word(value, addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.data[Self::index(addr)] = value;
    }

    fn write16(&mut self, addr: u32, value: u16) {
        let base = Self::index(addr & !1);
        self.data[base..base + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn write32(&mut self, addr: u32, value: u32) {
        let base = Self::index(addr & !3);
        self.data[base..base + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn timing(&mut self) -> &mut WaitStates {
        &mut self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_memory_read_write() {
        let mut mem = FlatMemory::new();

        assert_eq!(mem.read32(0x0200_0000), 0);

        mem.write32(0x0200_0010, 0xDEAD_BEEF);
        assert_eq!(mem.read32(0x0200_0010), 0xDEAD_BEEF);
        assert_eq!(mem.read16(0x0200_0012), 0xDEAD);
        assert_eq!(mem.read8(0x0200_0010), 0xEF);

        // Regions do not alias each other
        assert_eq!(mem.read32(0x0300_0010), 0);
    }

    #[test]
    fn test_misaligned_loads_rotate() {
        let mut mem = FlatMemory::new();
        mem.write32(0x0300_0000, 0x1122_3344);

        assert_eq!(mem.read32(0x0300_0002), 0x3344_1122);
        assert_eq!(mem.read16(0x0300_0001), 0x4400_0033);
    }

    #[test]
    fn test_power_on_tables() {
        let w = WaitStates::new();
        assert_eq!(w.wait16(8), 4);
        assert_eq!(w.wait32(8), 7);
        assert_eq!(w.seq32(0xC), 17);
        assert!(!w.prefetch_enabled());
    }

    #[test]
    fn test_waitcnt_rebuilds_rom_tables() {
        let mut w = WaitStates::new();
        // WS0 3/1, prefetch on
        w.apply_waitcnt(0x4014);
        assert_eq!(w.wait16(8), 3);
        assert_eq!(w.seq16(8), 1);
        assert_eq!(w.wait32(8), 3 + 1 + 1);
        assert_eq!(w.seq32(8), 3);
        assert!(w.prefetch_enabled());
        // SRAM uses the same value for both access kinds
        assert_eq!(w.wait16(0xE), 4);
        assert_eq!(w.seq16(0xE), 4);
    }

    #[test]
    fn test_data_access_outside_internal_memory_clears_prefetch() {
        let mut w = WaitStates::new();
        w.prefetch_count = 0x7;
        w.prefetch_active = true;
        w.data_ticks16(0x0800_0000);
        assert_eq!(w.prefetch_count(), 0);
        assert!(!w.prefetch_active);
    }

    #[test]
    fn test_data_access_fills_prefetch() {
        let mut w = WaitStates::new();
        w.prefetch_active = true;
        // IWRAM has zero waits, which counts as one
        w.data_ticks16(0x0300_0000);
        assert_eq!(w.prefetch_count(), 1);
        w.data_ticks16(0x0300_0000);
        assert_eq!(w.prefetch_count(), 3);
    }

    #[test]
    fn test_sequential_rom_fetch_consumes_prefetch() {
        let mut w = WaitStates::new();
        w.prefetch_count = 0b11;
        assert_eq!(w.code_ticks_seq16(0x0800_0000), 0);
        assert_eq!(w.prefetch_count(), 0b1);
        assert_eq!(w.code_ticks_seq16(0x0800_0000), 0);
        assert_eq!(w.prefetch_count(), 0);
        assert_eq!(w.code_ticks_seq16(0x0800_0000), 2);
    }

    #[test]
    fn test_nonsequential_fetch_outside_rom_resets() {
        let mut w = WaitStates::new();
        w.prefetch_count = 0xFF;
        assert_eq!(w.code_ticks32(0x0300_0000), 0);
        assert_eq!(w.prefetch_count(), 0);
    }

    #[test]
    fn test_internal_cycles_shift_prefetch() {
        let mut w = WaitStates::new();
        w.prefetch_count = 1;
        w.internal_cycles(2);
        assert_eq!(w.prefetch_count(), 0b111);
    }
}
