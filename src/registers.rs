//! # Register File
//!
//! The ARM7TDMI exposes sixteen 32-bit registers at a time, but the processor
//! holds more than that: every exception mode owns a private stack pointer
//! (r13), link register (r14) and saved status register (SPSR), and FIQ mode
//! additionally owns r8-r12.
//!
//! ## Banking Model
//!
//! - `r[0..16]` always holds the *visible* registers for the current mode
//! - `banks[6]` holds r13/r14/SPSR for each bank (User and System share bank 0)
//! - `usr_hi` / `fiq_hi` hold the two r8-r12 sets; whichever is not visible
//!   is parked there
//! - `active` is the index of the bank whose r13/r14 currently live in `r`
//!
//! Switching modes stores the outgoing r13/r14 into their bank, swaps r8-r12
//! when FIQ is entered or left, and loads the incoming bank.
//!
//! ## Status Word
//!
//! The CPSR is not stored packed. Flags and control bits are individual fields
//! (the same way the hot path reads them) and [`RegisterFile::cpsr`] packs them
//! on demand.

use tracing::debug;

/// Negative flag bit in the packed status word.
pub const FLAG_N: u32 = 0x8000_0000;
/// Zero flag bit in the packed status word.
pub const FLAG_Z: u32 = 0x4000_0000;
/// Carry flag bit in the packed status word.
pub const FLAG_C: u32 = 0x2000_0000;
/// Overflow flag bit in the packed status word.
pub const FLAG_V: u32 = 0x1000_0000;
/// IRQ disable bit.
pub const FLAG_I: u32 = 0x80;
/// FIQ disable bit.
pub const FLAG_F: u32 = 0x40;
/// Thumb state bit.
pub const FLAG_T: u32 = 0x20;

/// Processor operating mode (CPSR bits 0-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    User,
    Fiq,
    Irq,
    Supervisor,
    Abort,
    Undefined,
    System,
}

impl Mode {
    /// Decodes the low five bits of a status word.
    ///
    /// Returns `None` for the reserved encodings.
    pub fn from_bits(bits: u32) -> Option<Mode> {
        match bits & 0x1F {
            0x10 => Some(Mode::User),
            0x11 => Some(Mode::Fiq),
            0x12 => Some(Mode::Irq),
            0x13 => Some(Mode::Supervisor),
            0x17 => Some(Mode::Abort),
            0x1B => Some(Mode::Undefined),
            0x1F => Some(Mode::System),
            _ => None,
        }
    }

    /// Returns the 5-bit mode encoding.
    pub fn bits(self) -> u32 {
        match self {
            Mode::User => 0x10,
            Mode::Fiq => 0x11,
            Mode::Irq => 0x12,
            Mode::Supervisor => 0x13,
            Mode::Abort => 0x17,
            Mode::Undefined => 0x1B,
            Mode::System => 0x1F,
        }
    }

    /// Index of the register bank this mode uses.
    pub fn bank_index(self) -> usize {
        match self {
            Mode::User | Mode::System => 0,
            Mode::Fiq => 1,
            Mode::Irq => 2,
            Mode::Supervisor => 3,
            Mode::Abort => 4,
            Mode::Undefined => 5,
        }
    }

    /// True for every mode except User.
    pub fn is_privileged(self) -> bool {
        self != Mode::User
    }

    /// True if the mode has its own SPSR.
    pub fn has_spsr(self) -> bool {
        self.bank_index() != 0
    }
}

/// Banked registers for one exception mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bank {
    /// Stack pointer.
    pub r13: u32,
    /// Link register.
    pub r14: u32,
    /// Saved program status register.
    pub spsr: u32,
}

/// Complete ARM7TDMI register state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    /// Visible registers r0-r15.
    pub(crate) r: [u32; 16],

    pub(crate) flag_n: bool,
    pub(crate) flag_z: bool,
    pub(crate) flag_c: bool,
    pub(crate) flag_v: bool,

    /// I bit: IRQs masked when set.
    pub(crate) irq_disabled: bool,

    /// F bit: FIQs masked when set.
    pub(crate) fiq_disabled: bool,

    /// T bit: executing the 16-bit encoding.
    pub(crate) thumb: bool,

    pub(crate) mode: Mode,

    /// Saved r13/r14/SPSR for each bank.
    pub(crate) banks: [Bank; 6],

    /// Bank whose r13/r14 are currently visible in `r`.
    pub(crate) active: usize,

    /// r8-r12 of every mode except FIQ, while FIQ is active.
    pub(crate) usr_hi: [u32; 5],

    /// r8-r12 of FIQ mode, while FIQ is not active.
    pub(crate) fiq_hi: [u32; 5],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates a zeroed register file in System mode, ARM state.
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            flag_n: false,
            flag_z: false,
            flag_c: false,
            flag_v: false,
            irq_disabled: false,
            fiq_disabled: false,
            thumb: false,
            mode: Mode::System,
            banks: [Bank::default(); 6],
            active: 0,
            usr_hi: [0; 5],
            fiq_hi: [0; 5],
        }
    }

    /// Packs the flags and control bits into a status word.
    pub fn cpsr(&self) -> u32 {
        let mut value = self.mode.bits();
        if self.flag_n {
            value |= FLAG_N;
        }
        if self.flag_z {
            value |= FLAG_Z;
        }
        if self.flag_c {
            value |= FLAG_C;
        }
        if self.flag_v {
            value |= FLAG_V;
        }
        if self.irq_disabled {
            value |= FLAG_I;
        }
        if self.fiq_disabled {
            value |= FLAG_F;
        }
        if self.thumb {
            value |= FLAG_T;
        }
        value
    }

    /// Loads flags and control bits from a status word, switching register
    /// banks if the mode field changed.
    ///
    /// A reserved mode encoding leaves the current mode in place.
    pub fn set_cpsr(&mut self, value: u32) {
        if let Some(mode) = Mode::from_bits(value) {
            if mode != self.mode {
                self.switch_mode(mode, false);
            }
        } else {
            debug!(value, "ignoring reserved mode encoding in status write");
        }
        self.set_flags(value);
        self.irq_disabled = value & FLAG_I != 0;
        self.fiq_disabled = value & FLAG_F != 0;
        self.thumb = value & FLAG_T != 0;
    }

    /// Loads only the NZCV flags from a status word.
    pub fn set_flags(&mut self, value: u32) {
        self.flag_n = value & FLAG_N != 0;
        self.flag_z = value & FLAG_Z != 0;
        self.flag_c = value & FLAG_C != 0;
        self.flag_v = value & FLAG_V != 0;
    }

    /// Returns the SPSR of the current mode, or the CPSR in User/System mode.
    pub fn spsr(&self) -> u32 {
        if self.mode.has_spsr() {
            self.banks[self.active].spsr
        } else {
            self.cpsr()
        }
    }

    /// Writes the SPSR of the current mode. Ignored in User/System mode.
    pub fn set_spsr(&mut self, value: u32) {
        if self.mode.has_spsr() {
            self.banks[self.active].spsr = value;
        }
    }

    /// Switches to `mode`, swapping banked registers.
    ///
    /// When `save_cpsr` is set (exception entry) the new mode's SPSR receives
    /// the status word as it was before the switch.
    pub fn switch_mode(&mut self, mode: Mode, save_cpsr: bool) {
        debug!(from = ?self.mode, to = ?mode, "mode switch");
        let old_cpsr = self.cpsr();
        let old_bank = self.mode.bank_index();
        let new_bank = mode.bank_index();

        self.banks[old_bank].r13 = self.r[13];
        self.banks[old_bank].r14 = self.r[14];

        if self.mode == Mode::Fiq && mode != Mode::Fiq {
            self.fiq_hi.copy_from_slice(&self.r[8..13]);
            self.r[8..13].copy_from_slice(&self.usr_hi);
        } else if self.mode != Mode::Fiq && mode == Mode::Fiq {
            self.usr_hi.copy_from_slice(&self.r[8..13]);
            self.r[8..13].copy_from_slice(&self.fiq_hi);
        }

        self.r[13] = self.banks[new_bank].r13;
        self.r[14] = self.banks[new_bank].r14;
        if save_cpsr && mode.has_spsr() {
            self.banks[new_bank].spsr = old_cpsr;
        }

        self.active = new_bank;
        self.mode = mode;
    }

    /// Reads a User-bank register regardless of the current mode.
    ///
    /// Used by block transfers with the S bit set.
    pub fn user_reg(&self, index: usize) -> u32 {
        match index {
            8..=12 if self.mode == Mode::Fiq => self.usr_hi[index - 8],
            13 if self.active != 0 => self.banks[0].r13,
            14 if self.active != 0 => self.banks[0].r14,
            _ => self.r[index],
        }
    }

    /// Writes a User-bank register regardless of the current mode.
    pub fn set_user_reg(&mut self, index: usize, value: u32) {
        match index {
            8..=12 if self.mode == Mode::Fiq => self.usr_hi[index - 8] = value,
            13 if self.active != 0 => self.banks[0].r13 = value,
            14 if self.active != 0 => self.banks[0].r14 = value,
            _ => self.r[index] = value,
        }
    }

    /// Returns the banked registers stored for `mode`.
    ///
    /// For the active mode the live r13/r14 are reported.
    pub fn bank(&self, mode: Mode) -> Bank {
        let index = mode.bank_index();
        let mut bank = self.banks[index];
        if index == self.active {
            bank.r13 = self.r[13];
            bank.r14 = self.r[14];
        }
        bank
    }

    /// Sets N and Z from a result.
    #[inline]
    pub(crate) fn set_nz(&mut self, result: u32) {
        self.flag_n = result & 0x8000_0000 != 0;
        self.flag_z = result == 0;
    }

    /// Returns the current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns true in Thumb state.
    pub fn is_thumb(&self) -> bool {
        self.thumb
    }

    /// Returns a visible register.
    pub fn get(&self, index: usize) -> u32 {
        self.r[index & 15]
    }

    /// Writes a visible register. Writing r15 does not refill the pipeline.
    pub fn set(&mut self, index: usize, value: u32) {
        self.r[index & 15] = value;
    }
}
