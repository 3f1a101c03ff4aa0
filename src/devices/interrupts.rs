//! Interrupt controller.
//!
//! The system has a single IRQ line into the CPU. Fourteen sources latch
//! request bits in IF; IE selects which of them may raise the line, and IME
//! gates the whole controller. The CPU additionally masks the line with its
//! CPSR I bit, which the scheduler checks before servicing.
//!
//! # Register Map
//!
//! | Offset | Name | Behavior                                  |
//! |--------|------|-------------------------------------------|
//! | 0x200  | IE   | read/write, `& 0x3FFF`                    |
//! | 0x202  | IF   | read; writing a 1 clears that request bit |
//! | 0x208  | IME  | read/write, bit 0 only                    |
//!
//! # Halt and Stop
//!
//! HALTCNT writes put the CPU to sleep. A halted CPU wakes on any enabled
//! request; a stopped one only on keypad, serial or game pak requests
//! (`0x3080`). Waking enters the IRQ exception immediately, while a running
//! CPU takes it one scheduler step after the request is first seen
//! (`int_state` latch).

/// Interrupt sources, in IF bit order.
///
/// # Examples
///
/// ```
/// use libagb::devices::Interrupt;
///
/// assert_eq!(Interrupt::VBlank.mask(), 0x0001);
/// assert_eq!(Interrupt::timer(2).mask(), 0x0020);
/// assert_eq!(Interrupt::dma(3).mask(), 0x0800);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank,
    HBlank,
    VCount,
    Timer0,
    Timer1,
    Timer2,
    Timer3,
    Serial,
    Dma0,
    Dma1,
    Dma2,
    Dma3,
    Keypad,
    GamePak,
}

impl Interrupt {
    /// Every source, in IF bit order.
    pub const ALL: [Interrupt; 14] = [
        Interrupt::VBlank,
        Interrupt::HBlank,
        Interrupt::VCount,
        Interrupt::Timer0,
        Interrupt::Timer1,
        Interrupt::Timer2,
        Interrupt::Timer3,
        Interrupt::Serial,
        Interrupt::Dma0,
        Interrupt::Dma1,
        Interrupt::Dma2,
        Interrupt::Dma3,
        Interrupt::Keypad,
        Interrupt::GamePak,
    ];

    /// Source for IF bit `bit`, if there is one.
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.get(bit as usize).copied()
    }

    /// IF/IE bit for this source.
    pub fn mask(self) -> u16 {
        1 << self as u16
    }

    /// Overflow interrupt of timer `n` (0-3).
    pub fn timer(n: usize) -> Self {
        match n & 3 {
            0 => Interrupt::Timer0,
            1 => Interrupt::Timer1,
            2 => Interrupt::Timer2,
            _ => Interrupt::Timer3,
        }
    }

    /// Completion interrupt of DMA channel `n` (0-3).
    pub fn dma(n: usize) -> Self {
        match n & 3 {
            0 => Interrupt::Dma0,
            1 => Interrupt::Dma1,
            2 => Interrupt::Dma2,
            _ => Interrupt::Dma3,
        }
    }
}

/// Valid IE bits.
pub const IE_MASK: u16 = 0x3FFF;

/// Sources that can end the stop state.
pub const STOP_WAKE_MASK: u16 = 0x3080;

/// IE / IF / IME plus the CPU sleep states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterruptController {
    pub(crate) enable: u16,
    pub(crate) flags: u16,
    pub(crate) master: bool,
    pub(crate) halted: bool,
    pub(crate) stopped: bool,
    pub(crate) int_state: bool,
}

impl InterruptController {
    /// Power-on state: everything masked, nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches request bits into IF.
    pub fn raise(&mut self, mask: u16) {
        self.flags |= mask & IE_MASK;
    }

    /// Latches one source.
    pub fn request(&mut self, interrupt: Interrupt) {
        self.raise(interrupt.mask());
    }

    /// IE write. Returns true if an enabled request is now visible.
    pub fn write_enable(&mut self, value: u16) -> bool {
        self.enable = value & IE_MASK;
        self.master && self.flags & self.enable != 0
    }

    /// IF write: every 1 bit acknowledges the matching request.
    pub fn acknowledge(&mut self, value: u16) {
        self.flags &= !value;
    }

    /// IME write. Returns true if an enabled request is now visible.
    pub fn write_master(&mut self, value: u16) -> bool {
        self.master = value & 1 != 0;
        self.master && self.flags & self.enable != 0
    }

    /// IE register value.
    pub fn enable(&self) -> u16 {
        self.enable
    }

    /// IF register value.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// IME register value.
    pub fn master(&self) -> u16 {
        u16::from(self.master)
    }

    /// Enabled requests able to wake or interrupt the CPU right now.
    pub fn pending(&self) -> u16 {
        let pending = self.flags & self.enable;
        if self.stopped {
            pending & STOP_WAKE_MASK
        } else {
            pending
        }
    }

    /// Puts the CPU to sleep; `stop` selects the deeper stop state.
    pub fn halt(&mut self, stop: bool) {
        self.halted = true;
        if stop {
            self.stopped = true;
        }
    }

    /// Clears both sleep states and the latency latch.
    pub fn wake(&mut self) {
        self.halted = false;
        self.stopped = false;
        self.int_state = false;
    }

    /// Returns true while the CPU is halted or stopped.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns true while the CPU is stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
