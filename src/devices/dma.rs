//! Four-channel DMA controller.
//!
//! This module holds the register state of the channels and the arithmetic
//! of a transfer (element count, address steps, stall cost). The copy loop
//! itself needs the whole memory map and lives on the system bus.
//!
//! # Registers (channel n at 0xB0 + 12n)
//!
//! | Offset | Name      | Mask (ch0 / ch1-2 / ch3)        |
//! |--------|-----------|---------------------------------|
//! | +0x0   | SAD low   | 0xFFFF                          |
//! | +0x2   | SAD high  | 0x07FF / 0x0FFF / 0x0FFF        |
//! | +0x4   | DAD low   | 0xFFFF                          |
//! | +0x6   | DAD high  | 0x07FF / 0x07FF / 0x0FFF        |
//! | +0x8   | CNT_L     | 0x3FFF / 0x3FFF / 0xFFFF        |
//! | +0xA   | CNT_H     | 0xF7E0 / 0xF7E0 / 0xFFE0        |
//!
//! Only CNT_H reads back; the other registers are write-only.

use crate::memory::{region, WaitStates};

/// First DMA register offset in the I/O bank.
pub const DMA_BASE: u32 = 0xB0;

/// Register stride between channels.
pub const DMA_STRIDE: u32 = 12;

pub const CONTROL_REPEAT: u16 = 0x0200;
pub const CONTROL_WORD: u16 = 0x0400;
pub const CONTROL_IRQ: u16 = 0x4000;
pub const CONTROL_ENABLE: u16 = 0x8000;

/// Address step per element, indexed by the 2-bit address mode, for 32-bit
/// elements. 16-bit transfers halve it.
const ADDRESS_STEP: [i32; 4] = [4, -4, 0, 4];

/// Start condition, control bits 12-13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTiming {
    Immediate = 0,
    VBlank = 1,
    HBlank = 2,
    /// Sound FIFO request (channels 1 and 2) or video capture (channel 3).
    Special = 3,
}

impl DmaTiming {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => DmaTiming::Immediate,
            1 => DmaTiming::VBlank,
            2 => DmaTiming::HBlank,
            _ => DmaTiming::Special,
        }
    }
}

/// One DMA channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmaChannel {
    pub(crate) source: u32,
    pub(crate) dest: u32,
    pub(crate) count: u16,
    pub(crate) control: u16,
    /// Working addresses, latched when the channel is enabled.
    pub(crate) internal_source: u32,
    pub(crate) internal_dest: u32,
}

impl DmaChannel {
    /// Control register.
    pub fn control(&self) -> u16 {
        self.control
    }

    /// Returns true while enabled.
    pub fn is_enabled(&self) -> bool {
        self.control & CONTROL_ENABLE != 0
    }

    /// Start condition.
    pub fn timing(&self) -> DmaTiming {
        DmaTiming::from_bits(self.control >> 12)
    }

    /// Returns true for 32-bit elements.
    pub fn is_word(&self) -> bool {
        self.control & CONTROL_WORD != 0
    }

    /// Working source address.
    pub fn internal_source(&self) -> u32 {
        self.internal_source
    }

    /// Working destination address.
    pub fn internal_dest(&self) -> u32 {
        self.internal_dest
    }

    fn dest_mode(&self) -> usize {
        usize::from((self.control >> 5) & 3)
    }

    fn source_mode(&self) -> usize {
        usize::from((self.control >> 7) & 3)
    }
}

/// A transfer ready to run: element count, width and per-element steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTransfer {
    pub channel: usize,
    pub count: u32,
    pub word: bool,
    pub source_step: i32,
    pub dest_step: i32,
}

impl DmaTransfer {
    /// Stall cycles charged for this transfer, priced from the wait tables:
    /// `(sw + dw) × (count − 1) + 6 + nonseq(src) + seq(dst)`.
    pub fn cost(&self, timing: &WaitStates, source: u32, dest: u32) -> i32 {
        let (sm, dm) = (region(source), region(dest));
        let (sw, dw, first) = if self.word {
            (
                1 + timing.seq32(sm),
                1 + timing.seq32(dm),
                timing.wait32(sm) + timing.seq32(dm),
            )
        } else {
            (
                1 + timing.seq16(sm),
                1 + timing.seq16(dm),
                timing.wait16(sm) + timing.seq16(dm),
            )
        };
        ((sw + dw) * self.count.saturating_sub(1) + 6 + first) as i32
    }
}

/// The four channels plus the DMA open-bus latch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmaController {
    pub(crate) channels: [DmaChannel; 4],
    /// Last value moved by any channel.
    pub(crate) last_value: u32,
}

impl DmaController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel `n`.
    pub fn channel(&self, n: usize) -> &DmaChannel {
        &self.channels[n & 3]
    }

    /// Last value moved by a transfer.
    pub fn last_value(&self) -> u32 {
        self.last_value
    }

    /// Handles a write to a DMA register at I/O `offset` (0xB0..0xE0).
    ///
    /// Returns the channel number when the write flipped a channel's enable
    /// bit on; the caller must then check that channel for an immediate
    /// start.
    pub fn write_register(&mut self, offset: u32, value: u16) -> Option<usize> {
        let rel = offset.checked_sub(DMA_BASE)?;
        let n = (rel / DMA_STRIDE) as usize;
        if n > 3 {
            return None;
        }
        let value = u32::from(value);
        let channel = &mut self.channels[n];
        match rel % DMA_STRIDE {
            0x0 => channel.source = (channel.source & 0xFFFF_0000) | value,
            0x2 => {
                let mask = if n == 0 { 0x07FF } else { 0x0FFF };
                channel.source = (channel.source & 0xFFFF) | ((value & mask) << 16);
            }
            0x4 => channel.dest = (channel.dest & 0xFFFF_0000) | value,
            0x6 => {
                let mask = if n == 3 { 0x0FFF } else { 0x07FF };
                channel.dest = (channel.dest & 0xFFFF) | ((value & mask) << 16);
            }
            0x8 => {
                let mask = if n == 3 { 0xFFFF } else { 0x3FFF };
                channel.count = (value & mask) as u16;
            }
            _ => {
                let mask = if n == 3 { 0xFFE0 } else { 0xF7E0 };
                let value = (value & mask) as u16;
                let start = (channel.control ^ value) & CONTROL_ENABLE != 0;
                channel.control = value;
                if start && value & CONTROL_ENABLE != 0 {
                    channel.internal_source = channel.source;
                    channel.internal_dest = channel.dest;
                    return Some(n);
                }
            }
        }
        None
    }

    /// Describes the transfer channel `n` performs when started by
    /// `reason`, or `None` if the channel is disabled or waits for a
    /// different start condition.
    pub fn triggered(&self, n: usize, reason: DmaTiming) -> Option<DmaTransfer> {
        let channel = &self.channels[n];
        if !channel.is_enabled() || channel.timing() != reason {
            return None;
        }
        let source_step = ADDRESS_STEP[channel.source_mode()];
        let dest_step = ADDRESS_STEP[channel.dest_mode()];

        // Sound FIFO refills: four words into a fixed destination
        if reason == DmaTiming::Special && (n == 1 || n == 2) {
            return Some(DmaTransfer {
                channel: n,
                count: 4,
                word: true,
                source_step,
                dest_step: 0,
            });
        }

        let count = match (channel.count, n) {
            (0, 3) => 0x1_0000,
            (0, _) => 0x4000,
            (c, _) => u32::from(c),
        };
        let word = channel.is_word();
        let shift = if word { 0 } else { 1 };
        Some(DmaTransfer {
            channel: n,
            count,
            word,
            source_step: source_step >> shift,
            dest_step: dest_step >> shift,
        })
    }

    /// Finishes a transfer of channel `n`: reloads the destination in
    /// increment-and-reload mode and clears the enable bit unless the
    /// channel repeats. Returns true if the channel requests an interrupt.
    pub fn complete(&mut self, n: usize, reason: DmaTiming) -> bool {
        let channel = &mut self.channels[n];
        if channel.dest_mode() == 3 {
            channel.internal_dest = channel.dest;
        }
        if channel.control & CONTROL_REPEAT == 0 || reason == DmaTiming::Immediate {
            channel.control &= !CONTROL_ENABLE;
        }
        channel.control & CONTROL_IRQ != 0
    }
}

/// I/O offset of channel `n`'s CNT_H register.
pub fn control_offset(n: usize) -> u32 {
    DMA_BASE + DMA_STRIDE * n as u32 + 0xA
}
