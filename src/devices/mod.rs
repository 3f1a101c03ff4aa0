//! Peripherals and collaborator interfaces.
//!
//! This module holds the hardware blocks the system bus is built from, plus
//! the traits through which the core talks to the parts it does not emulate
//! itself.
//!
//! # Architecture
//!
//! - **Core peripherals**: [`Timers`], [`DmaController`],
//!   [`InterruptController`], the video timing unit [`Lcd`] and the raw
//!   [`IoRegisters`] bank. These are plain state machines; the system bus
//!   wires them together.
//! - **Collaborators**: [`Display`], [`Audio`] and [`Backup`] are called
//!   synchronously from the scheduler and the memory map. The core never
//!   looks inside their state; it only stores and restores their opaque
//!   snapshot blobs.
//!
//! # Example
//!
//! ```rust
//! use libagb::devices::{Display, DisplayRequest, VideoPhase, VideoView};
//!
//! /// Counts visible lines.
//! struct LineCounter {
//!     lines: u32,
//! }
//!
//! impl Display for LineCounter {
//!     fn scanline(&mut self, _line: u16, phase: VideoPhase, _view: &VideoView<'_>) -> DisplayRequest {
//!         if phase == VideoPhase::Visible {
//!             self.lines += 1;
//!         }
//!         DisplayRequest::default()
//!     }
//! }
//! ```

pub mod backup;
pub mod dma;
pub mod interrupts;
pub mod io;
pub mod lcd;
pub mod timers;

pub use backup::{NoBackup, Sram};
pub use dma::{DmaChannel, DmaController, DmaTiming, DmaTransfer};
pub use interrupts::{Interrupt, InterruptController};
pub use io::IoRegisters;
pub use lcd::{Lcd, LcdStep};
pub use timers::{Timer, TimerStep, Timers};

/// Which part of the frame a scanline callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPhase {
    /// Lines 0-159.
    Visible,
    /// Lines 160-227.
    VBlank,
}

/// Read-only view of video memory handed to the display collaborator.
#[derive(Debug, Clone, Copy)]
pub struct VideoView<'a> {
    pub vram: &'a [u8],
    pub palette: &'a [u8],
    pub oam: &'a [u8],
    pub io: &'a [u8],
}

/// Requests a display collaborator can make after a scanline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Trigger DMA channel 3 if it waits for video capture.
    pub capture: bool,
}

/// Video output.
///
/// Called at the start of every HBlank with the line just finished, and once
/// per frame when VBlank begins.
pub trait Display {
    /// Renders or inspects `line`.
    fn scanline(&mut self, line: u16, phase: VideoPhase, view: &VideoView<'_>) -> DisplayRequest;

    /// VBlank started; the frame is complete.
    fn frame_ready(&mut self) {}

    /// Opaque state stored in snapshots.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restores a blob produced by [`Display::save_state`].
    fn load_state(&mut self, _data: &[u8]) {}
}

/// Sound output.
pub trait Audio {
    /// A sound register (0x60-0xA7) was written. The value is also stored
    /// in the I/O bank.
    fn register_write(&mut self, offset: u32, value: u16);

    /// Timer 0 or 1 overflowed. Returns a mask of DMA channels (bit n for
    /// channel n; only 1 and 2 are honoured) whose FIFO wants a refill.
    fn timer_overflow(&mut self, _timer: usize) -> u8 {
        0
    }

    /// `cycles` have elapsed since the last call; produce samples for them.
    fn tick(&mut self, _cycles: u32) {}

    /// Opaque state stored in snapshots.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restores a blob produced by [`Audio::save_state`].
    fn load_state(&mut self, _data: &[u8]) {}
}

/// Cartridge save storage behind regions 0xD and 0xE.
///
/// A `None` read means the chip does not drive the bus and the access falls
/// back to open bus.
pub trait Backup {
    /// Byte read in region 0xE.
    fn read8(&mut self, addr: u32) -> Option<u8>;

    /// Byte write in region 0xE.
    fn write8(&mut self, addr: u32, value: u8);

    /// Halfword read in region 0xD.
    fn read16(&mut self, _addr: u32) -> Option<u16> {
        None
    }

    /// Halfword write in region 0xD.
    fn write16(&mut self, _addr: u32, _value: u16) {}

    /// Opaque state stored in snapshots.
    fn save_state(&self) -> Vec<u8>;

    /// Restores a blob produced by [`Backup::save_state`].
    fn load_state(&mut self, data: &[u8]);
}

/// Display that ignores every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn scanline(&mut self, _line: u16, _phase: VideoPhase, _view: &VideoView<'_>) -> DisplayRequest {
        DisplayRequest::default()
    }
}

/// Audio sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudio;

impl Audio for NullAudio {
    fn register_write(&mut self, _offset: u32, _value: u16) {}
}
