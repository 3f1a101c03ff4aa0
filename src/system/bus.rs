//! The system bus: memory map, I/O side effects and DMA transfers.
//!
//! [`SystemBus`] owns every piece of peripheral state and implements
//! [`MemoryBus`] for the CPU. It is the single aggregate the scheduler in
//! [`Machine`](super::Machine) drives; no component keeps a second copy of
//! anything the bus owns.
//!
//! # Memory Map
//!
//! | Region | Range                     | Contents                         |
//! |--------|---------------------------|----------------------------------|
//! | 0x0    | 0x0000_0000-0x0000_3FFF   | BIOS (protected)                 |
//! | 0x2    | 0x0200_0000 (mirrored)    | 256 KiB external work RAM        |
//! | 0x3    | 0x0300_0000 (mirrored)    | 32 KiB internal work RAM         |
//! | 0x4    | 0x0400_0000-0x0400_03FF   | I/O registers                    |
//! | 0x5    | 0x0500_0000 (mirrored)    | 1 KiB palette RAM                |
//! | 0x6    | 0x0600_0000               | 96 KiB VRAM, 0x18000 mirror      |
//! | 0x7    | 0x0700_0000 (mirrored)    | 1 KiB OAM                        |
//! | 0x8-C  | 0x0800_0000-0x0CFF_FFFF   | cartridge ROM, three wait pairs  |
//! | 0xD    | 0x0D00_0000               | backup, halfword interface       |
//! | 0xE    | 0x0E00_0000               | backup, byte interface           |
//!
//! Everything else reads as open bus and ignores writes.

use tracing::debug;

use crate::bios::{self, BIOS_SIZE};
use crate::devices::dma::{self, DmaTransfer};
use crate::devices::io::{self, IoRegisters};
use crate::devices::{
    Audio, Backup, Display, DmaController, DmaTiming, Interrupt, InterruptController, Lcd,
    VideoView, Timers,
};
use crate::memory::{region, rotate_half, rotate_word, MemoryBus, WaitStates};

pub const EWRAM_SIZE: usize = 0x4_0000;
pub const IWRAM_SIZE: usize = 0x8000;
pub const PALETTE_SIZE: usize = 0x400;
pub const VRAM_SIZE: usize = 0x1_8000;
pub const OAM_SIZE: usize = 0x400;

/// Largest cartridge image the ROM window can map.
pub const MAX_ROM_SIZE: usize = 0x200_0000;

/// BIOS open-bus latch after reset.
pub const BIOS_LATCH_RESET: u32 = 0xE129_F000;
/// BIOS open-bus latch after an IRQ entry.
pub const BIOS_LATCH_IRQ: u32 = 0xE55E_C002;

/// KEYINPUT with no buttons pressed.
pub const KEYS_RELEASED: u16 = 0x03FF;

/// OBJ tile base by DISPCNT mode group; byte writes above it are dropped.
const OBJ_TILE_BASE: [u32; 3] = [0x1_0000, 0x1_4000, 0x1_4000];

#[inline]
fn le16(mem: &[u8], i: usize) -> u32 {
    u32::from(u16::from_le_bytes([mem[i], mem[i + 1]]))
}

#[inline]
fn le32(mem: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([mem[i], mem[i + 1], mem[i + 2], mem[i + 3]])
}

#[inline]
fn put16(mem: &mut [u8], i: usize, value: u16) {
    mem[i..i + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn put32(mem: &mut [u8], i: usize, value: u32) {
    mem[i..i + 4].copy_from_slice(&value.to_le_bytes());
}

/// Memory, I/O and peripherals of the whole machine.
pub struct SystemBus {
    pub(crate) bios: Vec<u8>,
    /// A real BIOS image is installed (otherwise SWIs are serviced in HLE).
    pub(crate) bios_loaded: bool,
    pub(crate) ewram: Vec<u8>,
    pub(crate) iwram: Vec<u8>,
    pub(crate) palette: Vec<u8>,
    pub(crate) vram: Vec<u8>,
    pub(crate) oam: Vec<u8>,
    pub(crate) rom: Vec<u8>,
    pub(crate) io: IoRegisters,
    pub(crate) timing: WaitStates,

    pub(crate) dma: DmaController,
    pub(crate) timers: Timers,
    pub(crate) interrupts: InterruptController,
    pub(crate) lcd: Lcd,

    pub(crate) display: Box<dyn Display>,
    pub(crate) audio: Box<dyn Audio>,
    pub(crate) backup: Box<dyn Backup>,

    /// Cycles executed since the last scheduler event.
    pub(crate) ticks: i32,
    /// Value of `ticks` at which the next event is due.
    pub(crate) next_event: i32,
    /// DMA stall cycles not yet charged to the scheduler.
    pub(crate) dma_ticks: i32,
    /// Open bus shows the DMA latch instead of the prefetched opcode.
    pub(crate) dma_latched: bool,
    /// Most recently fetched opcode, Thumb halfwords replicated.
    pub(crate) open_bus: u32,
    /// The last instruction fetch came from the BIOS region.
    pub(crate) in_bios: bool,
    pub(crate) bios_latch: u32,
    /// KEYINPUT value (bit clear = pressed).
    pub(crate) keys: u16,
    /// Cycles until the next audio tick.
    pub(crate) audio_ticks: i32,
    pub(crate) audio_interval: i32,
    /// Total cycles accounted by scheduler events.
    pub(crate) elapsed: u64,
    /// Set when VBlank starts.
    pub(crate) frame_done: bool,
}

impl SystemBus {
    /// Creates a bus with the built-in BIOS stub, no cartridge and zeroed
    /// memories.
    pub fn new(display: Box<dyn Display>, audio: Box<dyn Audio>, backup: Box<dyn Backup>) -> Self {
        Self {
            bios: bios::stub_image(),
            bios_loaded: false,
            ewram: vec![0; EWRAM_SIZE],
            iwram: vec![0; IWRAM_SIZE],
            palette: vec![0; PALETTE_SIZE],
            vram: vec![0; VRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            rom: Vec::new(),
            io: IoRegisters::new(),
            timing: WaitStates::new(),
            dma: DmaController::new(),
            timers: Timers::new(),
            interrupts: InterruptController::new(),
            lcd: Lcd::new(),
            display,
            audio,
            backup,
            ticks: 0,
            next_event: 0,
            dma_ticks: 0,
            dma_latched: false,
            open_bus: 0,
            in_bios: false,
            bios_latch: BIOS_LATCH_RESET,
            keys: KEYS_RELEASED,
            audio_ticks: 0,
            audio_interval: 1,
            elapsed: 0,
            frame_done: false,
        }
    }

    /// Clears memories and peripherals to their power-on state. The BIOS,
    /// cartridge and collaborators are kept.
    pub(crate) fn reset(&mut self, after_boot: bool, waitcnt: u16, audio_interval: u32) {
        for mem in [
            &mut self.ewram,
            &mut self.iwram,
            &mut self.palette,
            &mut self.vram,
            &mut self.oam,
        ] {
            mem.fill(0);
        }
        self.io.clear();
        self.dma = DmaController::new();
        self.timers = Timers::new();
        self.interrupts = InterruptController::new();
        self.lcd = if after_boot { Lcd::after_boot() } else { Lcd::new() };
        self.io.store16(io::DISPCNT, self.lcd.dispcnt());
        self.io.store16(io::SOUNDBIAS, 0x200);

        self.timing = WaitStates::new();
        self.timing.apply_waitcnt(waitcnt);
        self.io.store16(io::WAITCNT, waitcnt & 0x7FFF);

        self.ticks = 0;
        self.dma_ticks = 0;
        self.dma_latched = false;
        self.open_bus = 0;
        self.in_bios = false;
        self.bios_latch = BIOS_LATCH_RESET;
        self.keys = KEYS_RELEASED;
        self.audio_interval = audio_interval.max(1) as i32;
        self.audio_ticks = self.audio_interval;
        self.frame_done = false;
        self.next_event = self.next_deadline();
    }

    // ========== Scheduler Hooks ==========

    /// Makes the scheduler run an event after the current instruction.
    #[inline]
    pub(crate) fn force_event(&mut self) {
        self.next_event = self.ticks;
    }

    /// Cycles until the video unit or a timer needs service.
    pub(crate) fn next_deadline(&self) -> i32 {
        self.timers.next_deadline(self.lcd.ticks())
    }

    fn raise(&mut self, mask: u16) {
        if mask != 0 {
            self.interrupts.raise(mask);
        }
    }

    /// Read-only view of video memory.
    pub fn video_view(&self) -> VideoView<'_> {
        VideoView {
            vram: &self.vram,
            palette: &self.palette,
            oam: &self.oam,
            io: self.io.as_bytes(),
        }
    }

    // ========== Accessors ==========

    pub fn dma(&self) -> &DmaController {
        &self.dma
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn lcd(&self) -> &Lcd {
        &self.lcd
    }

    pub fn timing_tables(&self) -> &WaitStates {
        &self.timing
    }

    /// DMA stall cycles not yet handed to the scheduler.
    pub fn pending_dma_cycles(&self) -> i32 {
        self.dma_ticks
    }

    // ========== Open Bus ==========

    fn latch(&self) -> u32 {
        if self.dma_latched {
            self.dma.last_value
        } else {
            self.open_bus
        }
    }

    fn open_bus32(&self, addr: u32) -> u32 {
        rotate_word(self.latch(), addr)
    }

    fn open_bus16(&self, addr: u32) -> u32 {
        let value = if self.dma_latched {
            self.dma.last_value & 0xFFFF
        } else {
            (self.open_bus >> ((addr & 2) * 8)) & 0xFFFF
        };
        rotate_half(value, addr)
    }

    fn open_bus8(&self, addr: u32) -> u8 {
        if self.dma_latched {
            self.dma.last_value as u8
        } else {
            (self.open_bus >> ((addr & 3) * 8)) as u8
        }
    }

    // ========== Region Helpers ==========

    /// VRAM byte index, or `None` for the bitmap-mode hole.
    fn vram_index(&self, addr: u32) -> Option<usize> {
        let mut a = addr & 0x1_FFFF;
        if self.lcd.mode() > 2 && a & 0x1_C000 == 0x1_8000 {
            return None;
        }
        if a & 0x1_8000 == 0x1_8000 {
            a &= 0x1_7FFF;
        }
        Some(a as usize)
    }

    /// ROM halfword; past the end of the image the bus returns the address.
    fn rom16(&self, addr: u32) -> u32 {
        let i = (addr & 0x1FF_FFFE) as usize;
        if i + 2 <= self.rom.len() {
            le16(&self.rom, i)
        } else {
            (i as u32 >> 1) & 0xFFFF
        }
    }

    fn rom32(&self, addr: u32) -> u32 {
        let i = (addr & 0x1FF_FFFC) as usize;
        if i + 4 <= self.rom.len() {
            le32(&self.rom, i)
        } else {
            self.rom16(addr) | (self.rom16(addr + 2) << 16)
        }
    }

    // ========== I/O Registers ==========

    /// Current value of the register at `offset`, read through the device
    /// that owns it.
    pub(crate) fn io_register(&self, offset: u32) -> u16 {
        let offset = offset & 0x3FE;
        if let Some(n) = (0..4).find(|&n| dma::control_offset(n) == offset) {
            return self.dma.channel(n).control();
        }
        match offset {
            io::DISPCNT => self.lcd.dispcnt(),
            io::DISPSTAT => self.lcd.dispstat(),
            io::VCOUNT => self.lcd.vcount(),
            0x100..=0x10E => {
                let n = ((offset - 0x100) / 4) as usize;
                if offset & 2 == 0 {
                    self.timers.read_counter(n, self.ticks)
                } else {
                    self.timers.read_control(n)
                }
            }
            io::KEYINPUT => self.keys,
            io::IE => self.interrupts.enable(),
            io::IF => self.interrupts.flags(),
            io::IME => self.interrupts.master(),
            _ => self.io.load16(offset),
        }
    }

    fn read_io32(&self, addr: u32) -> u32 {
        let offset = addr & 0xFF_FFFC;
        if offset >= io::IO_SIZE as u32 || !io::is_readable(offset) {
            return self.open_bus32(addr);
        }
        let low = u32::from(self.io_register(offset));
        let value = if io::is_readable(offset + 2) {
            low | u32::from(self.io_register(offset + 2)) << 16
        } else {
            low
        };
        rotate_word(value, addr)
    }

    /// Applies a 16-bit write to the I/O register at `offset`, including
    /// every side effect.
    pub(crate) fn write_io16(&mut self, offset: u32, value: u16) {
        let offset = offset & 0x3FE;
        match offset {
            io::DISPCNT => {
                let (irq, moved) = self.lcd.write_dispcnt(value);
                self.io.store16(offset, self.lcd.dispcnt());
                self.raise(irq);
                if moved {
                    self.force_event();
                }
            }
            io::DISPSTAT => {
                let irq = self.lcd.write_dispstat(value);
                self.io.store16(offset, self.lcd.dispstat());
                self.raise(irq);
            }
            io::VCOUNT => {}
            0x08 | 0x0A => self.io.store16(offset, value & 0xDFCF),
            0x0C | 0x0E => self.io.store16(offset, value & 0xFFCF),
            0x10..=0x1E => self.io.store16(offset, value & 0x01FF),
            0x2A | 0x2E | 0x3A | 0x3E => self.io.store16(offset, value & 0x0FFF),
            0x48 | 0x4A => self.io.store16(offset, value & 0x3F3F),
            0x50 => self.io.store16(offset, value & 0x3FFF),
            0x52 => self.io.store16(offset, value & 0x1F1F),
            0x54 => self.io.store16(offset, value & 0x001F),
            io::SOUND_FIRST..=io::SOUND_LAST => {
                self.io.store16(offset, value);
                self.audio.register_write(offset, value);
            }
            0xB0..=0xDE => {
                self.io.store16(offset, value);
                if let Some(n) = self.dma.write_register(offset, value) {
                    let channel = self.dma.channel(n);
                    debug!(
                        channel = n,
                        source = format_args!("{:#010X}", channel.internal_source()),
                        dest = format_args!("{:#010X}", channel.internal_dest()),
                        control = format_args!("{:#06X}", channel.control()),
                        "dma armed"
                    );
                    self.check_dma(DmaTiming::Immediate, 1 << n);
                }
            }
            0x100..=0x10E => {
                let n = ((offset - 0x100) / 4) as usize;
                if offset & 2 == 0 {
                    self.timers.write_reload(n, value);
                } else {
                    self.timers.write_control(n, value);
                    self.force_event();
                }
            }
            io::KEYINPUT => {}
            io::KEYCNT => self.io.store16(offset, value & 0xC3FF),
            io::IE => {
                if self.interrupts.write_enable(value) {
                    self.force_event();
                }
            }
            io::IF => self.interrupts.acknowledge(value),
            io::WAITCNT => {
                self.timing.apply_waitcnt(value);
                self.io.store16(offset, value & 0x7FFF);
            }
            io::IME => {
                if self.interrupts.write_master(value) {
                    self.force_event();
                }
            }
            io::POSTFLG => {
                self.io.store16(offset, value);
                self.halt(value >> 8);
            }
            _ => self.io.store16(offset, value),
        }
    }

    /// HALTCNT write.
    fn halt(&mut self, value: u16) {
        let stop = value & 0x80 != 0;
        debug!(stop, "cpu halted");
        self.interrupts.halt(stop);
        self.force_event();
    }

    fn write_io8(&mut self, offset: u32, value: u8) {
        match offset {
            io::POSTFLG => self.io.store8(offset, value),
            io::HALTCNT => {
                self.io.store8(offset, value);
                self.halt(u16::from(value));
            }
            _ => {
                // The merged halfword is written back whole, so a byte write
                // to IF also acknowledges every flag set in the other byte.
                let current = self.io_register(offset);
                let merged = if offset & 1 != 0 {
                    (current & 0x00FF) | (u16::from(value) << 8)
                } else {
                    (current & 0xFF00) | u16::from(value)
                };
                self.write_io16(offset, merged);
            }
        }
    }

    /// Evaluates the channels selected by `mask` for start condition
    /// `reason` and runs every one that fires, in priority order.
    pub(crate) fn check_dma(&mut self, reason: DmaTiming, mask: u8) {
        for n in 0..4 {
            if mask & (1 << n) == 0 {
                continue;
            }
            let Some(transfer) = self.dma.triggered(n, reason) else {
                continue;
            };
            self.run_dma(transfer);
            self.dma_latched = true;
            if self.dma.complete(n, reason) {
                self.interrupts.request(Interrupt::dma(n));
                self.force_event();
            }
        }
    }

    fn run_dma(&mut self, transfer: DmaTransfer) {
        let channel = self.dma.channel(transfer.channel);
        let mut src = channel.internal_source();
        let mut dst = channel.internal_dest();
        self.dma_ticks += transfer.cost(&self.timing, src, dst);

        let dest_step = transfer.dest_step as u32;
        let source_step = transfer.source_step as u32;
        if transfer.word {
            src &= !3;
            let zero_fill = src < 0x0200_0000 && !self.in_bios;
            for _ in 0..transfer.count {
                let value = if zero_fill {
                    0
                } else {
                    let v = self.read32(src);
                    self.dma.last_value = v;
                    src = src.wrapping_add(source_step);
                    v
                };
                self.write32(dst, value);
                dst = dst.wrapping_add(dest_step);
            }
        } else {
            src &= !1;
            let zero_fill = src < 0x0200_0000 && !self.in_bios;
            for _ in 0..transfer.count {
                let value = if zero_fill {
                    0
                } else {
                    let v = self.read16(src) & 0xFFFF;
                    self.dma.last_value = v | (v << 16);
                    src = src.wrapping_add(source_step);
                    v as u16
                };
                self.write16(dst, value);
                dst = dst.wrapping_add(dest_step);
            }
        }

        let channel = &mut self.dma.channels[transfer.channel];
        channel.internal_source = src;
        channel.internal_dest = dst;
    }

    // ========== Region Reads ==========

    fn bios_readable(&self, addr: u32) -> Option<bool> {
        if addr >= BIOS_SIZE as u32 {
            None
        } else {
            Some(self.in_bios)
        }
    }
}

impl MemoryBus for SystemBus {
    fn read8(&mut self, addr: u32) -> u8 {
        match region(addr) {
            0x0 => match self.bios_readable(addr) {
                Some(true) => self.bios[addr as usize & (BIOS_SIZE - 1)],
                Some(false) => (self.bios_latch >> ((addr & 3) * 8)) as u8,
                None => self.open_bus8(addr),
            },
            0x2 => self.ewram[addr as usize & (EWRAM_SIZE - 1)],
            0x3 => self.iwram[addr as usize & (IWRAM_SIZE - 1)],
            0x4 => {
                let offset = addr & 0xFF_FFFF;
                if offset < io::IO_SIZE as u32 && io::is_readable(offset) {
                    (self.io_register(offset) >> ((offset & 1) * 8)) as u8
                } else {
                    self.open_bus8(addr)
                }
            }
            0x5 => self.palette[addr as usize & (PALETTE_SIZE - 1)],
            0x6 => match self.vram_index(addr) {
                Some(i) => self.vram[i],
                None => 0,
            },
            0x7 => self.oam[addr as usize & (OAM_SIZE - 1)],
            0x8..=0xC => (self.rom16(addr) >> ((addr & 1) * 8)) as u8,
            0xD => match self.backup.read16(addr) {
                Some(v) => v as u8,
                None => self.open_bus8(addr),
            },
            0xE => match self.backup.read8(addr) {
                Some(v) => v,
                None => self.open_bus8(addr),
            },
            _ => self.open_bus8(addr),
        }
    }

    fn read16(&mut self, addr: u32) -> u32 {
        let value = match region(addr) {
            0x0 => match self.bios_readable(addr) {
                Some(true) => le16(&self.bios, addr as usize & 0x3FFE),
                Some(false) => (self.bios_latch >> ((addr & 2) * 8)) & 0xFFFF,
                None => return self.open_bus16(addr),
            },
            0x2 => le16(&self.ewram, addr as usize & 0x3_FFFE),
            0x3 => le16(&self.iwram, addr as usize & 0x7FFE),
            0x4 => {
                let offset = addr & 0xFF_FFFE;
                if offset < io::IO_SIZE as u32 && io::is_readable(offset) {
                    u32::from(self.io_register(offset))
                } else {
                    return self.open_bus16(addr);
                }
            }
            0x5 => le16(&self.palette, addr as usize & 0x3FE),
            0x6 => match self.vram_index(addr & !1) {
                Some(i) => le16(&self.vram, i),
                None => 0,
            },
            0x7 => le16(&self.oam, addr as usize & 0x3FE),
            0x8..=0xC => self.rom16(addr),
            0xD => {
                return match self.backup.read16(addr) {
                    Some(v) => u32::from(v),
                    None => self.open_bus16(addr),
                }
            }
            0xE => {
                return match self.backup.read8(addr) {
                    Some(v) => u32::from(v),
                    None => self.open_bus16(addr),
                }
            }
            _ => return self.open_bus16(addr),
        };
        rotate_half(value, addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let value = match region(addr) {
            0x0 => match self.bios_readable(addr) {
                Some(true) => le32(&self.bios, addr as usize & 0x3FFC),
                Some(false) => self.bios_latch,
                None => return self.open_bus32(addr),
            },
            0x2 => le32(&self.ewram, addr as usize & 0x3_FFFC),
            0x3 => le32(&self.iwram, addr as usize & 0x7FFC),
            0x4 => return self.read_io32(addr),
            0x5 => le32(&self.palette, addr as usize & 0x3FC),
            0x6 => match self.vram_index(addr & !3) {
                Some(i) => le32(&self.vram, i),
                None => 0,
            },
            0x7 => le32(&self.oam, addr as usize & 0x3FC),
            0x8..=0xC => self.rom32(addr),
            0xD => {
                return match self.backup.read16(addr) {
                    Some(v) => u32::from(v),
                    None => self.open_bus32(addr),
                }
            }
            0xE => {
                return match self.backup.read8(addr) {
                    Some(v) => u32::from(v),
                    None => self.open_bus32(addr),
                }
            }
            _ => return self.open_bus32(addr),
        };
        rotate_word(value, addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        match region(addr) {
            0x2 => self.ewram[addr as usize & (EWRAM_SIZE - 1)] = value,
            0x3 => self.iwram[addr as usize & (IWRAM_SIZE - 1)] = value,
            0x4 => {
                let offset = addr & 0xFF_FFFF;
                if offset < io::IO_SIZE as u32 {
                    self.write_io8(offset, value);
                }
            }
            0x5 => {
                let doubled = u16::from_le_bytes([value, value]);
                put16(&mut self.palette, addr as usize & 0x3FE, doubled);
            }
            0x6 => {
                let base = OBJ_TILE_BASE[usize::from((self.lcd.mode() + 1) >> 2)];
                if let Some(i) = self.vram_index(addr & !1) {
                    if (i as u32) < base {
                        put16(&mut self.vram, i, u16::from_le_bytes([value, value]));
                    }
                }
            }
            0xD => self.backup.write16(addr, u16::from(value)),
            0xE => self.backup.write8(addr, value),
            _ => {}
        }
    }

    fn write16(&mut self, addr: u32, value: u16) {
        match region(addr) {
            0x2 => put16(&mut self.ewram, addr as usize & 0x3_FFFE, value),
            0x3 => put16(&mut self.iwram, addr as usize & 0x7FFE, value),
            0x4 => {
                let offset = addr & 0xFF_FFFE;
                if offset < io::IO_SIZE as u32 {
                    self.write_io16(offset, value);
                }
            }
            0x5 => put16(&mut self.palette, addr as usize & 0x3FE, value),
            0x6 => {
                if let Some(i) = self.vram_index(addr & !1) {
                    put16(&mut self.vram, i, value);
                }
            }
            0x7 => put16(&mut self.oam, addr as usize & 0x3FE, value),
            0xD => self.backup.write16(addr, value),
            0xE => self.backup.write8(addr, value as u8),
            _ => {}
        }
    }

    fn write32(&mut self, addr: u32, value: u32) {
        match region(addr) {
            0x2 => put32(&mut self.ewram, addr as usize & 0x3_FFFC, value),
            0x3 => put32(&mut self.iwram, addr as usize & 0x7FFC, value),
            0x4 => {
                let offset = addr & 0xFF_FFFC;
                if offset < io::IO_SIZE as u32 {
                    self.write_io16(offset, value as u16);
                    self.write_io16(offset + 2, (value >> 16) as u16);
                }
            }
            0x5 => put32(&mut self.palette, addr as usize & 0x3FC, value),
            0x6 => {
                if let Some(i) = self.vram_index(addr & !3) {
                    put32(&mut self.vram, i, value);
                }
            }
            0x7 => put32(&mut self.oam, addr as usize & 0x3FC, value),
            0xD => self.backup.write16(addr, value as u16),
            0xE => self.backup.write8(addr, value as u8),
            _ => {}
        }
    }

    fn fetch16(&mut self, addr: u32) -> u16 {
        self.in_bios = region(addr) == 0;
        let value = self.read16(addr & !1) as u16;
        self.open_bus = u32::from(value) * 0x1_0001;
        value
    }

    fn fetch32(&mut self, addr: u32) -> u32 {
        self.in_bios = region(addr) == 0;
        let value = self.read32(addr & !3);
        self.open_bus = value;
        value
    }

    fn timing(&mut self) -> &mut WaitStates {
        &mut self.timing
    }

    fn irq_unmasked(&mut self) {
        self.force_event();
    }

    fn bios_hle(&self) -> bool {
        !self.bios_loaded
    }
}
