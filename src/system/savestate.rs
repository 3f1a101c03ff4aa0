//! Snapshot serialization for complete machine state capture.
//!
//! ## Binary Format
//!
//! All integers are little-endian. Sections follow each other without
//! padding, in this order:
//!
//! 1. Header: magic `"AGBS"`, u32 version, 16-byte ROM title, BIOS flag
//! 2. Registers: r0-r15, CPSR, six banks of r13/r14/SPSR, both r8-r12
//!    sets, the IntrWait flag
//! 3. Memory: internal RAM, external RAM, palette, VRAM, OAM, I/O bank
//! 4. DMA: every channel's registers and working addresses, the open-bus word
//! 5. Timers: counter, reload, control, ticks, enable, pending write
//! 6. Interrupts: IE, IF, IME, halted, stopped, latency latch
//! 7. Scheduler: prefetch counter and flags, BIOS latch, video timing,
//!    audio ticks, cycle counters, keys
//! 8. Collaborators: backup, audio and display blobs, each with a u32
//!    length prefix
//!
//! Wait tables, timer prescaler shifts, the fetch pipeline and the next
//! scheduler event are recomputed on restore. Countdowns outside the range
//! the scheduler can produce are rejected while parsing.
//!
//! ## Usage
//!
//! ```
//! use libagb::{Machine, MachineConfig};
//!
//! let mut machine = Machine::new(MachineConfig::default());
//! machine.load_rom(&0xEAFF_FFFEu32.to_le_bytes());
//! machine.step().unwrap();
//!
//! let snapshot = machine.save();
//! machine.run_frame().unwrap();
//! machine.load(&snapshot).unwrap();
//! ```

use thiserror::Error;

use super::bus::{EWRAM_SIZE, IWRAM_SIZE, OAM_SIZE, PALETTE_SIZE, VRAM_SIZE};
use super::machine::Machine;
use crate::devices::dma::DmaChannel;
use crate::devices::io::IO_SIZE;
use crate::devices::lcd::FRAME_CYCLES;
use crate::devices::timers::Timer;
use crate::devices::{InterruptController, Lcd, Timers};
use crate::registers::{Bank, Mode, RegisterFile, FLAG_F, FLAG_I, FLAG_T};

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic number at the start of every snapshot ("AGBS" in ASCII).
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"AGBS";

/// Offset of the internal title in a cartridge header.
const TITLE_OFFSET: usize = 0xA0;
const TITLE_SIZE: usize = 16;

/// Largest timer countdown: 0x10000 counts at the 1024-cycle prescaler.
const TIMER_TICKS_LIMIT: i32 = 0x1_0000 << 10;
/// Bound on the scheduler's own counters.
const SCHEDULER_TICKS_LIMIT: i32 = 1 << 30;

/// Reasons a snapshot is rejected. The machine is never modified when one
/// of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("not a snapshot (bad magic)")]
    BadMagic,

    #[error("snapshot version {found} is not supported (newest is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("snapshot truncated in {section} section")]
    Truncated { section: &'static str },

    #[error("snapshot was taken with cartridge {expected:?}, loaded cartridge is {found:?}")]
    RomMismatch { expected: String, found: String },

    #[error("snapshot BIOS setting does not match the machine")]
    BiosMismatch,

    #[error("snapshot {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i32 },
}

/// Reads the 16-byte internal title of a cartridge image, zero-padded.
pub fn rom_title(rom: &[u8]) -> [u8; TITLE_SIZE] {
    let mut title = [0; TITLE_SIZE];
    if let Some(bytes) = rom.get(TITLE_OFFSET..) {
        let len = bytes.len().min(TITLE_SIZE);
        title[..len].copy_from_slice(&bytes[..len]);
    }
    title
}

fn title_string(title: &[u8; TITLE_SIZE]) -> String {
    let end = title.iter().position(|&b| b == 0).unwrap_or(TITLE_SIZE);
    String::from_utf8_lossy(&title[..end]).into_owned()
}

/// Register file. The fetch pipeline is refilled on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegisterState {
    r: [u32; 16],
    cpsr: u32,
    banks: [Bank; 6],
    usr_hi: [u32; 5],
    fiq_hi: [u32; 5],
    intr_wait_active: bool,
}

/// Memory banks owned by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MemoryState {
    iwram: Vec<u8>,
    ewram: Vec<u8>,
    palette: Vec<u8>,
    vram: Vec<u8>,
    oam: Vec<u8>,
    io: Vec<u8>,
}

/// Scheduler counters and latches.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SchedulerState {
    prefetch_count: u32,
    prefetch_active: bool,
    bios_latch: u32,
    lcd: Lcd,
    audio_ticks: i32,
    ticks: i32,
    dma_ticks: i32,
    dma_latched: bool,
    elapsed: u64,
    keys: u16,
}

/// A parsed snapshot, staged before it is applied to a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveState {
    /// Format version the snapshot was written with.
    pub version: u32,
    /// Internal title of the cartridge that was running.
    pub rom_title: [u8; TITLE_SIZE],
    /// Whether a BIOS image was installed.
    pub bios_loaded: bool,

    registers: RegisterState,
    memory: MemoryState,
    dma: [DmaChannel; 4],
    dma_latch: u32,
    timers: [Timer; 4],
    interrupts: InterruptController,
    scheduler: SchedulerState,

    backup: Vec<u8>,
    audio: Vec<u8>,
    display: Vec<u8>,
}

impl SaveState {
    /// Captures the complete state of `machine`.
    pub fn capture(machine: &Machine) -> Self {
        let cpu = &machine.cpu;
        let bus = &cpu.bus;
        let regs = &cpu.regs;

        Self {
            version: SNAPSHOT_VERSION,
            rom_title: rom_title(&bus.rom),
            bios_loaded: bus.bios_loaded,
            registers: RegisterState {
                r: regs.r,
                cpsr: regs.cpsr(),
                banks: regs.banks,
                usr_hi: regs.usr_hi,
                fiq_hi: regs.fiq_hi,
                intr_wait_active: cpu.intr_wait_active,
            },
            memory: MemoryState {
                iwram: bus.iwram.clone(),
                ewram: bus.ewram.clone(),
                palette: bus.palette.clone(),
                vram: bus.vram.clone(),
                oam: bus.oam.clone(),
                io: bus.io.as_bytes().to_vec(),
            },
            dma: bus.dma.channels.clone(),
            dma_latch: bus.dma.last_value,
            timers: bus.timers.timers.clone(),
            interrupts: bus.interrupts.clone(),
            scheduler: SchedulerState {
                prefetch_count: bus.timing.prefetch_count,
                prefetch_active: bus.timing.prefetch_active,
                bios_latch: bus.bios_latch,
                lcd: bus.lcd.clone(),
                audio_ticks: bus.audio_ticks,
                ticks: bus.ticks,
                dma_ticks: bus.dma_ticks,
                dma_latched: bus.dma_latched,
                elapsed: bus.elapsed,
                keys: bus.keys,
            },
            backup: bus.backup.save_state(),
            audio: bus.audio.save_state(),
            display: bus.display.save_state(),
        }
    }

    /// Checks that this snapshot can be applied to `machine`.
    pub fn check_compatible(&self, machine: &Machine) -> Result<(), SnapshotError> {
        let bus = &machine.cpu.bus;
        let title = rom_title(&bus.rom);
        if title != self.rom_title {
            return Err(SnapshotError::RomMismatch {
                expected: title_string(&self.rom_title),
                found: title_string(&title),
            });
        }
        if self.bios_loaded != bus.bios_loaded {
            return Err(SnapshotError::BiosMismatch);
        }
        Ok(())
    }

    /// Applies this snapshot to `machine`, then recomputes everything
    /// derived from it.
    pub fn restore(&self, machine: &mut Machine) {
        let cpu = &mut machine.cpu;

        // Registers
        let saved = &self.registers;
        let mode = Mode::from_bits(saved.cpsr).unwrap_or(Mode::System);
        let mut regs = RegisterFile::new();
        regs.r = saved.r;
        regs.mode = mode;
        regs.active = mode.bank_index();
        regs.set_flags(saved.cpsr);
        regs.irq_disabled = saved.cpsr & FLAG_I != 0;
        regs.fiq_disabled = saved.cpsr & FLAG_F != 0;
        regs.thumb = saved.cpsr & FLAG_T != 0;
        regs.banks = saved.banks;
        regs.usr_hi = saved.usr_hi;
        regs.fiq_hi = saved.fiq_hi;
        cpu.regs = regs;
        cpu.intr_wait_active = saved.intr_wait_active;

        let bus = &mut cpu.bus;

        // Memory
        bus.iwram.copy_from_slice(&self.memory.iwram);
        bus.ewram.copy_from_slice(&self.memory.ewram);
        bus.palette.copy_from_slice(&self.memory.palette);
        bus.vram.copy_from_slice(&self.memory.vram);
        bus.oam.copy_from_slice(&self.memory.oam);
        bus.io.restore(&self.memory.io);

        // Peripherals
        bus.dma.channels = self.dma.clone();
        bus.dma.last_value = self.dma_latch;
        bus.timers.timers = self.timers.clone();
        bus.interrupts = self.interrupts.clone();

        // Wait tables come from WAITCNT; the prefetch state goes on top
        let waitcnt = bus.io.load16(crate::devices::io::WAITCNT);
        bus.timing.apply_waitcnt(waitcnt);
        let scheduler = &self.scheduler;
        bus.timing.prefetch_count = scheduler.prefetch_count;
        bus.timing.prefetch_active = scheduler.prefetch_active;

        bus.bios_latch = scheduler.bios_latch;
        bus.lcd = scheduler.lcd.clone();
        bus.audio_ticks = scheduler.audio_ticks;
        bus.ticks = scheduler.ticks;
        bus.dma_ticks = scheduler.dma_ticks;
        bus.dma_latched = scheduler.dma_latched;
        bus.elapsed = scheduler.elapsed;
        bus.keys = scheduler.keys;
        bus.frame_done = false;

        bus.backup.load_state(&self.backup);
        bus.audio.load_state(&self.audio);
        bus.display.load_state(&self.display);

        bus.next_event = bus.next_deadline();
        if bus.interrupts.int_state {
            bus.next_event = bus.next_event.min(bus.ticks.saturating_add(1));
        }

        // Pipeline: r15 runs one instruction ahead of the next one to execute
        let width = if cpu.regs.thumb { 2 } else { 4 };
        cpu.next_pc = cpu.regs.r[15].wrapping_sub(width);
        cpu.refill();
    }

    /// Serializes the snapshot to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::default();

        // Header
        w.bytes(&SNAPSHOT_MAGIC);
        w.u32(self.version);
        w.bytes(&self.rom_title);
        w.bool(self.bios_loaded);

        // Registers
        let regs = &self.registers;
        regs.r.iter().for_each(|&v| w.u32(v));
        w.u32(regs.cpsr);
        for bank in &regs.banks {
            w.u32(bank.r13);
            w.u32(bank.r14);
            w.u32(bank.spsr);
        }
        regs.usr_hi.iter().for_each(|&v| w.u32(v));
        regs.fiq_hi.iter().for_each(|&v| w.u32(v));
        w.bool(regs.intr_wait_active);

        // Memory
        let mem = &self.memory;
        for bank in [&mem.iwram, &mem.ewram, &mem.palette, &mem.vram, &mem.oam, &mem.io] {
            w.bytes(bank);
        }

        // DMA
        for ch in &self.dma {
            w.u32(ch.source);
            w.u32(ch.dest);
            w.u16(ch.count);
            w.u16(ch.control);
            w.u32(ch.internal_source);
            w.u32(ch.internal_dest);
        }
        w.u32(self.dma_latch);

        // Timers
        for timer in &self.timers {
            w.u16(timer.counter);
            w.u16(timer.reload);
            w.u16(timer.control);
            w.i32(timer.ticks);
            w.bool(timer.enabled);
            w.bool(timer.pending.is_some());
            w.u16(timer.pending.unwrap_or(0));
        }

        // Interrupts
        let irq = &self.interrupts;
        w.u16(irq.enable);
        w.u16(irq.flags);
        w.bool(irq.master);
        w.bool(irq.halted);
        w.bool(irq.stopped);
        w.bool(irq.int_state);

        // Scheduler
        let s = &self.scheduler;
        w.u32(s.prefetch_count);
        w.bool(s.prefetch_active);
        w.u32(s.bios_latch);
        w.u16(s.lcd.dispcnt);
        w.u16(s.lcd.dispstat);
        w.u16(s.lcd.vcount);
        w.i32(s.lcd.ticks);
        w.i32(s.audio_ticks);
        w.i32(s.ticks);
        w.i32(s.dma_ticks);
        w.bool(s.dma_latched);
        w.u64(s.elapsed);
        w.u16(s.keys);

        // Collaborators
        for blob in [&self.backup, &self.audio, &self.display] {
            w.u32(blob.len() as u32);
            w.bytes(blob);
        }

        w.data
    }

    /// Parses a snapshot without applying it.
    pub fn deserialize(data: &[u8]) -> Result<Self, SnapshotError> {
        let mut r = Reader::new(data);

        // Header
        r.section("header");
        if r.array::<4>()? != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = r.u32()?;
        if version == 0 || version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let rom_title = r.array::<TITLE_SIZE>()?;
        let bios_loaded = r.bool()?;

        r.section("registers");
        let mut registers = RegisterState {
            r: [0; 16],
            cpsr: 0,
            banks: [Bank::default(); 6],
            usr_hi: [0; 5],
            fiq_hi: [0; 5],
            intr_wait_active: false,
        };
        for v in &mut registers.r {
            *v = r.u32()?;
        }
        registers.cpsr = r.u32()?;
        for bank in &mut registers.banks {
            bank.r13 = r.u32()?;
            bank.r14 = r.u32()?;
            bank.spsr = r.u32()?;
        }
        for v in registers
            .usr_hi
            .iter_mut()
            .chain(registers.fiq_hi.iter_mut())
        {
            *v = r.u32()?;
        }
        registers.intr_wait_active = r.bool()?;

        r.section("memory");
        let memory = MemoryState {
            iwram: r.vec(IWRAM_SIZE)?,
            ewram: r.vec(EWRAM_SIZE)?,
            palette: r.vec(PALETTE_SIZE)?,
            vram: r.vec(VRAM_SIZE)?,
            oam: r.vec(OAM_SIZE)?,
            io: r.vec(IO_SIZE)?,
        };

        r.section("dma");
        let mut dma: [DmaChannel; 4] = Default::default();
        for ch in &mut dma {
            ch.source = r.u32()?;
            ch.dest = r.u32()?;
            ch.count = r.u16()?;
            ch.control = r.u16()?;
            ch.internal_source = r.u32()?;
            ch.internal_dest = r.u32()?;
        }
        let dma_latch = r.u32()?;

        r.section("timers");
        let mut block = Timers::new();
        for timer in &mut block.timers {
            timer.counter = r.u16()?;
            timer.reload = r.u16()?;
            timer.control = r.u16()?;
            timer.ticks = bounded("timer ticks", r.i32()?, TIMER_TICKS_LIMIT)?;
            timer.enabled = r.bool()?;
            let has_pending = r.bool()?;
            let pending = r.u16()?;
            timer.pending = has_pending.then_some(pending);
        }
        block.recompute_shifts();
        let timers = block.timers;

        r.section("interrupts");
        let interrupts = InterruptController {
            enable: r.u16()?,
            flags: r.u16()?,
            master: r.bool()?,
            halted: r.bool()?,
            stopped: r.bool()?,
            int_state: r.bool()?,
        };

        r.section("scheduler");
        let scheduler = SchedulerState {
            prefetch_count: r.u32()?,
            prefetch_active: r.bool()?,
            bios_latch: r.u32()?,
            lcd: Lcd {
                dispcnt: r.u16()?,
                dispstat: r.u16()?,
                vcount: r.u16()?,
                ticks: bounded("video ticks", r.i32()?, FRAME_CYCLES as i32)?,
            },
            audio_ticks: bounded("audio ticks", r.i32()?, SCHEDULER_TICKS_LIMIT)?,
            ticks: bounded("scheduler ticks", r.i32()?, SCHEDULER_TICKS_LIMIT)?,
            dma_ticks: bounded("DMA ticks", r.i32()?, SCHEDULER_TICKS_LIMIT)?,
            dma_latched: r.bool()?,
            elapsed: r.u64()?,
            keys: r.u16()?,
        };

        r.section("collaborators");
        let backup = r.blob()?;
        let audio = r.blob()?;
        let display = r.blob()?;

        Ok(Self {
            version,
            rom_title,
            bios_loaded,
            registers,
            memory,
            dma,
            dma_latch,
            timers,
            interrupts,
            scheduler,
            backup,
            audio,
            display,
        })
    }
}

/// Rejects a countdown outside `-limit..=limit`.
fn bounded(field: &'static str, value: i32, limit: i32) -> Result<i32, SnapshotError> {
    if (-limit..=limit).contains(&value) {
        Ok(value)
    } else {
        Err(SnapshotError::OutOfRange { field, value })
    }
}

#[derive(Default)]
struct Writer {
    data: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn bool(&mut self, v: bool) {
        self.data.push(u8::from(v));
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }
}

/// Cursor over a snapshot; every read reports the section it ran out in.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            section: "header",
        }
    }

    fn section(&mut self, name: &'static str) {
        self.section = name;
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(SnapshotError::Truncated {
                section: self.section,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn vec(&mut self, len: usize) -> Result<Vec<u8>, SnapshotError> {
        Ok(self.take(len)?.to_vec())
    }

    fn blob(&mut self) -> Result<Vec<u8>, SnapshotError> {
        let len = self.u32()? as usize;
        self.vec(len)
    }

    fn bool(&mut self) -> Result<bool, SnapshotError> {
        Ok(self.array::<1>()?[0] != 0)
    }

    fn u16(&mut self) -> Result<u16, SnapshotError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, SnapshotError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}
