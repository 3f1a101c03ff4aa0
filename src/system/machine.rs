//! The host-facing machine and its scheduler.
//!
//! [`Machine`] owns the CPU, which in turn owns the [`SystemBus`]. Devices do
//! not tick every cycle: instructions accumulate cycles in `ticks`, and when
//! that count reaches `next_event` an update pass advances video timing,
//! audio and timers by the elapsed amount in one go. Pending DMA stall
//! cycles and any overshoot of the event are folded in through further
//! passes before interrupts are evaluated.
//!
//! ```text
//!   step ──► ticks += cycles ──► ticks >= next_event ?
//!                                   │ yes
//!                                   ▼
//!            ┌──── update pass (video, audio, timers) ◄──┐
//!            │         │                                 │
//!            │         ▼                                 │
//!            │   DMA stall left? ── yes ─────────────────┤
//!            │         │ no                              │
//!            │         ▼                                 │
//!            │   interrupt check                         │
//!            │         │                                 │
//!            │   overshoot left? ── yes ─────────────────┘
//!            │         │ no
//!            ▼         ▼
//!        apply latched timer writes
//! ```

use thiserror::Error;
use tracing::{debug, info};

use super::bus::{SystemBus, BIOS_LATCH_IRQ, KEYS_RELEASED, MAX_ROM_SIZE};
use super::config::MachineConfig;
use super::savestate::{SaveState, SnapshotError};
use crate::bios::{self, BIOS_SIZE, ROM_ENTRY};
use crate::cpu::Cpu;
use crate::devices::io::{self, KEYCNT};
use crate::devices::lcd::VBLANK_LINE;
use crate::devices::{
    Audio, Display, DmaTiming, Interrupt, NullAudio, NullDisplay, VideoPhase, VideoView,
};
use crate::memory::MemoryBus;
use crate::registers::Mode;

/// Errors from driving a [`Machine`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("no cartridge loaded")]
    NoCartridge,

    #[error("BIOS image must be {expected} bytes, got {found}")]
    InvalidBios { expected: usize, found: usize },
}

/// A complete system: CPU, memory map, peripherals and collaborators.
///
/// # Examples
///
/// ```
/// use libagb::{Machine, MachineConfig};
///
/// let mut machine = Machine::new(MachineConfig::default());
/// // b . (spin forever)
/// machine.load_rom(&0xEAFF_FFFEu32.to_le_bytes());
///
/// let cycles = machine.run_frame().unwrap();
/// assert!(cycles > 0);
/// assert_eq!(machine.pc(), 0x0800_0000);
/// ```
pub struct Machine {
    pub(crate) cpu: Cpu<SystemBus>,
    config: MachineConfig,
    rom_loaded: bool,
}

impl Machine {
    /// Creates a machine with no cartridge, the built-in BIOS and
    /// collaborators that discard video and audio.
    pub fn new(config: MachineConfig) -> Self {
        Self::with_collaborators(config, Box::new(NullDisplay), Box::new(NullAudio))
    }

    /// Creates a machine with the given display and audio collaborators.
    pub fn with_collaborators(
        config: MachineConfig,
        display: Box<dyn Display>,
        audio: Box<dyn Audio>,
    ) -> Self {
        let backup = config.save_type.create();
        let bus = SystemBus::new(display, audio, backup);
        let mut machine = Self {
            cpu: Cpu::new(bus),
            config,
            rom_loaded: false,
        };
        machine.reset();
        machine
    }

    /// Installs a cartridge image and resets.
    ///
    /// Images larger than the 32 MiB ROM window are truncated.
    pub fn load_rom(&mut self, rom: &[u8]) {
        let len = rom.len().min(MAX_ROM_SIZE);
        let bus = &mut self.cpu.bus;
        bus.rom = rom[..len].to_vec();
        self.rom_loaded = true;
        info!(bytes = len, "cartridge loaded");
        self.reset();
    }

    /// Installs a BIOS image and resets. SWIs then vector into it instead
    /// of being serviced by the built-in emulation.
    pub fn load_bios(&mut self, image: &[u8]) -> Result<(), ExecutionError> {
        if image.len() != BIOS_SIZE {
            return Err(ExecutionError::InvalidBios {
                expected: BIOS_SIZE,
                found: image.len(),
            });
        }
        let bus = &mut self.cpu.bus;
        bus.bios = image.to_vec();
        bus.bios_loaded = true;
        info!("BIOS image installed");
        self.reset();
        Ok(())
    }

    /// Power-cycles the machine. The cartridge, BIOS and backup contents
    /// are kept.
    pub fn reset(&mut self) {
        let after_boot = self.config.skip_bios || !self.cpu.bus.bios_loaded;
        let waitcnt = self.config.initial_waitcnt();
        self.cpu
            .bus
            .reset(after_boot, waitcnt, self.config.audio_interval_cycles);
        self.cpu.reset_registers();

        if self.cpu.bus.bios_hle() {
            bios::register_ram_reset(&mut self.cpu.bus, 0xFF);
            self.cpu.bus.write_io16(io::WAITCNT, waitcnt);
        }

        if after_boot {
            bios::boot_registers(&mut self.cpu.regs);
            self.cpu.jump(ROM_ENTRY, false);
        } else {
            bios::power_on_registers(&mut self.cpu.regs);
            self.cpu.jump(0, false);
        }

        let bus = &mut self.cpu.bus;
        bus.ticks = 0;
        bus.dma_ticks = 0;
        bus.dma_latched = false;
        bus.elapsed = 0;
        bus.next_event = bus.next_deadline();
        debug!(after_boot, pc = format_args!("{:#010X}", self.cpu.pc()), "reset");
    }

    // ========== Execution ==========

    /// Runs until VBlank starts and returns the cycles that elapsed,
    /// including DMA stalls and halted time.
    ///
    /// Programs that never reach VBlank (the display is never left running)
    /// stop after `frame_limit_cycles`.
    pub fn run_frame(&mut self) -> Result<u32, ExecutionError> {
        if !self.rom_loaded {
            return Err(ExecutionError::NoCartridge);
        }
        let start = self.cpu.bus.elapsed;
        let limit = u64::from(self.config.frame_limit_cycles);
        self.cpu.bus.frame_done = false;
        while !self.cpu.bus.frame_done && self.cpu.bus.elapsed - start < limit {
            self.tick();
        }
        let cycles = (self.cpu.bus.elapsed - start) as u32;
        debug!(cycles, vblank = self.cpu.bus.frame_done, "frame complete");
        Ok(cycles)
    }

    /// Executes one instruction (or one halted interval) plus any scheduler
    /// work it makes due. Returns the cycles it consumed.
    pub fn step(&mut self) -> Result<u32, ExecutionError> {
        if !self.rom_loaded {
            return Err(ExecutionError::NoCartridge);
        }
        Ok(self.tick())
    }

    fn tick(&mut self) -> u32 {
        let clock = if self.cpu.bus.interrupts.is_halted() {
            self.cpu.bus.next_deadline().max(0) as u32
        } else {
            self.cpu.step()
        };
        let bus = &mut self.cpu.bus;
        bus.ticks += clock as i32;
        if bus.ticks >= bus.next_event {
            self.process_event();
        }
        clock
    }

    fn process_event(&mut self) {
        let bus = &mut self.cpu.bus;
        let mut remaining = bus.ticks - bus.next_event;
        let mut clock = bus.next_event;
        bus.ticks = 0;
        bus.dma_latched = false;

        loop {
            self.update(clock);

            let bus = &mut self.cpu.bus;
            if bus.dma_ticks > 0 {
                clock = bus.dma_ticks.min(bus.next_event);
                bus.dma_ticks -= clock;
                bus.dma_latched = true;
                continue;
            }

            self.check_interrupts();

            if remaining > 0 {
                clock = remaining.min(self.cpu.bus.next_event);
                remaining -= clock;
                continue;
            }
            break;
        }

        let bus = &mut self.cpu.bus;
        if bus.timers.has_pending() {
            bus.timers.apply_pending();
            bus.next_event = bus.next_event.min(bus.next_deadline());
        }
    }

    /// One update pass over `clock` elapsed cycles.
    fn update(&mut self, clock: i32) {
        let bus = &mut self.cpu.bus;
        bus.elapsed += clock.max(0) as u64;

        let step = bus.lcd.advance(clock);
        bus.interrupts.raise(step.irq);
        if let Some(line) = step.scanline {
            let phase = if line < VBLANK_LINE {
                VideoPhase::Visible
            } else {
                VideoPhase::VBlank
            };
            let view = VideoView {
                vram: &bus.vram,
                palette: &bus.palette,
                oam: &bus.oam,
                io: bus.io.as_bytes(),
            };
            let request = bus.display.scanline(line, phase, &view);
            if request.capture {
                bus.check_dma(DmaTiming::Special, 0b1000);
            }
        }
        if step.hblank_dma {
            bus.check_dma(DmaTiming::HBlank, 0b1111);
        }
        if step.vblank_start {
            keypad_interrupt(bus);
            bus.check_dma(DmaTiming::VBlank, 0b1111);
            bus.display.frame_ready();
            bus.frame_done = true;
        }

        bus.audio_ticks -= clock;
        if bus.audio_ticks <= 0 {
            bus.audio.tick(bus.audio_interval as u32);
            bus.audio_ticks += bus.audio_interval;
        }

        if !bus.interrupts.is_stopped() {
            let timers = bus.timers.advance(clock);
            bus.interrupts.raise(timers.irq);
            for n in 0..2 {
                if timers.overflow & (1 << n) != 0 {
                    let fifo = bus.audio.timer_overflow(n) & 0b0110;
                    if fifo != 0 {
                        bus.check_dma(DmaTiming::Special, fifo);
                    }
                }
            }
        }

        bus.next_event = bus.next_deadline();
    }

    /// Services `IF & IE` after an update pass.
    fn check_interrupts(&mut self) {
        let irq_disabled = self.cpu.irq_disabled();
        let bus = &mut self.cpu.bus;
        if bus.interrupts.pending() == 0 {
            return;
        }
        if bus.interrupts.master() != 0 && !irq_disabled {
            if bus.interrupts.int_state || bus.interrupts.is_halted() {
                self.enter_irq();
            } else {
                // Taken after the next instruction
                bus.interrupts.int_state = true;
                bus.next_event = bus.next_event.min(bus.ticks + 1);
            }
        } else if bus.interrupts.is_halted() {
            bus.interrupts.wake();
        }
    }

    fn enter_irq(&mut self) {
        self.cpu.interrupt();
        let bus = &mut self.cpu.bus;
        bus.bios_latch = BIOS_LATCH_IRQ;
        bus.interrupts.wake();
    }

    // ========== Snapshots ==========

    /// Serializes the complete machine state.
    pub fn save(&self) -> Vec<u8> {
        SaveState::capture(self).serialize()
    }

    /// Restores a state produced by [`Machine::save`].
    ///
    /// The whole snapshot is parsed and checked before anything is touched;
    /// on error the machine is unchanged.
    pub fn load(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let state = SaveState::deserialize(data)
            .and_then(|state| state.check_compatible(self).map(|()| state))
            .inspect_err(|err| tracing::warn!(%err, "rejected snapshot"))?;
        state.restore(self);
        Ok(())
    }

    // ========== Host Interface ==========

    /// Latches an interrupt request, as an external source would.
    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        let bus = &mut self.cpu.bus;
        bus.interrupts.request(interrupt);
        bus.force_event();
    }

    /// Reads an I/O register as software would see it, without open-bus
    /// filtering.
    pub fn read_io(&self, offset: u32) -> u16 {
        self.cpu.bus.io_register(offset)
    }

    /// Writes an I/O register with all side effects.
    pub fn write_io(&mut self, offset: u32, value: u16) {
        self.cpu.bus.write_io16(offset, value);
    }

    /// Sets the pressed buttons (bit set = pressed, bits 0-9).
    pub fn set_keys(&mut self, mask: u16) {
        self.cpu.bus.keys = KEYS_RELEASED ^ (mask & KEYS_RELEASED);
    }

    // ========== Accessors ==========

    /// Returns true once a cartridge image is installed.
    pub fn has_cartridge(&self) -> bool {
        self.rom_loaded
    }

    /// Configuration the machine was created with.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Cpu<SystemBus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu<SystemBus> {
        &mut self.cpu
    }

    pub fn bus(&self) -> &SystemBus {
        self.cpu.bus()
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        self.cpu.bus_mut()
    }

    /// Visible register `index`.
    pub fn reg(&self, index: usize) -> u32 {
        self.cpu.reg(index)
    }

    /// Address of the next instruction.
    pub fn pc(&self) -> u32 {
        self.cpu.pc()
    }

    pub fn cpsr(&self) -> u32 {
        self.cpu.cpsr()
    }

    pub fn mode(&self) -> Mode {
        self.cpu.mode()
    }

    /// Total cycles since reset, including time not yet handed to the
    /// scheduler.
    pub fn cycles(&self) -> u64 {
        self.cpu.bus.elapsed + self.cpu.bus.ticks.max(0) as u64
    }

    /// Current scanline.
    pub fn vcount(&self) -> u16 {
        self.cpu.bus.lcd.vcount()
    }

    /// Returns true while the CPU is halted or stopped.
    pub fn is_halted(&self) -> bool {
        self.cpu.bus.interrupts.is_halted()
    }

    /// Raw cartridge save contents.
    pub fn backup_data(&self) -> Vec<u8> {
        self.cpu.bus.backup.save_state()
    }
}

/// Raises the keypad interrupt at VBlank if KEYCNT asks for it.
///
/// In AND mode (bit 15) every selected button must be down; otherwise any
/// one of them will do. A stopped CPU is always checked.
fn keypad_interrupt(bus: &mut SystemBus) {
    let control = bus.io.load16(KEYCNT);
    if control & 0x4000 == 0 && !bus.interrupts.is_stopped() {
        return;
    }
    let pressed = (KEYS_RELEASED ^ bus.keys) & KEYS_RELEASED;
    let select = control & 0x03FF;
    let fire = if control & 0x8000 != 0 {
        pressed == select
    } else {
        pressed & select != 0
    };
    if fire {
        bus.interrupts.request(Interrupt::Keypad);
    }
}
