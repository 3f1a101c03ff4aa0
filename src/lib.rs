//! # ARM7TDMI Handheld Emulation Core
//!
//! A cycle-counting ARM7TDMI interpreter and the handheld system around it:
//! the memory map with its wait states and prefetch buffer, four DMA
//! channels, four timers, the interrupt controller, video timing and a
//! built-in BIOS.
//!
//! Rendering, sound synthesis and save storage are not emulated here. The
//! core calls out to [`devices::Display`], [`devices::Audio`] and
//! [`devices::Backup`] collaborators, which the host supplies.
//!
//! ## Quick Start
//!
//! ```rust
//! use libagb::{Machine, MachineConfig};
//!
//! let mut machine = Machine::new(MachineConfig::default());
//!
//! // mov r0, #42 ; b .
//! let rom: Vec<u8> = [0xE3A0_002Au32, 0xEAFF_FFFE]
//!     .iter()
//!     .flat_map(|w| w.to_le_bytes())
//!     .collect();
//! machine.load_rom(&rom);
//!
//! machine.run_frame().unwrap();
//! assert_eq!(machine.reg(0), 42);
//! assert_eq!(machine.vcount(), 160);
//! ```
//!
//! The CPU can also run on its own against any [`MemoryBus`]:
//!
//! ```rust
//! use libagb::{Cpu, FlatMemory, MemoryBus};
//!
//! let mut memory = FlatMemory::new();
//! memory.write16(0x0800_0000, 0x2107); // movs r1, #7
//!
//! let mut cpu = Cpu::new(memory);
//! cpu.jump(0x0800_0000, true);
//! cpu.step();
//! assert_eq!(cpu.reg(1), 7);
//! ```
//!
//! ## Modules
//!
//! - `cpu` - pipeline, dispatch and exception entry
//! - `registers` - banked register file and status words
//! - `memory` - `MemoryBus` trait, wait-state tables, flat test memory
//! - `opcodes` - instruction class tables used to build dispatch
//! - `bios` - built-in BIOS stub and high-level SWI services
//! - `devices` - peripherals and collaborator traits
//! - `system` - the system bus, machine, configuration and snapshots

pub mod bios;
pub mod cpu;
pub mod devices;
pub mod memory;
pub mod opcodes;
pub mod registers;
pub mod system;

// Internal instruction implementations (not part of public API)
mod instructions;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export public API
pub use cpu::Cpu;
pub use devices::Interrupt;
pub use memory::{FlatMemory, MemoryBus, WaitStates};
pub use registers::{Mode, RegisterFile};
pub use system::{
    ConfigError, ExecutionError, Machine, MachineConfig, SaveType, SnapshotError, SystemBus,
};
