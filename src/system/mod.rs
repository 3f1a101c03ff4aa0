//! The assembled machine: memory map, scheduler, configuration and
//! snapshots.

pub mod bus;
pub mod config;
pub mod machine;
pub mod savestate;

pub use bus::SystemBus;
pub use config::{ConfigError, MachineConfig, SaveType};
pub use machine::{ExecutionError, Machine};
pub use savestate::{SaveState, SnapshotError};
