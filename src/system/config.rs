//! Machine configuration.
//!
//! All fields have defaults, so a JSON document only needs the keys it wants
//! to change:
//!
//! ```
//! use libagb::{MachineConfig, SaveType};
//!
//! let config = MachineConfig::from_json(r#"{ "save_type": "sram" }"#).unwrap();
//! assert_eq!(config.save_type, SaveType::Sram);
//! assert!(config.skip_bios);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::{Backup, NoBackup, Sram};

/// Cycles between two audio collaborator ticks.
pub const DEFAULT_AUDIO_INTERVAL: u32 = 1024;

/// Default cap on the cycles a single `run_frame` may take (four frames).
pub const DEFAULT_FRAME_LIMIT: u32 = 4 * crate::devices::lcd::FRAME_CYCLES;

/// Backup chip wired to the cartridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveType {
    #[default]
    None,
    Sram,
}

impl SaveType {
    /// Creates the reference implementation for this save type.
    pub fn create(self) -> Box<dyn Backup> {
        match self {
            SaveType::None => Box::new(NoBackup),
            SaveType::Sram => Box::new(Sram::new()),
        }
    }
}

/// Error parsing a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid machine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Options fixed at machine construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Start at the cartridge entry point with post-boot state instead of
    /// running the BIOS image from address 0.
    pub skip_bios: bool,

    /// Enable the cartridge prefetch buffer at reset (WAITCNT bit 14).
    pub prefetch_on_reset: bool,

    /// Cycles between audio collaborator ticks.
    pub audio_interval_cycles: u32,

    /// Backup chip.
    pub save_type: SaveType,

    /// Upper bound on cycles per `run_frame`, for programs that never
    /// leave forced blank.
    pub frame_limit_cycles: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            skip_bios: true,
            prefetch_on_reset: false,
            audio_interval_cycles: DEFAULT_AUDIO_INTERVAL,
            save_type: SaveType::None,
            frame_limit_cycles: DEFAULT_FRAME_LIMIT,
        }
    }
}

impl MachineConfig {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration as JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Initial WAITCNT value.
    pub(crate) fn initial_waitcnt(&self) -> u16 {
        if self.prefetch_on_reset {
            0x4000
        } else {
            0
        }
    }
}
