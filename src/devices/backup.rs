//! Reference cartridge backup implementations.

use super::Backup;

/// Size of battery-backed SRAM.
pub const SRAM_SIZE: usize = 0x1_0000;

/// No backup chip: every access falls through to open bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackup;

impl Backup for NoBackup {
    fn read8(&mut self, _addr: u32) -> Option<u8> {
        None
    }

    fn write8(&mut self, _addr: u32, _value: u8) {}

    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    fn load_state(&mut self, _data: &[u8]) {}
}

/// 64 KiB of battery-backed SRAM in region 0xE, mirrored.
///
/// # Examples
///
/// ```
/// use libagb::devices::{Backup, Sram};
///
/// let mut sram = Sram::new();
/// sram.write8(0x0E00_0010, 0x5A);
/// assert_eq!(sram.read8(0x0E01_0010), Some(0x5A));
/// ```
#[derive(Debug, Clone)]
pub struct Sram {
    data: Vec<u8>,
}

impl Default for Sram {
    fn default() -> Self {
        Self::new()
    }
}

impl Sram {
    /// Erased SRAM (all bytes 0xFF).
    pub fn new() -> Self {
        Self {
            data: vec![0xFF; SRAM_SIZE],
        }
    }

    /// Raw contents, for writing a battery file.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Backup for Sram {
    fn read8(&mut self, addr: u32) -> Option<u8> {
        Some(self.data[addr as usize & (SRAM_SIZE - 1)])
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.data[addr as usize & (SRAM_SIZE - 1)] = value;
    }

    fn save_state(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn load_state(&mut self, data: &[u8]) {
        let len = data.len().min(SRAM_SIZE);
        self.data[..len].copy_from_slice(&data[..len]);
    }
}
