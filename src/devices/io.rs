//! The 1 KiB I/O register bank at 0x0400_0000.
//!
//! The bank is plain storage. Side effects of writes live in the system bus,
//! and registers whose value belongs to a device (video status, timer
//! counters, DMA control, interrupt registers, keypad) are read through that
//! device. What stays here is the raw byte image plus the table of which
//! halfwords software can read back at all.

/// Size of the I/O window in bytes.
pub const IO_SIZE: usize = 0x400;

pub const DISPCNT: u32 = 0x000;
pub const DISPSTAT: u32 = 0x004;
pub const VCOUNT: u32 = 0x006;
pub const SOUND_FIRST: u32 = 0x060;
pub const SOUND_LAST: u32 = 0x0A6;
pub const SOUNDBIAS: u32 = 0x088;
pub const KEYINPUT: u32 = 0x130;
pub const KEYCNT: u32 = 0x132;
pub const IE: u32 = 0x200;
pub const IF: u32 = 0x202;
pub const WAITCNT: u32 = 0x204;
pub const IME: u32 = 0x208;
pub const POSTFLG: u32 = 0x300;
pub const HALTCNT: u32 = 0x301;

/// Write-only or unused halfwords, as `[start, end)` byte ranges.
const UNREADABLE: &[(u32, u32)] = &[
    (0x010, 0x048),
    (0x04C, 0x050),
    (0x054, 0x060),
    (0x08C, 0x090),
    (0x0A0, 0x0B8),
    (0x0BC, 0x0C4),
    (0x0C8, 0x0D0),
    (0x0D4, 0x0DC),
    (0x0E0, 0x100),
    (0x110, 0x120),
    (0x12C, 0x130),
    (0x138, 0x140),
    (0x144, 0x150),
    (0x15C, 0x200),
    (0x20C, 0x300),
    (0x304, 0x400),
];

/// Returns true if software can read the halfword at `offset`.
///
/// # Examples
///
/// ```
/// use libagb::devices::io::is_readable;
///
/// assert!(is_readable(0x000)); // DISPCNT
/// assert!(!is_readable(0x010)); // BG0HOFS is write-only
/// assert!(!is_readable(0x500));
/// ```
pub fn is_readable(offset: u32) -> bool {
    let offset = offset & !1;
    offset < IO_SIZE as u32 && !UNREADABLE.iter().any(|&(s, e)| (s..e).contains(&offset))
}

/// Raw I/O register storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoRegisters {
    data: Vec<u8>,
}

impl Default for IoRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl IoRegisters {
    /// Zeroed bank.
    pub fn new() -> Self {
        Self {
            data: vec![0; IO_SIZE],
        }
    }

    #[inline]
    fn index(offset: u32) -> usize {
        (offset as usize) & (IO_SIZE - 1)
    }

    /// Halfword at `offset` (aligned down).
    pub fn load16(&self, offset: u32) -> u16 {
        let i = Self::index(offset & !1);
        u16::from_le_bytes([self.data[i], self.data[i + 1]])
    }

    /// Stores a halfword without side effects.
    pub fn store16(&mut self, offset: u32, value: u16) {
        let i = Self::index(offset & !1);
        self.data[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Byte at `offset`.
    pub fn load8(&self, offset: u32) -> u8 {
        self.data[Self::index(offset)]
    }

    /// Stores a byte without side effects.
    pub fn store8(&mut self, offset: u32, value: u8) {
        let i = Self::index(offset);
        self.data[i] = value;
    }

    /// The whole bank.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the bank contents. `bytes` must be [`IO_SIZE`] long; shorter
    /// input only overwrites its prefix.
    pub fn restore(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(IO_SIZE);
        self.data[..len].copy_from_slice(&bytes[..len]);
    }

    /// Zeroes the bank.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}
