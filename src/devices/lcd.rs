//! Video timing state machine.
//!
//! The core does not draw; it only keeps DISPCNT, DISPSTAT and VCOUNT moving
//! so that software polling them, HBlank/VBlank DMA and the video
//! interrupts see the right timing. Each line is 1008 cycles of drawing
//! followed by 224 cycles of HBlank, for 228 lines. Lines 160-227 are
//! VBlank.

use super::interrupts::Interrupt;

/// Cycles spent drawing one line.
pub const DRAW_CYCLES: i32 = 1008;
/// Cycles of horizontal blank per line.
pub const HBLANK_CYCLES: i32 = 224;
/// First VBlank line.
pub const VBLANK_LINE: u16 = 160;
/// Lines per frame.
pub const LINES: u16 = 228;
/// Cycles per frame.
pub const FRAME_CYCLES: u32 = (DRAW_CYCLES + HBLANK_CYCLES) as u32 * LINES as u32;

pub const STATUS_VBLANK: u16 = 0x0001;
pub const STATUS_HBLANK: u16 = 0x0002;
pub const STATUS_VCOUNT: u16 = 0x0004;
pub const STATUS_VBLANK_IRQ: u16 = 0x0008;
pub const STATUS_HBLANK_IRQ: u16 = 0x0010;
pub const STATUS_VCOUNT_IRQ: u16 = 0x0020;

/// DISPCNT forced-blank bit.
pub const FORCED_BLANK: u16 = 0x0080;

/// What a timing transition asks the rest of the system to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LcdStep {
    /// IF bits to raise.
    pub irq: u16,
    /// HBlank started on a visible line: trigger HBlank DMA.
    pub hblank_dma: bool,
    /// VBlank started: trigger VBlank DMA, check the keypad, end the frame.
    pub vblank_start: bool,
    /// Line whose HBlank just started, for the display collaborator.
    pub scanline: Option<u16>,
}

/// DISPCNT / DISPSTAT / VCOUNT and the cycles left in the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcd {
    pub(crate) dispcnt: u16,
    pub(crate) dispstat: u16,
    pub(crate) vcount: u16,
    /// Cycles until the next phase change.
    pub(crate) ticks: i32,
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}

impl Lcd {
    /// Line 0, start of drawing, forced blank.
    pub fn new() -> Self {
        Self {
            dispcnt: FORCED_BLANK,
            dispstat: 0,
            vcount: 0,
            ticks: DRAW_CYCLES,
        }
    }

    /// State after the boot ROM has run: partway through line 0x7E.
    pub fn after_boot() -> Self {
        Self {
            dispcnt: FORCED_BLANK,
            dispstat: 0,
            vcount: 0x7E,
            ticks: 208,
        }
    }

    pub fn dispcnt(&self) -> u16 {
        self.dispcnt
    }

    pub fn dispstat(&self) -> u16 {
        self.dispstat
    }

    pub fn vcount(&self) -> u16 {
        self.vcount
    }

    /// Cycles until the next phase change.
    pub fn ticks(&self) -> i32 {
        self.ticks
    }

    /// Returns true during lines 160-227.
    pub fn in_vblank(&self) -> bool {
        self.dispstat & STATUS_VBLANK != 0
    }

    /// Background mode, DISPCNT bits 0-2.
    pub fn mode(&self) -> u16 {
        self.dispcnt & 7
    }

    /// Updates the VCOUNT match flag. Returns the IRQ bits to raise.
    fn compare_vcount(&mut self) -> u16 {
        if self.vcount == self.dispstat >> 8 {
            self.dispstat |= STATUS_VCOUNT;
            if self.dispstat & STATUS_VCOUNT_IRQ != 0 {
                return Interrupt::VCount.mask();
            }
        } else {
            self.dispstat &= !STATUS_VCOUNT;
        }
        0
    }

    /// DISPSTAT write. The three status bits are read-only.
    pub fn write_dispstat(&mut self, value: u16) -> u16 {
        self.dispstat = (value & 0xFF38) | (self.dispstat & 7);
        self.compare_vcount()
    }

    /// DISPCNT write. Leaving forced blank outside VBlank restarts the
    /// current line from the beginning of its draw phase.
    ///
    /// Returns the IRQ bits to raise and whether the phase countdown moved.
    pub fn write_dispcnt(&mut self, value: u16) -> (u16, bool) {
        let value = value & 0xFFF7;
        let changed = (self.dispcnt ^ value) & FORCED_BLANK != 0;
        self.dispcnt = value;
        if changed && value & FORCED_BLANK == 0 && !self.in_vblank() {
            self.ticks = DRAW_CYCLES;
            self.dispstat &= !(STATUS_VBLANK | STATUS_HBLANK);
            return (self.compare_vcount(), true);
        }
        (0, false)
    }

    /// Advances by `clock` cycles, performing at most one phase change.
    pub fn advance(&mut self, clock: i32) -> LcdStep {
        let mut step = LcdStep::default();
        self.ticks -= clock;
        if self.ticks > 0 {
            return step;
        }

        if self.dispstat & STATUS_HBLANK == 0 {
            self.dispstat |= STATUS_HBLANK;
            self.ticks += HBLANK_CYCLES;
            if !self.in_vblank() {
                step.hblank_dma = true;
            }
            if self.dispstat & STATUS_HBLANK_IRQ != 0 {
                step.irq |= Interrupt::HBlank.mask();
            }
            step.scanline = Some(self.vcount);
            return step;
        }

        self.dispstat &= !STATUS_HBLANK;
        self.ticks += DRAW_CYCLES;
        self.vcount += 1;
        if self.in_vblank() {
            if self.vcount >= LINES {
                self.dispstat &= !(STATUS_VBLANK | STATUS_HBLANK);
                self.vcount = 0;
            }
        } else if self.vcount == VBLANK_LINE {
            self.dispstat |= STATUS_VBLANK;
            if self.dispstat & STATUS_VBLANK_IRQ != 0 {
                step.irq |= Interrupt::VBlank.mask();
            }
            step.vblank_start = true;
        }
        step.irq |= self.compare_vcount();
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_line(lcd: &mut Lcd, line: u16) -> Vec<LcdStep> {
        let mut steps = Vec::new();
        while lcd.vcount() != line {
            let clock = lcd.ticks();
            steps.push(lcd.advance(clock));
        }
        steps
    }

    #[test]
    fn test_line_phases() {
        let mut lcd = Lcd::new();
        lcd.dispstat = STATUS_HBLANK_IRQ;
        let step = lcd.advance(DRAW_CYCLES);
        assert_eq!(lcd.dispstat() & STATUS_HBLANK, STATUS_HBLANK);
        assert_eq!(lcd.ticks(), HBLANK_CYCLES);
        assert!(step.hblank_dma);
        assert_eq!(step.irq, Interrupt::HBlank.mask());
        assert_eq!(step.scanline, Some(0));

        let step = lcd.advance(HBLANK_CYCLES);
        assert_eq!(lcd.vcount(), 1);
        assert_eq!(lcd.dispstat() & STATUS_HBLANK, 0);
        assert_eq!(step.irq, 0);
    }

    #[test]
    fn test_vblank_start() {
        let mut lcd = Lcd::new();
        lcd.dispstat = STATUS_VBLANK_IRQ;
        let steps = run_until_line(&mut lcd, VBLANK_LINE);
        let last = steps.last().copied().unwrap_or_default();
        assert!(last.vblank_start);
        assert_eq!(last.irq, Interrupt::VBlank.mask());
        assert!(lcd.in_vblank());
        assert_eq!(steps.iter().filter(|s| s.hblank_dma).count(), 160);
    }

    #[test]
    fn test_frame_wraps_after_228_lines() {
        let mut lcd = Lcd::new();
        run_until_line(&mut lcd, VBLANK_LINE);
        let mut cycles = 0;
        while lcd.vcount() != 0 {
            let clock = lcd.ticks();
            cycles += clock;
            let step = lcd.advance(clock);
            assert!(!step.hblank_dma);
        }
        assert!(!lcd.in_vblank());
        assert_eq!(cycles, (DRAW_CYCLES + HBLANK_CYCLES) * 68);
    }

    #[test]
    fn test_vcount_match() {
        let mut lcd = Lcd::new();
        assert_eq!(lcd.write_dispstat((3 << 8) | STATUS_VCOUNT_IRQ | 7), 0);
        // Status bits are not writable
        assert_eq!(lcd.dispstat() & 7, 0);
        let irq: u16 = run_until_line(&mut lcd, 3).iter().map(|s| s.irq).fold(0, |a, b| a | b);
        assert_eq!(irq, Interrupt::VCount.mask());
        assert_eq!(lcd.dispstat() & STATUS_VCOUNT, STATUS_VCOUNT);
    }

    #[test]
    fn test_leaving_forced_blank_restarts_line() {
        let mut lcd = Lcd::new();
        lcd.advance(DRAW_CYCLES + 10);
        let (_, moved) = lcd.write_dispcnt(0x0000);
        assert!(moved);
        assert_eq!(lcd.ticks(), DRAW_CYCLES);
        assert_eq!(lcd.dispstat() & STATUS_HBLANK, 0);
        let (_, moved) = lcd.write_dispcnt(0x0008);
        assert!(!moved);
        assert_eq!(lcd.dispcnt(), 0);
    }
}
