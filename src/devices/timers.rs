//! Four 16-bit timers with prescaler and cascade.
//!
//! Timers do not tick per cycle. Each enabled timer keeps a countdown of
//! cycles until its next overflow; the scheduler subtracts elapsed time in
//! bulk and the counter register is derived from the countdown. Between two
//! scheduler events a counter read is computed lazily from the cycles spent
//! since the last event.
//!
//! # Registers
//!
//! | Offset        | Name    | Write                         | Read            |
//! |---------------|---------|-------------------------------|-----------------|
//! | 0x100 + 4n    | TMnCNT_L| reload value                  | current counter |
//! | 0x102 + 4n    | TMnCNT_H| control, applied next event   | control         |
//!
//! Control bits: prescaler 0-1 (`1, 64, 256, 1024` cycles), cascade 2,
//! IRQ 6, enable 7.

/// Prescaler shift selected by control bits 0-1.
pub const TIMER_SHIFT: [u32; 4] = [0, 6, 8, 10];

/// Stored control bits.
pub const CONTROL_MASK: u16 = 0xC7;

pub const CONTROL_CASCADE: u16 = 0x04;
pub const CONTROL_IRQ: u16 = 0x40;
pub const CONTROL_ENABLE: u16 = 0x80;

/// One timer channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    pub(crate) counter: u16,
    pub(crate) reload: u16,
    pub(crate) control: u16,
    /// Cycles until the next overflow.
    pub(crate) ticks: i32,
    pub(crate) shift: u32,
    pub(crate) enabled: bool,
    /// Control write waiting for the next scheduler event.
    pub(crate) pending: Option<u16>,
}

impl Timer {
    fn period(&self) -> i32 {
        (0x1_0000 - i32::from(self.reload)) << self.shift
    }

    /// Current counter value as last computed by the scheduler.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Reload value.
    pub fn reload(&self) -> u16 {
        self.reload
    }

    /// Control register.
    pub fn control(&self) -> u16 {
        self.control
    }

    /// Returns true when running.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Overflow results of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerStep {
    /// Bit n set when timer n overflowed.
    pub overflow: u8,
    /// IF bits to raise.
    pub irq: u16,
}

/// The timer block.
///
/// # Examples
///
/// ```
/// use libagb::devices::Timers;
///
/// let mut timers = Timers::new();
/// timers.write_reload(0, 0xFFF0);
/// timers.write_control(0, 0x80);
/// timers.apply_pending();
///
/// let step = timers.advance(16);
/// assert_eq!(step.overflow, 1);
/// assert!(timers.timer(0).is_enabled());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timers {
    pub(crate) timers: [Timer; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// TMnCNT_L write.
    pub fn write_reload(&mut self, n: usize, value: u16) {
        self.timers[n & 3].reload = value;
    }

    /// TMnCNT_H write, latched until [`Timers::apply_pending`].
    pub fn write_control(&mut self, n: usize, value: u16) {
        self.timers[n & 3].pending = Some(value);
    }

    /// Returns true if a control write is waiting.
    pub fn has_pending(&self) -> bool {
        self.timers.iter().any(|t| t.pending.is_some())
    }

    /// Applies latched control writes. A timer switched on reloads its
    /// counter and restarts its countdown.
    pub fn apply_pending(&mut self) {
        for timer in &mut self.timers {
            let Some(value) = timer.pending.take() else {
                continue;
            };
            timer.shift = TIMER_SHIFT[usize::from(value & 3)];
            let enable = value & CONTROL_ENABLE != 0;
            if !timer.enabled && enable {
                timer.counter = timer.reload;
                timer.ticks = timer.period();
            }
            timer.enabled = enable;
            timer.control = value & CONTROL_MASK;
        }
    }

    /// True if timer `n` counts cycles rather than overflows of its
    /// neighbour. Timer 0 has no neighbour and ignores its cascade bit.
    fn counts_cycles(&self, n: usize) -> bool {
        let timer = &self.timers[n];
        timer.enabled && (n == 0 || timer.control & CONTROL_CASCADE == 0)
    }

    /// Counter value `elapsed` cycles after the last scheduler event.
    pub fn read_counter(&self, n: usize, elapsed: i32) -> u16 {
        let n = n & 3;
        let timer = &self.timers[n];
        if self.counts_cycles(n) {
            0xFFFF_u16.wrapping_sub(((timer.ticks - elapsed) >> timer.shift) as u16)
        } else {
            timer.counter
        }
    }

    /// Control register of timer `n`.
    pub fn read_control(&self, n: usize) -> u16 {
        self.timers[n & 3].control
    }

    /// Timer `n`.
    pub fn timer(&self, n: usize) -> &Timer {
        &self.timers[n & 3]
    }

    /// Advances every running timer by `clock` cycles.
    pub fn advance(&mut self, clock: i32) -> TimerStep {
        let mut step = TimerStep::default();
        for n in 0..4 {
            if !self.timers[n].enabled {
                continue;
            }
            let cycles = self.counts_cycles(n);
            let timer = &mut self.timers[n];
            let overflowed = if cycles {
                timer.ticks -= clock;
                let wrapped = timer.ticks <= 0;
                if wrapped {
                    timer.ticks += timer.period();
                }
                timer.counter = 0xFFFF_u16.wrapping_sub((timer.ticks >> timer.shift) as u16);
                wrapped
            } else if step.overflow & (1 << (n - 1)) != 0 {
                timer.counter = timer.counter.wrapping_add(1);
                if timer.counter == 0 {
                    timer.counter = timer.reload;
                    true
                } else {
                    false
                }
            } else {
                false
            };

            if overflowed {
                step.overflow |= 1 << n;
                if timer.control & CONTROL_IRQ != 0 {
                    step.irq |= 0x08 << n;
                }
            }
        }
        step
    }

    /// Smallest countdown among cycle-counting timers, capped at `limit`.
    pub fn next_deadline(&self, limit: i32) -> i32 {
        (0..4)
            .filter(|&n| self.counts_cycles(n))
            .map(|n| self.timers[n].ticks)
            .fold(limit, i32::min)
    }

    /// Recomputes prescaler shifts from the control registers.
    pub(crate) fn recompute_shifts(&mut self) {
        for timer in &mut self.timers {
            timer.shift = TIMER_SHIFT[usize::from(timer.control & 3)];
        }
    }
}
