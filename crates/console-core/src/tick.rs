//! Millisecond time base driven by the periodic timer interrupt.
//!
//! Every counter is kept twice, once as-is and once bit-inverted. Reads compare
//! both copies; on mismatch a [`TimerError::Memory`] is latched and the read
//! falls back to zero so callers keep running in a degraded state.

use core::cell::RefCell;
use core::hint::{black_box, spin_loop};

use critical_section::Mutex;
use log::warn;

/// Sub-second ticks that make up one uptime second.
pub const SECOND_MS: u32 = 1_000;

/// Delay value that waits without the extra tick of slack.
pub const MAX_DELAY: u32 = u32::MAX;

/// Error kinds latched by the timer module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TimerError {
    /// Value and shadow copy disagree.
    Memory = 0,
    /// Hardware tick frequency differs from the configured one.
    Frequency = 1,
    /// Microsecond counter used before it was configured.
    MicrosecondTimer = 2,
    Pwm = 3,
    OutOfRange = 4,
}

impl TimerError {
    pub const fn mask(self) -> u32 {
        1 << self as u32
    }
}

/// A `u32` stored alongside its bit complement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Redundant {
    value: u32,
    shadow: u32,
}

impl Redundant {
    pub const fn new(value: u32) -> Self {
        Self {
            value,
            shadow: !value,
        }
    }

    /// Returns the value if both copies still agree.
    pub const fn get(&self) -> Option<u32> {
        if self.value ^ self.shadow == u32::MAX {
            Some(self.value)
        } else {
            None
        }
    }

    pub fn set(&mut self, value: u32) {
        self.value = value;
        self.shadow = !value;
    }

    /// Raw stored value, without the integrity check.
    pub const fn raw(&self) -> u32 {
        self.value
    }
}

#[derive(Debug)]
struct TimerData {
    healthy: bool,
    healthy_red: bool,
    error: Redundant,
    uptime: Redundant,
    sec_timer: Redundant,
    tick: Redundant,
    tick_freq: Redundant,
}

impl TimerData {
    const fn new(tick_freq: u32) -> Self {
        Self {
            healthy: true,
            healthy_red: false,
            error: Redundant::new(0),
            uptime: Redundant::new(0),
            sec_timer: Redundant::new(0),
            tick: Redundant::new(0),
            tick_freq: Redundant::new(tick_freq),
        }
    }

    fn raise(&mut self, error: TimerError) {
        self.healthy = false;
        self.healthy_red = true;
        let latched = self.error.raw() | error.mask();
        self.error.set(latched);
    }

    fn checked(&mut self, value: Redundant) -> u32 {
        match value.get() {
            Some(value) => value,
            None => {
                self.raise(TimerError::Memory);
                0
            }
        }
    }
}

/// Software tick/uptime counters shared between the timer interrupt and the
/// main loop.
pub struct TickEngine {
    data: Mutex<RefCell<TimerData>>,
}

impl TickEngine {
    /// `tick_freq` is the tick increment applied per periodic interrupt, in ms.
    pub const fn new(tick_freq: u32) -> Self {
        Self {
            data: Mutex::new(RefCell::new(TimerData::new(tick_freq))),
        }
    }

    /// Reset uptime and verify the hardware tick frequency.
    ///
    /// The tick counter itself keeps running so timestamps taken before
    /// `init` stay comparable.
    pub fn init(&self, hw_tick_freq: u32) {
        critical_section::with(|cs| {
            let mut data = self.data.borrow_ref_mut(cs);
            data.uptime.set(0);
            data.sec_timer.set(0);

            let tick_freq = data.tick_freq;
            if data.checked(tick_freq) != hw_tick_freq {
                data.tick_freq.set(hw_tick_freq);
                data.raise(TimerError::Frequency);
                warn!("timer: tick frequency corrected to {}ms", hw_tick_freq);
            }
        });
    }

    /// Advance the time base. Call once per hardware timer period.
    pub fn on_periodic_interrupt(&self) {
        critical_section::with(|cs| {
            let mut data = self.data.borrow_ref_mut(cs);
            let freq = data.tick_freq;
            let freq = data.checked(freq);

            let tick = data.tick;
            let tick = data.checked(tick).wrapping_add(freq);
            data.tick.set(tick);

            let sec_timer = data.sec_timer;
            let sec_timer = data.checked(sec_timer).wrapping_add(freq);
            if sec_timer >= SECOND_MS {
                let uptime = data.uptime;
                let uptime = data.checked(uptime).wrapping_add(1);
                data.uptime.set(uptime);
                data.sec_timer.set(0);
            } else {
                data.sec_timer.set(sec_timer);
            }
        });
    }

    /// Milliseconds since start-up, wrapping at `u32::MAX`.
    pub fn tick(&self) -> u32 {
        self.read(|data| data.tick)
    }

    /// Whole seconds since [`TickEngine::init`].
    pub fn uptime(&self) -> u32 {
        self.read(|data| data.uptime)
    }

    pub fn tick_freq(&self) -> u32 {
        self.read(|data| data.tick_freq)
    }

    /// Start a module timer at the current tick.
    pub fn reset_module_timer(&self) -> u32 {
        self.tick()
    }

    /// Ticks elapsed since a module timer was started.
    pub fn elapsed_since(&self, module_timer: u32) -> u32 {
        self.tick().wrapping_sub(module_timer)
    }

    /// Busy-wait for at least `ms` milliseconds.
    ///
    /// One tick of slack is added so the wait never ends early, unless `ms`
    /// is [`MAX_DELAY`]. Interrupts keep firing while this spins.
    pub fn delay(&self, ms: u32) {
        let start = black_box(self.tick());
        let start_red = black_box(!start);
        let mut wait = ms;
        let mut wait_red = !ms;

        if wait < MAX_DELAY {
            let freq = self.tick_freq();
            wait = wait.wrapping_add(freq);
            wait_red = wait_red.wrapping_sub(freq);
        }
        let wait = black_box(wait);
        let wait_red = black_box(wait_red);

        while self.tick().wrapping_sub(start) < wait {
            if start != !start_red || wait != !wait_red {
                self.raise(TimerError::Memory);
            }
            spin_loop();
        }
    }

    /// `false` once any error has been latched.
    pub fn status(&self) -> bool {
        critical_section::with(|cs| {
            let data = self.data.borrow_ref(cs);
            data.healthy && !data.healthy_red
        })
    }

    /// Bitmask of latched [`TimerError`] kinds.
    pub fn error_code(&self) -> u32 {
        critical_section::with(|cs| self.data.borrow_ref(cs).error.raw())
    }

    pub fn has_error(&self, error: TimerError) -> bool {
        self.error_code() & error.mask() != 0
    }

    /// Latch an error kind. Errors are sticky until reset.
    pub fn raise(&self, error: TimerError) {
        critical_section::with(|cs| self.data.borrow_ref_mut(cs).raise(error));
    }

    fn read(&self, field: impl FnOnce(&TimerData) -> Redundant) -> u32 {
        critical_section::with(|cs| {
            let mut data = self.data.borrow_ref_mut(cs);
            let value = field(&data);
            data.checked(value)
        })
    }

    #[cfg(test)]
    fn corrupt_tick(&self, bits: u32) {
        critical_section::with(|cs| {
            let mut data = self.data.borrow_ref_mut(cs);
            data.tick.value ^= bits;
        });
    }
}

/// Free-running 16-bit microsecond counter (1 MHz, wraps at `u16::MAX`).
pub trait MicrosecondCounter {
    fn now_us(&self) -> u16;
}

/// Microsecond timer on top of an optional hardware counter.
///
/// Using it before a counter is attached latches
/// [`TimerError::MicrosecondTimer`] and reads as zero.
pub struct UsTimer<'a, C> {
    counter: Option<C>,
    ticks: &'a TickEngine,
}

impl<'a, C> UsTimer<'a, C>
where
    C: MicrosecondCounter,
{
    pub const fn unconfigured(ticks: &'a TickEngine) -> Self {
        Self {
            counter: None,
            ticks,
        }
    }

    pub const fn new(counter: C, ticks: &'a TickEngine) -> Self {
        Self {
            counter: Some(counter),
            ticks,
        }
    }

    pub fn attach(&mut self, counter: C) {
        self.counter = Some(counter);
    }

    pub fn now(&self) -> u16 {
        match &self.counter {
            Some(counter) => counter.now_us(),
            None => {
                self.ticks.raise(TimerError::MicrosecondTimer);
                0
            }
        }
    }

    pub fn elapsed(&self, start: u16) -> u16 {
        match &self.counter {
            Some(counter) => counter.now_us().wrapping_sub(start),
            None => {
                self.ticks.raise(TimerError::MicrosecondTimer);
                0
            }
        }
    }

    /// Busy-wait for `us` microseconds.
    pub fn delay_us(&self, us: u16) {
        let Some(counter) = &self.counter else {
            self.ticks.raise(TimerError::MicrosecondTimer);
            return;
        };

        let start = black_box(counter.now_us());
        let start_red = black_box(!start);
        let wait = black_box(us);
        let wait_red = black_box(!us);

        while counter.now_us().wrapping_sub(start) < wait {
            if start != !start_red || wait != !wait_red {
                self.ticks.raise(TimerError::Memory);
            }
            spin_loop();
        }
    }
}
