//! Deep-sleep timer wakeup. Intervals longer than one timer slice are split
//! by [`WakeupScheduler`]; the part still to go is kept in RTC fast memory so
//! it survives the sleep.

use console_core::flags::{WakeupClock, WakeupScheduler, WakeupTimer};
use log::info;

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut WAKEUP_REMAINING_SECS: u32 = 0;

/// Offset added by the 17-bit wakeup clock to the 16-bit count.
const SECONDS17_BASE: u32 = 0x1_0000;

pub type EspWakeupScheduler = WakeupScheduler<EspWakeupTimer>;

/// Records the slice to program into the RTC timer on the next deep sleep.
#[derive(Debug, Default)]
pub struct EspWakeupTimer {
    armed_secs: Option<u32>,
}

impl EspWakeupTimer {
    pub const fn new() -> Self {
        Self { armed_secs: None }
    }

    pub fn armed_secs(&self) -> Option<u32> {
        self.armed_secs
    }
}

impl WakeupTimer for EspWakeupTimer {
    fn arm(&mut self, count: u16, clock: WakeupClock) {
        let base = match clock {
            WakeupClock::Seconds16 => 0,
            WakeupClock::Seconds17 => SECONDS17_BASE,
        };
        self.armed_secs = Some(base + u32::from(count));
    }

    fn disarm(&mut self) {
        self.armed_secs = None;
    }
}

/// Rebuild the scheduler after boot.
///
/// A timer wakeup is reported as a fired event; the caller then either sees
/// the interval finished or arms the next slice through
/// [`WakeupScheduler::check_wakeup`].
pub fn restore_scheduler(cold_boot: bool, woke_by_timer: bool) -> EspWakeupScheduler {
    if cold_boot {
        store_remaining(0);
    }
    let remaining = load_remaining();
    store_remaining(0);

    let scheduler = WakeupScheduler::resume(EspWakeupTimer::new(), remaining);
    if woke_by_timer {
        info!("wakeup: timer slice elapsed, {}s left", remaining);
        scheduler.on_wakeup_event();
    }
    scheduler
}

/// Keep the unscheduled part of the interval for the next boot.
pub(crate) fn persist_remaining(scheduler: &EspWakeupScheduler) {
    store_remaining(scheduler.remaining_secs());
}

fn load_remaining() -> u32 {
    // SAFETY: single word in RTC memory, only touched from the main thread.
    unsafe { (&raw const WAKEUP_REMAINING_SECS).read_volatile() }
}

fn store_remaining(secs: u32) {
    // SAFETY: see `load_remaining`.
    unsafe { (&raw mut WAKEUP_REMAINING_SECS).write_volatile(secs) }
}
