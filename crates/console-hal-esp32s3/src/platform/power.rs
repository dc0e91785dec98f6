use esp_hal::rtc_cntl::{Rtc, sleep::TimerWakeupSource};
use log::info;

use super::wakeup::{EspWakeupScheduler, persist_remaining};

/// Enter deep sleep, waking on the slice armed in `scheduler` if there is
/// one. Without an armed slice only a reset brings the board back.
pub fn enter_deep_sleep(rtc: &mut Rtc<'_>, scheduler: &EspWakeupScheduler) -> ! {
    persist_remaining(scheduler);

    match scheduler.timer().armed_secs() {
        Some(secs) => {
            info!("power: deep sleep, timer wakeup in {}s", secs);
            let duration = core::time::Duration::from_secs(u64::from(secs));
            let wake_source = TimerWakeupSource::new(duration);
            rtc.sleep_deep(&[&wake_source]);
        }
        None => {
            info!("power: deep sleep until reset");
            rtc.sleep_deep(&[]);
        }
    }
}
