//! Board implementation for the ESP32-S3 controller.

use console_core::{
    calendar::{CalendarClock, DateTime},
    shell::{Board, MAX_LEDS},
};
use embedded_hal::digital::OutputPin;
use esp_hal::rtc_cntl::Rtc;
use heapless::Vec;
use log::{info, warn};

use super::{power, reset, wakeup::EspWakeupScheduler};

const MICROS_PER_SECOND: u64 = 1_000_000;

/// RTC, status LEDs and the wakeup schedule, driven by the shell.
pub struct EspBoard<'d, L> {
    rtc: Rtc<'d>,
    scheduler: EspWakeupScheduler,
    leds: Vec<L, MAX_LEDS>,
    hardware_id: u32,
    off_wakeup_secs: Option<u32>,
}

impl<'d, L> EspBoard<'d, L>
where
    L: OutputPin,
{
    pub fn new(rtc: Rtc<'d>, scheduler: EspWakeupScheduler) -> Self {
        Self {
            rtc,
            scheduler,
            leds: Vec::new(),
            hardware_id: 0,
            off_wakeup_secs: None,
        }
    }

    pub fn with_hardware_id(mut self, hardware_id: u32) -> Self {
        self.hardware_id = hardware_id;
        self
    }

    /// Wake up again this many seconds after `off`. Without it the board
    /// stays off until reset.
    pub fn with_off_wakeup(mut self, seconds: u32) -> Self {
        self.off_wakeup_secs = Some(seconds);
        self
    }

    /// Attach status LEDs, in `led` argument order. Extra pins are dropped.
    pub fn with_leds(mut self, leds: impl IntoIterator<Item = L>) -> Self {
        for led in leds {
            if self.leds.push(led).is_err() {
                warn!("board: more than {} LEDs, ignoring the rest", MAX_LEDS);
                break;
            }
        }
        self
    }

    pub fn scheduler(&self) -> &EspWakeupScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut EspWakeupScheduler {
        &mut self.scheduler
    }

    /// Sleep with whatever slice the scheduler has armed.
    pub fn sleep(&mut self) -> ! {
        power::enter_deep_sleep(&mut self.rtc, &self.scheduler)
    }
}

impl<L> CalendarClock for EspBoard<'_, L> {
    fn read_clock(&mut self) -> DateTime {
        let seconds = self.rtc.current_time_us() / MICROS_PER_SECOND;
        DateTime::from_seconds_since_2000(seconds.min(u64::from(u32::MAX)) as u32)
    }

    fn write_clock(&mut self, now: &DateTime) {
        let micros = u64::from(now.seconds_since_2000()) * MICROS_PER_SECOND;
        self.rtc.set_current_time_us(micros);
    }
}

impl<L> Board for EspBoard<'_, L>
where
    L: OutputPin,
{
    fn system_reset(&mut self) {
        reset::system_reset()
    }

    fn power_off(&mut self) {
        match self.off_wakeup_secs {
            Some(seconds) => self.scheduler.set_wakeup(seconds),
            None => self.scheduler.cancel(),
        }
        info!("board: powering off");
        self.sleep()
    }

    fn hardware_id(&self) -> u32 {
        self.hardware_id
    }

    fn led_count(&self) -> usize {
        self.leds.len()
    }

    fn set_leds(&mut self, states: &[u32]) -> bool {
        if states.len() != self.leds.len() {
            return false;
        }
        let mut ok = true;
        for (led, &state) in self.leds.iter_mut().zip(states) {
            let result = if state != 0 {
                led.set_high()
            } else {
                led.set_low()
            };
            ok &= result.is_ok();
        }
        ok
    }
}
