use core::fmt;

use heapless::Vec;

use crate::calendar::CalendarClock;

pub const MAX_CELL_SENSORS: usize = 8;
pub const MAX_BMS_SENSORS: usize = 4;
pub const MAX_LEDS: usize = 8;

/// Snapshot of the temperature sensors, in degrees Celsius.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TemperatureReport {
    pub cells: Vec<i16, MAX_CELL_SENSORS>,
    pub bms: Vec<i16, MAX_BMS_SENSORS>,
    pub mcu: i16,
    /// Internal temperature of the fuel gauge, if one is fitted.
    pub gauge: Option<i16>,
}

impl TemperatureReport {
    pub fn cell_max(&self) -> i16 {
        self.cells.iter().copied().max().unwrap_or_default()
    }

    pub fn cell_min(&self) -> i16 {
        self.cells.iter().copied().min().unwrap_or_default()
    }

    pub fn bms_max(&self) -> i16 {
        self.bms.iter().copied().max().unwrap_or_default()
    }

    pub fn bms_min(&self) -> i16 {
        self.bms.iter().copied().min().unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LogHeader {
    /// Entries written so far.
    pub counter: u32,
    pub max_entries: u32,
}

/// Board-level actions and peripherals reachable from the shell.
///
/// Optional hardware defaults to "not fitted".
pub trait Board: CalendarClock {
    fn system_reset(&mut self);

    fn power_off(&mut self);

    fn hardware_id(&self) -> u32 {
        0
    }

    fn temperatures(&mut self) -> Option<TemperatureReport> {
        None
    }

    fn led_count(&self) -> usize {
        0
    }

    fn set_leds(&mut self, _states: &[u32]) -> bool {
        false
    }

    fn log_header(&mut self) -> Option<LogHeader> {
        None
    }

    /// Append the marker recorded before a log-print reset.
    fn record_log_reset(&mut self) {}

    fn print_log(&mut self, _count: i32, _out: &mut dyn fmt::Write) -> bool {
        false
    }
}
