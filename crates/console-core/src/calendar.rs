//! Calendar time as kept by the real-time clock, counted from 2000-01-01.

const DAYS_BEFORE_MONTH: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const DAYS_BEFORE_MONTH_LEAP: [u32; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];
const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Oldest year offset the clock accepts as set.
pub const MIN_VALID_YEAR: u8 = 16;
pub const MAX_VALID_YEAR: u8 = 99;

/// Date and time with a two-digit year (`year` 24 means 2024).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DateTime {
    pub year: u8,
    pub month: u8,
    pub date: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl DateTime {
    /// 2000-01-01 00:00:00, used when the clock holds nonsense.
    pub const EPOCH: Self = Self {
        year: 0,
        month: 1,
        date: 1,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    pub const fn is_valid(&self) -> bool {
        self.year >= MIN_VALID_YEAR
            && self.year <= MAX_VALID_YEAR
            && self.month >= 1
            && self.month <= 12
            && self.date >= 1
            && self.date <= 31
            && self.hours <= 23
            && self.minutes <= 59
            && self.seconds <= 59
    }

    /// Reset to [`DateTime::EPOCH`] unless every field is in range.
    /// Returns `true` if the value was already valid.
    pub fn validate_and_correct(&mut self) -> bool {
        if self.is_valid() {
            return true;
        }
        *self = Self::EPOCH;
        false
    }

    /// Whole hours elapsed since 2000-01-01 00:00.
    pub fn hours_since_2000(&self) -> u32 {
        let year = u32::from(self.year);
        let month_index = usize::from(self.month.clamp(1, 12) - 1);
        let day_of_month = u32::from(self.date.max(1)) - 1;

        let mut days = year * 365 + year / 4;
        if is_leap(self.year) {
            days += DAYS_BEFORE_MONTH_LEAP[month_index] + day_of_month;
        } else {
            // Skip the leap day of the current four-year cycle.
            days += 1 + DAYS_BEFORE_MONTH[month_index] + day_of_month;
        }
        days * 24 + u32::from(self.hours)
    }

    pub fn seconds_since_2000(&self) -> u32 {
        self.hours_since_2000() * 3_600 + u32::from(self.minutes) * 60 + u32::from(self.seconds)
    }

    pub fn from_seconds_since_2000(total: u32) -> Self {
        let mut days = total / 86_400;
        let in_day = total % 86_400;

        let mut year: u8 = 0;
        loop {
            let year_len = if is_leap(year) { 366 } else { 365 };
            if days < year_len || year == u8::MAX {
                break;
            }
            days -= year_len;
            year += 1;
        }

        let mut month = 0;
        while month < 11 {
            let mut month_len = u32::from(DAYS_IN_MONTH[month]);
            if month == 1 && is_leap(year) {
                month_len += 1;
            }
            if days < month_len {
                break;
            }
            days -= month_len;
            month += 1;
        }

        Self {
            year,
            month: month as u8 + 1,
            date: days as u8 + 1,
            hours: (in_day / 3_600) as u8,
            minutes: (in_day % 3_600 / 60) as u8,
            seconds: (in_day % 60) as u8,
        }
    }
}

const fn is_leap(year: u8) -> bool {
    year % 4 == 0
}

/// Real-time clock holding a [`DateTime`].
pub trait CalendarClock {
    fn read_clock(&mut self) -> DateTime;
    fn write_clock(&mut self, now: &DateTime);
}
