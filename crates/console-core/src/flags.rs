//! Flags that survive a CPU reset, stored in battery-backed or retained
//! registers, plus the long-interval wakeup scheduler built on top of the
//! wakeup timer.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

pub const WATCHDOG_FLAG: u8 = 0x5A;
pub const LOADER_FLAG: u32 = 0xC3;
pub const SETUP_FLAG: u32 = 0xF9;

const WATCHDOG_MARKER_SHIFT: u32 = 24;
const WATCHDOG_PAYLOAD_MASK: u32 = 0x00FF_FFFF;

/// Retained registers, one `u32` per [`BackupSlot`].
pub trait BackupRegisters {
    fn read(&self, slot: BackupSlot) -> u32;
    fn write(&mut self, slot: BackupSlot, value: u32);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum BackupSlot {
    Watchdog = 0,
    Setup = 1,
    SerialNumber = 2,
    ResetCause = 3,
    General = 4,
    Loader = 5,
}

impl BackupSlot {
    pub const COUNT: usize = 6;

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One-shot request carried across a reset in the general-purpose slot.
///
/// Only one request can be pending at a time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GeneralFlag(pub u32);

impl GeneralFlag {
    /// Jump to the bus bootloader on the next start.
    pub const BUS_BOOTLOADER: Self = Self(0x1B);
    pub const FLASH_ERASE: Self = Self(0x3C);
    pub const GAUGE_LOAD_NO_RESTORE: Self = Self(0xC6);
    pub const GAUGE_LOAD_RESTORE: Self = Self(0xC9);
    pub const LOG_PRINT: Self = Self(0x6C);
    pub const HARD_FAULT: Self = Self(0xFF);
    pub const DEBUG_MODE: Self = Self(0x4A);
}

/// Why the CPU last came out of reset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u32)]
pub enum ResetCause {
    #[default]
    Unknown = 0,
    OptionByteLoader = 1,
    LowPower = 2,
    WindowWatchdog = 3,
    IndependentWatchdog = 4,
    Software = 5,
    PowerOn = 6,
    ExternalPin = 7,
}

impl ResetCause {
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::OptionByteLoader,
            2 => Self::LowPower,
            3 => Self::WindowWatchdog,
            4 => Self::IndependentWatchdog,
            5 => Self::Software,
            6 => Self::PowerOn,
            7 => Self::ExternalPin,
            _ => Self::Unknown,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::OptionByteLoader => "option byte loader",
            Self::LowPower => "low power",
            Self::WindowWatchdog => "window watchdog",
            Self::IndependentWatchdog => "independent watchdog",
            Self::Software => "software",
            Self::PowerOn => "power on",
            Self::ExternalPin => "external pin",
        }
    }
}

/// Typed access to the retained flag registers.
pub struct FlagStore<R> {
    regs: R,
}

impl<R> FlagStore<R>
where
    R: BackupRegisters,
{
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Mark an unexpected reset, keeping the low 24 bits of `location`.
    pub fn set_watchdog_flag(&mut self, location: u32) {
        let value = (u32::from(WATCHDOG_FLAG) << WATCHDOG_MARKER_SHIFT)
            | (location & WATCHDOG_PAYLOAD_MASK);
        self.regs.write(BackupSlot::Watchdog, value);
    }

    /// Consume the watchdog marker; returns the recorded location if set.
    pub fn take_watchdog_flag(&mut self) -> Option<u32> {
        critical_section::with(|_| {
            let value = self.regs.read(BackupSlot::Watchdog);
            if (value >> WATCHDOG_MARKER_SHIFT) as u8 != WATCHDOG_FLAG {
                return None;
            }
            self.regs.write(BackupSlot::Watchdog, 0);
            Some(value & WATCHDOG_PAYLOAD_MASK)
        })
    }

    pub fn set_loader_flag(&mut self) {
        self.regs.write(BackupSlot::Loader, LOADER_FLAG);
    }

    pub fn take_loader_flag(&mut self) -> bool {
        self.take_exact(BackupSlot::Loader, LOADER_FLAG)
    }

    pub fn set_setup_flag(&mut self) {
        self.regs.write(BackupSlot::Setup, SETUP_FLAG);
    }

    pub fn take_setup_flag(&mut self) -> bool {
        self.take_exact(BackupSlot::Setup, SETUP_FLAG)
    }

    /// Store `flag` if the general slot is empty.
    pub fn set_general_flag(&mut self, flag: GeneralFlag) -> bool {
        critical_section::with(|_| {
            let pending = self.regs.read(BackupSlot::General);
            if pending != 0 {
                warn!(
                    "flags: general flag {:#x} rejected, {:#x} pending",
                    flag.0, pending
                );
                return false;
            }
            self.regs.write(BackupSlot::General, flag.0);
            true
        })
    }

    /// Clear and return `true` if exactly `flag` is pending.
    pub fn check_general_flag(&mut self, flag: GeneralFlag) -> bool {
        self.take_exact(BackupSlot::General, flag.0)
    }

    pub fn any_general_flag(&self) -> bool {
        self.regs.read(BackupSlot::General) != 0
    }

    pub fn clear_general_flag(&mut self) {
        self.regs.write(BackupSlot::General, 0);
    }

    pub fn pending_general_flag(&self) -> Option<GeneralFlag> {
        match self.regs.read(BackupSlot::General) {
            0 => None,
            raw => Some(GeneralFlag(raw)),
        }
    }

    pub fn record_reset_cause(&mut self, cause: ResetCause) {
        self.regs.write(BackupSlot::ResetCause, cause as u32);
    }

    pub fn reset_cause(&self) -> ResetCause {
        ResetCause::from_raw(self.regs.read(BackupSlot::ResetCause))
    }

    pub fn serial_number(&self) -> u32 {
        self.regs.read(BackupSlot::SerialNumber)
    }

    pub fn set_serial_number(&mut self, serial: u32) {
        self.regs.write(BackupSlot::SerialNumber, serial);
    }

    fn take_exact(&mut self, slot: BackupSlot, expected: u32) -> bool {
        critical_section::with(|_| {
            if self.regs.read(slot) != expected {
                return false;
            }
            self.regs.write(slot, 0);
            true
        })
    }
}

/// Counter clock feeding the wakeup timer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeupClock {
    /// 1 Hz, 16-bit counter: up to `0xFFFF` seconds.
    Seconds16,
    /// 1 Hz with the 17th bit set: `0x1_0000 + count` seconds.
    Seconds17,
}

pub trait WakeupTimer {
    fn arm(&mut self, count: u16, clock: WakeupClock);
    fn disarm(&mut self);
}

const SECONDS16_MAX: u32 = 0xFFFF;
const SECONDS17_MAX: u32 = 0x1_FFFF;

/// Splits long wakeup intervals into slices the timer can represent.
pub struct WakeupScheduler<W> {
    timer: W,
    fired: AtomicBool,
    remaining_secs: u32,
}

impl<W> WakeupScheduler<W>
where
    W: WakeupTimer,
{
    pub const fn new(timer: W) -> Self {
        Self {
            timer,
            fired: AtomicBool::new(false),
            remaining_secs: 0,
        }
    }

    /// Rebuild a scheduler whose interval was sliced before a reset, with
    /// `remaining_secs` still to go after the armed slice.
    pub const fn resume(timer: W, remaining_secs: u32) -> Self {
        Self {
            timer,
            fired: AtomicBool::new(false),
            remaining_secs,
        }
    }

    pub fn timer(&self) -> &W {
        &self.timer
    }

    /// Arm the timer to fire after `seconds`.
    pub fn set_wakeup(&mut self, seconds: u32) {
        self.fired.store(false, Ordering::Release);
        self.remaining_secs = 0;

        let (count, clock) = if seconds <= SECONDS16_MAX {
            (seconds as u16, WakeupClock::Seconds16)
        } else if seconds <= SECONDS17_MAX {
            ((seconds & SECONDS16_MAX) as u16, WakeupClock::Seconds17)
        } else {
            self.remaining_secs = seconds - SECONDS17_MAX;
            (SECONDS16_MAX as u16, WakeupClock::Seconds17)
        };

        info!(
            "wakeup: armed for {}s ({}s deferred)",
            seconds.min(SECONDS17_MAX),
            self.remaining_secs
        );
        self.timer.arm(count, clock);
    }

    /// Record that the timer fired. Safe to call from interrupt context.
    pub fn on_wakeup_event(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// Disarm the timer and report whether the full interval has elapsed.
    ///
    /// When only a slice of a long interval has passed, the next slice is
    /// armed and `false` is returned.
    pub fn check_wakeup(&mut self) -> bool {
        self.timer.disarm();
        if !self.fired.swap(false, Ordering::AcqRel) {
            return false;
        }
        if self.remaining_secs != 0 {
            let remaining = self.remaining_secs;
            self.set_wakeup(remaining);
            return false;
        }
        true
    }

    /// Drop any armed slice and deferred remainder.
    pub fn cancel(&mut self) {
        self.timer.disarm();
        self.fired.store(false, Ordering::Release);
        self.remaining_secs = 0;
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct MockRegisters {
        pub slots: [u32; BackupSlot::COUNT],
    }

    impl BackupRegisters for MockRegisters {
        fn read(&self, slot: BackupSlot) -> u32 {
            self.slots[slot.index()]
        }

        fn write(&mut self, slot: BackupSlot, value: u32) {
            self.slots[slot.index()] = value;
        }
    }

    #[derive(Debug, Default)]
    struct MockWakeupTimer {
        armed: Vec<(u16, WakeupClock)>,
        disarmed: usize,
    }

    impl WakeupTimer for MockWakeupTimer {
        fn arm(&mut self, count: u16, clock: WakeupClock) {
            self.armed.push((count, clock));
        }

        fn disarm(&mut self) {
            self.disarmed += 1;
        }
    }

    #[test]
    fn watchdog_flag_keeps_low_24_bits() {
        let mut flags = FlagStore::new(MockRegisters::default());
        flags.set_watchdog_flag(0xAB12_3456);

        assert_eq!(flags.registers().slots[0], 0x5A12_3456);
        assert_eq!(flags.take_watchdog_flag(), Some(0x12_3456));
        assert_eq!(flags.take_watchdog_flag(), None);
    }

    #[test]
    fn setup_and_loader_flags_are_one_shot() {
        let mut flags = FlagStore::new(MockRegisters::default());
        assert!(!flags.take_setup_flag());

        flags.set_setup_flag();
        flags.set_loader_flag();
        assert!(flags.take_setup_flag());
        assert!(!flags.take_setup_flag());
        assert!(flags.take_loader_flag());
        assert!(!flags.take_loader_flag());
    }

    #[test]
    fn garbage_in_flag_slot_is_not_a_flag() {
        let mut regs = MockRegisters::default();
        regs.slots[BackupSlot::Setup.index()] = 0xF8;
        regs.slots[BackupSlot::Watchdog.index()] = 0x5B00_0001;
        let mut flags = FlagStore::new(regs);

        assert!(!flags.take_setup_flag());
        assert_eq!(flags.take_watchdog_flag(), None);
    }

    #[test]
    fn general_flags_are_mutually_exclusive() {
        let mut flags = FlagStore::new(MockRegisters::default());
        assert!(flags.set_general_flag(GeneralFlag(5)));
        assert!(!flags.set_general_flag(GeneralFlag(6)));
        assert!(!flags.set_general_flag(GeneralFlag(5)));

        assert!(!flags.check_general_flag(GeneralFlag(6)));
        assert_eq!(flags.pending_general_flag(), Some(GeneralFlag(5)));
        assert!(flags.check_general_flag(GeneralFlag(5)));
        assert_eq!(flags.pending_general_flag(), None);
        assert!(flags.set_general_flag(GeneralFlag(6)));
        assert!(flags.any_general_flag());
        flags.clear_general_flag();
        assert!(!flags.any_general_flag());
    }

    #[test]
    fn reset_cause_round_trips_through_slot() {
        let mut flags = FlagStore::new(MockRegisters::default());
        assert_eq!(flags.reset_cause(), ResetCause::Unknown);

        flags.record_reset_cause(ResetCause::IndependentWatchdog);
        assert_eq!(flags.registers().slots[BackupSlot::ResetCause.index()], 4);
        assert_eq!(flags.reset_cause(), ResetCause::IndependentWatchdog);
        assert_eq!(ResetCause::from_raw(99), ResetCause::Unknown);
    }

    #[test]
    fn short_wakeup_uses_16_bit_clock() {
        let mut scheduler = WakeupScheduler::new(MockWakeupTimer::default());
        scheduler.set_wakeup(600);
        assert_eq!(scheduler.timer().armed, vec![(600, WakeupClock::Seconds16)]);

        scheduler.on_wakeup_event();
        assert!(scheduler.check_wakeup());
        assert!(!scheduler.check_wakeup());
    }

    #[test]
    fn medium_wakeup_uses_17_bit_clock() {
        let mut scheduler = WakeupScheduler::new(MockWakeupTimer::default());
        scheduler.set_wakeup(0x1_2345);
        assert_eq!(
            scheduler.timer().armed,
            vec![(0x2345, WakeupClock::Seconds17)]
        );
        assert_eq!(scheduler.remaining_secs(), 0);
    }

    #[test]
    fn long_wakeup_is_sliced() {
        let mut scheduler = WakeupScheduler::new(MockWakeupTimer::default());
        scheduler.set_wakeup(0x1_FFFF + 100);
        assert_eq!(scheduler.remaining_secs(), 100);

        assert!(!scheduler.check_wakeup());

        scheduler.on_wakeup_event();
        assert!(!scheduler.check_wakeup());
        assert_eq!(
            scheduler.timer().armed,
            vec![(0xFFFF, WakeupClock::Seconds17), (100, WakeupClock::Seconds16)]
        );

        scheduler.on_wakeup_event();
        assert!(scheduler.check_wakeup());
        assert_eq!(scheduler.timer().disarmed, 3);
    }

    #[test]
    fn cancel_forgets_deferred_seconds() {
        let mut scheduler = WakeupScheduler::new(MockWakeupTimer::default());
        scheduler.set_wakeup(0x3_0000);
        scheduler.cancel();
        scheduler.on_wakeup_event();
        scheduler.cancel();

        assert_eq!(scheduler.remaining_secs(), 0);
        assert!(!scheduler.check_wakeup());
    }

    #[test]
    fn resumed_scheduler_continues_with_next_slice() {
        let mut scheduler = WakeupScheduler::resume(MockWakeupTimer::default(), 0x2_0000);
        scheduler.on_wakeup_event();

        assert!(!scheduler.check_wakeup());
        assert_eq!(scheduler.remaining_secs(), 1);
        assert_eq!(
            scheduler.timer().armed,
            vec![(0xFFFF, WakeupClock::Seconds17)]
        );
    }
}
