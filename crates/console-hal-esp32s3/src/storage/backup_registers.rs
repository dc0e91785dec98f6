//! Backup registers kept in RTC fast memory.
//!
//! The words survive software, watchdog and deep-sleep resets but come up
//! with random content after power-on, so a cold boot clears them.

use console_core::flags::{BackupRegisters, BackupSlot};
use log::info;

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut BACKUP_WORDS: [u32; BackupSlot::COUNT] = [0; BackupSlot::COUNT];

#[derive(Debug)]
pub struct RtcBackupRegisters {
    _private: (),
}

impl RtcBackupRegisters {
    /// Pass `cold_boot = true` after a power-on reset to discard stale data.
    pub fn new(cold_boot: bool) -> Self {
        let mut regs = Self { _private: () };
        if cold_boot {
            info!("backup: cold boot, clearing retained flags");
            for index in 0..BackupSlot::COUNT {
                regs.store(index, 0);
            }
        }
        regs
    }

    fn store(&mut self, index: usize, value: u32) {
        debug_assert!(index < BackupSlot::COUNT);
        // SAFETY: index is in bounds; 32-bit stores are single instructions
        // and every access goes through volatile reads and writes.
        unsafe {
            (&raw mut BACKUP_WORDS)
                .cast::<u32>()
                .add(index)
                .write_volatile(value)
        };
    }
}

impl BackupRegisters for RtcBackupRegisters {
    fn read(&self, slot: BackupSlot) -> u32 {
        // SAFETY: see `store`.
        unsafe {
            (&raw const BACKUP_WORDS)
                .cast::<u32>()
                .add(slot.index())
                .read_volatile()
        }
    }

    fn write(&mut self, slot: BackupSlot, value: u32) {
        self.store(slot.index(), value);
    }
}
