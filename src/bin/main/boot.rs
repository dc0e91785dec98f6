use console_core::flags::{FlagStore, ResetCause};
use console_hal_esp32s3::{platform::reset, storage::backup_registers::RtcBackupRegisters};
use log::{info, warn};

/// Record why we started and act on flags left by the previous run.
///
/// Does not return when the bootloader was requested.
pub(super) fn handle_boot_flags(flags: &mut FlagStore<RtcBackupRegisters>, cause: ResetCause) {
    flags.record_reset_cause(cause);
    info!(
        "boot: reset cause={} serial={}",
        cause.label(),
        flags.serial_number()
    );

    if let Some(location) = flags.take_watchdog_flag() {
        warn!("boot: previous run stopped unexpectedly at line {}", location);
    }

    if flags.take_loader_flag() {
        reset::enter_download_mode();
    }

    if let Some(flag) = flags.pending_general_flag() {
        info!("boot: general flag 0x{:02X} pending", flag.0);
    }
}
