use console_core::flags::FlagStore;
use console_hal_esp32s3::{platform::reset, storage::backup_registers::RtcBackupRegisters};

/// Leave the panic line in the watchdog slot and restart.
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    let line = info.location().map_or(0, |location| location.line());
    let mut flags = FlagStore::new(RtcBackupRegisters::new(false));
    flags.set_watchdog_flag(line);
    reset::system_reset()
}
