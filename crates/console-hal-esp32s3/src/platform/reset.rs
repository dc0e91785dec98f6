//! Reset cause decoding and the reset paths used by the shell.

use console_core::flags::ResetCause;
use esp_hal::{peripherals::LPWR, rtc_cntl::SocResetReason};
use log::info;

/// Map the SoC reset reason onto the cause recorded in the flag store.
pub fn reset_cause(reason: Option<SocResetReason>) -> ResetCause {
    match reason {
        Some(SocResetReason::ChipPowerOn | SocResetReason::SysBrownOut) => ResetCause::PowerOn,
        Some(SocResetReason::CoreSw | SocResetReason::Cpu0Sw) => ResetCause::Software,
        Some(SocResetReason::CoreDeepSleep) => ResetCause::LowPower,
        Some(
            SocResetReason::CoreMwdt0
            | SocResetReason::CoreMwdt1
            | SocResetReason::Cpu0Mwdt0
            | SocResetReason::Cpu0Mwdt1,
        ) => ResetCause::WindowWatchdog,
        Some(
            SocResetReason::CoreRtcWdt
            | SocResetReason::Cpu0RtcWdt
            | SocResetReason::SysRtcWdt
            | SocResetReason::SysSuperWdt,
        ) => ResetCause::IndependentWatchdog,
        _ => ResetCause::Unknown,
    }
}

/// True when RTC memory content cannot be trusted.
pub fn is_cold_boot(reason: Option<SocResetReason>) -> bool {
    matches!(
        reason,
        None | Some(SocResetReason::ChipPowerOn | SocResetReason::SysBrownOut)
    )
}

pub fn system_reset() -> ! {
    info!("reset: software reset");
    esp_hal::system::software_reset()
}

/// Restart into the ROM serial download mode.
pub fn enter_download_mode() -> ! {
    info!("reset: restarting into download mode");
    LPWR::regs()
        .option1()
        .modify(|_, w| w.force_download_boot().set_bit());
    esp_hal::system::software_reset()
}
