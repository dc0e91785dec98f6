use console_core::tick::MicrosecondCounter;
use esp_hal::time::Instant;

/// Low 16 bits of the system timer, in microseconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMicros;

impl MicrosecondCounter for SystemMicros {
    fn now_us(&self) -> u16 {
        Instant::now().duration_since_epoch().as_micros() as u16
    }
}
