//! Console UART shared between the receive interrupt and the main loop.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use console_core::{
    console::{RX_BUFFER_LEN, SerialPort},
    ring::Producer,
    tick::TickEngine,
};
use critical_section::Mutex;
use esp_hal::{
    Blocking,
    uart::{Uart, UartInterrupt},
};
use log::debug;

pub type ConsoleUart = Uart<'static, Blocking>;

/// Bytes moved from the hardware FIFO per interrupt read.
const RX_DRAIN_CHUNK: usize = 16;
/// Bytes handed to the UART per write call.
const TX_WRITE_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UartPortError {
    NotInstalled,
    Write,
    Timeout,
}

/// UART driver plus the receive ring producer, owned by a `static`.
pub struct SharedUart {
    uart: Mutex<RefCell<Option<ConsoleUart>>>,
    rx: Mutex<RefCell<Option<Producer<'static, RX_BUFFER_LEN>>>>,
    dropped: AtomicU32,
}

impl SharedUart {
    pub const fn new() -> Self {
        Self {
            uart: Mutex::new(RefCell::new(None)),
            rx: Mutex::new(RefCell::new(None)),
            dropped: AtomicU32::new(0),
        }
    }

    /// Hand over the configured UART and the receive ring. Interrupts must
    /// already be routed to a handler calling [`SharedUart::on_interrupt`].
    pub fn install(&self, uart: ConsoleUart, rx: Producer<'static, RX_BUFFER_LEN>) {
        critical_section::with(|cs| {
            self.uart.borrow_ref_mut(cs).replace(uart);
            self.rx.borrow_ref_mut(cs).replace(rx);
        });
    }

    /// Move received bytes into the ring. Call from the UART interrupt.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let mut uart = self.uart.borrow_ref_mut(cs);
            let Some(uart) = uart.as_mut() else {
                return;
            };
            let mut rx = self.rx.borrow_ref_mut(cs);

            let mut chunk = [0u8; RX_DRAIN_CHUNK];
            loop {
                let read = match uart.read_buffered(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => read,
                };
                for &byte in &chunk[..read] {
                    let stored = rx.as_mut().is_some_and(|rx| rx.enqueue(byte));
                    if !stored {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            uart.clear_interrupts(UartInterrupt::RxFifoFull.into());
        });
    }

    /// Received bytes lost because the ring was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn write_some(&self, bytes: &[u8]) -> Result<usize, UartPortError> {
        critical_section::with(|cs| {
            let mut uart = self.uart.borrow_ref_mut(cs);
            let uart = uart.as_mut().ok_or(UartPortError::NotInstalled)?;
            let len = bytes.len().min(TX_WRITE_CHUNK);
            uart.write(&bytes[..len]).map_err(|err| {
                debug!("uart: write failed: {:?}", err);
                UartPortError::Write
            })
        })
    }

    fn flush(&self) -> Result<(), UartPortError> {
        critical_section::with(|cs| {
            let mut uart = self.uart.borrow_ref_mut(cs);
            let uart = uart.as_mut().ok_or(UartPortError::NotInstalled)?;
            uart.flush().map_err(|_| UartPortError::Write)
        })
    }
}

impl Default for SharedUart {
    fn default() -> Self {
        Self::new()
    }
}

/// [`SerialPort`] view of a [`SharedUart`] for the console.
pub struct UartPort {
    shared: &'static SharedUart,
    ticks: &'static TickEngine,
}

impl UartPort {
    pub const fn new(shared: &'static SharedUart, ticks: &'static TickEngine) -> Self {
        Self { shared, ticks }
    }
}

impl SerialPort for UartPort {
    type Error = UartPortError;

    fn write_blocking(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error> {
        let start = self.ticks.reset_module_timer();
        let mut remaining = bytes;
        while !remaining.is_empty() {
            if self.ticks.elapsed_since(start) > timeout_ms {
                return Err(UartPortError::Timeout);
            }
            let written = self.shared.write_some(remaining)?;
            remaining = &remaining[written..];
        }
        Ok(())
    }

    fn start_write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        // No DMA channel is wired to the console; blocks until the FIFO
        // accepted everything.
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let written = self.shared.write_some(remaining)?;
            remaining = &remaining[written..];
        }
        Ok(())
    }

    fn is_write_busy(&self) -> bool {
        false
    }

    fn sleep(&mut self) {
        if let Err(err) = self.shared.flush() {
            debug!("uart: flush before sleep failed: {:?}", err);
        }
    }
}
