//! Line-oriented serial console.
//!
//! Bytes arrive in an interrupt-filled [`RingBuffer`] and are assembled into
//! lines by [`Console::read_line`]. Output either goes straight to the port or
//! is queued in a transmit ring that [`Console::background_print`] drains a
//! bounded amount at a time.

use core::fmt::{self, Write as _};

use heapless::{String, Vec};
use log::{debug, warn};

use crate::ring::{Consumer, RingBuffer};
use crate::tick::TickEngine;

pub const RX_BUFFER_LEN: usize = 320;
pub const TX_BUFFER_LEN: usize = 1024;
/// Timeout for a single blocking port write, in ms.
pub const CONSOLE_TIMEOUT_MS: u32 = 10;
/// Largest block handed to [`SerialPort::start_write`].
pub const TX_CHUNK_LEN: usize = 550;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

pub type LineBuffer = String<RX_BUFFER_LEN>;

/// Byte transport underneath the console.
pub trait SerialPort {
    type Error: fmt::Debug;

    /// Write all bytes, giving up after `timeout_ms`.
    fn write_blocking(&mut self, bytes: &[u8], timeout_ms: u32) -> Result<(), Self::Error>;

    /// Start transmitting a block. Completion is observed via
    /// [`SerialPort::is_write_busy`].
    fn start_write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    fn is_write_busy(&self) -> bool;

    /// Put the port into its low-power state.
    fn sleep(&mut self) {}

    fn wake(&mut self) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EchoMode {
    /// Echo every accepted character as it is typed.
    Immediate,
    /// Echo the whole line once it is terminated.
    OnCompleteLine,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrintMode {
    /// Write through to the port before returning.
    Blocking,
    /// Queue in the transmit ring for [`Console::background_print`].
    Buffered,
    /// Drop all output.
    Silent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxStrategy {
    /// Drain the transmit ring byte by byte with blocking writes.
    ByteByByte,
    /// Hand up to `max_len` bytes at a time to an asynchronous transfer.
    Chunked { max_len: usize },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConsoleConfig {
    pub echo: EchoMode,
    pub print_mode: PrintMode,
    pub tx_strategy: TxStrategy,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            echo: EchoMode::Immediate,
            print_mode: PrintMode::Blocking,
            tx_strategy: TxStrategy::Chunked {
                max_len: TX_CHUNK_LEN,
            },
        }
    }
}

impl ConsoleConfig {
    pub const fn with_echo(mut self, echo: EchoMode) -> Self {
        self.echo = echo;
        self
    }

    pub const fn with_print_mode(mut self, print_mode: PrintMode) -> Self {
        self.print_mode = print_mode;
        self
    }

    pub const fn with_tx_strategy(mut self, tx_strategy: TxStrategy) -> Self {
        self.tx_strategy = tx_strategy;
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct QuietWindow {
    since: u32,
    duration_ms: u32,
}

pub struct Console<'a, P: SerialPort> {
    port: P,
    ticks: &'a TickEngine,
    rx: Consumer<'a, RX_BUFFER_LEN>,
    rx_index_prev: u16,
    line: Vec<u8, RX_BUFFER_LEN>,
    tx: RingBuffer<TX_BUFFER_LEN>,
    chunk: [u8; TX_CHUNK_LEN],
    config: ConsoleConfig,
    quiet: Option<QuietWindow>,
    active_since: u32,
}

impl<'a, P: SerialPort> Console<'a, P> {
    pub fn new(
        port: P,
        ticks: &'a TickEngine,
        rx: Consumer<'a, RX_BUFFER_LEN>,
        config: ConsoleConfig,
    ) -> Self {
        let rx_index_prev = rx.producer_index();
        Self {
            port,
            ticks,
            rx,
            rx_index_prev,
            line: Vec::new(),
            tx: RingBuffer::new(),
            chunk: [0; TX_CHUNK_LEN],
            config,
            quiet: None,
            active_since: ticks.tick(),
        }
    }

    pub fn config(&self) -> ConsoleConfig {
        self.config
    }

    pub fn set_echo_mode(&mut self, echo: EchoMode) {
        self.config.echo = echo;
    }

    pub fn print_mode(&self) -> PrintMode {
        self.config.print_mode
    }

    pub fn set_print_mode(&mut self, print_mode: PrintMode) {
        self.config.print_mode = print_mode;
    }

    pub fn set_tx_strategy(&mut self, tx_strategy: TxStrategy) {
        self.config.tx_strategy = tx_strategy;
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Assemble received bytes into `out`.
    ///
    /// Returns `true` once a carriage return completes a line. A call that
    /// observes new bytes still arriving only records the producer position
    /// and returns; the bytes are processed on the next call that finds the
    /// receive side quiet. Processing stops right after the carriage return,
    /// leaving any following bytes queued.
    pub fn read_line(&mut self, out: &mut LineBuffer) -> bool {
        let rx_index = self.rx.producer_index();
        if rx_index != self.rx_index_prev {
            self.rx_index_prev = rx_index;
            return false;
        }

        let mut complete = false;
        while !complete {
            let Some(byte) = self.rx.dequeue() else {
                break;
            };

            match byte {
                b'\r' => {
                    complete = true;
                    if self.config.echo == EchoMode::Immediate {
                        self.print_bytes(b"\r\n");
                    }
                }
                _ if self.line.is_full() => {
                    warn!("console: receive line overrun");
                    self.line.clear();
                    let _ = write!(self, "Console buffer overrun {}\r\n", RX_BUFFER_LEN);
                }
                b' '..=b'~' => {
                    let _ = self.line.push(byte);
                    if self.config.echo == EchoMode::Immediate {
                        self.print_bytes(&[byte]);
                    }
                }
                DELETE | BACKSPACE => {
                    if self.line.pop().is_some() && self.config.echo == EchoMode::Immediate {
                        self.print_bytes(&[byte]);
                    }
                }
                // Line feeds and other control bytes are dropped.
                _ => {}
            }
        }
        self.rx_index_prev = self.rx.producer_index();

        if complete {
            out.clear();
            // Only printable ASCII is ever stored in the line.
            if let Ok(text) = core::str::from_utf8(&self.line) {
                let _ = out.push_str(text);
            }
            self.line.clear();

            if self.config.echo == EchoMode::OnCompleteLine {
                let _ = write!(self, "{}\r\n", out);
            }
        }
        complete
    }

    /// Emit bytes according to the current [`PrintMode`].
    pub fn print_bytes(&mut self, bytes: &[u8]) {
        match self.config.print_mode {
            PrintMode::Silent => {}
            PrintMode::Blocking => {
                if let Err(err) = self.port.write_blocking(bytes, CONSOLE_TIMEOUT_MS) {
                    debug!("console: blocking write failed: {:?}", err);
                }
            }
            PrintMode::Buffered => {
                for &byte in bytes {
                    if !self.tx.enqueue(byte) {
                        break;
                    }
                }
            }
        }
    }

    /// Push queued output to the port, spending at most `timeout_ms` in
    /// byte-by-byte mode.
    ///
    /// Returns `true` if any byte was written or a chunk transfer was
    /// started. Nothing moves while the console is muted by
    /// [`Console::disable`].
    pub fn background_print(&mut self, timeout_ms: u32) -> bool {
        let sent = if self.tx.is_empty() || self.is_disabled() {
            false
        } else {
            match self.config.tx_strategy {
                TxStrategy::ByteByByte => self.drain_byte_by_byte(timeout_ms),
                TxStrategy::Chunked { max_len } => self.start_chunk(max_len),
            }
        };

        if !self.rx.is_empty() || !self.tx.is_empty() {
            self.active_since = self.ticks.tick();
        }
        sent
    }

    /// Drain the whole transmit ring with blocking writes.
    pub fn flush(&mut self) {
        while let Some(byte) = self.tx.dequeue() {
            if let Err(err) = self.port.write_blocking(&[byte], CONSOLE_TIMEOUT_MS) {
                debug!("console: flush failed: {:?}", err);
                break;
            }
        }
    }

    /// Mute transmission for `duration_ms`. Zero lifts an active window.
    pub fn disable(&mut self, duration_ms: u32) {
        self.quiet = (duration_ms > 0).then(|| QuietWindow {
            since: self.ticks.tick(),
            duration_ms,
        });
    }

    pub fn is_disabled(&mut self) -> bool {
        let Some(window) = self.quiet else {
            return false;
        };
        if self.ticks.elapsed_since(window.since) > window.duration_ms {
            self.quiet = None;
            return false;
        }
        true
    }

    /// Free space in the transmit ring.
    pub fn print_buffer_space(&self) -> usize {
        self.tx.free()
    }

    pub fn rx_buffer_space(&self) -> usize {
        RX_BUFFER_LEN.saturating_sub(self.rx.len())
    }

    /// Tick of the last [`Console::background_print`] that saw traffic.
    pub fn active_since(&self) -> u32 {
        self.active_since
    }

    pub fn sleep(&mut self) {
        self.port.sleep();
    }

    pub fn wake(&mut self) {
        self.port.wake();
    }

    /// Returns `true` if at least one byte went out.
    fn drain_byte_by_byte(&mut self, timeout_ms: u32) -> bool {
        let start = self.ticks.reset_module_timer();
        let mut sent = false;
        while self.ticks.elapsed_since(start) < timeout_ms {
            let Some(byte) = self.tx.dequeue() else {
                break;
            };
            if let Err(err) = self.port.write_blocking(&[byte], CONSOLE_TIMEOUT_MS) {
                debug!("console: write failed: {:?}", err);
                break;
            }
            sent = true;
        }
        sent
    }

    /// Returns `true` if a transfer was started.
    fn start_chunk(&mut self, max_len: usize) -> bool {
        if self.port.is_write_busy() {
            return false;
        }

        let limit = max_len.min(TX_CHUNK_LEN);
        let mut len = 0;
        while len < limit {
            let Some(byte) = self.tx.dequeue() else {
                break;
            };
            self.chunk[len] = byte;
            len += 1;
        }

        if len == 0 {
            return false;
        }
        match self.port.start_write(&self.chunk[..len]) {
            Ok(()) => true,
            Err(err) => {
                debug!("console: chunk transfer failed: {:?}", err);
                false
            }
        }
    }
}

impl<P: SerialPort> fmt::Write for Console<'_, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.print_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ring::Producer;
    use core::fmt::Write as _;

    #[derive(Debug, Default)]
    pub(crate) struct MockPort {
        pub written: std::vec::Vec<u8>,
        pub chunks: std::vec::Vec<std::vec::Vec<u8>>,
        pub busy: bool,
        pub asleep: bool,
    }

    impl MockPort {
        pub fn take_text(&mut self) -> std::string::String {
            let text = std::string::String::from_utf8_lossy(&self.written).into_owned();
            self.written.clear();
            text
        }
    }

    impl SerialPort for MockPort {
        type Error = ();

        fn write_blocking(&mut self, bytes: &[u8], _timeout_ms: u32) -> Result<(), ()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn start_write(&mut self, bytes: &[u8]) -> Result<(), ()> {
            self.chunks.push(bytes.to_vec());
            self.busy = true;
            Ok(())
        }

        fn is_write_busy(&self) -> bool {
            self.busy
        }

        fn sleep(&mut self) {
            self.asleep = true;
        }

        fn wake(&mut self) {
            self.asleep = false;
        }
    }

    fn feed(producer: &mut Producer<'_, RX_BUFFER_LEN>, bytes: &[u8]) {
        for &byte in bytes {
            assert!(producer.enqueue(byte));
        }
    }

    fn poll_line(console: &mut Console<'_, MockPort>, out: &mut LineBuffer) -> bool {
        // First call only notices the new bytes.
        console.read_line(out) || console.read_line(out)
    }

    #[test]
    fn assembles_line_with_immediate_echo() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let mut console = Console::new(MockPort::default(), &ticks, consumer, ConsoleConfig::default());
        let mut line = LineBuffer::new();

        feed(&mut input, b"uptime\r");
        assert!(!console.read_line(&mut line));
        assert!(console.read_line(&mut line));
        assert_eq!(line.as_str(), "uptime");
        assert_eq!(console.port_mut().take_text(), "uptime\r\n");
    }

    #[test]
    fn backspace_removes_last_character() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let mut console = Console::new(MockPort::default(), &ticks, consumer, ConsoleConfig::default());
        let mut line = LineBuffer::new();

        feed(&mut input, &[0x7F, b'a', b'b', 0x08, b'c', b'\r']);
        assert!(poll_line(&mut console, &mut line));
        assert_eq!(line.as_str(), "ac");
        assert_eq!(console.port().written, b"ab\x08c\r\n");
    }

    #[test]
    fn line_feed_and_control_bytes_are_dropped() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let mut console = Console::new(MockPort::default(), &ticks, consumer, ConsoleConfig::default());
        let mut line = LineBuffer::new();

        feed(&mut input, b"le\nd\x01\r");
        assert!(poll_line(&mut console, &mut line));
        assert_eq!(line.as_str(), "led");
    }

    #[test]
    fn stops_after_carriage_return() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let mut console = Console::new(MockPort::default(), &ticks, consumer, ConsoleConfig::default());
        let mut line = LineBuffer::new();

        feed(&mut input, b"one\rtwo\r");
        assert!(poll_line(&mut console, &mut line));
        assert_eq!(line.as_str(), "one");
        assert!(console.read_line(&mut line));
        assert_eq!(line.as_str(), "two");
    }

    #[test]
    fn complete_line_echo_repeats_line() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let config = ConsoleConfig::default().with_echo(EchoMode::OnCompleteLine);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);
        let mut line = LineBuffer::new();

        feed(&mut input, b"help\r");
        assert!(poll_line(&mut console, &mut line));
        assert_eq!(console.port_mut().take_text(), "help\r\n");
    }

    #[test]
    fn overrun_resets_line_and_reports() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (mut input, consumer) = rx.split();
        let config = ConsoleConfig::default().with_echo(EchoMode::OnCompleteLine);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);
        let mut line = LineBuffer::new();

        feed(&mut input, &[b'x'; RX_BUFFER_LEN]);
        assert!(!poll_line(&mut console, &mut line));
        feed(&mut input, b"ok\r");
        assert!(poll_line(&mut console, &mut line));

        let text = console.port_mut().take_text();
        assert!(text.starts_with("Console buffer overrun 320\r\n"));
        assert_eq!(line.as_str(), "k");
    }

    #[test]
    fn buffered_output_drains_byte_by_byte() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let config = ConsoleConfig::default()
            .with_print_mode(PrintMode::Buffered)
            .with_tx_strategy(TxStrategy::ByteByByte);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);

        write!(console, "Uptime: {}\r\n", 42).unwrap();
        assert!(console.port().written.is_empty());
        assert_eq!(console.print_buffer_space(), TX_BUFFER_LEN - 12);

        assert!(console.background_print(CONSOLE_TIMEOUT_MS));
        assert_eq!(console.port_mut().take_text(), "Uptime: 42\r\n");
        assert!(!console.background_print(CONSOLE_TIMEOUT_MS));
    }

    #[test]
    fn zero_time_budget_sends_nothing() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let config = ConsoleConfig::default()
            .with_print_mode(PrintMode::Buffered)
            .with_tx_strategy(TxStrategy::ByteByByte);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);

        console.print_bytes(b"ok");
        assert!(!console.background_print(0));
        assert!(console.port().written.is_empty());

        assert!(console.background_print(CONSOLE_TIMEOUT_MS));
        assert_eq!(console.port().written, b"ok");
    }

    #[test]
    fn chunked_output_waits_for_idle_port() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let config = ConsoleConfig::default()
            .with_print_mode(PrintMode::Buffered)
            .with_tx_strategy(TxStrategy::Chunked { max_len: 4 });
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);

        console.print_bytes(b"abcdef");
        assert!(console.background_print(CONSOLE_TIMEOUT_MS));
        assert!(!console.background_print(CONSOLE_TIMEOUT_MS));
        assert_eq!(console.port().chunks, vec![b"abcd".to_vec()]);

        console.port_mut().busy = false;
        assert!(console.background_print(CONSOLE_TIMEOUT_MS));
        assert_eq!(console.port().chunks[1], b"ef".to_vec());
    }

    #[test]
    fn disable_window_mutes_until_expired() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let config = ConsoleConfig::default()
            .with_print_mode(PrintMode::Buffered)
            .with_tx_strategy(TxStrategy::ByteByByte);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);

        console.disable(5);
        console.print_bytes(b"hi");
        for _ in 0..5 {
            ticks.on_periodic_interrupt();
        }
        assert!(!console.background_print(CONSOLE_TIMEOUT_MS));
        assert!(console.port().written.is_empty());

        ticks.on_periodic_interrupt();
        assert!(console.background_print(CONSOLE_TIMEOUT_MS));
        assert_eq!(console.port().written, b"hi");
    }

    #[test]
    fn silent_mode_drops_output() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let config = ConsoleConfig::default().with_print_mode(PrintMode::Silent);
        let mut console = Console::new(MockPort::default(), &ticks, consumer, config);

        console.print_bytes(b"nothing");
        assert!(console.port().written.is_empty());
        assert_eq!(console.print_buffer_space(), TX_BUFFER_LEN);
    }

    #[test]
    fn sleep_and_wake_reach_the_port() {
        let ticks = TickEngine::new(1);
        let mut rx = RingBuffer::new();
        let (_input, consumer) = rx.split();
        let mut console = Console::new(MockPort::default(), &ticks, consumer, ConsoleConfig::default());

        console.sleep();
        assert!(console.port().asleep);
        console.wake();
        assert!(!console.port().asleep);
    }
}
