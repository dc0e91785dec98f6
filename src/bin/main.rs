#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use console_core::{
    console::{Console, ConsoleConfig, EchoMode, PrintMode, RX_BUFFER_LEN, TxStrategy},
    flags::{FlagStore, GeneralFlag},
    ring::RingBuffer,
    shell::{Board, Shell, ShellConfig},
    tick::{TickEngine, UsTimer},
};
use console_hal_esp32s3::{
    platform::{board::EspBoard, micros::SystemMicros, reset, wakeup},
    serial::{SharedUart, UartPort},
    storage::backup_registers::RtcBackupRegisters,
};
use critical_section::Mutex;
use esp_hal::{
    Blocking,
    clock::CpuClock,
    gpio::{Level, Output, OutputConfig},
    handler,
    rtc_cntl::{Rtc, SleepSource, reset_reason, wakeup_cause},
    system::Cpu,
    time::Duration,
    timer::{PeriodicTimer, timg::TimerGroup},
    uart::{Config as UartConfig, RxConfig, Uart, UartInterrupt},
};
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;

#[path = "main/boot.rs"]
mod boot;
#[path = "main/panic.rs"]
mod panic;

const TICK_PERIOD_MS: u32 = 1;
const CONSOLE_BAUD: u32 = 115_200;
const MAIN_LOOP_PERIOD_MS: u32 = 5;
const UART_SETTLE_US: u16 = 200;
const SLEEP_INACTIVITY_TIMEOUT_MS: u32 = 300_000;
/// Wake interval used by `off`.
const OFF_WAKEUP_SECS: u32 = 86_400;
const HARDWARE_ID: u32 = 0x0102;
const BANNER: &str = "HDP Controller Console\r\n# ";
const BYPASS_PASSWORD: Option<&str> = option_env!("HDP_CONSOLE_BYPASS_PASSWORD");

static TICKS: TickEngine = TickEngine::new(TICK_PERIOD_MS);
static TICK_TIMER: Mutex<RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));
static CONSOLE_UART: SharedUart = SharedUart::new();
static RX_RING: StaticCell<RingBuffer<RX_BUFFER_LEN>> = StaticCell::new();

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[handler]
fn tick_isr() {
    TICKS.on_periodic_interrupt();
    critical_section::with(|cs| {
        if let Some(timer) = TICK_TIMER.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
}

#[handler]
fn uart_isr() {
    CONSOLE_UART.on_interrupt();
}

#[allow(
    clippy::large_stack_frames,
    reason = "the shell owns its line and transmit buffers"
)]
#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: hdp-console starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let boot_reset_reason = reset_reason(Cpu::ProCpu);
    let boot_wakeup_cause = wakeup_cause();
    info!(
        "boot reset_reason={:?} wakeup_cause={:?}",
        boot_reset_reason, boot_wakeup_cause
    );

    let cold_boot = reset::is_cold_boot(boot_reset_reason);
    let mut flags = FlagStore::new(RtcBackupRegisters::new(cold_boot));
    boot::handle_boot_flags(&mut flags, reset::reset_cause(boot_reset_reason));

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut tick_timer = PeriodicTimer::new(timg0.timer0);
    tick_timer.set_interrupt_handler(tick_isr);
    tick_timer
        .start(Duration::from_millis(u64::from(TICK_PERIOD_MS)))
        .unwrap();
    tick_timer.listen();
    critical_section::with(|cs| TICK_TIMER.borrow_ref_mut(cs).replace(tick_timer));
    TICKS.init(TICK_PERIOD_MS);

    let us_timer = UsTimer::new(SystemMicros, &TICKS);

    let rx_ring = RX_RING.init(RingBuffer::new());
    let (rx_producer, rx_consumer) = rx_ring.split();

    // Console wiring: TX=GPIO43, RX=GPIO44 (UART0 default pins)
    let uart_config = UartConfig::default()
        .with_baudrate(CONSOLE_BAUD)
        .with_rx(RxConfig::default().with_fifo_full_threshold(1));
    let mut uart = Uart::new(peripherals.UART0, uart_config)
        .unwrap()
        .with_rx(peripherals.GPIO44)
        .with_tx(peripherals.GPIO43);
    uart.set_interrupt_handler(uart_isr);
    uart.listen(UartInterrupt::RxFifoFull);
    CONSOLE_UART.install(uart, rx_producer);
    us_timer.delay_us(UART_SETTLE_US);

    let console_config = ConsoleConfig::default()
        .with_echo(EchoMode::Immediate)
        .with_print_mode(PrintMode::Buffered)
        .with_tx_strategy(TxStrategy::ByteByByte);
    let console = Console::new(
        UartPort::new(&CONSOLE_UART, &TICKS),
        &TICKS,
        rx_consumer,
        console_config,
    );

    let woke_by_timer = matches!(boot_wakeup_cause, SleepSource::Timer);
    let scheduler = wakeup::restore_scheduler(cold_boot, woke_by_timer);
    let status_leds = [
        Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default()),
        Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()),
    ];
    let mut board = EspBoard::new(Rtc::new(peripherals.LPWR), scheduler)
        .with_hardware_id(HARDWARE_ID)
        .with_off_wakeup(OFF_WAKEUP_SECS)
        .with_leds(status_leds);

    if woke_by_timer && !board.scheduler_mut().check_wakeup() {
        info!("boot: wakeup interval not finished, back to sleep");
        board.sleep();
    }

    let shell_config = ShellConfig::default()
        .with_banner(BANNER)
        .with_bypass_password(BYPASS_PASSWORD);
    let mut shell = Shell::new(console, &TICKS, flags, board, shell_config);
    shell.init();

    if shell.take_general_flag(GeneralFlag::LOG_PRINT) {
        info!("boot: printing full log");
        if !shell.print_full_log() {
            warn!("boot: no log to print");
        }
    }

    if shell.check_setup_mode() {
        info!("boot: setup mode");
    }

    let mut timer_fault_logged = false;
    loop {
        shell.process();

        let in_setup = shell.in_setup_mode();
        let idle_ms = TICKS.elapsed_since(shell.console().active_since());
        if !in_setup && idle_ms > SLEEP_INACTIVITY_TIMEOUT_MS {
            info!(
                "sleep: entering deep sleep after {}ms inactivity",
                SLEEP_INACTIVITY_TIMEOUT_MS
            );
            shell.deinit();
            shell.board_mut().power_off();
        }

        if TICKS.error_code() != 0 && !timer_fault_logged {
            warn!("timer: error mask 0x{:02X}", TICKS.error_code());
            timer_fault_logged = true;
        }

        TICKS.delay(MAIN_LOOP_PERIOD_MS);
    }
}
