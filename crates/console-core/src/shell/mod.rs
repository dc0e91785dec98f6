//! Command shell on top of the console: line dispatch, periodic replay of the
//! last command, the unlock handshake and setup-mode handling.

use core::fmt::Write as _;

use log::{debug, info};

use crate::{
    auth::Certify,
    console::{CONSOLE_TIMEOUT_MS, Console, LineBuffer, PrintMode, SerialPort},
    flags::{BackupRegisters, FlagStore, GeneralFlag},
    tick::TickEngine,
    tokenizer,
};

mod board;
mod commands;
mod help;

pub use board::{
    Board, LogHeader, MAX_BMS_SENSORS, MAX_CELL_SENSORS, MAX_LEDS, TemperatureReport,
};

use help::HelpCursor;

pub const PROMPT: &str = "\r\n# ";
/// Most arguments a command line is split into; the last one keeps the tail.
pub const MAX_ARGS: usize = 16;
pub const SETUP_MODE_MAX_SECS: u32 = 60;
/// Setup mode stays open this long after the last command line.
pub const SETUP_MODE_INPUT_GRACE_MS: u32 = 2_500;

const DELIMITER: u8 = b' ';
const REPLAY_PREFIX: char = '!';

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandId {
    Help,
    Version,
    Clear,
    Uptime,
    Clock,
    TempStatus,
    Password,
    Reset,
    Off,
    Load,
    Led,
    Logging,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandEntry {
    pub name: &'static str,
    pub id: CommandId,
    pub help: &'static str,
}

const fn entry(name: &'static str, id: CommandId, help: &'static str) -> CommandEntry {
    CommandEntry { name, id, help }
}

/// Command table in lookup order.
pub const COMMANDS: &[CommandEntry] = &[
    entry("help", CommandId::Help, "Shows available commands"),
    entry("?", CommandId::Help, "Shows available commands"),
    entry("version", CommandId::Version, "Show firmware version"),
    entry("clear", CommandId::Clear, "Clear the terminal"),
    entry("uptime", CommandId::Uptime, "Uptime in seconds"),
    entry("clock", CommandId::Clock, "Clock; year, month, day, hour, minute, sec"),
    entry(
        "temp_stat",
        CommandId::TempStatus,
        "show temperature of sensors <replay period [ms], 0=stop replay>",
    ),
    entry("password", CommandId::Password, "password to unlock certain commands"),
    entry("reset", CommandId::Reset, "Reset the CPU"),
    entry("off", CommandId::Off, "Switch off the power"),
    entry("load", CommandId::Load, "Load new software"),
    entry("led", CommandId::Led, "SET LED 4x (0=off, 1=on)"),
    entry("logging", CommandId::Logging, "print logged data <opt: count>"),
];

pub fn lookup(name: &str) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|entry| entry.name == name)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShellConfig {
    pub banner: &'static str,
    /// Static password accepted by `password` in place of the response.
    pub bypass_password: Option<&'static str>,
    pub default_log_count: i32,
    /// Console quiet time before jumping to the bootloader.
    pub loader_quiet_ms: u32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            banner: "Hydroponics Controller Console\r\n# ",
            bypass_password: None,
            default_log_count: 20,
            loader_quiet_ms: 1_000,
        }
    }
}

impl ShellConfig {
    pub const fn with_bypass_password(mut self, password: Option<&'static str>) -> Self {
        self.bypass_password = password;
        self
    }

    pub const fn with_banner(mut self, banner: &'static str) -> Self {
        self.banner = banner;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Replay {
    timer: u32,
    period: u32,
    count: u32,
    suppress_prompt: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SetupWindow {
    pub entered_uptime: u32,
    pub last_input: u32,
}

impl SetupWindow {
    pub fn is_open(&self, ticks: &TickEngine) -> bool {
        ticks.uptime().wrapping_sub(self.entered_uptime) < SETUP_MODE_MAX_SECS
            && ticks.elapsed_since(self.last_input) < SETUP_MODE_INPUT_GRACE_MS
    }
}

pub struct Shell<'a, P, B, R>
where
    P: SerialPort,
    B: Board,
    R: BackupRegisters,
{
    console: Console<'a, P>,
    ticks: &'a TickEngine,
    flags: FlagStore<R>,
    board: B,
    config: ShellConfig,
    certify: Certify,
    unlocked: bool,
    replay: Replay,
    help: HelpCursor,
    history: LineBuffer,
    silenced_mode: Option<PrintMode>,
    setup: Option<SetupWindow>,
}

impl<'a, P, B, R> Shell<'a, P, B, R>
where
    P: SerialPort,
    B: Board,
    R: BackupRegisters,
{
    pub fn new(
        console: Console<'a, P>,
        ticks: &'a TickEngine,
        flags: FlagStore<R>,
        board: B,
        config: ShellConfig,
    ) -> Self {
        Self {
            console,
            ticks,
            flags,
            board,
            config,
            certify: Certify::new(),
            unlocked: false,
            replay: Replay::default(),
            help: HelpCursor::new(),
            history: LineBuffer::new(),
            silenced_mode: None,
            setup: None,
        }
    }

    /// Reset shell state and print the banner.
    ///
    /// Output is silenced while a general flag is pending; consuming it with
    /// [`Shell::take_general_flag`] restores the previous print mode.
    pub fn init(&mut self) {
        self.history.clear();
        self.unlocked = false;
        self.set_replay(0);

        if self.flags.any_general_flag() && self.silenced_mode.is_none() {
            info!("shell: general flag pending, console output silenced");
            self.silenced_mode = Some(self.console.print_mode());
            self.console.set_print_mode(PrintMode::Silent);
        }

        let banner = self.config.banner;
        self.print(banner);
    }

    /// Flush pending output, then run one step of the interpreter.
    pub fn process(&mut self) {
        self.console.background_print(CONSOLE_TIMEOUT_MS);
        self.execute();
    }

    /// Run a newly completed line, or the stored line when its replay
    /// period has elapsed.
    pub fn execute(&mut self) {
        let mut line = LineBuffer::new();
        let run = if self.console.read_line(&mut line) {
            self.accept_line(&line);
            true
        } else {
            self.replay_due()
        };

        if !run {
            return;
        }

        self.run_history();
        if !self.replay.suppress_prompt {
            self.print(PROMPT);
        }
    }

    /// Look up `args[0]` and run its handler.
    pub fn dispatch(&mut self, args: &[&str]) {
        let Some(&name) = args.first() else {
            return;
        };

        match lookup(name) {
            Some(entry) => {
                debug!("shell: running {} with {} args", entry.name, args.len());
                self.run_command(entry.id, args);
            }
            None => self.print("Command not found!"),
        }
    }

    /// Re-run the stored command every `period_ms`; zero stops the replay.
    pub fn set_replay(&mut self, period_ms: u32) {
        self.replay.timer = self.ticks.tick();
        self.replay.period = period_ms;
        if period_ms == 0 {
            self.replay.suppress_prompt = false;
            self.replay.count = 0;
        }
    }

    /// Times the stored command has been replayed since it was entered.
    pub fn replay_count(&self) -> u32 {
        self.replay.count
    }

    /// Consume a pending general flag, restoring console output if it was
    /// silenced by [`Shell::init`].
    pub fn take_general_flag(&mut self, flag: GeneralFlag) -> bool {
        if !self.flags.check_general_flag(flag) {
            return false;
        }
        if let Some(mode) = self.silenced_mode.take() {
            self.console.set_print_mode(mode);
        }
        true
    }

    /// Request setup mode for the next start, optionally resetting now.
    pub fn go_setup_mode(&mut self, reset: bool) {
        self.flags.set_setup_flag();
        if reset {
            self.console.flush();
            self.board.system_reset();
        }
    }

    /// Consume the setup flag and open the setup window if it was set.
    pub fn check_setup_mode(&mut self) -> bool {
        if !self.flags.take_setup_flag() {
            return false;
        }
        info!("shell: entering setup mode");
        self.setup = Some(SetupWindow {
            entered_uptime: self.ticks.uptime(),
            last_input: self.ticks.tick(),
        });
        true
    }

    pub fn in_setup_mode(&mut self) -> bool {
        match self.setup {
            Some(window) if window.is_open(self.ticks) => true,
            Some(_) => {
                info!("shell: setup mode closed");
                self.setup = None;
                false
            }
            None => false,
        }
    }

    pub fn setup_window(&self) -> Option<SetupWindow> {
        self.setup
    }

    /// Put the console port to sleep.
    pub fn deinit(&mut self) {
        self.console.sleep();
    }

    /// Wake the console port. Privileged commands are locked again.
    pub fn reinit(&mut self) {
        self.console.wake();
        self.unlocked = false;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn history(&self) -> &str {
        &self.history
    }

    pub fn console(&self) -> &Console<'a, P> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console<'a, P> {
        &mut self.console
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn flags(&self) -> &FlagStore<R> {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagStore<R> {
        &mut self.flags
    }

    fn accept_line(&mut self, line: &str) {
        self.set_replay(0);
        if let Some(window) = &mut self.setup {
            window.last_input = self.ticks.tick();
        }

        if line.starts_with(REPLAY_PREFIX) {
            let history = self.history.clone();
            let mut args = [""; MAX_ARGS];
            let argc = tokenizer::split(&history, DELIMITER, &mut args);

            self.print("#");
            for arg in &args[..argc] {
                let _ = write!(self.console, "{} ", arg);
            }
            self.print("\r\n");
        } else {
            self.history.clear();
            let _ = self.history.push_str(line);
        }
    }

    fn replay_due(&mut self) -> bool {
        if self.replay.period == 0
            || self.ticks.elapsed_since(self.replay.timer) < self.replay.period
        {
            return false;
        }
        self.replay.timer = self.ticks.tick();
        self.replay.count = self.replay.count.wrapping_add(1);
        true
    }

    fn run_history(&mut self) {
        // Split a copy so the stored line survives for later replays.
        let line = self.history.clone();
        let mut args = [""; MAX_ARGS];
        let argc = tokenizer::split(&line, DELIMITER, &mut args);
        self.dispatch(&args[..argc]);
    }

    fn print(&mut self, text: &str) {
        self.console.print_bytes(text.as_bytes());
    }
}
