use core::fmt::Write as _;

use heapless::Vec;
use log::{info, warn};

use super::{Board, CommandId, MAX_LEDS, Shell, TemperatureReport};
use crate::{
    calendar::DateTime,
    console::SerialPort,
    flags::{BackupRegisters, GeneralFlag},
    tokenizer::{parse_i32, parse_u32},
};

const CLOCK_ARGS: usize = 7;
const FULL_YEAR_BASE: u32 = 2_000;

impl<P, B, R> Shell<'_, P, B, R>
where
    P: SerialPort,
    B: Board,
    R: BackupRegisters,
{
    /// Print every stored log entry. Runs after the reset that a full
    /// `logging` request schedules.
    pub fn print_full_log(&mut self) -> bool {
        let Some(header) = self.board.log_header() else {
            return false;
        };
        let count = i32::try_from(header.max_entries).unwrap_or(i32::MAX);
        self.board.print_log(count, &mut self.console)
    }

    pub(super) fn run_command(&mut self, id: CommandId, args: &[&str]) {
        match id {
            CommandId::Help => self.cmd_help(),
            CommandId::Version => {
                let hardware_id = self.board.hardware_id();
                let _ = write!(self.console, " HW-ID: 0x{:X}\r\n", hardware_id);
            }
            CommandId::Clear => self.print("\x1Bc"),
            CommandId::Uptime => {
                let uptime = self.ticks.uptime();
                let _ = write!(self.console, "Uptime: {}\r\n", uptime);
            }
            CommandId::Clock => self.cmd_clock(args),
            CommandId::TempStatus => self.cmd_temp_status(args),
            CommandId::Password => self.cmd_password(args),
            CommandId::Reset => self.cmd_reset(args),
            CommandId::Off => self.cmd_off(args),
            CommandId::Load => self.cmd_load(args),
            CommandId::Led => self.cmd_led(args),
            CommandId::Logging => self.cmd_logging(args),
        }
    }

    fn privileged(&self, args: &[&str]) -> bool {
        args.len() == 1 && self.unlocked
    }

    fn cmd_clock(&mut self, args: &[&str]) {
        let mut now = self.board.read_clock();

        if args.len() == CLOCK_ARGS && self.unlocked {
            let mut year = parse_u32(args[1]);
            if year > FULL_YEAR_BASE {
                year -= FULL_YEAR_BASE;
            }
            now = DateTime {
                year: year as u8,
                month: parse_u32(args[2]) as u8,
                date: parse_u32(args[3]) as u8,
                hours: parse_u32(args[4]) as u8,
                minutes: parse_u32(args[5]) as u8,
                seconds: parse_u32(args[6]) as u8,
            };
            if !now.validate_and_correct() {
                warn!("shell: clock value out of range, reset to epoch");
            }
            self.board.write_clock(&now);
        }

        let _ = write!(
            self.console,
            "OK, 20{:02} {:02} {:02}  {:02} {:02} {:02}\r\n",
            now.year, now.month, now.date, now.hours, now.minutes, now.seconds
        );
    }

    fn cmd_temp_status(&mut self, args: &[&str]) {
        let detailed = args.len() == 2;
        if detailed {
            self.set_replay(parse_u32(args[1]));
        }

        let Some(report) = self.board.temperatures() else {
            self.print("no values\r\n");
            return;
        };

        self.print("OK\r\n");
        if detailed {
            self.print_temperatures_detailed(&report);
        } else {
            self.print_temperatures_classic(&report);
        }
        self.print("\r\n");
    }

    fn print_temperatures_detailed(&mut self, report: &TemperatureReport) {
        let out = &mut self.console;
        let _ = write!(out, "CELLS | {:3} {:3} |", report.cell_max(), report.cell_min());
        for value in &report.cells {
            let _ = write!(out, " {:3}", value);
        }
        let _ = write!(out, "\r\nBMS   | {:3} {:3} |", report.bms_max(), report.bms_min());
        for value in &report.bms {
            let _ = write!(out, " {:3}", value);
        }
        let _ = write!(out, "\r\nMCU     {:3}", report.mcu);
        if let Some(gauge) = report.gauge {
            let _ = write!(out, "\r\nGGE I   {:3}", gauge);
        }
    }

    fn print_temperatures_classic(&mut self, report: &TemperatureReport) {
        let out = &mut self.console;
        for value in &report.cells {
            let _ = write!(out, " {}", value);
        }
        let _ = write!(
            out,
            "   {} {} {}",
            report.bms_max(),
            report.cell_min(),
            report.cell_max()
        );
    }

    fn cmd_password(&mut self, args: &[&str]) {
        self.unlocked = false;

        if args.len() < 2 {
            self.certify
                .renew(self.ticks.uptime(), self.ticks.reset_module_timer());
            let _ = self.certify.unlock(0);
            let (z, w) = self.certify.challenge();
            let _ = write!(self.console, "OK {} {}\r\n", z, w);
            return;
        }

        let response = args[1];
        let accepted = self.certify.unlock(parse_u32(response))
            || self
                .config
                .bypass_password
                .is_some_and(|password| password == response);

        if accepted {
            info!("shell: privileged commands unlocked");
            self.unlocked = true;
            self.print("OK\r\n");
        } else {
            warn!("shell: unlock rejected");
            self.print("ERROR\r\n");
        }
    }

    fn cmd_reset(&mut self, args: &[&str]) {
        if !self.privileged(args) {
            self.print("Error\r\n");
            return;
        }
        info!("shell: reset requested");
        self.print("OK\r\n");
        self.console.flush();
        self.board.system_reset();
    }

    fn cmd_off(&mut self, args: &[&str]) {
        if !self.privileged(args) {
            self.print("Error\r\n");
            return;
        }
        info!("shell: power off requested");
        self.print("OK\r\n");
        self.console.flush();
        self.board.power_off();
    }

    fn cmd_load(&mut self, args: &[&str]) {
        if !self.privileged(args) {
            self.print("Error\r\n");
            return;
        }
        info!("shell: bootloader requested");
        self.print("OK\r\n");
        self.console.flush();
        self.flags.set_loader_flag();
        self.console.disable(self.config.loader_quiet_ms);
        self.board.system_reset();
    }

    fn cmd_led(&mut self, args: &[&str]) {
        let led_count = self.board.led_count().min(MAX_LEDS);
        if args.len() > led_count + 1 || !self.unlocked {
            self.print("Error\r\n");
            return;
        }

        let mut states: Vec<u32, MAX_LEDS> = Vec::new();
        let ok = led_count > 0
            && args.len() - 1 == led_count
            && args[1..]
                .iter()
                .all(|arg| states.push(parse_u32(arg)).is_ok())
            && self.board.set_leds(&states);

        self.print(if ok { "OK\r\n" } else { "Error\r\n" });
    }

    fn cmd_logging(&mut self, args: &[&str]) {
        let count = if args.len() == 2 {
            parse_i32(args[1])
        } else {
            self.config.default_log_count
        };

        let Some(header) = self.board.log_header() else {
            self.print("no values\r\n");
            return;
        };

        let counter = header.counter as i32;
        let max_entries = header.max_entries as i32;
        if count == counter || count >= max_entries {
            if !self.flags.set_general_flag(GeneralFlag::LOG_PRINT) {
                warn!("shell: general flag slot busy, full log print refused");
                self.print("Error\r\n");
                return;
            }
            info!("shell: full log print requested, resetting");
            self.board.record_log_reset();
            self.console.flush();
            self.board.system_reset();
        } else {
            let _ = self.board.print_log(count, &mut self.console);
        }
    }
}
