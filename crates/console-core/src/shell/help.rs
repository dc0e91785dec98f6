//! Paged `help` output, one table entry per replay step.

use core::fmt::Write as _;

use log::debug;

use super::{Board, COMMANDS, Shell};
use crate::{console::SerialPort, flags::BackupRegisters};

/// Room kept free in the transmit ring beside the entry text itself.
const HELP_LINE_OVERHEAD: usize = 25;
const HELP_NAME_WIDTH: usize = 15;

/// Position of the help listing: entries are emitted grouped by first
/// character, starting at `'a'`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct HelpCursor {
    ch: u8,
    printed: usize,
    next_index: usize,
}

impl HelpCursor {
    pub(super) const fn new() -> Self {
        Self {
            ch: b'a',
            printed: 0,
            next_index: 0,
        }
    }

    fn advance_char(&mut self) {
        self.next_index = 0;
        self.ch = self.ch.wrapping_add(1);
        if self.ch == 0xFF {
            self.ch = 0x01;
        }
    }

    /// Index of the next entry to print, moving the cursor past it.
    fn next_entry(&mut self) -> Option<usize> {
        // Every printable first character is visited within one sweep.
        for _ in 0..=usize::from(u8::MAX) {
            let found = COMMANDS
                .iter()
                .enumerate()
                .skip(self.next_index)
                .find(|(_, entry)| entry.name.as_bytes().first() == Some(&self.ch))
                .map(|(index, _)| index);

            match found {
                Some(index) => {
                    self.next_index = index + 1;
                    if self.next_index >= COMMANDS.len() {
                        self.advance_char();
                    }
                    self.printed += 1;
                    return Some(index);
                }
                None => self.advance_char(),
            }
        }
        None
    }
}

impl<P, B, R> Shell<'_, P, B, R>
where
    P: SerialPort,
    B: Board,
    R: BackupRegisters,
{
    pub(super) fn cmd_help(&mut self) {
        if self.replay.count == 0 {
            self.set_replay(1);
            self.replay.suppress_prompt = true;
            self.print("\r\n");
            self.help = HelpCursor::new();
        }

        let Some(pending) = COMMANDS.get(self.help.printed) else {
            self.set_replay(0);
            return;
        };
        if self.console.print_buffer_space() <= pending.help.len() + HELP_LINE_OVERHEAD {
            debug!("shell: help waiting for transmit space");
            return;
        }

        let Some(index) = self.help.next_entry() else {
            self.set_replay(0);
            return;
        };
        let entry = &COMMANDS[index];
        let _ = write!(
            self.console,
            "{:<width$} -- {}",
            entry.name,
            entry.help,
            width = HELP_NAME_WIDTH
        );

        if self.help.printed >= COMMANDS.len() {
            self.set_replay(0);
        } else {
            self.print("\r\n");
        }
    }
}
