//! Chip-independent core of the controller console: time base, console I/O,
//! persistent reset flags, unlock handshake and the command shell.

#![cfg_attr(not(test), no_std)]

pub mod auth;
pub mod calendar;
pub mod console;
pub mod flags;
pub mod ring;
pub mod shell;
pub mod tick;
pub mod tokenizer;
