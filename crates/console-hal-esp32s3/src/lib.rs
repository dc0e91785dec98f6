//! ESP32-S3 implementations of the console-core collaborator traits.
#![no_std]

pub mod platform;
pub mod serial;
pub mod storage;
