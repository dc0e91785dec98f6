pub mod board;
pub mod micros;
pub mod power;
pub mod reset;
pub mod wakeup;
