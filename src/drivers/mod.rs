//! Device drivers.
//!
//! Bring-up needs exactly one: the PL011 debug UART.

pub mod uart;
