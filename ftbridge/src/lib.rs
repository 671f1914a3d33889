//! FT4222 USB bridge access and the peripherals hung off it.
//!
//! [`bridge::BridgeDevice`] wraps one FT4222 chip and gates I2C, SPI, GPIO
//! and raw transfers on its protocol mode. Drivers in [`display`] and
//! [`peripheral`] sit on top of the [`hw_trait::I2cBus`] trait.

pub mod bridge;
pub mod config;
pub mod display;
pub mod error;
pub mod hw_trait;
pub mod peripheral;
pub mod sink;
pub mod tracing;

pub use bridge::BridgeDevice;
pub use error::{Error, ErrorKind, Result};
pub use sink::{LogSink, SharedSink};
