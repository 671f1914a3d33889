//! Drivers for I2C peripherals reached through the bridge.

pub mod pcf8523;
