//! Configuration values and flag types for the FT4222 bridge.
//!
//! Numeric values match the vendor library's enums so that they can be handed
//! to the native layer unchanged.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Operating mode of a bridge device.
///
/// At most one protocol mode is active at a time. The slave modes exist in
/// the chip but are never entered by this crate.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    #[strum(to_string = "Unknown")]
    Unknown,
    #[strum(to_string = "SPI Master")]
    SpiMaster,
    #[strum(to_string = "SPI Slave")]
    SpiSlave,
    #[strum(to_string = "I2C Master")]
    I2cMaster,
    #[strum(to_string = "I2C Slave")]
    I2cSlave,
    #[strum(to_string = "GPIO")]
    Gpio,
}

/// I2C master bus speed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum I2cSpeed {
    #[serde(rename = "100k")]
    #[strum(to_string = "100 kbps")]
    S100K,
    #[default]
    #[serde(rename = "400k")]
    #[strum(to_string = "400 kbps")]
    S400K,
    #[serde(rename = "1m")]
    #[strum(to_string = "1000 kbps")]
    S1M,
}

impl I2cSpeed {
    /// Bus speed in kbit/s, as the vendor init call expects it.
    pub fn kbps(self) -> u32 {
        match self {
            I2cSpeed::S100K => 100,
            I2cSpeed::S400K => 400,
            I2cSpeed::S1M => 1000,
        }
    }
}

/// Number of SPI data lines.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SpiIoMode {
    #[default]
    Single = 1,
    Dual = 2,
    Quad = 4,
}

/// SPI clock divider relative to the system clock.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SpiClockDivider {
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
    Div256 = 8,
    #[default]
    Div512 = 9,
}

impl SpiClockDivider {
    /// The division factor (2..=512).
    pub fn factor(self) -> u32 {
        1 << (self as u32)
    }
}

/// SPI clock idle level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ClockPolarity {
    #[default]
    IdleLow = 0,
    IdleHigh = 1,
}

/// SPI sampling edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ClockPhase {
    #[default]
    Leading = 0,
    Trailing = 1,
}

/// Full SPI master configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiConfig {
    pub io_mode: SpiIoMode,
    pub divider: SpiClockDivider,
    pub polarity: ClockPolarity,
    pub phase: ClockPhase,
}

/// GPIO pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum GpioDir {
    Output = 0,
    #[default]
    Input = 1,
}

/// One of the four GPIO pins.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GpioPort {
    #[strum(to_string = "Port0")]
    Port0 = 0,
    #[strum(to_string = "Port1")]
    Port1 = 1,
    #[strum(to_string = "Port2")]
    Port2 = 2,
    #[strum(to_string = "Port3")]
    Port3 = 3,
}

impl GpioPort {
    pub const ALL: [GpioPort; 4] = [
        GpioPort::Port0,
        GpioPort::Port1,
        GpioPort::Port2,
        GpioPort::Port3,
    ];

    /// Pin index, 0..=3.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a port by index.
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Chip system clock. Scales every protocol timing.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum ClockRate {
    #[default]
    #[serde(rename = "60mhz")]
    #[strum(to_string = "60 MHz")]
    Sys60Mhz = 0,
    #[serde(rename = "24mhz")]
    #[strum(to_string = "24 MHz")]
    Sys24Mhz = 1,
    #[serde(rename = "48mhz")]
    #[strum(to_string = "48 MHz")]
    Sys48Mhz = 2,
    #[serde(rename = "80mhz")]
    #[strum(to_string = "80 MHz")]
    Sys80Mhz = 3,
}

impl ClockRate {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ClockRate::Sys60Mhz),
            1 => Some(ClockRate::Sys24Mhz),
            2 => Some(ClockRate::Sys48Mhz),
            3 => Some(ClockRate::Sys80Mhz),
            _ => None,
        }
    }
}

bitflags! {
    /// I2C transaction framing flags, passed to the wire unmodified.
    ///
    /// Register reads are typically a write with `START` followed by a read
    /// with `REPEATED_START | STOP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct I2cFlags: u8 {
        const START = 0x02;
        const REPEATED_START = 0x03;
        const STOP = 0x04;
        const START_AND_STOP = 0x06;
        const NONE = 0x80;
    }
}

impl I2cFlags {
    /// Flags from a raw byte, keeping bits the type does not name.
    pub fn from_raw(raw: u8) -> Self {
        Self::from_bits_retain(raw)
    }
}

bitflags! {
    /// I2C controller status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct I2cStatus: u8 {
        const CONTROLLER_BUSY = 0x01;
        const ERROR = 0x02;
        const ADDRESS_NACK = 0x04;
        const DATA_NACK = 0x08;
        const ARBITRATION_LOST = 0x10;
        const IDLE = 0x20;
        const BUS_BUSY = 0x40;
    }
}

impl I2cStatus {
    /// Whether the last transaction was acknowledged by its target.
    pub fn acknowledged(self) -> bool {
        !self.intersects(I2cStatus::ADDRESS_NACK | I2cStatus::ERROR)
    }

    /// Human-readable list of the set bits.
    pub fn describe(self) -> Vec<&'static str> {
        let mut desc = Vec::new();
        if self.contains(I2cStatus::CONTROLLER_BUSY) {
            desc.push("controller busy");
        }
        if self.contains(I2cStatus::ERROR) {
            desc.push("error");
        }
        if self.contains(I2cStatus::ADDRESS_NACK) {
            desc.push("address NACK");
        }
        if self.contains(I2cStatus::DATA_NACK) {
            desc.push("data NACK");
        }
        if self.contains(I2cStatus::ARBITRATION_LOST) {
            desc.push("arbitration lost");
        }
        if self.contains(I2cStatus::IDLE) {
            desc.push("idle");
        }
        if self.contains(I2cStatus::BUS_BUSY) {
            desc.push("bus busy");
        }
        desc
    }
}

/// FT_DEVICE values reported by the D2XX layer for the FT4222H in its
/// various chip modes.
pub mod device_type {
    pub const FT4222H_0: u32 = 10;
    pub const FT4222H_1_2: u32 = 11;
    pub const FT4222H_3: u32 = 12;

    /// Whether a D2XX device type is an FT4222H.
    pub fn is_ft4222(device_type: u32) -> bool {
        matches!(device_type, FT4222H_0 | FT4222H_1_2 | FT4222H_3)
    }
}
