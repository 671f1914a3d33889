//! Seam between [`BridgeDevice`](super::BridgeDevice) and the vendor library.
//!
//! A [`Driver`] enumerates and opens chips; each open chip is a boxed
//! [`NativeHandle`]. The handle mirrors the vendor calls one-for-one and
//! reports failures as raw [`NativeStatus`] codes; all policy (mode checks,
//! locking, partial-transfer rules, logging) lives in the device above it.

use std::fmt;

use serde::Serialize;

use super::types::{ClockRate, GpioDir, GpioPort, I2cFlags, SpiConfig};

/// Status code returned by a vendor call.
///
/// Codes below 1000 come from the D2XX layer (`FT_STATUS`), codes from 1000
/// up from the FT4222 layer (`FT4222_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NativeStatus(pub u32);

impl NativeStatus {
    pub const OK: Self = Self(0);
    pub const INVALID_HANDLE: Self = Self(1);
    pub const DEVICE_NOT_FOUND: Self = Self(2);
    pub const DEVICE_NOT_OPENED: Self = Self(3);
    pub const IO_ERROR: Self = Self(4);
    pub const INSUFFICIENT_RESOURCES: Self = Self(5);
    pub const INVALID_PARAMETER: Self = Self(6);
    pub const OTHER_ERROR: Self = Self(18);
    pub const DEVICE_NOT_SUPPORTED: Self = Self(1000);
    pub const CLK_NOT_SUPPORTED: Self = Self(1001);
    pub const IS_NOT_SPI_MODE: Self = Self(1003);
    pub const IS_NOT_I2C_MODE: Self = Self(1004);
    pub const WRONG_I2C_ADDR: Self = Self(1007);
    pub const INVALID_POINTER: Self = Self(1009);
    pub const EXCEEDED_MAX_TRANSFER_SIZE: Self = Self(1010);
    pub const FAILED_TO_READ_DEVICE: Self = Self(1011);
    pub const GPIO_NOT_SUPPORTED_IN_THIS_MODE: Self = Self(1013);
    pub const GPIO_EXCEEDED_MAX_PORTNUM: Self = Self(1014);
    pub const GPIO_WRITE_NOT_SUPPORTED: Self = Self(1015);

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Vendor name of the code, when known.
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "FT_OK",
            1 => "FT_INVALID_HANDLE",
            2 => "FT_DEVICE_NOT_FOUND",
            3 => "FT_DEVICE_NOT_OPENED",
            4 => "FT_IO_ERROR",
            5 => "FT_INSUFFICIENT_RESOURCES",
            6 => "FT_INVALID_PARAMETER",
            18 => "FT_OTHER_ERROR",
            1000 => "FT4222_DEVICE_NOT_SUPPORTED",
            1001 => "FT4222_CLK_NOT_SUPPORTED",
            1003 => "FT4222_IS_NOT_SPI_MODE",
            1004 => "FT4222_IS_NOT_I2C_MODE",
            1007 => "FT4222_WRONG_I2C_ADDR",
            1009 => "FT4222_INVALID_POINTER",
            1010 => "FT4222_EXCEEDED_MAX_TRANSFER_SIZE",
            1011 => "FT4222_FAILED_TO_READ_DEVICE",
            1013 => "FT4222_GPIO_NOT_SUPPORTED_IN_THIS_MODE",
            1014 => "FT4222_GPIO_EXCEEDED_MAX_PORTNUM",
            1015 => "FT4222_GPIO_WRITE_NOT_SUPPORTED",
            _ => return None,
        })
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Result of a vendor call.
pub type NativeResult<T> = std::result::Result<T, NativeStatus>;

/// One entry of the vendor's device list, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceNode {
    pub device_type: u32,
    pub serial: String,
    pub description: String,
    pub location_id: u32,
    pub flags: u32,
}

/// Identity reported by an open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    pub device_type: u32,
    pub device_id: u32,
    pub serial: String,
    pub description: String,
}

/// Chip and library versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipVersion {
    pub chip: u32,
    pub library: u32,
}

/// Vendor library entry points that do not need an open handle.
pub trait Driver: Send + Sync {
    /// Every attached FTDI device, in vendor order.
    fn list_devices(&self) -> NativeResult<Vec<RawDeviceNode>>;

    /// Open the device at a vendor-list index.
    fn open_by_index(&self, index: u32) -> NativeResult<Box<dyn NativeHandle>>;

    /// Open the device with a given serial number.
    fn open_by_serial(&self, serial: &str) -> NativeResult<Box<dyn NativeHandle>>;
}

/// An open vendor handle.
///
/// Transfer calls return the number of bytes the chip actually moved; the
/// caller decides whether a short count is an error.
pub trait NativeHandle: Send {
    fn device_info(&mut self) -> NativeResult<HandleInfo>;
    fn version(&mut self) -> NativeResult<ChipVersion>;
    fn chip_mode(&mut self) -> NativeResult<u8>;
    fn uninitialize(&mut self) -> NativeResult<()>;
    fn close(&mut self) -> NativeResult<()>;

    fn i2c_master_init(&mut self, kbps: u32) -> NativeResult<()>;
    fn i2c_master_write(&mut self, address: u8, flags: I2cFlags, data: &[u8]) -> NativeResult<usize>;
    fn i2c_master_read(&mut self, address: u8, flags: I2cFlags, buffer: &mut [u8]) -> NativeResult<usize>;
    fn i2c_master_status(&mut self) -> NativeResult<u8>;
    fn i2c_master_reset_bus(&mut self) -> NativeResult<()>;

    fn spi_master_init(&mut self, config: SpiConfig, sso_map: u8) -> NativeResult<()>;
    fn spi_single_read(&mut self, buffer: &mut [u8], end_transaction: bool) -> NativeResult<usize>;
    fn spi_single_write(&mut self, data: &[u8], end_transaction: bool) -> NativeResult<usize>;
    fn spi_single_read_write(
        &mut self,
        read: &mut [u8],
        write: &[u8],
        end_transaction: bool,
    ) -> NativeResult<usize>;

    fn gpio_init(&mut self, dirs: [GpioDir; 4]) -> NativeResult<()>;
    fn gpio_read(&mut self, port: GpioPort) -> NativeResult<bool>;
    fn gpio_write(&mut self, port: GpioPort, level: bool) -> NativeResult<()>;

    fn set_timeouts(&mut self, read_ms: u32, write_ms: u32) -> NativeResult<()>;
    fn read(&mut self, buffer: &mut [u8]) -> NativeResult<usize>;
    fn write(&mut self, data: &[u8]) -> NativeResult<usize>;

    fn set_clock(&mut self, rate: ClockRate) -> NativeResult<()>;
    fn chip_reset(&mut self) -> NativeResult<()>;
}
