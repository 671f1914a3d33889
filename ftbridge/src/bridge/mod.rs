//! FT4222 USB bridge: enumeration, the mode-gated device, and the native
//! driver seam underneath it.

pub mod device;
pub mod enumerate;
#[cfg(feature = "libft4222")]
pub mod ffi;
pub mod native;
pub mod sim;
pub mod types;

pub use device::{BridgeDevice, SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS};
pub use enumerate::{DeviceEnumerator, DeviceInfo};
pub use native::{Driver, NativeHandle, NativeStatus};
pub use types::{
    ClockPhase, ClockPolarity, ClockRate, GpioDir, GpioPort, I2cFlags, I2cSpeed, I2cStatus, Mode,
    SpiClockDivider, SpiConfig, SpiIoMode,
};
